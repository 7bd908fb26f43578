// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use periphsim_core::TraceSignal;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use vcd::{IdCode, TimescaleUnit, Value, Writer};

/// Waveform dump of one bench, one timestep per tick.
pub struct VcdTrace {
    writer: Writer<BufWriter<File>>,
    wires: Vec<Wire>,
}

struct Wire {
    id: IdCode,
    width: u32,
    last: Option<u64>,
}

impl VcdTrace {
    /// Declare one wire per signal under `top.<scope>`. The signal list
    /// passed to later `sample` calls must have the same shape.
    pub fn create(path: &Path, scope: &str, signals: &[TraceSignal]) -> anyhow::Result<Self> {
        let file =
            File::create(path).with_context(|| format!("Failed to create VCD file {:?}", path))?;
        let mut writer = Writer::new(BufWriter::new(file));

        writer.timescale(1, TimescaleUnit::NS)?;
        writer.add_module("top")?;
        writer.add_module(scope)?;
        let mut wires = Vec::with_capacity(signals.len());
        for signal in signals {
            wires.push(Wire {
                id: writer.add_wire(signal.width, signal.name)?,
                width: signal.width,
                last: None,
            });
        }
        writer.upscope()?; // scope
        writer.upscope()?; // top
        writer.enddefinitions()?;

        Ok(Self { writer, wires })
    }

    /// Record the values that changed since the previous sample.
    pub fn sample(&mut self, time: u64, signals: &[TraceSignal]) -> anyhow::Result<()> {
        let changed: Vec<usize> = self
            .wires
            .iter()
            .zip(signals)
            .enumerate()
            .filter(|(_, (wire, signal))| wire.last != Some(signal.value))
            .map(|(i, _)| i)
            .collect();
        if changed.is_empty() {
            return Ok(());
        }

        self.writer.timestamp(time)?;
        for i in changed {
            let wire = &mut self.wires[i];
            let value = signals[i].value;
            if wire.width == 1 {
                let bit = if value & 1 != 0 { Value::V1 } else { Value::V0 };
                self.writer.change_scalar(wire.id, bit)?;
            } else {
                self.writer
                    .change_vector(wire.id, u64_to_vec(value, wire.width))?;
            }
            wire.last = Some(value);
        }
        Ok(())
    }
}

impl core::fmt::Debug for VcdTrace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "VcdTrace({} wires)", self.wires.len())
    }
}

// MSB first, as VCD vectors are written.
fn u64_to_vec(val: u64, width: u32) -> Vec<Value> {
    (0..width)
        .rev()
        .map(|i| if (val >> i) & 1 == 1 { Value::V1 } else { Value::V0 })
        .collect()
}
