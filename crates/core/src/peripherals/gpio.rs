// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::{decode_read, decode_write, Access, BusTransaction, BusWindow, RegisterSpec};
use crate::signals::{width_mask, Synchronizer};
use crate::{PinSet, RegisterInfo, SimResult, SimulationError, TickResult, TraceSignal, Traceable};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioReg {
    Dir,
    Out,
    In,
    IntEn,
    IntPend,
    IntClr,
}

const GPIO_REGS: &[RegisterSpec<GpioReg>] = &[
    RegisterSpec::new("DIR", 0x00, GpioReg::Dir, Access::ReadWrite),
    RegisterSpec::new("OUT", 0x04, GpioReg::Out, Access::ReadWrite),
    RegisterSpec::new("IN", 0x08, GpioReg::In, Access::ReadOnly),
    RegisterSpec::new("INT_EN", 0x0C, GpioReg::IntEn, Access::ReadWrite),
    RegisterSpec::new("INT_PEND", 0x14, GpioReg::IntPend, Access::ReadOnly),
    RegisterSpec::new("INT_CLR", 0x18, GpioReg::IntClr, Access::WriteOnly),
];

// Variant without the interrupt block.
const GPIO_REGS_MINIMAL: &[RegisterSpec<GpioReg>] = &[
    RegisterSpec::new("DIR", 0x00, GpioReg::Dir, Access::ReadWrite),
    RegisterSpec::new("OUT", 0x04, GpioReg::Out, Access::ReadWrite),
    RegisterSpec::new("IN", 0x08, GpioReg::In, Access::ReadOnly),
];

/// Pin counts of a GPIO instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpioParams {
    pub num_bidir: u32,
    pub num_out: u32,
    pub num_in: u32,
    pub interrupts: bool,
}

impl Default for GpioParams {
    fn default() -> Self {
        Self {
            num_bidir: 1,
            num_out: 6,
            num_in: 6,
            interrupts: true,
        }
    }
}

impl GpioParams {
    pub fn validate(&self) -> SimResult<()> {
        let out_bits = self.num_bidir.saturating_add(self.num_out);
        if out_bits > 32 {
            return Err(SimulationError::InvalidConfig(format!(
                "GPIO OUT register needs {} bits (bidir {} + out {}), max 32",
                out_bits, self.num_bidir, self.num_out
            )));
        }
        let in_bits = self.num_bidir.saturating_add(self.num_in);
        if in_bits > 32 {
            return Err(SimulationError::InvalidConfig(format!(
                "GPIO IN register needs {} bits (bidir {} + in {}), max 32",
                in_bits, self.num_bidir, self.num_in
            )));
        }
        Ok(())
    }

    fn bidir_mask(&self) -> u32 {
        width_mask(self.num_bidir)
    }

    fn out_mask(&self) -> u32 {
        width_mask(self.num_bidir + self.num_out)
    }

    fn in_mask(&self) -> u32 {
        width_mask(self.num_bidir + self.num_in)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpioInputs {
    pub bidir_in: u32,
    pub in_pins: u32,
}

impl PinSet for GpioInputs {
    fn pin_names() -> &'static [&'static str] {
        &["bidir_in", "in_pins"]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        match pin {
            "bidir_in" => Some(self.bidir_in),
            "in_pins" => Some(self.in_pins),
            _ => None,
        }
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        match pin {
            "bidir_in" => self.bidir_in = value,
            "in_pins" => self.in_pins = value,
            _ => {
                return Err(SimulationError::UnknownPin {
                    peripheral: "gpio",
                    pin: pin.to_string(),
                })
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpioOutputs {
    pub bidir_out: u32,
    pub bidir_oe: u32,
    pub gpio_out: u32,
    pub interrupt: bool,
}

impl PinSet for GpioOutputs {
    fn pin_names() -> &'static [&'static str] {
        &["bidir_out", "bidir_oe", "gpio_out", "interrupt"]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        match pin {
            "bidir_out" => Some(self.bidir_out),
            "bidir_oe" => Some(self.bidir_oe),
            "gpio_out" => Some(self.gpio_out),
            "interrupt" => Some(self.interrupt as u32),
            _ => None,
        }
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        match pin {
            "bidir_out" => self.bidir_out = value,
            "bidir_oe" => self.bidir_oe = value,
            "gpio_out" => self.gpio_out = value,
            "interrupt" => self.interrupt = value != 0,
            _ => {
                return Err(SimulationError::UnknownPin {
                    peripheral: "gpio",
                    pin: pin.to_string(),
                })
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct GpioRegs {
    dir: u32,      // 0x00, bidirectional pins only
    out: u32,      // 0x04, {out-only, bidir}
    int_en: u32,   // 0x0C, {in-only, bidir}
    int_pend: u32, // 0x14
    sync: Synchronizer,
    interrupt: bool,
}

/// GPIO controller with bidirectional, output-only and input-only pins and
/// rising-edge interrupts.
#[derive(Debug, Serialize)]
pub struct Gpio {
    #[serde(skip)]
    window: BusWindow,
    #[serde(skip)]
    params: GpioParams,
    regs: GpioRegs,
}

impl Gpio {
    pub fn new(window: BusWindow, params: GpioParams) -> SimResult<Self> {
        params.validate()?;
        Ok(Self {
            window,
            params,
            regs: GpioRegs::default(),
        })
    }

    pub fn params(&self) -> GpioParams {
        self.params
    }

    pub fn register_map(&self) -> &'static [RegisterSpec<GpioReg>] {
        if self.params.interrupts {
            GPIO_REGS
        } else {
            GPIO_REGS_MINIMAL
        }
    }

    /// Raw `{in-only, bidir}` vector presented to the synchronizer.
    fn raw_inputs(&self, inputs: &GpioInputs) -> u32 {
        let bidir = inputs.bidir_in & self.params.bidir_mask();
        let in_only = (inputs.in_pins & width_mask(self.params.num_in))
            .checked_shl(self.params.num_bidir)
            .unwrap_or(0);
        (bidir | in_only) & self.params.in_mask()
    }

    fn read(&self, bus: &BusTransaction) -> u32 {
        let Some(reg) = decode_read(self.register_map(), &self.window, bus) else {
            return 0;
        };
        match reg {
            GpioReg::Dir => self.regs.dir,
            GpioReg::Out => self.regs.out,
            GpioReg::In => self.regs.sync.value(),
            GpioReg::IntEn => self.regs.int_en,
            GpioReg::IntPend => self.regs.int_pend,
            GpioReg::IntClr => 0,
        }
    }

    pub fn dir(&self) -> u32 {
        self.regs.dir
    }

    pub fn out(&self) -> u32 {
        self.regs.out
    }

    pub fn int_en(&self) -> u32 {
        self.regs.int_en
    }

    pub fn int_pend(&self) -> u32 {
        self.regs.int_pend
    }
}

impl crate::Peripheral for Gpio {
    type Inputs = GpioInputs;
    type Outputs = GpioOutputs;

    fn name(&self) -> &'static str {
        "gpio"
    }

    fn window(&self) -> BusWindow {
        self.window
    }

    fn registers(&self) -> Vec<RegisterInfo> {
        crate::bus::describe(self.register_map())
    }

    fn tick(
        &mut self,
        reset: bool,
        bus: &BusTransaction,
        inputs: &GpioInputs,
    ) -> TickResult<GpioOutputs> {
        let read_data = self.read(bus);

        if reset {
            self.regs = GpioRegs::default();
            return TickResult {
                read_data,
                outputs: self.outputs(),
            };
        }

        let cur = self.regs;
        let mut next = cur;
        next.sync = cur.sync.clocked(self.raw_inputs(inputs));

        let mut clear = 0;
        match decode_write(self.register_map(), &self.window, bus) {
            Some(GpioReg::Dir) => next.dir = bus.write_data & self.params.bidir_mask(),
            Some(GpioReg::Out) => next.out = bus.write_data & self.params.out_mask(),
            Some(GpioReg::IntEn) => next.int_en = bus.write_data & self.params.in_mask(),
            Some(GpioReg::IntClr) => clear = bus.write_data & self.params.in_mask(),
            _ => {}
        }

        if self.params.interrupts {
            // Clear wins over a same-tick edge.
            let set = cur.sync.rising_edges() & cur.int_en;
            next.int_pend = (cur.int_pend | set) & !clear;
            // Registered from the previous pending state.
            next.interrupt = (cur.int_en & cur.int_pend) != 0;
            if next.int_pend != cur.int_pend {
                tracing::trace!(
                    "gpio: INT_PEND {:#x} -> {:#x}",
                    cur.int_pend,
                    next.int_pend
                );
            }
        }

        self.regs = next;
        TickResult {
            read_data,
            outputs: self.outputs(),
        }
    }

    fn outputs(&self) -> GpioOutputs {
        let out_only = width_mask(self.params.num_out);
        GpioOutputs {
            bidir_out: self.regs.out & self.params.bidir_mask(),
            bidir_oe: self.regs.dir,
            gpio_out: self
                .regs
                .out
                .checked_shr(self.params.num_bidir)
                .unwrap_or(0)
                & out_only,
            interrupt: self.regs.interrupt,
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        #[derive(Deserialize)]
        struct State {
            regs: GpioRegs,
        }
        let state: State = serde_json::from_value(state)?;
        self.regs = state.regs;
        Ok(())
    }
}

impl Traceable for Gpio {
    fn signals(&self) -> Vec<TraceSignal> {
        use crate::Peripheral;
        let out = self.outputs();
        vec![
            TraceSignal::bus("dir", 32, self.regs.dir as u64),
            TraceSignal::bus("out", 32, self.regs.out as u64),
            TraceSignal::bus("in_sync", 32, self.regs.sync.value() as u64),
            TraceSignal::bus("int_en", 32, self.regs.int_en as u64),
            TraceSignal::bus("int_pend", 32, self.regs.int_pend as u64),
            TraceSignal::bus("gpio_out", 32, out.gpio_out as u64),
            TraceSignal::bit("interrupt", out.interrupt),
        ]
    }
}
