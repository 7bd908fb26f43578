// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod bench;
pub mod bus;
pub mod peripherals;
pub mod signals;

pub use bus::{Access, BusTransaction, BusWindow, RegisterInfo};

#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Invalid peripheral configuration: {0}")]
    InvalidConfig(String),
    #[error("Data length {0} exceeds the 32-bit shift register")]
    DataLenOutOfRange(u8),
    #[error("Unknown pin '{pin}' on {peripheral}")]
    UnknownPin {
        peripheral: &'static str,
        pin: String,
    },
    #[error("Failed to restore snapshot")]
    SnapshotRestore(#[from] serde_json::Error),
    #[error("Snapshot does not fit this peripheral: {0}")]
    SnapshotMismatch(String),
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Result of one clock tick of a memory-mapped peripheral.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickResult<O> {
    /// Read data for the bus transaction of this tick. Zero when the
    /// transaction is not a claimed read.
    pub read_data: u32,
    /// Pin-level outputs after the state update of this tick.
    pub outputs: O,
}

/// One named wire or register exported for waveform tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceSignal {
    pub name: &'static str,
    pub width: u32,
    pub value: u64,
}

impl TraceSignal {
    pub fn bit(name: &'static str, value: bool) -> Self {
        Self {
            name,
            width: 1,
            value: value as u64,
        }
    }

    pub fn bus(name: &'static str, width: u32, value: u64) -> Self {
        Self { name, width, value }
    }
}

/// Trait for models that export their wires for waveform dumps.
pub trait Traceable {
    fn signals(&self) -> Vec<TraceSignal>;
}

/// Pin sets that can be driven or read by name from a stimulus script.
pub trait PinSet: Copy + Default + std::fmt::Debug + Send {
    fn pin_names() -> &'static [&'static str];
    fn get(&self, pin: &str) -> Option<u32>;
    fn set(&mut self, pin: &str, value: u32) -> SimResult<()>;
}

/// Trait representing a memory-mapped peripheral clocked once per tick.
///
/// A tick samples the bus transaction and the pin inputs, computes the next
/// register state from the state committed by the previous tick, and commits
/// it. Read data never observes a write issued in the same tick.
pub trait Peripheral: std::fmt::Debug + Send {
    type Inputs: PinSet;
    type Outputs: PinSet;

    fn name(&self) -> &'static str;
    fn window(&self) -> BusWindow;
    fn registers(&self) -> Vec<RegisterInfo>;
    fn tick(
        &mut self,
        reset: bool,
        bus: &BusTransaction,
        inputs: &Self::Inputs,
    ) -> TickResult<Self::Outputs>;
    /// Pin outputs derived from the committed state.
    fn outputs(&self) -> Self::Outputs;
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
    fn restore(&mut self, _state: serde_json::Value) -> SimResult<()> {
        Ok(())
    }
}
