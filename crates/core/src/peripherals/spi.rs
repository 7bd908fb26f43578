// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bus::{decode_read, decode_write, Access, BusTransaction, BusWindow, RegisterSpec};
use crate::{PinSet, RegisterInfo, SimResult, SimulationError, TickResult, TraceSignal, Traceable};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// ENABLE register of the gated layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiEnable: u32 {
        const EN = 1 << 0;
    }
}

bitflags! {
    /// CTRL register, write-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiCtrl: u32 {
        const START = 1 << 0;
    }
}

bitflags! {
    /// STATUS register, read-only.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SpiStatus: u32 {
        const BUSY = 1 << 0;
        const DONE = 1 << 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiReg {
    Enable,
    Ctrl,
    Status,
    TxData,
    RxData,
    Config,
}

const SPI_REGS: &[RegisterSpec<SpiReg>] = &[
    RegisterSpec::new("CTRL", 0x00, SpiReg::Ctrl, Access::WriteOnly),
    RegisterSpec::new("STATUS", 0x04, SpiReg::Status, Access::ReadOnly),
    RegisterSpec::new("TX_DATA", 0x08, SpiReg::TxData, Access::WriteOnly),
    RegisterSpec::new("RX_DATA", 0x0C, SpiReg::RxData, Access::ReadOnly),
    RegisterSpec::new("CONFIG", 0x10, SpiReg::Config, Access::ReadWrite),
];

const SPI_GATED_REGS: &[RegisterSpec<SpiReg>] = &[
    RegisterSpec::new("ENABLE", 0x00, SpiReg::Enable, Access::ReadWrite),
    RegisterSpec::new("CTRL", 0x04, SpiReg::Ctrl, Access::WriteOnly),
    RegisterSpec::new("STATUS", 0x08, SpiReg::Status, Access::ReadOnly),
    RegisterSpec::new("TX_DATA", 0x0C, SpiReg::TxData, Access::WriteOnly),
    RegisterSpec::new("RX_DATA", 0x10, SpiReg::RxData, Access::ReadOnly),
    RegisterSpec::new("CONFIG", 0x14, SpiReg::Config, Access::ReadWrite),
];

/// Divider loaded by reset: a 1 MHz bit clock from a 64 MHz system clock.
pub const DEFAULT_CLOCK_DIVIDER: u8 = 31;

/// Register layout of the SPI block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpiLayout {
    /// CTRL at 0x00, START accepted whenever the master is idle.
    #[default]
    Compact,
    /// ENABLE at 0x00 with the other registers one word up. START is
    /// accepted only once ENABLE has been set on an earlier tick.
    Gated,
}

impl SpiLayout {
    fn registers(self) -> &'static [RegisterSpec<SpiReg>] {
        match self {
            SpiLayout::Compact => SPI_REGS,
            SpiLayout::Gated => SPI_GATED_REGS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpiState {
    #[default]
    Idle,
    Start,
    Transfer,
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpiInputs {
    pub miso: bool,
}

impl PinSet for SpiInputs {
    fn pin_names() -> &'static [&'static str] {
        &["miso"]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        (pin == "miso").then_some(self.miso as u32)
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        if pin != "miso" {
            return Err(SimulationError::UnknownPin {
                peripheral: "spi",
                pin: pin.to_string(),
            });
        }
        self.miso = value != 0;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpiOutputs {
    pub sclk: bool,
    pub mosi: bool,
    pub busy: bool,
    pub done: bool,
}

impl PinSet for SpiOutputs {
    fn pin_names() -> &'static [&'static str] {
        &["sclk", "mosi", "busy", "done"]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        match pin {
            "sclk" => Some(self.sclk as u32),
            "mosi" => Some(self.mosi as u32),
            "busy" => Some(self.busy as u32),
            "done" => Some(self.done as u32),
            _ => None,
        }
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        match pin {
            "sclk" => self.sclk = value != 0,
            "mosi" => self.mosi = value != 0,
            "busy" => self.busy = value != 0,
            "done" => self.done = value != 0,
            _ => {
                return Err(SimulationError::UnknownPin {
                    peripheral: "spi",
                    pin: pin.to_string(),
                })
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct SpiRegs {
    state: SpiState,
    bit_counter: u8,
    tx_data: u8,
    tx_shift: u8,
    rx_shift: u8,
    clock_divider: u8,
    clk_counter: u8,
    sclk: bool,
    mosi: bool,
    busy: bool,
    done: bool,
    start_pending: bool,
    #[serde(default)]
    enabled: bool,
}

impl Default for SpiRegs {
    fn default() -> Self {
        Self {
            state: SpiState::Idle,
            bit_counter: 0,
            tx_data: 0,
            tx_shift: 0,
            rx_shift: 0,
            clock_divider: DEFAULT_CLOCK_DIVIDER,
            clk_counter: 0,
            sclk: false,
            mosi: false,
            busy: false,
            done: false,
            start_pending: false,
            enabled: false,
        }
    }
}

/// Mode-0 SPI master shifting one byte per transaction.
#[derive(Debug, Serialize)]
pub struct Spi {
    #[serde(skip)]
    window: BusWindow,
    #[serde(skip)]
    layout: SpiLayout,
    regs: SpiRegs,
}

impl Spi {
    pub fn new(window: BusWindow) -> Self {
        Self::with_layout(window, SpiLayout::Compact)
    }

    pub fn with_layout(window: BusWindow, layout: SpiLayout) -> Self {
        Self {
            window,
            layout,
            regs: SpiRegs::default(),
        }
    }

    pub fn layout(&self) -> SpiLayout {
        self.layout
    }

    pub fn register_map(&self) -> &'static [RegisterSpec<SpiReg>] {
        self.layout.registers()
    }

    /// Whether CTRL.START is accepted. Always true in the compact layout.
    pub fn enabled(&self) -> bool {
        self.layout == SpiLayout::Compact || self.regs.enabled
    }

    pub fn state(&self) -> SpiState {
        self.regs.state
    }

    pub fn busy(&self) -> bool {
        self.regs.busy
    }

    pub fn done(&self) -> bool {
        self.regs.done
    }

    pub fn bit_counter(&self) -> u8 {
        self.regs.bit_counter
    }

    /// Byte that the next transaction will shift out.
    pub fn tx_data(&self) -> u8 {
        self.regs.tx_data
    }

    pub fn rx_shift(&self) -> u8 {
        self.regs.rx_shift
    }

    pub fn clock_divider(&self) -> u8 {
        self.regs.clock_divider
    }

    fn read(&self, bus: &BusTransaction) -> u32 {
        let Some(reg) = decode_read(self.register_map(), &self.window, bus) else {
            return 0;
        };
        match reg {
            SpiReg::Status => {
                let mut status = SpiStatus::empty();
                status.set(SpiStatus::BUSY, self.regs.busy);
                status.set(SpiStatus::DONE, self.regs.done);
                status.bits()
            }
            SpiReg::RxData => self.regs.rx_shift as u32,
            SpiReg::Config => self.regs.clock_divider as u32,
            SpiReg::Enable => {
                let mut enable = SpiEnable::empty();
                enable.set(SpiEnable::EN, self.regs.enabled);
                enable.bits()
            }
            SpiReg::Ctrl | SpiReg::TxData => 0,
        }
    }

    fn advance(cur: &SpiRegs, next: &mut SpiRegs, miso: bool) {
        match cur.state {
            SpiState::Idle => {
                if cur.start_pending {
                    next.start_pending = false;
                    next.busy = true;
                    next.state = SpiState::Start;
                    tracing::debug!("spi: start, tx={:#04x}", cur.tx_data);
                }
            }
            SpiState::Start => {
                next.tx_shift = cur.tx_data;
                next.rx_shift = 0;
                next.mosi = cur.tx_data & 0x80 != 0;
                next.clk_counter = 0;
                next.sclk = false;
                next.bit_counter = 0;
                next.state = SpiState::Transfer;
            }
            SpiState::Transfer => {
                let toggle = cur.clk_counter >= cur.clock_divider;
                let next_sclk = if toggle { !cur.sclk } else { cur.sclk };
                next.clk_counter = if toggle { 0 } else { cur.clk_counter + 1 };
                next.sclk = next_sclk;

                if !cur.sclk && next_sclk {
                    next.rx_shift = (cur.rx_shift << 1) | miso as u8;
                    tracing::trace!("spi: sample miso={}", miso as u8);
                } else if cur.sclk && !next_sclk {
                    let shifted = cur.tx_shift << 1;
                    next.tx_shift = shifted;
                    next.mosi = shifted & 0x80 != 0;
                    next.bit_counter = cur.bit_counter + 1;
                    if next.bit_counter == 8 {
                        next.busy = false;
                        next.state = SpiState::Done;
                    }
                }
            }
            SpiState::Done => {
                // A START written on this tick already cleared `done`.
                next.done = !next.start_pending;
                next.bit_counter = 0;
                next.state = SpiState::Idle;
                tracing::debug!("spi: done, rx={:#04x}", cur.rx_shift);
            }
        }
    }
}

impl crate::Peripheral for Spi {
    type Inputs = SpiInputs;
    type Outputs = SpiOutputs;

    fn name(&self) -> &'static str {
        "spi"
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
        inputs: &SpiInputs,
    ) -> TickResult<SpiOutputs> {
        let read_data = self.read(bus);

        if reset {
            self.regs = SpiRegs::default();
            return TickResult {
                read_data,
                outputs: self.outputs(),
            };
        }

        let cur = self.regs;
        let mut next = cur;
        let enabled = self.enabled();

        match decode_write(self.register_map(), &self.window, bus) {
            Some(SpiReg::Enable) => {
                let enable = SpiEnable::from_bits_truncate(bus.write_data);
                next.enabled = enable.contains(SpiEnable::EN);
            }
            Some(SpiReg::Ctrl) => {
                let ctrl = SpiCtrl::from_bits_truncate(bus.write_data);
                if ctrl.contains(SpiCtrl::START) && !cur.busy && enabled {
                    next.start_pending = true;
                    next.done = false;
                } else if ctrl.contains(SpiCtrl::START) && !enabled {
                    tracing::debug!("spi: start ignored, ENABLE clear");
                }
            }
            Some(SpiReg::TxData) => {
                if !cur.busy {
                    next.tx_data = bus.write_data as u8;
                }
            }
            Some(SpiReg::Config) => next.clock_divider = bus.write_data as u8,
            Some(SpiReg::Status) | Some(SpiReg::RxData) | None => {}
        }

        Self::advance(&cur, &mut next, inputs.miso);

        self.regs = next;
        TickResult {
            read_data,
            outputs: self.outputs(),
        }
    }

    fn outputs(&self) -> SpiOutputs {
        SpiOutputs {
            sclk: self.regs.sclk,
            mosi: self.regs.mosi,
            busy: self.regs.busy,
            done: self.regs.done,
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        #[derive(Deserialize)]
        struct State {
            regs: SpiRegs,
        }
        let state: State = serde_json::from_value(state)?;
        self.regs = state.regs;
        Ok(())
    }
}

impl Traceable for Spi {
    fn signals(&self) -> Vec<TraceSignal> {
        vec![
            TraceSignal::bus("state", 2, self.regs.state as u64),
            TraceSignal::bit("sclk", self.regs.sclk),
            TraceSignal::bit("mosi", self.regs.mosi),
            TraceSignal::bit("busy", self.regs.busy),
            TraceSignal::bit("done", self.regs.done),
            TraceSignal::bus("bit_counter", 4, self.regs.bit_counter as u64),
            TraceSignal::bus("tx_shift", 8, self.regs.tx_shift as u64),
            TraceSignal::bus("rx_shift", 8, self.regs.rx_shift as u64),
        ]
    }
}
