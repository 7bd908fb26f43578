// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Command/address/data SPI master for serial flash parts.
//!
//! The master is driven through a direct control interface rather than the
//! system bus. A transaction is a 32-bit command+address phase followed by
//! a data phase of up to 32 bits. Instruction-style reads stop in
//! [`FlashState::Pause`] with chip-select held, so further data can be
//! clocked out with `cont_read` without resending the address.

use crate::{PinSet, SimResult, SimulationError, TraceSignal, Traceable};
use serde::{Deserialize, Serialize};

/// Power-up delay before the first transaction, in ticks.
pub const DEFAULT_INIT_DELAY_CYCLES: u32 = 4095;

const CMD_ADDR_BITS: u8 = 32;

/// Length of the data phase in bits, at most 32.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataLen(u8);

impl DataLen {
    pub const MAX: u8 = 32;

    pub fn new(bits: u8) -> SimResult<Self> {
        if bits > Self::MAX {
            return Err(SimulationError::DataLenOutOfRange(bits));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl TryFrom<u32> for DataLen {
    type Error = SimulationError;

    fn try_from(value: u32) -> SimResult<Self> {
        let bits = u8::try_from(value).unwrap_or(u8::MAX);
        Self::new(bits)
    }
}

/// Control inputs sampled every tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashControl {
    pub start: bool,
    pub stop: bool,
    pub cont_read: bool,
    pub write_enable: bool,
    pub is_instr: bool,
    pub cmd_addr: u32,
    pub data_len: DataLen,
    pub data_in: u32,
    pub miso: bool,
}

impl PinSet for FlashControl {
    fn pin_names() -> &'static [&'static str] {
        &[
            "start",
            "stop",
            "cont_read",
            "write_enable",
            "is_instr",
            "cmd_addr",
            "data_len",
            "data_in",
            "miso",
        ]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        match pin {
            "start" => Some(self.start as u32),
            "stop" => Some(self.stop as u32),
            "cont_read" => Some(self.cont_read as u32),
            "write_enable" => Some(self.write_enable as u32),
            "is_instr" => Some(self.is_instr as u32),
            "cmd_addr" => Some(self.cmd_addr),
            "data_len" => Some(self.data_len.bits() as u32),
            "data_in" => Some(self.data_in),
            "miso" => Some(self.miso as u32),
            _ => None,
        }
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        match pin {
            "start" => self.start = value != 0,
            "stop" => self.stop = value != 0,
            "cont_read" => self.cont_read = value != 0,
            "write_enable" => self.write_enable = value != 0,
            "is_instr" => self.is_instr = value != 0,
            "cmd_addr" => self.cmd_addr = value,
            "data_len" => self.data_len = DataLen::try_from(value)?,
            "data_in" => self.data_in = value,
            "miso" => self.miso = value != 0,
            _ => {
                return Err(SimulationError::UnknownPin {
                    peripheral: "spi_flash",
                    pin: pin.to_string(),
                })
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOutputs {
    pub data_out: u32,
    pub done: bool,
    pub sclk: bool,
    pub mosi: bool,
    pub cs_n: bool,
}

impl Default for FlashOutputs {
    fn default() -> Self {
        Self {
            data_out: 0,
            done: false,
            sclk: false,
            mosi: false,
            cs_n: true,
        }
    }
}

impl PinSet for FlashOutputs {
    fn pin_names() -> &'static [&'static str] {
        &["data_out", "done", "sclk", "mosi", "cs_n"]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        match pin {
            "data_out" => Some(self.data_out),
            "done" => Some(self.done as u32),
            "sclk" => Some(self.sclk as u32),
            "mosi" => Some(self.mosi as u32),
            "cs_n" => Some(self.cs_n as u32),
            _ => None,
        }
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        match pin {
            "data_out" => self.data_out = value,
            "done" => self.done = value != 0,
            "sclk" => self.sclk = value != 0,
            "mosi" => self.mosi = value != 0,
            "cs_n" => self.cs_n = value != 0,
            _ => {
                return Err(SimulationError::UnknownPin {
                    peripheral: "spi_flash",
                    pin: pin.to_string(),
                })
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlashState {
    #[default]
    Idle,
    Init,
    SendCmdAddr,
    DataTransfer,
    InstrDone,
    Pause,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct FlashRegs {
    fsm: FlashState,
    bit_counter: u8,
    shift_out: u32,
    shift_in: u32,
    init_counter: u32,
    initialized: bool,
    // Request latched on start.
    cmd_addr: u32,
    data_in: u32,
    data_len: u8,
    is_write_op: bool,
    is_instr: bool,
    cs_n: bool,
    clk_enable: bool,
    sclk: bool,
    write_mosi: bool,
    mosi: bool,
    data_out: u32,
    done: bool,
}

impl Default for FlashRegs {
    fn default() -> Self {
        Self {
            fsm: FlashState::Idle,
            bit_counter: 0,
            shift_out: 0,
            shift_in: 0,
            init_counter: 0,
            initialized: false,
            cmd_addr: 0,
            data_in: 0,
            data_len: 0,
            is_write_op: false,
            is_instr: false,
            cs_n: true,
            clk_enable: false,
            sclk: false,
            write_mosi: false,
            mosi: false,
            data_out: 0,
            done: false,
        }
    }
}

impl FlashRegs {
    fn begin_phase(&mut self, shift_out: u32) {
        self.shift_out = shift_out;
        self.mosi = shift_out & 0x8000_0000 != 0;
        self.bit_counter = 0;
        self.sclk = false;
        self.write_mosi = false;
        self.clk_enable = true;
    }

    fn enter_cmd_addr(&mut self) {
        self.cs_n = false;
        self.begin_phase(self.cmd_addr);
        self.fsm = FlashState::SendCmdAddr;
    }

    fn enter_data(&mut self) {
        let out = if self.is_write_op { self.data_in } else { 0 };
        self.begin_phase(out);
        self.shift_in = 0;
        self.fsm = FlashState::DataTransfer;
    }

    fn next_clock(&mut self, cur: &FlashRegs) {
        if cur.clk_enable {
            self.sclk = !cur.write_mosi;
            self.write_mosi = !cur.write_mosi;
        }
    }

    /// Output half of a bit: shift on the falling tick, count on the rising.
    fn shift_out_step(&mut self, cur: &FlashRegs) {
        if cur.write_mosi {
            let shifted = cur.shift_out << 1;
            self.shift_out = shifted;
            self.mosi = shifted & 0x8000_0000 != 0;
        } else {
            self.bit_counter = cur.bit_counter + 1;
        }
        self.next_clock(cur);
    }

    fn shift_in_step(&mut self, cur: &FlashRegs, miso: bool) {
        self.mosi = false;
        // Samples on clock level, not on a detected edge.
        if !cur.sclk {
            self.shift_in = (cur.shift_in << 1) | miso as u32;
            self.bit_counter = cur.bit_counter + 1;
            tracing::trace!("spi_flash: bit {} miso={}", cur.bit_counter, miso as u8);
        }
        self.next_clock(cur);
    }
}

/// Flash-style SPI master.
#[derive(Debug, Serialize)]
pub struct SpiFlash {
    init_delay_cycles: u32,
    regs: FlashRegs,
}

impl Default for SpiFlash {
    fn default() -> Self {
        Self::new(DEFAULT_INIT_DELAY_CYCLES)
    }
}

impl SpiFlash {
    pub fn new(init_delay_cycles: u32) -> Self {
        Self {
            init_delay_cycles,
            regs: FlashRegs::default(),
        }
    }

    pub fn state(&self) -> FlashState {
        self.regs.fsm
    }

    pub fn initialized(&self) -> bool {
        self.regs.initialized
    }

    pub fn bit_counter(&self) -> u8 {
        self.regs.bit_counter
    }

    pub fn init_delay_cycles(&self) -> u32 {
        self.init_delay_cycles
    }

    pub fn outputs(&self) -> FlashOutputs {
        FlashOutputs {
            data_out: self.regs.data_out,
            done: self.regs.done,
            sclk: self.regs.sclk,
            mosi: self.regs.mosi,
            cs_n: self.regs.cs_n,
        }
    }

    pub fn tick(&mut self, reset: bool, ctrl: &FlashControl) -> FlashOutputs {
        if reset {
            self.regs = FlashRegs::default();
            return self.outputs();
        }

        let cur = self.regs;
        let mut next = FlashRegs { done: false, ..cur };

        if ctrl.stop {
            if cur.fsm != FlashState::Idle {
                tracing::debug!("spi_flash: stop in {:?}", cur.fsm);
            }
            next.fsm = FlashState::Idle;
            next.cs_n = true;
            next.clk_enable = false;
            next.sclk = false;
            next.write_mosi = false;
            next.mosi = false;
            next.bit_counter = 0;
            self.regs = next;
            return self.outputs();
        }

        match cur.fsm {
            FlashState::Idle => {
                next.cs_n = true;
                if ctrl.start {
                    next.cmd_addr = ctrl.cmd_addr;
                    next.data_in = ctrl.data_in;
                    next.data_len = ctrl.data_len.bits();
                    next.is_write_op = ctrl.write_enable;
                    next.is_instr = ctrl.is_instr;
                    if cur.initialized {
                        next.enter_cmd_addr();
                    } else {
                        next.init_counter = 0;
                        next.fsm = FlashState::Init;
                    }
                    tracing::debug!(
                        "spi_flash: start cmd_addr={:#010x} len={} write={}",
                        ctrl.cmd_addr,
                        ctrl.data_len.bits(),
                        ctrl.write_enable
                    );
                }
            }
            FlashState::Init => {
                if cur.init_counter >= self.init_delay_cycles {
                    next.initialized = true;
                    next.enter_cmd_addr();
                    tracing::debug!("spi_flash: initialized");
                } else {
                    next.init_counter = cur.init_counter + 1;
                }
            }
            FlashState::SendCmdAddr => {
                if cur.bit_counter >= CMD_ADDR_BITS {
                    next.enter_data();
                } else {
                    next.shift_out_step(&cur);
                }
            }
            FlashState::DataTransfer => {
                if cur.bit_counter >= cur.data_len {
                    next.sclk = false;
                    next.write_mosi = false;
                    next.fsm = if cur.is_instr {
                        FlashState::InstrDone
                    } else {
                        FlashState::Done
                    };
                } else if cur.is_write_op {
                    next.shift_out_step(&cur);
                } else {
                    next.shift_in_step(&cur, ctrl.miso);
                }
            }
            FlashState::InstrDone => {
                next.data_out = cur.shift_in;
                next.done = true;
                next.clk_enable = false;
                next.fsm = FlashState::Pause;
                tracing::debug!("spi_flash: instruction data {:#010x}", cur.shift_in);
            }
            FlashState::Pause => {
                if ctrl.cont_read {
                    next.bit_counter = 0;
                    next.shift_in = 0;
                    next.sclk = false;
                    next.write_mosi = false;
                    next.clk_enable = true;
                    next.fsm = FlashState::DataTransfer;
                }
            }
            FlashState::Done => {
                next.cs_n = true;
                next.clk_enable = false;
                next.data_out = if cur.is_write_op { 0 } else { cur.shift_in };
                next.done = true;
                next.fsm = FlashState::Idle;
                tracing::debug!("spi_flash: done data_out={:#010x}", next.data_out);
            }
        }

        self.regs = next;
        self.outputs()
    }

    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        #[derive(Deserialize)]
        struct State {
            regs: FlashRegs,
        }
        let state: State = serde_json::from_value(state)?;
        self.regs = state.regs;
        Ok(())
    }
}

impl Traceable for SpiFlash {
    fn signals(&self) -> Vec<TraceSignal> {
        vec![
            TraceSignal::bus("fsm", 3, self.regs.fsm as u64),
            TraceSignal::bit("cs_n", self.regs.cs_n),
            TraceSignal::bit("sclk", self.regs.sclk),
            TraceSignal::bit("mosi", self.regs.mosi),
            TraceSignal::bit("done", self.regs.done),
            TraceSignal::bus("bit_counter", 6, self.regs.bit_counter as u64),
            TraceSignal::bus("data_out", 32, self.regs.data_out as u64),
        ]
    }
}
