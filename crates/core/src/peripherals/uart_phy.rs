// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! 8N1 shift engines behind the UART register layer, and [`UartPort`],
//! which wires them to a [`Uart`] the way the SoC does.

use super::uart::{Uart, UartInputs, UartOutputs};
use crate::bus::{BusTransaction, BusWindow};
use crate::signals::{DigitalLevel, Synchronizer};
use crate::{
    Peripheral, PinSet, RegisterInfo, SimResult, SimulationError, TickResult, TraceSignal, Traceable,
};
use serde::{Deserialize, Serialize};

/// Clock ticks per bit used by the reference SoC.
pub const DEFAULT_CLOCKS_PER_BIT: u32 = 87;

fn check_clocks_per_bit(clocks_per_bit: u32) -> SimResult<()> {
    if clocks_per_bit == 0 {
        return Err(SimulationError::InvalidConfig(
            "UART clocks_per_bit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum TxState {
    #[default]
    Idle,
    Start,
    Data,
    Stop,
}

/// Transmit shift engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UartTx {
    clocks_per_bit: u32,
    state: TxState,
    counter: u32,
    bit_index: u8,
    shift: u8,
    line: DigitalLevel,
}

impl UartTx {
    pub fn new(clocks_per_bit: u32) -> SimResult<Self> {
        check_clocks_per_bit(clocks_per_bit)?;
        Ok(Self {
            clocks_per_bit,
            state: TxState::Idle,
            counter: 0,
            bit_index: 0,
            shift: 0,
            line: DigitalLevel::High,
        })
    }

    pub fn busy(&self) -> bool {
        self.state != TxState::Idle
    }

    pub fn line(&self) -> DigitalLevel {
        self.line
    }

    pub fn reset(&mut self) {
        self.state = TxState::Idle;
        self.counter = 0;
        self.bit_index = 0;
        self.shift = 0;
        self.line = DigitalLevel::High;
    }

    fn bit_done(&self) -> bool {
        self.counter + 1 >= self.clocks_per_bit
    }

    pub fn tick(&mut self, enable: bool, data: u8) {
        match self.state {
            TxState::Idle => {
                if enable {
                    self.shift = data;
                    self.counter = 0;
                    self.state = TxState::Start;
                    self.line = DigitalLevel::Low;
                }
            }
            TxState::Start => {
                if self.bit_done() {
                    self.counter = 0;
                    self.bit_index = 0;
                    self.state = TxState::Data;
                    self.line = DigitalLevel::from(self.shift & 1 != 0);
                } else {
                    self.counter += 1;
                }
            }
            TxState::Data => {
                if self.bit_done() {
                    self.counter = 0;
                    if self.bit_index == 7 {
                        self.state = TxState::Stop;
                        self.line = DigitalLevel::High;
                    } else {
                        self.bit_index += 1;
                        self.line = DigitalLevel::from((self.shift >> self.bit_index) & 1 != 0);
                    }
                } else {
                    self.counter += 1;
                }
            }
            TxState::Stop => {
                if self.bit_done() {
                    self.counter = 0;
                    self.state = TxState::Idle;
                } else {
                    self.counter += 1;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
enum RxState {
    #[default]
    Idle,
    Start,
    Data,
    Stop,
}

/// Receive shift engine with a two-stage line synchronizer and mid-bit
/// sampling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UartRx {
    clocks_per_bit: u32,
    state: RxState,
    counter: u32,
    bit_index: u8,
    shift: u8,
    sync: Synchronizer,
    valid: bool,
    data: u8,
    break_flag: bool,
}

impl UartRx {
    pub fn new(clocks_per_bit: u32) -> SimResult<Self> {
        check_clocks_per_bit(clocks_per_bit)?;
        let mut rx = Self {
            clocks_per_bit,
            state: RxState::Idle,
            counter: 0,
            bit_index: 0,
            shift: 0,
            sync: Synchronizer::default(),
            valid: false,
            data: 0,
            break_flag: false,
        };
        rx.reset();
        Ok(rx)
    }

    pub fn reset(&mut self) {
        self.state = RxState::Idle;
        self.counter = 0;
        self.bit_index = 0;
        self.shift = 0;
        // Idle line is high.
        self.sync = Synchronizer {
            stage1: 1,
            stage2: 1,
        };
        self.valid = false;
        self.data = 0;
        self.break_flag = false;
    }

    /// One-tick pulse when a frame with a valid stop bit was received.
    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn data(&self) -> u8 {
        self.data
    }

    /// Set after an all-zero frame with a low stop bit, until the line
    /// returns high.
    pub fn break_flag(&self) -> bool {
        self.break_flag
    }

    pub fn tick(&mut self, enable: bool, line: DigitalLevel) {
        let sample = self.sync.value() & 1 != 0;
        self.sync = self.sync.clocked(line.bit());
        self.valid = false;

        match self.state {
            RxState::Idle => {
                if sample {
                    self.break_flag = false;
                } else if enable && !self.break_flag {
                    self.counter = 0;
                    self.state = RxState::Start;
                }
            }
            RxState::Start => {
                if self.counter >= (self.clocks_per_bit - 1) / 2 {
                    self.counter = 0;
                    if sample {
                        // Glitch, not a start bit.
                        self.state = RxState::Idle;
                    } else {
                        self.bit_index = 0;
                        self.shift = 0;
                        self.state = RxState::Data;
                    }
                } else {
                    self.counter += 1;
                }
            }
            RxState::Data => {
                if self.counter + 1 >= self.clocks_per_bit {
                    self.counter = 0;
                    self.shift = (self.shift >> 1) | ((sample as u8) << 7);
                    if self.bit_index == 7 {
                        self.state = RxState::Stop;
                    } else {
                        self.bit_index += 1;
                    }
                } else {
                    self.counter += 1;
                }
            }
            RxState::Stop => {
                if self.counter + 1 >= self.clocks_per_bit {
                    self.counter = 0;
                    self.state = RxState::Idle;
                    if sample {
                        self.valid = true;
                        self.data = self.shift;
                        tracing::debug!("uart rx: received {:#04x}", self.shift);
                    } else if self.shift == 0 {
                        self.break_flag = true;
                        tracing::debug!("uart rx: break");
                    } else {
                        tracing::debug!("uart rx: framing error, dropped {:#04x}", self.shift);
                    }
                } else {
                    self.counter += 1;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UartPortInputs {
    pub rx: DigitalLevel,
}

impl Default for UartPortInputs {
    fn default() -> Self {
        Self {
            rx: DigitalLevel::High,
        }
    }
}

impl PinSet for UartPortInputs {
    fn pin_names() -> &'static [&'static str] {
        &["rx"]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        (pin == "rx").then(|| self.rx.bit())
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        if pin != "rx" {
            return Err(SimulationError::UnknownPin {
                peripheral: "uart",
                pin: pin.to_string(),
            });
        }
        self.rx = DigitalLevel::from(value != 0);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UartPortOutputs {
    pub tx: DigitalLevel,
    pub tx_busy: bool,
    pub rx_enable: bool,
    pub rx_valid: bool,
}

impl PinSet for UartPortOutputs {
    fn pin_names() -> &'static [&'static str] {
        &["tx", "tx_busy", "rx_enable", "rx_valid"]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        match pin {
            "tx" => Some(self.tx.bit()),
            "tx_busy" => Some(self.tx_busy as u32),
            "rx_enable" => Some(self.rx_enable as u32),
            "rx_valid" => Some(self.rx_valid as u32),
            _ => None,
        }
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        match pin {
            "tx" => self.tx = DigitalLevel::from(value != 0),
            "tx_busy" => self.tx_busy = value != 0,
            "rx_enable" => self.rx_enable = value != 0,
            "rx_valid" => self.rx_valid = value != 0,
            _ => {
                return Err(SimulationError::UnknownPin {
                    peripheral: "uart",
                    pin: pin.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// UART register layer plus its transmitter and receiver.
///
/// Each side samples the other's registered outputs from the previous
/// tick, as the flip-flops would.
#[derive(Debug)]
pub struct UartPort {
    uart: Uart,
    tx: UartTx,
    rx: UartRx,
}

impl UartPort {
    pub fn new(window: BusWindow, clocks_per_bit: u32) -> SimResult<Self> {
        Ok(Self {
            uart: Uart::new(window),
            tx: UartTx::new(clocks_per_bit)?,
            rx: UartRx::new(clocks_per_bit)?,
        })
    }

    pub fn controller(&self) -> &Uart {
        &self.uart
    }

    pub fn transmitter(&self) -> &UartTx {
        &self.tx
    }

    pub fn receiver(&self) -> &UartRx {
        &self.rx
    }

    fn engine_status(&self) -> UartInputs {
        UartInputs {
            rx_break: self.rx.break_flag(),
            rx_valid: self.rx.valid(),
            rx_data: self.rx.data(),
            tx_busy: self.tx.busy(),
        }
    }
}

impl Peripheral for UartPort {
    type Inputs = UartPortInputs;
    type Outputs = UartPortOutputs;

    fn name(&self) -> &'static str {
        "uart"
    }

    fn window(&self) -> BusWindow {
        self.uart.window()
    }

    fn registers(&self) -> Vec<RegisterInfo> {
        self.uart.registers()
    }

    fn tick(
        &mut self,
        reset: bool,
        bus: &BusTransaction,
        inputs: &UartPortInputs,
    ) -> TickResult<UartPortOutputs> {
        let status = self.engine_status();
        let control: UartOutputs = self.uart.outputs();
        let res = self.uart.tick(reset, bus, &status);

        if reset {
            self.tx.reset();
            self.rx.reset();
        } else {
            self.tx.tick(control.tx_enable, control.tx_data);
            self.rx.tick(control.rx_enable, inputs.rx);
        }

        TickResult {
            read_data: res.read_data,
            outputs: self.outputs(),
        }
    }

    fn outputs(&self) -> UartPortOutputs {
        UartPortOutputs {
            tx: self.tx.line(),
            tx_busy: self.tx.busy(),
            rx_enable: self.uart.outputs().rx_enable,
            rx_valid: self.uart.rx_valid(),
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "controller": self.uart.snapshot(),
            "tx": serde_json::to_value(&self.tx).unwrap_or(serde_json::Value::Null),
            "rx": serde_json::to_value(&self.rx).unwrap_or(serde_json::Value::Null),
        })
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        #[derive(Deserialize)]
        struct State {
            controller: serde_json::Value,
            tx: UartTx,
            rx: UartRx,
        }
        let state: State = serde_json::from_value(state)?;
        let expected = self.tx.clocks_per_bit;
        for (side, cpb) in [("tx", state.tx.clocks_per_bit), ("rx", state.rx.clocks_per_bit)] {
            if cpb != expected {
                return Err(SimulationError::SnapshotMismatch(format!(
                    "{} clocks_per_bit {} != configured {}",
                    side, cpb, expected
                )));
            }
        }
        self.uart.restore(state.controller)?;
        self.tx = state.tx;
        self.rx = state.rx;
        Ok(())
    }
}

impl Traceable for UartPort {
    fn signals(&self) -> Vec<TraceSignal> {
        let mut signals = self.uart.signals();
        signals.push(TraceSignal::bit("tx", self.tx.line().is_high()));
        signals.push(TraceSignal::bit("tx_busy", self.tx.busy()));
        signals.push(TraceSignal::bit("rx_sync", self.rx.sync.value() & 1 != 0));
        signals.push(TraceSignal::bus("rx_data", 8, self.rx.data() as u64));
        signals
    }
}
