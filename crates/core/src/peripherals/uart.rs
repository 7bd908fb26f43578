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
    /// CONTROL register (0x4).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UartControl: u32 {
        /// Read: transmitter busy.
        const BUSY = 1 << 0;
        /// Write: start transmitting TX_DATA (one-tick pulse).
        const TX_ENABLE = 1 << 1;
    }
}

bitflags! {
    /// RX_CONTROL register (0xC).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RxControl: u32 {
        const VALID = 1 << 0;
        const ENABLE = 1 << 1;
        const BREAK = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UartReg {
    TxData,
    Control,
    RxData,
    RxControl,
}

const UART_REGS: &[RegisterSpec<UartReg>] = &[
    RegisterSpec::new("TX_DATA", 0x0, UartReg::TxData, Access::WriteOnly),
    RegisterSpec::new("CONTROL", 0x4, UartReg::Control, Access::ReadWrite),
    RegisterSpec::new("RX_DATA", 0x8, UartReg::RxData, Access::ReadOnly),
    RegisterSpec::new("RX_CONTROL", 0xC, UartReg::RxControl, Access::ReadWrite),
];

/// Status signals coming back from the TX/RX shift engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UartInputs {
    pub rx_break: bool,
    pub rx_valid: bool,
    pub rx_data: u8,
    pub tx_busy: bool,
}

impl PinSet for UartInputs {
    fn pin_names() -> &'static [&'static str] {
        &["rx_break", "rx_valid", "rx_data", "tx_busy"]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        match pin {
            "rx_break" => Some(self.rx_break as u32),
            "rx_valid" => Some(self.rx_valid as u32),
            "rx_data" => Some(self.rx_data as u32),
            "tx_busy" => Some(self.tx_busy as u32),
            _ => None,
        }
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        match pin {
            "rx_break" => self.rx_break = value != 0,
            "rx_valid" => self.rx_valid = value != 0,
            "rx_data" => self.rx_data = value as u8,
            "tx_busy" => self.tx_busy = value != 0,
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

/// Control signals driven into the TX/RX shift engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UartOutputs {
    pub tx_enable: bool,
    pub tx_data: u8,
    pub rx_enable: bool,
}

impl PinSet for UartOutputs {
    fn pin_names() -> &'static [&'static str] {
        &["tx_enable", "tx_data", "rx_enable"]
    }

    fn get(&self, pin: &str) -> Option<u32> {
        match pin {
            "tx_enable" => Some(self.tx_enable as u32),
            "tx_data" => Some(self.tx_data as u32),
            "rx_enable" => Some(self.rx_enable as u32),
            _ => None,
        }
    }

    fn set(&mut self, pin: &str, value: u32) -> SimResult<()> {
        match pin {
            "tx_enable" => self.tx_enable = value != 0,
            "tx_data" => self.tx_data = value as u8,
            "rx_enable" => self.rx_enable = value != 0,
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

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct UartRegs {
    tx_data: u8,
    tx_enable: bool,
    rx_enable: bool,
    rx_break: bool,
    rx_valid: bool,
}

/// Register layer in front of an external UART transmitter and receiver.
#[derive(Debug, Serialize)]
pub struct Uart {
    #[serde(skip)]
    window: BusWindow,
    regs: UartRegs,
}

impl Uart {
    pub fn new(window: BusWindow) -> Self {
        Self {
            window,
            regs: UartRegs::default(),
        }
    }

    pub fn register_map(&self) -> &'static [RegisterSpec<UartReg>] {
        UART_REGS
    }

    pub fn rx_valid(&self) -> bool {
        self.regs.rx_valid
    }

    pub fn rx_break(&self) -> bool {
        self.regs.rx_break
    }

    fn rx_control(&self) -> RxControl {
        let mut ctrl = RxControl::empty();
        ctrl.set(RxControl::VALID, self.regs.rx_valid);
        ctrl.set(RxControl::ENABLE, self.regs.rx_enable);
        ctrl.set(RxControl::BREAK, self.regs.rx_break);
        ctrl
    }

    fn read(&self, bus: &BusTransaction, inputs: &UartInputs) -> u32 {
        let Some(reg) = decode_read(UART_REGS, &self.window, bus) else {
            return 0;
        };
        match reg {
            UartReg::TxData => 0,
            UartReg::Control => {
                let mut status = UartControl::empty();
                status.set(UartControl::BUSY, inputs.tx_busy);
                status.bits()
            }
            UartReg::RxData => inputs.rx_data as u32,
            UartReg::RxControl => self.rx_control().bits(),
        }
    }
}

impl crate::Peripheral for Uart {
    type Inputs = UartInputs;
    type Outputs = UartOutputs;

    fn name(&self) -> &'static str {
        "uart"
    }

    fn window(&self) -> BusWindow {
        self.window
    }

    fn registers(&self) -> Vec<RegisterInfo> {
        crate::bus::describe(UART_REGS)
    }

    fn tick(
        &mut self,
        reset: bool,
        bus: &BusTransaction,
        inputs: &UartInputs,
    ) -> TickResult<UartOutputs> {
        let read_data = self.read(bus, inputs);

        if reset {
            self.regs = UartRegs::default();
            return TickResult {
                read_data,
                outputs: self.outputs(),
            };
        }

        let cur = self.regs;
        let mut next = UartRegs {
            tx_enable: false,
            rx_break: inputs.rx_break,
            rx_valid: cur.rx_valid || inputs.rx_valid,
            ..cur
        };

        match decode_write(UART_REGS, &self.window, bus) {
            Some(UartReg::TxData) => next.tx_data = bus.write_data as u8,
            Some(UartReg::Control) => {
                let ctrl = UartControl::from_bits_truncate(bus.write_data);
                if ctrl.contains(UartControl::TX_ENABLE) {
                    tracing::debug!("uart: transmit {:#04x}", cur.tx_data);
                    next.tx_enable = true;
                }
            }
            Some(UartReg::RxControl) => {
                let ctrl = RxControl::from_bits_truncate(bus.write_data);
                next.rx_valid = ctrl.contains(RxControl::VALID);
                next.rx_enable = ctrl.contains(RxControl::ENABLE);
                next.rx_break = ctrl.contains(RxControl::BREAK);
            }
            Some(UartReg::RxData) | None => {}
        }

        self.regs = next;
        TickResult {
            read_data,
            outputs: self.outputs(),
        }
    }

    fn outputs(&self) -> UartOutputs {
        UartOutputs {
            tx_enable: self.regs.tx_enable,
            tx_data: self.regs.tx_data,
            rx_enable: self.regs.rx_enable,
        }
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        #[derive(Deserialize)]
        struct State {
            regs: UartRegs,
        }
        let state: State = serde_json::from_value(state)?;
        self.regs = state.regs;
        Ok(())
    }
}

impl Traceable for Uart {
    fn signals(&self) -> Vec<TraceSignal> {
        vec![
            TraceSignal::bus("tx_data", 8, self.regs.tx_data as u64),
            TraceSignal::bit("tx_enable", self.regs.tx_enable),
            TraceSignal::bit("rx_enable", self.regs.rx_enable),
            TraceSignal::bit("rx_valid", self.regs.rx_valid),
            TraceSignal::bit("rx_break", self.regs.rx_break),
        ]
    }
}
