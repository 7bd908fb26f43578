// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Pin-level harness used by the script runner.
//!
//! A bench owns one model plus its latched input pins, so a script can
//! drive a pin once and have it held on every following tick.

use crate::bus::{BusTransaction, BusWindow};
use crate::peripherals::gpio::{Gpio, GpioParams};
use crate::peripherals::spi::{Spi, SpiLayout};
use crate::peripherals::spi_flash::{FlashControl, FlashOutputs, SpiFlash};
use crate::peripherals::uart_phy::UartPort;
use crate::{Peripheral, PinSet, RegisterInfo, SimResult, SimulationError, TraceSignal, Traceable};
use periphsim_config::{PeripheralConfig, PeripheralKind};

/// Object-safe view of a peripheral under test.
pub trait BenchTarget: std::fmt::Debug + Send {
    fn kind(&self) -> &'static str;
    /// Bus window, if the target sits on the system bus.
    fn window(&self) -> Option<BusWindow>;
    fn registers(&self) -> Vec<RegisterInfo>;
    /// Advance one tick and return the read data of `bus`.
    fn step(&mut self, reset: bool, bus: &BusTransaction) -> u32;
    /// Latch an input pin value for the following ticks.
    fn drive(&mut self, pin: &str, value: u32) -> SimResult<()>;
    /// Current value of an output pin.
    fn pin_level(&self, pin: &str) -> Option<u32>;
    fn input_pins(&self) -> &'static [&'static str];
    fn output_pins(&self) -> &'static [&'static str];
    fn signals(&self) -> Vec<TraceSignal>;
    fn snapshot(&self) -> serde_json::Value;
    fn restore(&mut self, state: serde_json::Value) -> SimResult<()>;
}

/// Bench for any memory-mapped model.
#[derive(Debug)]
pub struct PinBench<P: Peripheral> {
    model: P,
    inputs: P::Inputs,
    outputs: P::Outputs,
}

impl<P: Peripheral> PinBench<P> {
    pub fn new(model: P) -> Self {
        let outputs = model.outputs();
        Self {
            model,
            inputs: <P::Inputs as Default>::default(),
            outputs,
        }
    }

    pub fn model(&self) -> &P {
        &self.model
    }

    pub fn inputs(&self) -> &P::Inputs {
        &self.inputs
    }
}

impl<P: Peripheral + Traceable> BenchTarget for PinBench<P> {
    fn kind(&self) -> &'static str {
        self.model.name()
    }

    fn window(&self) -> Option<BusWindow> {
        Some(self.model.window())
    }

    fn registers(&self) -> Vec<RegisterInfo> {
        self.model.registers()
    }

    fn step(&mut self, reset: bool, bus: &BusTransaction) -> u32 {
        let res = self.model.tick(reset, bus, &self.inputs);
        self.outputs = res.outputs;
        res.read_data
    }

    fn drive(&mut self, pin: &str, value: u32) -> SimResult<()> {
        self.inputs.set(pin, value)
    }

    fn pin_level(&self, pin: &str) -> Option<u32> {
        self.outputs.get(pin)
    }

    fn input_pins(&self) -> &'static [&'static str] {
        <P::Inputs as PinSet>::pin_names()
    }

    fn output_pins(&self) -> &'static [&'static str] {
        <P::Outputs as PinSet>::pin_names()
    }

    fn signals(&self) -> Vec<TraceSignal> {
        self.model.signals()
    }

    fn snapshot(&self) -> serde_json::Value {
        self.model.snapshot()
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        self.model.restore(state)?;
        self.outputs = self.model.outputs();
        Ok(())
    }
}

/// Bench for the flash-style SPI master.
///
/// `start`, `stop` and `cont_read` are strobes: a driven value is applied
/// for one tick and then drops back to zero. The other inputs are latched.
#[derive(Debug)]
pub struct FlashBench {
    flash: SpiFlash,
    control: FlashControl,
    outputs: FlashOutputs,
}

impl FlashBench {
    pub fn new(flash: SpiFlash) -> Self {
        let outputs = flash.outputs();
        Self {
            flash,
            control: FlashControl::default(),
            outputs,
        }
    }

    pub fn flash(&self) -> &SpiFlash {
        &self.flash
    }
}

impl BenchTarget for FlashBench {
    fn kind(&self) -> &'static str {
        "spi_flash"
    }

    fn window(&self) -> Option<BusWindow> {
        None
    }

    fn registers(&self) -> Vec<RegisterInfo> {
        Vec::new()
    }

    fn step(&mut self, reset: bool, bus: &BusTransaction) -> u32 {
        if bus.write_enable || bus.read_enable {
            tracing::warn!(
                "spi_flash: ignoring bus transaction at {:#010x}, not memory-mapped",
                bus.address
            );
        }
        self.outputs = self.flash.tick(reset, &self.control);
        self.control.start = false;
        self.control.stop = false;
        self.control.cont_read = false;
        0
    }

    fn drive(&mut self, pin: &str, value: u32) -> SimResult<()> {
        self.control.set(pin, value)
    }

    fn pin_level(&self, pin: &str) -> Option<u32> {
        self.outputs.get(pin)
    }

    fn input_pins(&self) -> &'static [&'static str] {
        FlashControl::pin_names()
    }

    fn output_pins(&self) -> &'static [&'static str] {
        FlashOutputs::pin_names()
    }

    fn signals(&self) -> Vec<TraceSignal> {
        self.flash.signals()
    }

    fn snapshot(&self) -> serde_json::Value {
        self.flash.snapshot()
    }

    fn restore(&mut self, state: serde_json::Value) -> SimResult<()> {
        self.flash.restore(state)?;
        self.outputs = self.flash.outputs();
        Ok(())
    }
}

fn bus_window(config: &PeripheralConfig) -> SimResult<BusWindow> {
    let base = config.base_address.ok_or_else(|| {
        SimulationError::InvalidConfig(format!("'{}' has no base_address", config.id))
    })?;
    Ok(BusWindow::new(base, config.offset_bits()))
}

/// Build the bench for one configured peripheral.
pub fn build_target(config: &PeripheralConfig) -> SimResult<Box<dyn BenchTarget>> {
    tracing::debug!("Building {} bench for '{}'", config.kind.type_name(), config.id);
    let target: Box<dyn BenchTarget> = match config.kind {
        PeripheralKind::Gpio {
            num_bidir,
            num_out,
            num_in,
            interrupts,
        } => {
            let params = GpioParams {
                num_bidir,
                num_out,
                num_in,
                interrupts,
            };
            Box::new(PinBench::new(Gpio::new(bus_window(config)?, params)?))
        }
        PeripheralKind::Uart { clocks_per_bit } => Box::new(PinBench::new(UartPort::new(
            bus_window(config)?,
            clocks_per_bit,
        )?)),
        PeripheralKind::Spi { enable_register } => {
            let layout = if enable_register {
                SpiLayout::Gated
            } else {
                SpiLayout::Compact
            };
            Box::new(PinBench::new(Spi::with_layout(bus_window(config)?, layout)))
        }
        PeripheralKind::SpiFlash { init_delay_cycles } => {
            Box::new(FlashBench::new(SpiFlash::new(init_delay_cycles)))
        }
    };
    Ok(target)
}
