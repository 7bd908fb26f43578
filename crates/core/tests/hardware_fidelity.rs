// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use periphsim_core::peripherals::gpio::{Gpio, GpioInputs, GpioParams};
use periphsim_core::peripherals::spi::{Spi, SpiInputs, SpiOutputs, SpiState};
use periphsim_core::peripherals::spi_flash::{
    DataLen, FlashControl, FlashOutputs, FlashState, SpiFlash,
};
use periphsim_core::peripherals::uart_phy::{UartPort, UartPortInputs, DEFAULT_CLOCKS_PER_BIT};
use periphsim_core::{BusTransaction, BusWindow, Peripheral};
use std::collections::HashMap;

/// Mode-0 SPI slave: shifts MOSI in on rising SCLK, presents its next bit
/// after falling SCLK.
struct SpiSlaveDevice {
    tx: u8,
    rx: u8,
    prev_sclk: bool,
}

impl SpiSlaveDevice {
    fn new(tx: u8) -> Self {
        Self {
            tx,
            rx: 0,
            prev_sclk: false,
        }
    }

    fn miso(&self) -> bool {
        self.tx & 0x80 != 0
    }

    fn observe(&mut self, out: &SpiOutputs) {
        if out.sclk && !self.prev_sclk {
            self.rx = (self.rx << 1) | out.mosi as u8;
        } else if !out.sclk && self.prev_sclk {
            self.tx <<= 1;
        }
        self.prev_sclk = out.sclk;
    }
}

#[test]
fn test_spi_full_duplex_with_slave_device() {
    let base = 0x4000_2000;
    for divider in [0u32, 3, 7] {
        let mut spi = Spi::new(BusWindow::with_default_size(base));
        let mut slave = SpiSlaveDevice::new(0xC5);
        let mut bus = vec![
            BusTransaction::write(base + 0x10, divider),
            BusTransaction::write(base + 0x08, 0x3C),
            BusTransaction::write(base, 0x1),
        ]
        .into_iter();

        let mut ticks = 0;
        loop {
            let txn = bus.next().unwrap_or_default();
            let res = spi.tick(false, &txn, &SpiInputs { miso: slave.miso() });
            slave.observe(&res.outputs);
            ticks += 1;
            if spi.done() {
                break;
            }
            assert!(ticks < 1000, "divider {} never finished", divider);
        }

        assert_eq!(slave.rx, 0x3C, "divider {}", divider);
        let res = spi.tick(
            false,
            &BusTransaction::read(base + 0x0C),
            &SpiInputs::default(),
        );
        assert_eq!(res.read_data, 0xC5, "divider {}", divider);
        assert_eq!(spi.state(), SpiState::Idle);
    }
}

#[test]
fn test_spi_clock_idles_low_between_transfers() {
    let base = 0x4000_2000;
    let mut spi = Spi::new(BusWindow::with_default_size(base));
    let idle = SpiInputs::default();
    spi.tick(false, &BusTransaction::write(base, 1), &idle);
    let mut saw_clock = false;
    let mut transfer_ticks = 0;
    for _ in 0..600 {
        let out = spi.tick(false, &BusTransaction::idle(), &idle).outputs;
        if spi.state() == SpiState::Transfer {
            transfer_ticks += 1;
        } else {
            assert!(!out.sclk);
        }
        saw_clock |= out.sclk;
    }
    assert!(saw_clock);
    assert!(spi.done());
    // Reset divider 31: 32 ticks per clock phase, 16 phases per byte.
    assert_eq!(transfer_ticks, 16 * 32);
}

fn uart_pair() -> (UartPort, UartPort) {
    let a = UartPort::new(BusWindow::with_default_size(0x4000_1000), DEFAULT_CLOCKS_PER_BIT)
        .unwrap();
    let b = UartPort::new(BusWindow::with_default_size(0x4000_1000), DEFAULT_CLOCKS_PER_BIT)
        .unwrap();
    (a, b)
}

#[test]
fn test_uart_cross_connected_ports() {
    let base = 0x4000_1000;
    let (mut a, mut b) = uart_pair();
    let mut a_in = UartPortInputs::default();
    let mut b_in = UartPortInputs::default();

    b.tick(false, &BusTransaction::write(base + 0xC, 0b010), &b_in);

    let mut received = Vec::new();
    for &byte in b"Hi" {
        a.tick(false, &BusTransaction::write(base, byte as u32), &a_in);
        a.tick(false, &BusTransaction::write(base + 0x4, 0x2), &a_in);

        let mut got = None;
        for _ in 0..(12 * DEFAULT_CLOCKS_PER_BIT) {
            let ra = a.tick(false, &BusTransaction::idle(), &a_in);
            let rb = b.tick(false, &BusTransaction::read(base + 0xC), &b_in);
            b_in.rx = ra.outputs.tx;
            a_in.rx = rb.outputs.tx;
            if rb.read_data & 0x1 != 0 {
                let data = b.tick(false, &BusTransaction::read(base + 0x8), &b_in);
                got = Some(data.read_data as u8);
                // Acknowledge, keep the receiver enabled.
                b.tick(false, &BusTransaction::write(base + 0xC, 0b010), &b_in);
                break;
            }
        }
        received.push(got.expect("byte not received"));

        // Let the transmitter go idle before the next byte.
        while a.transmitter().busy() {
            let ra = a.tick(false, &BusTransaction::idle(), &a_in);
            b_in.rx = ra.outputs.tx;
            b.tick(false, &BusTransaction::idle(), &b_in);
        }
    }
    assert_eq!(received, b"Hi");
}

#[test]
fn test_uart_busy_spans_one_frame() {
    let base = 0x4000_1000;
    let (mut a, _) = uart_pair();
    let inputs = UartPortInputs::default();
    a.tick(false, &BusTransaction::write(base, 0x55), &inputs);
    a.tick(false, &BusTransaction::write(base + 0x4, 0x2), &inputs);

    let mut busy_ticks = 0;
    for _ in 0..(20 * DEFAULT_CLOCKS_PER_BIT) {
        let r = a.tick(false, &BusTransaction::idle(), &inputs);
        if r.outputs.tx_busy {
            busy_ticks += 1;
        }
    }
    assert_eq!(busy_ticks, 10 * DEFAULT_CLOCKS_PER_BIT);
}

#[test]
fn test_gpio_bidir_pin_output_enable() {
    let base = 0x4000_0000;
    let mut gpio = Gpio::new(BusWindow::with_default_size(base), GpioParams::default()).unwrap();
    let inputs = GpioInputs::default();
    gpio.tick(false, &BusTransaction::write(base + 0x04, 0x41), &inputs);
    let out = gpio.tick(false, &BusTransaction::idle(), &inputs).outputs;
    // Output drivers stay off until DIR selects output.
    assert_eq!(out.bidir_oe, 0);
    assert_eq!(out.bidir_out, 1);
    assert_eq!(out.gpio_out, 0b10_0000);

    let out = gpio
        .tick(false, &BusTransaction::write(base, 0x1), &inputs)
        .outputs;
    assert_eq!(out.bidir_oe, 1);
}

#[test]
fn test_gpio_minimal_variant_never_interrupts() {
    let base = 0x4000_0000;
    let params = GpioParams {
        interrupts: false,
        ..GpioParams::default()
    };
    let mut gpio = Gpio::new(BusWindow::with_default_size(base), params).unwrap();
    gpio.tick(false, &BusTransaction::write(base + 0x0C, 0x7F), &GpioInputs::default());
    let toggling = [
        GpioInputs {
            bidir_in: 1,
            in_pins: 0x3F,
        },
        GpioInputs::default(),
    ];
    for i in 0..20 {
        let out = gpio
            .tick(false, &BusTransaction::idle(), &toggling[i % 2])
            .outputs;
        assert!(!out.interrupt);
    }
    let r = gpio.tick(false, &BusTransaction::read(base + 0x14), &GpioInputs::default());
    assert_eq!(r.read_data, 0);
}

/// Serial flash part: 0x03 read, 0x02 page program, 24-bit address.
/// Samples MOSI on rising SCLK and shifts read data out MSB first.
struct FlashMemory {
    mem: HashMap<u32, u8>,
    bits: Vec<bool>,
    prev_sclk: bool,
    prev_cs_n: bool,
}

impl FlashMemory {
    fn new() -> Self {
        Self {
            mem: HashMap::new(),
            bits: Vec::new(),
            prev_sclk: false,
            prev_cs_n: true,
        }
    }

    fn word(bits: &[bool]) -> u32 {
        bits.iter().fold(0, |acc, b| (acc << 1) | *b as u32)
    }

    fn command(&self) -> Option<(u8, u32)> {
        if self.bits.len() < 32 {
            return None;
        }
        let cmd = Self::word(&self.bits[..32]);
        Some(((cmd >> 24) as u8, cmd & 0x00FF_FFFF))
    }

    fn miso(&self) -> bool {
        match self.command() {
            Some((0x03, addr)) => {
                let bit = self.bits.len() - 32;
                let byte = self.mem.get(&(addr + (bit / 8) as u32)).copied().unwrap_or(0xFF);
                (byte >> (7 - bit % 8)) & 1 != 0
            }
            _ => false,
        }
    }

    fn observe(&mut self, out: &FlashOutputs) {
        if out.cs_n && !self.prev_cs_n {
            // End of transaction: commit programmed bytes.
            if let Some((0x02, addr)) = self.command() {
                for (i, chunk) in self.bits[32..].chunks(8).enumerate() {
                    if chunk.len() == 8 {
                        self.mem.insert(addr + i as u32, Self::word(chunk) as u8);
                    }
                }
            }
            self.bits.clear();
        }
        if !out.cs_n && out.sclk && !self.prev_sclk {
            self.bits.push(out.mosi);
        }
        self.prev_sclk = out.sclk;
        self.prev_cs_n = out.cs_n;
    }
}

fn run_flash(flash: &mut SpiFlash, memory: &mut FlashMemory, request: FlashControl) -> u32 {
    let mut ctrl = request;
    for _ in 0..20_000 {
        ctrl.miso = memory.miso();
        let out = flash.tick(false, &ctrl);
        memory.observe(&out);
        ctrl.start = false;
        ctrl.cont_read = false;
        if out.done {
            return out.data_out;
        }
    }
    panic!("flash transaction never completed");
}

#[test]
fn test_flash_program_then_read_back() {
    let mut flash = SpiFlash::new(16);
    let mut memory = FlashMemory::new();

    let program = FlashControl {
        start: true,
        write_enable: true,
        cmd_addr: 0x0200_0100,
        data_len: DataLen::new(16).unwrap(),
        data_in: 0xBEEF_0000,
        ..FlashControl::default()
    };
    // Chip-select rises on the Done tick, which commits the page.
    assert_eq!(run_flash(&mut flash, &mut memory, program), 0);
    assert_eq!(memory.mem.get(&0x100), Some(&0xBE));
    assert_eq!(memory.mem.get(&0x101), Some(&0xEF));

    let read = FlashControl {
        start: true,
        cmd_addr: 0x0300_0100,
        data_len: DataLen::new(16).unwrap(),
        ..FlashControl::default()
    };
    assert_eq!(run_flash(&mut flash, &mut memory, read), 0xBEEF);
}

#[test]
fn test_flash_instruction_read_continues_stream() {
    let mut flash = SpiFlash::new(0);
    let mut memory = FlashMemory::new();
    for (i, b) in [0x11u8, 0x22, 0x33, 0x44].iter().enumerate() {
        memory.mem.insert(0x200 + i as u32, *b);
    }

    let request = FlashControl {
        start: true,
        is_instr: true,
        cmd_addr: 0x0300_0200,
        data_len: DataLen::new(8).unwrap(),
        ..FlashControl::default()
    };
    assert_eq!(run_flash(&mut flash, &mut memory, request), 0x11);
    assert_eq!(flash.state(), FlashState::Pause);

    let mut words = Vec::new();
    for _ in 0..3 {
        let resume = FlashControl {
            cont_read: true,
            ..FlashControl::default()
        };
        words.push(run_flash(&mut flash, &mut memory, resume));
    }
    assert_eq!(words, vec![0x22, 0x33, 0x44]);

    let out = flash.tick(
        false,
        &FlashControl {
            stop: true,
            ..FlashControl::default()
        },
    );
    assert!(out.cs_n);
    assert_eq!(flash.state(), FlashState::Idle);
}
