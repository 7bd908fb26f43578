// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use periphsim_config::SocDescriptor;
use periphsim_core::bench::{build_target, BenchTarget};
use periphsim_core::{Access, BusTransaction};
use std::path::PathBuf;

// Registers whose read value is not the written value: CONTROL reads back
// the transmitter busy flag, while its write bit is a one-tick pulse.
const PULSE_REGISTERS: &[(&str, &str)] = &[("uart", "CONTROL")];

// Readable registers with a non-zero reset value. Every other readable
// register resets to zero.
const RESET_VALUES: &[(&str, &str, u32)] = &[("spi", "CONFIG", 31)];

const PATTERNS: &[u32] = &[0xA5A5_A5A5, 0x5A5A_5A5A, 0x0000_0001, 0x8000_0000, 0];

fn soc_path() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("configs/soc/rv32-soc.yaml")
}

fn load_targets() -> anyhow::Result<Vec<(String, Box<dyn BenchTarget>)>> {
    let soc = SocDescriptor::from_file(soc_path())?;
    let mut targets = Vec::new();
    for p in &soc.peripherals {
        targets.push((p.id.clone(), build_target(p)?));
    }
    Ok(targets)
}

fn write_then_read(target: &mut dyn BenchTarget, addr: u32, value: u32) -> u32 {
    target.step(false, &BusTransaction::write(addr, value));
    target.step(false, &BusTransaction::read(addr))
}

#[test]
fn test_register_round_trip_all_peripherals() -> anyhow::Result<()> {
    for (id, mut target) in load_targets()? {
        let Some(window) = target.window() else {
            continue;
        };
        println!("Testing peripheral: {}", id);
        for reg in target.registers() {
            if reg.access != Access::ReadWrite
                || PULSE_REGISTERS.contains(&(target.kind(), reg.name))
            {
                continue;
            }
            let addr = window.base + reg.offset;
            target.step(true, &BusTransaction::idle());

            // Implemented bits of the register.
            let mask = write_then_read(target.as_mut(), addr, u32::MAX);
            assert_ne!(mask, 0, "{}.{} has no writable bits", id, reg.name);

            for &pattern in PATTERNS {
                let read = write_then_read(target.as_mut(), addr, pattern);
                assert_eq!(
                    read,
                    pattern & mask,
                    "{}.{} round trip of {:#010x}",
                    id,
                    reg.name,
                    pattern
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_reset_values() -> anyhow::Result<()> {
    for (id, mut target) in load_targets()? {
        let Some(window) = target.window() else {
            continue;
        };
        let regs = target.registers();
        for reg in regs.iter().filter(|r| r.access == Access::ReadWrite) {
            target.step(false, &BusTransaction::write(window.base + reg.offset, u32::MAX));
        }
        target.step(true, &BusTransaction::idle());

        for reg in regs.iter().filter(|r| r.access != Access::WriteOnly) {
            let expected = RESET_VALUES
                .iter()
                .find(|(kind, name, _)| *kind == target.kind() && *name == reg.name)
                .map_or(0, |(_, _, value)| *value);
            let read = target.step(false, &BusTransaction::read(window.base + reg.offset));
            assert_eq!(read, expected, "{}.{} reset value", id, reg.name);
        }
    }
    Ok(())
}

#[test]
fn test_write_only_registers_read_zero() -> anyhow::Result<()> {
    for (id, mut target) in load_targets()? {
        let Some(window) = target.window() else {
            continue;
        };
        for reg in target.registers() {
            if reg.access != Access::WriteOnly {
                continue;
            }
            target.step(true, &BusTransaction::idle());
            let read = target.step(false, &BusTransaction::read(window.base + reg.offset));
            assert_eq!(read, 0, "{}.{} must read as zero", id, reg.name);
        }
    }
    Ok(())
}

#[test]
fn test_unknown_and_unclaimed_addresses_are_inert() -> anyhow::Result<()> {
    for (id, mut target) in load_targets()? {
        let Some(window) = target.window() else {
            continue;
        };
        target.step(true, &BusTransaction::idle());
        let before = target.snapshot();

        let known: Vec<u32> = target.registers().iter().map(|r| r.offset).collect();
        let unknown = (0..0x40u32)
            .filter(|off| !known.contains(off))
            .map(|off| window.base + off);
        let outside = [window.base.wrapping_sub(4), window.base + window.offset_mask() + 1];

        for addr in unknown.chain(outside) {
            assert_eq!(
                target.step(false, &BusTransaction::write(addr, u32::MAX)),
                0,
                "{} write at {:#010x}",
                id,
                addr
            );
            assert_eq!(
                target.step(false, &BusTransaction::read(addr)),
                0,
                "{} read at {:#010x}",
                id,
                addr
            );
        }
        assert_eq!(target.snapshot(), before, "{} changed state", id);
    }
    Ok(())
}

#[test]
fn test_register_tables_are_word_aligned() -> anyhow::Result<()> {
    for (id, target) in load_targets()? {
        let regs = target.registers();
        for reg in &regs {
            assert_eq!(reg.offset % 4, 0, "{}.{} is unaligned", id, reg.name);
        }
        let mut offsets: Vec<u32> = regs.iter().map(|r| r.offset).collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), regs.len(), "{} has duplicate offsets", id);
    }
    Ok(())
}
