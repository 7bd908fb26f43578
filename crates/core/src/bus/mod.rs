// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// An already-decoded system bus transaction, presented once per tick.
///
/// Asserting both strobes at once is a caller contract violation; models
/// evaluate the write path and the read path independently.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusTransaction {
    pub address: u32,
    pub write_data: u32,
    pub write_enable: bool,
    pub read_enable: bool,
}

impl BusTransaction {
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn read(address: u32) -> Self {
        Self {
            address,
            read_enable: true,
            ..Self::default()
        }
    }

    pub fn write(address: u32, write_data: u32) -> Self {
        Self {
            address,
            write_data,
            write_enable: true,
            ..Self::default()
        }
    }
}

/// Address window a peripheral instance claims on the system bus.
///
/// A transaction is claimed when every address bit above `offset_bits`
/// matches the base; the bits below form the register offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusWindow {
    pub base: u32,
    pub offset_bits: u32,
}

impl BusWindow {
    pub const DEFAULT_OFFSET_BITS: u32 = 12;

    pub fn new(base: u32, offset_bits: u32) -> Self {
        Self {
            base,
            offset_bits: offset_bits.min(32),
        }
    }

    pub fn with_default_size(base: u32) -> Self {
        Self::new(base, Self::DEFAULT_OFFSET_BITS)
    }

    pub fn offset_mask(&self) -> u32 {
        if self.offset_bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.offset_bits) - 1
        }
    }

    pub fn size(&self) -> u64 {
        1u64 << self.offset_bits
    }

    pub fn claims(&self, address: u32) -> bool {
        let upper = !self.offset_mask();
        (address & upper) == (self.base & upper)
    }

    pub fn offset(&self, address: u32) -> u32 {
        address & self.offset_mask()
    }

    /// Register offset of a claimed write, if this transaction is one.
    pub fn write_offset(&self, bus: &BusTransaction) -> Option<u32> {
        (bus.write_enable && self.claims(bus.address)).then(|| self.offset(bus.address))
    }

    /// Register offset of a claimed read, if this transaction is one.
    pub fn read_offset(&self, bus: &BusTransaction) -> Option<u32> {
        (bus.read_enable && self.claims(bus.address)).then(|| self.offset(bus.address))
    }

    pub fn overlaps(&self, other: &BusWindow) -> bool {
        let bits = self.offset_bits.max(other.offset_bits);
        let wide = BusWindow::new(self.base, bits);
        wide.claims(other.base)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

impl Access {
    pub fn readable(self) -> bool {
        !matches!(self, Access::WriteOnly)
    }

    pub fn writable(self) -> bool {
        !matches!(self, Access::ReadOnly)
    }
}

/// One row of a peripheral register table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSpec<R> {
    pub name: &'static str,
    pub offset: u32,
    pub reg: R,
    pub access: Access,
}

impl<R> RegisterSpec<R> {
    pub const fn new(name: &'static str, offset: u32, reg: R, access: Access) -> Self {
        Self {
            name,
            offset,
            reg,
            access,
        }
    }
}

/// Type-erased row of a register table, for listings and generic checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterInfo {
    pub name: &'static str,
    pub offset: u32,
    pub access: Access,
}

impl<R> From<&RegisterSpec<R>> for RegisterInfo {
    fn from(spec: &RegisterSpec<R>) -> Self {
        Self {
            name: spec.name,
            offset: spec.offset,
            access: spec.access,
        }
    }
}

/// Erase a register table.
pub fn describe<R>(table: &[RegisterSpec<R>]) -> Vec<RegisterInfo> {
    table.iter().map(RegisterInfo::from).collect()
}

/// Look up the register at `offset`. Unknown and unaligned offsets decode
/// to nothing.
pub fn decode<R: Copy>(table: &[RegisterSpec<R>], offset: u32) -> Option<RegisterSpec<R>> {
    table.iter().find(|spec| spec.offset == offset).copied()
}

/// Decode a claimed write to a writable register.
pub fn decode_write<R: Copy>(
    table: &[RegisterSpec<R>],
    window: &BusWindow,
    bus: &BusTransaction,
) -> Option<R> {
    let offset = window.write_offset(bus)?;
    decode(table, offset)
        .filter(|spec| spec.access.writable())
        .map(|spec| spec.reg)
}

/// Decode a claimed read of a readable register.
pub fn decode_read<R: Copy>(
    table: &[RegisterSpec<R>],
    window: &BusWindow,
    bus: &BusTransaction,
) -> Option<R> {
    let offset = window.read_offset(bus)?;
    decode(table, offset)
        .filter(|spec| spec.access.readable())
        .map(|spec| spec.reg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Reg {
        Data,
        Status,
        Kick,
    }

    const TABLE: &[RegisterSpec<Reg>] = &[
        RegisterSpec::new("DATA", 0x0, Reg::Data, Access::ReadWrite),
        RegisterSpec::new("STATUS", 0x4, Reg::Status, Access::ReadOnly),
        RegisterSpec::new("KICK", 0x8, Reg::Kick, Access::WriteOnly),
    ];

    #[test]
    fn test_window_claims_upper_bits_only() {
        let w = BusWindow::new(0x4000_1000, 12);
        assert!(w.claims(0x4000_1000));
        assert!(w.claims(0x4000_1FFC));
        assert!(!w.claims(0x4000_2000));
        assert!(!w.claims(0x4000_0FFC));
        assert_eq!(w.offset(0x4000_1014), 0x14);
        assert_eq!(w.size(), 0x1000);
    }

    #[test]
    fn test_full_width_window() {
        let w = BusWindow::new(0x1234, 32);
        assert!(w.claims(0xFFFF_FFFF));
        assert_eq!(w.offset(0xDEAD_BEEF), 0xDEAD_BEEF);
    }

    #[test]
    fn test_decode_respects_access() {
        let w = BusWindow::with_default_size(0x1000_0000);
        assert_eq!(
            decode_write(TABLE, &w, &BusTransaction::write(0x1000_0000, 1)),
            Some(Reg::Data)
        );
        assert_eq!(
            decode_write(TABLE, &w, &BusTransaction::write(0x1000_0004, 1)),
            None
        );
        assert_eq!(
            decode_read(TABLE, &w, &BusTransaction::read(0x1000_0008)),
            None
        );
        assert_eq!(
            decode_read(TABLE, &w, &BusTransaction::read(0x1000_0004)),
            Some(Reg::Status)
        );
        // Unaligned offsets are unknown registers.
        assert_eq!(
            decode_read(TABLE, &w, &BusTransaction::read(0x1000_0001)),
            None
        );
    }

    #[test]
    fn test_unclaimed_or_idle_transactions_decode_to_nothing() {
        let w = BusWindow::with_default_size(0x1000_0000);
        assert_eq!(
            decode_write(TABLE, &w, &BusTransaction::write(0x2000_0000, 1)),
            None
        );
        let idle = BusTransaction {
            address: 0x1000_0000,
            ..BusTransaction::idle()
        };
        assert_eq!(decode_read(TABLE, &w, &idle), None);
        assert_eq!(decode_write(TABLE, &w, &idle), None);
    }

    #[test]
    fn test_describe_keeps_order() {
        let info = describe(TABLE);
        assert_eq!(info.len(), 3);
        assert_eq!(info[1].name, "STATUS");
        assert_eq!(info[1].offset, 0x4);
        assert_eq!(info[2].access, Access::WriteOnly);
    }

    #[test]
    fn test_overlap_detection() {
        let a = BusWindow::new(0x4000_0000, 12);
        let b = BusWindow::new(0x4000_1000, 12);
        let c = BusWindow::new(0x4000_0000, 16);
        assert!(!a.overlaps(&b));
        assert!(c.overlaps(&b));
        assert!(b.overlaps(&c));
    }
}
