// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// Represents a digital signal level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DigitalLevel {
    #[default]
    Low,
    High,
}

impl DigitalLevel {
    pub fn is_high(self) -> bool {
        matches!(self, DigitalLevel::High)
    }

    pub fn bit(self) -> u32 {
        self.is_high() as u32
    }
}

impl From<bool> for DigitalLevel {
    fn from(b: bool) -> Self {
        if b {
            DigitalLevel::High
        } else {
            DigitalLevel::Low
        }
    }
}

impl From<DigitalLevel> for bool {
    fn from(level: DigitalLevel) -> Self {
        match level {
            DigitalLevel::High => true,
            DigitalLevel::Low => false,
        }
    }
}

/// Two flip-flop synchronizer for a vector of asynchronous inputs.
///
/// `stage1` captures the raw pins, `stage2` captures `stage1`; both update
/// on the same tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synchronizer {
    pub stage1: u32,
    pub stage2: u32,
}

impl Synchronizer {
    /// Bits that are high in `stage1` and still low in `stage2`.
    pub fn rising_edges(&self) -> u32 {
        self.stage1 & !self.stage2
    }

    /// State after clocking in `raw`.
    pub fn clocked(&self, raw: u32) -> Self {
        Self {
            stage1: raw,
            stage2: self.stage1,
        }
    }

    /// Synchronized value seen by the rest of the design.
    pub fn value(&self) -> u32 {
        self.stage2
    }
}

/// Mask with the low `width` bits set.
pub fn width_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}
