// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

/// Register window size used when a peripheral does not set `offset_bits`.
pub const DEFAULT_OFFSET_BITS: u32 = 12;

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

fn default_num_bidir() -> u32 {
    1
}

fn default_num_out() -> u32 {
    6
}

fn default_num_in() -> u32 {
    6
}

fn default_clocks_per_bit() -> u32 {
    87
}

fn default_init_delay_cycles() -> u32 {
    4095
}

/// Structural problems found while validating a descriptor or script.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Unsupported schema_version '{0}'. Supported versions: '1.0'")]
    UnsupportedSchema(String),
    #[error("Peripheral id cannot be empty")]
    EmptyId,
    #[error("Duplicate peripheral id '{0}'")]
    DuplicateId(String),
    #[error("Peripheral '{0}' is memory-mapped and needs a base_address")]
    MissingBase(String),
    #[error("Peripheral '{0}' is not memory-mapped and cannot have a base_address")]
    UnexpectedBase(String),
    #[error("Peripheral '{id}' offset_bits {bits} is out of range (1..=32)")]
    OffsetBits { id: String, bits: u32 },
    #[error("Address windows of '{0}' and '{1}' overlap")]
    Overlap(String, String),
    #[error("Peripheral '{id}': {reason}")]
    InvalidParameter { id: String, reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeripheralKind {
    Gpio {
        #[serde(default = "default_num_bidir")]
        num_bidir: u32,
        #[serde(default = "default_num_out")]
        num_out: u32,
        #[serde(default = "default_num_in")]
        num_in: u32,
        #[serde(default = "default_true")]
        interrupts: bool,
    },
    Uart {
        #[serde(default = "default_clocks_per_bit")]
        clocks_per_bit: u32,
    },
    Spi {
        /// Use the layout with an ENABLE register at offset 0x00 that must
        /// be set before CTRL.START is accepted.
        #[serde(default)]
        enable_register: bool,
    },
    SpiFlash {
        #[serde(default = "default_init_delay_cycles")]
        init_delay_cycles: u32,
    },
}

impl PeripheralKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            PeripheralKind::Gpio { .. } => "gpio",
            PeripheralKind::Uart { .. } => "uart",
            PeripheralKind::Spi { .. } => "spi",
            PeripheralKind::SpiFlash { .. } => "spi_flash",
        }
    }

    /// Whether this kind sits on the system bus.
    pub fn is_memory_mapped(&self) -> bool {
        !matches!(self, PeripheralKind::SpiFlash { .. })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PeripheralConfig {
    pub id: String,
    #[serde(default)]
    pub base_address: Option<u32>,
    #[serde(default)]
    pub offset_bits: Option<u32>,
    pub kind: PeripheralKind,
}

impl PeripheralConfig {
    pub fn offset_bits(&self) -> u32 {
        self.offset_bits.unwrap_or(DEFAULT_OFFSET_BITS)
    }

    /// Claimed address range as `[start, end)`, if memory-mapped.
    pub fn address_range(&self) -> Option<(u64, u64)> {
        let base = self.base_address? as u64;
        let size = 1u64 << self.offset_bits().min(32);
        let start = base & !(size - 1);
        Some((start, start + size))
    }

    pub fn validate(&self) -> std::result::Result<(), DescriptorError> {
        if self.id.trim().is_empty() {
            return Err(DescriptorError::EmptyId);
        }

        if self.kind.is_memory_mapped() {
            let Some(base) = self.base_address else {
                return Err(DescriptorError::MissingBase(self.id.clone()));
            };
            let bits = self.offset_bits();
            if bits == 0 || bits > 32 {
                return Err(DescriptorError::OffsetBits {
                    id: self.id.clone(),
                    bits,
                });
            }
            if bits < 32 && base & ((1u32 << bits) - 1) != 0 {
                tracing::warn!(
                    "Peripheral '{}' base {:#010x} has bits below the {}-bit window set; they are ignored",
                    self.id,
                    base,
                    bits
                );
            }
        } else if self.base_address.is_some() || self.offset_bits.is_some() {
            return Err(DescriptorError::UnexpectedBase(self.id.clone()));
        }

        let invalid = |reason: String| DescriptorError::InvalidParameter {
            id: self.id.clone(),
            reason,
        };
        match self.kind {
            PeripheralKind::Gpio {
                num_bidir,
                num_out,
                num_in,
                ..
            } => {
                if num_bidir.saturating_add(num_out) > 32 {
                    return Err(invalid(format!(
                        "num_bidir + num_out = {} exceeds 32",
                        num_bidir.saturating_add(num_out)
                    )));
                }
                if num_bidir.saturating_add(num_in) > 32 {
                    return Err(invalid(format!(
                        "num_bidir + num_in = {} exceeds 32",
                        num_bidir.saturating_add(num_in)
                    )));
                }
            }
            PeripheralKind::Uart { clocks_per_bit } => {
                if clocks_per_bit == 0 {
                    return Err(invalid("clocks_per_bit must be at least 1".to_string()));
                }
            }
            PeripheralKind::Spi { .. } | PeripheralKind::SpiFlash { .. } => {}
        }
        Ok(())
    }
}

/// Peripheral map of one SoC.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct SocDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub name: String,
    #[serde(default)]
    pub peripherals: Vec<PeripheralConfig>,
}

impl SocDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read SoC descriptor at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let soc: Self = serde_yaml::from_str(yaml).context("Failed to parse SoC Descriptor YAML")?;
        soc.validate()?;
        Ok(soc)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(DescriptorError::UnsupportedSchema(self.schema_version.clone()).into());
        }

        let mut seen = HashSet::new();
        for p in &self.peripherals {
            p.validate()?;
            if !seen.insert(p.id.as_str()) {
                return Err(DescriptorError::DuplicateId(p.id.clone()).into());
            }
        }

        let mapped: Vec<(&str, (u64, u64))> = self
            .peripherals
            .iter()
            .filter_map(|p| p.address_range().map(|r| (p.id.as_str(), r)))
            .collect();
        for (i, (a, (a_start, a_end))) in mapped.iter().enumerate() {
            for (b, (b_start, b_end)) in &mapped[i + 1..] {
                if a_start < b_end && b_start < a_end {
                    return Err(DescriptorError::Overlap(a.to_string(), b.to_string()).into());
                }
            }
        }
        Ok(())
    }

    pub fn peripheral(&self, id: &str) -> Option<&PeripheralConfig> {
        self.peripherals.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScriptLimits {
    pub max_ticks: u64,
}

/// One stimulus or check, applied at a tick.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    /// Bus write to `offset` within the peripheral window.
    Write { offset: u32, value: u32 },
    /// Bus read; compared against `expect` under `mask` when given.
    Read {
        offset: u32,
        #[serde(default)]
        expect: Option<u32>,
        #[serde(default)]
        mask: Option<u32>,
    },
    /// Latch a pin input until driven again.
    Drive { pin: String, value: u32 },
    /// Assert reset for one tick.
    Reset,
    /// Check a pin output after the tick.
    ExpectPin { pin: String, value: u32 },
}

impl StepAction {
    pub fn uses_bus(&self) -> bool {
        matches!(self, StepAction::Write { .. } | StepAction::Read { .. })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScriptStep {
    pub at: u64,
    #[serde(flatten)]
    pub action: StepAction,
}

/// Tick-scheduled stimulus for a single peripheral.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StimulusScript {
    pub schema_version: String,
    pub peripheral: String,
    pub limits: ScriptLimits,
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

impl StimulusScript {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let f = std::fs::File::open(&path)
            .with_context(|| format!("Failed to open stimulus script at {:?}", path.as_ref()))?;
        let script: Self =
            serde_yaml::from_reader(f).context("Failed to parse Stimulus Script YAML")?;
        script.validate()?;
        Ok(script)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!(
                "Unsupported schema_version '{}'. Supported versions: '1.0'",
                self.schema_version
            );
        }

        if self.peripheral.trim().is_empty() {
            anyhow::bail!("Script 'peripheral' cannot be empty");
        }

        if self.limits.max_ticks == 0 {
            anyhow::bail!("Limit 'max_ticks' must be greater than zero");
        }

        let mut last = 0;
        let mut last_bus_tick = None;
        for (i, step) in self.steps.iter().enumerate() {
            if step.at >= self.limits.max_ticks {
                anyhow::bail!(
                    "Step {} at tick {} is past max_ticks {}",
                    i,
                    step.at,
                    self.limits.max_ticks
                );
            }
            if step.at < last {
                anyhow::bail!("Step {} at tick {} is scheduled before tick {}", i, step.at, last);
            }
            if step.action.uses_bus() {
                if last_bus_tick == Some(step.at) {
                    anyhow::bail!("Step {} is a second bus access at tick {}", i, step.at);
                }
                last_bus_tick = Some(step.at);
            }
            last = step.at;
        }
        Ok(())
    }

    /// Check the script against the SoC it will run on.
    pub fn resolve<'a>(&self, soc: &'a SocDescriptor) -> Result<&'a PeripheralConfig> {
        let target = soc.peripheral(&self.peripheral).with_context(|| {
            format!(
                "Peripheral '{}' not found in SoC '{}'",
                self.peripheral, soc.name
            )
        })?;
        if !target.kind.is_memory_mapped() {
            if let Some(step) = self.steps.iter().find(|s| s.action.uses_bus()) {
                anyhow::bail!(
                    "Step at tick {} uses the bus, but '{}' is not memory-mapped",
                    step.at,
                    target.id
                );
            }
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_defaults() {
        let yaml = r#"
schema_version: "1.0"
name: "soc"
peripherals:
  - id: gpio0
    base_address: 0x40000000
    kind: { type: gpio }
  - id: uart0
    base_address: 0x40001000
    kind: { type: uart }
  - id: spi0
    base_address: 0x40002000
    kind: { type: spi, enable_register: true }
  - id: flash
    kind: { type: spi_flash }
"#;
        let soc = SocDescriptor::from_yaml(yaml).unwrap();
        assert_eq!(
            soc.peripherals[0].kind,
            PeripheralKind::Gpio {
                num_bidir: 1,
                num_out: 6,
                num_in: 6,
                interrupts: true
            }
        );
        assert_eq!(
            soc.peripherals[1].kind,
            PeripheralKind::Uart { clocks_per_bit: 87 }
        );
        assert_eq!(
            soc.peripherals[2].kind,
            PeripheralKind::Spi {
                enable_register: true
            }
        );
        assert_eq!(
            soc.peripherals[3].kind,
            PeripheralKind::SpiFlash {
                init_delay_cycles: 4095
            }
        );
        assert_eq!(soc.peripherals[0].offset_bits(), DEFAULT_OFFSET_BITS);
    }

    #[test]
    fn test_address_range_aligns_base() {
        let p = PeripheralConfig {
            id: "spi0".to_string(),
            base_address: Some(0x4000_2010),
            offset_bits: Some(8),
            kind: PeripheralKind::Spi {
                enable_register: false,
            },
        };
        assert_eq!(p.address_range(), Some((0x4000_2000, 0x4000_2100)));
        let full = PeripheralConfig {
            offset_bits: Some(32),
            ..p
        };
        assert_eq!(full.address_range(), Some((0, 1 << 32)));
    }

    #[test]
    fn test_gpio_width_limits() {
        let p = PeripheralConfig {
            id: "gpio0".to_string(),
            base_address: Some(0),
            offset_bits: None,
            kind: PeripheralKind::Gpio {
                num_bidir: 16,
                num_out: 17,
                num_in: 0,
                interrupts: false,
            },
        };
        assert!(matches!(
            p.validate(),
            Err(DescriptorError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_script_step_actions() {
        let yaml = r#"
schema_version: "1.0"
peripheral: gpio0
limits:
  max_ticks: 100
steps:
  - at: 0
    write: { offset: 0x0, value: 1 }
  - at: 2
    drive: { pin: in_pins, value: 3 }
  - at: 5
    read: { offset: 0x8, expect: 0x6, mask: 0x7E }
  - at: 6
    reset: null
  - at: 6
    expect_pin: { pin: interrupt, value: 0 }
"#;
        let script: StimulusScript = serde_yaml::from_str(yaml).unwrap();
        script.validate().unwrap();
        assert_eq!(script.steps.len(), 5);
        assert_eq!(
            script.steps[0].action,
            StepAction::Write {
                offset: 0,
                value: 1
            }
        );
        assert_eq!(
            script.steps[2].action,
            StepAction::Read {
                offset: 8,
                expect: Some(6),
                mask: Some(0x7E)
            }
        );
        assert_eq!(script.steps[3].action, StepAction::Reset);
        assert!(script.steps[0].action.uses_bus());
        assert!(!script.steps[4].action.uses_bus());
    }

    #[test]
    fn test_unsorted_steps_rejected() {
        let yaml = r#"
schema_version: "1.0"
peripheral: spi0
limits:
  max_ticks: 100
steps:
  - at: 10
    reset: null
  - at: 5
    reset: null
"#;
        let script: StimulusScript = serde_yaml::from_str(yaml).unwrap();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("scheduled before"));
    }

    #[test]
    fn test_one_bus_access_per_tick() {
        let yaml = r#"
schema_version: "1.0"
peripheral: spi0
limits:
  max_ticks: 100
steps:
  - at: 3
    write: { offset: 0x8, value: 1 }
  - at: 3
    drive: { pin: miso, value: 1 }
  - at: 3
    read: { offset: 0x4 }
"#;
        let script: StimulusScript = serde_yaml::from_str(yaml).unwrap();
        let err = script.validate().unwrap_err();
        assert!(err.to_string().contains("second bus access"));
    }
}
