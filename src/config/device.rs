// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-workstation configuration
//!
//! One `DeviceConfig` per PLC workstation: the Modbus endpoint, the logical
//! M-bit numbers, the measurement register map, the AT/MT part profiles and
//! the label printer. All bit numbers are logical M numbers; the physical
//! address is `bit + bit_offset`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::modbus::BitReadMethod;

/// Product variant selected by the line sensor bit (ON = AT, OFF = MT).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    At,
    Mt,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::At => write!(f, "AT"),
            Variant::Mt => write!(f, "MT"),
        }
    }
}

/// Logical M-bit numbers of the monitored signals. Only `cycle_ok` is
/// mandatory for monitoring; everything else is informational.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BitMap {
    #[serde(default)]
    pub part_presence: Option<u16>,
    /// AT/MT sensor bit, read once per detected cycle
    #[serde(default)]
    pub variant_selector: Option<u16>,
    #[serde(default)]
    pub cycle_start: Option<u16>,
    #[serde(default)]
    pub cycle_complete: Option<u16>,
    /// The trigger: a rising edge here means a good part left the station
    #[serde(default)]
    pub cycle_ok: Option<u16>,
    #[serde(default)]
    pub cycle_nok: Option<u16>,
}

/// How the raw register words become an engineering value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegisterDecode {
    /// One register, value taken as-is (the clutch line convention)
    #[default]
    U16,
    /// Two registers, IEEE 754 single precision, high word first
    F32BigEndian,
}

/// One measurement register: D-register address plus decode strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterSpec {
    pub address: u16,
    #[serde(default)]
    pub decode: RegisterDecode,
}

/// D-register addresses of the cycle measurements. Unconfigured fields are
/// recorded as 0.0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterMap {
    #[serde(default)]
    pub torque: Option<RegisterSpec>,
    #[serde(default)]
    pub initial_position: Option<RegisterSpec>,
    #[serde(default)]
    pub final_position: Option<RegisterSpec>,
    #[serde(default)]
    pub load_cell: Option<RegisterSpec>,
    #[serde(default)]
    pub cycle_time: Option<RegisterSpec>,
}

/// Part data used for the QR identifier and the label, per variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantProfile {
    #[serde(default)]
    pub part_name: Option<String>,
    #[serde(default)]
    pub part_no: Option<String>,
    #[serde(default)]
    pub revision: Option<String>,
    #[serde(default)]
    pub vendor_code: Option<String>,
}

/// AT and MT profiles plus the shared fallback values used when a
/// variant-specific field is empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantTable {
    #[serde(default)]
    pub at: VariantProfile,
    #[serde(default)]
    pub mt: VariantProfile,
    #[serde(default)]
    pub fallback: VariantProfile,
}

/// Fully resolved part profile, no optional fields left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub part_name: String,
    pub part_no: String,
    pub revision: String,
    pub vendor_code: String,
}

/// Zebra label printer attached to the workstation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    /// Zebra raw printing port
    #[serde(default = "default_printer_port")]
    pub port: u16,
    #[serde(default = "default_printer_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_printer_port() -> u16 {
    9100
}

fn default_printer_timeout_ms() -> u64 {
    5000
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            port: default_printer_port(),
            timeout_ms: default_printer_timeout_ms(),
        }
    }
}

/// One PLC workstation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Stable identifier used as the supervisor registry key
    pub id: String,
    /// Human readable station name for logs and labels
    pub name: String,
    pub host: String,
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    /// Per-call Modbus timeout (ms)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// M0 position in the Modbus coil table (8192 on the FX5U)
    #[serde(default = "default_bit_offset")]
    pub bit_offset: u16,
    #[serde(default)]
    pub bit_read_method: BitReadMethod,
    #[serde(default)]
    pub bits: BitMap,
    #[serde(default)]
    pub registers: RegisterMap,
    #[serde(default)]
    pub variants: VariantTable,
    #[serde(default)]
    pub printer: PrinterConfig,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_unit_id() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_enabled() -> bool {
    true
}

fn default_bit_offset() -> u16 {
    8192
}

fn pick(primary: &Option<String>, fallback: &Option<String>) -> Option<String> {
    primary
        .as_deref()
        .filter(|s| !s.is_empty())
        .or_else(|| fallback.as_deref().filter(|s| !s.is_empty()))
        .map(str::to_string)
}

impl DeviceConfig {
    /// Resolve the part profile for a variant.
    ///
    /// Every field falls back to the shared values, and the part name finally
    /// to a built-in placeholder, so the identifier derivation always has
    /// something to work with.
    pub fn resolve_variant(&self, variant: Variant) -> ResolvedProfile {
        let (profile, placeholder) = match variant {
            Variant::At => (&self.variants.at, "BRAKE-AT"),
            Variant::Mt => (&self.variants.mt, "BRAKE-MT"),
        };
        let fallback = &self.variants.fallback;
        ResolvedProfile {
            part_name: pick(&profile.part_name, &fallback.part_name)
                .unwrap_or_else(|| placeholder.to_string()),
            part_no: pick(&profile.part_no, &fallback.part_no).unwrap_or_default(),
            revision: pick(&profile.revision, &fallback.revision).unwrap_or_default(),
            vendor_code: pick(&profile.vendor_code, &fallback.vendor_code).unwrap_or_default(),
        }
    }
}
