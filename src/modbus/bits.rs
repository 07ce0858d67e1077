// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Logical M-bit addressing and bit reads
//!
//! Mitsubishi FX5U PLCs expose the M device area at a fixed offset in the
//! Modbus coil table (M0 = coil 8192 in the default mapping). All
//! configuration uses logical M-bit numbers; this module translates them to
//! physical addresses and hides the coil/discrete-input split between PLC
//! firmwares.

use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::modbus::client::{ReadError, RegisterClient};

/// Which Modbus table the M bits live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BitReadMethod {
    /// Function code 1, the usual FX5U mapping.
    #[default]
    Coils,
    /// Function code 2, used by firmwares that mirror M bits as inputs.
    DiscreteInputs,
    /// Try coils first, fall back to discrete inputs.
    Auto,
}

#[derive(Debug, Clone, Copy)]
enum BitTable {
    Coils,
    DiscreteInputs,
}

impl fmt::Display for BitTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitTable::Coils => write!(f, "coils"),
            BitTable::DiscreteInputs => write!(f, "discrete inputs"),
        }
    }
}

/// Translates logical M-bit numbers into physical Modbus addresses and reads
/// them with the configured method.
///
/// Bit reads never fail hard: every error path logs and yields `None`, and
/// the caller decides the defaulting policy.
#[derive(Debug, Clone, Copy)]
pub struct BitAddressMapper {
    offset: u16,
    method: BitReadMethod,
}

impl BitAddressMapper {
    pub fn new(offset: u16, method: BitReadMethod) -> Self {
        Self { offset, method }
    }

    /// Physical Modbus address for a logical M-bit number.
    pub fn resolve(&self, bit: u16) -> u16 {
        bit.saturating_add(self.offset)
    }

    /// Read one M bit with the configured method.
    pub async fn read_bit(
        &self,
        client: &mut RegisterClient,
        name: &str,
        bit: u16,
    ) -> Option<bool> {
        let addr = self.resolve(bit);
        match self.method {
            BitReadMethod::Coils => self.read_from(client, name, bit, addr, BitTable::Coils).await,
            BitReadMethod::DiscreteInputs => {
                self.read_from(client, name, bit, addr, BitTable::DiscreteInputs)
                    .await
            }
            BitReadMethod::Auto => {
                match self.read_from(client, name, bit, addr, BitTable::Coils).await {
                    Some(value) => Some(value),
                    None => {
                        debug!("Coil read of {} failed, retrying as discrete input", name);
                        self.read_from(client, name, bit, addr, BitTable::DiscreteInputs)
                            .await
                    }
                }
            }
        }
    }

    /// Read a safety-critical M bit, always trying both tables.
    ///
    /// Unlike [`read_bit`](Self::read_bit), a fixed read method only decides
    /// which table is tried first. The first successful read wins. Used for
    /// the cycle-ok bit, where a spurious `None` from a firmware quirk would
    /// drop a produced part.
    pub async fn read_critical_bit(
        &self,
        client: &mut RegisterClient,
        name: &str,
        bit: u16,
    ) -> Option<bool> {
        let addr = self.resolve(bit);
        let order = match self.method {
            BitReadMethod::DiscreteInputs => [BitTable::DiscreteInputs, BitTable::Coils],
            BitReadMethod::Coils | BitReadMethod::Auto => {
                [BitTable::Coils, BitTable::DiscreteInputs]
            }
        };
        for table in order {
            if let Some(value) = self.read_from(client, name, bit, addr, table).await {
                return Some(value);
            }
        }
        warn!("Both read methods failed for {} (M{})", name, bit);
        None
    }

    async fn read_from(
        &self,
        client: &mut RegisterClient,
        name: &str,
        bit: u16,
        addr: u16,
        table: BitTable,
    ) -> Option<bool> {
        let result = match table {
            BitTable::Coils => client.read_coils(addr, 1).await,
            BitTable::DiscreteInputs => client.read_discrete_inputs(addr, 1).await,
        };
        match result {
            Ok(values) => match values.first() {
                Some(value) => Some(*value),
                None => {
                    warn!("Empty response reading {} (M{}) from {}", name, bit, table);
                    None
                }
            },
            Err(ReadError::IllegalAddress) => {
                warn!(
                    "Illegal address {} reading {} (M{}) from {}; check the bit address offset ({})",
                    addr, name, bit, table, self.offset
                );
                None
            }
            Err(err) => {
                warn!("Failed to read {} (M{}) from {}: {}", name, bit, table, err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_applies_fx5u_offset() {
        // M221 on an FX5U with the default M0 = 8192 mapping
        let mapper = BitAddressMapper::new(8192, BitReadMethod::Coils);
        assert_eq!(mapper.resolve(221), 8413);
        assert_eq!(mapper.resolve(0), 8192);
    }

    #[test]
    fn resolve_without_offset_is_identity() {
        let mapper = BitAddressMapper::new(0, BitReadMethod::Auto);
        assert_eq!(mapper.resolve(20), 20);
    }

    #[test]
    fn resolve_saturates_instead_of_wrapping() {
        let mapper = BitAddressMapper::new(u16::MAX, BitReadMethod::Coils);
        assert_eq!(mapper.resolve(100), u16::MAX);
    }

    #[test]
    fn read_method_deserializes_from_snake_case() {
        let method: BitReadMethod = serde_yml::from_str("discrete_inputs").unwrap();
        assert_eq!(method, BitReadMethod::DiscreteInputs);
        let method: BitReadMethod = serde_yml::from_str("auto").unwrap();
        assert_eq!(method, BitReadMethod::Auto);
    }
}
