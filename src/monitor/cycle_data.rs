// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Full measurement read after a detected cycle
//!
//! Runs exactly once per rising edge: open one connection, read the AT/MT
//! sensor bit, then every configured measurement register. Per-field failures
//! degrade to 0.0 so a flaky load cell register never loses the cycle record;
//! only a failed connect aborts the read.

use std::time::Duration;

use log::{info, warn};
use tokio::time;

use crate::config::{DeviceConfig, MonitoringConfig, RegisterDecode, RegisterSpec, ResolvedProfile, Variant};
use crate::modbus::{BitAddressMapper, RegisterClient};

/// Everything read from the PLC for one completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReading {
    pub variant: Variant,
    pub profile: ResolvedProfile,
    pub torque: f64,
    pub initial_position: f64,
    pub final_position: f64,
    pub load_cell: f64,
    pub cycle_time: f64,
}

pub struct CycleDataReader {
    mapper: BitAddressMapper,
    settle_delay: Duration,
    register_delay: Duration,
}

impl CycleDataReader {
    pub fn new(device: &DeviceConfig, timing: &MonitoringConfig) -> Self {
        Self {
            mapper: BitAddressMapper::new(device.bit_offset, device.bit_read_method),
            settle_delay: timing.cycle_ok_read_delay(),
            register_delay: timing.register_read_delay(),
        }
    }

    /// Read the variant bit and all configured registers over one connection.
    ///
    /// `None` means the device could not be reached and no record should be
    /// created. The connection is closed on every exit path.
    pub async fn read_cycle(&self, device: &DeviceConfig) -> Option<CycleReading> {
        let mut client = RegisterClient::from_device(device);
        if !client.connect().await {
            warn!("Cannot connect to {} for the cycle data read", device.id);
            return None;
        }
        time::sleep(self.settle_delay).await;

        let variant = self.read_variant(device, &mut client).await;
        let profile = device.resolve_variant(variant);
        info!(
            "Detected variant {} on {} (part_no: {})",
            variant, device.id, profile.part_no
        );

        let registers = &device.registers;
        let reading = CycleReading {
            variant,
            profile,
            torque: self.read_register(&mut client, "torque", &registers.torque).await,
            initial_position: self
                .read_register(&mut client, "initial_position", &registers.initial_position)
                .await,
            final_position: self
                .read_register(&mut client, "final_position", &registers.final_position)
                .await,
            load_cell: self
                .read_register(&mut client, "load_cell", &registers.load_cell)
                .await,
            cycle_time: self
                .read_register(&mut client, "cycle_time", &registers.cycle_time)
                .await,
        };

        client.close().await;
        Some(reading)
    }

    /// AT/MT sensor bit: ON = AT, OFF or unreadable or unconfigured = MT.
    async fn read_variant(&self, device: &DeviceConfig, client: &mut RegisterClient) -> Variant {
        let Some(bit) = device.bits.variant_selector else {
            warn!(
                "No variant_selector bit configured on {}, defaulting to MT",
                device.id
            );
            return Variant::Mt;
        };
        match self.mapper.read_bit(client, "variant_selector", bit).await {
            Some(true) => Variant::At,
            Some(false) => Variant::Mt,
            None => {
                warn!(
                    "Unable to read variant_selector (M{}) on {}, defaulting to MT",
                    bit, device.id
                );
                Variant::Mt
            }
        }
    }

    /// One measurement. Unconfigured, unreadable and short responses all
    /// yield 0.0.
    async fn read_register(
        &self,
        client: &mut RegisterClient,
        name: &str,
        spec: &Option<RegisterSpec>,
    ) -> f64 {
        let Some(spec) = spec else {
            return 0.0;
        };
        time::sleep(self.register_delay).await;
        match spec.decode {
            RegisterDecode::U16 => match client.read_holding_registers(spec.address, 1).await {
                Ok(regs) if !regs.is_empty() => f64::from(regs[0]),
                Ok(_) => {
                    warn!("Empty response reading {} from D{}", name, spec.address);
                    0.0
                }
                Err(err) => {
                    warn!("Failed to read {} from D{}: {}", name, spec.address, err);
                    0.0
                }
            },
            RegisterDecode::F32BigEndian => {
                match client.read_holding_registers(spec.address, 2).await {
                    Ok(regs) if regs.len() >= 2 => {
                        f64::from(decode_f32_big_endian(regs[0], regs[1]))
                    }
                    Ok(_) => {
                        warn!("Short response reading {} from D{}", name, spec.address);
                        0.0
                    }
                    Err(err) => {
                        warn!("Failed to read {} from D{}: {}", name, spec.address, err);
                        0.0
                    }
                }
            }
        }
    }
}

/// IEEE 754 single precision spread over two registers, high word first.
fn decode_f32_big_endian(high: u16, low: u16) -> f32 {
    f32::from_bits((u32::from(high) << 16) | u32::from(low))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_big_endian_float_pairs() {
        // 12.5f32 = 0x41480000
        assert_eq!(decode_f32_big_endian(0x4148, 0x0000), 12.5);
        assert_eq!(decode_f32_big_endian(0x0000, 0x0000), 0.0);
        // -1.0f32 = 0xBF800000
        assert_eq!(decode_f32_big_endian(0xBF80, 0x0000), -1.0);
    }
}
