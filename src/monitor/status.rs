// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-tick status snapshot
//!
//! One connection per snapshot, cycle-ok read first: if the PLC drops the
//! connection halfway through the batch, the trigger bit is already safe and
//! only informational bits are lost. A failed bit read defaults to `false`
//! and is logged where it happens.

use std::time::Duration;

use tokio::time;

use crate::config::{DeviceConfig, MonitoringConfig};
use crate::modbus::{BitAddressMapper, RegisterClient};

/// Immutable result of one status scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub part_presence: bool,
    pub variant_selector: bool,
    pub cycle_start: bool,
    pub cycle_complete: bool,
    pub cycle_ok: bool,
    pub cycle_nok: bool,
}

pub struct CycleStatusReader {
    mapper: BitAddressMapper,
    cycle_ok_delay: Duration,
    bit_delay: Duration,
}

impl CycleStatusReader {
    pub fn new(device: &DeviceConfig, timing: &MonitoringConfig) -> Self {
        Self {
            mapper: BitAddressMapper::new(device.bit_offset, device.bit_read_method),
            cycle_ok_delay: timing.cycle_ok_read_delay(),
            bit_delay: timing.bit_read_delay(),
        }
    }

    /// Take one snapshot. `None` means the device could not be reached; the
    /// connection is closed before returning in every case.
    pub async fn snapshot(&self, device: &DeviceConfig) -> Option<StatusSnapshot> {
        let mut client = RegisterClient::from_device(device);
        if !client.connect().await {
            return None;
        }
        let snapshot = self.read_bits(device, &mut client).await;
        client.close().await;
        Some(snapshot)
    }

    async fn read_bits(
        &self,
        device: &DeviceConfig,
        client: &mut RegisterClient,
    ) -> StatusSnapshot {
        let mut snapshot = StatusSnapshot::default();

        // The trigger bit comes first and gets the dual-method treatment
        if let Some(bit) = device.bits.cycle_ok {
            time::sleep(self.cycle_ok_delay).await;
            snapshot.cycle_ok = self
                .mapper
                .read_critical_bit(client, "cycle_ok", bit)
                .await
                .unwrap_or(false);
        }

        let bits = &device.bits;
        snapshot.part_presence = self
            .optional_bit(client, "part_presence", bits.part_presence)
            .await;
        snapshot.variant_selector = self
            .optional_bit(client, "variant_selector", bits.variant_selector)
            .await;
        snapshot.cycle_start = self
            .optional_bit(client, "cycle_start", bits.cycle_start)
            .await;
        snapshot.cycle_complete = self
            .optional_bit(client, "cycle_complete", bits.cycle_complete)
            .await;
        snapshot.cycle_nok = self.optional_bit(client, "cycle_nok", bits.cycle_nok).await;

        snapshot
    }

    /// Unconfigured and unreadable bits both scan as `false`.
    async fn optional_bit(
        &self,
        client: &mut RegisterClient,
        name: &str,
        bit: Option<u16>,
    ) -> bool {
        let Some(bit) = bit else {
            return false;
        };
        time::sleep(self.bit_delay).await;
        self.mapper
            .read_bit(client, name, bit)
            .await
            .unwrap_or(false)
    }
}
