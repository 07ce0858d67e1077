// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Timing and supervision settings shared by all device monitors

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Monitor loop timing.
///
/// The defaults mirror the timings the PLC side was commissioned with: a one
/// second scan, a five second retry on an unreachable PLC and a doubled
/// backoff after ten consecutive errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Delay between two status scans of a healthy device (ms)
    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,
    /// Delay before retrying an unreachable or failing device (ms)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Consecutive errors before the monitor backs off
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// Settle delay after connecting, before the cycle-ok read (ms)
    #[serde(default = "default_cycle_ok_read_delay_ms")]
    pub cycle_ok_read_delay_ms: u64,
    /// Delay between consecutive status bit reads (ms)
    #[serde(default = "default_bit_read_delay_ms")]
    pub bit_read_delay_ms: u64,
    /// Delay between consecutive measurement register reads (ms)
    #[serde(default = "default_register_read_delay_ms")]
    pub register_read_delay_ms: u64,
    /// Interval of the supervisor pass that restarts dead monitors (s)
    #[serde(default = "default_reconcile_interval_s")]
    pub reconcile_interval_s: u64,
    /// How long to wait for a monitor task to stop before aborting it (s)
    #[serde(default = "default_stop_timeout_s")]
    pub stop_timeout_s: u64,
}

fn default_scan_interval_ms() -> u64 {
    1000
}

fn default_retry_delay_ms() -> u64 {
    5000
}

fn default_max_consecutive_errors() -> u32 {
    10
}

fn default_cycle_ok_read_delay_ms() -> u64 {
    50
}

fn default_bit_read_delay_ms() -> u64 {
    100
}

fn default_register_read_delay_ms() -> u64 {
    20
}

fn default_reconcile_interval_s() -> u64 {
    60
}

fn default_stop_timeout_s() -> u64 {
    5
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: default_scan_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_consecutive_errors: default_max_consecutive_errors(),
            cycle_ok_read_delay_ms: default_cycle_ok_read_delay_ms(),
            bit_read_delay_ms: default_bit_read_delay_ms(),
            register_read_delay_ms: default_register_read_delay_ms(),
            reconcile_interval_s: default_reconcile_interval_s(),
            stop_timeout_s: default_stop_timeout_s(),
        }
    }
}

impl MonitoringConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Backoff applied after `max_consecutive_errors` failures in a row.
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.saturating_mul(2))
    }

    pub fn cycle_ok_read_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_ok_read_delay_ms)
    }

    pub fn bit_read_delay(&self) -> Duration {
        Duration::from_millis(self.bit_read_delay_ms)
    }

    pub fn register_read_delay(&self) -> Duration {
        Duration::from_millis(self.register_read_delay_ms)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_s)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_s)
    }
}
