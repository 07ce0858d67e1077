// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Cycle detection and monitor supervision
//!
//! One monitor task per enabled workstation: every scan tick it probes the
//! connection, takes a status snapshot and feeds the cycle-ok bit into an
//! edge detector. A rising edge triggers the full measurement read, record
//! creation and label printing. The supervisor owns the registry of monitor
//! tasks and restarts the dead ones.

pub mod cycle_data;
pub mod device_monitor;
pub mod edge;
pub mod health;
pub mod status;
pub mod supervisor;

pub use cycle_data::{CycleDataReader, CycleReading};
pub use device_monitor::{DeviceMonitor, MonitorHandle};
pub use edge::{Edge, EdgeDetector};
pub use health::{ConnectionHealth, ConnectionStatus, SharedHealth};
pub use status::{CycleStatusReader, StatusSnapshot};
pub use supervisor::MonitorSupervisor;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time;

/// Sleep in small slices so a stop request does not wait out a long backoff.
pub(crate) async fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    const STEP: Duration = Duration::from_millis(200);
    let mut remaining = duration;
    while running.load(Ordering::SeqCst) && remaining > Duration::ZERO {
        let slice = remaining.min(STEP);
        time::sleep(slice).await;
        remaining = remaining.saturating_sub(slice);
    }
}
