// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Monitor registry and self-healing
//!
//! The supervisor owns the map from device id to monitor handle. Nothing
//! here is global: callers hold the supervisor in an `Arc` and the daemon
//! wires it up at launch. `start` is idempotent for a live monitor and
//! replaces a dead one; `reconcile_all` runs that logic for every enabled
//! device on a timer.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, error, info};
use tokio::sync::Mutex;

use crate::config::{DeviceConfig, MonitoringConfig};
use crate::label::LabelSink;
use crate::monitor::device_monitor::{DeviceMonitor, MonitorHandle};
use crate::monitor::health::ConnectionHealth;
use crate::record::RecordStore;

pub struct MonitorSupervisor {
    timing: MonitoringConfig,
    store: Arc<dyn RecordStore>,
    printer: Arc<dyn LabelSink>,
    monitors: Mutex<HashMap<String, MonitorHandle>>,
}

impl MonitorSupervisor {
    pub fn new(
        timing: MonitoringConfig,
        store: Arc<dyn RecordStore>,
        printer: Arc<dyn LabelSink>,
    ) -> Self {
        Self {
            timing,
            store,
            printer,
            monitors: Mutex::new(HashMap::new()),
        }
    }

    /// Start monitoring a device.
    ///
    /// A live monitor makes this a no-op; a dead one (panicked or errored
    /// out) is replaced with a fresh task, which also resets its trigger
    /// state to uninitialized.
    pub async fn start(&self, device: &DeviceConfig) -> Result<()> {
        if device.bits.cycle_ok.is_none() {
            anyhow::bail!(
                "refusing to monitor {}: no cycle_ok bit configured",
                device.id
            );
        }

        let mut monitors = self.monitors.lock().await;
        if let Some(existing) = monitors.get(&device.id) {
            if existing.is_alive() {
                debug!("Monitor for {} is already running", device.id);
                return Ok(());
            }
            info!("Monitor for {} is dead, restarting it", device.id);
            monitors.remove(&device.id);
        }

        let handle = DeviceMonitor::spawn(
            device.clone(),
            self.timing.clone(),
            self.store.clone(),
            self.printer.clone(),
        );
        monitors.insert(device.id.clone(), handle);
        Ok(())
    }

    /// Stop one monitor: signal the flag, then join with the configured
    /// timeout.
    pub async fn stop(&self, device_id: &str) -> Result<()> {
        let handle = self
            .monitors
            .lock()
            .await
            .remove(device_id)
            .ok_or_else(|| anyhow::anyhow!("no monitor registered for {}", device_id))?;
        info!("Stopping monitor for {}", device_id);
        handle.signal_stop();
        handle.join(self.timing.stop_timeout()).await;
        Ok(())
    }

    /// Stop every registered monitor.
    pub async fn stop_all(&self) {
        let handles: Vec<MonitorHandle> = {
            let mut monitors = self.monitors.lock().await;
            monitors.drain().map(|(_, handle)| handle).collect()
        };
        if handles.is_empty() {
            return;
        }
        info!("Stopping {} monitor(s)", handles.len());
        for handle in &handles {
            handle.signal_stop();
        }
        for handle in handles {
            handle.join(self.timing.stop_timeout()).await;
        }
    }

    /// One supervision pass: (re)start every enabled device. Startup and the
    /// periodic self-healing timer both land here.
    pub async fn reconcile_all(&self, devices: &[DeviceConfig]) {
        for device in devices.iter().filter(|d| d.enabled) {
            if let Err(err) = self.start(device).await {
                error!("Cannot start monitor for {}: {:#}", device.id, err);
            }
        }
    }

    pub async fn is_running(&self, device_id: &str) -> bool {
        self.monitors
            .lock()
            .await
            .get(device_id)
            .map(|handle| handle.is_alive())
            .unwrap_or(false)
    }

    pub async fn health(&self, device_id: &str) -> Option<ConnectionHealth> {
        let monitors = self.monitors.lock().await;
        match monitors.get(device_id) {
            Some(handle) => Some(handle.health().await),
            None => None,
        }
    }

    /// Number of live monitor tasks.
    pub async fn running_count(&self) -> usize {
        self.monitors
            .lock()
            .await
            .values()
            .filter(|handle| handle.is_alive())
            .count()
    }
}
