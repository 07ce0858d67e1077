// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-workstation monitor task
//!
//! One tokio task per enabled device, cooperatively cancelled through a
//! shared running flag. Each tick: probe the connection, snapshot the status
//! bits, feed cycle-ok into the edge detector, and on a rising edge read the
//! measurements, store the record and print the label.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{debug, error, info, warn};
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{DeviceConfig, MonitoringConfig};
use crate::label::{LabelRequest, LabelSink};
use crate::modbus::RegisterClient;
use crate::monitor::cycle_data::CycleDataReader;
use crate::monitor::edge::{Edge, EdgeDetector};
use crate::monitor::health::{self, ConnectionHealth, ConnectionStatus, SharedHealth};
use crate::monitor::status::CycleStatusReader;
use crate::monitor::sleep_while_running;
use crate::record::RecordStore;

enum TickOutcome {
    Scanned,
    Unreachable,
}

/// The monitor loop state, owned by its task.
pub struct DeviceMonitor {
    device: DeviceConfig,
    timing: MonitoringConfig,
    status_reader: CycleStatusReader,
    data_reader: CycleDataReader,
    store: Arc<dyn RecordStore>,
    printer: Arc<dyn LabelSink>,
    health: SharedHealth,
    running: Arc<AtomicBool>,
    edge: EdgeDetector,
}

/// Supervisor-side handle to a spawned monitor task.
pub struct MonitorHandle {
    device_id: String,
    running: Arc<AtomicBool>,
    health: SharedHealth,
    handle: JoinHandle<Result<()>>,
}

impl MonitorHandle {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Liveness comes straight from the task handle, so a panicked monitor
    /// shows up as dead without any bookkeeping.
    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn signal_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub async fn health(&self) -> ConnectionHealth {
        self.health.read().await.clone()
    }

    /// Wait for the task to finish; abort it if it overstays the timeout.
    pub async fn join(mut self, timeout: Duration) {
        match time::timeout(timeout, &mut self.handle).await {
            Ok(Ok(Ok(()))) => debug!("Monitor for {} exited cleanly", self.device_id),
            Ok(Ok(Err(err))) => {
                error!("Monitor for {} exited with error: {:#}", self.device_id, err)
            }
            Ok(Err(join_err)) => error!("Monitor for {} panicked: {}", self.device_id, join_err),
            Err(_) => {
                warn!(
                    "Monitor for {} did not stop within {:?}, aborting",
                    self.device_id, timeout
                );
                self.handle.abort();
            }
        }
    }
}

impl DeviceMonitor {
    /// Spawn the monitor task for one device and hand back its handle.
    pub fn spawn(
        device: DeviceConfig,
        timing: MonitoringConfig,
        store: Arc<dyn RecordStore>,
        printer: Arc<dyn LabelSink>,
    ) -> MonitorHandle {
        let running = Arc::new(AtomicBool::new(true));
        let health = health::new_shared_health();
        let device_id = device.id.clone();

        let monitor = DeviceMonitor {
            status_reader: CycleStatusReader::new(&device, &timing),
            data_reader: CycleDataReader::new(&device, &timing),
            device,
            timing,
            store,
            printer,
            health: health.clone(),
            running: running.clone(),
            edge: EdgeDetector::new(),
        };
        let handle = tokio::spawn(monitor.run());

        MonitorHandle {
            device_id,
            running,
            health,
            handle,
        }
    }

    async fn run(mut self) -> Result<()> {
        info!(
            "Starting monitor for {} ({}:{}, cycle_ok bit M{})",
            self.device.id,
            self.device.host,
            self.device.port,
            self.device.bits.cycle_ok.unwrap_or_default()
        );

        let mut consecutive_errors: u32 = 0;
        while self.running.load(Ordering::SeqCst) {
            let delay = match self.tick().await {
                Ok(TickOutcome::Scanned) => {
                    consecutive_errors = 0;
                    self.timing.scan_interval()
                }
                Ok(TickOutcome::Unreachable) => {
                    consecutive_errors += 1;
                    self.timing.retry_delay()
                }
                Err(err) => {
                    error!("Monitor tick failed on {}: {:#}", self.device.id, err);
                    self.set_status(ConnectionStatus::Error).await;
                    consecutive_errors += 1;
                    self.timing.retry_delay()
                }
            };

            let delay = if consecutive_errors >= self.timing.max_consecutive_errors {
                warn!(
                    "{} consecutive errors on {}, backing off for {:?}",
                    consecutive_errors,
                    self.device.id,
                    self.timing.error_backoff()
                );
                consecutive_errors = 0;
                self.timing.error_backoff()
            } else {
                delay
            };
            sleep_while_running(&self.running, delay).await;
        }

        info!("Monitor for {} stopped", self.device.id);
        Ok(())
    }

    async fn tick(&mut self) -> Result<TickOutcome> {
        // The probe drives the health status even when no cycle is running
        let mut client = RegisterClient::from_device(&self.device);
        if !client.probe().await {
            debug!("{} is unreachable", self.device.id);
            self.set_status(ConnectionStatus::Disconnected).await;
            return Ok(TickOutcome::Unreachable);
        }

        let Some(snapshot) = self.status_reader.snapshot(&self.device).await else {
            // Reachable a moment ago, gone now
            anyhow::bail!("status snapshot connection failed");
        };
        self.mark_connected().await;

        match self.edge.observe(snapshot.cycle_ok) {
            Edge::Initialized => info!(
                "Trigger state initialized on {} (cycle_ok={})",
                self.device.id, snapshot.cycle_ok
            ),
            Edge::Rising => self.handle_cycle_detected().await?,
            Edge::Falling => debug!("cycle_ok cleared on {}", self.device.id),
            Edge::Steady => {}
        }

        Ok(TickOutcome::Scanned)
    }

    /// Rising edge: read the measurements once, store the record, print the
    /// label. Printing is best-effort and never fails the cycle.
    async fn handle_cycle_detected(&self) -> Result<()> {
        info!("Cycle complete detected on {}", self.device.id);

        let Some(reading) = self.data_reader.read_cycle(&self.device).await else {
            anyhow::bail!("cycle data read could not reach the device");
        };
        let record = self
            .store
            .create_cycle(&self.device.id, &reading)
            .await
            .with_context(|| format!("failed to store cycle for {}", self.device.id))?;
        info!(
            "Created {} on {} with identifier {}",
            record.cycle_number, self.device.id, record.identifier
        );

        if self.device.printer.enabled {
            let label = LabelRequest::from_record(&record);
            if !self.printer.print(&self.device.printer, &label).await {
                warn!("Label for {} was not printed", record.cycle_number);
            }
        } else {
            debug!("Label printing disabled on {}", self.device.id);
        }
        Ok(())
    }

    async fn set_status(&self, status: ConnectionStatus) {
        let mut health = self.health.write().await;
        if health.status != status {
            info!(
                "Connection status of {} changed: {:?} -> {:?}",
                self.device.id, health.status, status
            );
        }
        health.status = status;
        if status != ConnectionStatus::Connected {
            health.consecutive_errors = health.consecutive_errors.saturating_add(1);
        }
    }

    async fn mark_connected(&self) {
        let mut health = self.health.write().await;
        if health.status != ConnectionStatus::Connected {
            info!("Connection status of {} changed: {:?} -> Connected", self.device.id, health.status);
        }
        health.status = ConnectionStatus::Connected;
        health.last_success_at = Some(Utc::now());
        health.consecutive_errors = 0;
    }
}
