// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Daemon task wiring
//!
//! Owns the supervisor, the record store and the long-lived background
//! tasks: the reconciliation loop that restarts dead monitors and a
//! heartbeat that logs system status.

use anyhow::Result;
use log::{debug, info};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::Config;
use crate::label::ZplNetworkPrinter;
use crate::monitor::{sleep_while_running, MonitorSupervisor};
use crate::record::InMemoryRecordStore;

/// Represents the daemon with its managed background tasks
pub struct Daemon {
    tasks: Vec<JoinHandle<Result<()>>>,
    running: Arc<AtomicBool>,
    supervisor: Option<Arc<MonitorSupervisor>>,
    store: Arc<InMemoryRecordStore>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon instance
    pub fn new() -> Self {
        Daemon {
            tasks: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            supervisor: None,
            store: Arc::new(InMemoryRecordStore::new()),
        }
    }

    /// The in-process record store, for scan verification and diagnostics.
    pub fn record_store(&self) -> Arc<InMemoryRecordStore> {
        self.store.clone()
    }

    /// The monitor supervisor, available once launched.
    pub fn supervisor(&self) -> Option<Arc<MonitorSupervisor>> {
        self.supervisor.clone()
    }

    /// Launch all configured tasks based on configuration
    pub async fn launch(&mut self, config: &Config) -> Result<()> {
        let supervisor = Arc::new(MonitorSupervisor::new(
            config.monitoring.clone(),
            self.store.clone(),
            Arc::new(ZplNetworkPrinter::new()),
        ));

        let enabled = config.devices.iter().filter(|d| d.enabled).count();
        info!(
            "Launching monitors for {} enabled device(s) ({} configured)",
            enabled,
            config.devices.len()
        );
        supervisor.reconcile_all(&config.devices).await;
        self.supervisor = Some(supervisor.clone());

        self.start_reconciliation(supervisor.clone(), config);
        self.start_heartbeat(supervisor);

        Ok(())
    }

    /// Periodically restart dead monitors; stop everything on shutdown.
    fn start_reconciliation(&mut self, supervisor: Arc<MonitorSupervisor>, config: &Config) {
        let running = self.running.clone();
        let devices = config.devices.clone();
        let interval = config.monitoring.reconcile_interval();

        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                sleep_while_running(&running, interval).await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                debug!("Reconciliation pass");
                supervisor.reconcile_all(&devices).await;
            }
            supervisor.stop_all().await;
            Ok(())
        });
        self.tasks.push(task);
    }

    /// Start a heartbeat task that logs system status periodically
    fn start_heartbeat(&mut self, supervisor: Arc<MonitorSupervisor>) {
        debug!("Starting heartbeat monitor");

        let running = self.running.clone();
        let store = self.store.clone();
        let task = tokio::spawn(async move {
            while running.load(Ordering::SeqCst) {
                debug!(
                    "Daemon heartbeat: {} monitor(s) running, {} cycle(s) recorded",
                    supervisor.running_count().await,
                    store.len()
                );
                sleep_while_running(&running, Duration::from_secs(60)).await;
            }
            Ok(())
        });
        self.tasks.push(task);
    }

    /// Stop all running tasks
    pub fn shutdown(&self) {
        info!("Shutting down daemon tasks");
        self.running.store(false, Ordering::SeqCst);
        // Tasks check the running flag and terminate gracefully
    }

    /// Wait for all tasks to complete
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            match time::timeout(Duration::from_secs(30), task).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(err))) => log::error!("Task finished with error: {:#}", err),
                Ok(Err(join_err)) => log::error!("Task panicked: {}", join_err),
                Err(_) => log::error!("Task did not finish in time"),
            }
        }
        Ok(())
    }
}
