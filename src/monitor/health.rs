// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared connection health, written by the monitor task and read by the
//! supervisor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    /// Reachable but reads are failing
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionHealth {
    pub status: ConnectionStatus,
    /// Last time a full tick completed against this device
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_errors: u32,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_success_at: None,
            consecutive_errors: 0,
        }
    }
}

pub type SharedHealth = Arc<RwLock<ConnectionHealth>>;

pub fn new_shared_health() -> SharedHealth {
    Arc::new(RwLock::new(ConnectionHealth::default()))
}
