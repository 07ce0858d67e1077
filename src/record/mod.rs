// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Cycle records and the record store seam
//!
//! The store is the integration point a real ERP backend would implement.
//! The in-memory implementation owns the two sequences (cycle numbers and
//! label serials), derives the QR identifier at create time and remembers the
//! last identifier for scan verification at the packing station.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;

use crate::identifier;
use crate::monitor::CycleReading;

/// One persisted production cycle.
#[derive(Debug, Clone)]
pub struct CycleRecord {
    pub sequence: u64,
    /// Human readable cycle number, `CYC` + zero-padded sequence
    pub cycle_number: String,
    pub device_id: String,
    /// The 32-character QR payload
    pub identifier: String,
    pub serial_no: String,
    /// MMYY manufacturing date baked into the identifier
    pub mfg_date: String,
    pub reading: CycleReading,
    pub created_at: DateTime<Utc>,
}

/// Outcome of comparing a scanned QR payload with the last produced part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanResult {
    Matched,
    NotFound,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist one cycle, assigning its sequence, serial and identifier.
    async fn create_cycle(&self, device_id: &str, reading: &CycleReading) -> Result<CycleRecord>;

    /// Identifier of the most recently created record, if any.
    async fn last_identifier(&self) -> Option<String>;

    /// Verify a scanned QR payload against the most recent identifier.
    /// Surrounding whitespace is ignored, the comparison is case-sensitive.
    async fn verify_scan(&self, scanned: &str) -> ScanResult {
        let scanned = scanned.trim();
        match self.last_identifier().await {
            Some(ref last) if last == scanned => ScanResult::Matched,
            _ => ScanResult::NotFound,
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    next_sequence: u64,
    next_serial: u64,
    records: Vec<CycleRecord>,
}

/// In-process record store. Writes are serialized by the inner mutex.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, oldest first. Mainly for tests and the
    /// heartbeat log.
    pub fn records(&self) -> Vec<CycleRecord> {
        self.inner.lock().unwrap().records.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_cycle(&self, device_id: &str, reading: &CycleReading) -> Result<CycleRecord> {
        let now = Utc::now();
        let mfg_date = identifier::mfg_date(now);

        let mut inner = self.inner.lock().unwrap();
        inner.next_sequence += 1;
        inner.next_serial += 1;
        let sequence = inner.next_sequence;
        let serial_no = identifier::format_serial(inner.next_serial);

        let profile = &reading.profile;
        let qr = identifier::derive_identifier(
            &profile.part_no,
            &profile.revision,
            &profile.vendor_code,
            &mfg_date,
            &serial_no,
        );

        let record = CycleRecord {
            sequence,
            cycle_number: format!("CYC{:06}", sequence),
            device_id: device_id.to_string(),
            identifier: qr,
            serial_no,
            mfg_date,
            reading: reading.clone(),
            created_at: now,
        };
        inner.records.push(record.clone());
        info!(
            "Stored cycle {} for {} (identifier {})",
            record.cycle_number, device_id, record.identifier
        );
        Ok(record)
    }

    async fn last_identifier(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .records
            .last()
            .map(|record| record.identifier.clone())
    }
}
