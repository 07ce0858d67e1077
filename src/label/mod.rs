// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! QR label printing
//!
//! Printing is best-effort by contract: a failed label never rolls back a
//! cycle record, so the sink reports a plain `bool` and logs the details.

pub mod zpl;

pub use zpl::ZplNetworkPrinter;

use async_trait::async_trait;

use crate::config::PrinterConfig;
use crate::record::CycleRecord;

/// The fields printed on one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRequest {
    /// QR payload, the 32-character identifier
    pub qr_payload: String,
    pub part_no: String,
    pub revision: String,
    pub vendor_code: String,
    pub mfg_date: String,
    pub serial_no: String,
    pub part_description: String,
}

impl LabelRequest {
    pub fn from_record(record: &CycleRecord) -> Self {
        let profile = &record.reading.profile;
        Self {
            qr_payload: record.identifier.clone(),
            part_no: profile.part_no.clone(),
            revision: profile.revision.clone(),
            vendor_code: profile.vendor_code.clone(),
            mfg_date: record.mfg_date.clone(),
            serial_no: record.serial_no.clone(),
            part_description: profile.part_name.clone(),
        }
    }
}

/// Where labels go. One sink instance serves all devices; the target printer
/// comes with each call.
#[async_trait]
pub trait LabelSink: Send + Sync {
    /// Returns `true` when the label was delivered. Failures are logged by
    /// the implementation.
    async fn print(&self, printer: &PrinterConfig, label: &LabelRequest) -> bool;
}
