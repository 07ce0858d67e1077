// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! 32-character QR identifier derivation
//!
//! Layout: `part_no + revision + vendor_code + MMYY + serial(6)`. The line-side
//! scanners expect exactly 32 characters, so an overlong part number is
//! truncated from the right and a short identifier is padded with `'0'`.

use chrono::{DateTime, Utc};

pub const IDENTIFIER_LEN: usize = 32;
const DATE_LEN: usize = 4;
const SERIAL_LEN: usize = 6;

/// Build the identifier from its parts.
///
/// `mfg_date` must already be in MMYY form and `serial_no` zero-padded to six
/// characters, see [`mfg_date`] and [`format_serial`].
pub fn derive_identifier(
    part_no: &str,
    revision: &str,
    vendor_code: &str,
    mfg_date: &str,
    serial_no: &str,
) -> String {
    let fixed = revision.chars().count() + vendor_code.chars().count() + DATE_LEN + SERIAL_LEN;
    let max_part = IDENTIFIER_LEN.saturating_sub(fixed);

    let mut identifier: String = part_no.chars().take(max_part).collect();
    identifier.push_str(revision);
    identifier.push_str(vendor_code);
    identifier.push_str(mfg_date);
    identifier.push_str(serial_no);

    // Oversized revision/vendor fields can still push past the limit
    if identifier.chars().count() > IDENTIFIER_LEN {
        identifier = identifier.chars().take(IDENTIFIER_LEN).collect();
    }
    while identifier.chars().count() < IDENTIFIER_LEN {
        identifier.push('0');
    }
    identifier
}

/// Manufacturing date in MMYY form.
pub fn mfg_date(now: DateTime<Utc>) -> String {
    now.format("%m%y").to_string()
}

/// Six-digit zero-padded serial. Counters past 999999 wrap around.
pub fn format_serial(serial: u64) -> String {
    format!("{:06}", serial % 1_000_000)
}
