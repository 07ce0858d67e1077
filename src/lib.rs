// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Core library for the PLC cycle monitor daemon
//!
//! The crate watches Mitsubishi PLC workstations over Modbus/TCP, detects the
//! rising edge of the "cycle complete & OK" bit, reads the measurement
//! registers once per edge, creates a cycle record with a 32-character QR
//! identifier and prints a label on a Zebra network printer.

pub mod config;
pub mod daemon;
pub mod identifier;
pub mod label;
pub mod modbus;
pub mod monitor;
pub mod record;
