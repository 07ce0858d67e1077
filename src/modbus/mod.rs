// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus/TCP access layer for Mitsubishi PLC workstations
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module
//! uses the terms "client" and "device". The monitor is always the client; the
//! PLC is the device that serves coils, discrete inputs and holding registers.

pub mod bits;
pub mod client;

pub use bits::{BitAddressMapper, BitReadMethod};
pub use client::{ReadError, RegisterClient};
