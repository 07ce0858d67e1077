// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Short-lived Modbus/TCP connection wrapper
//!
//! Mitsubishi FX5U PLCs drop idle Modbus connections, so every read batch opens
//! a fresh connection and closes it when done. Connections are never pooled.
//! `connect` deliberately returns a `bool` instead of a `Result`: an
//! unreachable PLC is a normal operating condition for the monitor loop, not
//! an error to propagate.

use std::fmt::Display;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

use log::{debug, warn};
use thiserror::Error;
use tokio::time;
use tokio_modbus::client::{tcp, Client, Context, Reader};
use tokio_modbus::{ExceptionCode, Slave};

use crate::config::DeviceConfig;

/// Why a register or bit read failed.
///
/// `IllegalAddress` gets its own variant because it almost always means the
/// M-bit offset is wrong for this PLC model, and the callers log a dedicated
/// hint for it.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no active Modbus connection")]
    NotConnected,
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("illegal data address")]
    IllegalAddress,
    #[error("Modbus exception: {0}")]
    Exception(ExceptionCode),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("empty response from device")]
    NoData,
}

/// Map the nested client result (transport layer outside, Modbus exception
/// inside) to our flat error taxonomy.
fn map_response<T, E: Display>(
    response: Result<Result<T, ExceptionCode>, E>,
) -> Result<T, ReadError> {
    match response {
        Ok(Ok(values)) => Ok(values),
        Ok(Err(ExceptionCode::IllegalDataAddress)) => Err(ReadError::IllegalAddress),
        Ok(Err(code)) => Err(ReadError::Exception(code)),
        Err(err) => Err(ReadError::Transport(err.to_string())),
    }
}

/// One Modbus/TCP connection to a PLC workstation.
pub struct RegisterClient {
    addr_spec: String,
    slave: Slave,
    timeout: Duration,
    ctx: Option<Context>,
}

impl RegisterClient {
    pub fn new(host: &str, port: u16, unit_id: u8, timeout: Duration) -> Self {
        Self {
            addr_spec: format!("{}:{}", host, port),
            slave: Slave(unit_id),
            timeout,
            ctx: None,
        }
    }

    pub fn from_device(device: &DeviceConfig) -> Self {
        Self::new(
            &device.host,
            device.port,
            device.unit_id,
            Duration::from_millis(device.timeout_ms),
        )
    }

    fn resolve(&self) -> Option<SocketAddr> {
        match self.addr_spec.to_socket_addrs() {
            Ok(mut addrs) => addrs.next(),
            Err(err) => {
                warn!("Cannot resolve PLC address {}: {}", self.addr_spec, err);
                None
            }
        }
    }

    /// Open the connection. Returns `false` on any failure (resolution,
    /// refusal, timeout); already connected is a no-op returning `true`.
    pub async fn connect(&mut self) -> bool {
        if self.ctx.is_some() {
            return true;
        }
        let Some(addr) = self.resolve() else {
            return false;
        };
        match time::timeout(self.timeout, tcp::connect_slave(addr, self.slave)).await {
            Ok(Ok(ctx)) => {
                debug!("Connected to PLC at {}", self.addr_spec);
                self.ctx = Some(ctx);
                true
            }
            Ok(Err(err)) => {
                debug!("Connection to PLC at {} failed: {}", self.addr_spec, err);
                false
            }
            Err(_) => {
                debug!(
                    "Connection to PLC at {} timed out after {:?}",
                    self.addr_spec, self.timeout
                );
                false
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.ctx.is_some()
    }

    /// Read `cnt` coils (M bits exposed through function code 1).
    pub async fn read_coils(&mut self, addr: u16, cnt: u16) -> Result<Vec<bool>, ReadError> {
        let timeout = self.timeout;
        let ctx = self.ctx.as_mut().ok_or(ReadError::NotConnected)?;
        match time::timeout(timeout, ctx.read_coils(addr, cnt)).await {
            Ok(response) => map_response(response),
            Err(_) => Err(ReadError::Timeout(timeout)),
        }
    }

    /// Read `cnt` discrete inputs (function code 2). Some PLC firmwares map
    /// M bits here instead of the coil table.
    pub async fn read_discrete_inputs(
        &mut self,
        addr: u16,
        cnt: u16,
    ) -> Result<Vec<bool>, ReadError> {
        let timeout = self.timeout;
        let ctx = self.ctx.as_mut().ok_or(ReadError::NotConnected)?;
        match time::timeout(timeout, ctx.read_discrete_inputs(addr, cnt)).await {
            Ok(response) => map_response(response),
            Err(_) => Err(ReadError::Timeout(timeout)),
        }
    }

    /// Read `cnt` holding registers (D registers, function code 3).
    pub async fn read_holding_registers(
        &mut self,
        addr: u16,
        cnt: u16,
    ) -> Result<Vec<u16>, ReadError> {
        let timeout = self.timeout;
        let ctx = self.ctx.as_mut().ok_or(ReadError::NotConnected)?;
        match time::timeout(timeout, ctx.read_holding_registers(addr, cnt)).await {
            Ok(response) => map_response(response),
            Err(_) => Err(ReadError::Timeout(timeout)),
        }
    }

    /// Close the connection. Safe to call when already closed.
    pub async fn close(&mut self) {
        if let Some(mut ctx) = self.ctx.take() {
            let _ = time::timeout(self.timeout, ctx.disconnect()).await;
            debug!("Disconnected from PLC at {}", self.addr_spec);
        }
    }

    /// One-shot connect/close probe, used by the per-tick health update and
    /// as a manual connection test.
    pub async fn probe(&mut self) -> bool {
        let reachable = self.connect().await;
        if reachable {
            self.close().await;
        }
        reachable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_response_flattens_success() {
        let response: Result<Result<Vec<u16>, ExceptionCode>, std::io::Error> =
            Ok(Ok(vec![42, 7]));
        assert_eq!(map_response(response).unwrap(), vec![42, 7]);
    }

    #[test]
    fn map_response_distinguishes_illegal_address() {
        let response: Result<Result<Vec<u16>, ExceptionCode>, std::io::Error> =
            Ok(Err(ExceptionCode::IllegalDataAddress));
        assert!(matches!(
            map_response(response),
            Err(ReadError::IllegalAddress)
        ));

        let response: Result<Result<Vec<u16>, ExceptionCode>, std::io::Error> =
            Ok(Err(ExceptionCode::IllegalFunction));
        assert!(matches!(
            map_response(response),
            Err(ReadError::Exception(ExceptionCode::IllegalFunction))
        ));
    }

    #[test]
    fn map_response_wraps_transport_errors() {
        let response: Result<Result<Vec<u16>, ExceptionCode>, std::io::Error> = Err(
            std::io::Error::new(std::io::ErrorKind::ConnectionReset, "peer reset"),
        );
        match map_response(response) {
            Err(ReadError::Transport(msg)) => assert!(msg.contains("peer reset")),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn reads_require_a_connection() {
        let mut client = RegisterClient::new("127.0.0.1", 502, 1, Duration::from_millis(100));
        assert!(!client.is_connected());
        assert!(matches!(
            client.read_coils(0, 1).await,
            Err(ReadError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut client = RegisterClient::new("127.0.0.1", 502, 1, Duration::from_millis(100));
        client.close().await;
        client.close().await;
        assert!(!client.is_connected());
    }
}
