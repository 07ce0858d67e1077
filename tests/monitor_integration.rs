// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the plc-cycle-monitor project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end tests against an in-process Modbus/TCP PLC simulator
//!
//! These tests start a real tokio-modbus TCP server that mimics a Mitsubishi
//! workstation (coils for M bits, holding registers for D measurements) and
//! drive complete monitors through the supervisor: edge detection, record
//! creation, label printing, health reporting and self-healing.

use std::collections::HashMap;
use std::future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use plc_cycle_monitor::config::{
    BitMap, DeviceConfig, MonitoringConfig, PrinterConfig, RegisterMap, RegisterSpec,
    VariantProfile, VariantTable,
};
use plc_cycle_monitor::label::{LabelRequest, LabelSink};
use plc_cycle_monitor::modbus::BitReadMethod;
use plc_cycle_monitor::monitor::{ConnectionStatus, CycleReading, MonitorSupervisor};
use plc_cycle_monitor::record::{CycleRecord, InMemoryRecordStore, RecordStore, ScanResult};

// This allows us to use #[tokio::test]
extern crate tokio;

/// Modbus server that mimics one PLC workstation. Coils double as discrete
/// inputs, like the FX5U firmware does.
#[derive(Clone)]
struct MockPlc {
    coils: Arc<Mutex<HashMap<u16, bool>>>,
    holding_registers: Arc<Mutex<HashMap<u16, u16>>>,
}

impl MockPlc {
    fn new() -> Self {
        Self {
            coils: Arc::new(Mutex::new(HashMap::new())),
            holding_registers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn set_coil(&self, addr: u16, value: bool) {
        self.coils.lock().unwrap().insert(addr, value);
    }

    fn set_register(&self, addr: u16, value: u16) {
        self.holding_registers.lock().unwrap().insert(addr, value);
    }
}

impl tokio_modbus::server::Service for MockPlc {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let res = match req {
            Request::ReadCoils(addr, cnt) => {
                coil_read(&self.coils.lock().unwrap(), addr, cnt).map(Response::ReadCoils)
            }
            Request::ReadDiscreteInputs(addr, cnt) => {
                coil_read(&self.coils.lock().unwrap(), addr, cnt)
                    .map(Response::ReadDiscreteInputs)
            }
            Request::ReadHoldingRegisters(addr, cnt) => {
                register_read(&self.holding_registers.lock().unwrap(), addr, cnt)
                    .map(Response::ReadHoldingRegisters)
            }
            _ => Err(ExceptionCode::IllegalFunction),
        };
        future::ready(res)
    }
}

fn coil_read(
    coils: &HashMap<u16, bool>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<bool>, ExceptionCode> {
    let mut values = vec![false; cnt.into()];
    for i in 0..cnt {
        match coils.get(&(addr + i)) {
            Some(v) => values[i as usize] = *v,
            None => return Err(ExceptionCode::IllegalDataAddress),
        }
    }
    Ok(values)
}

fn register_read(
    registers: &HashMap<u16, u16>,
    addr: u16,
    cnt: u16,
) -> Result<Vec<u16>, ExceptionCode> {
    let mut values = vec![0; cnt.into()];
    for i in 0..cnt {
        match registers.get(&(addr + i)) {
            Some(v) => values[i as usize] = *v,
            None => return Err(ExceptionCode::IllegalDataAddress),
        }
    }
    Ok(values)
}

/// Start the simulator on an ephemeral port.
async fn start_mock_plc(plc: MockPlc) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let socket_addr = listener.local_addr().unwrap();
    serve_mock_plc(listener, plc).await;
    socket_addr
}

/// Start the simulator on a fixed address, as when a PLC comes back after an
/// outage.
async fn start_mock_plc_at(addr: SocketAddr, plc: MockPlc) {
    let listener = TcpListener::bind(addr).await.unwrap();
    serve_mock_plc(listener, plc).await;
}

async fn serve_mock_plc(listener: TcpListener, plc: MockPlc) {
    tokio::spawn(async move {
        let server = Server::new(listener);
        let on_connected = move |stream, socket_addr| {
            let plc = plc.clone();
            async move {
                accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                    Ok(Some(plc.clone()))
                })
            }
        };
        let on_process_error = |err| {
            eprintln!("Server error: {err}");
        };
        if let Err(e) = server.serve(&on_connected, on_process_error).await {
            eprintln!("Server error: {e}");
        }
    });

    time::sleep(Duration::from_millis(50)).await;
}

/// Collects labels instead of talking to a printer.
#[derive(Default)]
struct RecordingLabelSink {
    labels: Mutex<Vec<LabelRequest>>,
}

#[async_trait::async_trait]
impl LabelSink for RecordingLabelSink {
    async fn print(&self, _printer: &PrinterConfig, label: &LabelRequest) -> bool {
        self.labels.lock().unwrap().push(label.clone());
        true
    }
}

/// Record store whose first write panics, taking the monitor task down with
/// it. Later writes go through to the inner store.
struct FaultyOnceStore {
    inner: InMemoryRecordStore,
    armed: AtomicBool,
}

impl FaultyOnceStore {
    fn new() -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            armed: AtomicBool::new(true),
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for FaultyOnceStore {
    async fn create_cycle(
        &self,
        device_id: &str,
        reading: &CycleReading,
    ) -> anyhow::Result<CycleRecord> {
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("record backend went away");
        }
        self.inner.create_cycle(device_id, reading).await
    }

    async fn last_identifier(&self) -> Option<String> {
        self.inner.last_identifier().await
    }
}

fn fast_timing() -> MonitoringConfig {
    MonitoringConfig {
        scan_interval_ms: 40,
        retry_delay_ms: 40,
        max_consecutive_errors: 3,
        cycle_ok_read_delay_ms: 1,
        bit_read_delay_ms: 1,
        register_read_delay_ms: 1,
        reconcile_interval_s: 1,
        stop_timeout_s: 2,
    }
}

/// A workstation with no bit offset, a cycle-ok bit at M221 and a torque
/// register at D2704. Variants carry distinct part numbers so the identifier
/// reveals which one was resolved.
fn test_device(addr: SocketAddr) -> DeviceConfig {
    DeviceConfig {
        id: "station-1".into(),
        name: "Test station".into(),
        host: addr.ip().to_string(),
        port: addr.port(),
        unit_id: 1,
        timeout_ms: 500,
        enabled: true,
        bit_offset: 0,
        bit_read_method: BitReadMethod::Coils,
        bits: BitMap {
            cycle_ok: Some(221),
            variant_selector: Some(20),
            ..Default::default()
        },
        registers: RegisterMap {
            torque: Some(RegisterSpec {
                address: 2704,
                decode: Default::default(),
            }),
            load_cell: Some(RegisterSpec {
                address: 2710,
                decode: Default::default(),
            }),
            ..Default::default()
        },
        variants: VariantTable {
            at: VariantProfile {
                part_name: Some("Clutch AT".into()),
                part_no: Some("ATPART".into()),
                revision: Some("A".into()),
                vendor_code: Some("V1".into()),
            },
            mt: VariantProfile {
                part_name: Some("Clutch MT".into()),
                part_no: Some("MTPART".into()),
                revision: Some("A".into()),
                vendor_code: Some("V1".into()),
            },
            fallback: VariantProfile::default(),
        },
        printer: PrinterConfig::default(),
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = time::Instant::now() + timeout;
    while time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// A PLC with all the bits and registers of `test_device` in place.
fn populated_plc() -> MockPlc {
    let plc = MockPlc::new();
    plc.set_coil(221, false); // cycle_ok
    plc.set_coil(20, true); // variant selector: AT
    plc.set_register(2704, 42); // torque
    plc.set_register(2710, 7); // load cell
    plc
}

#[tokio::test]
async fn rising_edge_creates_one_record_per_cycle() {
    init_logging();
    let plc = populated_plc();
    let addr = start_mock_plc(plc.clone()).await;
    let device = test_device(addr);

    let store = Arc::new(InMemoryRecordStore::new());
    let supervisor = MonitorSupervisor::new(
        fast_timing(),
        store.clone(),
        Arc::new(RecordingLabelSink::default()),
    );
    supervisor.start(&device).await.unwrap();

    // Several scans with the bit low: nothing must fire
    time::sleep(Duration::from_millis(300)).await;
    assert!(store.is_empty());

    // First cycle
    plc.set_coil(221, true);
    assert!(
        wait_until(|| store.len() == 1, Duration::from_secs(2)).await,
        "expected one record after the rising edge"
    );

    // Holding the bit high must not re-fire
    time::sleep(Duration::from_millis(300)).await;
    assert_eq!(store.len(), 1);

    let record = &store.records()[0];
    assert_eq!(record.device_id, "station-1");
    assert_eq!(record.cycle_number, "CYC000001");
    assert_eq!(record.identifier.len(), 32);
    // Variant selector is ON, so the AT profile feeds the identifier
    assert!(record.identifier.starts_with("ATPARTAV1"));
    assert_eq!(record.reading.torque, 42.0);
    assert_eq!(record.reading.load_cell, 7.0);

    // Second cycle after the bit drops
    plc.set_coil(221, false);
    time::sleep(Duration::from_millis(200)).await;
    plc.set_coil(221, true);
    assert!(
        wait_until(|| store.len() == 2, Duration::from_secs(2)).await,
        "expected a second record after the bit cycled"
    );

    // Scan verification matches only the latest identifier
    let records = store.records();
    assert_eq!(
        store.verify_scan(&records[1].identifier).await,
        ScanResult::Matched
    );
    assert_eq!(
        store.verify_scan(&records[0].identifier).await,
        ScanResult::NotFound
    );

    supervisor.stop_all().await;
}

#[tokio::test]
async fn bit_high_at_startup_is_suppressed() {
    init_logging();
    let plc = populated_plc();
    plc.set_coil(221, true); // already high before the monitor starts
    let addr = start_mock_plc(plc.clone()).await;
    let device = test_device(addr);

    let store = Arc::new(InMemoryRecordStore::new());
    let supervisor = MonitorSupervisor::new(
        fast_timing(),
        store.clone(),
        Arc::new(RecordingLabelSink::default()),
    );
    supervisor.start(&device).await.unwrap();

    time::sleep(Duration::from_millis(400)).await;
    assert!(
        store.is_empty(),
        "a bit already high at startup must not create a record"
    );

    // Only a real transition fires
    plc.set_coil(221, false);
    time::sleep(Duration::from_millis(200)).await;
    plc.set_coil(221, true);
    assert!(wait_until(|| store.len() == 1, Duration::from_secs(2)).await);

    supervisor.stop_all().await;
}

#[tokio::test]
async fn fx5u_bit_offset_is_applied_on_the_wire() {
    init_logging();
    let plc = MockPlc::new();
    // M221 with the FX5U offset lives at coil 8413
    plc.set_coil(8413, false);
    let addr = start_mock_plc(plc.clone()).await;

    let mut device = test_device(addr);
    device.bit_offset = 8192;
    device.bits.variant_selector = None;
    device.registers = RegisterMap::default();

    let store = Arc::new(InMemoryRecordStore::new());
    let supervisor = MonitorSupervisor::new(
        fast_timing(),
        store.clone(),
        Arc::new(RecordingLabelSink::default()),
    );
    supervisor.start(&device).await.unwrap();

    time::sleep(Duration::from_millis(200)).await;
    plc.set_coil(8413, true);
    assert!(
        wait_until(|| store.len() == 1, Duration::from_secs(2)).await,
        "the monitor must read M221 at physical address 8413"
    );

    supervisor.stop_all().await;
}

#[tokio::test]
async fn missing_register_defaults_to_zero_without_losing_the_cycle() {
    init_logging();
    let plc = populated_plc();
    // The load cell register is gone: reads answer IllegalDataAddress
    plc.holding_registers.lock().unwrap().remove(&2710);
    // No variant selector coil either
    let addr = start_mock_plc(plc.clone()).await;

    let mut device = test_device(addr);
    device.bits.variant_selector = None;

    let store = Arc::new(InMemoryRecordStore::new());
    let supervisor = MonitorSupervisor::new(
        fast_timing(),
        store.clone(),
        Arc::new(RecordingLabelSink::default()),
    );
    supervisor.start(&device).await.unwrap();

    time::sleep(Duration::from_millis(200)).await;
    plc.set_coil(221, true);
    assert!(wait_until(|| store.len() == 1, Duration::from_secs(2)).await);

    let record = &store.records()[0];
    // Torque still came through, the broken field degraded to zero
    assert_eq!(record.reading.torque, 42.0);
    assert_eq!(record.reading.load_cell, 0.0);
    // Without a selector bit the MT profile is the default
    assert!(record.identifier.starts_with("MTPARTAV1"));

    supervisor.stop_all().await;
}

#[tokio::test]
async fn labels_are_printed_once_per_cycle() {
    init_logging();
    let plc = populated_plc();
    let addr = start_mock_plc(plc.clone()).await;

    let mut device = test_device(addr);
    device.printer = PrinterConfig {
        enabled: true,
        host: "ignored-by-the-test-sink".into(),
        port: 9100,
        timeout_ms: 500,
    };

    let store = Arc::new(InMemoryRecordStore::new());
    let sink = Arc::new(RecordingLabelSink::default());
    let supervisor = MonitorSupervisor::new(fast_timing(), store.clone(), sink.clone());
    supervisor.start(&device).await.unwrap();

    time::sleep(Duration::from_millis(200)).await;
    plc.set_coil(221, true);
    assert!(wait_until(|| store.len() == 1, Duration::from_secs(2)).await);
    assert!(
        wait_until(|| sink.labels.lock().unwrap().len() == 1, Duration::from_secs(2)).await,
        "one label per cycle"
    );

    let record = &store.records()[0];
    let labels = sink.labels.lock().unwrap();
    assert_eq!(labels[0].qr_payload, record.identifier);
    assert_eq!(labels[0].serial_no, record.serial_no);
    assert_eq!(labels[0].part_description, "Clutch AT");

    supervisor.stop_all().await;
}

#[tokio::test]
async fn outage_reports_disconnected_and_recovery_resumes_detection() {
    init_logging();
    // Bind then drop, so nothing listens on this port yet
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let mut device = test_device(addr);
    device.timeout_ms = 200;

    let store = Arc::new(InMemoryRecordStore::new());
    let supervisor = MonitorSupervisor::new(
        fast_timing(),
        store.clone(),
        Arc::new(RecordingLabelSink::default()),
    );
    supervisor.start(&device).await.unwrap();

    time::sleep(Duration::from_millis(400)).await;
    let health = supervisor.health("station-1").await.unwrap();
    assert_eq!(health.status, ConnectionStatus::Disconnected);
    assert!(health.last_success_at.is_none());
    assert!(store.is_empty());
    // The task itself stays alive and keeps retrying
    assert!(supervisor.is_running("station-1").await);

    // The PLC comes back on the same address: health must recover and
    // detection resume with no supervisor intervention
    let plc = populated_plc();
    start_mock_plc_at(addr, plc.clone()).await;

    let mut connected = false;
    for _ in 0..100 {
        if let Some(health) = supervisor.health("station-1").await {
            if health.status == ConnectionStatus::Connected {
                connected = true;
                break;
            }
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    assert!(connected, "health must return to Connected once the PLC is back");
    assert!(supervisor
        .health("station-1")
        .await
        .unwrap()
        .last_success_at
        .is_some());

    // A rising edge after the outage still creates a record
    plc.set_coil(221, true);
    assert!(
        wait_until(|| store.len() == 1, Duration::from_secs(2)).await,
        "detection must resume after the device recovers"
    );

    supervisor.stop_all().await;
}

#[tokio::test]
async fn dead_monitor_is_restarted_with_fresh_trigger_state() {
    init_logging();
    let plc = populated_plc();
    let addr = start_mock_plc(plc.clone()).await;
    let device = test_device(addr);

    let store = Arc::new(FaultyOnceStore::new());
    let supervisor = MonitorSupervisor::new(
        fast_timing(),
        store.clone(),
        Arc::new(RecordingLabelSink::default()),
    );
    let devices = vec![device.clone()];
    supervisor.reconcile_all(&devices).await;
    assert!(supervisor.is_running("station-1").await);

    // Let the monitor observe the bit low first, as in
    // rising_edge_creates_one_record_per_cycle
    time::sleep(Duration::from_millis(300)).await;

    // The first edge hits the faulty backend and the task panics
    plc.set_coil(221, true);
    let mut died = false;
    for _ in 0..100 {
        if !supervisor.is_running("station-1").await {
            died = true;
            break;
        }
        time::sleep(Duration::from_millis(20)).await;
    }
    assert!(died, "the panicking store must take the monitor task down");
    assert!(store.inner.is_empty());

    // The self-healing pass replaces the registered-but-dead task
    supervisor.reconcile_all(&devices).await;
    assert!(supervisor.is_running("station-1").await);

    // The bit is still high: the fresh trigger state must not fire on it
    time::sleep(Duration::from_millis(400)).await;
    assert!(store.inner.is_empty());

    // Only a new low -> high transition creates a record
    plc.set_coil(221, false);
    time::sleep(Duration::from_millis(200)).await;
    plc.set_coil(221, true);
    assert!(
        wait_until(|| store.inner.len() == 1, Duration::from_secs(2)).await,
        "the restarted monitor must detect the next real edge"
    );

    supervisor.stop_all().await;
}

#[tokio::test]
async fn supervisor_start_is_idempotent_and_validates_the_trigger_bit() {
    init_logging();
    let plc = populated_plc();
    let addr = start_mock_plc(plc.clone()).await;
    let device = test_device(addr);

    let store = Arc::new(InMemoryRecordStore::new());
    let supervisor = MonitorSupervisor::new(
        fast_timing(),
        store.clone(),
        Arc::new(RecordingLabelSink::default()),
    );

    supervisor.start(&device).await.unwrap();
    supervisor.start(&device).await.unwrap();
    assert_eq!(supervisor.running_count().await, 1);

    let mut broken = device.clone();
    broken.id = "broken".into();
    broken.bits.cycle_ok = None;
    let err = supervisor.start(&broken).await.unwrap_err();
    assert!(err.to_string().contains("cycle_ok"));
    assert!(!supervisor.is_running("broken").await);

    supervisor.stop_all().await;
    assert_eq!(supervisor.running_count().await, 0);
}

#[tokio::test]
async fn reconcile_restarts_a_stopped_monitor() {
    init_logging();
    let plc = populated_plc();
    let addr = start_mock_plc(plc.clone()).await;
    let device = test_device(addr);

    let store = Arc::new(InMemoryRecordStore::new());
    let supervisor = MonitorSupervisor::new(
        fast_timing(),
        store.clone(),
        Arc::new(RecordingLabelSink::default()),
    );

    let devices = vec![device.clone()];
    supervisor.reconcile_all(&devices).await;
    assert!(supervisor.is_running("station-1").await);

    supervisor.stop("station-1").await.unwrap();
    assert!(!supervisor.is_running("station-1").await);

    // The periodic pass brings it back
    supervisor.reconcile_all(&devices).await;
    assert!(supervisor.is_running("station-1").await);

    // Disabled devices stay down
    let mut disabled = device.clone();
    disabled.id = "station-2".into();
    disabled.enabled = false;
    supervisor.reconcile_all(&[disabled]).await;
    assert!(!supervisor.is_running("station-2").await);

    supervisor.stop_all().await;
}
