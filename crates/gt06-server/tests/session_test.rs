//! Device session tests
//!
//! A simulated tracker talks to a real session task over an in-memory
//! duplex stream (or loopback TCP for the listener test).

use std::sync::Arc;
use std::time::Duration;

use fleet_core::memory::{InMemoryDeviceRegistry, InMemoryRecordStore, RecordingPublisher, StaticGate};
use fleet_core::{DeviceState, FleetEvent, RecordStore, Vehicle};
use gt06_codec::{ack_frame, encode_frame};
use gt06_server::config::{PipelineConfig, SessionConfig};
use gt06_server::{Collaborators, ConnectionRegistry, DeviceListener, SessionManager};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::net::TcpStream;
use tokio::time::timeout;

const IMEI: &str = "358899051234567";
const TERMINAL_ID: [u8; 8] = [0x03, 0x58, 0x89, 0x90, 0x51, 0x23, 0x45, 0x67];

struct Harness {
    manager: Arc<SessionManager>,
    registry: Arc<ConnectionRegistry>,
    records: Arc<InMemoryRecordStore>,
    publisher: Arc<RecordingPublisher>,
    gate: Arc<StaticGate>,
}

impl Harness {
    fn new() -> Self {
        Self::with_session(SessionConfig::default())
    }

    fn with_session(session: SessionConfig) -> Self {
        let devices = Arc::new(InMemoryDeviceRegistry::with_vehicles([Vehicle::new(IMEI, "Truck 7", 80.0)]));
        let records = Arc::new(InMemoryRecordStore::default());
        let publisher = Arc::new(RecordingPublisher::new());
        let gate = Arc::new(StaticGate::pass());
        let registry = Arc::new(ConnectionRegistry::new());

        let collaborators = Collaborators {
            devices,
            records: records.clone(),
            gate: gate.clone(),
            publisher: publisher.clone(),
        };
        let manager = Arc::new(SessionManager::new(
            session,
            PipelineConfig::default(),
            collaborators,
            registry.clone(),
        ));

        Self {
            manager,
            registry,
            records,
            publisher,
            gate,
        }
    }

    /// Start a session and return the device end of the stream
    fn connect(&self) -> (DuplexStream, tokio::task::JoinHandle<()>) {
        let (device, server) = duplex(4096);
        let task = tokio::spawn(self.manager.clone().handle_connection(server, "sim".to_string()));
        (device, task)
    }

    fn device_states(&self) -> Vec<DeviceState> {
        self.publisher
            .events()
            .into_iter()
            .filter_map(|e| match e {
                FleetEvent::DeviceStatus(event) => Some(event.state),
                _ => None,
            })
            .collect()
    }
}

fn login_frame(terminal_id: [u8; 8], serial: u16) -> Vec<u8> {
    encode_frame(0x01, &terminal_id, serial)
}

fn gps_frame(lat: f64, lon: f64, serial: u16) -> Vec<u8> {
    let mut payload = vec![24, 3, 15, 10, 20, 30, 0xC9];
    payload.extend_from_slice(&((lat * 1_800_000.0).round() as u32).to_be_bytes());
    payload.extend_from_slice(&((lon * 1_800_000.0).round() as u32).to_be_bytes());
    payload.push(20);
    // north, positioned, real-time, course 90
    payload.extend_from_slice(&(0x3400u16 | 90).to_be_bytes());
    encode_frame(0x12, &payload, serial)
}

/// SOS alarm carrying the same position body as `gps_frame`
fn alarm_frame(serial: u16) -> Vec<u8> {
    let gps = gps_frame(27.7, 85.3, serial);
    let mut payload = vec![0x01];
    payload.extend_from_slice(&gps[4..gps.len() - 6]);
    encode_frame(0x16, &payload, serial)
}

fn status_frame(terminal: u8, serial: u16) -> Vec<u8> {
    encode_frame(0x13, &[terminal, 0x04, 0x03, 0x00, 0x02], serial)
}

async fn read_ack(device: &mut DuplexStream) -> [u8; 10] {
    let mut ack = [0u8; 10];
    timeout(Duration::from_secs(2), device.read_exact(&mut ack))
        .await
        .expect("ack timed out")
        .expect("read ack");
    ack
}

async fn login(device: &mut DuplexStream) {
    device.write_all(&login_frame(TERMINAL_ID, 1)).await.unwrap();
    assert_eq!(read_ack(device).await, ack_frame(0x01, 1));
}

#[tokio::test]
async fn known_device_logs_in_and_is_acked() {
    let h = Harness::new();
    let (mut device, _task) = h.connect();

    device.write_all(&login_frame(TERMINAL_ID, 1)).await.unwrap();
    let ack = read_ack(&mut device).await;
    assert_eq!(ack, [0x78, 0x78, 0x05, 0x01, 0x00, 0x01, 0xD9, 0xDC, 0x0D, 0x0A]);

    assert!(h.registry.contains(IMEI));
    assert_eq!(h.device_states(), vec![DeviceState::Connected]);
}

#[tokio::test]
async fn unknown_device_is_closed_without_registration() {
    let h = Harness::new();
    let (mut device, task) = h.connect();

    let unknown = [0x01, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11];
    device.write_all(&login_frame(unknown, 1)).await.unwrap();

    let mut buf = [0u8; 16];
    let n = timeout(Duration::from_secs(2), device.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 0, "socket should be closed without an ack");
    task.await.unwrap();

    assert!(h.registry.is_empty());
    assert!(h.publisher.events().is_empty());
}

#[tokio::test]
async fn packets_before_login_are_dropped() {
    let h = Harness::new();
    let (mut device, _task) = h.connect();

    device.write_all(&status_frame(0x46, 1)).await.unwrap();
    device.write_all(&login_frame(TERMINAL_ID, 2)).await.unwrap();

    // The first bytes back are the login ack, not a status ack
    assert_eq!(read_ack(&mut device).await, ack_frame(0x01, 2));
    assert!(h.records.is_empty());
}

#[tokio::test]
async fn duplicate_points_are_not_persisted() {
    let h = Harness::new();
    let (mut device, _task) = h.connect();
    login(&mut device).await;

    device.write_all(&gps_frame(27.700000, 85.300000, 2)).await.unwrap();
    device.write_all(&gps_frame(27.700005, 85.300000, 3)).await.unwrap();
    device.write_all(&status_frame(0x46, 4)).await.unwrap();
    assert_eq!(read_ack(&mut device).await, ack_frame(0x13, 4));

    let locations: Vec<_> = h
        .records
        .records_for(IMEI)
        .into_iter()
        .filter(|r| r.protocol == "GPS")
        .collect();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].speed, Some(20.0));
}

#[tokio::test]
async fn smoothing_and_jump_rejection() {
    let h = Harness::new();
    let (mut device, _task) = h.connect();
    login(&mut device).await;

    device.write_all(&gps_frame(27.7000, 85.3000, 2)).await.unwrap();
    device.write_all(&gps_frame(27.7010, 85.3000, 3)).await.unwrap();
    // ~5 km away
    device.write_all(&gps_frame(27.7500, 85.3000, 4)).await.unwrap();
    device.write_all(&status_frame(0x46, 5)).await.unwrap();
    read_ack(&mut device).await;

    let locations: Vec<_> = h
        .records
        .records_for(IMEI)
        .into_iter()
        .filter(|r| r.protocol == "GPS")
        .collect();
    assert_eq!(locations.len(), 2);

    let first = locations[0].latitude.unwrap();
    let second = locations[1].latitude.unwrap();
    let expected = 0.7 * (49_861_800.0 / 1_800_000.0) + 0.3 * first;
    assert!((second - expected).abs() < 1e-9, "got {}, want {}", second, expected);
}

#[tokio::test]
async fn gate_veto_blocks_persistence() {
    let h = Harness::new();
    h.gate.set_refuse(true);
    let (mut device, _task) = h.connect();
    login(&mut device).await;

    device.write_all(&gps_frame(27.7, 85.3, 2)).await.unwrap();
    device.write_all(&status_frame(0x46, 3)).await.unwrap();
    read_ack(&mut device).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.records.is_empty());
}

#[tokio::test]
async fn repeated_status_is_suppressed() {
    let h = Harness::new();
    let (mut device, _task) = h.connect();
    login(&mut device).await;

    // ignition on twice, then off
    for (serial, terminal) in [(2, 0x46), (3, 0x46), (4, 0x44)] {
        device.write_all(&status_frame(terminal, serial)).await.unwrap();
        read_ack(&mut device).await;
    }
    // Ack precedes processing; a later frame orders us after the last status
    device.write_all(&gps_frame(0.0, 0.0, 5)).await.unwrap();
    device.write_all(&status_frame(0x44, 6)).await.unwrap();
    read_ack(&mut device).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let ignition: Vec<_> = h
        .records
        .most_recent_by_imei(IMEI, 10)
        .await
        .unwrap()
        .into_iter()
        .rev()
        .map(|r| r.status.ignition)
        .collect();
    assert_eq!(ignition, vec![Some(true), Some(false)]);
}

#[tokio::test]
async fn alarms_are_acked_but_not_stored() {
    let h = Harness::new();
    let (mut device, _task) = h.connect();
    login(&mut device).await;

    device.write_all(&alarm_frame(2)).await.unwrap();
    assert_eq!(read_ack(&mut device).await, ack_frame(0x16, 2));
    // The second ack is only written once the first alarm has been handled
    device.write_all(&alarm_frame(3)).await.unwrap();
    assert_eq!(read_ack(&mut device).await, ack_frame(0x16, 3));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.records.is_empty());
    let telemetry = h
        .publisher
        .events()
        .into_iter()
        .filter(|e| matches!(e, FleetEvent::Location(_) | FleetEvent::Status(_)))
        .count();
    assert_eq!(telemetry, 0);
    assert_eq!(h.device_states(), vec![DeviceState::Connected]);
}

#[tokio::test]
async fn disconnect_unregisters_and_publishes() {
    let h = Harness::new();
    let (mut device, task) = h.connect();
    login(&mut device).await;
    assert!(h.registry.contains(IMEI));

    drop(device);
    task.await.unwrap();

    assert!(h.registry.is_empty());
    assert_eq!(h.device_states(), vec![DeviceState::Connected, DeviceState::Disconnected]);
}

#[tokio::test]
async fn reconnect_survives_old_connection_teardown() {
    let h = Harness::new();
    let (mut first, first_task) = h.connect();
    login(&mut first).await;
    let (mut second, _second_task) = h.connect();
    login(&mut second).await;

    drop(first);
    first_task.await.unwrap();

    assert!(h.registry.contains(IMEI));
    assert!(!h.device_states().contains(&DeviceState::Disconnected));
}

#[tokio::test]
async fn silent_connection_hits_login_timeout() {
    let h = Harness::with_session(SessionConfig {
        login_timeout_secs: 1,
        idle_timeout_secs: 900,
    });
    let (mut device, task) = h.connect();

    let mut buf = [0u8; 4];
    let n = timeout(Duration::from_secs(3), device.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(n, 0);
    task.await.unwrap();
}

#[tokio::test]
async fn listener_serves_tcp_devices() {
    let h = Harness::new();
    let listener = DeviceListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(listener.run(h.manager.clone()));

    let mut device = TcpStream::connect(addr).await.unwrap();
    device.write_all(&login_frame(TERMINAL_ID, 7)).await.unwrap();

    let mut ack = [0u8; 10];
    timeout(Duration::from_secs(2), device.read_exact(&mut ack)).await.unwrap().unwrap();
    assert_eq!(ack, ack_frame(0x01, 7));
    assert_eq!(h.registry.snapshot(), vec![IMEI.to_string()]);
}
