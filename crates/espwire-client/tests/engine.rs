//! End-to-end engine behavior over an in-memory transport.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use espwire_client::{
    ClientConfig, Connection, DemoConfig, DemoReplay, EspClient, EspListener, Request,
    RequestFailure, ResponseHandler,
};
use espwire_frame::{
    encode_for_link, hex, packet_id, request, AlertData, BatteryVoltage, DeviceId, Frame, Packet,
    Personality, Version, Volume,
};
use espwire_transport::{LinkKind, MemoryTransport};

#[derive(Default)]
struct Recorder {
    packets: Mutex<Vec<u8>>,
    tables: Mutex<Vec<Vec<AlertData>>>,
}

impl EspListener for Recorder {
    fn on_packet(&self, packet: &Packet) {
        self.packets.lock().unwrap().push(packet.kind());
    }

    fn on_alert_table(&self, alerts: &[AlertData]) {
        self.tables.lock().unwrap().push(alerts.to_vec());
    }
}

type Outcome<T> = Arc<Mutex<Option<Result<T, RequestFailure>>>>;

fn outcome<T: Send + 'static>() -> (Outcome<T>, impl FnOnce(Result<T, RequestFailure>) + Send) {
    let slot: Outcome<T> = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    (slot, move |result| *sink.lock().unwrap() = Some(result))
}

struct Session {
    connection: Connection,
    transport: Arc<MemoryTransport>,
    recorder: Arc<Recorder>,
}

impl Session {
    fn connected(config: ClientConfig) -> Self {
        let transport = Arc::new(MemoryTransport::new(LinkKind::Stream));
        let connection = Connection::new(transport.clone(), config).unwrap();
        let recorder = Arc::new(Recorder::default());
        connection.add_listener(recorder.clone());
        connection.connect().unwrap();
        connection.on_connected();
        Self {
            connection,
            transport,
            recorder,
        }
    }

    /// Personality known and holdoff clear.
    fn ready(config: ClientConfig) -> Self {
        let session = Self::connected(config);
        session.connection.force_personality(Personality::Checksum);
        session.receive(&display(0x00));
        session
    }

    fn receive(&self, frame: &Frame) {
        let wire = encode_for_link(frame, Personality::Checksum, LinkKind::Stream).unwrap();
        self.connection.on_bytes(&wire);
    }

    fn kinds_seen(&self) -> Vec<u8> {
        self.recorder.packets.lock().unwrap().clone()
    }
}

fn display(aux0: u8) -> Frame {
    Frame::new(
        DeviceId::V1WithChecksum,
        DeviceId::GeneralBroadcast,
        packet_id::INF_DISPLAY_DATA,
        vec![0x38, 0x38, 0x00, 0x00, 0x00, aux0, 0x00, 0x00],
    )
}

fn from_v1(kind: u8, payload: &[u8]) -> Frame {
    Frame::new(
        DeviceId::V1WithChecksum,
        DeviceId::V1Connection,
        kind,
        payload.to_vec(),
    )
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

#[tokio::test(start_paused = true)]
async fn own_echo_is_suppressed_once() {
    let session = Session::ready(ClientConfig::default());
    let version = request::version(DeviceId::V1Connection);
    session.connection.enqueue(Request::new(version.clone()), false);
    settle().await;
    assert_eq!(session.transport.write_count(), 1);

    let baseline = session.kinds_seen().len();
    session.receive(&version);
    assert_eq!(session.kinds_seen().len(), baseline);

    session.receive(&version);
    assert_eq!(
        session.kinds_seen().last(),
        Some(&packet_id::REQ_VERSION)
    );
}

#[tokio::test(start_paused = true)]
async fn version_request_round_trip() {
    let session = Session::ready(ClientConfig::default());
    let client = EspClient::new(session.connection.clone());
    let (result, done) = outcome::<Version>();
    client.request_version(request::V1, done);
    settle().await;

    let writes = session.transport.take_writes();
    assert_eq!(writes.len(), 1);
    // The bus echoes our bytes before the detector answers.
    session.connection.on_bytes(&writes[0]);
    assert!(result.lock().unwrap().is_none());

    session.receive(&from_v1(packet_id::RESP_VERSION, b"V4.1035"));
    assert_eq!(
        *result.lock().unwrap(),
        Some(Ok(Version("V4.1035".to_string())))
    );
    assert_eq!(session.connection.live_handlers(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_version_fails_the_request() {
    let session = Session::ready(ClientConfig::default());
    let client = EspClient::new(session.connection.clone());
    let (result, done) = outcome::<Version>();
    client.request_version(request::V1, done);
    settle().await;

    session.receive(&from_v1(packet_id::RESP_VERSION, b"1.0"));
    let failure = result.lock().unwrap().clone().unwrap().unwrap_err();
    assert_eq!(
        failure.to_string(),
        "Received a bad version for Valentine One w/ CS"
    );
}

#[tokio::test(start_paused = true)]
async fn unsupported_response_fails_with_device_message() {
    let session = Session::ready(ClientConfig::default());
    let client = EspClient::new(session.connection.clone());
    let (result, done) = outcome::<BatteryVoltage>();
    client.request_battery_voltage(done);
    settle().await;

    session.receive(&from_v1(
        packet_id::RESP_UNSUPPORTED_PACKET,
        &[packet_id::REQ_BATTERY_VOLTAGE],
    ));
    let failure = result.lock().unwrap().clone().unwrap().unwrap_err();
    assert_eq!(
        failure.to_string(),
        "Request ID = 62 is not supported by destination = 0A"
    );
}

#[tokio::test(start_paused = true)]
async fn handler_times_out_within_one_poll_of_its_timeout() {
    let session = Session::ready(ClientConfig::default());
    let failures = Arc::new(Mutex::new(Vec::new()));
    let handler = {
        let failures = Arc::clone(&failures);
        ResponseHandler::new()
            .accept(packet_id::RESP_BATTERY_VOLTAGE)
            .on_failure(move |f| failures.lock().unwrap().push(f))
            .shared()
    };
    session.connection.enqueue(
        Request::new(request::battery_voltage())
            .with_handler(handler)
            .with_timeout(Duration::from_millis(500)),
        false,
    );

    tokio::time::sleep(Duration::from_millis(499)).await;
    assert!(failures.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(82)).await;
    assert_eq!(*failures.lock().unwrap(), vec![RequestFailure::TimedOut]);
}

#[tokio::test(start_paused = true)]
async fn busy_kind_keeps_a_queued_request_alive() {
    let session = Session::connected(ClientConfig::default());
    session.connection.on_frame(from_v1(
        packet_id::INF_V1_BUSY,
        &[packet_id::REQ_BATTERY_VOLTAGE],
    ));
    assert_eq!(
        session.connection.busy_kinds(),
        vec![packet_id::REQ_BATTERY_VOLTAGE]
    );

    let (result, done) = outcome::<BatteryVoltage>();
    EspClient::new(session.connection.clone()).request_battery_voltage(done);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert!(result.lock().unwrap().is_none());
    assert_eq!(session.connection.pending_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn queued_request_times_out_before_it_is_sent() {
    // Personality stays unknown, so nothing is ever written.
    let session = Session::connected(ClientConfig::default());
    let (result, done) = outcome::<u8>();
    EspClient::new(session.connection.clone()).request_vehicle_speed(done);
    tokio::time::sleep(Duration::from_millis(5100)).await;
    assert_eq!(
        *result.lock().unwrap(),
        Some(Err(RequestFailure::TimedOutBeforeSent))
    );
    assert_eq!(session.connection.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn alert_entries_assemble_into_a_table() {
    let session = Session::ready(ClientConfig::default());
    let alert = |index: u8, count: u8| {
        from_v1(
            packet_id::RESP_ALERT_DATA,
            &[index << 4 | count, 0x5E, 0x10, 0xB0, 0x90, 0x22, 0x80],
        )
    };
    session.receive(&alert(1, 3));
    session.receive(&alert(3, 3));
    session.receive(&alert(2, 3));
    session.receive(&alert(0, 0));

    let tables = session.recorder.tables.lock().unwrap();
    assert_eq!(tables.len(), 2);
    let indices: Vec<u8> = tables[0].iter().map(|a| a.index).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    assert!(tables[1].is_empty());
}

#[tokio::test(start_paused = true)]
async fn write_failure_reaches_the_caller() {
    let session = Session::ready(ClientConfig::default());
    session.transport.set_failing(true);
    let (result, done) = outcome::<Volume>();
    EspClient::new(session.connection.clone()).request_current_volume(done);
    settle().await;
    assert_eq!(
        *result.lock().unwrap(),
        Some(Err(RequestFailure::SendFailed))
    );
    assert_eq!(
        RequestFailure::SendFailed.to_string(),
        "Failed to send ESP packet"
    );
}

#[tokio::test(start_paused = true)]
async fn demo_answers_requests_from_replayed_responses() {
    let lines: Vec<String> = [
        display(0x08),
        from_v1(packet_id::RESP_VERSION, b"V4.1035"),
        display(0x08),
    ]
    .iter()
    .map(|f| hex::encode(&encode_for_link(f, Personality::Checksum, LinkKind::Stream).unwrap()))
    .collect();
    let text = format!("// recorded drive\n{}\n", lines.join("\n"));

    let transport = Arc::new(MemoryTransport::new(LinkKind::Stream));
    let connection = Connection::new(transport.clone(), ClientConfig::default()).unwrap();
    let replay = DemoReplay::start(&connection, DemoConfig::new(text).with_repeat(false)).unwrap();
    replay.finished().await;

    let (result, done) = outcome::<Version>();
    EspClient::new(connection.clone()).request_version(request::V1, done);
    assert_eq!(
        *result.lock().unwrap(),
        Some(Ok(Version("V4.1035".to_string())))
    );
    assert_eq!(transport.write_count(), 0);
}
