//! Replay of recorded ESP traffic through a connection.
//!
//! Demo text holds one item per line:
//!
//! ```text
//! // a comment
//! <info:Approaching a speed trap>
//! 7F 0D AA D8 EA 31 08 ...
//! ```
//!
//! Hex lines are stream-link bytes. Display and alert frames drive the
//! connection exactly as live data would; responses are cached so requests
//! made during the demo can be answered without a transport.

use std::sync::{Arc, Mutex};

use espwire_frame::packet_id::*;
use espwire_frame::{hex, FrameDecoder, Packet, Personality};
use espwire_transport::LinkKind;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::DemoConfig;
use crate::connection::Connection;
use crate::error::{ClientError, Result};
use crate::request::{lock, Request};

const MAX_CACHED_SECTION_RESPONSES: usize = 2;
const MAX_CACHED_DEFINITIONS: usize = 6;

/// One parsed line of demo text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemoLine {
    Notification(String),
    Data(Vec<u8>),
    /// A line that is neither a comment, a notification nor valid hex.
    Invalid(String),
}

/// Parse demo text, skipping blank lines and comments.
pub fn parse_demo(text: &str) -> Vec<DemoLine> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//"))
        .map(|line| {
            if let Some(inner) = line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) {
                let message = inner.split_once(':').map_or(inner, |(_, msg)| msg);
                return DemoLine::Notification(message.trim().to_string());
            }
            match hex::decode(line) {
                Ok(bytes) => DemoLine::Data(bytes),
                Err(_) => DemoLine::Invalid(line.to_string()),
            }
        })
        .collect()
}

/// The response a request is answered by.
fn response_kind(request_kind: u8) -> Option<u8> {
    let kind = match request_kind {
        REQ_VERSION => RESP_VERSION,
        REQ_SERIAL_NUMBER => RESP_SERIAL_NUMBER,
        REQ_USER_BYTES => RESP_USER_BYTES,
        REQ_MAX_SWEEP_INDEX => RESP_MAX_SWEEP_INDEX,
        REQ_SWEEP_SECTIONS => RESP_SWEEP_SECTIONS,
        REQ_ALL_SWEEP_DEFINITIONS => RESP_SWEEP_DEFINITION,
        REQ_DEFAULT_SWEEP_DEFINITIONS => RESP_DEFAULT_SWEEP_DEFINITIONS,
        REQ_BATTERY_VOLTAGE => RESP_BATTERY_VOLTAGE,
        REQ_SAVVY_STATUS => RESP_SAVVY_STATUS,
        REQ_VEHICLE_SPEED => RESP_VEHICLE_SPEED,
        _ => return None,
    };
    Some(kind)
}

/// Responses seen during replay.
#[derive(Debug, Default)]
pub(crate) struct DemoCache {
    packets: Mutex<Vec<Packet>>,
}

impl DemoCache {
    pub fn store(&self, packet: &Packet) {
        let kind = packet.kind();
        let origin = packet.frame().origin().as_nibble();
        let mut packets = lock(&self.packets);
        let same_kind = packets.iter().filter(|p| p.kind() == kind).count();
        match kind {
            RESP_SWEEP_SECTIONS => {
                if same_kind < MAX_CACHED_SECTION_RESPONSES {
                    packets.push(packet.clone());
                }
            }
            RESP_SWEEP_DEFINITION | RESP_DEFAULT_SWEEP_DEFINITIONS => {
                let index = packet.frame().payload().first().map(|b| b & 0x3F);
                let existing = packets.iter().position(|p| {
                    p.kind() == kind && p.frame().payload().first().map(|b| b & 0x3F) == index
                });
                match existing {
                    Some(i) => packets[i] = packet.clone(),
                    None if same_kind < MAX_CACHED_DEFINITIONS => packets.push(packet.clone()),
                    None => {}
                }
            }
            RESP_VERSION | RESP_SERIAL_NUMBER | RESP_USER_BYTES | RESP_MAX_SWEEP_INDEX
            | RESP_BATTERY_VOLTAGE | RESP_SAVVY_STATUS | RESP_VEHICLE_SPEED => {
                packets.retain(|p| !(p.kind() == kind && p.frame().origin().as_nibble() == origin));
                packets.push(packet.clone());
            }
            _ => return,
        }
        trace!(kind = packet.frame().kind_name(), "cached demo response");
    }

    /// Answer `request` from cached responses. Returns `true` when nothing
    /// more is needed: the handler completed or there is no handler.
    pub fn answer(&self, request: &Request) -> bool {
        let Some(handler) = request.handler() else {
            return true;
        };
        let Some(kind) = response_kind(request.kind()) else {
            return false;
        };
        let destination = request
            .frame()
            .resolve(Personality::Checksum)
            .destination()
            .as_nibble();
        let cached: Vec<Packet> = lock(&self.packets)
            .iter()
            .filter(|p| p.kind() == kind && p.frame().origin().as_nibble() == destination)
            .cloned()
            .collect();
        cached.iter().any(|packet| handler.succeed(Some(packet)))
    }

    pub fn len(&self) -> usize {
        lock(&self.packets).len()
    }
}

/// A running demo replay.
#[derive(Debug)]
pub struct DemoReplay {
    connection: Connection,
    cache: Arc<DemoCache>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl DemoReplay {
    /// Put `connection` into demo mode and start feeding it `config.data`.
    ///
    /// The connection must be disconnected. It reports connection events
    /// with `is_demo` set and never writes to its transport.
    pub fn start(connection: &Connection, config: DemoConfig) -> Result<Self> {
        let lines = parse_demo(&config.data);
        if !lines.iter().any(|l| matches!(l, DemoLine::Data(_))) {
            return Err(ClientError::Demo("demo data holds no frames".to_string()));
        }
        let cache = Arc::new(DemoCache::default());
        connection.start_demo(Arc::clone(&cache))?;
        let cancel = connection
            .task_token()
            .ok_or_else(|| ClientError::Demo("connection tasks are not running".to_string()))?;
        let task = connection.runtime().spawn(replay(
            connection.clone(),
            Arc::clone(&cache),
            lines,
            config,
            cancel.clone(),
        ));
        Ok(Self {
            connection: connection.clone(),
            cache,
            cancel,
            task,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Cached responses so far.
    pub fn cached_responses(&self) -> usize {
        self.cache.len()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop replaying and disconnect.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.connection.disconnect();
    }

    /// Wait for replay to end: after the last line without `repeat`, or
    /// once stopped.
    pub async fn finished(self) {
        if let Err(err) = self.task.await {
            debug!(error = %err, "demo replay task ended abnormally");
        }
    }
}

async fn replay(
    connection: Connection,
    cache: Arc<DemoCache>,
    lines: Vec<DemoLine>,
    config: DemoConfig,
    cancel: CancellationToken,
) {
    let mut decoder = FrameDecoder::new(LinkKind::Stream);
    debug!(lines = lines.len(), repeat = config.repeat, "demo replay started");
    'replay: loop {
        for line in &lines {
            if cancel.is_cancelled() {
                break 'replay;
            }
            match line {
                DemoLine::Notification(text) => connection.notify(text),
                DemoLine::Invalid(text) => {
                    connection.malformed(&format!("invalid demo line: {text}"));
                }
                DemoLine::Data(bytes) => {
                    decoder.push(bytes);
                    loop {
                        match decoder.next_frame(Personality::Checksum) {
                            Ok(Some(frame)) => match Packet::decode(frame) {
                                Ok(packet) => connection.on_demo_packet(&cache, packet),
                                Err(err) => connection.malformed(&err),
                            },
                            Ok(None) => break,
                            Err(err) => connection.malformed(&err),
                        }
                    }
                    tokio::select! {
                        _ = cancel.cancelled() => break 'replay,
                        _ = tokio::time::sleep(config.frame_interval) => {}
                    }
                }
            }
        }
        if !config.repeat {
            break;
        }
        decoder.clear();
    }
    debug!("demo replay ended");
}
