//! Connection state machine and inbound processing.
//!
//! A [`Connection`] owns the per-link engine state: request queue, echo
//! queue, live response handlers, busy kinds and the detected personality.
//! Three background tasks run while connected:
//!
//! - the writer, which drains the request queue (see `writer.rs`)
//! - the expiry tick, which times out handlers and queued requests
//! - the no-data watchdog
//!
//! All three share one cancellation token per connection. Inbound bytes are
//! pushed in by the transport's read path through [`Connection::on_bytes`].

use std::fmt;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use espwire_frame::{DisplayData, Frame, FrameDecoder, FrameError, Packet, Personality};
use espwire_transport::{LinkKind, Transport};
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::aggregate::AlertTableProcessor;
use crate::config::ClientConfig;
use crate::correlation::Correlator;
use crate::demo::DemoCache;
use crate::echo::EchoQueue;
use crate::error::{ClientError, Result};
use crate::listener::{ConnectionEvent, EspListener, Listeners};
use crate::personality::{candidate, BusyTracker, PersonalityVote};
use crate::queue::RequestQueue;
use crate::request::{lock, Request, RequestFailure, ResponseHandler};
use crate::writer;

const READ_CHUNK_SIZE: usize = 512;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

impl ConnectionState {
    pub fn name(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnecting => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Cancellation for one connection's background tasks.
///
/// The writer runs on a child token so `disconnect` can stop it while the
/// expiry tick keeps failing handlers until teardown.
#[derive(Debug)]
struct Tasks {
    all: CancellationToken,
    writer: CancellationToken,
}

impl Tasks {
    fn new() -> Self {
        let all = CancellationToken::new();
        let writer = all.child_token();
        Self { all, writer }
    }
}

pub(crate) struct Shared {
    pub config: ClientConfig,
    pub transport: Arc<dyn Transport>,
    runtime: Handle,
    state: Mutex<ConnectionState>,
    pub personality: watch::Sender<Personality>,
    vote: Mutex<PersonalityVote>,
    pub busy: Mutex<BusyTracker>,
    pub holdoff: AtomicBool,
    pub write_credit: AtomicBool,
    /// Signalled when write credit, echo room or holdoff changes.
    pub flow: Notify,
    pub queue: RequestQueue,
    pub echoes: Mutex<EchoQueue>,
    pub correlator: Correlator,
    alerts: Mutex<AlertTableProcessor>,
    decoder: Mutex<FrameDecoder>,
    pub listeners: Listeners,
    /// Signalled for every processed frame; feeds the watchdog.
    activity: Notify,
    tasks: Mutex<Option<Tasks>>,
    demo: Mutex<Option<Arc<DemoCache>>>,
}

impl Shared {
    pub fn personality(&self) -> Personality {
        *self.personality.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    fn is_demo(&self) -> bool {
        lock(&self.demo).is_some()
    }

    pub fn emit(&self, event: ConnectionEvent) {
        let demo = self.is_demo();
        debug!(event = %event, demo, "connection event");
        self.listeners
            .each(|l| l.on_connection_event(event, demo));
    }

    /// Undo a write that never reached the peer and fail its handler.
    pub fn unwind_write(&self, frame: &Frame, handler: Option<Arc<ResponseHandler>>) {
        lock(&self.echoes).remove(frame);
        let Some(handler) = handler else {
            return;
        };
        self.correlator.remove(&handler);
        let dropped = self.queue.remove_with_handler(&handler);
        if dropped > 0 {
            debug!(dropped, "dropped queued requests of failed handler");
        }
        handler.fail(RequestFailure::SendFailed);
    }

    fn expire(&self) {
        let busy = lock(&self.busy).kinds().to_vec();
        let now = Instant::now();
        let failed = self
            .queue
            .with_pending(|pending| self.correlator.collect_expired(now, pending, &busy));
        for (handler, failure) in failed {
            handler.fail(failure);
        }
    }

    /// Fail the handlers of every queued request.
    fn drain_queue(&self, failure: RequestFailure) {
        let mut failed: Vec<Arc<ResponseHandler>> = Vec::new();
        for request in self.queue.clear() {
            if let Some(handler) = request.handler() {
                if !self.correlator.contains(handler)
                    && !failed.iter().any(|h| Arc::ptr_eq(h, handler))
                {
                    failed.push(Arc::clone(handler));
                }
            }
        }
        for handler in failed {
            handler.fail(failure.clone());
        }
    }

    fn stop_tasks(&self) {
        if let Some(tasks) = lock(&self.tasks).take() {
            tasks.all.cancel();
        }
    }
}

/// Handle to one ESP connection. Cloning shares the connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    /// Create a connection over `transport`, spawning its tasks on the
    /// current Tokio runtime.
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        Ok(Self::with_runtime(transport, config, runtime))
    }

    pub fn with_runtime(
        transport: Arc<dyn Transport>,
        config: ClientConfig,
        runtime: Handle,
    ) -> Self {
        let link = transport.link_kind();
        let mut echoes = EchoQueue::new(config.max_pending_echoes, config.echo_timeout);
        echoes.set_enabled(config.use_echo_queue);
        let (personality, _) = watch::channel(Personality::Unknown);
        let shared = Shared {
            vote: Mutex::new(PersonalityVote::new(config.personality_threshold)),
            busy: Mutex::new(BusyTracker::new(config.busy_clear_threshold)),
            correlator: Correlator::new(config.response_timeout),
            decoder: Mutex::new(FrameDecoder::new(link)),
            config,
            transport,
            runtime,
            state: Mutex::new(ConnectionState::Disconnected),
            personality,
            holdoff: AtomicBool::new(true),
            write_credit: AtomicBool::new(true),
            flow: Notify::new(),
            queue: RequestQueue::new(),
            echoes: Mutex::new(echoes),
            alerts: Mutex::new(AlertTableProcessor::new()),
            listeners: Listeners::default(),
            activity: Notify::new(),
            tasks: Mutex::new(None),
            demo: Mutex::new(None),
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    pub fn link_kind(&self) -> LinkKind {
        self.shared.transport.link_kind()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_demo(&self) -> bool {
        self.shared.is_demo()
    }

    /// The detected personality of the detector.
    pub fn personality(&self) -> Personality {
        self.shared.personality()
    }

    /// Watch personality changes.
    pub fn subscribe_personality(&self) -> watch::Receiver<Personality> {
        self.shared.personality.subscribe()
    }

    /// Request kinds the detector currently reports busy.
    pub fn busy_kinds(&self) -> Vec<u8> {
        lock(&self.shared.busy).kinds().to_vec()
    }

    /// Whether the bus currently forbids accessory transmissions.
    pub fn is_holdoff(&self) -> bool {
        self.shared.holdoff.load(Ordering::SeqCst)
    }

    pub fn has_write_credit(&self) -> bool {
        self.shared.write_credit.load(Ordering::SeqCst)
    }

    /// Requests waiting for the writer.
    pub fn pending_requests(&self) -> usize {
        self.shared.queue.len()
    }

    /// Handlers waiting for a response.
    pub fn live_handlers(&self) -> usize {
        self.shared.correlator.len()
    }

    /// Sent frames still waiting for their echo.
    pub fn pending_echoes(&self) -> usize {
        lock(&self.shared.echoes).len()
    }

    pub fn add_listener(&self, listener: Arc<dyn EspListener>) {
        self.shared.listeners.add(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn EspListener>) {
        self.shared.listeners.remove(listener);
    }

    /// Begin connecting. The link-specific handshake then reports back
    /// through [`on_connected`](Self::on_connected) or
    /// [`on_connection_failed`](Self::on_connection_failed).
    pub fn connect(&self) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            if *state != ConnectionState::Disconnected {
                return Err(ClientError::InvalidState {
                    from: *state,
                    action: "connect",
                });
            }
            *state = ConnectionState::Connecting;
        }
        self.shared.emit(ConnectionEvent::Connecting);
        Ok(())
    }

    /// The link is up: reset per-connection state, start the background
    /// tasks and commit to `Connected`.
    pub fn on_connected(&self) {
        let shared = &self.shared;
        shared.holdoff.store(true, Ordering::SeqCst);
        shared.write_credit.store(true, Ordering::SeqCst);
        lock(&shared.busy).reset();
        lock(&shared.vote).reset();
        lock(&shared.echoes).set_enabled(shared.config.use_echo_queue);
        self.start_tasks();

        let committed = {
            let mut state = lock(&shared.state);
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
                true
            } else {
                warn!(state = %*state, "link came up while not connecting");
                false
            }
        };
        if committed {
            info!(link = %self.link_kind(), demo = self.is_demo(), "connected");
            shared.emit(ConnectionEvent::Connected);
        } else {
            self.teardown(Some(ConnectionEvent::ConnectionFailed));
        }
    }

    /// Stop sending and start disconnecting.
    ///
    /// The link reports completion through
    /// [`on_disconnected`](Self::on_disconnected); a demo connection
    /// completes immediately.
    pub fn disconnect(&self) {
        let shared = &self.shared;
        shared.drain_queue(RequestFailure::Disconnected);
        if let Some(tasks) = lock(&shared.tasks).as_ref() {
            tasks.writer.cancel();
        }
        let changed = {
            let mut state = lock(&shared.state);
            if *state == ConnectionState::Disconnected {
                false
            } else {
                *state = ConnectionState::Disconnecting;
                true
            }
        };
        if changed {
            shared.emit(ConnectionEvent::Disconnecting);
        }
        if self.is_demo() {
            self.on_disconnected();
        }
    }

    /// The link is down after a requested disconnect.
    pub fn on_disconnected(&self) {
        self.teardown(Some(ConnectionEvent::Disconnected));
    }

    /// The handshake failed.
    pub fn on_connection_failed(&self) {
        self.teardown(Some(ConnectionEvent::ConnectionFailed));
    }

    /// The link dropped without being asked to.
    ///
    /// During a requested disconnect this completes it normally.
    pub fn on_connection_lost(&self) {
        match self.state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Disconnecting => self.on_disconnected(),
            _ => {
                warn!("connection lost");
                self.teardown(Some(ConnectionEvent::ConnectionLost));
            }
        }
    }

    fn teardown(&self, event: Option<ConnectionEvent>) {
        let shared = &self.shared;
        shared.stop_tasks();
        *lock(&shared.state) = ConnectionState::Disconnected;
        if let Some(event) = event {
            shared.emit(event);
        }
        shared.personality.send_replace(Personality::Unknown);
        lock(&shared.vote).reset();
        lock(&shared.busy).reset();
        lock(&shared.echoes).clear();
        lock(&shared.alerts).reset();
        lock(&shared.decoder).clear();
        *lock(&shared.demo) = None;
        shared.drain_queue(RequestFailure::Disconnected);
        shared.correlator.fail_all(RequestFailure::Disconnected);
    }

    fn start_tasks(&self) {
        let tasks = Tasks::new();
        let shared = &self.shared;
        shared.runtime.spawn(writer::run(
            Arc::clone(shared),
            tasks.writer.clone(),
        ));
        shared.runtime.spawn(run_expiry(Arc::clone(shared), tasks.all.clone()));
        shared.runtime.spawn(run_watchdog(Arc::clone(shared), tasks.all.clone()));
        if let Some(previous) = lock(&shared.tasks).replace(tasks) {
            previous.all.cancel();
        }
    }

    /// Token cancelled when this connection's tasks stop.
    pub(crate) fn task_token(&self) -> Option<CancellationToken> {
        lock(&self.shared.tasks).as_ref().map(|t| t.all.child_token())
    }

    pub(crate) fn runtime(&self) -> &Handle {
        &self.shared.runtime
    }

    /// Queue a request for the writer.
    ///
    /// While not connected the request is not queued and its handler fails
    /// at once. `send_next` places it ahead of everything already queued.
    pub fn enqueue(&self, request: Request, send_next: bool) {
        let demo = lock(&self.shared.demo).clone();
        if let Some(cache) = demo {
            self.enqueue_demo(&cache, request);
            return;
        }
        if !self.is_connected() {
            debug!(kind = request.frame().kind_name(), "request while not connected");
            if let Some(handler) = request.handler() {
                handler.fail(RequestFailure::NotConnected);
            }
            return;
        }
        self.shared.queue.push(request, send_next);
    }

    fn enqueue_demo(&self, cache: &DemoCache, request: Request) {
        if cache.answer(&request) {
            return;
        }
        let Some(handler) = request.handler().cloned() else {
            return;
        };
        let frame = request.frame().resolve(Personality::Checksum);
        trace!(kind = frame.kind_name(), "demo request waits for replayed data");
        handler.bind(request.into_sent(frame, Bytes::new(), Instant::now()));
        self.shared.correlator.register(&handler);
    }

    /// Check handlers and queued requests for expiry now.
    pub fn expire_now(&self) {
        self.shared.expire();
    }

    /// Flow-control signal from a message link: `true` once the previous
    /// write has completed.
    pub fn set_write_credit(&self, available: bool) {
        self.shared.write_credit.store(available, Ordering::SeqCst);
        if available {
            self.shared.flow.notify_one();
        }
    }

    /// A message link reports that a previously written message failed.
    pub fn on_write_failed(&self, wire: &[u8]) {
        self.set_write_credit(true);
        let Some(handler) = self.shared.correlator.remove_for_wire(wire) else {
            return;
        };
        warn!(bytes = wire.len(), "write completion failed");
        self.shared.queue.remove_with_handler(&handler);
        handler.fail(RequestFailure::SendFailed);
    }

    /// Feed inbound link bytes.
    pub fn on_bytes(&self, bytes: &[u8]) {
        lock(&self.shared.decoder).push(bytes);
        loop {
            let personality = self.personality();
            let next = lock(&self.shared.decoder).next_frame(personality);
            match next {
                Ok(Some(frame)) => self.on_frame(frame),
                Ok(None) => break,
                Err(err) if err.is_malformed() => self.malformed(&err),
                Err(FrameError::UnidentifiedOrigin { origin, kind }) => {
                    trace!(origin, kind, "dropping frame before personality is known");
                }
                Err(err) => {
                    debug!(error = %err, "frame decoder stopped");
                    break;
                }
            }
        }
    }

    /// Handle one inbound frame: suppress our own echoes, then process.
    ///
    /// Ignored unless connected, so nothing that arrives after disconnect
    /// touches the echo queue.
    pub fn on_frame(&self, frame: Frame) {
        if !self.is_connected() {
            return;
        }
        {
            let mut echoes = lock(&self.shared.echoes);
            if echoes.is_enabled() {
                let echoed = echoes.match_and_remove(&frame);
                let purged = echoes.purge_expired(Instant::now(), self.is_holdoff());
                if purged > 0 {
                    self.shared.flow.notify_one();
                }
                if echoed {
                    trace!(kind = frame.kind_name(), "suppressed echo");
                    self.shared.flow.notify_one();
                    return;
                }
            }
        }
        self.process_frame(frame);
    }

    fn process_frame(&self, frame: Frame) {
        match Packet::decode(frame) {
            Ok(packet) => self.process_packet(&packet),
            Err(err) => self.malformed(&err),
        }
    }

    pub(crate) fn process_packet(&self, packet: &Packet) {
        let shared = &self.shared;
        shared.activity.notify_one();

        if let Some(display) = packet.display_data() {
            self.process_display(display, packet);
        }
        if !packet.frame().is_for_me() {
            return;
        }

        if let Some(kinds) = packet.busy_kinds() {
            lock(&shared.busy).on_busy(kinds);
        } else if packet.failed_kind().is_some() {
            shared.correlator.on_failure_packet(packet);
        }
        let busy = lock(&shared.busy).kinds().to_vec();
        shared.correlator.on_packet(packet, &busy);

        if let Some(alert) = packet.alert_data() {
            let table = lock(&shared.alerts).add(*alert);
            if let Some(table) = table {
                shared.listeners.each(|l| l.on_alert_table(&table));
            }
        } else if let Some(display) = packet.display_data() {
            shared.listeners.each(|l| l.on_display_data(display));
        }
        shared.listeners.each(|l| l.on_packet(packet));
    }

    fn process_display(&self, display: &DisplayData, packet: &Packet) {
        let shared = &self.shared;
        let current = self.personality();
        let voted = candidate(display, packet.frame().origin());
        let committed = lock(&shared.vote).vote(current, voted);
        if let Some(next) = committed {
            info!(from = current.name(), to = next.name(), "personality changed");
            shared.personality.send_replace(next);
        }
        let known = self.personality().is_known();
        lock(&shared.busy).on_display(known);
        if known {
            let holdoff = display.is_time_slice_holdoff();
            if shared.holdoff.swap(holdoff, Ordering::SeqCst) != holdoff {
                shared.flow.notify_one();
            }
        }
    }

    /// Replay path: display and alert frames are processed in full, other
    /// responses are cached and offered to waiting handlers.
    pub(crate) fn on_demo_packet(&self, cache: &DemoCache, packet: Packet) {
        if packet.display_data().is_some() || packet.alert_data().is_some() {
            if self.is_connected() {
                self.process_packet(&packet);
            }
            return;
        }
        cache.store(&packet);
        if self.is_connected() {
            self.shared.activity.notify_one();
            self.shared.correlator.on_packet(&packet, &[]);
            self.shared.listeners.each(|l| l.on_packet(&packet));
        }
    }

    pub(crate) fn start_demo(&self, cache: Arc<DemoCache>) -> Result<()> {
        {
            let state = lock(&self.shared.state);
            if *state != ConnectionState::Disconnected {
                return Err(ClientError::InvalidState {
                    from: *state,
                    action: "start demo replay",
                });
            }
        }
        *lock(&self.shared.demo) = Some(cache);
        self.connect()?;
        self.force_personality(Personality::Checksum);
        self.on_connected();
        Ok(())
    }

    /// Set the personality directly, skipping the vote.
    pub fn force_personality(&self, personality: Personality) {
        lock(&self.shared.vote).reset();
        self.shared.personality.send_replace(personality);
    }

    pub(crate) fn notify(&self, text: &str) {
        self.shared.listeners.each(|l| l.on_notification(text));
    }

    pub(crate) fn malformed(&self, err: &dyn fmt::Display) {
        debug!(error = %err, "malformed data");
        let message = err.to_string();
        self.shared.listeners.each(|l| l.on_malformed_data(&message));
    }

    /// Pump a blocking reader into [`on_bytes`](Self::on_bytes) until it
    /// reaches end of stream or fails, then report the connection lost.
    pub fn spawn_reader<R>(&self, mut reader: R) -> JoinHandle<()>
    where
        R: Read + Send + 'static,
    {
        let connection = self.clone();
        self.shared.runtime.spawn_blocking(move || {
            let mut buf = [0u8; READ_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => connection.on_bytes(&buf[..n]),
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => {
                        warn!(error = %err, "read failed");
                        break;
                    }
                }
                if connection.state() == ConnectionState::Disconnected {
                    return;
                }
            }
            connection.on_connection_lost();
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("personality", &self.personality())
            .field("link", &self.link_kind())
            .field("pending", &self.pending_requests())
            .field("handlers", &self.live_handlers())
            .finish()
    }
}

async fn run_expiry(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.config.expiry_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => shared.expire(),
        }
    }
    trace!("expiry stopped");
}

/// Raise `on_no_data` once per quiet period; any processed frame re-arms.
async fn run_watchdog(shared: Arc<Shared>, cancel: CancellationToken) {
    let timeout = shared.config.data_timeout;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.activity.notified() => continue,
            _ = tokio::time::sleep(timeout) => {}
        }
        debug!(timeout_ms = timeout.as_millis() as u64, "no data received");
        shared.listeners.each(|l| l.on_no_data());
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.activity.notified() => {}
        }
    }
    trace!("watchdog stopped");
}
