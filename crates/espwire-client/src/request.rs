use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use espwire_frame::{DeviceId, Frame, Packet};
use tokio::time::Instant;

/// Why a request did not complete.
///
/// The display strings are stable and part of the public contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestFailure {
    #[error("Request timed out")]
    TimedOut,

    #[error("Request timed out before it could be sent")]
    TimedOutBeforeSent,

    #[error("Request not processed, device disconnected")]
    Disconnected,

    #[error("Data error for packet Id = {kind:02X}")]
    DataError { kind: u8 },

    #[error("Request ID = {kind:02X} is not supported by destination = {destination:02X}")]
    Unsupported { kind: u8, destination: u8 },

    #[error("Request ID = {kind} could not be processed by destination = {destination:02X}")]
    NotProcessed { kind: u8, destination: u8 },

    #[error("Failed to send ESP packet")]
    SendFailed,

    #[error("Request failed to send because the client isn't connected")]
    NotConnected,

    /// The response arrived but did not carry acceptable data.
    #[error("{0}")]
    InvalidResponse(String),
}

type SuccessFn = Box<dyn FnMut(Option<&Packet>) -> bool + Send>;
type FailureFn = Box<dyn FnOnce(RequestFailure) + Send>;

/// A request that has been handed to the transport.
#[derive(Debug, Clone)]
pub(crate) struct SentRequest {
    pub kind: u8,
    pub destination: DeviceId,
    pub frame: Frame,
    pub wire: Bytes,
    pub sent_at: Instant,
    pub timeout: Option<Duration>,
    pub processing_time: Duration,
}

impl SentRequest {
    fn has_expired(&self, default_timeout: Duration, now: Instant) -> bool {
        let limit = self
            .timeout
            .unwrap_or(default_timeout)
            .max(self.processing_time);
        now.saturating_duration_since(self.sent_at) > limit
    }
}

/// A caller's continuation awaiting one or more response kinds.
///
/// A handler with no accepted kinds completes once its request has been
/// sent and the destination no longer reports it busy.
///
/// The success continuation may run many times; returning `true` retires
/// the handler. The failure continuation runs at most once, and never
/// after the handler has retired.
pub struct ResponseHandler {
    kinds: Vec<u8>,
    sent: Mutex<Vec<SentRequest>>,
    on_success: Mutex<Option<SuccessFn>>,
    on_failure: Mutex<Option<FailureFn>>,
    finished: AtomicBool,
}

impl ResponseHandler {
    pub fn new() -> Self {
        Self {
            kinds: Vec::new(),
            sent: Mutex::new(Vec::new()),
            on_success: Mutex::new(None),
            on_failure: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }

    /// Accept response frames of `kind`.
    pub fn accept(mut self, kind: u8) -> Self {
        if !self.kinds.contains(&kind) {
            self.kinds.push(kind);
        }
        self
    }

    pub fn on_success<F>(self, f: F) -> Self
    where
        F: FnMut(Option<&Packet>) -> bool + Send + 'static,
    {
        *lock(&self.on_success) = Some(Box::new(f));
        self
    }

    pub fn on_failure<F>(self, f: F) -> Self
    where
        F: FnOnce(RequestFailure) + Send + 'static,
    {
        *lock(&self.on_failure) = Some(Box::new(f));
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn kinds(&self) -> &[u8] {
        &self.kinds
    }

    pub fn accepts(&self, kind: u8) -> bool {
        self.kinds.contains(&kind)
    }

    /// Completes on send rather than on a response.
    pub fn is_fire_once(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Number of requests sent on behalf of this handler.
    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    pub(crate) fn bind(&self, request: SentRequest) {
        lock(&self.sent).push(request);
    }

    /// Some sent request was addressed to `destination`.
    pub(crate) fn has_request_from(&self, destination: DeviceId) -> bool {
        lock(&self.sent)
            .iter()
            .any(|r| r.destination.as_nibble() == destination.as_nibble())
    }

    pub(crate) fn has_request_to(&self, kind: u8, destination: DeviceId) -> bool {
        lock(&self.sent)
            .iter()
            .any(|r| r.kind == kind && r.destination.as_nibble() == destination.as_nibble())
    }

    pub(crate) fn has_request_kind_in(&self, kinds: &[u8]) -> bool {
        !kinds.is_empty() && lock(&self.sent).iter().any(|r| kinds.contains(&r.kind))
    }

    pub(crate) fn has_request_matching(&self, frame: &Frame) -> bool {
        lock(&self.sent).iter().any(|r| r.frame == *frame)
    }

    pub(crate) fn has_request_with_wire(&self, wire: &[u8]) -> bool {
        lock(&self.sent).iter().any(|r| r.wire.as_ref() == wire)
    }

    /// All sent requests have outlived their timeout.
    pub(crate) fn has_expired(&self, default_timeout: Duration, now: Instant) -> bool {
        lock(&self.sent)
            .iter()
            .all(|r| r.has_expired(default_timeout, now))
    }

    /// Run the success continuation. Returns `true` when the handler is done.
    pub(crate) fn succeed(&self, packet: Option<&Packet>) -> bool {
        if self.is_finished() {
            return true;
        }
        let done = match lock(&self.on_success).as_mut() {
            Some(callback) => callback(packet),
            None => true,
        };
        if done {
            self.finished.store(true, Ordering::SeqCst);
        }
        done
    }

    /// Run the failure continuation, once.
    pub(crate) fn fail(&self, failure: RequestFailure) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = lock(&self.on_failure).take();
        if let Some(callback) = callback {
            callback(failure);
        }
    }
}

impl Default for ResponseHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseHandler")
            .field("kinds", &self.kinds)
            .field("sent", &self.sent_count())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

/// An outbound frame plus the bookkeeping needed to correlate its answer.
#[derive(Debug, Clone)]
pub struct Request {
    frame: Frame,
    handler: Option<Arc<ResponseHandler>>,
    processing_time: Duration,
    created_at: Instant,
    timeout: Option<Duration>,
}

impl Request {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            handler: None,
            processing_time: Duration::ZERO,
            created_at: Instant::now(),
            timeout: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<ResponseHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Minimum time the destination needs before a response can be expected.
    pub fn with_processing_time(mut self, processing_time: Duration) -> Self {
        self.processing_time = processing_time;
        self
    }

    /// Override the engine's response timeout for this request.
    /// A zero duration keeps the engine default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn kind(&self) -> u8 {
        self.frame.kind()
    }

    pub fn handler(&self) -> Option<&Arc<ResponseHandler>> {
        self.handler.as_ref()
    }

    pub fn processing_time(&self) -> Duration {
        self.processing_time
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub(crate) fn shares_handler(&self, handler: &Arc<ResponseHandler>) -> bool {
        self.handler
            .as_ref()
            .is_some_and(|own| Arc::ptr_eq(own, handler))
    }

    /// Queued long enough that it can no longer be answered in time.
    pub(crate) fn has_expired_unsent(&self, default_timeout: Duration, now: Instant) -> bool {
        let timeout = self.timeout.unwrap_or(default_timeout);
        self.created_at + self.processing_time + timeout <= now
    }

    pub(crate) fn into_sent(self, frame: Frame, wire: Bytes, sent_at: Instant) -> SentRequest {
        SentRequest {
            kind: frame.kind(),
            destination: frame.destination(),
            frame,
            wire,
            sent_at,
            timeout: self.timeout,
            processing_time: self.processing_time,
        }
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
