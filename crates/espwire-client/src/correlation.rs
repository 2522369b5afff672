//! Matching of inbound packets to the handlers of sent requests.
//!
//! The handler list is only locked long enough to snapshot or edit it.
//! Continuations always run with no lock held, so they may enqueue new
//! requests or register handlers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use espwire_frame::packet_id::{RESP_DATA_ERROR, RESP_UNSUPPORTED_PACKET};
use espwire_frame::{Frame, Packet};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::request::{lock, Request, RequestFailure, ResponseHandler};

/// Live response handlers, oldest first.
#[derive(Debug)]
pub struct Correlator {
    handlers: Mutex<Vec<Arc<ResponseHandler>>>,
    timeout: Duration,
}

impl Correlator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
            timeout,
        }
    }

    /// Engine-default response timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Add a handler. Registering the same handler twice is a no-op.
    pub fn register(&self, handler: &Arc<ResponseHandler>) {
        let mut handlers = lock(&self.handlers);
        if !handlers.iter().any(|h| Arc::ptr_eq(h, handler)) {
            handlers.push(Arc::clone(handler));
        }
    }

    pub fn remove(&self, handler: &Arc<ResponseHandler>) -> bool {
        let mut handlers = lock(&self.handlers);
        match handlers.iter().position(|h| Arc::ptr_eq(h, handler)) {
            Some(i) => {
                handlers.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handler: &Arc<ResponseHandler>) -> bool {
        lock(&self.handlers).iter().any(|h| Arc::ptr_eq(h, handler))
    }

    pub fn len(&self) -> usize {
        lock(&self.handlers).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.handlers).is_empty()
    }

    /// Remove the newest handler that sent `frame`.
    pub fn remove_for_frame(&self, frame: &Frame) -> Option<Arc<ResponseHandler>> {
        self.remove_where(|h| h.has_request_matching(frame))
    }

    /// Remove the newest handler that sent exactly these wire bytes.
    pub fn remove_for_wire(&self, wire: &[u8]) -> Option<Arc<ResponseHandler>> {
        self.remove_where(|h| h.has_request_with_wire(wire))
    }

    fn remove_where(
        &self,
        pred: impl Fn(&ResponseHandler) -> bool,
    ) -> Option<Arc<ResponseHandler>> {
        let mut handlers = lock(&self.handlers);
        let index = handlers.iter().rposition(|h| pred(h))?;
        Some(handlers.remove(index))
    }

    /// Offer an inbound packet to the live handlers, newest first.
    ///
    /// A keyed handler sees the packet when it accepts the kind and has a
    /// request addressed to the packet's origin; the first one that retires
    /// on it claims the packet. A fire-once handler is confirmed unless one
    /// of its request kinds is listed in `busy`.
    pub fn on_packet(&self, packet: &Packet, busy: &[u8]) {
        let candidates: Vec<_> = lock(&self.handlers).iter().rev().cloned().collect();
        let origin = packet.frame().origin();

        for handler in candidates {
            if handler.is_fire_once() {
                if handler.has_request_kind_in(busy) {
                    continue;
                }
                if handler.succeed(None) {
                    self.remove(&handler);
                }
            } else if handler.accepts(packet.kind()) && handler.has_request_from(origin) {
                if handler.succeed(Some(packet)) {
                    self.remove(&handler);
                    break;
                }
            }
        }
    }

    /// Fail the handler named by a device failure packet.
    ///
    /// The handler is found by the failed kind carried in the payload and
    /// the packet's origin.
    pub fn on_failure_packet(&self, packet: &Packet) {
        let Some(failed) = packet.failed_kind() else {
            return;
        };
        let origin = packet.frame().origin();
        info!(kind = failed, origin = %origin, "request not processed by device");

        let Some(handler) = self.remove_where(|h| h.has_request_to(failed, origin)) else {
            return;
        };
        let destination = origin.as_nibble();
        let failure = match packet.kind() {
            RESP_DATA_ERROR => RequestFailure::DataError { kind: failed },
            RESP_UNSUPPORTED_PACKET => RequestFailure::Unsupported {
                kind: failed,
                destination,
            },
            _ => RequestFailure::NotProcessed {
                kind: failed,
                destination,
            },
        };
        handler.fail(failure);
    }

    /// Expire live handlers and queued requests.
    ///
    /// Nothing bound to a kind in `busy` expires: the destination is still
    /// working on it. Queued requests whose handler is live are left for the
    /// handler's own timeout.
    pub fn expire(&self, now: Instant, pending: &mut VecDeque<Request>, busy: &[u8]) {
        for (handler, failure) in self.collect_expired(now, pending, busy) {
            handler.fail(failure);
        }
    }

    /// The removal half of [`expire`](Self::expire): drops expired handlers
    /// and requests and returns the handlers to fail. The caller runs the
    /// failures once it has released whatever guards `pending`.
    pub fn collect_expired(
        &self,
        now: Instant,
        pending: &mut VecDeque<Request>,
        busy: &[u8],
    ) -> Vec<(Arc<ResponseHandler>, RequestFailure)> {
        let mut timed_out: Vec<Arc<ResponseHandler>> = Vec::new();
        let mut unsent: Vec<Arc<ResponseHandler>> = Vec::new();

        {
            let mut handlers = lock(&self.handlers);
            if handlers.is_empty() && pending.is_empty() {
                return Vec::new();
            }

            handlers.retain(|h| {
                if h.has_request_kind_in(busy) || !h.has_expired(self.timeout, now) {
                    return true;
                }
                timed_out.push(Arc::clone(h));
                false
            });

            pending.retain(|request| {
                if busy.contains(&request.kind())
                    || !request.has_expired_unsent(self.timeout, now)
                {
                    return true;
                }
                let Some(handler) = request.handler() else {
                    debug!(kind = request.frame().kind_name(), "dropping expired request");
                    return false;
                };
                if handlers.iter().any(|h| Arc::ptr_eq(h, handler)) {
                    return true;
                }
                if !contains(&timed_out, handler) && !contains(&unsent, handler) {
                    unsent.push(Arc::clone(handler));
                }
                false
            });

            pending.retain(|request| {
                request
                    .handler()
                    .is_none_or(|h| !contains(&timed_out, h) && !contains(&unsent, h))
            });
        }

        timed_out
            .into_iter()
            .map(|h| (h, RequestFailure::TimedOut))
            .chain(
                unsent
                    .into_iter()
                    .map(|h| (h, RequestFailure::TimedOutBeforeSent)),
            )
            .collect()
    }

    /// Fail and drop every live handler.
    pub fn fail_all(&self, failure: RequestFailure) {
        let handlers = std::mem::take(&mut *lock(&self.handlers));
        for handler in handlers {
            handler.fail(failure.clone());
        }
    }
}

fn contains(list: &[Arc<ResponseHandler>], handler: &Arc<ResponseHandler>) -> bool {
    list.iter().any(|h| Arc::ptr_eq(h, handler))
}
