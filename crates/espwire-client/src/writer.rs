//! The dispatch loop that drains the request queue onto the transport.
//!
//! Nothing is written before the detector's personality is known. While
//! the bus holds off accessory traffic only self-addressed frames go out,
//! and a request taken while writing is blocked goes back to the head of
//! the queue.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use espwire_frame::codec::encode_for_link;
use espwire_frame::packet_id::{REQ_MUTE_ON, REQ_VERSION};
use espwire_frame::{Frame, Personality};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::connection::Shared;
use crate::request::{lock, Request};

pub(crate) async fn run(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut personality = shared.personality.subscribe();
    debug!("writer started");
    loop {
        if !shared.personality().is_known() {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = personality.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
        }

        let request = if shared.holdoff.load(Ordering::SeqCst) {
            match shared.queue.take_self_addressed() {
                Some(request) => request,
                None => {
                    if !pause(&shared, &cancel).await {
                        break;
                    }
                    continue;
                }
            }
        } else {
            tokio::select! {
                _ = cancel.cancelled() => break,
                request = shared.queue.next() => request,
            }
        };

        if !can_write(&shared, request.frame()) {
            shared.queue.push(request, true);
            if !pause(&shared, &cancel).await {
                break;
            }
            continue;
        }

        let personality = shared.personality();
        if personality == Personality::Legacy
            && shared.config.protect_legacy
            && !allowed_in_legacy(request.frame())
        {
            debug!(kind = request.frame().kind_name(), "skipped in legacy mode");
            continue;
        }
        send(&shared, request, personality);
    }
    debug!("writer stopped");
}

/// Wait for a flow-control change or the next poll. `false` on cancel.
async fn pause(shared: &Shared, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = shared.flow.notified() => true,
        _ = tokio::time::sleep(shared.config.flow_control_poll) => true,
    }
}

/// Holdoff may have been raised while the writer waited for `request`.
fn can_write(shared: &Shared, frame: &Frame) -> bool {
    if shared.holdoff.load(Ordering::SeqCst) && !frame.is_self_addressed() {
        return false;
    }
    if shared.transport.link_kind().uses_write_credit()
        && !shared.write_credit.load(Ordering::SeqCst)
    {
        return false;
    }
    let mut echoes = lock(&shared.echoes);
    if echoes.is_full() {
        echoes.purge_expired(Instant::now(), shared.holdoff.load(Ordering::SeqCst));
    }
    !echoes.is_full()
}

/// The frames a legacy-mode detector may still be sent.
pub(crate) fn allowed_in_legacy(frame: &Frame) -> bool {
    match frame.kind() {
        REQ_VERSION => frame.is_self_addressed(),
        REQ_MUTE_ON => !frame.is_self_addressed(),
        _ => false,
    }
}

fn send(shared: &Shared, request: Request, personality: Personality) {
    let frame = request.frame().resolve(personality);
    let handler = request.handler().cloned();
    let link = shared.transport.link_kind();

    let wire = match encode_for_link(&frame, personality, link) {
        Ok(wire) => wire,
        Err(err) => {
            warn!(kind = frame.kind_name(), error = %err, "cannot encode request");
            shared.unwind_write(&frame, handler);
            return;
        }
    };

    let now = Instant::now();
    if let Some(handler) = &handler {
        handler.bind(request.into_sent(frame.clone(), wire.clone(), now));
        shared.correlator.register(handler);
    }
    lock(&shared.echoes).record(frame.clone(), now);
    if link.uses_write_credit() {
        shared.write_credit.store(false, Ordering::SeqCst);
    }

    match shared.transport.write(&wire) {
        Ok(()) => {
            trace!(
                kind = frame.kind_name(),
                destination = %frame.destination(),
                bytes = wire.len(),
                "sent"
            );
            shared.listeners.each(|l| l.on_write_completed(&frame));
        }
        Err(err) => {
            warn!(
                kind = frame.kind_name(),
                destination = %frame.destination(),
                error = %err,
                "write failed"
            );
            if link.uses_write_credit() {
                shared.write_credit.store(true, Ordering::SeqCst);
            }
            shared.unwind_write(&frame, handler);
        }
    }
}
