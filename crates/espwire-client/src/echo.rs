//! Tracking of transmitted frames so their reflection on the bus is dropped.

use std::collections::VecDeque;
use std::time::Duration;

use espwire_frame::packet_id::{REQ_MUTE_ON, REQ_VERSION, RESP_REQUEST_NOT_PROCESSED, RESP_VERSION};
use espwire_frame::Frame;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct EchoEntry {
    frame: Frame,
    sent_at: Instant,
}

/// Frames sent by this engine that have not yet been seen again.
#[derive(Debug)]
pub struct EchoQueue {
    entries: VecDeque<EchoEntry>,
    enabled: bool,
    capacity: usize,
    timeout: Duration,
}

impl EchoQueue {
    pub fn new(capacity: usize, timeout: Duration) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            enabled: true,
            capacity,
            timeout,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// At capacity while echo tracking is enabled.
    pub fn is_full(&self) -> bool {
        self.enabled && self.entries.len() >= self.capacity
    }

    /// Record a transmitted frame. Mute-on requests are never echoed.
    pub fn record(&mut self, frame: Frame, now: Instant) {
        if !self.enabled || frame.kind() == REQ_MUTE_ON {
            return;
        }
        debug!(
            kind = frame.kind_name(),
            destination = %frame.destination(),
            "tracking echo"
        );
        self.entries.push_back(EchoEntry {
            frame,
            sent_at: now,
        });
    }

    /// Check an inbound frame against the recorded entries.
    ///
    /// Returns `true` when the frame is an echo and must be suppressed. At
    /// most one entry is removed. Two cases remove an entry without
    /// suppressing the frame: a "request not processed" naming a recorded
    /// kind, and a version response answering a recorded self-addressed
    /// version request.
    pub fn match_and_remove(&mut self, frame: &Frame) -> bool {
        let not_processed = (frame.kind() == RESP_REQUEST_NOT_PROCESSED)
            .then(|| frame.payload().first().copied())
            .flatten();

        for i in (0..self.entries.len()).rev() {
            let recorded = &self.entries[i].frame;
            if frame.kind() == RESP_REQUEST_NOT_PROCESSED {
                if not_processed == Some(recorded.kind()) {
                    debug!(kind = recorded.kind_name(), "not-processed clears echo entry");
                    self.entries.remove(i);
                    return false;
                }
                continue;
            }
            if frame == recorded {
                debug!(kind = recorded.kind_name(), "suppressed echo");
                self.entries.remove(i);
                return true;
            }
            if recorded.is_self_addressed()
                && frame.is_self_addressed()
                && recorded.kind() == REQ_VERSION
                && frame.kind() == RESP_VERSION
            {
                self.entries.remove(i);
                return false;
            }
        }
        false
    }

    /// Drop the most recent entry equal to `frame`.
    pub fn remove(&mut self, frame: &Frame) -> bool {
        match self.entries.iter().rposition(|e| e.frame == *frame) {
            Some(i) => {
                self.entries.remove(i);
                true
            }
            None => false,
        }
    }

    /// Expire old entries. While `holdoff` is asserted the bus cannot carry
    /// our frames, so stale entries are refreshed instead of dropped.
    pub fn purge_expired(&mut self, now: Instant, holdoff: bool) -> usize {
        let timeout = self.timeout;
        let mut purged = 0;
        self.entries.retain_mut(|entry| {
            if now.saturating_duration_since(entry.sent_at) <= timeout {
                return true;
            }
            if holdoff {
                entry.sent_at = now;
                return true;
            }
            warn!(
                kind = entry.frame.kind_name(),
                destination = %entry.frame.destination(),
                "purging expired echo entry"
            );
            purged += 1;
            false
        });
        purged
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use espwire_frame::{request, DeviceId, Personality};

    fn queue() -> EchoQueue {
        EchoQueue::new(4, Duration::from_millis(1000))
    }

    fn sent(frame: Frame) -> Frame {
        frame.resolve(Personality::Checksum)
    }

    #[tokio::test(start_paused = true)]
    async fn identical_frame_is_suppressed_once() {
        let mut echoes = queue();
        let frame = sent(request::all_volume());
        echoes.record(frame.clone(), Instant::now());

        assert!(echoes.match_and_remove(&frame));
        assert!(!echoes.match_and_remove(&frame));
        assert!(echoes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn mute_on_is_never_recorded() {
        let mut echoes = queue();
        echoes.record(sent(request::mute(true)), Instant::now());
        assert!(echoes.is_empty());
        echoes.record(sent(request::mute(false)), Instant::now());
        assert_eq!(echoes.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_queue_records_nothing_and_is_never_full() {
        let mut echoes = EchoQueue::new(1, Duration::from_millis(1000));
        echoes.set_enabled(false);
        echoes.record(sent(request::battery_voltage()), Instant::now());
        assert!(echoes.is_empty());
        assert!(!echoes.is_full());
    }

    #[tokio::test(start_paused = true)]
    async fn full_at_capacity() {
        let mut echoes = queue();
        for _ in 0..4 {
            echoes.record(sent(request::battery_voltage()), Instant::now());
        }
        assert!(echoes.is_full());
    }

    #[tokio::test(start_paused = true)]
    async fn version_response_answers_self_addressed_request() {
        let mut echoes = queue();
        echoes.record(request::version(DeviceId::V1Connection), Instant::now());

        let response = Frame::new(
            DeviceId::V1Connection,
            DeviceId::V1Connection,
            RESP_VERSION,
            &b"V4.1000"[..],
        );
        assert!(!echoes.match_and_remove(&response));
        assert!(echoes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn not_processed_clears_matching_entry_without_suppressing() {
        let mut echoes = queue();
        echoes.record(sent(request::sweep_sections()), Instant::now());
        let failure = Frame::new(
            DeviceId::V1WithChecksum,
            DeviceId::V1Connection,
            RESP_REQUEST_NOT_PROCESSED,
            vec![request::sweep_sections().kind()],
        );
        assert!(!echoes.match_and_remove(&failure));
        assert!(echoes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_purged_unless_holdoff() {
        let mut echoes = queue();
        let start = Instant::now();
        echoes.record(sent(request::current_volume()), start);

        let later = start + Duration::from_millis(1500);
        assert_eq!(echoes.purge_expired(later, true), 0);
        assert_eq!(echoes.len(), 1);

        // Refreshed at `later`, so still alive shortly after.
        assert_eq!(echoes.purge_expired(later + Duration::from_millis(900), false), 0);
        assert_eq!(echoes.purge_expired(later + Duration::from_millis(1001), false), 1);
        assert!(echoes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn remove_drops_one_entry() {
        let mut echoes = queue();
        let frame = sent(request::all_volume());
        echoes.record(frame.clone(), Instant::now());
        echoes.record(frame.clone(), Instant::now());
        assert!(echoes.remove(&frame));
        assert_eq!(echoes.len(), 1);
    }
}
