use espwire_frame::{DeviceId, DisplayData, Personality};

/// The personality a display frame argues for.
pub fn candidate(display: &DisplayData, origin: DeviceId) -> Personality {
    if display.is_legacy() {
        Personality::Legacy
    } else if origin == DeviceId::V1NoChecksum {
        Personality::NoChecksum
    } else {
        Personality::Checksum
    }
}

/// Debounces personality changes: a new personality is committed only
/// after `threshold` consecutive display frames agree on it.
#[derive(Debug, Clone)]
pub struct PersonalityVote {
    threshold: u32,
    candidate: Personality,
    streak: u32,
}

impl PersonalityVote {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            candidate: Personality::Unknown,
            streak: 0,
        }
    }

    /// Count one vote. Returns the personality to commit, if any.
    pub fn vote(&mut self, current: Personality, candidate: Personality) -> Option<Personality> {
        if candidate == current {
            self.reset();
            return None;
        }
        if candidate == self.candidate {
            self.streak += 1;
        } else {
            self.candidate = candidate;
            self.streak = 1;
        }
        if self.streak >= self.threshold {
            self.reset();
            return Some(candidate);
        }
        None
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn reset(&mut self) {
        self.candidate = Personality::Unknown;
        self.streak = 0;
    }
}

/// Kinds the detector has reported busy, cleared after enough clean
/// display frames.
#[derive(Debug, Clone)]
pub struct BusyTracker {
    kinds: Vec<u8>,
    clean_frames: u32,
    threshold: u32,
}

impl BusyTracker {
    pub fn new(threshold: u32) -> Self {
        Self {
            kinds: Vec::new(),
            clean_frames: 0,
            threshold,
        }
    }

    pub fn kinds(&self) -> &[u8] {
        &self.kinds
    }

    pub fn is_busy(&self, kind: u8) -> bool {
        self.kinds.contains(&kind)
    }

    pub fn on_busy(&mut self, kinds: &[u8]) {
        self.clean_frames = 0;
        for &kind in kinds {
            if !self.kinds.contains(&kind) {
                self.kinds.push(kind);
            }
        }
    }

    /// Count a display frame. While the personality is still unknown the
    /// count does not advance.
    pub fn on_display(&mut self, personality_known: bool) {
        if !personality_known {
            self.clean_frames = 0;
            return;
        }
        if self.clean_frames <= self.threshold {
            self.clean_frames += 1;
        }
        if self.clean_frames == self.threshold {
            self.kinds.clear();
        }
    }

    pub fn reset(&mut self) {
        self.kinds.clear();
        self.clean_frames = 0;
    }
}
