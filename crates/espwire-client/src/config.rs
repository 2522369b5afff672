use std::time::Duration;

/// Default engine-wide response timeout.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(5000);

/// Tuning knobs for a [`Connection`](crate::Connection).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Raise `no_data_detected` after this long without an inbound frame.
    pub data_timeout: Duration,
    /// Default time a sent request waits for its response.
    pub response_timeout: Duration,
    /// Cadence of the expiry activity.
    pub expiry_interval: Duration,
    /// Lifetime of an echo entry.
    pub echo_timeout: Duration,
    /// Echo entries in flight before the writer stalls.
    pub max_pending_echoes: usize,
    /// Restrict writes while the detector runs in legacy mode.
    pub protect_legacy: bool,
    /// Track sent frames so their echoes are suppressed.
    pub use_echo_queue: bool,
    /// Consecutive agreeing display frames needed to change personality.
    pub personality_threshold: u32,
    /// Clean display frames needed to clear the busy list.
    pub busy_clear_threshold: u32,
    /// Re-check cadence while the writer waits for credit or echo room.
    pub flow_control_poll: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_timeout: Duration::from_secs(5),
            response_timeout: RESPONSE_TIMEOUT,
            expiry_interval: Duration::from_millis(80),
            echo_timeout: Duration::from_millis(1000),
            max_pending_echoes: 4,
            protect_legacy: true,
            use_echo_queue: true,
            personality_threshold: 10,
            busy_clear_threshold: 2,
            flow_control_poll: Duration::from_millis(10),
        }
    }
}

impl ClientConfig {
    pub fn with_data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = timeout;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    pub fn with_expiry_interval(mut self, interval: Duration) -> Self {
        self.expiry_interval = interval;
        self
    }

    pub fn with_echo_timeout(mut self, timeout: Duration) -> Self {
        self.echo_timeout = timeout;
        self
    }

    pub fn with_protect_legacy(mut self, protect: bool) -> Self {
        self.protect_legacy = protect;
        self
    }

    pub fn with_echo_queue(mut self, enabled: bool) -> Self {
        self.use_echo_queue = enabled;
        self
    }
}

/// Settings for demo replay.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    /// Demo text: comments, `<label:message>` notifications and hex lines.
    pub data: String,
    /// Restart from the top after the last line.
    pub repeat: bool,
    /// Delay between replayed data lines.
    pub frame_interval: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            data: String::new(),
            repeat: true,
            frame_interval: Duration::from_millis(68),
        }
    }
}

impl DemoConfig {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn with_frame_interval(mut self, interval: Duration) -> Self {
        self.frame_interval = interval;
        self
    }
}
