use std::fmt;
use std::sync::{Arc, Mutex};

use espwire_frame::{AlertData, DisplayData, Frame, Packet};

use crate::request::lock;

/// Connection lifecycle notifications.
///
/// `ConnectionFailed` and `ConnectionLost` are momentary: the connection is
/// already `Disconnected` when they are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    Disconnected,
    Connecting,
    Connected,
    ConnectionFailed,
    ConnectionLost,
    Disconnecting,
}

impl ConnectionEvent {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionEvent::Disconnected => "Disconnected",
            ConnectionEvent::Connecting => "Connecting",
            ConnectionEvent::Connected => "Connected",
            ConnectionEvent::ConnectionFailed => "Connection Failed",
            ConnectionEvent::ConnectionLost => "Connection Lost",
            ConnectionEvent::Disconnecting => "Disconnecting",
        }
    }
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Observer of everything a connection surfaces.
///
/// Every method has an empty default, so implementors override only what
/// they need. Callbacks run on engine tasks with no engine lock held; they
/// should return promptly.
pub trait EspListener: Send + Sync {
    /// Any packet addressed to this engine that was not an echo.
    fn on_packet(&self, _packet: &Packet) {}

    fn on_display_data(&self, _display: &DisplayData) {}

    /// A complete alert table; empty when no alerts are active.
    fn on_alert_table(&self, _alerts: &[AlertData]) {}

    fn on_connection_event(&self, _event: ConnectionEvent, _is_demo: bool) {}

    fn on_malformed_data(&self, _message: &str) {}

    fn on_no_data(&self) {}

    /// Text notification embedded in demo data.
    fn on_notification(&self, _text: &str) {}

    fn on_write_completed(&self, _frame: &Frame) {}
}

#[derive(Default)]
pub(crate) struct Listeners {
    registered: Mutex<Vec<Arc<dyn EspListener>>>,
}

impl Listeners {
    pub fn add(&self, listener: Arc<dyn EspListener>) {
        let mut registered = lock(&self.registered);
        if !registered.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            registered.push(listener);
        }
    }

    pub fn remove(&self, listener: &Arc<dyn EspListener>) {
        lock(&self.registered).retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn clear(&self) {
        lock(&self.registered).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.registered).len()
    }

    /// Call `f` for each listener, outside the registry lock.
    pub fn each(&self, f: impl Fn(&dyn EspListener)) {
        let snapshot: Vec<_> = lock(&self.registered).clone();
        for listener in &snapshot {
            f(listener.as_ref());
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}
