use std::fmt;

use crate::error::Result;

/// Framing family spoken by a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    /// Byte stream (serial-over-radio). Frames are `0x7F`-delimited and escaped.
    Stream,
    /// One complete bare frame per delivery. Writes consume a single write credit.
    Message,
}

impl LinkKind {
    /// Whether a write must wait for the link to hand back its write credit.
    pub fn uses_write_credit(self) -> bool {
        matches!(self, LinkKind::Message)
    }
}

impl fmt::Display for LinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkKind::Stream => f.write_str("stream"),
            LinkKind::Message => f.write_str("message"),
        }
    }
}

/// Outbound half of a link, as consumed by the protocol engine.
///
/// `write` is a synchronous send attempt: `Ok(())` means the bytes were
/// handed to the link, an error means the send failed immediately.
pub trait Transport: Send + Sync {
    /// Framing family of this link.
    fn link_kind(&self) -> LinkKind;

    /// Hand fully framed bytes to the link.
    fn write(&self, bytes: &[u8]) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn link_kind(&self) -> LinkKind {
        (**self).link_kind()
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        (**self).write(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_message_links_use_write_credit() {
        assert!(LinkKind::Message.uses_write_credit());
        assert!(!LinkKind::Stream.uses_write_credit());
    }

    #[test]
    fn link_kind_display() {
        assert_eq!(LinkKind::Stream.to_string(), "stream");
        assert_eq!(LinkKind::Message.to_string(), "message");
    }
}
