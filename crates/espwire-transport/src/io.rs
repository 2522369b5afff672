use std::io::{ErrorKind, Write};
use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::error::{Result, TransportError};
use crate::traits::{LinkKind, Transport};

/// Transport over any `Write` sink (serial port, socket, pipe).
///
/// Writes are serialized through an internal mutex so the engine's single
/// writer and any diagnostic writer can share one sink.
pub struct IoTransport<W> {
    inner: Mutex<W>,
    link: LinkKind,
}

impl<W: Write + Send> IoTransport<W> {
    /// Wrap a stream-link sink.
    pub fn stream(inner: W) -> Self {
        Self::new(inner, LinkKind::Stream)
    }

    /// Wrap a sink with an explicit link kind.
    pub fn new(inner: W, link: LinkKind) -> Self {
        Self {
            inner: Mutex::new(inner),
            link,
        }
    }

    /// Consume the transport and return the inner sink.
    pub fn into_inner(self) -> W {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Transport for IoTransport<W> {
    fn link_kind(&self) -> LinkKind {
        self.link
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let mut offset = 0usize;
        while offset < bytes.len() {
            match inner.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Closed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        loop {
            match inner.flush() {
                Ok(()) => break,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }

        trace!(len = bytes.len(), link = %self.link, "bytes written");
        Ok(())
    }
}
