/// Errors that can occur while handing bytes to a transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An I/O error occurred on the underlying link.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The link refused the write without an I/O error.
    #[error("transport rejected write of {0} bytes")]
    WriteRejected(usize),

    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
