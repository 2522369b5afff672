use crate::connection::ConnectionState;

/// Errors returned synchronously by the connection engine.
///
/// Request outcomes are not reported here; they are delivered to the
/// request's handler as a [`RequestFailure`](crate::RequestFailure).
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] espwire_frame::FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] espwire_transport::TransportError),

    /// The connection is not established.
    #[error("not connected")]
    NotConnected,

    /// The requested transition is not valid from the current state.
    #[error("cannot {action} while {from}")]
    InvalidState {
        from: ConnectionState,
        action: &'static str,
    },

    /// The engine's background tasks need a Tokio runtime.
    #[error("no Tokio runtime is available to run the connection tasks")]
    NoRuntime,

    /// An argument was rejected at the call boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Demo replay could not start.
    #[error("demo error: {0}")]
    Demo(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
