use std::fmt;
use std::io;

use espwire_client::ClientError;
use espwire_frame::FrameError;

// sysexits-style exit codes.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::InvalidData => DATA_INVALID,
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(DATA_INVALID, format!("{context}: {other}")),
    }
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    match err {
        ClientError::Frame(err) => frame_error(context, err),
        ClientError::Demo(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ClientError::InvalidArgument(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ClientError::Transport(_) | ClientError::NotConnected => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_input_maps_to_data_invalid() {
        let err = frame_error("decode", FrameError::InvalidStartOfFrame(0x00));
        assert_eq!(err.code, DATA_INVALID);
        assert!(err.message.starts_with("decode: invalid start of frame"));
    }

    #[test]
    fn missing_file_is_a_plain_failure() {
        let err = io_error("read", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn runtime_errors_are_internal() {
        assert_eq!(client_error("start", ClientError::NoRuntime).code, INTERNAL);
        assert_eq!(
            client_error("start", ClientError::Demo("empty".to_string())).code,
            DATA_INVALID
        );
    }
}
