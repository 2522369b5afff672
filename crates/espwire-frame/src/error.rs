/// Errors that can occur while framing, extracting or decoding ESP frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame does not start with `0xAA`.
    #[error("invalid start of frame (expected 0xAA, found {0:#04X})")]
    InvalidStartOfFrame(u8),

    /// The frame does not end with `0xAB`.
    #[error("invalid end of frame (expected 0xAB, found {0:#04X})")]
    InvalidEndOfFrame(u8),

    /// The destination or origin byte is missing its identifier base bits.
    #[error("invalid address bytes (destination {destination:#04X}, origin {origin:#04X})")]
    InvalidAddress { destination: u8, origin: u8 },

    /// The declared length does not match the bytes received.
    #[error("length mismatch (declared {declared}, actual {actual})")]
    LengthMismatch { declared: usize, actual: usize },

    /// The checksum byte does not match the computed sum.
    #[error("checksum mismatch (expected {expected:#04X}, found {found:#04X})")]
    ChecksumMismatch { expected: u8, found: u8 },

    /// Not enough bytes for a complete frame.
    #[error("truncated frame ({len} bytes, need at least {min})")]
    Truncated { len: usize, min: usize },

    /// A frame arrived before the peer personality is known and is not the
    /// identification response that bootstraps detection.
    #[error("frame {kind:#04X} from unidentified origin {origin} before personality is known")]
    UnidentifiedOrigin { origin: u8, kind: u8 },

    /// A known packet kind carried fewer payload bytes than its layout needs.
    #[error("payload of packet {kind:#04X} too short ({len} bytes, need {min})")]
    PayloadTooShort { kind: u8, len: usize, min: usize },

    /// A payload is too large to be described by the one-byte length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Text could not be parsed as hex bytes.
    #[error("invalid hex input: {0}")]
    InvalidHex(String),

    /// An I/O error occurred while reading frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended.
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether this error means the input was malformed, as opposed to being
    /// filtered out while the peer personality is still unknown.
    pub fn is_malformed(&self) -> bool {
        !matches!(
            self,
            FrameError::UnidentifiedOrigin { .. } | FrameError::Io(_) | FrameError::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
