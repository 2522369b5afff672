use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::codec::{checksum, DEST_BASE, EOF, ORIG_BASE, SOF};
use crate::device::{DeviceId, Personality};
use crate::error::{FrameError, Result};
use crate::hex;
use crate::packet_id;

/// Framing bytes around the payload: SOF, dest, orig, kind, len, EOF.
pub const FRAMING_LEN: usize = 6;

/// Largest payload whose bare frame still fits a stream-link length byte.
pub const MAX_PAYLOAD: usize = u8::MAX as usize - FRAMING_LEN - 1;

/// One protocol frame.
///
/// Frames are immutable. Checksum presence is not stored in the frame; it
/// is resolved from the peer [`Personality`] when the frame is encoded.
/// Frames decoded from the wire remember the personality they were decoded
/// under, which does not take part in equality.
#[derive(Clone)]
pub struct Frame {
    destination: DeviceId,
    origin: DeviceId,
    kind: u8,
    payload: Bytes,
    personality: Personality,
}

impl Frame {
    /// Create a frame.
    pub fn new(
        origin: DeviceId,
        destination: DeviceId,
        kind: u8,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            destination,
            origin,
            kind,
            payload: payload.into(),
            personality: Personality::Unknown,
        }
    }

    /// Tag the frame with the personality it was received under.
    pub fn with_personality(mut self, personality: Personality) -> Self {
        self.personality = personality;
        self
    }

    pub fn destination(&self) -> DeviceId {
        self.destination
    }

    pub fn origin(&self) -> DeviceId {
        self.origin
    }

    pub fn kind(&self) -> u8 {
        self.kind
    }

    pub fn kind_name(&self) -> &'static str {
        packet_id::name(self.kind)
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn personality(&self) -> Personality {
        self.personality
    }

    /// Whether this frame carried a checksum when it was decoded.
    pub fn has_checksum(&self) -> bool {
        self.personality.uses_checksum()
    }

    pub fn is_from_v1(&self) -> bool {
        self.origin.is_v1()
    }

    pub fn is_for_v1(&self) -> bool {
        self.destination.is_v1()
    }

    /// Addressed to this engine, directly or by broadcast.
    pub fn is_for_me(&self) -> bool {
        matches!(
            self.destination,
            DeviceId::V1Connection | DeviceId::GeneralBroadcast
        )
    }

    /// Origin and destination are the same device.
    pub fn is_self_addressed(&self) -> bool {
        self.destination.as_nibble() == self.origin.as_nibble()
    }

    /// The frame as it goes on the wire under `personality`: requests to the
    /// detector are re-addressed to the id that personality listens on.
    pub fn resolve(&self, personality: Personality) -> Frame {
        let destination = match personality.destination() {
            Some(dest) if self.destination.is_v1() => dest,
            _ => self.destination,
        };
        Frame {
            destination,
            origin: self.origin,
            kind: self.kind,
            payload: self.payload.clone(),
            personality,
        }
    }

    /// Wire size of the bare frame under `personality`.
    pub fn wire_len(&self, personality: Personality) -> usize {
        FRAMING_LEN + self.payload.len() + usize::from(personality.uses_checksum())
    }

    /// Encode the bare frame under `personality`.
    ///
    /// Wire format:
    /// ```text
    /// ┌──────┬───────────┬───────────┬──────┬─────┬─────────┬──────────┬──────┐
    /// │ 0xAA │ dest|0xD0 │ orig|0xE0 │ kind │ len │ payload │ [chksum] │ 0xAB │
    /// └──────┴───────────┴───────────┴──────┴─────┴─────────┴──────────┴──────┘
    /// ```
    /// `len` counts the payload plus the checksum byte when present.
    pub fn encode(&self, personality: Personality, dst: &mut BytesMut) -> Result<()> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD,
            });
        }
        let resolved = self.resolve(personality);
        let with_checksum = personality.uses_checksum();
        let start = dst.len();

        dst.reserve(self.wire_len(personality));
        dst.put_u8(SOF);
        dst.put_u8(resolved.destination.as_nibble() | DEST_BASE);
        dst.put_u8(resolved.origin.as_nibble() | ORIG_BASE);
        dst.put_u8(self.kind);
        dst.put_u8((self.payload.len() + usize::from(with_checksum)) as u8);
        dst.put_slice(&self.payload);
        if with_checksum {
            let sum = checksum(&dst[start..]);
            dst.put_u8(sum);
        }
        dst.put_u8(EOF);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self, personality: Personality) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_len(personality));
        self.encode(personality, &mut dst)?;
        Ok(dst.freeze())
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.destination.as_nibble() == other.destination.as_nibble()
            && self.origin.as_nibble() == other.origin.as_nibble()
            && self.kind == other.kind
            && self.payload == other.payload
    }
}

impl Eq for Frame {}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("origin", &self.origin)
            .field("destination", &self.destination)
            .field("kind", &format_args!("{:#04X} ({})", self.kind, self.kind_name()))
            .field("payload", &hex::encode(&self.payload))
            .field("personality", &self.personality)
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_bytes(self.personality) {
            Ok(bytes) => f.write_str(&hex::encode(&bytes)),
            Err(_) => write!(f, "{} (oversized)", self.kind_name()),
        }
    }
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Frame", 6)?;
        state.serialize_field("origin", &self.origin)?;
        state.serialize_field("destination", &self.destination)?;
        state.serialize_field("kind", &self.kind)?;
        state.serialize_field("kind_name", self.kind_name())?;
        state.serialize_field("payload", &hex::encode(&self.payload))?;
        state.serialize_field("personality", &self.personality)?;
        state.end()
    }
}
