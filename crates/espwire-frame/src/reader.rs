use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use bytes::BytesMut;
use espwire_transport::LinkKind;
use tracing::debug;

use crate::codec::{extract_frame_delimited, extract_frame_plain};
use crate::device::Personality;
use crate::error::{FrameError, Result};
use crate::frame::Frame;

const INITIAL_BUFFER_CAPACITY: usize = 1024;
const READ_CHUNK_SIZE: usize = 1024;

/// Per-link accumulator that turns inbound bytes into frames.
///
/// On a stream link bytes accumulate across pushes until a delimited frame
/// is complete. On a message link every push is one complete delivery.
#[derive(Debug)]
pub struct FrameDecoder {
    link: LinkKind,
    buf: BytesMut,
    pending: VecDeque<BytesMut>,
}

impl FrameDecoder {
    pub fn new(link: LinkKind) -> Self {
        Self {
            link,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            pending: VecDeque::new(),
        }
    }

    pub fn link(&self) -> LinkKind {
        self.link
    }

    /// Append inbound bytes.
    pub fn push(&mut self, bytes: &[u8]) {
        match self.link {
            LinkKind::Stream => self.buf.extend_from_slice(bytes),
            LinkKind::Message => self.pending.push_back(BytesMut::from(bytes)),
        }
    }

    /// Extract the next frame.
    ///
    /// Returns `Ok(None)` once no complete frame remains. An error consumes
    /// the offending bytes, so callers keep calling until `Ok(None)`.
    pub fn next_frame(&mut self, personality: Personality) -> Result<Option<Frame>> {
        match self.link {
            LinkKind::Stream => extract_frame_delimited(&mut self.buf, personality),
            LinkKind::Message => {
                while let Some(mut message) = self.pending.pop_front() {
                    // An empty delivery carries nothing.
                    if let Some(frame) = extract_frame_plain(&mut message, personality)? {
                        return Ok(Some(frame));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Bytes (or deliveries) waiting to be decoded.
    pub fn buffered(&self) -> usize {
        match self.link {
            LinkKind::Stream => self.buf.len(),
            LinkKind::Message => self.pending.len(),
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.pending.clear();
    }
}

/// Reads delimited frames from any blocking `Read` stream.
///
/// Malformed frames are skipped with a debug log; callers only see complete
/// frames, I/O errors, or [`FrameError::ConnectionClosed`] at end of stream.
pub struct FrameReader<T> {
    inner: T,
    decoder: FrameDecoder,
    personality: Personality,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T, personality: Personality) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(LinkKind::Stream),
            personality,
        }
    }

    /// Read the next complete frame (blocking).
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match self.decoder.next_frame(self.personality) {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(err) => {
                    debug!(error = %err, "skipping malformed frame");
                    continue;
                }
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.decoder.push(&chunk[..read]);
        }
    }

    pub fn set_personality(&mut self, personality: Personality) {
        self.personality = personality;
    }

    pub fn personality(&self) -> Personality {
        self.personality
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::codec::encode_for_link;
    use crate::device::DeviceId;
    use crate::packet_id;

    fn display(aux0: u8) -> Frame {
        Frame::new(
            DeviceId::V1WithChecksum,
            DeviceId::GeneralBroadcast,
            packet_id::INF_DISPLAY_DATA,
            vec![0x38, 0x38, 0, 0, 0, aux0, 0, 0],
        )
    }

    fn wire(frame: &Frame, link: LinkKind) -> Vec<u8> {
        encode_for_link(frame, Personality::Checksum, link)
            .unwrap()
            .to_vec()
    }

    #[test]
    fn stream_decoder_drains_multiple_frames() {
        let mut decoder = FrameDecoder::new(LinkKind::Stream);
        let mut bytes = wire(&display(0x08), LinkKind::Stream);
        bytes.extend(wire(&display(0x09), LinkKind::Stream));
        decoder.push(&bytes);

        let first = decoder.next_frame(Personality::Checksum).unwrap().unwrap();
        let second = decoder.next_frame(Personality::Checksum).unwrap().unwrap();
        assert_eq!(first, display(0x08));
        assert_eq!(second, display(0x09));
        assert!(decoder.next_frame(Personality::Checksum).unwrap().is_none());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn message_decoder_treats_each_push_as_one_frame() {
        let mut decoder = FrameDecoder::new(LinkKind::Message);
        decoder.push(&wire(&display(0x08), LinkKind::Message));
        decoder.push(&[0xAA, 0x01]);
        decoder.push(&wire(&display(0x09), LinkKind::Message));
        assert_eq!(decoder.buffered(), 3);

        assert_eq!(
            decoder.next_frame(Personality::Checksum).unwrap().unwrap(),
            display(0x08)
        );
        assert!(decoder.next_frame(Personality::Checksum).is_err());
        assert_eq!(
            decoder.next_frame(Personality::Checksum).unwrap().unwrap(),
            display(0x09)
        );
        assert!(decoder.next_frame(Personality::Checksum).unwrap().is_none());
    }

    #[test]
    fn reader_skips_garbage_and_reads_frames() {
        let mut bytes = vec![0x01, 0x02];
        bytes.extend(wire(&display(0x08), LinkKind::Stream));
        let mut corrupt = wire(&display(0x0A), LinkKind::Stream);
        let n = corrupt.len();
        corrupt[n - 2] ^= 0x01;
        bytes.extend(corrupt);
        bytes.extend(wire(&display(0x0C), LinkKind::Stream));

        let mut reader = FrameReader::new(Cursor::new(bytes), Personality::Checksum);
        assert_eq!(reader.read_frame().unwrap(), display(0x08));
        assert_eq!(reader.read_frame().unwrap(), display(0x0C));
        assert!(matches!(
            reader.read_frame().unwrap_err(),
            FrameError::ConnectionClosed
        ));
    }

    #[test]
    fn reader_handles_byte_by_byte_input() {
        let bytes = wire(&display(0x08), LinkKind::Stream);
        let mut reader = FrameReader::new(
            ByteByByteReader { bytes, pos: 0 },
            Personality::Checksum,
        );
        assert_eq!(reader.read_frame().unwrap(), display(0x08));
    }

    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }
}
