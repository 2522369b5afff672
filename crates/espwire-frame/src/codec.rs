use std::borrow::Cow;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use espwire_transport::LinkKind;
use tracing::trace;

use crate::device::{DeviceId, Personality};
use crate::error::{FrameError, Result};
use crate::frame::{Frame, FRAMING_LEN};
use crate::packet_id;

/// Start of a bare frame.
pub const SOF: u8 = 0xAA;
/// End of a bare frame.
pub const EOF: u8 = 0xAB;
/// Base bits of the destination byte.
pub const DEST_BASE: u8 = 0xD0;
/// Base bits of the origin byte.
pub const ORIG_BASE: u8 = 0xE0;

/// Stream-link frame delimiter.
pub const DELIMITER: u8 = 0x7F;
/// Stream-link escape prefix.
pub const ESCAPE: u8 = 0x7D;
const ESCAPED_ESCAPE: u8 = 0x5D;
const ESCAPED_DELIMITER: u8 = 0x5F;

/// Smallest bare frame: SOF, dest, orig, kind, len, EOF.
pub const MIN_FRAME_LEN: usize = FRAMING_LEN;

/// Unsigned 8-bit wraparound sum.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Whether the second-to-last byte is the checksum of everything before it.
pub fn verify(frame: &[u8]) -> bool {
    match frame.len() {
        0 | 1 => false,
        n => checksum(&frame[..n - 2]) == frame[n - 2],
    }
}

/// Byte-stuff a delimited frame, leaving the first and last byte untouched.
///
/// Returns the input unchanged (borrowed) when nothing needed escaping.
pub fn escape(buf: &[u8]) -> Cow<'_, [u8]> {
    if buf.len() <= 2 {
        return Cow::Borrowed(buf);
    }
    let interior = &buf[1..buf.len() - 1];
    let needed = interior
        .iter()
        .filter(|&&b| b == ESCAPE || b == DELIMITER)
        .count();
    if needed == 0 {
        return Cow::Borrowed(buf);
    }

    let mut out = Vec::with_capacity(buf.len() + needed);
    out.push(buf[0]);
    for &b in interior {
        match b {
            ESCAPE => out.extend_from_slice(&[ESCAPE, ESCAPED_ESCAPE]),
            DELIMITER => out.extend_from_slice(&[ESCAPE, ESCAPED_DELIMITER]),
            other => out.push(other),
        }
    }
    out.push(buf[buf.len() - 1]);
    Cow::Owned(out)
}

/// Undo [`escape`] over `buf[start..stop]`, keeping the bytes outside the window.
pub fn unescape(buf: &[u8], start: usize, stop: usize) -> Vec<u8> {
    let stop = stop.min(buf.len());
    let start = start.min(stop);

    let mut out = Vec::with_capacity(buf.len());
    out.extend_from_slice(&buf[..start]);
    out.extend(unescape_window(&buf[start..stop]));
    out.extend_from_slice(&buf[stop..]);
    out
}

fn unescape_window(window: &[u8]) -> impl Iterator<Item = u8> + '_ {
    let mut iter = window.iter().copied();
    std::iter::from_fn(move || {
        let b = iter.next()?;
        if b != ESCAPE {
            return Some(b);
        }
        // A trailing escape with nothing after it is kept as-is.
        Some(iter.next().map_or(ESCAPE, unescape_byte))
    })
}

fn unescape_byte(b: u8) -> u8 {
    match b {
        ESCAPED_ESCAPE => ESCAPE,
        ESCAPED_DELIMITER => DELIMITER,
        other => other,
    }
}

/// Wrap a bare frame for a stream link:
/// `0x7F | len | frame | checksum(len + frame) | 0x7F`, then escape the interior.
pub fn wrap_delimited(frame: &[u8]) -> Result<Bytes> {
    let len = u8::try_from(frame.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: frame.len(),
        max: u8::MAX as usize,
    })?;

    let mut raw = BytesMut::with_capacity(frame.len() + 4);
    raw.put_u8(DELIMITER);
    raw.put_u8(len);
    raw.put_slice(frame);
    raw.put_u8(len.wrapping_add(checksum(frame)));
    raw.put_u8(DELIMITER);

    Ok(match escape(&raw) {
        Cow::Borrowed(_) => raw.freeze(),
        Cow::Owned(escaped) => Bytes::from(escaped),
    })
}

/// Encode `frame` for the given link kind.
pub fn encode_for_link(frame: &Frame, personality: Personality, link: LinkKind) -> Result<Bytes> {
    let bare = frame.to_bytes(personality)?;
    match link {
        LinkKind::Message => Ok(bare),
        LinkKind::Stream => wrap_delimited(&bare),
    }
}

/// Extract one bare frame from a message-link accumulator.
///
/// The accumulator always holds exactly one delivery and is cleared after
/// every attempt, whether or not a frame was produced. Returns `Ok(None)`
/// only when the accumulator was already empty.
///
/// Checksum presence follows `personality`, except that frames sent by the
/// detector itself always use the rule implied by their origin id. Before the
/// personality is known, only the identification response from this engine's
/// own id is accepted from a non-detector origin.
pub fn extract_frame_plain(acc: &mut BytesMut, personality: Personality) -> Result<Option<Frame>> {
    if acc.is_empty() {
        return Ok(None);
    }
    let bytes = acc.split().freeze();
    decode_bare(bytes, personality).map(Some)
}

fn decode_bare(bytes: Bytes, personality: Personality) -> Result<Frame> {
    let len = bytes.len();
    if len < MIN_FRAME_LEN {
        return Err(FrameError::Truncated {
            len,
            min: MIN_FRAME_LEN,
        });
    }
    if bytes[0] != SOF {
        return Err(FrameError::InvalidStartOfFrame(bytes[0]));
    }
    let (dest_byte, orig_byte) = (bytes[1], bytes[2]);
    if dest_byte & DEST_BASE != DEST_BASE || orig_byte & ORIG_BASE != ORIG_BASE {
        return Err(FrameError::InvalidAddress {
            destination: dest_byte,
            origin: orig_byte,
        });
    }
    if bytes[len - 1] != EOF {
        return Err(FrameError::InvalidEndOfFrame(bytes[len - 1]));
    }
    let declared = MIN_FRAME_LEN + usize::from(bytes[4]);
    if declared != len {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: len,
        });
    }

    let kind = bytes[3];
    let origin = DeviceId::from_nibble(orig_byte);
    let destination = DeviceId::from_nibble(dest_byte);

    if !origin.is_v1() && !personality.is_known() {
        let bootstrap = kind == packet_id::RESP_VERSION && origin == DeviceId::V1Connection;
        if !bootstrap {
            return Err(FrameError::UnidentifiedOrigin {
                origin: origin.as_nibble(),
                kind,
            });
        }
    }

    let frame_personality = Personality::of_origin(origin).unwrap_or(personality);
    let with_checksum = frame_personality.uses_checksum();
    let payload_end = if with_checksum {
        if len < MIN_FRAME_LEN + 1 {
            return Err(FrameError::Truncated {
                len,
                min: MIN_FRAME_LEN + 1,
            });
        }
        let expected = checksum(&bytes[..len - 2]);
        let found = bytes[len - 2];
        if expected != found {
            return Err(FrameError::ChecksumMismatch { expected, found });
        }
        len - 2
    } else {
        len - 1
    };

    let payload = bytes.slice(5..payload_end);
    Ok(Frame::new(origin, destination, kind, payload).with_personality(frame_personality))
}

/// Extract one frame from a stream-link accumulator.
///
/// Scans for a pair of `0x7F` delimiters (a doubled delimiter marks the
/// start), discards any unusable prefix, verifies the link checksum over the
/// de-escaped length and data, and decodes the interior as a bare frame.
/// Consumed bytes are removed on success and on every failure. Returns
/// `Ok(None)` with the accumulator untouched when no complete pair is present.
pub fn extract_frame_delimited(
    acc: &mut BytesMut,
    personality: Personality,
) -> Result<Option<Frame>> {
    let mut start = None;
    let mut end = None;
    for (i, &b) in acc.iter().enumerate() {
        if b != DELIMITER {
            continue;
        }
        match start {
            None => start = Some(i),
            Some(s) if i == s + 1 => start = Some(i),
            Some(_) => {
                end = Some(i);
                break;
            }
        }
    }
    let (Some(start), Some(end)) = (start, end) else {
        return Ok(None);
    };

    if start > 0 {
        trace!(discarded = start, "dropping bytes ahead of frame delimiter");
        acc.advance(start);
    }
    let raw = acc.split_to(end - start + 1).freeze();
    decode_delimited(&raw, personality)
}

fn decode_delimited(raw: &[u8], personality: Personality) -> Result<Option<Frame>> {
    // 0x7F len chk 0x7F at minimum
    if raw.len() < 4 {
        return Err(FrameError::Truncated {
            len: raw.len(),
            min: 4,
        });
    }

    let (len, data_start) = if raw[1] == ESCAPE {
        (unescape_byte(raw[2]), 3)
    } else {
        (raw[1], 2)
    };

    let mut data_stop = raw.len() - 2;
    let mut found = raw[data_stop];
    if data_stop > data_start && raw[data_stop - 1] == ESCAPE {
        data_stop -= 1;
        found = unescape_byte(found);
    }
    if data_stop < data_start {
        return Err(FrameError::Truncated {
            len: raw.len(),
            min: data_start + 2,
        });
    }

    let interior: Vec<u8> = unescape_window(&raw[data_start..data_stop]).collect();
    let expected = len.wrapping_add(checksum(&interior));
    if expected != found {
        return Err(FrameError::ChecksumMismatch { expected, found });
    }
    if interior.len() != usize::from(len) {
        return Err(FrameError::LengthMismatch {
            declared: usize::from(len),
            actual: interior.len(),
        });
    }

    let mut bare = BytesMut::from(&interior[..]);
    extract_frame_plain(&mut bare, personality)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display_frame() -> Frame {
        Frame::new(
            DeviceId::V1WithChecksum,
            DeviceId::GeneralBroadcast,
            packet_id::INF_DISPLAY_DATA,
            vec![0x38, 0x38, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00],
        )
    }

    fn stream_bytes(frame: &Frame, personality: Personality) -> Bytes {
        encode_for_link(frame, personality, LinkKind::Stream).unwrap()
    }

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0xFF, 0x02]), 0x01);
        assert_eq!(checksum(&[0x10, 0x20, 0x30]), 0x60);
    }

    #[test]
    fn verify_matches_checksum_of_prefix() {
        let cases: [&[u8]; 5] = [
            &[0xAA, 0xDA, 0xE6, 0x01, 0x01, 0x6C, 0xAB],
            &[0xAA, 0xDA, 0xE6, 0x01, 0x01, 0x6D, 0xAB],
            &[0x05, 0x05, 0x00],
            &[0x01, 0x02, 0x03, 0x06, 0xFF],
            &[0x00],
        ];
        for bytes in cases {
            let n = bytes.len();
            let expected = n >= 2 && checksum(&bytes[..n - 2]) == bytes[n - 2];
            assert_eq!(verify(bytes), expected, "{bytes:02X?}");
        }
        assert!(verify(cases[0]));
        assert!(!verify(cases[1]));
    }

    #[test]
    fn escape_borrows_when_clean() {
        let clean = [0x7F, 0x01, 0x02, 0x7F];
        assert!(matches!(escape(&clean), Cow::Borrowed(_)));
    }

    #[test]
    fn escape_replaces_reserved_interior_bytes_only() {
        let raw = [0x7F, 0x7D, 0x10, 0x7F, 0x7F];
        let escaped = escape(&raw);
        assert_eq!(escaped.as_ref(), &[0x7F, 0x7D, 0x5D, 0x10, 0x7D, 0x5F, 0x7F]);
    }

    #[test]
    fn unescape_inverts_escape() {
        let inputs: [&[u8]; 5] = [
            &[0x7F, 0x7F],
            &[0x00, 0x7D, 0x00],
            &[0x7F, 0x7F, 0x7D, 0x7F, 0x7D, 0x7F],
            &[0x01, 0x02, 0x03, 0x04],
            &[0x7D, 0x7D, 0x5D, 0x5F, 0x7F, 0x7D],
        ];
        for input in inputs {
            let escaped = escape(input);
            let restored = unescape(&escaped, 1, escaped.len() - 1);
            assert_eq!(restored, input, "{input:02X?}");
        }
    }

    #[test]
    fn unescape_keeps_bytes_outside_window() {
        let buf = [0x7D, 0x5D, 0x7D, 0x5F, 0x7D, 0x5D];
        assert_eq!(unescape(&buf, 2, 4), vec![0x7D, 0x5D, 0x7F, 0x7D, 0x5D]);
    }

    #[test]
    fn plain_extracts_checksum_frame() {
        let frame = display_frame();
        let mut acc = BytesMut::from(frame.to_bytes(Personality::Checksum).unwrap().as_ref());
        let decoded = extract_frame_plain(&mut acc, Personality::Unknown)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.personality(), Personality::Checksum);
        assert!(acc.is_empty());
    }

    #[test]
    fn plain_detector_origin_overrides_personality() {
        let frame = Frame::new(
            DeviceId::V1NoChecksum,
            DeviceId::GeneralBroadcast,
            packet_id::INF_DISPLAY_DATA,
            vec![0u8; 8],
        );
        let mut acc = BytesMut::from(frame.to_bytes(Personality::NoChecksum).unwrap().as_ref());
        let decoded = extract_frame_plain(&mut acc, Personality::Checksum)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.payload().len(), 8);
        assert!(!decoded.has_checksum());
    }

    #[test]
    fn plain_bad_checksum_clears_accumulator() {
        let mut bytes = display_frame()
            .to_bytes(Personality::Checksum)
            .unwrap()
            .to_vec();
        let n = bytes.len();
        bytes[n - 2] ^= 0xFF;
        let mut acc = BytesMut::from(&bytes[..]);
        let err = extract_frame_plain(&mut acc, Personality::Checksum).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));
        assert!(acc.is_empty());
    }

    #[test]
    fn plain_rejects_bad_framing() {
        let cases: [(&[u8], fn(&FrameError) -> bool); 5] = [
            (&[0xAA, 0xD6, 0xE6], |e| matches!(e, FrameError::Truncated { .. })),
            (&[0xAB, 0xD6, 0xEA, 0x31, 0x00, 0xAB], |e| {
                matches!(e, FrameError::InvalidStartOfFrame(0xAB))
            }),
            (&[0xAA, 0x06, 0xEA, 0x31, 0x00, 0xAB], |e| {
                matches!(e, FrameError::InvalidAddress { .. })
            }),
            (&[0xAA, 0xD6, 0xEA, 0x31, 0x00, 0xAC], |e| {
                matches!(e, FrameError::InvalidEndOfFrame(0xAC))
            }),
            (&[0xAA, 0xD6, 0xE9, 0x31, 0x02, 0xAB], |e| {
                matches!(e, FrameError::LengthMismatch { .. })
            }),
        ];
        for (bytes, check) in cases {
            let mut acc = BytesMut::from(bytes);
            let err = extract_frame_plain(&mut acc, Personality::NoChecksum).unwrap_err();
            assert!(check(&err), "{bytes:02X?} -> {err}");
            assert!(err.is_malformed());
            assert!(acc.is_empty());
        }
    }

    #[test]
    fn plain_bootstrap_filter() {
        let other = Frame::new(
            DeviceId::RemoteAudio,
            DeviceId::GeneralBroadcast,
            packet_id::RESP_VERSION,
            b"R1.0000".to_vec(),
        );
        let mut acc = BytesMut::from(other.to_bytes(Personality::NoChecksum).unwrap().as_ref());
        let err = extract_frame_plain(&mut acc, Personality::Unknown).unwrap_err();
        assert!(matches!(err, FrameError::UnidentifiedOrigin { origin: 1, .. }));
        assert!(!err.is_malformed());

        let own = Frame::new(
            DeviceId::V1Connection,
            DeviceId::V1Connection,
            packet_id::RESP_VERSION,
            b"V1C1000".to_vec(),
        );
        let mut acc = BytesMut::from(own.to_bytes(Personality::NoChecksum).unwrap().as_ref());
        let decoded = extract_frame_plain(&mut acc, Personality::Unknown)
            .unwrap()
            .unwrap();
        assert_eq!(decoded.payload().as_ref(), b"V1C1000");
    }

    #[test]
    fn delimited_extracts_one_frame_and_keeps_the_rest() {
        let frame = display_frame();
        let wire = stream_bytes(&frame, Personality::Checksum);
        let mut acc = BytesMut::new();
        acc.extend_from_slice(&[0x12, 0x34]);
        acc.extend_from_slice(&wire);
        acc.extend_from_slice(&wire[..3]);

        let decoded = extract_frame_delimited(&mut acc, Personality::Checksum)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(acc.as_ref(), &wire[..3]);
        assert!(extract_frame_delimited(&mut acc, Personality::Checksum)
            .unwrap()
            .is_none());
    }

    #[test]
    fn delimited_byte_by_byte() {
        let frame = display_frame();
        let wire = stream_bytes(&frame, Personality::Checksum);
        let mut acc = BytesMut::new();

        for (i, &b) in wire.iter().enumerate() {
            acc.put_u8(b);
            let result = extract_frame_delimited(&mut acc, Personality::Checksum).unwrap();
            if i + 1 < wire.len() {
                assert!(result.is_none(), "frame produced early at byte {i}");
            } else {
                assert_eq!(result.unwrap(), frame);
            }
        }
        assert!(acc.is_empty());
    }

    #[test]
    fn delimited_handles_escaped_payload_and_checksum() {
        // Payload bytes equal to both reserved values.
        let frame = Frame::new(
            DeviceId::V1WithChecksum,
            DeviceId::V1Connection,
            packet_id::RESP_USER_BYTES,
            vec![0x7F, 0x7D, 0x00, 0x7F, 0x01, 0x02],
        );
        let wire = stream_bytes(&frame, Personality::Checksum);
        assert!(wire.windows(2).any(|w| w == [0x7D, 0x5F]));

        let mut acc = BytesMut::from(wire.as_ref());
        let decoded = extract_frame_delimited(&mut acc, Personality::Checksum)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, frame);
        assert!(acc.is_empty());
    }

    #[test]
    fn delimited_handles_escaped_length() {
        // A 0x7D-byte bare frame needs its length escaped.
        let payload = vec![0x11u8; 0x7D - FRAMING_LEN - 1];
        let frame = Frame::new(
            DeviceId::V1WithChecksum,
            DeviceId::V1Connection,
            packet_id::RESP_USER_BYTES,
            payload,
        );
        let wire = stream_bytes(&frame, Personality::Checksum);
        assert_eq!(&wire[..3], &[0x7F, 0x7D, 0x5D]);

        let mut acc = BytesMut::from(wire.as_ref());
        let decoded = extract_frame_delimited(&mut acc, Personality::Checksum)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn delimited_checksum_failure_consumes_frame() {
        let frame = display_frame();
        let mut wire = stream_bytes(&frame, Personality::Checksum).to_vec();
        let n = wire.len();
        wire[n - 2] = wire[n - 2].wrapping_add(1);
        let good = stream_bytes(&frame, Personality::Checksum);

        let mut acc = BytesMut::from(&wire[..]);
        acc.extend_from_slice(&good);
        let err = extract_frame_delimited(&mut acc, Personality::Checksum).unwrap_err();
        assert!(matches!(err, FrameError::ChecksumMismatch { .. }));

        let decoded = extract_frame_delimited(&mut acc, Personality::Checksum)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, frame);
        assert!(acc.is_empty());
    }

    #[test]
    fn delimited_doubled_delimiter_marks_start() {
        let frame = display_frame();
        let wire = stream_bytes(&frame, Personality::Checksum);
        let mut acc = BytesMut::new();
        acc.put_u8(DELIMITER);
        acc.extend_from_slice(&wire);

        let decoded = extract_frame_delimited(&mut acc, Personality::Checksum)
            .unwrap()
            .unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn wrap_delimited_layout() {
        let bare = [0xAA, 0xD9, 0xE6, 0x01, 0x00, 0xAB];
        let wrapped = wrap_delimited(&bare).unwrap();
        let sum = 6u8.wrapping_add(checksum(&bare));
        let mut expected = vec![0x7F, 0x06];
        expected.extend_from_slice(&bare);
        expected.extend_from_slice(&[sum, 0x7F]);
        assert_eq!(wrapped.as_ref(), expected.as_slice());
    }

    #[test]
    fn message_link_encoding_is_bare() {
        let frame = display_frame();
        let bare = encode_for_link(&frame, Personality::NoChecksum, LinkKind::Message).unwrap();
        assert_eq!(bare[0], SOF);
        assert_eq!(bare[bare.len() - 1], EOF);
    }
}
