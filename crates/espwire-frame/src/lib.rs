//! Byte codec, frame model and packet factory for the ESP accessory protocol.
//!
//! Two framings are spoken on the wire:
//! - Message links carry one bare frame per delivery:
//!   `0xAA | dest|0xD0 | orig|0xE0 | kind | len | payload | [checksum] | 0xAB`
//! - Stream links wrap that frame in `0x7F` delimiters with a length prefix,
//!   a link checksum, and `0x7D` byte stuffing.
//!
//! Checksum presence inside the bare frame depends on the detected
//! [`Personality`] of the peer and is resolved when a frame is encoded.

pub mod codec;
pub mod data;
pub mod device;
pub mod error;
pub mod frame;
pub mod hex;
pub mod packet;
pub mod packet_id;
pub mod reader;
pub mod request;

pub use codec::{
    checksum, encode_for_link, escape, extract_frame_delimited, extract_frame_plain, unescape,
    verify, wrap_delimited, DELIMITER, ESCAPE, MIN_FRAME_LEN,
};
pub use data::{
    AlertBand, AlertData, AllVolume, BatteryVoltage, Direction, DisplayData, Mode, SavvyStatus,
    SweepDefinition, SweepSection, UserBytes, Version, Volume,
};
pub use device::{DeviceId, Personality};
pub use error::{FrameError, Result};
pub use frame::{Frame, MAX_PAYLOAD};
pub use packet::{Body, Packet};
pub use reader::{FrameDecoder, FrameReader};
