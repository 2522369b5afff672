//! Packet factory: maps a frame's kind to a typed payload.

use serde::Serialize;

use crate::data::{
    serial_number_from_bytes, AlertData, AllVolume, BatteryVoltage, DisplayData, SavvyStatus,
    SweepDefinition, SweepSection, UserBytes, Version, Volume,
};
use crate::error::{FrameError, Result};
use crate::frame::Frame;
use crate::packet_id::*;

/// Decoded payload of a packet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Body {
    Version(Version),
    SerialNumber(String),
    UserBytes(UserBytes),
    SweepDefinition(SweepDefinition),
    DefaultSweepDefinition(SweepDefinition),
    MaxSweepIndex(u8),
    SweepWriteResult(u8),
    SweepSections {
        /// Total sections the detector will report.
        total: u8,
        /// Sections present in this packet's payload, including empty ones.
        contained: u8,
        sections: Vec<SweepSection>,
    },
    DisplayData(DisplayData),
    CurrentVolume(Volume),
    AllVolume(AllVolume),
    AlertData(AlertData),
    DataReceived,
    BatteryVoltage(BatteryVoltage),
    Unsupported { kind: u8 },
    RequestNotProcessed { kind: u8 },
    DataError { kind: u8 },
    Busy { kinds: Vec<u8> },
    SavvyStatus(SavvyStatus),
    VehicleSpeed(u8),
    /// An outbound request kind; its payload is left raw.
    Request,
    /// A kind this library does not know.
    Unknown,
}

/// A frame together with its decoded payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Packet {
    frame: Frame,
    body: Body,
}

impl Packet {
    /// Decode a frame's payload according to its kind.
    ///
    /// Unknown kinds decode to [`Body::Unknown`]. A known kind whose payload
    /// is shorter than its layout fails with [`FrameError::PayloadTooShort`].
    pub fn decode(frame: Frame) -> Result<Self> {
        let body = decode_body(&frame)?;
        Ok(Self { frame, body })
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn kind(&self) -> u8 {
        self.frame.kind()
    }

    pub fn into_frame(self) -> Frame {
        self.frame
    }

    pub fn into_parts(self) -> (Frame, Body) {
        (self.frame, self.body)
    }

    pub fn display_data(&self) -> Option<&DisplayData> {
        match &self.body {
            Body::DisplayData(display) => Some(display),
            _ => None,
        }
    }

    pub fn alert_data(&self) -> Option<&AlertData> {
        match &self.body {
            Body::AlertData(alert) => Some(alert),
            _ => None,
        }
    }

    /// Kinds listed by a busy packet.
    pub fn busy_kinds(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Busy { kinds } => Some(kinds),
            _ => None,
        }
    }

    /// The failed request kind, for failure packets.
    pub fn failed_kind(&self) -> Option<u8> {
        match self.body {
            Body::Unsupported { kind }
            | Body::RequestNotProcessed { kind }
            | Body::DataError { kind } => Some(kind),
            _ => None,
        }
    }
}

fn decode_body(frame: &Frame) -> Result<Body> {
    let kind = frame.kind();
    let payload = frame.payload().as_ref();
    let short = |min: usize| FrameError::PayloadTooShort {
        kind,
        len: payload.len(),
        min,
    };
    let first = || payload.first().copied().ok_or_else(|| short(1));

    let body = match kind {
        RESP_VERSION => Body::Version(Version::from_bytes(payload)),
        RESP_SERIAL_NUMBER => Body::SerialNumber(serial_number_from_bytes(payload)),
        RESP_USER_BYTES => {
            Body::UserBytes(UserBytes::from_bytes(payload).ok_or_else(|| short(UserBytes::LEN))?)
        }
        RESP_SWEEP_DEFINITION => Body::SweepDefinition(
            SweepDefinition::from_bytes(payload).ok_or_else(|| short(SweepDefinition::LEN))?,
        ),
        RESP_DEFAULT_SWEEP_DEFINITIONS => Body::DefaultSweepDefinition(
            SweepDefinition::from_bytes(payload).ok_or_else(|| short(SweepDefinition::LEN))?,
        ),
        RESP_MAX_SWEEP_INDEX => Body::MaxSweepIndex(first()?),
        RESP_SWEEP_WRITE_RESULT => Body::SweepWriteResult(first()?),
        RESP_SWEEP_SECTIONS => {
            if payload.len() < SweepSection::LEN {
                return Err(short(SweepSection::LEN));
            }
            Body::SweepSections {
                total: payload[0] & 0x0F,
                contained: SweepSection::contained_in(payload.len()) as u8,
                sections: SweepSection::parse_all(payload),
            }
        }
        INF_DISPLAY_DATA => Body::DisplayData(
            DisplayData::from_bytes(payload).ok_or_else(|| short(DisplayData::LEN))?,
        ),
        RESP_CURRENT_VOLUME => {
            Body::CurrentVolume(Volume::from_bytes(payload).ok_or_else(|| short(Volume::LEN))?)
        }
        RESP_ALL_VOLUME => {
            Body::AllVolume(AllVolume::from_bytes(payload).ok_or_else(|| short(AllVolume::LEN))?)
        }
        RESP_ALERT_DATA => {
            Body::AlertData(AlertData::from_bytes(payload).ok_or_else(|| short(AlertData::LEN))?)
        }
        RESP_DATA_RECEIVED => Body::DataReceived,
        RESP_BATTERY_VOLTAGE => Body::BatteryVoltage(
            BatteryVoltage::from_bytes(payload).ok_or_else(|| short(BatteryVoltage::LEN))?,
        ),
        RESP_UNSUPPORTED_PACKET => Body::Unsupported { kind: first()? },
        RESP_REQUEST_NOT_PROCESSED => Body::RequestNotProcessed { kind: first()? },
        RESP_DATA_ERROR => Body::DataError { kind: first()? },
        INF_V1_BUSY => Body::Busy {
            kinds: payload.to_vec(),
        },
        RESP_SAVVY_STATUS => Body::SavvyStatus(
            SavvyStatus::from_bytes(payload).ok_or_else(|| short(SavvyStatus::LEN))?,
        ),
        RESP_VEHICLE_SPEED => Body::VehicleSpeed(first()?),
        REQ_VERSION
        | REQ_SERIAL_NUMBER
        | REQ_USER_BYTES
        | REQ_WRITE_USER_BYTES
        | REQ_FACTORY_DEFAULT
        | REQ_WRITE_SWEEP_DEFINITION
        | REQ_ALL_SWEEP_DEFINITIONS
        | REQ_DEFAULT_SWEEPS
        | REQ_MAX_SWEEP_INDEX
        | REQ_SWEEP_SECTIONS
        | REQ_DEFAULT_SWEEP_DEFINITIONS
        | REQ_TURN_OFF_MAIN_DISPLAY
        | REQ_TURN_ON_MAIN_DISPLAY
        | REQ_MUTE_ON
        | REQ_MUTE_OFF
        | REQ_CHANGE_MODE
        | REQ_CURRENT_VOLUME
        | REQ_WRITE_VOLUME
        | REQ_ABORT_AUDIO_DELAY
        | REQ_DISPLAY_CURRENT_VOLUME
        | REQ_ALL_VOLUME
        | REQ_START_ALERT_DATA
        | REQ_STOP_ALERT_DATA
        | REQ_BATTERY_VOLTAGE
        | REQ_SAVVY_STATUS
        | REQ_VEHICLE_SPEED
        | REQ_OVERRIDE_THUMBWHEEL
        | REQ_SET_SAVVY_UNMUTE_ENABLE => Body::Request,
        _ => Body::Unknown,
    };
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceId;

    fn frame(kind: u8, payload: &[u8]) -> Frame {
        Frame::new(
            DeviceId::V1WithChecksum,
            DeviceId::V1Connection,
            kind,
            payload.to_vec(),
        )
    }

    #[test]
    fn decodes_known_kinds() {
        let packet = Packet::decode(frame(RESP_VERSION, b"V4.1037")).unwrap();
        assert_eq!(packet.body(), &Body::Version(Version("V4.1037".into())));

        let packet = Packet::decode(frame(INF_V1_BUSY, &[0x11, 0x16])).unwrap();
        assert_eq!(packet.busy_kinds(), Some(&[0x11, 0x16][..]));

        let packet = Packet::decode(frame(RESP_DATA_ERROR, &[REQ_USER_BYTES])).unwrap();
        assert_eq!(packet.failed_kind(), Some(REQ_USER_BYTES));

        let packet = Packet::decode(frame(RESP_MAX_SWEEP_INDEX, &[5])).unwrap();
        assert_eq!(packet.body(), &Body::MaxSweepIndex(5));
    }

    #[test]
    fn unknown_kind_is_inert() {
        let packet = Packet::decode(frame(0x5A, &[1, 2, 3])).unwrap();
        assert_eq!(packet.body(), &Body::Unknown);
        assert_eq!(packet.frame().payload().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn request_kinds_decode_as_requests() {
        let packet = Packet::decode(frame(REQ_MUTE_ON, &[])).unwrap();
        assert_eq!(packet.body(), &Body::Request);
    }

    #[test]
    fn short_payload_for_known_kind_fails() {
        let err = Packet::decode(frame(INF_DISPLAY_DATA, &[0; 4])).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadTooShort {
                kind: INF_DISPLAY_DATA,
                len: 4,
                min: 8
            }
        ));
        let err = Packet::decode(frame(RESP_REQUEST_NOT_PROCESSED, &[])).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooShort { min: 1, .. }));
    }

    #[test]
    fn sweep_sections_report_total_and_contained() {
        let payload = [
            0x13, 0x5F, 0x00, 0x5D, 0x00, //
            0x23, 0x60, 0x00, 0x5F, 0x10,
        ];
        let packet = Packet::decode(frame(RESP_SWEEP_SECTIONS, &payload)).unwrap();
        match packet.body() {
            Body::SweepSections {
                total,
                contained,
                sections,
            } => {
                assert_eq!(*total, 3);
                assert_eq!(*contained, 2);
                assert_eq!(sections.len(), 2);
            }
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn packet_serializes_to_json() {
        let packet = Packet::decode(frame(RESP_VEHICLE_SPEED, &[88])).unwrap();
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["body"]["type"], "vehicle_speed");
        assert_eq!(json["body"]["data"], 88);
        assert_eq!(json["frame"]["kind_name"], "RESPVEHICLESPEED");
        assert_eq!(json["frame"]["origin"], 10);
    }
}
