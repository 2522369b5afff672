//! Builders for outbound request frames.
//!
//! Every request originates from [`DeviceId::V1Connection`]. Requests meant
//! for the detector are addressed to [`V1`] and re-addressed to the id of the
//! detected personality when they are encoded.

use bytes::Bytes;

use crate::data::{Mode, SweepDefinition, UserBytes};
use crate::device::DeviceId;
use crate::frame::Frame;
use crate::packet_id::*;

/// Placeholder destination for the detector.
pub const V1: DeviceId = DeviceId::V1WithChecksum;

/// Thumbwheel override value: no override.
pub const THUMBWHEEL_NONE: u8 = 0x00;
/// Thumbwheel override value: automatic.
pub const THUMBWHEEL_AUTO: u8 = 0xFF;

fn request(destination: DeviceId, kind: u8, payload: impl Into<Bytes>) -> Frame {
    Frame::new(DeviceId::V1Connection, destination, kind, payload)
}

fn to_v1(kind: u8) -> Frame {
    request(V1, kind, Bytes::new())
}

pub fn version(destination: DeviceId) -> Frame {
    request(destination, REQ_VERSION, Bytes::new())
}

pub fn serial_number(destination: DeviceId) -> Frame {
    request(destination, REQ_SERIAL_NUMBER, Bytes::new())
}

pub fn user_bytes(destination: DeviceId) -> Frame {
    request(destination, REQ_USER_BYTES, Bytes::new())
}

pub fn write_user_bytes(destination: DeviceId, bytes: &UserBytes) -> Frame {
    request(destination, REQ_WRITE_USER_BYTES, bytes.0.to_vec())
}

pub fn factory_default(destination: DeviceId) -> Frame {
    request(destination, REQ_FACTORY_DEFAULT, Bytes::new())
}

pub fn max_sweep_index() -> Frame {
    to_v1(REQ_MAX_SWEEP_INDEX)
}

pub fn sweep_sections() -> Frame {
    to_v1(REQ_SWEEP_SECTIONS)
}

pub fn all_sweep_definitions() -> Frame {
    to_v1(REQ_ALL_SWEEP_DEFINITIONS)
}

pub fn default_sweep_definitions() -> Frame {
    to_v1(REQ_DEFAULT_SWEEP_DEFINITIONS)
}

pub fn default_sweeps() -> Frame {
    to_v1(REQ_DEFAULT_SWEEPS)
}

pub fn write_sweep_definition(definition: &SweepDefinition) -> Frame {
    request(V1, REQ_WRITE_SWEEP_DEFINITION, definition.to_bytes().to_vec())
}

pub fn display(on: bool) -> Frame {
    to_v1(if on {
        REQ_TURN_ON_MAIN_DISPLAY
    } else {
        REQ_TURN_OFF_MAIN_DISPLAY
    })
}

pub fn mute(on: bool) -> Frame {
    to_v1(if on { REQ_MUTE_ON } else { REQ_MUTE_OFF })
}

pub fn change_mode(mode: Mode) -> Frame {
    request(V1, REQ_CHANGE_MODE, vec![mode.code()])
}

pub fn current_volume() -> Frame {
    to_v1(REQ_CURRENT_VOLUME)
}

pub fn all_volume() -> Frame {
    to_v1(REQ_ALL_VOLUME)
}

pub fn write_volume(main: u8, muted: u8, aux0: u8) -> Frame {
    request(V1, REQ_WRITE_VOLUME, vec![main, muted, aux0])
}

pub fn abort_audio_delay() -> Frame {
    to_v1(REQ_ABORT_AUDIO_DELAY)
}

pub fn display_current_volume() -> Frame {
    to_v1(REQ_DISPLAY_CURRENT_VOLUME)
}

pub fn start_alert_data() -> Frame {
    to_v1(REQ_START_ALERT_DATA)
}

pub fn stop_alert_data() -> Frame {
    to_v1(REQ_STOP_ALERT_DATA)
}

pub fn battery_voltage() -> Frame {
    to_v1(REQ_BATTERY_VOLTAGE)
}

pub fn savvy_status() -> Frame {
    request(DeviceId::Savvy, REQ_SAVVY_STATUS, Bytes::new())
}

pub fn vehicle_speed() -> Frame {
    request(DeviceId::Savvy, REQ_VEHICLE_SPEED, Bytes::new())
}

/// `speed` is a threshold, [`THUMBWHEEL_NONE`] or [`THUMBWHEEL_AUTO`].
pub fn override_thumbwheel(speed: u8) -> Frame {
    request(DeviceId::Savvy, REQ_OVERRIDE_THUMBWHEEL, vec![speed])
}

pub fn savvy_unmute_enable(enable: bool) -> Frame {
    request(
        DeviceId::Savvy,
        REQ_SET_SAVVY_UNMUTE_ENABLE,
        vec![u8::from(enable)],
    )
}

/// Build an arbitrary request frame.
pub fn raw(destination: DeviceId, kind: u8, payload: impl Into<Bytes>) -> Frame {
    request(destination, kind, payload)
}
