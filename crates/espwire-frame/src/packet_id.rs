//! Packet kind ids.

pub const REQ_VERSION: u8 = 0x01;
pub const RESP_VERSION: u8 = 0x02;
pub const REQ_SERIAL_NUMBER: u8 = 0x03;
pub const RESP_SERIAL_NUMBER: u8 = 0x04;

pub const REQ_USER_BYTES: u8 = 0x11;
pub const RESP_USER_BYTES: u8 = 0x12;
pub const REQ_WRITE_USER_BYTES: u8 = 0x13;
pub const REQ_FACTORY_DEFAULT: u8 = 0x14;

pub const REQ_WRITE_SWEEP_DEFINITION: u8 = 0x15;
pub const REQ_ALL_SWEEP_DEFINITIONS: u8 = 0x16;
pub const RESP_SWEEP_DEFINITION: u8 = 0x17;
pub const REQ_DEFAULT_SWEEPS: u8 = 0x18;
pub const REQ_MAX_SWEEP_INDEX: u8 = 0x19;
pub const RESP_MAX_SWEEP_INDEX: u8 = 0x20;
pub const RESP_SWEEP_WRITE_RESULT: u8 = 0x21;
pub const REQ_SWEEP_SECTIONS: u8 = 0x22;
pub const RESP_SWEEP_SECTIONS: u8 = 0x23;
pub const REQ_DEFAULT_SWEEP_DEFINITIONS: u8 = 0x24;
pub const RESP_DEFAULT_SWEEP_DEFINITIONS: u8 = 0x25;

/// Periodic display state broadcast by the detector.
pub const INF_DISPLAY_DATA: u8 = 0x31;
pub const REQ_TURN_OFF_MAIN_DISPLAY: u8 = 0x32;
pub const REQ_TURN_ON_MAIN_DISPLAY: u8 = 0x33;
pub const REQ_MUTE_ON: u8 = 0x34;
pub const REQ_MUTE_OFF: u8 = 0x35;
pub const REQ_CHANGE_MODE: u8 = 0x36;
pub const REQ_CURRENT_VOLUME: u8 = 0x37;
pub const RESP_CURRENT_VOLUME: u8 = 0x38;
pub const REQ_WRITE_VOLUME: u8 = 0x39;
pub const REQ_ABORT_AUDIO_DELAY: u8 = 0x3A;
pub const REQ_DISPLAY_CURRENT_VOLUME: u8 = 0x3B;
pub const REQ_ALL_VOLUME: u8 = 0x3C;
pub const RESP_ALL_VOLUME: u8 = 0x3D;

pub const REQ_START_ALERT_DATA: u8 = 0x41;
pub const REQ_STOP_ALERT_DATA: u8 = 0x42;
pub const RESP_ALERT_DATA: u8 = 0x43;

pub const RESP_DATA_RECEIVED: u8 = 0x61;
pub const REQ_BATTERY_VOLTAGE: u8 = 0x62;
pub const RESP_BATTERY_VOLTAGE: u8 = 0x63;
pub const RESP_UNSUPPORTED_PACKET: u8 = 0x64;
pub const RESP_REQUEST_NOT_PROCESSED: u8 = 0x65;
/// Lists the packet kinds the detector is still working on.
pub const INF_V1_BUSY: u8 = 0x66;
pub const RESP_DATA_ERROR: u8 = 0x67;

pub const REQ_SAVVY_STATUS: u8 = 0x71;
pub const RESP_SAVVY_STATUS: u8 = 0x72;
pub const REQ_VEHICLE_SPEED: u8 = 0x73;
pub const RESP_VEHICLE_SPEED: u8 = 0x74;
pub const REQ_OVERRIDE_THUMBWHEEL: u8 = 0x75;
pub const REQ_SET_SAVVY_UNMUTE_ENABLE: u8 = 0x76;

/// Returns a human-readable name for a packet kind.
pub fn name(kind: u8) -> &'static str {
    match kind {
        REQ_VERSION => "REQVERSION",
        RESP_VERSION => "RESPVERSION",
        REQ_SERIAL_NUMBER => "REQSERIALNUMBER",
        RESP_SERIAL_NUMBER => "RESPSERIALNUMBER",
        REQ_USER_BYTES => "REQUSERBYTES",
        RESP_USER_BYTES => "RESPUSERBYTES",
        REQ_WRITE_USER_BYTES => "REQWRITEUSERBYTES",
        REQ_FACTORY_DEFAULT => "REQFACTORYDEFAULT",
        REQ_WRITE_SWEEP_DEFINITION => "REQWRITESWEEPDEFINITION",
        REQ_ALL_SWEEP_DEFINITIONS => "REQALLSWEEPDEFINITIONS",
        RESP_SWEEP_DEFINITION => "RESPSWEEPDEFINITION",
        REQ_DEFAULT_SWEEPS => "REQDEFAULTSWEEPS",
        REQ_MAX_SWEEP_INDEX => "REQMAXSWEEPINDEX",
        RESP_MAX_SWEEP_INDEX => "RESPMAXSWEEPINDEX",
        RESP_SWEEP_WRITE_RESULT => "RESPSWEEPWRITERESULT",
        REQ_SWEEP_SECTIONS => "REQSWEEPSECTIONS",
        RESP_SWEEP_SECTIONS => "RESPSWEEPSECTIONS",
        REQ_DEFAULT_SWEEP_DEFINITIONS => "REQDEFAULTSWEEPDEFINITIONS",
        RESP_DEFAULT_SWEEP_DEFINITIONS => "RESPDEFAULTSWEEPDEFINITIONS",
        INF_DISPLAY_DATA => "INFDISPLAYDATA",
        REQ_TURN_OFF_MAIN_DISPLAY => "REQTURNOFFMAINDISPLAY",
        REQ_TURN_ON_MAIN_DISPLAY => "REQTURNONMAINDISPLAY",
        REQ_MUTE_ON => "REQMUTEON",
        REQ_MUTE_OFF => "REQMUTEOFF",
        REQ_CHANGE_MODE => "REQCHANGEMODE",
        REQ_CURRENT_VOLUME => "REQCURRENTVOLUME",
        RESP_CURRENT_VOLUME => "RESPCURRENTVOLUME",
        REQ_WRITE_VOLUME => "REQWRITEVOLUME",
        REQ_ABORT_AUDIO_DELAY => "REQABORTAUDIODELAY",
        REQ_DISPLAY_CURRENT_VOLUME => "REQDISPLAYCURRENTVOLUME",
        REQ_ALL_VOLUME => "REQALLVOLUME",
        RESP_ALL_VOLUME => "RESPALLVOLUME",
        REQ_START_ALERT_DATA => "REQSTARTALERTDATA",
        REQ_STOP_ALERT_DATA => "REQSTOPALERTDATA",
        RESP_ALERT_DATA => "RESPALERTDATA",
        RESP_DATA_RECEIVED => "RESPDATARECEIVED",
        REQ_BATTERY_VOLTAGE => "REQBATTERYVOLTAGE",
        RESP_BATTERY_VOLTAGE => "RESPBATTERYVOLTAGE",
        RESP_UNSUPPORTED_PACKET => "RESPUNSUPPORTEDPACKET",
        RESP_REQUEST_NOT_PROCESSED => "RESPREQUESTNOTPROCESSED",
        INF_V1_BUSY => "INFV1BUSY",
        RESP_DATA_ERROR => "RESPDATAERROR",
        REQ_SAVVY_STATUS => "REQSAVVYSTATUS",
        RESP_SAVVY_STATUS => "RESPSAVVYSTATUS",
        REQ_VEHICLE_SPEED => "REQVEHICLESPEED",
        RESP_VEHICLE_SPEED => "RESPVEHICLESPEED",
        REQ_OVERRIDE_THUMBWHEEL => "REQOVERRIDETHUMBWHEEL",
        REQ_SET_SAVVY_UNMUTE_ENABLE => "REQSETSAVVYUNMUTEENABLE",
        _ => "UNKNOWN",
    }
}

/// Look up a packet kind by its name (case-insensitive).
pub fn from_name(name: &str) -> Option<u8> {
    let upper = name.to_ascii_uppercase();
    (0u8..=0x7F).find(|&kind| self::name(kind) == upper)
}

/// Returns true for kinds that report a failed request.
pub fn is_failure(kind: u8) -> bool {
    matches!(
        kind,
        RESP_UNSUPPORTED_PACKET | RESP_REQUEST_NOT_PROCESSED | RESP_DATA_ERROR
    )
}
