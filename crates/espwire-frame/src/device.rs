//! Bus device ids and the detected peer personality.

use std::fmt;

use serde::Serialize;

/// A 4-bit device id on the ESP bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "u8")]
pub enum DeviceId {
    ConcealedDisplay,
    RemoteAudio,
    Savvy,
    ThirdParty1,
    ThirdParty2,
    ThirdParty3,
    /// This engine's own bus id.
    V1Connection,
    Reserved,
    GeneralBroadcast,
    V1NoChecksum,
    V1WithChecksum,
    Other(u8),
}

impl DeviceId {
    /// Decode the low nibble of an address byte.
    pub fn from_nibble(value: u8) -> Self {
        match value & 0x0F {
            0x00 => DeviceId::ConcealedDisplay,
            0x01 => DeviceId::RemoteAudio,
            0x02 => DeviceId::Savvy,
            0x03 => DeviceId::ThirdParty1,
            0x04 => DeviceId::ThirdParty2,
            0x05 => DeviceId::ThirdParty3,
            0x06 => DeviceId::V1Connection,
            0x07 => DeviceId::Reserved,
            0x08 => DeviceId::GeneralBroadcast,
            0x09 => DeviceId::V1NoChecksum,
            0x0A => DeviceId::V1WithChecksum,
            other => DeviceId::Other(other),
        }
    }

    /// The 4-bit wire value.
    pub fn as_nibble(self) -> u8 {
        match self {
            DeviceId::ConcealedDisplay => 0x00,
            DeviceId::RemoteAudio => 0x01,
            DeviceId::Savvy => 0x02,
            DeviceId::ThirdParty1 => 0x03,
            DeviceId::ThirdParty2 => 0x04,
            DeviceId::ThirdParty3 => 0x05,
            DeviceId::V1Connection => 0x06,
            DeviceId::Reserved => 0x07,
            DeviceId::GeneralBroadcast => 0x08,
            DeviceId::V1NoChecksum => 0x09,
            DeviceId::V1WithChecksum => 0x0A,
            DeviceId::Other(n) => n & 0x0F,
        }
    }

    /// Whether this id addresses the detector itself (with or without checksum).
    pub fn is_v1(self) -> bool {
        matches!(self, DeviceId::V1NoChecksum | DeviceId::V1WithChecksum)
    }

    /// Human-readable device name.
    pub fn name(self) -> &'static str {
        match self {
            DeviceId::ConcealedDisplay => "Concealed Display",
            DeviceId::RemoteAudio => "Remote Audio",
            DeviceId::Savvy => "SAVVY",
            DeviceId::ThirdParty1 => "Third Party Device",
            DeviceId::ThirdParty2 => "Third Party Device 2",
            DeviceId::ThirdParty3 => "Third Party Device 3",
            DeviceId::V1Connection => "V1connection",
            DeviceId::Reserved => "Reserved",
            DeviceId::GeneralBroadcast => "General Broadcast",
            DeviceId::V1NoChecksum => "Valentine One w/o CS",
            DeviceId::V1WithChecksum => "Valentine One w/ CS",
            DeviceId::Other(_) => "Unknown Device",
        }
    }
}

impl From<DeviceId> for u8 {
    fn from(id: DeviceId) -> Self {
        id.as_nibble()
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.as_nibble())
    }
}

/// Checksum/legacy dialect spoken by the connected detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Personality {
    #[default]
    Unknown,
    Checksum,
    NoChecksum,
    Legacy,
}

impl Personality {
    /// Whether frames exchanged with this personality carry a checksum byte.
    pub fn uses_checksum(self) -> bool {
        self == Personality::Checksum
    }

    pub fn is_known(self) -> bool {
        self != Personality::Unknown
    }

    /// The bus id requests to the detector are addressed to.
    ///
    /// Legacy detectors only listen on the general broadcast id.
    pub fn destination(self) -> Option<DeviceId> {
        match self {
            Personality::Checksum => Some(DeviceId::V1WithChecksum),
            Personality::NoChecksum => Some(DeviceId::V1NoChecksum),
            Personality::Legacy => Some(DeviceId::GeneralBroadcast),
            Personality::Unknown => None,
        }
    }

    /// Personality implied by a frame originating from `origin`, if it is the detector.
    pub fn of_origin(origin: DeviceId) -> Option<Self> {
        match origin {
            DeviceId::V1WithChecksum => Some(Personality::Checksum),
            DeviceId::V1NoChecksum => Some(Personality::NoChecksum),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Personality::Unknown => "unknown",
            Personality::Checksum => "checksum",
            Personality::NoChecksum => "no-checksum",
            Personality::Legacy => "legacy",
        }
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nibble_roundtrip_for_named_ids() {
        for n in 0u8..=0x0A {
            let id = DeviceId::from_nibble(n);
            assert!(!matches!(id, DeviceId::Other(_)));
            assert_eq!(id.as_nibble(), n);
        }
        assert_eq!(DeviceId::from_nibble(0xEB), DeviceId::Other(0x0B));
    }

    #[test]
    fn from_nibble_ignores_base_bits() {
        assert_eq!(DeviceId::from_nibble(0xEA), DeviceId::V1WithChecksum);
        assert_eq!(DeviceId::from_nibble(0xD6), DeviceId::V1Connection);
    }

    #[test]
    fn only_checksum_and_no_checksum_ids_are_the_detector() {
        assert!(DeviceId::V1WithChecksum.is_v1());
        assert!(DeviceId::V1NoChecksum.is_v1());
        assert!(!DeviceId::GeneralBroadcast.is_v1());
        assert!(!DeviceId::V1Connection.is_v1());
    }

    #[test]
    fn personality_destinations() {
        assert_eq!(Personality::Checksum.destination(), Some(DeviceId::V1WithChecksum));
        assert_eq!(Personality::NoChecksum.destination(), Some(DeviceId::V1NoChecksum));
        assert_eq!(Personality::Legacy.destination(), Some(DeviceId::GeneralBroadcast));
        assert_eq!(Personality::Unknown.destination(), None);
        assert!(Personality::Checksum.uses_checksum());
        assert!(!Personality::Legacy.uses_checksum());
    }
}
