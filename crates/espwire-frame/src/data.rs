//! Typed payload records carried by response and information packets.

use std::fmt;

use serde::Serialize;

// Seven-segment images of the bogey counter that identify the operating mode.
const SEG_A: u8 = 0x77;
const SEG_C: u8 = 0x39;
const SEG_U: u8 = 0x3E;
const SEG_LOWER_L: u8 = 0x18;
const SEG_LOWER_U: u8 = 0x1C;
const SEG_LOWER_C: u8 = 0x58;
const SEG_L: u8 = 0x38;

/// Detector operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Unknown,
    AllBogeys,
    Logic,
    AdvancedLogic,
}

impl Mode {
    /// Value sent in a change-mode request.
    pub fn code(self) -> u8 {
        match self {
            Mode::Unknown => 0,
            Mode::AllBogeys => 1,
            Mode::Logic => 2,
            Mode::AdvancedLogic => 3,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Mode::AllBogeys,
            2 => Mode::Logic,
            3 => Mode::AdvancedLogic,
            _ => Mode::Unknown,
        }
    }
}

/// Display state broadcast by the detector several times per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayData {
    pub bogey_image1: u8,
    pub bogey_image2: u8,
    pub bar_graph: u8,
    pub band_arrow1: u8,
    pub band_arrow2: u8,
    pub aux0: u8,
    pub aux1: u8,
    pub aux2: u8,
}

impl DisplayData {
    pub const LEN: usize = 8;

    pub const AUX0_SOFT: u8 = 0x01;
    pub const AUX0_TS_HOLDOFF: u8 = 0x02;
    pub const AUX0_SYSTEM_STATUS: u8 = 0x04;
    pub const AUX0_DISPLAY_ON: u8 = 0x08;
    pub const AUX0_EURO: u8 = 0x10;
    pub const AUX0_CUSTOM_SWEEP: u8 = 0x20;
    pub const AUX0_LEGACY: u8 = 0x40;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let b: &[u8; Self::LEN] = bytes.get(..Self::LEN)?.try_into().ok()?;
        Some(Self {
            bogey_image1: b[0],
            bogey_image2: b[1],
            bar_graph: b[2],
            band_arrow1: b[3],
            band_arrow2: b[4],
            aux0: b[5],
            aux1: b[6],
            aux2: b[7],
        })
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        [
            self.bogey_image1,
            self.bogey_image2,
            self.bar_graph,
            self.band_arrow1,
            self.band_arrow2,
            self.aux0,
            self.aux1,
            self.aux2,
        ]
    }

    /// Audio is muted.
    pub fn is_soft(&self) -> bool {
        self.aux0 & Self::AUX0_SOFT != 0
    }

    /// Time-slice holdoff: the bus is reserved and accessories must not transmit.
    pub fn is_time_slice_holdoff(&self) -> bool {
        self.aux0 & Self::AUX0_TS_HOLDOFF != 0
    }

    pub fn is_system_status(&self) -> bool {
        self.aux0 & Self::AUX0_SYSTEM_STATUS != 0
    }

    pub fn is_display_on(&self) -> bool {
        self.aux0 & Self::AUX0_DISPLAY_ON != 0
    }

    pub fn is_euro(&self) -> bool {
        self.aux0 & Self::AUX0_EURO != 0
    }

    pub fn is_custom_sweep(&self) -> bool {
        self.aux0 & Self::AUX0_CUSTOM_SWEEP != 0
    }

    pub fn is_legacy(&self) -> bool {
        self.aux0 & Self::AUX0_LEGACY != 0
    }

    pub fn is_laser(&self) -> bool {
        self.is_system_status() && self.band_arrow1 & 0x01 != 0
    }

    pub fn is_ka(&self) -> bool {
        self.is_system_status() && self.band_arrow1 & 0x02 != 0
    }

    pub fn is_k(&self) -> bool {
        self.is_system_status() && self.band_arrow1 & 0x04 != 0
    }

    pub fn is_x(&self) -> bool {
        self.is_system_status() && self.band_arrow1 & 0x08 != 0
    }

    pub fn is_front(&self) -> bool {
        self.band_arrow1 & 0x20 != 0
    }

    pub fn is_side(&self) -> bool {
        self.band_arrow1 & 0x40 != 0
    }

    pub fn is_rear(&self) -> bool {
        self.band_arrow1 & 0x80 != 0
    }

    /// Any arrow lit while the detector reports normal status.
    pub fn has_active_alerts(&self) -> bool {
        self.is_system_status() && (self.is_front() || self.is_side() || self.is_rear())
    }

    /// Number of lit bar-graph segments.
    pub fn bar_graph_level(&self) -> u32 {
        self.bar_graph.count_ones()
    }

    pub fn mode(&self) -> Mode {
        match self.bogey_image1 & 0x7F {
            SEG_A | SEG_C | SEG_U => Mode::AllBogeys,
            SEG_LOWER_L | SEG_LOWER_U | SEG_LOWER_C => Mode::Logic,
            SEG_L => Mode::AdvancedLogic,
            _ => Mode::Unknown,
        }
    }
}

/// Radar/laser band of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AlertBand {
    Laser,
    Ka,
    K,
    X,
    Ku,
    Invalid,
}

impl AlertBand {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x1F {
            0x01 => AlertBand::Laser,
            0x02 => AlertBand::Ka,
            0x04 => AlertBand::K,
            0x08 => AlertBand::X,
            0x10 => AlertBand::Ku,
            _ => AlertBand::Invalid,
        }
    }
}

impl fmt::Display for AlertBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertBand::Laser => "Laser",
            AlertBand::Ka => "Ka",
            AlertBand::K => "K",
            AlertBand::X => "X",
            AlertBand::Ku => "Ku",
            AlertBand::Invalid => "Invalid Band",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Front,
    Side,
    Rear,
    Invalid,
}

impl Direction {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0xE0 {
            0x20 => Direction::Front,
            0x40 => Direction::Side,
            0x80 => Direction::Rear,
            _ => Direction::Invalid,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Front => "Front",
            Direction::Side => "Side",
            Direction::Rear => "Rear",
            Direction::Invalid => "Invalid Direction",
        };
        f.write_str(name)
    }
}

/// One entry of the alert table.
///
/// Wire layout: `index<<4 | count`, frequency (MHz, big endian), front
/// strength, rear strength, band/direction, aux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AlertData {
    pub index: u8,
    pub count: u8,
    pub frequency: u16,
    pub front_strength: u8,
    pub rear_strength: u8,
    pub band: AlertBand,
    pub direction: Direction,
    pub priority: bool,
    pub junk: bool,
    #[serde(skip)]
    raw: [u8; AlertData::LEN],
}

impl AlertData {
    pub const LEN: usize = 7;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; Self::LEN] = bytes.get(..Self::LEN)?.try_into().ok()?;
        Some(Self {
            index: raw[0] >> 4,
            count: raw[0] & 0x0F,
            frequency: u16::from_be_bytes([raw[1], raw[2]]),
            front_strength: raw[3],
            rear_strength: raw[4],
            band: AlertBand::from_bits(raw[5]),
            direction: Direction::from_bits(raw[5]),
            priority: raw[6] & 0x80 != 0,
            junk: raw[6] & 0x40 != 0,
            raw,
        })
    }

    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.raw
    }

    /// Raw strength for an arrow; the side arrow reports the stronger antenna.
    pub fn signal_strength(&self, direction: Direction) -> u8 {
        match direction {
            Direction::Front => self.front_strength,
            Direction::Rear => self.rear_strength,
            Direction::Side => self.front_strength.max(self.rear_strength),
            Direction::Invalid => 0,
        }
    }

    /// Signal strength mapped onto the 0..=8 bar graph for this alert's band.
    pub fn bar_graph_strength(&self, direction: Direction) -> u8 {
        let strength = self.signal_strength(direction);
        let thresholds: [u8; 7] = match self.band {
            AlertBand::Laser | AlertBand::Invalid => return 8,
            AlertBand::Ka => [0xBA, 0xB3, 0xAC, 0xA5, 0x9E, 0x97, 0x90],
            AlertBand::X => [0xD0, 0xC5, 0xBD, 0xB4, 0xAA, 0xA0, 0x96],
            AlertBand::K | AlertBand::Ku => [0xC2, 0xB8, 0xAE, 0xA4, 0x9A, 0x90, 0x88],
        };
        match thresholds.iter().position(|&t| strength >= t) {
            Some(pos) => 8 - pos as u8,
            None if strength >= 0x01 => 1,
            None => 0,
        }
    }
}

/// One custom-sweep section boundary reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepSection {
    pub index: u8,
    pub count: u8,
    pub upper_edge: u16,
    pub lower_edge: u16,
}

impl SweepSection {
    pub const LEN: usize = 5;
    /// Most sections a single response carries.
    pub const MAX_PER_PACKET: usize = 3;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let b: &[u8; Self::LEN] = bytes.get(..Self::LEN)?.try_into().ok()?;
        Some(Self {
            index: b[0] >> 4,
            count: b[0] & 0x0F,
            upper_edge: u16::from_be_bytes([b[1], b[2]]),
            lower_edge: u16::from_be_bytes([b[3], b[4]]),
        })
    }

    pub fn is_zero(&self) -> bool {
        self.upper_edge == 0 && self.lower_edge == 0
    }

    /// Number of sections contained in a payload of `len` bytes.
    pub fn contained_in(len: usize) -> usize {
        (len / Self::LEN).min(Self::MAX_PER_PACKET)
    }

    /// Non-empty sections carried by a sweep-sections payload.
    pub fn parse_all(payload: &[u8]) -> Vec<Self> {
        payload
            .chunks_exact(Self::LEN)
            .take(Self::MAX_PER_PACKET)
            .filter_map(Self::from_bytes)
            .filter(|section| !section.is_zero())
            .collect()
    }

    pub fn contains(&self, frequency: u16) -> bool {
        self.lower_edge <= frequency && frequency <= self.upper_edge
    }
}

/// A custom sweep definition, read from or written to the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepDefinition {
    pub index: u8,
    pub commit: bool,
    pub upper_edge: u16,
    pub lower_edge: u16,
}

impl SweepDefinition {
    pub const LEN: usize = 5;

    pub fn new(index: u8, lower_edge: u16, upper_edge: u16) -> Self {
        Self {
            index,
            commit: false,
            upper_edge,
            lower_edge,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let b: &[u8; Self::LEN] = bytes.get(..Self::LEN)?.try_into().ok()?;
        Some(Self {
            index: b[0] & 0x3F,
            commit: b[0] & 0x40 != 0,
            upper_edge: u16::from_be_bytes([b[1], b[2]]),
            lower_edge: u16::from_be_bytes([b[3], b[4]]),
        })
    }

    /// Write-request encoding. Bit 7 of the index byte is always set.
    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut index = (self.index & 0x3F) | 0x80;
        if self.commit {
            index |= 0x40;
        }
        let [uh, ul] = self.upper_edge.to_be_bytes();
        let [lh, ll] = self.lower_edge.to_be_bytes();
        [index, uh, ul, lh, ll]
    }

    pub fn is_empty(&self) -> bool {
        self.upper_edge == 0 && self.lower_edge == 0
    }

    pub fn is_range_valid(&self) -> bool {
        self.lower_edge < self.upper_edge
    }
}

/// Firmware version string such as `V4.1035`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Version(pub String);

impl Version {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(ascii_until_nul(bytes, usize::MAX))
    }

    /// Seven characters beginning with the device letter.
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 7
            && self
                .0
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic())
    }

    /// Numeric version, or `0.0` when the string is not well formed.
    pub fn as_f64(&self) -> f64 {
        if !self.is_well_formed() {
            return 0.0;
        }
        self.0[1..].parse().unwrap_or(0.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serial numbers are at most ten ASCII characters.
pub const SERIAL_NUMBER_MAX_LEN: usize = 10;

pub fn serial_number_from_bytes(bytes: &[u8]) -> String {
    ascii_until_nul(bytes, SERIAL_NUMBER_MAX_LEN)
}

fn ascii_until_nul(bytes: &[u8], max: usize) -> String {
    bytes
        .iter()
        .take(max)
        .take_while(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}

/// Raw user configuration bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UserBytes(pub [u8; UserBytes::LEN]);

impl UserBytes {
    pub const LEN: usize = 6;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Some(Self(bytes.get(..Self::LEN)?.try_into().ok()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Volume {
    pub main: u8,
    pub muted: u8,
}

impl Volume {
    pub const LEN: usize = 2;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [main, muted, ..] => Some(Self {
                main: *main,
                muted: *muted,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AllVolume {
    pub main: u8,
    pub muted: u8,
    pub saved_main: u8,
    pub saved_muted: u8,
}

impl AllVolume {
    pub const LEN: usize = 4;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [main, muted, saved_main, saved_muted, ..] => Some(Self {
                main: *main,
                muted: *muted,
                saved_main: *saved_main,
                saved_muted: *saved_muted,
            }),
            _ => None,
        }
    }
}

/// Supply voltage reported as whole and fractional parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatteryVoltage {
    pub whole: u8,
    pub fraction: u8,
}

impl BatteryVoltage {
    pub const LEN: usize = 2;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [whole, fraction, ..] => Some(Self {
                whole: *whole,
                fraction: *fraction,
            }),
            _ => None,
        }
    }
}

impl fmt::Display for BatteryVoltage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.whole, self.fraction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SavvyStatus {
    pub speed_threshold: u8,
    pub overridden_by_user: bool,
    pub unmute_enabled: bool,
}

impl SavvyStatus {
    pub const LEN: usize = 2;

    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [threshold, status, ..] => Some(Self {
                speed_threshold: *threshold,
                overridden_by_user: status & 0x01 != 0,
                unmute_enabled: status & 0x02 != 0,
            }),
            _ => None,
        }
    }
}
