//! Typed values exchanged with the instrument: units, modes, variants and
//! the small records some queries return.

use crate::constants::SMALL_RANGE_MAX_NEWTON;
use crate::error::Error;
use crate::opcode::Opcode;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;
use strum_macros::Display;

/// Measurement mode
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    Default,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum Mode {
    #[default]
    #[strum(to_string = "standard")]
    Standard = 0,
    #[strum(to_string = "peak")]
    Peak = 1,
    /// Peak with maximum detection
    #[strum(to_string = "peak+")]
    PeakMax = 2,
    /// Peak with minimum detection
    #[strum(to_string = "peak-")]
    PeakMin = 3,
}

impl Mode {
    /// Internal sampling rate of the mode
    pub fn sampling_rate_hz(&self) -> u32 {
        match self {
            Mode::Standard => 10,
            Mode::Peak | Mode::PeakMax | Mode::PeakMin => 900,
        }
    }
}

/// Memory mode
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Display,
    Default,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum MemoryMode {
    #[default]
    #[strum(to_string = "disabled")]
    Disabled = 0,
    /// Store a single value with key S
    #[strum(to_string = "single")]
    Single = 1,
    /// Start/stop continuous capturing with key S
    #[strum(to_string = "continuous")]
    Continuous = 2,
    /// Standalone quick check, TTT only
    #[strum(to_string = "quick check")]
    QuickCheck = 3,
}

/// Display unit of the force value.
///
/// Which units a gauge accepts depends on its nominal range, see
/// [`Unit::is_supported_for_range`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    Default,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u8)]
pub enum Unit {
    #[default]
    #[strum(to_string = "N")]
    #[serde(rename = "N")]
    Newton = 0,
    #[strum(to_string = "cN")]
    #[serde(rename = "cN")]
    CentiNewton = 1,
    #[strum(to_string = "kg")]
    #[serde(rename = "kg")]
    Kilogram = 2,
    #[strum(to_string = "g")]
    #[serde(rename = "g")]
    Gram = 3,
    #[strum(to_string = "lb")]
    #[serde(rename = "lb")]
    Pound = 4,
    #[strum(to_string = "oz")]
    #[serde(rename = "oz")]
    Ounce = 5,
}

impl Unit {
    pub const ALL: [Unit; 6] = [
        Unit::Newton,
        Unit::CentiNewton,
        Unit::Kilogram,
        Unit::Gram,
        Unit::Pound,
        Unit::Ounce,
    ];

    /// cN, g and oz exist only on 5 N and 10 N gauges, kg and lb only above.
    pub fn is_supported_for_range(&self, f_max_newton: i32) -> bool {
        let small = f_max_newton <= SMALL_RANGE_MAX_NEWTON;
        match self {
            Unit::Newton => true,
            Unit::CentiNewton | Unit::Gram | Unit::Ounce => small,
            Unit::Kilogram | Unit::Pound => !small,
        }
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Unit::ALL
            .into_iter()
            .find(|unit| unit.to_string() == s)
            .ok_or_else(|| Error::ParseError(format!("unknown unit '{s}'")))
    }
}

/// Hardware variant reported by the instrument.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    TryFromPrimitive,
    IntoPrimitive,
    Serialize,
    Deserialize,
)]
#[repr(u16)]
pub enum Variant {
    #[strum(to_string = "FMI-S10")]
    S10 = 0x0000,
    #[strum(to_string = "FMI-S20")]
    S20 = 0x0001,
    #[strum(to_string = "FMI-S30")]
    S30 = 0x0002,
    #[strum(to_string = "FMI-W30")]
    W30 = 0x0003,
    #[strum(to_string = "FMI-W40")]
    W40 = 0x0004,
    #[strum(to_string = "FMI-S50")]
    S50 = 0x0005,
    #[strum(to_string = "FMI-W20")]
    W20 = 0x0006,
    #[strum(to_string = "FMI-W10")]
    W10 = 0x0007,
    #[strum(to_string = "FMI-B10")]
    B10 = 0x0010,
    #[strum(to_string = "FMI-B20")]
    B20 = 0x0011,
    #[strum(to_string = "FMI-B30")]
    B30 = 0x0012,
    #[strum(to_string = "FMI-B50")]
    B50 = 0x0015,
    #[strum(to_string = "FMT-315")]
    Fmt315 = 0x0020,
    #[strum(to_string = "CTT-200")]
    Ctt200 = 0x0040,
    #[strum(to_string = "CTT-300")]
    Ctt300 = 0x0080,
    #[strum(to_string = "TTT-200")]
    Ttt200 = 0x0100,
    #[strum(to_string = "TTT-300")]
    Ttt300 = 0x0200,
}

impl Variant {
    /// Only these set the `fracture` status flag.
    pub fn has_fracture_detection(&self) -> bool {
        matches!(self, Variant::W20 | Variant::W40)
    }

    /// Motorised test stand rather than a hand-held gauge
    pub fn is_test_stand(&self) -> bool {
        matches!(
            self,
            Variant::Fmt315 | Variant::Ctt200 | Variant::Ctt300 | Variant::Ttt200 | Variant::Ttt300
        )
    }
}

/// Set of front panel keys for [`crate::Device::sim_keypress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct KeyMask(u8);

impl KeyMask {
    pub const S: KeyMask = KeyMask(0x01);
    pub const P: KeyMask = KeyMask(0x02);
    pub const T: KeyMask = KeyMask(0x04);
    pub const ON_OFF: KeyMask = KeyMask(0x08);

    const KNOWN: u8 = 0x0F;

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Non-empty and made of known keys only.
    pub fn is_valid(&self) -> bool {
        !self.is_empty() && self.0 & !Self::KNOWN == 0
    }

    pub fn contains(&self, other: KeyMask) -> bool {
        self.0 & other.0 == other.0
    }
}

impl From<u8> for KeyMask {
    fn from(bits: u8) -> Self {
        KeyMask(bits)
    }
}

impl BitOr for KeyMask {
    type Output = KeyMask;

    fn bitor(self, rhs: KeyMask) -> KeyMask {
        KeyMask(self.0 | rhs.0)
    }
}

/// Firmware revision of the gauge (part 0) or the measurement board (part 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub build: u16,
}

impl From<u32> for FirmwareVersion {
    fn from(word: u32) -> Self {
        Self {
            major: (word >> 24) as u8,
            minor: (word >> 16) as u8,
            build: word as u16,
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{}.{:02}.{:03}", self.major, self.minor, self.build)
    }
}

/// Statistics over the on-device value memory, in instrument digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub max: i32,
    pub min: i32,
    pub mean: i32,
    pub std_dev: i32,
    pub count: i32,
}

impl MemoryStatistics {
    /// Order in which the device reports the fields
    pub const FIELDS: usize = 5;

    pub fn from_values(values: [i32; Self::FIELDS]) -> Self {
        let [max, min, mean, std_dev, count] = values;
        Self {
            max,
            min,
            mean,
            std_dev,
            count,
        }
    }
}

/// Conversion of a decoded reply payload into a typed value.
pub trait ReplyValue: Sized {
    fn from_reply(opcode: Opcode, raw: i64) -> Result<Self, Error>;
}

fn unknown_code(opcode: Opcode, what: &str, raw: i64) -> Error {
    Error::ParseError(format!("{opcode} returned unknown {what} code {raw}"))
}

macro_rules! reply_int {
    ($($ty:ty),*) => {
        $(
            impl ReplyValue for $ty {
                fn from_reply(opcode: Opcode, raw: i64) -> Result<Self, Error> {
                    <$ty>::try_from(raw).map_err(|_| {
                        Error::ParseError(format!("{opcode} payload {raw} does not fit {}", stringify!($ty)))
                    })
                }
            }
        )*
    };
}

reply_int!(i32, u8, u16, u32);

impl ReplyValue for bool {
    fn from_reply(opcode: Opcode, raw: i64) -> Result<Self, Error> {
        match raw {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(unknown_code(opcode, "boolean", other)),
        }
    }
}

macro_rules! reply_enum {
    ($($ty:ty => $repr:ty, $what:literal);* $(;)?) => {
        $(
            impl ReplyValue for $ty {
                fn from_reply(opcode: Opcode, raw: i64) -> Result<Self, Error> {
                    <$repr>::try_from(raw)
                        .ok()
                        .and_then(|code| <$ty>::try_from(code).ok())
                        .ok_or_else(|| unknown_code(opcode, $what, raw))
                }
            }
        )*
    };
}

reply_enum! {
    Mode => u8, "mode";
    MemoryMode => u8, "memory mode";
    Unit => u8, "unit";
    Variant => u16, "variant";
}

impl ReplyValue for FirmwareVersion {
    fn from_reply(opcode: Opcode, raw: i64) -> Result<Self, Error> {
        u32::from_reply(opcode, raw).map(FirmwareVersion::from)
    }
}

/// Identification string from a NUL-padded ASCII payload, e.g. "P.25412".
///
/// The text ends at the first NUL; trailing blanks are dropped.
pub fn text_from_reply(opcode: Opcode, payload: &[u8]) -> Result<String, Error> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    let text = payload[..end].trim_ascii_end();
    if let Some(bad) = text.iter().find(|b| !(b.is_ascii_graphic() || **b == b' ')) {
        return Err(Error::ParseError(format!("{opcode} returned non-ASCII byte {bad:#04x}")));
    }
    Ok(text.iter().map(|&b| char::from(b)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_text_payloads() {
        let op = Opcode::GetSerialNumber;
        assert_eq!(text_from_reply(op, b"P.25412\0\0\0").unwrap(), "P.25412");
        assert_eq!(text_from_reply(op, b"K 0815    ").unwrap(), "K 0815");
        assert_eq!(text_from_reply(op, b"\0garbage\xFF").unwrap(), "");
        let err = text_from_reply(op, b"P.2\xC3\xA4\0").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
        assert!(text_from_reply(op, b"P.2\n541\0").is_err());
    }

    #[test]
    fn test_unit_names_round_trip() {
        for unit in Unit::ALL {
            assert_eq!(unit.to_string().parse::<Unit>().unwrap(), unit);
        }
        assert_eq!(Unit::CentiNewton.to_string(), "cN");
        let err = "Nm".parse::<Unit>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_unit_range_rules() {
        assert!(Unit::Newton.is_supported_for_range(5));
        assert!(Unit::Newton.is_supported_for_range(500));
        assert!(Unit::Ounce.is_supported_for_range(10));
        assert!(!Unit::Ounce.is_supported_for_range(500));
        assert!(Unit::Kilogram.is_supported_for_range(50));
        assert!(!Unit::Pound.is_supported_for_range(10));
    }

    #[test]
    fn test_enum_replies() {
        assert_eq!(Mode::from_reply(Opcode::GetMode, 2).unwrap(), Mode::PeakMax);
        assert_eq!(Variant::from_reply(Opcode::GetVariant, 0x0100).unwrap(), Variant::Ttt200);
        assert_eq!(Variant::Ttt200.to_string(), "TTT-200");

        let err = Unit::from_reply(Opcode::GetUnit, 9).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
        let err = MemoryMode::from_reply(Opcode::GetMemMode, -1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParseError);
    }

    #[test]
    fn test_integer_replies_are_range_checked() {
        assert_eq!(i32::from_reply(Opcode::GetValue, -8_388_608).unwrap(), -8_388_608);
        assert!(u8::from_reply(Opcode::GetDigits, 256).is_err());
        assert!(bool::from_reply(Opcode::GetMotorEnable, 1).unwrap());
        assert!(bool::from_reply(Opcode::GetMotorEnable, 2).is_err());
    }

    #[test]
    fn test_key_mask() {
        let mask = KeyMask::S | KeyMask::T;
        assert_eq!(mask.bits(), 0x05);
        assert!(mask.contains(KeyMask::T));
        assert!(mask.is_valid());
        assert!(!KeyMask::default().is_valid());
        assert!(!KeyMask::from(0x10).is_valid());
    }

    #[test]
    fn test_firmware_version_display() {
        let version = FirmwareVersion::from(0x0102_0015);
        assert_eq!(version, FirmwareVersion { major: 1, minor: 2, build: 21 });
        assert_eq!(version.to_string(), "V1.02.021");
    }

    #[test]
    fn test_variant_capabilities() {
        assert!(Variant::W40.has_fracture_detection());
        assert!(!Variant::S50.has_fracture_detection());
        assert!(Variant::Ctt300.is_test_stand());
        assert!(!Variant::B10.is_test_stand());
    }
}
