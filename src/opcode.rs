use crate::constants::TEXT_FIELD_LEN;
use bytes::{Buf, BufMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;

/// Fixed width of a parameter or reply payload on the wire.
///
/// All multi-byte values are little-endian. Force-like quantities travel as
/// signed 24-bit integers. Identification strings travel as fixed-size ASCII
/// fields padded with NUL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    None,
    U8,
    U16,
    I24,
    U32,
    Text(usize),
}

impl Width {
    pub const fn len(self) -> usize {
        match self {
            Width::None => 0,
            Width::U8 => 1,
            Width::U16 => 2,
            Width::I24 => 3,
            Width::U32 => 4,
            Width::Text(n) => n,
        }
    }

    pub const fn is_empty(self) -> bool {
        matches!(self, Width::None)
    }

    pub const fn is_signed(self) -> bool {
        matches!(self, Width::I24)
    }

    /// Smallest and largest value representable in this width. Text carries
    /// no number.
    pub const fn bounds(self) -> (i64, i64) {
        match self {
            Width::None | Width::Text(_) => (0, 0),
            Width::U8 => (0, u8::MAX as i64),
            Width::U16 => (0, u16::MAX as i64),
            Width::I24 => (-(1 << 23), (1 << 23) - 1),
            Width::U32 => (0, u32::MAX as i64),
        }
    }

    pub const fn contains(self, value: i64) -> bool {
        let (min, max) = self.bounds();
        value >= min && value <= max
    }

    /// Append `value` truncated to this width. A text field is written as
    /// all NUL.
    pub fn put(self, buf: &mut impl BufMut, value: i64) {
        match self {
            Width::None => {}
            Width::Text(n) => buf.put_bytes(0, n),
            w => buf.put_int_le(value, w.len()),
        }
    }

    /// Read one value of this width, sign-extending signed widths.
    /// The caller guarantees `buf` holds at least `self.len()` bytes.
    pub fn get(self, buf: &mut impl Buf) -> i64 {
        match self {
            Width::None => 0,
            Width::Text(n) => {
                buf.advance(n);
                0
            }
            w if w.is_signed() => buf.get_int_le(w.len()),
            w => buf.get_uint_le(w.len()) as i64,
        }
    }
}

/// Operation codes understood by the instrument firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Opcode {
    GetStatus = 0x01,
    GetValue = 0x02,
    GetPosPeak = 0x03,
    GetNegPeak = 0x04,
    Tare = 0x05,
    ClearPosPeak = 0x06,
    ClearNegPeak = 0x07,
    StartMeasurement = 0x08,
    StopMeasurement = 0x09,
    SetUpperLimit = 0x0A,
    SetLowerLimit = 0x0B,
    GetUpperLimit = 0x0C,
    GetLowerLimit = 0x0D,
    SetMode = 0x0E,
    GetMode = 0x0F,
    SetMemMode = 0x10,
    GetMemMode = 0x11,
    SetUnit = 0x12,
    GetUnit = 0x13,
    SetDigout = 0x14,
    GetDigout = 0x15,
    GetDigin = 0x16,
    RestoreFactoryDefaults = 0x17,
    PowerOff = 0x18,
    ReadMemory = 0x19,
    DeleteMemory = 0x1A,
    GetMemCount = 0x1B,
    GetMemStatistic = 0x1C,
    SimKeypress = 0x1D,
    SetPeakLevel = 0x1E,
    GetPeakLevel = 0x1F,
    SetAutostop = 0x20,
    GetAutostop = 0x21,
    SetKeyLock = 0x22,
    MotorReferenceRun = 0x23,
    SetMotorDisable = 0x24,
    GetMotorEnable = 0x25,
    SetBuzzerMotor = 0x26,
    GetBuzzerMotor = 0x27,
    SetMotorStart = 0x28,
    SetMotorStop = 0x29,
    SetDataRatio = 0x2A,
    CyclicMeasurement = 0x2B,
    GetDigits = 0x30,
    GetResolution = 0x31,
    GetFMax = 0x32,
    GetVariant = 0x33,
    GetNextCalibrationDate = 0x34,
    GetCalibrationDate = 0x35,
    ReadFlash = 0x36,
    GetUncertainty = 0x37,
    GetFirmware = 0x38,
    GetCalibrationNumber = 0x39,
    GetSerialNumber = 0x3A,
}

impl Opcode {
    pub const ALL: [Opcode; 54] = [
        Opcode::GetStatus,
        Opcode::GetValue,
        Opcode::GetPosPeak,
        Opcode::GetNegPeak,
        Opcode::Tare,
        Opcode::ClearPosPeak,
        Opcode::ClearNegPeak,
        Opcode::StartMeasurement,
        Opcode::StopMeasurement,
        Opcode::SetUpperLimit,
        Opcode::SetLowerLimit,
        Opcode::GetUpperLimit,
        Opcode::GetLowerLimit,
        Opcode::SetMode,
        Opcode::GetMode,
        Opcode::SetMemMode,
        Opcode::GetMemMode,
        Opcode::SetUnit,
        Opcode::GetUnit,
        Opcode::SetDigout,
        Opcode::GetDigout,
        Opcode::GetDigin,
        Opcode::RestoreFactoryDefaults,
        Opcode::PowerOff,
        Opcode::ReadMemory,
        Opcode::DeleteMemory,
        Opcode::GetMemCount,
        Opcode::GetMemStatistic,
        Opcode::SimKeypress,
        Opcode::SetPeakLevel,
        Opcode::GetPeakLevel,
        Opcode::SetAutostop,
        Opcode::GetAutostop,
        Opcode::SetKeyLock,
        Opcode::MotorReferenceRun,
        Opcode::SetMotorDisable,
        Opcode::GetMotorEnable,
        Opcode::SetBuzzerMotor,
        Opcode::GetBuzzerMotor,
        Opcode::SetMotorStart,
        Opcode::SetMotorStop,
        Opcode::SetDataRatio,
        Opcode::CyclicMeasurement,
        Opcode::GetDigits,
        Opcode::GetResolution,
        Opcode::GetFMax,
        Opcode::GetVariant,
        Opcode::GetNextCalibrationDate,
        Opcode::GetCalibrationDate,
        Opcode::ReadFlash,
        Opcode::GetUncertainty,
        Opcode::GetFirmware,
        Opcode::GetCalibrationNumber,
        Opcode::GetSerialNumber,
    ];

    /// Width of the parameter the host sends with this opcode.
    pub const fn param_width(self) -> Width {
        use Opcode::*;
        match self {
            SetUpperLimit | SetLowerLimit => Width::I24,
            ReadMemory | ReadFlash => Width::U16,
            SetMode | SetMemMode | SetUnit | SetDigout | GetMemStatistic | SimKeypress
            | SetPeakLevel | SetAutostop | SetKeyLock | MotorReferenceRun | SetMotorDisable
            | SetBuzzerMotor | SetMotorStart | SetMotorStop | SetDataRatio | CyclicMeasurement
            | GetFirmware => Width::U8,
            _ => Width::None,
        }
    }

    /// Width of the payload the device returns for this opcode.
    pub const fn reply_width(self) -> Width {
        use Opcode::*;
        match self {
            GetStatus | GetNextCalibrationDate | GetFirmware => Width::U32,
            GetValue | GetPosPeak | GetNegPeak | GetUpperLimit | GetLowerLimit | ReadMemory
            | GetMemStatistic | GetFMax => Width::I24,
            GetMemCount | GetVariant | GetCalibrationDate | ReadFlash | GetUncertainty => Width::U16,
            GetMode | GetMemMode | GetUnit | GetDigout | GetDigin | GetPeakLevel | GetAutostop
            | GetMotorEnable | GetBuzzerMotor | GetDigits | GetResolution => Width::U8,
            GetCalibrationNumber | GetSerialNumber => Width::Text(TEXT_FIELD_LEN),
            _ => Width::None,
        }
    }
}
