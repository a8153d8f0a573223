use crate::opcode::Opcode;
use num_enum::IntoPrimitive;
use strum_macros::Display;
use thiserror::Error;

/// The primary error type for the `alluris` library.
///
/// Every fallible operation returns exactly one of these. [`Error::kind`]
/// projects it onto the five-way device taxonomy (plus hard transport
/// failures).
#[derive(Error, Debug)]
pub enum Error {
    /// The reply failed structural validation. Check EMI and the physical
    /// connection; the receive path has already been flushed.
    #[error("Malformed reply: {0}")]
    MalformedReply(#[from] Malformation),

    /// The device understood the request but cannot honour it in its current
    /// state (e.g. reading limits while a measurement is running).
    #[error("Device busy: {opcode} rejected in current operating state")]
    DeviceBusy { opcode: Opcode },

    #[error("No response or status change in given time")]
    Timeout,

    /// Parameter outside the valid domain for this operation or device variant.
    #[error("Parameter out of range: {0}")]
    OutOfRange(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("USB transport error: {0}")]
    Transport(TransportError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedReply(_) => ErrorKind::MalformedReply,
            Error::DeviceBusy { .. } => ErrorKind::DeviceBusy,
            Error::Timeout => ErrorKind::Timeout,
            Error::OutOfRange(_) => ErrorKind::OutOfRange,
            Error::ParseError(_) | Error::Config(_) => ErrorKind::ParseError,
            Error::Transport(_) => ErrorKind::Transport,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => Error::Timeout,
            other => Error::Transport(other),
        }
    }
}

/// Error classes with their stable numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoPrimitive)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[repr(i32)]
pub enum ErrorKind {
    MalformedReply = 1,
    DeviceBusy = 2,
    Timeout = 3,
    OutOfRange = 4,
    ParseError = 5,
    Transport = 6,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        self.into()
    }
}

/// Why a frame was rejected by the codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Malformation {
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },

    #[error("declared length {declared} does not match received length {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("bad header marker {0:#04x}")]
    BadMarker(u8),

    #[error("opcode mismatch: sent {expected:#04x}, got {actual:#04x}")]
    OpcodeMismatch { expected: u8, actual: u8 },

    #[error("checksum mismatch: computed {computed:#04x}, received {received:#04x}")]
    Checksum { computed: u8, received: u8 },

    #[error("length {declared} inconsistent with opcode {opcode:#04x} (expected {expected})")]
    UnexpectedLength {
        opcode: u8,
        declared: usize,
        expected: usize,
    },

    #[error("unknown opcode {0:#04x}")]
    UnknownOpcode(u8),

    #[error("truncated stream frame: need {expected} bytes, got {actual}")]
    TruncatedStream { expected: usize, actual: usize },
}

/// Failure of the raw transfer primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transfer timed out")]
    Timeout,

    #[error("endpoint stalled")]
    Stall,

    #[error("device disconnected")]
    Disconnected,

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("{0}")]
    Other(String),
}

impl From<nusb::transfer::TransferError> for TransportError {
    fn from(err: nusb::transfer::TransferError) -> Self {
        use nusb::transfer::TransferError;
        match err {
            TransferError::Stall => TransportError::Stall,
            TransferError::Disconnected => TransportError::Disconnected,
            other => TransportError::Other(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_timeout_classifies_as_timeout() {
        let err = Error::from(TransportError::Timeout);
        assert!(matches!(err, Error::Timeout));
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err = Error::from(TransportError::Disconnected);
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert!(err.to_string().contains("disconnected"));
    }

    #[test]
    fn test_error_kind_codes_and_names() {
        assert_eq!(ErrorKind::MalformedReply.code(), 1);
        assert_eq!(ErrorKind::DeviceBusy.code(), 2);
        assert_eq!(ErrorKind::Timeout.code(), 3);
        assert_eq!(ErrorKind::OutOfRange.code(), 4);
        assert_eq!(ErrorKind::ParseError.code(), 5);

        assert_eq!(ErrorKind::MalformedReply.to_string(), "MALFORMED_REPLY");
        assert_eq!(ErrorKind::OutOfRange.to_string(), "OUT_OF_RANGE");
    }

    #[test]
    fn test_malformed_display() {
        let err = Error::from(Malformation::Checksum {
            computed: 0x12,
            received: 0x13,
        });
        assert_eq!(err.kind(), ErrorKind::MalformedReply);
        assert_eq!(
            err.to_string(),
            "Malformed reply: checksum mismatch: computed 0x12, received 0x13"
        );
    }
}
