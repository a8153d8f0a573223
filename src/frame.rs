//! Fixed-layout command and reply frames.
//!
//! Command (host to device):
//!
//! ```text
//! +--------+--------+--------+-----------------+----------+
//! | 0x55   | opcode | length | param (0..4 B)  | checksum |
//! +--------+--------+--------+-----------------+----------+
//! ```
//!
//! Reply (device to host):
//!
//! ```text
//! +--------+--------+--------+--------+-------------------+----------+
//! | 0xAA   | opcode | length | status | payload (0..4 B)  | checksum |
//! +--------+--------+--------+--------+-------------------+----------+
//! ```
//!
//! `length` counts the whole frame. The checksum is the two's complement of
//! the 8-bit sum of all preceding bytes, so a valid frame sums to zero.
//! Parameter and payload widths are fixed per [`Opcode`]; the identification
//! strings are the only payloads longer than 4 bytes.

use crate::constants::{
    COMMAND_MARKER, COMMAND_OVERHEAD, LENGTH_OFFSET, REPLY_MARKER, REPLY_OVERHEAD, REPLY_PAYLOAD_OFFSET,
};
use crate::error::Malformation;
use crate::opcode::Opcode;
use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{FromPrimitive, IntoPrimitive};

/// Result code carried in every reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum ReplyStatus {
    Ok = 0,
    /// Request not possible in the current operating state
    Busy = 1,
    /// Parameter rejected by the firmware
    OutOfRange = 2,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// One host-to-device request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub opcode: Opcode,
    pub param: Option<i64>,
}

impl Command {
    pub fn new(opcode: Opcode) -> Self {
        Self { opcode, param: None }
    }

    pub fn with_param(opcode: Opcode, param: i64) -> Self {
        Self {
            opcode,
            param: Some(param),
        }
    }

    /// Serialize to the wire format. The parameter is truncated to the
    /// opcode's width; a missing parameter for a parameterised opcode is sent
    /// as zero.
    pub fn encode(&self) -> Bytes {
        encode_command(self.opcode, self.param)
    }
}

/// A reply that passed every structural check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedReply {
    pub opcode: Opcode,
    pub status: ReplyStatus,
    /// Payload, sign- or zero-extended according to the opcode's reply width.
    /// Zero for text payloads.
    pub value: i64,
    /// Payload bytes as received
    pub payload: Bytes,
}

pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)).wrapping_neg()
}

fn finish(mut frame: BytesMut) -> Bytes {
    let sum = checksum(&frame);
    frame.put_u8(sum);
    frame.freeze()
}

pub fn encode_command(opcode: Opcode, param: Option<i64>) -> Bytes {
    let width = opcode.param_width();
    let len = COMMAND_OVERHEAD + width.len();
    let mut frame = BytesMut::with_capacity(len);
    frame.put_u8(COMMAND_MARKER);
    frame.put_u8(opcode.into());
    frame.put_u8(len as u8);
    width.put(&mut frame, param.unwrap_or(0));
    finish(frame)
}

pub fn encode_reply(opcode: Opcode, status: ReplyStatus, value: i64) -> Bytes {
    let width = opcode.reply_width();
    reply_frame(opcode, status, |frame| width.put(frame, value))
}

/// Reply with a text payload, NUL-padded or truncated to the opcode's width.
pub fn encode_text_reply(opcode: Opcode, status: ReplyStatus, text: &[u8]) -> Bytes {
    let len = opcode.reply_width().len();
    reply_frame(opcode, status, |frame| {
        let text = &text[..text.len().min(len)];
        frame.put_slice(text);
        frame.put_bytes(0, len - text.len());
    })
}

fn reply_frame(opcode: Opcode, status: ReplyStatus, payload: impl FnOnce(&mut BytesMut)) -> Bytes {
    let len = REPLY_OVERHEAD + opcode.reply_width().len();
    let mut frame = BytesMut::with_capacity(len);
    frame.put_u8(REPLY_MARKER);
    frame.put_u8(opcode.into());
    frame.put_u8(len as u8);
    frame.put_u8(status.into());
    payload(&mut frame);
    finish(frame)
}

/// Validate length, header marker, opcode echo and checksum, in that order,
/// then extract status and payload.
pub fn decode_reply(raw: &[u8], expected: Opcode) -> Result<DecodedReply, Malformation> {
    check_length(raw, REPLY_OVERHEAD)?;
    if raw[0] != REPLY_MARKER {
        return Err(Malformation::BadMarker(raw[0]));
    }
    let sent: u8 = expected.into();
    if raw[1] != sent {
        return Err(Malformation::OpcodeMismatch {
            expected: sent,
            actual: raw[1],
        });
    }
    check_sum(raw)?;

    let width = expected.reply_width();
    let expected_len = REPLY_OVERHEAD + width.len();
    if raw.len() != expected_len {
        return Err(Malformation::UnexpectedLength {
            opcode: sent,
            declared: raw.len(),
            expected: expected_len,
        });
    }

    let payload = &raw[REPLY_PAYLOAD_OFFSET..raw.len() - 1];
    Ok(DecodedReply {
        opcode: expected,
        status: ReplyStatus::from_primitive(raw[3]),
        value: width.get(&mut &payload[..]),
        payload: Bytes::copy_from_slice(payload),
    })
}

/// Device-side counterpart of [`encode_command`], used by simulators.
pub fn decode_command(raw: &[u8]) -> Result<Command, Malformation> {
    check_length(raw, COMMAND_OVERHEAD)?;
    if raw[0] != COMMAND_MARKER {
        return Err(Malformation::BadMarker(raw[0]));
    }
    check_sum(raw)?;
    let opcode = Opcode::try_from(raw[1]).map_err(|_| Malformation::UnknownOpcode(raw[1]))?;

    let width = opcode.param_width();
    let expected_len = COMMAND_OVERHEAD + width.len();
    if raw.len() != expected_len {
        return Err(Malformation::UnexpectedLength {
            opcode: raw[1],
            declared: raw.len(),
            expected: expected_len,
        });
    }

    let param = (!width.is_empty()).then(|| {
        let mut bytes = &raw[LENGTH_OFFSET + 1..raw.len() - 1];
        width.get(&mut bytes)
    });
    Ok(Command { opcode, param })
}

fn check_length(raw: &[u8], minimum: usize) -> Result<(), Malformation> {
    if raw.len() < minimum {
        return Err(Malformation::TooShort {
            expected: minimum,
            actual: raw.len(),
        });
    }
    let declared = raw[LENGTH_OFFSET] as usize;
    if declared != raw.len() {
        return Err(Malformation::LengthMismatch {
            declared,
            actual: raw.len(),
        });
    }
    Ok(())
}

fn check_sum(raw: &[u8]) -> Result<(), Malformation> {
    let (body, tail) = raw.split_at(raw.len() - 1);
    let computed = checksum(body);
    if computed != tail[0] {
        return Err(Malformation::Checksum {
            computed,
            received: tail[0],
        });
    }
    Ok(())
}
