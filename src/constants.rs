// Protocol constants for Alluris instruments

use std::time::Duration;

/// Default OUT endpoint (host to device)
pub const ENDPOINT_OUT: u8 = 0x01;

/// Default IN endpoint (device to host)
pub const ENDPOINT_IN: u8 = 0x81;

/// Default timeout while writing to the device
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(50);

/// Default timeout while reading from the device (must exceed 800 ms)
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(4000);

/// Default receive buffer size, a multiple of wMaxPacketSize
pub const DEFAULT_RECV_BUF_LEN: usize = 256;

/// Per-read timeout used while discarding stale input
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(10);

/// Upper bound on reads during one stale-input flush
pub const DEFAULT_MAX_FLUSH_READS: usize = 64;

/// First byte of every host-to-device command frame
pub const COMMAND_MARKER: u8 = 0x55;

/// First byte of every device-to-host reply frame
pub const REPLY_MARKER: u8 = 0xAA;

/// First byte of every streamed sample frame
pub const STREAM_MARKER: u8 = 0x5A;

/// Command frame bytes besides the parameter: marker, opcode, length, checksum
pub const COMMAND_OVERHEAD: usize = 4;

/// Reply frame bytes besides the payload: marker, opcode, length, status, checksum
pub const REPLY_OVERHEAD: usize = 5;

/// Offset of the length byte in both command and reply frames
pub const LENGTH_OFFSET: usize = 2;

/// Offset of the payload in reply frames
pub const REPLY_PAYLOAD_OFFSET: usize = 4;

/// Stream frame header: marker and value count
pub const STREAM_HEADER_SIZE: usize = 2;

/// One streamed sample is a little-endian int24
pub const SAMPLE_SIZE: usize = 3;

/// Most values the firmware packs into one 64-byte stream packet
pub const MAX_VALUES_PER_FRAME: u8 = 19;

/// Upper bound on transfers consumed by one non-blocking poll
pub const MAX_NONBLOCKING_READS: usize = 64;

/// Size of the ASCII identification fields (serial and calibration number)
pub const TEXT_FIELD_LEN: usize = 10;

/// Number of entries in the on-device value memory
pub const MEMORY_SIZE: u16 = 1000;

/// Largest force range (in N) that uses the small-range units cN, g and oz
pub const SMALL_RANGE_MAX_NEWTON: i32 = 10;
