//! Common test utilities: a scripted transport and a simulated gauge.

// Shared across test files, not every item is used in every file
#![allow(dead_code)]

#[allow(unused_imports)]
pub use alluris::{
    Command, CyclicConfig, DebugLevel, Device, DeviceConfig, Engine, Error, ErrorKind, Malformation, Opcode,
    ReplyStatus, Session, SessionConfig, Transport, TransportError, Unit,
};
#[allow(unused_imports)]
pub use alluris::frame::{decode_command, encode_reply, encode_text_reply};
pub use bytes::Bytes;
#[allow(unused_imports)]
pub use hex;

use alluris::constants::STREAM_MARKER;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Route library events to the test output; `RUST_LOG=alluris=trace` shows
/// wire dumps for sessions configured with [`DebugLevel::Wire`].
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Decode hex string to bytes for testing
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// Session config with short timeouts so failing tests fail fast.
pub fn fast_config() -> DeviceConfig {
    let mut config = DeviceConfig::default().with_debug_level(DebugLevel::Wire);
    config.session.receive_timeout = Duration::from_millis(200);
    config.session.flush_timeout = Duration::from_millis(2);
    config.state_change_timeout = Duration::from_millis(300);
    config.state_poll_interval = Duration::from_millis(5);
    config
}

/// One stream frame carrying `values`.
pub fn stream_frame(values: &[i32]) -> Vec<u8> {
    let mut raw = vec![STREAM_MARKER, values.len() as u8];
    for value in values {
        raw.extend_from_slice(&value.to_le_bytes()[..3]);
    }
    raw
}

/// Replays canned IN transfers and records every OUT transfer.
///
/// With nothing left to replay a read waits out its timeout, like a device
/// that stays silent.
#[derive(Default)]
pub struct ScriptedTransport {
    pub replies: VecDeque<Bytes>,
    pub sent: Vec<Bytes>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Bytes>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            sent: Vec::new(),
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, _endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        self.sent.push(Bytes::copy_from_slice(data));
        Ok(data.len())
    }

    fn receive(&mut self, _endpoint: u8, _max_len: usize, timeout: Duration) -> Result<Bytes, TransportError> {
        match self.replies.pop_front() {
            Some(reply) => Ok(reply),
            None => {
                std::thread::sleep(timeout);
                Err(TransportError::Timeout)
            }
        }
    }
}

struct Stream {
    values_per_frame: usize,
    next_due: Instant,
}

/// Firmware model good enough to drive the whole facade.
///
/// Replies are queued as soon as a command is written. While streaming, a
/// frame of `values_per_frame` counter values becomes due every
/// `stream_interval`; frames that are due are delivered before queued
/// replies, concatenated into one transfer when several are pending.
pub struct SimDevice {
    pub registers: HashMap<Opcode, i64>,
    /// Payloads of the identification strings
    pub texts: HashMap<Opcode, Vec<u8>>,
    pub received: Vec<alluris::Command>,
    pub measuring: bool,
    /// Status reads that still report the old state after start/stop
    pub state_lag: usize,
    pub stream_interval: Duration,
    /// Accept commands but never answer
    pub silent: bool,
    target_measuring: bool,
    lag_remaining: usize,
    outbox: VecDeque<Bytes>,
    stream: Option<Stream>,
    counter: i32,
}

impl Default for SimDevice {
    fn default() -> Self {
        let registers = HashMap::from([
            (Opcode::GetValue, 1234),
            (Opcode::GetPosPeak, 2500),
            (Opcode::GetNegPeak, -1800),
            (Opcode::GetUpperLimit, 5000),
            (Opcode::GetLowerLimit, -5000),
            (Opcode::GetFMax, 500),
            (Opcode::GetDigits, 4),
            (Opcode::GetResolution, 1),
            (Opcode::GetVariant, 0x0004),
            (Opcode::GetFirmware, 0x0102_0015),
            (Opcode::GetUncertainty, 125),
            (Opcode::GetMemCount, 3),
            (Opcode::GetPeakLevel, 5),
            (Opcode::GetMotorEnable, 1),
        ]);
        let texts = HashMap::from([
            (Opcode::GetSerialNumber, b"P.25412".to_vec()),
            (Opcode::GetCalibrationNumber, b"K-2041".to_vec()),
        ]);
        Self {
            registers,
            texts,
            received: Vec::new(),
            measuring: false,
            state_lag: 0,
            stream_interval: Duration::from_millis(5),
            silent: false,
            target_measuring: false,
            lag_remaining: 0,
            outbox: VecDeque::new(),
            stream: None,
            counter: 0,
        }
    }
}

impl SimDevice {
    pub fn with_f_max(f_max: i64) -> Self {
        let mut sim = Self::default();
        sim.registers.insert(Opcode::GetFMax, f_max);
        sim
    }

    /// Accepts commands but never answers.
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    /// Already measuring, as if started from the front panel.
    pub fn measuring() -> Self {
        Self {
            measuring: true,
            target_measuring: true,
            ..Self::default()
        }
    }

    pub fn with_stream_interval(interval: Duration) -> Self {
        Self {
            stream_interval: interval,
            ..Self::default()
        }
    }

    pub fn with_state_lag(reads: usize) -> Self {
        Self {
            state_lag: reads,
            ..Self::default()
        }
    }

    /// Queue raw bytes as the next IN transfer.
    pub fn inject(&mut self, raw: &[u8]) {
        self.outbox.push_back(Bytes::copy_from_slice(raw));
    }

    /// Queue one stream frame of `values` regardless of streaming state.
    pub fn push_stream_frame(&mut self, values: &[i32]) {
        self.outbox.push_back(Bytes::from(stream_frame(values)));
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    /// Samples the device has pushed so far.
    pub fn samples_sent(&self) -> i32 {
        self.counter
    }

    pub fn commands(&self, opcode: Opcode) -> usize {
        self.received.iter().filter(|c| c.opcode == opcode).count()
    }

    fn status_word(&mut self) -> i64 {
        if self.measuring != self.target_measuring {
            if self.lag_remaining == 0 {
                self.measuring = self.target_measuring;
            } else {
                self.lag_remaining -= 1;
            }
        }
        if self.measuring { 1 << 23 } else { 0 }
    }

    fn set_target(&mut self, measuring: bool) {
        self.target_measuring = measuring;
        self.lag_remaining = self.state_lag;
    }

    fn execute(&mut self, command: alluris::Command) -> (ReplyStatus, i64) {
        use Opcode::*;
        let param = command.param.unwrap_or(0);
        let locked = matches!(
            command.opcode,
            SetUpperLimit | SetLowerLimit | GetUpperLimit | GetLowerLimit | SetUnit | GetUnit
        );
        if locked && self.measuring {
            return (ReplyStatus::Busy, 0);
        }
        match command.opcode {
            GetStatus => (ReplyStatus::Ok, self.status_word()),
            StartMeasurement => {
                self.set_target(true);
                (ReplyStatus::Ok, 0)
            }
            StopMeasurement => {
                self.set_target(false);
                (ReplyStatus::Ok, 0)
            }
            SetUpperLimit => self.store(GetUpperLimit, param),
            SetLowerLimit => self.store(GetLowerLimit, param),
            SetMode => self.store(GetMode, param),
            SetMemMode => self.store(GetMemMode, param),
            SetUnit => self.store(GetUnit, param),
            SetDigout => self.store(GetDigout, param),
            SetPeakLevel => self.store(GetPeakLevel, param),
            SetAutostop => self.store(GetAutostop, param),
            SetBuzzerMotor => self.store(GetBuzzerMotor, param),
            SetMotorDisable => self.store(GetMotorEnable, i64::from(param == 0)),
            Tare => self.store(GetValue, 0),
            ClearPosPeak => self.store(GetPosPeak, 0),
            ClearNegPeak => self.store(GetNegPeak, 0),
            DeleteMemory => self.store(GetMemCount, 0),
            GetMemStatistic => (ReplyStatus::Ok, [900, -100, 400, 35, 3].get(param as usize).copied().unwrap_or(0)),
            ReadMemory => (ReplyStatus::Ok, param * 10),
            ReadFlash => (ReplyStatus::Ok, 0xBEEF),
            GetFirmware if param > 1 => (ReplyStatus::OutOfRange, 0),
            CyclicMeasurement => {
                self.stream = (param > 0).then(|| Stream {
                    values_per_frame: param as usize,
                    next_due: Instant::now() + self.stream_interval,
                });
                (ReplyStatus::Ok, 0)
            }
            opcode => (ReplyStatus::Ok, self.registers.get(&opcode).copied().unwrap_or(0)),
        }
    }

    fn store(&mut self, register: Opcode, value: i64) -> (ReplyStatus, i64) {
        self.registers.insert(register, value);
        (ReplyStatus::Ok, 0)
    }

    /// All stream frames due at `now`, concatenated, within `max_len` bytes.
    fn due_frames(&mut self, now: Instant, max_len: usize) -> Option<Bytes> {
        let interval = self.stream_interval;
        let stream = self.stream.as_mut()?;
        let frame_len = 2 + 3 * stream.values_per_frame;
        let mut out = Vec::new();
        while stream.next_due <= now && out.len() + frame_len <= max_len {
            let values: Vec<i32> = (0..stream.values_per_frame)
                .map(|i| self.counter + i as i32)
                .collect();
            self.counter += stream.values_per_frame as i32;
            out.extend(stream_frame(&values));
            stream.next_due += interval;
        }
        (!out.is_empty()).then(|| Bytes::from(out))
    }
}

impl Transport for SimDevice {
    fn send(&mut self, _endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        let command = decode_command(data).map_err(|e| TransportError::Other(e.to_string()))?;
        self.received.push(command);
        if !self.silent {
            let reply = match self.texts.get(&command.opcode) {
                Some(text) => encode_text_reply(command.opcode, ReplyStatus::Ok, text),
                None => {
                    let (status, value) = self.execute(command);
                    encode_reply(command.opcode, status, value)
                }
            };
            self.outbox.push_back(reply);
        }
        Ok(data.len())
    }

    fn receive(&mut self, _endpoint: u8, max_len: usize, timeout: Duration) -> Result<Bytes, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if let Some(frames) = self.due_frames(now, max_len) {
                return Ok(frames);
            }
            if let Some(reply) = self.outbox.pop_front() {
                return Ok(reply);
            }
            let wake = match &self.stream {
                Some(stream) if stream.next_due < deadline => stream.next_due,
                _ => deadline,
            };
            if wake <= now {
                return Err(TransportError::Timeout);
            }
            std::thread::sleep(wake - now);
        }
    }
}
