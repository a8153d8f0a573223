//! Cyclic (streaming) measurement: the device pushes sample frames on its
//! own and the host buffers them until polled.
//!
//! Stream frame layout, several frames may share one transfer:
//!
//! ```text
//! +--------+-------+-------------------------+
//! | 0x5A   | count | count x int24 LE sample |
//! +--------+-------+-------------------------+
//! ```

use crate::config::DebugLevel;
use crate::constants::{MAX_NONBLOCKING_READS, MAX_VALUES_PER_FRAME, SAMPLE_SIZE, STREAM_HEADER_SIZE, STREAM_MARKER};
use crate::engine::Engine;
use crate::error::{Error, Malformation};
use crate::frame::Command;
use crate::opcode::{Opcode, Width};
use crate::session::Transport;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Bounded FIFO of samples. When full, the oldest sample is evicted.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: VecDeque<i32>,
    capacity: usize,
    dropped: u64,
}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Empty the buffer and adopt a new capacity.
    pub fn reset(&mut self, capacity: usize) {
        self.samples.clear();
        self.samples.reserve(capacity);
        self.capacity = capacity;
        self.dropped = 0;
    }

    pub fn push(&mut self, sample: i32) {
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
            self.dropped += 1;
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples evicted by overflow since the last reset
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Remove and return up to `n` of the oldest samples.
    pub fn drain_front(&mut self, n: usize) -> Vec<i32> {
        let n = n.min(self.samples.len());
        self.samples.drain(..n).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &i32> {
        self.samples.iter()
    }
}

/// Parameters of a cyclic measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicConfig {
    /// Host-side buffer size in samples
    pub capacity: usize,
    /// Samples the device packs into each stream frame, 1..=19
    pub values_per_frame: u8,
}

impl Default for CyclicConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            values_per_frame: MAX_VALUES_PER_FRAME,
        }
    }
}

impl CyclicConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.capacity == 0 {
            return Err(Error::OutOfRange("cyclic buffer capacity must be at least 1".into()));
        }
        if !(1..=MAX_VALUES_PER_FRAME).contains(&self.values_per_frame) {
            return Err(Error::OutOfRange(format!(
                "values per frame must be in 1..={MAX_VALUES_PER_FRAME}, got {}",
                self.values_per_frame
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CyclicState {
    #[default]
    Idle,
    Streaming,
}

/// Decode every stream frame in `raw`, appending samples to `out`.
///
/// Returns the number of samples decoded. A transfer must consist of whole
/// frames only.
pub fn parse_stream(raw: &[u8], mut out: impl FnMut(i32)) -> Result<usize, Malformation> {
    let mut rest = raw;
    let mut total = 0;
    while !rest.is_empty() {
        if rest.len() < STREAM_HEADER_SIZE {
            return Err(Malformation::TruncatedStream {
                expected: STREAM_HEADER_SIZE,
                actual: rest.len(),
            });
        }
        if rest[0] != STREAM_MARKER {
            return Err(Malformation::BadMarker(rest[0]));
        }
        let count = rest[1] as usize;
        let frame_len = STREAM_HEADER_SIZE + count * SAMPLE_SIZE;
        if rest.len() < frame_len {
            return Err(Malformation::TruncatedStream {
                expected: frame_len,
                actual: rest.len(),
            });
        }
        let mut samples = &rest[STREAM_HEADER_SIZE..frame_len];
        for _ in 0..count {
            out(Width::I24.get(&mut samples) as i32);
        }
        total += count;
        rest = &rest[frame_len..];
    }
    Ok(total)
}

/// Idle/Streaming state machine with its sample buffer.
#[derive(Debug, Clone)]
pub struct CyclicMeasurement {
    state: CyclicState,
    buffer: SampleBuffer,
    debug_level: DebugLevel,
}

impl Default for CyclicMeasurement {
    fn default() -> Self {
        Self::new()
    }
}

impl CyclicMeasurement {
    pub fn new() -> Self {
        Self {
            state: CyclicState::Idle,
            buffer: SampleBuffer::new(0),
            debug_level: DebugLevel::Off,
        }
    }

    pub fn state(&self) -> CyclicState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == CyclicState::Streaming
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn dropped(&self) -> u64 {
        self.buffer.dropped()
    }

    /// Ask the device to start streaming with a fresh buffer.
    ///
    /// Restarting while already streaming is allowed; samples of the old run
    /// are discarded. Frames that arrive before the acknowledgement already
    /// belong to the new run.
    pub fn start<T: Transport>(&mut self, engine: &mut Engine<T>, config: CyclicConfig) -> Result<(), Error> {
        config.validate()?;
        let level = engine.session().debug_level();
        let mut fresh = SampleBuffer::new(config.capacity);
        switch(engine, config.values_per_frame, &mut fresh, level)?;
        self.buffer = fresh;
        self.state = CyclicState::Streaming;
        self.debug_level = level;
        if level >= DebugLevel::Calls {
            debug!(
                capacity = config.capacity,
                values_per_frame = config.values_per_frame,
                "Cyclic measurement started"
            );
        }
        Ok(())
    }

    /// Ask the device to stop streaming. Unread samples stay available.
    /// On failure the controller keeps streaming.
    pub fn stop<T: Transport>(&mut self, engine: &mut Engine<T>) -> Result<(), Error> {
        switch(engine, 0, &mut self.buffer, self.debug_level)?;
        self.state = CyclicState::Idle;
        if engine.session().debug_level() >= DebugLevel::Calls {
            debug!(buffered = self.buffer.len(), dropped = self.buffer.dropped(), "Cyclic measurement stopped");
        }
        Ok(())
    }

    /// Buffer the samples of one received transfer.
    pub fn ingest(&mut self, raw: &[u8]) -> Result<usize, Malformation> {
        ingest_into(&mut self.buffer, raw, self.debug_level)
    }

    /// Wait until `n` samples are buffered and return exactly those, oldest
    /// first.
    ///
    /// On timeout nothing is removed: the samples received so far stay in the
    /// buffer for the next poll. While idle, too few buffered samples is a
    /// timeout right away.
    pub fn poll_blocking<T: Transport>(
        &mut self,
        engine: &mut Engine<T>,
        n: usize,
        timeout: Duration,
    ) -> Result<Vec<i32>, Error> {
        if !self.is_streaming() && self.buffer.len() < n {
            return Err(Error::Timeout);
        }
        if n > self.buffer.capacity() {
            return Err(Error::OutOfRange(format!(
                "requested {n} samples but the buffer holds at most {}",
                self.buffer.capacity()
            )));
        }
        let deadline = Instant::now() + timeout;
        while self.buffer.len() < n {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }
            engine.receive_stream(remaining, &mut |raw: &[u8]| self.ingest(raw))?;
        }
        Ok(self.buffer.drain_front(n))
    }

    /// Take whatever is ready, at most `max_n` samples, without waiting.
    pub fn poll_nonblocking<T: Transport>(&mut self, engine: &mut Engine<T>, max_n: usize) -> Result<Vec<i32>, Error> {
        if self.is_streaming() {
            for _ in 0..MAX_NONBLOCKING_READS {
                if self.buffer.len() >= max_n {
                    break;
                }
                match engine.receive_stream(Duration::ZERO, &mut |raw: &[u8]| self.ingest(raw)) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(Error::Timeout) => break,
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(self.buffer.drain_front(max_n))
    }
}

/// Send the cyclic-measurement command; stream frames received meanwhile go
/// to `buffer`.
fn switch<T: Transport>(
    engine: &mut Engine<T>,
    values: u8,
    buffer: &mut SampleBuffer,
    level: DebugLevel,
) -> Result<(), Error> {
    let command = Command::with_param(Opcode::CyclicMeasurement, values.into());
    let config = engine.session().config();
    let (send_timeout, recv_timeout) = (config.send_timeout, config.receive_timeout);
    engine.call_draining(command, send_timeout, recv_timeout, &mut |raw: &[u8]| {
        ingest_into(buffer, raw, level)
    })?;
    Ok(())
}

fn ingest_into(buffer: &mut SampleBuffer, raw: &[u8], level: DebugLevel) -> Result<usize, Malformation> {
    let before = buffer.dropped();
    let count = parse_stream(raw, |sample| buffer.push(sample))?;
    let evicted = buffer.dropped() - before;
    if evicted > 0 && level >= DebugLevel::Calls {
        warn!(evicted, capacity = buffer.capacity(), "Sample buffer overflow, oldest samples dropped");
    }
    Ok(count)
}
