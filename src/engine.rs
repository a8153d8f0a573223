use crate::config::DebugLevel;
use crate::constants::STREAM_MARKER;
use crate::error::{Error, Malformation, TransportError};
use crate::frame::{self, Command, DecodedReply, ReplyStatus};
use crate::session::{Session, Transport};
use std::time::{Duration, Instant};
use tracing::debug;

/// Receiver for stream sample frames that arrive outside a reply.
pub type StreamSink<'a> = dyn FnMut(&[u8]) -> Result<usize, Malformation> + 'a;

/// True if `raw` starts like a streamed sample frame rather than a reply.
pub fn is_stream_frame(raw: &[u8]) -> bool {
    raw.first() == Some(&STREAM_MARKER)
}

/// One command, one reply.
///
/// Turns transport and codec failures into [`Error`] kinds and flushes
/// stale input after a malformed reply. Nothing is retried.
pub struct Engine<T> {
    session: Session<T>,
}

impl<T: Transport> Engine<T> {
    pub fn new(session: Session<T>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<T> {
        &mut self.session
    }

    pub fn into_session(self) -> Session<T> {
        self.session
    }

    /// Exchange with the session's default timeouts.
    pub fn request(&mut self, command: Command) -> Result<DecodedReply, Error> {
        let config = self.session.config();
        let (send_timeout, recv_timeout) = (config.send_timeout, config.receive_timeout);
        self.call(command, send_timeout, recv_timeout)
    }

    pub fn call(
        &mut self,
        command: Command,
        send_timeout: Duration,
        recv_timeout: Duration,
    ) -> Result<DecodedReply, Error> {
        self.exchange(command, send_timeout, recv_timeout, None)
    }

    /// Like [`Engine::call`], but stream frames received while waiting are
    /// handed to `sink` instead of failing the exchange. `recv_timeout`
    /// bounds the whole wait.
    pub fn call_draining(
        &mut self,
        command: Command,
        send_timeout: Duration,
        recv_timeout: Duration,
        sink: &mut StreamSink<'_>,
    ) -> Result<DecodedReply, Error> {
        self.exchange(command, send_timeout, recv_timeout, Some(sink))
    }

    /// Read one transfer of pushed stream data and hand it to `sink`.
    ///
    /// Returns the sink's count, zero for an empty transfer. Anything that is
    /// not stream data is malformed and triggers a flush.
    pub fn receive_stream(&mut self, timeout: Duration, sink: &mut StreamSink<'_>) -> Result<usize, Error> {
        let raw = self.session.receive(timeout)?;
        if raw.is_empty() {
            return Ok(0);
        }
        match sink(&raw) {
            Ok(count) => Ok(count),
            Err(malformation) => Err(self.malformed(malformation)),
        }
    }

    /// Discard stale input with the configured flush timeout.
    pub fn flush(&mut self) -> usize {
        self.session.flush()
    }

    fn exchange(
        &mut self,
        command: Command,
        send_timeout: Duration,
        recv_timeout: Duration,
        mut sink: Option<&mut StreamSink<'_>>,
    ) -> Result<DecodedReply, Error> {
        let started = Instant::now();
        let result = self.exchange_inner(command, send_timeout, recv_timeout, &mut sink);
        if self.session.debug_level() >= DebugLevel::Calls {
            debug!(
                opcode = %command.opcode,
                param = ?command.param,
                elapsed_us = started.elapsed().as_micros() as u64,
                ok = result.is_ok(),
                "Request complete"
            );
        }
        result
    }

    fn exchange_inner(
        &mut self,
        command: Command,
        send_timeout: Duration,
        recv_timeout: Duration,
        sink: &mut Option<&mut StreamSink<'_>>,
    ) -> Result<DecodedReply, Error> {
        let frame = command.encode();
        self.session.send(&frame, send_timeout)?;

        let deadline = Instant::now() + recv_timeout;
        let mut remaining = recv_timeout;
        loop {
            let raw = self.session.receive(remaining)?;
            if !raw.is_empty() {
                match sink {
                    Some(sink) if is_stream_frame(&raw) => {
                        if let Err(malformation) = sink(&raw) {
                            return Err(self.malformed(malformation));
                        }
                    }
                    _ => {
                        return match frame::decode_reply(&raw, command.opcode) {
                            Ok(reply) => classify(reply),
                            Err(malformation) => Err(self.malformed(malformation)),
                        };
                    }
                }
            }
            remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout.into());
            }
        }
    }

    fn malformed(&mut self, malformation: Malformation) -> Error {
        let discarded = self.session.flush();
        if self.session.debug_level() >= DebugLevel::Calls {
            debug!(%malformation, discarded, "Malformed reply, receive path flushed");
        }
        Error::MalformedReply(malformation)
    }
}

fn classify(reply: DecodedReply) -> Result<DecodedReply, Error> {
    match reply.status {
        ReplyStatus::Ok => Ok(reply),
        ReplyStatus::Busy => Err(Error::DeviceBusy { opcode: reply.opcode }),
        ReplyStatus::OutOfRange => Err(Error::OutOfRange(format!(
            "device rejected the parameter of {}",
            reply.opcode
        ))),
        ReplyStatus::Unknown(code) => Err(Error::ParseError(format!(
            "unknown reply status {code:#04x} for {}",
            reply.opcode
        ))),
    }
}
