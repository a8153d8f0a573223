use crate::config::{DebugLevel, SessionConfig};
use crate::error::TransportError;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, trace};

/// Raw byte transfer on an already-open device.
///
/// Implementations must honour `timeout`: no call may block longer than the
/// given window. A zero timeout means "only what is already available".
pub trait Transport {
    /// Write `data` to `endpoint`, returning the number of bytes accepted.
    fn send(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Read one transfer of at most `max_len` bytes from `endpoint`.
    fn receive(&mut self, endpoint: u8, max_len: usize, timeout: Duration) -> Result<Bytes, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).send(endpoint, data, timeout)
    }

    fn receive(&mut self, endpoint: u8, max_len: usize, timeout: Duration) -> Result<Bytes, TransportError> {
        (**self).receive(endpoint, max_len, timeout)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        (**self).send(endpoint, data, timeout)
    }

    fn receive(&mut self, endpoint: u8, max_len: usize, timeout: Duration) -> Result<Bytes, TransportError> {
        (**self).receive(endpoint, max_len, timeout)
    }
}

/// A transport bound to its two endpoints and default timeouts.
pub struct Session<T> {
    transport: T,
    config: SessionConfig,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn debug_level(&self) -> DebugLevel {
        self.config.debug_level
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Write a whole frame; a short write is an error.
    pub fn send(&mut self, data: &[u8], timeout: Duration) -> Result<(), TransportError> {
        if self.config.debug_level >= DebugLevel::Wire {
            trace!(endpoint = self.config.endpoint_out, bytes = hex::encode(data), "USB Write");
        }
        let written = self.transport.send(self.config.endpoint_out, data, timeout)?;
        if written != data.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: data.len(),
            });
        }
        Ok(())
    }

    /// Read one transfer, at most `recv_buf_len` bytes.
    pub fn receive(&mut self, timeout: Duration) -> Result<Bytes, TransportError> {
        let data = self
            .transport
            .receive(self.config.endpoint_in, self.config.recv_buf_len, timeout)?;
        if self.config.debug_level >= DebugLevel::Wire {
            trace!(endpoint = self.config.endpoint_in, bytes = hex::encode(&data), "USB Read");
        }
        Ok(data)
    }

    /// Discard everything pending on the IN endpoint.
    ///
    /// Reads with `timeout` until one read times out, a hard error occurs or
    /// `max_flush_reads` transfers were consumed. Returns the number of bytes
    /// thrown away.
    pub fn flush_stale_input(&mut self, timeout: Duration) -> usize {
        let mut discarded = 0;
        for _ in 0..self.config.max_flush_reads {
            match self
                .transport
                .receive(self.config.endpoint_in, self.config.recv_buf_len, timeout)
            {
                Ok(stale) => {
                    if self.config.debug_level >= DebugLevel::Wire {
                        trace!(bytes = hex::encode(&stale), "Discarding stale input");
                    }
                    discarded += stale.len();
                }
                Err(TransportError::Timeout) => break,
                Err(err) => {
                    if self.config.debug_level >= DebugLevel::Calls {
                        debug!(error = %err, "Stale input flush aborted");
                    }
                    break;
                }
            }
        }
        if discarded > 0 && self.config.debug_level >= DebugLevel::Calls {
            debug!(discarded, "Flushed stale input");
        }
        discarded
    }

    /// [`Session::flush_stale_input`] with the configured flush timeout.
    pub fn flush(&mut self) -> usize {
        self.flush_stale_input(self.config.flush_timeout)
    }
}
