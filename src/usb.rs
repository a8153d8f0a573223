use crate::error::{Error, TransportError};
use crate::session::Transport;
use bytes::Bytes;
use nusb::Interface;
use nusb::transfer::{Queue, RequestBuffer};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::time::timeout;

/// USB transfer type used on both endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Bulk,
    Interrupt,
}

/// [`Transport`] over a claimed `nusb` interface.
///
/// Transfers are awaited on a private current-thread runtime, so every call
/// blocks the caller for at most its timeout and no worker thread is spawned.
/// IN transfers are queued: a read that times out keeps its transfer
/// pending, and the next read picks up whatever the device sent meanwhile.
pub struct UsbTransport {
    interface: Interface,
    kind: TransferKind,
    runtime: Runtime,
    in_queue: Option<(u8, Queue<RequestBuffer>)>,
}

impl UsbTransport {
    /// Wrap an interface the caller already claimed. The interface stays
    /// owned by the caller; dropping the transport releases only this clone.
    pub fn new(interface: &Interface, kind: TransferKind) -> Result<Self, Error> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;
        Ok(Self {
            interface: interface.clone(),
            kind,
            runtime,
            in_queue: None,
        })
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    fn queue_for<'a>(
        slot: &'a mut Option<(u8, Queue<RequestBuffer>)>,
        interface: &Interface,
        kind: TransferKind,
        endpoint: u8,
    ) -> &'a mut Queue<RequestBuffer> {
        if matches!(slot, Some((ep, _)) if *ep != endpoint) {
            *slot = None;
        }
        let (_, queue) = slot.get_or_insert_with(|| {
            let queue = match kind {
                TransferKind::Bulk => interface.bulk_in_queue(endpoint),
                TransferKind::Interrupt => interface.interrupt_in_queue(endpoint),
            };
            (endpoint, queue)
        });
        queue
    }
}

impl Transport for UsbTransport {
    fn send(&mut self, endpoint: u8, data: &[u8], limit: Duration) -> Result<usize, TransportError> {
        let transfer = match self.kind {
            TransferKind::Bulk => self.interface.bulk_out(endpoint, data.to_vec()),
            TransferKind::Interrupt => self.interface.interrupt_out(endpoint, data.to_vec()),
        };
        // Dropping the future on timeout cancels the transfer.
        let completion = self
            .runtime
            .block_on(async { timeout(limit, transfer).await })
            .map_err(|_| TransportError::Timeout)?;
        let written = completion.into_result()?;
        Ok(written.actual_length())
    }

    fn receive(&mut self, endpoint: u8, max_len: usize, limit: Duration) -> Result<Bytes, TransportError> {
        let queue = Self::queue_for(&mut self.in_queue, &self.interface, self.kind, endpoint);
        if queue.pending() == 0 {
            queue.submit(RequestBuffer::new(max_len));
        }
        let completion = self
            .runtime
            .block_on(async { timeout(limit, queue.next_complete()).await })
            .map_err(|_| TransportError::Timeout)?;
        let data = completion.into_result()?;
        Ok(Bytes::from(data))
    }
}
