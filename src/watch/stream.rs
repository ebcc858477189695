use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{FlowError, FlowResult, RuntimeError};

use super::DiffBatch;

/// Diff batches of one watch block, in transaction order.
///
/// The stream is bounded; batches that arrive while it is full are
/// dropped and counted. Dropping the stream detaches it from the program.
#[derive(Debug)]
pub struct DiffStream {
    watch: String,
    rx: Receiver<DiffBatch>,
    dropped: Arc<AtomicU64>,
}

impl DiffStream {
    pub(crate) fn new(watch: String, rx: Receiver<DiffBatch>, dropped: Arc<AtomicU64>) -> Self {
        Self { watch, rx, dropped }
    }

    /// The watch block feeding this stream.
    #[must_use]
    pub fn watch(&self) -> &str {
        &self.watch
    }

    /// Batches dropped because the stream was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Receive the next batch (blocking).
    pub fn recv(&self) -> FlowResult<DiffBatch> {
        self.rx.recv().map_err(|_| self.disconnected())
    }

    /// Receive the next batch with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> FlowResult<DiffBatch> {
        self.rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => FlowError::Runtime(RuntimeError::Timeout {
                duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            RecvTimeoutError::Disconnected => self.disconnected(),
        })
    }

    /// The next batch if one is waiting.
    pub fn try_recv(&self) -> FlowResult<Option<DiffBatch>> {
        match self.rx.try_recv() {
            Ok(batch) => Ok(Some(batch)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(self.disconnected()),
        }
    }

    /// Every batch currently waiting.
    pub fn drain(&self) -> Vec<DiffBatch> {
        self.rx.try_iter().collect()
    }

    fn disconnected(&self) -> FlowError {
        FlowError::Runtime(RuntimeError::Disconnected {
            watch: self.watch.clone(),
        })
    }
}
