//! Log buffer service
//!
//! Manages in-memory log collection for run execution.
//! Output captured from the app process is written here and periodically
//! drained to send to the exec server.

use petal_core::domain::log::LogEntry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Service for managing log buffers
///
/// This service wraps a thread-safe buffer for collecting log entries
/// during run execution. It provides methods to add entries and drain
/// the buffer for sending to the exec server.
pub trait LogBufferService: Send + Sync {
    /// Adds a log entry to the buffer
    fn add_entry(&self, entry: LogEntry);

    /// Drains all log entries from the buffer
    ///
    /// This returns all buffered entries and clears the buffer.
    fn drain(&self) -> Vec<LogEntry>;

    /// Puts entries back in front of anything buffered since they were drained
    fn requeue(&self, entries: Vec<LogEntry>);

    /// Number of entries waiting to be drained
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory implementation of LogBufferService
///
/// Reaching the flush threshold wakes whoever waits on [`InMemoryLogBuffer::flush_requested`].
#[derive(Clone)]
pub struct InMemoryLogBuffer {
    buffer: Arc<Mutex<Vec<LogEntry>>>,
    flush_threshold: usize,
    flush: Arc<Notify>,
}

impl InMemoryLogBuffer {
    /// Creates a new in-memory log buffer
    pub fn new(flush_threshold: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            flush_threshold: flush_threshold.max(1),
            flush: Arc::new(Notify::new()),
        }
    }

    /// Resolves once the buffer has reached its flush threshold
    pub async fn flush_requested(&self) {
        self.flush.notified().await
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        // A panicking writer cannot leave a Vec half-pushed
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InMemoryLogBuffer {
    fn default() -> Self {
        Self::new(100)
    }
}

impl LogBufferService for InMemoryLogBuffer {
    fn add_entry(&self, entry: LogEntry) {
        let len = {
            let mut buffer = self.lock();
            buffer.push(entry);
            buffer.len()
        };
        if len >= self.flush_threshold {
            self.flush.notify_one();
        }
    }

    fn drain(&self) -> Vec<LogEntry> {
        self.lock().drain(..).collect()
    }

    fn requeue(&self, entries: Vec<LogEntry>) {
        if entries.is_empty() {
            return;
        }
        let mut buffer = self.lock();
        buffer.splice(0..0, entries);
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
