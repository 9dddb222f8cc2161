//! Bounded record queue shared by the fetch task and the sheet writer
//!
//! The queue and the session state sit behind one mutex; a single condition
//! variable wakes every waiter on any change (records added or drained,
//! end-of-data, state transitions). Producers are held back while the queue is
//! full, never by dropping records.

use crate::error::{ExportError, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Lifecycle of an export session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No workbook; `open()` has not been called or `close()` released it
    Closed,
    /// Workbook created, accepting records, `export()` not started
    Open,
    /// `export()` is draining the queue
    Exporting,
    /// Workbook flushed to the destination
    Completed,
    /// `export()` ended with an error; nothing was flushed
    Failed,
}

impl SessionState {
    /// Records may be submitted in this state
    pub fn is_open(self) -> bool {
        matches!(self, SessionState::Open | SessionState::Exporting)
    }

    /// The writer side has finished, successfully or not
    pub fn is_writing_completed(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

struct Inner<T> {
    records: VecDeque<T>,
    state: SessionState,
    end_of_data: bool,
    producer_failed: bool,
    max_size: usize,
}

/// FIFO of pending records with a capacity ceiling and end-of-data signalling
pub struct RecordQueue<T> {
    inner: Mutex<Inner<T>>,
    changed: Condvar,
}

impl<T> RecordQueue<T> {
    pub fn new(max_size: usize) -> Self {
        RecordQueue {
            inner: Mutex::new(Inner {
                records: VecDeque::new(),
                state: SessionState::Closed,
                end_of_data: false,
                producer_failed: false,
                max_size: max_size.max(1),
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Inner<T>>) -> MutexGuard<'a, Inner<T>> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a batch, blocking while it does not fit
    ///
    /// The batch is admitted whole when it fits under the ceiling. A batch
    /// larger than the ceiling itself is admitted in FIFO chunks of at most
    /// `max_size` records. When `is_final` is set, end-of-data is signalled
    /// once every record is queued.
    pub fn add_records(&self, batch: Vec<T>, is_final: bool) -> Result<()> {
        let mut guard = self.lock();
        Self::check_writable(&guard)?;

        let mut pending = batch.into_iter();
        let mut waiting = false;
        while pending.len() > 0 {
            let chunk = pending.len().min(guard.max_size);
            if guard.records.len() + chunk <= guard.max_size {
                guard.records.extend(pending.by_ref().take(chunk));
                debug!("Added {} data records, queue size {}", chunk, guard.records.len());
                self.changed.notify_all();
                waiting = false;
                continue;
            }

            if !waiting {
                info!("Waiting for queue to be written to excel.");
                waiting = true;
            }
            guard = self.wait(guard);
            if guard.state.is_writing_completed() {
                return Err(ExportError::ClosedForWrites);
            }
            if !guard.state.is_open() {
                return Err(ExportError::NotOpen(
                    "session closed while waiting for queue capacity".to_string(),
                ));
            }
        }

        if is_final && !guard.end_of_data {
            guard.end_of_data = true;
            self.changed.notify_all();
        }
        Ok(())
    }

    fn check_writable(inner: &Inner<T>) -> Result<()> {
        match inner.state {
            SessionState::Closed => Err(ExportError::NotOpen(
                "call open() before attempting to send data".to_string(),
            )),
            state if state.is_writing_completed() => Err(ExportError::ClosedForWrites),
            _ if inner.end_of_data => Err(ExportError::ClosedForWrites),
            _ => Ok(()),
        }
    }

    /// Signal that no further records will arrive; idempotent
    pub fn close_data(&self) {
        let mut guard = self.lock();
        if !guard.end_of_data {
            guard.end_of_data = true;
            self.changed.notify_all();
        }
    }

    /// Signal end-of-data because the producer gave up
    ///
    /// The writer discards the report instead of flushing a partial one.
    pub fn fail_data(&self) {
        let mut guard = self.lock();
        guard.producer_failed = true;
        guard.end_of_data = true;
        self.changed.notify_all();
    }

    /// Remove up to `max` records from the front without blocking
    pub fn pop_batch(&self, max: usize) -> Vec<T> {
        let mut guard = self.lock();
        let take = guard.records.len().min(max);
        let batch: Vec<T> = guard.records.drain(..take).collect();
        if !batch.is_empty() {
            self.changed.notify_all();
        }
        batch
    }

    /// Remove the front record without blocking
    pub fn try_pop(&self) -> Option<T> {
        let mut guard = self.lock();
        let record = guard.records.pop_front();
        if record.is_some() {
            self.changed.notify_all();
        }
        record
    }

    /// Block until a record is queued, end-of-data is signalled, or `timeout` elapses
    ///
    /// Returns `false` only on timeout.
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |inner| {
                inner.records.is_empty() && !inner.end_of_data
            })
            .unwrap_or_else(PoisonError::into_inner);
        !guard.records.is_empty() || guard.end_of_data
    }

    /// Block until records are queued or the producer has finished
    ///
    /// Returns `true` when records are available, `false` once end-of-data is
    /// signalled and the queue is empty.
    pub fn wait_for_records(&self) -> bool {
        let mut guard = self.lock();
        while guard.records.is_empty() && !guard.end_of_data {
            guard = self.wait(guard);
        }
        !guard.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn is_end_of_data(&self) -> bool {
        self.lock().end_of_data
    }

    pub fn is_producer_failed(&self) -> bool {
        self.lock().producer_failed
    }

    pub fn is_writing_completed(&self) -> bool {
        self.lock().state.is_writing_completed()
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn max_size(&self) -> usize {
        self.lock().max_size
    }

    pub(crate) fn set_max_size(&self, max_size: usize) {
        let mut guard = self.lock();
        guard.max_size = max_size.max(1);
        self.changed.notify_all();
    }

    /// `Closed -> Open`, resetting both signals; `false` if already past `Closed`
    pub(crate) fn open(&self) -> bool {
        let mut guard = self.lock();
        if guard.state != SessionState::Closed {
            return false;
        }
        guard.records.clear();
        guard.end_of_data = false;
        guard.producer_failed = false;
        guard.state = SessionState::Open;
        self.changed.notify_all();
        true
    }

    /// `Open -> Exporting`
    pub(crate) fn begin_export(&self) -> Result<()> {
        let mut guard = self.lock();
        match guard.state {
            SessionState::Open => {
                guard.state = SessionState::Exporting;
                Ok(())
            }
            SessionState::Closed => Err(ExportError::NotOpen(
                "call open() before attempting to export".to_string(),
            )),
            other => Err(ExportError::NotOpen(format!(
                "export already started (state {other:?})"
            ))),
        }
    }

    /// Mark writing completed; only the first call has an effect
    pub(crate) fn finish_writing(&self, success: bool) {
        let mut guard = self.lock();
        if guard.state.is_writing_completed() || guard.state == SessionState::Closed {
            return;
        }
        guard.state = if success {
            SessionState::Completed
        } else {
            SessionState::Failed
        };
        self.changed.notify_all();
    }

    /// Fail a session that never reached the writer: both signals set at once
    pub(crate) fn abort(&self) {
        let mut guard = self.lock();
        guard.end_of_data = true;
        guard.producer_failed = true;
        if guard.state.is_open() {
            guard.state = SessionState::Failed;
        }
        self.changed.notify_all();
    }

    /// Block until end-of-data is signalled and writing has completed
    pub(crate) fn wait_until_finished(&self) {
        let mut guard = self.lock();
        while !(guard.end_of_data && guard.state.is_writing_completed()) {
            guard = self.wait(guard);
        }
    }

    /// Back to `Closed` after the workbook has been released
    pub(crate) fn reset_closed(&self) {
        let mut guard = self.lock();
        guard.records.clear();
        guard.state = SessionState::Closed;
        self.changed.notify_all();
    }
}

/// Cloneable handle for submitting records from another thread
pub struct RecordProducer<T> {
    queue: Arc<RecordQueue<T>>,
}

impl<T> Clone for RecordProducer<T> {
    fn clone(&self) -> Self {
        RecordProducer {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<T> RecordProducer<T> {
    pub(crate) fn new(queue: Arc<RecordQueue<T>>) -> Self {
        RecordProducer { queue }
    }

    /// Queue records; more will follow
    pub fn add_records(&self, records: Vec<T>) -> Result<()> {
        self.queue.add_records(records, false)
    }

    /// Queue records, signalling end-of-data when `is_end_of_data` is set
    pub fn add_records_final(&self, records: Vec<T>, is_end_of_data: bool) -> Result<()> {
        self.queue.add_records(records, is_end_of_data)
    }

    /// No more records will be sent
    pub fn close_data(&self) {
        self.queue.close_data()
    }
}
