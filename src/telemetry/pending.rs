//! The pending queue and readiness gate.
//!
//! Both live in one [`PendingExceptions`] service object so the queue and
//! the gate are always read and written under the same lock. A process-wide
//! instance is available through [`PendingExceptions::global`]; tests build
//! their own with [`PendingExceptions::new`].
//!
//! The gate has three positions and only moves forward. `Closed` buffers
//! everything, `Draining` still buffers while the first drain empties the
//! queue, and `Open` lets live records through.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use tracing::{debug, warn};

use crate::telemetry::facade::LoggingFacade;
use crate::telemetry::record::ExceptionRecord;

/// Position of the readiness gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GateState {
    #[default]
    Closed,
    Draining,
    Open,
}

/// A queue slot. `None` is a report that arrived without an error object.
pub type PendingSlot = Option<ExceptionRecord>;

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<PendingSlot>,
    gate: GateState,
    /// Facade of the most recently attached client.
    live: Weak<LoggingFacade>,
}

/// Buffered exceptions plus the gate deciding whether to buffer at all.
#[derive(Debug, Default)]
pub struct PendingExceptions {
    inner: Mutex<Inner>,
}

impl PendingExceptions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The instance shared by everything that is not handed one explicitly.
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<PendingExceptions>> = OnceLock::new();
        GLOBAL.get_or_init(PendingExceptions::new).clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic elsewhere must not cost us the buffered records.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, record: ExceptionRecord) {
        self.enqueue_slot(Some(record));
    }

    pub fn enqueue_slot(&self, slot: PendingSlot) {
        let mut inner = self.lock();
        inner.queue.push_back(slot);
        debug!(pending = inner.queue.len(), "exception buffered");
    }

    /// Buffer the record unless the gate is fully open, in which case it is
    /// handed back for live dispatch.
    pub fn buffer_unless_open(&self, record: ExceptionRecord) -> Option<ExceptionRecord> {
        let mut inner = self.lock();
        if inner.gate == GateState::Open {
            return Some(record);
        }
        inner.queue.push_back(Some(record));
        debug!(pending = inner.queue.len(), gate = ?inner.gate, "exception buffered");
        None
    }

    /// Buffer the slot only while the gate is not open. Returns whether it
    /// was buffered.
    pub fn enqueue_unless_open(&self, slot: PendingSlot) -> bool {
        let mut inner = self.lock();
        if inner.gate == GateState::Open {
            return false;
        }
        inner.queue.push_back(slot);
        debug!(pending = inner.queue.len(), gate = ?inner.gate, "exception buffered");
        true
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queue.is_empty()
    }

    pub fn gate(&self) -> GateState {
        self.lock().gate
    }

    /// True once a drain has finished and live dispatch is allowed.
    pub fn is_open(&self) -> bool {
        self.gate() == GateState::Open
    }

    /// Open the gate without draining. Returns whether this call flipped it;
    /// later calls are no-ops.
    pub fn open(&self) -> bool {
        let mut inner = self.lock();
        if inner.gate == GateState::Open {
            warn!("readiness gate opened twice");
            return false;
        }
        inner.gate = GateState::Open;
        true
    }

    /// Remove slots oldest-first and hand each to `sink` until the queue is
    /// empty, then open the gate.
    ///
    /// The lock is released around every `sink` call. On the first drain,
    /// anything buffered while it runs (including from `sink` itself) lands at
    /// the back of the queue and is handed out by this same pass, so the gate
    /// opens only on an empty queue. A drain on an already open gate leaves
    /// it open. Returns the number of slots drained.
    pub fn drain_into<F>(&self, mut sink: F) -> usize
    where
        F: FnMut(PendingSlot),
    {
        {
            let mut inner = self.lock();
            if inner.gate == GateState::Closed {
                inner.gate = GateState::Draining;
            }
        }

        let mut drained = 0;
        loop {
            let slot = {
                let mut inner = self.lock();
                match inner.queue.pop_front() {
                    Some(slot) => slot,
                    None => {
                        inner.gate = GateState::Open;
                        break;
                    }
                }
            };
            sink(slot);
            drained += 1;
        }

        drained
    }

    /// Make `facade` the route for records that reach an open gate without a
    /// client of their own. The latest registration wins.
    pub(crate) fn register(&self, facade: Weak<LoggingFacade>) {
        self.lock().live = facade;
    }

    pub(crate) fn live_facade(&self) -> Option<Arc<LoggingFacade>> {
        self.lock().live.upgrade()
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Vec<PendingSlot> {
        self.lock().queue.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::record::SeverityLevel;

    fn record(message: &str) -> ExceptionRecord {
        ExceptionRecord::new(message, SeverityLevel::Information, None)
    }

    #[test]
    fn new_queue_is_empty_and_closed() {
        let pending = PendingExceptions::new();

        assert!(pending.is_empty());
        assert_eq!(pending.gate(), GateState::Closed);
        assert!(!pending.is_open());
    }

    #[test]
    fn drain_yields_in_append_order_and_opens() {
        let pending = PendingExceptions::new();
        for message in ["first", "second", "third"] {
            pending.enqueue(record(message));
        }

        let mut seen = Vec::new();
        let drained = pending.drain_into(|slot| seen.push(slot.unwrap().error.message));

        assert_eq!(drained, 3);
        assert_eq!(seen, vec!["first", "second", "third"]);
        assert!(pending.is_empty());
        assert!(pending.is_open());
    }

    #[test]
    fn drain_of_empty_queue_still_opens() {
        let pending = PendingExceptions::new();

        assert_eq!(pending.drain_into(|_| {}), 0);
        assert!(pending.is_open());
    }

    #[test]
    fn open_is_idempotent() {
        let pending = PendingExceptions::new();

        assert!(pending.open());
        assert!(!pending.open());
        assert!(pending.is_open());
    }

    #[test]
    fn buffer_unless_open_hands_back_once_open() {
        let pending = PendingExceptions::new();

        assert!(pending.buffer_unless_open(record("early")).is_none());
        assert_eq!(pending.len(), 1);

        pending.drain_into(|_| {});

        let live = pending.buffer_unless_open(record("late"));
        assert_eq!(live.unwrap().error.message, "late");
        assert!(pending.is_empty());
    }

    #[test]
    fn records_buffered_during_drain_are_drained_in_the_same_pass() {
        let pending = PendingExceptions::new();
        pending.enqueue(record("first"));
        pending.enqueue(record("second"));

        let mut seen = Vec::new();
        let reentrant = pending.clone();
        pending.drain_into(|slot| {
            let message = slot.unwrap().error.message;
            if message == "first" {
                assert_eq!(reentrant.gate(), GateState::Draining);
                assert!(reentrant.buffer_unless_open(record("during")).is_none());
            }
            seen.push(message);
        });

        assert_eq!(seen, vec!["first", "second", "during"]);
        assert!(pending.is_open());
    }

    #[test]
    fn drain_after_open_keeps_the_gate_open() {
        let pending = PendingExceptions::new();
        pending.open();
        pending.enqueue(record("late"));

        let reentrant = pending.clone();
        let drained = pending.drain_into(|_| assert!(reentrant.is_open()));

        assert_eq!(drained, 1);
        assert!(pending.is_open());
    }

    #[test]
    fn empty_slots_survive_until_drained() {
        let pending = PendingExceptions::new();
        pending.enqueue_slot(None);
        pending.enqueue(record("after"));

        assert_eq!(pending.snapshot().len(), 2);

        let mut slots = Vec::new();
        pending.drain_into(|slot| slots.push(slot.is_some()));

        assert_eq!(slots, vec![false, true]);
    }

    #[test]
    fn global_returns_the_same_instance() {
        assert!(Arc::ptr_eq(
            &PendingExceptions::global(),
            &PendingExceptions::global()
        ));
    }
}
