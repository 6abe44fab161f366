//! Pending-event buffers.

use crate::types::Tracking;
use std::mem;

/// The two event buffers a manager owns.
///
/// `pending` is fed by regular tracking and drained by the auto-flush timer,
/// the post-probe flush and shutdown. `manual` is fed only by batched
/// tracking and drained only by an explicit flush or shutdown. Not
/// synchronized on its own; the manager keeps it behind its state lock.
#[derive(Debug, Default)]
pub struct EventQueue {
    pending: Vec<Tracking>,
    manual: Vec<Tracking>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event to the pending queue.
    pub fn push(&mut self, event: Tracking) {
        self.pending.push(event);
    }

    /// Add an event to the manual batch.
    pub fn push_manual(&mut self, event: Tracking) {
        self.manual.push(event);
    }

    /// Get the number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Check if the pending queue is empty.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Get the number of events in the manual batch.
    pub fn manual_len(&self) -> usize {
        self.manual.len()
    }

    /// Take every pending event, leaving the queue empty.
    pub fn take_pending(&mut self) -> Vec<Tracking> {
        mem::take(&mut self.pending)
    }

    /// Take the whole manual batch, leaving it empty.
    pub fn take_manual(&mut self) -> Vec<Tracking> {
        mem::take(&mut self.manual)
    }

    /// Append all pending events after the manual batch.
    /// Only shutdown merges the two buffers.
    pub fn merge_pending_into_manual(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let mut pending = mem::take(&mut self.pending);
        self.manual.append(&mut pending);
    }
}
