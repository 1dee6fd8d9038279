//! # Handoff Module
//!
//! Single-slot, latest-wins exchange between the capture thread and an
//! analyzer thread.
//!
//! The producer side never waits: it tries the slot lock once and drops the
//! window if an analyzer happens to hold it. The slot buffer is allocated up
//! front and refilled in place, so publishing never allocates. The analyzer
//! side parks on a condition variable until a window is available and takes
//! ownership of it, leaving a fresh buffer behind.

use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::window::{SinkStatus, WindowSink};

/// An immutable copy of a completed window, owned by the analyzer.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    /// Publish order across all slots of a dispatcher, starting at zero.
    pub seq: u64,
    pub samples: Vec<f32>,
}

/// Outcome of a single publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Stored in an empty slot.
    Stored,
    /// Stored over an unconsumed snapshot, which was discarded.
    Replaced,
    /// The analyzer held the lock; this window was dropped.
    Contended,
    /// The slot has been closed.
    Closed,
}

/// Counters describing how a slot has been used. Readable from any thread.
#[derive(Debug, Default)]
pub struct HandoffStats {
    published: AtomicU64,
    stale: AtomicU64,
    contended: AtomicU64,
}

impl HandoffStats {
    /// Windows stored in the slot.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Windows overwritten before an analyzer took them.
    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    /// Windows dropped because the slot lock was busy.
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct Slot {
    buffer: Vec<f32>,
    seq: u64,
    fresh: bool,
    closed: bool,
}

/// A single-slot mailbox for window snapshots.
#[derive(Debug)]
pub struct Handoff {
    slot: Mutex<Slot>,
    ready: Condvar,
    stats: HandoffStats,
    window_size: usize,
}

impl Handoff {
    /// Creates a slot for windows of `window_size` samples.
    pub fn new(window_size: usize) -> Self {
        Self {
            slot: Mutex::new(Slot {
                buffer: vec![0.0; window_size],
                seq: 0,
                fresh: false,
                closed: false,
            }),
            ready: Condvar::new(),
            stats: HandoffStats::default(),
            window_size,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn stats(&self) -> &HandoffStats {
        &self.stats
    }

    /// Stores `window` as the latest snapshot, tagged with `seq`.
    ///
    /// Called from the capture thread. Does not block and does not allocate
    /// as long as `window` has the configured size.
    pub fn publish(&self, seq: u64, window: &[f32]) -> PublishOutcome {
        let Some(mut slot) = self.slot.try_lock() else {
            self.stats.contended.fetch_add(1, Ordering::Relaxed);
            return PublishOutcome::Contended;
        };
        if slot.closed {
            return PublishOutcome::Closed;
        }

        if slot.buffer.len() == window.len() {
            slot.buffer.copy_from_slice(window);
        } else {
            slot.buffer.clear();
            slot.buffer.extend_from_slice(window);
        }
        slot.seq = seq;
        let replaced = std::mem::replace(&mut slot.fresh, true);
        drop(slot);

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        self.ready.notify_one();

        if replaced {
            self.stats.stale.fetch_add(1, Ordering::Relaxed);
            PublishOutcome::Replaced
        } else {
            PublishOutcome::Stored
        }
    }

    /// Waits for the next snapshot and takes ownership of it.
    ///
    /// Returns `None` once the slot is closed. A snapshot still waiting at
    /// that point is discarded.
    pub fn take(&self) -> Option<WindowSnapshot> {
        // Allocated before locking so the producer is never kept waiting on it.
        let spare = vec![0.0; self.window_size];
        let mut slot = self.slot.lock();
        while !slot.fresh && !slot.closed {
            self.ready.wait(&mut slot);
        }
        if slot.closed {
            return None;
        }
        Some(Self::move_out(&mut slot, spare))
    }

    /// Takes the pending snapshot without waiting, if there is one.
    pub fn try_take(&self) -> Option<WindowSnapshot> {
        let spare = vec![0.0; self.window_size];
        let mut slot = self.slot.lock();
        if slot.closed || !slot.fresh {
            return None;
        }
        Some(Self::move_out(&mut slot, spare))
    }

    /// Closes the slot and wakes every waiting analyzer.
    pub fn close(&self) {
        self.slot.lock().closed = true;
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.slot.lock().closed
    }

    fn move_out(slot: &mut Slot, spare: Vec<f32>) -> WindowSnapshot {
        slot.fresh = false;
        let samples = std::mem::replace(&mut slot.buffer, spare);
        WindowSnapshot {
            seq: slot.seq,
            samples,
        }
    }
}

/// Feeds a set of handoff slots round-robin from the capture thread.
///
/// Sequence numbers are assigned here, so they are global across slots and
/// let the reporter restore chronological order.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    slots: Vec<Arc<Handoff>>,
    next_slot: usize,
    next_seq: u64,
}

impl Dispatcher {
    pub fn new(slots: Vec<Arc<Handoff>>) -> Self {
        Self {
            slots,
            next_slot: 0,
            next_seq: 0,
        }
    }

    pub fn slots(&self) -> &[Arc<Handoff>] {
        &self.slots
    }

    /// Number of windows dispatched so far, including dropped ones.
    pub fn dispatched(&self) -> u64 {
        self.next_seq
    }
}

impl WindowSink for Dispatcher {
    fn publish(&mut self, window: &[f32]) -> SinkStatus {
        if self.slots.is_empty() {
            return SinkStatus::Closed;
        }
        let slot = &self.slots[self.next_slot];
        let outcome = slot.publish(self.next_seq, window);
        self.next_seq += 1;
        self.next_slot = (self.next_slot + 1) % self.slots.len();

        match outcome {
            PublishOutcome::Closed => SinkStatus::Closed,
            _ => SinkStatus::Open,
        }
    }
}
