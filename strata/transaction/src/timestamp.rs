//! Timestamp representation and the global timestamp source.
//!
//! A timestamp is one atomic word because readers of version chains must load
//! the committed-or-transient distinction and the value in a single operation.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};

/// A logical timestamp, interpreted in two disjoint ranges.
///
/// Non-negative values are commit timestamps: smaller means earlier.
/// Negative values are transient transaction ids, packed from a start
/// timestamp by [`Timestamp::to_transient`]. A reader that observes a
/// negative timestamp on an undo record knows the writer is still in flight;
/// a non-negative timestamp is a commit time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The first timestamp a fresh [`TimestampSource`] issues.
    pub const INITIAL: Timestamp = Timestamp(0);

    pub const fn from_raw(raw: i64) -> Self {
        Timestamp(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Returns true if this word is a transient transaction id.
    pub const fn is_transient(self) -> bool {
        self.0 < 0
    }

    /// Returns true if this word is a commit timestamp.
    pub const fn is_committed(self) -> bool {
        self.0 >= 0
    }

    /// Packs a start timestamp into the transient transaction id of the
    /// transaction that began at it.
    pub fn to_transient(self) -> Timestamp {
        debug_assert!(self.is_committed(), "only a start timestamp can be packed");
        Timestamp(self.0 + i64::MIN)
    }

    /// Recovers the start timestamp a transient id was packed from.
    pub fn start_time(self) -> Timestamp {
        debug_assert!(self.is_transient(), "only a transient id can be unpacked");
        Timestamp(self.0 - i64::MIN)
    }

    /// Unpacks the word into its tagged form.
    pub fn kind(self) -> TimestampKind {
        if self.is_transient() {
            TimestampKind::Transient {
                start: self.start_time(),
            }
        } else {
            TimestampKind::Committed { commit: self }
        }
    }
}

/// The tagged form of a [`Timestamp`] word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampKind {
    /// The owning transaction is still in flight; `start` is when it began.
    Transient { start: Timestamp },
    /// The write was committed at `commit`.
    Committed { commit: Timestamp },
}

impl TimestampKind {
    /// Packs the tagged form back into a single word.
    pub fn pack(self) -> Timestamp {
        match self {
            TimestampKind::Transient { start } => start.to_transient(),
            TimestampKind::Committed { commit } => commit,
        }
    }
}

/// A timestamp cell shared between its owning writer and concurrent readers.
///
/// Commit flips the word from the transient id to the commit timestamp with a
/// release store; readers pair that with acquire loads, so observing a commit
/// timestamp also makes the record's payload visible.
#[derive(Debug)]
pub struct AtomicTimestamp(AtomicI64);

impl AtomicTimestamp {
    pub fn new(ts: Timestamp) -> Self {
        AtomicTimestamp(AtomicI64::new(ts.raw()))
    }

    pub fn load(&self, order: Ordering) -> Timestamp {
        Timestamp(self.0.load(order))
    }

    pub fn store(&self, ts: Timestamp, order: Ordering) {
        self.0.store(ts.raw(), order);
    }
}

/// The source of every timestamp in the system.
///
/// A single atomic counter read with post-increment semantics: the fetch-add
/// yields the fresh value and the monotonic guarantee at once, so no other
/// synchronization is required.
#[derive(Debug)]
pub struct TimestampSource {
    time: AtomicI64,
}

impl TimestampSource {
    pub fn new() -> Self {
        Self {
            time: AtomicI64::new(Timestamp::INITIAL.raw()),
        }
    }

    /// Issues the next timestamp.
    pub fn next(&self) -> Timestamp {
        Timestamp(self.time.fetch_add(1, Ordering::SeqCst))
    }

    /// The value the next call to [`next`](Self::next) would issue.
    pub fn current(&self) -> Timestamp {
        Timestamp(self.time.load(Ordering::SeqCst))
    }
}

impl Default for TimestampSource {
    fn default() -> Self {
        Self::new()
    }
}
