//! Transaction lifecycle states.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Lifecycle of a transaction.
///
/// The manager drives every transition except the last; the terminal
/// `Reclaimed` transition belongs to the garbage collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransactionState {
    Running = 0,
    Committed = 1,
    Aborted = 2,
    QueuedForGc = 3,
    Reclaimed = 4,
}

impl TransactionState {
    fn from_u8(raw: u8) -> TransactionState {
        match raw {
            0 => TransactionState::Running,
            1 => TransactionState::Committed,
            2 => TransactionState::Aborted,
            3 => TransactionState::QueuedForGc,
            4 => TransactionState::Reclaimed,
            _ => unreachable!("invalid transaction state {raw}"),
        }
    }

    /// Returns true if `next` is a legal successor of `self`.
    pub fn can_transition_to(self, next: TransactionState) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Running, Committed)
                | (Running, Aborted)
                | (Committed, QueuedForGc)
                | (Aborted, QueuedForGc)
                | (QueuedForGc, Reclaimed)
        )
    }
}

/// An atomically readable lifecycle cell.
#[derive(Debug)]
pub struct AtomicTransactionState(AtomicU8);

impl AtomicTransactionState {
    pub fn new(state: TransactionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> TransactionState {
        TransactionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next`, debug-asserting the transition is legal.
    pub fn transition(&self, next: TransactionState) {
        let prev = TransactionState::from_u8(self.0.swap(next as u8, Ordering::AcqRel));
        debug_assert!(
            prev.can_transition_to(next),
            "illegal transaction state transition {prev:?} -> {next:?}"
        );
    }
}
