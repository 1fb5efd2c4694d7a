//! Per-transaction state.

use std::sync::Arc;

use strata_transaction::{AtomicTimestamp, AtomicTransactionState, Timestamp, TransactionState};

use crate::error::StorageResult;
use crate::pool::RecordBufferPool;
use crate::undo::UndoBuffer;

/// Per-transaction state: the snapshot it sees, its transient id, and the
/// undo log of every write it has installed.
///
/// Contexts are created by the transaction manager's begin, observed by
/// readers through version chains for as long as they live, deregistered at
/// commit or abort, and finally handed to the garbage collector.
pub struct TransactionContext {
    start_time: Timestamp,
    /// Transient while the transaction runs; overwritten with the commit
    /// timestamp at commit. Readers of version chains consult the records'
    /// own timestamp words, which mirror this one.
    txn_id: AtomicTimestamp,
    undo_buffer: UndoBuffer,
    state: AtomicTransactionState,
}

impl TransactionContext {
    /// Fails when the buffer pool cannot back the undo buffer; the caller
    /// must register nothing in that case.
    pub(crate) fn new(start_time: Timestamp, pool: Arc<RecordBufferPool>) -> StorageResult<Self> {
        Ok(Self {
            start_time,
            txn_id: AtomicTimestamp::new(start_time.to_transient()),
            undo_buffer: UndoBuffer::new(pool)?,
            state: AtomicTransactionState::new(TransactionState::Running),
        })
    }

    /// The snapshot this transaction reads at.
    pub fn start_time(&self) -> Timestamp {
        self.start_time
    }

    /// The id word: transient while running, the commit timestamp afterwards.
    pub fn txn_id(&self) -> &AtomicTimestamp {
        &self.txn_id
    }

    pub fn undo_buffer(&self) -> &UndoBuffer {
        &self.undo_buffer
    }

    pub fn state(&self) -> TransactionState {
        self.state.load()
    }

    pub(crate) fn transition(&self, next: TransactionState) {
        self.state.transition(next);
    }

    /// The terminal transition, driven by the garbage collector once the
    /// horizon has passed everything this transaction touched.
    pub fn mark_reclaimed(&self) {
        self.state.transition(TransactionState::Reclaimed);
    }
}
