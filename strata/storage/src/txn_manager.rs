//! The transaction manager: begin/commit/abort orchestration, the running
//! table, and the garbage collector's handoff.

use std::collections::{BTreeMap, VecDeque};
use std::mem;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use strata_transaction::{Timestamp, TimestampSource, TransactionState};
use tracing::{debug, trace};

use crate::error::StorageResult;
use crate::pool::RecordBufferPool;
use crate::transaction::TransactionContext;
use crate::undo::UndoRecord;

/// Structures guarded by the table latch. Keeping both behind one latch makes
/// deregister-and-queue a single atomic step, and the handoff swap atomic with
/// respect to concurrent producers.
#[derive(Default)]
struct TxnTables {
    /// Running transactions keyed by start time; the minimum key is the
    /// garbage collector's horizon while anything runs.
    running: BTreeMap<Timestamp, Arc<TransactionContext>>,
    /// Completed transactions awaiting handoff.
    completed: VecDeque<Arc<TransactionContext>>,
}

/// Orchestrates Begin / Commit / Abort, tracks running transactions, and
/// exposes the garbage collector's safe horizon and completed-transaction
/// handoff.
///
/// Two latches serialize the public operations. Begin takes the commit latch
/// in reader mode and commit takes it in writer mode: begins run concurrently
/// with each other, but none may capture its start timestamp between a
/// commit's timestamp fetch and its record stamping, or its snapshot would
/// order the commit as earlier while still seeing its records tagged
/// transient. Abort takes only the table latch. When both latches are held,
/// the commit latch is acquired first and released last.
pub struct TransactionManager {
    time: TimestampSource,
    commit_latch: RwLock<()>,
    tables: Mutex<TxnTables>,
    buffer_pool: Arc<RecordBufferPool>,
    gc_enabled: bool,
}

impl TransactionManager {
    pub fn new(buffer_pool: Arc<RecordBufferPool>, gc_enabled: bool) -> Self {
        Self {
            time: TimestampSource::new(),
            commit_latch: RwLock::new(()),
            tables: Mutex::new(TxnTables::default()),
            buffer_pool,
            gc_enabled,
        }
    }

    /// Starts a transaction: issues its start timestamp and registers it in
    /// the running table.
    ///
    /// Fails only when the buffer pool cannot back a fresh undo buffer, in
    /// which case nothing is registered.
    pub fn begin_transaction(&self) -> StorageResult<Arc<TransactionContext>> {
        let _guard = self.commit_latch.read();
        let id = self.time.next();
        let txn = Arc::new(TransactionContext::new(id, Arc::clone(&self.buffer_pool))?);
        let mut tables = self.tables.lock();
        let prev = tables.running.insert(id, Arc::clone(&txn));
        assert!(
            prev.is_none(),
            "transaction start time should be globally unique"
        );
        drop(tables);
        trace!(start_time = id.raw(), "begin transaction");
        Ok(txn)
    }

    /// Commits `txn`: issues the commit timestamp, flips every undo record's
    /// timestamp word to it, and deregisters the transaction. Returns the
    /// commit timestamp.
    ///
    /// The stamping uses release stores, so a reader that observes the commit
    /// timestamp on a chain head also observes the record's delta; the
    /// writer-mode latch makes the fetch-and-stamp atomic with respect to
    /// every begin.
    pub fn commit(&self, txn: &TransactionContext) -> Timestamp {
        let _guard = self.commit_latch.write();
        let commit_time = self.time.next();
        // Flip all timestamps to committed.
        for record in txn.undo_buffer().records() {
            record.timestamp().store(commit_time, Ordering::Release);
        }
        let mut tables = self.tables.lock();
        let start_time = txn.start_time();
        let ctx = tables
            .running
            .remove(&start_time)
            .expect("committed transaction did not exist in the running table");
        txn.txn_id().store(commit_time, Ordering::SeqCst);
        txn.transition(TransactionState::Committed);
        if self.gc_enabled {
            txn.transition(TransactionState::QueuedForGc);
            tables.completed.push_back(ctx);
        }
        drop(tables);
        trace!(
            start_time = start_time.raw(),
            commit_time = commit_time.raw(),
            "commit transaction"
        );
        commit_time
    }

    /// Aborts `txn`: reinstalls every before-image it still owns and
    /// deregisters the transaction.
    ///
    /// No commit latch: an abort issues no timestamp, and its writes touch
    /// only tuples the aborter still owns.
    pub fn abort(&self, txn: &TransactionContext) {
        // The id word no longer changes: only commit flips it.
        let txn_id = txn.txn_id().load(Ordering::SeqCst);
        for record in txn.undo_buffer().records() {
            self.rollback(txn_id, &record);
        }
        let mut tables = self.tables.lock();
        let start_time = txn.start_time();
        let ctx = tables
            .running
            .remove(&start_time)
            .expect("aborted transaction did not exist in the running table");
        txn.transition(TransactionState::Aborted);
        if self.gc_enabled {
            txn.transition(TransactionState::QueuedForGc);
            tables.completed.push_back(ctx);
        }
        drop(tables);
        trace!(start_time = start_time.raw(), "abort transaction");
    }

    /// The garbage collector's safe horizon: the minimum start time of any
    /// running transaction, or the next-issuable timestamp when none run.
    /// Every snapshot that can still be opened is at least this large.
    pub fn oldest_transaction_start_time(&self) -> Timestamp {
        let tables = self.tables.lock();
        tables
            .running
            .keys()
            .next()
            .copied()
            .unwrap_or_else(|| self.time.current())
    }

    /// Hands the completed-transaction queue to the caller, leaving an empty
    /// queue behind.
    ///
    /// The caller owns the contexts and may destroy them once the horizon has
    /// advanced past their commit timestamps.
    pub fn completed_transactions_for_gc(&self) -> VecDeque<Arc<TransactionContext>> {
        let mut tables = self.tables.lock();
        let hand_to_gc = mem::take(&mut tables.completed);
        debug_assert!(
            tables.completed.is_empty(),
            "the manager's queue should now be empty"
        );
        drop(tables);
        debug!(count = hand_to_gc.len(), "handing completed transactions to gc");
        hand_to_gc
    }

    /// Reinstalls one before-image, if the aborting transaction still owns
    /// the record's chain head.
    ///
    /// A null head, or a head stamped with a different id, means another
    /// writer has since layered a record on top; that record's before-image
    /// already reflects this transaction's pre-write state (the layering
    /// precondition on the head-install operations), so ours is abandoned
    /// untouched.
    fn rollback(&self, txn_id: Timestamp, record: &UndoRecord) {
        let Some(table) = record.table() else { return };
        let slot = record.slot();
        let Some(version_ptr) = table.read_version_ptr(slot) else {
            return;
        };
        if version_ptr.timestamp().load(Ordering::Acquire) != txn_id {
            return;
        }
        // Re-apply the before image.
        let delta = version_ptr.delta();
        for i in 0..delta.num_columns() {
            table.copy_attr_from_projection(slot, delta, i);
        }
        // Pop the record off the chain, releasing the logical write lock. No
        // compare-and-swap: ownership of the head was just established and
        // cannot be taken away before this store.
        table.write_version_ptr(slot, version_ptr.next().upgrade());
    }
}
