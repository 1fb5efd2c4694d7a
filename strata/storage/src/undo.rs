//! Undo records and the per-transaction undo buffer.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use strata_transaction::{AtomicTimestamp, Timestamp};

use crate::error::StorageResult;
use crate::pool::RecordBufferPool;
use crate::table::{DataTable, ProjectedRow, TupleSlot};

/// Weak pointer threading a version chain.
///
/// Records are owned by their transaction's undo buffer; chain heads hold the
/// strong references and `next` links are weak. A dead link means the garbage
/// collector has reclaimed the rest of the chain, which the handoff contract
/// only permits once no live snapshot can need it.
pub type UndoPtr = Weak<UndoRecord>;

/// A before-image entry: the prior values of the columns one write modified.
pub struct UndoRecord {
    /// Mirrors the owning transaction's id while it is live; flipped to the
    /// commit timestamp at commit. This is the word readers consult for
    /// visibility.
    timestamp: AtomicTimestamp,
    table: Weak<DataTable>,
    slot: TupleSlot,
    delta: ProjectedRow,
    /// The previous chain head at the time this record was installed.
    next: UndoPtr,
}

impl UndoRecord {
    pub fn new(
        txn_id: Timestamp,
        table: &Arc<DataTable>,
        slot: TupleSlot,
        delta: ProjectedRow,
        next: UndoPtr,
    ) -> Self {
        debug_assert!(
            txn_id.is_transient(),
            "a live record carries its owner's transient id"
        );
        Self {
            timestamp: AtomicTimestamp::new(txn_id),
            table: Arc::downgrade(table),
            slot,
            delta,
            next,
        }
    }

    pub fn timestamp(&self) -> &AtomicTimestamp {
        &self.timestamp
    }

    pub fn table(&self) -> Option<Arc<DataTable>> {
        self.table.upgrade()
    }

    pub fn slot(&self) -> TupleSlot {
        self.slot
    }

    pub fn delta(&self) -> &ProjectedRow {
        &self.delta
    }

    pub fn next(&self) -> UndoPtr {
        self.next.clone()
    }
}

/// One fixed-capacity slab of undo records, handed out by the pool.
pub struct UndoBufferSegment {
    capacity: usize,
    records: Vec<Arc<UndoRecord>>,
}

impl UndoBufferSegment {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            records: Vec::with_capacity(capacity),
        }
    }

    fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

/// Append-only log of before-images owned by one transaction.
///
/// Records are appended in mutation order. While the transaction is live every
/// record's timestamp word equals its transient id; commit flips all of them
/// to the commit timestamp.
pub struct UndoBuffer {
    pool: Arc<RecordBufferPool>,
    segments: RwLock<Vec<UndoBufferSegment>>,
}

impl UndoBuffer {
    /// Creates a buffer with its first segment allocated eagerly, so a
    /// transaction cannot begin without undo capacity behind it.
    pub(crate) fn new(pool: Arc<RecordBufferPool>) -> StorageResult<Self> {
        let first = pool.allocate()?;
        Ok(Self {
            pool,
            segments: RwLock::new(vec![first]),
        })
    }

    /// Appends a record, growing by one pool segment when the last is full.
    pub fn append(&self, record: UndoRecord) -> StorageResult<Arc<UndoRecord>> {
        let mut segments = self.segments.write();
        if segments.last().is_none_or(UndoBufferSegment::is_full) {
            segments.push(self.pool.allocate()?);
        }
        let record = Arc::new(record);
        let segment = segments
            .last_mut()
            .expect("undo buffer holds at least one segment");
        segment.records.push(Arc::clone(&record));
        Ok(record)
    }

    /// True when the transaction never installed a record.
    pub fn is_empty(&self) -> bool {
        self.segments.read().iter().all(|s| s.records.is_empty())
    }

    /// Number of records appended so far.
    pub fn len(&self) -> usize {
        self.segments.read().iter().map(|s| s.records.len()).sum()
    }

    /// Snapshot of all records in append order.
    pub fn records(&self) -> Vec<Arc<UndoRecord>> {
        self.segments
            .read()
            .iter()
            .flat_map(|s| s.records.iter().cloned())
            .collect()
    }
}

impl Drop for UndoBuffer {
    fn drop(&mut self) {
        for segment in self.segments.get_mut().drain(..) {
            self.pool.release(segment);
        }
    }
}
