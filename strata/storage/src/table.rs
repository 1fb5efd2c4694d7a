//! Versioned tuple storage and the version-chain operator.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use strata_common::{ColumnId, ScalarValue};

use crate::error::{StorageResult, TransactionError, TupleError};
use crate::transaction::TransactionContext;
use crate::undo::UndoRecord;

/// Identifies one tuple within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleSlot(u64);

impl TupleSlot {
    pub const fn index(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TupleSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot({})", self.0)
    }
}

/// A projection over a subset of columns: ids paired with values.
///
/// Used both for the redo images handed to [`DataTable::update`] and for the
/// before-images stored in undo records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedRow {
    column_ids: Vec<ColumnId>,
    values: Vec<ScalarValue>,
}

impl ProjectedRow {
    pub fn new(column_ids: Vec<ColumnId>, values: Vec<ScalarValue>) -> Self {
        assert_eq!(
            column_ids.len(),
            values.len(),
            "projection ids and values must pair up"
        );
        Self { column_ids, values }
    }

    pub fn num_columns(&self) -> usize {
        self.column_ids.len()
    }

    pub fn column_ids(&self) -> &[ColumnId] {
        &self.column_ids
    }

    pub fn column_id(&self, i: usize) -> ColumnId {
        self.column_ids[i]
    }

    pub fn value(&self, i: usize) -> &ScalarValue {
        &self.values[i]
    }
}

/// One tuple: the latest payload plus the head of its undo chain.
struct VersionedTuple {
    data: RwLock<Vec<ScalarValue>>,
    /// Most recent undo record, or null when the payload is the latest
    /// committed image.
    version_ptr: ArcSwapOption<UndoRecord>,
}

fn ptr_eq(a: &Option<Arc<UndoRecord>>, b: &Option<Arc<UndoRecord>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// An in-memory table of versioned tuples.
///
/// The table owns the per-slot version-chain heads, which readers load
/// lock-free. Tuple payloads sit under a per-slot lock that only prevents torn
/// column copies; payload visibility is anchored by the release semantics of
/// the head stores.
pub struct DataTable {
    num_columns: u16,
    slots: DashMap<TupleSlot, VersionedTuple>,
    next_slot: AtomicU64,
}

impl DataTable {
    pub fn new(num_columns: u16) -> Arc<Self> {
        Arc::new(Self {
            num_columns,
            slots: DashMap::new(),
            next_slot: AtomicU64::new(0),
        })
    }

    pub fn num_columns(&self) -> u16 {
        self.num_columns
    }

    /// Installs a committed image with a null version chain.
    ///
    /// Bootstrap/load path: the tuple becomes the latest committed version as
    /// of creation, with no undo history behind it.
    pub fn insert(&self, values: Vec<ScalarValue>) -> TupleSlot {
        assert_eq!(
            values.len(),
            self.num_columns as usize,
            "row width must match the table layout"
        );
        let slot = TupleSlot(self.next_slot.fetch_add(1, Ordering::SeqCst));
        self.slots.insert(
            slot,
            VersionedTuple {
                data: RwLock::new(values),
                version_ptr: ArcSwapOption::empty(),
            },
        );
        slot
    }

    /// Atomically reads the version-chain head for `slot`.
    ///
    /// The load pairs with the release semantics of the head stores, so a
    /// reader that observes a record through the head also observes its delta.
    pub fn read_version_ptr(&self, slot: TupleSlot) -> Option<Arc<UndoRecord>> {
        self.slots
            .get(&slot)
            .and_then(|tuple| tuple.version_ptr.load_full())
    }

    /// Atomically publishes `head` as the version-chain head for `slot`.
    ///
    /// Precondition for layering: a record installed atop an uncommitted one
    /// must carry a before-image that already reflects the earlier writer's
    /// pre-write state. Rollback of the bypassed record relies on this to
    /// abandon it safely.
    pub fn write_version_ptr(&self, slot: TupleSlot, head: Option<Arc<UndoRecord>>) {
        if let Some(tuple) = self.slots.get(&slot) {
            tuple.version_ptr.store(head);
        }
    }

    /// Atomically replaces the head only if it is still `expected`; returns
    /// true on success. Same layering precondition as [`write_version_ptr`].
    pub fn compare_swap_version_ptr(
        &self,
        slot: TupleSlot,
        expected: &Option<Arc<UndoRecord>>,
        new: Option<Arc<UndoRecord>>,
    ) -> bool {
        let Some(tuple) = self.slots.get(&slot) else {
            return false;
        };
        let prev = tuple.version_ptr.compare_and_swap(expected, new);
        ptr_eq(&prev, expected)
    }

    /// Copies column `i` of `delta` back into the tuple payload.
    ///
    /// Rollback's per-column primitive: the caller loops over the delta's
    /// columns while it owns the chain head.
    pub fn copy_attr_from_projection(&self, slot: TupleSlot, delta: &ProjectedRow, i: usize) {
        if let Some(tuple) = self.slots.get(&slot) {
            let mut data = tuple.data.write();
            data[delta.column_id(i) as usize] = delta.value(i).clone();
        }
    }

    /// Transactional write: captures the before-image of `redo`'s columns,
    /// installs it at the chain head, then applies `redo` to the payload.
    ///
    /// A head owned by another live transaction, or a committed head newer
    /// than this transaction's snapshot, fails with a write-write conflict.
    pub fn update(
        self: &Arc<Self>,
        txn: &TransactionContext,
        slot: TupleSlot,
        redo: &ProjectedRow,
    ) -> StorageResult<()> {
        let tuple = self
            .slots
            .get(&slot)
            .ok_or_else(|| TupleError::SlotNotFound(slot.to_string()))?;
        let txn_id = txn.txn_id().load(Ordering::SeqCst);

        let head = tuple.version_ptr.load_full();
        if let Some(record) = &head {
            let ts = record.timestamp().load(Ordering::Acquire);
            let conflicting = if ts.is_transient() {
                ts != txn_id
            } else {
                ts > txn.start_time()
            };
            if conflicting {
                return Err(TransactionError::WriteWriteConflict(format!(
                    "{slot} is held by a newer write"
                ))
                .into());
            }
        }

        // Before-image of exactly the columns this write touches.
        let delta = {
            let data = tuple.data.read();
            let values = (0..redo.num_columns())
                .map(|i| data[redo.column_id(i) as usize].clone())
                .collect();
            ProjectedRow::new(redo.column_ids().to_vec(), values)
        };
        let next = head.as_ref().map_or_else(Weak::new, Arc::downgrade);
        let record = txn
            .undo_buffer()
            .append(UndoRecord::new(txn_id, self, slot, delta, next))?;

        if !self.compare_swap_version_ptr(slot, &head, Some(record)) {
            // Another writer claimed the head between our load and the
            // install; the appended record was never published.
            return Err(TransactionError::WriteWriteConflict(format!(
                "{slot} head changed during install"
            ))
            .into());
        }

        // The new payload goes in only after the before-image is reachable
        // from the head.
        let mut data = tuple.data.write();
        for i in 0..redo.num_columns() {
            data[redo.column_id(i) as usize] = redo.value(i).clone();
        }
        Ok(())
    }

    /// Snapshot read: the tuple as of `txn`'s start time, including the
    /// transaction's own uncommitted writes.
    pub fn select(
        &self,
        txn: &TransactionContext,
        slot: TupleSlot,
    ) -> StorageResult<Vec<ScalarValue>> {
        let tuple = self
            .slots
            .get(&slot)
            .ok_or_else(|| TupleError::SlotNotFound(slot.to_string()))?;
        let mut values = tuple.data.read().clone();
        let txn_id = txn.txn_id().load(Ordering::SeqCst);

        let mut version = tuple.version_ptr.load_full();
        while let Some(record) = version {
            let ts = record.timestamp().load(Ordering::Acquire);
            // Own write: the payload already reflects it.
            if ts == txn_id {
                break;
            }
            // Committed before this snapshot: everything older is visible.
            if ts.is_committed() && ts < txn.start_time() {
                break;
            }
            // Newer than the snapshot, or a foreign in-flight write: undo it.
            let delta = record.delta();
            for i in 0..delta.num_columns() {
                values[delta.column_id(i) as usize] = delta.value(i).clone();
            }
            version = record.next().upgrade();
        }
        Ok(values)
    }
}
