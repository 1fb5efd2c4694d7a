use std::sync::Arc;

use strata_common::ScalarValue;
use strata_storage::{
    BufferPoolConfig, DataTable, ProjectedRow, RecordBufferPool, TransactionManager, TupleSlot,
};

pub fn manager_with_gc() -> TransactionManager {
    TransactionManager::new(RecordBufferPool::new(BufferPoolConfig::default()), true)
}

pub fn manager_without_gc() -> TransactionManager {
    TransactionManager::new(RecordBufferPool::new(BufferPoolConfig::default()), false)
}

/// One-column table seeded with a single committed row holding `initial`.
pub fn table_with_row(initial: i64) -> (Arc<DataTable>, TupleSlot) {
    let table = DataTable::new(1);
    let slot = table.insert(vec![ScalarValue::Int64(Some(initial))]);
    (table, slot)
}

pub fn int_row(value: i64) -> ProjectedRow {
    ProjectedRow::new(vec![0], vec![ScalarValue::Int64(Some(value))])
}
