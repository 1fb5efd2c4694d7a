//! In-memory MVCC tuple storage and its transaction manager.
//!
//! Writers install before-images into per-tuple version chains; readers
//! traverse the chains lock-free to reconstruct the image their snapshot is
//! entitled to. The [`TransactionManager`] orchestrates begin/commit/abort,
//! tracks running transactions for the garbage collector's horizon, and hands
//! completed transactions off for reclamation.

pub mod error;
pub mod pool;
pub mod table;
pub mod transaction;
pub mod txn_manager;
pub mod undo;

pub use error::{StorageError, StorageResult};
pub use pool::{BufferPoolConfig, RecordBufferPool};
// Re-export commonly used types
pub use strata_transaction::{Timestamp, TransactionState};
pub use table::{DataTable, ProjectedRow, TupleSlot};
pub use transaction::TransactionContext;
pub use txn_manager::TransactionManager;
pub use undo::{UndoBuffer, UndoPtr, UndoRecord};
