//! Logical clock and transaction lifecycle primitives for the strata storage
//! engine.
//!
//! Timestamps are single 64-bit words with two disjoint ranges: non-negative
//! commit timestamps and negative transient transaction ids. Start and commit
//! times are issued from the same monotonic source, so timestamps of distinct
//! transactions are totally ordered and never equal.

pub mod state;
pub mod timestamp;

pub use state::{AtomicTransactionState, TransactionState};
pub use timestamp::{AtomicTimestamp, Timestamp, TimestampKind, TimestampSource};
