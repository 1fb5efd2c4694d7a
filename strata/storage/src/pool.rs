//! Pooled backing storage for undo buffers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;
use tracing::warn;

use crate::error::{BufferPoolError, StorageResult};
use crate::undo::UndoBufferSegment;

/// Sizing for a [`RecordBufferPool`].
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Capacity of one undo segment, in records.
    pub records_per_segment: usize,
    /// Upper bound on segments in circulation, across all transactions.
    pub max_segments: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            records_per_segment: 32,
            max_segments: 4096,
        }
    }
}

/// Lock-free pool of fixed-capacity undo segments.
///
/// Segments released by finished undo buffers are recycled before new ones are
/// created; the segment budget bounds total undo memory. Allocation failure
/// surfaces as a typed error so a transaction begin can fail cleanly.
pub struct RecordBufferPool {
    config: BufferPoolConfig,
    free: SegQueue<UndoBufferSegment>,
    created: AtomicUsize,
}

impl RecordBufferPool {
    pub fn new(config: BufferPoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            free: SegQueue::new(),
            created: AtomicUsize::new(0),
        })
    }

    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    /// Hands out a segment, recycling a released one when available.
    pub fn allocate(&self) -> StorageResult<UndoBufferSegment> {
        if let Some(segment) = self.free.pop() {
            return Ok(segment);
        }
        let mut created = self.created.load(Ordering::Relaxed);
        loop {
            if created >= self.config.max_segments {
                warn!(
                    limit = self.config.max_segments,
                    "record buffer pool exhausted"
                );
                return Err(BufferPoolError::Exhausted(self.config.max_segments).into());
            }
            match self.created.compare_exchange_weak(
                created,
                created + 1,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Ok(UndoBufferSegment::with_capacity(
                        self.config.records_per_segment,
                    ))
                }
                Err(actual) => created = actual,
            }
        }
    }

    /// Takes a segment back; its records are dropped, its capacity is kept.
    pub fn release(&self, mut segment: UndoBufferSegment) {
        segment.clear();
        self.free.push(segment);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_bounded_and_recycling_frees_budget() {
        let pool = RecordBufferPool::new(BufferPoolConfig {
            records_per_segment: 2,
            max_segments: 1,
        });

        let segment = pool.allocate().unwrap();
        assert!(pool.allocate().is_err());

        pool.release(segment);
        assert!(pool.allocate().is_ok());
    }
}
