use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),
    #[error("Tuple error: {0}")]
    Tuple(#[from] TupleError),
}

#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Write-Write conflict: {0}")]
    WriteWriteConflict(String),
}

#[derive(Error, Debug)]
pub enum BufferPoolError {
    #[error("buffer pool exhausted: all {0} segments are in use")]
    Exhausted(usize),
}

#[derive(Error, Debug)]
pub enum TupleError {
    #[error("Tuple {0} not found")]
    SlotNotFound(String),
}
