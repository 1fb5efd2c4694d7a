//! Shared identifiers and the column value model for the strata storage
//! engine.

pub mod types;
pub mod value;

pub use types::ColumnId;
pub use value::{Nullable, ScalarValue, F64};
