use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

pub type Nullable<T> = Option<T>;

/// A wrapper around floats providing implementations of `Eq` and `Hash`.
pub type F64 = OrderedFloat<f64>;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarValue {
    Null,
    Boolean(Nullable<bool>),
    Int32(Nullable<i32>),
    Int64(Nullable<i64>),
    Float64(Nullable<F64>),
    String(Nullable<String>),
}
