/// Internal identifier associated with a column.
///
/// Columns are addressed by their position in the table layout, so the id
/// doubles as an index into a tuple's value vector.
pub type ColumnId = u16;
