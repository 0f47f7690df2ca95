//! Storable trait for database-agnostic storage operations.
//!
//! Types implementing `Storable` describe their table layout so that any
//! executor (PostgreSQL, the in-memory store) can insert, update, select
//! and delete them without type-specific code.

/// Trait for types that can be stored as rows of a single table.
///
/// Rows move between the executor and the type through serde: the
/// serialized JSON object of a value carries one key per column, named
/// exactly like the column.
///
/// # Column Types
///
/// `column_types()` corresponds 1:1 with `columns()` and tells executors
/// how to bind each value. Values: "bigint", "integer", "double", "text",
/// "datetime".
pub trait Storable: serde::Serialize + serde::de::DeserializeOwned + Clone + Send + Sync {
    /// The database table name for this type.
    fn table_name() -> &'static str;

    /// The store-generated primary key column.
    fn id_column() -> &'static str;

    /// Column names in order, including the id column.
    fn columns() -> &'static [&'static str];

    /// Column types in order (database-agnostic).
    fn column_types() -> &'static [&'static str];

    /// Columns written by INSERT and UPDATE, i.e. every column except the
    /// generated id, paired with their types.
    fn writable_columns() -> Vec<(&'static str, &'static str)> {
        Self::columns()
            .iter()
            .zip(Self::column_types().iter())
            .filter(|(column, _)| **column != Self::id_column())
            .map(|(column, column_type)| (*column, *column_type))
            .collect()
    }

    /// Get the primary key value.
    fn id(&self) -> i64;
}
