//! Database-agnostic statements and the acquire-connection / execute-statement
//! contract every store backend implements.

use crate::{Storable, StorageDatetime, StorageError};
use async_trait::async_trait;
use std::marker::PhantomData;

/// A value that can be bound to a query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Datetime(StorageDatetime),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<StorageDatetime> for Value {
    fn from(dt: StorageDatetime) -> Self {
        Value::Datetime(dt)
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        match value {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Datetime(dt) => serde_json::Value::String(
                dt.inner()
                    .to_rfc3339_opts(chrono::SecondsFormat::Micros, true),
            ),
        }
    }
}

/// Filter conditions for statements.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// field = value
    Eq(String, Value),
}

/// Sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// A SELECT query builder.
#[derive(Debug, Clone)]
pub struct Query<T> {
    /// The table to query.
    pub table: String,
    /// Filter conditions.
    pub filters: Vec<Filter>,
    /// Order by clauses.
    pub order_by: Vec<(String, Order)>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: Storable> Query<T> {
    /// Create a new query for the type's table.
    pub fn new() -> Self {
        Self {
            table: T::table_name().to_string(),
            filters: Vec::new(),
            order_by: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Add a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an equality filter (shorthand for Filter::Eq).
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }

    /// Add an order-by clause.
    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.order_by.push((field.into(), order));
        self
    }
}

impl<T: Storable> Default for Query<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// An UPDATE statement that overwrites every writable column with the
/// values of `item` on rows matching the filters.
#[derive(Debug, Clone)]
pub struct Update<T> {
    /// The table to update.
    pub table: String,
    /// The new column values.
    pub item: T,
    /// Filter conditions.
    pub filters: Vec<Filter>,
}

impl<T: Storable> Update<T> {
    pub fn new(item: T) -> Self {
        Self {
            table: T::table_name().to_string(),
            item,
            filters: Vec::new(),
        }
    }

    /// Add a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an equality filter (shorthand).
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }
}

/// A DELETE query builder.
#[derive(Debug, Clone)]
pub struct Delete<T> {
    /// The table to delete from.
    pub table: String,
    /// Filter conditions.
    pub filters: Vec<Filter>,
    pub(crate) _marker: PhantomData<T>,
}

impl<T: Storable> Delete<T> {
    /// Create a new delete query for the type's table.
    pub fn new() -> Self {
        Self {
            table: T::table_name().to_string(),
            filters: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Add a filter condition.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add an equality filter (shorthand).
    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(field.into(), value.into()))
    }
}

impl<T: Storable> Default for Delete<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of a write statement.
///
/// Either figure may be unavailable from a backend; reading it back is a
/// separate, fallible step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Executed {
    rows_affected: Option<u64>,
    returned_id: Option<i64>,
}

impl Executed {
    pub fn new(rows_affected: Option<u64>, returned_id: Option<i64>) -> Self {
        Self {
            rows_affected,
            returned_id,
        }
    }

    pub fn rows_affected(&self) -> Result<u64, StorageError> {
        self.rows_affected.ok_or_else(|| {
            StorageError::MissingResult("driver did not report rows affected".to_string())
        })
    }

    pub fn returned_id(&self) -> Result<i64, StorageError> {
        self.returned_id.ok_or_else(|| {
            StorageError::MissingResult("statement returned no id".to_string())
        })
    }
}

/// Trait for executing statements on one checked-out store connection.
///
/// Implemented by backend connection types (e.g. a pooled PostgreSQL
/// connection, the in-memory store's connection).
#[async_trait]
pub trait QueryExecutor: Send {
    /// Execute a SELECT query and return every matching row.
    async fn fetch<T: Storable>(&mut self, query: Query<T>) -> Result<Vec<T>, StorageError>;

    /// Insert an item, letting the store assign its id.
    ///
    /// The returned [`Executed`] carries the assigned id.
    async fn insert<T: Storable>(&mut self, item: &T) -> Result<Executed, StorageError>;

    /// Execute an UPDATE and report the number of rows affected.
    async fn update<T: Storable>(&mut self, update: Update<T>) -> Result<Executed, StorageError>;

    /// Execute a DELETE and report the number of rows affected.
    async fn delete<T: Storable>(&mut self, delete: Delete<T>) -> Result<Executed, StorageError>;
}

/// A shared pool handing out one connection per caller.
///
/// The connection returns to the pool when dropped, so a caller cannot
/// leak it on an early return.
#[async_trait]
pub trait ConnectionPool: Clone + Send + Sync + 'static {
    type Connection: QueryExecutor;

    /// Check out a connection.
    async fn acquire(&self) -> Result<Self::Connection, StorageError>;
}
