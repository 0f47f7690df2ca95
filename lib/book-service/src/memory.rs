//! In-process store implementing the executor contract.
//!
//! Rows are kept as JSON objects keyed by column name, the same shape the
//! PostgreSQL executor binds from. Faults can be injected to drive the
//! service's error paths.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use tokio::sync::Mutex;

use crate::{
    ConnectionPool, Delete, Executed, Filter, Order, Query, QueryExecutor, Storable, StorageError,
    Update,
};

type Row = Map<String, JsonValue>;

/// A failure the in-memory store can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `acquire` fails as if the pool were unreachable.
    Acquire,
    /// Every statement fails.
    Statement,
    /// Write statements succeed but do not report rows affected.
    RowsAffected,
    /// Inserts succeed but do not return the assigned id.
    ReturnedId,
    /// Statements never complete.
    Stall,
}

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Row>,
    next_id: i64,
}

impl Table {
    fn assign_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<HashMap<String, Table>>,
    faults: Mutex<HashSet<Fault>>,
    checked_out: AtomicUsize,
}

impl Shared {
    async fn has_fault(&self, fault: Fault) -> bool {
        self.faults.lock().await.contains(&fault)
    }

    async fn before_statement(&self) -> Result<(), StorageError> {
        if self.has_fault(Fault::Stall).await {
            std::future::pending::<()>().await;
        }
        if self.has_fault(Fault::Statement).await {
            return Err(StorageError::StorageError(
                "injected statement failure".to_string(),
            ));
        }
        Ok(())
    }
}

/// Shared handle to the in-memory store. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryPool {
    shared: Arc<Shared>,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections currently checked out.
    pub fn checked_out(&self) -> usize {
        self.shared.checked_out.load(AtomicOrdering::SeqCst)
    }

    pub async fn inject(&self, fault: Fault) {
        self.shared.faults.lock().await.insert(fault);
    }

    pub async fn clear_faults(&self) {
        self.shared.faults.lock().await.clear();
    }

    /// Store `item` exactly as given, id included, bypassing the sequence.
    ///
    /// Used to set up rows a well-behaved store would never produce.
    pub async fn seed<T: Storable>(&self, item: &T) -> Result<(), StorageError> {
        let row = to_row(item)?;
        let mut tables = self.shared.tables.lock().await;
        let table = tables.entry(T::table_name().to_string()).or_default();
        table.next_id = table.next_id.max(item.id());
        table.rows.push(row);
        Ok(())
    }
}

#[async_trait]
impl ConnectionPool for MemoryPool {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection, StorageError> {
        if self.shared.has_fault(Fault::Acquire).await {
            return Err(StorageError::ConnectionError(
                "injected acquire failure".to_string(),
            ));
        }
        self.shared.checked_out.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
        })
    }
}

/// A checked-out connection; returns itself to the pool on drop.
#[derive(Debug)]
pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.shared.checked_out.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}

fn to_row<T: Storable>(item: &T) -> Result<Row, StorageError> {
    match serde_json::to_value(item)? {
        JsonValue::Object(row) => Ok(row),
        _ => Err(StorageError::StorageError(
            "Expected JSON object for Storable type".to_string(),
        )),
    }
}

fn row_matches(row: &Row, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(field, value) => row.get(field) == Some(&JsonValue::from(value)),
    })
}

fn compare(a: Option<&JsonValue>, b: Option<&JsonValue>) -> Ordering {
    match (a, b) {
        (Some(JsonValue::Number(a)), Some(JsonValue::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(JsonValue::String(a)), Some(JsonValue::String(b))) => a.cmp(b),
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl QueryExecutor for MemoryConnection {
    async fn fetch<T: Storable>(&mut self, query: Query<T>) -> Result<Vec<T>, StorageError> {
        self.shared.before_statement().await?;

        let mut rows: Vec<Row> = {
            let tables = self.shared.tables.lock().await;
            tables
                .get(&query.table)
                .map(|table| {
                    table
                        .rows
                        .iter()
                        .filter(|row| row_matches(row, &query.filters))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        rows.sort_by(|a, b| {
            query
                .order_by
                .iter()
                .map(|(field, order)| {
                    let ordering = compare(a.get(field), b.get(field));
                    match order {
                        Order::Asc => ordering,
                        Order::Desc => ordering.reverse(),
                    }
                })
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        rows.into_iter()
            .map(|row| serde_json::from_value(JsonValue::Object(row)).map_err(StorageError::from))
            .collect()
    }

    async fn insert<T: Storable>(&mut self, item: &T) -> Result<Executed, StorageError> {
        self.shared.before_statement().await?;

        let mut row = to_row(item)?;
        let id = {
            let mut tables = self.shared.tables.lock().await;
            let table = tables.entry(T::table_name().to_string()).or_default();
            let id = table.assign_id();
            row.insert(T::id_column().to_string(), JsonValue::from(id));
            table.rows.push(row);
            id
        };

        let returned_id = if self.shared.has_fault(Fault::ReturnedId).await {
            None
        } else {
            Some(id)
        };
        Ok(Executed::new(Some(1), returned_id))
    }

    async fn update<T: Storable>(&mut self, update: Update<T>) -> Result<Executed, StorageError> {
        self.shared.before_statement().await?;

        let values = to_row(&update.item)?;
        let writable = T::writable_columns();
        let affected = {
            let mut tables = self.shared.tables.lock().await;
            let mut affected = 0u64;
            if let Some(table) = tables.get_mut(&update.table) {
                for row in table
                    .rows
                    .iter_mut()
                    .filter(|row| row_matches(row, &update.filters))
                {
                    for (column, _) in &writable {
                        let value = values.get(*column).cloned().unwrap_or(JsonValue::Null);
                        row.insert((*column).to_string(), value);
                    }
                    affected += 1;
                }
            }
            affected
        };

        self.rows_affected(affected).await
    }

    async fn delete<T: Storable>(&mut self, delete: Delete<T>) -> Result<Executed, StorageError> {
        self.shared.before_statement().await?;

        let affected = {
            let mut tables = self.shared.tables.lock().await;
            match tables.get_mut(&delete.table) {
                Some(table) => {
                    let before = table.rows.len();
                    table.rows.retain(|row| !row_matches(row, &delete.filters));
                    (before - table.rows.len()) as u64
                }
                None => 0,
            }
        };

        self.rows_affected(affected).await
    }
}

impl MemoryConnection {
    async fn rows_affected(&self, affected: u64) -> Result<Executed, StorageError> {
        if self.shared.has_fault(Fault::RowsAffected).await {
            return Ok(Executed::new(None, None));
        }
        Ok(Executed::new(Some(affected), None))
    }
}
