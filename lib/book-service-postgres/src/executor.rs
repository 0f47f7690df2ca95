//! PostgreSQL implementation of ConnectionPool and QueryExecutor.

use std::ops::Deref;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::{Arguments, Postgres, Row};
use tracing::{debug, trace};

use book_service::{
    ConnectionPool, Delete, Executed, Filter, Order, Query, QueryExecutor, Storable,
    StorageError, Update, Value,
};

use crate::PoolConfig;
use crate::serde_bind::{bind_writable_values, build_insert_sql, build_update_sql, deserialize_row};

const BOOK_TABLE_DDL: &str = "CREATE TABLE IF NOT EXISTS book (
    id BIGSERIAL PRIMARY KEY,
    title TEXT NOT NULL,
    author TEXT NOT NULL,
    publisher TEXT NOT NULL,
    publish_date TIMESTAMPTZ NOT NULL,
    rating DOUBLE PRECISION NOT NULL,
    status INTEGER NOT NULL
)";

fn statement_error(e: sqlx::Error) -> StorageError {
    StorageError::StorageError(e.to_string())
}

/// Wrapper around sqlx::PgPool that hands out executor connections.
#[derive(Clone, Debug)]
pub struct PgPool(sqlx::PgPool);

impl PgPool {
    /// Create a new PgPool from an sqlx PgPool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self(pool)
    }

    /// Connect with default pool settings.
    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        Self::connect_with(&PoolConfig::new(url)).await
    }

    /// Connect with explicit pool settings, rejecting invalid ones before
    /// any connection attempt.
    pub async fn connect_with(config: &PoolConfig) -> Result<Self, StorageError> {
        config
            .validate()
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        debug!(
            max_connections = config.max_connections,
            "connected to postgres"
        );
        Ok(Self(pool))
    }

    /// Get the inner sqlx::PgPool.
    pub fn inner(&self) -> &sqlx::PgPool {
        &self.0
    }

    /// Open connections, idle or checked out.
    pub fn size(&self) -> u32 {
        self.0.size()
    }

    pub fn idle(&self) -> usize {
        self.0.num_idle()
    }

    /// Create the `book` table when it does not exist yet.
    pub async fn ensure_book_table(&self) -> Result<(), StorageError> {
        sqlx::query(BOOK_TABLE_DDL)
            .execute(&self.0)
            .await
            .map_err(statement_error)?;
        Ok(())
    }
}

impl Deref for PgPool {
    type Target = sqlx::PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[async_trait]
impl ConnectionPool for PgPool {
    type Connection = PgPooledConnection;

    async fn acquire(&self) -> Result<PgPooledConnection, StorageError> {
        let conn = self
            .0
            .acquire()
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;
        Ok(PgPooledConnection(conn))
    }
}

/// A connection checked out of [`PgPool`]; returns to the pool on drop.
pub struct PgPooledConnection(PoolConnection<Postgres>);

/// Build a WHERE clause from filters, numbering parameters from `start_param`.
fn build_where_clause(filters: &[Filter], start_param: usize) -> String {
    if filters.is_empty() {
        return String::new();
    }

    let clauses: Vec<String> = filters
        .iter()
        .enumerate()
        .map(|(offset, filter)| match filter {
            Filter::Eq(field, _) => format!("{} = ${}", field, start_param + offset),
        })
        .collect();

    format!(" WHERE {}", clauses.join(" AND "))
}

/// Bind filter values to PgArguments.
fn bind_filters(args: &mut PgArguments, filters: &[Filter]) -> Result<(), StorageError> {
    for filter in filters {
        match filter {
            Filter::Eq(_, value) => bind_value(args, value)?,
        }
    }
    Ok(())
}

/// Bind a Value to PgArguments.
fn bind_value(args: &mut PgArguments, value: &Value) -> Result<(), StorageError> {
    match value {
        Value::String(s) => args.add(s.as_str()),
        Value::Int(n) => args.add(*n),
        Value::Float(n) => args.add(*n),
        Value::Datetime(dt) => args.add(*dt.inner()),
    }
    .map_err(|e| StorageError::StorageError(e.to_string()))
}

/// Build ORDER BY clause.
fn build_order_clause(order_by: &[(String, Order)]) -> String {
    if order_by.is_empty() {
        return String::new();
    }

    let clauses: Vec<String> = order_by
        .iter()
        .map(|(field, order)| {
            let dir = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            format!("{} {}", field, dir)
        })
        .collect();

    format!(" ORDER BY {}", clauses.join(", "))
}

#[async_trait]
impl QueryExecutor for PgPooledConnection {
    async fn fetch<T: Storable>(&mut self, query: Query<T>) -> Result<Vec<T>, StorageError> {
        let sql = format!(
            "SELECT {} FROM {}{}{}",
            T::columns().join(", "),
            query.table,
            build_where_clause(&query.filters, 1),
            build_order_clause(&query.order_by)
        );
        trace!(%sql, "fetch");

        let mut args = PgArguments::default();
        bind_filters(&mut args, &query.filters)?;

        let rows = sqlx::query_with(&sql, args)
            .fetch_all(&mut *self.0)
            .await
            .map_err(statement_error)?;

        rows.iter().map(|row| deserialize_row::<T>(row)).collect()
    }

    async fn insert<T: Storable>(&mut self, item: &T) -> Result<Executed, StorageError> {
        let mut args = PgArguments::default();
        let columns = bind_writable_values(&mut args, item)?;
        let sql = build_insert_sql(T::table_name(), &columns, T::id_column());
        trace!(%sql, "insert");

        let row = sqlx::query_with(&sql, args)
            .fetch_optional(&mut *self.0)
            .await
            .map_err(statement_error)?;

        match row {
            Some(row) => {
                let id: i64 = row.try_get(0).map_err(statement_error)?;
                Ok(Executed::new(Some(1), Some(id)))
            }
            None => Ok(Executed::new(Some(0), None)),
        }
    }

    async fn update<T: Storable>(&mut self, update: Update<T>) -> Result<Executed, StorageError> {
        let mut args = PgArguments::default();
        let columns = bind_writable_values(&mut args, &update.item)?;
        let (set_sql, next_param) = build_update_sql(&update.table, &columns);
        let sql = format!(
            "{}{}",
            set_sql,
            build_where_clause(&update.filters, next_param)
        );
        trace!(%sql, "update");
        bind_filters(&mut args, &update.filters)?;

        let result = sqlx::query_with(&sql, args)
            .execute(&mut *self.0)
            .await
            .map_err(statement_error)?;

        Ok(Executed::new(Some(result.rows_affected()), None))
    }

    async fn delete<T: Storable>(&mut self, delete: Delete<T>) -> Result<Executed, StorageError> {
        let sql = format!(
            "DELETE FROM {}{}",
            delete.table,
            build_where_clause(&delete.filters, 1)
        );
        trace!(%sql, "delete");

        let mut args = PgArguments::default();
        bind_filters(&mut args, &delete.filters)?;

        let result = sqlx::query_with(&sql, args)
            .execute(&mut *self.0)
            .await
            .map_err(statement_error)?;

        Ok(Executed::new(Some(result.rows_affected()), None))
    }
}
