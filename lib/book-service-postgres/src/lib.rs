//! PostgreSQL backend for book-service.
//!
//! Provides a pool whose connections implement the `QueryExecutor`
//! contract. Rows are bound and read through serde, so any type
//! implementing `Storable` can be persisted without type-specific code.
//!
//! # Usage
//!
//! ```text
//! use book_service::BookRepository;
//! use book_service_postgres::{PgPool, PoolConfig};
//!
//! let pool = PgPool::connect_with(&PoolConfig::from_env()?).await?;
//! pool.ensure_book_table().await?;
//! let service = BookRepository::new(pool);
//! ```

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod config;
mod executor;
mod serde_bind;

pub use config::{ConfigError, PoolConfig};
pub use executor::{PgPool, PgPooledConnection};
pub use serde_bind::deserialize_row;

// Re-export core types for convenience
pub use book_service::{
    ConnectionPool, Delete, Executed, Filter, Order, Query, QueryExecutor, Storable,
    StorageError, Update, Value,
};
