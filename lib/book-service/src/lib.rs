//! Book Service - the service layer of a versioned Book catalogue.
//!
//! This crate receives structured requests, validates them, turns them into
//! statements against a relational store, and maps every outcome to a
//! response or to one of four error kinds.
//!
//! # Core Concepts
//!
//! - **API version**: every request names the contract version it speaks.
//!   An empty version skips the check; anything else must be [`API_VERSION`].
//! - **Timestamp codec**: wire timestamps (seconds + nanos) are decoded into
//!   [`StorageDatetime`] on the way in and encoded on the way out.
//! - **Connection scope**: each call checks out exactly one connection from
//!   a shared [`ConnectionPool`] and releases it on every exit path.
//!
//! # Traits
//!
//! - [`BookService`]: the five remote operations
//! - [`ConnectionPool`] / [`QueryExecutor`]: the contract a store backend
//!   implements
//! - [`Storable`]: table layout for types an executor can persist

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod context;
mod error;
mod model;
mod query;
mod repository;
mod storable;
pub mod time;
mod version;

#[cfg(any(test, feature = "memory"))]
pub mod memory;

pub use context::CallContext;
pub use error::{ErrorKind, ServiceError, StorageError};
pub use model::{
    float_column, Book, BookRecord, CreateRequest, CreateResponse, DeleteRequest, DeleteResponse,
    ReadAllRequest, ReadAllResponse, ReadRequest, ReadResponse, UpdateRequest, UpdateResponse,
};
pub use query::{
    ConnectionPool, Delete, Executed, Filter, Order, Query, QueryExecutor, Update, Value,
};
pub use repository::{BookRepository, BookService};
pub use storable::Storable;
pub use time::{StorageDatetime, Timestamp};
pub use version::{API_VERSION, check_api};
