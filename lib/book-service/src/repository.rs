//! The Book service contract and its store-backed implementation.
//!
//! - `BookService`: the five remote operations
//! - `BookRepository<P>`: implements them over any [`ConnectionPool`]

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use crate::model::{
    Book, BookRecord, CreateRequest, CreateResponse, DeleteRequest, DeleteResponse,
    ReadAllRequest, ReadAllResponse, ReadRequest, ReadResponse, UpdateRequest, UpdateResponse,
};
use crate::version::{API_VERSION, check_api};
use crate::{
    CallContext, ConnectionPool, Delete, Order, Query, QueryExecutor, ServiceError, Storable,
    Update,
};

/// Remote operations over the Book catalogue.
///
/// Every operation checks the request's API version first, then does its
/// work on a single store connection that is released before it returns.
/// Failures are always one of the four [`ErrorKind`](crate::ErrorKind)s.
#[async_trait]
pub trait BookService: Send + Sync {
    /// Insert a new book and return the id the store assigned.
    async fn create(
        &self,
        ctx: &CallContext,
        request: CreateRequest,
    ) -> Result<CreateResponse, ServiceError>;

    /// Fetch one book by id.
    ///
    /// Fails with NotFound when no row has the id.
    async fn read(&self, ctx: &CallContext, request: ReadRequest)
    -> Result<ReadResponse, ServiceError>;

    /// Replace every mutable field of the book with `request.book.id`.
    ///
    /// Never inserts; fails with NotFound when no row has the id.
    async fn update(
        &self,
        ctx: &CallContext,
        request: UpdateRequest,
    ) -> Result<UpdateResponse, ServiceError>;

    /// Remove the book with the given id.
    async fn delete(
        &self,
        ctx: &CallContext,
        request: DeleteRequest,
    ) -> Result<DeleteResponse, ServiceError>;

    /// List every book. An empty catalogue yields an empty list.
    async fn read_all(
        &self,
        ctx: &CallContext,
        request: ReadAllRequest,
    ) -> Result<ReadAllResponse, ServiceError>;
}

/// Store-backed [`BookService`].
///
/// Holds nothing but a handle to the shared pool, so clones are cheap and
/// concurrent calls never observe each other except through the store.
#[derive(Debug, Clone)]
pub struct BookRepository<P> {
    pool: P,
}

impl<P: ConnectionPool> BookRepository<P> {
    pub fn new(pool: P) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    async fn connect(&self) -> Result<P::Connection, ServiceError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| ServiceError::storage("failed to connect to database", e))
    }

    async fn insert_book(&self, record: &BookRecord) -> Result<i64, ServiceError> {
        let mut conn = self.connect().await?;
        let executed = conn
            .insert(record)
            .await
            .map_err(|e| ServiceError::storage("failed to insert", e))?;
        executed
            .returned_id()
            .map_err(|e| ServiceError::storage("failed to retrieve id", e))
    }

    async fn select_book(&self, id: i64) -> Result<Book, ServiceError> {
        let mut conn = self.connect().await?;
        let query = Query::<BookRecord>::new().eq(BookRecord::id_column(), id);
        let mut rows = conn
            .fetch(query)
            .await
            .map_err(|e| ServiceError::storage("failed to select", e))?;

        if rows.len() > 1 {
            return Err(ServiceError::unknown(format!(
                "multiple rows with ID='{}'",
                id
            )));
        }
        rows.pop()
            .ok_or_else(|| ServiceError::not_found(format!("cannot find ID='{}'", id)))?
            .into_book()
    }

    async fn update_book(&self, record: BookRecord) -> Result<u64, ServiceError> {
        let id = record.id();
        let mut conn = self.connect().await?;
        let statement = Update::new(record).eq(BookRecord::id_column(), id);
        let executed = conn
            .update(statement)
            .await
            .map_err(|e| ServiceError::storage("failed to update", e))?;
        let rows = executed
            .rows_affected()
            .map_err(|e| ServiceError::storage("failed to retrieve rows affected value", e))?;

        if rows == 0 {
            return Err(ServiceError::not_found(format!("ID='{}' not found", id)));
        }
        Ok(rows)
    }

    async fn delete_book(&self, id: i64) -> Result<u64, ServiceError> {
        let mut conn = self.connect().await?;
        let statement = Delete::<BookRecord>::new().eq(BookRecord::id_column(), id);
        let executed = conn
            .delete(statement)
            .await
            .map_err(|e| ServiceError::storage("failed to delete", e))?;
        let rows = executed
            .rows_affected()
            .map_err(|e| ServiceError::storage("failed to retrieve rows affected value", e))?;

        if rows == 0 {
            return Err(ServiceError::not_found(format!("ID='{}' is not found", id)));
        }
        Ok(rows)
    }

    async fn select_all_books(&self) -> Result<Vec<Book>, ServiceError> {
        let mut conn = self.connect().await?;
        let query = Query::<BookRecord>::new().order_by(BookRecord::id_column(), Order::Asc);
        let rows = conn
            .fetch(query)
            .await
            .map_err(|e| ServiceError::storage("failed to select", e))?;

        rows.into_iter().map(BookRecord::into_book).collect()
    }

    async fn create_book(
        &self,
        ctx: &CallContext,
        request: CreateRequest,
    ) -> Result<CreateResponse, ServiceError> {
        check_api(&request.api)?;
        let record = BookRecord::from_book(&request.book)?;

        let id = ctx.run(self.insert_book(&record)).await?;
        debug!(id, "created book");
        Ok(CreateResponse {
            api: API_VERSION.to_string(),
            id,
        })
    }

    async fn read_book(
        &self,
        ctx: &CallContext,
        request: ReadRequest,
    ) -> Result<ReadResponse, ServiceError> {
        check_api(&request.api)?;

        let book = ctx.run(self.select_book(request.id)).await?;
        Ok(ReadResponse {
            api: API_VERSION.to_string(),
            book,
        })
    }

    async fn replace_book(
        &self,
        ctx: &CallContext,
        request: UpdateRequest,
    ) -> Result<UpdateResponse, ServiceError> {
        check_api(&request.api)?;
        let record = BookRecord::from_book(&request.book)?;

        let rows = ctx.run(self.update_book(record)).await?;
        debug!(rows, "updated book");
        Ok(UpdateResponse {
            api: API_VERSION.to_string(),
            updated: count(rows)?,
        })
    }

    async fn remove_book(
        &self,
        ctx: &CallContext,
        request: DeleteRequest,
    ) -> Result<DeleteResponse, ServiceError> {
        check_api(&request.api)?;

        let rows = ctx.run(self.delete_book(request.id)).await?;
        debug!(rows, "deleted book");
        Ok(DeleteResponse {
            api: API_VERSION.to_string(),
            deleted: count(rows)?,
        })
    }

    async fn list_books(
        &self,
        ctx: &CallContext,
        request: ReadAllRequest,
    ) -> Result<ReadAllResponse, ServiceError> {
        check_api(&request.api)?;

        let books = ctx.run(self.select_all_books()).await?;
        debug!(count = books.len(), "listed books");
        Ok(ReadAllResponse {
            api: API_VERSION.to_string(),
            books,
        })
    }
}

fn count(rows: u64) -> Result<i64, ServiceError> {
    i64::try_from(rows)
        .map_err(|_| ServiceError::unknown(format!("rows affected {} overflows i64", rows)))
}

/// Log a classified failure before it leaves the service.
fn classified<T>(
    operation: &'static str,
    result: Result<T, ServiceError>,
) -> Result<T, ServiceError> {
    if let Err(e) = &result {
        warn!(operation, kind = %e.kind(), error = %e.message(), "request failed");
    }
    result
}

#[async_trait]
impl<P: ConnectionPool> BookService for BookRepository<P> {
    #[instrument(skip_all)]
    async fn create(
        &self,
        ctx: &CallContext,
        request: CreateRequest,
    ) -> Result<CreateResponse, ServiceError> {
        classified("create", self.create_book(ctx, request).await)
    }

    #[instrument(skip_all, fields(id = request.id))]
    async fn read(
        &self,
        ctx: &CallContext,
        request: ReadRequest,
    ) -> Result<ReadResponse, ServiceError> {
        classified("read", self.read_book(ctx, request).await)
    }

    #[instrument(skip_all, fields(id = request.book.id))]
    async fn update(
        &self,
        ctx: &CallContext,
        request: UpdateRequest,
    ) -> Result<UpdateResponse, ServiceError> {
        classified("update", self.replace_book(ctx, request).await)
    }

    #[instrument(skip_all, fields(id = request.id))]
    async fn delete(
        &self,
        ctx: &CallContext,
        request: DeleteRequest,
    ) -> Result<DeleteResponse, ServiceError> {
        classified("delete", self.remove_book(ctx, request).await)
    }

    #[instrument(skip_all)]
    async fn read_all(
        &self,
        ctx: &CallContext,
        request: ReadAllRequest,
    ) -> Result<ReadAllResponse, ServiceError> {
        classified("read_all", self.list_books(ctx, request).await)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::memory::{Fault, MemoryPool};
    use crate::time::{MIN_SECONDS, StorageDatetime, Timestamp};
    use crate::ErrorKind;

    fn publish_date() -> Timestamp {
        // 2002-10-02T10:00:00Z
        Timestamp::new(1_033_552_800, 0)
    }

    fn book() -> Book {
        Book {
            id: 0,
            title: "title".to_string(),
            author: "author".to_string(),
            publisher: "publisher".to_string(),
            publish_date: Some(publish_date()),
            rating: 2.0,
            status: 1,
        }
    }

    fn service() -> (BookRepository<MemoryPool>, MemoryPool) {
        let pool = MemoryPool::new();
        (BookRepository::new(pool.clone()), pool)
    }

    async fn create(service: &BookRepository<MemoryPool>, book: Book) -> i64 {
        service
            .create(
                &CallContext::background(),
                CreateRequest {
                    api: "v1".to_string(),
                    book,
                },
            )
            .await
            .unwrap()
            .id
    }

    async fn read(service: &BookRepository<MemoryPool>, id: i64) -> Result<Book, ServiceError> {
        service
            .read(
                &CallContext::background(),
                ReadRequest {
                    api: "v1".to_string(),
                    id,
                },
            )
            .await
            .map(|response| response.book)
    }

    #[tokio::test]
    async fn create_then_read_returns_the_same_book() {
        let (service, pool) = service();

        let response = service
            .create(
                &CallContext::background(),
                CreateRequest {
                    api: "v1".to_string(),
                    book: book(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            response,
            CreateResponse {
                api: "v1".to_string(),
                id: 1
            }
        );

        let read = service
            .read(
                &CallContext::background(),
                ReadRequest {
                    api: "v1".to_string(),
                    id: 1,
                },
            )
            .await
            .unwrap();
        let mut expected = book();
        expected.id = 1;
        assert_eq!(read.api, "v1");
        assert_eq!(read.book, expected);
        assert_eq!(pool.checked_out(), 0);
    }

    #[tokio::test]
    async fn non_finite_ratings_round_trip_and_keep_the_catalogue_readable() {
        let (service, _pool) = service();
        let ratings = [f64::INFINITY, f64::NEG_INFINITY, f64::NAN];
        let mut ids = Vec::new();
        for rating in ratings {
            let mut input = book();
            input.rating = rating;
            ids.push(create(&service, input).await);
        }

        for (id, rating) in ids.iter().zip(ratings) {
            let stored = read(&service, *id).await.unwrap();
            if rating.is_nan() {
                assert!(stored.rating.is_nan());
            } else {
                assert_eq!(stored.rating, rating);
            }
        }

        let all = service
            .read_all(&CallContext::background(), ReadAllRequest::default())
            .await
            .unwrap();
        assert_eq!(all.books.len(), 3);
        assert_eq!(all.books[0].rating, f64::INFINITY);
        assert_eq!(all.books[1].rating, f64::NEG_INFINITY);
        assert!(all.books[2].rating.is_nan());
    }

    #[tokio::test]
    async fn publish_date_is_stored_to_the_microsecond() {
        let (service, _pool) = service();
        let mut input = book();
        input.publish_date = Some(Timestamp::new(1_033_552_800, 1_500));
        let id = create(&service, input).await;

        let stored = read(&service, id).await.unwrap();
        assert_eq!(
            stored.publish_date,
            Some(Timestamp::new(1_033_552_800, 1_000))
        );
    }

    #[tokio::test]
    async fn create_ignores_a_caller_supplied_id() {
        let (service, _pool) = service();
        let mut input = book();
        input.id = 77;
        assert_eq!(create(&service, input).await, 1);
        assert_eq!(read(&service, 77).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn empty_api_version_is_accepted() {
        let (service, _pool) = service();
        let response = service
            .create(
                &CallContext::background(),
                CreateRequest {
                    api: String::new(),
                    book: book(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.api, API_VERSION);
    }

    #[tokio::test]
    async fn update_replaces_fields_in_place() {
        let (service, _pool) = service();
        let id = create(&service, book()).await;

        let mut changed = read(&service, id).await.unwrap();
        changed.author = format!("{} + updated", changed.author);
        let response = service
            .update(
                &CallContext::background(),
                UpdateRequest {
                    api: "v1".to_string(),
                    book: changed.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(
            response,
            UpdateResponse {
                api: "v1".to_string(),
                updated: 1
            }
        );

        let stored = read(&service, id).await.unwrap();
        assert_eq!(stored.author, "author + updated");
        assert_eq!(stored, changed);
    }

    #[tokio::test]
    async fn update_of_missing_id_is_not_found_and_mutates_nothing() {
        let (service, pool) = service();
        let id = create(&service, book()).await;

        let mut ghost = book();
        ghost.id = 999;
        ghost.title = "ghost".to_string();
        let err = service
            .update(
                &CallContext::background(),
                UpdateRequest {
                    api: "v1".to_string(),
                    book: ghost,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "ID='999' not found");

        let all = service
            .read_all(&CallContext::background(), ReadAllRequest::default())
            .await
            .unwrap();
        assert_eq!(all.books.len(), 1);
        assert_eq!(all.books[0].id, id);
        assert_eq!(all.books[0].title, "title");
        assert_eq!(pool.checked_out(), 0);
    }

    #[tokio::test]
    async fn delete_then_read_is_not_found() {
        let (service, _pool) = service();
        let id = create(&service, book()).await;

        let response = service
            .delete(
                &CallContext::background(),
                DeleteRequest {
                    api: "v1".to_string(),
                    id,
                },
            )
            .await
            .unwrap();
        assert_eq!(
            response,
            DeleteResponse {
                api: "v1".to_string(),
                deleted: 1
            }
        );

        let err = read(&service, id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), format!("cannot find ID='{}'", id));
    }

    #[tokio::test]
    async fn delete_of_missing_id_is_not_found() {
        let (service, _pool) = service();
        let err = service
            .delete(
                &CallContext::background(),
                DeleteRequest {
                    api: "v1".to_string(),
                    id: 12,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.message(), "ID='12' is not found");
    }

    #[tokio::test]
    async fn read_all_on_empty_store_is_an_empty_list() {
        let (service, _pool) = service();
        let response = service
            .read_all(
                &CallContext::background(),
                ReadAllRequest {
                    api: "v1".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.api, "v1");
        assert!(response.books.is_empty());
    }

    #[tokio::test]
    async fn read_all_returns_every_book_with_distinct_ids() {
        let (service, _pool) = service();
        for i in 1..=4 {
            let mut input = book();
            input.title = format!("title{}", i);
            input.author = format!("author{}", i);
            create(&service, input).await;
        }

        let response = service
            .read_all(&CallContext::background(), ReadAllRequest::default())
            .await
            .unwrap();
        let ids: Vec<i64> = response.books.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(response.books[2].title, "title3");
    }

    #[tokio::test]
    async fn unsupported_version_fails_every_operation_without_store_access() {
        let (service, pool) = service();
        // a broken store proves the guard runs first
        pool.inject(Fault::Acquire).await;
        let ctx = CallContext::background();
        let api = "v1bogus".to_string();
        let mut bad_book = book();
        bad_book.publish_date = None;

        let errors = vec![
            service
                .create(&ctx, CreateRequest { api: api.clone(), book: bad_book.clone() })
                .await
                .unwrap_err(),
            service
                .read(&ctx, ReadRequest { api: api.clone(), id: 1 })
                .await
                .unwrap_err(),
            service
                .update(&ctx, UpdateRequest { api: api.clone(), book: bad_book })
                .await
                .unwrap_err(),
            service
                .delete(&ctx, DeleteRequest { api: api.clone(), id: 1 })
                .await
                .unwrap_err(),
            service
                .read_all(&ctx, ReadAllRequest { api: api.clone() })
                .await
                .unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::Unimplemented);
            assert!(err.message().contains("'v1bogus'"));
        }
    }

    #[tokio::test]
    async fn bad_publish_date_is_rejected_before_the_store() {
        let (service, pool) = service();
        pool.inject(Fault::Acquire).await;

        for nanos in [-1, 1_000_000_000] {
            let mut input = book();
            input.publish_date = Some(Timestamp::new(0, nanos));
            let err = service
                .create(
                    &CallContext::background(),
                    CreateRequest {
                        api: "v1".to_string(),
                        book: input.clone(),
                    },
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            assert_eq!(err.field(), Some("publish_date"));

            input.id = 1;
            let err = service
                .update(
                    &CallContext::background(),
                    UpdateRequest {
                        api: "v1".to_string(),
                        book: input,
                    },
                )
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        }
        assert_eq!(pool.checked_out(), 0);
    }

    #[tokio::test]
    async fn duplicate_rows_are_an_integrity_violation() {
        let (service, pool) = service();
        let mut record = BookRecord::from_book(&book()).unwrap();
        record.id = 7;
        pool.seed(&record).await.unwrap();
        pool.seed(&record).await.unwrap();

        let err = read(&service, 7).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.message(), "multiple rows with ID='7'");
        assert_eq!(pool.checked_out(), 0);
    }

    #[tokio::test]
    async fn stored_dates_outside_the_wire_range_are_unknown() {
        let (service, pool) = service();
        let mut record = BookRecord::from_book(&book()).unwrap();
        record.id = 3;
        // year 0000 is storable but has no wire encoding
        let ancient = chrono::DateTime::from_timestamp(MIN_SECONDS - 86_400, 0).unwrap();
        record.publish_date = StorageDatetime::from(ancient);
        pool.seed(&record).await.unwrap();

        let err = read(&service, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.field(), Some("publish_date"));

        let err = service
            .read_all(&CallContext::background(), ReadAllRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[tokio::test]
    async fn store_failures_are_unknown_and_release_the_connection() {
        let (service, pool) = service();
        let id = create(&service, book()).await;

        pool.inject(Fault::Statement).await;
        let err = read(&service, id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.message().starts_with("failed to select"));

        let err = service
            .create(
                &CallContext::background(),
                CreateRequest {
                    api: "v1".to_string(),
                    book: book(),
                },
            )
            .await
            .unwrap_err();
        assert!(err.message().starts_with("failed to insert"));
        assert_eq!(pool.checked_out(), 0);
    }

    #[tokio::test]
    async fn acquire_failure_is_unknown() {
        let (service, pool) = service();
        pool.inject(Fault::Acquire).await;

        let err = read(&service, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.message().starts_with("failed to connect to database"));
    }

    #[tokio::test]
    async fn unreadable_counts_are_distinct_from_statement_failures() {
        let (service, pool) = service();
        let id = create(&service, book()).await;
        pool.inject(Fault::RowsAffected).await;

        let mut changed = book();
        changed.id = id;
        let err = service
            .update(
                &CallContext::background(),
                UpdateRequest {
                    api: "v1".to_string(),
                    book: changed,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.message().starts_with("failed to retrieve rows affected value"));

        let err = service
            .delete(
                &CallContext::background(),
                DeleteRequest {
                    api: "v1".to_string(),
                    id,
                },
            )
            .await
            .unwrap_err();
        assert!(err.message().starts_with("failed to retrieve rows affected value"));
    }

    #[tokio::test]
    async fn missing_returned_id_is_unknown() {
        let (service, pool) = service();
        pool.inject(Fault::ReturnedId).await;
        let err = service
            .create(
                &CallContext::background(),
                CreateRequest {
                    api: "v1".to_string(),
                    book: book(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.message().starts_with("failed to retrieve id"));
    }

    #[tokio::test]
    async fn deadline_abandons_the_store_and_releases_the_connection() {
        let (service, pool) = service();
        pool.inject(Fault::Stall).await;

        let err = service
            .read_all(
                &CallContext::with_timeout(Duration::from_millis(20)),
                ReadAllRequest::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert!(err.message().contains("deadline exceeded"));
        assert_eq!(pool.checked_out(), 0);
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_ids() {
        let (service, pool) = service();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = service.clone();
            handles.push(tokio::spawn(async move { create(&service, book()).await }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 16);
        assert_eq!(pool.checked_out(), 0);
    }
}
