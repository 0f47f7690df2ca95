//! Command dispatch.

use std::time::Duration;

use anyhow::{Context, Result};
use book_service::time::{self, StorageDatetime};
use book_service::{
    Book, BookService, CallContext, CreateRequest, DeleteRequest, ReadAllRequest, ReadRequest,
    Timestamp, UpdateRequest,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::args::{BookArgs, Command};

/// Options shared by every command.
#[derive(Debug, Clone)]
pub struct Session {
    pub api: String,
    pub timeout: Duration,
}

impl Session {
    fn context(&self) -> CallContext {
        CallContext::with_timeout(self.timeout)
    }
}

pub async fn run<S: BookService>(service: &S, session: &Session, command: Command) -> Result<()> {
    match command {
        Command::Demo => demo(service, session).await.map(|_| ()),
        Command::Create(args) => {
            let response = service
                .create(
                    &session.context(),
                    CreateRequest {
                        api: session.api.clone(),
                        book: args.into_book(0)?,
                    },
                )
                .await?;
            print_json(&response)
        }
        Command::Read { id } => {
            let response = service
                .read(
                    &session.context(),
                    ReadRequest {
                        api: session.api.clone(),
                        id,
                    },
                )
                .await?;
            print_json(&response)
        }
        Command::Update { id, book } => {
            let response = service
                .update(
                    &session.context(),
                    UpdateRequest {
                        api: session.api.clone(),
                        book: book.into_book(id)?,
                    },
                )
                .await?;
            print_json(&response)
        }
        Command::Delete { id } => {
            let response = service
                .delete(
                    &session.context(),
                    DeleteRequest {
                        api: session.api.clone(),
                        id,
                    },
                )
                .await?;
            print_json(&response)
        }
        Command::ReadAll => {
            let response = service
                .read_all(
                    &session.context(),
                    ReadAllRequest {
                        api: session.api.clone(),
                    },
                )
                .await?;
            print_json(&response)
        }
    }
}

/// Create -> Read -> Update -> ReadAll -> Delete under one deadline.
///
/// Returns the id of the book it created and removed.
pub async fn demo<S: BookService>(service: &S, session: &Session) -> Result<i64> {
    let ctx = session.context();
    let api = session.api.clone();

    let sample = Book {
        id: 0,
        title: "title".to_string(),
        author: "author".to_string(),
        publisher: "publisher".to_string(),
        publish_date: Some(wire_timestamp(now())?),
        rating: 5.0,
        status: 1,
    };

    let created = service
        .create(
            &ctx,
            CreateRequest {
                api: api.clone(),
                book: sample,
            },
        )
        .await
        .context("create failed")?;
    info!(response = %to_json(&created)?, "create result");
    let id = created.id;

    let read = service
        .read(&ctx, ReadRequest { api: api.clone(), id })
        .await
        .context("read failed")?;
    info!(response = %to_json(&read)?, "read result");

    let mut book = read.book;
    book.author = format!("{} + updated", book.author);
    let updated = service
        .update(
            &ctx,
            UpdateRequest {
                api: api.clone(),
                book,
            },
        )
        .await
        .context("update failed")?;
    info!(response = %to_json(&updated)?, "update result");

    let all = service
        .read_all(&ctx, ReadAllRequest { api: api.clone() })
        .await
        .context("read all failed")?;
    info!(response = %to_json(&all)?, "read all result");

    let deleted = service
        .delete(&ctx, DeleteRequest { api, id })
        .await
        .context("delete failed")?;
    info!(response = %to_json(&deleted)?, "delete result");

    Ok(id)
}

impl BookArgs {
    fn into_book(self, id: i64) -> Result<Book> {
        let publish_date = match self.publish_date {
            Some(s) => DateTime::parse_from_rfc3339(&s)
                .with_context(|| format!("invalid --publish-date '{}'", s))?
                .with_timezone(&Utc),
            None => now(),
        };
        Ok(Book {
            id,
            title: self.title,
            author: self.author,
            publisher: self.publisher,
            publish_date: Some(wire_timestamp(publish_date)?),
            rating: self.rating,
            status: self.status,
        })
    }
}

fn now() -> DateTime<Utc> {
    StorageDatetime::now().0
}

fn wire_timestamp(dt: DateTime<Utc>) -> Result<Timestamp> {
    Ok(time::encode(&StorageDatetime::from(dt))?)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
