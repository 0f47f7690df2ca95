//! book-client entry point
//!
//! Parses arguments, sets up logging and the store, then hands the
//! command to `commands::run`.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

mod args;
mod commands;
mod logging;

use std::time::Duration;

use anyhow::{Context, Result};
use book_service::BookRepository;
use book_service::memory::MemoryPool;
use book_service_postgres::{PgPool, PoolConfig};
use clap::Parser;
use tracing::info;

use crate::args::Cli;
use crate::commands::Session;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    if cli.json_logs {
        logging::init_logging_json();
    } else {
        logging::init_logging_default();
    }

    let session = Session {
        api: cli.api.clone(),
        timeout: Duration::from_millis(cli.timeout_ms),
    };

    if cli.in_memory {
        info!("using in-process store");
        let service = BookRepository::new(MemoryPool::new());
        return commands::run(&service, &session, cli.command).await;
    }

    let url = cli
        .database_url
        .context("DATABASE_URL is not set; pass --database-url or --in-memory")?;
    let config = PoolConfig::from_lookup(|name| match name {
        "DATABASE_URL" => Some(url.clone()),
        other => std::env::var(other).ok(),
    })
    .context("invalid database configuration")?;

    let pool = PgPool::connect_with(&config)
        .await
        .context("failed to connect to database")?;
    if cli.init_schema {
        pool.ensure_book_table()
            .await
            .context("failed to create book table")?;
    }

    let service = BookRepository::new(pool);
    commands::run(&service, &session, cli.command).await
}
