//! CLI argument definitions using clap
//!
//! Commands:
//! - book-client demo
//! - book-client create --title <t> --author <a> ...
//! - book-client read --id <id>
//! - book-client update --id <id> --title <t> ...
//! - book-client delete --id <id>
//! - book-client read-all

use clap::{Args, Parser, Subcommand};

/// Drive the Book service against PostgreSQL or an in-process store
#[derive(Parser, Debug)]
#[command(name = "book-client")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// Use the in-process store instead of PostgreSQL
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Create the book table if it does not exist
    #[arg(long, global = true)]
    pub init_schema: bool,

    /// Per-call deadline in milliseconds
    #[arg(long, default_value_t = 3000, global = true)]
    pub timeout_ms: u64,

    /// API version sent with every request
    #[arg(long, default_value = book_service::API_VERSION, global = true)]
    pub api: String,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, read, update, list and delete one book
    Demo,

    /// Insert a new book and print its id
    Create(BookArgs),

    /// Print one book
    Read {
        #[arg(long)]
        id: i64,
    },

    /// Replace every field of an existing book
    Update {
        #[arg(long)]
        id: i64,

        #[command(flatten)]
        book: BookArgs,
    },

    /// Remove one book
    Delete {
        #[arg(long)]
        id: i64,
    },

    /// Print every book
    ReadAll,
}

#[derive(Args, Debug, Clone)]
pub struct BookArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long)]
    pub author: String,

    #[arg(long, default_value = "")]
    pub publisher: String,

    /// RFC 3339 publish date; defaults to now
    #[arg(long)]
    pub publish_date: Option<String>,

    #[arg(long, default_value_t = 0.0)]
    pub rating: f64,

    #[arg(long, default_value_t = 0)]
    pub status: i32,
}
