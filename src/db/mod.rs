//! Database module for the shared round store.
//!
//! The store is shared with the admin application. This client creates the
//! tables when they are missing but never assumes it is the only writer.

mod history;
mod repository;

pub use history::*;
pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Current version of the shared document contract.
pub const SCHEMA_VERSION: i32 = 1;

/// Open a connection pool on the store named by `database_url` and run migrations.
pub async fn init_database(
    database_url: &str,
    max_connections: u32,
    timeout: Duration,
) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(timeout);

    if let Some(parent) = options.get_filename().parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(timeout)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Create tables if they don't exist.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL DEFAULT 1,
            revision_id INTEGER NOT NULL DEFAULT 0,
            generated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO meta (id, schema_version, revision_id) VALUES (1, ?, 0)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rounds (
            id TEXT PRIMARY KEY,
            round_number INTEGER NOT NULL,
            prompt TEXT NOT NULL,
            character_limit INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            created_at TEXT NOT NULL,
            generated_songs TEXT,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS words (
            id TEXT PRIMARY KEY,
            round_id TEXT NOT NULL REFERENCES rounds(id),
            text TEXT NOT NULL,
            contributor_id TEXT,
            vote_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS word_votes (
            round_id TEXT NOT NULL REFERENCES rounds(id),
            word_id TEXT NOT NULL REFERENCES words(id),
            voter_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (word_id, voter_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS round_votes (
            round_id TEXT NOT NULL REFERENCES rounds(id),
            voter_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (round_id, voter_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_rounds_status ON rounds(status);
        CREATE INDEX IF NOT EXISTS idx_rounds_created_at ON rounds(created_at, id);
        CREATE INDEX IF NOT EXISTS idx_words_round_id ON words(round_id, created_at);
        CREATE INDEX IF NOT EXISTS idx_word_votes_voter ON word_votes(round_id, voter_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
