//! SQLite storage for the users the batch notifies.
//!
//! ## Tables
//!
//! - `users` - one row per recipient: email (primary key), subscription
//!   status, last login date, purchase count
//!
//! # Migrations
//!
//! Migrations are stored in `crates/mailer/migrations/` and run via:
//! ```bash
//! flagmail migrate
//! ```

pub mod users;

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use thiserror::Error;

use flagmail_core::UserRecord;

pub use users::UserRepository;

/// Errors that can occur while reading users.
#[derive(Debug, Error)]
pub enum UserSourceError {
    /// The store could not be opened or a connection could not be acquired.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The `users` table or one of its expected columns is absent.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A row holds a value outside the data model.
    #[error("data corruption: {0}")]
    DataCorruption(String),
}

impl From<sqlx::Error> for UserSourceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db)
                if db.message().contains("no such table")
                    || db.message().contains("no such column") =>
            {
                Self::SchemaMismatch(db.message().to_string())
            }
            sqlx::Error::ColumnNotFound(column) => {
                Self::SchemaMismatch(format!("missing column {column}"))
            }
            err @ (sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_)) => {
                Self::DataCorruption(err.to_string())
            }
            other => Self::StorageUnavailable(other.to_string()),
        }
    }
}

/// A finite, ordered collection of users.
#[async_trait]
pub trait UserSource: Send + Sync {
    /// Read every user, in storage order.
    ///
    /// # Errors
    ///
    /// Returns `UserSourceError` if the store cannot be read.
    async fn fetch_all(&self) -> Result<Vec<UserRecord>, UserSourceError>;
}

/// Create a SQLite connection pool.
///
/// The pool connects lazily: the database is opened on first use, so a
/// missing or unreadable file surfaces as `StorageUnavailable` from the
/// first query rather than here.
///
/// # Arguments
///
/// * `database_url` - SQLite connection string (wrapped in `SecretString`)
/// * `create_if_missing` - create the database file if it does not exist
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection string is malformed.
pub fn create_pool(
    database_url: &SecretString,
    create_if_missing: bool,
) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url.expose_secret())?
        .create_if_missing(create_if_missing);

    Ok(SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(5))
        .connect_lazy_with(options))
}

/// Create the `users` table if it does not exist.
///
/// # Errors
///
/// Returns `MigrateError` if a migration fails to apply.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
