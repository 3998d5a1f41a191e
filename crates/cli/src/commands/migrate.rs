//! Database migration command.
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` - SQLite connection string (default: `sqlite://users.db`)
//!
//! The database file is created if it does not exist.

use flagmail::config::DatabaseConfig;
use flagmail::db;

/// Create the `users` table.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or a migration fails.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = DatabaseConfig::from_env();

    tracing::info!("Running migrations...");
    let pool = db::create_pool(&config.url, true)?;
    db::migrate(&pool).await?;
    pool.close().await;

    tracing::info!("Migrations complete!");
    Ok(())
}
