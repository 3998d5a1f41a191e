//! Seed the database with sample users.
//!
//! Runs migrations first, then inserts four sample users. Users that already
//! exist are left untouched, so the command can be repeated.

use tracing::info;

use flagmail::config::DatabaseConfig;
use flagmail::db::{self, UserRepository};

/// Create the `users` table and insert the sample users.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, a migration fails, or
/// an insert fails.
pub async fn sample_users() -> Result<(), Box<dyn std::error::Error>> {
    let config = DatabaseConfig::from_env();

    let pool = db::create_pool(&config.url, true)?;
    db::migrate(&pool).await?;
    info!("Database schema ready");

    let inserted = UserRepository::new(pool.clone()).seed_samples().await?;
    pool.close().await;

    info!(inserted, "Database setup complete with sample users");
    Ok(())
}
