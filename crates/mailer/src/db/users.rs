//! User repository.
//!
//! Queries are built at runtime with `sqlx::query_as` so the crate builds
//! without a database present.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use flagmail_core::{Email, SubscriptionStatus, UserRecord};

use super::{UserSource, UserSourceError};

/// Sample users inserted by `flagmail seed`.
const SAMPLE_USERS: &[(&str, SubscriptionStatus, (i32, u32, u32), u32)] = &[
    ("user1@example.com", SubscriptionStatus::Premium, (2024, 9, 1), 3),
    ("user2@example.com", SubscriptionStatus::Regular, (2024, 8, 15), 1),
    ("user3@example.com", SubscriptionStatus::Premium, (2024, 8, 25), 5),
    ("user4@example.com", SubscriptionStatus::Regular, (2024, 7, 20), 0),
];

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    email: String,
    subscription_status: String,
    last_login_date: NaiveDate,
    purchase_count: i64,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = UserSourceError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            UserSourceError::DataCorruption(format!("invalid email '{}': {e}", row.email))
        })?;
        let subscription_status = row
            .subscription_status
            .parse()
            .map_err(|e| UserSourceError::DataCorruption(format!("user {email}: {e}")))?;
        let purchase_count = u32::try_from(row.purchase_count).map_err(|_| {
            UserSourceError::DataCorruption(format!(
                "user {email}: invalid purchase count {}",
                row.purchase_count
            ))
        })?;

        Ok(Self {
            email,
            subscription_status,
            last_login_date: row.last_login_date,
            purchase_count,
        })
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Reads users from the `users` table.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a user unless one with the same email already exists.
    ///
    /// Returns `true` if a row was inserted.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the insert fails.
    pub async fn insert_if_absent(&self, user: &UserRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO users (email, subscription_status, last_login_date, purchase_count) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(user.email.as_str())
        .bind(user.subscription_status.as_str())
        .bind(user.last_login_date)
        .bind(i64::from(user.purchase_count))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Insert the four sample users. Existing rows are left untouched.
    ///
    /// Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if an insert fails.
    pub async fn seed_samples(&self) -> Result<u64, sqlx::Error> {
        let mut inserted = 0;
        for user in sample_users() {
            if self.insert_if_absent(&user).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

#[async_trait]
impl UserSource for UserRepository {
    #[instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<UserRecord>, UserSourceError> {
        // Held for the duration of the read only; returned to the pool on
        // every exit path when it goes out of scope.
        let mut conn = self.pool.acquire().await?;

        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT email, subscription_status, last_login_date, purchase_count \
             FROM users ORDER BY rowid",
        )
        .fetch_all(&mut *conn)
        .await?;

        drop(conn);
        debug!(count = rows.len(), "Fetched users");

        rows.into_iter().map(UserRecord::try_from).collect()
    }
}

fn sample_users() -> impl Iterator<Item = UserRecord> {
    SAMPLE_USERS
        .iter()
        .filter_map(|&(email, subscription_status, (y, m, d), purchase_count)| {
            Some(UserRecord {
                email: Email::parse(email).ok()?,
                subscription_status,
                last_login_date: NaiveDate::from_ymd_opt(y, m, d)?,
                purchase_count,
            })
        })
}
