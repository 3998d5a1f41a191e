//! End-to-end tests for flagmail.
//!
//! Each test gets its own SQLite file in a temporary directory and two
//! `httpmock` servers standing in for the decision service and Resend.
//! Configuration goes through [`AppConfig::from_lookup`], the same path the
//! CLI takes, with the base URLs pointed at the mock servers.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p flagmail-integration-tests
//! ```

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::collections::HashMap;

use chrono::NaiveDate;
use httpmock::MockServer;
use secrecy::SecretString;
use tempfile::TempDir;

use flagmail::AppConfig;
use flagmail::db::{self, UserRepository};
use flagmail_core::{Email, SubscriptionStatus, UserRecord};

/// Sender address used by every test.
pub const FROM_ADDRESS: &str = "Offers <offers@example.com>";

/// A database file plus stubbed external services.
pub struct TestEnv {
    _dir: TempDir,
    database_url: String,
    pub flags: MockServer,
    pub resend: MockServer,
}

impl TestEnv {
    /// Create an empty, migrated database and start both mock servers.
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let database_url = format!("sqlite://{}", dir.path().join("users.db").display());

        let env = Self {
            _dir: dir,
            database_url,
            flags: MockServer::start_async().await,
            resend: MockServer::start_async().await,
        };

        let pool = db::create_pool(&SecretString::from(env.database_url.clone()), true).unwrap();
        db::migrate(&pool).await.unwrap();
        pool.close().await;

        env
    }

    /// Variables the CLI would read from the environment.
    #[must_use]
    pub fn vars(&self) -> HashMap<&'static str, String> {
        HashMap::from([
            ("DATABASE_URL", self.database_url.clone()),
            ("LAUNCHDARKLY_API_KEY", "sdk-8f2d41c7-93ab-4e6f-b1d0-5c7a29e3f846".to_string()),
            ("LAUNCHDARKLY_BASE_URL", self.flags.base_url()),
            ("RESEND_API_KEY", "re_Q7mZ2kLp9XvB4nRt8YwC3sJd".to_string()),
            ("RESEND_BASE_URL", self.resend.base_url()),
            ("RESEND_EMAIL_FROM", FROM_ADDRESS.to_string()),
        ])
    }

    /// Load configuration from [`Self::vars`].
    #[must_use]
    pub fn config(&self) -> AppConfig {
        let vars = self.vars();
        AppConfig::from_lookup(&|key: &str| vars.get(key).cloned()).unwrap()
    }

    /// Insert users in the given order.
    pub async fn insert_users(&self, users: &[(&str, SubscriptionStatus, u32)]) {
        let pool = db::create_pool(&SecretString::from(self.database_url.clone()), false).unwrap();
        let repo = UserRepository::new(pool.clone());
        for &(email, subscription_status, purchase_count) in users {
            let inserted = repo
                .insert_if_absent(&UserRecord {
                    email: Email::parse(email).unwrap(),
                    subscription_status,
                    last_login_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
                    purchase_count,
                })
                .await
                .unwrap();
            assert!(inserted, "{email} already present");
        }
        pool.close().await;
    }
}
