//! The batch run.
//!
//! # Environment Variables
//!
//! See [`flagmail::config`]. `LAUNCHDARKLY_API_KEY`, `RESEND_API_KEY` and
//! `RESEND_EMAIL_FROM` are required.

use tracing::{info, warn};

use flagmail::db::{self, UserRepository};
use flagmail::services::{LaunchDarklyClient, ResendClient};
use flagmail::{AppConfig, BatchRunner, FailurePolicy};

/// Evaluate the flag for every user and send the matching email.
///
/// Per-user failures are reported in the batch summary and do not fail the
/// command; a storage failure or a fail-fast abort does.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the clients cannot be
/// built, users cannot be read, or the fail-fast policy aborts the run.
pub async fn batch(fail_fast: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let policy = if fail_fast {
        FailurePolicy::FailFast
    } else {
        config.failure_policy
    };

    let pool = db::create_pool(&config.database.url, false)?;
    let evaluator = LaunchDarklyClient::new(&config.launchdarkly)?;
    let notifier = ResendClient::new(&config.resend)?;

    info!(flag = %evaluator.flag_key(), %policy, "Starting batch");

    let mut runner = BatchRunner::new(UserRepository::new(pool.clone()), evaluator, notifier)
        .with_policy(policy);
    let result = runner.run().await;
    pool.close().await;

    let report = result?;
    if report.has_failures() {
        warn!(
            failed = report.total() - report.sent(),
            total = report.total(),
            "Batch finished with failures"
        );
    } else {
        info!(total = report.total(), "Batch finished");
    }

    Ok(())
}
