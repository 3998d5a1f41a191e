//! Batch runner: fetch users, evaluate the flag per user, send the matching
//! email.
//!
//! A run walks every user returned by the [`UserSource`] in order. Each user
//! is processed inside its own boundary and ends up as one [`UserOutcome`]
//! in the [`BatchReport`]:
//!
//! - delivery failures never stop the run;
//! - evaluation failures are recorded and skipped under
//!   [`FailurePolicy::Isolate`], or end the run under
//!   [`FailurePolicy::FailFast`];
//! - a storage failure ends the run before any user is processed.
//!
//! Progress is not persisted. Running again starts from the first user and
//! sends every email again.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use flagmail_core::{Email, UserRecord};

use crate::db::{UserSource, UserSourceError};
use crate::services::{DeliveryResult, FlagError, FlagEvaluator, Notifier};

/// What to do when the decision service fails for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and continue with the next user.
    #[default]
    Isolate,
    /// Stop the run at the first failure.
    FailFast,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Isolate => write!(f, "isolate"),
            Self::FailFast => write!(f, "fail-fast"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "fail-fast" | "fail_fast" => Ok(Self::FailFast),
            _ => Err(format!("invalid failure policy: {s} (expected isolate or fail-fast)")),
        }
    }
}

/// Lifecycle of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Idle,
    Running,
    Done,
}

/// Result of processing one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserOutcome {
    /// Flag evaluated and email accepted by the provider.
    Sent { message_id: String, premium: bool },
    /// Flag evaluated but delivery failed.
    DeliverySkipped { premium: bool, reason: String },
    /// The decision service failed; no email was attempted.
    EvaluationFailed { reason: String },
}

/// One line of the batch report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReport {
    pub email: Email,
    pub outcome: UserOutcome,
}

/// Everything that happened during one run, in processing order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub users: Vec<UserReport>,
}

impl BatchReport {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            users: Vec::new(),
        }
    }

    fn record(&mut self, email: Email, outcome: UserOutcome) {
        self.users.push(UserReport { email, outcome });
    }

    /// Users processed (including failures).
    #[must_use]
    pub fn total(&self) -> usize {
        self.users.len()
    }

    /// Users whose email was accepted.
    #[must_use]
    pub fn sent(&self) -> usize {
        self.count(|o| matches!(o, UserOutcome::Sent { .. }))
    }

    /// Users whose delivery failed.
    #[must_use]
    pub fn delivery_skipped(&self) -> usize {
        self.count(|o| matches!(o, UserOutcome::DeliverySkipped { .. }))
    }

    /// Users whose flag could not be evaluated.
    #[must_use]
    pub fn evaluation_failed(&self) -> usize {
        self.count(|o| matches!(o, UserOutcome::EvaluationFailed { .. }))
    }

    /// Whether any user ended without an accepted email.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.sent() != self.total()
    }

    fn count(&self, predicate: impl Fn(&UserOutcome) -> bool) -> usize {
        self.users.iter().filter(|u| predicate(&u.outcome)).count()
    }

    fn log_summary(&self) {
        info!(
            run_id = %self.run_id,
            total = self.total(),
            sent = self.sent(),
            delivery_skipped = self.delivery_skipped(),
            evaluation_failed = self.evaluation_failed(),
            "Batch summary"
        );

        for user in &self.users {
            match &user.outcome {
                UserOutcome::Sent { .. } => {}
                UserOutcome::DeliverySkipped { reason, .. } => {
                    warn!(user = %user.email, %reason, "  delivery skipped");
                }
                UserOutcome::EvaluationFailed { reason } => {
                    warn!(user = %user.email, %reason, "  evaluation failed");
                }
            }
        }
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Users could not be read; nothing was processed.
    #[error("failed to read users: {0}")]
    Storage(#[from] UserSourceError),

    /// Fail-fast policy stopped the run at `user`.
    #[error("batch aborted at {user}: {source}")]
    Aborted {
        user: Email,
        source: FlagError,
        /// Outcomes up to and including the failing user.
        report: Box<BatchReport>,
    },
}

/// Runs the fetch, evaluate, notify pipeline.
///
/// Owns its collaborators for the whole batch; the decision-service client
/// is created once by the caller and released when the runner is dropped.
#[derive(Debug)]
pub struct BatchRunner<S, E, N> {
    source: S,
    evaluator: E,
    notifier: N,
    policy: FailurePolicy,
    state: BatchState,
}

impl<S, E, N> BatchRunner<S, E, N>
where
    S: UserSource,
    E: FlagEvaluator,
    N: Notifier,
{
    /// Create a runner with the default [`FailurePolicy::Isolate`] policy.
    pub fn new(source: S, evaluator: E, notifier: N) -> Self {
        Self {
            source,
            evaluator,
            notifier,
            policy: FailurePolicy::default(),
            state: BatchState::Idle,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn state(&self) -> BatchState {
        self.state
    }

    /// Process every user once.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Storage` if users cannot be read, and
    /// `BatchError::Aborted` if the fail-fast policy stops the run.
    pub async fn run(&mut self) -> Result<BatchReport, BatchError> {
        let run_id = Uuid::new_v4();
        self.state = BatchState::Running;

        let result = self
            .run_users(run_id)
            .instrument(info_span!("batch", %run_id))
            .await;

        self.state = BatchState::Done;
        result
    }

    async fn run_users(&self, run_id: Uuid) -> Result<BatchReport, BatchError> {
        info!(policy = %self.policy, "Batch started");

        let users = self.source.fetch_all().await.inspect_err(|e| {
            error!(error = %e, "Could not read users");
        })?;
        info!(count = users.len(), "Users loaded");

        let mut report = BatchReport::new(run_id);

        for user in users {
            info!(
                user = %user.email,
                subscription_status = %user.subscription_status,
                "Processing user"
            );

            match self.process(&user).await {
                Ok(outcome) => report.record(user.email, outcome),
                Err(e) => {
                    report.record(
                        user.email.clone(),
                        UserOutcome::EvaluationFailed {
                            reason: e.to_string(),
                        },
                    );

                    if self.policy == FailurePolicy::FailFast {
                        error!(user = %user.email, error = %e, "Flag evaluation failed, aborting batch");
                        report.log_summary();
                        return Err(BatchError::Aborted {
                            user: user.email,
                            source: e,
                            report: Box::new(report),
                        });
                    }

                    warn!(user = %user.email, error = %e, "Flag evaluation failed, skipping user");
                }
            }
        }

        report.log_summary();
        Ok(report)
    }

    /// Evaluate and notify one user. Only evaluation can fail.
    async fn process(&self, user: &UserRecord) -> Result<UserOutcome, FlagError> {
        let decision = self
            .evaluator
            .evaluate(&user.email, user.attributes())
            .await?;
        let premium = decision.value;

        let outcome = match self.notifier.send(&user.email, premium).await {
            DeliveryResult::Delivered { message_id } => UserOutcome::Sent {
                message_id,
                premium,
            },
            DeliveryResult::Skipped { reason } => UserOutcome::DeliverySkipped { premium, reason },
        };

        Ok(outcome)
    }
}
