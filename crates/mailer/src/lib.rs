//! flagmail - feature-flag driven email batch.
//!
//! Reads users from SQLite, evaluates a LaunchDarkly flag for each of them,
//! and sends one of two emails through Resend depending on the result.
//!
//! # Architecture
//!
//! ```text
//! UserSource ──► BatchRunner ──► FlagEvaluator ──► Notifier
//!  (db::users)     (batch)      (services::flags) (services::email)
//! ```
//!
//! Each stage sits behind a trait so the runner can be driven with fakes.
//! Configuration is loaded once by the caller ([`config::AppConfig`]) and
//! handed to each client's constructor.
//!
//! # Modules
//!
//! - [`config`] - environment configuration
//! - [`db`] - SQLite pool, migrations, user repository
//! - [`services`] - decision-service and delivery clients
//! - [`batch`] - the runner, failure policy and batch report

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod batch;
pub mod config;
pub mod db;
pub mod services;

pub use batch::{BatchError, BatchReport, BatchRunner, BatchState, FailurePolicy, UserOutcome};
pub use config::{AppConfig, ConfigError};
