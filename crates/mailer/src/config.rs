//! Configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required (batch run)
//! - `LAUNCHDARKLY_API_KEY` - server-side SDK key for flag evaluation
//! - `RESEND_API_KEY` - Resend API key
//! - `RESEND_EMAIL_FROM` - verified sender address (From header)
//!
//! ## Optional
//! - `DATABASE_URL` - SQLite connection string (default: `sqlite://users.db`)
//! - `FEATURE_FLAG_KEY` - flag evaluated per user (default: `premium-content`)
//! - `LAUNCHDARKLY_BASE_URL` - Relay Proxy serving the evaluation endpoint (default: `http://localhost:8030`)
//! - `RESEND_BASE_URL` - Resend API host (default: `https://api.resend.com`)
//! - `BATCH_FAILURE_POLICY` - `isolate` or `fail-fast` (default: `isolate`)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `LOG_FORMAT` - `json` for JSON log lines, anything else for text
//!
//! Every loader has a `from_lookup` variant that takes the variable source
//! as a function, so tests never touch the process environment.

use std::collections::HashMap;
use std::str::FromStr;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::batch::FailurePolicy;

const DEFAULT_DATABASE_URL: &str = "sqlite://users.db";
const DEFAULT_FLAG_KEY: &str = "premium-content";
const DEFAULT_LAUNCHDARKLY_BASE_URL: &str = "http://localhost:8030";
const DEFAULT_RESEND_BASE_URL: &str = "https://api.resend.com";
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "your_",
    "changeme",
    "replace",
    "placeholder",
    "xxx",
    "todo",
    "insert",
    "put-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Everything a batch run needs, built once at process start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub launchdarkly: LaunchDarklyConfig,
    pub resend: ResendConfig,
    pub failure_policy: FailurePolicy,
}

/// Storage location.
#[derive(Clone)]
pub struct DatabaseConfig {
    /// SQLite connection string (may embed a path the operator considers private)
    pub url: SecretString,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &"[REDACTED]")
            .finish()
    }
}

/// Decision service configuration.
///
/// Implements `Debug` manually to redact the SDK key.
#[derive(Clone)]
pub struct LaunchDarklyConfig {
    /// Server-side SDK key
    pub sdk_key: SecretString,
    /// Host serving the evaluation endpoint, without trailing slash
    pub base_url: String,
    /// Flag evaluated for every user
    pub flag_key: String,
}

impl std::fmt::Debug for LaunchDarklyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchDarklyConfig")
            .field("sdk_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("flag_key", &self.flag_key)
            .finish()
    }
}

/// Delivery service configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct ResendConfig {
    /// Resend API key
    pub api_key: SecretString,
    /// Host serving the Resend API, without trailing slash
    pub base_url: String,
    /// Verified sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for ResendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendConfig")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("from_address", &self.from_address)
            .finish()
    }
}

/// Logging and error tracking settings, needed before anything else runs.
#[derive(Debug, Clone, Default)]
pub struct TelemetryConfig {
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "production")
    pub sentry_environment: Option<String>,
    /// Emit JSON log lines instead of human-readable text
    pub json_logs: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let failure_policy = match lookup("BATCH_FAILURE_POLICY") {
            Some(value) => FailurePolicy::from_str(&value)
                .map_err(|e| ConfigError::InvalidEnvVar("BATCH_FAILURE_POLICY".to_string(), e))?,
            None => FailurePolicy::default(),
        };

        Ok(Self {
            database: DatabaseConfig::from_lookup(lookup),
            launchdarkly: LaunchDarklyConfig::from_lookup(lookup)?,
            resend: ResendConfig::from_lookup(lookup)?,
            failure_policy,
        })
    }
}

impl DatabaseConfig {
    /// Load the database location, for commands that need nothing else.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Load the database location from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            url: SecretString::from(get_or_default(lookup, "DATABASE_URL", DEFAULT_DATABASE_URL)),
        }
    }
}

impl LaunchDarklyConfig {
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            sdk_key: get_checked_secret(lookup, "LAUNCHDARKLY_API_KEY")?,
            base_url: get_base_url(lookup, "LAUNCHDARKLY_BASE_URL", DEFAULT_LAUNCHDARKLY_BASE_URL)?,
            flag_key: get_or_default(lookup, "FEATURE_FLAG_KEY", DEFAULT_FLAG_KEY),
        })
    }
}

impl ResendConfig {
    fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: get_checked_secret(lookup, "RESEND_API_KEY")?,
            base_url: get_base_url(lookup, "RESEND_BASE_URL", DEFAULT_RESEND_BASE_URL)?,
            from_address: get_required(lookup, "RESEND_EMAIL_FROM")?,
        })
    }
}

impl TelemetryConfig {
    /// Load telemetry settings from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    /// Load telemetry settings from an arbitrary variable source.
    #[must_use]
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Self {
        Self {
            sentry_dsn: get_optional(lookup, "SENTRY_DSN"),
            sentry_environment: get_optional(lookup, "SENTRY_ENVIRONMENT"),
            json_logs: get_optional(lookup, "LOG_FORMAT")
                .is_some_and(|format| format.eq_ignore_ascii_case("json")),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required, non-empty variable.
fn get_required(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    get_optional(lookup, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional variable; empty values count as unset.
fn get_optional(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|value| !value.trim().is_empty())
}

/// Get a variable with a default value.
fn get_or_default(lookup: &dyn Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    get_optional(lookup, key).unwrap_or_else(|| default.to_string())
}

/// Get an HTTP(S) base URL, normalised without a trailing slash.
fn get_base_url(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let raw = get_or_default(lookup, key, default);
    let url =
        Url::parse(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Get a required secret, warning if it looks like a placeholder.
fn get_checked_secret(
    lookup: &dyn Fn(&str) -> Option<String>,
    key: &str,
) -> Result<SecretString, ConfigError> {
    let value = get_required(lookup, key)?;
    if let Err(reason) = check_secret_strength(&value) {
        tracing::warn!("{key} validation warning: {reason}");
    }
    Ok(SecretString::from(value))
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Check that an API key is not a placeholder and has plausible entropy.
fn check_secret_strength(secret: &str) -> Result<(), String> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(**p)) {
        return Err(format!("appears to be a placeholder (contains '{pattern}')"));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(format!(
            "entropy too low ({entropy:.2} bits/char, expected >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
        ));
    }

    Ok(())
}
