//! flagmail CLI - run the notification batch and manage its database.
//!
//! # Usage
//!
//! ```bash
//! # Create the users table
//! flagmail migrate
//!
//! # Insert the sample users
//! flagmail seed
//!
//! # Evaluate the flag for every user and send the matching email
//! flagmail run
//!
//! # Stop at the first flag evaluation failure
//! flagmail run --fail-fast
//! ```
//!
//! # Commands
//!
//! - `run` - Run the batch
//! - `migrate` - Create the `users` table
//! - `seed` - Create the table and insert sample users

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flagmail::config::TelemetryConfig;

mod commands;

#[derive(Parser)]
#[command(name = "flagmail")]
#[command(author, version, about = "Feature-flag driven email batch")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate the feature flag for every user and send the matching email
    Run {
        /// Abort the run at the first flag evaluation failure
        #[arg(long)]
        fail_fast: bool,
    },
    /// Create the users table
    Migrate,
    /// Create the users table and insert sample users
    Seed,
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &TelemetryConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR => sentry_tracing::EventFilter::Event,
        tracing::Level::WARN | tracing::Level::INFO => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(config: &TelemetryConfig) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "flagmail=info,flagmail_cli=info".into());

    let json_layer = config
        .json_logs
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!config.json_logs).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let telemetry = TelemetryConfig::from_env();

    // Sentry must be initialized before the tracing subscriber
    let sentry_guard = init_sentry(&telemetry);
    init_tracing(&telemetry);

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        // Flush Sentry before exiting; `exit` skips destructors.
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Run { fail_fast } => commands::run::batch(fail_fast).await?,
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed => commands::seed::sample_users().await?,
    }
    Ok(())
}
