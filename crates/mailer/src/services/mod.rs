//! Clients for the two external services the batch depends on.
//!
//! - [`flags`] - LaunchDarkly flag evaluation
//! - [`email`] - Resend transactional email

pub mod email;
pub mod flags;

pub use email::{DeliveryError, DeliveryResult, Notifier, ResendClient};
pub use flags::{FlagError, FlagEvaluator, LaunchDarklyClient};
