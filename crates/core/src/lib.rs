//! flagmail core - shared domain types.
//!
//! This crate provides the types that flow through the flagmail pipeline:
//! - `mailer` - storage, decision-service and delivery clients, batch runner
//! - `cli` - the `flagmail` command-line entry point
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no
//! database access, no HTTP clients. The email template lookup lives here
//! because it depends on nothing but the flag value.
//!
//! # Modules
//!
//! - [`types`] - user records, flag decisions, email content and addresses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
