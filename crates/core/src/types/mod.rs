//! Domain types for flagmail.

pub mod content;
pub mod email;
pub mod flag;
pub mod status;
pub mod user;

pub use content::EmailContent;
pub use email::{Email, EmailError};
pub use flag::{EvaluationReason, FlagDecision};
pub use status::{SubscriptionStatus, UnknownStatus};
pub use user::{UserAttributes, UserRecord};
