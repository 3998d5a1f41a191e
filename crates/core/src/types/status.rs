//! Subscription status of a user.

use serde::{Deserialize, Serialize};

/// Returned when a stored status string is neither `premium` nor `regular`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown subscription status: {0}")]
pub struct UnknownStatus(pub String);

/// Subscription tier stored with each user.
///
/// Stored and sent to the decision service in its lowercase form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Premium,
    Regular,
}

impl SubscriptionStatus {
    /// The lowercase string used in storage and evaluation contexts.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Premium => "premium",
            Self::Regular => "regular",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "premium" => Ok(Self::Premium),
            "regular" => Ok(Self::Regular),
            _ => Err(UnknownStatus(s.to_owned())),
        }
    }
}
