//! User records read from storage.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Email, SubscriptionStatus};

/// A read-only snapshot of one row of the `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Primary key and flag-evaluation subject key.
    pub email: Email,
    pub subscription_status: SubscriptionStatus,
    /// Stored but not used by the pipeline.
    pub last_login_date: NaiveDate,
    pub purchase_count: u32,
}

/// The subset of a user's attributes sent to the decision service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttributes {
    pub subscription_status: SubscriptionStatus,
    pub purchase_count: u32,
}

impl UserRecord {
    /// Attributes used to build the evaluation context.
    #[must_use]
    pub const fn attributes(&self) -> UserAttributes {
        UserAttributes {
            subscription_status: self.subscription_status,
            purchase_count: self.purchase_count,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_skip_email_and_login_date() {
        let user = UserRecord {
            email: Email::parse("a@x.com").unwrap(),
            subscription_status: SubscriptionStatus::Premium,
            last_login_date: NaiveDate::from_ymd_opt(2024, 9, 1).unwrap(),
            purchase_count: 3,
        };

        assert_eq!(
            user.attributes(),
            UserAttributes {
                subscription_status: SubscriptionStatus::Premium,
                purchase_count: 3,
            }
        );
    }
}
