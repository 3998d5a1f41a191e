//! Feature flag decisions.

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Why the decision service resolved a flag the way it did.
///
/// Only `kind` is given a name. Everything else the service sends
/// (`ruleIndex`, `ruleId`, `errorKind`, `inExperiment`, ...) is kept verbatim
/// in `details` and surfaced in logs; nothing in the pipeline branches on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReason {
    /// `OFF`, `FALLTHROUGH`, `TARGET_MATCH`, `RULE_MATCH`,
    /// `PREREQUISITE_FAILED`, `ERROR`, or whatever else the service sends.
    pub kind: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl EvaluationReason {
    /// Reason kind used when the decision falls back to the default value.
    pub const ERROR: &'static str = "ERROR";

    /// An `ERROR` reason carrying the given `errorKind`.
    #[must_use]
    pub fn error(error_kind: &str) -> Self {
        let mut details = Map::new();
        details.insert("errorKind".to_owned(), Value::from(error_kind));
        Self {
            kind: Self::ERROR.to_owned(),
            details,
        }
    }
}

impl fmt::Display for EvaluationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        if !self.details.is_empty() {
            write!(f, " {}", Value::Object(self.details.clone()))?;
        }
        Ok(())
    }
}

/// The resolved value of a boolean flag for one user, with its reason.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlagDecision {
    pub value: bool,
    pub reason: EvaluationReason,
}

impl FlagDecision {
    /// Value used when the service cannot resolve the flag: the
    /// non-premium experience.
    pub const DEFAULT_VALUE: bool = false;

    /// The default decision, tagged with why it was used.
    #[must_use]
    pub fn fail_closed(error_kind: &str) -> Self {
        Self {
            value: Self::DEFAULT_VALUE,
            reason: EvaluationReason::error(error_kind),
        }
    }
}
