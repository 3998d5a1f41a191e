//! LaunchDarkly flag evaluation client.
//!
//! Evaluates one flag for one user context per call, using the server-side
//! evaluation endpoint exposed by the LaunchDarkly Relay Proxy:
//!
//! - `REPORT {base}/sdk/evalx/contexts?withReasons=true`
//! - Authentication: `Authorization: <server-side SDK key>`
//! - Body: the evaluation context as JSON
//! - Response: every flag for that context, keyed by flag key
//!
//! The hosted SDK endpoints do not serve this route, so `LAUNCHDARKLY_BASE_URL`
//! must point at a Relay Proxy (default `http://localhost:8030`, its stock
//! listen address).
//!
//! The HTTP client is built once and reused for every user in a batch.

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, instrument, warn};

use flagmail_core::{Email, EvaluationReason, FlagDecision, UserAttributes};

use crate::config::LaunchDarklyConfig;

/// Context kind used for every evaluation.
pub const CONTEXT_KIND: &str = "user";

/// `errorKind` reported when the flag is absent from the response.
const FLAG_NOT_FOUND: &str = "FLAG_NOT_FOUND";

/// `errorKind` reported when the flag is not boolean.
const WRONG_TYPE: &str = "WRONG_TYPE";

/// `errorKind` reported when the flag entry has no usable `value`.
const MALFORMED_FLAG: &str = "MALFORMED_FLAG";

/// Errors that can occur when evaluating a flag.
#[derive(Debug, Error)]
pub enum FlagError {
    /// The service could not be contacted or failed on its side.
    #[error("evaluation service unreachable: {0}")]
    EvaluationServiceUnreachable(String),

    /// The SDK key was rejected.
    #[error("Unauthorized: invalid SDK key")]
    Unauthorized,

    /// The service rejected the request.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The client could not be built from configuration.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// Resolves a boolean flag for one user.
#[async_trait]
pub trait FlagEvaluator: Send + Sync {
    /// Evaluate the flag for `subject_key` with the given attributes.
    ///
    /// # Errors
    ///
    /// Returns `FlagError` if the decision service cannot be used. A flag
    /// the service does not know resolves to the default decision instead.
    async fn evaluate(
        &self,
        subject_key: &Email,
        attributes: UserAttributes,
    ) -> Result<FlagDecision, FlagError>;
}

/// The evaluation context sent to the decision service.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EvaluationContext<'a> {
    pub kind: &'static str,
    pub key: &'a str,
    pub email: &'a str,
    pub subscription_status: &'static str,
    pub purchase_count: u32,
}

impl<'a> EvaluationContext<'a> {
    #[must_use]
    pub fn new(subject_key: &'a Email, attributes: UserAttributes) -> Self {
        Self {
            kind: CONTEXT_KIND,
            key: subject_key.as_str(),
            email: subject_key.as_str(),
            subscription_status: attributes.subscription_status.as_str(),
            purchase_count: attributes.purchase_count,
        }
    }
}

/// One entry of the evaluation response. Only the configured flag's entry
/// is ever decoded. The reason is decoded on its own so an unreadable
/// reason does not discard the value.
#[derive(Debug, Deserialize)]
struct FlagDetail {
    value: Value,
    #[serde(default)]
    reason: Option<Value>,
}

/// LaunchDarkly evaluation client.
#[derive(Clone)]
pub struct LaunchDarklyClient {
    client: reqwest::Client,
    report: Method,
    endpoint: String,
    flag_key: String,
}

impl std::fmt::Debug for LaunchDarklyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchDarklyClient")
            .field("endpoint", &self.endpoint)
            .field("flag_key", &self.flag_key)
            .finish_non_exhaustive()
    }
}

impl LaunchDarklyClient {
    /// Create a new evaluation client.
    ///
    /// # Errors
    ///
    /// Returns error if the SDK key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &LaunchDarklyConfig) -> Result<Self, FlagError> {
        let mut auth = HeaderValue::from_str(config.sdk_key.expose_secret())
            .map_err(|e| FlagError::InvalidConfig(format!("Invalid SDK key format: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| FlagError::InvalidConfig(e.to_string()))?;

        let report = Method::from_bytes(b"REPORT")
            .map_err(|e| FlagError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            report,
            endpoint: format!("{}/sdk/evalx/contexts?withReasons=true", config.base_url),
            flag_key: config.flag_key.clone(),
        })
    }

    /// The flag this client evaluates.
    #[must_use]
    pub fn flag_key(&self) -> &str {
        &self.flag_key
    }

    /// Fetch every flag for a context.
    async fn fetch_flags(
        &self,
        context: &EvaluationContext<'_>,
    ) -> Result<Map<String, Value>, FlagError> {
        let response = self
            .client
            .request(self.report.clone(), &self.endpoint)
            .json(context)
            .send()
            .await
            .map_err(|e| FlagError::EvaluationServiceUnreachable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| FlagError::Parse(format!("Failed to parse response: {e}")));
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(FlagError::Unauthorized);
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if status.is_server_error() {
            return Err(FlagError::EvaluationServiceUnreachable(format!(
                "{status}: {message}"
            )));
        }

        Err(FlagError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Turn the response entry for our flag into a decision, failing closed.
    fn decide(&self, entry: Option<Value>) -> FlagDecision {
        let Some(entry) = entry else {
            warn!(flag = %self.flag_key, "Flag not found, using default value");
            return FlagDecision::fail_closed(FLAG_NOT_FOUND);
        };

        let detail = match serde_json::from_value::<FlagDetail>(entry) {
            Ok(detail) => detail,
            Err(e) => {
                warn!(flag = %self.flag_key, error = %e, "Flag entry is malformed, using default value");
                return FlagDecision::fail_closed(MALFORMED_FLAG);
            }
        };

        let Value::Bool(value) = detail.value else {
            warn!(flag = %self.flag_key, value = %detail.value, "Flag is not boolean, using default value");
            return FlagDecision::fail_closed(WRONG_TYPE);
        };

        FlagDecision {
            value,
            reason: detail
                .reason
                .and_then(|reason| serde_json::from_value(reason).ok())
                .unwrap_or_else(|| EvaluationReason {
                    kind: "UNKNOWN".to_string(),
                    details: Map::new(),
                }),
        }
    }
}

#[async_trait]
impl FlagEvaluator for LaunchDarklyClient {
    #[instrument(skip(self, attributes), fields(user = %subject_key, flag = %self.flag_key))]
    async fn evaluate(
        &self,
        subject_key: &Email,
        attributes: UserAttributes,
    ) -> Result<FlagDecision, FlagError> {
        let context = EvaluationContext::new(subject_key, attributes);
        let mut flags = self.fetch_flags(&context).await?;
        let decision = self.decide(flags.remove(&self.flag_key));

        info!(
            value = decision.value,
            reason = %decision.reason,
            "Feature flag evaluated"
        );

        Ok(decision)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use httpmock::MockServer;
    use secrecy::SecretString;
    use serde_json::json;

    use flagmail_core::SubscriptionStatus;

    use super::*;

    const SDK_KEY: &str = "sdk-4f9c2a17-8b3e-4d6a-9e21-7c5b0f3d8a64";

    fn client_for(server: &MockServer) -> LaunchDarklyClient {
        LaunchDarklyClient::new(&LaunchDarklyConfig {
            sdk_key: SecretString::from(SDK_KEY),
            base_url: server.base_url(),
            flag_key: "premium-content".to_string(),
        })
        .unwrap()
    }

    fn premium_attributes() -> UserAttributes {
        UserAttributes {
            subscription_status: SubscriptionStatus::Premium,
            purchase_count: 3,
        }
    }

    #[test]
    fn test_context_shape() {
        let email = Email::parse("a@x.com").unwrap();
        let context = EvaluationContext::new(&email, premium_attributes());

        assert_eq!(
            serde_json::to_value(&context).unwrap(),
            json!({
                "kind": "user",
                "key": "a@x.com",
                "email": "a@x.com",
                "subscription_status": "premium",
                "purchase_count": 3
            })
        );
    }

    #[tokio::test]
    async fn test_evaluate_returns_value_and_reason() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.path("/sdk/evalx/contexts")
                    .query_param("withReasons", "true")
                    .header("authorization", SDK_KEY)
                    .json_body(json!({
                        "kind": "user",
                        "key": "a@x.com",
                        "email": "a@x.com",
                        "subscription_status": "premium",
                        "purchase_count": 3
                    }));
                then.status(200).json_body(json!({
                    "premium-content": {
                        "value": true,
                        "variation": 0,
                        "version": 7,
                        "reason": {"kind": "RULE_MATCH", "ruleIndex": 0, "ruleId": "premium"}
                    },
                    "other-flag": {"value": "blue", "variation": 1, "version": 2}
                }));
            })
            .await;

        let decision = client_for(&server)
            .evaluate(&Email::parse("a@x.com").unwrap(), premium_attributes())
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(decision.value);
        assert_eq!(decision.reason.kind, "RULE_MATCH");
        assert_eq!(decision.reason.details["ruleId"], "premium");
    }

    #[tokio::test]
    async fn test_missing_flag_fails_closed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/sdk/evalx/contexts");
                then.status(200).json_body(json!({}));
            })
            .await;

        let decision = client_for(&server)
            .evaluate(&Email::parse("a@x.com").unwrap(), premium_attributes())
            .await
            .unwrap();

        assert!(!decision.value);
        assert_eq!(decision.reason, EvaluationReason::error("FLAG_NOT_FOUND"));
    }

    #[tokio::test]
    async fn test_non_boolean_flag_fails_closed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/sdk/evalx/contexts");
                then.status(200).json_body(json!({
                    "premium-content": {"value": "yes", "reason": {"kind": "FALLTHROUGH"}}
                }));
            })
            .await;

        let decision = client_for(&server)
            .evaluate(&Email::parse("a@x.com").unwrap(), premium_attributes())
            .await
            .unwrap();

        assert!(!decision.value);
        assert_eq!(decision.reason, EvaluationReason::error("WRONG_TYPE"));
    }

    #[tokio::test]
    async fn test_unrelated_malformed_flag_is_ignored() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/sdk/evalx/contexts");
                then.status(200).json_body(json!({
                    "premium-content": {"value": true, "reason": {"kind": "FALLTHROUGH"}},
                    "other-flag": {"variation": 1, "version": 2},
                    "legacy-flag": {"value": false, "reason": "OFF"}
                }));
            })
            .await;

        let decision = client_for(&server)
            .evaluate(&Email::parse("a@x.com").unwrap(), premium_attributes())
            .await
            .unwrap();

        assert!(decision.value);
        assert_eq!(decision.reason.kind, "FALLTHROUGH");
    }

    #[tokio::test]
    async fn test_malformed_entry_fails_closed() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/sdk/evalx/contexts");
                then.status(200)
                    .json_body(json!({"premium-content": {"variation": 0, "version": 3}}));
            })
            .await;

        let decision = client_for(&server)
            .evaluate(&Email::parse("a@x.com").unwrap(), premium_attributes())
            .await
            .unwrap();

        assert!(!decision.value);
        assert_eq!(decision.reason, EvaluationReason::error("MALFORMED_FLAG"));
    }

    #[tokio::test]
    async fn test_unreadable_reason_keeps_value() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/sdk/evalx/contexts");
                then.status(200)
                    .json_body(json!({"premium-content": {"value": true, "reason": {"ruleId": "r1"}}}));
            })
            .await;

        let decision = client_for(&server)
            .evaluate(&Email::parse("a@x.com").unwrap(), premium_attributes())
            .await
            .unwrap();

        assert!(decision.value);
        assert_eq!(decision.reason.kind, "UNKNOWN");
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/sdk/evalx/contexts");
                then.status(401);
            })
            .await;

        let err = client_for(&server)
            .evaluate(&Email::parse("a@x.com").unwrap(), premium_attributes())
            .await
            .unwrap_err();

        assert!(matches!(err, FlagError::Unauthorized));
    }

    #[tokio::test]
    async fn test_server_error_is_unreachable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.path("/sdk/evalx/contexts");
                then.status(503).body("maintenance");
            })
            .await;

        let err = client_for(&server)
            .evaluate(&Email::parse("a@x.com").unwrap(), premium_attributes())
            .await
            .unwrap_err();

        assert!(
            matches!(err, FlagError::EvaluationServiceUnreachable(ref msg) if msg.contains("maintenance"))
        );
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let client = LaunchDarklyClient::new(&LaunchDarklyConfig {
            sdk_key: SecretString::from(SDK_KEY),
            base_url: "http://127.0.0.1:1".to_string(),
            flag_key: "premium-content".to_string(),
        })
        .unwrap();

        let err = client
            .evaluate(&Email::parse("a@x.com").unwrap(), premium_attributes())
            .await
            .unwrap_err();

        assert!(matches!(err, FlagError::EvaluationServiceUnreachable(_)));
    }

    #[test]
    fn test_debug_hides_key() {
        let client = LaunchDarklyClient::new(&LaunchDarklyConfig {
            sdk_key: SecretString::from(SDK_KEY),
            base_url: "http://localhost:8030".to_string(),
            flag_key: "premium-content".to_string(),
        })
        .unwrap();

        let debug_output = format!("{client:?}");
        assert!(debug_output.contains("premium-content"));
        assert!(!debug_output.contains(SDK_KEY));
    }
}
