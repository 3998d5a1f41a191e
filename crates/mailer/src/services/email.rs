//! Transactional email delivery via the Resend API.
//!
//! # API Reference
//!
//! - Base URL: `https://api.resend.com`
//! - Authentication: `Authorization: Bearer <key>`
//! - `POST /emails` with `{from, to, subject, html, text}`, answers `{id}`
//!
//! One attempt per call: no retry, no backoff, no idempotency key.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use flagmail_core::{Email, EmailContent};

use crate::config::ResendConfig;

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unauthorized (invalid API key).
    #[error("Unauthorized: invalid API key")]
    Unauthorized,

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The client could not be built from configuration.
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// What happened to one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// The provider accepted the message.
    Delivered {
        /// Provider-assigned message id.
        message_id: String,
    },
    /// Delivery failed; the batch moves on.
    Skipped {
        /// Why the provider did not accept the message.
        reason: String,
    },
}

/// Sends the email matching a flag decision to one user.
///
/// Never fails: delivery problems are reported as [`DeliveryResult::Skipped`].
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &Email, show_premium: bool) -> DeliveryResult;
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Resend API client.
#[derive(Clone)]
pub struct ResendClient {
    client: reqwest::Client,
    endpoint: String,
    from_address: String,
}

impl std::fmt::Debug for ResendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResendClient")
            .field("endpoint", &self.endpoint)
            .field("from_address", &self.from_address)
            .finish_non_exhaustive()
    }
}

impl ResendClient {
    /// Create a new Resend client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is not a valid header value or the HTTP
    /// client fails to build.
    pub fn new(config: &ResendConfig) -> Result<Self, DeliveryError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose_secret()))
            .map_err(|e| DeliveryError::InvalidConfig(format!("Invalid API key format: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/emails", config.base_url),
            from_address: config.from_address.clone(),
        })
    }

    /// Send one email and return the provider's message id.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or Resend rejects the message.
    pub async fn send_email(
        &self,
        to: &Email,
        content: &EmailContent,
    ) -> Result<String, DeliveryError> {
        let request = SendEmailRequest {
            from: &self.from_address,
            to: [to.as_str()],
            subject: content.subject,
            html: content.body_html,
            text: content.body_text,
        };

        let response = self.client.post(&self.endpoint).json(&request).send().await?;

        let status = response.status();
        if status.is_success() {
            let body: SendEmailResponse = response
                .json()
                .await
                .map_err(|e| DeliveryError::Parse(format!("Failed to parse response: {e}")))?;
            return Ok(body.id);
        }

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(DeliveryError::Unauthorized);
        }

        let text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = serde_json::from_str::<ErrorResponse>(&text).map_or(text, |e| e.message);

        Err(DeliveryError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl Notifier for ResendClient {
    #[instrument(skip(self), fields(to = %to))]
    async fn send(&self, to: &Email, show_premium: bool) -> DeliveryResult {
        let content = EmailContent::for_decision(show_premium);

        match self.send_email(to, &content).await {
            Ok(message_id) => {
                info!(subject = %content.subject, message_id = %message_id, "Email sent");
                DeliveryResult::Delivered { message_id }
            }
            Err(e) => {
                warn!(subject = %content.subject, error = %e, "Failed to send email");
                DeliveryResult::Skipped {
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use secrecy::SecretString;
    use serde_json::json;

    use super::*;

    const API_KEY: &str = "re_Q7mZ2kLp9XvB4nRt8YwC3sJd";

    fn client_for(server: &MockServer) -> ResendClient {
        ResendClient::new(&ResendConfig {
            api_key: SecretString::from(API_KEY),
            base_url: server.base_url(),
            from_address: "Offers <offers@example.com>".to_string(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_send_premium() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/emails")
                    .header("authorization", format!("Bearer {API_KEY}"))
                    .json_body(json!({
                        "from": "Offers <offers@example.com>",
                        "to": ["a@x.com"],
                        "subject": EmailContent::PREMIUM.subject,
                        "html": EmailContent::PREMIUM.body_html,
                        "text": EmailContent::PREMIUM.body_text
                    }));
                then.status(200).json_body(json!({"id": "49a3999c-0ce1-4ea6-ab68-afcd6dc2e794"}));
            })
            .await;

        let result = client_for(&server)
            .send(&Email::parse("a@x.com").unwrap(), true)
            .await;

        mock.assert_async().await;
        assert_eq!(
            result,
            DeliveryResult::Delivered {
                message_id: "49a3999c-0ce1-4ea6-ab68-afcd6dc2e794".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_send_standard_uses_standard_subject() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/emails")
                    .json_body_partial(
                        json!({"subject": EmailContent::STANDARD.subject}).to_string(),
                    );
                then.status(200).json_body(json!({"id": "m-2"}));
            })
            .await;

        let result = client_for(&server)
            .send(&Email::parse("b@x.com").unwrap(), false)
            .await;

        mock.assert_async().await;
        assert!(matches!(result, DeliveryResult::Delivered { .. }));
    }

    #[tokio::test]
    async fn test_api_error_is_skipped_not_propagated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/emails");
                then.status(422).json_body(json!({
                    "statusCode": 422,
                    "name": "validation_error",
                    "message": "The `to` field must be a valid email address."
                }));
            })
            .await;

        let result = client_for(&server)
            .send(&Email::parse("a@x.com").unwrap(), true)
            .await;

        assert_eq!(
            result,
            DeliveryResult::Skipped {
                reason: "API error: 422 - The `to` field must be a valid email address."
                    .to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/emails");
                then.status(401);
            })
            .await;

        let err = client_for(&server)
            .send_email(&Email::parse("a@x.com").unwrap(), &EmailContent::STANDARD)
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Unauthorized));
    }

    #[tokio::test]
    async fn test_unparseable_error_body_is_kept() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/emails");
                then.status(500).body("upstream exploded");
            })
            .await;

        let err = client_for(&server)
            .send_email(&Email::parse("a@x.com").unwrap(), &EmailContent::STANDARD)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DeliveryError::Api { status: 500, ref message } if message == "upstream exploded"
        ));
    }

    #[test]
    fn test_debug_hides_key() {
        let client = ResendClient::new(&ResendConfig {
            api_key: SecretString::from(API_KEY),
            base_url: "https://api.resend.com".to_string(),
            from_address: "offers@example.com".to_string(),
        })
        .unwrap();

        assert!(!format!("{client:?}").contains(API_KEY));
    }
}
