//! Notifier backends.
//!
//! - [`HttpEmailNotifier`] posts to a JSON email relay
//! - [`LogNotifier`] only logs the message, for dry runs

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::Notifier;
use crate::config::EmailConfig;
use crate::error::NotifyError;

/// Request structure accepted by the relay.
#[derive(Debug, Serialize)]
struct ApiSendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
}

/// Response returned by the relay on acceptance.
#[derive(Debug, Deserialize)]
struct ApiSendResponse {
    #[serde(alias = "messageId", alias = "MessageId", alias = "id")]
    message_id: String,
}

/// Error payload returned by the relay.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(alias = "error")]
    message: String,
}

/// Sends email through an HTTP relay.
pub struct HttpEmailNotifier {
    /// HTTP client for making API requests.
    http_client: Client,
    /// Relay endpoint.
    endpoint: String,
    /// Optional bearer token.
    api_key: Option<String>,
    /// Sender address.
    from_address: String,
}

impl HttpEmailNotifier {
    /// Creates a notifier for an explicit endpoint.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        from_address: impl Into<String>,
    ) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoint: endpoint.into(),
            api_key,
            from_address: from_address.into(),
        }
    }

    /// Creates a notifier from configuration, if an endpoint is configured.
    pub fn from_config(config: &EmailConfig) -> Option<Self> {
        config.endpoint.as_ref().map(|endpoint| {
            Self::new(
                endpoint.clone(),
                config.api_key.clone(),
                config.from_address.clone(),
            )
        })
    }

    /// Returns the sender address.
    pub fn from_address(&self) -> &str {
        &self.from_address
    }
}

#[async_trait]
impl Notifier for HttpEmailNotifier {
    async fn send(
        &self,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, NotifyError> {
        let payload = ApiSendRequest {
            from: &self.from_address,
            to: vec![destination],
            subject,
            text: body,
        };

        let mut request = self
            .http_client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&payload);

        if let Some(ref api_key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&text)
                .map(|e| e.message)
                .unwrap_or(text);
            return Err(NotifyError::Rejected {
                code: status.as_u16(),
                message,
            });
        }

        // Any 2xx is a delivery, whatever the body says.
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiSendResponse>(&text) {
            Ok(accepted) => Ok(accepted.message_id),
            Err(e) => {
                let message_id = format!("accepted-{}", Uuid::new_v4());
                warn!(
                    status = status.as_u16(),
                    message_id = %message_id,
                    error = %e,
                    "Relay accepted email without a message id"
                );
                Ok(message_id)
            }
        }
    }
}

/// Notifier that writes messages to the log instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(
        &self,
        destination: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, NotifyError> {
        let message_id = format!("dry-run-{}", Uuid::new_v4());
        info!(
            message_id = %message_id,
            destination = %destination,
            subject = %subject,
            "Dry run, email not sent\n{}",
            body
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_shape() {
        let payload = ApiSendRequest {
            from: "concierge@example.com",
            to: vec!["a@b.com"],
            subject: "Your Chinese Restaurant Recommendations",
            text: "Hello!",
        };
        let value = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(value["from"], "concierge@example.com");
        assert_eq!(value["to"][0], "a@b.com");
        assert_eq!(value["text"], "Hello!");
    }

    #[test]
    fn test_send_response_aliases() {
        for body in [
            r#"{"messageId": "m-1"}"#,
            r#"{"MessageId": "m-1"}"#,
            r#"{"id": "m-1"}"#,
        ] {
            let parsed: ApiSendResponse = serde_json::from_str(body).expect("parse");
            assert_eq!(parsed.message_id, "m-1");
        }
    }

    #[test]
    fn test_from_config_requires_endpoint() {
        assert!(HttpEmailNotifier::from_config(&EmailConfig::default()).is_none());

        let config = EmailConfig {
            endpoint: Some("https://mail.example.com/send".to_string()),
            api_key: Some("key".to_string()),
            from_address: "concierge@example.com".to_string(),
        };
        let notifier = HttpEmailNotifier::from_config(&config).expect("configured");
        assert_eq!(notifier.from_address(), "concierge@example.com");
    }

    #[tokio::test]
    async fn test_log_notifier_accepts() {
        let id = LogNotifier::new()
            .send("a@b.com", "subject", "body")
            .await
            .expect("log notifier never fails");
        assert!(id.starts_with("dry-run-"));
    }

    /// Serves one HTTP exchange on a local port and returns the endpoint.
    async fn relay_answering(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            // The JSON payload is the last thing the client writes.
            while !request.ends_with(b"}") {
                let n = socket.read(&mut buf).await.expect("read");
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.expect("write");
            socket.shutdown().await.ok();
        });
        format!("http://{}/send", addr)
    }

    #[tokio::test]
    async fn test_accepted_without_body_is_delivered() {
        let endpoint =
            relay_answering("HTTP/1.1 202 Accepted\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
        let notifier = HttpEmailNotifier::new(endpoint, None, "x@y.z");

        let id = notifier
            .send("a@b.com", "s", "b")
            .await
            .expect("any 2xx is a delivery");
        assert!(id.starts_with("accepted-"));
    }

    #[tokio::test]
    async fn test_accepted_with_garbage_body_is_delivered() {
        let endpoint = relay_answering(
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 6\r\nConnection: close\r\n\r\nqueued",
        )
        .await;
        let notifier = HttpEmailNotifier::new(endpoint, None, "x@y.z");

        assert!(notifier.send("a@b.com", "s", "b").await.is_ok());
    }

    #[tokio::test]
    async fn test_accepted_message_id_is_returned() {
        let endpoint = relay_answering(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 19\r\nConnection: close\r\n\r\n{\"messageId\":\"m-9\"}",
        )
        .await;
        let notifier = HttpEmailNotifier::new(endpoint, None, "x@y.z");

        assert_eq!(notifier.send("a@b.com", "s", "b").await.expect("send"), "m-9");
    }

    #[tokio::test]
    async fn test_relay_rejection_keeps_status() {
        let endpoint = relay_answering(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Type: application/json\r\nContent-Length: 16\r\nConnection: close\r\n\r\n{\"error\":\"busy\"}",
        )
        .await;
        let notifier = HttpEmailNotifier::new(endpoint, None, "x@y.z");

        match notifier.send("a@b.com", "s", "b").await {
            Err(NotifyError::Rejected { code, message }) => {
                assert_eq!(code, 503);
                assert_eq!(message, "busy");
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_request_failure() {
        let notifier = HttpEmailNotifier::new("http://127.0.0.1:1/send", None, "x@y.z");
        let result = notifier.send("a@b.com", "s", "b").await;
        assert!(matches!(result, Err(NotifyError::RequestFailed(_))));
    }
}
