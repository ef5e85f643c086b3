// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Outgoing Mail
//!
//! [`Mailer`] is the only way this service reaches a user's inbox. Two
//! implementations:
//!
//! - [`RelayMailer`]: `POST {from, to, subject, body}` to an HTTP mail relay
//! - [`LogMailer`]: logs the message instead (no `MAIL_RELAY_URL` configured)

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use url::Url;

const RELAY_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail relay request failed: {0}")]
    Request(String),

    #[error("mail relay returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError>;
}

// =============================================================================
// Relay
// =============================================================================

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

#[derive(Debug, Clone)]
pub struct RelayMailer {
    relay_url: Url,
    from: String,
    http: reqwest::Client,
}

impl RelayMailer {
    pub fn new(relay_url: Url, from: impl Into<String>) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .map_err(|e| MailError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            relay_url,
            from: from.into(),
            http,
        })
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        let response = self
            .http
            .post(self.relay_url.clone())
            .json(&RelayMessage {
                from: &self.from,
                to: recipient,
                subject,
                body,
            })
            .send()
            .await
            .map_err(|e| MailError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MailError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

// =============================================================================
// Log only
// =============================================================================

#[derive(Debug, Clone)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), MailError> {
        tracing::info!(
            from = %self.from,
            to = %recipient,
            subject = %subject,
            body_len = body.len(),
            "Mail relay not configured; message logged only"
        );
        Ok(())
    }
}

// =============================================================================
// Messages
// =============================================================================

pub const ACTIVATION_SUBJECT: &str = "Activate your Elonwallet.io Account";

/// `<frontend>/activate?user=<email>&activation_string=<secret>`
pub fn activation_link(frontend_url: &Url, email: &str, activation_string: &str) -> Url {
    let mut link = frontend_url.clone();
    if let Ok(mut segments) = link.path_segments_mut() {
        segments.pop_if_empty().push("activate");
    }
    link.query_pairs_mut()
        .clear()
        .append_pair("user", email)
        .append_pair("activation_string", activation_string);
    link
}

pub fn activation_body(link: &Url) -> String {
    format!("Please follow the link below to activate your account:\r\n{link}\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn activation_link_escapes_email() {
        let frontend = Url::parse("https://app.elonwallet.io/").unwrap();
        let link = activation_link(&frontend, "alice+test@example.com", "abc123");
        assert_eq!(
            link.as_str(),
            "https://app.elonwallet.io/activate?user=alice%2Btest%40example.com&activation_string=abc123"
        );
    }

    #[test]
    fn activation_link_keeps_base_path() {
        let frontend = Url::parse("https://example.com/wallet").unwrap();
        let link = activation_link(&frontend, "a@b.io", "ff");
        assert_eq!(link.path(), "/wallet/activate");
    }

    #[tokio::test]
    async fn relay_posts_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_json(serde_json::json!({
                "from": "noreply@elonwallet.io",
                "to": "alice@example.com",
                "subject": "Hi",
                "body": "Hello",
            })))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let relay_url = Url::parse(&format!("{}/send", server.uri())).unwrap();
        let mailer = RelayMailer::new(relay_url, "noreply@elonwallet.io").unwrap();
        mailer.send("alice@example.com", "Hi", "Hello").await.unwrap();
    }

    #[tokio::test]
    async fn relay_rejection_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(550))
            .mount(&server)
            .await;

        let mailer = RelayMailer::new(Url::parse(&server.uri()).unwrap(), "noreply@x.io").unwrap();
        assert!(matches!(
            mailer.send("alice@example.com", "Hi", "Hello").await,
            Err(MailError::Status(550))
        ));
    }
}
