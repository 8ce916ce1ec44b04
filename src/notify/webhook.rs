//! HTTP webhook mailer.
//!
//! POSTs each notification as JSON to a relay endpoint that owns the actual
//! mail transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, error};

use super::{Mailer, MailerError, Notification};

/// Mailer that delegates delivery to an HTTP endpoint.
pub struct WebhookMailer {
    client: Client,
    endpoint: String,
}

impl WebhookMailer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, MailerError> {
        let endpoint = endpoint.into();
        if endpoint.is_empty() {
            return Err(MailerError::Config("webhook endpoint not configured".to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Mailer for WebhookMailer {
    async fn send(&self, notification: &Notification) -> Result<(), MailerError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(to = %notification.to, status = %status, "Webhook accepted notification");
            Ok(())
        } else {
            error!(to = %notification.to, status = %status, "Webhook rejected notification");
            Err(MailerError::Rejected(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_endpoint_rejected() {
        let result = WebhookMailer::new("", Duration::from_secs(1));
        assert!(matches!(result, Err(MailerError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let mailer = WebhookMailer::new("http://127.0.0.1:9/mail", Duration::from_millis(500)).unwrap();
        let notification = Notification {
            from: "a@example.com".to_string(),
            to: "b@example.com".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
        };

        let result = mailer.send(&notification).await;
        assert!(matches!(result, Err(MailerError::Http(_))));
    }
}
