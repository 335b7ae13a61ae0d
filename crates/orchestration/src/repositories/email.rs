//! Notification trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::OrchestrationError;

/// Trait for sending notification emails. Delivery is best effort; the
/// orchestrators never roll a saga back over a failed notification.
#[async_trait]
pub trait EmailService: Send + Sync {
    /// Sends an email to `recipient`.
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), OrchestrationError>;
}

/// A sent email captured by the in-memory service.
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct InMemoryEmailState {
    sent: Vec<SentEmail>,
    fail_on_send: bool,
}

/// In-memory email service for testing. Records every sent message.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEmailService {
    state: Arc<RwLock<InMemoryEmailState>>,
}

impl InMemoryEmailService {
    /// Creates a new in-memory email service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail on send calls.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns the number of emails sent.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns copies of all sent emails.
    pub fn sent_emails(&self) -> Vec<SentEmail> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl EmailService for InMemoryEmailService {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), OrchestrationError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(OrchestrationError::Notification(
                "email delivery rejected".to_string(),
            ));
        }

        state.sent.push(SentEmail {
            recipient: recipient.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sent_emails() {
        let svc = InMemoryEmailService::new();
        svc.send("a@example.com", "Welcome", "Hello").await.unwrap();

        let sent = svc.sent_emails();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "a@example.com");
        assert_eq!(sent[0].subject, "Welcome");
    }

    #[tokio::test]
    async fn fail_on_send_toggle() {
        let svc = InMemoryEmailService::new();
        svc.set_fail_on_send(true);
        assert!(svc.send("a@example.com", "Welcome", "Hello").await.is_err());
        assert_eq!(svc.sent_count(), 0);
    }
}
