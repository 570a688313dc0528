//! Messaging collaborator — email and SMS delivery behind a capability
//! trait so the workflow engine never depends on a concrete provider.
//!
//! Delivery is fire-and-forget: the engine consumes no return value beyond
//! success/failure. The mock provider only logs, matching the current
//! deployment where real provider integration is handled elsewhere.

use std::sync::{Arc, Mutex};
use tracing::info;

/// Capability trait for outbound messaging. Production implementations wrap
/// a real provider (SendGrid, Twilio); tests swap in a capturing fake
/// without touching engine logic.
pub trait MessagingProvider: Send + Sync {
    fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), String>;
    fn send_sms(&self, to: &str, message: &str) -> Result<(), String>;
}

/// Logging-only provider used in development. Never fails.
pub struct MockProvider;

impl MessagingProvider for MockProvider {
    fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        info!(
            to = %to,
            subject = %subject,
            body_len = body.len(),
            "Mock email sent"
        );
        metrics::counter!("channels.emails_sent").increment(1);
        Ok(())
    }

    fn send_sms(&self, to: &str, message: &str) -> Result<(), String> {
        info!(to = %to, message = %message, "Mock SMS sent");
        metrics::counter!("channels.sms_sent").increment(1);
        Ok(())
    }
}

/// A message captured by [`CaptureProvider`] during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentMessage {
    Email {
        to: String,
        subject: String,
        body: String,
    },
    Sms {
        to: String,
        message: String,
    },
}

/// In-memory provider that records every send, and can be primed to fail
/// from a given call onward to exercise engine failure paths.
#[derive(Default)]
pub struct CaptureProvider {
    sent: Mutex<Vec<SentMessage>>,
    fail_after: Mutex<Option<usize>>,
}

impl CaptureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every send once `n` sends have succeeded.
    pub fn fail_after(&self, n: usize) {
        *self.fail_after.lock().expect("capture mutex poisoned") = Some(n);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().expect("capture mutex poisoned").clone()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("capture mutex poisoned").len()
    }

    fn record(&self, message: SentMessage) -> Result<(), String> {
        let mut sent = self.sent.lock().expect("capture mutex poisoned");
        let limit = *self.fail_after.lock().expect("capture mutex poisoned");
        if let Some(limit) = limit {
            if sent.len() >= limit {
                return Err("delivery provider unavailable".to_string());
            }
        }
        sent.push(message);
        Ok(())
    }
}

impl MessagingProvider for CaptureProvider {
    fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), String> {
        self.record(SentMessage::Email {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        })
    }

    fn send_sms(&self, to: &str, message: &str) -> Result<(), String> {
        self.record(SentMessage::Sms {
            to: to.to_string(),
            message: message.to_string(),
        })
    }
}

/// Convenience: the default development provider.
pub fn mock_provider() -> Arc<dyn MessagingProvider> {
    Arc::new(MockProvider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_provider_records_sends() {
        let provider = CaptureProvider::new();
        provider
            .send_email("lead@example.com", "Hello", "Body")
            .unwrap();
        provider.send_sms("+15550001111", "Hi there").unwrap();

        let sent = provider.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0],
            SentMessage::Email {
                to: "lead@example.com".into(),
                subject: "Hello".into(),
                body: "Body".into(),
            }
        );
    }

    #[test]
    fn test_capture_provider_fail_after() {
        let provider = CaptureProvider::new();
        provider.fail_after(1);

        assert!(provider.send_email("a@example.com", "s", "b").is_ok());
        assert!(provider.send_email("b@example.com", "s", "b").is_err());
        assert_eq!(provider.count(), 1);
    }

    #[test]
    fn test_mock_provider_never_fails() {
        let provider = MockProvider;
        assert!(provider.send_email("a@example.com", "s", "b").is_ok());
        assert!(provider.send_sms("+15550001111", "m").is_ok());
    }
}
