//! Mock email sender for testing.

use crate::providers::EmailSender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// A message captured by [`MockEmailSender`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentEmail {
    /// Recipient.
    pub to: String,

    /// Subject line.
    pub subject: String,

    /// Plain-text body.
    pub body: String,
}

/// Mock email sender.
///
/// Records every message instead of delivering it. Clones share the outbox,
/// so a test can keep one handle and give another to the code under test.
#[derive(Debug, Clone)]
pub struct MockEmailSender {
    outbox: Arc<Mutex<Vec<SentEmail>>>,
    should_succeed: Arc<AtomicBool>,
}

impl MockEmailSender {
    /// Create a mock sender that accepts every message.
    #[must_use]
    pub fn new() -> Self {
        Self {
            outbox: Arc::new(Mutex::new(Vec::new())),
            should_succeed: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a mock sender that rejects every message.
    #[must_use]
    pub fn failing() -> Self {
        let sender = Self::new();
        sender.set_should_succeed(false);
        sender
    }

    /// Simulate delivery success or failure for subsequent sends.
    pub fn set_should_succeed(&self, succeed: bool) {
        self.should_succeed.store(succeed, Ordering::SeqCst);
    }

    /// All accepted messages, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentEmail> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The most recently accepted message.
    #[must_use]
    pub fn last(&self) -> Option<SentEmail> {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Forget all recorded messages.
    pub fn clear(&self) {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl Default for MockEmailSender {
    fn default() -> Self {
        Self::new()
    }
}

impl EmailSender for MockEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        if !self.should_succeed.load(Ordering::SeqCst) {
            return false;
        }

        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentEmail {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
            });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_messages() {
        let sender = MockEmailSender::new();
        assert!(sender.send("a@example.com", "Hi", "Body").await);

        let handle = sender.clone();
        assert_eq!(handle.sent().len(), 1);
        assert_eq!(handle.last().map(|m| m.to), Some("a@example.com".to_string()));

        handle.clear();
        assert!(sender.sent().is_empty());
    }

    #[tokio::test]
    async fn test_failure_toggle() {
        let sender = MockEmailSender::failing();
        assert!(!sender.send("a@example.com", "Hi", "Body").await);
        assert!(sender.sent().is_empty());

        sender.set_should_succeed(true);
        assert!(sender.send("a@example.com", "Hi", "Body").await);
    }
}
