//! Console email sender for development and testing.

use crate::providers::EmailSender;
use tracing::info;

/// Console email sender.
///
/// Logs each message instead of delivering it. Useful for development where
/// you want to copy a login code or magic link straight out of the logs.
///
/// # Examples
///
/// ```ignore
/// use onetime_auth::providers::ConsoleEmailSender;
///
/// let sender = ConsoleEmailSender::new();
/// assert!(sender.send("user@example.com", "Your login code", "123456").await);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ConsoleEmailSender;

impl ConsoleEmailSender {
    /// Create a new console email sender.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl EmailSender for ConsoleEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        info!(to = %to, subject = %subject, "📧 Email (Development Mode)");
        println!("\n┌─ To: {to}");
        println!("├─ Subject: {subject}");
        println!("├──────────────────────────────────────────────────────────────");
        for line in body.lines() {
            println!("│ {line}");
        }
        println!("└──────────────────────────────────────────────────────────────\n");
        true
    }
}
