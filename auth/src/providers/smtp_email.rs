//! SMTP email sender implementation using Lettre.

use crate::error::{AuthError, Result};
use crate::providers::EmailSender;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

/// SMTP email sender using Lettre.
///
/// Sends real mail through an authenticated SMTP relay (STARTTLS).
///
/// # Examples
///
/// ```ignore
/// use onetime_auth::providers::SmtpEmailSender;
///
/// let sender = SmtpEmailSender::new(
///     "smtp.example.com",
///     587,
///     "mailer".to_string(),
///     "app_password".to_string(),
///     "Example App <noreply@example.com>",
/// )?;
/// ```
#[derive(Clone)]
pub struct SmtpEmailSender {
    /// Pooled async transport.
    transport: AsyncSmtpTransport<Tokio1Executor>,

    /// Parsed "From" mailbox.
    from: lettre::message::Mailbox,
}

impl SmtpEmailSender {
    /// Create a new SMTP email sender.
    ///
    /// # Arguments
    ///
    /// - `smtp_server`: SMTP relay host
    /// - `smtp_port`: SMTP relay port (usually 587)
    /// - `smtp_username`: SMTP authentication username
    /// - `smtp_password`: SMTP authentication password
    /// - `from`: Sender mailbox, e.g. `"Example <noreply@example.com>"`
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if the relay host or the sender
    /// address is invalid.
    pub fn new(
        smtp_server: &str,
        smtp_port: u16,
        smtp_username: String,
        smtp_password: String,
        from: &str,
    ) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_server)
            .map_err(|e| AuthError::Configuration(format!("SMTP relay error: {e}")))?
            .port(smtp_port)
            .credentials(Credentials::new(smtp_username, smtp_password))
            .build();

        let from = from
            .parse()
            .map_err(|e| AuthError::Configuration(format!("Invalid from address: {e}")))?;

        Ok(Self { transport, from })
    }

    fn build_message(&self, to: &str, subject: &str, body: &str) -> Result<Message> {
        let to = to
            .parse()
            .map_err(|e| AuthError::InternalError(format!("Invalid to address: {e}")))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AuthError::InternalError(format!("Failed to build email: {e}")))
    }
}

impl std::fmt::Debug for SmtpEmailSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpEmailSender")
            .field("from", &self.from.to_string())
            .finish_non_exhaustive()
    }
}

impl EmailSender for SmtpEmailSender {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        let message = match self.build_message(to, subject, body) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Refusing to send malformed email");
                return false;
            }
        };

        match self.transport.send(message).await {
            Ok(response) => {
                debug!(code = %response.code(), "SMTP relay accepted message");
                true
            }
            Err(e) => {
                warn!(error = %e, "SMTP delivery failed");
                false
            }
        }
    }
}
