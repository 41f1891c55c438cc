//! Email sender trait.

/// Outbound email transport.
///
/// This trait abstracts over email delivery services (SMTP relay, SES,
/// Postmark, ...). Message content is composed by the caller; the transport
/// only delivers it.
pub trait EmailSender: Send + Sync {
    /// Send a plain-text message.
    ///
    /// # Arguments
    ///
    /// - `to`: Recipient email address
    /// - `subject`: Subject line
    /// - `body`: Plain-text body
    ///
    /// # Returns
    ///
    /// `true` if the transport accepted the message.
    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> impl std::future::Future<Output = bool> + Send;
}
