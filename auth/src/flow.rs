//! Request orchestration for passwordless email authentication.
//!
//! Each operation is one request from the host:
//!
//! ```text
//! request ─▶ rate-limit gate ─▶ issue artifact ─▶ email it
//! verify  ─▶ rate-limit gate ─▶ verify/consume  ─▶ clear windows ─▶ subject id
//! ```
//!
//! The host owns users and sessions. It resolves the email to a subject id
//! before calling in, and starts a session with the subject id that comes
//! back. Errors should be shown to the client through
//! [`AuthError::public_message`].

use crate::artifact::{ArtifactKind, PresentedArtifact, SubjectId, SubjectRef};
use crate::config::{AuthConfig, RateLimitConfig};
use crate::crypto::CryptoBox;
use crate::error::{AuthError, Result};
use crate::issuer::ArtifactIssuer;
use crate::providers::{EmailSender, TtlStore};
use crate::rate_limit::{ActionClass, RateLimiter};
use crate::utils::{is_valid_email, mask_email, normalize_identifier};
use crate::verifier::ArtifactVerifier;
use onetime_core::environment::Clock;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// A confirmed change of email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailChange {
    /// Account whose address changes.
    pub subject_id: SubjectId,

    /// The verified new address (normalised).
    pub new_email: String,
}

/// Passwordless login, account deletion and email change flows.
pub struct PasswordlessFlow<S, E> {
    limiter: RateLimiter<S>,
    issuer: ArtifactIssuer<S>,
    verifier: ArtifactVerifier<S>,
    email: E,
}

impl<S, E> PasswordlessFlow<S, E>
where
    S: TtlStore + Clone,
    E: EmailSender,
{
    /// Wire the flow over one shared store.
    #[must_use]
    pub fn new(
        store: S,
        email: E,
        crypto: Arc<CryptoBox>,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
        limits: RateLimitConfig,
    ) -> Self {
        Self {
            limiter: RateLimiter::new(store.clone(), clock.clone(), limits),
            issuer: ArtifactIssuer::new(store.clone(), crypto.clone(), clock.clone(), config),
            verifier: ArtifactVerifier::new(store, crypto, clock),
            email,
        }
    }

    /// The rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter<S> {
        &self.limiter
    }

    /// The issuer.
    #[must_use]
    pub const fn issuer(&self) -> &ArtifactIssuer<S> {
        &self.issuer
    }

    /// The verifier.
    #[must_use]
    pub const fn verifier(&self) -> &ArtifactVerifier<S> {
        &self.verifier
    }

    /// Email a login code.
    ///
    /// `subject_id` is `None` when no account uses `email`. The attempt is
    /// still counted and the call still succeeds, so the response does not
    /// reveal whether the account exists.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidEmail`]: malformed address
    /// - [`AuthError::RateLimited`]: too many requests from `ip`
    /// - [`AuthError::EmailDeliveryFailed`]: the code was not sent (and is discarded)
    pub async fn request_login_code(
        &self,
        ip: IpAddr,
        email: &str,
        subject_id: Option<SubjectId>,
    ) -> Result<()> {
        validate_email(email)?;
        self.gate(ip, ActionClass::LoginRequest, email).await?;

        let Some(subject_id) = subject_id else {
            info!(ip = %ip, email = %mask_email(email), "Login code requested for unknown address");
            return Ok(());
        };

        let kind = ArtifactKind::LoginCode;
        let presented = self.issuer.issue_default(kind, subject_id, None).await?;
        let body = format!(
            "Your login code is: {}\n\n\
             It expires in {} minutes. If you did not request it, you can ignore this email.",
            secret_of(&presented),
            self.issuer.config().ttl_minutes(kind),
        );

        self.deliver(email, "Your login code", &body, kind, subject_id).await?;
        info!(ip = %ip, subject_id = %subject_id, email = %mask_email(email), "Login code sent");
        Ok(())
    }

    /// Email a magic sign-in link.
    ///
    /// Behaves like [`PasswordlessFlow::request_login_code`] for unknown
    /// addresses.
    ///
    /// # Errors
    ///
    /// Same as [`PasswordlessFlow::request_login_code`].
    pub async fn request_magic_link(
        &self,
        ip: IpAddr,
        email: &str,
        subject_id: Option<SubjectId>,
    ) -> Result<()> {
        validate_email(email)?;
        self.gate(ip, ActionClass::LoginRequest, email).await?;

        let Some(subject_id) = subject_id else {
            info!(ip = %ip, email = %mask_email(email), "Magic link requested for unknown address");
            return Ok(());
        };

        let kind = ArtifactKind::MagicLinkToken;
        let presented = self.issuer.issue_default(kind, subject_id, None).await?;
        let body = format!(
            "Click the link below to sign in:\n\n{}\n\n\
             The link expires in {} minutes and can be used once.",
            presented.url().unwrap_or_default(),
            self.issuer.config().ttl_minutes(kind),
        );

        self.deliver(email, "Your sign-in link", &body, kind, subject_id).await?;
        info!(ip = %ip, subject_id = %subject_id, email = %mask_email(email), "Magic link sent");
        Ok(())
    }

    /// Check an emailed login code.
    ///
    /// On success the `LoginVerify` and `LoginRequest` windows for `ip` are
    /// cleared and the subject is returned; starting a session is up to the
    /// caller.
    ///
    /// # Errors
    ///
    /// - [`AuthError::RateLimited`]: too many attempts from `ip`
    /// - a verification failure (see [`ArtifactVerifier::verify`])
    pub async fn verify_login_code(
        &self,
        ip: IpAddr,
        subject_id: SubjectId,
        code: &str,
    ) -> Result<SubjectId> {
        self.gate(ip, ActionClass::LoginVerify, &subject_id.to_string()).await?;
        let verified = self
            .verifier
            .verify(ArtifactKind::LoginCode, &SubjectRef::Plain(subject_id), code)
            .await?;

        self.signed_in(ip, verified.subject_id).await?;
        Ok(verified.subject_id)
    }

    /// Check a magic link's `uid` and `token` parameters.
    ///
    /// # Errors
    ///
    /// Same as [`PasswordlessFlow::verify_login_code`], plus
    /// [`AuthError::InvalidIdentifier`] when `uid` does not decrypt.
    pub async fn verify_magic_link(&self, ip: IpAddr, uid: &str, token: &str) -> Result<SubjectId> {
        self.gate(ip, ActionClass::LoginVerify, "").await?;
        let verified = self
            .verifier
            .verify(
                ArtifactKind::MagicLinkToken,
                &SubjectRef::Encrypted(uid.to_string()),
                token,
            )
            .await?;

        self.signed_in(ip, verified.subject_id).await?;
        Ok(verified.subject_id)
    }

    /// Email a code confirming deletion of the signed-in account.
    ///
    /// # Errors
    ///
    /// Same as [`PasswordlessFlow::request_login_code`].
    pub async fn request_account_deletion(
        &self,
        ip: IpAddr,
        email: &str,
        subject_id: SubjectId,
    ) -> Result<()> {
        validate_email(email)?;
        self.gate(ip, ActionClass::LoginRequest, email).await?;

        let kind = ArtifactKind::DeletionCode;
        let presented = self.issuer.issue_default(kind, subject_id, None).await?;
        let body = format!(
            "Someone asked to delete your account. If it was you, confirm with this code:\n\n{}\n\n\
             It expires in {} minutes. If you did not ask for this, ignore this email; \
             your account stays as it is.",
            secret_of(&presented),
            self.issuer.config().ttl_minutes(kind),
        );

        self.deliver(email, "Confirm account deletion", &body, kind, subject_id)
            .await?;
        info!(ip = %ip, subject_id = %subject_id, "Account deletion code sent");
        Ok(())
    }

    /// Check an account deletion code. The caller deletes the account on success.
    ///
    /// # Errors
    ///
    /// Same as [`PasswordlessFlow::verify_login_code`].
    pub async fn confirm_account_deletion(
        &self,
        ip: IpAddr,
        subject_id: SubjectId,
        code: &str,
    ) -> Result<SubjectId> {
        self.gate(ip, ActionClass::LoginVerify, &subject_id.to_string()).await?;
        let verified = self
            .verifier
            .verify(ArtifactKind::DeletionCode, &SubjectRef::Plain(subject_id), code)
            .await?;

        self.limiter.clear(ip, ActionClass::LoginVerify).await?;
        info!(ip = %ip, subject_id = %verified.subject_id, "Account deletion confirmed");
        Ok(verified.subject_id)
    }

    /// Email a verification link to `new_email`.
    ///
    /// The link goes to the new address, so following it proves control of
    /// that address. The address is kept with the artifact and returned by
    /// [`PasswordlessFlow::confirm_email_change`].
    ///
    /// # Errors
    ///
    /// Same as [`PasswordlessFlow::request_login_code`].
    pub async fn request_email_change(
        &self,
        ip: IpAddr,
        subject_id: SubjectId,
        new_email: &str,
    ) -> Result<()> {
        validate_email(new_email)?;
        self.gate(ip, ActionClass::LoginRequest, new_email).await?;

        let kind = ArtifactKind::EmailChangeCode;
        let new_email = normalize_identifier(new_email);
        let presented = self
            .issuer
            .issue_default(kind, subject_id, Some(new_email.clone()))
            .await?;
        let body = format!(
            "Confirm this address for your account by opening:\n\n{}\n\n\
             or by entering the code {}.\n\nThe link expires in {} minutes.",
            presented.url().unwrap_or_default(),
            secret_of(&presented),
            self.issuer.config().ttl_minutes(kind),
        );

        self.deliver(&new_email, "Confirm your new email address", &body, kind, subject_id)
            .await?;
        info!(ip = %ip, subject_id = %subject_id, email = %mask_email(&new_email), "Email change link sent");
        Ok(())
    }

    /// Check an email change link's `user_id` and `code` parameters.
    ///
    /// # Errors
    ///
    /// Same as [`PasswordlessFlow::verify_magic_link`].
    pub async fn confirm_email_change(
        &self,
        ip: IpAddr,
        user_id: &str,
        code: &str,
    ) -> Result<EmailChange> {
        self.gate(ip, ActionClass::LoginVerify, "").await?;
        let verified = self
            .verifier
            .verify(
                ArtifactKind::EmailChangeCode,
                &SubjectRef::Encrypted(user_id.to_string()),
                code,
            )
            .await?;

        let new_email = verified.payload.ok_or_else(|| {
            AuthError::InternalError("email change artifact has no address".into())
        })?;

        self.limiter.clear(ip, ActionClass::LoginVerify).await?;
        info!(ip = %ip, subject_id = %verified.subject_id, "Email change confirmed");
        Ok(EmailChange {
            subject_id: verified.subject_id,
            new_email,
        })
    }

    /// Gate an account registration from `ip`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidEmail`]: malformed address
    /// - [`AuthError::RateLimited`]: too many registrations from `ip`
    pub async fn check_registration(&self, ip: IpAddr, email: &str) -> Result<()> {
        validate_email(email)?;
        self.gate(ip, ActionClass::Registration, email).await
    }

    async fn gate(&self, ip: IpAddr, class: ActionClass, identifier: &str) -> Result<()> {
        self.limiter
            .check_and_record(ip, class, identifier)
            .await?
            .into_result()
    }

    async fn signed_in(&self, ip: IpAddr, subject_id: SubjectId) -> Result<()> {
        self.limiter.clear(ip, ActionClass::LoginVerify).await?;
        self.limiter.clear(ip, ActionClass::LoginRequest).await?;
        info!(ip = %ip, subject_id = %subject_id, "Signed in");
        Ok(())
    }

    async fn deliver(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        kind: ArtifactKind,
        subject_id: SubjectId,
    ) -> Result<()> {
        if self.email.send(to, subject, body).await {
            return Ok(());
        }

        warn!(subject_id = %subject_id, kind = %kind, email = %mask_email(to), "Email delivery failed");
        self.verifier.invalidate(kind, subject_id).await?;
        Err(AuthError::EmailDeliveryFailed)
    }
}

impl<S, E> std::fmt::Debug for PasswordlessFlow<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordlessFlow")
            .field("issuer", &self.issuer)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

fn validate_email(email: &str) -> Result<()> {
    if is_valid_email(email.trim()) {
        Ok(())
    } else {
        Err(AuthError::InvalidEmail)
    }
}

fn secret_of(presented: &PresentedArtifact) -> &str {
    match presented {
        PresentedArtifact::Code { code, .. } | PresentedArtifact::VerificationLink { code, .. } => code,
        PresentedArtifact::MagicLink { .. } => "",
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::config::SiteSecrets;
    use crate::mocks::MockEmailSender;
    use crate::stores::MemoryStore;
    use onetime_testing::ManualClock;

    fn flow() -> (PasswordlessFlow<MemoryStore, MockEmailSender>, MockEmailSender) {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_test_epoch());
        let store = MemoryStore::with_clock(clock.clone());
        let crypto = Arc::new(CryptoBox::from_secrets(SiteSecrets::new("a", "b", "c", "d").unwrap()));
        let email = MockEmailSender::new();
        let flow = PasswordlessFlow::new(
            store,
            email.clone(),
            crypto,
            clock,
            AuthConfig::new("https://example.com"),
            RateLimitConfig::default(),
        );
        (flow, email)
    }

    fn ip() -> IpAddr {
        IpAddr::from([192, 0, 2, 10])
    }

    fn code_from(body: &str) -> String {
        body.split_whitespace()
            .find(|word| word.len() == 6 && word.bytes().all(|b| b.is_ascii_digit()))
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_invalid_email_is_rejected_before_counting() {
        let (flow, email) = flow();
        let result = flow.request_login_code(ip(), "nope", Some(SubjectId(1))).await;
        assert_eq!(result, Err(AuthError::InvalidEmail));
        assert!(email.sent().is_empty());
        assert!(flow.limiter().attempts(ip(), ActionClass::LoginRequest).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_address_is_counted_but_not_mailed() {
        let (flow, email) = flow();
        flow.request_login_code(ip(), "ghost@example.com", None).await.unwrap();
        assert!(email.sent().is_empty());
        assert_eq!(
            flow.limiter().attempts(ip(), ActionClass::LoginRequest).await.unwrap().unwrap().count,
            1
        );
    }

    #[tokio::test]
    async fn test_failed_delivery_discards_artifact() {
        let (flow, email) = flow();
        email.set_should_succeed(false);

        let result = flow.request_login_code(ip(), "user@example.com", Some(SubjectId(5))).await;
        assert_eq!(result, Err(AuthError::EmailDeliveryFailed));

        let verify = flow
            .verifier()
            .verify(ArtifactKind::LoginCode, &SubjectRef::Plain(SubjectId(5)), "000000")
            .await;
        assert_eq!(verify, Err(AuthError::ArtifactNotFound));
    }

    #[tokio::test]
    async fn test_successful_login_clears_windows() {
        let (flow, email) = flow();
        flow.request_login_code(ip(), "user@example.com", Some(SubjectId(5))).await.unwrap();
        let code = code_from(&email.last().unwrap().body);

        flow.verify_login_code(ip(), SubjectId(5), "999999x").await.unwrap_err();
        assert_eq!(flow.verify_login_code(ip(), SubjectId(5), &code).await, Ok(SubjectId(5)));

        for class in [ActionClass::LoginRequest, ActionClass::LoginVerify] {
            assert!(flow.limiter().attempts(ip(), class).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn test_account_deletion_round_trip() {
        let (flow, email) = flow();
        flow.request_account_deletion(ip(), "user@example.com", SubjectId(8)).await.unwrap();
        let sent = email.last().unwrap();
        assert_eq!(sent.subject, "Confirm account deletion");

        let code = code_from(&sent.body);
        assert_eq!(flow.confirm_account_deletion(ip(), SubjectId(8), &code).await, Ok(SubjectId(8)));
        assert_eq!(
            flow.confirm_account_deletion(ip(), SubjectId(8), &code).await,
            Err(AuthError::ArtifactNotFound)
        );
    }

    #[tokio::test]
    async fn test_registration_gate() {
        let (flow, _) = flow();
        flow.check_registration(ip(), "a@example.com").await.unwrap();
        flow.check_registration(ip(), "b@example.com").await.unwrap();
        assert_eq!(
            flow.check_registration(ip(), "c@example.com").await,
            Err(AuthError::RateLimited { retry_after_secs: 1800 })
        );
    }
}
