//! Integration tests for the passwordless flows.
//!
//! Tests the full cycle a host goes through:
//! - Request → rate-limit gate → issue → email
//! - Read the artifact from the mock outbox
//! - Verify → consume → clear windows
//!
//! Security properties checked along the way:
//! - Unknown addresses are indistinguishable from known ones
//! - Failed delivery leaves nothing redeemable behind
//! - Lockouts escalate per `(ip, action)` and lapse on schedule

#![allow(clippy::unwrap_used, clippy::panic)]

use chrono::Duration;
use onetime_auth::mocks::MockEmailSender;
use onetime_auth::stores::MemoryStore;
use onetime_auth::{
    ActionClass, ArtifactKind, AuthConfig, AuthError, CryptoBox, PasswordlessFlow, RateLimitConfig, SiteSecrets,
    SubjectId, SubjectRef,
};
use onetime_core::environment::Clock;
use onetime_testing::{ManualClock, init_test_tracing};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

type Flow = PasswordlessFlow<MemoryStore, MockEmailSender>;

struct Setup {
    flow: Arc<Flow>,
    email: MockEmailSender,
    clock: ManualClock,
}

fn setup() -> Setup {
    init_test_tracing();
    let clock = ManualClock::at_test_epoch();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let secrets = SiteSecrets::new("a-salt", "s-salt", "u-salt", "n-salt").unwrap();
    let email = MockEmailSender::new();

    let flow = PasswordlessFlow::new(
        MemoryStore::with_clock(shared.clone()),
        email.clone(),
        Arc::new(CryptoBox::from_secrets(secrets)),
        shared,
        AuthConfig::new("https://app.example.com"),
        RateLimitConfig::default(),
    );

    Setup {
        flow: Arc::new(flow),
        email,
        clock,
    }
}

fn ip(last: u8) -> IpAddr {
    IpAddr::from([203, 0, 113, last])
}

/// The code from "Your login code is: NNNNNN".
fn code_in(body: &str) -> String {
    body.lines()
        .find_map(|line| line.strip_prefix("Your login code is: "))
        .map(str::to_string)
        .unwrap_or_else(|| panic!("no login code in {body:?}"))
}

/// Query parameters of the first URL in the body.
fn link_params(body: &str) -> HashMap<String, String> {
    let url = body
        .lines()
        .find(|line| line.starts_with("https://"))
        .unwrap_or_else(|| panic!("no link in {body:?}"));
    let (_, query) = url.split_once('?').unwrap();
    serde_urlencoded::from_str(query).unwrap()
}

#[tokio::test]
async fn test_login_code_round_trip() {
    let s = setup();

    s.flow
        .request_login_code(ip(1), "User@Example.com", Some(SubjectId(42)))
        .await
        .unwrap();

    let mail = s.email.last().unwrap();
    assert_eq!(mail.subject, "Your login code");
    let code = code_in(&mail.body);
    assert_eq!(code.len(), 6);

    let subject = s.flow.verify_login_code(ip(1), SubjectId(42), &code).await.unwrap();
    assert_eq!(subject, SubjectId(42));

    // Consumed on first use.
    assert_eq!(
        s.flow.verify_login_code(ip(1), SubjectId(42), &code).await,
        Err(AuthError::ArtifactNotFound)
    );
}

#[tokio::test]
async fn test_magic_link_round_trip() {
    let s = setup();

    s.flow
        .request_magic_link(ip(2), "user@example.com", Some(SubjectId(42)))
        .await
        .unwrap();

    let params = link_params(&s.email.last().unwrap().body);
    assert_eq!(params["action"], "magic_login");

    let subject = s
        .flow
        .verify_magic_link(ip(2), &params["uid"], &params["token"])
        .await
        .unwrap();
    assert_eq!(subject, SubjectId(42));

    assert_eq!(
        s.flow.verify_magic_link(ip(2), &params["uid"], &params["token"]).await,
        Err(AuthError::ArtifactNotFound)
    );
}

#[tokio::test]
async fn test_magic_link_uid_is_bound_to_its_subject() {
    let s = setup();

    s.flow
        .request_magic_link(ip(3), "alice@example.com", Some(SubjectId(1)))
        .await
        .unwrap();
    let alice = link_params(&s.email.last().unwrap().body);
    s.flow
        .request_magic_link(ip(4), "bob@example.com", Some(SubjectId(2)))
        .await
        .unwrap();
    let bob = link_params(&s.email.last().unwrap().body);

    // Alice's token presented under Bob's uid.
    assert_eq!(
        s.flow.verify_magic_link(ip(3), &bob["uid"], &alice["token"]).await,
        Err(AuthError::ArtifactMismatch)
    );
    assert_eq!(
        s.flow.verify_magic_link(ip(3), &alice["uid"], &alice["token"]).await,
        Ok(SubjectId(1))
    );
}

#[tokio::test]
async fn test_magic_link_rejects_tampered_uid() {
    let s = setup();

    s.flow
        .request_magic_link(ip(5), "user@example.com", Some(SubjectId(42)))
        .await
        .unwrap();
    let params = link_params(&s.email.last().unwrap().body);

    let original = &params["uid"];
    let first = if original.starts_with('A') { 'B' } else { 'A' };
    let uid = format!("{first}{}", &original[1..]);

    assert_eq!(
        s.flow.verify_magic_link(ip(5), &uid, &params["token"]).await,
        Err(AuthError::InvalidIdentifier)
    );
}

#[tokio::test]
async fn test_unknown_address_gets_same_response_and_no_mail() {
    let s = setup();

    let known = s
        .flow
        .request_login_code(ip(6), "known@example.com", Some(SubjectId(9)))
        .await;
    let unknown = s.flow.request_login_code(ip(7), "nobody@example.com", None).await;

    assert_eq!(known, unknown);
    assert_eq!(s.email.sent().len(), 1);
    assert_eq!(s.email.sent()[0].to, "known@example.com");

    // Unknown addresses still count towards the lockout.
    let attempts = s
        .flow
        .limiter()
        .attempts(ip(7), ActionClass::LoginRequest)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(attempts.count, 1);
}

#[tokio::test]
async fn test_third_login_request_is_locked_out() {
    let s = setup();

    for _ in 0..2 {
        s.flow
            .request_login_code(ip(8), "user@example.com", Some(SubjectId(1)))
            .await
            .unwrap();
    }

    let third = s
        .flow
        .request_login_code(ip(8), "user@example.com", Some(SubjectId(1)))
        .await;
    assert_eq!(third, Err(AuthError::RateLimited { retry_after_secs: 1800 }));
    assert_eq!(s.email.sent().len(), 2);

    // Other addresses are unaffected.
    s.flow
        .request_login_code(ip(9), "user@example.com", Some(SubjectId(1)))
        .await
        .unwrap();

    // The lockout lapses after thirty minutes.
    s.clock.advance(Duration::seconds(1800));
    s.flow
        .request_login_code(ip(8), "user@example.com", Some(SubjectId(1)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_login_request_lockout_leaves_verification_open() {
    let s = setup();

    s.flow
        .request_login_code(ip(10), "user@example.com", Some(SubjectId(5)))
        .await
        .unwrap();
    let code = code_in(&s.email.last().unwrap().body);
    s.flow
        .request_magic_link(ip(10), "user@example.com", Some(SubjectId(5)))
        .await
        .unwrap();
    assert!(matches!(
        s.flow.request_login_code(ip(10), "user@example.com", Some(SubjectId(5))).await,
        Err(AuthError::RateLimited { .. })
    ));

    assert_eq!(
        s.flow.verify_login_code(ip(10), SubjectId(5), &code).await,
        Ok(SubjectId(5))
    );
}

#[tokio::test]
async fn test_fifth_wrong_code_is_locked_out() {
    let s = setup();

    s.flow
        .request_login_code(ip(11), "user@example.com", Some(SubjectId(3)))
        .await
        .unwrap();
    let code = code_in(&s.email.last().unwrap().body);
    let wrong = if code == "000000" { "111111" } else { "000000" };

    for _ in 0..4 {
        assert_eq!(
            s.flow.verify_login_code(ip(11), SubjectId(3), wrong).await,
            Err(AuthError::ArtifactMismatch)
        );
    }

    // Even the right code is refused once locked out.
    assert_eq!(
        s.flow.verify_login_code(ip(11), SubjectId(3), &code).await,
        Err(AuthError::RateLimited { retry_after_secs: 1800 })
    );

    // The artifact itself survived the failed attempts.
    s.flow.limiter().clear(ip(11), ActionClass::LoginVerify).await.unwrap();
    assert_eq!(
        s.flow.verify_login_code(ip(11), SubjectId(3), &code).await,
        Ok(SubjectId(3))
    );
}

#[tokio::test]
async fn test_successful_sign_in_resets_counters() {
    let s = setup();

    s.flow
        .request_login_code(ip(12), "user@example.com", Some(SubjectId(8)))
        .await
        .unwrap();
    let code = code_in(&s.email.last().unwrap().body);
    for _ in 0..3 {
        let _ = s.flow.verify_login_code(ip(12), SubjectId(8), "nope").await;
    }

    s.flow.verify_login_code(ip(12), SubjectId(8), &code).await.unwrap();

    let limiter = s.flow.limiter();
    assert_eq!(limiter.attempts(ip(12), ActionClass::LoginVerify).await.unwrap(), None);
    assert_eq!(limiter.attempts(ip(12), ActionClass::LoginRequest).await.unwrap(), None);
}

#[tokio::test]
async fn test_account_deletion_round_trip() {
    let s = setup();

    s.flow
        .request_account_deletion(ip(13), "user@example.com", SubjectId(77))
        .await
        .unwrap();
    let mail = s.email.last().unwrap();
    assert_eq!(mail.subject, "Confirm account deletion");

    let code = mail
        .body
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && line.chars().all(|c| c.is_ascii_digit()))
        .unwrap()
        .to_string();

    // A login code is a different artifact.
    assert_eq!(
        s.flow.verify_login_code(ip(13), SubjectId(77), &code).await,
        Err(AuthError::ArtifactNotFound)
    );
    assert_eq!(
        s.flow.confirm_account_deletion(ip(13), SubjectId(77), &code).await,
        Ok(SubjectId(77))
    );
}

#[tokio::test]
async fn test_email_change_goes_to_new_address() {
    let s = setup();

    s.flow
        .request_email_change(ip(14), SubjectId(21), " New.Address@Example.com ")
        .await
        .unwrap();

    let mail = s.email.last().unwrap();
    assert_eq!(mail.to, "new.address@example.com");
    let params = link_params(&mail.body);
    assert_eq!(params["action"], "verify_email");

    let change = s
        .flow
        .confirm_email_change(ip(14), &params["user_id"], &params["code"])
        .await
        .unwrap();
    assert_eq!(change.subject_id, SubjectId(21));
    assert_eq!(change.new_email, "new.address@example.com");
}

#[tokio::test]
async fn test_failed_delivery_leaves_nothing_to_redeem() {
    let s = setup();
    s.email.set_should_succeed(false);

    let result = s
        .flow
        .request_magic_link(ip(15), "user@example.com", Some(SubjectId(4)))
        .await;
    assert_eq!(result, Err(AuthError::EmailDeliveryFailed));
    assert!(s.email.sent().is_empty());

    s.email.set_should_succeed(true);
    s.flow
        .request_login_code(ip(15), "user@example.com", Some(SubjectId(4)))
        .await
        .unwrap();
    // Only the login code is outstanding; no magic link was left behind.
    let magic = s
        .flow
        .verifier()
        .verify(ArtifactKind::MagicLinkToken, &SubjectRef::Plain(SubjectId(4)), "x")
        .await;
    assert_eq!(magic, Err(AuthError::ArtifactNotFound));
}

#[tokio::test]
async fn test_invalid_email_is_rejected_before_counting() {
    let s = setup();

    for _ in 0..5 {
        assert_eq!(
            s.flow.request_login_code(ip(16), "not-an-email", Some(SubjectId(1))).await,
            Err(AuthError::InvalidEmail)
        );
    }

    assert_eq!(
        s.flow.limiter().attempts(ip(16), ActionClass::LoginRequest).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn test_registration_gate() {
    let s = setup();

    s.flow.check_registration(ip(17), "a@example.com").await.unwrap();
    s.flow.check_registration(ip(17), "b@example.com").await.unwrap();
    assert_eq!(
        s.flow.check_registration(ip(17), "c@example.com").await,
        Err(AuthError::RateLimited { retry_after_secs: 1800 })
    );

    // Registration lockout does not block sign-in requests.
    s.flow
        .request_login_code(ip(17), "a@example.com", Some(SubjectId(1)))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_verification_has_one_winner() {
    let s = setup();

    s.flow
        .request_magic_link(ip(18), "user@example.com", Some(SubjectId(99)))
        .await
        .unwrap();
    let params = link_params(&s.email.last().unwrap().body);

    // Distinct addresses so the lockout does not interfere.
    let handles: Vec<_> = (0..4u8)
        .map(|n| {
            let flow = Arc::clone(&s.flow);
            let uid = params["uid"].clone();
            let token = params["token"].clone();
            tokio::spawn(async move { flow.verify_magic_link(ip(100 + n), &uid, &token).await })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(subject) => {
                assert_eq!(subject, SubjectId(99));
                winners += 1;
            },
            Err(err) => assert!(err.is_verification_failure(), "unexpected {err:?}"),
        }
    }
    assert_eq!(winners, 1);
}
