//! Utility functions for identifiers and addresses.

/// Normalise an identifier (email address) before it is counted or compared.
///
/// Trims surrounding whitespace and lower-cases, so `" User@Example.COM "` and
/// `"user@example.com"` share one per-identifier counter.
///
/// # Examples
///
/// ```
/// use onetime_auth::utils::normalize_identifier;
///
/// assert_eq!(normalize_identifier("  User@Example.COM "), "user@example.com");
/// ```
#[must_use]
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Validate email address format.
///
/// Basic structural check, not full RFC 5322:
/// - Exactly one `@` with non-empty local and domain parts
/// - Domain made of non-empty dot-separated labels, at least two of them
/// - Total length between 3 and 254 characters
///
/// # Examples
///
/// ```
/// use onetime_auth::utils::is_valid_email;
///
/// assert!(is_valid_email("user@example.com"));
/// assert!(is_valid_email("user+tag@mail.example.com"));
/// assert!(!is_valid_email("invalid"));
/// assert!(!is_valid_email("@example.com"));
/// assert!(!is_valid_email("user@localhost"));
/// ```
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    if !(3..=254).contains(&email.len()) {
        return false;
    }

    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty() || domain.contains('@') {
        return false;
    }

    let local_ok = local
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '+' | '_'));

    let labels: Vec<&str> = domain.split('.').collect();
    let domain_ok = labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty() && label.chars().all(|c| c.is_alphanumeric() || c == '-')
        });

    local_ok && domain_ok
}

/// Mask an email address for log output (`j***@example.com`).
#[must_use]
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{first}***@{domain}")
        }
        None => "***".to_string(),
    }
}
