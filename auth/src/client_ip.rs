//! Client address resolution.
//!
//! Picks the address that rate limiting is keyed on. Forwarding headers are
//! checked in a fixed order and the first syntactically valid address wins;
//! the connection address is the fallback.
//!
//! # Security
//!
//! With `trust_forwarded_headers` enabled (the default) any client can name
//! its own address by sending one of these headers. Deployments that are not
//! behind a proxy which overwrites them should disable it.

use std::net::{IpAddr, SocketAddr};

/// Default header order.
pub const DEFAULT_HEADERS: [&str; 6] = [
    "Client-IP",
    "X-Forwarded-For",
    "X-Forwarded",
    "X-Cluster-Client-IP",
    "Forwarded-For",
    "Forwarded",
];

/// Client address resolution configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIpConfig {
    /// Headers consulted, in order.
    pub headers: Vec<String>,

    /// Whether forwarding headers are consulted at all.
    ///
    /// Default: true
    pub trust_forwarded_headers: bool,
}

impl ClientIpConfig {
    /// Set the header order.
    #[must_use]
    pub fn with_headers<I, H>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        self.headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable forwarding headers.
    #[must_use]
    pub const fn with_trust_forwarded_headers(mut self, trust: bool) -> Self {
        self.trust_forwarded_headers = trust;
        self
    }
}

impl Default for ClientIpConfig {
    fn default() -> Self {
        Self {
            headers: DEFAULT_HEADERS.iter().map(ToString::to_string).collect(),
            trust_forwarded_headers: true,
        }
    }
}

/// Resolves the client address from request headers.
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    config: ClientIpConfig,
}

impl ClientIpResolver {
    /// Create a resolver.
    #[must_use]
    pub const fn new(config: ClientIpConfig) -> Self {
        Self { config }
    }

    /// Resolve the client address.
    ///
    /// `header` looks a header up by name (case-insensitively, as HTTP
    /// requires); `remote_addr` is the connection's peer address.
    pub fn resolve<F>(&self, header: F, remote_addr: Option<IpAddr>) -> Option<IpAddr>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.config.trust_forwarded_headers {
            for name in &self.config.headers {
                let Some(value) = header(name) else {
                    continue;
                };

                let found = if name.eq_ignore_ascii_case("Forwarded") {
                    first_forwarded_for(&value)
                } else {
                    first_valid(value.split(','))
                };

                if let Some(ip) = found {
                    tracing::trace!(header = %name, ip = %ip, "Resolved client address from header");
                    return Some(ip);
                }
            }
        }

        remote_addr
    }

    /// Resolve from a list of `(name, value)` header pairs.
    pub fn resolve_from_pairs(
        &self,
        headers: &[(&str, &str)],
        remote_addr: Option<IpAddr>,
    ) -> Option<IpAddr> {
        self.resolve(
            |name| {
                headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| (*value).to_string())
            },
            remote_addr,
        )
    }
}

fn first_valid<'a>(candidates: impl Iterator<Item = &'a str>) -> Option<IpAddr> {
    candidates.filter_map(parse_ip).next()
}

/// `Forwarded: for=192.0.2.60;proto=http, for="[2001:db8::1]:4711"`
fn first_forwarded_for(value: &str) -> Option<IpAddr> {
    let candidates = value.split(',').flat_map(|element| element.split(';')).filter_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        key.trim().eq_ignore_ascii_case("for").then_some(value)
    });
    first_valid(candidates)
}

fn parse_ip(raw: &str) -> Option<IpAddr> {
    let raw = raw.trim().trim_matches('"');
    if raw.is_empty() {
        return None;
    }

    raw.parse::<IpAddr>()
        .ok()
        .or_else(|| raw.parse::<SocketAddr>().ok().map(|addr| addr.ip()))
        .or_else(|| {
            raw.strip_prefix('[')
                .and_then(|rest| rest.strip_suffix(']'))
                .and_then(|inner| inner.parse().ok())
        })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn resolver() -> ClientIpResolver {
        ClientIpResolver::default()
    }

    fn remote() -> Option<IpAddr> {
        Some(IpAddr::from([10, 0, 0, 1]))
    }

    #[test]
    fn test_falls_back_to_connection_address() {
        assert_eq!(resolver().resolve_from_pairs(&[], remote()), remote());
        assert_eq!(resolver().resolve_from_pairs(&[], None), None);
    }

    #[test]
    fn test_x_forwarded_for_first_valid_entry() {
        let headers = [("x-forwarded-for", "unknown, 198.51.100.7, 203.0.113.9")];
        assert_eq!(
            resolver().resolve_from_pairs(&headers, remote()),
            Some(IpAddr::from([198, 51, 100, 7]))
        );
    }

    #[test]
    fn test_header_order_is_respected() {
        let headers = [
            ("X-Forwarded-For", "198.51.100.7"),
            ("Client-IP", "192.0.2.1"),
        ];
        assert_eq!(
            resolver().resolve_from_pairs(&headers, remote()),
            Some(IpAddr::from([192, 0, 2, 1]))
        );
    }

    #[test]
    fn test_invalid_header_falls_through() {
        let headers = [("Client-IP", "garbage"), ("X-Cluster-Client-IP", "192.0.2.44")];
        assert_eq!(
            resolver().resolve_from_pairs(&headers, remote()),
            Some(IpAddr::from([192, 0, 2, 44]))
        );
    }

    #[test]
    fn test_forwarded_header_for_parameter() {
        let headers = [("Forwarded", r#"proto=https;for="[2001:db8::1]:4711", for=192.0.2.60"#)];
        let expected: IpAddr = "2001:db8::1".parse().unwrap();
        assert_eq!(resolver().resolve_from_pairs(&headers, remote()), Some(expected));
    }

    #[test]
    fn test_address_with_port() {
        let headers = [("X-Forwarded", "192.0.2.5:8080")];
        assert_eq!(
            resolver().resolve_from_pairs(&headers, remote()),
            Some(IpAddr::from([192, 0, 2, 5]))
        );
    }

    #[test]
    fn test_untrusted_headers_are_ignored() {
        let resolver = ClientIpResolver::new(
            ClientIpConfig::default().with_trust_forwarded_headers(false),
        );
        let headers = [("X-Forwarded-For", "198.51.100.7")];
        assert_eq!(resolver.resolve_from_pairs(&headers, remote()), remote());
    }

    #[test]
    fn test_custom_header_list() {
        let resolver = ClientIpResolver::new(ClientIpConfig::default().with_headers(["X-Real-IP"]));
        let headers = [("X-Forwarded-For", "198.51.100.7"), ("X-Real-IP", "192.0.2.9")];
        assert_eq!(
            resolver.resolve_from_pairs(&headers, remote()),
            Some(IpAddr::from([192, 0, 2, 9]))
        );
    }
}
