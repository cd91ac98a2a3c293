use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Expected username/password pair for the gated proxy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCredentials {
    pub username: String,
    pub password: String,
}

impl ProxyCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Authorization decision for one proxied request
///
/// Computed fresh per request, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyDecision {
    /// Credentials match, the request may be forwarded
    Allowed,
    /// No `Proxy-Authorization` header was presented
    DeniedNoCredential,
    /// The header was malformed or the pair did not match
    DeniedBadCredential,
}

/// Decides whether a request may pass the credential gate
///
/// Pure over the presented header value and the expected pair. A header that
/// is not a decodable `Basic user:pass` payload denies; it never faults.
pub fn authorize(header: Option<&[u8]>, expected: &ProxyCredentials) -> ProxyDecision {
    let Some(header) = header else {
        return ProxyDecision::DeniedNoCredential;
    };

    match parse_basic(header) {
        Some((username, password))
            if username == expected.username && password == expected.password =>
        {
            ProxyDecision::Allowed
        }
        _ => ProxyDecision::DeniedBadCredential,
    }
}

/// Parses a `Basic base64(user:pass)` header value into its credential pair
fn parse_basic(header: &[u8]) -> Option<(String, String)> {
    let header = std::str::from_utf8(header).ok()?;
    let (scheme, payload) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(payload.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
