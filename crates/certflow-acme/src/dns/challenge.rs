use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

use super::provider::CHALLENGE_TTL;

pub const ACME_CHALLENGE_RECORD: &str = "_acme-challenge";

/// One DNS-01 challenge as handed to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dns01Challenge {
    /// Identifier being validated, possibly a wildcard
    pub domain: String,
    pub token: String,
    pub key_authorization: String,
    /// Record to write, after any CNAME following
    pub fqdn: String,
    /// TXT value
    pub value: String,
    pub ttl: u32,
}

impl Dns01Challenge {
    /// Challenge record for `domain`, placed at the default `_acme-challenge` name
    pub fn new(domain: &str, token: &str, key_authorization: &str) -> Self {
        Self {
            domain: domain.to_string(),
            token: token.to_string(),
            key_authorization: key_authorization.to_string(),
            fqdn: challenge_record_fqdn(domain),
            value: compute_record_value(key_authorization),
            ttl: CHALLENGE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Option<u32>) -> Self {
        if let Some(ttl) = ttl {
            self.ttl = ttl;
        }
        self
    }

    pub fn with_fqdn(mut self, fqdn: String) -> Self {
        self.fqdn = fqdn;
        self
    }
}

/// Base domain of a possibly-wildcard identifier
pub fn normalize_domain(domain: &str) -> &str {
    domain.strip_prefix("*.").unwrap_or(domain)
}

/// `_acme-challenge.<domain>`, wildcards collapsed to their base domain
pub fn challenge_record_fqdn(domain: &str) -> String {
    format!("{}.{}", ACME_CHALLENGE_RECORD, normalize_domain(domain))
}

/// base64url(sha256(key authorization)), unpadded
pub fn compute_record_value(key_authorization: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(key_authorization.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_naming() {
        assert_eq!(challenge_record_fqdn("example.com"), "_acme-challenge.example.com");
        assert_eq!(challenge_record_fqdn("*.example.com"), "_acme-challenge.example.com");
        assert_eq!(normalize_domain("sub.example.com"), "sub.example.com");
    }

    #[test]
    fn test_record_value_encoding() {
        let value = compute_record_value("token.thumbprint");
        assert_eq!(value.len(), 43);
        assert!(!value.contains('=') && !value.contains('+') && !value.contains('/'));
        assert_eq!(value, compute_record_value("token.thumbprint"));
    }

    #[test]
    fn test_challenge_builder() {
        let challenge = Dns01Challenge::new("*.example.com", "tok", "tok.thumb")
            .with_ttl(Some(300))
            .with_fqdn("_acme-challenge.delegated.example.net".into());
        assert_eq!(challenge.domain, "*.example.com");
        assert_eq!(challenge.ttl, 300);
        assert_eq!(challenge.fqdn, "_acme-challenge.delegated.example.net");
        assert_eq!(challenge.value, compute_record_value("tok.thumb"));
        assert_eq!(Dns01Challenge::new("a.com", "t", "k").ttl, CHALLENGE_TTL);
    }
}
