//! Replacement detection (ACME Renewal Information)

use certflow_domain::Certificate;
use tracing::debug;

use crate::x509::ari_certificate_id;

/// A prior certificate the new order may declare itself a replacement of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementHint {
    /// Renewal identifier of the prior certificate
    pub cert_id: String,
    /// Account that issued the prior certificate
    pub prior_account_url: String,
}

/// Decide whether an apply for `domains` replaces `prior`
///
/// Only an exact match of the sorted domain sets qualifies. Any problem
/// reading the prior certificate yields a fresh issuance instead of an error.
pub fn detect_replacement(prior: Option<&Certificate>, domains: &[String]) -> Option<ReplacementHint> {
    let prior = prior?;

    let mut old = prior.domains();
    let mut new = domains.to_vec();
    old.sort();
    new.sort();
    if old != new {
        debug!(prior = %prior.id, "Domain set changed, issuing without replacement");
        return None;
    }

    match ari_certificate_id(&prior.certificate) {
        Ok(cert_id) => Some(ReplacementHint {
            cert_id,
            prior_account_url: prior.acme_account_url.clone(),
        }),
        Err(e) => {
            debug!(prior = %prior.id, error = %e, "Cannot compute renewal identifier");
            None
        }
    }
}

/// When a computed replacement id is sent with the order
///
/// Evaluated after registration, against the active account's URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReplacementGuard {
    /// Send unless the prior certificate is known to belong to another account
    #[default]
    SameAccount,
    Always,
    Never,
}

impl ReplacementGuard {
    /// Whether `hint` may be sent with an order placed by `active_account_url`
    pub fn should_submit(&self, hint: &ReplacementHint, active_account_url: &str) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::SameAccount => {
                hint.prior_account_url.is_empty() || hint.prior_account_url == active_account_url
            }
        }
    }
}
