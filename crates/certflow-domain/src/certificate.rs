//! Issued and uploaded certificate records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Separator used when storing a domain set as a single string
pub const SAN_SEPARATOR: char = ';';

/// How a certificate entered the system
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CertificateSource {
    /// Obtained from an ACME CA by an apply node
    #[default]
    Request,
    /// Supplied by the user through an upload node
    Upload,
}

/// The durable artifact of a successful apply or upload
///
/// A new apply for the same node supersedes, rather than mutates, the prior
/// record. The prior record stays around as the input to replacement
/// detection until the retention sweep removes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub source: CertificateSource,
    pub subject_alt_names: String,
    #[serde(default)]
    pub serial_number: String,
    /// Full PEM chain, leaf first
    pub certificate: String,
    pub private_key: String,
    #[serde(default)]
    pub issuer_org: String,
    #[serde(default)]
    pub issuer_certificate: String,
    #[serde(default)]
    pub key_algorithm: String,
    pub validity_not_before: Option<DateTime<Utc>>,
    pub validity_not_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub acme_account_url: String,
    #[serde(default)]
    pub acme_cert_url: String,
    #[serde(default)]
    pub acme_cert_stable_url: String,
    #[serde(default)]
    pub csr: String,
    #[serde(default)]
    pub workflow_id: String,
    #[serde(default)]
    pub workflow_run_id: String,
    #[serde(default)]
    pub workflow_node_id: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Certificate {
    /// The stored SAN string split into its domains
    pub fn domains(&self) -> Vec<String> {
        split_domains(&self.subject_alt_names)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.validity_not_after.is_some_and(|not_after| not_after <= now)
    }

    /// Whole days of validity left, negative once expired
    pub fn days_left_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.validity_not_after
            .map(|not_after| (not_after - now).num_days())
    }
}

/// Split a `;`-joined domain string, dropping blanks
pub fn split_domains(joined: &str) -> Vec<String> {
    joined
        .split(SAN_SEPARATOR)
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join a domain list into the stored SAN form
pub fn join_domains<S: AsRef<str>>(domains: &[S]) -> String {
    domains
        .iter()
        .map(|d| d.as_ref())
        .collect::<Vec<_>>()
        .join(&SAN_SEPARATOR.to_string())
}
