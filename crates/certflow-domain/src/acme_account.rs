//! ACME accounts registered with a CA

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A CA account kept so later runs reuse it instead of registering again
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcmeAccount {
    /// Directory URL of the CA the account lives on
    pub ca_directory_url: String,
    /// Lowercased contact email
    pub email: String,
    pub account_url: String,
    /// Serialized protocol credentials, including the account private key
    pub credentials: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AcmeAccount {
    pub fn matches(&self, ca_directory_url: &str, email: &str) -> bool {
        self.ca_directory_url == ca_directory_url && self.email.eq_ignore_ascii_case(email)
    }
}
