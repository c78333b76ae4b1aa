//! ACME account identities
//!
//! One [`AcmeUser`] exists per (CA directory, contact email) pair for the
//! lifetime of the [`AccountManager`]. The account key is created by the CA
//! client during registration and travels inside the registration's
//! credentials, so a user's identity is fixed by the first registration
//! attached to it, whether fresh or restored from storage.

use std::sync::{Arc, OnceLock};

use certflow_domain::AcmeAccount;
use dashmap::DashMap;
use tracing::debug;

use crate::ca::CaConfig;

/// The CA's record of an account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub account_url: String,
    /// Serialized protocol credentials used to reload the account
    pub credentials: String,
}

impl Registration {
    /// Storage record for this registration under `user`
    pub fn to_account(&self, user: &AcmeUser) -> AcmeAccount {
        AcmeAccount {
            ca_directory_url: user.ca().directory_url.clone(),
            email: user.email().to_string(),
            account_url: self.account_url.clone(),
            credentials: self.credentials.clone(),
            created_at: None,
        }
    }
}

impl From<AcmeAccount> for Registration {
    fn from(account: AcmeAccount) -> Self {
        Self {
            account_url: account.account_url,
            credentials: account.credentials,
        }
    }
}

#[derive(Debug)]
pub struct AcmeUser {
    ca: CaConfig,
    email: String,
    registration: OnceLock<Registration>,
}

impl AcmeUser {
    fn new(ca: &CaConfig, email: &str) -> Self {
        Self {
            ca: ca.clone(),
            email: email.to_ascii_lowercase(),
            registration: OnceLock::new(),
        }
    }

    /// CA the account belongs to
    pub fn ca(&self) -> &CaConfig {
        &self.ca
    }

    /// Contact email, lowercased
    pub fn email(&self) -> &str {
        &self.email
    }

    /// The attached registration, if any
    pub fn registration(&self) -> Option<&Registration> {
        self.registration.get()
    }

    /// Whether a registration with a non-empty account URL is attached
    pub fn has_registration(&self) -> bool {
        self.registration()
            .is_some_and(|r| !r.account_url.is_empty())
    }

    /// Registration URL, empty while unregistered
    pub fn account_url(&self) -> &str {
        self.registration()
            .map(|r| r.account_url.as_str())
            .unwrap_or_default()
    }

    /// Attach a registration; the first one wins
    pub fn set_registration(&self, registration: Registration) {
        let _ = self.registration.set(registration);
    }

    /// Identifies the registration request for deduplication
    pub fn registration_key(&self) -> String {
        format!("{}|{}", self.ca.directory_url, self.email)
    }
}

/// Process-wide cache of ACME users
#[derive(Debug, Default)]
pub struct AccountManager {
    users: DashMap<(String, String), Arc<AcmeUser>>,
}

impl AccountManager {
    /// Create an empty manager
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the user for (CA, email), creating it on first use
    ///
    /// Never touches the network. The email is compared case-insensitively,
    /// and concurrent first calls for the same pair get the same user.
    pub fn resolve_user(&self, ca: &CaConfig, email: &str) -> Arc<AcmeUser> {
        let key = (ca.directory_url.clone(), email.to_ascii_lowercase());
        self.users
            .entry(key)
            .or_insert_with(|| {
                debug!(email = %email, directory = %ca.directory_url, "New ACME user");
                Arc::new(AcmeUser::new(ca, email))
            })
            .value()
            .clone()
    }

    /// Number of cached users
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether no user has been resolved yet
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
