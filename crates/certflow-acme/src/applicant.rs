//! End-to-end certificate issuance
//!
//! [`Applicant`] ties the pieces together: CA selection from settings,
//! account resolution and deduplicated registration, per-email rate
//! limiting, replacement detection and the protocol exchange itself.
//!
//! With an account store attached, registrations are looked up before
//! asking the CA and saved afterwards, so a restarted process keeps its
//! account and with it the right to declare ARI replacements.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use certflow_domain::{
    AcmeAccountRepository, RepositoryError, SettingsRepository, SslProviderSettings,
    SETTINGS_NAME_SSL_PROVIDER,
};
use rcgen::{CertificateParams, DistinguishedName, DnType};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account::{AccountManager, AcmeUser, Registration};
use crate::ari::{ReplacementGuard, ReplacementHint};
use crate::ca::CaConfig;
use crate::dns::{ChallengeProvider, DnsChallengeOptions};
use crate::error::{AcmeError, ApplyError};
use crate::key_algorithm::KeyAlgorithm;
use crate::limiter::IssuanceLimiter;
use crate::protocol::{AcmeProtocol, OrderRequest};
use crate::singleflight::SingleFlight;
use crate::x509::split_chain;

/// Inputs of one issuance
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub domains: Vec<String>,
    pub contact_email: String,
    pub challenge_provider: Arc<dyn ChallengeProvider>,
    pub key_algorithm: KeyAlgorithm,
    pub nameservers: Vec<String>,
    pub dns_propagation_timeout: Option<Duration>,
    pub dns_ttl: Option<u32>,
    pub disable_follow_cname: bool,
    pub replacement: Option<ReplacementHint>,
}

impl ApplyRequest {
    /// Request with the default key algorithm and DNS options
    pub fn new(
        domains: Vec<String>,
        contact_email: impl Into<String>,
        challenge_provider: Arc<dyn ChallengeProvider>,
    ) -> Self {
        Self {
            domains,
            contact_email: contact_email.into(),
            challenge_provider,
            key_algorithm: KeyAlgorithm::default(),
            nameservers: Vec::new(),
            dns_propagation_timeout: None,
            dns_ttl: None,
            disable_follow_cname: false,
            replacement: None,
        }
    }

    fn dns_options(&self) -> DnsChallengeOptions {
        DnsChallengeOptions {
            nameservers: self.nameservers.clone(),
            propagation_timeout: self.dns_propagation_timeout,
            ttl: self.dns_ttl,
            follow_cname: !self.disable_follow_cname,
        }
    }
}

/// A certificate as issued, PEM fields trimmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyResult {
    pub certificate_full_chain: String,
    pub issuer_certificate: String,
    pub private_key: String,
    pub csr: String,
    pub acme_account_url: String,
    pub acme_cert_url: String,
    pub acme_cert_stable_url: String,
    /// Renewal identifier sent with the order, if any
    pub replaced_cert_id: Option<String>,
}

/// The capability to obtain a certificate
#[async_trait]
pub trait CertificateIssuer: Send + Sync {
    async fn apply(
        &self,
        request: ApplyRequest,
        cancel: &CancellationToken,
    ) -> Result<ApplyResult, ApplyError>;
}

pub struct Applicant {
    settings: Arc<dyn SettingsRepository>,
    protocol: Arc<dyn AcmeProtocol>,
    accounts: AccountManager,
    account_store: Option<Arc<dyn AcmeAccountRepository>>,
    registrations: SingleFlight<String, Registration, AcmeError>,
    limiter: IssuanceLimiter,
    guard: ReplacementGuard,
}

impl Applicant {
    /// Create an applicant reading CA settings from `settings`
    pub fn new(settings: Arc<dyn SettingsRepository>, protocol: Arc<dyn AcmeProtocol>) -> Self {
        Self {
            settings,
            protocol,
            accounts: AccountManager::new(),
            account_store: None,
            registrations: SingleFlight::new(),
            limiter: IssuanceLimiter::default(),
            guard: ReplacementGuard::default(),
        }
    }

    /// Reuse accounts kept in `store` and save new registrations to it
    pub fn with_account_store(mut self, store: Arc<dyn AcmeAccountRepository>) -> Self {
        self.account_store = Some(store);
        self
    }

    /// Replace the default per-email issuance limiter
    pub fn with_limiter(mut self, limiter: IssuanceLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    /// Replace the default replacement guard
    pub fn with_guard(mut self, guard: ReplacementGuard) -> Self {
        self.guard = guard;
        self
    }

    async fn load_ca_config(&self) -> Result<CaConfig, ApplyError> {
        let settings: SslProviderSettings =
            match self.settings.get_by_name(SETTINGS_NAME_SSL_PROVIDER).await {
                Ok(record) => record
                    .content_as()
                    .map_err(|e| ApplyError::Settings(e.to_string()))?,
                Err(RepositoryError::NotFound { .. }) => SslProviderSettings::default(),
                Err(e) => return Err(ApplyError::Settings(e.to_string())),
            };
        CaConfig::from_settings(&settings)
    }

    /// Attach a registration to `user`, from the store or from the CA
    async fn ensure_registered(
        &self,
        user: &Arc<AcmeUser>,
        cancel: &CancellationToken,
    ) -> Result<(), ApplyError> {
        if user.has_registration() {
            return Ok(());
        }

        let protocol = self.protocol.clone();
        let store = self.account_store.clone();
        let registering = user.clone();
        let registration = self
            .registrations
            .work(user.registration_key(), cancel, || async move {
                if let Some(stored) = load_registration(store.as_deref(), &registering).await {
                    return Ok(stored);
                }
                let registration = protocol.register(&registering).await?;
                if let Some(store) = &store {
                    if let Err(e) = store.save(registration.to_account(&registering)).await {
                        warn!(email = %registering.email(), error = %e, "Failed to store ACME account");
                    }
                }
                Ok(registration)
            })
            .await
            .map_err(ApplyError::registration)?;
        user.set_registration(registration);
        Ok(())
    }
}

/// Stored registration for `user`; lookup failures fall through to a new registration
async fn load_registration(
    store: Option<&dyn AcmeAccountRepository>,
    user: &AcmeUser,
) -> Option<Registration> {
    let store = store?;
    match store
        .get_by_ca_and_email(&user.ca().directory_url, user.email())
        .await
    {
        Ok(account) if !account.account_url.is_empty() => {
            debug!(account = %account.account_url, "Reusing stored ACME account");
            Some(account.into())
        }
        Ok(_) => None,
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            warn!(email = %user.email(), error = %e, "Failed to load stored ACME account");
            None
        }
    }
}

fn build_csr(
    domains: &[String],
    key: &rcgen::KeyPair,
) -> Result<(Vec<u8>, String), ApplyError> {
    let mut params = CertificateParams::new(domains.to_vec())
        .map_err(|e| ApplyError::config("domains", e.to_string()))?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, domains[0].clone());
    params.distinguished_name = name;

    let csr = params
        .serialize_request(key)
        .map_err(|e| ApplyError::KeyGeneration(format!("CSR: {e}")))?;
    let pem = csr
        .pem()
        .map_err(|e| ApplyError::KeyGeneration(format!("CSR: {e}")))?;
    Ok((csr.der().to_vec(), pem))
}

#[async_trait]
impl CertificateIssuer for Applicant {
    async fn apply(
        &self,
        request: ApplyRequest,
        cancel: &CancellationToken,
    ) -> Result<ApplyResult, ApplyError> {
        if request.domains.is_empty() {
            return Err(ApplyError::config("domains", "at least one domain is required"));
        }
        if !request.contact_email.contains('@') {
            return Err(ApplyError::config("contactEmail", "a valid email is required"));
        }

        let ca = self.load_ca_config().await?;
        let user = self.accounts.resolve_user(&ca, &request.contact_email);
        self.ensure_registered(&user, cancel).await?;
        debug!(account = %user.account_url(), "Using ACME account");

        let key = request.key_algorithm.generate()?;
        let (csr_der, csr_pem) = build_csr(&request.domains, &key)?;

        let replaces = request
            .replacement
            .as_ref()
            .filter(|hint| self.guard.should_submit(hint, user.account_url()))
            .map(|hint| hint.cert_id.clone());

        self.limiter.acquire(user.email(), cancel).await?;

        info!(
            domains = ?request.domains,
            ca = %ca.provider.as_str(),
            key_algorithm = %request.key_algorithm,
            replacement = replaces.is_some(),
            "Obtaining certificate"
        );
        let dns = request.dns_options();
        let issued = self
            .protocol
            .obtain(
                &user,
                OrderRequest {
                    domains: &request.domains,
                    csr_der: &csr_der,
                    replaces: replaces.as_deref(),
                    challenge_provider: request.challenge_provider.as_ref(),
                    dns: &dns,
                    cancel,
                },
            )
            .await
            .map_err(ApplyError::obtain)?;

        let (_, issuer) = split_chain(&issued.certificate_chain);
        Ok(ApplyResult {
            certificate_full_chain: issued.certificate_chain.trim().to_string(),
            issuer_certificate: issuer,
            private_key: key.serialize_pem().trim().to_string(),
            csr: csr_pem.trim().to_string(),
            acme_account_url: user.account_url().trim().to_string(),
            acme_cert_url: issued.cert_url.trim().to_string(),
            acme_cert_stable_url: issued.cert_stable_url.trim().to_string(),
            replaced_cert_id: replaces,
        })
    }
}
