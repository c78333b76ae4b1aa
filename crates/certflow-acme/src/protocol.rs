//! The ACME wire protocol behind a trait
//!
//! [`AcmeProtocol`] is the seam between issuance orchestration and the
//! network. [`InstantAcmeProtocol`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use instant_acme::{
    Account, AccountCredentials, AuthorizationStatus, CertificateIdentifier, ChallengeType,
    ExternalAccountKey, Identifier, NewAccount, NewOrder, Order, OrderStatus, RetryPolicy,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account::{AcmeUser, Registration};
use crate::ca::CaConfig;
use crate::dns::{
    ChallengeProvider, Dns01Challenge, DnsChallengeOptions, PropagationChecker,
};
use crate::error::AcmeError;

/// One certificate order
pub struct OrderRequest<'a> {
    pub domains: &'a [String],
    /// DER-encoded CSR built for the certificate key
    pub csr_der: &'a [u8],
    /// Renewal identifier of the certificate being replaced
    pub replaces: Option<&'a str>,
    pub challenge_provider: &'a dyn ChallengeProvider,
    pub dns: &'a DnsChallengeOptions,
    pub cancel: &'a CancellationToken,
}

/// What the CA handed back for a completed order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedOrder {
    /// PEM chain, leaf first
    pub certificate_chain: String,
    pub cert_url: String,
    pub cert_stable_url: String,
}

#[async_trait]
pub trait AcmeProtocol: Send + Sync {
    /// Create (or look up) the account for `user` with the CA
    async fn register(&self, user: &AcmeUser) -> Result<Registration, AcmeError>;

    /// Validate every identifier over DNS-01 and download the certificate
    async fn obtain(
        &self,
        user: &AcmeUser,
        request: OrderRequest<'_>,
    ) -> Result<IssuedOrder, AcmeError>;
}

/// Production protocol client on top of `instant-acme`
#[derive(Debug, Clone)]
pub struct InstantAcmeProtocol {
    /// Upper bound for order validation and certificate download
    order_timeout: Duration,
}

impl InstantAcmeProtocol {
    /// Create a client with a five minute order timeout
    pub fn new() -> Self {
        Self {
            order_timeout: Duration::from_secs(300),
        }
    }

    /// Override the upper bound for order validation and download
    pub fn with_order_timeout(mut self, timeout: Duration) -> Self {
        self.order_timeout = timeout;
        self
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .timeout(self.order_timeout)
            .initial_delay(Duration::from_secs(2))
    }

    async fn load_account(&self, user: &AcmeUser) -> Result<Account, AcmeError> {
        let registration = user
            .registration()
            .ok_or_else(|| AcmeError::AccountCreation("account is not registered".into()))?;
        let credentials: AccountCredentials = serde_json::from_str(&registration.credentials)
            .map_err(|e| AcmeError::AccountCreation(format!("invalid stored credentials: {e}")))?;
        Account::builder()
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?
            .from_credentials(credentials)
            .await
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))
    }

    /// Collect the DNS-01 challenges of every pending authorization
    async fn collect_challenges(
        &self,
        order: &mut Order,
        ttl: Option<u32>,
    ) -> Result<Vec<(Dns01Challenge, String)>, AcmeError> {
        let mut challenges = Vec::new();
        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(|e| {
                AcmeError::OrderCreation(format!("Failed to get authorization: {e}"))
            })?;

            let domain = match &authz.identifier().identifier {
                Identifier::Dns(domain) => domain.clone(),
                _ => continue,
            };
            if authz.status == AuthorizationStatus::Valid {
                debug!(domain = %domain, "Authorization already valid");
                continue;
            }

            let challenge = authz
                .challenge(ChallengeType::Dns01)
                .ok_or_else(|| AcmeError::NoDns01Challenge(domain.clone()))?;
            let key_authorization = challenge.key_authorization();
            challenges.push((
                Dns01Challenge::new(&domain, &challenge.token, key_authorization.as_str())
                    .with_ttl(ttl),
                challenge.url.clone(),
            ));
        }
        Ok(challenges)
    }

    /// Everything after the records are in place
    async fn validate_and_download(
        &self,
        order: &mut Order,
        challenges: &[(Dns01Challenge, String)],
        checker: &PropagationChecker,
        request: &OrderRequest<'_>,
    ) -> Result<IssuedOrder, AcmeError> {
        for (challenge, _) in challenges {
            checker
                .wait_for_propagation(&challenge.fqdn, &challenge.value, request.cancel)
                .await?;
        }

        let mut authorizations = order.authorizations();
        while let Some(result) = authorizations.next().await {
            let mut authz = result.map_err(|e| AcmeError::ChallengeValidation {
                domain: "unknown".into(),
                message: format!("Failed to get authorization: {e}"),
            })?;
            let ready = authz
                .challenges
                .iter()
                .any(|c| challenges.iter().any(|(_, url)| *url == c.url));
            if !ready {
                continue;
            }
            if let Some(mut challenge) = authz.challenge(ChallengeType::Dns01) {
                challenge
                    .set_ready()
                    .await
                    .map_err(|e| AcmeError::ChallengeValidation {
                        domain: "unknown".into(),
                        message: e.to_string(),
                    })?;
            }
        }
        drop(authorizations);

        let retry = self.retry_policy();
        match order.poll_ready(&retry).await? {
            OrderStatus::Ready | OrderStatus::Valid => {}
            status => {
                return Err(AcmeError::ChallengeValidation {
                    domain: request.domains.join(","),
                    message: format!("order ended in state {status:?}"),
                })
            }
        }

        order
            .finalize_csr(request.csr_der)
            .await
            .map_err(|e| AcmeError::Finalization(e.to_string()))?;
        let certificate_chain = order
            .poll_certificate(&retry)
            .await
            .map_err(|e| AcmeError::Finalization(e.to_string()))?;

        let cert_url = order.state().certificate.clone().unwrap_or_default();
        Ok(IssuedOrder {
            certificate_chain,
            cert_stable_url: cert_url.clone(),
            cert_url,
        })
    }
}

/// `mailto:` contact URI for an account email
fn contact_uri(email: &str) -> String {
    format!("mailto:{email}")
}

/// External account binding key for CAs that were given one
fn external_account_key(ca: &CaConfig) -> Result<Option<ExternalAccountKey>, AcmeError> {
    let Some(eab) = &ca.eab else {
        return Ok(None);
    };
    let hmac = URL_SAFE_NO_PAD
        .decode(eab.hmac_key.trim_end_matches('='))
        .map_err(|e| AcmeError::AccountCreation(format!("invalid EAB HMAC key: {e}")))?;
    if hmac.is_empty() {
        return Err(AcmeError::AccountCreation("empty EAB HMAC key".into()));
    }
    Ok(Some(ExternalAccountKey::new(eab.kid.clone(), &hmac)))
}

impl Default for InstantAcmeProtocol {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AcmeProtocol for InstantAcmeProtocol {
    async fn register(&self, user: &AcmeUser) -> Result<Registration, AcmeError> {
        info!(email = %user.email(), directory = %user.ca().directory_url, "Registering ACME account");

        let eab = external_account_key(user.ca())?;
        let contact = contact_uri(user.email());
        let (account, credentials) = Account::builder()
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?
            .create(
                &NewAccount {
                    contact: &[&contact],
                    terms_of_service_agreed: true,
                    only_return_existing: false,
                },
                user.ca().directory_url.clone(),
                eab.as_ref(),
            )
            .await
            .map_err(|e| AcmeError::AccountCreation(e.to_string()))?;

        let credentials = serde_json::to_string(&credentials)
            .map_err(|e| AcmeError::AccountCreation(format!("Failed to serialize credentials: {e}")))?;
        Ok(Registration {
            account_url: account.id().to_string(),
            credentials,
        })
    }

    async fn obtain(
        &self,
        user: &AcmeUser,
        request: OrderRequest<'_>,
    ) -> Result<IssuedOrder, AcmeError> {
        let account = self.load_account(user).await?;
        let checker = PropagationChecker::with_config(request.dns.propagation_config()?);

        let identifiers: Vec<Identifier> = request
            .domains
            .iter()
            .map(|d| Identifier::Dns(d.clone()))
            .collect();
        let mut new_order = NewOrder::new(&identifiers);
        if let Some((aki, serial)) = request.replaces.and_then(|id| id.split_once('.')) {
            new_order = new_order.replaces(CertificateIdentifier {
                authority_key_identifier: aki.into(),
                serial: serial.into(),
            });
        }

        info!(domains = ?request.domains, replaces = ?request.replaces, "Creating certificate order");
        let mut order = account
            .new_order(&new_order)
            .await
            .map_err(|e| AcmeError::OrderCreation(e.to_string()))?;

        let mut challenges = self.collect_challenges(&mut order, request.dns.ttl).await?;
        if request.dns.follow_cname {
            for (challenge, _) in challenges.iter_mut() {
                challenge.fqdn = checker.resolve_cname(&challenge.fqdn).await;
            }
        }

        let provider = request.challenge_provider;
        let mut presented = Vec::new();
        let mut outcome = Ok(());
        for (challenge, _) in &challenges {
            debug!(fqdn = %challenge.fqdn, provider = %provider.name(), "Presenting DNS-01 record");
            if let Err(e) = provider.present(challenge).await {
                outcome = Err(AcmeError::from(e));
                break;
            }
            presented.push(challenge);
        }

        let outcome = match outcome {
            Ok(()) => tokio::select! {
                _ = request.cancel.cancelled() => Err(AcmeError::Cancelled),
                result = self.validate_and_download(&mut order, &challenges, &checker, &request) => result,
            },
            Err(e) => Err(e),
        };

        for challenge in presented {
            if let Err(e) = provider.cleanup(challenge).await {
                warn!(fqdn = %challenge.fqdn, error = %e, "Failed to clean up DNS-01 record");
            }
        }
        outcome
    }
}
