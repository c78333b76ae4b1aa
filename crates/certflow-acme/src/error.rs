//! ACME and issuance error types

use thiserror::Error;

use crate::dns::DnsProviderError;

/// Returned by every suspending operation when its cancellation token fires
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Protocol-level failures talking to the CA
///
/// Cloneable so that one registration result can be handed to every caller
/// that joined the same in-flight request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AcmeError {
    #[error("Failed to create ACME account: {0}")]
    AccountCreation(String),

    #[error("Failed to create certificate order: {0}")]
    OrderCreation(String),

    #[error("Challenge validation failed for domain '{domain}': {message}")]
    ChallengeValidation { domain: String, message: String },

    #[error("No DNS-01 challenge available for domain '{0}'")]
    NoDns01Challenge(String),

    #[error("Failed to finalize certificate: {0}")]
    Finalization(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("DNS provider error: {0}")]
    DnsProvider(DnsProviderError),

    #[error("ACME protocol error: {0}")]
    Protocol(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<Cancelled> for AcmeError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

impl From<DnsProviderError> for AcmeError {
    fn from(e: DnsProviderError) -> Self {
        match e {
            DnsProviderError::Cancelled => Self::Cancelled,
            other => Self::DnsProvider(other),
        }
    }
}

impl From<instant_acme::Error> for AcmeError {
    fn from(e: instant_acme::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Failures of one end-to-end issuance
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplyError {
    #[error("Invalid configuration: field `{field}`: {reason}")]
    Config { field: String, reason: String },

    #[error("Failed to load SSL provider settings: {0}")]
    Settings(String),

    #[error("Failed to generate key: {0}")]
    KeyGeneration(String),

    #[error("Failed to register ACME account: {0}")]
    Registration(AcmeError),

    #[error("Failed to obtain certificate: {0}")]
    Obtain(AcmeError),

    #[error("Invalid certificate returned by CA: {0}")]
    Certificate(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ApplyError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a registration failure, keeping cancellation distinct
    pub fn registration(e: AcmeError) -> Self {
        match e {
            AcmeError::Cancelled => Self::Cancelled,
            other => Self::Registration(other),
        }
    }

    /// Wrap an order failure, keeping cancellation distinct
    pub fn obtain(e: AcmeError) -> Self {
        match e {
            AcmeError::Cancelled => Self::Cancelled,
            other => Self::Obtain(other),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<Cancelled> for ApplyError {
    fn from(_: Cancelled) -> Self {
        Self::Cancelled
    }
}

#[derive(Debug, Error)]
pub enum X509Error {
    #[error("Invalid PEM: {0}")]
    Pem(String),

    #[error("Invalid certificate: {0}")]
    Certificate(String),

    #[error("Invalid private key: {0}")]
    PrivateKey(String),

    #[error("Certificate has no {0}")]
    Missing(&'static str),
}
