use async_trait::async_trait;
use thiserror::Error;

use super::challenge::Dns01Challenge;

pub type DnsResult<T> = Result<T, DnsProviderError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DnsProviderError {
    #[error("Failed to create TXT record for '{record_name}': {message}")]
    RecordCreation { record_name: String, message: String },

    #[error("Failed to delete TXT record '{record_name}': {message}")]
    RecordDeletion { record_name: String, message: String },

    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("Propagation of '{record_name}' timed out after {elapsed_secs}s")]
    Timeout { record_name: String, elapsed_secs: u64 },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// A DNS vendor able to publish DNS-01 challenge records
///
/// Implementations must tolerate `cleanup` for records that were never
/// created, since cleanup also runs after partial failures.
#[async_trait]
pub trait ChallengeProvider: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    async fn present(&self, challenge: &Dns01Challenge) -> DnsResult<()>;

    async fn cleanup(&self, challenge: &Dns01Challenge) -> DnsResult<()>;
}

/// Default TTL for challenge records, in seconds
pub const CHALLENGE_TTL: u32 = 60;
