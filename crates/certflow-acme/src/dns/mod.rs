//! DNS-01 challenge support
//!
//! - [`provider`]: the present/cleanup capability every DNS vendor implements
//! - [`challenge`]: record naming and value computation
//! - [`propagation`]: waits for records to become visible, follows CNAMEs
//! - [`webhook`]: generic HTTP provider for custom DNS management

pub mod challenge;
pub mod propagation;
pub mod provider;
pub mod webhook;

pub use challenge::{challenge_record_fqdn, compute_record_value, normalize_domain, Dns01Challenge};
pub use propagation::{DnsChallengeOptions, PropagationChecker, PropagationConfig};
pub use provider::{ChallengeProvider, DnsProviderError, DnsResult, CHALLENGE_TTL};
pub use webhook::WebhookDnsProvider;
