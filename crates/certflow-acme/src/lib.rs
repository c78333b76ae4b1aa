//! ACME certificate issuance
//!
//! Obtains certificates from ACME CAs over DNS-01:
//!
//! - [`account`]: per (CA, email) identities, reused across runs when stored
//! - [`singleflight`]: one in-flight registration per account
//! - [`limiter`]: per-email token buckets guarding the CA's rate limits
//! - [`ari`]: decides when an order replaces an earlier certificate
//! - [`applicant`]: the orchestration, exposed as [`CertificateIssuer`]
//! - [`protocol`]: the wire protocol seam and its `instant-acme` client
//! - [`dns`]: DNS-01 records, providers and propagation checks

pub mod account;
pub mod applicant;
pub mod ari;
pub mod ca;
pub mod dns;
pub mod error;
pub mod key_algorithm;
pub mod limiter;
pub mod protocol;
pub mod singleflight;
pub mod x509;

#[cfg(test)]
mod testing;

pub use account::{AccountManager, AcmeUser, Registration};
pub use applicant::{Applicant, ApplyRequest, ApplyResult, CertificateIssuer};
pub use ari::{detect_replacement, ReplacementGuard, ReplacementHint};
pub use ca::{CaConfig, CaProvider, ExternalAccountBinding};
pub use error::{AcmeError, ApplyError, Cancelled, X509Error};
pub use key_algorithm::KeyAlgorithm;
pub use limiter::IssuanceLimiter;
pub use protocol::{AcmeProtocol, InstantAcmeProtocol, IssuedOrder, OrderRequest};
pub use singleflight::SingleFlight;
