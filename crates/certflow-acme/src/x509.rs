//! PEM and X.509 helpers

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::pem::parse_x509_pem;

use crate::error::X509Error;

const PEM_CERT_END: &str = "-----END CERTIFICATE-----";

/// Fields of a leaf certificate the rest of the system stores
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject_alt_names: Vec<String>,
    /// Lowercase hex
    pub serial_number: String,
    pub issuer_org: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

fn with_leaf<T>(
    pem: &str,
    f: impl FnOnce(&X509Certificate<'_>) -> Result<T, X509Error>,
) -> Result<T, X509Error> {
    let (_, pem) = parse_x509_pem(pem.trim().as_bytes()).map_err(|e| X509Error::Pem(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| X509Error::Certificate(e.to_string()))?;
    f(&cert)
}

/// Parse the first certificate of a PEM bundle
pub fn parse_certificate_pem(pem: &str) -> Result<CertificateInfo, X509Error> {
    with_leaf(pem, |cert| {
        let subject_alt_names = match cert.subject_alternative_name() {
            Ok(Some(san)) => san
                .value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some(dns.to_string()),
                    _ => None,
                })
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => return Err(X509Error::Certificate(e.to_string())),
        };

        let timestamp = |secs: i64| {
            DateTime::from_timestamp(secs, 0).ok_or(X509Error::Missing("valid validity window"))
        };

        Ok(CertificateInfo {
            subject_alt_names,
            serial_number: hex(cert.tbs_certificate.raw_serial()),
            issuer_org: cert
                .issuer()
                .iter_organization()
                .next()
                .and_then(|o| o.as_str().ok())
                .unwrap_or_default()
                .to_string(),
            not_before: timestamp(cert.validity().not_before.timestamp())?,
            not_after: timestamp(cert.validity().not_after.timestamp())?,
        })
    })
}

/// Renewal-information identifier of a certificate
///
/// `base64url(authorityKeyIdentifier) "." base64url(serial)`, both without
/// padding, with the serial taken as its DER integer bytes.
pub fn ari_certificate_id(pem: &str) -> Result<String, X509Error> {
    with_leaf(pem, |cert| {
        let aki = cert
            .extensions()
            .iter()
            .find_map(|ext| match ext.parsed_extension() {
                ParsedExtension::AuthorityKeyIdentifier(aki) => {
                    aki.key_identifier.as_ref().map(|k| k.0.to_vec())
                }
                _ => None,
            })
            .ok_or(X509Error::Missing("authority key identifier"))?;

        Ok(format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(aki),
            URL_SAFE_NO_PAD.encode(cert.tbs_certificate.raw_serial())
        ))
    })
}

/// Split a PEM chain into the leaf and the remaining issuer certificates
pub fn split_chain(chain: &str) -> (String, String) {
    match chain.find(PEM_CERT_END) {
        Some(idx) => {
            let end = idx + PEM_CERT_END.len();
            (
                chain[..end].trim().to_string(),
                chain[end..].trim().to_string(),
            )
        }
        None => (chain.trim().to_string(), String::new()),
    }
}

/// Check that a PEM block holds a private key in a supported encoding
pub fn validate_private_key_pem(pem: &str) -> Result<(), X509Error> {
    match rustls_pemfile::private_key(&mut pem.as_bytes()) {
        Ok(Some(_)) => Ok(()),
        Ok(None) => Err(X509Error::PrivateKey("no private key found".into())),
        Err(e) => Err(X509Error::PrivateKey(e.to_string())),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
