//! Certificate key algorithms

use rcgen::{KeyPair, RsaKeySize};
use rsa::pkcs8::EncodePrivateKey;
use rsa::RsaPrivateKey;
use rustls::pki_types::PrivatePkcs8KeyDer;
use tracing::{debug, warn};

use crate::error::ApplyError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    #[default]
    Rsa2048,
    Rsa3072,
    Rsa4096,
    Rsa8192,
    Ec256,
    Ec384,
}

impl KeyAlgorithm {
    /// Parse an algorithm name, falling back to RSA-2048 for anything unknown
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "RSA2048" => Self::Rsa2048,
            "RSA3072" => Self::Rsa3072,
            "RSA4096" => Self::Rsa4096,
            "RSA8192" => Self::Rsa8192,
            "EC256" => Self::Ec256,
            "EC384" => Self::Ec384,
            "" => Self::default(),
            other => {
                warn!(algorithm = %other, "Unknown key algorithm, using RSA2048");
                Self::default()
            }
        }
    }

    /// Canonical name, as accepted by [`KeyAlgorithm::from_name`]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa2048 => "RSA2048",
            Self::Rsa3072 => "RSA3072",
            Self::Rsa4096 => "RSA4096",
            Self::Rsa8192 => "RSA8192",
            Self::Ec256 => "EC256",
            Self::Ec384 => "EC384",
        }
    }

    /// Generate a fresh certificate key
    pub fn generate(&self) -> Result<KeyPair, ApplyError> {
        let rsa = |size| KeyPair::generate_rsa_for(&rcgen::PKCS_RSA_SHA256, size);
        let result = match self {
            Self::Rsa2048 => rsa(RsaKeySize::_2048),
            Self::Rsa3072 => rsa(RsaKeySize::_3072),
            Self::Rsa4096 => rsa(RsaKeySize::_4096),
            Self::Rsa8192 => return generate_rsa_8192(),
            Self::Ec256 => KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256),
            Self::Ec384 => KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384),
        };
        result.map_err(|e| ApplyError::KeyGeneration(e.to_string()))
    }
}

/// The signing backend only generates RSA up to 4096 bits, so the 8192-bit
/// key is generated separately and loaded from its PKCS#8 encoding.
fn generate_rsa_8192() -> Result<KeyPair, ApplyError> {
    debug!("Generating RSA8192 key");
    let key = RsaPrivateKey::new(&mut rand::thread_rng(), 8192)
        .map_err(|e| ApplyError::KeyGeneration(format!("RSA8192: {e}")))?;
    let der = key
        .to_pkcs8_der()
        .map_err(|e| ApplyError::KeyGeneration(format!("RSA8192 PKCS#8: {e}")))?;
    let pkcs8 = PrivatePkcs8KeyDer::from(der.as_bytes().to_vec());
    KeyPair::from_pkcs8_der_and_sign_algo(&pkcs8, &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| ApplyError::KeyGeneration(format!("RSA8192: {e}")))
}

impl std::fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
