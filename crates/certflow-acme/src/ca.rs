//! Certificate authority selection

use certflow_domain::SslProviderSettings;
use serde_json::{Map, Value};

use crate::error::ApplyError;

/// Supported ACME certificate authorities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CaProvider {
    #[default]
    LetsEncrypt,
    LetsEncryptStaging,
    ZeroSsl,
    Gts,
}

impl CaProvider {
    /// Parse a provider name; an empty name selects the default CA
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "" | "letsencrypt" => Some(Self::LetsEncrypt),
            "letsencrypt_staging" => Some(Self::LetsEncryptStaging),
            "zerossl" => Some(Self::ZeroSsl),
            "gts" => Some(Self::Gts),
            _ => None,
        }
    }

    /// Settings name of the provider
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LetsEncrypt => "letsencrypt",
            Self::LetsEncryptStaging => "letsencrypt_staging",
            Self::ZeroSsl => "zerossl",
            Self::Gts => "gts",
        }
    }

    /// Production ACME directory of the provider
    pub fn directory_url(&self) -> &'static str {
        match self {
            Self::LetsEncrypt => "https://acme-v02.api.letsencrypt.org/directory",
            Self::LetsEncryptStaging => "https://acme-staging-v02.api.letsencrypt.org/directory",
            Self::ZeroSsl => "https://acme.zerossl.com/v2/DV90",
            Self::Gts => "https://dv.acme-v02.api.pki.goog/directory",
        }
    }

    /// Whether new accounts need external account binding credentials
    pub fn requires_eab(&self) -> bool {
        matches!(self, Self::ZeroSsl | Self::Gts)
    }
}

/// External account binding credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalAccountBinding {
    pub kid: String,
    /// Base64url-encoded HMAC key
    pub hmac_key: String,
}

/// Everything needed to talk to one CA
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaConfig {
    pub provider: CaProvider,
    pub directory_url: String,
    pub eab: Option<ExternalAccountBinding>,
}

impl CaConfig {
    /// The provider's public directory, without EAB credentials
    pub fn new(provider: CaProvider) -> Self {
        Self {
            provider,
            directory_url: provider.directory_url().to_string(),
            eab: None,
        }
    }

    /// Point at another directory, e.g. a test CA
    pub fn with_directory_url(mut self, url: impl Into<String>) -> Self {
        self.directory_url = url.into();
        self
    }

    /// Build from the `sslProvider` settings record
    pub fn from_settings(settings: &SslProviderSettings) -> Result<Self, ApplyError> {
        let provider = CaProvider::from_name(&settings.provider).ok_or_else(|| {
            ApplyError::config(
                "sslProvider.provider",
                format!("unsupported CA provider '{}'", settings.provider),
            )
        })?;

        let options = settings.provider_config(provider.as_str());
        let mut config = Self::new(provider);
        if provider.requires_eab() {
            config.eab = Some(ExternalAccountBinding {
                kid: required(&options, provider, "eabKid")?,
                hmac_key: required(&options, provider, "eabHmacKey")?,
            });
        }
        Ok(config)
    }
}

impl Default for CaConfig {
    fn default() -> Self {
        Self::new(CaProvider::default())
    }
}

fn required(
    options: &Map<String, Value>,
    provider: CaProvider,
    key: &str,
) -> Result<String, ApplyError> {
    options
        .get(key)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ApplyError::config(
                format!("sslProvider.config.{}.{}", provider.as_str(), key),
                "required for external account binding",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(value: Value) -> SslProviderSettings {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_default_provider_is_letsencrypt() {
        let config = CaConfig::from_settings(&SslProviderSettings::default()).unwrap();
        assert_eq!(config.provider, CaProvider::LetsEncrypt);
        assert_eq!(
            config.directory_url,
            "https://acme-v02.api.letsencrypt.org/directory"
        );
        assert!(config.eab.is_none());
    }

    #[test]
    fn test_zerossl_requires_eab() {
        let err = CaConfig::from_settings(&settings(json!({ "provider": "zerossl" }))).unwrap_err();
        assert!(
            matches!(err, ApplyError::Config { ref field, .. } if field == "sslProvider.config.zerossl.eabKid")
        );

        let config = CaConfig::from_settings(&settings(json!({
            "provider": "zerossl",
            "config": { "zerossl": { "eabKid": "kid", "eabHmacKey": "a2V5" } }
        })))
        .unwrap();
        assert_eq!(
            config.eab,
            Some(ExternalAccountBinding {
                kid: "kid".into(),
                hmac_key: "a2V5".into()
            })
        );
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        assert!(CaConfig::from_settings(&settings(json!({ "provider": "acme-corp" }))).is_err());
    }
}
