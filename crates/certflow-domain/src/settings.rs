//! System settings records and their typed views

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SETTINGS_NAME_SSL_PROVIDER: &str = "sslProvider";
pub const SETTINGS_NAME_PERSISTENCE: &str = "persistence";

/// A raw settings record, addressed by name
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub name: String,
    pub content: Value,
}

impl Settings {
    pub fn new(name: impl Into<String>, content: Value) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    /// Decode the content into a typed settings view
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.content.clone())
    }
}

/// CA selection plus per-CA options such as external account binding
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SslProviderSettings {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub config: HashMap<String, Map<String, Value>>,
}

impl SslProviderSettings {
    /// Options for the given CA, empty when none were configured
    pub fn provider_config(&self, provider: &str) -> Map<String, Value> {
        self.config.get(provider).cloned().unwrap_or_default()
    }
}

/// Retention windows in days; zero disables the corresponding sweep
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceSettings {
    #[serde(default)]
    pub expired_certificates_max_days_retention: u32,
    #[serde(default)]
    pub workflow_runs_max_days_retention: u32,
}
