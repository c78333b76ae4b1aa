//! Provider capabilities invoked by action nodes
//!
//! Nodes only know capabilities ([`Deployer`], [`Uploader`], [`Notifier`],
//! DNS-01 [`ChallengeProvider`]); concrete vendors are looked up by name in
//! a [`ProviderRegistry`] and built from a merged config map.

mod local;
mod webhook;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use certflow_acme::dns::{ChallengeProvider, WebhookDnsProvider};
use serde_json::{Map, Value};

use crate::error::ProviderError;

pub use local::LocalDeployer;
pub use webhook::{WebhookDeployer, WebhookNotifier};

/// Provider-specific details about a completed call, recorded in the node log
pub type ProviderOutput = Map<String, Value>;

pub type ProviderConfig = Map<String, Value>;

#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(&self, certificate: &str, private_key: &str)
        -> Result<ProviderOutput, ProviderError>;
}

#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, certificate: &str, private_key: &str)
        -> Result<ProviderOutput, ProviderError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, message: &str) -> Result<ProviderOutput, ProviderError>;
}

type Factory<T> = Arc<dyn Fn(&ProviderConfig) -> Result<Arc<T>, ProviderError> + Send + Sync>;

/// Name-indexed provider factories
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    dns: HashMap<String, Factory<dyn ChallengeProvider>>,
    deployers: HashMap<String, Factory<dyn Deployer>>,
    uploaders: HashMap<String, Factory<dyn Uploader>>,
    notifiers: HashMap<String, Factory<dyn Notifier>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the generic `webhook` and `local` providers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_dns("webhook", |config| {
            let provider: Arc<dyn ChallengeProvider> = Arc::new(
                WebhookDnsProvider::from_config(config)
                    .map_err(|e| ProviderError::Configuration(e.to_string()))?,
            );
            Ok(provider)
        });
        registry.register_deployer("local", |config| {
            let deployer: Arc<dyn Deployer> = Arc::new(LocalDeployer::from_config(config)?);
            Ok(deployer)
        });
        registry.register_deployer("webhook", |config| {
            let deployer: Arc<dyn Deployer> = Arc::new(WebhookDeployer::from_config(config)?);
            Ok(deployer)
        });
        registry.register_notifier("webhook", |config| {
            let notifier: Arc<dyn Notifier> = Arc::new(WebhookNotifier::from_config(config)?);
            Ok(notifier)
        });
        registry
    }

    pub fn register_dns<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn ChallengeProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        self.dns.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_deployer<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn Deployer>, ProviderError> + Send + Sync + 'static,
    {
        self.deployers.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_uploader<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn Uploader>, ProviderError> + Send + Sync + 'static,
    {
        self.uploaders.insert(name.to_string(), Arc::new(factory));
    }

    pub fn register_notifier<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Arc<dyn Notifier>, ProviderError> + Send + Sync + 'static,
    {
        self.notifiers.insert(name.to_string(), Arc::new(factory));
    }

    pub fn dns(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ChallengeProvider>, ProviderError> {
        build(&self.dns, "DNS", name, config)
    }

    pub fn deployer(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn Deployer>, ProviderError> {
        build(&self.deployers, "deploy", name, config)
    }

    /// `None` when `name` is not registered as an uploader
    pub fn uploader(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Option<Result<Arc<dyn Uploader>, ProviderError>> {
        self.uploaders.get(name).map(|factory| factory(config))
    }

    pub fn notifier(
        &self,
        name: &str,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn Notifier>, ProviderError> {
        build(&self.notifiers, "notify", name, config)
    }
}

fn build<T: ?Sized>(
    factories: &HashMap<String, Factory<T>>,
    kind: &'static str,
    name: &str,
    config: &ProviderConfig,
) -> Result<Arc<T>, ProviderError> {
    let factory = factories.get(name).ok_or_else(|| ProviderError::Unknown {
        kind,
        name: name.to_string(),
    })?;
    factory(config)
}

/// Read a required string setting
pub(crate) fn required_str<'a>(config: &'a ProviderConfig, key: &str) -> Result<&'a str, ProviderError> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ProviderError::Configuration(format!("`{key}` is required")))
}

/// Access credentials overlaid with node-level settings
pub fn merge_config(base: &ProviderConfig, overrides: &ProviderConfig) -> ProviderConfig {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> ProviderConfig {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_unknown_provider_is_reported() {
        let registry = ProviderRegistry::with_builtins();
        let err = registry.notifier("carrier-pigeon", &Map::new()).err().unwrap();
        assert_eq!(
            err,
            ProviderError::Unknown {
                kind: "notify",
                name: "carrier-pigeon".into()
            }
        );
        assert!(registry.uploader("local", &Map::new()).is_none());
    }

    #[test]
    fn test_builtins_validate_config() {
        let registry = ProviderRegistry::with_builtins();
        assert!(registry.dns("webhook", &Map::new()).is_err());
        assert!(registry
            .dns("webhook", &map(json!({ "url": "https://dns.example.com/hook" })))
            .is_ok());
        assert!(registry.deployer("local", &Map::new()).is_err());
        assert!(registry
            .notifier("webhook", &map(json!({ "url": "https://hooks.example.com" })))
            .is_ok());
    }

    #[test]
    fn test_merge_config_prefers_overrides() {
        let merged = merge_config(
            &map(json!({ "url": "https://a", "authToken": "secret" })),
            &map(json!({ "url": "https://b" })),
        );
        assert_eq!(merged.get("url"), Some(&json!("https://b")));
        assert_eq!(merged.get("authToken"), Some(&json!("secret")));
    }
}
