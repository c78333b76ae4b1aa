//! JSON webhook deployer and notifier
//!
//! Both POST a JSON document to `url`, optionally with an auth header
//! (`authHeader`, default `Authorization`, carrying `authToken`). Any 2xx
//! response counts as success.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::{required_str, Deployer, Notifier, ProviderConfig, ProviderOutput};
use crate::error::ProviderError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct WebhookTarget {
    client: Client,
    url: String,
    auth: Option<(String, String)>,
}

impl WebhookTarget {
    fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let url = required_str(config, "url")?.to_string();
        let get = |key: &str| {
            config
                .get(key)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
        };
        let auth = get("authToken").map(|token| {
            (
                get("authHeader").unwrap_or("Authorization").to_string(),
                token.to_string(),
            )
        });
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, url, auth })
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<ProviderOutput, ProviderError> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some((header, value)) = &self.auth {
            request = request.header(header.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Request(format!("Webhook request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Request(format!(
                "Webhook returned HTTP {status} - {text}"
            )));
        }

        let mut output = ProviderOutput::new();
        output.insert("status".into(), Value::from(status.as_u16()));
        Ok(output)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeployPayload<'a> {
    certificate: &'a str,
    private_key: &'a str,
}

#[derive(Serialize)]
struct NotifyPayload<'a> {
    subject: &'a str,
    message: &'a str,
}

#[derive(Debug, Clone)]
pub struct WebhookDeployer {
    target: WebhookTarget,
}

impl WebhookDeployer {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            target: WebhookTarget::from_config(config)?,
        })
    }
}

#[async_trait]
impl Deployer for WebhookDeployer {
    async fn deploy(
        &self,
        certificate: &str,
        private_key: &str,
    ) -> Result<ProviderOutput, ProviderError> {
        debug!(url = %self.target.url, "Deploying certificate via webhook");
        self.target
            .post(&DeployPayload {
                certificate,
                private_key,
            })
            .await
    }
}

#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    target: WebhookTarget,
}

impl WebhookNotifier {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            target: WebhookTarget::from_config(config)?,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<ProviderOutput, ProviderError> {
        debug!(url = %self.target.url, "Sending notification via webhook");
        self.target.post(&NotifyPayload { subject, message }).await
    }
}
