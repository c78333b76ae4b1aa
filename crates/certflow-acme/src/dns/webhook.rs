//! Generic webhook DNS provider
//!
//! Delegates record management to a user endpoint. Both operations POST the
//! same JSON document and differ only in `action`:
//!
//! ```text
//! POST {url}
//! Content-Type: application/json
//!
//! {
//!   "action": "present",          // or "cleanup"
//!   "domain": "*.example.com",
//!   "fqdn": "_acme-challenge.example.com",
//!   "value": "<base64url digest>",
//!   "ttl": 60
//! }
//! ```
//!
//! Any 2xx response counts as success.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::challenge::Dns01Challenge;
use super::provider::{ChallengeProvider, DnsProviderError, DnsResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct RecordRequest<'a> {
    action: &'a str,
    domain: &'a str,
    fqdn: &'a str,
    value: &'a str,
    ttl: u32,
}

#[derive(Debug)]
pub struct WebhookDnsProvider {
    client: Client,
    url: String,
    /// Header name and value sent with every request
    auth: Option<(String, String)>,
}

impl WebhookDnsProvider {
    /// Provider posting to `url`, with an optional auth header
    pub fn new(url: &str, auth: Option<(String, String)>) -> DnsResult<Self> {
        if url.is_empty() {
            return Err(DnsProviderError::Configuration(
                "webhook url is required".into(),
            ));
        }
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| {
                DnsProviderError::Configuration(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
            auth,
        })
    }

    /// Build from an access config: `url`, optional `authHeader` + `authToken`
    pub fn from_config(config: &Map<String, Value>) -> DnsResult<Self> {
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
        Self::new(get("url").unwrap_or_default(), auth)
    }

    async fn send(&self, action: &str, challenge: &Dns01Challenge) -> Result<(), String> {
        let body = RecordRequest {
            action,
            domain: &challenge.domain,
            fqdn: &challenge.fqdn,
            value: &challenge.value,
            ttl: challenge.ttl,
        };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some((header, value)) = &self.auth {
            request = request.header(header.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("Webhook request failed: {e}"))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(format!("Webhook returned HTTP {status} - {text}"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChallengeProvider for WebhookDnsProvider {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn present(&self, challenge: &Dns01Challenge) -> DnsResult<()> {
        debug!(fqdn = %challenge.fqdn, url = %self.url, "Creating TXT record via webhook");
        self.send("present", challenge)
            .await
            .map_err(|message| DnsProviderError::RecordCreation {
                record_name: challenge.fqdn.clone(),
                message,
            })
    }

    async fn cleanup(&self, challenge: &Dns01Challenge) -> DnsResult<()> {
        debug!(fqdn = %challenge.fqdn, url = %self.url, "Deleting TXT record via webhook");
        self.send("cleanup", challenge)
            .await
            .map_err(|message| DnsProviderError::RecordDeletion {
                record_name: challenge.fqdn.clone(),
                message,
            })
    }
}
