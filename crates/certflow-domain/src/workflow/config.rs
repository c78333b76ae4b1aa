//! Typed views over node config maps

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::expr::Expr;
use crate::certificate::split_domains;
use crate::error::DomainError;

fn invalid(node_id: &str, field: &str, reason: &str) -> DomainError {
    DomainError::InvalidNodeConfig {
        node_id: node_id.to_string(),
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Config of an `apply` node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplyNodeConfig {
    /// `;`-joined domain list
    #[serde(default)]
    pub domains: String,
    #[serde(default)]
    pub contact_email: String,
    /// DNS-01 provider name
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub provider_access_id: String,
    #[serde(default)]
    pub provider_config: Map<String, Value>,
    #[serde(default)]
    pub key_algorithm: String,
    /// `;`-joined custom recursive nameservers
    #[serde(default)]
    pub nameservers: String,
    /// Seconds
    #[serde(default)]
    pub dns_propagation_timeout: Option<u64>,
    #[serde(default, rename = "dnsTTL")]
    pub dns_ttl: Option<u32>,
    #[serde(default, rename = "disableFollowCNAME")]
    pub disable_follow_cname: bool,
    /// Skip issuance while the last certificate has more days left than this; 0 never skips
    #[serde(default)]
    pub skip_before_expiry_days: u32,
}

impl ApplyNodeConfig {
    /// Requested domains, deduplicated in declaration order
    pub fn domain_list(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for d in split_domains(&self.domains) {
            let d = d.to_ascii_lowercase();
            if !out.contains(&d) {
                out.push(d);
            }
        }
        out
    }

    pub fn nameserver_list(&self) -> Vec<String> {
        split_domains(&self.nameservers)
    }

    pub fn validate(&self, node_id: &str) -> Result<(), DomainError> {
        if self.domain_list().is_empty() {
            return Err(invalid(node_id, "domains", "at least one domain is required"));
        }
        if !self.contact_email.contains('@') {
            return Err(invalid(node_id, "contactEmail", "a valid email is required"));
        }
        if self.provider.is_empty() {
            return Err(invalid(node_id, "provider", "a DNS provider is required"));
        }
        Ok(())
    }
}

/// Config of an `upload` node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UploadNodeConfig {
    #[serde(default)]
    pub certificate: String,
    #[serde(default)]
    pub private_key: String,
}

impl UploadNodeConfig {
    pub fn validate(&self, node_id: &str) -> Result<(), DomainError> {
        if self.certificate.trim().is_empty() {
            return Err(invalid(node_id, "certificate", "certificate PEM is required"));
        }
        if self.private_key.trim().is_empty() {
            return Err(invalid(node_id, "privateKey", "private key PEM is required"));
        }
        Ok(())
    }
}

/// Config of a `deploy` node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeployNodeConfig {
    /// Output selector of the form `<nodeId>#certificate`
    #[serde(default)]
    pub certificate: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub provider_access_id: String,
    #[serde(default)]
    pub provider_config: Map<String, Value>,
    #[serde(default)]
    pub skip_on_last_succeeded: bool,
}

impl DeployNodeConfig {
    /// The node whose certificate output is deployed
    pub fn source_node_id(&self) -> &str {
        self.certificate
            .split_once('#')
            .map(|(id, _)| id)
            .unwrap_or(&self.certificate)
    }

    pub fn validate(&self, node_id: &str) -> Result<(), DomainError> {
        if self.source_node_id().is_empty() {
            return Err(invalid(node_id, "certificate", "a source certificate node is required"));
        }
        if self.provider.is_empty() {
            return Err(invalid(node_id, "provider", "a deploy provider is required"));
        }
        Ok(())
    }
}

/// Config of a `notify` node
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotifyNodeConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub provider_access_id: String,
    #[serde(default)]
    pub provider_config: Map<String, Value>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub skip_on_all_prev_skipped: bool,
}

impl NotifyNodeConfig {
    pub fn validate(&self, node_id: &str) -> Result<(), DomainError> {
        if self.provider.is_empty() {
            return Err(invalid(node_id, "provider", "a notify provider is required"));
        }
        if self.subject.is_empty() && self.message.is_empty() {
            return Err(invalid(node_id, "subject", "subject or message is required"));
        }
        Ok(())
    }
}

/// Config of a `condition` node; no expression always passes
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConditionNodeConfig {
    #[serde(default)]
    pub expression: Option<Expr>,
}
