//! Project configuration file support
//!
//! A `.certflow.yml` file declares CA settings, provider accesses and the
//! workflows to run. It is discovered by walking up from the current
//! directory, and `${VAR}` references are expanded from the environment
//! before parsing so secrets can stay out of the file.

use anyhow::{Context, Result};
use certflow_domain::{
    Access, MemoryStore, PersistenceSettings, Settings, SslProviderSettings, Workflow,
    WorkflowTrigger, SETTINGS_NAME_PERSISTENCE, SETTINGS_NAME_SSL_PROVIDER,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAMES: [&str; 2] = [".certflow.yml", ".certflow.yaml"];

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub settings: ProjectSettings,

    /// Provider credentials referenced by nodes through `providerAccessId`
    #[serde(default)]
    pub accesses: Vec<Access>,

    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    /// CA selection; Let's Encrypt when absent
    pub ssl_provider: Option<SslProviderSettings>,

    /// Retention windows; no sweeping when absent
    pub persistence: Option<PersistenceSettings>,
}

impl ProjectConfig {
    /// Discover and load the config by walking up from the current directory
    pub fn discover() -> Result<Option<(PathBuf, Self)>> {
        let current_dir = std::env::current_dir()?;
        Self::discover_from(&current_dir)
    }

    pub fn discover_from(start_dir: &Path) -> Result<Option<(PathBuf, Self)>> {
        let mut current = start_dir.to_path_buf();

        loop {
            for name in CONFIG_FILE_NAMES {
                let path = current.join(name);
                if path.exists() {
                    let config = Self::load(&path)?;
                    return Ok(Some((path, config)));
                }
            }

            if !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Invalid config file: {:?}", path))
    }

    /// Parse config from YAML, expanding environment references first
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;
        let config: ProjectConfig =
            serde_yaml::from_str(&expanded).context("Failed to parse YAML config")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut access_ids = HashSet::new();
        for access in &self.accesses {
            if access.id.trim().is_empty() {
                anyhow::bail!("Access '{}' has an empty id", access.name);
            }
            if !access_ids.insert(access.id.as_str()) {
                anyhow::bail!("Duplicate access id: {}", access.id);
            }
        }

        let mut workflow_ids = HashSet::new();
        for workflow in &self.workflows {
            if !workflow_ids.insert(workflow.id.as_str()) {
                anyhow::bail!("Duplicate workflow id: {}", workflow.id);
            }
            workflow
                .validate()
                .with_context(|| format!("Invalid workflow '{}'", workflow.id))?;

            if workflow.trigger == WorkflowTrigger::Scheduled
                && !workflow.interval_hours.is_some_and(|h| h > 0)
            {
                anyhow::bail!(
                    "Scheduled workflow '{}' needs a positive intervalHours",
                    workflow.id
                );
            }

            for node in workflow.content.iter() {
                let access_id = node
                    .config
                    .get("providerAccessId")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if !access_id.is_empty() && !access_ids.contains(access_id) {
                    anyhow::bail!(
                        "Node '{}' in workflow '{}' references unknown access '{}'",
                        node.id,
                        workflow.id,
                        access_id
                    );
                }
            }
        }

        Ok(())
    }

    pub fn get_workflow(&self, id: &str) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.id == id)
    }

    /// Enabled workflows that run on an interval
    pub fn scheduled_workflows(&self) -> Vec<&Workflow> {
        self.workflows
            .iter()
            .filter(|w| w.enabled && w.trigger == WorkflowTrigger::Scheduled)
            .collect()
    }

    /// Load settings, accesses and workflows into the store, replacing same-keyed entries
    pub fn apply_to(&self, store: &MemoryStore) -> Result<()> {
        if let Some(ssl_provider) = &self.settings.ssl_provider {
            store.put_settings(Settings::new(
                SETTINGS_NAME_SSL_PROVIDER,
                serde_json::to_value(ssl_provider)?,
            ))?;
        }
        if let Some(persistence) = &self.settings.persistence {
            store.put_settings(Settings::new(
                SETTINGS_NAME_PERSISTENCE,
                serde_json::to_value(persistence)?,
            ))?;
        }
        for access in &self.accesses {
            store.put_access(access.clone())?;
        }
        for workflow in &self.workflows {
            store.put_workflow(workflow.clone())?;
        }
        Ok(())
    }

    /// Starter config written by `certflow init`
    pub fn template() -> String {
        r#"# Certflow project configuration

settings:
  sslProvider:
    provider: letsencrypt
    # provider: zerossl
    # config:
    #   zerossl:
    #     eabKid: "${ZEROSSL_EAB_KID}"
    #     eabHmacKey: "${ZEROSSL_EAB_HMAC_KEY}"
  persistence:
    expiredCertificatesMaxDaysRetention: 30
    workflowRunsMaxDaysRetention: 90

accesses:
  - id: dns
    name: DNS webhook
    provider: webhook
    config:
      url: "https://dns.internal/acme-hook"
      authToken: "${CERTFLOW_DNS_TOKEN}"

workflows:
  - id: example-com
    name: example.com certificate
    trigger: scheduled
    intervalHours: 24
    content:
      id: start
      type: start
      next:
        id: apply
        type: apply
        name: Issue certificate
        config:
          domains: "example.com;*.example.com"
          contactEmail: ops@example.com
          provider: webhook
          providerAccessId: dns
          keyAlgorithm: EC256
          skipBeforeExpiryDays: 30
        next:
          id: deploy
          type: deploy
          name: Write PEM files
          config:
            certificate: "apply#certificate"
            provider: local
            providerConfig:
              certPath: /etc/ssl/example.com/fullchain.pem
              keyPath: /etc/ssl/example.com/privkey.pem
            skipOnLastSucceeded: true
          next:
            id: end
            type: end
"#
        .to_string()
    }
}

/// Expand `${VAR}` references; unset variables expand to an empty string
pub fn expand_env_vars(input: &str) -> Result<String> {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").context("Invalid env var pattern")?;
    Ok(re
        .replace_all(input, |caps: &regex_lite::Captures<'_>| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use certflow_domain::{AccessRepository, SettingsRepository, WorkflowRepository};

    const MINIMAL: &str = r#"
workflows:
  - id: wf
    content:
      id: start
      type: start
      next:
        id: end
        type: end
"#;

    #[test]
    fn test_parse_minimal_config() {
        let config = ProjectConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.workflows.len(), 1);
        assert!(config.accesses.is_empty());
        assert!(config.settings.ssl_provider.is_none());
        assert_eq!(config.workflows[0].trigger, WorkflowTrigger::Manual);
        assert!(config.scheduled_workflows().is_empty());
    }

    #[test]
    fn test_template_is_valid() {
        let config = ProjectConfig::parse(&ProjectConfig::template()).unwrap();
        assert_eq!(config.scheduled_workflows().len(), 1);
        assert!(config.get_workflow("example-com").is_some());
        assert_eq!(
            config.settings.persistence,
            Some(PersistenceSettings {
                expired_certificates_max_days_retention: 30,
                workflow_runs_max_days_retention: 90,
            })
        );
    }

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("CERTFLOW_TEST_EXPAND", "s3cret");
        assert_eq!(
            expand_env_vars("token: ${CERTFLOW_TEST_EXPAND}").unwrap(),
            "token: s3cret"
        );
        assert_eq!(
            expand_env_vars("token: ${CERTFLOW_TEST_UNSET_VAR}").unwrap(),
            "token: "
        );
        assert_eq!(expand_env_vars("no refs").unwrap(), "no refs");
    }

    #[test]
    fn test_duplicate_workflow_ids() {
        let yaml = format!(
            "{MINIMAL}{}",
            r#"
  - id: wf
    content:
      id: start
      type: start
"#
        );
        let err = ProjectConfig::parse(&yaml).unwrap_err();
        assert!(err.to_string().contains("Duplicate workflow id: wf"));
    }

    #[test]
    fn test_scheduled_workflow_requires_interval() {
        let yaml = r#"
workflows:
  - id: wf
    trigger: scheduled
    content:
      id: start
      type: start
"#;
        let err = ProjectConfig::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("intervalHours"));
    }

    #[test]
    fn test_unknown_access_reference() {
        let yaml = r#"
workflows:
  - id: wf
    content:
      id: start
      type: start
      next:
        id: notify
        type: notify
        config:
          provider: webhook
          providerAccessId: missing
          subject: hello
"#;
        let err = ProjectConfig::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown access 'missing'"));
    }

    #[test]
    fn test_invalid_workflow_names_it() {
        let yaml = r#"
workflows:
  - id: broken
    content:
      id: a
      type: apply
"#;
        let err = ProjectConfig::parse(yaml).unwrap_err();
        assert!(format!("{err:#}").contains("Invalid workflow 'broken'"));
    }

    #[tokio::test]
    async fn test_apply_to_store() {
        let config = ProjectConfig::parse(&ProjectConfig::template()).unwrap();
        let store = MemoryStore::new();
        config.apply_to(&store).unwrap();

        let access = AccessRepository::get_by_id(&store, "dns").await.unwrap();
        assert_eq!(access.provider, "webhook");
        let ssl = store.get_by_name(SETTINGS_NAME_SSL_PROVIDER).await.unwrap();
        assert_eq!(ssl.content["provider"], "letsencrypt");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_discover_from_nested_dir() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(".certflow.yml");
        std::fs::write(&config_path, MINIMAL).unwrap();
        let nested = temp_dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let (path, config) = ProjectConfig::discover_from(&nested).unwrap().unwrap();
        assert_eq!(path, config_path);
        assert_eq!(config.workflows[0].id, "wf");
    }

    #[test]
    fn test_yaml_extension_variant() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(".certflow.yaml"), MINIMAL).unwrap();

        let found = ProjectConfig::discover_from(temp_dir.path()).unwrap();
        assert!(found.unwrap().0.ends_with(".certflow.yaml"));
    }

    #[test]
    fn test_invalid_yaml_reports_path() {
        use tempfile::TempDir;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".certflow.yml");
        std::fs::write(&path, "workflows: [").unwrap();

        let err = ProjectConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid config file"));
    }
}
