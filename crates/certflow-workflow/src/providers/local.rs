use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{required_str, Deployer, ProviderConfig, ProviderOutput};
use crate::error::ProviderError;

/// Writes the certificate and key PEM files to local paths
///
/// Config: `certPath`, `keyPath`. Parent directories are created on demand.
#[derive(Debug, Clone)]
pub struct LocalDeployer {
    cert_path: PathBuf,
    key_path: PathBuf,
}

impl LocalDeployer {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        Ok(Self::new(
            required_str(config, "certPath")?,
            required_str(config, "keyPath")?,
        ))
    }

    async fn write(path: &PathBuf, contents: &str) -> Result<(), ProviderError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ProviderError::Io(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| ProviderError::Io(format!("{}: {e}", path.display())))
    }
}

#[async_trait]
impl Deployer for LocalDeployer {
    async fn deploy(
        &self,
        certificate: &str,
        private_key: &str,
    ) -> Result<ProviderOutput, ProviderError> {
        Self::write(&self.cert_path, certificate).await?;
        Self::write(&self.key_path, private_key).await?;
        info!(
            cert_path = %self.cert_path.display(),
            key_path = %self.key_path.display(),
            "Certificate written to disk"
        );

        let mut output = ProviderOutput::new();
        output.insert(
            "certPath".into(),
            Value::String(self.cert_path.display().to_string()),
        );
        output.insert(
            "keyPath".into(),
            Value::String(self.key_path.display().to_string()),
        );
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_writes_both_files() {
        let dir = TempDir::new().unwrap();
        let deployer = LocalDeployer::new(
            dir.path().join("live/cert.pem"),
            dir.path().join("live/key.pem"),
        );

        let output = deployer.deploy("CERT", "KEY").await.unwrap();

        let cert = std::fs::read_to_string(dir.path().join("live/cert.pem")).unwrap();
        let key = std::fs::read_to_string(dir.path().join("live/key.pem")).unwrap();
        assert_eq!(cert, "CERT");
        assert_eq!(key, "KEY");
        assert!(output.contains_key("certPath"));
    }

    #[test]
    fn test_requires_both_paths() {
        let config = serde_json::json!({ "certPath": "/tmp/cert.pem" });
        let err = LocalDeployer::from_config(config.as_object().unwrap()).unwrap_err();
        assert_eq!(
            err,
            ProviderError::Configuration("`keyPath` is required".into())
        );
    }
}
