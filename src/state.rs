//! Run history persisted between invocations
//!
//! Certificates, runs, outputs, logs and ACME accounts are written to a JSON
//! file so the next invocation can skip fresh certificates and declare ARI
//! replacements from the same CA account. Account credentials include the
//! account private key, so the file is as sensitive as the certificates'
//! keys. Settings, accesses and workflows always come from the project config
//! and are never written here.

use anyhow::{Context, Result};
use certflow_domain::{MemoryStore, StoreSnapshot};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

pub struct StateFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored snapshot; a missing file is an empty store
    pub fn load(&self) -> Result<StoreSnapshot> {
        if !self.path.exists() {
            debug!(path = ?self.path, "No state file yet");
            return Ok(StoreSnapshot::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {:?}", self.path))?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {:?}", self.path))?;
        debug!(
            path = ?self.path,
            certificates = snapshot.certificates.len(),
            runs = snapshot.runs.len(),
            "Loaded state"
        );
        Ok(snapshot)
    }

    /// Write the store's run history, replacing the file atomically
    pub fn save(&self, store: &MemoryStore) -> Result<()> {
        let mut snapshot = store.snapshot()?;
        snapshot.settings.clear();
        snapshot.accesses.clear();
        snapshot.workflows.clear();

        let content =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize state")?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("State file lock poisoned"))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {:?}", parent))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content)
            .with_context(|| format!("Failed to write state file: {:?}", tmp))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace state file: {:?}", self.path))?;
        Ok(())
    }
}
