use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sithub_refs::validate_branch_name;
use sithub_sync::CloneOptions;

use crate::error::{RepoError, RepoResult};

/// On-disk format understood by this version.
pub const FORMAT_VERSION: u32 = 1;

/// Per-repository settings, stored as `config.toml` in the metadata
/// directory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    pub format_version: u32,
    /// Branch `HEAD` points at in a fresh repository.
    pub default_branch: String,
    pub transfer: TransferConfig,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            default_branch: "main".to_string(),
            transfer: TransferConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub connect_timeout_secs: u64,
    pub io_timeout_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            io_timeout_secs: 60,
        }
    }
}

impl TransferConfig {
    pub fn clone_options(&self) -> CloneOptions {
        CloneOptions::from_secs(self.connect_timeout_secs, self.io_timeout_secs)
    }
}

impl RepoConfig {
    pub fn load(path: &Path) -> RepoResult<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| RepoError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> RepoResult<()> {
        self.validate()?;
        let text = toml::to_string_pretty(self).map_err(|e| RepoError::Config(e.to_string()))?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> RepoResult<()> {
        if self.format_version != FORMAT_VERSION {
            return Err(RepoError::Config(format!(
                "unsupported format version {} (expected {FORMAT_VERSION})",
                self.format_version
            )));
        }
        validate_branch_name(&self.default_branch)
            .map_err(|e| RepoError::Config(format!("default_branch: {e}")))?;
        if self.transfer.connect_timeout_secs == 0 || self.transfer.io_timeout_secs == 0 {
            return Err(RepoError::Config("transfer timeouts must be non-zero".into()));
        }
        Ok(())
    }
}
