//! `.modsync.toml` support, mirroring the teacher's layered
//! `.shipper.toml` + CLI-flag approach: the file supplies defaults, CLI
//! flags win wherever the operator passed them explicitly.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// One `[[module]]` table in `.modsync.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub path: PathBuf,
    /// Identity override (`host/owner/name`). Wins unconditionally over
    /// whatever the module's own manifest names at HEAD.
    #[serde(default)]
    pub identity: Option<String>,
    /// Branch the registry should treat as this module's release branch,
    /// in addition to the repository's default branch.
    #[serde(default)]
    pub release_branch: Option<String>,
}

/// Configuration loaded from `.modsync.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub sync_all_branches: bool,
    #[serde(default)]
    pub git_remote_name: Option<String>,
    #[serde(default)]
    pub module: Vec<ModuleEntry>,
}

impl FileConfig {
    /// Looks for `.modsync.toml` directly under `workspace_root`. Returns
    /// `Ok(None)` if it isn't there — not having one is not an error, it
    /// just means every module directory must come from CLI flags.
    pub fn load_from_workspace(workspace_root: &Path) -> Result<Option<Self>> {
        let path = workspace_root.join(".modsync.toml");
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from_file(&path).map(Some)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }
}
