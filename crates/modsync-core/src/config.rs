//! The configuration surface consumed by the planner (spec §6). Not a
//! CLI — `modsync-cli` builds one of these from flags and
//! `.modsync.toml`, the same way the teacher's `config.rs` builds a
//! `RuntimeOptions` from `.shipper.toml` merged with flags.

use std::path::PathBuf;

use crate::types::ModuleIdentity;

/// `(module-directory, optional identity-override)` pairs plus the two
/// scanner-facing toggles from spec §6. Preserves insertion order of
/// `module_dirs`, which the final `ExecutionPlan` sort depends on.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    module_dirs: Vec<PathBuf>,
    overrides: std::collections::HashMap<PathBuf, ModuleIdentity>,
    pub sync_all_branches: bool,
    pub git_remote_name: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("duplicate module directory in configuration: {0:?}")]
pub struct DuplicateModuleDirectory(pub PathBuf);

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Module directories in the order they were registered.
    pub fn module_dirs(&self) -> &[PathBuf] {
        &self.module_dirs
    }

    pub fn override_for(&self, dir: &std::path::Path) -> Option<&ModuleIdentity> {
        self.overrides.get(dir)
    }
}

/// Builder that rejects duplicate module directories at construction time,
/// per spec §6 ("rejects duplicate directories at construction").
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    module_dirs: Vec<PathBuf>,
    overrides: std::collections::HashMap<PathBuf, ModuleIdentity>,
    sync_all_branches: bool,
    git_remote_name: Option<String>,
}

impl SyncConfigBuilder {
    pub fn add_module_dir(
        mut self,
        dir: PathBuf,
        identity_override: Option<ModuleIdentity>,
    ) -> Result<Self, DuplicateModuleDirectory> {
        if self.module_dirs.contains(&dir) {
            return Err(DuplicateModuleDirectory(dir));
        }
        if let Some(id) = identity_override {
            self.overrides.insert(dir.clone(), id);
        }
        self.module_dirs.push(dir);
        Ok(self)
    }

    pub fn sync_all_branches(mut self, value: bool) -> Self {
        self.sync_all_branches = value;
        self
    }

    pub fn git_remote_name(mut self, name: Option<String>) -> Self {
        self.git_remote_name = name;
        self
    }

    pub fn build(self) -> SyncConfig {
        SyncConfig {
            module_dirs: self.module_dirs,
            overrides: self.overrides,
            sync_all_branches: self.sync_all_branches,
            git_remote_name: self.git_remote_name,
        }
    }
}
