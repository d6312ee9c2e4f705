//! `LedgerHandler`: a `Handler` backed by a local JSON file, standing in
//! for a real registry transport. Grounded on the teacher's `FileStore`
//! (atomic write-then-rename, `serde_json` save/load) but scoped to the
//! one file this tool needs rather than a general store abstraction.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use modsync_core::handler::{CancellationToken, Handler, RemoteCommit};
use modsync_core::types::{CommitHash, ContentDigest, ModuleBranch, ModuleIdentity, ModuleTags};
use serde::{Deserialize, Serialize};

const LEDGER_FILE: &str = "ledger.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerCommit {
    hash: String,
    digest: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ModuleLedger {
    /// Every commit hash ever published for this identity, on any branch —
    /// backs `is_git_commit_synced`.
    #[serde(default)]
    published_commits: BTreeSet<String>,
    /// Per-branch ordered history (oldest first); the last entry is that
    /// branch's remote tip.
    #[serde(default)]
    branch_commits: BTreeMap<String, Vec<LedgerCommit>>,
    /// Tag name -> target commit hash, from the most recent tag sync.
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerData {
    #[serde(default)]
    modules: BTreeMap<String, ModuleLedger>,
}

/// Local stand-in for the registry: every read `Handler` method answers
/// out of this file, every write method appends to it. Not a real
/// publishing backend — there is nothing on the other end of the wire.
pub struct LedgerHandler {
    path: PathBuf,
    data: RefCell<LedgerData>,
    default_branch: String,
    release_branches: HashMap<ModuleIdentity, String>,
    abort_on_invalid_sync_point: bool,
}

impl LedgerHandler {
    /// Loads `state_dir/ledger.json` if present, starting empty otherwise.
    pub fn open(
        state_dir: &Path,
        default_branch: String,
        release_branches: HashMap<ModuleIdentity, String>,
        abort_on_invalid_sync_point: bool,
    ) -> Result<Self> {
        let path = state_dir.join(LEDGER_FILE);
        let data = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read ledger: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("failed to parse ledger: {}", path.display()))?
        } else {
            LedgerData::default()
        };
        Ok(Self {
            path,
            data: RefCell::new(data),
            default_branch,
            release_branches,
            abort_on_invalid_sync_point,
        })
    }

    /// Writes the ledger to disk atomically (write to a temp file, then
    /// rename over the real one).
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create state dir: {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(&*self.data.borrow())
            .context("failed to serialize ledger")?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)
            .with_context(|| format!("failed to write ledger: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to install ledger: {}", self.path.display()))?;
        Ok(())
    }

    fn check_cancel(cancel: &CancellationToken) -> Result<()> {
        if cancel.is_cancelled() {
            anyhow::bail!("cancelled");
        }
        Ok(())
    }
}

impl Handler for LedgerHandler {
    fn resolve_sync_point(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> Result<Option<CommitHash>> {
        Self::check_cancel(cancel)?;
        let data = self.data.borrow();
        let Some(tip) = data
            .modules
            .get(&identity.to_string())
            .and_then(|m| m.branch_commits.get(branch))
            .and_then(|commits| commits.last())
        else {
            return Ok(None);
        };
        Ok(Some(CommitHash::from_hex(&tip.hash)?))
    }

    fn is_git_commit_synced(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        hash: &CommitHash,
    ) -> Result<bool> {
        Self::check_cancel(cancel)?;
        Ok(self
            .data
            .borrow()
            .modules
            .get(&identity.to_string())
            .is_some_and(|m| m.published_commits.contains(hash.as_hex())))
    }

    fn is_git_commit_synced_to_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
        hash: &CommitHash,
    ) -> Result<bool> {
        Self::check_cancel(cancel)?;
        Ok(self
            .data
            .borrow()
            .modules
            .get(&identity.to_string())
            .and_then(|m| m.branch_commits.get(branch))
            .is_some_and(|commits| commits.iter().any(|c| c.hash == hash.as_hex())))
    }

    fn is_branch_synced(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> Result<bool> {
        Self::check_cancel(cancel)?;
        Ok(self
            .data
            .borrow()
            .modules
            .get(&identity.to_string())
            .and_then(|m| m.branch_commits.get(branch))
            .is_some_and(|commits| !commits.is_empty()))
    }

    fn is_protected_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> Result<bool> {
        Self::check_cancel(cancel)?;
        Ok(branch == self.default_branch || self.is_release_branch(cancel, identity, branch)?)
    }

    fn is_release_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> Result<bool> {
        Self::check_cancel(cancel)?;
        Ok(self.release_branches.get(identity).is_some_and(|r| r == branch))
    }

    fn get_branch_head(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> Result<Option<RemoteCommit>> {
        Self::check_cancel(cancel)?;
        let data = self.data.borrow();
        let Some(tip) = data
            .modules
            .get(&identity.to_string())
            .and_then(|m| m.branch_commits.get(branch))
            .and_then(|commits| commits.last())
        else {
            return Ok(None);
        };
        Ok(Some(RemoteCommit {
            hash: CommitHash::from_hex(&tip.hash)?,
            digest: parse_digest(&tip.digest)?,
        }))
    }

    fn get_release_head(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
    ) -> Result<Option<RemoteCommit>> {
        Self::check_cancel(cancel)?;
        let Some(release_branch) = self.release_branches.get(identity) else {
            return Ok(None);
        };
        self.get_branch_head(cancel, identity, release_branch)
    }

    fn invalid_sync_point(
        &self,
        _cancel: &CancellationToken,
        _identity: &ModuleIdentity,
        _branch: &str,
        _hash: &CommitHash,
        _is_default_branch: bool,
        err: &anyhow::Error,
    ) -> Option<anyhow::Error> {
        if self.abort_on_invalid_sync_point {
            Some(anyhow::anyhow!("{err}"))
        } else {
            None
        }
    }

    fn sync_module_branch(
        &self,
        cancel: &CancellationToken,
        module_branch: &ModuleBranch,
    ) -> Result<()> {
        Self::check_cancel(cancel)?;
        let mut data = self.data.borrow_mut();
        let module = data
            .modules
            .entry(module_branch.target_identity.to_string())
            .or_default();
        let branch_log = module.branch_commits.entry(module_branch.branch_name.clone()).or_default();
        for module_commit in &module_branch.commits_to_sync {
            let hash = module_commit.commit.hash.as_hex().to_string();
            module.published_commits.insert(hash.clone());
            if branch_log.last().is_none_or(|last| last.hash != hash) {
                branch_log.push(LedgerCommit {
                    hash,
                    digest: module_commit.built_module.digest().to_string(),
                });
            }
        }
        Ok(())
    }

    fn sync_module_tags(
        &self,
        cancel: &CancellationToken,
        module_tags: &ModuleTags,
    ) -> Result<()> {
        Self::check_cancel(cancel)?;
        let mut data = self.data.borrow_mut();
        let module = data
            .modules
            .entry(module_tags.target_identity.to_string())
            .or_default();
        for (hash, names) in &module_tags.tagged_commits {
            for name in names {
                module.tags.insert(name.clone(), hash.as_hex().to_string());
            }
        }
        Ok(())
    }
}

fn parse_digest(hex: &str) -> Result<ContentDigest> {
    let bytes = hex::decode(hex).with_context(|| format!("invalid content digest {hex:?}"))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("content digest {hex:?} is not 32 bytes"))?;
    Ok(ContentDigest::from_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;
    use modsync_core::types::{BuiltModule, Commit, ModuleCommit, ObjectId, PersonIdentity};
    use std::path::PathBuf;

    fn commit(hex: &str) -> Commit {
        Commit {
            hash: ObjectId::from_hex(hex).unwrap(),
            parents: Vec::new(),
            tree: ObjectId::from_hex("aa").unwrap(),
            author: PersonIdentity { name: "a".into(), email: "a@x".into(), timestamp: 0 },
            committer: PersonIdentity { name: "a".into(), email: "a@x".into(), timestamp: 0 },
            message: "msg".into(),
        }
    }

    #[test]
    fn sync_then_resolve_sync_point_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let identity = ModuleIdentity::new("buf.build", "acme", "foo");
        let handler = LedgerHandler::open(dir.path(), "main".into(), HashMap::new(), false).unwrap();
        let cancel = CancellationToken::new();

        let module_branch = ModuleBranch {
            branch_name: "main".into(),
            module_directory: PathBuf::from("."),
            target_identity: identity.clone(),
            commits_to_sync: vec![ModuleCommit {
                commit: commit("01"),
                tags_on_this_commit: Vec::new(),
                built_module: BuiltModule::new(PathBuf::from("."), Some(identity.clone()), Vec::new()),
            }],
        };
        handler.sync_module_branch(&cancel, &module_branch).unwrap();
        handler.persist().unwrap();

        let reopened = LedgerHandler::open(dir.path(), "main".into(), HashMap::new(), false).unwrap();
        let sync_point = reopened.resolve_sync_point(&cancel, &identity, "main").unwrap();
        assert_eq!(sync_point, Some(ObjectId::from_hex("01").unwrap()));
        assert!(reopened
            .is_git_commit_synced(&cancel, &identity, &ObjectId::from_hex("01").unwrap())
            .unwrap());
    }

    #[test]
    fn default_branch_and_configured_release_branch_are_protected() {
        let dir = tempfile::tempdir().unwrap();
        let identity = ModuleIdentity::new("buf.build", "acme", "foo");
        let mut release_branches = HashMap::new();
        release_branches.insert(identity.clone(), "release".to_string());
        let handler = LedgerHandler::open(dir.path(), "main".into(), release_branches, false).unwrap();
        let cancel = CancellationToken::new();

        assert!(handler.is_protected_branch(&cancel, &identity, "main").unwrap());
        assert!(handler.is_protected_branch(&cancel, &identity, "release").unwrap());
        assert!(!handler.is_protected_branch(&cancel, &identity, "feature-x").unwrap());
    }

    #[test]
    fn invalid_sync_point_hook_honors_abort_flag() {
        let dir = tempfile::tempdir().unwrap();
        let identity = ModuleIdentity::new("buf.build", "acme", "foo");
        let cancel = CancellationToken::new();
        let err = anyhow::anyhow!("boom");

        let lenient = LedgerHandler::open(dir.path(), "main".into(), HashMap::new(), false).unwrap();
        assert!(lenient
            .invalid_sync_point(&cancel, &identity, "main", &ObjectId::from_hex("ff").unwrap(), true, &err)
            .is_none());

        let strict = LedgerHandler::open(dir.path(), "main".into(), HashMap::new(), true).unwrap();
        assert!(strict
            .invalid_sync_point(&cancel, &identity, "main", &ObjectId::from_hex("ff").unwrap(), true, &err)
            .is_some());
    }
}
