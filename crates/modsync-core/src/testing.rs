//! In-memory test doubles for `Tree`, `Repository`, and `Handler`. Kept in
//! the main crate (rather than a dev-dependency-only module) because the
//! integration suite in `tests/scenarios.rs` needs them too, the same way
//! the teacher's `git.rs` tests build a fake `git` shell script rather than
//! hitting a real repository.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::handler::{CancellationToken, Handler, RemoteCommit};
use crate::repository::{Repository, Tree, WalkControl};
use crate::types::{Commit, CommitHash, ContentDigest, ModuleBranch, ModuleFile, ModuleIdentity, ModuleTags};

/// An in-memory tree: a flat map from directory to the files beneath it,
/// plus raw bytes for any file in that directory.
#[derive(Debug, Clone, Default)]
pub struct FakeTree {
    dirs: BTreeMap<String, Vec<ModuleFile>>,
    contents: BTreeMap<(String, String), Vec<u8>>,
}

impl FakeTree {
    pub fn add_file(
        &mut self,
        dir: impl Into<String>,
        relpath: impl Into<String>,
        contents: impl AsRef<[u8]>,
        blob: crate::types::ObjectId,
    ) {
        let dir = dir.into();
        let relpath = relpath.into();
        self.dirs.entry(dir.clone()).or_default().push(ModuleFile {
            path: relpath.clone(),
            blob,
        });
        self.contents
            .insert((dir, relpath), contents.as_ref().to_vec());
    }

    pub fn remove_dir(&mut self, dir: &str) {
        self.dirs.remove(dir);
        self.contents.retain(|(d, _), _| d != dir);
    }
}

impl Tree for FakeTree {
    fn files_under(&self, dir: &str) -> Option<Vec<ModuleFile>> {
        self.dirs.get(dir).cloned()
    }

    fn read(&self, dir: &str, relpath: &str) -> Option<Vec<u8>> {
        self.contents.get(&(dir.to_string(), relpath.to_string())).cloned()
    }
}

/// A full in-memory repository: branches, tags, and a commit graph keyed by
/// hash, each commit carrying a [`FakeTree`] snapshot.
#[derive(Debug, Clone, Default)]
pub struct FakeRepository {
    pub default_branch: String,
    pub current_branch: String,
    pub branches: BTreeMap<String, CommitHash>,
    pub tags: BTreeMap<String, CommitHash>,
    pub commits: BTreeMap<CommitHash, Commit>,
    pub trees: BTreeMap<CommitHash, FakeTree>,
}

impl Repository for FakeRepository {
    fn default_branch(&self) -> anyhow::Result<String> {
        Ok(self.default_branch.clone())
    }

    fn current_branch(&self) -> anyhow::Result<String> {
        Ok(self.current_branch.clone())
    }

    fn for_each_branch(&self, f: &mut dyn FnMut(&str, &CommitHash)) -> anyhow::Result<()> {
        for (name, hash) in &self.branches {
            f(name, hash);
        }
        Ok(())
    }

    fn for_each_tag(&self, f: &mut dyn FnMut(&str, &CommitHash)) -> anyhow::Result<()> {
        for (name, target) in &self.tags {
            f(name, target);
        }
        Ok(())
    }

    fn head_commit(&self, branch: &str) -> anyhow::Result<Commit> {
        let hash = self
            .branches
            .get(branch)
            .ok_or_else(|| anyhow::anyhow!("unknown branch {branch:?}"))?;
        self.commits
            .get(hash)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing commit {hash}"))
    }

    fn for_each_commit(
        &self,
        startpoint: &CommitHash,
        f: &mut dyn FnMut(&Commit) -> WalkControl,
    ) -> anyhow::Result<()> {
        let mut cursor = Some(startpoint.clone());
        while let Some(hash) = cursor {
            let Some(commit) = self.commits.get(&hash) else {
                break;
            };
            if f(commit) == WalkControl::Stop {
                break;
            }
            cursor = commit.first_parent().cloned();
        }
        Ok(())
    }

    fn find_commit(&self, hash: &CommitHash) -> anyhow::Result<Option<Commit>> {
        Ok(self.commits.get(hash).cloned())
    }

    fn tree_at(&self, commit: &CommitHash) -> anyhow::Result<Box<dyn Tree>> {
        let tree = self
            .trees
            .get(commit)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no tree recorded for commit {commit}"))?;
        Ok(Box::new(tree))
    }
}

/// An in-memory Handler backed by shared, interior-mutable state so tests
/// can both drive the planner and assert on what `sync_module_branch`/
/// `sync_module_tags` were called with.
#[derive(Clone, Default)]
pub struct FakeHandler {
    inner: Arc<Mutex<FakeHandlerState>>,
}

#[derive(Default)]
struct FakeHandlerState {
    sync_points: BTreeMap<(ModuleIdentity, String), CommitHash>,
    synced_commits: BTreeMap<ModuleIdentity, Vec<(String, CommitHash)>>,
    branch_heads: BTreeMap<(ModuleIdentity, String), RemoteCommit>,
    release_branch: BTreeMap<ModuleIdentity, String>,
    default_branch: BTreeMap<ModuleIdentity, String>,
    invalid_sync_point_aborts: bool,
    synced_branches: Vec<ModuleBranch>,
    synced_tags: Vec<ModuleTags>,
}

impl FakeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sync_point(&self, identity: ModuleIdentity, branch: &str, hash: CommitHash) {
        let mut state = self.inner.lock().unwrap();
        state
            .synced_commits
            .entry(identity.clone())
            .or_default()
            .push((branch.to_string(), hash.clone()));
        state.sync_points.insert((identity, branch.to_string()), hash);
    }

    pub fn set_branch_head(
        &self,
        identity: ModuleIdentity,
        branch: &str,
        hash: CommitHash,
        digest: ContentDigest,
    ) {
        self.inner
            .lock()
            .unwrap()
            .branch_heads
            .insert((identity, branch.to_string()), RemoteCommit { hash, digest });
    }

    pub fn set_default_branch(&self, identity: ModuleIdentity, branch: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .default_branch
            .insert(identity, branch.into());
    }

    pub fn set_release_branch(&self, identity: ModuleIdentity, branch: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .release_branch
            .insert(identity, branch.into());
    }

    pub fn set_invalid_sync_point_aborts(&self, aborts: bool) {
        self.inner.lock().unwrap().invalid_sync_point_aborts = aborts;
    }

    pub fn synced_branches(&self) -> Vec<ModuleBranch> {
        self.inner.lock().unwrap().synced_branches.clone()
    }

    pub fn synced_tags(&self) -> Vec<ModuleTags> {
        self.inner.lock().unwrap().synced_tags.clone()
    }
}

impl Handler for FakeHandler {
    fn resolve_sync_point(
        &self,
        _cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<Option<CommitHash>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sync_points
            .get(&(identity.clone(), branch.to_string()))
            .cloned())
    }

    fn is_git_commit_synced(
        &self,
        _cancel: &CancellationToken,
        identity: &ModuleIdentity,
        hash: &CommitHash,
    ) -> anyhow::Result<bool> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .synced_commits
            .get(identity)
            .is_some_and(|list| list.iter().any(|(_, h)| h == hash)))
    }

    fn is_git_commit_synced_to_branch(
        &self,
        _cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
        hash: &CommitHash,
    ) -> anyhow::Result<bool> {
        let state = self.inner.lock().unwrap();
        Ok(state.synced_commits.get(identity).is_some_and(|list| {
            list.iter().any(|(b, h)| b == branch && h == hash)
        }))
    }

    fn is_branch_synced(
        &self,
        _cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<bool> {
        let state = self.inner.lock().unwrap();
        Ok(state
            .synced_commits
            .get(identity)
            .is_some_and(|list| list.iter().any(|(b, _)| b == branch)))
    }

    fn is_protected_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<bool> {
        let is_default = self
            .inner
            .lock()
            .unwrap()
            .default_branch
            .get(identity)
            .map(|b| b == branch)
            .unwrap_or(false);
        Ok(is_default || self.is_release_branch(cancel, identity, branch)?)
    }

    fn is_release_branch(
        &self,
        _cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<bool> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .release_branch
            .get(identity)
            .map(|b| b == branch)
            .unwrap_or(false))
    }

    fn get_branch_head(
        &self,
        _cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<Option<RemoteCommit>> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .branch_heads
            .get(&(identity.clone(), branch.to_string()))
            .cloned())
    }

    fn get_release_head(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
    ) -> anyhow::Result<Option<RemoteCommit>> {
        let release_branch = self.inner.lock().unwrap().release_branch.get(identity).cloned();
        match release_branch {
            Some(branch) => self.get_branch_head(cancel, identity, &branch),
            None => Ok(None),
        }
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
        if self.inner.lock().unwrap().invalid_sync_point_aborts {
            Some(anyhow::anyhow!("{err}"))
        } else {
            None
        }
    }

    fn sync_module_branch(
        &self,
        _cancel: &CancellationToken,
        module_branch: &ModuleBranch,
    ) -> anyhow::Result<()> {
        self.inner
            .lock()
            .unwrap()
            .synced_branches
            .push(module_branch.clone());
        Ok(())
    }

    fn sync_module_tags(
        &self,
        _cancel: &CancellationToken,
        module_tags: &ModuleTags,
    ) -> anyhow::Result<()> {
        self.inner.lock().unwrap().synced_tags.push(module_tags.clone());
        Ok(())
    }
}
