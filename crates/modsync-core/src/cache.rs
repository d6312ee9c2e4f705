//! Handler-caching decorator (spec §5, Design Note "Shared handler
//! cache"). Wraps any `Handler` and memoizes exactly the idempotent
//! positive results enumerated in §5: a `true`/`Some` answer to "is this
//! already synced" can never become stale mid-run, but a `false`/`None`
//! answer can, since sync may be in-progress concurrently within the same
//! registry. Scoped to one `Plan()` call; never persisted.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::handler::{CancellationToken, Handler, RemoteCommit};
use crate::types::{CommitHash, ModuleBranch, ModuleIdentity, ModuleTags};

#[derive(Debug, Default)]
struct Cache {
    git_commit_synced: HashMap<(ModuleIdentity, CommitHash), bool>,
    git_commit_synced_to_branch: HashMap<(ModuleIdentity, String, CommitHash), bool>,
    branch_synced: HashMap<(ModuleIdentity, String), bool>,
    protected_branch: HashMap<(ModuleIdentity, String), bool>,
    release_branch: HashMap<(ModuleIdentity, String), bool>,
}

/// A `Handler` decorator; delegates every call to `inner`, memoizing only
/// answers that cannot flip from true to false within one planning run.
pub struct CachingHandler<'a> {
    inner: &'a dyn Handler,
    cache: RefCell<Cache>,
}

impl<'a> CachingHandler<'a> {
    pub fn new(inner: &'a dyn Handler) -> Self {
        Self {
            inner,
            cache: RefCell::new(Cache::default()),
        }
    }
}

impl Handler for CachingHandler<'_> {
    fn resolve_sync_point(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<Option<CommitHash>> {
        self.inner.resolve_sync_point(cancel, identity, branch)
    }

    fn is_git_commit_synced(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        hash: &CommitHash,
    ) -> anyhow::Result<bool> {
        let key = (identity.clone(), hash.clone());
        if let Some(true) = self.cache.borrow().git_commit_synced.get(&key) {
            return Ok(true);
        }
        let result = self.inner.is_git_commit_synced(cancel, identity, hash)?;
        if result {
            self.cache.borrow_mut().git_commit_synced.insert(key, true);
        }
        Ok(result)
    }

    fn is_git_commit_synced_to_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
        hash: &CommitHash,
    ) -> anyhow::Result<bool> {
        let key = (identity.clone(), branch.to_string(), hash.clone());
        if let Some(true) = self.cache.borrow().git_commit_synced_to_branch.get(&key) {
            return Ok(true);
        }
        let result = self
            .inner
            .is_git_commit_synced_to_branch(cancel, identity, branch, hash)?;
        if result {
            self.cache.borrow_mut().git_commit_synced_to_branch.insert(key, true);
        }
        Ok(result)
    }

    fn is_branch_synced(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<bool> {
        let key = (identity.clone(), branch.to_string());
        if let Some(true) = self.cache.borrow().branch_synced.get(&key) {
            return Ok(true);
        }
        let result = self.inner.is_branch_synced(cancel, identity, branch)?;
        if result {
            self.cache.borrow_mut().branch_synced.insert(key, true);
        }
        Ok(result)
    }

    fn is_protected_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<bool> {
        let key = (identity.clone(), branch.to_string());
        if let Some(value) = self.cache.borrow().protected_branch.get(&key) {
            return Ok(*value);
        }
        let result = self.inner.is_protected_branch(cancel, identity, branch)?;
        self.cache.borrow_mut().protected_branch.insert(key, result);
        Ok(result)
    }

    fn is_release_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<bool> {
        let key = (identity.clone(), branch.to_string());
        if let Some(value) = self.cache.borrow().release_branch.get(&key) {
            return Ok(*value);
        }
        let result = self.inner.is_release_branch(cancel, identity, branch)?;
        self.cache.borrow_mut().release_branch.insert(key, result);
        Ok(result)
    }

    fn get_branch_head(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<Option<RemoteCommit>> {
        self.inner.get_branch_head(cancel, identity, branch)
    }

    fn get_release_head(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
    ) -> anyhow::Result<Option<RemoteCommit>> {
        self.inner.get_release_head(cancel, identity)
    }

    fn invalid_sync_point(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
        hash: &CommitHash,
        is_default_branch: bool,
        err: &anyhow::Error,
    ) -> Option<anyhow::Error> {
        self.inner
            .invalid_sync_point(cancel, identity, branch, hash, is_default_branch, err)
    }

    fn sync_module_branch(
        &self,
        cancel: &CancellationToken,
        module_branch: &ModuleBranch,
    ) -> anyhow::Result<()> {
        self.inner.sync_module_branch(cancel, module_branch)
    }

    fn sync_module_tags(
        &self,
        cancel: &CancellationToken,
        module_tags: &ModuleTags,
    ) -> anyhow::Result<()> {
        self.inner.sync_module_tags(cancel, module_tags)
    }
}
