//! The Handler interface: the only contact point with the remote registry
//! (spec §6). All methods take a cancellation token first.

use crate::types::{CommitHash, ContentDigest, ModuleBranch, ModuleIdentity, ModuleTags};

/// Threaded through every operation per spec §5. Cheap to clone; checking
/// it is the caller's responsibility at each call site.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// The remote's current tip for a branch: the commit it's at and the
/// content digest of the module published there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommit {
    pub hash: CommitHash,
    pub digest: ContentDigest,
}

/// The registry-side collaborator. Every read method answers a question
/// about remote state; the two write methods belong to the executor and
/// are never called by the planner itself.
pub trait Handler {
    /// Last published commit for this branch, or `None`.
    fn resolve_sync_point(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<Option<CommitHash>>;

    /// Has this hash ever been published for this identity, on any branch?
    fn is_git_commit_synced(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        hash: &CommitHash,
    ) -> anyhow::Result<bool>;

    /// Has this hash been published on this specific branch?
    fn is_git_commit_synced_to_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
        hash: &CommitHash,
    ) -> anyhow::Result<bool>;

    /// Has any commit been published on this branch?
    fn is_branch_synced(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<bool>;

    /// True iff `branch` is the local default branch or the remote's
    /// release branch for `identity`.
    fn is_protected_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<bool>;

    /// True iff `branch` is the remote's release branch for `identity`.
    fn is_release_branch(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<bool>;

    /// Current remote tip of `branch`, or `None` if the remote has no
    /// state for it yet (spec treats this uniformly as "branch not yet
    /// created", see Open Question in Design Notes).
    fn get_branch_head(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
    ) -> anyhow::Result<Option<RemoteCommit>>;

    /// Current remote tip of the release branch for `identity`.
    fn get_release_head(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
    ) -> anyhow::Result<Option<RemoteCommit>>;

    /// Policy hook invoked when a resolved sync point hash is absent from
    /// the local Git object store. Returning `Some(err)` aborts planning
    /// with that error; `None` means "treat as no sync point and warn".
    fn invalid_sync_point(
        &self,
        cancel: &CancellationToken,
        identity: &ModuleIdentity,
        branch: &str,
        hash: &CommitHash,
        is_default_branch: bool,
        err: &anyhow::Error,
    ) -> Option<anyhow::Error>;

    /// Executor-side; not called by the planner.
    fn sync_module_branch(
        &self,
        cancel: &CancellationToken,
        module_branch: &ModuleBranch,
    ) -> anyhow::Result<()>;

    /// Executor-side; not called by the planner.
    fn sync_module_tags(
        &self,
        cancel: &CancellationToken,
        module_tags: &ModuleTags,
    ) -> anyhow::Result<()>;
}
