//! The Git-side interface consumed by the core (spec §6). The real Git
//! object-reading library lives outside this crate (see `modsync-git`);
//! the core only ever touches history through this trait.

use crate::types::{Commit, CommitHash, ModuleFile};

/// Returned from a `for_each_commit` callback to control the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    Stop,
}

/// A read-only view of one commit's tree, rooted at the repository root.
/// The Module Reader (C1) only ever touches history through this trait —
/// it never reaches back into `Repository` — so it stays a pure function
/// of `(tree, directory, expected-identity)` as spec §4.1 requires.
pub trait Tree {
    /// Lists files (path relative to `dir`, recursive, forward-slash
    /// separated) under `dir`. Returns `None` if `dir` does not exist in
    /// this tree at all.
    fn files_under(&self, dir: &str) -> Option<Vec<ModuleFile>>;

    /// Reads the raw bytes of a file at `dir/relpath`. `None` if missing.
    fn read(&self, dir: &str, relpath: &str) -> Option<Vec<u8>>;
}

/// The narrow Git-reading interface the planner depends on.
pub trait Repository {
    fn default_branch(&self) -> anyhow::Result<String>;

    fn current_branch(&self) -> anyhow::Result<String>;

    /// Enumerates every branch to consider, each with its tip hash.
    fn for_each_branch(&self, f: &mut dyn FnMut(&str, &CommitHash)) -> anyhow::Result<()>;

    /// Enumerates every tag, each with the commit hash it targets.
    fn for_each_tag(&self, f: &mut dyn FnMut(&str, &CommitHash)) -> anyhow::Result<()>;

    fn head_commit(&self, branch: &str) -> anyhow::Result<Commit>;

    /// Walks first-parent ancestry starting at `startpoint`, most recent
    /// first. `f` returning `WalkControl::Stop` halts the walk.
    fn for_each_commit(
        &self,
        startpoint: &CommitHash,
        f: &mut dyn FnMut(&Commit) -> WalkControl,
    ) -> anyhow::Result<()>;

    /// Looks up a single commit by hash, for validating sync points.
    /// `Ok(None)` means the object does not exist in the local store.
    fn find_commit(&self, hash: &CommitHash) -> anyhow::Result<Option<Commit>>;

    /// The tree rooted at `commit`, for the Module Reader to inspect.
    fn tree_at(&self, commit: &CommitHash) -> anyhow::Result<Box<dyn Tree>>;
}
