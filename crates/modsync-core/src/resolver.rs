//! C3 — Target Resolver. Turns each `(module directory, branch)` pair into
//! a target identity by reading the module at the branch's HEAD, then
//! rejects identities claimed by more than one directory on the same
//! branch. Also owns the sync-point validation hook-calling logic shared
//! by every branch's planning.

use std::path::PathBuf;

use crate::error::SyncError;
use crate::handler::{CancellationToken, Handler};
use crate::reader::read_module;
use crate::repository::Repository;
use crate::scanner::ScannedBranch;
use crate::types::{CommitHash, ModuleIdentity};

/// One module directory resolved to a target identity on one branch.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    pub branch: String,
    pub module_directory: PathBuf,
    pub identity: ModuleIdentity,
    pub head: CommitHash,
}

/// Resolves every `(module_dir, branch)` pair to a target identity.
///
/// A directory with no module, an unnamed module, or a read error at HEAD
/// simply contributes no target for that branch — that's not an error,
/// it just means this branch currently publishes nothing for that
/// directory. Two directories resolving to the same identity on the same
/// branch *is* an error: the registry has no way to tell which one is
/// authoritative.
pub fn resolve_targets(
    repo: &dyn Repository,
    branches: &[ScannedBranch],
    module_dirs: &[PathBuf],
    override_for: impl Fn(&std::path::Path) -> Option<&ModuleIdentity>,
) -> Result<Vec<ResolvedTarget>, SyncError> {
    let mut targets = Vec::new();

    for branch in branches {
        let tree = repo
            .tree_at(&branch.head.hash)
            .map_err(|e| SyncError::RepositoryState(e.to_string()))?;

        let mut seen: Vec<(ModuleIdentity, PathBuf)> = Vec::new();

        for dir in module_dirs {
            let expected = override_for(dir);

            // An override always wins outright (spec step 1): the target is
            // that override regardless of what HEAD actually names. Only
            // without one do we fall back to reading HEAD's own identity.
            let identity = if let Some(ov) = expected {
                Some(ov.clone())
            } else {
                let (built, err) =
                    read_module(tree.as_ref(), dir, &branch.name, branch.head.hash.as_hex(), None);
                match (&built, &err) {
                    (Some(built), None) => built.identity.clone(),
                    _ => None,
                }
            };

            let Some(identity) = identity else {
                continue;
            };

            if let Some((_, other_dir)) = seen.iter().find(|(id, _)| *id == identity) {
                let mut directories = vec![other_dir.clone(), dir.clone()];
                directories.sort();
                return Err(SyncError::DuplicateIdentity {
                    identity,
                    branch: branch.name.clone(),
                    directories,
                });
            }
            seen.push((identity.clone(), dir.clone()));

            targets.push(ResolvedTarget {
                branch: branch.name.clone(),
                module_directory: dir.clone(),
                identity,
                head: branch.head.hash.clone(),
            });
        }
    }

    Ok(targets)
}

/// Resolves the remote sync point for one target, applying the
/// `invalid_sync_point` hook when the resolved hash is absent from the
/// local object store. Returns `Ok(None)` for "no sync point" (either the
/// remote genuinely has none, or the hook chose to proceed as if it had
/// none after a warning).
pub fn resolve_sync_point(
    repo: &dyn Repository,
    handler: &dyn Handler,
    cancel: &CancellationToken,
    target: &ResolvedTarget,
    is_default_branch: bool,
) -> Result<Option<CommitHash>, SyncError> {
    let Some(hash) = handler
        .resolve_sync_point(cancel, &target.identity, &target.branch)
        .map_err(|e| {
            SyncError::handler(
                "resolve_sync_point",
                Some(target.identity.clone()),
                Some(target.branch.clone()),
                e,
            )
        })?
    else {
        return Ok(None);
    };

    match repo.find_commit(&hash) {
        Ok(Some(_)) => Ok(Some(hash)),
        Ok(None) => {
            let err = anyhow::anyhow!(
                "sync point {hash} for {} on {:?} is not a known local commit",
                target.identity,
                target.branch
            );
            match handler.invalid_sync_point(
                cancel,
                &target.identity,
                &target.branch,
                &hash,
                is_default_branch,
                &err,
            ) {
                Some(abort) => Err(SyncError::handler(
                    "invalid_sync_point",
                    Some(target.identity.clone()),
                    Some(target.branch.clone()),
                    abort,
                )),
                None => Ok(None),
            }
        }
        Err(e) => Err(SyncError::RepositoryState(e.to_string())),
    }
}
