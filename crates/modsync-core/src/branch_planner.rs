//! C4 — Branch Planner. For one `(module-directory, branch, target-identity)`
//! triple, classifies the pair into one of the resumption cases (N1-N6,
//! E1-E7) and materializes the ordered commit list to publish. The hardest
//! component in the core; everything else in this crate exists to feed it.

use std::collections::BTreeMap;

use crate::error::SyncError;
use crate::handler::{CancellationToken, Handler};
use crate::reader::read_module;
use crate::repository::{Repository, WalkControl};
use crate::resolver::ResolvedTarget;
use crate::types::{BuiltModule, Commit, CommitHash, ContentDigest, ModuleBranch, ModuleCommit};

/// Where to cut the branch's first-parent chain when materializing the
/// commit list. All variants are expressed relative to the chain collected
/// head-to-root; `chain[0]` is always the branch HEAD.
#[derive(Debug, Clone)]
enum Resumption {
    /// Include the whole branch, down to the root commit.
    FromRoot,
    /// Include `hash` and everything newer.
    FromCommit(CommitHash),
    /// Include everything newer than `hash`, excluding `hash` itself.
    AfterCommit(CommitHash),
    /// Include only the branch tip.
    HeadOnly,
    /// Nothing to publish (re-run with no new commits past the sync point).
    Empty,
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), SyncError> {
    if cancel.is_cancelled() {
        Err(SyncError::Cancelled)
    } else {
        Ok(())
    }
}

/// Collects the branch's first-parent ancestry from `head` to the root,
/// newest first. A visited set guards against malformed history that
/// claims a cycle; first-parent walks in well-formed Git history never
/// revisit a commit.
fn collect_chain(repo: &dyn Repository, head: &CommitHash) -> Result<Vec<Commit>, SyncError> {
    let mut chain = Vec::new();
    let mut visited = std::collections::HashSet::new();
    repo.for_each_commit(head, &mut |commit| {
        if !visited.insert(commit.hash.clone()) {
            return WalkControl::Stop;
        }
        chain.push(commit.clone());
        WalkControl::Continue
    })
    .map_err(|e| SyncError::RepositoryState(e.to_string()))?;
    Ok(chain)
}

/// First (newest) index in `chain` whose hash has ever been synced for
/// `identity`, on any branch.
fn find_overlap_index(
    handler: &dyn Handler,
    cancel: &CancellationToken,
    identity: &crate::types::ModuleIdentity,
    chain: &[Commit],
) -> Result<Option<usize>, SyncError> {
    for (idx, commit) in chain.iter().enumerate() {
        check_cancel(cancel)?;
        let synced = handler
            .is_git_commit_synced(cancel, identity, &commit.hash)
            .map_err(|e| {
                SyncError::handler(
                    "is_git_commit_synced",
                    Some(identity.clone()),
                    None,
                    e,
                )
            })?;
        if synced {
            return Ok(Some(idx));
        }
    }
    Ok(None)
}

/// First (newest) index in `chain` whose built module's content digest
/// matches `target_digest`. Commits whose module cannot be read are simply
/// skipped, per §4.4: read errors never abort content-match.
fn find_content_match_index(
    repo: &dyn Repository,
    dir: &std::path::Path,
    branch: &str,
    chain: &[Commit],
    target_digest: ContentDigest,
) -> Result<Option<usize>, SyncError> {
    for (idx, commit) in chain.iter().enumerate() {
        let tree = repo
            .tree_at(&commit.hash)
            .map_err(|e| SyncError::RepositoryState(e.to_string()))?;
        let (built, _err) =
            read_module(tree.as_ref(), &dir.to_path_buf(), branch, commit.hash.as_hex(), None);
        if let Some(built) = built {
            if built.digest() == target_digest {
                return Ok(Some(idx));
            }
        }
    }
    Ok(None)
}

/// Plans one `(module-directory, branch)` pair already resolved to a
/// target identity. `sync_point` is the handler's previously-resolved sync
/// point for this `(identity, branch)`, already validated against the
/// local object store by the caller (see `resolver::resolve_sync_point`).
/// `has_override` reflects whether the user supplied an explicit identity
/// override for this directory, which licenses rebuilding commits whose
/// parsed module identity would otherwise not match the target.
#[allow(clippy::too_many_arguments)]
pub fn plan_branch(
    repo: &dyn Repository,
    handler: &dyn Handler,
    cancel: &CancellationToken,
    target: &ResolvedTarget,
    sync_point: Option<CommitHash>,
    has_override: bool,
    tags_by_commit: &BTreeMap<CommitHash, Vec<String>>,
) -> Result<ModuleBranch, SyncError> {
    check_cancel(cancel)?;

    let identity = &target.identity;
    let branch = &target.branch;

    let is_protected = handler
        .is_protected_branch(cancel, identity, branch)
        .map_err(|e| SyncError::handler("is_protected_branch", Some(identity.clone()), Some(branch.clone()), e))?;
    let remote_head = handler
        .get_branch_head(cancel, identity, branch)
        .map_err(|e| SyncError::handler("get_branch_head", Some(identity.clone()), Some(branch.clone()), e))?;

    let chain = collect_chain(repo, &target.head)?;

    let resumption = match remote_head {
        None => plan_nonexistent_branch(repo, handler, cancel, target, is_protected, &chain)?,
        Some(remote) => plan_existing_branch(
            repo,
            handler,
            cancel,
            target,
            is_protected,
            sync_point,
            remote.digest,
            &chain,
        )?,
    };

    let selected: Vec<&Commit> = match &resumption {
        Resumption::FromRoot => chain.iter().collect(),
        Resumption::FromCommit(hash) => {
            let idx = chain
                .iter()
                .position(|c| &c.hash == hash)
                .expect("resumption anchor must come from the collected chain");
            chain[..=idx].iter().collect()
        }
        Resumption::AfterCommit(hash) => {
            let idx = chain
                .iter()
                .position(|c| &c.hash == hash)
                .expect("resumption anchor must come from the collected chain");
            chain[..idx].iter().collect()
        }
        Resumption::HeadOnly => chain.first().into_iter().collect(),
        Resumption::Empty => Vec::new(),
    };

    let mut commits_to_sync = Vec::with_capacity(selected.len());
    for commit in selected.into_iter().rev() {
        check_cancel(cancel)?;
        let tree = repo
            .tree_at(&commit.hash)
            .map_err(|e| SyncError::RepositoryState(e.to_string()))?;
        let (built, err) = read_module(
            tree.as_ref(),
            &target.module_directory,
            branch,
            commit.hash.as_hex(),
            Some(identity),
        );

        let Some(built) = reconcile_built_module(built, err, identity, has_override) else {
            continue;
        };

        let tags = tags_by_commit.get(&commit.hash).cloned().unwrap_or_default();
        commits_to_sync.push(ModuleCommit {
            commit: commit.clone(),
            tags_on_this_commit: tags,
            built_module: built,
        });
    }

    Ok(ModuleBranch {
        branch_name: branch.clone(),
        module_directory: target.module_directory.clone(),
        target_identity: identity.clone(),
        commits_to_sync,
    })
}

/// Applies a non-matching or missing identity according to override policy,
/// returning the module to publish or `None` to skip this commit entirely.
fn reconcile_built_module(
    built: Option<BuiltModule>,
    err: Option<crate::error::ReadModuleError>,
    target_identity: &crate::types::ModuleIdentity,
    has_override: bool,
) -> Option<BuiltModule> {
    use crate::error::{default_policy, ReadErrorPolicy};

    let mut built = built?;
    let Some(err) = err else {
        return Some(built);
    };

    match default_policy(err.kind) {
        ReadErrorPolicy::Override if has_override => {
            built.identity = Some(target_identity.clone());
            Some(built)
        }
        ReadErrorPolicy::Override => None,
        ReadErrorPolicy::Skip => None,
        // Neither reachable from `default_policy` today; this walk never
        // aborts or truncates on a read error.
        ReadErrorPolicy::Fail | ReadErrorPolicy::Stop => None,
    }
}

fn plan_nonexistent_branch(
    repo: &dyn Repository,
    handler: &dyn Handler,
    cancel: &CancellationToken,
    target: &ResolvedTarget,
    is_protected: bool,
    chain: &[Commit],
) -> Result<Resumption, SyncError> {
    let identity = &target.identity;
    let branch = &target.branch;

    if !is_protected {
        return Ok(match find_overlap_index(handler, cancel, identity, chain)? {
            Some(idx) => Resumption::FromCommit(chain[idx].hash.clone()), // N1
            None => Resumption::FromRoot,                                 // N2
        });
    }

    let is_release = handler
        .is_release_branch(cancel, identity, branch)
        .map_err(|e| SyncError::handler("is_release_branch", Some(identity.clone()), Some(branch.clone()), e))?;
    if !is_release {
        return Ok(Resumption::FromRoot); // N3
    }

    let release_head = handler
        .get_release_head(cancel, identity)
        .map_err(|e| SyncError::handler("get_release_head", Some(identity.clone()), Some(branch.clone()), e))?;
    let Some(release_head) = release_head else {
        return Ok(Resumption::FromRoot); // N4
    };

    match find_content_match_index(repo, &target.module_directory, branch, chain, release_head.digest)? {
        Some(idx) => {
            let hash = chain[idx].hash.clone();
            let already_synced = handler
                .is_git_commit_synced(cancel, identity, &hash)
                .map_err(|e| SyncError::handler("is_git_commit_synced", Some(identity.clone()), None, e))?;
            Ok(if already_synced {
                Resumption::AfterCommit(hash) // N5, exclusive
            } else {
                Resumption::FromCommit(hash) // N5, inclusive
            })
        }
        None => Ok(Resumption::HeadOnly), // N6
    }
}

#[allow(clippy::too_many_arguments)]
fn plan_existing_branch(
    repo: &dyn Repository,
    handler: &dyn Handler,
    cancel: &CancellationToken,
    target: &ResolvedTarget,
    is_protected: bool,
    sync_point: Option<CommitHash>,
    remote_digest: ContentDigest,
    chain: &[Commit],
) -> Result<Resumption, SyncError> {
    let identity = &target.identity;
    let branch = &target.branch;

    let Some(sync_point) = sync_point else {
        // E1 / E2: remote has commits for this identity/branch, but this
        // runner has no prior recorded sync point for it.
        return Ok(match find_content_match_index(repo, &target.module_directory, branch, chain, remote_digest)? {
            Some(idx) => Resumption::FromCommit(chain[idx].hash.clone()), // E1
            None => Resumption::HeadOnly,                                 // E2
        });
    };

    if is_protected {
        // E3 / E4
        return match chain.iter().position(|c| c.hash == sync_point) {
            None => Err(SyncError::ResumptionDivergence {
                identity: identity.clone(),
                branch: branch.clone(),
            }),
            Some(0) => Ok(Resumption::Empty), // sync point is already HEAD
            Some(_) => Ok(Resumption::FromCommit(sync_point)),
        };
    }

    // E5 / E6 / E7
    match find_overlap_index(handler, cancel, identity, chain)? {
        Some(idx) => Ok(Resumption::FromCommit(chain[idx].hash.clone())), // E5
        None => Ok(
            match find_content_match_index(repo, &target.module_directory, branch, chain, remote_digest)? {
                Some(idx) => Resumption::FromCommit(chain[idx].hash.clone()), // E6
                None => Resumption::HeadOnly,                                  // E7
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RemoteCommit;
    use crate::testing::{FakeHandler, FakeRepository, FakeTree};
    use crate::types::{ModuleIdentity, ObjectId, PersonIdentity};
    use std::path::PathBuf;

    struct Chain {
        repo: FakeRepository,
        hashes: Vec<CommitHash>,
    }

    /// Builds a linear chain of `n` commits, each with a named module at
    /// `dir`, the last one being HEAD on `branch`.
    fn build_chain(branch: &str, dir: &str, identity: &str, n: usize) -> Chain {
        let mut repo = FakeRepository {
            default_branch: "main".into(),
            current_branch: "main".into(),
            ..Default::default()
        };
        let mut hashes = Vec::new();
        let mut parent: Option<CommitHash> = None;
        for i in 0..n {
            let hash = ObjectId::from_hex(format!("{:02x}", i + 1)).unwrap();
            let commit = Commit {
                hash: hash.clone(),
                parents: parent.clone().into_iter().collect(),
                tree: ObjectId::from_hex("aa").unwrap(),
                author: PersonIdentity { name: "a".into(), email: "a@x".into(), timestamp: i as i64 },
                committer: PersonIdentity { name: "a".into(), email: "a@x".into(), timestamp: i as i64 },
                message: format!("c{i}"),
            };
            let mut tree = FakeTree::default();
            tree.add_file(dir, "module.toml", format!("name = \"{identity}\""), ObjectId::from_hex("aa").unwrap());
            tree.add_file(dir, "x.proto", format!("v{i}"), ObjectId::from_hex(format!("{:02x}", 100 + i)).unwrap());
            repo.trees.insert(hash.clone(), tree);
            repo.commits.insert(hash.clone(), commit);
            hashes.push(hash.clone());
            parent = Some(hash);
        }
        repo.branches.insert(branch.to_string(), hashes.last().unwrap().clone());
        Chain { repo, hashes }
    }

    fn target(chain: &Chain, branch: &str, dir: &str, identity: &str) -> ResolvedTarget {
        ResolvedTarget {
            branch: branch.to_string(),
            module_directory: PathBuf::from(dir),
            identity: ModuleIdentity::parse(identity).unwrap(),
            head: chain.hashes.last().unwrap().clone(),
        }
    }

    #[test]
    fn s1_no_previous_sync_single_branch_plans_entire_history() {
        let chain = build_chain("main", ".", "buf.build/acme/foo", 5);
        let t = target(&chain, "main", ".", "buf.build/acme/foo");
        let handler = FakeHandler::new();
        handler.set_default_branch(t.identity.clone(), "main");
        let cancel = CancellationToken::new();

        let plan = plan_branch(&chain.repo, &handler, &cancel, &t, None, false, &BTreeMap::new()).unwrap();
        let hashes: Vec<_> = plan.commits_to_sync.iter().map(|c| c.commit.hash.clone()).collect();
        assert_eq!(hashes, chain.hashes);
    }

    #[test]
    fn s2_resume_on_protected_branch_includes_sync_point_and_new_commit() {
        let chain = build_chain("main", ".", "buf.build/acme/foo", 6);
        let t = target(&chain, "main", ".", "buf.build/acme/foo");
        let handler = FakeHandler::new();
        handler.set_default_branch(t.identity.clone(), "main");
        // Previously synced through the fifth commit (index 4); HEAD is the sixth.
        let sync_point = chain.hashes[4].clone();
        handler.set_branch_head(t.identity.clone(), "main", sync_point.clone(), ContentDigest::from_bytes([0u8; 32]));
        let cancel = CancellationToken::new();

        let plan = plan_branch(&chain.repo, &handler, &cancel, &t, Some(sync_point.clone()), false, &BTreeMap::new()).unwrap();
        let hashes: Vec<_> = plan.commits_to_sync.iter().map(|c| c.commit.hash.clone()).collect();
        assert_eq!(hashes, vec![chain.hashes[4].clone(), chain.hashes[5].clone()]);
    }

    #[test]
    fn s3_protected_divergence_fails() {
        let chain = build_chain("main", ".", "buf.build/acme/foo", 4);
        let t = target(&chain, "main", ".", "buf.build/acme/foo");
        let handler = FakeHandler::new();
        handler.set_default_branch(t.identity.clone(), "main");
        let orphan_sync_point = ObjectId::from_hex("ff").unwrap();
        handler.set_branch_head(t.identity.clone(), "main", orphan_sync_point.clone(), ContentDigest::from_bytes([0u8; 32]));
        let cancel = CancellationToken::new();

        let result = plan_branch(&chain.repo, &handler, &cancel, &t, Some(orphan_sync_point), false, &BTreeMap::new());
        assert!(matches!(result, Err(SyncError::ResumptionDivergence { .. })));
    }

    #[test]
    fn s4_fork_branch_shares_history_via_overlap() {
        let chain = build_chain("dev", ".", "buf.build/acme/foo", 5);
        let t = target(&chain, "dev", ".", "buf.build/acme/foo");
        let handler = FakeHandler::new();
        // main already synced commit index 2 (third commit) for this identity.
        handler.set_sync_point(t.identity.clone(), "main", chain.hashes[2].clone());
        let cancel = CancellationToken::new();

        let plan = plan_branch(&chain.repo, &handler, &cancel, &t, None, false, &BTreeMap::new()).unwrap();
        let hashes: Vec<_> = plan.commits_to_sync.iter().map(|c| c.commit.hash.clone()).collect();
        assert_eq!(hashes, chain.hashes[2..].to_vec());
    }

    #[test]
    fn s6_overlap_boundary_is_inclusive_not_exclusive() {
        let chain = build_chain("dev", ".", "buf.build/acme/foo", 3);
        let t = target(&chain, "dev", ".", "buf.build/acme/foo");
        let handler = FakeHandler::new();
        handler.set_sync_point(t.identity.clone(), "main", chain.hashes[1].clone());
        let cancel = CancellationToken::new();

        let plan = plan_branch(&chain.repo, &handler, &cancel, &t, None, false, &BTreeMap::new()).unwrap();
        assert_eq!(plan.commits_to_sync.len(), 2);
        assert_eq!(plan.commits_to_sync[0].commit.hash, chain.hashes[1]);
    }

    #[test]
    fn no_overlap_no_content_match_plans_head_only_on_unprotected_branch() {
        let chain = build_chain("dev", ".", "buf.build/acme/foo", 3);
        let t = target(&chain, "dev", ".", "buf.build/acme/foo");
        let handler = FakeHandler::new();
        handler.set_branch_head(t.identity.clone(), "dev", chain.hashes[0].clone(), ContentDigest::from_bytes([9u8; 32]));
        let cancel = CancellationToken::new();

        let plan = plan_branch(&chain.repo, &handler, &cancel, &t, None, false, &BTreeMap::new()).unwrap();
        assert_eq!(plan.commits_to_sync.len(), 1);
        assert_eq!(plan.commits_to_sync[0].commit.hash, chain.hashes[2]);
    }
}
