//! C2 — Repository Scanner. Enumerates the branches to consider and builds
//! the commit-hash to tag-names map the Tag Planner (C5) needs. Pure
//! orchestration over `Repository`; does no module reading itself.

use std::collections::BTreeMap;

use crate::error::SyncError;
use crate::repository::Repository;
use crate::types::{Commit, CommitHash};

/// One branch worth of scan output: its name and current tip commit.
#[derive(Debug, Clone)]
pub struct ScannedBranch {
    pub name: String,
    pub head: Commit,
}

/// The full scan result: branches in a stable order (default branch first,
/// then the rest lexicographic), and every tag's commit hash to the list
/// of tag names that point at it.
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub default_branch: String,
    pub branches: Vec<ScannedBranch>,
    pub tags_by_commit: BTreeMap<CommitHash, Vec<String>>,
}

/// Scans `repo`, returning the branches to plan over and the tag index.
///
/// When `sync_all_branches` is false, only the default branch and the
/// current branch (deduplicated, since they're often the same) are
/// scanned. Fails fast if the default or current branch cannot be found —
/// a missing HEAD means the repository state itself is unusable, not a
/// per-module concern.
pub fn scan_repository(
    repo: &dyn Repository,
    sync_all_branches: bool,
) -> Result<ScanResult, SyncError> {
    let default_branch = repo
        .default_branch()
        .map_err(|e| SyncError::RepositoryState(e.to_string()))?;

    let branch_names: Vec<String> = if sync_all_branches {
        let mut names = Vec::new();
        repo.for_each_branch(&mut |name, _| names.push(name.to_string()))
            .map_err(|e| SyncError::RepositoryState(e.to_string()))?;
        names.sort();
        names
    } else {
        let current_branch = repo
            .current_branch()
            .map_err(|e| SyncError::RepositoryState(e.to_string()))?;
        let mut names = vec![default_branch.clone()];
        if current_branch != default_branch {
            names.push(current_branch);
        }
        names
    };

    // Default branch first, everything else lexicographic; stable and
    // independent of whatever order `for_each_branch` happens to yield.
    let mut ordered: Vec<String> = branch_names
        .into_iter()
        .filter(|n| *n != default_branch)
        .collect();
    ordered.sort();
    ordered.insert(0, default_branch.clone());

    let mut branches = Vec::with_capacity(ordered.len());
    for name in ordered {
        let head = repo
            .head_commit(&name)
            .map_err(|e| SyncError::RepositoryState(format!("branch {name:?}: {e}")))?;
        branches.push(ScannedBranch { name, head });
    }

    let mut tags_by_commit: BTreeMap<CommitHash, Vec<String>> = BTreeMap::new();
    repo.for_each_tag(&mut |name, target| {
        tags_by_commit
            .entry(target.clone())
            .or_default()
            .push(name.to_string());
    })
    .map_err(|e| SyncError::RepositoryState(e.to_string()))?;
    for names in tags_by_commit.values_mut() {
        names.sort();
    }

    Ok(ScanResult {
        default_branch,
        branches,
        tags_by_commit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRepository;
    use crate::types::{CommitHash, PersonIdentity};

    fn commit(hash: &str) -> Commit {
        Commit {
            hash: CommitHash::from_hex(hash).unwrap(),
            parents: Vec::new(),
            tree: CommitHash::from_hex("aa").unwrap(),
            author: PersonIdentity { name: "a".into(), email: "a@x".into(), timestamp: 0 },
            committer: PersonIdentity { name: "a".into(), email: "a@x".into(), timestamp: 0 },
            message: "msg".into(),
        }
    }

    fn base_repo() -> FakeRepository {
        let mut repo = FakeRepository {
            default_branch: "main".into(),
            current_branch: "main".into(),
            ..Default::default()
        };
        repo.branches.insert("main".into(), CommitHash::from_hex("01").unwrap());
        repo.branches.insert("dev".into(), CommitHash::from_hex("02").unwrap());
        repo.commits.insert(CommitHash::from_hex("01").unwrap(), commit("01"));
        repo.commits.insert(CommitHash::from_hex("02").unwrap(), commit("02"));
        repo
    }

    #[test]
    fn default_only_mode_scans_default_and_current_branch() {
        let mut repo = base_repo();
        repo.current_branch = "dev".into();
        let scan = scan_repository(&repo, false).unwrap();
        let names: Vec<&str> = scan.branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["main", "dev"]);
    }

    #[test]
    fn default_only_mode_dedupes_when_current_is_default() {
        let repo = base_repo();
        let scan = scan_repository(&repo, false).unwrap();
        let names: Vec<&str> = scan.branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["main"]);
    }

    #[test]
    fn all_branches_mode_sorts_default_first_then_lexicographic() {
        let mut repo = base_repo();
        repo.branches.insert("alpha".into(), CommitHash::from_hex("03").unwrap());
        repo.commits.insert(CommitHash::from_hex("03").unwrap(), commit("03"));
        let scan = scan_repository(&repo, true).unwrap();
        let names: Vec<&str> = scan.branches.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["main", "alpha", "dev"]);
    }

    #[test]
    fn missing_default_branch_head_fails() {
        let mut repo = base_repo();
        repo.branches.remove("main");
        let result = scan_repository(&repo, false);
        assert!(result.is_err());
    }

    #[test]
    fn tags_are_grouped_by_target_commit_and_sorted() {
        let repo_base = base_repo();
        let mut repo = repo_base;
        repo.tags.insert("v2".into(), CommitHash::from_hex("01").unwrap());
        repo.tags.insert("v1".into(), CommitHash::from_hex("01").unwrap());
        let scan = scan_repository(&repo, false).unwrap();
        let names = scan.tags_by_commit.get(&CommitHash::from_hex("01").unwrap()).unwrap();
        assert_eq!(names, &vec!["v1".to_string(), "v2".to_string()]);
    }
}
