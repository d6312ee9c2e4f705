//! C5 — Tag Planner and Execution Plan Assembly. Cross-references the
//! scanner's tag index against the planned branches (and the remote's
//! already-synced state), drops tags that point nowhere the remote will
//! ever have, and assembles the final deterministically-ordered
//! `ExecutionPlan`.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::SyncError;
use crate::handler::{CancellationToken, Handler};
use crate::types::{CommitHash, ExecutionPlan, ModuleBranch, ModuleIdentity, ModuleTags};

/// Plans tags for every target identity appearing in `branches`, then
/// assembles the final plan. `module_dir_order` gives each module
/// directory's original configuration insertion index, used as the
/// primary branch sort key.
pub fn plan_tags_and_assemble(
    handler: &dyn Handler,
    cancel: &CancellationToken,
    tags_by_commit: &BTreeMap<CommitHash, Vec<String>>,
    mut branches: Vec<ModuleBranch>,
    module_dir_order: impl Fn(&std::path::Path) -> usize,
) -> Result<ExecutionPlan, SyncError> {
    let mut identities: BTreeSet<ModuleIdentity> = BTreeSet::new();
    for branch in &branches {
        identities.insert(branch.target_identity.clone());
    }

    let mut tags = Vec::new();
    for identity in identities {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let planned_commits: BTreeSet<CommitHash> = branches
            .iter()
            .filter(|b| b.target_identity == identity)
            .flat_map(|b| b.commits_to_sync.iter().map(|mc| mc.commit.hash.clone()))
            .collect();

        let mut tagged_commits = Vec::new();
        for (hash, names) in tags_by_commit {
            if planned_commits.contains(hash) {
                tagged_commits.push((hash.clone(), names.clone()));
                continue;
            }
            let already_synced = handler
                .is_git_commit_synced(cancel, &identity, hash)
                .map_err(|e| SyncError::handler("is_git_commit_synced", Some(identity.clone()), None, e))?;
            if already_synced {
                tagged_commits.push((hash.clone(), names.clone()));
            }
            // Otherwise the tag points at a commit the remote neither has
            // nor will have after this plan executes; drop it silently.
        }

        if !tagged_commits.is_empty() {
            tags.push(ModuleTags {
                target_identity: identity,
                tagged_commits,
            });
        }
    }

    branches.sort_by(|a, b| {
        let order_a = module_dir_order(&a.module_directory);
        let order_b = module_dir_order(&b.module_directory);
        order_a.cmp(&order_b).then_with(|| a.branch_name.cmp(&b.branch_name))
    });

    Ok(ExecutionPlan::new(branches, tags))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeHandler;
    use crate::types::{BuiltModule, Commit, ModuleCommit, ObjectId, PersonIdentity};
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

    fn module_commit(hex: &str) -> ModuleCommit {
        ModuleCommit {
            commit: commit(hex),
            tags_on_this_commit: Vec::new(),
            built_module: BuiltModule::new(PathBuf::from("."), None, Vec::new()),
        }
    }

    #[test]
    fn s7_tag_pruning_keeps_planned_and_already_synced_tags_only() {
        let identity = ModuleIdentity::new("buf.build", "acme", "foo");
        let handler = FakeHandler::new();
        let already_synced_hash = ObjectId::from_hex("02").unwrap();
        handler.set_sync_point(identity.clone(), "main", already_synced_hash.clone());

        let mut tags_by_commit = BTreeMap::new();
        tags_by_commit.insert(ObjectId::from_hex("01").unwrap(), vec!["v1.1".to_string()]); // planned
        tags_by_commit.insert(already_synced_hash, vec!["v1.0-old".to_string()]); // already synced
        tags_by_commit.insert(ObjectId::from_hex("ff").unwrap(), vec!["v1.0".to_string()]); // orphan, dropped

        let branch = ModuleBranch {
            branch_name: "main".into(),
            module_directory: PathBuf::from("."),
            target_identity: identity.clone(),
            commits_to_sync: vec![module_commit("01")],
        };

        let cancel = CancellationToken::new();
        let plan = plan_tags_and_assemble(&handler, &cancel, &tags_by_commit, vec![branch], |_| 0).unwrap();

        assert_eq!(plan.tags().len(), 1);
        let tagged = &plan.tags()[0].tagged_commits;
        let names: Vec<&str> = tagged.iter().flat_map(|(_, n)| n.iter().map(String::as_str)).collect();
        assert!(names.contains(&"v1.1"));
        assert!(names.contains(&"v1.0-old"));
        assert!(!names.contains(&"v1.0"));
    }

    #[test]
    fn branches_sort_by_module_dir_order_then_branch_name() {
        let identity = ModuleIdentity::new("buf.build", "acme", "foo");
        let handler = FakeHandler::new();
        let cancel = CancellationToken::new();

        let branch_b_second = ModuleBranch {
            branch_name: "zzz".into(),
            module_directory: PathBuf::from("second"),
            target_identity: identity.clone(),
            commits_to_sync: Vec::new(),
        };
        let branch_a_first_z = ModuleBranch {
            branch_name: "zzz".into(),
            module_directory: PathBuf::from("first"),
            target_identity: identity.clone(),
            commits_to_sync: Vec::new(),
        };
        let branch_a_first_a = ModuleBranch {
            branch_name: "aaa".into(),
            module_directory: PathBuf::from("first"),
            target_identity: identity,
            commits_to_sync: Vec::new(),
        };

        let order = |p: &std::path::Path| if p == PathBuf::from("first") { 0 } else { 1 };
        let plan = plan_tags_and_assemble(
            &handler,
            &cancel,
            &BTreeMap::new(),
            vec![branch_b_second, branch_a_first_z, branch_a_first_a],
            order,
        )
        .unwrap();

        let names: Vec<(&str, &str)> = plan
            .branches()
            .iter()
            .map(|b| (b.module_directory.to_str().unwrap(), b.branch_name.as_str()))
            .collect();
        assert_eq!(names, vec![("first", "aaa"), ("first", "zzz"), ("second", "zzz")]);
    }
}
