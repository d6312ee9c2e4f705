//! `git2`-backed `Repository`/`Tree` implementation for `modsync-core`.
//!
//! The core never parses Git's on-disk formats itself; this crate is the
//! one place that does, translating `git2`'s borrowed, repository-scoped
//! types into the owned values the planner expects.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use modsync_core::repository::{Repository, Tree, WalkControl};
use modsync_core::types::{Commit, CommitHash, ModuleFile, ObjectId, PersonIdentity};

/// Opens a local Git repository for planning. `remote_name`, when given,
/// is used to resolve the default branch from `refs/remotes/<remote>/HEAD`;
/// without it (or if that ref is absent), the currently checked-out branch
/// stands in for the default branch.
pub struct GitRepository {
    repo: Rc<git2::Repository>,
    remote_name: Option<String>,
}

impl GitRepository {
    pub fn open(path: impl AsRef<Path>, remote_name: Option<String>) -> anyhow::Result<Self> {
        let repo = git2::Repository::open(path)?;
        Ok(Self {
            repo: Rc::new(repo),
            remote_name,
        })
    }
}

fn to_person(sig: &git2::Signature<'_>) -> PersonIdentity {
    PersonIdentity {
        name: sig.name().unwrap_or_default().to_string(),
        email: sig.email().unwrap_or_default().to_string(),
        timestamp: sig.when().seconds(),
    }
}

fn to_core_commit(commit: &git2::Commit<'_>) -> anyhow::Result<Commit> {
    let hash = CommitHash::from_hex(commit.id().to_string())?;
    let parents = commit
        .parent_ids()
        .map(|id| CommitHash::from_hex(id.to_string()).map_err(anyhow::Error::from))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let tree = ObjectId::from_hex(commit.tree_id().to_string())?;
    Ok(Commit {
        hash,
        parents,
        tree,
        author: to_person(&commit.author()),
        committer: to_person(&commit.committer()),
        message: commit.message().unwrap_or_default().to_string(),
    })
}

impl Repository for GitRepository {
    fn default_branch(&self) -> anyhow::Result<String> {
        if let Some(remote) = &self.remote_name {
            let refname = format!("refs/remotes/{remote}/HEAD");
            if let Ok(reference) = self.repo.find_reference(&refname) {
                if let Some(target) = reference.symbolic_target() {
                    if let Some(name) = target.rsplit('/').next() {
                        return Ok(name.to_string());
                    }
                }
            }
        }
        self.current_branch()
    }

    fn current_branch(&self) -> anyhow::Result<String> {
        let head = self.repo.head()?;
        let name = head
            .shorthand()
            .ok_or_else(|| anyhow::anyhow!("HEAD does not point at a branch"))?;
        Ok(name.to_string())
    }

    fn for_each_branch(&self, f: &mut dyn FnMut(&str, &CommitHash)) -> anyhow::Result<()> {
        for branch in self.repo.branches(Some(git2::BranchType::Local))? {
            let (branch, _) = branch?;
            let name = branch
                .name()?
                .ok_or_else(|| anyhow::anyhow!("branch name is not valid UTF-8"))?
                .to_string();
            let oid = branch
                .get()
                .target()
                .ok_or_else(|| anyhow::anyhow!("branch {name:?} has no direct target"))?;
            let hash = CommitHash::from_hex(oid.to_string())?;
            f(&name, &hash);
        }
        Ok(())
    }

    fn for_each_tag(&self, f: &mut dyn FnMut(&str, &CommitHash)) -> anyhow::Result<()> {
        let mut first_error: Option<anyhow::Error> = None;
        self.repo.tag_foreach(|oid, name_bytes| {
            let outcome: anyhow::Result<()> = (|| {
                let name = std::str::from_utf8(name_bytes)?;
                let short_name = name.strip_prefix("refs/tags/").unwrap_or(name);
                let object = self.repo.find_object(oid, None)?;
                let commit = object.peel_to_commit()?;
                let hash = CommitHash::from_hex(commit.id().to_string())?;
                f(short_name, &hash);
                Ok(())
            })();
            match outcome {
                Ok(()) => true,
                Err(e) => {
                    first_error = Some(e);
                    false
                }
            }
        })?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn head_commit(&self, branch: &str) -> anyhow::Result<Commit> {
        let reference = self.repo.find_branch(branch, git2::BranchType::Local)?.into_reference();
        let oid = reference
            .target()
            .ok_or_else(|| anyhow::anyhow!("branch {branch:?} has no direct target"))?;
        let commit = self.repo.find_commit(oid)?;
        to_core_commit(&commit)
    }

    fn for_each_commit(
        &self,
        startpoint: &CommitHash,
        f: &mut dyn FnMut(&Commit) -> WalkControl,
    ) -> anyhow::Result<()> {
        let mut cursor = Some(git2::Oid::from_str(startpoint.as_hex())?);
        while let Some(oid) = cursor {
            let commit = self.repo.find_commit(oid)?;
            let core_commit = to_core_commit(&commit)?;
            if f(&core_commit) == WalkControl::Stop {
                break;
            }
            cursor = commit.parent_id(0).ok();
        }
        Ok(())
    }

    fn find_commit(&self, hash: &CommitHash) -> anyhow::Result<Option<Commit>> {
        let oid = git2::Oid::from_str(hash.as_hex())?;
        match self.repo.find_commit(oid) {
            Ok(commit) => Ok(Some(to_core_commit(&commit)?)),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn tree_at(&self, commit: &CommitHash) -> anyhow::Result<Box<dyn Tree>> {
        let oid = git2::Oid::from_str(commit.as_hex())?;
        let commit = self.repo.find_commit(oid)?;
        let tree_oid = commit.tree_id();
        Ok(Box::new(GitTree {
            repo: Rc::clone(&self.repo),
            tree_oid,
        }))
    }
}

/// A read-only view of one commit's tree. Re-opens the `git2::Tree` from
/// `tree_oid` on every call rather than holding one across calls, since
/// `git2::Tree<'_>` borrows from the repository and can't outlive a method
/// body without pinning a lifetime onto the `Tree` trait itself.
struct GitTree {
    repo: Rc<git2::Repository>,
    tree_oid: git2::Oid,
}

impl GitTree {
    fn subtree(&self, dir: &str) -> Option<git2::Tree<'_>> {
        let root = self.repo.find_tree(self.tree_oid).ok()?;
        if dir.is_empty() || dir == "." {
            return Some(root);
        }
        let entry = root.get_path(Path::new(dir)).ok()?;
        entry.to_object(&self.repo).ok()?.into_tree().ok()
    }
}

impl Tree for GitTree {
    fn files_under(&self, dir: &str) -> Option<Vec<ModuleFile>> {
        let subtree = self.subtree(dir)?;
        let mut files = Vec::new();
        let result = subtree.walk(git2::TreeWalkMode::PreOrder, |root_path, entry| {
            if entry.kind() == Some(git2::ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    files.push(ModuleFile {
                        path: format!("{root_path}{name}"),
                        blob: ObjectId::from_hex(entry.id().to_string())
                            .expect("git2 object ids are always valid hex"),
                    });
                }
            }
            git2::TreeWalkResult::Ok
        });
        result.ok()?;
        Some(files)
    }

    fn read(&self, dir: &str, relpath: &str) -> Option<Vec<u8>> {
        let root = self.repo.find_tree(self.tree_oid).ok()?;
        let full_path: PathBuf = if dir.is_empty() || dir == "." {
            PathBuf::from(relpath)
        } else {
            Path::new(dir).join(relpath)
        };
        let entry = root.get_path(&full_path).ok()?;
        let object = entry.to_object(&self.repo).ok()?;
        let blob = object.into_blob().ok()?;
        Some(blob.content().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::process::Command;
    use tempfile::TempDir;

    fn run_git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "test")
            .env("GIT_AUTHOR_EMAIL", "test@example.com")
            .env("GIT_COMMITTER_NAME", "test")
            .env("GIT_COMMITTER_EMAIL", "test@example.com")
            .status()
            .expect("git invocation failed");
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo_with_module() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q", "-b", "main"]);
        std::fs::create_dir_all(dir.path().join("proto")).unwrap();
        std::fs::write(
            dir.path().join("proto/module.toml"),
            "name = \"buf.build/acme/foo\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("proto/a.proto"), "message A {}\n").unwrap();
        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "-q", "-m", "add module"]);
        run_git(dir.path(), &["tag", "v1.0"]);
        dir
    }

    #[test]
    #[serial]
    fn reads_head_commit_and_tree_contents() {
        let dir = init_repo_with_module();
        let repo = GitRepository::open(dir.path(), None).unwrap();

        let branch = repo.current_branch().unwrap();
        assert_eq!(branch, "main");

        let head = repo.head_commit(&branch).unwrap();
        assert_eq!(head.message.trim(), "add module");
        assert!(head.parents.is_empty());

        let tree = repo.tree_at(&head.hash).unwrap();
        let files = tree.files_under("proto").expect("proto directory exists");
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert!(paths.contains(&"module.toml"));
        assert!(paths.contains(&"a.proto"));

        let manifest = tree.read("proto", "module.toml").expect("manifest readable");
        assert_eq!(String::from_utf8(manifest).unwrap(), "name = \"buf.build/acme/foo\"\n");
    }

    #[test]
    #[serial]
    fn enumerates_tags_by_target_commit() {
        let dir = init_repo_with_module();
        let repo = GitRepository::open(dir.path(), None).unwrap();
        let head = repo.head_commit("main").unwrap();

        let mut seen = Vec::new();
        repo.for_each_tag(&mut |name, hash| seen.push((name.to_string(), hash.clone()))).unwrap();
        assert_eq!(seen, vec![("v1.0".to_string(), head.hash)]);
    }

    #[test]
    #[serial]
    fn missing_directory_yields_no_files() {
        let dir = init_repo_with_module();
        let repo = GitRepository::open(dir.path(), None).unwrap();
        let head = repo.head_commit("main").unwrap();
        let tree = repo.tree_at(&head.hash).unwrap();
        assert!(tree.files_under("does-not-exist").is_none());
    }

    #[test]
    #[serial]
    fn first_parent_walk_visits_linear_history_in_order() {
        let dir = init_repo_with_module();
        std::fs::write(dir.path().join("proto/b.proto"), "message B {}\n").unwrap();
        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "-q", "-m", "second commit"]);

        let repo = GitRepository::open(dir.path(), None).unwrap();
        let head = repo.head_commit("main").unwrap();

        let mut messages = Vec::new();
        repo.for_each_commit(&head.hash, &mut |commit| {
            messages.push(commit.message.trim().to_string());
            WalkControl::Continue
        })
        .unwrap();
        assert_eq!(messages, vec!["second commit", "add module"]);
    }
}
