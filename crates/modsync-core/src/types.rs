//! Domain types: module identity, Git object references, built modules,
//! and the execution plan the planner produces.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use sha2::{Digest, Sha256};

use serde::{Deserialize, Serialize};

/// `host/owner/name`. Equality and ordering are by the canonical string
/// form; case-sensitive, per spec.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleIdentity {
    host: String,
    owner: String,
    name: String,
}

impl ModuleIdentity {
    pub fn new(
        host: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parses `host/owner/name`. Fails unless there are exactly three
    /// non-empty slash-separated components.
    pub fn parse(s: &str) -> Result<Self, ModuleIdentityParseError> {
        let parts: Vec<&str> = s.split('/').collect();
        let [host, owner, name] = parts.as_slice() else {
            return Err(ModuleIdentityParseError(s.to_string()));
        };
        if host.is_empty() || owner.is_empty() || name.is_empty() {
            return Err(ModuleIdentityParseError(s.to_string()));
        }
        Ok(Self::new(*host, *owner, *name))
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid module identity {0:?}: expected host/owner/name")]
pub struct ModuleIdentityParseError(String);

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.name)
    }
}

impl std::str::FromStr for ModuleIdentity {
    type Err = ModuleIdentityParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModuleIdentity {
    type Error = ModuleIdentityParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ModuleIdentity> for String {
    fn from(id: ModuleIdentity) -> Self {
        id.to_string()
    }
}

impl PartialOrd for ModuleIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ModuleIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

/// An opaque Git object id (commit, tree, or blob — they share one hash
/// space). Stored as canonical lowercase hex; equality is by hex form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(Box<str>);

/// Alias used wherever the spec speaks of a commit hash specifically.
pub type CommitHash = ObjectId;

impl ObjectId {
    pub fn from_hex(hex: impl AsRef<str>) -> Result<Self, ObjectIdParseError> {
        let hex = hex.as_ref();
        if hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ObjectIdParseError(hex.to_string()));
        }
        Ok(Self(hex.to_ascii_lowercase().into_boxed_str()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(bytes).into_boxed_str())
    }

    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid object id {0:?}: expected hex digits")]
pub struct ObjectIdParseError(String);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ObjectId {
    type Err = ObjectIdParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = ObjectIdParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0.into_string()
    }
}

/// Author/committer identity on a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonIdentity {
    pub name: String,
    pub email: String,
    /// Unix timestamp (seconds).
    pub timestamp: i64,
}

/// A Git commit as observed by the core. Immutable; never mutated once
/// built by the Repository Scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub hash: CommitHash,
    pub parents: Vec<CommitHash>,
    pub tree: ObjectId,
    pub author: PersonIdentity,
    pub committer: PersonIdentity,
    pub message: String,
}

impl Commit {
    /// First-parent predecessor, if any.
    pub fn first_parent(&self) -> Option<&CommitHash> {
        self.parents.first()
    }
}

/// `(name, target-commit-hash)`. Many tags may share a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub target: CommitHash,
}

/// One file beneath a module directory: its repo-relative path (rooted at
/// the module directory, forward-slash separated) and Git blob id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFile {
    pub path: String,
    pub blob: ObjectId,
}

/// A value that uniquely identifies a module's published form. Two
/// commits whose built modules share a digest publish identical content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; 32]);

impl ContentDigest {
    /// Wraps a digest already computed elsewhere (e.g. reported by the
    /// registry transport over the wire).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Computes the content digest of a module as the SHA-256 of a
/// canonicalized manifest of (path, blob id) pairs: sorted by path so the
/// result is independent of tree traversal order, and built from blob ids
/// rather than file bytes so it is platform-independent (no line-ending or
/// encoding artifacts) and cheap to compute for large subtrees.
pub fn compute_content_digest(files: &[ModuleFile]) -> ContentDigest {
    let mut sorted: Vec<&ModuleFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(file.path.as_bytes());
        hasher.update(b"\0");
        hasher.update(file.blob.as_hex().as_bytes());
        hasher.update(b"\n");
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    ContentDigest(out)
}

/// The output of the Module Reader (C1) for a commit/directory pair when a
/// manifest exists. Lifetime: one planning run.
#[derive(Debug, Clone)]
pub struct BuiltModule {
    pub module_directory: PathBuf,
    pub identity: Option<ModuleIdentity>,
    pub files: Vec<ModuleFile>,
    digest: OnceLock<ContentDigest>,
}

impl BuiltModule {
    pub fn new(
        module_directory: PathBuf,
        identity: Option<ModuleIdentity>,
        files: Vec<ModuleFile>,
    ) -> Self {
        Self {
            module_directory,
            identity,
            files,
            digest: OnceLock::new(),
        }
    }

    /// Lazily computed and memoized; stable across calls and processes for
    /// the same file list.
    pub fn digest(&self) -> ContentDigest {
        *self.digest.get_or_init(|| compute_content_digest(&self.files))
    }
}

/// A commit that should be published for a particular module target.
#[derive(Debug, Clone)]
pub struct ModuleCommit {
    pub commit: Commit,
    pub tags_on_this_commit: Vec<String>,
    pub built_module: BuiltModule,
}

/// `(branch-name, module-directory, target-identity, ordered commits)`.
/// Invariant: every commit listed is reachable from the branch tip along
/// first-parent ancestry, parents precede children, no duplicates.
#[derive(Debug, Clone)]
pub struct ModuleBranch {
    pub branch_name: String,
    pub module_directory: PathBuf,
    pub target_identity: ModuleIdentity,
    pub commits_to_sync: Vec<ModuleCommit>,
}

impl ModuleBranch {
    pub fn is_empty(&self) -> bool {
        self.commits_to_sync.is_empty()
    }
}

/// `(target-identity, ordered list of (commit, tag names))`.
#[derive(Debug, Clone)]
pub struct ModuleTags {
    pub target_identity: ModuleIdentity,
    pub tagged_commits: Vec<(CommitHash, Vec<String>)>,
}

/// The sole output of the planner. The executor (out of scope for this
/// crate) walks it and calls Handler write methods.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    branches: Vec<ModuleBranch>,
    tags: Vec<ModuleTags>,
}

impl ExecutionPlan {
    pub fn new(branches: Vec<ModuleBranch>, tags: Vec<ModuleTags>) -> Self {
        Self { branches, tags }
    }

    pub fn is_empty(&self) -> bool {
        self.branches.iter().all(ModuleBranch::is_empty) && self.tags.is_empty()
    }

    pub fn branches(&self) -> &[ModuleBranch] {
        &self.branches
    }

    pub fn tags(&self) -> &[ModuleTags] {
        &self.tags
    }
}
