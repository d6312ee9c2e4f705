//! Error kinds the core produces (spec §7).
//!
//! The teacher (`shipper`) declares `thiserror` as a dependency but never
//! exercises it, leaning on `anyhow` everywhere instead. This crate is
//! where that latent dependency earns its keep: domain error kinds are
//! modeled as tagged `thiserror` enums so callers can match on them, while
//! collaborator-facing boundaries (`Repository`, `Handler`) still speak
//! `anyhow::Result`, exactly like `engine.rs` does for git/registry calls.

use std::path::PathBuf;

use crate::types::ModuleIdentity;

/// Top-level error from `Plan()`. A partial plan is never returned
/// alongside one of these.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "module identity {identity} is claimed by more than one directory on branch {branch:?}: {directories:?}"
    )]
    DuplicateIdentity {
        identity: ModuleIdentity,
        branch: String,
        directories: Vec<PathBuf>,
    },

    #[error("repository state error: {0}")]
    RepositoryState(String),

    #[error("history on protected branch {branch:?} has diverged")]
    ResumptionDivergence {
        identity: ModuleIdentity,
        branch: String,
    },

    #[error("handler error during {op} ({identity:?} / {branch:?}): {source}")]
    Handler {
        op: &'static str,
        identity: Option<ModuleIdentity>,
        branch: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn handler(
        op: &'static str,
        identity: Option<ModuleIdentity>,
        branch: Option<String>,
        source: anyhow::Error,
    ) -> Self {
        Self::Handler { op, identity, branch, source }
    }
}

/// The kind of failure the Module Reader (C1) can hit while reading a
/// module at a given commit/directory. Never fatal on its own; the caller
/// (Branch Planner) decides per §4.4 whether to skip, stop, or rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadModuleErrorKind {
    /// No manifest at the directory.
    ModuleNotFound,
    /// Manifest parse failure.
    InvalidModuleConfig,
    /// Manifest parses but the subtree doesn't build into a coherent module.
    BuildFailed,
    /// The manifest exists and builds, but names nothing.
    UnnamedModule,
    /// The caller supplied an expected identity that differs from the
    /// parsed one.
    UnexpectedIdentity,
}

impl std::fmt::Display for ReadModuleErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ModuleNotFound => "module not found",
            Self::InvalidModuleConfig => "invalid module config",
            Self::BuildFailed => "module build failed",
            Self::UnnamedModule => "module is unnamed",
            Self::UnexpectedIdentity => "unexpected module identity",
        };
        f.write_str(s)
    }
}

/// Tagged variant for module read failure: kind plus the contextual
/// triple `(branch, commit-hex, module-directory)` from spec §3.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} reading module at {directory:?} ({branch}@{commit_hex})")]
pub struct ReadModuleError {
    pub kind: ReadModuleErrorKind,
    pub branch: String,
    pub commit_hex: String,
    pub directory: PathBuf,
}

impl ReadModuleError {
    pub fn new(
        kind: ReadModuleErrorKind,
        branch: impl Into<String>,
        commit_hex: impl Into<String>,
        directory: PathBuf,
    ) -> Self {
        Self {
            kind,
            branch: branch.into(),
            commit_hex: commit_hex.into(),
            directory,
        }
    }
}

/// How a `ReadModuleError` should be handled by a walk. Centralized per
/// Design Note 9 so the policy is testable without involving Git.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadErrorPolicy {
    /// Abort planning entirely.
    Fail,
    /// Skip this commit and continue the walk.
    Skip,
    /// Stop the walk at this commit (it is not a candidate, but older
    /// commits should not be considered either).
    Stop,
    /// Rebuild the module, attaching a caller-supplied identity override.
    Override,
}

/// Default policy used by the Branch Planner when reconciling a built
/// module against its read error, if any (spec §4.4). `ModuleNotFound`,
/// `InvalidModuleConfig`, and `BuildFailed` are unrecoverable for this
/// commit and are always a `Skip`. `UnnamedModule` and `UnexpectedIdentity`
/// are recoverable: the module built, it just didn't land on the wanted
/// identity, so the caller may `Override` it when an identity override was
/// configured for this directory. Neither `Fail` nor `Stop` is reachable
/// here — this planner never aborts or truncates a walk on a read error —
/// but the caller still matches on them exhaustively, the way a policy
/// consumer should.
pub fn default_policy(kind: ReadModuleErrorKind) -> ReadErrorPolicy {
    match kind {
        ReadModuleErrorKind::UnnamedModule | ReadModuleErrorKind::UnexpectedIdentity => {
            ReadErrorPolicy::Override
        }
        ReadModuleErrorKind::ModuleNotFound
        | ReadModuleErrorKind::InvalidModuleConfig
        | ReadModuleErrorKind::BuildFailed => ReadErrorPolicy::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_skips_unrecoverable_kinds() {
        for kind in [
            ReadModuleErrorKind::ModuleNotFound,
            ReadModuleErrorKind::InvalidModuleConfig,
            ReadModuleErrorKind::BuildFailed,
        ] {
            assert_eq!(default_policy(kind), ReadErrorPolicy::Skip);
        }
    }

    #[test]
    fn default_policy_overrides_identity_mismatches() {
        for kind in [ReadModuleErrorKind::UnnamedModule, ReadModuleErrorKind::UnexpectedIdentity] {
            assert_eq!(default_policy(kind), ReadErrorPolicy::Override);
        }
    }

    #[test]
    fn read_module_error_display_includes_context() {
        let err = ReadModuleError::new(
            ReadModuleErrorKind::ModuleNotFound,
            "main",
            "abc123",
            PathBuf::from("proto/acme"),
        );
        let msg = err.to_string();
        assert!(msg.contains("main"));
        assert!(msg.contains("abc123"));
        assert!(msg.contains("proto/acme"));
    }
}
