//! C1 — Module Reader. A pure function of `(tree, directory,
//! expected-identity?)`: never touches the remote, never mutates
//! anything. Consumed by C3 (HEAD identities) and C4 (historical reads
//! and content-match digests).

use std::path::PathBuf;

use crate::error::{ReadModuleError, ReadModuleErrorKind};
use crate::repository::Tree;
use crate::types::{BuiltModule, ModuleIdentity};

const MANIFEST_FILE: &str = "module.toml";

/// Reads the manifest at `directory` within `tree` and builds a module.
///
/// Returns `(Some(module), None)` on success (possibly with a null
/// identity, handled below), or `(built, Some(error))` for every failure
/// mode in spec §4.1. A `BuiltModule` is returned alongside
/// `UnnamedModule`/`UnexpectedIdentity` because those are "successful
/// builds that didn't land on the identity the caller wanted" rather than
/// "nothing built at all".
pub fn read_module(
    tree: &dyn Tree,
    directory: &PathBuf,
    branch: &str,
    commit_hex: &str,
    expected_identity: Option<&ModuleIdentity>,
) -> (Option<BuiltModule>, Option<ReadModuleError>) {
    let dir_str = directory.to_string_lossy();

    let Some(files) = tree.files_under(&dir_str) else {
        return (
            None,
            Some(ReadModuleError::new(
                ReadModuleErrorKind::ModuleNotFound,
                branch,
                commit_hex,
                directory.clone(),
            )),
        );
    };

    let Some(manifest_bytes) = tree.read(&dir_str, MANIFEST_FILE) else {
        return (
            None,
            Some(ReadModuleError::new(
                ReadModuleErrorKind::ModuleNotFound,
                branch,
                commit_hex,
                directory.clone(),
            )),
        );
    };

    let manifest: Manifest = match std::str::from_utf8(&manifest_bytes)
        .map_err(|_| ())
        .and_then(|text| toml::from_str(text).map_err(|_| ()))
    {
        Ok(m) => m,
        Err(()) => {
            return (
                None,
                Some(ReadModuleError::new(
                    ReadModuleErrorKind::InvalidModuleConfig,
                    branch,
                    commit_hex,
                    directory.clone(),
                )),
            );
        }
    };

    let has_content = files
        .iter()
        .any(|f| f.path != MANIFEST_FILE && !f.path.is_empty());
    if !has_content {
        return (
            None,
            Some(ReadModuleError::new(
                ReadModuleErrorKind::BuildFailed,
                branch,
                commit_hex,
                directory.clone(),
            )),
        );
    }

    let identity = manifest.name.map(|n| {
        n.parse::<ModuleIdentity>()
            .map_err(|_| ())
    });

    let identity = match identity {
        Some(Ok(id)) => Some(id),
        Some(Err(())) => {
            return (
                None,
                Some(ReadModuleError::new(
                    ReadModuleErrorKind::InvalidModuleConfig,
                    branch,
                    commit_hex,
                    directory.clone(),
                )),
            );
        }
        None => None,
    };

    let built = BuiltModule::new(directory.clone(), identity.clone(), files);

    match (&identity, expected_identity) {
        (None, _) => (
            Some(built),
            Some(ReadModuleError::new(
                ReadModuleErrorKind::UnnamedModule,
                branch,
                commit_hex,
                directory.clone(),
            )),
        ),
        (Some(got), Some(expected)) if got != expected => (
            Some(built),
            Some(ReadModuleError::new(
                ReadModuleErrorKind::UnexpectedIdentity,
                branch,
                commit_hex,
                directory.clone(),
            )),
        ),
        _ => (Some(built), None),
    }
}

/// The one field this layer needs out of `module.toml`. `modsync-git`'s own
/// richer handling of the same file (if any) parses it separately; this
/// struct only exists to give `toml::from_str` a target.
#[derive(serde::Deserialize)]
struct Manifest {
    name: Option<String>,
}
