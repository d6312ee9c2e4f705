//! Top-level entry point: `Planner::plan()` orchestrates C2 through C5 and
//! produces the final `ExecutionPlan`, or the first non-recoverable error.

use std::path::Path;

use crate::branch_planner::plan_branch;
use crate::cache::CachingHandler;
use crate::config::SyncConfig;
use crate::error::{ReadModuleErrorKind, SyncError};
use crate::handler::{CancellationToken, Handler};
use crate::logger::PlanLogger;
use crate::reader::read_module;
use crate::repository::Repository;
use crate::resolver::{resolve_sync_point, resolve_targets};
use crate::scanner::scan_repository;
use crate::tag_planner::plan_tags_and_assemble;
use crate::types::ExecutionPlan;

/// Plans a sync run: reads `repo` and `handler` under `config`, reporting
/// warnings through `logger`, and returns the resulting `ExecutionPlan`.
///
/// A partial plan is never returned alongside an error — on any
/// non-recoverable failure this returns `Err` and nothing else.
pub fn plan(
    repo: &dyn Repository,
    handler: &dyn Handler,
    config: &SyncConfig,
    logger: &mut dyn PlanLogger,
    cancel: &CancellationToken,
) -> Result<ExecutionPlan, SyncError> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }

    let cached_handler = CachingHandler::new(handler);

    let scan = scan_repository(repo, config.sync_all_branches)?;

    let targets = resolve_targets(repo, &scan.branches, config.module_dirs(), |dir| {
        config.override_for(dir)
    })?;

    let module_dir_order: Vec<std::path::PathBuf> = config.module_dirs().to_vec();
    let order_of = move |dir: &Path| -> usize {
        module_dir_order
            .iter()
            .position(|d| d == dir)
            .unwrap_or(usize::MAX)
    };

    let mut branches = Vec::with_capacity(targets.len());
    for target in &targets {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let is_default_branch = target.branch == scan.default_branch;
        let sync_point = resolve_sync_point(repo, &cached_handler, cancel, target, is_default_branch)?;

        let has_override = config.override_for(&target.module_directory).is_some();
        let branch = plan_branch(
            repo,
            &cached_handler,
            cancel,
            target,
            sync_point,
            has_override,
            &scan.tags_by_commit,
        )?;

        log_read_errors(repo, logger, target, &branch.branch_name);
        branches.push(branch);
    }

    plan_tags_and_assemble(&cached_handler, cancel, &scan.tags_by_commit, branches, order_of)
}

/// Re-reads the branch's tip module to surface any non-fatal read error as
/// a warning. The Branch Planner itself only needs the success/failure
/// signal, not the message, so this is kept separate rather than
/// threading a logger through every read in the hot path.
fn log_read_errors(
    repo: &dyn Repository,
    logger: &mut dyn PlanLogger,
    target: &crate::resolver::ResolvedTarget,
    branch_name: &str,
) {
    let Ok(tree) = repo.tree_at(&target.head) else {
        return;
    };
    let (_, err) = read_module(
        tree.as_ref(),
        &target.module_directory,
        branch_name,
        target.head.as_hex(),
        Some(&target.identity),
    );
    if let Some(err) = err {
        if err.kind != ReadModuleErrorKind::UnexpectedIdentity {
            logger.warn(&err.to_string());
        }
    }
}
