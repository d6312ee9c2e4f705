mod config;
mod ledger;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use modsync_core::config::SyncConfig;
use modsync_core::handler::CancellationToken;
use modsync_core::logger::PlanLogger;
use modsync_core::planner::plan;
use modsync_core::types::{ExecutionPlan, ModuleIdentity};
use modsync_git::GitRepository;

use config::FileConfig;
use ledger::LedgerHandler;

#[derive(Parser, Debug)]
#[command(name = "modsync", version)]
#[command(about = "One-way Git-to-registry module synchronizer")]
struct Cli {
    /// Path to the Git repository to scan.
    #[arg(long, default_value = ".")]
    repo: PathBuf,

    /// Path to `.modsync.toml` (default: `<repo>/.modsync.toml`, if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the local ledger (stand-in for the registry).
    #[arg(long, default_value = ".modsync")]
    state_dir: PathBuf,

    /// Additional module directory to sync, as `path` or `path:identity`.
    /// Repeatable; added to whatever `.modsync.toml` already lists.
    #[arg(long = "module")]
    modules: Vec<String>,

    /// Sync every local branch instead of only the default branch.
    #[arg(long)]
    sync_all_branches: bool,

    /// Git remote whose `HEAD` symbolic ref picks the default branch.
    #[arg(long)]
    git_remote: Option<String>,

    /// Fail instead of warning when a stored sync point is not a known
    /// local commit (spec's `invalid_sync_point` hook).
    #[arg(long)]
    abort_on_invalid_sync_point: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the execution plan without publishing anything.
    Plan,
    /// Compute the plan and execute it against the local ledger.
    Sync,
    /// Print repository and tooling diagnostics.
    Doctor,
}

struct TracingLogger;

impl PlanLogger for TracingLogger {
    fn warn(&mut self, message: &str) {
        tracing::warn!("{message}");
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let repo = GitRepository::open(&cli.repo, cli.git_remote.clone())
        .with_context(|| format!("failed to open repository at {}", cli.repo.display()))?;

    let config_path = cli.config.clone().unwrap_or_else(|| cli.repo.join(".modsync.toml"));
    let file_config = if config_path.exists() {
        Some(FileConfig::load_from_file(&config_path)?)
    } else {
        None
    };

    let (sync_config, release_branches) = build_sync_config(&cli, file_config.as_ref())?;

    match cli.cmd {
        Commands::Plan => {
            let default_branch = repo.default_branch()?;
            let handler = LedgerHandler::open(
                &cli.state_dir,
                default_branch,
                release_branches,
                cli.abort_on_invalid_sync_point,
            )?;
            let cancel = CancellationToken::new();
            let mut logger = TracingLogger;
            let execution_plan = plan(&repo, &handler, &sync_config, &mut logger, &cancel)?;
            print_plan(&execution_plan);
        }
        Commands::Sync => {
            let default_branch = repo.default_branch()?;
            let handler = LedgerHandler::open(
                &cli.state_dir,
                default_branch,
                release_branches,
                cli.abort_on_invalid_sync_point,
            )?;
            let cancel = CancellationToken::new();
            let mut logger = TracingLogger;
            let execution_plan = plan(&repo, &handler, &sync_config, &mut logger, &cancel)?;
            print_plan(&execution_plan);
            execute(&handler, &execution_plan, &cancel)?;
            handler.persist()?;
            println!();
            println!("ledger: {}", cli.state_dir.join("ledger.json").display());
        }
        Commands::Doctor => {
            run_doctor(&cli, &repo)?;
        }
    }

    Ok(())
}

/// Merges `.modsync.toml` module entries with `--module` flags (CLI wins
/// on a path collision), and collects `release_branch` entries that also
/// name an explicit identity into the map `LedgerHandler` needs.
fn build_sync_config(
    cli: &Cli,
    file_config: Option<&FileConfig>,
) -> Result<(SyncConfig, HashMap<ModuleIdentity, String>)> {
    let mut entries: Vec<config::ModuleEntry> = file_config.map(|c| c.module.clone()).unwrap_or_default();

    for raw in &cli.modules {
        let (path, identity) = match raw.split_once(':') {
            Some((p, id)) => (PathBuf::from(p), Some(id.to_string())),
            None => (PathBuf::from(raw), None),
        };
        if let Some(existing) = entries.iter_mut().find(|e| e.path == path) {
            if identity.is_some() {
                existing.identity = identity;
            }
        } else {
            entries.push(config::ModuleEntry { path, identity, release_branch: None });
        }
    }

    let mut builder = SyncConfig::builder()
        .sync_all_branches(cli.sync_all_branches || file_config.is_some_and(|c| c.sync_all_branches))
        .git_remote_name(
            cli.git_remote
                .clone()
                .or_else(|| file_config.and_then(|c| c.git_remote_name.clone())),
        );

    let mut release_branches = HashMap::new();

    for entry in entries {
        let identity = entry
            .identity
            .as_deref()
            .map(ModuleIdentity::parse)
            .transpose()
            .with_context(|| format!("invalid identity override for {}", entry.path.display()))?;

        if let (Some(identity), Some(release_branch)) = (&identity, &entry.release_branch) {
            release_branches.insert(identity.clone(), release_branch.clone());
        } else if entry.release_branch.is_some() {
            tracing::warn!(
                "ignoring release_branch for {} — an identity override is required to register it",
                entry.path.display()
            );
        }

        builder = builder
            .add_module_dir(entry.path.clone(), identity)
            .with_context(|| format!("duplicate module directory {}", entry.path.display()))?;
    }

    Ok((builder.build(), release_branches))
}

fn execute(handler: &LedgerHandler, execution_plan: &ExecutionPlan, cancel: &CancellationToken) -> Result<()> {
    for branch in execution_plan.branches() {
        if branch.is_empty() {
            continue;
        }
        handler.sync_module_branch(cancel, branch)?;
    }
    for tags in execution_plan.tags() {
        handler.sync_module_tags(cancel, tags)?;
    }
    Ok(())
}

fn print_plan(execution_plan: &ExecutionPlan) {
    if execution_plan.is_empty() {
        println!("nothing to sync");
        return;
    }

    for branch in execution_plan.branches() {
        if branch.is_empty() {
            continue;
        }
        println!("{} @ {}", branch.target_identity, branch.branch_name);
        for module_commit in &branch.commits_to_sync {
            let tags = if module_commit.tags_on_this_commit.is_empty() {
                String::new()
            } else {
                format!(" ({})", module_commit.tags_on_this_commit.join(", "))
            };
            println!(
                "  {} {}{}",
                &module_commit.commit.hash.as_hex()[..module_commit.commit.hash.as_hex().len().min(12)],
                module_commit.commit.message.lines().next().unwrap_or_default(),
                tags
            );
        }
    }

    for tags in execution_plan.tags() {
        if tags.tagged_commits.is_empty() {
            continue;
        }
        println!("{} tags:", tags.target_identity);
        for (hash, names) in &tags.tagged_commits {
            println!("  {} -> {}", names.join(", "), hash);
        }
    }
}

fn run_doctor(cli: &Cli, repo: &GitRepository) -> Result<()> {
    println!("repo: {}", cli.repo.display());
    println!("current_branch: {}", repo.current_branch()?);
    println!("default_branch: {}", repo.default_branch()?);
    println!("state_dir: {}", cli.state_dir.display());
    println!();
    print_cmd_version("git");
    Ok(())
}

fn print_cmd_version(cmd: &str) {
    match Command::new(cmd).arg("--version").output() {
        Ok(out) if out.status.success() => {
            println!("{cmd}: {}", String::from_utf8_lossy(&out.stdout).trim());
        }
        Ok(out) => {
            tracing::warn!("{cmd} --version failed: {}", String::from_utf8_lossy(&out.stderr).trim());
        }
        Err(e) => {
            tracing::warn!("unable to run {cmd} --version: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_cli() -> Cli {
        Cli {
            repo: PathBuf::from("."),
            config: None,
            state_dir: PathBuf::from(".modsync"),
            modules: Vec::new(),
            sync_all_branches: false,
            git_remote: None,
            abort_on_invalid_sync_point: false,
            cmd: Commands::Plan,
        }
    }

    #[test]
    fn cli_module_flag_without_identity_adds_a_bare_directory() {
        let mut cli = base_cli();
        cli.modules.push("proto/acme".to_string());
        let (config, release_branches) = build_sync_config(&cli, None).unwrap();
        assert_eq!(config.module_dirs(), &[PathBuf::from("proto/acme")]);
        assert!(release_branches.is_empty());
    }

    #[test]
    fn cli_module_flag_overrides_file_identity_for_same_path() {
        let mut cli = base_cli();
        cli.modules.push("proto/acme:buf.build/acme/bar".to_string());
        let file_config = FileConfig {
            sync_all_branches: false,
            git_remote_name: None,
            module: vec![config::ModuleEntry {
                path: PathBuf::from("proto/acme"),
                identity: Some("buf.build/acme/foo".to_string()),
                release_branch: None,
            }],
        };
        let (config, _) = build_sync_config(&cli, Some(&file_config)).unwrap();
        assert_eq!(
            config.override_for(std::path::Path::new("proto/acme")),
            Some(&ModuleIdentity::parse("buf.build/acme/bar").unwrap())
        );
    }

    #[test]
    fn release_branch_requires_identity_override() {
        let cli = base_cli();
        let file_config = FileConfig {
            sync_all_branches: false,
            git_remote_name: None,
            module: vec![config::ModuleEntry {
                path: PathBuf::from("proto/acme"),
                identity: None,
                release_branch: Some("release".to_string()),
            }],
        };
        let (_, release_branches) = build_sync_config(&cli, Some(&file_config)).unwrap();
        assert!(release_branches.is_empty());
    }

    #[test]
    fn duplicate_module_directories_from_file_and_flags_are_merged_not_rejected() {
        let mut cli = base_cli();
        cli.modules.push("proto/acme".to_string());
        let file_config = FileConfig {
            sync_all_branches: false,
            git_remote_name: None,
            module: vec![config::ModuleEntry {
                path: PathBuf::from("proto/acme"),
                identity: Some("buf.build/acme/foo".to_string()),
                release_branch: None,
            }],
        };
        let (config, _) = build_sync_config(&cli, Some(&file_config)).unwrap();
        assert_eq!(config.module_dirs().len(), 1);
    }
}
