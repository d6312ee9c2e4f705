//! Planning core for a one-way Git-to-registry module synchronizer.
//!
//! This crate computes *what* should be published where; it never touches
//! a network or the filesystem itself. Callers provide a [`repository::Repository`]
//! (Git history) and a [`handler::Handler`] (remote registry state), and
//! receive back a [`types::ExecutionPlan`] for an executor to carry out.
//!
//! Pipeline: [`scanner`] enumerates branches and tags, [`resolver`] decides
//! what identity each module directory targets on each branch,
//! [`branch_planner`] works out the resumption point and commit list per
//! branch, and [`tag_planner`] prunes and assembles the final plan.
//! [`planner::plan`] wires all four together.

pub mod branch_planner;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod logger;
pub mod planner;
pub mod reader;
pub mod repository;
pub mod resolver;
pub mod scanner;
pub mod tag_planner;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::SyncConfig;
pub use error::SyncError;
pub use handler::{CancellationToken, Handler, RemoteCommit};
pub use logger::PlanLogger;
pub use planner::plan;
pub use repository::Repository;
pub use types::ExecutionPlan;
