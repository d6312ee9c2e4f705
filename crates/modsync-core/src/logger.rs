//! Structured warning sink passed at planner construction (spec §7).
//! Grounded on the teacher's `engine::Reporter` trait: a minimal
//! level-tagged sink the caller supplies, rather than a hard dependency on
//! a specific logging backend from inside the core. `modsync-cli` is free
//! to implement this over `tracing`.

/// Receives warnings the planner chooses not to escalate to a hard
/// failure: unexpected sync points on non-protected branches, missing
/// sync-point objects on non-default branches, and per-commit read errors.
pub trait PlanLogger {
    fn warn(&mut self, message: &str);
}

/// Discards every warning. Useful for tests and for callers that only
/// care about the resulting plan.
#[derive(Debug, Default)]
pub struct NullLogger;

impl PlanLogger for NullLogger {
    fn warn(&mut self, _message: &str) {}
}

/// Collects warnings in order, for tests that want to assert on them.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    pub warnings: Vec<String>,
}

impl PlanLogger for RecordingLogger {
    fn warn(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }
}
