//! Sequential step orchestration.
//!
//! Insertion order is the dependency contract. There is no DAG: the pipeline
//! is short, its ordering is total, and a linear list keeps failure reporting
//! trivial to read. Execution is single-threaded; the running step owns the
//! host exclusively for the duration of its execute call.

pub mod summary;

use crate::config::EnvironmentResolver;
use crate::error::Result;
use crate::step::{run_step, Step, StepOutcome};
use std::time::{Duration, Instant};

/// What happened to one step during a run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub step_name: String,
    pub outcome: StepOutcome,
    pub reason: Option<String>,
}

/// Ordered account of one run. Created fresh per run, never persisted;
/// cross-run state lives only in what `check_completed` probes can see.
#[derive(Debug)]
pub struct RunResult {
    pub records: Vec<RunRecord>,
    pub success: bool,
    pub duration: Duration,
}

impl RunResult {
    /// Outcome of a step by name, if it was reached.
    pub fn outcome_of(&self, step_name: &str) -> Option<StepOutcome> {
        self.records
            .iter()
            .find(|r| r.step_name == step_name)
            .map(|r| r.outcome)
    }
}

type Finalizer = Box<dyn Fn(&RunResult) -> Result<()>>;

/// Runs steps in insertion order, halting on the first failure.
pub struct StepOrchestrator {
    steps: Vec<Box<dyn Step>>,
    finalizer: Option<Finalizer>,
}

impl StepOrchestrator {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            finalizer: None,
        }
    }

    /// Append a step. The caller is responsible for ordering.
    pub fn add_step(&mut self, step: Box<dyn Step>) {
        self.steps.push(step);
    }

    /// Run after a fully successful pipeline. Best-effort: a finalizer error
    /// is logged and never flips the run's success.
    pub fn with_finalizer(mut self, finalizer: Finalizer) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    /// Run every step in order.
    ///
    /// The first `Failed` or `RolledBack` outcome halts the run; later steps
    /// are never attempted. Skipped steps do not affect success.
    pub fn execute(&self, resolver: &mut EnvironmentResolver<'_>) -> RunResult {
        let start = Instant::now();
        let mut records = Vec::with_capacity(self.steps.len());
        let mut success = true;

        for step in &self.steps {
            let name = step.descriptor().name;
            tracing::info!("Running step '{}'", name);
            let report = run_step(step.as_ref(), resolver);
            let halt = report.outcome.is_failure();
            records.push(RunRecord {
                step_name: name.to_string(),
                outcome: report.outcome,
                reason: report.reason,
            });
            if halt {
                tracing::error!("Halting after step '{}' {}", name, report.outcome.label());
                success = false;
                break;
            }
        }

        let result = RunResult {
            records,
            success,
            duration: start.elapsed(),
        };

        if result.success {
            if let Some(finalizer) = &self.finalizer {
                if let Err(e) = finalizer(&result) {
                    tracing::warn!("Post-run finalization failed: {}", e);
                }
            }
        }

        result
    }
}

impl Default for StepOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}
