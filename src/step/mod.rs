//! The step lifecycle contract and the state machine that drives it.
//!
//! A step is one idempotent provisioning unit. The engine, not the step,
//! owns the lifecycle: skip probe, dependency check and install, environment
//! resolution, execute, and best-effort rollback. Steps only supply the
//! bodies; [`run_step`] sequences them and reduces whatever happens to a
//! single [`StepOutcome`].

pub mod registry;

use crate::config::{ConfigKeySpec, EnvironmentResolver, ExecutionContext};
use crate::error::{PalisadeError, Result};

/// Static facts about a step the engine needs before running it.
#[derive(Debug, Clone)]
pub struct StepDescriptor {
    /// Stable identifier: log key, vault namespace, registry name.
    pub name: &'static str,
    /// Whether `check_completed` may short-circuit the step entirely.
    pub can_skip: bool,
    /// Whether a failed execute should be followed by `rollback`.
    pub can_cleanup: bool,
    /// Configuration keys resolved into the step's [`ExecutionContext`].
    pub required_keys: Vec<ConfigKeySpec>,
}

/// Terminal state of one step within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// `check_completed` reported the work already done; execute never ran.
    Skipped,
    Succeeded,
    Failed,
    /// Execute failed and cleanup was attempted.
    RolledBack,
}

impl StepOutcome {
    /// Failure outcomes halt the pipeline.
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutcome::Failed | StepOutcome::RolledBack)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Skipped => "skipped",
            StepOutcome::Succeeded => "succeeded",
            StepOutcome::Failed => "failed",
            StepOutcome::RolledBack => "rolled back",
        }
    }
}

/// Outcome plus the failure cause, if any.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub outcome: StepOutcome,
    pub reason: Option<String>,
}

impl StepReport {
    fn ok(outcome: StepOutcome) -> Self {
        Self {
            outcome,
            reason: None,
        }
    }

    fn failed(outcome: StepOutcome, reason: impl Into<String>) -> Self {
        Self {
            outcome,
            reason: Some(reason.into()),
        }
    }
}

/// One idempotent provisioning unit.
///
/// Implementations must converge: re-invoking `execute` against a host in any
/// partial state produced by an earlier attempt reaches the same final state.
/// `check_completed` runs before environment resolution, so probes read
/// identity configuration from the startup snapshot, never from the context.
pub trait Step {
    fn descriptor(&self) -> StepDescriptor;

    /// Non-mutating probe for the step's prerequisites.
    fn check_dependencies(&self) -> bool {
        true
    }

    /// Install missing prerequisites. Must tolerate already-present ones.
    fn install_dependencies(&self) -> Result<()> {
        Ok(())
    }

    /// Full-validity probe: true only when the step's outcome is entirely in
    /// place and valid, not merely when artifacts exist.
    fn check_completed(&self) -> bool {
        false
    }

    /// Perform the step's work.
    fn execute(&self, ctx: &ExecutionContext) -> Result<()>;

    /// Undo partial work after a failed execute. Best-effort: returns whether
    /// cleanup landed, never an error.
    fn rollback(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for dyn Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.descriptor().name)
            .finish()
    }
}

/// Drive one step through its lifecycle.
///
/// Execute errors are caught here: logged with their cause, then reduced to
/// [`StepOutcome::RolledBack`] (when the step can clean up) or
/// [`StepOutcome::Failed`]. Rollback failures are logged and swallowed so the
/// original cause stays the reported one. A resolution failure fails the step
/// without rollback, since nothing has been mutated yet.
pub fn run_step(step: &dyn Step, resolver: &mut EnvironmentResolver<'_>) -> StepReport {
    let descriptor = step.descriptor();
    let name = descriptor.name;

    if descriptor.can_skip && step.check_completed() {
        tracing::info!("Step '{}' already completed, skipping", name);
        return StepReport::ok(StepOutcome::Skipped);
    }

    if !step.check_dependencies() {
        tracing::info!("Installing dependencies for step '{}'", name);
        if let Err(e) = step.install_dependencies() {
            let err = PalisadeError::DependencyUnavailable {
                step: name.to_string(),
                message: e.to_string(),
            };
            tracing::error!("{}", err);
            return StepReport::failed(StepOutcome::Failed, err.to_string());
        }
    }

    let ctx = match resolver.resolve(&descriptor.required_keys) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!("Configuration for step '{}' is incomplete: {}", name, e);
            return StepReport::failed(StepOutcome::Failed, e.to_string());
        }
    };

    match step.execute(&ctx) {
        Ok(()) => {
            tracing::info!("Step '{}' succeeded", name);
            StepReport::ok(StepOutcome::Succeeded)
        }
        Err(e) => {
            tracing::error!("Step '{}' failed: {}", name, e);
            if descriptor.can_cleanup {
                if step.rollback() {
                    tracing::info!("Rolled back partial work of step '{}'", name);
                } else {
                    tracing::warn!("Rollback of step '{}' did not fully land", name);
                }
                StepReport::failed(StepOutcome::RolledBack, e.to_string())
            } else {
                StepReport::failed(StepOutcome::Failed, e.to_string())
            }
        }
    }
}
