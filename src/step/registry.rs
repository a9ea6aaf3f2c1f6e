//! Name-to-step registry.
//!
//! The set of known steps is fixed at compile time. Pipeline construction is
//! all-or-nothing: a single unknown name aborts the whole build instead of
//! silently shrinking the pipeline.

use crate::error::{PalisadeError, Result};
use crate::step::Step;
use crate::steps::{
    CertificateStep, ContainerRuntimeStep, DatabaseBackupStep, FirewallStep, IdentityServerStep,
    MonitoringStep, StepContext, SystemPrepareStep,
};

/// The full pipeline in dependency order.
pub const DEFAULT_PIPELINE: &[&str] = &[
    SystemPrepareStep::NAME,
    FirewallStep::NAME,
    ContainerRuntimeStep::NAME,
    CertificateStep::NAME,
    IdentityServerStep::NAME,
    MonitoringStep::NAME,
    DatabaseBackupStep::NAME,
];

/// Construct one step by name.
pub fn construct(name: &str, ctx: &StepContext) -> Option<Box<dyn Step>> {
    match name {
        SystemPrepareStep::NAME => Some(Box::new(SystemPrepareStep::new(ctx))),
        FirewallStep::NAME => Some(Box::new(FirewallStep::new(ctx))),
        ContainerRuntimeStep::NAME => Some(Box::new(ContainerRuntimeStep::new(ctx))),
        CertificateStep::NAME => Some(Box::new(CertificateStep::new(ctx))),
        IdentityServerStep::NAME => Some(Box::new(IdentityServerStep::new(ctx))),
        MonitoringStep::NAME => Some(Box::new(MonitoringStep::new(ctx))),
        DatabaseBackupStep::NAME => Some(Box::new(DatabaseBackupStep::new(ctx))),
        _ => None,
    }
}

/// Build a pipeline from step names, in the given order.
pub fn build_pipeline(names: &[&str], ctx: &StepContext) -> Result<Vec<Box<dyn Step>>> {
    names
        .iter()
        .map(|name| {
            construct(name, ctx).ok_or_else(|| PalisadeError::UnknownStep {
                name: name.to_string(),
            })
        })
        .collect()
}
