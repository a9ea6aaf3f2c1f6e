//! Base package installation.

use crate::config::ExecutionContext;
use crate::error::Result;
use crate::step::{Step, StepDescriptor};
use crate::steps::StepContext;
use crate::system::PackageManager;
use std::sync::Arc;

/// Packages everything downstream assumes.
const BASE_PACKAGES: &[&str] = &["ca-certificates", "curl", "gnupg"];

/// Installs the base packages the rest of the pipeline relies on.
pub struct SystemPrepareStep {
    packages: Arc<dyn PackageManager>,
}

impl SystemPrepareStep {
    pub const NAME: &'static str = "system_prepare";

    pub fn new(ctx: &StepContext) -> Self {
        Self {
            packages: ctx.packages.clone(),
        }
    }

    fn missing(&self) -> Vec<&'static str> {
        BASE_PACKAGES
            .iter()
            .copied()
            .filter(|pkg| !self.packages.is_installed(pkg))
            .collect()
    }
}

impl Step for SystemPrepareStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            name: Self::NAME,
            can_skip: true,
            // Removing base packages would break more than it cleans up.
            can_cleanup: false,
            required_keys: Vec::new(),
        }
    }

    fn check_completed(&self) -> bool {
        self.missing().is_empty()
    }

    fn execute(&self, _ctx: &ExecutionContext) -> Result<()> {
        let missing = self.missing();
        if missing.is_empty() {
            return Ok(());
        }
        tracing::info!("Installing base packages: {}", missing.join(", "));
        self.packages.install(&missing)
    }
}
