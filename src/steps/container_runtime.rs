//! Container runtime readiness: daemon reachable, network and volumes ensured.

use crate::config::{ConfigKeySpec, ExecutionContext, StoredConfig};
use crate::error::{PalisadeError, Result};
use crate::step::{Step, StepDescriptor};
use crate::steps::StepContext;
use crate::system::{ContainerRuntime, NetworkSpec, PackageManager, VolumeSpec};
use std::sync::Arc;

pub const DEFAULT_NETWORK: &str = "idserver-net";
pub const DEFAULT_DB_VOLUME: &str = "idserver-db-data";

const NETWORK: ConfigKeySpec =
    ConfigKeySpec::with_default("CONTAINER_NETWORK", "Container network name", DEFAULT_NETWORK);
const DB_VOLUME: ConfigKeySpec =
    ConfigKeySpec::with_default("DB_VOLUME", "Database data volume name", DEFAULT_DB_VOLUME);

/// Ensures the container runtime is usable and its shared resources exist.
pub struct ContainerRuntimeStep {
    packages: Arc<dyn PackageManager>,
    containers: Arc<dyn ContainerRuntime>,
    stored: StoredConfig,
}

impl ContainerRuntimeStep {
    pub const NAME: &'static str = "container_runtime";

    pub fn new(ctx: &StepContext) -> Self {
        Self {
            packages: ctx.packages.clone(),
            containers: ctx.containers.clone(),
            stored: ctx.stored.clone(),
        }
    }
}

impl Step for ContainerRuntimeStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            name: Self::NAME,
            can_skip: true,
            can_cleanup: true,
            required_keys: vec![NETWORK, DB_VOLUME],
        }
    }

    fn check_dependencies(&self) -> bool {
        // docker may have been installed from upstream packages instead.
        self.packages.is_installed("docker.io") || crate::shell::command_exists("docker")
    }

    fn install_dependencies(&self) -> Result<()> {
        self.packages.install(&["docker.io"])
    }

    fn check_completed(&self) -> bool {
        let network = self.stored.get_or("CONTAINER_NETWORK", DEFAULT_NETWORK);
        self.containers.ping() && self.containers.network_exists(network)
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        if !self.containers.ping() {
            return Err(PalisadeError::DependencyUnavailable {
                step: Self::NAME.to_string(),
                message: "container runtime daemon is not reachable".to_string(),
            });
        }

        // ensure_* converge, so re-running after a partial attempt is safe.
        self.containers.ensure_network(&NetworkSpec {
            name: ctx.require("CONTAINER_NETWORK")?.to_string(),
        })?;
        self.containers.ensure_volume(&VolumeSpec {
            name: ctx.require("DB_VOLUME")?.to_string(),
        })?;
        Ok(())
    }

    fn rollback(&self) -> bool {
        let network = self.stored.get_or("CONTAINER_NETWORK", DEFAULT_NETWORK);
        if !self.containers.network_exists(network) {
            return true;
        }
        // Volumes are left alone: they may hold data from an earlier run.
        match self.containers.remove_network(network) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not remove network '{}': {}", network, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepOutcome;
    use crate::steps::tests_support::{context_with, run_in, TestContext};
    use crate::system::{MockContainerRuntime, MockPackageManager};

    fn ready_context(runtime: Arc<MockContainerRuntime>) -> TestContext {
        context_with(|c| {
            c.packages = Arc::new(MockPackageManager::with_installed(&["docker.io"]));
            c.containers = runtime;
        })
    }

    #[test]
    fn creates_network_and_volume() {
        let runtime = Arc::new(MockContainerRuntime::new());
        let step = ContainerRuntimeStep::new(&ready_context(runtime.clone()));

        let report = run_in(&step);
        assert_eq!(report.outcome, StepOutcome::Succeeded);
        assert_eq!(runtime.networks(), vec![DEFAULT_NETWORK.to_string()]);
        assert_eq!(runtime.volumes(), vec![DEFAULT_DB_VOLUME.to_string()]);
    }

    #[test]
    fn unreachable_daemon_fails_and_rolls_back() {
        let runtime = Arc::new(MockContainerRuntime::unreachable());
        let step = ContainerRuntimeStep::new(&ready_context(runtime));

        let report = run_in(&step);
        assert_eq!(report.outcome, StepOutcome::RolledBack);
        assert!(report.reason.unwrap().contains("not reachable"));
    }

    #[test]
    fn rollback_removes_the_network() {
        let runtime = Arc::new(MockContainerRuntime::new());
        let step = ContainerRuntimeStep::new(&ready_context(runtime.clone()));

        assert_eq!(run_in(&step).outcome, StepOutcome::Succeeded);
        assert!(step.rollback());
        assert!(runtime.networks().is_empty());
        // Data volume survives rollback.
        assert_eq!(runtime.volumes(), vec![DEFAULT_DB_VOLUME.to_string()]);
    }
}
