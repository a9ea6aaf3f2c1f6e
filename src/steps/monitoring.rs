//! Prometheus and Grafana container deployment.
//!
//! The scrape configuration is rendered through the ConfigLoader and written
//! under the monitoring config directory; the previous config is snapshotted
//! into the vault first, so a failed deployment can put it back during
//! rollback.

use crate::config::{ConfigKeySpec, ExecutionContext, StoredConfig};
use crate::error::{PalisadeError, Result};
use crate::shell;
use crate::step::{Step, StepDescriptor};
use crate::steps::container_runtime::DEFAULT_NETWORK;
use crate::steps::StepContext;
use crate::system::{
    ConfigLoader, ContainerHandle, ContainerRuntime, ContainerSpec, HealthStatus, VolumeSpec,
};
use crate::validation::ValidationResult;
use crate::vault::BackupVault;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const PROMETHEUS_CONTAINER: &str = "idserver-prometheus";
pub const GRAFANA_CONTAINER: &str = "idserver-grafana";
pub const PROMETHEUS_CONFIG: &str = "prometheus.yml";
const PROMETHEUS_VOLUME: &str = "idserver-prometheus-data";
const GRAFANA_VOLUME: &str = "idserver-grafana-data";
const DEFAULT_CONFIG_DIR: &str = "/etc/palisade/monitoring";

const PROMETHEUS_IMAGE: ConfigKeySpec = ConfigKeySpec::with_default(
    "PROMETHEUS_IMAGE",
    "Prometheus container image",
    "prom/prometheus:v2.53.0",
);
const GRAFANA_IMAGE: ConfigKeySpec = ConfigKeySpec::with_default(
    "GRAFANA_IMAGE",
    "Grafana container image",
    "grafana/grafana:11.1.0",
);
const NETWORK: ConfigKeySpec =
    ConfigKeySpec::with_default("CONTAINER_NETWORK", "Container network name", DEFAULT_NETWORK);
const SCRAPE_INTERVAL: ConfigKeySpec = ConfigKeySpec::with_default(
    "PROMETHEUS_SCRAPE_INTERVAL",
    "Prometheus scrape interval",
    "15s",
);
const RETENTION_TIME: ConfigKeySpec = ConfigKeySpec::with_default(
    "PROMETHEUS_RETENTION_TIME",
    "Prometheus data retention time",
    "15d",
);
const GRAFANA_ADMIN_USER: ConfigKeySpec =
    ConfigKeySpec::with_default("GRAFANA_ADMIN_USER", "Grafana admin username", "admin");
const GRAFANA_ADMIN_PASSWORD: ConfigKeySpec =
    ConfigKeySpec::secret("GRAFANA_ADMIN_PASSWORD", "Grafana admin password");
const CONFIG_DIR: ConfigKeySpec = ConfigKeySpec::with_default(
    "MONITORING_CONFIG_DIR",
    "Directory holding the rendered monitoring configuration",
    DEFAULT_CONFIG_DIR,
);
const MONITORING_TEMPLATE: ConfigKeySpec = ConfigKeySpec::with_default(
    "MONITORING_TEMPLATE",
    "Scrape configuration template for Prometheus",
    "prometheus.yml",
);
const HEALTH_TIMEOUT: ConfigKeySpec = ConfigKeySpec::with_default(
    "HEALTH_TIMEOUT_SECS",
    "Seconds to wait for containers to become healthy",
    "180",
);

/// Runs the Prometheus and Grafana containers against a rendered scrape config.
pub struct MonitoringStep {
    containers: Arc<dyn ContainerRuntime>,
    loader: Arc<dyn ConfigLoader>,
    vault: BackupVault,
    stored: StoredConfig,
}

impl MonitoringStep {
    pub const NAME: &'static str = "monitoring";

    pub fn new(ctx: &StepContext) -> Self {
        Self {
            containers: ctx.containers.clone(),
            loader: ctx.loader.clone(),
            vault: ctx.vault.clone(),
            stored: ctx.stored.clone(),
        }
    }

    fn config_path(&self) -> PathBuf {
        PathBuf::from(self.stored.get_or("MONITORING_CONFIG_DIR", DEFAULT_CONFIG_DIR))
            .join(PROMETHEUS_CONFIG)
    }

    fn is_healthy(&self, name: &str) -> bool {
        matches!(
            self.containers.health(&ContainerHandle::named(name)),
            Ok(HealthStatus::Healthy)
        )
    }

    fn wait_healthy(&self, handle: &ContainerHandle, timeout: Duration) -> Result<()> {
        let healthy = shell::wait_until(timeout, Duration::from_secs(2), || {
            matches!(self.containers.health(handle), Ok(HealthStatus::Healthy))
        });
        if healthy {
            Ok(())
        } else {
            Err(PalisadeError::StepExecutionError {
                step: Self::NAME.to_string(),
                message: format!(
                    "container '{}' did not become healthy within {}s",
                    handle.name,
                    timeout.as_secs()
                ),
            })
        }
    }

    fn render_config(&self, ctx: &ExecutionContext) -> Result<String> {
        let mut vars = BTreeMap::new();
        for key in ["PROMETHEUS_SCRAPE_INTERVAL", "PROMETHEUS_RETENTION_TIME"] {
            vars.insert(key.to_string(), ctx.require(key)?.to_string());
        }

        let template = ctx.require("MONITORING_TEMPLATE")?;
        let doc = self.loader.load_template(template, &vars)?;
        self.loader.validate_against_schema(&doc, "prometheus")?;

        serde_yaml::to_string(&doc).map_err(|e| PalisadeError::ConfigParseError {
            path: template.into(),
            message: e.to_string(),
        })
    }

    fn prometheus_spec(&self, ctx: &ExecutionContext) -> Result<ContainerSpec> {
        Ok(ContainerSpec {
            name: PROMETHEUS_CONTAINER.to_string(),
            image: ctx.require("PROMETHEUS_IMAGE")?.to_string(),
            network: Some(ctx.require("CONTAINER_NETWORK")?.to_string()),
            env: BTreeMap::new(),
            volumes: vec![(PROMETHEUS_VOLUME.to_string(), "/prometheus".to_string())],
            ports: vec![(9090, 9090)],
        })
    }

    fn grafana_spec(&self, ctx: &ExecutionContext) -> Result<ContainerSpec> {
        let mut env = BTreeMap::new();
        env.insert(
            "GF_SECURITY_ADMIN_USER".to_string(),
            ctx.require("GRAFANA_ADMIN_USER")?.to_string(),
        );
        env.insert(
            "GF_SECURITY_ADMIN_PASSWORD".to_string(),
            ctx.require("GRAFANA_ADMIN_PASSWORD")?.to_string(),
        );
        Ok(ContainerSpec {
            name: GRAFANA_CONTAINER.to_string(),
            image: ctx.require("GRAFANA_IMAGE")?.to_string(),
            network: Some(ctx.require("CONTAINER_NETWORK")?.to_string()),
            env,
            volumes: vec![(GRAFANA_VOLUME.to_string(), "/var/lib/grafana".to_string())],
            ports: vec![(3000, 3000)],
        })
    }
}

impl Step for MonitoringStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            name: Self::NAME,
            can_skip: true,
            can_cleanup: true,
            required_keys: vec![
                PROMETHEUS_IMAGE,
                GRAFANA_IMAGE,
                NETWORK,
                SCRAPE_INTERVAL,
                RETENTION_TIME,
                GRAFANA_ADMIN_USER,
                GRAFANA_ADMIN_PASSWORD,
                CONFIG_DIR,
                MONITORING_TEMPLATE,
                HEALTH_TIMEOUT,
            ],
        }
    }

    fn check_completed(&self) -> bool {
        self.config_path().exists()
            && self.containers.ping()
            && self.is_healthy(PROMETHEUS_CONTAINER)
            && self.is_healthy(GRAFANA_CONTAINER)
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        if !self.containers.ping() {
            return Err(PalisadeError::DependencyUnavailable {
                step: Self::NAME.to_string(),
                message: "container runtime daemon is not reachable".to_string(),
            });
        }

        let timeout = Duration::from_secs(
            ctx.get_or("HEALTH_TIMEOUT_SECS", "180")
                .parse()
                .map_err(|_| PalisadeError::ValidationFailed {
                    reason: "HEALTH_TIMEOUT_SECS is not a number".to_string(),
                })?,
        );

        // Render before any mutation so a bad template fails the step clean.
        let rendered = self.render_config(ctx)?;

        let config_path =
            PathBuf::from(ctx.require("MONITORING_CONFIG_DIR")?).join(PROMETHEUS_CONFIG);
        self.vault
            .create_backup(Self::NAME, &[config_path.clone()], BTreeMap::new())?;
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config_path, rendered)?;

        self.containers.ensure_volume(&VolumeSpec {
            name: PROMETHEUS_VOLUME.to_string(),
        })?;
        self.containers.ensure_volume(&VolumeSpec {
            name: GRAFANA_VOLUME.to_string(),
        })?;

        // Prometheus first; Grafana's datasource points at it.
        let prometheus = self.containers.run_container(&self.prometheus_spec(ctx)?)?;
        self.wait_healthy(&prometheus, timeout)?;

        let grafana = self.containers.run_container(&self.grafana_spec(ctx)?)?;
        self.wait_healthy(&grafana, timeout)?;

        tracing::info!("Monitoring stack is up and healthy");
        Ok(())
    }

    fn rollback(&self) -> bool {
        let mut clean = true;
        for name in [GRAFANA_CONTAINER, PROMETHEUS_CONTAINER] {
            if let Err(e) = self.containers.stop_and_remove(&ContainerHandle::named(name)) {
                tracing::warn!("Could not remove container '{}': {}", name, e);
                clean = false;
            }
        }

        // Put the pre-change scrape config back. An empty namespace just
        // means this run was the first ever to write one.
        let restored =
            self.vault
                .restore_latest(Self::NAME, &[self.config_path()], |_| {
                    ValidationResult::ok(None)
                });
        if !restored {
            tracing::debug!("No previous monitoring config to restore");
        }
        clean
    }
}
