//! Database and identity-server container deployment.

use crate::config::{ConfigKeySpec, ExecutionContext};
use crate::error::{PalisadeError, Result};
use crate::shell;
use crate::step::{Step, StepDescriptor};
use crate::steps::container_runtime::{DEFAULT_DB_VOLUME, DEFAULT_NETWORK};
use crate::steps::StepContext;
use crate::system::{ConfigLoader, ContainerHandle, ContainerRuntime, ContainerSpec, HealthStatus};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

pub const DB_CONTAINER: &str = "idserver-db";
pub const SERVER_CONTAINER: &str = "idserver";

const DB_IMAGE: ConfigKeySpec =
    ConfigKeySpec::with_default("DB_IMAGE", "Database container image", "postgres:16");
const IDENTITY_IMAGE: ConfigKeySpec = ConfigKeySpec::with_default(
    "IDENTITY_IMAGE",
    "Identity server container image",
    "quay.io/keycloak/keycloak:26.0",
);
const NETWORK: ConfigKeySpec =
    ConfigKeySpec::with_default("CONTAINER_NETWORK", "Container network name", DEFAULT_NETWORK);
const DB_VOLUME: ConfigKeySpec =
    ConfigKeySpec::with_default("DB_VOLUME", "Database data volume name", DEFAULT_DB_VOLUME);
const DB_NAME: ConfigKeySpec =
    ConfigKeySpec::with_default("DB_NAME", "Database name", "idserver");
const DB_USER: ConfigKeySpec =
    ConfigKeySpec::with_default("DB_USER", "Database user", "idserver");
const DB_PASSWORD: ConfigKeySpec = ConfigKeySpec::secret("DB_PASSWORD", "Database password");
const ADMIN_USER: ConfigKeySpec =
    ConfigKeySpec::with_default("IDENTITY_ADMIN_USER", "Identity server admin user", "admin");
const ADMIN_PASSWORD: ConfigKeySpec =
    ConfigKeySpec::secret("IDENTITY_ADMIN_PASSWORD", "Identity server admin password");
const SERVER_TEMPLATE: ConfigKeySpec = ConfigKeySpec::with_default(
    "SERVER_TEMPLATE",
    "Container template for the identity server",
    "identity-server.yml",
);
const HEALTH_TIMEOUT: ConfigKeySpec = ConfigKeySpec::with_default(
    "HEALTH_TIMEOUT_SECS",
    "Seconds to wait for containers to become healthy",
    "180",
);

/// Runs the database and identity-server containers and waits for health.
pub struct IdentityServerStep {
    containers: Arc<dyn ContainerRuntime>,
    loader: Arc<dyn ConfigLoader>,
}

impl IdentityServerStep {
    pub const NAME: &'static str = "identity_server";

    pub fn new(ctx: &StepContext) -> Self {
        Self {
            containers: ctx.containers.clone(),
            loader: ctx.loader.clone(),
        }
    }

    fn is_healthy(&self, name: &str) -> bool {
        matches!(
            self.containers.health(&ContainerHandle::named(name)),
            Ok(HealthStatus::Healthy)
        )
    }

    /// Poll past the deadline is failure, never an indefinite hang.
    fn wait_healthy(&self, handle: &ContainerHandle, timeout: Duration) -> Result<()> {
        let healthy = shell::wait_until(timeout, Duration::from_secs(2), || {
            match self.containers.health(handle) {
                Ok(HealthStatus::Healthy) => true,
                Ok(_) => false,
                Err(e) => {
                    tracing::debug!("Health probe for '{}' failed: {}", handle.name, e);
                    false
                }
            }
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

    fn database_spec(&self, ctx: &ExecutionContext) -> Result<ContainerSpec> {
        let mut env = BTreeMap::new();
        env.insert("POSTGRES_DB".to_string(), ctx.require("DB_NAME")?.to_string());
        env.insert("POSTGRES_USER".to_string(), ctx.require("DB_USER")?.to_string());
        env.insert(
            "POSTGRES_PASSWORD".to_string(),
            ctx.require("DB_PASSWORD")?.to_string(),
        );
        Ok(ContainerSpec {
            name: DB_CONTAINER.to_string(),
            image: ctx.require("DB_IMAGE")?.to_string(),
            network: Some(ctx.require("CONTAINER_NETWORK")?.to_string()),
            env,
            volumes: vec![(
                ctx.require("DB_VOLUME")?.to_string(),
                "/var/lib/postgresql/data".to_string(),
            )],
            ports: Vec::new(),
        })
    }

    fn server_spec(&self, ctx: &ExecutionContext) -> Result<ContainerSpec> {
        let mut vars = BTreeMap::new();
        for key in [
            "IDENTITY_IMAGE",
            "CONTAINER_NETWORK",
            "DB_NAME",
            "DB_USER",
            "DB_PASSWORD",
            "IDENTITY_ADMIN_USER",
            "IDENTITY_ADMIN_PASSWORD",
        ] {
            vars.insert(key.to_string(), ctx.require(key)?.to_string());
        }
        vars.insert("DB_HOST".to_string(), DB_CONTAINER.to_string());
        vars.insert("SERVER_NAME".to_string(), SERVER_CONTAINER.to_string());

        let template = ctx.require("SERVER_TEMPLATE")?;
        let doc = self.loader.load_template(template, &vars)?;
        self.loader.validate_against_schema(&doc, "container")?;

        let mut spec = container_spec_from(&doc)?;
        if spec.network.is_none() {
            spec.network = Some(ctx.require("CONTAINER_NETWORK")?.to_string());
        }
        Ok(spec)
    }
}

impl Step for IdentityServerStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            name: Self::NAME,
            can_skip: true,
            can_cleanup: true,
            required_keys: vec![
                DB_IMAGE,
                IDENTITY_IMAGE,
                NETWORK,
                DB_VOLUME,
                DB_NAME,
                DB_USER,
                DB_PASSWORD,
                ADMIN_USER,
                ADMIN_PASSWORD,
                SERVER_TEMPLATE,
                HEALTH_TIMEOUT,
            ],
        }
    }

    fn check_completed(&self) -> bool {
        self.containers.ping() && self.is_healthy(DB_CONTAINER) && self.is_healthy(SERVER_CONTAINER)
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

        // Database first; the server crash-loops without it.
        let db = self.containers.run_container(&self.database_spec(ctx)?)?;
        self.wait_healthy(&db, timeout)?;

        let server = self.containers.run_container(&self.server_spec(ctx)?)?;
        self.wait_healthy(&server, timeout)?;

        tracing::info!("Identity server stack is up and healthy");
        Ok(())
    }

    fn rollback(&self) -> bool {
        let mut clean = true;
        for name in [SERVER_CONTAINER, DB_CONTAINER] {
            if let Err(e) = self.containers.stop_and_remove(&ContainerHandle::named(name)) {
                tracing::warn!("Could not remove container '{}': {}", name, e);
                clean = false;
            }
        }
        clean
    }
}

/// Build a [`ContainerSpec`] from a rendered template document.
fn container_spec_from(doc: &serde_yaml::Value) -> Result<ContainerSpec> {
    let field = |name: &str| -> Result<String> {
        doc.get(name)
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| PalisadeError::ValidationFailed {
                reason: format!("container document missing string field '{name}'"),
            })
    };

    let mut spec = ContainerSpec {
        name: field("name")?,
        image: field("image")?,
        network: doc
            .get("network")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        ..Default::default()
    };

    if let Some(env) = doc.get("env").and_then(|v| v.as_mapping()) {
        for (key, value) in env {
            let (Some(key), Some(value)) = (key.as_str(), value.as_str()) else {
                return Err(PalisadeError::ValidationFailed {
                    reason: "container env entries must be strings".to_string(),
                });
            };
            spec.env.insert(key.to_string(), value.to_string());
        }
    }

    if let Some(ports) = doc.get("ports").and_then(|v| v.as_sequence()) {
        for port in ports {
            let pair = port.as_str().unwrap_or_default();
            let parsed = pair.split_once(':').and_then(|(host, container)| {
                Some((host.parse::<u16>().ok()?, container.parse::<u16>().ok()?))
            });
            let Some(pair) = parsed else {
                return Err(PalisadeError::ValidationFailed {
                    reason: format!("invalid port mapping '{pair}'"),
                });
            };
            spec.ports.push(pair);
        }
    }

    Ok(spec)
}
