//! Capability seams over host tooling.
//!
//! Everything the engine needs from the host (packages, services,
//! containers, certificate issuance, template loading) is expressed as a
//! narrow trait here. The host implementations in [`host`] are thin wrappers
//! over `apt-get`, `systemctl`, `docker` and `certbot`; the mocks in [`mock`]
//! let the engine and the concrete steps run entirely in-process.

pub mod host;
pub mod mock;

pub use host::{
    AptPackageManager, CertbotIssuer, DockerCli, SystemdServiceManager, YamlTemplateLoader,
};
pub use mock::{
    MockCertificateIssuer, MockConfigLoader, MockContainerRuntime, MockPackageManager,
    MockServiceManager,
};

use crate::error::Result;
use std::collections::BTreeMap;

/// OS package installation.
pub trait PackageManager: Send + Sync {
    /// Non-mutating probe for one package.
    fn is_installed(&self, name: &str) -> bool;

    /// Install packages. Must tolerate already-installed packages.
    fn install(&self, names: &[&str]) -> Result<()>;
}

/// System service control.
pub trait ServiceManager: Send + Sync {
    fn is_active(&self, name: &str) -> bool;
    fn enable(&self, name: &str) -> Result<()>;
    fn start(&self, name: &str) -> Result<()>;
    fn restart(&self, name: &str) -> Result<()>;
    fn stop(&self, name: &str) -> Result<()>;
}

/// A named container network.
#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub name: String,
}

/// A named container volume.
#[derive(Debug, Clone)]
pub struct VolumeSpec {
    pub name: String,
}

/// Everything needed to run one workload container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub network: Option<String>,
    /// Environment variables passed into the container.
    pub env: BTreeMap<String, String>,
    /// `volume-name:mount-path` pairs.
    pub volumes: Vec<(String, String)>,
    /// `host:container` port publications.
    pub ports: Vec<(u16, u16)>,
}

/// Opaque reference to a running workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    pub name: String,
}

impl ContainerHandle {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// Reported container health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
}

/// Container runtime control.
///
/// `ensure_*` operations converge: they check for existence before creating,
/// so re-running a completed step never duplicates networks or volumes.
pub trait ContainerRuntime: Send + Sync {
    /// Whether the runtime daemon is reachable at all.
    fn ping(&self) -> bool;

    fn ensure_network(&self, spec: &NetworkSpec) -> Result<()>;
    fn ensure_volume(&self, spec: &VolumeSpec) -> Result<()>;
    fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle>;
    fn health(&self, handle: &ContainerHandle) -> Result<HealthStatus>;
    fn stop_and_remove(&self, handle: &ContainerHandle) -> Result<()>;
    fn network_exists(&self, name: &str) -> bool;
    fn remove_network(&self, name: &str) -> Result<()>;
}

/// Certificate issuance (an ACME client in production).
pub trait CertificateIssuer: Send + Sync {
    fn issue(&self, domains: &[String], contact_email: &str, staging: bool) -> Result<()>;
}

/// Template rendering and schema checking for config documents.
pub trait ConfigLoader: Send + Sync {
    /// Load a named template, substitute `${VAR}` placeholders, parse as YAML.
    fn load_template(
        &self,
        name: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<serde_yaml::Value>;

    /// Validate a document against a named schema.
    fn validate_against_schema(&self, document: &serde_yaml::Value, schema_name: &str) -> Result<()>;
}
