//! Concrete provisioning steps for the identity-server stack.
//!
//! Pipeline order is the dependency contract: packages before firewall,
//! firewall before the container runtime, runtime before certificates,
//! certificates before the server, server before monitoring and scheduled
//! backups.

pub mod certificate;
pub mod container_runtime;
pub mod database_backup;
pub mod firewall;
pub mod identity_server;
pub mod monitoring;
pub mod system_prepare;

pub use certificate::CertificateStep;
pub use container_runtime::ContainerRuntimeStep;
pub use database_backup::DatabaseBackupStep;
pub use firewall::FirewallStep;
pub use identity_server::IdentityServerStep;
pub use monitoring::MonitoringStep;
pub use system_prepare::SystemPrepareStep;

use crate::config::StoredConfig;
use crate::system::{
    CertificateIssuer, ConfigLoader, ContainerRuntime, PackageManager, ServiceManager,
};
use crate::validation::ValidationGate;
use crate::vault::BackupVault;
use std::sync::Arc;

#[cfg(test)]
pub(crate) mod tests_support;

/// Everything a step constructor may draw on.
///
/// Capabilities are shared handles so the same context builds the whole
/// pipeline; each step clones only what it needs.
#[derive(Clone)]
pub struct StepContext {
    /// Startup snapshot of the persisted store, for `check_completed` probes.
    pub stored: StoredConfig,
    pub packages: Arc<dyn PackageManager>,
    pub services: Arc<dyn ServiceManager>,
    pub containers: Arc<dyn ContainerRuntime>,
    pub issuer: Arc<dyn CertificateIssuer>,
    pub loader: Arc<dyn ConfigLoader>,
    pub vault: BackupVault,
    pub gate: ValidationGate,
}
