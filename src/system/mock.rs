//! In-process capability implementations for tests.
//!
//! Each mock records the mutations it was asked to perform so tests can
//! assert on side effects (or their absence) without touching the host.

use crate::error::{PalisadeError, Result};
use crate::system::{
    CertificateIssuer, ConfigLoader, ContainerHandle, ContainerRuntime, ContainerSpec,
    HealthStatus, NetworkSpec, PackageManager, ServiceManager, VolumeSpec,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// Package manager over an in-memory installed set.
#[derive(Debug, Default)]
pub struct MockPackageManager {
    installed: Mutex<BTreeSet<String>>,
    /// When true, install calls fail (simulates a broken mirror).
    pub fail_installs: bool,
}

impl MockPackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(packages: &[&str]) -> Self {
        let mock = Self::new();
        {
            let mut installed = mock.installed.lock().unwrap();
            for pkg in packages {
                installed.insert(pkg.to_string());
            }
        }
        mock
    }
}

impl PackageManager for MockPackageManager {
    fn is_installed(&self, name: &str) -> bool {
        self.installed.lock().unwrap().contains(name)
    }

    fn install(&self, names: &[&str]) -> Result<()> {
        if self.fail_installs {
            return Err(PalisadeError::CommandFailed {
                command: format!("apt-get install -y {}", names.join(" ")),
                code: Some(100),
            });
        }
        let mut installed = self.installed.lock().unwrap();
        for name in names {
            // Installing an already-present package is not an error.
            installed.insert(name.to_string());
        }
        Ok(())
    }
}

/// Service manager over an in-memory active/enabled set.
#[derive(Debug, Default)]
pub struct MockServiceManager {
    active: Mutex<BTreeSet<String>>,
    enabled: Mutex<BTreeSet<String>>,
}

impl MockServiceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled_services(&self) -> Vec<String> {
        self.enabled.lock().unwrap().iter().cloned().collect()
    }
}

impl ServiceManager for MockServiceManager {
    fn is_active(&self, name: &str) -> bool {
        self.active.lock().unwrap().contains(name)
    }

    fn enable(&self, name: &str) -> Result<()> {
        self.enabled.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    fn start(&self, name: &str) -> Result<()> {
        self.active.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    fn restart(&self, name: &str) -> Result<()> {
        self.active.lock().unwrap().insert(name.to_string());
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<()> {
        self.active.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Container runtime over in-memory networks, volumes and containers.
#[derive(Debug)]
pub struct MockContainerRuntime {
    pub reachable: bool,
    networks: Mutex<BTreeSet<String>>,
    volumes: Mutex<BTreeSet<String>>,
    containers: Mutex<BTreeMap<String, HealthStatus>>,
    health_on_create: Mutex<BTreeMap<String, HealthStatus>>,
}

impl Default for MockContainerRuntime {
    fn default() -> Self {
        Self {
            reachable: true,
            networks: Mutex::new(BTreeSet::new()),
            volumes: Mutex::new(BTreeSet::new()),
            containers: Mutex::new(BTreeMap::new()),
            health_on_create: Mutex::new(BTreeMap::new()),
        }
    }
}

impl MockContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// A runtime whose daemon never answers the ping.
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::default()
        }
    }

    pub fn networks(&self) -> Vec<String> {
        self.networks.lock().unwrap().iter().cloned().collect()
    }

    pub fn volumes(&self) -> Vec<String> {
        self.volumes.lock().unwrap().iter().cloned().collect()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.containers.lock().unwrap().keys().cloned().collect()
    }

    /// Force the reported health of a container.
    pub fn set_health(&self, name: &str, status: HealthStatus) {
        self.containers
            .lock()
            .unwrap()
            .insert(name.to_string(), status);
    }

    /// Make a container start in the given health state instead of healthy.
    pub fn script_health_on_create(&self, name: &str, status: HealthStatus) {
        self.health_on_create
            .lock()
            .unwrap()
            .insert(name.to_string(), status);
    }
}

impl ContainerRuntime for MockContainerRuntime {
    fn ping(&self) -> bool {
        self.reachable
    }

    fn ensure_network(&self, spec: &NetworkSpec) -> Result<()> {
        self.networks.lock().unwrap().insert(spec.name.clone());
        Ok(())
    }

    fn ensure_volume(&self, spec: &VolumeSpec) -> Result<()> {
        self.volumes.lock().unwrap().insert(spec.name.clone());
        Ok(())
    }

    fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        // New containers come up healthy immediately unless a test scripted
        // a different starting state.
        let status = self
            .health_on_create
            .lock()
            .unwrap()
            .get(&spec.name)
            .copied()
            .unwrap_or(HealthStatus::Healthy);
        self.containers
            .lock()
            .unwrap()
            .insert(spec.name.clone(), status);
        Ok(ContainerHandle::named(&spec.name))
    }

    fn health(&self, handle: &ContainerHandle) -> Result<HealthStatus> {
        self.containers
            .lock()
            .unwrap()
            .get(&handle.name)
            .copied()
            .ok_or_else(|| PalisadeError::CommandFailed {
                command: format!("docker inspect {}", handle.name),
                code: Some(1),
            })
    }

    fn stop_and_remove(&self, handle: &ContainerHandle) -> Result<()> {
        self.containers.lock().unwrap().remove(&handle.name);
        Ok(())
    }

    fn network_exists(&self, name: &str) -> bool {
        self.networks.lock().unwrap().contains(name)
    }

    fn remove_network(&self, name: &str) -> Result<()> {
        self.networks.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Scriptable certificate issuer.
///
/// On success, writes the configured certificate material into the target
/// directory, imitating an ACME client dropping files into its live dir.
#[derive(Debug, Default)]
pub struct MockCertificateIssuer {
    pub fail_with: Option<String>,
    /// `(relative path, content)` pairs written on successful issuance.
    pub produce: Vec<(std::path::PathBuf, String)>,
    calls: Mutex<u32>,
}

impl MockCertificateIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// An issuer that writes the given `(path, content)` pairs on success.
    pub fn producing(files: Vec<(std::path::PathBuf, String)>) -> Self {
        Self {
            produce: files,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

impl CertificateIssuer for MockCertificateIssuer {
    fn issue(&self, _domains: &[String], _contact_email: &str, _staging: bool) -> Result<()> {
        *self.calls.lock().unwrap() += 1;
        if let Some(reason) = &self.fail_with {
            return Err(PalisadeError::CommandFailed {
                command: format!("certbot certonly ({reason})"),
                code: Some(1),
            });
        }
        for (path, content) in &self.produce {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        Ok(())
    }
}

/// Config loader over in-memory templates.
#[derive(Debug, Default)]
pub struct MockConfigLoader {
    templates: BTreeMap<String, String>,
}

impl MockConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, name: &str, content: &str) -> Self {
        self.templates.insert(name.to_string(), content.to_string());
        self
    }
}

impl ConfigLoader for MockConfigLoader {
    fn load_template(
        &self,
        name: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<serde_yaml::Value> {
        let template = self.templates.get(name).ok_or_else(|| {
            PalisadeError::ConfigParseError {
                path: name.into(),
                message: "template not found".to_string(),
            }
        })?;
        let mut rendered = template.clone();
        for (key, value) in variables {
            rendered = rendered.replace(&format!("${{{key}}}"), value);
        }
        serde_yaml::from_str(&rendered).map_err(|e| PalisadeError::ConfigParseError {
            path: name.into(),
            message: e.to_string(),
        })
    }

    fn validate_against_schema(&self, document: &serde_yaml::Value, _schema_name: &str) -> Result<()> {
        if document.is_mapping() {
            Ok(())
        } else {
            Err(PalisadeError::ValidationFailed {
                reason: "document is not a mapping".to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_manager_tracks_installs() {
        let pm = MockPackageManager::with_installed(&["curl"]);
        assert!(pm.is_installed("curl"));
        assert!(!pm.is_installed("gnupg"));

        pm.install(&["gnupg", "curl"]).unwrap();
        assert!(pm.is_installed("gnupg"));
    }

    #[test]
    fn failing_package_manager_errors() {
        let pm = MockPackageManager {
            fail_installs: true,
            ..Default::default()
        };
        assert!(pm.install(&["curl"]).is_err());
    }

    #[test]
    fn container_runtime_converges() {
        let runtime = MockContainerRuntime::new();
        let net = NetworkSpec {
            name: "idserver-net".to_string(),
        };
        runtime.ensure_network(&net).unwrap();
        runtime.ensure_network(&net).unwrap();
        assert_eq!(runtime.networks(), vec!["idserver-net".to_string()]);
    }

    #[test]
    fn issuer_records_calls_and_fails_when_scripted() {
        let issuer = MockCertificateIssuer::failing("rate limited");
        let err = issuer
            .issue(&["id.example.com".to_string()], "ops@example.com", true)
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert_eq!(issuer.call_count(), 1);
    }
}
