//! Host implementations of the capability traits.
//!
//! Thin wrappers over the usual tooling. No retry logic, no business rules;
//! those belong to the steps and the orchestrator.

use crate::error::{PalisadeError, Result};
use crate::shell;
use crate::system::{
    CertificateIssuer, ConfigLoader, ContainerHandle, ContainerRuntime, ContainerSpec,
    HealthStatus, NetworkSpec, PackageManager, ServiceManager, VolumeSpec,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `apt-get`/`dpkg`-backed package manager.
#[derive(Debug, Default)]
pub struct AptPackageManager;

impl PackageManager for AptPackageManager {
    fn is_installed(&self, name: &str) -> bool {
        shell::execute_check("dpkg", &["-s", name])
    }

    fn install(&self, names: &[&str]) -> Result<()> {
        shell::execute_ok("apt-get", &["update"])?;
        let mut args = vec!["install", "-y"];
        args.extend_from_slice(names);
        // apt-get install is a no-op for packages already at the latest
        // version, so re-invocation is safe.
        shell::execute_ok("apt-get", &args)?;
        Ok(())
    }
}

/// `systemctl`-backed service manager.
#[derive(Debug, Default)]
pub struct SystemdServiceManager;

impl ServiceManager for SystemdServiceManager {
    fn is_active(&self, name: &str) -> bool {
        shell::execute_check("systemctl", &["is-active", "--quiet", name])
    }

    fn enable(&self, name: &str) -> Result<()> {
        shell::execute_ok("systemctl", &["enable", name]).map(|_| ())
    }

    fn start(&self, name: &str) -> Result<()> {
        shell::execute_ok("systemctl", &["start", name]).map(|_| ())
    }

    fn restart(&self, name: &str) -> Result<()> {
        shell::execute_ok("systemctl", &["restart", name]).map(|_| ())
    }

    fn stop(&self, name: &str) -> Result<()> {
        shell::execute_ok("systemctl", &["stop", name]).map(|_| ())
    }
}

/// `docker` CLI-backed container runtime.
#[derive(Debug, Default)]
pub struct DockerCli;

impl ContainerRuntime for DockerCli {
    fn ping(&self) -> bool {
        shell::execute_check("docker", &["info"])
    }

    fn ensure_network(&self, spec: &NetworkSpec) -> Result<()> {
        if self.network_exists(&spec.name) {
            return Ok(());
        }
        shell::execute_ok("docker", &["network", "create", &spec.name]).map(|_| ())
    }

    fn ensure_volume(&self, spec: &VolumeSpec) -> Result<()> {
        if shell::execute_check("docker", &["volume", "inspect", &spec.name]) {
            return Ok(());
        }
        shell::execute_ok("docker", &["volume", "create", &spec.name]).map(|_| ())
    }

    fn run_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle> {
        // Converge: a container with this name may be left over from an
        // earlier partial run.
        if shell::execute_check("docker", &["inspect", &spec.name]) {
            shell::execute_ok("docker", &["rm", "-f", &spec.name])?;
        }

        let mut args: Vec<String> = vec![
            "run".into(),
            "-d".into(),
            "--name".into(),
            spec.name.clone(),
            "--restart".into(),
            "unless-stopped".into(),
        ];
        if let Some(network) = &spec.network {
            args.push("--network".into());
            args.push(network.clone());
        }
        for (key, value) in &spec.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        for (volume, mount) in &spec.volumes {
            args.push("-v".into());
            args.push(format!("{volume}:{mount}"));
        }
        for (host, container) in &spec.ports {
            args.push("-p".into());
            args.push(format!("{host}:{container}"));
        }
        args.push(spec.image.clone());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        shell::execute_ok("docker", &arg_refs)?;
        Ok(ContainerHandle::named(&spec.name))
    }

    fn health(&self, handle: &ContainerHandle) -> Result<HealthStatus> {
        let result = shell::execute_ok(
            "docker",
            &[
                "inspect",
                "--format",
                "{{.State.Health.Status}}",
                &handle.name,
            ],
        )?;
        Ok(match result.stdout.trim() {
            "healthy" => HealthStatus::Healthy,
            "starting" => HealthStatus::Starting,
            _ => HealthStatus::Unhealthy,
        })
    }

    fn stop_and_remove(&self, handle: &ContainerHandle) -> Result<()> {
        shell::execute_ok("docker", &["rm", "-f", &handle.name]).map(|_| ())
    }

    fn network_exists(&self, name: &str) -> bool {
        shell::execute_check("docker", &["network", "inspect", name])
    }

    fn remove_network(&self, name: &str) -> Result<()> {
        shell::execute_ok("docker", &["network", "rm", name]).map(|_| ())
    }
}

/// `certbot certonly --standalone` issuer.
#[derive(Debug, Default)]
pub struct CertbotIssuer;

impl CertificateIssuer for CertbotIssuer {
    fn issue(&self, domains: &[String], contact_email: &str, staging: bool) -> Result<()> {
        let email_arg = format!("--email={contact_email}");
        let mut args: Vec<&str> = vec![
            "certonly",
            "--standalone",
            "--non-interactive",
            "--agree-tos",
            &email_arg,
            "--preferred-challenges",
            "http",
        ];
        for domain in domains {
            args.push("-d");
            args.push(domain);
        }
        if staging {
            args.push("--test-cert");
        }
        shell::execute_ok("certbot", &args).map(|_| ())
    }
}

/// File-backed template loader with `${VAR}` substitution.
#[derive(Debug)]
pub struct YamlTemplateLoader {
    template_dir: PathBuf,
    /// Schema name → required top-level fields.
    schemas: BTreeMap<String, Vec<String>>,
}

impl YamlTemplateLoader {
    pub fn new(template_dir: PathBuf) -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            "container".to_string(),
            vec!["image".to_string(), "name".to_string()],
        );
        Self {
            template_dir,
            schemas,
        }
    }

    /// Substitute `${VAR}` placeholders. Unknown placeholders are left
    /// untouched so YAML parse errors point at the real problem.
    fn interpolate(template: &str, variables: &BTreeMap<String, String>) -> String {
        let mut rendered = template.to_string();
        for (key, value) in variables {
            rendered = rendered.replace(&format!("${{{key}}}"), value);
        }
        rendered
    }
}

impl ConfigLoader for YamlTemplateLoader {
    fn load_template(
        &self,
        name: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<serde_yaml::Value> {
        let path = self.template_dir.join(name);
        let template = std::fs::read_to_string(&path)?;
        let rendered = Self::interpolate(&template, variables);
        serde_yaml::from_str(&rendered).map_err(|e| PalisadeError::ConfigParseError {
            path,
            message: e.to_string(),
        })
    }

    fn validate_against_schema(&self, document: &serde_yaml::Value, schema_name: &str) -> Result<()> {
        let Some(required) = self.schemas.get(schema_name) else {
            return Err(PalisadeError::ValidationFailed {
                reason: format!("unknown schema: {schema_name}"),
            });
        };
        for field in required {
            if document.get(field).is_none() {
                return Err(PalisadeError::ValidationFailed {
                    reason: format!("document missing required field '{field}'"),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn interpolate_substitutes_known_placeholders() {
        let mut vars = BTreeMap::new();
        vars.insert("DB_NAME".to_string(), "idserver".to_string());
        let rendered = YamlTemplateLoader::interpolate("name: ${DB_NAME}\nport: ${DB_PORT}", &vars);
        assert_eq!(rendered, "name: idserver\nport: ${DB_PORT}");
    }

    #[test]
    fn load_template_renders_and_parses() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("server.yml"),
            "image: idserver:latest\nname: ${CONTAINER_NAME}\n",
        )
        .unwrap();

        let loader = YamlTemplateLoader::new(temp.path().to_path_buf());
        let mut vars = BTreeMap::new();
        vars.insert("CONTAINER_NAME".to_string(), "idserver".to_string());

        let doc = loader.load_template("server.yml", &vars).unwrap();
        assert_eq!(doc.get("name").and_then(|v| v.as_str()), Some("idserver"));
        assert!(loader.validate_against_schema(&doc, "container").is_ok());
    }

    #[test]
    fn schema_validation_reports_missing_field() {
        let temp = TempDir::new().unwrap();
        let loader = YamlTemplateLoader::new(temp.path().to_path_buf());
        let doc: serde_yaml::Value = serde_yaml::from_str("image: idserver:latest").unwrap();

        let err = loader.validate_against_schema(&doc, "container").unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn unknown_schema_is_an_error() {
        let temp = TempDir::new().unwrap();
        let loader = YamlTemplateLoader::new(temp.path().to_path_buf());
        let doc: serde_yaml::Value = serde_yaml::from_str("a: 1").unwrap();

        assert!(loader.validate_against_schema(&doc, "nonexistent").is_err());
    }
}
