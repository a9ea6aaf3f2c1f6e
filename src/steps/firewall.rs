//! Host firewall and intrusion-prevention setup.

use crate::config::{ConfigKeySpec, ExecutionContext};
use crate::error::Result;
use crate::shell;
use crate::step::{Step, StepDescriptor};
use crate::steps::StepContext;
use crate::system::{PackageManager, ServiceManager};
use std::sync::Arc;

const ALLOWED_PORTS: ConfigKeySpec =
    ConfigKeySpec::with_default("FIREWALL_ALLOWED_PORTS", "Ports to allow through the firewall", "22,80,443");
const ADMIN_IP: ConfigKeySpec = ConfigKeySpec::with_default(
    "FIREWALL_ADMIN_IP",
    "Admin IP allowed unrestricted access (empty for none)",
    "",
);

/// Configures ufw default-deny with an allow list and enables fail2ban.
pub struct FirewallStep {
    packages: Arc<dyn PackageManager>,
    services: Arc<dyn ServiceManager>,
}

impl FirewallStep {
    pub const NAME: &'static str = "firewall";

    pub fn new(ctx: &StepContext) -> Self {
        Self {
            packages: ctx.packages.clone(),
            services: ctx.services.clone(),
        }
    }
}

impl Step for FirewallStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            name: Self::NAME,
            can_skip: true,
            can_cleanup: true,
            required_keys: vec![ALLOWED_PORTS, ADMIN_IP],
        }
    }

    fn check_dependencies(&self) -> bool {
        self.packages.is_installed("ufw") && self.packages.is_installed("fail2ban")
    }

    fn install_dependencies(&self) -> Result<()> {
        self.packages.install(&["ufw", "fail2ban"])
    }

    fn check_completed(&self) -> bool {
        self.services.is_active("ufw") && self.services.is_active("fail2ban")
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        shell::execute_ok("ufw", &["default", "deny", "incoming"])?;
        shell::execute_ok("ufw", &["default", "allow", "outgoing"])?;

        for port in ctx.require("FIREWALL_ALLOWED_PORTS")?.split(',') {
            let port = port.trim();
            if port.is_empty() {
                continue;
            }
            shell::execute_ok("ufw", &["allow", port])?;
        }

        let admin_ip = ctx.get_or("FIREWALL_ADMIN_IP", "");
        if !admin_ip.is_empty() {
            shell::execute_ok("ufw", &["allow", "from", admin_ip])?;
        }

        // --force skips the interactive confirmation; enable is idempotent.
        shell::execute_ok("ufw", &["--force", "enable"])?;

        self.services.enable("fail2ban")?;
        self.services.start("fail2ban")?;
        Ok(())
    }

    fn rollback(&self) -> bool {
        // Leave the host reachable rather than locked behind a half-applied
        // ruleset.
        let disabled = shell::execute_check("ufw", &["--force", "disable"]);
        if !disabled {
            tracing::warn!("Could not disable ufw during rollback");
        }
        disabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::tests_support::context_with;
    use crate::system::{MockPackageManager, MockServiceManager};

    #[test]
    fn dependencies_are_the_firewall_packages() {
        let ctx = context_with(|c| {
            c.packages = Arc::new(MockPackageManager::with_installed(&["ufw"]));
        });
        let step = FirewallStep::new(&ctx);
        // fail2ban missing: dependency check must fail.
        assert!(!step.check_dependencies());
    }

    #[test]
    fn completed_only_when_both_services_active() {
        let services = Arc::new(MockServiceManager::new());
        let ctx = context_with(|c| c.services = services.clone());
        let step = FirewallStep::new(&ctx);
        assert!(!step.check_completed());

        services.start("ufw").unwrap();
        assert!(!step.check_completed());

        services.start("fail2ban").unwrap();
        assert!(step.check_completed());
    }
}
