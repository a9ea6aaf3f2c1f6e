//! TLS certificate issuance with snapshot-before-mutate protection.
//!
//! The happy path: snapshot the installed artifacts, ask the issuer for a
//! fresh certificate, gate the new artifact through content validation and
//! chain verification, install it. On any failure after the snapshot the
//! pre-change state is restored, and when the restored artifact is still
//! valid the step reports success: serving yesterday's good certificate
//! beats serving nothing.

use crate::config::{ConfigKeySpec, ExecutionContext, StoredConfig};
use crate::error::{PalisadeError, Result};
use crate::step::{Step, StepDescriptor};
use crate::steps::StepContext;
use crate::system::{CertificateIssuer, PackageManager};
use crate::validation::{CertificateConstraints, ValidationGate};
use crate::vault::BackupVault;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CERT_FILE: &str = "fullchain.pem";
pub const KEY_FILE: &str = "privkey.pem";
const DEFAULT_CERT_DIR: &str = "/etc/palisade/certs";
const DEFAULT_SOURCE_ROOT: &str = "/etc/letsencrypt/live";
const DEFAULT_MIN_DAYS: &str = "30";

const TLS_DOMAINS: ConfigKeySpec =
    ConfigKeySpec::required("TLS_DOMAINS", "Comma-separated domains to secure");
const ADMIN_EMAIL: ConfigKeySpec =
    ConfigKeySpec::required("ADMIN_EMAIL", "Contact email for certificate issuance");
const CERT_DIR: ConfigKeySpec =
    ConfigKeySpec::with_default("CERT_DIR", "Directory the server reads certificates from", DEFAULT_CERT_DIR);
const CERT_SOURCE_ROOT: ConfigKeySpec = ConfigKeySpec::with_default(
    "CERT_SOURCE_ROOT",
    "Directory the issuer writes new certificates under",
    DEFAULT_SOURCE_ROOT,
);
const CERT_STAGING: ConfigKeySpec =
    ConfigKeySpec::with_default("CERT_STAGING", "Use the issuer's staging endpoint", "false");
const CERT_MIN_DAYS: ConfigKeySpec = ConfigKeySpec::with_default(
    "CERT_MIN_DAYS",
    "Minimum remaining certificate lifetime in days",
    DEFAULT_MIN_DAYS,
);

/// Issues, validates and installs the TLS certificate for the stack.
pub struct CertificateStep {
    issuer: Arc<dyn CertificateIssuer>,
    packages: Arc<dyn PackageManager>,
    vault: BackupVault,
    gate: ValidationGate,
    stored: StoredConfig,
}

impl CertificateStep {
    pub const NAME: &'static str = "certificate";

    pub fn new(ctx: &StepContext) -> Self {
        Self {
            issuer: ctx.issuer.clone(),
            packages: ctx.packages.clone(),
            vault: ctx.vault.clone(),
            gate: ctx.gate,
            stored: ctx.stored.clone(),
        }
    }

    /// Both readiness gates: content validity and a verifiable chain.
    /// Artifact presence alone never counts as done.
    fn installed_is_valid(&self, cert_dir: &Path, constraints: &CertificateConstraints) -> bool {
        let cert = cert_dir.join(CERT_FILE);
        let content = self.gate.validate(&cert, constraints);
        if !content.valid {
            return false;
        }
        self.gate.verify_chain(&cert).valid
    }

    fn install(&self, source_dir: &Path, cert_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(cert_dir)?;
        std::fs::copy(source_dir.join(CERT_FILE), cert_dir.join(CERT_FILE))?;
        std::fs::copy(source_dir.join(KEY_FILE), cert_dir.join(KEY_FILE))?;
        set_artifact_permissions(cert_dir)?;
        Ok(())
    }

    /// Fall back to the newest snapshot that still validates. The snapshot
    /// taken just before this attempt may itself hold an expired artifact,
    /// so the scan walks backwards until it finds a restorable one. Landing
    /// a valid prior artifact is step success: serving yesterday's good
    /// certificate beats serving nothing.
    fn restore_previous(&self, cert_dir: &Path, constraints: &CertificateConstraints, cause: &str) -> Result<()> {
        let targets = [cert_dir.join(CERT_FILE), cert_dir.join(KEY_FILE)];
        let records = self.vault.records(Self::NAME).unwrap_or_default();
        for record in records.iter().rev() {
            let verdict = self
                .gate
                .validate(&record.content_root.join(CERT_FILE), constraints);
            if !verdict.valid {
                tracing::debug!(
                    "Backup {} not restorable: {}",
                    record.timestamp,
                    verdict.reason.as_deref().unwrap_or("unknown reason")
                );
                continue;
            }
            if self.vault.restore_record(record, &targets) {
                tracing::warn!(
                    "Certificate renewal failed ({}); restored the previous valid certificate",
                    cause
                );
                return Ok(());
            }
        }
        Err(PalisadeError::StepExecutionError {
            step: Self::NAME.to_string(),
            message: format!("{cause}, and no valid backup was available to restore"),
        })
    }
}

impl Step for CertificateStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            name: Self::NAME,
            can_skip: true,
            // Failure handling is the restore path inside execute; a second
            // rollback pass would have nothing left to undo.
            can_cleanup: false,
            required_keys: vec![
                TLS_DOMAINS,
                ADMIN_EMAIL,
                CERT_DIR,
                CERT_SOURCE_ROOT,
                CERT_STAGING,
                CERT_MIN_DAYS,
            ],
        }
    }

    fn check_dependencies(&self) -> bool {
        // certbot may have been installed outside apt (snap is common).
        self.packages.is_installed("certbot") || crate::shell::command_exists("certbot")
    }

    fn install_dependencies(&self) -> Result<()> {
        self.packages.install(&["certbot"])
    }

    fn check_completed(&self) -> bool {
        // Domains are identity configuration; a host that never collected
        // them has never completed this step.
        let Some(domains) = self.stored.get("TLS_DOMAINS") else {
            return false;
        };
        let constraints = CertificateConstraints {
            domains: split_domains(domains),
            min_days_valid: self
                .stored
                .get_or("CERT_MIN_DAYS", DEFAULT_MIN_DAYS)
                .parse()
                .unwrap_or(30),
        };
        let cert_dir = PathBuf::from(self.stored.get_or("CERT_DIR", DEFAULT_CERT_DIR));
        self.installed_is_valid(&cert_dir, &constraints)
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let domains = split_domains(ctx.require("TLS_DOMAINS")?);
        if domains.is_empty() {
            return Err(PalisadeError::ValidationFailed {
                reason: "TLS_DOMAINS resolved to an empty list".to_string(),
            });
        }
        let constraints = CertificateConstraints {
            domains: domains.clone(),
            min_days_valid: ctx
                .get_or("CERT_MIN_DAYS", DEFAULT_MIN_DAYS)
                .parse()
                .map_err(|_| PalisadeError::ValidationFailed {
                    reason: "CERT_MIN_DAYS is not a number".to_string(),
                })?,
        };
        let cert_dir = PathBuf::from(ctx.require("CERT_DIR")?);

        if self.installed_is_valid(&cert_dir, &constraints) {
            tracing::info!("Installed certificate is still valid, nothing to do");
            return Ok(());
        }

        // Snapshot whatever is installed before touching anything.
        let existing = self.gate.validate(&cert_dir.join(CERT_FILE), &constraints);
        let mut metadata = BTreeMap::new();
        metadata.insert("valid_at_snapshot".to_string(), existing.valid.to_string());
        if let Some(expiry) = existing.expiry {
            metadata.insert("expiry".to_string(), expiry.to_rfc3339());
        }
        self.vault.create_backup(
            Self::NAME,
            &[cert_dir.join(CERT_FILE), cert_dir.join(KEY_FILE)],
            metadata,
        )?;

        let staging = ctx.get_or("CERT_STAGING", "false") == "true";
        let email = ctx.require("ADMIN_EMAIL")?;
        if let Err(e) = self.issuer.issue(&domains, email, staging) {
            return self.restore_previous(&cert_dir, &constraints, &format!("issuance failed: {e}"));
        }

        // Issuers write under <root>/<primary-domain>/.
        let source_dir = PathBuf::from(ctx.require("CERT_SOURCE_ROOT")?).join(&domains[0]);
        let fresh = self.gate.validate(&source_dir.join(CERT_FILE), &constraints);
        if !fresh.valid {
            let reason = fresh.reason.unwrap_or_else(|| "unknown".to_string());
            return self.restore_previous(
                &cert_dir,
                &constraints,
                &format!("new certificate rejected: {reason}"),
            );
        }
        let chain = self.gate.verify_chain(&source_dir.join(CERT_FILE));
        if !chain.valid {
            let reason = chain.reason.unwrap_or_else(|| "unknown".to_string());
            return self.restore_previous(
                &cert_dir,
                &constraints,
                &format!("new certificate chain rejected: {reason}"),
            );
        }

        self.install(&source_dir, &cert_dir)?;
        tracing::info!("Installed fresh certificate for {}", domains.join(", "));
        Ok(())
    }
}

fn split_domains(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(unix)]
fn set_artifact_permissions(cert_dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(cert_dir.join(CERT_FILE), std::fs::Permissions::from_mode(0o644))?;
    std::fs::set_permissions(cert_dir.join(KEY_FILE), std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_artifact_permissions(_cert_dir: &Path) -> Result<()> {
    Ok(())
}
