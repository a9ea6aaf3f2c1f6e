//! Installation summary generation.
//!
//! A human-readable record of what the run did, written after a fully
//! successful pipeline and regenerable on demand. Secret values are never
//! rendered here.

use crate::config::StoredConfig;
use crate::orchestrator::RunResult;
use crate::error::Result;
use crate::steps::certificate::{CertificateStep, CERT_FILE};
use crate::validation::{CertificateConstraints, ValidationGate};
use crate::vault::BackupVault;
use chrono::Utc;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const SUMMARY_FILE: &str = "installation-summary.md";
const DEFAULT_SUMMARY_DIR: &str = "/var/lib/palisade";

/// Writes `installation-summary.md` under the summary directory.
pub struct SummaryGenerator {
    stored: StoredConfig,
    vault: BackupVault,
    gate: ValidationGate,
}

impl SummaryGenerator {
    pub fn new(stored: StoredConfig, vault: BackupVault, gate: ValidationGate) -> Self {
        Self {
            stored,
            vault,
            gate,
        }
    }

    /// Render and write the summary; returns the written path.
    pub fn write(&self, result: &RunResult) -> Result<PathBuf> {
        let dir = PathBuf::from(self.stored.get_or("SUMMARY_DIR", DEFAULT_SUMMARY_DIR));
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(SUMMARY_FILE);
        std::fs::write(&path, self.render(result))?;
        tracing::info!("Wrote installation summary to {}", path.display());
        Ok(path)
    }

    /// Render the summary document.
    pub fn render(&self, result: &RunResult) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Installation Summary");
        let _ = writeln!(out);
        let _ = writeln!(out, "Generated: {}", Utc::now().format("%Y-%m-%d %H:%M UTC"));
        let _ = writeln!(
            out,
            "Run: {} in {:.1}s",
            if result.success { "succeeded" } else { "failed" },
            result.duration.as_secs_f64()
        );
        let _ = writeln!(out);

        let _ = writeln!(out, "## Steps");
        let _ = writeln!(out);
        for record in &result.records {
            let reason = record
                .reason
                .as_deref()
                .map(|r| format!(" ({r})"))
                .unwrap_or_default();
            let _ = writeln!(out, "- `{}`: {}{}", record.step_name, record.outcome.label(), reason);
        }
        let _ = writeln!(out);

        self.render_certificate(&mut out);
        self.render_backups(&mut out);
        out
    }

    fn render_certificate(&self, out: &mut String) {
        let _ = writeln!(out, "## Certificate");
        let _ = writeln!(out);
        let Some(domains) = self.stored.get("TLS_DOMAINS") else {
            let _ = writeln!(out, "Not configured.");
            let _ = writeln!(out);
            return;
        };

        let cert_dir = Path::new(self.stored.get_or("CERT_DIR", "/etc/palisade/certs"));
        let constraints = CertificateConstraints {
            domains: domains.split(',').map(|d| d.trim().to_string()).collect(),
            min_days_valid: 0,
        };
        let verdict = self.gate.validate(&cert_dir.join(CERT_FILE), &constraints);

        let _ = writeln!(out, "- Domains: {domains}");
        if verdict.valid {
            let _ = writeln!(out, "- Status: valid");
        } else {
            let _ = writeln!(
                out,
                "- Status: invalid ({})",
                verdict.reason.as_deref().unwrap_or("unknown reason")
            );
        }
        if let Some(expiry) = verdict.expiry {
            let _ = writeln!(out, "- Expires: {}", expiry.format("%Y-%m-%d"));
        }
        let _ = writeln!(out);
    }

    fn render_backups(&self, out: &mut String) {
        let _ = writeln!(out, "## Backups");
        let _ = writeln!(out);
        match self.vault.latest(CertificateStep::NAME) {
            Ok(Some(record)) => {
                let _ = writeln!(out, "- Latest certificate snapshot: {}", record.timestamp);
            }
            Ok(None) => {
                let _ = writeln!(out, "- No certificate snapshots yet.");
            }
            Err(e) => {
                let _ = writeln!(out, "- Snapshot listing failed: {e}");
            }
        }
        let _ = writeln!(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::RunRecord;
    use crate::step::StepOutcome;
    use crate::steps::tests_support::stored;
    use std::time::Duration;
    use tempfile::TempDir;

    fn result() -> RunResult {
        RunResult {
            records: vec![
                RunRecord {
                    step_name: "system_prepare".to_string(),
                    outcome: StepOutcome::Skipped,
                    reason: None,
                },
                RunRecord {
                    step_name: "certificate".to_string(),
                    outcome: StepOutcome::Succeeded,
                    reason: None,
                },
            ],
            success: true,
            duration: Duration::from_secs(12),
        }
    }

    #[test]
    fn renders_outcomes_and_sections() {
        let temp = TempDir::new().unwrap();
        let generator = SummaryGenerator::new(
            StoredConfig::default(),
            BackupVault::new(temp.path()),
            ValidationGate::new(),
        );

        let rendered = generator.render(&result());
        assert!(rendered.contains("`system_prepare`: skipped"));
        assert!(rendered.contains("`certificate`: succeeded"));
        assert!(rendered.contains("Not configured."));
        assert!(rendered.contains("No certificate snapshots yet."));
    }

    #[test]
    fn never_renders_secret_values() {
        let temp = TempDir::new().unwrap();
        let generator = SummaryGenerator::new(
            stored(&[
                ("TLS_DOMAINS", "id.example.com"),
                ("DB_PASSWORD", "super-secret"),
                ("IDENTITY_ADMIN_PASSWORD", "also-secret"),
            ]),
            BackupVault::new(temp.path()),
            ValidationGate::new(),
        );

        let rendered = generator.render(&result());
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("also-secret"));
        assert!(rendered.contains("id.example.com"));
    }

    #[test]
    fn writes_under_the_configured_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("state").display().to_string();
        let generator = SummaryGenerator::new(
            stored(&[("SUMMARY_DIR", dir.as_str())]),
            BackupVault::new(temp.path()),
            ValidationGate::new(),
        );

        let path = generator.write(&result()).unwrap();
        assert!(path.ends_with(SUMMARY_FILE));
        assert!(path.exists());
    }
}
