//! Nightly database dump scheduling.

use crate::config::{ConfigKeySpec, ExecutionContext, StoredConfig};
use crate::error::Result;
use crate::step::{Step, StepDescriptor};
use crate::steps::identity_server::DB_CONTAINER;
use crate::steps::StepContext;
use std::path::{Path, PathBuf};

pub const CRON_FILE: &str = "palisade-db-backup";
const DEFAULT_CRON_DIR: &str = "/etc/cron.d";
const DEFAULT_BACKUP_DIR: &str = "/var/backups/idserver";

const BACKUP_DIR: ConfigKeySpec = ConfigKeySpec::with_default(
    "BACKUP_DIR",
    "Directory for nightly database dumps",
    DEFAULT_BACKUP_DIR,
);
const CRON_DIR: ConfigKeySpec =
    ConfigKeySpec::with_default("CRON_DIR", "Cron drop-in directory", DEFAULT_CRON_DIR);
const DB_NAME: ConfigKeySpec =
    ConfigKeySpec::with_default("DB_NAME", "Database name", "idserver");
const DB_USER: ConfigKeySpec =
    ConfigKeySpec::with_default("DB_USER", "Database user", "idserver");
const BACKUP_SCHEDULE: ConfigKeySpec = ConfigKeySpec::with_default(
    "BACKUP_SCHEDULE",
    "Cron schedule for database dumps",
    "15 3 * * *",
);

/// Installs a cron drop-in that dumps the database every night.
pub struct DatabaseBackupStep {
    stored: StoredConfig,
}

impl DatabaseBackupStep {
    pub const NAME: &'static str = "database_backup";

    pub fn new(ctx: &StepContext) -> Self {
        Self {
            stored: ctx.stored.clone(),
        }
    }

    fn cron_path(cron_dir: &str) -> PathBuf {
        Path::new(cron_dir).join(CRON_FILE)
    }

    fn render(schedule: &str, db_user: &str, db_name: &str, backup_dir: &str) -> String {
        format!(
            "# Nightly database dump, managed by palisade. Do not edit.\n\
             {schedule} root docker exec {DB_CONTAINER} pg_dump -U {db_user} {db_name} \
             | gzip > {backup_dir}/{db_name}-$(date +\\%F).sql.gz\n"
        )
    }
}

impl Step for DatabaseBackupStep {
    fn descriptor(&self) -> StepDescriptor {
        StepDescriptor {
            name: Self::NAME,
            can_skip: true,
            can_cleanup: true,
            required_keys: vec![BACKUP_DIR, CRON_DIR, DB_NAME, DB_USER, BACKUP_SCHEDULE],
        }
    }

    fn check_completed(&self) -> bool {
        // Presence plus the managed-file marker; a foreign file with our
        // name does not count as done.
        let path = Self::cron_path(self.stored.get_or("CRON_DIR", DEFAULT_CRON_DIR));
        match std::fs::read_to_string(&path) {
            Ok(content) => content.contains("managed by palisade") && content.contains("pg_dump"),
            Err(_) => false,
        }
    }

    fn execute(&self, ctx: &ExecutionContext) -> Result<()> {
        let backup_dir = ctx.require("BACKUP_DIR")?;
        std::fs::create_dir_all(backup_dir)?;

        let content = Self::render(
            ctx.require("BACKUP_SCHEDULE")?,
            ctx.require("DB_USER")?,
            ctx.require("DB_NAME")?,
            backup_dir,
        );
        let path = Self::cron_path(ctx.require("CRON_DIR")?);
        std::fs::write(&path, content)?;
        set_cron_permissions(&path)?;
        tracing::info!("Installed backup schedule at {}", path.display());
        Ok(())
    }

    fn rollback(&self) -> bool {
        let path = Self::cron_path(self.stored.get_or("CRON_DIR", DEFAULT_CRON_DIR));
        if !path.exists() {
            return true;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Could not remove {}: {}", path.display(), e);
                false
            }
        }
    }
}

// Cron ignores drop-ins that are group- or world-writable.
#[cfg(unix)]
fn set_cron_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_cron_permissions(_path: &Path) -> Result<()> {
    Ok(())
}
