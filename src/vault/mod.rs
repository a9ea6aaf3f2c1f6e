//! Point-in-time snapshots of a step's mutable state.
//!
//! Each step owns one namespace under the vault root and snapshots the files
//! it is about to mutate *before* mutating them, so a failed execute always
//! has a pre-change state to fall back to. Retention is a rotating cap:
//! eviction is strictly FIFO by creation order; validity never reorders
//! eviction, it only gates restore eligibility.
//!
//! Layout: `<root>/<namespace>/<timestamp>/` with the snapshotted files plus
//! a `backup_info.txt` metadata sidecar.

use crate::error::{PalisadeError, Result};
use crate::validation::ValidationResult;
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metadata sidecar file name; never treated as snapshot content.
const INFO_FILE: &str = "backup_info.txt";

/// Default retention cap per namespace.
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// One stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    /// ISO-sortable creation timestamp; totally orders records in a namespace.
    pub timestamp: String,
    /// Directory holding the snapshotted files.
    pub content_root: PathBuf,
    /// Caller-supplied annotations (validity at snapshot time, expiry, ...).
    pub metadata: BTreeMap<String, String>,
}

/// Rotating snapshot store, namespaced per step.
#[derive(Debug, Clone)]
pub struct BackupVault {
    root: PathBuf,
    max_backups: usize,
}

impl BackupVault {
    /// Create a vault rooted at `root` with the default retention cap.
    pub fn new(root: &Path) -> Self {
        Self::with_max_backups(root, DEFAULT_MAX_BACKUPS)
    }

    /// Create a vault with a custom retention cap.
    ///
    /// Per-step retention needs differ only by this number, never by logic.
    pub fn with_max_backups(root: &Path, max_backups: usize) -> Self {
        Self {
            root: root.to_path_buf(),
            max_backups: max_backups.max(1),
        }
    }

    /// Snapshot `content_paths` into a new timestamped record under `namespace`.
    ///
    /// Evicts oldest records first until the namespace is under the cap, then
    /// copies every existing path into the snapshot. Returns `Ok(None)` when
    /// none of the paths exist yet (nothing to protect on a fresh host).
    pub fn create_backup(
        &self,
        namespace: &str,
        content_paths: &[PathBuf],
        metadata: BTreeMap<String, String>,
    ) -> Result<Option<BackupRecord>> {
        let present: Vec<&PathBuf> = content_paths.iter().filter(|p| p.exists()).collect();
        if present.is_empty() {
            tracing::debug!("No content to snapshot for namespace '{}'", namespace);
            return Ok(None);
        }

        let ns_dir = self.root.join(namespace);
        std::fs::create_dir_all(&ns_dir)?;

        // Rotate down to cap-1 so the new record lands exactly at the cap.
        let mut existing = self.records(namespace)?;
        while existing.len() >= self.max_backups {
            let oldest = existing.remove(0);
            std::fs::remove_dir_all(&oldest.content_root)?;
            tracing::info!("Evicted old backup: {}", oldest.content_root.display());
        }

        let content_root = self.allocate_record_dir(&ns_dir)?;
        for path in &present {
            copy_recursive(path, &content_root.join(file_name(path)?))?;
        }

        let timestamp = content_root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let record = BackupRecord {
            timestamp,
            content_root: content_root.clone(),
            metadata,
        };
        write_metadata(&record)?;

        tracing::info!("Created backup at {}", content_root.display());
        Ok(Some(record))
    }

    /// All records in a namespace, oldest first.
    pub fn records(&self, namespace: &str) -> Result<Vec<BackupRecord>> {
        let ns_dir = self.root.join(namespace);
        if !ns_dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in std::fs::read_dir(&ns_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let content_root = entry.path();
            records.push(BackupRecord {
                timestamp: entry.file_name().to_string_lossy().to_string(),
                metadata: read_metadata(&content_root),
                content_root,
            });
        }

        // Timestamps are ISO-sortable, so lexicographic order is creation order.
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(records)
    }

    /// The most recent record, if any.
    pub fn latest(&self, namespace: &str) -> Result<Option<BackupRecord>> {
        Ok(self.records(namespace)?.pop())
    }

    /// Restore the most recent record onto `target_paths`.
    ///
    /// Returns false, with no partial writes, when the namespace is empty
    /// or the caller-supplied check rejects the snapshot. A known-bad backup
    /// is never silently restored.
    pub fn restore_latest(
        &self,
        namespace: &str,
        target_paths: &[PathBuf],
        validate: impl Fn(&BackupRecord) -> ValidationResult,
    ) -> bool {
        let record = match self.latest(namespace) {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::warn!("No backup to restore in namespace '{}'", namespace);
                return false;
            }
            Err(e) => {
                tracing::error!("Failed to list backups for '{}': {}", namespace, e);
                return false;
            }
        };

        let verdict = validate(&record);
        if !verdict.valid {
            tracing::error!(
                "Backup {} rejected: {}",
                record.timestamp,
                verdict.reason.as_deref().unwrap_or("unknown reason")
            );
            return false;
        }

        self.restore_record(&record, target_paths)
    }

    /// Restore a specific, caller-identified record onto `target_paths`.
    ///
    /// Used when the latest snapshot is not trustworthy. All targets must be
    /// present in the snapshot before anything is written.
    pub fn restore_record(&self, record: &BackupRecord, target_paths: &[PathBuf]) -> bool {
        let sources: Vec<(PathBuf, &PathBuf)> = match target_paths
            .iter()
            .map(|target| Ok((record.content_root.join(file_name(target)?), target)))
            .collect::<Result<Vec<_>>>()
        {
            Ok(pairs) => pairs,
            Err(e) => {
                tracing::error!("Invalid restore target: {}", e);
                return false;
            }
        };

        if let Some((missing, _)) = sources.iter().find(|(src, _)| !src.exists()) {
            tracing::error!(
                "Backup {} is missing {}; refusing partial restore",
                record.timestamp,
                missing.display()
            );
            return false;
        }

        for (source, target) in sources {
            if let Err(e) = restore_one(&source, target) {
                tracing::error!("Restore of {} failed: {}", target.display(), e);
                return false;
            }
        }

        tracing::info!("Restored from backup {}", record.timestamp);
        true
    }

    fn allocate_record_dir(&self, ns_dir: &Path) -> Result<PathBuf> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3f").to_string();
        let mut dir = ns_dir.join(&stamp);
        let mut suffix = 0u32;
        while dir.exists() {
            suffix += 1;
            dir = ns_dir.join(format!("{stamp}-{suffix}"));
        }
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name().ok_or_else(|| {
        PalisadeError::Other(anyhow::anyhow!("path has no file name: {}", path.display()))
    })
}

fn copy_recursive(source: &Path, target: &Path) -> Result<()> {
    if source.is_dir() {
        std::fs::create_dir_all(target)?;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &target.join(entry.file_name()))?;
        }
    } else {
        std::fs::copy(source, target)?;
    }
    Ok(())
}

fn restore_one(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    if source.is_dir() && target.exists() {
        std::fs::remove_dir_all(target)?;
    }
    copy_recursive(source, target)
}

fn write_metadata(record: &BackupRecord) -> Result<()> {
    let mut content = String::new();
    for (key, value) in &record.metadata {
        content.push_str(key);
        content.push_str(": ");
        content.push_str(value);
        content.push('\n');
    }
    std::fs::write(record.content_root.join(INFO_FILE), content)?;
    Ok(())
}

fn read_metadata(content_root: &Path) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    if let Ok(content) = std::fs::read_to_string(content_root.join(INFO_FILE)) {
        for line in content.lines() {
            if let Some((key, value)) = line.split_once(": ") {
                metadata.insert(key.to_string(), value.to_string());
            }
        }
    }
    metadata
}
