//! Persisted `KEY=VALUE` configuration store.
//!
//! One pair per line, comments via leading `#`. Values may hold credentials,
//! so the file is written with owner-only permissions.

use crate::error::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File-backed store for resolved configuration values.
///
/// # Supported Formats
///
/// - Simple: `KEY=value`
/// - Quoted: `KEY="value with spaces"` or `KEY='single quoted'`
/// - Empty: `KEY=`
/// - Comments: `# This is a comment`
/// - Whitespace around equals: `KEY = value`
/// - Values with equals signs: `URL=https://example.com?foo=bar`
#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl EnvStore {
    /// Load a store from `path`, or start empty if the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let values = if path.exists() {
            Self::parse(&std::fs::read_to_string(path)?)
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    /// Parse store content into a key-value map.
    pub fn parse(content: &str) -> BTreeMap<String, String> {
        let mut values = BTreeMap::new();

        for line in content.lines() {
            let line = line.trim();

            // Skip empty lines and comments
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = Self::parse_line(line) {
                values.insert(key, value);
            }
        }

        values
    }

    fn parse_line(line: &str) -> Option<(String, String)> {
        let eq_pos = line.find('=')?;
        let key = line[..eq_pos].trim().to_string();
        let value = Self::unquote(line[eq_pos + 1..].trim());
        Some((key, value))
    }

    fn unquote(value: &str) -> String {
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value[1..value.len() - 1].to_string()
        } else {
            value.to_string()
        }
    }

    /// Get a stored value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Set a value in memory. Not persisted until [`EnvStore::save`].
    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    /// Snapshot of the current values.
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    /// Path the store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the store to disk with owner-only permissions.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut content = String::from("# Palisade configuration. May contain credentials, keep permissions tight.\n");
        for (key, value) in &self.values {
            content.push_str(key);
            content.push('=');
            content.push_str(value);
            content.push('\n');
        }
        std::fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}
