//! Configuration key declarations and the resolved execution context.

use crate::error::{PalisadeError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Declaration of one configuration key a step requires.
///
/// A key without a default is mandatory user input: resolution aborts the run
/// if it cannot be obtained from any source.
#[derive(Debug, Clone)]
pub struct ConfigKeySpec {
    /// Key name, e.g. `TLS_DOMAINS`.
    pub name: &'static str,
    /// Question shown when the key must be collected interactively.
    pub prompt: &'static str,
    /// Value used (and persisted) when no source provides the key.
    pub default: Option<&'static str>,
    /// Masks terminal input and keeps the value out of summaries.
    pub secret: bool,
}

impl ConfigKeySpec {
    /// A key with a default value.
    pub const fn with_default(name: &'static str, prompt: &'static str, default: &'static str) -> Self {
        Self {
            name,
            prompt,
            default: Some(default),
            secret: false,
        }
    }

    /// A mandatory key with no default.
    pub const fn required(name: &'static str, prompt: &'static str) -> Self {
        Self {
            name,
            prompt,
            default: None,
            secret: false,
        }
    }

    /// A mandatory secret key (prompted with masked input).
    pub const fn secret(name: &'static str, prompt: &'static str) -> Self {
        Self {
            name,
            prompt,
            default: None,
            secret: true,
        }
    }
}

/// Fully resolved configuration values for one step's execute phase.
///
/// Immutable once constructed; steps read from it instead of the process
/// environment, which keeps execute bodies testable with a prebuilt context.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    values: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Build a context from already-resolved values.
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up a value, erroring when absent.
    ///
    /// Resolution is total before execute is invoked, so a miss here means a
    /// step asked for a key it never declared.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| PalisadeError::MissingRequiredConfig {
            key: key.to_string(),
        })
    }

    /// Look up a value with a fallback.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }
}

/// Read-only snapshot of the persisted store, taken at startup.
///
/// `check_completed` runs before per-step resolution, so idempotence probes
/// read identity configuration (domains, install paths) from here. Values a
/// fresh host has not collected yet are simply absent, and probes treat that
/// as "not completed".
#[derive(Debug, Clone, Default)]
pub struct StoredConfig {
    values: Arc<BTreeMap<String, String>>,
}

impl StoredConfig {
    /// Snapshot the given values.
    pub fn new(values: BTreeMap<String, String>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Look up a value with a fallback.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }
}
