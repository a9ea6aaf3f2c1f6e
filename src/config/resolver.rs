//! Environment resolution for step execution.
//!
//! Source order per key: process environment → persisted store → declared
//! default → interactive prompt. Newly collected values (defaults included)
//! are persisted so a retried run does not re-ask. Persistence is
//! all-or-nothing per resolve call: a mandatory key that cannot be resolved
//! aborts before anything is written to the store.

use crate::config::{ConfigKeySpec, EnvStore, ExecutionContext};
use crate::error::{PalisadeError, Result};
use crate::ui::Prompter;
use std::collections::BTreeMap;

/// Resolves the configuration keys a step declares as required.
pub struct EnvironmentResolver<'a> {
    store: &'a mut EnvStore,
    prompter: &'a mut dyn Prompter,
}

impl<'a> EnvironmentResolver<'a> {
    /// Create a resolver over the persisted store and prompting boundary.
    pub fn new(store: &'a mut EnvStore, prompter: &'a mut dyn Prompter) -> Self {
        Self { store, prompter }
    }

    /// Resolve all keys into an immutable [`ExecutionContext`].
    ///
    /// Fails fast with [`PalisadeError::MissingRequiredConfig`] when a key
    /// with no default cannot be obtained from any source.
    pub fn resolve(&mut self, keys: &[ConfigKeySpec]) -> Result<ExecutionContext> {
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        let mut newly_collected: Vec<(String, String)> = Vec::new();

        for key in keys {
            if let Ok(value) = std::env::var(key.name) {
                resolved.insert(key.name.to_string(), value);
                continue;
            }

            if let Some(value) = self.store.get(key.name) {
                resolved.insert(key.name.to_string(), value.to_string());
                continue;
            }

            if let Some(default) = key.default {
                tracing::debug!("Using default for {}", key.name);
                resolved.insert(key.name.to_string(), default.to_string());
                newly_collected.push((key.name.to_string(), default.to_string()));
                continue;
            }

            match self.prompter.prompt_value(key)? {
                Some(value) => {
                    resolved.insert(key.name.to_string(), value.clone());
                    newly_collected.push((key.name.to_string(), value));
                }
                None => {
                    return Err(PalisadeError::MissingRequiredConfig {
                        key: key.name.to_string(),
                    });
                }
            }
        }

        if !newly_collected.is_empty() {
            for (name, value) in &newly_collected {
                self.store.set(name, value);
            }
            self.store.save()?;
        }

        Ok(ExecutionContext::new(resolved))
    }
}
