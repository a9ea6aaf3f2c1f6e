//! Mock prompter for tests.

use crate::config::ConfigKeySpec;
use crate::error::Result;
use crate::ui::Prompter;
use std::collections::HashMap;

/// Scripted prompter: answers from preset values, records what was asked.
#[derive(Debug, Default)]
pub struct MockPrompter {
    responses: HashMap<String, String>,
    asked: Vec<String>,
}

impl MockPrompter {
    /// Create a prompter with no preset answers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset the answer for a key.
    pub fn set_response(&mut self, key: &str, value: &str) {
        self.responses.insert(key.to_string(), value.to_string());
    }

    /// Keys the resolver asked for, in order.
    pub fn asked(&self) -> &[String] {
        &self.asked
    }
}

impl Prompter for MockPrompter {
    fn prompt_value(&mut self, key: &ConfigKeySpec) -> Result<Option<String>> {
        self.asked.push(key.name.to_string());
        Ok(self.responses.get(key.name).cloned())
    }

    fn is_interactive(&self) -> bool {
        true
    }
}
