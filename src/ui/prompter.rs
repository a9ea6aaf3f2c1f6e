//! Terminal prompting via dialoguer.

use crate::config::ConfigKeySpec;
use crate::error::Result;
use crate::ui::Prompter;
use anyhow::Context;
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password};

/// Interactive prompter backed by the controlling terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_value(&mut self, key: &ConfigKeySpec) -> Result<Option<String>> {
        let theme = ColorfulTheme::default();

        let value = if key.secret {
            Password::with_theme(&theme)
                .with_prompt(key.prompt)
                .interact()
                .with_context(|| format!("Failed to read value for {}", key.name))?
        } else {
            let mut input = Input::<String>::with_theme(&theme).with_prompt(key.prompt);
            if let Some(default) = key.default {
                input = input.default(default.to_string());
            }
            input
                .interact_text()
                .with_context(|| format!("Failed to read value for {}", key.name))?
        };

        Ok(Some(value))
    }

    fn is_interactive(&self) -> bool {
        console::user_attended()
    }
}

/// Prompter for headless runs: never asks, never answers.
#[derive(Debug, Default)]
pub struct NonInteractivePrompter;

impl Prompter for NonInteractivePrompter {
    fn prompt_value(&mut self, _key: &ConfigKeySpec) -> Result<Option<String>> {
        Ok(None)
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_interactive_prompter_returns_none() {
        let mut prompter = NonInteractivePrompter;
        let key = ConfigKeySpec::required("TLS_DOMAINS", "Domains to secure");
        assert_eq!(prompter.prompt_value(&key).unwrap(), None);
        assert!(!prompter.is_interactive());
    }
}
