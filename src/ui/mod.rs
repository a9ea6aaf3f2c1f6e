//! Terminal output and the interactive prompting boundary.
//!
//! Collecting a missing configuration value from the operator is the only
//! interactive part of the engine. It sits behind the [`Prompter`] trait so
//! the resolver can be exercised in tests with [`MockPrompter`] and run
//! headless with [`NonInteractivePrompter`].

pub mod mock;
pub mod prompter;

pub use mock::MockPrompter;
pub use prompter::{NonInteractivePrompter, TerminalPrompter};

use crate::config::ConfigKeySpec;
use crate::error::Result;

/// Boundary for interactive collection of configuration values.
pub trait Prompter {
    /// Ask the operator for a value.
    ///
    /// Returns `Ok(None)` when prompting is unavailable (headless run); the
    /// resolver turns that into `MissingRequiredConfig` for mandatory keys.
    fn prompt_value(&mut self, key: &ConfigKeySpec) -> Result<Option<String>>;

    /// Whether this prompter can actually talk to an operator.
    fn is_interactive(&self) -> bool;
}

/// Styled status line for CLI output.
pub fn status_line(ok: bool, label: &str, detail: &str) -> String {
    let mark = if ok {
        console::style("✓").green()
    } else {
        console::style("✗").red()
    };
    format!("{} {}: {}", mark, console::style(label).bold(), detail)
}
