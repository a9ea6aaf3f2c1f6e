//! Palisade - Identity server stack provisioning.
//!
//! Palisade provisions a single-host identity-server deployment (PostgreSQL,
//! the identity server container, TLS certificates, firewall, scheduled
//! database backups) as a sequence of idempotent steps. Every step can be
//! re-run safely: completed work is detected and skipped, partial work
//! converges, and failed certificate renewals fall back to the last known
//! good snapshot.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Persisted environment store and per-step resolution
//! - [`error`] - Error types and result alias
//! - [`orchestrator`] - Sequential pipeline execution and run reporting
//! - [`shell`] - Shell command execution and bounded polling
//! - [`step`] - The step lifecycle contract and registry
//! - [`steps`] - Concrete provisioning steps
//! - [`system`] - Capability traits over host tooling, with mocks
//! - [`ui`] - Interactive prompting and terminal output
//! - [`validation`] - Certificate content and chain checks
//! - [`vault`] - Rotating pre-change snapshots
//!
//! # Example
//!
//! ```
//! use palisade::config::{ConfigKeySpec, ExecutionContext};
//! use std::collections::BTreeMap;
//!
//! // Steps declare the keys they need and read them from a resolved context.
//! let key = ConfigKeySpec::with_default("DB_PORT", "Database port", "5432");
//! assert_eq!(key.default, Some("5432"));
//!
//! let mut values = BTreeMap::new();
//! values.insert("DB_PORT".to_string(), "5432".to_string());
//! let ctx = ExecutionContext::new(values);
//! assert_eq!(ctx.get("DB_PORT"), Some("5432"));
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod shell;
pub mod step;
pub mod steps;
pub mod system;
pub mod ui;
pub mod validation;
pub mod vault;

pub use error::{PalisadeError, Result};
