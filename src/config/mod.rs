//! Configuration resolution and the persisted key-value store.
//!
//! Steps declare the keys they need as [`ConfigKeySpec`]s; the
//! [`EnvironmentResolver`] turns those declarations into an immutable
//! [`ExecutionContext`] before a step's execute phase runs. A step's business
//! logic never queries the process environment itself.

pub mod keys;
pub mod resolver;
pub mod store;

pub use keys::{ConfigKeySpec, ExecutionContext, StoredConfig};
pub use resolver::EnvironmentResolver;
pub use store::EnvStore;
