//! Shared fixtures for step tests.

use crate::config::{EnvStore, EnvironmentResolver, StoredConfig};
use crate::step::{run_step, Step, StepReport};
use crate::steps::StepContext;
use crate::system::{
    MockCertificateIssuer, MockConfigLoader, MockContainerRuntime, MockPackageManager,
    MockServiceManager,
};
use crate::ui::MockPrompter;
use crate::validation::ValidationGate;
use crate::vault::BackupVault;
use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A [`StepContext`] plus the temp directory backing its vault.
///
/// The directory is removed when the fixture drops, so tests never leave
/// vault directories behind. Derefs to the context so call sites can pass
/// `&ctx` straight to step constructors.
pub struct TestContext {
    ctx: StepContext,
    vault_dir: TempDir,
}

impl TestContext {
    pub fn vault_root(&self) -> &Path {
        self.vault_dir.path()
    }
}

impl Deref for TestContext {
    type Target = StepContext;

    fn deref(&self) -> &StepContext {
        &self.ctx
    }
}

impl DerefMut for TestContext {
    fn deref_mut(&mut self) -> &mut StepContext {
        &mut self.ctx
    }
}

/// A context wired entirely to mocks, customized by the caller.
///
/// Step tests that care about vault contents build their own vault instead.
pub fn context_with(customize: impl FnOnce(&mut StepContext)) -> TestContext {
    let vault_dir = TempDir::new().unwrap();
    let mut ctx = StepContext {
        stored: StoredConfig::default(),
        packages: Arc::new(MockPackageManager::new()),
        services: Arc::new(MockServiceManager::new()),
        containers: Arc::new(MockContainerRuntime::new()),
        issuer: Arc::new(MockCertificateIssuer::new()),
        loader: Arc::new(MockConfigLoader::new()),
        vault: BackupVault::new(vault_dir.path()),
        gate: ValidationGate::new(),
    };
    customize(&mut ctx);
    TestContext { ctx, vault_dir }
}

/// Snapshot a value map into a [`StoredConfig`].
pub fn stored(pairs: &[(&str, &str)]) -> StoredConfig {
    let values: BTreeMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    StoredConfig::new(values)
}

/// Run one step against a fresh store and a silent prompter.
pub fn run_in(step: &dyn Step) -> StepReport {
    let temp = TempDir::new().unwrap();
    let mut store = EnvStore::load(&temp.path().join("test.env")).unwrap();
    let mut prompter = MockPrompter::new();
    let mut resolver = EnvironmentResolver::new(&mut store, &mut prompter);
    run_step(step, &mut resolver)
}

/// Run one step with preset store values.
pub fn run_with_store(step: &dyn Step, pairs: &[(&str, &str)]) -> StepReport {
    let temp = TempDir::new().unwrap();
    let mut store = EnvStore::load(&temp.path().join("test.env")).unwrap();
    for (key, value) in pairs {
        store.set(key, value);
    }
    let mut prompter = MockPrompter::new();
    let mut resolver = EnvironmentResolver::new(&mut store, &mut prompter);
    run_step(step, &mut resolver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropped_context_removes_its_vault_dir() {
        let root = {
            let ctx = context_with(|_| {});
            ctx.vault_root().to_path_buf()
        };
        assert!(!root.exists());
    }
}
