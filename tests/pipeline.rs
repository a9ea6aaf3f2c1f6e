//! End-to-end pipeline scenarios over mock capabilities.

use palisade::config::{EnvStore, EnvironmentResolver, StoredConfig};
use palisade::orchestrator::summary::{SummaryGenerator, SUMMARY_FILE};
use palisade::orchestrator::StepOrchestrator;
use palisade::step::registry::build_pipeline;
use palisade::step::StepOutcome;
use palisade::steps::StepContext;
use palisade::system::{
    ContainerRuntime, MockCertificateIssuer, MockConfigLoader, MockContainerRuntime,
    MockPackageManager, MockServiceManager,
};
use palisade::ui::MockPrompter;
use palisade::validation::ValidationGate;
use palisade::vault::BackupVault;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const SERVER_TEMPLATE: &str = "\
name: ${SERVER_NAME}
image: ${IDENTITY_IMAGE}
env:
  KC_DB_URL_HOST: ${DB_HOST}
";

/// Self-signed PEM cert + key for `domains`, expiring `days` from now.
fn mint(domains: &[&str], days: i64) -> (String, String) {
    let mut params = rcgen::CertificateParams::new(
        domains.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
    )
    .unwrap();
    params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = params.self_signed(&key).unwrap();
    (cert.pem(), key.serialize_pem())
}

/// CA-signed bundle (leaf + CA) and leaf key; passes chain verification.
fn mint_chained(domains: &[&str], days: i64) -> (String, String) {
    let ca_key = rcgen::KeyPair::generate().unwrap();
    let mut ca_params = rcgen::CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let mut params = rcgen::CertificateParams::new(
        domains.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
    )
    .unwrap();
    params.not_after = time::OffsetDateTime::now_utc() + time::Duration::days(days);
    let key = rcgen::KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, &ca, &ca_key).unwrap();
    (format!("{}{}", cert.pem(), ca.pem()), key.serialize_pem())
}

struct Fixture {
    temp: TempDir,
    store: EnvStore,
    values: BTreeMap<String, String>,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = EnvStore::load(&temp.path().join("palisade.env")).unwrap();
        Self {
            temp,
            store,
            values: BTreeMap::new(),
        }
    }

    fn path(&self, leaf: &str) -> std::path::PathBuf {
        self.temp.path().join(leaf)
    }

    fn set(&mut self, key: &str, value: &str) {
        self.store.set(key, value);
        self.values.insert(key.to_string(), value.to_string());
    }

    fn seed_defaults(&mut self) {
        let cert_dir = self.path("certs").display().to_string();
        let source_root = self.path("issued").display().to_string();
        let summary_dir = self.path("state").display().to_string();
        self.set("TLS_DOMAINS", "id.example.com");
        self.set("ADMIN_EMAIL", "ops@example.com");
        self.set("CERT_DIR", &cert_dir);
        self.set("CERT_SOURCE_ROOT", &source_root);
        self.set("SUMMARY_DIR", &summary_dir);
        self.set("DB_PASSWORD", "db-secret");
        self.set("IDENTITY_ADMIN_PASSWORD", "admin-secret");
        self.set("HEALTH_TIMEOUT_SECS", "1");
    }

    fn context(
        &self,
        runtime: Arc<MockContainerRuntime>,
        issuer: Arc<MockCertificateIssuer>,
    ) -> StepContext {
        StepContext {
            stored: StoredConfig::new(self.values.clone()),
            packages: Arc::new(MockPackageManager::with_installed(&[
                "ca-certificates",
                "curl",
                "gnupg",
                "ufw",
                "fail2ban",
                "docker.io",
            ])),
            services: Arc::new(MockServiceManager::new()),
            containers: runtime,
            issuer,
            loader: Arc::new(
                MockConfigLoader::new().with_template("identity-server.yml", SERVER_TEMPLATE),
            ),
            vault: BackupVault::new(&self.path("vault")),
            gate: ValidationGate::new(),
        }
    }

    fn run(&mut self, orchestrator: &StepOrchestrator) -> palisade::orchestrator::RunResult {
        self.run_prompted(orchestrator, &[])
    }

    fn run_prompted(
        &mut self,
        orchestrator: &StepOrchestrator,
        responses: &[(&str, &str)],
    ) -> palisade::orchestrator::RunResult {
        let mut prompter = MockPrompter::new();
        for (key, value) in responses {
            prompter.set_response(key, value);
        }
        let mut resolver = EnvironmentResolver::new(&mut self.store, &mut prompter);
        orchestrator.execute(&mut resolver)
    }
}

fn write_artifacts(dir: &Path, cert: &str, key: &str) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("fullchain.pem"), cert).unwrap();
    std::fs::write(dir.join("privkey.pem"), key).unwrap();
}

/// The flagship recovery scenario: the network comes up, certificate
/// issuance fails, a valid prior snapshot is restored, and the server
/// still deploys against the restored certificate.
#[test]
fn issuance_failure_recovers_and_the_stack_deploys() {
    let mut fixture = Fixture::new();
    fixture.seed_defaults();

    // A valid certificate from an earlier run sits in the vault; the
    // installed copy is gone.
    let (good_cert, good_key) = mint(&["id.example.com"], 90);
    let cert_dir = fixture.path("certs");
    write_artifacts(&cert_dir, &good_cert, &good_key);
    let vault = BackupVault::new(&fixture.path("vault"));
    vault
        .create_backup(
            "certificate",
            &[cert_dir.join("fullchain.pem"), cert_dir.join("privkey.pem")],
            BTreeMap::new(),
        )
        .unwrap()
        .unwrap();
    std::fs::remove_file(cert_dir.join("fullchain.pem")).unwrap();
    std::fs::remove_file(cert_dir.join("privkey.pem")).unwrap();

    let runtime = Arc::new(MockContainerRuntime::new());
    let issuer = Arc::new(MockCertificateIssuer::failing("rate limited"));
    let ctx = fixture.context(runtime.clone(), issuer.clone());

    let mut orchestrator = StepOrchestrator::new();
    for step in
        build_pipeline(&["container_runtime", "certificate", "identity_server"], &ctx).unwrap()
    {
        orchestrator.add_step(step);
    }
    let generator = SummaryGenerator::new(ctx.stored.clone(), ctx.vault.clone(), ctx.gate);
    let orchestrator =
        orchestrator.with_finalizer(Box::new(move |result| generator.write(result).map(|_| ())));

    let result = fixture.run(&orchestrator);

    assert!(result.success);
    assert_eq!(
        result.outcome_of("container_runtime"),
        Some(StepOutcome::Succeeded)
    );
    assert_eq!(result.outcome_of("certificate"), Some(StepOutcome::Succeeded));
    assert_eq!(
        result.outcome_of("identity_server"),
        Some(StepOutcome::Succeeded)
    );

    // Issuance was attempted exactly once, and the restored artifact is the
    // known-good one.
    assert_eq!(issuer.call_count(), 1);
    let installed = std::fs::read_to_string(cert_dir.join("fullchain.pem")).unwrap();
    assert_eq!(installed, good_cert);

    // Network and containers are in place.
    assert!(!runtime.networks().is_empty());
    assert!(runtime
        .container_names()
        .contains(&"idserver".to_string()));

    // Finalization wrote the summary.
    assert!(fixture.path("state").join(SUMMARY_FILE).exists());
}

#[test]
fn first_failure_halts_the_pipeline() {
    let mut fixture = Fixture::new();
    fixture.seed_defaults();

    let runtime = Arc::new(MockContainerRuntime::unreachable());
    let issuer = Arc::new(MockCertificateIssuer::new());
    let ctx = fixture.context(runtime, issuer.clone());

    let mut orchestrator = StepOrchestrator::new();
    for step in
        build_pipeline(&["container_runtime", "certificate", "identity_server"], &ctx).unwrap()
    {
        orchestrator.add_step(step);
    }

    let result = fixture.run(&orchestrator);

    assert!(!result.success);
    assert_eq!(result.records.len(), 1);
    assert_eq!(
        result.outcome_of("container_runtime"),
        Some(StepOutcome::RolledBack)
    );
    // Later steps were never attempted.
    assert_eq!(result.outcome_of("certificate"), None);
    assert_eq!(issuer.call_count(), 0);
}

/// A key first collected at the prompt must show up in the post-run summary:
/// the finalizer reloads the persisted store instead of reusing the startup
/// snapshot, which predates the prompt.
#[test]
fn prompted_values_reach_the_post_run_summary() {
    let mut fixture = Fixture::new();
    // Everything except the domains, which only the prompter can supply.
    let cert_dir = fixture.path("certs").display().to_string();
    let source_root = fixture.path("issued").display().to_string();
    let summary_dir = fixture.path("state").display().to_string();
    fixture.set("ADMIN_EMAIL", "ops@example.com");
    fixture.set("CERT_DIR", &cert_dir);
    fixture.set("CERT_SOURCE_ROOT", &source_root);
    fixture.set("SUMMARY_DIR", &summary_dir);

    let (cert, key) = mint_chained(&["id.example.com"], 90);
    let issued_dir = fixture.path("issued").join("id.example.com");
    let issuer = Arc::new(MockCertificateIssuer::producing(vec![
        (issued_dir.join("fullchain.pem"), cert),
        (issued_dir.join("privkey.pem"), key),
    ]));
    let runtime = Arc::new(MockContainerRuntime::new());
    let ctx = fixture.context(runtime, issuer);

    let mut orchestrator = StepOrchestrator::new();
    for step in build_pipeline(&["certificate"], &ctx).unwrap() {
        orchestrator.add_step(step);
    }
    // Same wiring as deploy: reload the store file inside the finalizer.
    let env_file = fixture.path("palisade.env");
    let vault = ctx.vault.clone();
    let gate = ctx.gate;
    let orchestrator = orchestrator.with_finalizer(Box::new(move |result| {
        let store = EnvStore::load(&env_file)?;
        SummaryGenerator::new(StoredConfig::new(store.values().clone()), vault.clone(), gate)
            .write(result)
            .map(|_| ())
    }));

    let result = fixture.run_prompted(&orchestrator, &[("TLS_DOMAINS", "id.example.com")]);
    assert!(result.success);

    let summary = std::fs::read_to_string(fixture.path("state").join(SUMMARY_FILE)).unwrap();
    assert!(summary.contains("id.example.com"));
    assert!(summary.contains("Status: valid"));
}

#[test]
fn a_fully_provisioned_host_skips_everything() {
    let mut fixture = Fixture::new();
    fixture.seed_defaults();
    let cron_dir = fixture.path("cron").display().to_string();
    fixture.set("CRON_DIR", &cron_dir);
    std::fs::create_dir_all(fixture.path("cron")).unwrap();

    // Valid installed certificate (CA-signed so the chain verifies too).
    let (cert, key) = mint_chained(&["id.example.com"], 90);
    write_artifacts(&fixture.path("certs"), &cert, &key);

    // Managed cron drop-in already installed.
    std::fs::write(
        fixture.path("cron").join("palisade-db-backup"),
        "# Nightly database dump, managed by palisade. Do not edit.\n\
         15 3 * * * root docker exec idserver-db pg_dump -U idserver idserver\n",
    )
    .unwrap();

    // Network exists and both containers are already healthy.
    let runtime = Arc::new(MockContainerRuntime::new());
    runtime
        .ensure_network(&palisade::system::NetworkSpec {
            name: "idserver-net".to_string(),
        })
        .unwrap();
    runtime.set_health("idserver-db", palisade::system::HealthStatus::Healthy);
    runtime.set_health("idserver", palisade::system::HealthStatus::Healthy);

    let issuer = Arc::new(MockCertificateIssuer::new());
    let ctx = fixture.context(runtime, issuer.clone());

    let mut orchestrator = StepOrchestrator::new();
    for step in build_pipeline(
        &[
            "system_prepare",
            "container_runtime",
            "certificate",
            "identity_server",
            "database_backup",
        ],
        &ctx,
    )
    .unwrap()
    {
        orchestrator.add_step(step);
    }

    let result = fixture.run(&orchestrator);

    assert!(result.success);
    for record in &result.records {
        assert_eq!(record.outcome, StepOutcome::Skipped, "{}", record.step_name);
    }
    assert_eq!(issuer.call_count(), 0);
}
