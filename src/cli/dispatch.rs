//! Command dispatch: wire capabilities, build the pipeline, run it.

use crate::cli::args::{Cli, Commands, DeployArgs, StatusArgs};
use crate::config::{EnvStore, EnvironmentResolver, StoredConfig};
use crate::error::Result;
use crate::orchestrator::summary::SummaryGenerator;
use crate::orchestrator::{RunRecord, RunResult, StepOrchestrator};
use crate::step::registry::{self, DEFAULT_PIPELINE};
use crate::step::StepOutcome;
use crate::steps::StepContext;
use crate::system::{
    AptPackageManager, CertbotIssuer, DockerCli, SystemdServiceManager, YamlTemplateLoader,
};
use crate::ui::{status_line, NonInteractivePrompter, Prompter, TerminalPrompter};
use crate::validation::ValidationGate;
use crate::vault::BackupVault;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// One row of the `status --json` report.
#[derive(Serialize)]
struct StepStatus {
    step: &'static str,
    completed: bool,
}

/// Routes parsed arguments to command handlers.
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Run the selected command; the return value is the process exit code.
    pub fn dispatch(cli: &Cli) -> Result<i32> {
        match &cli.command {
            Some(Commands::Deploy(args)) => deploy(cli, args),
            Some(Commands::Status(args)) => status(cli, args),
            Some(Commands::Summary(args)) => summary(cli, args),
            None => deploy(cli, &DeployArgs::default_args()),
        }
    }
}

impl DeployArgs {
    fn default_args() -> Self {
        Self {
            steps: Vec::new(),
            vault_dir: "/var/lib/palisade/backups".into(),
            template_dir: "/etc/palisade/templates".into(),
        }
    }
}

/// Capabilities wired to the real host tooling.
fn host_context(store: &EnvStore, args: &DeployArgs) -> StepContext {
    StepContext {
        stored: StoredConfig::new(store.values().clone()),
        packages: Arc::new(AptPackageManager),
        services: Arc::new(SystemdServiceManager),
        containers: Arc::new(DockerCli),
        issuer: Arc::new(CertbotIssuer),
        loader: Arc::new(YamlTemplateLoader::new(args.template_dir.clone())),
        vault: BackupVault::new(&args.vault_dir),
        gate: ValidationGate::new(),
    }
}

fn make_prompter(cli: &Cli) -> Box<dyn Prompter> {
    if cli.non_interactive {
        Box::new(NonInteractivePrompter)
    } else {
        Box::new(TerminalPrompter)
    }
}

fn pipeline_names(args: &DeployArgs) -> Vec<&str> {
    if args.steps.is_empty() {
        DEFAULT_PIPELINE.to_vec()
    } else {
        args.steps.iter().map(String::as_str).collect()
    }
}

fn deploy(cli: &Cli, args: &DeployArgs) -> Result<i32> {
    let mut store = EnvStore::load(&cli.env_file)?;
    let ctx = host_context(&store, args);

    let mut orchestrator = StepOrchestrator::new();
    for step in registry::build_pipeline(&pipeline_names(args), &ctx)? {
        orchestrator.add_step(step);
    }
    // The resolver persists values collected during the run, so the summary
    // reloads the store instead of using the startup snapshot.
    let env_file = cli.env_file.clone();
    let vault = ctx.vault.clone();
    let gate = ctx.gate;
    let orchestrator = orchestrator.with_finalizer(Box::new(move |result| {
        let store = EnvStore::load(&env_file)?;
        SummaryGenerator::new(StoredConfig::new(store.values().clone()), vault.clone(), gate)
            .write(result)
            .map(|_| ())
    }));

    let mut prompter = make_prompter(cli);
    let mut resolver = EnvironmentResolver::new(&mut store, prompter.as_mut());
    let result = orchestrator.execute(&mut resolver);

    if !cli.quiet {
        for record in &result.records {
            let detail = record.reason.as_deref().unwrap_or(record.outcome.label());
            println!(
                "{}",
                status_line(!record.outcome.is_failure(), &record.step_name, detail)
            );
        }
    }

    Ok(if result.success { 0 } else { 1 })
}

fn status(cli: &Cli, args: &StatusArgs) -> Result<i32> {
    let store = EnvStore::load(&cli.env_file)?;
    let ctx = host_context(&store, &args.deploy);
    let pipeline = registry::build_pipeline(&pipeline_names(&args.deploy), &ctx)?;

    if args.json {
        let report: Vec<StepStatus> = pipeline
            .iter()
            .map(|step| StepStatus {
                step: step.descriptor().name,
                completed: step.check_completed(),
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&report).map_err(anyhow::Error::from)?
        );
        return Ok(0);
    }

    for step in &pipeline {
        let completed = step.check_completed();
        let detail = if completed { "completed" } else { "pending" };
        println!("{}", status_line(completed, step.descriptor().name, detail));
    }
    Ok(0)
}

/// Rebuild the installation summary from what the host looks like right now.
fn summary(cli: &Cli, args: &DeployArgs) -> Result<i32> {
    let store = EnvStore::load(&cli.env_file)?;
    let ctx = host_context(&store, args);
    let pipeline = registry::build_pipeline(&pipeline_names(args), &ctx)?;

    let records = pipeline
        .iter()
        .map(|step| {
            let completed = step.check_completed();
            RunRecord {
                step_name: step.descriptor().name.to_string(),
                outcome: if completed {
                    StepOutcome::Succeeded
                } else {
                    StepOutcome::Failed
                },
                reason: (!completed).then(|| "not provisioned on this host".to_string()),
            }
        })
        .collect::<Vec<_>>();
    let success = records.iter().all(|r| r.outcome == StepOutcome::Succeeded);
    let result = RunResult {
        records,
        success,
        duration: Duration::ZERO,
    };

    let generator = SummaryGenerator::new(ctx.stored.clone(), ctx.vault.clone(), ctx.gate);
    let path = generator.write(&result)?;
    if !cli.quiet {
        println!("Summary written to {}", path.display());
    }
    Ok(0)
}
