//! Shell command execution and bounded polling.
//!
//! Host tooling (`apt-get`, `systemctl`, `docker`, `certbot`, `ufw`) is
//! reached through [`execute`]; provisioning steps never spawn processes
//! directly. [`wait_until`] is the only "waiting" primitive in the system:
//! a probe-then-sleep loop with a hard deadline, so a stuck collaborator
//! becomes a step failure instead of an indefinite hang.

use crate::error::{PalisadeError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Result of executing a shell command.
#[derive(Debug, Clone)]
pub struct CommandResult {
    /// Exit code (None if killed by signal).
    pub exit_code: Option<i32>,

    /// Standard output.
    pub stdout: String,

    /// Standard error.
    pub stderr: String,

    /// Execution duration.
    pub duration: Duration,

    /// Whether the command succeeded (exit code 0).
    pub success: bool,
}

/// Options for command execution.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    /// Working directory.
    pub cwd: Option<PathBuf>,

    /// Environment variables (merged with the process env).
    pub env: HashMap<String, String>,

    /// Capture output (if false, inherits from parent).
    pub capture: bool,
}

/// Execute a command with arguments.
///
/// Returns `Ok` with a failure-marked [`CommandResult`] for a non-zero exit;
/// `Err` only when the process could not be spawned at all.
pub fn execute(program: &str, args: &[&str], options: &CommandOptions) -> Result<CommandResult> {
    let start = Instant::now();

    let mut cmd = Command::new(program);
    cmd.args(args);

    if let Some(cwd) = &options.cwd {
        cmd.current_dir(cwd);
    }

    for (key, value) in &options.env {
        cmd.env(key, value);
    }

    if options.capture {
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
    } else {
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());
    }

    let rendered = render(program, args);
    tracing::debug!("Running command: {}", rendered);

    let output = cmd.output().map_err(|_| PalisadeError::CommandFailed {
        command: rendered,
        code: None,
    })?;

    Ok(CommandResult {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        duration: start.elapsed(),
        success: output.status.success(),
    })
}

/// Execute a command and return plain success/failure.
pub fn execute_check(program: &str, args: &[&str]) -> bool {
    let options = CommandOptions {
        capture: true,
        ..Default::default()
    };
    execute(program, args, &options)
        .map(|r| r.success)
        .unwrap_or(false)
}

/// Execute a command, converting a non-zero exit into an error.
pub fn execute_ok(program: &str, args: &[&str]) -> Result<CommandResult> {
    let options = CommandOptions {
        capture: true,
        ..Default::default()
    };
    let result = execute(program, args, &options)?;
    if result.success {
        Ok(result)
    } else {
        tracing::error!(
            "Command failed: {} ({})",
            render(program, args),
            result.stderr.trim()
        );
        Err(PalisadeError::CommandFailed {
            command: render(program, args),
            code: result.exit_code,
        })
    }
}

/// Check whether a program is available on PATH.
pub fn command_exists(program: &str) -> bool {
    execute_check("which", &[program])
}

/// Poll `probe` until it returns true or `timeout` elapses.
///
/// Sleeps `interval` between probes. Returns false once the deadline passes;
/// callers treat that as a step failure, never as a reason to keep waiting.
pub fn wait_until(timeout: Duration, interval: Duration, mut probe: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if probe() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(interval);
    }
}

fn render(program: &str, args: &[&str]) -> String {
    let mut rendered = String::from(program);
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_captures_stdout() {
        let options = CommandOptions {
            capture: true,
            ..Default::default()
        };
        let result = execute("echo", &["hello"], &options).unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[test]
    fn execute_reports_nonzero_exit() {
        let options = CommandOptions {
            capture: true,
            ..Default::default()
        };
        let result = execute("sh", &["-c", "exit 3"], &options).unwrap();
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
    }

    #[test]
    fn execute_spawn_failure_is_error() {
        let options = CommandOptions::default();
        let result = execute("definitely-not-a-real-binary-xyz", &[], &options);
        assert!(result.is_err());
    }

    #[test]
    fn execute_check_true_on_success() {
        assert!(execute_check("true", &[]));
        assert!(!execute_check("false", &[]));
    }

    #[test]
    fn execute_ok_converts_failure_to_error() {
        let err = execute_ok("sh", &["-c", "exit 2"]).unwrap_err();
        match err {
            PalisadeError::CommandFailed { code, .. } => assert_eq!(code, Some(2)),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn execute_passes_env() {
        let mut env = HashMap::new();
        env.insert("PALISADE_TEST_VAR".to_string(), "marker".to_string());
        let options = CommandOptions {
            env,
            capture: true,
            ..Default::default()
        };
        let result = execute("sh", &["-c", "echo $PALISADE_TEST_VAR"], &options).unwrap();
        assert_eq!(result.stdout.trim(), "marker");
    }

    #[test]
    fn wait_until_succeeds_before_deadline() {
        let mut calls = 0;
        let ok = wait_until(Duration::from_secs(1), Duration::from_millis(1), || {
            calls += 1;
            calls >= 3
        });
        assert!(ok);
        assert_eq!(calls, 3);
    }

    #[test]
    fn wait_until_times_out() {
        let start = Instant::now();
        let ok = wait_until(Duration::from_millis(20), Duration::from_millis(5), || false);
        assert!(!ok);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }
}
