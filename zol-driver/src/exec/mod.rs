//! Command execution for ZFS and iSCSI target tooling.
//!
//! Every external command goes through the [`Dispatcher`], which runs it either
//! as a local process or over a persistent SSH session depending on the driver
//! configuration. Both paths share the same contract: a list of command words
//! plus [`ExecOptions`], returning captured output or a classified [`ExecError`].

pub mod error;
pub mod local;
pub mod remote;

use std::collections::BTreeSet;
use std::sync::OnceLock;

use tracing::debug;

use crate::config::DriverConfig;

pub use error::{ExecError, Result};
pub use local::ProcessExecutor;
pub use remote::SshExecutor;

/// Exit-code policy applied to a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExitCodeCheck {
    /// Only exit code 0 succeeds
    #[default]
    Success,
    /// Any of the listed exit codes succeeds
    Codes(BTreeSet<i32>),
    /// Never fail on the exit code
    Ignore,
}

impl ExitCodeCheck {
    /// Accept any of the given exit codes.
    pub fn codes(codes: impl IntoIterator<Item = i32>) -> Self {
        Self::Codes(codes.into_iter().collect())
    }

    /// Whether a process exit code passes this policy.
    ///
    /// A process killed by a signal has no exit code and only passes `Ignore`.
    pub fn accepts(&self, code: Option<i32>) -> bool {
        match self {
            Self::Success => code == Some(0),
            Self::Codes(codes) => code.is_some_and(|c| codes.contains(&c)),
            Self::Ignore => true,
        }
    }
}

/// Per-invocation execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Escalate through the root helper (local execution only)
    pub run_as_root: bool,
    /// Exit-code policy
    pub check_exit_code: ExitCodeCheck,
}

impl ExecOptions {
    /// Options for a privileged command with the default exit-code policy.
    pub fn as_root() -> Self {
        Self {
            run_as_root: true,
            check_exit_code: ExitCodeCheck::Success,
        }
    }

    pub fn with_check(mut self, check: ExitCodeCheck) -> Self {
        self.check_exit_code = check;
        self
    }
}

/// Captured output of a command that passed its exit-code policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A strategy for running a command.
///
/// Implemented by the real process and SSH executors, by the [`Dispatcher`]
/// itself, and by any closure with the matching signature so callers can
/// supply a sandboxed executor.
pub trait Execute: Send + Sync {
    fn execute(&self, cmd: &[String], opts: &ExecOptions) -> Result<ExecOutput>;
}

impl<F> Execute for F
where
    F: Fn(&[String], &ExecOptions) -> Result<ExecOutput> + Send + Sync,
{
    fn execute(&self, cmd: &[String], opts: &ExecOptions) -> Result<ExecOutput> {
        self(cmd, opts)
    }
}

/// Apply the exit-code policy to a finished command.
pub(crate) fn check_exit(
    cmd_line: String,
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    check: &ExitCodeCheck,
) -> Result<ExecOutput> {
    if check.accepts(exit_code) {
        return Ok(ExecOutput { stdout, stderr });
    }

    Err(ExecError::ProcessExecution {
        cmd: cmd_line,
        exit_code,
        stdout,
        stderr,
    })
}

/// Routes commands to local or remote execution.
///
/// The mode is fixed at construction from `run_local`. In local mode the
/// process executor can be replaced once through
/// [`Dispatcher::override_local_executor`]; the first executed command locks in
/// whichever executor is installed at that point.
pub struct Dispatcher {
    root_helper: String,
    local: OnceLock<Box<dyn Execute>>,
    remote: Option<SshExecutor>,
}

impl Dispatcher {
    pub fn new(config: &DriverConfig) -> Self {
        let remote = if config.run_local {
            None
        } else {
            Some(SshExecutor::new(config.ssh.clone()))
        };

        Self {
            root_helper: config.root_helper.clone(),
            local: OnceLock::new(),
            remote,
        }
    }

    /// True when commands run as local processes.
    pub fn is_local(&self) -> bool {
        self.remote.is_none()
    }

    /// Replace the local execution strategy.
    ///
    /// Succeeds at most once and only before the first command has run. The
    /// remote strategy is never replaced; in remote mode the override is kept
    /// but unused.
    pub fn override_local_executor(&self, executor: Box<dyn Execute>) -> Result<()> {
        debug!(local = self.is_local(), "Overriding local executor");
        self.local
            .set(executor)
            .map_err(|_| ExecError::ExecutorLocked)
    }

    fn local_executor(&self) -> &dyn Execute {
        self.local
            .get_or_init(|| -> Box<dyn Execute> {
                Box::new(ProcessExecutor::new(&self.root_helper))
            })
            .as_ref()
    }
}

impl Execute for Dispatcher {
    fn execute(&self, cmd: &[String], opts: &ExecOptions) -> Result<ExecOutput> {
        if cmd.is_empty() {
            return Err(ExecError::EmptyCommand);
        }

        match &self.remote {
            None => {
                debug!(command = %cmd.join(" "), run_as_root = opts.run_as_root, "LOCAL execute");
                self.local_executor().execute(cmd, opts)
            }
            Some(ssh) => {
                debug!(command = %cmd.join(" "), host = %ssh.host(), "SSH execute");
                ssh.execute(cmd, opts)
            }
        }
    }
}

/// Build an owned command from string slices.
pub fn command<I, S>(words: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    words.into_iter().map(Into::into).collect()
}
