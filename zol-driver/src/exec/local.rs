use std::process::{Command, Stdio};

use super::error::{ExecError, Result};
use super::{ExecOptions, ExecOutput, Execute, check_exit};

/// Runs commands as local child processes.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    /// Command words prepended when `run_as_root` is set (e.g. `sudo`)
    root_helper: Vec<String>,
}

impl ProcessExecutor {
    /// Create an executor; `root_helper` is split on whitespace.
    pub fn new(root_helper: &str) -> Self {
        Self {
            root_helper: root_helper.split_whitespace().map(String::from).collect(),
        }
    }

    /// Full argv for a command, including root escalation when requested.
    fn argv<'a>(&'a self, cmd: &'a [String], run_as_root: bool) -> Vec<&'a str> {
        let helper = if run_as_root {
            self.root_helper.as_slice()
        } else {
            &[]
        };
        helper
            .iter()
            .chain(cmd.iter())
            .map(String::as_str)
            .collect()
    }
}

impl Execute for ProcessExecutor {
    fn execute(&self, cmd: &[String], opts: &ExecOptions) -> Result<ExecOutput> {
        let argv = self.argv(cmd, opts.run_as_root);
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;

        check_exit(
            argv.join(" "),
            output.status.code(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
            &opts.check_exit_code,
        )
    }
}
