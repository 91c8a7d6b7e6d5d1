//! Remote command execution over a multiplexed OpenSSH session.
//!
//! The first command opens a control master (`ControlMaster=auto`) that stays
//! alive for `control_persist_secs`; later commands reuse that connection. The
//! OpenSSH client reports its own failures with exit status 255, which is how
//! transport errors are told apart from a remote command that ran and failed.

use std::borrow::Cow;
use std::process::{Command, Stdio};
use std::sync::{Mutex, PoisonError};

use shell_escape::unix::escape;
use tracing::warn;

use super::error::{ExecError, Result};
use super::{ExecOptions, ExecOutput, Execute, check_exit};
use crate::config::SshConfig;

/// Exit status the OpenSSH client uses for its own errors.
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Join command words into one shell line, escaping each word.
pub fn remote_command_line(cmd: &[String]) -> String {
    cmd.iter()
        .map(|word| escape(Cow::Borrowed(word.as_str())).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Runs commands on the storage host through the `ssh` client.
#[derive(Debug)]
pub struct SshExecutor {
    config: SshConfig,
    /// Serializes use of the shared control connection
    session: Mutex<()>,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            session: Mutex::new(()),
        }
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    /// Arguments passed to the ssh client for one remote command line.
    fn build_ssh_args(&self, remote_line: &str) -> Vec<String> {
        let control_path = self.config.control_dir.join("zol-driver-%r@%h:%p");
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-o".to_string(),
            "ControlMaster=auto".to_string(),
            "-o".to_string(),
            format!("ControlPath={}", control_path.display()),
            "-o".to_string(),
            format!("ControlPersist={}", self.config.control_persist_secs),
            "-p".to_string(),
            self.config.port.to_string(),
        ];

        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.display().to_string());
        }

        args.push("-l".to_string());
        args.push(self.config.login.clone());
        args.push(self.config.host.clone());
        args.push(remote_line.to_string());
        args
    }
}

impl Execute for SshExecutor {
    fn execute(&self, cmd: &[String], opts: &ExecOptions) -> Result<ExecOutput> {
        let remote_line = remote_command_line(cmd);
        let args = self.build_ssh_args(&remote_line);

        let _session = self.session.lock().unwrap_or_else(PoisonError::into_inner);

        let output = Command::new(&self.config.ssh_command)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| ExecError::RemoteConnection {
                host: self.config.host.clone(),
                message: format!("failed to start '{}': {}", self.config.ssh_command, e),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.code() == Some(SSH_TRANSPORT_FAILURE) {
            warn!(host = %self.config.host, error = %stderr.trim(), "SSH transport failure");
            return Err(ExecError::RemoteConnection {
                host: self.config.host.clone(),
                message: stderr.trim().to_string(),
            });
        }

        check_exit(
            remote_line,
            output.status.code(),
            String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
            &opts.check_exit_code,
        )
    }
}
