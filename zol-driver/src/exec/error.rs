use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("command '{cmd}' failed with {}: {}", describe_exit(.exit_code), .stderr.trim())]
    ProcessExecution {
        cmd: String,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("cannot reach remote host '{host}': {message}")]
    RemoteConnection { host: String, message: String },

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("local executor is already fixed; override it before the first command")]
    ExecutorLocked,

    #[error("empty command")]
    EmptyCommand,
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ExecError>;
