use thiserror::Error;

use crate::exec::ExecError;

#[derive(Error, Debug)]
pub enum TargetError {
    #[error("target '{0}' not found")]
    TargetNotFound(String),

    #[error("failed to parse target tool output: {0}")]
    ParseError(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TargetError>;
