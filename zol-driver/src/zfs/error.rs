use thiserror::Error;

use crate::exec::ExecError;

#[derive(Error, Debug)]
pub enum ZfsError {
    #[error("invalid volume name: {0}")]
    InvalidName(String),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

pub type Result<T> = std::result::Result<T, ZfsError>;
