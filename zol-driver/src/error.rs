use thiserror::Error;

use crate::db::DbError;
use crate::exec::ExecError;
use crate::target::TargetError;
use crate::zfs::ZfsError;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Zfs(#[from] ZfsError),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("persistent volume file for volume '{volume_id}' not found")]
    PersistentVolumeFileNotFound { volume_id: String },

    #[error("invalid provider location for volume '{volume_id}': {reason}")]
    InvalidProviderLocation { volume_id: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DriverError {
    /// Short classification used as the metrics status label.
    pub fn code(&self) -> &'static str {
        match self {
            DriverError::Exec(_) => "exec",
            DriverError::Zfs(ZfsError::InvalidName(_)) => "invalid_name",
            DriverError::Zfs(ZfsError::Exec(_)) => "exec",
            DriverError::Target(TargetError::TargetNotFound(_)) => "target_not_found",
            DriverError::Target(_) => "target",
            DriverError::Db(DbError::NotFound(_)) => "not_found",
            DriverError::Db(_) => "db",
            DriverError::PersistentVolumeFileNotFound { .. } => "volume_file_not_found",
            DriverError::InvalidProviderLocation { .. } => "invalid_location",
            DriverError::InvalidConfig(_) => "invalid_config",
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
