//! Volume metadata store interface.
//!
//! Only the iSCSI target table is needed here: table-backed target daemons
//! (ietadm) address targets by an integer id that must stay stable for a
//! volume across exports and restarts.

pub mod target_table;

use thiserror::Error;
use uuid::Uuid;

pub use target_table::JsonTargetTable;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("no iSCSI target allocated for volume '{0}'")]
    NotFound(String),

    #[error("no free iSCSI target left on host '{0}'")]
    NoMoreTargets(String),

    #[error("failed to (de)serialize target table: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Per-request context passed through to the metadata store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
}

impl RequestContext {
    pub fn new() -> Self {
        Self {
            request_id: format!("req-{}", Uuid::new_v4()),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Persistent mapping from volume id to iSCSI target id.
pub trait VolumeDatabase: Send + Sync {
    /// Make sure `host` has a pool of `count` target ids to allocate from.
    fn ensure_iscsi_targets(&self, ctx: &RequestContext, host: &str, count: u32) -> Result<()>;

    /// Allocate a target id on `host` for a volume.
    ///
    /// A volume that already holds a target id on that host gets it back.
    fn allocate_iscsi_target(&self, ctx: &RequestContext, volume_id: &str, host: &str)
    -> Result<u32>;

    /// Target id held by a volume; [`DbError::NotFound`] when none is allocated.
    fn get_iscsi_target_num(&self, ctx: &RequestContext, volume_id: &str) -> Result<u32>;

    /// Return a volume's target id to its host's pool.
    ///
    /// Releasing a volume that holds no target id succeeds.
    fn release_iscsi_target(&self, ctx: &RequestContext, volume_id: &str) -> Result<()>;
}
