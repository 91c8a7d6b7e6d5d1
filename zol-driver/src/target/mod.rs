//! iSCSI target administration.
//!
//! Two daemons are supported behind the [`TargetAdmin`] trait: the Linux SCSI
//! target framework (`tgt-admin`), which identifies targets by IQN alone, and
//! the iSCSI Enterprise Target (`ietadm`), which needs a target id allocated
//! from the volume database. The driver asks [`TargetAdmin::addressing`] which
//! of the two it is dealing with.

pub mod error;
pub mod ietadm;
pub mod tgtadm;
pub mod types;

use std::sync::Arc;

use crate::config::{DriverConfig, TargetHelper};
use crate::exec::Execute;

pub use error::{Result, TargetError};
pub use ietadm::IetAdm;
pub use tgtadm::TgtAdm;
pub use types::{IscsiProperties, ProviderLocation, TargetAddressing};

/// Lifecycle operations on an iSCSI target daemon.
pub trait TargetAdmin: Send + Sync {
    /// How this daemon identifies targets.
    fn addressing(&self) -> TargetAddressing;

    /// Create a target named `name` serving `device_path` as `lun`.
    ///
    /// Returns the target id the daemon actually uses.
    fn create_target(&self, name: &str, tid: u32, lun: u32, device_path: &str) -> Result<u32>;

    /// Succeeds only if the target is currently configured.
    fn show_target(&self, tid: u32, iqn: &str) -> Result<()>;

    /// Tear down the target `iqn` exporting `volume_id`.
    ///
    /// Fails if the daemon-side delete cannot be issued.
    fn remove_target(&self, tid: u32, lun: u32, iqn: &str, volume_id: &str) -> Result<()>;
}

/// Build the target administrator selected by the configuration.
pub fn target_admin(config: &DriverConfig, exec: Arc<dyn Execute>) -> Box<dyn TargetAdmin> {
    match config.target_helper {
        TargetHelper::Tgtadm => Box::new(TgtAdm::new(exec, config.volumes_dir.clone())),
        TargetHelper::Ietadm => Box::new(IetAdm::new(exec)),
    }
}

/// Longest IQN accepted by the target daemons.
const MAX_IQN_LEN: usize = 223;

/// Check an IQN (or the `volume-<id>` suffix of one) before it reaches
/// `tgt-admin`/`ietadm` or names a file in the volumes directory.
///
/// Accepts `[A-Za-z0-9_.:-]` up to [`MAX_IQN_LEN`] bytes, without `..`.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(TargetError::InvalidName("empty target name".into()));
    }
    if name.len() > MAX_IQN_LEN {
        return Err(TargetError::InvalidName(format!(
            "target name is {} bytes, limit is {}",
            name.len(),
            MAX_IQN_LEN
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':')))
    {
        return Err(TargetError::InvalidName(format!(
            "'{}': character {:?} not allowed in a target name",
            name, bad
        )));
    }
    if name.contains("..") {
        return Err(TargetError::InvalidName(format!(
            "'{}': '..' not allowed in a target name",
            name
        )));
    }
    Ok(())
}

/// Exported devices must be zvol nodes under `/dev/zvol/`.
pub(crate) fn validate_device_path(path: &str) -> Result<()> {
    let Some(path_part) = path.strip_prefix("/dev/zvol/") else {
        return Err(TargetError::InvalidName(format!(
            "device path '{}' must be under /dev/zvol/",
            path
        )));
    };

    if path_part.is_empty() || path.contains("..") {
        return Err(TargetError::InvalidName(format!(
            "device path '{}' is empty or contains path traversal sequence",
            path
        )));
    }

    if !path_part
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '/')
    {
        return Err(TargetError::InvalidName(format!(
            "device path '{}' contains invalid characters",
            path
        )));
    }

    Ok(())
}
