//! Driver configuration.
//!
//! A [`DriverConfig`] is built once (by the CLI or an embedding service) and
//! handed to the driver constructor; nothing mutates it afterwards.

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DriverError, Result};

/// Which iSCSI target daemon tooling manages exports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetHelper {
    /// Linux SCSI target framework (`tgt-admin`), stateless
    #[default]
    Tgtadm,
    /// iSCSI Enterprise Target (`ietadm`), needs the target-id table
    Ietadm,
}

impl Display for TargetHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetHelper::Tgtadm => write!(f, "tgtadm"),
            TargetHelper::Ietadm => write!(f, "ietadm"),
        }
    }
}

impl FromStr for TargetHelper {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tgtadm" => Ok(TargetHelper::Tgtadm),
            "ietadm" => Ok(TargetHelper::Ietadm),
            _ => Err(DriverError::InvalidConfig(format!(
                "unknown target helper '{}': expected tgtadm or ietadm",
                s
            ))),
        }
    }
}

/// Settings for the remote shell session used when `run_local` is off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    /// Storage host name or address
    pub host: String,
    pub port: u16,
    /// Login user; must be allowed to run zfs and the target tooling
    pub login: String,
    /// Private key; the ssh agent is used when unset
    pub identity_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    /// Directory holding the control socket of the persistent session
    pub control_dir: PathBuf,
    /// How long the idle control master stays up
    pub control_persist_secs: u64,
    /// ssh client binary
    pub ssh_command: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 22,
            login: String::new(),
            identity_file: None,
            connect_timeout_secs: 30,
            control_dir: std::env::temp_dir(),
            control_persist_secs: 600,
            ssh_command: "ssh".to_string(),
        }
    }
}

/// Immutable driver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// ZFS binary to invoke
    pub zfs_command: String,
    /// Create sparse volumes (`zfs create -s`)
    pub thin_provision: bool,
    /// Prepended to a volume name to form its dataset path (e.g. `rpool/`)
    pub pool_name_prefix: String,
    /// Prepended to a volume name to form its IQN
    pub iscsi_target_prefix: String,
    /// Address advertised in export locations
    pub iscsi_ip_address: String,
    pub iscsi_port: u16,
    /// Dataset under `/dev/zvol/` holding exported devices
    pub volume_group: String,
    /// Directory of per-volume target files (`volume-<id>`)
    pub volumes_dir: PathBuf,
    /// Run commands locally instead of over SSH
    pub run_local: bool,
    /// Command prefix for privileged local commands
    pub root_helper: String,
    pub target_helper: TargetHelper,
    /// Size of each host's target-id pool (ietadm only)
    pub iscsi_num_targets: u32,
    pub ssh: SshConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            zfs_command: "zfs".to_string(),
            thin_provision: false,
            pool_name_prefix: "rpool/".to_string(),
            iscsi_target_prefix: "iqn.2010-10.org.openstack:".to_string(),
            iscsi_ip_address: "127.0.0.1".to_string(),
            iscsi_port: 3260,
            volume_group: "rpool".to_string(),
            volumes_dir: PathBuf::from("/var/lib/zol-driver/volumes"),
            run_local: true,
            root_helper: "sudo".to_string(),
            target_helper: TargetHelper::default(),
            iscsi_num_targets: 100,
            ssh: SshConfig::default(),
        }
    }
}

impl DriverConfig {
    /// Reject configurations the driver cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.zfs_command.trim().is_empty() {
            return Err(DriverError::InvalidConfig(
                "zfs command cannot be empty".to_string(),
            ));
        }
        if self.iscsi_target_prefix.is_empty() {
            return Err(DriverError::InvalidConfig(
                "iSCSI target prefix cannot be empty".to_string(),
            ));
        }
        if self.iscsi_ip_address.is_empty() {
            return Err(DriverError::InvalidConfig(
                "iSCSI IP address cannot be empty".to_string(),
            ));
        }
        if self.target_helper == TargetHelper::Ietadm && self.iscsi_num_targets == 0 {
            return Err(DriverError::InvalidConfig(
                "ietadm needs at least one iSCSI target per host".to_string(),
            ));
        }

        if !self.run_local {
            if self.ssh.host.is_empty() {
                return Err(DriverError::InvalidConfig(
                    "remote execution requires an SSH host".to_string(),
                ));
            }
            if self.ssh.login.is_empty() {
                return Err(DriverError::InvalidConfig(
                    "remote execution requires an SSH login".to_string(),
                ));
            }
        }

        Ok(())
    }
}
