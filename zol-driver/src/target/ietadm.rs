use std::sync::Arc;

use tracing::{info, instrument};

use super::error::Result;
use super::types::TargetAddressing;
use super::{TargetAdmin, validate_device_path, validate_name};
use crate::exec::{ExecOptions, Execute};

/// Target administration through `ietadm` (iSCSI Enterprise Target).
///
/// Targets are addressed by integer id, which the caller allocates from the
/// volume database before creating the target.
pub struct IetAdm {
    exec: Arc<dyn Execute>,
}

impl IetAdm {
    pub fn new(exec: Arc<dyn Execute>) -> Self {
        Self { exec }
    }

    fn ietadm(&self, args: Vec<String>) -> Result<()> {
        let mut cmd = Vec::with_capacity(args.len() + 1);
        cmd.push("ietadm".to_string());
        cmd.extend(args);
        self.exec.execute(&cmd, &ExecOptions::as_root())?;
        Ok(())
    }
}

impl TargetAdmin for IetAdm {
    fn addressing(&self) -> TargetAddressing {
        TargetAddressing::TableBacked
    }

    #[instrument(skip(self))]
    fn create_target(&self, name: &str, tid: u32, lun: u32, device_path: &str) -> Result<u32> {
        validate_name(name)?;
        validate_device_path(device_path)?;

        self.ietadm(vec![
            "--op".to_string(),
            "new".to_string(),
            format!("--tid={}", tid),
            "--params".to_string(),
            format!("Name={}", name),
        ])?;
        self.ietadm(vec![
            "--op".to_string(),
            "new".to_string(),
            format!("--tid={}", tid),
            format!("--lun={}", lun),
            "--params".to_string(),
            format!("Path={},Type=fileio", device_path),
        ])?;

        info!(iqn = %name, tid, lun, "Created ietadm target");
        Ok(tid)
    }

    fn show_target(&self, tid: u32, _iqn: &str) -> Result<()> {
        self.ietadm(vec![
            "--op".to_string(),
            "show".to_string(),
            format!("--tid={}", tid),
        ])
    }

    #[instrument(skip(self))]
    fn remove_target(&self, tid: u32, lun: u32, _iqn: &str, volume_id: &str) -> Result<()> {
        self.ietadm(vec![
            "--op".to_string(),
            "delete".to_string(),
            format!("--tid={}", tid),
            format!("--lun={}", lun),
        ])?;
        self.ietadm(vec![
            "--op".to_string(),
            "delete".to_string(),
            format!("--tid={}", tid),
        ])?;

        info!(tid, volume_id, "Removed ietadm target");
        Ok(())
    }
}
