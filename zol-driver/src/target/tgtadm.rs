use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use super::error::{Result, TargetError};
use super::types::TargetAddressing;
use super::{TargetAdmin, validate_device_path, validate_name};
use crate::exec::{ExecOptions, ExecOutput, Execute, command};

/// `tgt-admin --show` target header, e.g. `Target 1: iqn.2010-10.org.openstack:volume-1`
static TARGET_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Target (\d+): (\S+)\s*$").expect("target line pattern is valid")
});

/// Parse `(tid, iqn)` pairs from `tgt-admin --show` output.
fn parse_targets(output: &str) -> Vec<(u32, String)> {
    output
        .lines()
        .filter_map(|line| {
            let caps = TARGET_LINE.captures(line)?;
            let tid = caps[1].parse().ok()?;
            Some((tid, caps[2].to_string()))
        })
        .collect()
}

/// Target definition read by `tgt-admin --update`.
fn target_config(iqn: &str, device_path: &str) -> String {
    format!(
        "<target {}>\n    backing-store {}\n</target>\n",
        iqn, device_path
    )
}

/// Stateless target administration through `tgt-admin`.
///
/// Each target is described by a file in `volumes_dir` named after the part
/// of the IQN following the last colon (`volume-<id>`); `tgt-admin --update`
/// loads it. The daemon picks the target id itself, so callers pass 0.
pub struct TgtAdm {
    exec: Arc<dyn Execute>,
    volumes_dir: PathBuf,
}

impl TgtAdm {
    pub fn new(exec: Arc<dyn Execute>, volumes_dir: PathBuf) -> Self {
        Self { exec, volumes_dir }
    }

    fn tgt_admin(&self, args: &[&str]) -> Result<ExecOutput> {
        let cmd = command(std::iter::once("tgt-admin").chain(args.iter().copied()));
        Ok(self.exec.execute(&cmd, &ExecOptions::as_root())?)
    }

    /// Path of the target file for an IQN.
    fn target_file(&self, iqn: &str) -> PathBuf {
        let file_name = iqn.rsplit_once(':').map_or(iqn, |(_, suffix)| suffix);
        self.volumes_dir.join(file_name)
    }

    /// Write a target file atomically.
    fn write_target_file(&self, path: &Path, content: &str) -> Result<()> {
        fs::create_dir_all(&self.volumes_dir)?;

        let mut temp_file = NamedTempFile::new_in(&self.volumes_dir)?;
        temp_file.write_all(content.as_bytes())?;
        temp_file.persist(path).map_err(|e| TargetError::Io(e.error))?;
        Ok(())
    }

    /// Look up the daemon's target id for an IQN.
    fn find_target(&self, iqn: &str) -> Result<Option<u32>> {
        let output = self.tgt_admin(&["--show"])?;
        Ok(parse_targets(&output.stdout)
            .into_iter()
            .find(|(_, name)| name == iqn)
            .map(|(tid, _)| tid))
    }
}

impl TargetAdmin for TgtAdm {
    fn addressing(&self) -> TargetAddressing {
        TargetAddressing::Stateless
    }

    #[instrument(skip(self))]
    fn create_target(&self, name: &str, _tid: u32, _lun: u32, device_path: &str) -> Result<u32> {
        validate_name(name)?;
        validate_device_path(device_path)?;

        let path = self.target_file(name);
        debug!(iqn = %name, file = %path.display(), "Writing tgt target file");
        self.write_target_file(&path, &target_config(name, device_path))?;

        if let Err(e) = self.tgt_admin(&["--update", name]) {
            // a stale file would later pass for a live export
            if let Err(rm) = fs::remove_file(&path) {
                warn!(file = %path.display(), error = %rm, "Failed to remove target file");
            }
            return Err(e);
        }

        let tid = self
            .find_target(name)?
            .ok_or_else(|| TargetError::TargetNotFound(name.to_string()))?;

        info!(iqn = %name, tid, "Created tgt target");
        Ok(tid)
    }

    fn show_target(&self, _tid: u32, iqn: &str) -> Result<()> {
        validate_name(iqn)?;
        match self.find_target(iqn)? {
            Some(_) => Ok(()),
            None => Err(TargetError::TargetNotFound(iqn.to_string())),
        }
    }

    #[instrument(skip(self))]
    fn remove_target(&self, _tid: u32, _lun: u32, iqn: &str, volume_id: &str) -> Result<()> {
        validate_name(iqn)?;

        self.tgt_admin(&["--delete", iqn])?;

        let path = self.target_file(iqn);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(file = %path.display(), "Target file already gone");
            }
            Err(e) => return Err(e.into()),
        }

        info!(iqn = %iqn, volume_id, "Removed tgt target");
        Ok(())
    }
}
