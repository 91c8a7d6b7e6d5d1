use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::error::{Result, ZfsError};
use crate::config::DriverConfig;
use crate::exec::{ExecOptions, ExecOutput, Execute};
use crate::metrics;

/// Check a volume or snapshot name before it becomes part of a dataset path.
///
/// Names end up in `zfs` argument lists and, in remote mode, in a shell line
/// run over SSH, so only `[A-Za-z0-9_.-]` is accepted. `/`, `@` and `:` are
/// refused: a name always denotes one dataset directly under the pool prefix.
pub(crate) fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &str| ZfsError::InvalidName(format!("'{}': {}", name, reason));

    if name.is_empty() {
        return Err(ZfsError::InvalidName("empty volume name".into()));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')))
    {
        return Err(invalid(&format!("character {:?} not allowed in a dataset name", bad)));
    }
    if name.contains("..") {
        return Err(invalid("'..' not allowed in a dataset name"));
    }
    Ok(())
}

/// Size argument for `zfs create -V` from a size in GiB.
///
/// A zero-sized request gets a 100M placeholder volume.
pub fn size_string(size_gb: u64) -> String {
    if size_gb == 0 {
        "100M".to_string()
    } else {
        format!("{}G", size_gb)
    }
}

/// ZFS volume (zvol) operations under a configured dataset prefix.
///
/// Holds no state about volumes; every question is answered by asking `zfs`.
pub struct ZfsManager {
    exec: Arc<dyn Execute>,
    zfs_command: String,
    /// Prepended verbatim to volume names (e.g. "tank/cinder/")
    pool_name_prefix: String,
    thin_provision: bool,
}

impl ZfsManager {
    pub fn new(config: &DriverConfig, exec: Arc<dyn Execute>) -> Self {
        Self {
            exec,
            zfs_command: config.zfs_command.clone(),
            pool_name_prefix: config.pool_name_prefix.clone(),
            thin_provision: config.thin_provision,
        }
    }

    /// Dataset path backing a volume: the prefix followed by the name.
    pub fn pool_name(&self, volume_name: &str) -> String {
        format!("{}{}", self.pool_name_prefix, volume_name)
    }

    /// Block device node for a volume.
    pub fn device_path(&self, volume_name: &str) -> String {
        format!("/dev/zvol/{}", self.pool_name(volume_name))
    }

    /// Run a zfs subcommand with root privileges.
    fn zfs(&self, args: &[&str]) -> Result<ExecOutput> {
        let mut cmd = Vec::with_capacity(args.len() + 1);
        cmd.push(self.zfs_command.clone());
        cmd.extend(args.iter().map(|a| a.to_string()));
        Ok(self.exec.execute(&cmd, &ExecOptions::as_root())?)
    }

    /// Create a ZFS volume (zvol), sparse when thin provisioning is on.
    #[instrument(skip(self))]
    pub fn create_volume(&self, volume_name: &str, size: &str) -> Result<()> {
        validate_name(volume_name)?;

        let pool = self.pool_name(volume_name);
        info!(volume = %pool, size, thin = self.thin_provision, "Creating ZFS volume");

        let mut args = vec!["create"];
        if self.thin_provision {
            args.push("-s");
        }
        args.extend(["-V", size, pool.as_str()]);

        if let Err(e) = self.zfs(&args) {
            warn!(volume = %pool, error = %e, "Failed to create volume");
            return Err(e);
        }

        info!(volume = %pool, "ZFS volume created successfully");
        Ok(())
    }

    /// Check whether a volume's dataset exists.
    ///
    /// Any failure of the probe, including a transient one such as a dropped
    /// SSH session, is reported as "absent". Callers that need to tell the
    /// two apart must not rely on this.
    pub fn volume_exists(&self, volume_name: &str) -> bool {
        if let Err(e) = validate_name(volume_name) {
            debug!(volume = %volume_name, error = %e, "Invalid name, treating volume as absent");
            return false;
        }

        let pool = self.pool_name(volume_name);
        match self.zfs(&["list", "-H", &pool]) {
            Ok(output) => output.stdout.starts_with(&pool),
            Err(e) => {
                debug!(volume = %pool, error = %e, "zfs list failed, treating volume as absent");
                metrics::record_swallowed_error("volume_exists");
                false
            }
        }
    }

    /// Clone a snapshot into a new volume and promote the clone.
    ///
    /// If the promote fails after a successful clone the clone is left in
    /// place, unpromoted.
    #[instrument(skip(self))]
    pub fn clone_from_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()> {
        validate_name(volume_name)?;
        validate_name(snapshot_name)?;

        let source = self.pool_name(snapshot_name);
        let target = self.pool_name(volume_name);
        info!(source = %source, target = %target, "Cloning ZFS snapshot");

        self.zfs(&["clone", &source, &target])?;

        if let Err(e) = self.zfs(&["promote", &target]) {
            warn!(volume = %target, error = %e, "Clone created but promote failed");
            return Err(e);
        }

        info!(volume = %target, "ZFS clone created and promoted");
        Ok(())
    }

    /// Destroy a ZFS volume.
    ///
    /// This operation is idempotent: if the volume doesn't exist, returns Ok.
    #[instrument(skip(self))]
    pub fn delete_volume(&self, volume_name: &str) -> Result<()> {
        validate_name(volume_name)?;

        let pool = self.pool_name(volume_name);
        if !self.volume_exists(volume_name) {
            info!(volume = %pool, "Volume not present, nothing to delete");
            return Ok(());
        }

        info!(volume = %pool, "Deleting ZFS volume");
        if let Err(e) = self.zfs(&["destroy", &pool]) {
            warn!(volume = %pool, error = %e, "Failed to delete volume");
            return Err(e);
        }

        info!(volume = %pool, "ZFS volume deleted successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::exec::{ExecError, Result as ExecResult};

    type Calls = Arc<Mutex<Vec<(String, bool)>>>;

    /// Executor answering `zfs list` with `list_stdout` (or failing when None).
    fn scripted(list_stdout: Option<&'static str>) -> (Calls, Arc<dyn Execute>) {
        let calls: Calls = Arc::default();
        let recorder = Arc::clone(&calls);
        let exec = move |cmd: &[String], opts: &ExecOptions| -> ExecResult<ExecOutput> {
            let line = cmd.join(" ");
            recorder
                .lock()
                .unwrap()
                .push((line.clone(), opts.run_as_root));
            if cmd.get(1).map(String::as_str) == Some("list") {
                return match list_stdout {
                    Some(stdout) => Ok(ExecOutput {
                        stdout: stdout.to_string(),
                        stderr: String::new(),
                    }),
                    None => Err(ExecError::ProcessExecution {
                        cmd: line,
                        exit_code: Some(1),
                        stdout: String::new(),
                        stderr: "dataset does not exist".to_string(),
                    }),
                };
            }
            Ok(ExecOutput::default())
        };
        let exec: Arc<dyn Execute> = Arc::new(exec);
        (calls, exec)
    }

    fn manager(thin: bool, exec: Arc<dyn Execute>) -> ZfsManager {
        let config = DriverConfig {
            pool_name_prefix: "tank/cinder/".to_string(),
            thin_provision: thin,
            ..DriverConfig::default()
        };
        ZfsManager::new(&config, exec)
    }

    fn commands(calls: &Calls) -> Vec<String> {
        calls.lock().unwrap().iter().map(|(c, _)| c.clone()).collect()
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("volume-1").is_ok());
        assert!(validate_name("snapshot_1.a").is_ok());

        assert!(validate_name("").is_err());
        assert!(validate_name("vol/name").is_err());
        assert!(validate_name("vol@snap").is_err());
        assert!(validate_name("vol name").is_err());
        assert!(validate_name("vol;rm -rf /").is_err());
        assert!(validate_name("$(whoami)").is_err());
        assert!(validate_name("..").is_err());
        // colons belong to IQNs, not dataset names
        assert!(validate_name("iqn:volume-1").is_err());
    }

    #[test]
    fn test_size_string() {
        assert_eq!(size_string(10), "10G");
        assert_eq!(size_string(0), "100M");
    }

    #[test]
    fn test_pool_name_and_device_path() {
        let (_, exec) = scripted(None);
        let manager = manager(false, exec);
        for name in ["v1", "volume-42", "", "weird name"] {
            assert_eq!(manager.pool_name(name), format!("tank/cinder/{}", name));
        }
        assert_eq!(manager.device_path("v1"), "/dev/zvol/tank/cinder/v1");
    }

    #[test]
    fn test_create_thin_volume() {
        let (calls, exec) = scripted(None);
        manager(true, exec).create_volume("v1", "10G").unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![("zfs create -s -V 10G tank/cinder/v1".to_string(), true)]
        );
    }

    #[test]
    fn test_create_thick_volume() {
        let (calls, exec) = scripted(None);
        manager(false, exec).create_volume("v1", "1G").unwrap();
        assert_eq!(commands(&calls), vec!["zfs create -V 1G tank/cinder/v1"]);
    }

    #[test]
    fn test_create_rejects_bad_name() {
        let (calls, exec) = scripted(None);
        let result = manager(false, exec).create_volume("v1; reboot", "1G");
        assert!(matches!(result, Err(ZfsError::InvalidName(_))));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_exists_matches_listed_pool() {
        let (_, exec) = scripted(Some("tank/cinder/v1\t1.2G\t-\t1.2G\t-\n"));
        assert!(manager(false, exec).volume_exists("v1"));
    }

    #[test]
    fn test_exists_false_on_other_output() {
        let (_, exec) = scripted(Some("tank/cinder/other\t1G\n"));
        assert!(!manager(false, exec).volume_exists("v1"));
    }

    #[test]
    fn test_exists_false_on_command_failure() {
        // Errors are swallowed: a failed probe always reads as "absent"
        let (_, exec) = scripted(None);
        assert!(!manager(false, exec).volume_exists("v1"));
    }

    #[test]
    fn test_delete_absent_volume_is_noop() {
        let (calls, exec) = scripted(None);
        let manager = manager(false, exec);
        manager.delete_volume("v1").unwrap();
        manager.delete_volume("v1").unwrap();
        assert!(commands(&calls).iter().all(|c| c.starts_with("zfs list")));
    }

    #[test]
    fn test_delete_present_volume() {
        let (calls, exec) = scripted(Some("tank/cinder/v1\t1G\n"));
        manager(false, exec).delete_volume("v1").unwrap();
        assert_eq!(
            commands(&calls),
            vec!["zfs list -H tank/cinder/v1", "zfs destroy tank/cinder/v1"]
        );
    }

    #[test]
    fn test_clone_and_promote() {
        let (calls, exec) = scripted(None);
        manager(false, exec).clone_from_snapshot("v2", "s1").unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                ("zfs clone tank/cinder/s1 tank/cinder/v2".to_string(), true),
                ("zfs promote tank/cinder/v2".to_string(), true),
            ]
        );
    }
}
