//! ZFS-on-Linux iSCSI volume driver.
//!
//! Maps the block-storage driver operations onto `zfs` and the configured
//! iSCSI target daemon. No volume state is kept here: existence and export
//! status are always re-read from the external tools.
//!
//! Error handling differs by operation on purpose:
//! - `volume_exists` and the teardown paths (`delete_volume`, `remove_export`)
//!   turn failures into "absent" / "nothing to do". A transient failure (for
//!   example a dropped SSH session) is therefore indistinguishable from a
//!   missing volume or export. These swallowed errors are logged and counted
//!   in `zol_driver_swallowed_errors_total`.
//! - `check_for_export` verifies that an export is live and re-raises every
//!   failure after logging it.

use std::sync::Arc;

use tracing::{error, info, instrument};

use crate::config::DriverConfig;
use crate::db::{DbError, RequestContext, VolumeDatabase};
use crate::error::{DriverError, Result};
use crate::exec::{Dispatcher, Execute};
use crate::metrics::{self, OperationTimer};
use crate::target::{self, IscsiProperties, ProviderLocation, TargetAddressing, TargetAdmin};
use crate::types::{ModelUpdate, Snapshot, Volume, volume_name};
use crate::zfs::{self, ZfsManager, size_string};

/// Run an operation, recording its outcome and duration.
fn timed<T>(operation: &'static str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let timer = OperationTimer::new(operation);
    let result = f();
    match &result {
        Ok(_) => timer.success(),
        Err(e) => timer.failure(e.code()),
    }
    result
}

/// Volume driver for ZFS zvols exported over iSCSI.
pub struct ZolIscsiDriver {
    config: DriverConfig,
    dispatcher: Arc<Dispatcher>,
    zfs: ZfsManager,
    target_admin: Box<dyn TargetAdmin>,
    db: Arc<dyn VolumeDatabase>,
}

impl ZolIscsiDriver {
    /// Create a driver using the target daemon named in the configuration.
    pub fn new(config: DriverConfig, db: Arc<dyn VolumeDatabase>) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(&config));
        let exec: Arc<dyn Execute> = dispatcher.clone();
        let target_admin = target::target_admin(&config, exec);
        Self::assemble(config, db, dispatcher, target_admin)
    }

    /// Create a driver with a caller-supplied target administrator.
    pub fn with_target_admin(
        config: DriverConfig,
        db: Arc<dyn VolumeDatabase>,
        target_admin: Box<dyn TargetAdmin>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(&config));
        Self::assemble(config, db, dispatcher, target_admin)
    }

    fn assemble(
        config: DriverConfig,
        db: Arc<dyn VolumeDatabase>,
        dispatcher: Arc<Dispatcher>,
        target_admin: Box<dyn TargetAdmin>,
    ) -> Self {
        let exec: Arc<dyn Execute> = dispatcher.clone();
        let zfs = ZfsManager::new(&config, exec);

        info!(
            run_local = config.run_local,
            target_helper = %config.target_helper,
            pool_prefix = %config.pool_name_prefix,
            "Initialized ZoL iSCSI driver"
        );

        Self {
            config,
            dispatcher,
            zfs,
            target_admin,
            db,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Underlying ZFS operations.
    pub fn zfs(&self) -> &ZfsManager {
        &self.zfs
    }

    /// Replace the local execution strategy; see [`Dispatcher::override_local_executor`].
    pub fn override_local_executor(&self, executor: Box<dyn Execute>) -> Result<()> {
        Ok(self.dispatcher.override_local_executor(executor)?)
    }

    /// Verify the configuration before serving requests.
    pub fn check_for_setup_error(&self) -> Result<()> {
        self.config.validate()
    }

    /// Dataset path backing a volume.
    pub fn pool_name(&self, volume_name: &str) -> String {
        self.zfs.pool_name(volume_name)
    }

    /// Create the zvol backing a volume, sized from `size_gb`.
    #[instrument(skip_all, fields(volume = %volume.name))]
    pub fn create_volume(&self, volume: &Volume) -> Result<()> {
        timed("create_volume", || {
            Ok(self
                .zfs
                .create_volume(&volume.name, &size_string(volume.size_gb))?)
        })
    }

    /// Create a volume as a promoted clone of a snapshot.
    #[instrument(skip_all, fields(volume = %volume.name, snapshot = %snapshot.name))]
    pub fn create_volume_from_snapshot(&self, volume: &Volume, snapshot: &Snapshot) -> Result<()> {
        timed("create_volume_from_snapshot", || {
            Ok(self.zfs.clone_from_snapshot(&volume.name, &snapshot.name)?)
        })
    }

    /// Presence probe; any failure reads as "absent".
    pub fn volume_exists(&self, volume_name: &str) -> bool {
        self.zfs.volume_exists(volume_name)
    }

    /// Destroy a volume; succeeds without doing anything if it is absent.
    #[instrument(skip_all, fields(volume = %volume.name))]
    pub fn delete_volume(&self, volume: &Volume) -> Result<()> {
        timed("delete_volume", || Ok(self.zfs.delete_volume(&volume.name)?))
    }

    /// Export a volume over iSCSI.
    ///
    /// Returns the provider location the caller must persist on the volume.
    #[instrument(skip_all, fields(volume = %volume.name, host = %volume.host))]
    pub fn create_export(&self, ctx: &RequestContext, volume: &Volume) -> Result<ModelUpdate> {
        timed("create_export", || {
            let iscsi_name = format!("{}{}", self.config.iscsi_target_prefix, volume.name);
            let volume_path = format!("/dev/zvol/{}/{}", self.config.volume_group, volume.name);
            let addressing = self.target_admin.addressing();

            let iscsi_target = match addressing {
                TargetAddressing::TableBacked => {
                    self.db.ensure_iscsi_targets(
                        ctx,
                        &volume.host,
                        self.config.iscsi_num_targets,
                    )?;
                    self.db
                        .allocate_iscsi_target(ctx, &volume.id, &volume.host)?
                }
                TargetAddressing::Stateless => 0,
            };
            let lun = addressing.export_lun();

            let tid = self
                .target_admin
                .create_target(&iscsi_name, iscsi_target, 0, &volume_path)?;

            let location = ProviderLocation::new(
                &self.config.iscsi_ip_address,
                self.config.iscsi_port,
                tid,
                &iscsi_name,
                lun,
            );
            info!(volume = %volume.name, location = %location, "Volume exported");

            Ok(ModelUpdate {
                provider_location: location.to_string(),
            })
        })
    }

    /// Remove a volume's iSCSI export.
    ///
    /// Succeeds without doing anything when no target id is allocated, when the
    /// volume has no usable provider location, or when the target daemon does
    /// not show the target. Once the target is shown, it is deleted by the IQN
    /// from the provider location and a failed delete is returned.
    #[instrument(skip_all, fields(volume = %volume.name))]
    pub fn remove_export(&self, ctx: &RequestContext, volume: &Volume) -> Result<()> {
        timed("remove_export", || {
            let tid = match self.target_admin.addressing() {
                TargetAddressing::TableBacked => {
                    match self.db.get_iscsi_target_num(ctx, &volume.id) {
                        Ok(tid) => tid,
                        Err(DbError::NotFound(_)) => {
                            info!(
                                volume_id = %volume.id,
                                "Skipping remove_export. No iscsi_target provisioned for volume"
                            );
                            metrics::record_swallowed_error("remove_export");
                            return Ok(());
                        }
                        Err(e) => return Err(e.into()),
                    }
                }
                TargetAddressing::Stateless => 0,
            };

            // provider_location is unset when the volume was never exported
            let Some(iqn) = volume
                .provider_location
                .as_deref()
                .and_then(ProviderLocation::iqn_field)
            else {
                info!(
                    volume_id = %volume.id,
                    "Skipping remove_export. No provider location recorded for volume"
                );
                metrics::record_swallowed_error("remove_export");
                return Ok(());
            };

            if let Err(e) = self.target_admin.show_target(tid, iqn) {
                info!(
                    volume_id = %volume.id,
                    error = %e,
                    "Skipping remove_export. No iscsi_target is presently exported for volume"
                );
                metrics::record_swallowed_error("remove_export");
                return Ok(());
            }

            self.target_admin.remove_target(tid, 0, iqn, &volume.id)?;
            info!(volume = %volume.name, tid, "Export removed");
            Ok(())
        })
    }

    /// Confirm that a volume's export is live.
    ///
    /// Fails if the volume id is not a safe name, if the volume's target file
    /// is missing, or if the target daemon does not show the target.
    #[instrument(skip(self, ctx))]
    pub fn check_for_export(&self, ctx: &RequestContext, volume_id: &str) -> Result<()> {
        timed("check_for_export", || {
            let vol_uuid_file = volume_name(volume_id);
            zfs::volume::validate_name(&vol_uuid_file)?;
            let volume_path = self.config.volumes_dir.join(&vol_uuid_file);
            if !volume_path.is_file() {
                return Err(DriverError::PersistentVolumeFileNotFound {
                    volume_id: volume_id.to_string(),
                });
            }
            let iqn = format!("{}{}", self.config.iscsi_target_prefix, vol_uuid_file);

            let tid = match self.target_admin.addressing() {
                TargetAddressing::TableBacked => self.db.get_iscsi_target_num(ctx, volume_id)?,
                TargetAddressing::Stateless => 0,
            };

            if let Err(e) = self.target_admin.show_target(tid, &iqn) {
                // Initiators remount read-only in this case; the target daemon
                // must be restarted so exports are re-created.
                error!(volume_id, error = %e, "Cannot confirm exported volume");
                return Err(e.into());
            }

            Ok(())
        })
    }

    /// Block device path of a volume on the storage host.
    pub fn local_path(&self, volume: &Volume) -> String {
        self.zfs.device_path(&volume.name)
    }

    /// Connection properties for an initiator, read from the provider location.
    pub fn initialize_connection(&self, volume: &Volume) -> Result<IscsiProperties> {
        let location = volume.provider_location.as_deref().ok_or_else(|| {
            DriverError::InvalidProviderLocation {
                volume_id: volume.id.clone(),
                reason: "volume is not exported".to_string(),
            }
        })?;

        let location =
            ProviderLocation::parse(location).map_err(|e| DriverError::InvalidProviderLocation {
                volume_id: volume.id.clone(),
                reason: e.to_string(),
            })?;

        Ok(IscsiProperties::from_location(&location, &volume.id))
    }
}
