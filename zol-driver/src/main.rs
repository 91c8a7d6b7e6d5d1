use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use tracing::{Level, debug, info};
use tracing_subscriber::FmtSubscriber;

use zol_driver::config::{DriverConfig, SshConfig, TargetHelper};
use zol_driver::db::{JsonTargetTable, RequestContext};
use zol_driver::driver::ZolIscsiDriver;
use zol_driver::types::{Snapshot, Volume};

#[derive(Parser, Debug)]
#[command(name = "zol-driver")]
#[command(about = "ZFS-on-Linux iSCSI volume driver")]
struct Args {
    /// ZFS binary to invoke
    #[arg(long, env = "ZFS_COMMAND", default_value = "zfs")]
    zfs_command: String,

    /// Create sparse volumes
    #[arg(long, env = "THIN_PROVISION")]
    thin_provision: bool,

    /// Prefix forming a volume's dataset path (e.g. rpool/)
    #[arg(long, env = "POOL_NAME_PREFIX", default_value = "rpool/")]
    pool_name_prefix: String,

    /// Prefix forming a volume's IQN
    #[arg(
        long,
        env = "ISCSI_TARGET_PREFIX",
        default_value = "iqn.2010-10.org.openstack:"
    )]
    iscsi_target_prefix: String,

    /// Address advertised to initiators
    #[arg(long, env = "ISCSI_IP_ADDRESS", default_value = "127.0.0.1")]
    iscsi_ip_address: String,

    #[arg(long, env = "ISCSI_PORT", default_value = "3260")]
    iscsi_port: u16,

    /// Dataset under /dev/zvol holding exported devices
    #[arg(long, env = "VOLUME_GROUP", default_value = "rpool")]
    volume_group: String,

    /// Directory of per-volume target files
    #[arg(long, env = "VOLUMES_DIR", default_value = "/var/lib/zol-driver/volumes")]
    volumes_dir: PathBuf,

    /// Target daemon tooling (tgtadm, ietadm)
    #[arg(long, env = "TARGET_HELPER", default_value = "tgtadm")]
    target_helper: TargetHelper,

    /// Size of each host's target-id pool (ietadm only)
    #[arg(long, env = "ISCSI_NUM_TARGETS", default_value = "100")]
    iscsi_num_targets: u32,

    /// iSCSI target id table (ietadm only)
    #[arg(
        long,
        env = "TARGET_TABLE_PATH",
        default_value = "/var/lib/zol-driver/targets.json"
    )]
    target_table: PathBuf,

    /// Run commands over SSH on the storage host instead of locally
    #[arg(long, env = "RUN_REMOTE")]
    remote: bool,

    /// Command prefix for privileged local commands
    #[arg(long, env = "ROOT_HELPER", default_value = "sudo")]
    root_helper: String,

    /// Storage host for remote execution
    #[arg(long, env = "SSH_HOST", default_value = "")]
    ssh_host: String,

    #[arg(long, env = "SSH_PORT", default_value = "22")]
    ssh_port: u16,

    /// Login user for remote execution
    #[arg(long, env = "SSH_LOGIN", default_value = "")]
    ssh_login: String,

    /// Private key for remote execution (ssh agent when unset)
    #[arg(long, env = "SSH_IDENTITY_FILE")]
    ssh_identity_file: Option<PathBuf>,

    #[arg(long, env = "SSH_CONNECT_TIMEOUT", default_value = "30")]
    ssh_connect_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct VolumeArgs {
    /// Volume id; the volume name is `volume-<id>` unless --name is given
    #[arg(long)]
    id: String,

    #[arg(long)]
    name: Option<String>,

    /// Host owning the volume (defaults to this host's name)
    #[arg(long)]
    host: Option<String>,

    #[arg(long, default_value = "1")]
    size_gb: u64,

    /// Provider location recorded by create-export
    #[arg(long)]
    provider_location: Option<String>,
}

impl VolumeArgs {
    fn into_volume(self) -> Result<Volume, Box<dyn std::error::Error>> {
        let host = match self.host {
            Some(host) => host,
            None => hostname::get()?.to_string_lossy().into_owned(),
        };
        let mut volume = Volume::new(&self.id, &host, self.size_gb);
        if let Some(name) = self.name {
            volume.name = name;
        }
        volume.provider_location = self.provider_location;
        Ok(volume)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a volume
    CreateVolume(VolumeArgs),
    /// Create a volume from a snapshot
    CloneVolume {
        #[command(flatten)]
        volume: VolumeArgs,
        /// Snapshot name under the pool prefix
        #[arg(long)]
        snapshot: String,
    },
    /// Delete a volume (no-op if absent)
    DeleteVolume(VolumeArgs),
    /// Report whether a volume exists
    Exists {
        #[arg(long)]
        name: String,
    },
    /// Export a volume over iSCSI
    CreateExport(VolumeArgs),
    /// Remove a volume's iSCSI export
    RemoveExport(VolumeArgs),
    /// Verify a volume's export is live
    CheckExport {
        #[arg(long)]
        id: String,
    },
    /// Print a volume's device path
    LocalPath(VolumeArgs),
    /// Print the initiator connection properties of an exported volume
    InitializeConnection(VolumeArgs),
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // stdout carries command results
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = DriverConfig {
        zfs_command: args.zfs_command,
        thin_provision: args.thin_provision,
        pool_name_prefix: args.pool_name_prefix,
        iscsi_target_prefix: args.iscsi_target_prefix,
        iscsi_ip_address: args.iscsi_ip_address,
        iscsi_port: args.iscsi_port,
        volume_group: args.volume_group,
        volumes_dir: args.volumes_dir,
        run_local: !args.remote,
        root_helper: args.root_helper,
        target_helper: args.target_helper,
        iscsi_num_targets: args.iscsi_num_targets,
        ssh: SshConfig {
            host: args.ssh_host,
            port: args.ssh_port,
            login: args.ssh_login,
            identity_file: args.ssh_identity_file,
            connect_timeout_secs: args.ssh_connect_timeout,
            ..SshConfig::default()
        },
    };
    debug!(?config, "Driver configuration");

    let db = Arc::new(JsonTargetTable::open(&args.target_table)?);
    let driver = ZolIscsiDriver::new(config, db);
    driver
        .check_for_setup_error()
        .map_err(|e| format!("Startup validation failed: {}", e))?;

    let ctx = RequestContext::new();
    info!(request_id = %ctx.request_id, "Handling request");

    match args.command {
        Command::CreateVolume(volume) => driver.create_volume(&volume.into_volume()?)?,
        Command::CloneVolume { volume, snapshot } => driver.create_volume_from_snapshot(
            &volume.into_volume()?,
            &Snapshot { name: snapshot },
        )?,
        Command::DeleteVolume(volume) => driver.delete_volume(&volume.into_volume()?)?,
        Command::Exists { name } => {
            print_json(&serde_json::json!({ "exists": driver.volume_exists(&name) }))?
        }
        Command::CreateExport(volume) => {
            print_json(&driver.create_export(&ctx, &volume.into_volume()?)?)?
        }
        Command::RemoveExport(volume) => driver.remove_export(&ctx, &volume.into_volume()?)?,
        Command::CheckExport { id } => driver.check_for_export(&ctx, &id)?,
        Command::LocalPath(volume) => {
            print_json(&serde_json::json!({ "path": driver.local_path(&volume.into_volume()?) }))?
        }
        Command::InitializeConnection(volume) => {
            print_json(&driver.initialize_connection(&volume.into_volume()?)?)?
        }
    }

    Ok(())
}
