//! ZFS-on-Linux iSCSI Volume Driver Library
//!
//! This library manages ZFS zvols and exports them over iSCSI, running the
//! underlying `zfs` and target-daemon tools either locally or on a storage host
//! over SSH.
//!
//! The library is split into several modules:
//! - `exec`: command dispatch to a local process or an SSH session
//! - `zfs`: zvol create, clone, existence probe and delete
//! - `target`: iSCSI target administration (tgtadm, ietadm)
//! - `db`: iSCSI target id table for table-backed target daemons
//! - `driver`: the volume driver operations built on the above
//! - `metrics`: operation counters and timings

pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod exec;
pub mod metrics;
pub mod target;
pub mod types;
pub mod zfs;

pub use config::{DriverConfig, SshConfig, TargetHelper};
pub use db::{JsonTargetTable, RequestContext, VolumeDatabase};
pub use driver::ZolIscsiDriver;
pub use error::{DriverError, Result};
pub use exec::{Dispatcher, ExecOptions, ExecOutput, Execute};
pub use types::{ModelUpdate, Snapshot, Volume};
pub use zfs::ZfsManager;
