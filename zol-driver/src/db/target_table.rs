//! JSON-file-backed iSCSI target table.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{DbError, RequestContext, Result, VolumeDatabase};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct TargetTable {
    #[serde(default)]
    hosts: BTreeMap<String, HostTargets>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct HostTargets {
    /// Target ids 1..=pool_size may be allocated
    pool_size: u32,
    /// Target id -> volume id
    #[serde(default)]
    allocations: BTreeMap<u32, String>,
}

impl HostTargets {
    fn target_of(&self, volume_id: &str) -> Option<u32> {
        self.allocations
            .iter()
            .find(|(_, vol)| vol.as_str() == volume_id)
            .map(|(tid, _)| *tid)
    }

    fn first_free(&self) -> Option<u32> {
        (1..=self.pool_size).find(|tid| !self.allocations.contains_key(tid))
    }
}

/// Target table persisted as a JSON document.
///
/// The whole table is rewritten atomically on every change. Concurrent use
/// from several processes is not coordinated.
pub struct JsonTargetTable {
    path: PathBuf,
    table: RwLock<TargetTable>,
}

impl JsonTargetTable {
    /// Load the table at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = if path.exists() {
            let content = fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            debug!(path = %path.display(), "Target table not found, starting empty");
            TargetTable::default()
        };

        Ok(Self {
            path,
            table: RwLock::new(table),
        })
    }

    fn save(&self, table: &TargetTable) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;

        let mut temp_file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp_file, table)?;
        temp_file
            .persist(&self.path)
            .map_err(|e| DbError::Io(e.error))?;
        Ok(())
    }

    /// Apply a change to a copy of the table, persist it, then publish it.
    fn update<T>(&self, change: impl FnOnce(&mut TargetTable) -> Result<(T, bool)>) -> Result<T> {
        let mut guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        let (value, changed) = change(&mut next)?;
        if changed {
            self.save(&next)?;
            *guard = next;
        }
        Ok(value)
    }
}

impl VolumeDatabase for JsonTargetTable {
    fn ensure_iscsi_targets(&self, ctx: &RequestContext, host: &str, count: u32) -> Result<()> {
        self.update(|table| {
            let host_targets = table.hosts.entry(host.to_string()).or_default();
            if host_targets.pool_size >= count {
                return Ok(((), false));
            }
            info!(request_id = %ctx.request_id, host, count, "Provisioning iSCSI targets");
            host_targets.pool_size = count;
            Ok(((), true))
        })
    }

    fn allocate_iscsi_target(
        &self,
        ctx: &RequestContext,
        volume_id: &str,
        host: &str,
    ) -> Result<u32> {
        self.update(|table| {
            let host_targets = table
                .hosts
                .get_mut(host)
                .ok_or_else(|| DbError::NoMoreTargets(host.to_string()))?;

            if let Some(tid) = host_targets.target_of(volume_id) {
                return Ok((tid, false));
            }

            let tid = host_targets
                .first_free()
                .ok_or_else(|| DbError::NoMoreTargets(host.to_string()))?;
            host_targets.allocations.insert(tid, volume_id.to_string());
            info!(request_id = %ctx.request_id, volume_id, host, tid, "Allocated iSCSI target");
            Ok((tid, true))
        })
    }

    fn get_iscsi_target_num(&self, _ctx: &RequestContext, volume_id: &str) -> Result<u32> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table
            .hosts
            .values()
            .find_map(|host_targets| host_targets.target_of(volume_id))
            .ok_or_else(|| DbError::NotFound(volume_id.to_string()))
    }

    fn release_iscsi_target(&self, ctx: &RequestContext, volume_id: &str) -> Result<()> {
        self.update(|table| {
            for (host, host_targets) in table.hosts.iter_mut() {
                if let Some(tid) = host_targets.target_of(volume_id) {
                    host_targets.allocations.remove(&tid);
                    info!(request_id = %ctx.request_id, volume_id, host, tid, "Released iSCSI target");
                    return Ok(((), true));
                }
            }
            Ok(((), false))
        })
    }
}
