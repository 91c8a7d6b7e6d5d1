//! Volume records consumed by the driver.
//!
//! These are owned by the external volume-metadata store; the driver only reads
//! them and reports changes back through [`ModelUpdate`].

use serde::{Deserialize, Serialize};

/// Volume name template applied to volume ids.
pub fn volume_name(volume_id: &str) -> String {
    format!("volume-{}", volume_id)
}

/// A block volume as known to the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: String,
    pub name: String,
    /// Host running the volume service that owns this volume
    pub host: String,
    /// Set once exported: `<ip>:<port>,<tid> <iqn> <lun>`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_location: Option<String>,
    /// Size in GiB
    #[serde(default)]
    pub size_gb: u64,
}

impl Volume {
    /// A volume named from its id by the standard template.
    pub fn new(id: &str, host: &str, size_gb: u64) -> Self {
        Self {
            id: id.to_string(),
            name: volume_name(id),
            host: host.to_string(),
            provider_location: None,
            size_gb,
        }
    }

    pub fn with_provider_location(mut self, location: impl Into<String>) -> Self {
        self.provider_location = Some(location.into());
        self
    }
}

/// A snapshot, used only as a clone source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
}

/// Fields the caller should persist on the volume after an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUpdate {
    pub provider_location: String,
}
