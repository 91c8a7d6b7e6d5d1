//! Export addressing and the provider-location string.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{Result, TargetError};

/// How a target daemon identifies its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetAddressing {
    /// Everything derives from the IQN; target id is always 0 (tgtadm)
    Stateless,
    /// Integer target ids allocated from the volume database (ietadm)
    TableBacked,
}

impl TargetAddressing {
    /// LUN advertised to initiators in the export location.
    pub fn export_lun(self) -> u32 {
        match self {
            TargetAddressing::Stateless => 1,
            TargetAddressing::TableBacked => 0,
        }
    }
}

/// Export location persisted with a volume.
///
/// Format: `<ip>:<port>,<tid> <iqn> <lun>`
/// Example: `10.0.0.5:3260,1 iqn.2010-10.org.openstack:volume-42 0`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderLocation {
    /// `<ip>:<port>`
    pub portal: String,
    pub target_id: u32,
    pub iqn: String,
    pub lun: u32,
}

impl ProviderLocation {
    pub fn new(ip: &str, port: u16, target_id: u32, iqn: &str, lun: u32) -> Self {
        Self {
            portal: format!("{}:{}", ip, port),
            target_id,
            iqn: iqn.to_string(),
            lun,
        }
    }

    /// Parse a stored location string.
    pub fn parse(s: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(TargetError::ParseError(format!(
                "expected 3 fields in provider location, got {}: '{}'",
                fields.len(),
                s
            )));
        }

        let (portal, tid) = fields[0].split_once(',').ok_or_else(|| {
            TargetError::ParseError(format!("missing target id in portal '{}'", fields[0]))
        })?;
        let target_id = tid
            .parse()
            .map_err(|_| TargetError::ParseError(format!("invalid target id: {}", tid)))?;
        let lun = fields[2]
            .parse()
            .map_err(|_| TargetError::ParseError(format!("invalid LUN: {}", fields[2])))?;

        Ok(Self {
            portal: portal.to_string(),
            target_id,
            iqn: fields[1].to_string(),
            lun,
        })
    }

    /// IQN field of a stored location, without validating the rest.
    pub fn iqn_field(location: &str) -> Option<&str> {
        location.split_whitespace().nth(1)
    }
}

impl Display for ProviderLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{} {} {}",
            self.portal, self.target_id, self.iqn, self.lun
        )
    }
}

impl FromStr for ProviderLocation {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Connection properties handed to an iSCSI initiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IscsiProperties {
    /// Whether the target was found by discovery rather than from the location
    pub target_discovered: bool,
    pub target_portal: String,
    pub target_iqn: String,
    pub target_lun: u32,
    pub volume_id: String,
}

impl IscsiProperties {
    pub fn from_location(location: &ProviderLocation, volume_id: &str) -> Self {
        Self {
            target_discovered: false,
            target_portal: location.portal.clone(),
            target_iqn: location.iqn.clone(),
            target_lun: location.lun,
            volume_id: volume_id.to_string(),
        }
    }
}
