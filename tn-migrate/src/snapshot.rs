//! Topology snapshot input.
//!
//! The snapshot is a JSON document produced by an external topology query:
//!
//! ```json
//! {
//!   "interfaces": {
//!     "minami3-1": {
//!       "ge-0/0/0.0": {"Active": true, "Switchport_Mode": "ACCESS", "Access_VLAN": 20}
//!     }
//!   },
//!   "vlans": {"minami3-1": [20, 30]}
//! }
//! ```
//!
//! Column names are accepted both in snake case and in the capitalised form
//! emitted by the query tool.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use switch_config_core::{parse_vlan_expr, RangeError, VlanSet};
use thiserror::Error;

/// Interface facts of one device as reported by the topology query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInterface {
    #[serde(default = "default_active", alias = "Active")]
    pub active: bool,
    #[serde(default, alias = "Switchport_Mode")]
    pub switchport_mode: Option<String>,
    #[serde(default, alias = "Access_VLAN")]
    pub access_vlan: Option<u16>,
    #[serde(default, alias = "Allowed_VLANs")]
    pub allowed_vlans: Option<AllowedVlans>,
    #[serde(default, alias = "Native_VLAN")]
    pub native_vlan: Option<u16>,
    #[serde(default, alias = "Description")]
    pub description: Option<String>,
}

impl Default for SnapshotInterface {
    fn default() -> Self {
        Self {
            active: default_active(),
            switchport_mode: None,
            access_vlan: None,
            allowed_vlans: None,
            native_vlan: None,
            description: None,
        }
    }
}

fn default_active() -> bool {
    true
}

/// Allowed VLANs, either as a list of ids or as a range expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedVlans {
    Ids(Vec<u16>),
    Expr(String),
}

impl AllowedVlans {
    pub fn to_set(&self) -> Result<VlanSet, RangeError> {
        match self {
            Self::Ids(ids) => Ok(ids.iter().copied().collect()),
            Self::Expr(expr) if expr.trim().is_empty() => Ok(VlanSet::new()),
            Self::Expr(expr) => parse_vlan_expr(expr),
        }
    }
}

/// Read-only topology snapshot of the legacy network.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    /// host -> interface name -> facts
    #[serde(default)]
    pub interfaces: BTreeMap<String, BTreeMap<String, SnapshotInterface>>,
    /// host -> VLAN ids in use
    #[serde(default)]
    pub vlans: BTreeMap<String, Vec<u16>>,
}

impl TopologySnapshot {
    pub fn hosts(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    pub fn contains_host(&self, host: &str) -> bool {
        self.interfaces.contains_key(host)
    }

    pub fn vlans_in_use(&self, host: &str) -> &[u16] {
        self.vlans.get(host).map(Vec::as_slice).unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum SnapshotLoadError {
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse snapshot {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

pub fn load_snapshot(path: &Path) -> Result<TopologySnapshot, SnapshotLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| SnapshotLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SnapshotLoadError::Parse {
        path: path.display().to_string(),
        source,
    })
}
