use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::range::VlanSet;

/// VLAN tagging discipline of a switch port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortMode {
    #[default]
    None,
    Access,
    Trunk,
}

impl FromStr for PortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "access" => Ok(Self::Access),
            "trunk" | "tagged" => Ok(Self::Trunk),
            other => Err(format!("unknown port mode '{other}'")),
        }
    }
}

impl Display for PortMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "NONE",
            Self::Access => "ACCESS",
            Self::Trunk => "TRUNK",
        })
    }
}

/// Canonical per-port record of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub name: String,
    pub enabled: bool,
    pub description: String,
    pub mode: PortMode,
    pub untagged_vlan: Option<u16>,
    pub tagged_vlans: VlanSet,
    pub is_lag_member: bool,
    pub is_physical: bool,
}

impl InterfaceRecord {
    /// An enabled port with no VLAN semantics.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let is_physical = is_physical_name(&name);
        Self {
            name,
            enabled: true,
            description: String::new(),
            mode: PortMode::None,
            untagged_vlan: None,
            tagged_vlans: VlanSet::new(),
            is_lag_member: false,
            is_physical,
        }
    }

    /// Apply every field the override sets, keeping the rest.
    ///
    /// An override that changes the port mode replaces the VLAN facts of the
    /// old mode instead of merging into them. Applying the same override twice
    /// yields the same record as applying it once.
    pub fn apply(&mut self, ov: &InterfaceOverride) {
        if let Some(enabled) = ov.enabled {
            self.enabled = enabled;
        }
        if let Some(description) = &ov.description {
            self.description = description.clone();
        }
        if let Some(mode) = ov.mode {
            if mode != self.mode {
                self.untagged_vlan = None;
                self.tagged_vlans = VlanSet::new();
            }
            self.mode = mode;
        }
        if let Some(untagged) = ov.untagged_vlan {
            self.untagged_vlan = Some(untagged);
        }
        if let Some(tagged) = &ov.tagged_vlans {
            self.tagged_vlans = tagged.clone();
        }
        if let Some(lag) = ov.is_lag_member {
            self.is_lag_member = lag;
        }
        self.normalize_mode();
    }

    /// Drop VLAN facts that contradict the port mode.
    pub fn normalize_mode(&mut self) {
        match self.mode {
            PortMode::None => {
                self.untagged_vlan = None;
                self.tagged_vlans = VlanSet::new();
            }
            PortMode::Access => self.tagged_vlans = VlanSet::new(),
            PortMode::Trunk => {}
        }
    }

    /// Every VLAN id the record refers to, untagged first.
    pub fn referenced_vlans(&self) -> Vec<u16> {
        let mut vids: Vec<u16> = self.untagged_vlan.into_iter().collect();
        vids.extend(self.tagged_vlans.iter().filter(|v| Some(*v) != self.untagged_vlan));
        vids
    }
}

/// Partial interface facts; `None` fields leave the base record untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<PortMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub untagged_vlan: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tagged_vlans: Option<VlanSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_lag_member: Option<bool>,
    /// Where the override came from (range name or interface block).
    pub source: OverrideSource,
}

impl InterfaceOverride {
    /// Merge `other` on top of `self`, field by field.
    pub fn merge(&mut self, other: &InterfaceOverride) {
        if other.mode.is_some() && other.mode != self.mode {
            self.untagged_vlan = None;
            self.tagged_vlans = None;
        }
        if other.enabled.is_some() {
            self.enabled = other.enabled;
        }
        if other.description.is_some() {
            self.description.clone_from(&other.description);
        }
        if other.mode.is_some() {
            self.mode = other.mode;
        }
        if other.untagged_vlan.is_some() {
            self.untagged_vlan = other.untagged_vlan;
        }
        if other.tagged_vlans.is_some() {
            self.tagged_vlans.clone_from(&other.tagged_vlans);
        }
        if other.is_lag_member.is_some() {
            self.is_lag_member = other.is_lag_member;
        }
        self.source = other.source.clone();
    }

    /// Whether the override carries VLAN semantics of its own.
    pub fn has_mode(&self) -> bool {
        matches!(self.mode, Some(PortMode::Access | PortMode::Trunk))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum OverrideSource {
    #[default]
    Interface,
    Range(String),
}

/// A VLAN definition; identity is the vid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanRecord {
    pub vid: u16,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// Name prefixes of front-panel ports.
const PHYSICAL_PREFIXES: &[&str] = &["ge-", "xe-", "et-", "mge-", "fe-", "gr-"];

/// Whether an interface name denotes a physical port rather than a logical one.
pub fn is_physical_name(name: &str) -> bool {
    PHYSICAL_PREFIXES.iter().any(|p| name.starts_with(p)) && !name.contains('.')
}
