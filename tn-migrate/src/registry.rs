//! Desired sites, site groups and devices.
//!
//! One row per device; site and site-group rows are derived from the device
//! rows. Rows with `register = false` are ignored.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceEntry {
    /// New-topology hostname.
    pub name: String,
    /// Device type slug.
    pub device_type: String,
    #[serde(default)]
    pub region: Option<String>,
    /// Site slug.
    pub site: String,
    #[serde(default)]
    pub site_name: Option<String>,
    /// Site group slug.
    #[serde(default)]
    pub sitegroup: Option<String>,
    #[serde(default)]
    pub sitegroup_name: Option<String>,
    #[serde(default = "default_register")]
    pub register: bool,
    /// Primary management address.
    #[serde(default)]
    pub ipv4: Option<String>,
    /// Prefix length of `ipv4`.
    #[serde(default)]
    pub cidr: Option<u8>,
}

fn default_register() -> bool {
    true
}

impl DeviceEntry {
    /// `ipv4/cidr`, when both are set.
    pub fn address(&self) -> Option<String> {
        match (&self.ipv4, self.cidr) {
            (Some(ip), Some(cidr)) => Some(format!("{ip}/{cidr}")),
            (Some(ip), None) if ip.contains('/') => Some(ip.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl Registry {
    /// Rows marked for registration.
    pub fn registered(&self) -> impl Iterator<Item = &DeviceEntry> {
        self.devices.iter().filter(|d| d.register)
    }

    pub fn device(&self, name: &str) -> Option<&DeviceEntry> {
        self.registered().find(|d| d.name == name)
    }
}

#[derive(Debug, Error)]
pub enum RegistryLoadError {
    #[error("failed to read registry {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse registry {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to parse registry {path}: {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid registry {path}: {message}")]
    Invalid { path: String, message: String },
}

/// Load a registry; `.json` files are JSON, anything else TOML.
pub fn load_registry(path: &Path) -> Result<Registry, RegistryLoadError> {
    let name = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| RegistryLoadError::Io {
        path: name.clone(),
        source,
    })?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let registry: Registry = if is_json {
        serde_json::from_str(&raw).map_err(|source| RegistryLoadError::Json {
            path: name.clone(),
            source,
        })?
    } else {
        toml::from_str(&raw).map_err(|source| RegistryLoadError::Toml {
            path: name.clone(),
            source,
        })?
    };
    for entry in &registry.devices {
        if entry.name.trim().is_empty() || entry.site.trim().is_empty() {
            return Err(RegistryLoadError::Invalid {
                path: name,
                message: "device rows need a name and a site".to_string(),
            });
        }
        if entry.cidr.is_some_and(|c| c > 32) {
            return Err(RegistryLoadError::Invalid {
                path: name,
                message: format!("device {}: prefix length above 32", entry.name),
            });
        }
    }
    Ok(registry)
}
