//! Port and description rule engine.
//!
//! A rulebook maps `device -> legacy port -> rule`. The device key `"*"`
//! holds the shared table used by devices that have no table of their own.
//! Lookups distinguish three outcomes: the device is unsupported, the port
//! has no rule (it is intentionally not migrated), or a rule exists, which
//! may still carry an explicit null target.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device key of the shared fallback table.
pub const WILDCARD_DEVICE: &str = "*";

/// Conversion rule for one legacy port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PortRule {
    /// New port name; `None` retires the port explicitly.
    #[serde(default, alias = "new_port")]
    pub new_port: Option<String>,
    /// Replacement description; `None` keeps the legacy one.
    #[serde(default, alias = "new_description")]
    pub new_description: Option<String>,
    /// Administrative state on the new port.
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Aggregation group the new port joins.
    #[serde(default)]
    pub lag: Option<String>,
}

/// Result of a rule lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleLookup<'a> {
    /// Neither a device table nor a fallback table exists.
    UnsupportedDevice,
    /// The device table has no entry for the port.
    NoRule,
    Rule(&'a PortRule),
}

type RuleTable = BTreeMap<String, PortRule>;

/// Declarative per-device rule tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rulebook {
    devices: BTreeMap<String, RuleTable>,
}

impl Rulebook {
    pub fn from_tables(devices: BTreeMap<String, RuleTable>) -> Self {
        Self { devices }
    }

    /// The table that applies to a device, falling back to `"*"`.
    pub fn table(&self, device: &str) -> Option<&RuleTable> {
        self.devices
            .get(device)
            .or_else(|| self.devices.get(WILDCARD_DEVICE))
    }

    pub fn supports(&self, device: &str) -> bool {
        self.table(device).is_some()
    }

    /// Devices with a table of their own.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.devices
            .keys()
            .map(String::as_str)
            .filter(|d| *d != WILDCARD_DEVICE)
    }

    pub fn has_fallback(&self) -> bool {
        self.devices.contains_key(WILDCARD_DEVICE)
    }

    pub fn lookup(&self, device: &str, port: &str) -> RuleLookup<'_> {
        match self.table(device) {
            None => RuleLookup::UnsupportedDevice,
            Some(table) => table.get(port).map_or(RuleLookup::NoRule, RuleLookup::Rule),
        }
    }

    /// New port name for a legacy port, if the port migrates at all.
    pub fn convert_port(&self, device: &str, port: &str) -> Option<&str> {
        match self.lookup(device, port) {
            RuleLookup::Rule(rule) => rule.new_port.as_deref(),
            RuleLookup::UnsupportedDevice | RuleLookup::NoRule => None,
        }
    }

    /// Description for the migrated port: the rule's replacement or the legacy text.
    pub fn convert_description<'a>(
        &'a self,
        device: &str,
        port: &str,
        legacy: &'a str,
    ) -> Option<&'a str> {
        match self.lookup(device, port) {
            RuleLookup::Rule(rule) => Some(rule.new_description.as_deref().unwrap_or(legacy)),
            RuleLookup::UnsupportedDevice | RuleLookup::NoRule => None,
        }
    }
}

/// Errors returned when loading a rulebook (a malformed rule file).
#[derive(Debug, Error)]
pub enum RuleLoadError {
    #[error("failed to read rulebook {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse rulebook {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to parse rulebook {path}: {source}")]
    Toml {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid rulebook {path}: {message}")]
    Invalid { path: String, message: String },
}

/// Load a rulebook; `.json` files are JSON, anything else TOML.
pub fn load_rulebook(path: &Path) -> Result<Rulebook, RuleLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| RuleLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let name = path.display().to_string();
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        parse_rulebook_json(&raw, name)
    } else {
        parse_rulebook_toml(&raw, name)
    }
}

pub fn parse_rulebook_json(raw: &str, path: String) -> Result<Rulebook, RuleLoadError> {
    let book: Rulebook = serde_json::from_str(raw).map_err(|source| RuleLoadError::Json {
        path: path.clone(),
        source,
    })?;
    validate(book, path)
}

pub fn parse_rulebook_toml(raw: &str, path: String) -> Result<Rulebook, RuleLoadError> {
    let book: Rulebook = toml::from_str(raw).map_err(|source| RuleLoadError::Toml {
        path: path.clone(),
        source,
    })?;
    validate(book, path)
}

fn validate(book: Rulebook, path: String) -> Result<Rulebook, RuleLoadError> {
    let invalid = |message: String| RuleLoadError::Invalid {
        path: path.clone(),
        message,
    };
    for (device, table) in &book.devices {
        if device.trim().is_empty() {
            return Err(invalid("empty device name".to_string()));
        }
        for (port, rule) in table {
            if port.trim().is_empty() {
                return Err(invalid(format!("device {device}: empty port name")));
            }
            if rule.new_port.as_deref().is_some_and(|p| p.trim().is_empty()) {
                return Err(invalid(format!(
                    "device {device} port {port}: newPort is empty (omit it to retire the port)"
                )));
            }
        }
    }
    Ok(book)
}
