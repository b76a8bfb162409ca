use std::fs;
use std::path::Path;

use serde::Deserialize;
use switch_config_core::ParserOptions;
use thiserror::Error;

/// Operator settings for a migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub hostnames: HostnameSettings,
    pub parser: ParserSettings,
    pub classification: ClassificationSettings,
    pub inventory: InventorySettings,
    pub defaults: EntityDefaults,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostnameSettings {
    pub legacy_suffix: String,
}

impl Default for HostnameSettings {
    fn default() -> Self {
        Self {
            legacy_suffix: "-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParserSettings {
    pub uplink_marker: String,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            uplink_marker: ParserOptions::default().uplink_marker,
        }
    }
}

impl ParserSettings {
    pub fn options(&self) -> ParserOptions {
        ParserOptions {
            uplink_marker: self.uplink_marker.clone(),
        }
    }
}

/// Regex predicates routing ports away from a straight rename.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassificationSettings {
    pub aggregate_ports: Vec<String>,
    pub wireless_ap_descriptions: Vec<String>,
    pub meraki_descriptions: Vec<String>,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            aggregate_ports: vec![r"^ae\d+".to_string()],
            wireless_ap_descriptions: vec!["^o-".to_string()],
            meraki_descriptions: vec!["^s-".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventorySettings {
    pub url: String,
    /// Environment variable holding the API token.
    pub token_env: String,
    pub batch_size: usize,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            token_env: "NETBOX_API_TOKEN".to_string(),
            batch_size: 100,
            retry_attempts: 3,
            retry_backoff_ms: 500,
            timeout_secs: 30,
        }
    }
}

/// Fixed fields of entities created in the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EntityDefaults {
    pub device_role: String,
    pub status: String,
}

impl Default for EntityDefaults {
    fn default() -> Self {
        Self {
            device_role: "edge-sw".to_string(),
            status: "active".to_string(),
        }
    }
}

/// Errors returned when loading settings.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid classification pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Load settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigLoadError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_settings(&raw, path.display().to_string())
}

/// Built-in settings.
pub fn default_settings() -> Settings {
    let embedded = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml"));
    parse_settings(embedded, "embedded settings".to_string()).unwrap_or_default()
}

fn parse_settings(raw: &str, path: String) -> Result<Settings, ConfigLoadError> {
    let settings: Settings =
        toml::from_str(raw).map_err(|source| ConfigLoadError::Parse { path, source })?;
    if settings.inventory.batch_size == 0 {
        return Err(ConfigLoadError::Invalid(
            "inventory.batch_size must be at least 1".to_string(),
        ));
    }
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_settings_match_defaults() {
        assert_eq!(default_settings(), Settings::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");
        fs::write(
            &path,
            "[hostnames]\nlegacy_suffix = \"-old\"\n[inventory]\nbatch_size = 25\n",
        )
        .expect("write settings");

        let settings = load_settings(&path).expect("settings should parse");
        assert_eq!(settings.hostnames.legacy_suffix, "-old");
        assert_eq!(settings.inventory.batch_size, 25);
        assert_eq!(settings.inventory.retry_attempts, 3);
        assert_eq!(settings.parser.uplink_marker, "uplink");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_settings("[parser]\nuplink = \"x\"\n", "inline".to_string())
            .expect_err("unknown key");
        assert!(matches!(err, ConfigLoadError::Parse { .. }));
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let err = parse_settings("[inventory]\nbatch_size = 0\n", "inline".to_string())
            .expect_err("zero batch");
        assert!(matches!(err, ConfigLoadError::Invalid(_)));
    }
}
