//! Offline pipeline: configs + snapshot -> interface map -> migration result.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use switch_config_core::{parse_config_file, BlockError, ParsedConfig, ParserOptions, VlanRecord};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::classify::ClassificationPolicy;
use crate::migrate::{DeviceSkipReason, HostnameMap, MigrationResult, Orchestrator};
use crate::model_builder::{build_interface_map, DeviceInterfaceMap};
use crate::rules::Rulebook;
use crate::snapshot::TopologySnapshot;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read configuration directory {path}: {source}")]
    ConfigDir {
        path: String,
        source: std::io::Error,
    },
}

/// Parsed device configurations keyed by legacy hostname (the file name).
#[derive(Debug, Clone, Default)]
pub struct DeviceConfigs {
    pub parsed: BTreeMap<String, ParsedConfig>,
    /// Devices whose configuration failed structurally, with the reason.
    pub failed: BTreeMap<String, String>,
}

impl DeviceConfigs {
    pub fn block_errors(&self) -> BTreeMap<String, Vec<BlockError>> {
        self.parsed
            .iter()
            .filter(|(_, config)| !config.errors.is_empty())
            .map(|(host, config)| (host.clone(), config.errors.clone()))
            .collect()
    }

    /// VLAN definitions found in any configuration.
    pub fn vlans(&self) -> Vec<VlanRecord> {
        merge_vlans(self.parsed.values().flat_map(|config| config.vlans.iter()))
    }
}

/// Parse every regular, non-hidden file of `dir`; the file name is the hostname.
pub fn load_device_configs(dir: &Path, options: &ParserOptions) -> Result<DeviceConfigs, PipelineError> {
    let entries = fs::read_dir(dir).map_err(|source| PipelineError::ConfigDir {
        path: dir.display().to_string(),
        source,
    })?;
    let mut configs = DeviceConfigs::default();
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::ConfigDir {
            path: dir.display().to_string(),
            source,
        })?;
        let path = entry.path();
        let Some(host) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if host.starts_with('.') || !path.is_file() {
            continue;
        }
        match parse_config_file(&path, options) {
            Ok(config) => {
                for error in &config.errors {
                    warn!(device = %host, block = %error.block, "dropped block: {}", error.message);
                }
                debug!(device = %host, overrides = config.overrides.len(), "parsed configuration");
                configs.parsed.insert(host, config);
            }
            Err(err) => {
                warn!(device = %host, "configuration not parsed: {err}");
                configs.failed.insert(host, err.to_string());
            }
        }
    }
    Ok(configs)
}

/// Union of VLAN definitions; the first definition of a vid wins.
pub fn merge_vlans<'a>(vlans: impl IntoIterator<Item = &'a VlanRecord>) -> Vec<VlanRecord> {
    let mut seen = BTreeSet::new();
    let mut merged: Vec<VlanRecord> = vlans
        .into_iter()
        .filter(|vlan| seen.insert(vlan.vid))
        .cloned()
        .collect();
    merged.sort_by_key(|vlan| vlan.vid);
    merged
}

/// Snapshot VLAN ids per legacy host that no catalogue entry defines.
pub fn undefined_vlans(
    snapshot: &TopologySnapshot,
    catalogue: &[VlanRecord],
) -> BTreeMap<String, Vec<u16>> {
    let defined: BTreeSet<u16> = catalogue.iter().map(|vlan| vlan.vid).collect();
    let mut undefined = BTreeMap::new();
    for host in snapshot.vlans.keys() {
        let missing: BTreeSet<u16> = snapshot
            .vlans_in_use(host)
            .iter()
            .copied()
            .filter(|vid| !defined.contains(vid))
            .collect();
        if missing.is_empty() {
            continue;
        }
        warn!(device = %host, vids = ?missing, "VLANs in use have no definition");
        undefined.insert(host.clone(), missing.into_iter().collect());
    }
    undefined
}

/// Result of the offline pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub interface_map: DeviceInterfaceMap,
    pub migration: MigrationResult,
    pub block_errors: BTreeMap<String, Vec<BlockError>>,
}

/// Merge configs into the snapshot baseline and migrate every device.
///
/// Devices whose configuration failed to parse are left out and reported.
pub fn run_migration(
    snapshot: &TopologySnapshot,
    configs: &DeviceConfigs,
    rules: &Rulebook,
    policy: &ClassificationPolicy,
    hostnames: &HostnameMap,
) -> PipelineOutput {
    for host in snapshot.hosts() {
        if !configs.parsed.contains_key(host) && !configs.failed.contains_key(host) {
            warn!(device = host, "no configuration file; using snapshot facts only");
        }
    }
    for host in configs.parsed.keys() {
        if !snapshot.contains_host(host) {
            debug!(device = %host, "configuration has no snapshot device; ignored");
        }
    }

    let mut interface_map = build_interface_map(snapshot, &configs.parsed);
    for host in configs.failed.keys() {
        interface_map.remove(host);
    }

    let mut migration = Orchestrator::new(rules, policy, hostnames.clone()).run(&interface_map);
    let failed: BTreeMap<&str, &String> = configs
        .failed
        .iter()
        .map(|(legacy, message)| (hostnames.to_new(legacy), message))
        .collect();
    migration
        .skipped_devices
        .retain(|skip| !failed.contains_key(skip.hostname.as_str()));
    for (hostname, message) in failed {
        migration.skip(hostname, DeviceSkipReason::ConfigParseFailed(message.clone()));
    }
    info!(
        devices = migration.devices.len(),
        skipped = migration.skipped_devices.len(),
        "migration finished"
    );

    PipelineOutput {
        interface_map,
        migration,
        block_errors: configs.block_errors(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::rules::parse_rulebook_json;
    use crate::snapshot::SnapshotInterface;

    fn fixture(path: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join(path)
    }

    #[test]
    fn loads_every_config_and_records_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a-1"), "interfaces {\n ge-0/0/0 { disable; }\n}\n").expect("write");
        fs::write(dir.path().join("b-1"), "interfaces {\n ge-0/0/0 {\n").expect("write");
        fs::write(dir.path().join(".hidden"), "}").expect("write");

        let configs = load_device_configs(dir.path(), &ParserOptions::default()).expect("load");
        assert_eq!(configs.parsed.keys().collect::<Vec<_>>(), vec!["a-1"]);
        assert_eq!(configs.failed.keys().collect::<Vec<_>>(), vec!["b-1"]);
    }

    #[test]
    fn reports_vlans_in_use_without_definition() {
        let mut snapshot = TopologySnapshot::default();
        snapshot.vlans.insert("a-1".to_string(), vec![30, 20, 101, 30]);
        snapshot.vlans.insert("b-1".to_string(), vec![20]);
        let catalogue = vec![
            VlanRecord {
                vid: 20,
                name: "staff".to_string(),
                description: String::new(),
            },
            VlanRecord {
                vid: 30,
                name: "guest".to_string(),
                description: String::new(),
            },
        ];

        let undefined = undefined_vlans(&snapshot, &catalogue);
        assert_eq!(
            undefined,
            [("a-1".to_string(), vec![101])].into_iter().collect::<BTreeMap<_, _>>()
        );
        assert_eq!(undefined_vlans(&snapshot, &[]).len(), 2);
    }

    #[test]
    fn missing_directory_is_an_error() {
        let err = load_device_configs(&fixture("fixtures/absent"), &ParserOptions::default())
            .expect_err("missing dir");
        assert!(matches!(err, PipelineError::ConfigDir { .. }));
    }

    #[test]
    fn parse_failure_skips_device_instead_of_reporting_it_missing() {
        let mut snapshot = TopologySnapshot::default();
        snapshot
            .interfaces
            .entry("b-1".to_string())
            .or_default()
            .insert("ge-0/0/0".to_string(), SnapshotInterface::default());
        let mut configs = DeviceConfigs::default();
        configs
            .failed
            .insert("b-1".to_string(), "line 2: block 'interfaces' is not closed".to_string());
        let rules = parse_rulebook_json(
            r#"{"b": {"ge-0/0/0": {"newPort": "ge-0/0/1"}}}"#,
            "inline".to_string(),
        )
        .expect("rules");

        let output = run_migration(
            &snapshot,
            &configs,
            &rules,
            &ClassificationPolicy::default(),
            &HostnameMap::default(),
        );
        assert!(output.migration.devices.is_empty());
        assert_eq!(output.migration.skipped_devices.len(), 1);
        assert_eq!(output.migration.skipped_devices[0].hostname, "b");
        assert!(matches!(
            output.migration.skipped_devices[0].reason,
            DeviceSkipReason::ConfigParseFailed(_)
        ));
    }

    #[test]
    fn vlan_union_keeps_first_definition() {
        let vlans = [
            VlanRecord {
                vid: 30,
                name: "guest".to_string(),
                description: String::new(),
            },
            VlanRecord {
                vid: 20,
                name: "staff".to_string(),
                description: String::new(),
            },
            VlanRecord {
                vid: 30,
                name: "other".to_string(),
                description: String::new(),
            },
        ];
        let merged = merge_vlans(vlans.iter());
        assert_eq!(
            merged.iter().map(|v| (v.vid, v.name.as_str())).collect::<Vec<_>>(),
            vec![(20, "staff"), (30, "guest")]
        );
    }
}
