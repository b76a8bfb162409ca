//! Run report artifact and terminal rendering.
//!
//! The JSON artifact records old -> new port pairs per device, every port
//! and device that did not migrate, and the reconciliation outcome including
//! orphan VLANs. It is written whether or not reconciliation succeeded.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use colored::Colorize;
use serde::Serialize;
use switch_config_core::{BlockError, VlanSet};
use thiserror::Error;

use crate::inventory::Collection;
use crate::migrate::{DeviceSkip, DeviceSkipReason, MigrationResult, PortMapping, PortReport};
use crate::reconcile::{BatchFailure, ReconcileOutcome};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceReport {
    pub hostname: String,
    pub legacy_hostname: String,
    pub pairs: Vec<PortMapping>,
    /// Ports that were not renamed, with the reason.
    pub not_migrated: Vec<PortReport>,
    pub vlans_in_use: VlanSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub devices: Vec<DeviceReport>,
    pub skipped_devices: Vec<DeviceSkip>,
    /// legacy hostname -> blocks dropped by the parser
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub block_errors: BTreeMap<String, Vec<BlockError>>,
    /// legacy hostname -> vids in use with no VLAN definition
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub undefined_vlans: BTreeMap<String, Vec<u16>>,
}

impl MigrationReport {
    pub fn new(result: &MigrationResult, block_errors: &BTreeMap<String, Vec<BlockError>>) -> Self {
        let devices = result
            .devices
            .iter()
            .map(|device| DeviceReport {
                hostname: device.hostname.clone(),
                legacy_hostname: device.legacy_hostname.clone(),
                pairs: device.pairs.clone(),
                not_migrated: device.not_migrated().cloned().collect(),
                vlans_in_use: device.vlans_in_use.clone(),
            })
            .collect();
        Self {
            devices,
            skipped_devices: result.skipped_devices.clone(),
            block_errors: block_errors
                .iter()
                .filter(|(_, errors)| !errors.is_empty())
                .map(|(host, errors)| (host.clone(), errors.clone()))
                .collect(),
            undefined_vlans: BTreeMap::new(),
        }
    }

    pub fn with_undefined_vlans(mut self, undefined: BTreeMap<String, Vec<u16>>) -> Self {
        self.undefined_vlans = undefined;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedCreate {
    pub collection: Collection,
    pub key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconciliationReport {
    pub dry_run: bool,
    pub created: usize,
    pub updated: usize,
    pub planned_creates: Vec<PlannedCreate>,
    pub planned_updates: usize,
    /// device -> vids with no inventory VLAN
    pub orphan_vlans: BTreeMap<String, Vec<u16>>,
    pub missing_devices: Vec<String>,
    pub missing_interfaces: BTreeMap<String, Vec<String>>,
    pub failures: Vec<BatchFailure>,
}

impl From<&ReconcileOutcome> for ReconciliationReport {
    fn from(outcome: &ReconcileOutcome) -> Self {
        let plan = &outcome.plan;
        Self {
            dry_run: outcome.dry_run,
            created: outcome.created,
            updated: outcome.updated,
            planned_creates: plan
                .to_create
                .iter()
                .map(|op| PlannedCreate {
                    collection: op.collection,
                    key: op.key.clone(),
                })
                .collect(),
            planned_updates: plan.to_update.len(),
            orphan_vlans: plan.orphan_vlans.clone(),
            missing_devices: plan.missing_devices.clone(),
            missing_interfaces: plan.missing_interfaces.clone(),
            failures: outcome.failures.clone(),
        }
    }
}

/// The per-run artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub migration: MigrationReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconciliation: Option<ReconciliationReport>,
}

#[derive(Debug, Error)]
pub enum ReportWriteError {
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write report {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// Write the report as pretty-printed JSON.
pub fn write_report(path: &Path, report: &RunReport) -> Result<(), ReportWriteError> {
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json + "\n").map_err(|source| ReportWriteError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Render the migration half of a report. `verbose` lists every pair.
pub fn render_migration_text(report: &MigrationReport, verbose: bool) -> String {
    let mut out = Vec::new();
    out.push(
        format!(
            "migration devices={} skipped_devices={}",
            report.devices.len(),
            report.skipped_devices.len()
        )
        .cyan()
        .to_string(),
    );
    for device in &report.devices {
        out.push(format!(
            "device {} legacy={} migrated={} not_migrated={} vlans={}",
            device.hostname,
            device.legacy_hostname,
            device.pairs.len(),
            device.not_migrated.len(),
            device.vlans_in_use
        ));
        if verbose {
            for pair in &device.pairs {
                let lag = pair
                    .lag
                    .as_deref()
                    .map(|lag| format!(" lag={lag}"))
                    .unwrap_or_default();
                out.push(format!("  {} -> {}{lag}", pair.from, pair.to).green().to_string());
            }
        }
        for port in &device.not_migrated {
            out.push(
                format!("  {} {}", port.port, port.outcome.label())
                    .yellow()
                    .to_string(),
            );
        }
    }
    for skip in &report.skipped_devices {
        let line = match &skip.reason {
            DeviceSkipReason::NotInRulebook => {
                format!("skipped {} reason=not_in_rulebook", skip.hostname)
            }
            DeviceSkipReason::NotInSnapshot => {
                format!("skipped {} reason=not_in_snapshot", skip.hostname)
            }
            DeviceSkipReason::ConfigParseFailed(message) => {
                format!("skipped {} reason=config_parse_failed detail={message}", skip.hostname)
            }
        };
        out.push(line.yellow().to_string());
    }
    for (host, vids) in &report.undefined_vlans {
        let vids: VlanSet = vids.iter().copied().collect();
        out.push(
            format!("undefined_vlans {host} vids={vids}")
                .yellow()
                .to_string(),
        );
    }
    for (host, errors) in &report.block_errors {
        for error in errors {
            out.push(
                format!(
                    "block_error {host} block={} line={} {}",
                    error.block, error.line, error.message
                )
                .red()
                .to_string(),
            );
        }
    }
    out.join("\n")
}

/// Render the reconciliation half of a report.
pub fn render_reconciliation_text(report: &ReconciliationReport) -> String {
    let mut out = Vec::new();
    out.push(
        format!(
            "reconcile dry_run={} created={} updated={} planned_creates={} planned_updates={} failures={}",
            report.dry_run,
            report.created,
            report.updated,
            report.planned_creates.len(),
            report.planned_updates,
            report.failures.len()
        )
        .cyan()
        .to_string(),
    );
    for create in &report.planned_creates {
        out.push(
            format!("+ {} {}", create.collection, create.key)
                .green()
                .to_string(),
        );
    }
    for (device, vids) in &report.orphan_vlans {
        let vids: VlanSet = vids.iter().copied().collect();
        out.push(
            format!("orphan_vlans {device} vids={vids}")
                .magenta()
                .to_string(),
        );
    }
    for device in &report.missing_devices {
        out.push(format!("missing_device {device}").yellow().to_string());
    }
    for (device, ports) in &report.missing_interfaces {
        out.push(
            format!("missing_interfaces {device} ports={}", ports.join(","))
                .yellow()
                .to_string(),
        );
    }
    for failure in &report.failures {
        out.push(
            format!(
                "failed_batch {} {} keys={} error={}",
                failure.kind,
                failure.collection,
                failure.keys.join(","),
                failure.error
            )
            .red()
            .to_string(),
        );
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::inventory::WriteKind;
    use crate::migrate::{DeviceMigration, PortOutcome};

    fn result() -> MigrationResult {
        MigrationResult {
            devices: vec![DeviceMigration {
                legacy_hostname: "minami3-1".to_string(),
                hostname: "minami3".to_string(),
                pairs: vec![PortMapping {
                    from: "ge-0/0/0".to_string(),
                    to: "ge-0/0/1".to_string(),
                    lag: None,
                }],
                ports: vec![
                    PortReport {
                        port: "ge-0/0/0".to_string(),
                        outcome: PortOutcome::Migrated {
                            to: "ge-0/0/1".to_string(),
                        },
                    },
                    PortReport {
                        port: "ge-0/0/5".to_string(),
                        outcome: PortOutcome::Unmapped,
                    },
                ],
                interfaces: BTreeMap::new(),
                vlans_in_use: [20, 30].into_iter().collect(),
            }],
            skipped_devices: vec![DeviceSkip {
                hostname: "kita1".to_string(),
                reason: DeviceSkipReason::NotInRulebook,
            }],
        }
    }

    #[test]
    fn report_json_shape() {
        let report = RunReport {
            migration: MigrationReport::new(&result(), &BTreeMap::new()),
            reconciliation: Some(ReconciliationReport {
                orphan_vlans: [("minami3".to_string(), vec![30])].into_iter().collect(),
                ..ReconciliationReport::default()
            }),
        };
        let value = serde_json::to_value(&report).expect("serialize");
        assert_eq!(
            value["migration"]["devices"][0]["pairs"],
            json!([{"from": "ge-0/0/0", "to": "ge-0/0/1"}])
        );
        assert_eq!(
            value["migration"]["devices"][0]["not_migrated"],
            json!([{"port": "ge-0/0/5", "outcome": "unmapped"}])
        );
        assert_eq!(value["migration"]["devices"][0]["vlans_in_use"], json!([20, 30]));
        assert_eq!(
            value["migration"]["skipped_devices"],
            json!([{"hostname": "kita1", "reason": "not_in_rulebook"}])
        );
        assert_eq!(value["reconciliation"]["orphan_vlans"], json!({"minami3": [30]}));
        assert!(value["migration"].get("block_errors").is_none());
        assert!(value["migration"].get("undefined_vlans").is_none());
    }

    #[test]
    fn writes_report_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        let report = RunReport {
            migration: MigrationReport::new(&result(), &BTreeMap::new()),
            reconciliation: None,
        };
        write_report(&path, &report).expect("write");
        let raw = fs::read_to_string(&path).expect("read back");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert!(value.get("reconciliation").is_none());

        let missing_dir = dir.path().join("absent").join("report.json");
        assert!(matches!(
            write_report(&missing_dir, &report),
            Err(ReportWriteError::Io { .. })
        ));
    }

    #[test]
    fn text_rendering_lists_every_non_migrated_item() {
        colored::control::set_override(false);
        let mut errors = BTreeMap::new();
        errors.insert(
            "minami3-1".to_string(),
            vec![BlockError {
                block: "interface-range lab".to_string(),
                line: 12,
                message: "line 12: boom".to_string(),
            }],
        );
        let undefined = [("minami3-1".to_string(), vec![101, 102])].into_iter().collect();
        let report = MigrationReport::new(&result(), &errors).with_undefined_vlans(undefined);
        let text = render_migration_text(&report, true);
        assert!(text.contains("undefined_vlans minami3-1 vids=101-102"));
        assert!(text.contains("device minami3 legacy=minami3-1 migrated=1 not_migrated=1 vlans=20,30"));
        assert!(text.contains("  ge-0/0/0 -> ge-0/0/1"));
        assert!(text.contains("  ge-0/0/5 unmapped"));
        assert!(text.contains("skipped kita1 reason=not_in_rulebook"));
        assert!(text.contains("block_error minami3-1 block=interface-range lab line=12"));

        let reconcile = ReconciliationReport {
            planned_creates: vec![PlannedCreate {
                collection: Collection::Vlans,
                key: "30".to_string(),
            }],
            orphan_vlans: [("minami3".to_string(), vec![40, 41])].into_iter().collect(),
            failures: vec![BatchFailure {
                collection: Collection::Interfaces,
                kind: WriteKind::Update,
                keys: vec!["minami3:ge-0/0/1".to_string()],
                error: "inventory answered HTTP 400: bad".to_string(),
            }],
            ..ReconciliationReport::default()
        };
        let text = render_reconciliation_text(&reconcile);
        assert!(text.contains("+ vlans 30"));
        assert!(text.contains("orphan_vlans minami3 vids=40-41"));
        assert!(text.contains("failed_batch update interfaces keys=minami3:ge-0/0/1"));
    }
}
