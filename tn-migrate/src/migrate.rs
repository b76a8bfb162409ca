//! Migration orchestrator.
//!
//! Applies the rulebook and classification policy to every device of the
//! merged interface map and produces the desired new-topology port model plus
//! a per-port account of what happened to each legacy port.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::Serialize;
use switch_config_core::{is_physical_name, InterfaceRecord, VlanSet};
use tracing::{debug, info};

use crate::classify::{ClassificationPolicy, PortClass};
use crate::model_builder::DeviceInterfaceMap;
use crate::rules::{PortRule, RuleLookup, Rulebook};

/// Maps new hostnames to legacy ones by a fixed suffix (`minami3` <-> `minami3-1`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostnameMap {
    legacy_suffix: String,
}

impl HostnameMap {
    pub fn new(legacy_suffix: impl Into<String>) -> Self {
        Self {
            legacy_suffix: legacy_suffix.into(),
        }
    }

    pub fn to_legacy(&self, hostname: &str) -> String {
        format!("{hostname}{}", self.legacy_suffix)
    }

    /// New hostname of a legacy device; names without the suffix map to themselves.
    pub fn to_new<'a>(&self, legacy: &'a str) -> &'a str {
        if self.legacy_suffix.is_empty() {
            return legacy;
        }
        legacy.strip_suffix(self.legacy_suffix.as_str()).unwrap_or(legacy)
    }
}

impl Default for HostnameMap {
    fn default() -> Self {
        Self::new("-1")
    }
}

/// One legacy -> new port pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMapping {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lag: Option<String>,
}

/// What happened to a legacy port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PortOutcome {
    Migrated { to: String },
    /// The device's rule table has no entry for the port.
    Unmapped,
    /// The rule names no new port.
    Retired,
    /// Classified as a special port; needs the manual handling path.
    Routed {
        #[serde(skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        class: PortClass,
    },
    /// Another legacy port already took the target.
    Conflict { to: String, kept: String },
}

impl PortOutcome {
    pub fn label(&self) -> String {
        match self {
            Self::Migrated { to } => format!("-> {to}"),
            Self::Unmapped => "unmapped".to_string(),
            Self::Retired => "retired".to_string(),
            Self::Routed { class, .. } => format!("routed ({})", class.label()),
            Self::Conflict { to, kept } => format!("conflict on {to} (kept {kept})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortReport {
    pub port: String,
    #[serde(flatten)]
    pub outcome: PortOutcome,
}

/// Migration output of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceMigration {
    pub legacy_hostname: String,
    pub hostname: String,
    /// Migrated pairs in natural legacy-port order.
    pub pairs: Vec<PortMapping>,
    /// Every legacy port with its outcome, in natural order.
    pub ports: Vec<PortReport>,
    /// Desired records keyed by new port name.
    pub interfaces: BTreeMap<String, InterfaceRecord>,
    /// VLAN ids referenced by the desired records.
    pub vlans_in_use: VlanSet,
}

impl DeviceMigration {
    /// Ports that did not migrate straight.
    pub fn not_migrated(&self) -> impl Iterator<Item = &PortReport> {
        self.ports
            .iter()
            .filter(|p| !matches!(p.outcome, PortOutcome::Migrated { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum DeviceSkipReason {
    /// Neither the device nor the wildcard has a rule table.
    NotInRulebook,
    /// The rulebook names the device but the snapshot does not.
    NotInSnapshot,
    /// The device configuration could not be parsed.
    ConfigParseFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSkip {
    pub hostname: String,
    #[serde(flatten)]
    pub reason: DeviceSkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationResult {
    pub devices: Vec<DeviceMigration>,
    pub skipped_devices: Vec<DeviceSkip>,
}

impl MigrationResult {
    pub fn device(&self, hostname: &str) -> Option<&DeviceMigration> {
        self.devices.iter().find(|d| d.hostname == hostname)
    }

    pub fn skip(&mut self, hostname: impl Into<String>, reason: DeviceSkipReason) {
        let hostname = hostname.into();
        info!(device = %hostname, ?reason, "device skipped");
        self.skipped_devices.push(DeviceSkip { hostname, reason });
        self.skipped_devices
            .sort_by(|a, b| natural_cmp(&a.hostname, &b.hostname));
    }
}

/// Runs the rule engine over every device of an interface map.
#[derive(Debug, Clone)]
pub struct Orchestrator<'a> {
    rules: &'a Rulebook,
    policy: &'a ClassificationPolicy,
    hostnames: HostnameMap,
}

impl<'a> Orchestrator<'a> {
    pub fn new(rules: &'a Rulebook, policy: &'a ClassificationPolicy, hostnames: HostnameMap) -> Self {
        Self {
            rules,
            policy,
            hostnames,
        }
    }

    /// Migrate every device of `map`, keyed by legacy hostname.
    pub fn run(&self, map: &DeviceInterfaceMap) -> MigrationResult {
        let mut result = MigrationResult::default();
        let mut legacy_hosts: Vec<&String> = map.keys().collect();
        legacy_hosts.sort_by(|a, b| natural_cmp(a, b));

        for legacy in legacy_hosts {
            let hostname = self.hostnames.to_new(legacy);
            if !self.rules.supports(hostname) {
                result.skip(hostname, DeviceSkipReason::NotInRulebook);
                continue;
            }
            result
                .devices
                .push(self.migrate_device(legacy, hostname, &map[legacy]));
        }

        for hostname in self.rules.devices() {
            if !map.contains_key(&self.hostnames.to_legacy(hostname)) && !map.contains_key(hostname) {
                result.skip(hostname, DeviceSkipReason::NotInSnapshot);
            }
        }
        result
    }

    fn migrate_device(
        &self,
        legacy: &str,
        hostname: &str,
        records: &BTreeMap<String, InterfaceRecord>,
    ) -> DeviceMigration {
        let mut ports: Vec<&InterfaceRecord> = records.values().collect();
        ports.sort_by(|a, b| natural_cmp(&a.name, &b.name));

        let mut device = DeviceMigration {
            legacy_hostname: legacy.to_string(),
            hostname: hostname.to_string(),
            pairs: Vec::new(),
            ports: Vec::new(),
            interfaces: BTreeMap::new(),
            vlans_in_use: VlanSet::new(),
        };
        // new port -> legacy port that claimed it
        let mut taken: BTreeMap<String, String> = BTreeMap::new();

        for record in ports {
            let lookup = self.rules.lookup(hostname, &record.name);
            let outcome = match lookup {
                RuleLookup::UnsupportedDevice | RuleLookup::NoRule => PortOutcome::Unmapped,
                RuleLookup::Rule(rule) => self.resolve(record, rule, &taken),
            };
            debug!(device = hostname, port = %record.name, outcome = %outcome.label(), "port resolved");
            if let (PortOutcome::Migrated { to }, RuleLookup::Rule(rule)) = (&outcome, lookup) {
                let desired = renamed(record, to, rule);
                device.vlans_in_use.extend(desired.referenced_vlans());
                device.interfaces.insert(to.clone(), desired);
                device.pairs.push(PortMapping {
                    from: record.name.clone(),
                    to: to.clone(),
                    lag: rule.lag.clone(),
                });
                taken.insert(to.clone(), record.name.clone());
            }
            device.ports.push(PortReport {
                port: record.name.clone(),
                outcome,
            });
        }
        info!(
            device = hostname,
            migrated = device.pairs.len(),
            other = device.ports.len() - device.pairs.len(),
            "device migrated"
        );
        device
    }

    fn resolve(
        &self,
        record: &InterfaceRecord,
        rule: &PortRule,
        taken: &BTreeMap<String, String>,
    ) -> PortOutcome {
        let mut descriptions = vec![record.description.as_str()];
        if let Some(description) = &rule.new_description {
            descriptions.push(description);
        }
        let class = self.policy.classify(&record.name, &descriptions);
        if !class.is_regular() {
            return PortOutcome::Routed {
                to: rule.new_port.clone(),
                class,
            };
        }
        match &rule.new_port {
            None => PortOutcome::Retired,
            Some(to) => match taken.get(to) {
                Some(kept) => PortOutcome::Conflict {
                    to: to.clone(),
                    kept: kept.clone(),
                },
                None => PortOutcome::Migrated { to: to.clone() },
            },
        }
    }
}

/// The legacy record carried over to its new port name.
fn renamed(record: &InterfaceRecord, to: &str, rule: &PortRule) -> InterfaceRecord {
    let mut desired = record.clone();
    desired.name = to.to_string();
    desired.is_physical = is_physical_name(to);
    if let Some(description) = &rule.new_description {
        desired.description.clone_from(description);
    }
    if let Some(enabled) = rule.enabled {
        desired.enabled = enabled;
    }
    if rule.lag.is_some() {
        desired.is_lag_member = true;
    }
    desired
}

/// Compare port or host names with embedded numbers in numeric order,
/// so `ge-0/0/2` sorts before `ge-0/0/10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = chunks(a);
    let right = chunks(b);
    for (x, y) in left.iter().zip(&right) {
        let ord = match (is_number(x), is_number(y)) {
            (true, true) => cmp_numeric(x, y),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}

fn is_number(chunk: &str) -> bool {
    chunk.bytes().next().is_some_and(|b| b.is_ascii_digit())
}

fn cmp_numeric(x: &str, y: &str) -> Ordering {
    let x = x.trim_start_matches('0');
    let y = y.trim_start_matches('0');
    x.len().cmp(&y.len()).then_with(|| x.cmp(y))
}

/// Split into alternating digit and non-digit runs.
fn chunks(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut previous: Option<bool> = None;
    for (idx, ch) in s.char_indices() {
        let digit = ch.is_ascii_digit();
        if previous.is_some_and(|p| p != digit) {
            out.push(&s[start..idx]);
            start = idx;
        }
        previous = Some(digit);
    }
    if start < s.len() {
        out.push(&s[start..]);
    }
    out
}
