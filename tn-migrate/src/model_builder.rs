//! Interface model builder.
//!
//! Snapshot facts form the baseline of every device's interface map. Parsed
//! configuration overrides are merged on top field by field, and uplink members
//! are removed from the result entirely.

use std::collections::BTreeMap;

use switch_config_core::{InterfaceOverride, InterfaceRecord, OverrideSource, ParsedConfig, PortMode};
use tracing::{debug, warn};

use crate::snapshot::{SnapshotInterface, TopologySnapshot};

/// host -> interface name -> record
pub type DeviceInterfaceMap = BTreeMap<String, BTreeMap<String, InterfaceRecord>>;

/// Unit suffix folded into its physical port.
const BASE_UNIT: &str = ".0";

/// Build the baseline records of one device from its snapshot interfaces.
///
/// `port.0` collapses onto `port`; its properties win over the physical
/// port's where both are set. Other units remain separate logical records.
pub fn snapshot_records(
    host: &str,
    interfaces: &BTreeMap<String, SnapshotInterface>,
) -> BTreeMap<String, InterfaceRecord> {
    let mut ordered: Vec<(&str, bool, &SnapshotInterface)> = interfaces
        .iter()
        .map(|(name, iface)| match name.strip_suffix(BASE_UNIT) {
            Some(base) => (base, true, iface),
            None => (name.as_str(), false, iface),
        })
        .collect();
    // physical entries first so unit 0 is applied last
    ordered.sort_by_key(|(_, logical, _)| *logical);

    let mut records = BTreeMap::new();
    for (name, _, iface) in ordered {
        let ov = snapshot_override(host, name, iface);
        records
            .entry(name.to_string())
            .or_insert_with(|| InterfaceRecord::new(name))
            .apply(&ov);
    }
    records
}

fn snapshot_override(host: &str, name: &str, iface: &SnapshotInterface) -> InterfaceOverride {
    let mut ov = InterfaceOverride {
        enabled: Some(iface.active),
        description: iface.description.clone().filter(|d| !d.is_empty()),
        ..InterfaceOverride::default()
    };
    let mode = match iface.switchport_mode.as_deref().map(str::parse::<PortMode>) {
        None => return ov,
        Some(Ok(mode)) => mode,
        Some(Err(message)) => {
            warn!(host, interface = name, "ignoring snapshot switchport mode: {message}");
            return ov;
        }
    };
    match mode {
        PortMode::None => {}
        PortMode::Access => {
            ov.mode = Some(PortMode::Access);
            ov.untagged_vlan = iface.access_vlan;
        }
        PortMode::Trunk => {
            ov.mode = Some(PortMode::Trunk);
            ov.untagged_vlan = iface.native_vlan;
            match iface.allowed_vlans.as_ref().map(|a| a.to_set()) {
                Some(Ok(set)) => ov.tagged_vlans = Some(set),
                Some(Err(err)) => {
                    warn!(host, interface = name, "ignoring snapshot allowed VLANs: {err}");
                }
                None => {}
            }
        }
    }
    ov
}

/// Merge parsed overrides into a device's records and drop its uplinks.
///
/// Existing records are updated field by field. A missing record is created
/// for range members and for interface blocks carrying a port mode.
pub fn merge_parsed(records: &mut BTreeMap<String, InterfaceRecord>, parsed: &ParsedConfig) {
    for (name, ov) in &parsed.overrides {
        if let Some(record) = records.get_mut(name) {
            record.apply(ov);
            continue;
        }
        if matches!(ov.source, OverrideSource::Range(_)) || ov.has_mode() {
            let mut record = InterfaceRecord::new(name.as_str());
            record.apply(ov);
            records.insert(name.clone(), record);
        } else {
            debug!(interface = %name, "override has no baseline record and no mode; skipped");
        }
    }
    for uplink in &parsed.uplinks {
        records.remove(uplink);
    }
}

/// Build the merged interface map of every snapshot device.
///
/// `parsed` is keyed by legacy hostname; devices without a parsed config keep
/// their snapshot baseline.
pub fn build_interface_map(
    snapshot: &TopologySnapshot,
    parsed: &BTreeMap<String, ParsedConfig>,
) -> DeviceInterfaceMap {
    snapshot
        .interfaces
        .iter()
        .map(|(host, interfaces)| {
            let mut records = snapshot_records(host, interfaces);
            if let Some(config) = parsed.get(host) {
                merge_parsed(&mut records, config);
            }
            (host.clone(), records)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use switch_config_core::{parse_config, ParserOptions};

    use super::*;
    use crate::snapshot::AllowedVlans;

    fn iface(mode: &str, access: Option<u16>, description: &str) -> SnapshotInterface {
        SnapshotInterface {
            switchport_mode: Some(mode.to_string()),
            access_vlan: access,
            description: Some(description.to_string()),
            ..SnapshotInterface::default()
        }
    }

    #[test]
    fn unit_zero_overrides_physical_port() {
        let mut interfaces = BTreeMap::new();
        interfaces.insert("ge-0/0/1".to_string(), iface("NONE", None, "desk"));
        interfaces.insert("ge-0/0/1.0".to_string(), iface("ACCESS", Some(20), ""));
        interfaces.insert(
            "ge-0/0/2.5".to_string(),
            SnapshotInterface {
                switchport_mode: Some("TRUNK".to_string()),
                allowed_vlans: Some(AllowedVlans::Expr("10-11".to_string())),
                native_vlan: Some(10),
                ..SnapshotInterface::default()
            },
        );

        let records = snapshot_records("sw1", &interfaces);
        assert_eq!(records.len(), 2);
        let port = &records["ge-0/0/1"];
        assert_eq!(port.mode, PortMode::Access);
        assert_eq!(port.untagged_vlan, Some(20));
        assert_eq!(port.description, "desk");
        assert!(port.is_physical);

        let unit = &records["ge-0/0/2.5"];
        assert!(!unit.is_physical);
        assert_eq!(unit.tagged_vlans.canonical(), "10-11");
        assert_eq!(unit.untagged_vlan, Some(10));
    }

    #[test]
    fn unknown_switchport_mode_keeps_baseline() {
        let mut interfaces = BTreeMap::new();
        interfaces.insert("ge-0/0/3".to_string(), iface("FEX_FABRIC", Some(5), "x"));
        let records = snapshot_records("sw1", &interfaces);
        assert_eq!(records["ge-0/0/3"].mode, PortMode::None);
        assert_eq!(records["ge-0/0/3"].untagged_vlan, None);
    }

    fn parsed() -> ParsedConfig {
        parse_config(
            r#"
interfaces {
    interface-range ge-0/0/0 to ge-0/0/3 {
        unit 0 { family ethernet-switching { port-mode access; vlan { members [10]; } } }
    }
    interface-range uplink {
        member ge-0/1/0;
        unit 0 { family ethernet-switching { port-mode trunk; vlan { members [10]; } } }
    }
    ge-0/0/7 { description "keep me"; }
    ge-0/0/8 { description "only text"; }
}
"#,
            &ParserOptions::default(),
        )
        .expect("parse")
    }

    #[test]
    fn compact_range_expands_to_access_records() {
        let mut records = BTreeMap::new();
        merge_parsed(&mut records, &parsed());
        let names: Vec<&str> = records.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["ge-0/0/0", "ge-0/0/1", "ge-0/0/2", "ge-0/0/3"]);
        for record in records.values() {
            assert_eq!(record.mode, PortMode::Access);
            assert_eq!(record.untagged_vlan, Some(10));
            assert!(record.enabled);
        }
    }

    #[test]
    fn overrides_merge_field_by_field_and_uplinks_vanish() {
        let mut interfaces = BTreeMap::new();
        interfaces.insert("ge-0/0/0".to_string(), iface("TRUNK", None, "baseline"));
        interfaces.insert("ge-0/0/7".to_string(), iface("ACCESS", Some(30), "old"));
        interfaces.insert("ge-0/1/0".to_string(), iface("TRUNK", None, "to core"));
        let mut records = snapshot_records("sw1", &interfaces);
        merge_parsed(&mut records, &parsed());

        assert!(!records.contains_key("ge-0/1/0"));
        assert!(!records.contains_key("ge-0/0/8"));
        assert_eq!(records["ge-0/0/0"].description, "baseline");
        assert_eq!(records["ge-0/0/0"].mode, PortMode::Access);
        assert_eq!(records["ge-0/0/7"].description, "keep me");
        assert_eq!(records["ge-0/0/7"].untagged_vlan, Some(30));
    }

    #[test]
    fn merging_twice_equals_merging_once() {
        let mut interfaces = BTreeMap::new();
        interfaces.insert("ge-0/0/0".to_string(), iface("TRUNK", None, "baseline"));
        let config = parsed();

        let mut once = snapshot_records("sw1", &interfaces);
        merge_parsed(&mut once, &config);
        let mut twice = once.clone();
        merge_parsed(&mut twice, &config);
        assert_eq!(once, twice);
    }

    #[test]
    fn access_port_turned_trunk_has_no_native_vlan() {
        let mut interfaces = BTreeMap::new();
        interfaces.insert("ge-0/0/9.0".to_string(), iface("ACCESS", Some(30), ""));
        let mut records = snapshot_records("sw1", &interfaces);
        let config = parse_config(
            "interfaces { ge-0/0/9 { unit 0 { family ethernet-switching { port-mode trunk; vlan { members [ 20 100 ]; } } } } }",
            &ParserOptions::default(),
        )
        .expect("parse");
        merge_parsed(&mut records, &config);

        let port = &records["ge-0/0/9"];
        assert_eq!(port.mode, PortMode::Trunk);
        assert_eq!(port.untagged_vlan, None);
        assert_eq!(port.tagged_vlans.canonical(), "20,100");
    }

    #[test]
    fn map_covers_every_snapshot_host() {
        let mut snapshot = TopologySnapshot::default();
        snapshot
            .interfaces
            .entry("a-1".to_string())
            .or_default()
            .insert("ge-0/0/0".to_string(), iface("ACCESS", Some(1), ""));
        snapshot.interfaces.insert("b-1".to_string(), BTreeMap::new());
        let mut configs = BTreeMap::new();
        configs.insert("a-1".to_string(), parsed());

        let map = build_interface_map(&snapshot, &configs);
        assert_eq!(map.len(), 2);
        assert_eq!(map["a-1"].len(), 4);
        assert!(map["b-1"].is_empty());
    }
}
