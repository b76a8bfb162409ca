use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{json, Map, Value};
use switch_config_core::{InterfaceRecord, PortMode, VlanRecord};

use super::remote::RemoteState;
use crate::config::EntityDefaults;
use crate::inventory::Collection;
use crate::migrate::{natural_cmp, MigrationResult};
use crate::registry::Registry;

/// Everything the inventory should contain after a run.
#[derive(Debug, Clone, Copy)]
pub struct DesiredState<'a> {
    pub registry: &'a Registry,
    pub vlans: &'a [VlanRecord],
    pub migration: &'a MigrationResult,
    pub defaults: &'a EntityDefaults,
}

/// A missing entity to create, identified by its natural key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOp {
    pub collection: Collection,
    pub key: String,
    pub payload: Value,
}

/// A full re-derived interface update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOp {
    pub collection: Collection,
    pub remote_id: u64,
    pub device: String,
    pub interface: String,
    pub patch: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconciliationPlan {
    pub to_create: Vec<CreateOp>,
    pub to_update: Vec<UpdateOp>,
    /// device -> vids with no remote VLAN
    pub orphan_vlans: BTreeMap<String, Vec<u16>>,
    /// Migrated devices the inventory does not know.
    pub missing_devices: Vec<String>,
    /// device -> migrated ports the inventory does not know
    pub missing_interfaces: BTreeMap<String, Vec<String>>,
}

/// Collects create operations, skipping keys that exist remotely or were
/// already planned.
struct Creations<'r> {
    remote: &'r RemoteState,
    planned: BTreeSet<(Collection, String)>,
    ops: Vec<CreateOp>,
}

impl<'r> Creations<'r> {
    fn push(&mut self, collection: Collection, key: String, exists: bool, payload: Value) {
        if exists || !self.planned.insert((collection, key.clone())) {
            return;
        }
        self.ops.push(CreateOp {
            collection,
            key,
            payload,
        });
    }
}

/// Plan creation of every desired entity whose natural key is absent remotely.
///
/// Order follows the reference dependencies: site groups, sites, devices,
/// VLANs, IP addresses.
pub fn plan_creations(desired: &DesiredState<'_>, remote: &RemoteState) -> Vec<CreateOp> {
    let mut creations = Creations {
        remote,
        planned: BTreeSet::new(),
        ops: Vec::new(),
    };
    let entries: Vec<_> = desired.registry.registered().collect();

    for entry in &entries {
        if let Some(slug) = &entry.sitegroup {
            let name = entry.sitegroup_name.clone().unwrap_or_else(|| slug.clone());
            let exists = creations.remote.site_groups.contains_key(slug);
            creations.push(
                Collection::SiteGroups,
                slug.clone(),
                exists,
                json!({"name": name, "slug": slug}),
            );
        }
    }
    for entry in &entries {
        let mut payload = Map::new();
        let name = entry.site_name.clone().unwrap_or_else(|| entry.site.clone());
        payload.insert("name".to_string(), json!(name));
        payload.insert("slug".to_string(), json!(entry.site));
        payload.insert("status".to_string(), json!(desired.defaults.status));
        if let Some(group) = &entry.sitegroup {
            payload.insert("group".to_string(), json!({"slug": group}));
        }
        if let Some(region) = &entry.region {
            payload.insert("region".to_string(), json!({"slug": region}));
        }
        let exists = creations.remote.sites.contains_key(&entry.site);
        creations.push(Collection::Sites, entry.site.clone(), exists, Value::Object(payload));
    }
    for entry in &entries {
        let exists = creations.remote.devices.contains_key(&entry.name);
        creations.push(
            Collection::Devices,
            entry.name.clone(),
            exists,
            json!({
                "name": entry.name,
                "device_type": {"slug": entry.device_type},
                "device_role": {"slug": desired.defaults.device_role},
                "site": {"slug": entry.site},
                "status": desired.defaults.status,
            }),
        );
    }
    for vlan in desired.vlans {
        let exists = creations.remote.vlans.contains_key(&vlan.vid);
        creations.push(
            Collection::Vlans,
            vlan.vid.to_string(),
            exists,
            json!({
                "vid": vlan.vid,
                "name": vlan.name,
                "description": vlan.description,
                "status": desired.defaults.status,
            }),
        );
    }
    for entry in &entries {
        if let Some(address) = entry.address() {
            let exists = creations.remote.addresses.contains_key(&address);
            creations.push(
                Collection::IpAddresses,
                address.clone(),
                exists,
                json!({
                    "address": address,
                    "status": desired.defaults.status,
                    "description": entry.name,
                }),
            );
        }
    }
    creations.ops
}

/// Plan interface updates of every migrated device against `remote`.
///
/// Fills `to_update`, `orphan_vlans`, `missing_devices` and
/// `missing_interfaces` of `plan`.
pub fn plan_updates(desired: &DesiredState<'_>, remote: &RemoteState, plan: &mut ReconciliationPlan) {
    for device in &desired.migration.devices {
        let Some(&device_id) = remote.devices.get(&device.hostname) else {
            plan.missing_devices.push(device.hostname.clone());
            continue;
        };
        let mut ports: Vec<&InterfaceRecord> = device.interfaces.values().collect();
        ports.sort_by(|a, b| natural_cmp(&a.name, &b.name));

        let mut orphans = BTreeSet::new();
        let mut missing = Vec::new();
        for record in ports {
            let Some(remote_id) = remote.interface_id(device_id, &record.name) else {
                missing.push(record.name.clone());
                continue;
            };
            let patch = interface_patch(remote_id, record, |vid| remote.vlan_id(vid), &mut orphans);
            plan.to_update.push(UpdateOp {
                collection: Collection::Interfaces,
                remote_id,
                device: device.hostname.clone(),
                interface: record.name.clone(),
                patch,
            });
        }
        if !orphans.is_empty() {
            plan.orphan_vlans
                .insert(device.hostname.clone(), orphans.into_iter().collect());
        }
        if !missing.is_empty() {
            plan.missing_interfaces.insert(device.hostname.clone(), missing);
        }
    }
}

/// Full update payload of one interface.
///
/// vids without a remote VLAN go to `orphans` instead of the payload; a VLAN
/// field whose every vid is orphaned is left out entirely.
pub fn interface_patch(
    remote_id: u64,
    record: &InterfaceRecord,
    resolve: impl Fn(u16) -> Option<u64>,
    orphans: &mut BTreeSet<u16>,
) -> Value {
    let mut patch = Map::new();
    patch.insert("id".to_string(), json!(remote_id));
    patch.insert("enabled".to_string(), json!(record.enabled));
    patch.insert("description".to_string(), json!(record.description));
    let mode = match record.mode {
        PortMode::None => Value::Null,
        PortMode::Access => json!("access"),
        PortMode::Trunk => json!("tagged"),
    };
    patch.insert("mode".to_string(), mode);

    match record.untagged_vlan {
        Some(vid) => match resolve(vid) {
            Some(id) => {
                patch.insert("untagged_vlan".to_string(), json!(id));
            }
            None => {
                orphans.insert(vid);
            }
        },
        None => {
            patch.insert("untagged_vlan".to_string(), Value::Null);
        }
    }

    let mut tagged = Vec::new();
    for vid in record.tagged_vlans.iter() {
        match resolve(vid) {
            Some(id) => tagged.push(id),
            None => {
                orphans.insert(vid);
            }
        }
    }
    if !tagged.is_empty() || record.tagged_vlans.is_empty() {
        patch.insert("tagged_vlans".to_string(), json!(tagged));
    }
    Value::Object(patch)
}
