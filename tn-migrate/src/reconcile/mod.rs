//! Inventory reconciler.
//!
//! Runs in two phases. The first fetches the remote state and creates every
//! desired site group, site, device, VLAN and IP address whose natural key is
//! missing. The second re-fetches and issues a full update for every migrated
//! interface. Writes are chunked into batches; a failed batch is recorded and
//! the remaining batches still run. Nothing is rolled back.

mod plan;
mod remote;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

pub use plan::{
    interface_patch, plan_creations, plan_updates, CreateOp, DesiredState, ReconciliationPlan,
    UpdateOp,
};
pub use remote::RemoteState;

use crate::inventory::{Collection, Inventory, InventoryError, WriteKind};

/// A write batch the inventory refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub collection: Collection,
    pub kind: WriteKind,
    /// Natural keys (creates) or `device:interface` names (updates) in the batch.
    pub keys: Vec<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    pub dry_run: bool,
    pub plan: ReconciliationPlan,
    pub created: usize,
    pub updated: usize,
    pub failures: Vec<BatchFailure>,
}

impl ReconcileOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("batch size must be at least 1")]
    BatchSize,
    #[error("failed to read remote state during {phase}: {source}")]
    Fetch {
        phase: &'static str,
        source: InventoryError,
    },
}

pub struct Reconciler<'a> {
    inventory: &'a dyn Inventory,
    batch_size: usize,
    dry_run: bool,
}

impl<'a> Reconciler<'a> {
    pub fn new(inventory: &'a dyn Inventory, batch_size: usize) -> Result<Self, ReconcileError> {
        if batch_size == 0 {
            return Err(ReconcileError::BatchSize);
        }
        Ok(Self {
            inventory,
            batch_size,
            dry_run: false,
        })
    }

    /// Plan against the current remote state without writing anything.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run(&self, desired: &DesiredState<'_>) -> Result<ReconcileOutcome, ReconcileError> {
        let mut outcome = ReconcileOutcome {
            dry_run: self.dry_run,
            ..ReconcileOutcome::default()
        };

        let remote = self.fetch("creation")?;
        outcome.plan.to_create = plan_creations(desired, &remote);
        info!(
            creates = outcome.plan.to_create.len(),
            dry_run = self.dry_run,
            "planned creations"
        );
        if !self.dry_run {
            let (created, failures) = self.apply_creations(&outcome.plan.to_create);
            outcome.created = created;
            outcome.failures.extend(failures);
        }

        let remote = if self.dry_run || outcome.plan.to_create.is_empty() {
            remote
        } else {
            self.fetch("interface update")?
        };
        plan_updates(desired, &remote, &mut outcome.plan);
        for (device, vids) in &outcome.plan.orphan_vlans {
            warn!(device = %device, ?vids, "VLANs missing from inventory; left out of interface updates");
        }
        for device in &outcome.plan.missing_devices {
            warn!(device = %device, "device missing from inventory; interfaces not updated");
        }
        if !self.dry_run {
            let (updated, failures) = self.apply_updates(&outcome.plan.to_update);
            outcome.updated = updated;
            outcome.failures.extend(failures);
        }
        Ok(outcome)
    }

    fn fetch(&self, phase: &'static str) -> Result<RemoteState, ReconcileError> {
        RemoteState::fetch(self.inventory).map_err(|source| ReconcileError::Fetch { phase, source })
    }

    fn apply_creations(&self, ops: &[CreateOp]) -> (usize, Vec<BatchFailure>) {
        let mut created = 0;
        let mut failures = Vec::new();
        for collection in Collection::ALL {
            let ops: Vec<&CreateOp> = ops.iter().filter(|op| op.collection == collection).collect();
            for batch in ops.chunks(self.batch_size) {
                let payloads: Vec<Value> = batch.iter().map(|op| op.payload.clone()).collect();
                match self.inventory.create(collection, &payloads) {
                    Ok(objects) => {
                        info!(%collection, count = objects.len(), "created");
                        created += batch.len();
                    }
                    Err(err) => {
                        let keys = batch.iter().map(|op| op.key.clone()).collect();
                        failures.push(batch_failure(collection, WriteKind::Create, keys, err));
                    }
                }
            }
        }
        (created, failures)
    }

    fn apply_updates(&self, ops: &[UpdateOp]) -> (usize, Vec<BatchFailure>) {
        let mut updated = 0;
        let mut failures = Vec::new();
        for batch in ops.chunks(self.batch_size) {
            let patches: Vec<Value> = batch.iter().map(|op| op.patch.clone()).collect();
            match self.inventory.update(Collection::Interfaces, &patches) {
                Ok(_) => {
                    info!(count = batch.len(), "updated interfaces");
                    updated += batch.len();
                }
                Err(err) => {
                    let keys = batch
                        .iter()
                        .map(|op| format!("{}:{}", op.device, op.interface))
                        .collect();
                    failures.push(batch_failure(
                        Collection::Interfaces,
                        WriteKind::Update,
                        keys,
                        err,
                    ));
                }
            }
        }
        (updated, failures)
    }
}

fn batch_failure(
    collection: Collection,
    kind: WriteKind,
    keys: Vec<String>,
    err: InventoryError,
) -> BatchFailure {
    warn!(%collection, %kind, batch = keys.len(), "batch failed: {err}");
    BatchFailure {
        collection,
        kind,
        keys,
        error: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use switch_config_core::{parse_vlan_expr, InterfaceRecord, PortMode, VlanRecord};

    use super::*;
    use crate::config::EntityDefaults;
    use crate::inventory::{MemoryInventory, WriteRecord};
    use crate::migrate::{DeviceMigration, MigrationResult};
    use crate::registry::{DeviceEntry, Registry};

    fn record(name: &str, mode: PortMode, untagged: Option<u16>, tagged: &str) -> InterfaceRecord {
        let mut record = InterfaceRecord::new(name);
        record.mode = mode;
        record.untagged_vlan = untagged;
        if !tagged.is_empty() {
            record.tagged_vlans = parse_vlan_expr(tagged).expect("vids");
        }
        record
    }

    fn migration(host: &str, records: Vec<InterfaceRecord>) -> MigrationResult {
        let device = DeviceMigration {
            legacy_hostname: format!("{host}-1"),
            hostname: host.to_string(),
            pairs: Vec::new(),
            ports: Vec::new(),
            vlans_in_use: records.iter().flat_map(|r| r.referenced_vlans()).collect(),
            interfaces: records.into_iter().map(|r| (r.name.clone(), r)).collect(),
        };
        MigrationResult {
            devices: vec![device],
            skipped_devices: Vec::new(),
        }
    }

    fn registry(host: &str) -> Registry {
        Registry {
            devices: vec![DeviceEntry {
                name: host.to_string(),
                device_type: "ex2300-48p".to_string(),
                region: None,
                site: "minami".to_string(),
                site_name: Some("Minami".to_string()),
                sitegroup: None,
                sitegroup_name: None,
                register: true,
                ipv4: None,
                cidr: None,
            }],
        }
    }

    fn vlan(vid: u16, name: &str) -> VlanRecord {
        VlanRecord {
            vid,
            name: name.to_string(),
            description: String::new(),
        }
    }

    /// Remote with VLANs 10 and 20, the device and two of its interfaces.
    fn seeded_inventory() -> MemoryInventory {
        let inventory = MemoryInventory::with_page_size(2);
        inventory.seed(
            Collection::Vlans,
            vec![json!({"id": 1, "vid": 10}), json!({"id": 2, "vid": 20})],
        );
        inventory.seed(Collection::Sites, vec![json!({"id": 3, "slug": "minami"})]);
        inventory.seed(Collection::Devices, vec![json!({"id": 4, "name": "host1"})]);
        inventory.seed(
            Collection::Interfaces,
            vec![
                json!({"id": 5, "name": "ge-0/0/1", "device": {"id": 4}, "enabled": false}),
                json!({"id": 6, "name": "ge-0/0/2", "device": {"id": 4}, "enabled": false}),
            ],
        );
        inventory
    }

    #[test]
    fn orphan_vid_lands_in_report_and_not_in_payload() {
        let inventory = seeded_inventory();
        let migration = migration(
            "host1",
            vec![
                record("ge-0/0/1", PortMode::Access, Some(30), ""),
                record("ge-0/0/2", PortMode::Trunk, Some(10), "10,20"),
            ],
        );
        let registry = registry("host1");
        let defaults = EntityDefaults::default();
        let desired = DesiredState {
            registry: &registry,
            vlans: &[],
            migration: &migration,
            defaults: &defaults,
        };

        let outcome = Reconciler::new(&inventory, 100)
            .expect("reconciler")
            .run(&desired)
            .expect("run");

        assert!(outcome.is_clean());
        assert_eq!(outcome.plan.orphan_vlans.get("host1"), Some(&vec![30]));
        assert_eq!(outcome.created, 0);
        assert_eq!(outcome.updated, 2);

        let interfaces = inventory.objects(Collection::Interfaces);
        assert!(interfaces[0].get("untagged_vlan").is_none());
        assert_eq!(interfaces[0]["enabled"], json!(true));
        assert_eq!(interfaces[1]["untagged_vlan"], json!(1));
        assert_eq!(interfaces[1]["tagged_vlans"], json!([1, 2]));
    }

    #[test]
    fn rerun_creates_nothing_new() {
        let inventory = seeded_inventory();
        let migration = migration("host1", vec![record("ge-0/0/1", PortMode::Access, Some(30), "")]);
        let mut registry = registry("host1");
        registry.devices.push(DeviceEntry {
            name: "host2".to_string(),
            ..registry.devices[0].clone()
        });
        let vlans = vec![vlan(10, "ten"), vlan(30, "thirty")];
        let defaults = EntityDefaults::default();
        let desired = DesiredState {
            registry: &registry,
            vlans: &vlans,
            migration: &migration,
            defaults: &defaults,
        };
        let reconciler = Reconciler::new(&inventory, 100).expect("reconciler");

        let first = reconciler.run(&desired).expect("first run");
        let created: Vec<(Collection, &str)> = first
            .plan
            .to_create
            .iter()
            .map(|op| (op.collection, op.key.as_str()))
            .collect();
        assert_eq!(
            created,
            vec![(Collection::Devices, "host2"), (Collection::Vlans, "30")]
        );
        // VLAN 30 exists by the interface phase, so nothing is orphaned
        assert!(first.plan.orphan_vlans.is_empty());
        let vlan_30 = inventory
            .objects(Collection::Vlans)
            .into_iter()
            .find(|v| v["vid"] == json!(30))
            .expect("created VLAN");
        assert_eq!(
            inventory.objects(Collection::Interfaces)[0]["untagged_vlan"],
            vlan_30["id"]
        );

        let second = reconciler.run(&desired).expect("second run");
        assert!(second.plan.to_create.is_empty());
        assert_eq!(second.updated, 1);
        assert_eq!(inventory.objects(Collection::Vlans).len(), 3);
    }

    #[test]
    fn writes_are_chunked_and_failures_do_not_stop_later_batches() {
        let inventory = MemoryInventory::default();
        inventory.seed(Collection::Devices, vec![json!({"id": 1, "name": "host1"})]);
        let names: Vec<String> = (0..5).map(|p| format!("ge-0/0/{p}")).collect();
        inventory.seed(
            Collection::Interfaces,
            names
                .iter()
                .map(|n| json!({"name": n, "device": {"id": 1}}))
                .collect(),
        );
        let migration = migration(
            "host1",
            names
                .iter()
                .map(|n| record(n, PortMode::None, None, ""))
                .collect(),
        );
        let registry = Registry::default();
        let vlans: Vec<VlanRecord> = (100..103).map(|vid| vlan(vid, "v")).collect();
        let defaults = EntityDefaults::default();
        let desired = DesiredState {
            registry: &registry,
            vlans: &vlans,
            migration: &migration,
            defaults: &defaults,
        };
        inventory.fail_writes(Collection::Interfaces, 400, 1);

        let outcome = Reconciler::new(&inventory, 2)
            .expect("reconciler")
            .run(&desired)
            .expect("run");

        assert_eq!(outcome.created, 3);
        assert_eq!(outcome.updated, 3);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures[0].keys,
            vec!["host1:ge-0/0/0".to_string(), "host1:ge-0/0/1".to_string()]
        );
        assert_eq!(
            inventory.writes(),
            vec![
                WriteRecord {
                    collection: Collection::Vlans,
                    kind: WriteKind::Create,
                    count: 2,
                },
                WriteRecord {
                    collection: Collection::Vlans,
                    kind: WriteKind::Create,
                    count: 1,
                },
                WriteRecord {
                    collection: Collection::Interfaces,
                    kind: WriteKind::Update,
                    count: 2,
                },
                WriteRecord {
                    collection: Collection::Interfaces,
                    kind: WriteKind::Update,
                    count: 1,
                },
            ]
        );
    }

    #[test]
    fn dry_run_writes_nothing() {
        let inventory = seeded_inventory();
        let migration = migration("host1", vec![record("ge-0/0/1", PortMode::Access, Some(10), "")]);
        let registry = registry("host2");
        let defaults = EntityDefaults::default();
        let desired = DesiredState {
            registry: &registry,
            vlans: &[],
            migration: &migration,
            defaults: &defaults,
        };
        let outcome = Reconciler::new(&inventory, 100)
            .expect("reconciler")
            .dry_run(true)
            .run(&desired)
            .expect("run");
        assert!(outcome.dry_run);
        assert_eq!(outcome.plan.to_create.len(), 1);
        assert_eq!(outcome.plan.to_update.len(), 1);
        assert_eq!(outcome.created + outcome.updated, 0);
        assert!(inventory.writes().is_empty());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let inventory = MemoryInventory::default();
        assert!(matches!(
            Reconciler::new(&inventory, 0),
            Err(ReconcileError::BatchSize)
        ));
    }

    #[test]
    fn unreachable_inventory_is_fatal() {
        struct Down;
        impl Inventory for Down {
            fn fetch_page(&self, _: Collection, _: Option<&str>) -> Result<crate::inventory::Page, InventoryError> {
                Err(InventoryError::Transport("connection refused".to_string()))
            }
            fn create(&self, _: Collection, _: &[Value]) -> Result<Vec<Value>, InventoryError> {
                unreachable!()
            }
            fn update(&self, _: Collection, _: &[Value]) -> Result<Vec<Value>, InventoryError> {
                unreachable!()
            }
        }
        let migration = MigrationResult::default();
        let registry = Registry::default();
        let defaults = EntityDefaults::default();
        let desired = DesiredState {
            registry: &registry,
            vlans: &[],
            migration: &migration,
            defaults: &defaults,
        };
        let err = Reconciler::new(&Down, 10)
            .expect("reconciler")
            .run(&desired)
            .expect_err("fetch fails");
        assert!(matches!(err, ReconcileError::Fetch { phase: "creation", .. }));
    }
}
