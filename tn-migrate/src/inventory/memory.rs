use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::{Map, Value};

use super::{Collection, Inventory, InventoryError, Page, WriteKind};

/// One accepted write batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteRecord {
    pub collection: Collection,
    pub kind: WriteKind,
    pub count: usize,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeMap<Collection, Vec<Value>>,
    next_id: u64,
    writes: Vec<WriteRecord>,
    page_reads: BTreeMap<Collection, usize>,
    /// collection -> (status, remaining failures)
    failures: BTreeMap<Collection, (u16, usize)>,
}

impl State {
    fn assign_id(&mut self, object: &mut Value) {
        if let Some(map) = object.as_object_mut() {
            if !map.contains_key("id") {
                self.next_id += 1;
                map.insert("id".to_string(), Value::from(self.next_id));
            } else if let Some(id) = map.get("id").and_then(Value::as_u64) {
                self.next_id = self.next_id.max(id);
            }
        }
    }

    fn injected_failure(&mut self, collection: Collection) -> Option<InventoryError> {
        let (status, remaining) = self.failures.get_mut(&collection)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(InventoryError::Status {
            status: *status,
            body: format!("injected failure on {collection}"),
        })
    }
}

/// In-process inventory with the same uniqueness rules as the real service.
///
/// Creates are rejected with HTTP 400 when a natural key already exists;
/// updates are rejected with HTTP 404 when an id is unknown. Batches are
/// all-or-nothing.
#[derive(Debug)]
pub struct MemoryInventory {
    state: Mutex<State>,
    page_size: usize,
}

impl Default for MemoryInventory {
    fn default() -> Self {
        Self::with_page_size(50)
    }
}

impl MemoryInventory {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: page_size.max(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert objects as they already exist remotely; missing ids are assigned.
    pub fn seed(&self, collection: Collection, objects: Vec<Value>) {
        let mut state = self.state();
        for mut object in objects {
            state.assign_id(&mut object);
            state.objects.entry(collection).or_default().push(object);
        }
    }

    pub fn objects(&self, collection: Collection) -> Vec<Value> {
        self.state()
            .objects
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state().writes.clone()
    }

    pub fn page_reads(&self, collection: Collection) -> usize {
        self.state()
            .page_reads
            .get(&collection)
            .copied()
            .unwrap_or_default()
    }

    /// Fail the next `times` writes to `collection` with `status`.
    pub fn fail_writes(&self, collection: Collection, status: u16, times: usize) {
        self.state().failures.insert(collection, (status, times));
    }
}

/// Natural key the service enforces uniqueness on.
fn natural_key(collection: Collection, object: &Value) -> Option<String> {
    let field = |name: &str| object.get(name).map(|v| v.to_string());
    match collection {
        Collection::Vlans => field("vid"),
        Collection::SiteGroups | Collection::Sites => field("slug"),
        Collection::Devices => field("name"),
        Collection::IpAddresses => field("address"),
        Collection::Interfaces => {
            let device = object.get("device").map(|d| match d.get("id") {
                Some(id) => id.to_string(),
                None => d.to_string(),
            })?;
            Some(format!("{device}:{}", field("name")?))
        }
    }
}

fn cursor_offset(cursor: &str) -> Option<usize> {
    cursor.rsplit_once("offset=")?.1.parse().ok()
}

impl Inventory for MemoryInventory {
    fn fetch_page(&self, collection: Collection, cursor: Option<&str>) -> Result<Page, InventoryError> {
        let offset = match cursor {
            None => 0,
            Some(cursor) => cursor_offset(cursor).ok_or_else(|| InventoryError::Status {
                status: 400,
                body: format!("bad cursor {cursor}"),
            })?,
        };
        let mut state = self.state();
        *state.page_reads.entry(collection).or_default() += 1;
        let all = state.objects.get(&collection).map(Vec::as_slice).unwrap_or_default();
        let end = (offset + self.page_size).min(all.len());
        let results = all.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();
        let next = (end < all.len()).then(|| format!("memory://{}?offset={end}", collection.path()));
        Ok(Page { results, next })
    }

    fn create(&self, collection: Collection, payloads: &[Value]) -> Result<Vec<Value>, InventoryError> {
        let mut state = self.state();
        if let Some(err) = state.injected_failure(collection) {
            return Err(err);
        }
        let existing = state.objects.get(&collection).map(Vec::as_slice).unwrap_or_default();
        let mut keys: Vec<String> = existing
            .iter()
            .filter_map(|o| natural_key(collection, o))
            .collect();
        for payload in payloads {
            if !payload.is_object() {
                return Err(InventoryError::Status {
                    status: 400,
                    body: "payload is not an object".to_string(),
                });
            }
            if let Some(key) = natural_key(collection, payload) {
                if keys.contains(&key) {
                    return Err(InventoryError::Status {
                        status: 400,
                        body: format!("{collection} with key {key} already exists"),
                    });
                }
                keys.push(key);
            }
        }

        let mut created = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let mut object = payload.clone();
            if let Some(map) = object.as_object_mut() {
                map.remove("id");
            }
            state.assign_id(&mut object);
            created.push(object.clone());
            state.objects.entry(collection).or_default().push(object);
        }
        state.writes.push(WriteRecord {
            collection,
            kind: WriteKind::Create,
            count: payloads.len(),
        });
        Ok(created)
    }

    fn update(&self, collection: Collection, patches: &[Value]) -> Result<Vec<Value>, InventoryError> {
        let mut state = self.state();
        if let Some(err) = state.injected_failure(collection) {
            return Err(err);
        }
        let objects = state.objects.entry(collection).or_default();
        let mut targets = Vec::with_capacity(patches.len());
        for patch in patches {
            let id = patch.get("id").and_then(Value::as_u64);
            let index = id.and_then(|id| {
                objects
                    .iter()
                    .position(|o| o.get("id").and_then(Value::as_u64) == Some(id))
            });
            match (index, patch.as_object()) {
                (Some(index), Some(fields)) => targets.push((index, fields)),
                _ => {
                    return Err(InventoryError::Status {
                        status: 404,
                        body: format!("no {collection} object for patch {patch}"),
                    })
                }
            }
        }

        let mut updated = Vec::with_capacity(targets.len());
        for (index, fields) in targets {
            if let Some(object) = objects[index].as_object_mut() {
                merge_fields(object, fields);
            }
            updated.push(objects[index].clone());
        }
        state.writes.push(WriteRecord {
            collection,
            kind: WriteKind::Update,
            count: patches.len(),
        });
        Ok(updated)
    }
}

fn merge_fields(object: &mut Map<String, Value>, fields: &Map<String, Value>) {
    for (key, value) in fields {
        object.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn create_assigns_ids_and_rejects_duplicate_keys() {
        let inventory = MemoryInventory::default();
        inventory.seed(Collection::Vlans, vec![json!({"id": 7, "vid": 10})]);

        let created = inventory
            .create(Collection::Vlans, &[json!({"vid": 20, "name": "b"})])
            .expect("create");
        assert_eq!(created[0]["id"], json!(8));

        let err = inventory
            .create(Collection::Vlans, &[json!({"vid": 30}), json!({"vid": 10})])
            .expect_err("duplicate vid");
        assert!(matches!(err, InventoryError::Status { status: 400, .. }));
        assert_eq!(inventory.objects(Collection::Vlans).len(), 2);
        assert_eq!(inventory.writes().len(), 1);
    }

    #[test]
    fn update_patches_fields_by_id() {
        let inventory = MemoryInventory::default();
        inventory.seed(
            Collection::Interfaces,
            vec![json!({"id": 1, "name": "ge-0/0/1", "device": {"id": 4}, "enabled": true})],
        );
        inventory
            .update(Collection::Interfaces, &[json!({"id": 1, "enabled": false})])
            .expect("update");
        let objects = inventory.objects(Collection::Interfaces);
        assert_eq!(objects[0]["enabled"], json!(false));
        assert_eq!(objects[0]["name"], json!("ge-0/0/1"));

        let err = inventory
            .update(Collection::Interfaces, &[json!({"id": 99})])
            .expect_err("unknown id");
        assert!(matches!(err, InventoryError::Status { status: 404, .. }));
    }

    #[test]
    fn injected_failures_run_out() {
        let inventory = MemoryInventory::default();
        inventory.fail_writes(Collection::Sites, 503, 1);
        assert!(inventory
            .create(Collection::Sites, &[json!({"slug": "a"})])
            .is_err());
        assert!(inventory
            .create(Collection::Sites, &[json!({"slug": "a"})])
            .is_ok());
    }

    #[test]
    fn bad_cursor_is_rejected() {
        let inventory = MemoryInventory::default();
        assert!(inventory.fetch_page(Collection::Vlans, Some("nowhere")).is_err());
    }
}
