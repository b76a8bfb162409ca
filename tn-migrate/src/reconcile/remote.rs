use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::inventory::{Collection, Inventory, InventoryError};

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RemoteVlan {
    id: u64,
    vid: u16,
}

#[derive(Debug, Deserialize)]
struct RemoteSlug {
    id: u64,
    slug: String,
}

#[derive(Debug, Deserialize)]
struct RemoteDevice {
    id: u64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteInterface {
    id: u64,
    name: String,
    device: IdOnly,
}

#[derive(Debug, Deserialize)]
struct RemoteAddress {
    id: u64,
    address: String,
}

/// Remote ids indexed by natural key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteState {
    pub vlans: BTreeMap<u16, u64>,
    pub site_groups: BTreeMap<String, u64>,
    pub sites: BTreeMap<String, u64>,
    pub devices: BTreeMap<String, u64>,
    /// (device id, interface name) -> interface id
    pub interfaces: BTreeMap<(u64, String), u64>,
    pub addresses: BTreeMap<String, u64>,
}

impl RemoteState {
    /// Read every collection in full.
    pub fn fetch(inventory: &dyn Inventory) -> Result<Self, InventoryError> {
        let mut state = Self::default();
        for vlan in decode::<RemoteVlan>(inventory, Collection::Vlans)? {
            // first object wins for a duplicated vid
            state.vlans.entry(vlan.vid).or_insert(vlan.id);
        }
        for group in decode::<RemoteSlug>(inventory, Collection::SiteGroups)? {
            state.site_groups.entry(group.slug).or_insert(group.id);
        }
        for site in decode::<RemoteSlug>(inventory, Collection::Sites)? {
            state.sites.entry(site.slug).or_insert(site.id);
        }
        for device in decode::<RemoteDevice>(inventory, Collection::Devices)? {
            if let Some(name) = device.name {
                state.devices.entry(name).or_insert(device.id);
            }
        }
        for iface in decode::<RemoteInterface>(inventory, Collection::Interfaces)? {
            state
                .interfaces
                .entry((iface.device.id, iface.name))
                .or_insert(iface.id);
        }
        for address in decode::<RemoteAddress>(inventory, Collection::IpAddresses)? {
            state.addresses.entry(address.address).or_insert(address.id);
        }
        debug!(
            vlans = state.vlans.len(),
            sites = state.sites.len(),
            devices = state.devices.len(),
            interfaces = state.interfaces.len(),
            "fetched remote state"
        );
        Ok(state)
    }

    pub fn vlan_id(&self, vid: u16) -> Option<u64> {
        self.vlans.get(&vid).copied()
    }

    pub fn interface_id(&self, device_id: u64, name: &str) -> Option<u64> {
        self.interfaces.get(&(device_id, name.to_string())).copied()
    }
}

fn decode<T: DeserializeOwned>(
    inventory: &dyn Inventory,
    collection: Collection,
) -> Result<Vec<T>, InventoryError> {
    inventory
        .list(collection)?
        .into_iter()
        .map(|object: Value| {
            serde_json::from_value(object)
                .map_err(|err| InventoryError::Decode(format!("{collection}: {err}")))
        })
        .collect()
}
