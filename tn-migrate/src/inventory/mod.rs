//! Inventory-of-record access.
//!
//! The reconciler talks to the inventory only through [`Inventory`]: paged
//! reads following a `next` cursor, batch creates and batch updates over a
//! fixed set of collections. [`HttpInventory`] speaks a NetBox-style REST API;
//! [`MemoryInventory`] keeps everything in process and backs the tests.

mod http;
mod memory;

use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

pub use http::{HttpInventory, RetryPolicy};
pub use memory::{MemoryInventory, WriteRecord};

/// Entity collections the reconciler reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    SiteGroups,
    Sites,
    Devices,
    Vlans,
    Interfaces,
    IpAddresses,
}

impl Collection {
    pub const ALL: [Collection; 6] = [
        Collection::SiteGroups,
        Collection::Sites,
        Collection::Devices,
        Collection::Vlans,
        Collection::Interfaces,
        Collection::IpAddresses,
    ];

    /// API path below the service root.
    pub fn path(self) -> &'static str {
        match self {
            Self::SiteGroups => "/dcim/site-groups/",
            Self::Sites => "/dcim/sites/",
            Self::Devices => "/dcim/devices/",
            Self::Vlans => "/ipam/vlans/",
            Self::Interfaces => "/dcim/interfaces/",
            Self::IpAddresses => "/ipam/ip-addresses/",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::SiteGroups => "site_groups",
            Self::Sites => "sites",
            Self::Devices => "devices",
            Self::Vlans => "vlans",
            Self::Interfaces => "interfaces",
            Self::IpAddresses => "ip_addresses",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteKind {
    Create,
    Update,
}

impl Display for WriteKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
        })
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub results: Vec<Value>,
    /// Cursor of the following page; `None` on the last page.
    #[serde(default)]
    pub next: Option<String>,
}

#[derive(Debug, Error)]
pub enum InventoryError {
    /// The connection was never established; the request was not sent.
    #[error("inventory unreachable: {0}")]
    Connect(String),
    #[error("inventory request failed: {0}")]
    Transport(String),
    #[error("inventory answered HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected inventory response: {0}")]
    Decode(String),
}

impl InventoryError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Decode(_) => false,
        }
    }

    /// Whether the service certainly did not act on the request, so even a
    /// non-idempotent create may be sent again.
    pub fn is_unprocessed(&self) -> bool {
        match self {
            Self::Connect(_) => true,
            Self::Status { status, .. } => matches!(status, 429 | 503),
            Self::Transport(_) | Self::Decode(_) => false,
        }
    }
}

/// Read and write access to the inventory of record.
pub trait Inventory {
    /// Fetch one page; `cursor` is `None` for the first page.
    fn fetch_page(&self, collection: Collection, cursor: Option<&str>) -> Result<Page, InventoryError>;

    /// Create every payload in one request; returns the created objects.
    fn create(&self, collection: Collection, payloads: &[Value]) -> Result<Vec<Value>, InventoryError>;

    /// Apply every patch (each carrying its `id`) in one request.
    fn update(&self, collection: Collection, patches: &[Value]) -> Result<Vec<Value>, InventoryError>;

    /// Fetch a whole collection by following `next` until it runs out.
    fn list(&self, collection: Collection) -> Result<Vec<Value>, InventoryError> {
        let mut objects = Vec::new();
        let mut seen = BTreeSet::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.fetch_page(collection, cursor.as_deref())?;
            objects.extend(page.results);
            match page.next {
                Some(next) if seen.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!(%collection, cursor = %next, "pagination cursor repeated; stopping");
                    break;
                }
                None => break,
            }
        }
        Ok(objects)
    }
}
