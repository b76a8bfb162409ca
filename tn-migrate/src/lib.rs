//! Switch port migration from the tn3 topology to tn4, and reconciliation of
//! the result against an inventory of record.
//!
//! Legacy switches describe their ports in brace-delimited configuration text
//! and in a topology snapshot. This library merges both into one interface
//! model per device, renames every port through a declarative rulebook, and
//! brings a NetBox-style inventory in line with the outcome using the fewest
//! writes it can.
//!
//! # Architecture
//!
//! ## Inputs
//!
//! - [`snapshot`]: topology snapshot (per-device interface facts and VLANs in use)
//! - [`rules`]: per-device port/description rule tables with a `"*"` fallback
//! - [`registry`]: desired sites, site groups and devices
//! - [`config`]: tool settings with embedded defaults
//!
//! ## Migration
//!
//! - [`model_builder`]: snapshot baseline + parsed overrides -> interface map
//! - [`classify`]: configurable detection of aggregate, AP and Meraki ports
//! - [`migrate`]: per-device rule application, outcomes and desired state
//! - [`pipeline`]: loads a configuration directory and runs the above
//!
//! ## Reconciliation
//!
//! - [`inventory`]: inventory access trait, HTTP and in-memory implementations
//! - [`reconcile`]: natural-key dedup, batched creates, interface updates,
//!   orphan VLAN tracking
//!
//! ## Reporting
//!
//! - [`report`]: JSON run report and colored terminal summaries
//!
//! # Workflow
//!
//! 1. **Parse** each device configuration (`switch-config-core`)
//! 2. **Merge** it over the snapshot facts of the same device
//! 3. **Migrate** every port through the rulebook
//! 4. **Reconcile** the inventory: create what is missing, update every interface
//! 5. **Report** pairs, skipped ports and devices, and orphan VLANs
//!
//! # Examples
//!
//! ```ignore
//! use tn_migrate::classify::ClassificationPolicy;
//! use tn_migrate::migrate::HostnameMap;
//! use tn_migrate::pipeline::{load_device_configs, run_migration};
//! use tn_migrate::rules::load_rulebook;
//! use tn_migrate::snapshot::load_snapshot;
//!
//! let snapshot = load_snapshot("snapshot.json".as_ref())?;
//! let configs = load_device_configs("configs".as_ref(), &Default::default())?;
//! let rules = load_rulebook("rules.toml".as_ref())?;
//! let output = run_migration(
//!     &snapshot,
//!     &configs,
//!     &rules,
//!     &ClassificationPolicy::default(),
//!     &HostnameMap::default(),
//! );
//! for device in &output.migration.devices {
//!     println!("{}: {} ports migrated", device.hostname, device.pairs.len());
//! }
//! ```

pub mod classify;
pub mod config;
pub mod inventory;
pub mod migrate;
pub mod model_builder;
pub mod pipeline;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod rules;
pub mod snapshot;
