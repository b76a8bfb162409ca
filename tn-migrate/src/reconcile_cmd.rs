use std::env;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use switch_config_core::load_vlan_catalogue;
use tn_migrate::config::Settings;
use tn_migrate::inventory::{HttpInventory, RetryPolicy};
use tn_migrate::pipeline::{merge_vlans, undefined_vlans};
use tn_migrate::reconcile::{DesiredState, Reconciler};
use tn_migrate::registry::load_registry;
use tn_migrate::report::{
    render_migration_text, render_reconciliation_text, write_report, MigrationReport,
    ReconciliationReport, RunReport,
};
use tracing::debug;

use crate::cli::{OutputFormat, ReconcileArgs};
use crate::migrate_cmd::migrate_inputs;

pub fn run_reconcile(args: ReconcileArgs, settings: &Settings) -> Result<()> {
    let inputs = &args.inputs;
    let registry = load_registry(&args.registry)
        .with_context(|| format!("failed to load registry {}", args.registry.display()))?;
    let url = args
        .url
        .clone()
        .unwrap_or_else(|| settings.inventory.url.clone());
    if url.trim().is_empty() {
        bail!("no inventory URL: pass --url or set inventory.url in the settings file");
    }

    let (snapshot, configs, output) = migrate_inputs(inputs, settings)?;
    let mut vlans = configs.vlans();
    if let Some(path) = &args.vlans {
        let catalogue = load_vlan_catalogue(path)
            .with_context(|| format!("failed to load VLAN catalogue {}", path.display()))?;
        vlans = merge_vlans(vlans.iter().chain(catalogue.iter()));
    }

    let token = env::var(&settings.inventory.token_env).ok();
    if token.is_none() {
        debug!(var = %settings.inventory.token_env, "no inventory token in environment");
    }
    let inventory = HttpInventory::new(
        &url,
        token,
        Duration::from_secs(settings.inventory.timeout_secs),
        RetryPolicy {
            retries: settings.inventory.retry_attempts,
            backoff: Duration::from_millis(settings.inventory.retry_backoff_ms),
        },
    )?;
    let batch_size = args.batch_size.unwrap_or(settings.inventory.batch_size);
    let desired = DesiredState {
        registry: &registry,
        vlans: &vlans,
        migration: &output.migration,
        defaults: &settings.defaults,
    };
    let outcome = Reconciler::new(&inventory, batch_size).and_then(|reconciler| {
        reconciler.dry_run(args.dry_run).run(&desired)
    });

    let mut report = RunReport {
        migration: MigrationReport::new(&output.migration, &configs.block_errors())
            .with_undefined_vlans(undefined_vlans(&snapshot, &vlans)),
        reconciliation: None,
    };
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            if let Some(path) = &inputs.report {
                write_report(path, &report)?;
            }
            return Err(err).context("reconciliation failed");
        }
    };
    report.reconciliation = Some(ReconciliationReport::from(&outcome));
    if let Some(path) = &inputs.report {
        write_report(path, &report)?;
    }

    match inputs.format {
        OutputFormat::Text => {
            println!("{}", render_migration_text(&report.migration, false));
            if let Some(reconciliation) = &report.reconciliation {
                println!("{}", render_reconciliation_text(reconciliation));
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if !outcome.is_clean() {
        bail!(
            "reconcile failed: {} batches were refused by the inventory",
            outcome.failures.len()
        );
    }
    Ok(())
}
