use anyhow::{Context, Result};
use tn_migrate::classify::ClassificationPolicy;
use tn_migrate::config::Settings;
use tn_migrate::migrate::HostnameMap;
use tn_migrate::pipeline::{
    load_device_configs, run_migration, undefined_vlans, DeviceConfigs, PipelineOutput,
};
use tn_migrate::report::{render_migration_text, write_report, MigrationReport, RunReport};
use tn_migrate::rules::load_rulebook;
use tn_migrate::snapshot::{load_snapshot, TopologySnapshot};

use crate::cli::{MigrateArgs, MigrationInputs, OutputFormat};

pub fn run_migrate(args: MigrateArgs, settings: &Settings) -> Result<()> {
    let inputs = &args.inputs;
    let (snapshot, configs, output) = migrate_inputs(inputs, settings)?;
    let report = RunReport {
        migration: MigrationReport::new(&output.migration, &configs.block_errors())
            .with_undefined_vlans(undefined_vlans(&snapshot, &configs.vlans())),
        reconciliation: None,
    };
    if let Some(path) = &inputs.report {
        write_report(path, &report)?;
    }

    match inputs.format {
        OutputFormat::Text => println!("{}", render_migration_text(&report.migration, true)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

/// Load the snapshot, rulebook and configurations, then run the offline pipeline.
pub fn migrate_inputs(
    inputs: &MigrationInputs,
    settings: &Settings,
) -> Result<(TopologySnapshot, DeviceConfigs, PipelineOutput)> {
    let snapshot = load_snapshot(&inputs.snapshot)
        .with_context(|| format!("failed to load snapshot {}", inputs.snapshot.display()))?;
    let rules = load_rulebook(&inputs.rules)
        .with_context(|| format!("failed to load rulebook {}", inputs.rules.display()))?;
    let policy = ClassificationPolicy::from_settings(&settings.classification)?;
    let hostnames = HostnameMap::new(settings.hostnames.legacy_suffix.clone());
    let configs = load_device_configs(&inputs.configs, &settings.parser.options())?;

    let output = run_migration(&snapshot, &configs, &rules, &policy, &hostnames);
    Ok((snapshot, configs, output))
}
