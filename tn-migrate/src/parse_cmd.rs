use anyhow::{Context, Result};
use switch_config_core::{parse_config_file, OverrideSource, ParsedConfig};
use tn_migrate::config::Settings;

use crate::cli::{OutputFormat, ParseArgs};

pub fn run_parse(args: ParseArgs, settings: &Settings) -> Result<()> {
    let parsed = parse_config_file(&args.file, &settings.parser.options())
        .with_context(|| format!("failed to parse {}", args.file.display()))?;

    match args.format {
        OutputFormat::Text => println!("{}", render_parsed(&parsed)),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&parsed)?),
    }
    Ok(())
}

fn render_parsed(parsed: &ParsedConfig) -> String {
    let mut out = vec![format!(
        "parsed overrides={} uplinks={} vlans={} block_errors={}",
        parsed.overrides.len(),
        parsed.uplinks.len(),
        parsed.vlans.len(),
        parsed.errors.len()
    )];
    for (port, entry) in &parsed.overrides {
        let mut fields = Vec::new();
        if let OverrideSource::Range(name) = &entry.source {
            fields.push(format!("range={name}"));
        }
        if let Some(enabled) = entry.enabled {
            fields.push(format!("enabled={enabled}"));
        }
        if let Some(mode) = entry.mode {
            fields.push(format!("mode={mode}"));
        }
        if let Some(vid) = entry.untagged_vlan {
            fields.push(format!("untagged={vid}"));
        }
        if let Some(tagged) = &entry.tagged_vlans {
            fields.push(format!("tagged={tagged}"));
        }
        if entry.is_lag_member == Some(true) {
            fields.push("lag_member".to_string());
        }
        if let Some(description) = &entry.description {
            fields.push(format!("description={description:?}"));
        }
        out.push(format!("interface {port} {}", fields.join(" ")));
    }
    if !parsed.uplinks.is_empty() {
        let uplinks: Vec<&str> = parsed.uplinks.iter().map(String::as_str).collect();
        out.push(format!("uplinks {}", uplinks.join(",")));
    }
    for vlan in &parsed.vlans {
        out.push(format!("vlan {} {}", vlan.vid, vlan.name));
    }
    for name in &parsed.discarded_ranges {
        out.push(format!("discarded_range {name}"));
    }
    for error in &parsed.errors {
        out.push(format!(
            "block_error block={} line={} {}",
            error.block, error.line, error.message
        ));
    }
    out.join("\n")
}
