use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::block::{parse_config, ParseError, ParserOptions};
use crate::model::VlanRecord;
use crate::range::{parse_vlan_token, RangeError};
use crate::token::{tokenize, Token};

/// Load a VLAN catalogue from a file in either display-set or brace form.
pub fn load_vlan_catalogue(path: &Path) -> Result<Vec<VlanRecord>, ParseError> {
    let text = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_vlan_catalogue(&text)
}

/// Parse VLAN definitions, sorted by vid.
///
/// Accepts `set vlans NAME vlan-id N` / `set vlans NAME description TEXT`
/// lines, or a `vlans { NAME { vlan-id N; } }` section. The first name seen
/// for a vid wins.
pub fn parse_vlan_catalogue(text: &str) -> Result<Vec<VlanRecord>, ParseError> {
    let tokens = tokenize(text)?;
    let records = if tokens.iter().any(|t| t.keyword == "set") {
        from_set_lines(&tokens)?
    } else {
        parse_config(text, &ParserOptions::default())?.vlans
    };

    let mut by_vid: BTreeMap<u16, VlanRecord> = BTreeMap::new();
    for record in records {
        by_vid.entry(record.vid).or_insert(record);
    }
    Ok(by_vid.into_values().collect())
}

fn from_set_lines(tokens: &[Token]) -> Result<Vec<VlanRecord>, ParseError> {
    // name -> (vlan-id, description), in first-seen order
    let mut order: Vec<String> = Vec::new();
    let mut props: BTreeMap<String, (Option<u16>, String)> = BTreeMap::new();

    for token in tokens.iter().filter(|t| t.keyword == "set" && !t.inactive) {
        let [section, name, key, value @ ..] = token.args.as_slice() else {
            continue;
        };
        if section != "vlans" || value.is_empty() {
            continue;
        }
        let entry = props.entry(name.clone()).or_insert_with(|| {
            order.push(name.clone());
            (None, String::new())
        });
        match key.as_str() {
            "vlan-id" => {
                let vid = single_vid(&value[0]).map_err(|source| ParseError::Range {
                    line: token.line,
                    source,
                })?;
                entry.0 = Some(vid);
            }
            "description" => entry.1 = value.join(" "),
            _ => {}
        }
    }

    Ok(order
        .into_iter()
        .filter_map(|name| {
            let (vid, description) = props.remove(&name)?;
            Some(VlanRecord {
                vid: vid?,
                name,
                description,
            })
        })
        .collect())
}

fn single_vid(raw: &str) -> Result<u16, RangeError> {
    match parse_vlan_token(raw)?.as_slice() {
        [vid] => Ok(*vid),
        _ => Err(RangeError::InvalidVlan {
            token: raw.to_string(),
        }),
    }
}
