use regex::Regex;
use serde::Serialize;

use crate::config::{ClassificationSettings, ConfigLoadError};

/// How a port is handled during migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortClass {
    /// Straight rename.
    Regular,
    /// Link-aggregation parent.
    Aggregate,
    /// Faces a wireless access point.
    WirelessAp,
    /// Faces a Meraki switch.
    Meraki,
    /// More than one special predicate matched; needs manual review.
    Ambiguous(Vec<PortClass>),
}

impl PortClass {
    pub fn is_regular(&self) -> bool {
        matches!(self, Self::Regular)
    }

    pub fn label(&self) -> String {
        match self {
            Self::Regular => "regular".to_string(),
            Self::Aggregate => "aggregate".to_string(),
            Self::WirelessAp => "wireless_ap".to_string(),
            Self::Meraki => "meraki".to_string(),
            Self::Ambiguous(classes) => {
                let inner: Vec<String> = classes.iter().map(PortClass::label).collect();
                format!("ambiguous({})", inner.join("+"))
            }
        }
    }
}

/// Compiled classification predicates.
#[derive(Debug, Clone)]
pub struct ClassificationPolicy {
    aggregate_ports: Vec<Regex>,
    wireless_ap_descriptions: Vec<Regex>,
    meraki_descriptions: Vec<Regex>,
}

impl ClassificationPolicy {
    pub fn from_settings(settings: &ClassificationSettings) -> Result<Self, ConfigLoadError> {
        Ok(Self {
            aggregate_ports: compile(&settings.aggregate_ports)?,
            wireless_ap_descriptions: compile(&settings.wireless_ap_descriptions)?,
            meraki_descriptions: compile(&settings.meraki_descriptions)?,
        })
    }

    /// Classify a legacy port by its name and any of its descriptions.
    pub fn classify(&self, port: &str, descriptions: &[&str]) -> PortClass {
        let mut matched = Vec::new();
        if self.aggregate_ports.iter().any(|re| re.is_match(port)) {
            matched.push(PortClass::Aggregate);
        }
        if any_description(&self.wireless_ap_descriptions, descriptions) {
            matched.push(PortClass::WirelessAp);
        }
        if any_description(&self.meraki_descriptions, descriptions) {
            matched.push(PortClass::Meraki);
        }
        match matched.len() {
            0 => PortClass::Regular,
            1 => matched.remove(0),
            _ => PortClass::Ambiguous(matched),
        }
    }
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        // The built-in patterns are known to compile.
        Self::from_settings(&ClassificationSettings::default()).unwrap_or(Self {
            aggregate_ports: Vec::new(),
            wireless_ap_descriptions: Vec::new(),
            meraki_descriptions: Vec::new(),
        })
    }
}

fn any_description(patterns: &[Regex], descriptions: &[&str]) -> bool {
    descriptions
        .iter()
        .filter(|d| !d.is_empty())
        .any(|d| patterns.iter().any(|re| re.is_match(d)))
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>, ConfigLoadError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| ConfigLoadError::Pattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}
