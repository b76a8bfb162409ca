use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest VLAN id accepted by [`parse_vlan_expr`].
pub const MAX_VLAN_ID: u16 = 4094;

/// Errors produced while expanding port or VLAN ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// Range endpoints do not share the same base path.
    #[error("range endpoints '{start}' and '{end}' do not share a base path")]
    BaseMismatch { start: String, end: String },
    /// Endpoint has no trailing port number.
    #[error("'{token}' has no numeric port suffix")]
    NonNumericSuffix { token: String },
    /// End of range is lower than its start.
    #[error("range '{token}' ends before it starts")]
    Reversed { token: String },
    /// VLAN token is neither a number nor a `lo-hi` range.
    #[error("invalid VLAN token '{token}'")]
    InvalidVlan { token: String },
    /// VLAN id outside 1..=4094.
    #[error("VLAN id {vid} in '{token}' is out of range")]
    VlanOutOfRange { token: String, vid: u32 },
}

impl RangeError {
    /// The input token that caused the error.
    pub fn token(&self) -> &str {
        match self {
            Self::BaseMismatch { end, .. } => end,
            Self::NonNumericSuffix { token }
            | Self::Reversed { token }
            | Self::InvalidVlan { token }
            | Self::VlanOutOfRange { token, .. } => token,
        }
    }
}

/// Expand `start`..=`end` into every port name between them.
///
/// Both endpoints must share the base path in front of the trailing port
/// number, e.g. `ge-0/0/0` and `ge-0/0/3` share `ge-0/0/`.
pub fn expand_port_range(start: &str, end: &str) -> Result<Vec<String>, RangeError> {
    let (base_start, from) = split_port(start)?;
    let (base_end, to) = split_port(end)?;
    if base_start != base_end {
        return Err(RangeError::BaseMismatch {
            start: start.to_string(),
            end: end.to_string(),
        });
    }
    if to < from {
        return Err(RangeError::Reversed {
            token: format!("{start} to {end}"),
        });
    }
    Ok((from..=to).map(|port| format!("{base_start}{port}")).collect())
}

/// Split a port name into its base path and trailing port number.
pub fn split_port(name: &str) -> Result<(&str, u32), RangeError> {
    let digits = name
        .bytes()
        .rev()
        .take_while(|b| b.is_ascii_digit())
        .count();
    let cut = name.len() - digits;
    if digits == 0 {
        return Err(RangeError::NonNumericSuffix {
            token: name.to_string(),
        });
    }
    let number = name[cut..]
        .parse::<u32>()
        .map_err(|_| RangeError::NonNumericSuffix {
            token: name.to_string(),
        })?;
    Ok((&name[..cut], number))
}

/// A set of VLAN ids kept in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VlanSet(BTreeSet<u16>);

impl VlanSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a VLAN id; returns `false` if it was already present.
    pub fn insert(&mut self, vid: u16) -> bool {
        self.0.insert(vid)
    }

    pub fn contains(&self, vid: u16) -> bool {
        self.0.contains(&vid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.0.iter().copied()
    }

    pub fn first(&self) -> Option<u16> {
        self.0.first().copied()
    }

    /// Compressed string form, e.g. `10,20-22`. Parses back to the same set.
    pub fn canonical(&self) -> String {
        let mut parts = Vec::new();
        let mut iter = self.iter().peekable();
        while let Some(lo) = iter.next() {
            let mut hi = lo;
            while iter.peek() == Some(&(hi + 1)) {
                hi += 1;
                iter.next();
            }
            if hi == lo {
                parts.push(lo.to_string());
            } else {
                parts.push(format!("{lo}-{hi}"));
            }
        }
        parts.join(",")
    }
}

impl Display for VlanSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl FromIterator<u16> for VlanSet {
    fn from_iter<T: IntoIterator<Item = u16>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<u16> for VlanSet {
    fn extend<T: IntoIterator<Item = u16>>(&mut self, iter: T) {
        self.0.extend(iter);
    }
}

/// Parse a VLAN expression such as `10,20-22` or `[ 10 20-22 ]`.
pub fn parse_vlan_expr(expr: &str) -> Result<VlanSet, RangeError> {
    let mut set = VlanSet::new();
    for token in vlan_tokens(expr) {
        set.extend(parse_vlan_token(token)?);
    }
    Ok(set)
}

/// Split a VLAN expression into its scalar/range tokens.
pub fn vlan_tokens(expr: &str) -> impl Iterator<Item = &str> {
    expr.split(|c: char| c == ',' || c == '[' || c == ']' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

/// Returns `true` when a token looks like a numeric VLAN id or range.
pub fn is_numeric_vlan_token(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit() || b == b'-')
}

/// Expand a single `N` or `lo-hi` token.
pub fn parse_vlan_token(token: &str) -> Result<Vec<u16>, RangeError> {
    let (lo, hi) = match token.split_once('-') {
        Some((lo, hi)) => (parse_vid(lo, token)?, parse_vid(hi, token)?),
        None => {
            let vid = parse_vid(token, token)?;
            (vid, vid)
        }
    };
    if hi < lo {
        return Err(RangeError::Reversed {
            token: token.to_string(),
        });
    }
    Ok((lo..=hi).collect())
}

fn parse_vid(raw: &str, token: &str) -> Result<u16, RangeError> {
    let value = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| RangeError::InvalidVlan {
            token: token.to_string(),
        })?;
    if value == 0 || value > u32::from(MAX_VLAN_ID) {
        return Err(RangeError::VlanOutOfRange {
            token: token.to_string(),
            vid: value,
        });
    }
    Ok(value as u16)
}
