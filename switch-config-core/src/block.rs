//! Brace-depth state machine extracting interface and VLAN facts.
//!
//! The parser never builds a syntax tree. It walks the [`Token`] stream with
//! three states:
//!
//! - `Scanning`: outside any section of interest (depth 0, or inside an
//!   unrelated top-level block).
//! - `InBlock`: inside `interfaces { }` or `vlans { }`, accumulating the
//!   statements of the current child block.
//! - `InRangeBlock`: inside an `interface-range` definition.
//!
//! Statements are matched by keyword at any nesting depth below the block
//! that owns them, so `unit 0 { family ethernet-switching { ... } }` wrappers
//! need no special handling.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::model::{InterfaceOverride, OverrideSource, PortMode, VlanRecord};
use crate::range::{
    expand_port_range, is_numeric_vlan_token, parse_vlan_token, RangeError, VlanSet,
};
use crate::token::{tokenize, Terminator, Token, TokenizeError};

/// Errors raised while parsing configuration text.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Tokenize(#[from] TokenizeError),
    #[error("line {line}: {source}")]
    Range { line: usize, source: RangeError },
    #[error("line {line}: block '{keyword}' is not closed before end of input")]
    Unterminated { line: usize, keyword: String },
    #[error("line {line}: closing brace without an open block")]
    UnbalancedClose { line: usize },
    #[error("line {line}: '{member}' is already a member of {first}")]
    MemberCollision {
        line: usize,
        member: String,
        first: String,
    },
    #[error("line {line}: access port carries {count} VLANs ({vlans})")]
    AccessVlanCount {
        line: usize,
        count: usize,
        vlans: String,
    },
    #[error("line {line}: VLAN name '{name}' is not defined")]
    UnknownVlanName { line: usize, name: String },
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("failed to read configuration {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl ParseError {
    /// Source line of the error, when it has one.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Tokenize(TokenizeError::UnterminatedQuote { line })
            | Self::Tokenize(TokenizeError::UnterminatedComment { line })
            | Self::Range { line, .. }
            | Self::Unterminated { line, .. }
            | Self::UnbalancedClose { line }
            | Self::MemberCollision { line, .. }
            | Self::AccessVlanCount { line, .. }
            | Self::UnknownVlanName { line, .. }
            | Self::Malformed { line, .. } => Some(*line),
            Self::Io { .. } => None,
        }
    }
}

/// A block that was dropped because of a [`ParseError`]; siblings were kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockError {
    pub block: String,
    pub line: usize,
    pub message: String,
}

/// Parser policy knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserOptions {
    /// Range blocks whose name contains this marker describe uplinks.
    pub uplink_marker: String,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            uplink_marker: "uplink".to_string(),
        }
    }
}

/// Facts extracted from one device configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedConfig {
    /// Per-interface overrides keyed by port name.
    pub overrides: BTreeMap<String, InterfaceOverride>,
    /// Members of uplink ranges; never part of the port model.
    pub uplinks: BTreeSet<String>,
    pub vlans: Vec<VlanRecord>,
    pub errors: Vec<BlockError>,
    /// Range blocks dropped because they set no port mode.
    pub discarded_ranges: Vec<String>,
}

/// Parse a configuration file.
pub fn parse_config_file(path: &Path, options: &ParserOptions) -> Result<ParsedConfig, ParseError> {
    let text = fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&text, options)
}

/// Parse configuration text.
///
/// Structural failures (unterminated block, stray `}`) fail the whole
/// document. Failures confined to one block are collected in
/// [`ParsedConfig::errors`] and parsing continues with its siblings.
pub fn parse_config(text: &str, options: &ParserOptions) -> Result<ParsedConfig, ParseError> {
    let tokens = tokenize(text)?;
    let mut machine = Machine::new();
    for token in tokens {
        machine.step(token)?;
    }
    machine.finish(options)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Interfaces,
    Vlans,
}

impl Section {
    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "interfaces" => Some(Self::Interfaces),
            "vlans" => Some(Self::Vlans),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum State {
    Scanning,
    InBlock {
        section: Section,
        frame: Option<Frame>,
    },
    InRangeBlock {
        frame: Frame,
        /// Depth the range block returns to when it closes.
        base_depth: usize,
        /// Section to resume, or `None` for a top-level range.
        parent: Option<Section>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Interface,
    Range,
    Vlan,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    name: String,
    line: usize,
    inactive: bool,
    members: Vec<(String, usize)>,
    mode: Option<PortMode>,
    disabled: bool,
    description: Option<String>,
    vlan_members: Vec<(String, usize)>,
    native_vlan: Option<u16>,
    lag_member: bool,
    vlan_id: Option<u16>,
    error: Option<ParseError>,
}

impl Frame {
    fn new(kind: FrameKind, name: String, token: &Token) -> Self {
        Self {
            kind,
            name,
            line: token.line,
            inactive: token.inactive,
            members: Vec::new(),
            mode: None,
            disabled: false,
            description: None,
            vlan_members: Vec::new(),
            native_vlan: None,
            lag_member: false,
            vlan_id: None,
            error: None,
        }
    }

    fn range(token: &Token) -> Self {
        // Compact form: `interface-range ge-0/0/0 to ge-0/0/3 {`
        if let [start, to, end] = token.args.as_slice() {
            if to == "to" {
                let mut frame = Self::new(FrameKind::Range, format!("{start}-{end}"), token);
                frame.add_member_range(start, end, token.line);
                return frame;
            }
        }
        let name = token.args.join(" ");
        Self::new(FrameKind::Range, name, token)
    }

    fn fail(&mut self, error: ParseError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn add_member_range(&mut self, start: &str, end: &str, line: usize) {
        match expand_port_range(start, end) {
            Ok(ports) => self.members.extend(ports.into_iter().map(|p| (p, line))),
            Err(source) => self.fail(ParseError::Range { line, source }),
        }
    }

    fn statement(&mut self, token: &Token) {
        if token.inactive {
            return;
        }
        let line = token.line;
        match (self.kind, token.keyword.as_str()) {
            (FrameKind::Range, "member") => match token.arg(0) {
                Some(port) => self.members.push((port.to_string(), line)),
                None => self.fail(malformed(line, "member without interface name")),
            },
            (FrameKind::Range, "member-range") => match token.args.as_slice() {
                [start, to, end] if to == "to" => self.add_member_range(start, end, line),
                [start, end] => self.add_member_range(start, end, line),
                _ => self.fail(malformed(line, "member-range expects '<start> to <end>'")),
            },
            (FrameKind::Range | FrameKind::Interface, "port-mode" | "interface-mode") => {
                match token.arg(0).map(str::parse::<PortMode>) {
                    Some(Ok(mode)) => self.mode = Some(mode),
                    Some(Err(message)) => self.fail(ParseError::Malformed { line, message }),
                    None => self.fail(malformed(line, "port-mode without value")),
                }
            }
            (FrameKind::Range | FrameKind::Interface, "members") => {
                self.vlan_members
                    .extend(token.args.iter().map(|a| (a.clone(), line)));
            }
            (FrameKind::Range | FrameKind::Interface, "native-vlan-id") => {
                match token.arg(0).map(parse_single_vid) {
                    Some(Ok(vid)) => self.native_vlan = Some(vid),
                    Some(Err(source)) => self.fail(ParseError::Range { line, source }),
                    None => self.fail(malformed(line, "native-vlan-id without value")),
                }
            }
            (FrameKind::Range | FrameKind::Interface, "disable") => self.disabled = true,
            (FrameKind::Range | FrameKind::Interface, "802.3ad") => self.lag_member = true,
            (FrameKind::Vlan, "vlan-id") => match token.arg(0).map(parse_single_vid) {
                Some(Ok(vid)) => self.vlan_id = Some(vid),
                Some(Err(source)) => self.fail(ParseError::Range { line, source }),
                None => self.fail(malformed(line, "vlan-id without value")),
            },
            (_, "description") => self.description = Some(token.args.join(" ")),
            _ => {}
        }
    }
}

fn malformed(line: usize, message: &str) -> ParseError {
    ParseError::Malformed {
        line,
        message: message.to_string(),
    }
}

fn parse_single_vid(raw: &str) -> Result<u16, RangeError> {
    let vids = parse_vlan_token(raw)?;
    match vids.as_slice() {
        [vid] => Ok(*vid),
        _ => Err(RangeError::InvalidVlan {
            token: raw.to_string(),
        }),
    }
}

struct Machine {
    state: State,
    /// Open blocks as (keyword, line); depth is the stack length.
    open: Vec<(String, usize)>,
    finished: Vec<Frame>,
}

impl Machine {
    fn new() -> Self {
        Self {
            state: State::Scanning,
            open: Vec::new(),
            finished: Vec::new(),
        }
    }

    fn depth(&self) -> usize {
        self.open.len()
    }

    fn step(&mut self, token: Token) -> Result<(), ParseError> {
        match token.terminator {
            Terminator::Open => {
                self.enter(&token);
                self.open.push((token.keyword, token.line));
            }
            Terminator::Close => {
                if self.open.pop().is_none() {
                    return Err(ParseError::UnbalancedClose { line: token.line });
                }
                self.leave();
            }
            Terminator::Statement | Terminator::Newline => match &mut self.state {
                State::InBlock {
                    frame: Some(frame), ..
                }
                | State::InRangeBlock { frame, .. } => frame.statement(&token),
                State::InBlock { frame: None, .. } | State::Scanning => {}
            },
        }
        Ok(())
    }

    /// Transition on a block-opening token, before the depth increments.
    fn enter(&mut self, token: &Token) {
        let depth = self.depth();
        let state = std::mem::replace(&mut self.state, State::Scanning);
        self.state = match state {
            State::Scanning if depth == 0 && !token.inactive => {
                if let Some(section) = Section::from_keyword(&token.keyword) {
                    State::InBlock {
                        section,
                        frame: None,
                    }
                } else if token.keyword == "interface-range" {
                    State::InRangeBlock {
                        frame: Frame::range(token),
                        base_depth: 0,
                        parent: None,
                    }
                } else {
                    State::Scanning
                }
            }
            State::InBlock {
                section: Section::Interfaces,
                frame: None,
            } if depth == 1 && token.keyword == "interface-range" => State::InRangeBlock {
                frame: Frame::range(token),
                base_depth: 1,
                parent: Some(Section::Interfaces),
            },
            State::InBlock {
                section,
                frame: None,
            } if depth == 1 => {
                let kind = match section {
                    Section::Interfaces => FrameKind::Interface,
                    Section::Vlans => FrameKind::Vlan,
                };
                State::InBlock {
                    section,
                    frame: Some(Frame::new(kind, token.keyword.clone(), token)),
                }
            }
            other => other,
        };
    }

    /// Transition after a closing brace has reduced the depth.
    fn leave(&mut self) {
        let depth = self.depth();
        let state = std::mem::replace(&mut self.state, State::Scanning);
        self.state = match state {
            State::InRangeBlock {
                frame,
                base_depth,
                parent,
            } if depth == base_depth => {
                self.finished.push(frame);
                match parent {
                    Some(section) => State::InBlock {
                        section,
                        frame: None,
                    },
                    None => State::Scanning,
                }
            }
            State::InBlock {
                section,
                frame: Some(frame),
            } if depth == 1 => {
                self.finished.push(frame);
                State::InBlock {
                    section,
                    frame: None,
                }
            }
            State::InBlock { .. } if depth == 0 => State::Scanning,
            other => other,
        };
    }

    fn finish(self, options: &ParserOptions) -> Result<ParsedConfig, ParseError> {
        if let Some((keyword, line)) = self.open.into_iter().next() {
            return Err(ParseError::Unterminated { line, keyword });
        }
        Ok(Resolver::new(options).resolve(self.finished))
    }
}

/// Turns finished frames into overrides once every VLAN name is known.
struct Resolver<'o> {
    options: &'o ParserOptions,
    out: ParsedConfig,
    vlan_names: BTreeMap<String, u16>,
    claimed: BTreeMap<String, String>,
}

impl<'o> Resolver<'o> {
    fn new(options: &'o ParserOptions) -> Self {
        Self {
            options,
            out: ParsedConfig::default(),
            vlan_names: BTreeMap::new(),
            claimed: BTreeMap::new(),
        }
    }

    fn resolve(mut self, frames: Vec<Frame>) -> ParsedConfig {
        let (vlans, ports): (Vec<Frame>, Vec<Frame>) = frames
            .into_iter()
            .filter(|f| !f.inactive)
            .partition(|f| f.kind == FrameKind::Vlan);
        for frame in vlans {
            self.vlan(frame);
        }
        // Interface blocks refine whatever their ranges set.
        let (ranges, interfaces): (Vec<Frame>, Vec<Frame>) =
            ports.into_iter().partition(|f| f.kind == FrameKind::Range);
        for frame in ranges {
            self.range(frame);
        }
        for frame in interfaces {
            self.interface(frame);
        }
        self.out
    }

    fn record_error(&mut self, block: &str, error: ParseError) {
        self.out.errors.push(BlockError {
            block: block.to_string(),
            line: error.line().unwrap_or_default(),
            message: error.to_string(),
        });
    }

    fn vlan(&mut self, mut frame: Frame) {
        if let Some(error) = frame.error.take() {
            self.record_error(&frame.name, error);
            return;
        }
        let Some(vid) = frame.vlan_id else {
            let error = malformed(frame.line, "VLAN block without vlan-id");
            self.record_error(&frame.name, error);
            return;
        };
        self.vlan_names.insert(frame.name.clone(), vid);
        self.out.vlans.push(VlanRecord {
            vid,
            name: frame.name,
            description: frame.description.unwrap_or_default(),
        });
    }

    fn range(&mut self, mut frame: Frame) {
        let label = format!("interface-range {}", frame.name);
        if let Some(error) = frame.error.take() {
            self.record_error(&label, error);
            return;
        }
        if let Err(error) = self.claim(&frame.members, &label) {
            self.record_error(&label, error);
            return;
        }
        let marker = self.options.uplink_marker.to_ascii_lowercase();
        if !marker.is_empty() && frame.name.to_ascii_lowercase().contains(&marker) {
            self.out
                .uplinks
                .extend(frame.members.iter().map(|(m, _)| m.clone()));
            return;
        }
        if frame.mode.is_none() {
            self.out.discarded_ranges.push(frame.name);
            return;
        }
        let source = OverrideSource::Range(frame.name.clone());
        match self.build_override(&frame, source) {
            Ok(ov) => {
                for (member, _) in &frame.members {
                    self.apply(member, &ov);
                }
            }
            Err(error) => self.record_error(&label, error),
        }
    }

    fn interface(&mut self, mut frame: Frame) {
        if let Some(error) = frame.error.take() {
            self.record_error(&frame.name, error);
            return;
        }
        match self.build_override(&frame, OverrideSource::Interface) {
            Ok(ov) => {
                let name = frame.name.clone();
                self.apply(&name, &ov);
            }
            Err(error) => self.record_error(&frame.name, error),
        }
    }

    fn apply(&mut self, name: &str, ov: &InterfaceOverride) {
        self.out
            .overrides
            .entry(name.to_string())
            .or_default()
            .merge(ov);
    }

    /// Check that no member is already owned by an earlier range.
    fn claim(&mut self, members: &[(String, usize)], label: &str) -> Result<(), ParseError> {
        let mut seen = BTreeSet::new();
        for (member, line) in members {
            if let Some(first) = self.claimed.get(member) {
                return Err(ParseError::MemberCollision {
                    line: *line,
                    member: member.clone(),
                    first: first.clone(),
                });
            }
            if !seen.insert(member.as_str()) {
                return Err(ParseError::MemberCollision {
                    line: *line,
                    member: member.clone(),
                    first: label.to_string(),
                });
            }
        }
        for (member, _) in members {
            self.claimed.insert(member.clone(), label.to_string());
        }
        Ok(())
    }

    fn build_override(
        &self,
        frame: &Frame,
        source: OverrideSource,
    ) -> Result<InterfaceOverride, ParseError> {
        let vlans = self.resolve_members(&frame.vlan_members)?;
        let mut ov = InterfaceOverride {
            enabled: Some(!frame.disabled),
            description: frame.description.clone(),
            mode: frame.mode,
            is_lag_member: frame.lag_member.then_some(true),
            source,
            ..InterfaceOverride::default()
        };
        match frame.mode {
            Some(PortMode::Access) => {
                if vlans.len() > 1 {
                    return Err(ParseError::AccessVlanCount {
                        line: frame.line,
                        count: vlans.len(),
                        vlans: vlans.canonical(),
                    });
                }
                ov.untagged_vlan = vlans.first();
                ov.tagged_vlans = Some(VlanSet::new());
            }
            Some(PortMode::Trunk) => {
                ov.untagged_vlan = frame.native_vlan;
                ov.tagged_vlans = Some(vlans);
            }
            Some(PortMode::None) | None => {}
        }
        Ok(ov)
    }

    fn resolve_members(&self, members: &[(String, usize)]) -> Result<VlanSet, ParseError> {
        let mut set = VlanSet::new();
        for (token, line) in members {
            if is_numeric_vlan_token(token) {
                let vids = parse_vlan_token(token).map_err(|source| ParseError::Range {
                    line: *line,
                    source,
                })?;
                set.extend(vids);
            } else if token == "all" {
                if self.vlan_names.is_empty() {
                    return Err(malformed(*line, "members all with no VLANs defined"));
                }
                set.extend(self.vlan_names.values().copied());
            } else {
                let vid = self.vlan_names.get(token).copied().ok_or_else(|| {
                    ParseError::UnknownVlanName {
                        line: *line,
                        name: token.clone(),
                    }
                })?;
                set.insert(vid);
            }
        }
        Ok(set)
    }
}
