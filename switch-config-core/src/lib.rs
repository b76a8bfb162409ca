//! Tokenizer and block parser for brace-delimited switch configuration text.
//!
//! Supports exactly the subset of block/statement syntax needed to pull
//! interface and VLAN facts out of a device configuration: range expansion,
//! interface ranges, flat interface blocks and the VLAN catalogue.

pub mod block;
pub mod model;
pub mod range;
pub mod token;
pub mod vlans;

pub use block::{parse_config, parse_config_file, BlockError, ParseError, ParsedConfig, ParserOptions};
pub use model::{
    is_physical_name, InterfaceOverride, InterfaceRecord, OverrideSource, PortMode, VlanRecord,
};
pub use range::{expand_port_range, parse_vlan_expr, RangeError, VlanSet};
pub use token::{tokenize, Terminator, Token, TokenizeError};
pub use vlans::{load_vlan_catalogue, parse_vlan_catalogue};
