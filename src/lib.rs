//! rangewall - interval-set firewall policy engine
//!
//! Compiles a declarative rule configuration into immutable filter groups and
//! evaluates decoded packets against them.
//!
//! # Architecture
//!
//! - [`config`] - Configuration records and loading
//! - [`core`] - Interval sets, rule compiler, frame decoder and matcher
//! - [`validators`] - Address, port, flag and protocol literal parsing
//! - [`utils`] - Utility functions (XDG directories, etc.)
//!
//! # Example
//!
//! ```
//! use rangewall::core::packet::Layer;
//! use rangewall::{Action, DecodedPacket, compile, config::parse_config, evaluate};
//!
//! let config = parse_config(r#"{
//!     "filter": { "input": [
//!         { "action": "block" },
//!         { "ip": { "from": "10.0.0.0/8" }, "action": "pass" }
//!     ] }
//! }"#).unwrap();
//! let filters = compile(&config).unwrap();
//! let rules = filters.group("input").unwrap();
//!
//! let packet = |src: &str| {
//!     DecodedPacket::from_layers([
//!         Layer::Ethernet,
//!         Layer::Ipv4 { src: src.parse().unwrap(), dst: "192.0.2.1".parse().unwrap() },
//!     ])
//! };
//! assert_eq!(evaluate(rules, &packet("10.1.2.3")), Some(&Action::Pass));
//! assert_eq!(evaluate(rules, &packet("11.1.2.3")), Some(&Action::Block));
//! ```

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod core;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::compiler::{CompileOptions, RuleCompiler, UnknownProtocolPolicy, compile};
pub use core::error::{ConfigError, DecodeError, Error, Result};
pub use core::firewall::{Action, CompiledRule, FilterSet};
pub use core::matcher::{Matcher, evaluate};
pub use core::packet::{DecodedPacket, decode_frame};
