use crate::core::firewall::{LayerType, TcpFlag};
use std::fmt;
use thiserror::Error;

/// Core error types for rangewall
#[derive(Debug, Error)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration could not be compiled
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A frame file line could not be read
    #[error("Frame error on line {line}: {message}")]
    Frame { line: usize, message: String },

    /// No filter group with this name
    #[error("Unknown filter group '{0}'")]
    UnknownGroup(String),
}

/// Kind of named set a configuration error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum SetKind {
    #[strum(serialize = "IP")]
    Ip,
    #[strum(serialize = "port")]
    Port,
}

/// Field of a filter record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleField {
    IpFrom,
    IpTo,
    PortFrom,
    PortTo,
    Type,
    Action,
    Flag(TcpFlag),
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleField::IpFrom => f.write_str("ip.from"),
            RuleField::IpTo => f.write_str("ip.to"),
            RuleField::PortFrom => f.write_str("port.from"),
            RuleField::PortTo => f.write_str("port.to"),
            RuleField::Type => f.write_str("type"),
            RuleField::Action => f.write_str("action"),
            RuleField::Flag(flag) => write!(f, "flags.{flag}"),
        }
    }
}

/// Compile-time configuration errors
///
/// All of these abort compilation. The `Set`, `Action` and `Rule` variants
/// wrap a leaf error with the location it was found at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid address '{literal}': {reason}")]
    InvalidAddress { literal: String, reason: String },

    #[error("invalid port '{literal}': {reason}")]
    InvalidPort { literal: String, reason: String },

    #[error("unknown service '{service}' for protocol '{protocol}'")]
    UnknownService { service: String, protocol: String },

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("invalid value '{value}' for TCP flag {flag} (expected one of 0 f F 1 t T * or empty)")]
    InvalidFlag { flag: TcpFlag, value: String },

    #[error("unknown protocol type '{0}'")]
    UnknownProtocol(String),

    #[error("in {kind} set '{name}': {source}")]
    Set {
        kind: SetKind,
        name: String,
        source: Box<ConfigError>,
    },

    #[error("in action '{name}': {source}")]
    Action {
        name: String,
        source: Box<ConfigError>,
    },

    #[error("in filter '{group}' rule #{}, field '{field}': {source}", .index + 1)]
    Rule {
        group: String,
        /// Zero-based position of the rule in its group
        index: usize,
        field: RuleField,
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    /// Innermost error, with all location wrappers removed.
    pub fn root(&self) -> &ConfigError {
        match self {
            ConfigError::Set { source, .. }
            | ConfigError::Action { source, .. }
            | ConfigError::Rule { source, .. } => source.root(),
            leaf => leaf,
        }
    }

    /// Short hint on how to fix the configuration, for CLI output.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self.root() {
            ConfigError::InvalidAddress { .. } => {
                Some("Use an address (10.0.0.1, 2001:db8::1), a CIDR block (10.0.0.0/8) or a previously defined ipset name")
            }
            ConfigError::InvalidPort { .. } => Some(
                "Use a port (22), an inclusive range (8000-8080), a service (http or http/tcp) or a previously defined portset name",
            ),
            ConfigError::UnknownService { .. } => {
                Some("Check the service name against /etc/services or use a numeric port")
            }
            ConfigError::UnknownAction(_) => {
                Some("Use pass, block or a name defined earlier in the action section")
            }
            ConfigError::InvalidFlag { .. } => {
                Some("Flag values: 0/f/F = must be set, 1/t/T = must be clear, * or empty = any")
            }
            ConfigError::UnknownProtocol(_) => Some(
                "Known types: tcp udp sctp icmp icmp4 icmp6 ip ip4 ip6 arp (empty = any); set options.unknown_protocol to \"any\" to accept others",
            ),
            _ => None,
        }
    }
}

/// Frame decoding errors
///
/// Per-packet and recoverable: the caller decides what an undecodable frame
/// means for its traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("{layer} header truncated: need {needed} bytes, {available} available")]
    Truncated {
        layer: LayerType,
        needed: usize,
        available: usize,
    },

    #[error("malformed {layer} header: {reason}")]
    Malformed {
        layer: LayerType,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
