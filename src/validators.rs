//! Literal parsing and validation for configuration text
//!
//! This module turns the textual fields of a configuration into typed values.
//! Every function here is strict: malformed text is reported as a
//! [`ConfigError`] and never silently replaced by a default.

use crate::core::error::ConfigError;
use crate::core::firewall::{FlagCriterion, ProtocolType, TcpFlag};
use crate::core::interval::{IntervalPair, InvalidRange};
use crate::core::services::{DEFAULT_PROTOCOL, ServiceDirectory};
use ipnetwork::IpNetwork;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// Prefix length of the `::ffff:0:0/96` IPv4-mapped block.
const MAPPED_PREFIX: u8 = 96;

/// Largest valid port number.
pub const MAX_PORT: u32 = 65535;

/// Address range produced by one address literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressRange {
    V4(IntervalPair<u32>),
    V6(IntervalPair<u128>),
}

/// Parses a single address or a CIDR block into the range it covers.
///
/// Host bits below the prefix are ignored, so `10.1.2.3/8` covers
/// `10.0.0.0 - 10.255.255.255`. IPv4-mapped IPv6 literals (`::ffff:10.0.0.1`,
/// `::ffff:10.0.0.0/104`) yield the equivalent IPv4 range.
///
/// # Examples
///
/// ```
/// use rangewall::validators::{parse_address_literal, AddressRange};
///
/// let AddressRange::V4(range) = parse_address_literal("192.168.1.0/24").unwrap() else {
///     panic!("expected IPv4");
/// };
/// assert_eq!(range.begin(), 0xC0A8_0100);
/// assert_eq!(range.end(), 0xC0A8_01FF);
///
/// assert!(parse_address_literal("192.168.1.0/33").is_err());
/// ```
///
/// # Errors
///
/// Returns [`ConfigError::InvalidAddress`] for empty or unparsable text.
pub fn parse_address_literal(text: &str) -> Result<AddressRange, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidAddress {
        literal: text.to_string(),
        reason,
    };

    if text.is_empty() {
        return Err(invalid("empty address".to_string()));
    }

    if let Ok(addr) = IpAddr::from_str(text) {
        return Ok(match addr {
            IpAddr::V4(v4) => AddressRange::V4(IntervalPair::single(u32::from(v4))),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => AddressRange::V4(IntervalPair::single(u32::from(v4))),
                None => AddressRange::V6(IntervalPair::single(u128::from(v6))),
            },
        });
    }

    if !text.contains('/') {
        return Err(invalid("not an IP address or CIDR block".to_string()));
    }

    let network = IpNetwork::from_str(text).map_err(|e| invalid(e.to_string()))?;
    Ok(match network {
        IpNetwork::V4(net) => {
            AddressRange::V4(v4_block(net.ip(), net.prefix()).map_err(|e| invalid(e.to_string()))?)
        }
        IpNetwork::V6(net) => match net.ip().to_ipv4_mapped() {
            // Mapped blocks live with the IPv4 ranges, where mapped packet
            // addresses are looked up
            Some(v4) if net.prefix() >= MAPPED_PREFIX => AddressRange::V4(
                v4_block(v4, net.prefix() - MAPPED_PREFIX).map_err(|e| invalid(e.to_string()))?,
            ),
            _ => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(net.prefix()))
                    .unwrap_or(0);
                let begin = u128::from(net.ip()) & mask;
                AddressRange::V6(
                    IntervalPair::new(begin, begin | !mask).map_err(|e| invalid(e.to_string()))?,
                )
            }
        },
    })
}

fn v4_block(addr: Ipv4Addr, prefix: u8) -> Result<IntervalPair<u32>, InvalidRange> {
    let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
    let begin = u32::from(addr) & mask;
    IntervalPair::new(begin, begin | !mask)
}

fn is_number(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

fn parse_port_number(literal: &str, text: &str) -> Result<u32, ConfigError> {
    match text.parse::<u32>() {
        Ok(port) if port <= MAX_PORT => Ok(port),
        _ => Err(ConfigError::InvalidPort {
            literal: literal.to_string(),
            reason: format!("port {text} is out of range (0-{MAX_PORT})"),
        }),
    }
}

/// Parses a port literal into the range it covers.
///
/// Accepted forms:
/// - `22`: a single port
/// - `8000-8080`: an inclusive range
/// - `http` or `http/tcp`: a service name, resolved through `services`
///   (protocol defaults to `tcp`)
///
/// # Examples
///
/// ```
/// use rangewall::core::services::ServiceDirectory;
/// use rangewall::validators::parse_port_literal;
///
/// let services = ServiceDirectory::builtin();
/// let range = parse_port_literal("80-443", &services).unwrap();
/// assert_eq!((range.begin(), range.end()), (80, 443));
///
/// let http = parse_port_literal("http/tcp", &services).unwrap();
/// assert_eq!((http.begin(), http.end()), (80, 80));
///
/// assert!(parse_port_literal("443-80", &services).is_err());
/// ```
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPort`] for malformed numbers or ranges and
/// [`ConfigError::UnknownService`] for names the directory does not know.
pub fn parse_port_literal(
    text: &str,
    services: &ServiceDirectory,
) -> Result<IntervalPair<u32>, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidPort {
        literal: text.to_string(),
        reason: reason.to_string(),
    };

    if text.is_empty() {
        return Err(invalid("empty port"));
    }

    if is_number(text) {
        return Ok(IntervalPair::single(parse_port_number(text, text)?));
    }

    if let Some((low, high)) = text.split_once('-')
        && is_number(low)
    {
        if !is_number(high) {
            return Err(invalid("malformed range, expected LOW-HIGH"));
        }
        let low = parse_port_number(text, low)?;
        let high = parse_port_number(text, high)?;
        return IntervalPair::new(low, high)
            .map_err(|_| invalid("range start is greater than range end"));
    }

    let (service, protocol) = text.split_once('/').unwrap_or((text, DEFAULT_PROTOCOL));
    if service.is_empty() || protocol.is_empty() {
        return Err(invalid("malformed service, expected SERVICE or SERVICE/PROTOCOL"));
    }

    services
        .lookup(service, protocol)
        .map(|port| IntervalPair::single(u32::from(port)))
        .ok_or_else(|| ConfigError::UnknownService {
            service: service.to_string(),
            protocol: protocol.to_string(),
        })
}

/// Parses the text of one TCP flag field.
///
/// See [`FlagCriterion`] for the token table.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidFlag`] for any other text.
pub fn parse_flag(flag: TcpFlag, text: &str) -> Result<FlagCriterion, ConfigError> {
    FlagCriterion::parse(text).ok_or_else(|| ConfigError::InvalidFlag {
        flag,
        value: text.to_string(),
    })
}

/// Looks up a protocol-type keyword; `None` if the keyword is unknown.
///
/// The empty string is [`ProtocolType::Any`].
pub fn parse_protocol_type(text: &str) -> Option<ProtocolType> {
    if text.is_empty() {
        return Some(ProtocolType::Any);
    }
    ProtocolType::from_str(text).ok()
}
