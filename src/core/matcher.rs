//! Packet matching
//!
//! A rule matches a decoded packet when:
//!
//! 1. its protocol class is empty or shares a layer type with the packet, and
//! 2. every packet layer the rule has criteria for satisfies them: IP layers
//!    check the address criteria, TCP/UDP/SCTP layers the port criteria, and
//!    TCP layers also the nine flag criteria.
//!
//! Layers without criteria are ignored, so an address-only rule also matches
//! packets that carry no IP layer at all.
//!
//! Within a group the **last** matching rule decides. When nothing matches
//! the result is `None` and the caller picks the default.

use crate::core::error::DecodeError;
use crate::core::firewall::{Action, CompiledRule};
use crate::core::packet::{DecodedPacket, Layer, decode_frame};
use std::net::IpAddr;

/// Returns `true` if `rule` matches `packet`.
pub fn rule_matches(rule: &CompiledRule, packet: &DecodedPacket) -> bool {
    if !rule.protocols.is_empty() && !rule.protocols.intersects(packet.present()) {
        return false;
    }
    packet
        .layers()
        .iter()
        .all(|layer| layer_matches(rule, layer))
}

#[inline]
fn layer_matches(rule: &CompiledRule, layer: &Layer) -> bool {
    match *layer {
        Layer::Ipv4 { src, dst } => {
            rule.src_ip.matches(IpAddr::V4(src)) && rule.dst_ip.matches(IpAddr::V4(dst))
        }
        Layer::Ipv6 { src, dst } => {
            rule.src_ip.matches(IpAddr::V6(src)) && rule.dst_ip.matches(IpAddr::V6(dst))
        }
        Layer::Tcp {
            src_port,
            dst_port,
            flags,
        } => {
            rule.src_port.matches(src_port)
                && rule.dst_port.matches(dst_port)
                && rule.tcp_flags.check(flags)
        }
        Layer::Udp { src_port, dst_port } | Layer::Sctp { src_port, dst_port } => {
            rule.src_port.matches(src_port) && rule.dst_port.matches(dst_port)
        }
        Layer::Ethernet
        | Layer::Arp
        | Layer::Ipv6Extension { .. }
        | Layer::Icmpv4
        | Layer::Icmpv6 => true,
    }
}

/// Folds `rules` over `packet`; the last matching rule's action wins.
///
/// Returns `None` when no rule matches.
pub fn evaluate<'r>(rules: &'r [CompiledRule], packet: &DecodedPacket) -> Option<&'r Action> {
    // Scanning from the back stops at the rule a forward fold would end on
    rules
        .iter()
        .rev()
        .find(|rule| rule_matches(rule, packet))
        .map(|rule| &rule.action)
}

/// Decodes frames and evaluates them against rule lists.
///
/// Holds the decoding scratch space, so each worker thread owns its own
/// `Matcher` while the rules themselves are shared.
#[derive(Debug, Default)]
pub struct Matcher {
    packet: DecodedPacket,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `frame` into the scratch packet.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for truncated or malformed frames.
    pub fn decode(&mut self, frame: &[u8]) -> Result<&DecodedPacket, DecodeError> {
        decode_frame(frame, &mut self.packet)?;
        Ok(&self.packet)
    }

    /// Decodes `frame` and evaluates it against `rules`.
    ///
    /// A frame that fails to decode is never matched against a partial layer
    /// list; the error is returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for truncated or malformed frames.
    pub fn check<'r>(
        &mut self,
        frame: &[u8],
        rules: &'r [CompiledRule],
    ) -> Result<Option<&'r Action>, DecodeError> {
        let packet = self.decode(frame)?;
        Ok(evaluate(rules, packet))
    }
}
