//! Compiled firewall data model
//!
//! This module defines the immutable representation produced by the rule
//! compiler and consumed by the matcher.
//!
//! # Rule Structure
//!
//! A [`CompiledRule`] holds:
//! - Source/destination IP criteria ([`IpCriterion`])
//! - Source/destination port criteria ([`PortCriterion`])
//! - Nine tri-state TCP flag criteria ([`TcpFlagCriteria`])
//! - A required protocol class ([`LayerSet`], empty = any protocol)
//! - The [`Action`] taken when the rule is the last one to match
//!
//! Address and port sets are shared between rules through [`Arc`], so a
//! [`FilterSet`] is plain data: cheap to clone and safe to read from any
//! number of threads.

use crate::core::interval::{IntervalSet, Ipv4Ranges, Ipv6Ranges};
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

// ═══════════════════════════════════════════════════════════════════════════
// Actions
// ═══════════════════════════════════════════════════════════════════════════

/// Built-in verdicts every action reduces to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum BaseAction {
    /// Let the packet through
    #[strum(serialize = "pass")]
    Pass,
    /// Stop the packet
    #[strum(serialize = "block")]
    Block,
}

impl BaseAction {
    pub const fn permits(self) -> bool {
        matches!(self, BaseAction::Pass)
    }
}

/// A user-defined action name bound to a built-in verdict.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamedAction {
    pub name: String,
    pub base: BaseAction,
}

/// Action carried by a rule.
///
/// `Named` is the extension point for actions with side effects. Today a
/// named action behaves exactly like its base.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Pass,
    Block,
    Named(Arc<NamedAction>),
}

impl Action {
    /// Built-in verdict this action reduces to.
    pub fn base(&self) -> BaseAction {
        match self {
            Action::Pass => BaseAction::Pass,
            Action::Block => BaseAction::Block,
            Action::Named(named) => named.base,
        }
    }

    /// Returns `true` if this action lets traffic through.
    pub fn permits(&self) -> bool {
        self.base().permits()
    }

    /// Returns `true` if this action reacts to the matched packet.
    ///
    /// No action reacts yet.
    pub fn reacts(&self) -> bool {
        false
    }

    pub fn name(&self) -> &str {
        match self {
            Action::Pass => "pass",
            Action::Block => "block",
            Action::Named(named) => &named.name,
        }
    }
}

impl From<BaseAction> for Action {
    fn from(base: BaseAction) -> Self {
        match base {
            BaseAction::Pass => Action::Pass,
            BaseAction::Block => Action::Block,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Named(named) => write!(f, "{} ({})", named.name, named.base),
            other => f.write_str(other.name()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Protocol layers
// ═══════════════════════════════════════════════════════════════════════════

/// Protocol layers a decoded packet can carry.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[repr(u8)]
pub enum LayerType {
    #[strum(serialize = "ethernet")]
    Ethernet,
    #[strum(serialize = "arp")]
    Arp,
    #[strum(serialize = "ipv4")]
    Ipv4,
    #[strum(serialize = "ipv6")]
    Ipv6,
    #[strum(serialize = "ipv6-extension")]
    Ipv6Extension,
    #[strum(serialize = "icmpv4")]
    Icmpv4,
    #[strum(serialize = "icmpv6")]
    Icmpv6,
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    #[strum(serialize = "sctp")]
    Sctp,
}

impl LayerType {
    const fn bit(self) -> u16 {
        1 << self as u8
    }
}

/// Set of [`LayerType`]s stored as a bitmask.
///
/// Used both for a rule's required protocol class and for the layers
/// present in a decoded packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LayerSet(u16);

impl LayerSet {
    pub const EMPTY: LayerSet = LayerSet(0);

    pub const fn of(layers: &[LayerType]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < layers.len() {
            bits |= layers[i].bit();
            i += 1;
        }
        LayerSet(bits)
    }

    #[must_use]
    pub const fn with(self, layer: LayerType) -> Self {
        LayerSet(self.0 | layer.bit())
    }

    pub fn insert(&mut self, layer: LayerType) {
        self.0 |= layer.bit();
    }

    pub const fn contains(self, layer: LayerType) -> bool {
        self.0 & layer.bit() != 0
    }

    pub const fn intersects(self, other: LayerSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = LayerType> {
        use strum::IntoEnumIterator;
        LayerType::iter().filter(move |layer| self.contains(*layer))
    }
}

impl fmt::Display for LayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("any");
        }
        for (i, layer) in self.iter().enumerate() {
            if i > 0 {
                f.write_str("+")?;
            }
            write!(f, "{layer}")?;
        }
        Ok(())
    }
}

/// Protocol-type keywords accepted in filter records.
///
/// The empty string maps to [`ProtocolType::Any`]; `"any"` is accepted as a
/// synonym.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum ProtocolType {
    #[strum(serialize = "any")]
    Any,
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    #[strum(serialize = "sctp")]
    Sctp,
    #[strum(serialize = "icmp4")]
    Icmp4,
    #[strum(serialize = "icmp6")]
    Icmp6,
    /// ICMP for both IP versions
    #[strum(serialize = "icmp")]
    Icmp,
    /// IPv4 or IPv6
    #[strum(serialize = "ip")]
    Ip,
    #[strum(serialize = "ip4")]
    Ip4,
    #[strum(serialize = "ip6")]
    Ip6,
    #[strum(serialize = "arp")]
    Arp,
}

impl ProtocolType {
    /// Protocol class a rule of this type is restricted to.
    pub const fn layers(self) -> LayerSet {
        match self {
            ProtocolType::Any => LayerSet::EMPTY,
            ProtocolType::Tcp => LayerSet::of(&[LayerType::Tcp]),
            ProtocolType::Udp => LayerSet::of(&[LayerType::Udp]),
            ProtocolType::Sctp => LayerSet::of(&[LayerType::Sctp]),
            ProtocolType::Icmp4 => LayerSet::of(&[LayerType::Icmpv4]),
            ProtocolType::Icmp6 => LayerSet::of(&[LayerType::Icmpv6]),
            ProtocolType::Icmp => LayerSet::of(&[LayerType::Icmpv4, LayerType::Icmpv6]),
            ProtocolType::Ip => LayerSet::of(&[LayerType::Ipv4, LayerType::Ipv6]),
            ProtocolType::Ip4 => LayerSet::of(&[LayerType::Ipv4]),
            ProtocolType::Ip6 => LayerSet::of(&[LayerType::Ipv6]),
            ProtocolType::Arp => LayerSet::of(&[LayerType::Arp]),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TCP flags
// ═══════════════════════════════════════════════════════════════════════════

/// The nine TCP header flags.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[repr(u8)]
pub enum TcpFlag {
    #[strum(serialize = "fin")]
    Fin,
    #[strum(serialize = "syn")]
    Syn,
    #[strum(serialize = "rst")]
    Rst,
    #[strum(serialize = "psh")]
    Psh,
    #[strum(serialize = "ack")]
    Ack,
    #[strum(serialize = "urg")]
    Urg,
    #[strum(serialize = "ece")]
    Ece,
    #[strum(serialize = "cwr")]
    Cwr,
    #[strum(serialize = "ns")]
    Ns,
}

impl TcpFlag {
    pub const COUNT: usize = 9;

    const fn index(self) -> usize {
        self as usize
    }
}

/// Flag bits observed on a TCP header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TcpFlags(u16);

impl TcpFlags {
    pub const fn empty() -> Self {
        TcpFlags(0)
    }

    pub const fn of(flags: &[TcpFlag]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < flags.len() {
            bits |= 1 << flags[i] as u8;
            i += 1;
        }
        TcpFlags(bits)
    }

    pub fn set(&mut self, flag: TcpFlag, on: bool) {
        if on {
            self.0 |= 1 << flag as u8;
        } else {
            self.0 &= !(1 << flag as u8);
        }
    }

    pub const fn is_set(self, flag: TcpFlag) -> bool {
        self.0 & (1 << flag as u8) != 0
    }
}

/// Tri-state requirement on a single TCP flag.
///
/// Configuration text maps onto these states as follows:
///
/// | Text | State |
/// |---|---|
/// | `""`, `"*"` | [`Any`](FlagCriterion::Any) |
/// | `"0"`, `"f"`, `"F"` | [`Set`](FlagCriterion::Set) |
/// | `"1"`, `"t"`, `"T"` | [`Clear`](FlagCriterion::Clear) |
///
/// The numeric and boolean tokens are deliberately mapped the "inverted"
/// way round; existing configurations depend on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum FlagCriterion {
    #[default]
    #[strum(serialize = "*")]
    Any,
    #[strum(serialize = "set")]
    Set,
    #[strum(serialize = "clear")]
    Clear,
}

impl FlagCriterion {
    /// Parses flag text; `None` for anything outside the table above.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "" | "*" => Some(FlagCriterion::Any),
            "0" | "f" | "F" => Some(FlagCriterion::Set),
            "1" | "t" | "T" => Some(FlagCriterion::Clear),
            _ => None,
        }
    }

    #[inline]
    pub const fn check(self, bit: bool) -> bool {
        match self {
            FlagCriterion::Any => true,
            FlagCriterion::Set => bit,
            FlagCriterion::Clear => !bit,
        }
    }
}

/// Criteria for all nine flags, indexed by [`TcpFlag`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TcpFlagCriteria([FlagCriterion; TcpFlag::COUNT]);

impl TcpFlagCriteria {
    pub fn get(&self, flag: TcpFlag) -> FlagCriterion {
        self.0[flag.index()]
    }

    pub fn set(&mut self, flag: TcpFlag, criterion: FlagCriterion) {
        self.0[flag.index()] = criterion;
    }

    #[must_use]
    pub fn with(mut self, flag: TcpFlag, criterion: FlagCriterion) -> Self {
        self.set(flag, criterion);
        self
    }

    /// Returns `true` if every criterion holds for `flags`.
    pub fn check(&self, flags: TcpFlags) -> bool {
        use strum::IntoEnumIterator;
        TcpFlag::iter().all(|flag| self.get(flag).check(flags.is_set(flag)))
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.iter().all(|c| *c == FlagCriterion::Any)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Address and port criteria
// ═══════════════════════════════════════════════════════════════════════════

/// IPv4 and IPv6 ranges bound together under one set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpSet {
    pub(crate) v4: Ipv4Ranges,
    pub(crate) v6: Ipv6Ranges,
}

impl IpSet {
    /// Builds a set from both halves, cleaning them.
    pub fn new(v4: Ipv4Ranges, v6: Ipv6Ranges) -> Self {
        let mut set = Self { v4, v6 };
        set.clean();
        set
    }

    pub fn v4(&self) -> &Ipv4Ranges {
        &self.v4
    }

    pub fn v6(&self) -> &Ipv6Ranges {
        &self.v6
    }

    /// Canonicalizes both halves.
    pub fn clean(&mut self) {
        self.v4.clean();
        self.v6.clean();
    }

    /// Appends all ranges of `other`; call [`clean`](Self::clean) afterwards.
    pub fn extend_from(&mut self, other: &IpSet) {
        self.v4.extend_from(&other.v4);
        self.v6.extend_from(&other.v6);
    }

    /// Returns `true` if `addr` is in the set.
    ///
    /// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are looked up in the
    /// IPv4 ranges.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match addr {
            IpAddr::V4(v4) => self.v4.contains(u32::from(v4)),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => self.v4.contains(u32::from(v4)),
                None => self.v6.contains(u128::from(v6)),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }
}

/// Port ranges, held in the 32-bit domain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortSet {
    pub(crate) ranges: IntervalSet<u32>,
}

impl PortSet {
    /// Builds a set from `ranges`, cleaning them.
    pub fn new(mut ranges: IntervalSet<u32>) -> Self {
        ranges.clean();
        Self { ranges }
    }

    pub fn ranges(&self) -> &IntervalSet<u32> {
        &self.ranges
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ranges.contains(u32::from(port))
    }
}

/// Address criterion of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IpCriterion {
    /// Matches every address
    #[default]
    Any,
    Set(Arc<IpSet>),
}

impl IpCriterion {
    #[inline]
    pub fn matches(&self, addr: IpAddr) -> bool {
        match self {
            IpCriterion::Any => true,
            IpCriterion::Set(set) => set.contains(addr),
        }
    }
}

/// Port criterion of a rule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PortCriterion {
    /// Matches every port
    #[default]
    Any,
    Set(Arc<PortSet>),
}

impl PortCriterion {
    #[inline]
    pub fn matches(&self, port: u16) -> bool {
        match self {
            PortCriterion::Any => true,
            PortCriterion::Set(set) => set.contains(port),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Rules
// ═══════════════════════════════════════════════════════════════════════════

/// One compiled firewall rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub src_ip: IpCriterion,
    pub dst_ip: IpCriterion,
    pub src_port: PortCriterion,
    pub dst_port: PortCriterion,
    pub tcp_flags: TcpFlagCriteria,
    /// Required protocol class; empty matches any protocol
    pub protocols: LayerSet,
    pub action: Action,
}

impl CompiledRule {
    /// A rule with every criterion set to wildcard.
    pub fn any(action: Action) -> Self {
        Self {
            src_ip: IpCriterion::Any,
            dst_ip: IpCriterion::Any,
            src_port: PortCriterion::Any,
            dst_port: PortCriterion::Any,
            tcp_flags: TcpFlagCriteria::default(),
            protocols: LayerSet::EMPTY,
            action,
        }
    }
}

/// Compiled filter groups, keyed by group name.
///
/// Rule order inside a group is the source order and decides the verdict
/// (last match wins). There is no mutation API: a `FilterSet` is built once
/// by the compiler and then only read.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    groups: BTreeMap<String, Vec<CompiledRule>>,
}

impl FilterSet {
    pub(crate) fn from_groups(groups: BTreeMap<String, Vec<CompiledRule>>) -> Self {
        Self { groups }
    }

    /// Rules of a group, in source order.
    pub fn group(&self, name: &str) -> Option<&[CompiledRule]> {
        self.groups.get(name).map(Vec::as_slice)
    }

    /// Group names in sorted order.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[CompiledRule])> {
        self.groups
            .iter()
            .map(|(name, rules)| (name.as_str(), rules.as_slice()))
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of rules across all groups.
    pub fn rule_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}
