//! Reference frame decoder
//!
//! Decodes an Ethernet II frame into the ordered list of protocol layers the
//! matcher consumes. Only the fields rules can test are extracted: addresses,
//! transport ports and TCP flags.
//!
//! Decoding stops without error at the first ether type or IP protocol it
//! does not know, and at non-initial fragments; the layers decoded so far
//! form the packet. A header that is shorter than it claims to be, or whose
//! length fields are inconsistent, is a [`DecodeError`].
//!
//! ```text
//! Ethernet ─┬─ ARP
//!           ├─ IPv4 ─┬─ ICMPv4 / TCP / UDP / SCTP
//!           │        └─ IPv6 (proto 41)
//!           └─ IPv6 ─┬─ extension headers (0, 43, 44, 60) ...
//!                    ├─ ICMPv6 / TCP / UDP / SCTP
//!                    └─ IPv4 (next header 4)
//! ```

use crate::core::error::DecodeError;
use crate::core::firewall::{LayerSet, LayerType, TcpFlag, TcpFlags};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const ARP_HEADER_LEN: usize = 8;
pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
pub const IPV6_EXTENSION_MIN_LEN: usize = 8;
pub const TCP_MIN_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;
pub const SCTP_COMMON_HEADER_LEN: usize = 12;
pub const ICMPV4_HEADER_LEN: usize = 8;
pub const ICMPV6_HEADER_LEN: usize = 4;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_ARP: u16 = 0x0806;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;

pub const IPPROTO_HOPOPTS: u8 = 0;
pub const IPPROTO_ICMP: u8 = 1;
pub const IPPROTO_IPIP: u8 = 4;
pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;
pub const IPPROTO_IPV6: u8 = 41;
pub const IPPROTO_ROUTING: u8 = 43;
pub const IPPROTO_FRAGMENT: u8 = 44;
pub const IPPROTO_ICMPV6: u8 = 58;
pub const IPPROTO_DSTOPTS: u8 = 60;
pub const IPPROTO_SCTP: u8 = 132;

/// One decoded protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Ethernet,
    Arp,
    Ipv4 { src: Ipv4Addr, dst: Ipv4Addr },
    Ipv6 { src: Ipv6Addr, dst: Ipv6Addr },
    /// IPv6 extension header, by its protocol number
    Ipv6Extension { header: u8 },
    Icmpv4,
    Icmpv6,
    Tcp {
        src_port: u16,
        dst_port: u16,
        flags: TcpFlags,
    },
    Udp { src_port: u16, dst_port: u16 },
    Sctp { src_port: u16, dst_port: u16 },
}

impl Layer {
    pub const fn layer_type(&self) -> LayerType {
        match self {
            Layer::Ethernet => LayerType::Ethernet,
            Layer::Arp => LayerType::Arp,
            Layer::Ipv4 { .. } => LayerType::Ipv4,
            Layer::Ipv6 { .. } => LayerType::Ipv6,
            Layer::Ipv6Extension { .. } => LayerType::Ipv6Extension,
            Layer::Icmpv4 => LayerType::Icmpv4,
            Layer::Icmpv6 => LayerType::Icmpv6,
            Layer::Tcp { .. } => LayerType::Tcp,
            Layer::Udp { .. } => LayerType::Udp,
            Layer::Sctp { .. } => LayerType::Sctp,
        }
    }

    /// Source and destination address of an IP layer.
    pub fn addresses(&self) -> Option<(IpAddr, IpAddr)> {
        match *self {
            Layer::Ipv4 { src, dst } => Some((IpAddr::V4(src), IpAddr::V4(dst))),
            Layer::Ipv6 { src, dst } => Some((IpAddr::V6(src), IpAddr::V6(dst))),
            _ => None,
        }
    }

    /// Source and destination port of a TCP, UDP or SCTP layer.
    pub fn ports(&self) -> Option<(u16, u16)> {
        match *self {
            Layer::Tcp {
                src_port, dst_port, ..
            }
            | Layer::Udp { src_port, dst_port }
            | Layer::Sctp { src_port, dst_port } => Some((src_port, dst_port)),
            _ => None,
        }
    }
}

/// Layers of one decoded frame, in wire order.
///
/// Reused across frames: [`decode_frame`] clears it first, so the layer
/// buffer only allocates while it grows to the deepest frame seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedPacket {
    layers: Vec<Layer>,
    present: LayerSet,
}

impl DecodedPacket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a packet directly from layers, without decoding.
    pub fn from_layers(layers: impl IntoIterator<Item = Layer>) -> Self {
        let mut packet = Self::new();
        for layer in layers {
            packet.push(layer);
        }
        packet
    }

    pub fn clear(&mut self) {
        self.layers.clear();
        self.present = LayerSet::EMPTY;
    }

    pub fn push(&mut self, layer: Layer) {
        self.present.insert(layer.layer_type());
        self.layers.push(layer);
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Layer types present in the packet.
    pub fn present(&self) -> LayerSet {
        self.present
    }

    pub fn contains(&self, layer: LayerType) -> bool {
        self.present.contains(layer)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// What follows the header just decoded
enum Next {
    Arp,
    Ipv4,
    Ipv6,
    Extension(u8),
    Icmpv4,
    Icmpv6,
    Tcp,
    Udp,
    Sctp,
    Done,
}

impl Next {
    fn from_ether_type(ether_type: u16) -> Self {
        match ether_type {
            ETHERTYPE_ARP => Next::Arp,
            ETHERTYPE_IPV4 => Next::Ipv4,
            ETHERTYPE_IPV6 => Next::Ipv6,
            _ => Next::Done,
        }
    }

    fn from_protocol(protocol: u8) -> Self {
        match protocol {
            IPPROTO_ICMP => Next::Icmpv4,
            IPPROTO_IPIP => Next::Ipv4,
            IPPROTO_TCP => Next::Tcp,
            IPPROTO_UDP => Next::Udp,
            IPPROTO_IPV6 => Next::Ipv6,
            IPPROTO_ICMPV6 => Next::Icmpv6,
            IPPROTO_SCTP => Next::Sctp,
            IPPROTO_HOPOPTS | IPPROTO_ROUTING | IPPROTO_FRAGMENT | IPPROTO_DSTOPTS => {
                Next::Extension(protocol)
            }
            _ => Next::Done,
        }
    }
}

/// Decodes `frame` into `packet`, replacing its previous contents.
///
/// # Errors
///
/// Returns [`DecodeError`] for truncated or inconsistent headers. `packet`
/// then holds the layers decoded before the failure and must not be matched.
pub fn decode_frame(frame: &[u8], packet: &mut DecodedPacket) -> Result<(), DecodeError> {
    packet.clear();

    let mut data = frame;
    let eth = take(&mut data, ETHERNET_HEADER_LEN, LayerType::Ethernet)?;
    packet.push(Layer::Ethernet);
    let mut next = Next::from_ether_type(be16(eth, 12));

    loop {
        next = match next {
            Next::Arp => {
                decode_arp(&mut data)?;
                packet.push(Layer::Arp);
                Next::Done
            }
            Next::Ipv4 => decode_ipv4(&mut data, packet)?,
            Next::Ipv6 => decode_ipv6(&mut data, packet)?,
            Next::Extension(header) => decode_extension(header, &mut data, packet)?,
            Next::Icmpv4 => {
                take(&mut data, ICMPV4_HEADER_LEN, LayerType::Icmpv4)?;
                packet.push(Layer::Icmpv4);
                Next::Done
            }
            Next::Icmpv6 => {
                take(&mut data, ICMPV6_HEADER_LEN, LayerType::Icmpv6)?;
                packet.push(Layer::Icmpv6);
                Next::Done
            }
            Next::Tcp => {
                decode_tcp(&mut data, packet)?;
                Next::Done
            }
            Next::Udp => {
                let hdr = take(&mut data, UDP_HEADER_LEN, LayerType::Udp)?;
                packet.push(Layer::Udp {
                    src_port: be16(hdr, 0),
                    dst_port: be16(hdr, 2),
                });
                Next::Done
            }
            Next::Sctp => {
                let hdr = take(&mut data, SCTP_COMMON_HEADER_LEN, LayerType::Sctp)?;
                packet.push(Layer::Sctp {
                    src_port: be16(hdr, 0),
                    dst_port: be16(hdr, 2),
                });
                Next::Done
            }
            Next::Done => return Ok(()),
        };
    }
}

/// Consumes the fixed ARP header plus the sender and target address pairs.
fn decode_arp(data: &mut &[u8]) -> Result<(), DecodeError> {
    let fixed = peek(*data, ARP_HEADER_LEN, LayerType::Arp)?;
    let addresses = 2 * (usize::from(fixed[4]) + usize::from(fixed[5]));
    take(data, ARP_HEADER_LEN + addresses, LayerType::Arp)?;
    Ok(())
}

fn decode_ipv4(data: &mut &[u8], packet: &mut DecodedPacket) -> Result<Next, DecodeError> {
    let fixed = peek(*data, IPV4_MIN_HEADER_LEN, LayerType::Ipv4)?;
    if fixed[0] >> 4 != 4 {
        return Err(DecodeError::Malformed {
            layer: LayerType::Ipv4,
            reason: "version field is not 4",
        });
    }
    let header_len = usize::from(fixed[0] & 0x0F) * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::Malformed {
            layer: LayerType::Ipv4,
            reason: "header length below 20 bytes",
        });
    }

    let hdr = take(data, header_len, LayerType::Ipv4)?;
    packet.push(Layer::Ipv4 {
        src: Ipv4Addr::new(hdr[12], hdr[13], hdr[14], hdr[15]),
        dst: Ipv4Addr::new(hdr[16], hdr[17], hdr[18], hdr[19]),
    });

    // Only the first fragment carries the upper-layer header
    let fragment_offset = be16(hdr, 6) & 0x1FFF;
    if fragment_offset != 0 {
        return Ok(Next::Done);
    }
    Ok(Next::from_protocol(hdr[9]))
}

fn decode_ipv6(data: &mut &[u8], packet: &mut DecodedPacket) -> Result<Next, DecodeError> {
    let hdr = peek(*data, IPV6_HEADER_LEN, LayerType::Ipv6)?;
    if hdr[0] >> 4 != 6 {
        return Err(DecodeError::Malformed {
            layer: LayerType::Ipv6,
            reason: "version field is not 6",
        });
    }
    let hdr = take(data, IPV6_HEADER_LEN, LayerType::Ipv6)?;
    packet.push(Layer::Ipv6 {
        src: Ipv6Addr::from(be128(hdr, 8)),
        dst: Ipv6Addr::from(be128(hdr, 24)),
    });
    Ok(Next::from_protocol(hdr[6]))
}

fn decode_extension(
    header: u8,
    data: &mut &[u8],
    packet: &mut DecodedPacket,
) -> Result<Next, DecodeError> {
    let fixed = peek(*data, IPV6_EXTENSION_MIN_LEN, LayerType::Ipv6Extension)?;
    let next_header = fixed[0];

    if header == IPPROTO_FRAGMENT {
        let fragment_offset = be16(fixed, 2) >> 3;
        take(data, IPV6_EXTENSION_MIN_LEN, LayerType::Ipv6Extension)?;
        packet.push(Layer::Ipv6Extension { header });
        if fragment_offset != 0 {
            return Ok(Next::Done);
        }
        return Ok(Next::from_protocol(next_header));
    }

    // Length is in 8-octet units, not counting the first 8 octets
    let len = (usize::from(fixed[1]) + 1) * 8;
    take(data, len, LayerType::Ipv6Extension)?;
    packet.push(Layer::Ipv6Extension { header });
    Ok(Next::from_protocol(next_header))
}

fn decode_tcp(data: &mut &[u8], packet: &mut DecodedPacket) -> Result<(), DecodeError> {
    let fixed = peek(*data, TCP_MIN_HEADER_LEN, LayerType::Tcp)?;
    let header_len = usize::from(fixed[12] >> 4) * 4;
    if header_len < TCP_MIN_HEADER_LEN {
        return Err(DecodeError::Malformed {
            layer: LayerType::Tcp,
            reason: "data offset below 20 bytes",
        });
    }
    let hdr = take(data, header_len, LayerType::Tcp)?;

    let mut flags = TcpFlags::empty();
    flags.set(TcpFlag::Ns, hdr[12] & 0x01 != 0);
    for (flag, mask) in [
        (TcpFlag::Cwr, 0x80),
        (TcpFlag::Ece, 0x40),
        (TcpFlag::Urg, 0x20),
        (TcpFlag::Ack, 0x10),
        (TcpFlag::Psh, 0x08),
        (TcpFlag::Rst, 0x04),
        (TcpFlag::Syn, 0x02),
        (TcpFlag::Fin, 0x01),
    ] {
        flags.set(flag, hdr[13] & mask != 0);
    }

    packet.push(Layer::Tcp {
        src_port: be16(hdr, 0),
        dst_port: be16(hdr, 2),
        flags,
    });
    Ok(())
}

/// Returns the first `len` bytes of `data` without consuming them.
fn peek(data: &[u8], len: usize, layer: LayerType) -> Result<&[u8], DecodeError> {
    data.get(..len).ok_or(DecodeError::Truncated {
        layer,
        needed: len,
        available: data.len(),
    })
}

/// Splits the first `len` bytes off `data`.
fn take<'a>(data: &mut &'a [u8], len: usize, layer: LayerType) -> Result<&'a [u8], DecodeError> {
    let rest: &'a [u8] = *data;
    if rest.len() < len {
        return Err(DecodeError::Truncated {
            layer,
            needed: len,
            available: rest.len(),
        });
    }
    let (head, tail) = rest.split_at(len);
    *data = tail;
    Ok(head)
}

fn be16(buf: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([buf[offset], buf[offset + 1]])
}

fn be128(buf: &[u8], offset: usize) -> u128 {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&buf[offset..offset + 16]);
    u128::from_be_bytes(bytes)
}
