//! Shared test utilities for core module tests
//!
//! Frame builders that assemble well-formed Ethernet frames layer by layer,
//! plus the lock for tests that touch environment variables.
//! Checksums are left zero; the decoder never reads them.
//! This module is only compiled in test mode.

use crate::core::firewall::TcpFlag;
use crate::core::packet::{
    ETHERTYPE_ARP, ETHERTYPE_IPV4, ETHERTYPE_IPV6, IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_SCTP,
    IPPROTO_TCP, IPPROTO_UDP,
};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;

/// Serializes tests that change process environment variables
/// (`RANGEWALL_CONFIG`).
///
/// # Example
///
/// ```ignore
/// let _guard = ENV_VAR_MUTEX.lock().unwrap();
/// unsafe {
///     std::env::set_var("RANGEWALL_CONFIG", "/tmp/rules.json");
/// }
/// // ... test with custom env state ...
/// unsafe {
///     std::env::remove_var("RANGEWALL_CONFIG");
/// }
/// ```
pub static ENV_VAR_MUTEX: Mutex<()> = Mutex::new(());

pub fn ethernet(ether_type: u16, payload: &[u8]) -> Vec<u8> {
    let mut frame = vec![
        0x02, 0x00, 0x00, 0x00, 0x00, 0x02, // dst MAC
        0x02, 0x00, 0x00, 0x00, 0x00, 0x01, // src MAC
    ];
    frame.extend_from_slice(&ether_type.to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// IPv4 header without options.
pub fn ipv4(src: &str, dst: &str, protocol: u8, payload: &[u8]) -> Vec<u8> {
    ipv4_fragment(src, dst, protocol, 0, payload)
}

/// IPv4 header with the given fragment offset (in 8-byte units).
pub fn ipv4_fragment(src: &str, dst: &str, protocol: u8, offset: u16, payload: &[u8]) -> Vec<u8> {
    let src: Ipv4Addr = src.parse().unwrap();
    let dst: Ipv4Addr = dst.parse().unwrap();
    let total_len = u16::try_from(20 + payload.len()).unwrap();

    let mut hdr = vec![0x45, 0x00];
    hdr.extend_from_slice(&total_len.to_be_bytes());
    hdr.extend_from_slice(&[0x00, 0x01]); // identification
    hdr.extend_from_slice(&(offset & 0x1FFF).to_be_bytes());
    hdr.extend_from_slice(&[64, protocol, 0x00, 0x00]);
    hdr.extend_from_slice(&src.octets());
    hdr.extend_from_slice(&dst.octets());
    hdr.extend_from_slice(payload);
    hdr
}

pub fn ipv6(src: &str, dst: &str, next_header: u8, payload: &[u8]) -> Vec<u8> {
    let src: Ipv6Addr = src.parse().unwrap();
    let dst: Ipv6Addr = dst.parse().unwrap();
    let payload_len = u16::try_from(payload.len()).unwrap();

    let mut hdr = vec![0x60, 0x00, 0x00, 0x00];
    hdr.extend_from_slice(&payload_len.to_be_bytes());
    hdr.extend_from_slice(&[next_header, 64]);
    hdr.extend_from_slice(&src.octets());
    hdr.extend_from_slice(&dst.octets());
    hdr.extend_from_slice(payload);
    hdr
}

/// Minimal 8-byte extension header (hop-by-hop, routing or destination options).
pub fn ipv6_extension(next_header: u8, payload: &[u8]) -> Vec<u8> {
    let mut hdr = vec![next_header, 0, 0, 0, 0, 0, 0, 0];
    hdr.extend_from_slice(payload);
    hdr
}

/// IPv6 fragment header with the given fragment offset (in 8-byte units).
pub fn ipv6_fragment(next_header: u8, offset: u16, payload: &[u8]) -> Vec<u8> {
    let mut hdr = vec![next_header, 0];
    hdr.extend_from_slice(&(offset << 3).to_be_bytes());
    hdr.extend_from_slice(&[0, 0, 0, 1]);
    hdr.extend_from_slice(payload);
    hdr
}

pub fn tcp(src_port: u16, dst_port: u16, flags: &[TcpFlag]) -> Vec<u8> {
    let mut offset_ns = 0x50; // data offset 5 words
    let mut bits = 0u8;
    for flag in flags {
        match flag {
            TcpFlag::Ns => offset_ns |= 0x01,
            TcpFlag::Cwr => bits |= 0x80,
            TcpFlag::Ece => bits |= 0x40,
            TcpFlag::Urg => bits |= 0x20,
            TcpFlag::Ack => bits |= 0x10,
            TcpFlag::Psh => bits |= 0x08,
            TcpFlag::Rst => bits |= 0x04,
            TcpFlag::Syn => bits |= 0x02,
            TcpFlag::Fin => bits |= 0x01,
        }
    }

    let mut hdr = Vec::with_capacity(20);
    hdr.extend_from_slice(&src_port.to_be_bytes());
    hdr.extend_from_slice(&dst_port.to_be_bytes());
    hdr.extend_from_slice(&[0, 0, 0, 1]); // sequence
    hdr.extend_from_slice(&[0, 0, 0, 0]); // acknowledgment
    hdr.extend_from_slice(&[offset_ns, bits, 0xFF, 0xFF, 0, 0, 0, 0]);
    hdr
}

pub fn udp(src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut hdr = Vec::with_capacity(8);
    hdr.extend_from_slice(&src_port.to_be_bytes());
    hdr.extend_from_slice(&dst_port.to_be_bytes());
    hdr.extend_from_slice(&[0, 8, 0, 0]);
    hdr
}

pub fn sctp(src_port: u16, dst_port: u16) -> Vec<u8> {
    let mut hdr = Vec::with_capacity(12);
    hdr.extend_from_slice(&src_port.to_be_bytes());
    hdr.extend_from_slice(&dst_port.to_be_bytes());
    hdr.extend_from_slice(&[0; 8]); // verification tag, checksum
    hdr
}

/// ICMPv4 echo request
pub fn icmpv4() -> Vec<u8> {
    vec![8, 0, 0, 0, 0, 1, 0, 1]
}

/// ICMPv6 echo request (type, code, checksum)
pub fn icmpv6() -> Vec<u8> {
    vec![128, 0, 0, 0]
}

// ─── Whole frames ───────────────────────────────────────────────────────────

pub fn tcp4_frame(src: &str, dst: &str, src_port: u16, dst_port: u16, flags: &[TcpFlag]) -> Vec<u8> {
    ethernet(
        ETHERTYPE_IPV4,
        &ipv4(src, dst, IPPROTO_TCP, &tcp(src_port, dst_port, flags)),
    )
}

pub fn udp4_frame(src: &str, dst: &str, src_port: u16, dst_port: u16) -> Vec<u8> {
    ethernet(
        ETHERTYPE_IPV4,
        &ipv4(src, dst, IPPROTO_UDP, &udp(src_port, dst_port)),
    )
}

pub fn sctp4_frame(src: &str, dst: &str, src_port: u16, dst_port: u16) -> Vec<u8> {
    ethernet(
        ETHERTYPE_IPV4,
        &ipv4(src, dst, IPPROTO_SCTP, &sctp(src_port, dst_port)),
    )
}

pub fn icmp4_frame(src: &str, dst: &str) -> Vec<u8> {
    ethernet(ETHERTYPE_IPV4, &ipv4(src, dst, IPPROTO_ICMP, &icmpv4()))
}

pub fn tcp6_frame(src: &str, dst: &str, src_port: u16, dst_port: u16, flags: &[TcpFlag]) -> Vec<u8> {
    ethernet(
        ETHERTYPE_IPV6,
        &ipv6(src, dst, IPPROTO_TCP, &tcp(src_port, dst_port, flags)),
    )
}

pub fn udp6_frame(src: &str, dst: &str, src_port: u16, dst_port: u16) -> Vec<u8> {
    ethernet(
        ETHERTYPE_IPV6,
        &ipv6(src, dst, IPPROTO_UDP, &udp(src_port, dst_port)),
    )
}

pub fn icmp6_frame(src: &str, dst: &str) -> Vec<u8> {
    ethernet(ETHERTYPE_IPV6, &ipv6(src, dst, IPPROTO_ICMPV6, &icmpv6()))
}

/// ARP request for IPv4 over Ethernet
pub fn arp_frame() -> Vec<u8> {
    let mut body = vec![0x00, 0x01, 0x08, 0x00, 6, 4, 0x00, 0x01];
    body.extend_from_slice(&[0x02, 0, 0, 0, 0, 0x01, 192, 168, 1, 1]);
    body.extend_from_slice(&[0, 0, 0, 0, 0, 0, 192, 168, 1, 2]);
    ethernet(ETHERTYPE_ARP, &body)
}
