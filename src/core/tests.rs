#[cfg(test)]
mod tests_impl {
    use crate::config::parse_config;
    use crate::core::compiler::RuleCompiler;
    use crate::core::error::ConfigError;
    use crate::core::firewall::{Action, FilterSet, TcpFlag};
    use crate::core::matcher::Matcher;
    use crate::core::registry::SetRegistry;
    use crate::core::services::ServiceDirectory;
    use crate::core::test_helpers::*;

    fn compile(json: &str) -> Result<FilterSet, ConfigError> {
        RuleCompiler::new(SetRegistry::with_services(ServiceDirectory::builtin()))
            .compile(&parse_config(json).unwrap())
    }

    #[test]
    fn test_source_cidr_pass_or_no_match() {
        let filters = compile(
            r#"{ "filter": { "in": [ { "ip": { "from": "10.0.0.0/8" }, "action": "pass" } ] } }"#,
        )
        .unwrap();
        let rules = filters.group("in").unwrap();
        let mut matcher = Matcher::new();

        let frame = udp4_frame("10.1.2.3", "192.0.2.1", 1024, 53);
        assert_eq!(matcher.check(&frame, rules).unwrap(), Some(&Action::Pass));
        let frame = udp4_frame("11.1.2.3", "192.0.2.1", 1024, 53);
        assert_eq!(matcher.check(&frame, rules).unwrap(), None);
    }

    #[test]
    fn test_ipv6_documentation_prefix() {
        let filters = compile(
            r#"{
                "ipset": { "doc": ["2001:db8::/32"] },
                "filter": { "in": [ { "ip": { "to": "doc" }, "action": "block" } ] }
            }"#,
        )
        .unwrap();
        let rules = filters.group("in").unwrap();
        let mut matcher = Matcher::new();

        let hit = tcp6_frame("fe80::1", "2001:db8::1", 1, 2, &[]);
        assert_eq!(matcher.check(&hit, rules).unwrap(), Some(&Action::Block));
        let miss = tcp6_frame("fe80::1", "2001:db9::1", 1, 2, &[]);
        assert_eq!(matcher.check(&miss, rules).unwrap(), None);
    }

    #[test]
    fn test_order_decides_verdict() {
        let forward = compile(
            r#"{ "filter": { "in": [
                { "port": { "to": "22" }, "action": "block" },
                { "type": "tcp", "action": "pass" }
            ] } }"#,
        )
        .unwrap();
        let reversed = compile(
            r#"{ "filter": { "in": [
                { "type": "tcp", "action": "pass" },
                { "port": { "to": "22" }, "action": "block" }
            ] } }"#,
        )
        .unwrap();
        let frame = tcp4_frame("1.1.1.1", "2.2.2.2", 50000, 22, &[TcpFlag::Syn]);
        let mut matcher = Matcher::new();

        assert_eq!(
            matcher.check(&frame, forward.group("in").unwrap()).unwrap(),
            Some(&Action::Pass)
        );
        assert_eq!(
            matcher.check(&frame, reversed.group("in").unwrap()).unwrap(),
            Some(&Action::Block)
        );
    }

    #[test]
    fn test_wildcard_rule_matches_extremes() {
        let filters =
            compile(r#"{ "filter": { "in": [ { "action": "pass" } ] } }"#).unwrap();
        let rules = filters.group("in").unwrap();
        let mut matcher = Matcher::new();

        for frame in [
            tcp4_frame("0.0.0.0", "255.255.255.255", 0, 65535, &[]),
            udp4_frame("255.255.255.255", "0.0.0.0", 65535, 0),
            udp6_frame("::", "ffff:ffff:ffff:ffff:ffff:ffff:ffff:ffff", 0, 65535),
            arp_frame(),
            icmp6_frame("::1", "::2"),
        ] {
            assert_eq!(matcher.check(&frame, rules).unwrap(), Some(&Action::Pass));
        }
    }

    #[test]
    fn test_service_ports_end_to_end() {
        let filters = compile(
            r#"{
                "portset": { "web": ["http/tcp", "443"], "alt": ["8000-8080"] },
                "filter": { "in": [
                    { "action": "block" },
                    { "port": { "to": "web" }, "type": "tcp", "action": "pass" },
                    { "port": { "to": "alt" }, "type": "tcp", "action": "pass" }
                ] }
            }"#,
        )
        .unwrap();
        let rules = filters.group("in").unwrap();
        let mut matcher = Matcher::new();

        for (port, expected) in [
            (80, Action::Pass),
            (443, Action::Pass),
            (8000, Action::Pass),
            (8080, Action::Pass),
            (22, Action::Block),
            (7999, Action::Block),
            (8081, Action::Block),
        ] {
            let frame = tcp4_frame("1.1.1.1", "2.2.2.2", 40000, port, &[]);
            assert_eq!(
                matcher.check(&frame, rules).unwrap(),
                Some(&expected),
                "port {port}"
            );
        }

        // Same port over UDP falls through to the block rule
        let frame = udp4_frame("1.1.1.1", "2.2.2.2", 40000, 80);
        assert_eq!(matcher.check(&frame, rules).unwrap(), Some(&Action::Block));
    }

    #[test]
    fn test_syn_filter_flag_mapping() {
        // "0" requires the flag, "1" requires it clear
        let filters = compile(
            r#"{ "filter": { "in": [
                { "type": "tcp", "flags": { "syn": "0", "ack": "1" }, "action": "block" }
            ] } }"#,
        )
        .unwrap();
        let rules = filters.group("in").unwrap();
        let mut matcher = Matcher::new();

        let syn = tcp4_frame("1.1.1.1", "2.2.2.2", 1, 2, &[TcpFlag::Syn]);
        let syn_ack = tcp4_frame("1.1.1.1", "2.2.2.2", 1, 2, &[TcpFlag::Syn, TcpFlag::Ack]);
        assert_eq!(matcher.check(&syn, rules).unwrap(), Some(&Action::Block));
        assert_eq!(matcher.check(&syn_ack, rules).unwrap(), None);
    }

    #[test]
    fn test_mapped_ipv6_source_uses_ipv4_sets() {
        let filters = compile(
            r#"{ "filter": { "in": [ { "ip": { "from": "192.0.2.0/24" }, "action": "pass" } ] } }"#,
        )
        .unwrap();
        let rules = filters.group("in").unwrap();
        let mut matcher = Matcher::new();

        let frame = udp6_frame("::ffff:192.0.2.7", "2001:db8::1", 1, 2);
        assert_eq!(matcher.check(&frame, rules).unwrap(), Some(&Action::Pass));
    }

    #[test]
    fn test_unknown_action_never_defaults() {
        let err = compile(r#"{ "filter": { "in": [ { "action": "accept" } ] } }"#).unwrap_err();
        assert_eq!(err.root(), &ConfigError::UnknownAction("accept".to_string()));
    }
}

#[cfg(test)]
mod property_tests {
    use crate::core::firewall::{
        Action, CompiledRule, IpCriterion, LayerType, PortCriterion, PortSet, ProtocolType,
    };
    use crate::core::interval::{IntervalPair, IntervalSet};
    use crate::core::matcher::{evaluate, rule_matches};
    use crate::core::packet::{DecodedPacket, Layer};
    use crate::core::registry::SetRegistry;
    use crate::core::services::ServiceDirectory;
    use proptest::prelude::*;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    prop_compose! {
        /// Ranges clustered near both ends of the 32-bit domain.
        fn arb_u32_range()(
            high in any::<bool>(),
            start in 0u32..2000,
            len in 0u32..200,
        ) -> (u32, u32) {
            let (begin, end) = (start, start.saturating_add(len));
            if high {
                (u32::MAX - end, u32::MAX - begin)
            } else {
                (begin, end)
            }
        }
    }

    prop_compose! {
        fn arb_u128_range()(
            high in any::<bool>(),
            start in 0u128..2000,
            len in 0u128..200,
        ) -> (u128, u128) {
            let (begin, end) = (start, start + len);
            if high {
                (u128::MAX - end, u128::MAX - begin)
            } else {
                (begin, end)
            }
        }
    }

    fn build<T: crate::core::interval::Endpoint>(ranges: &[(T, T)]) -> IntervalSet<T> {
        ranges
            .iter()
            .map(|&(b, e)| IntervalPair::new(b, e).unwrap())
            .collect()
    }

    fn in_any<T: PartialOrd + Copy>(ranges: &[(T, T)], value: T) -> bool {
        ranges.iter().any(|&(b, e)| b <= value && value <= e)
    }

    fn probes_u32(ranges: &[(u32, u32)]) -> Vec<u32> {
        let mut values = vec![0, 1, u32::MAX - 1, u32::MAX];
        for &(b, e) in ranges {
            values.extend([b.wrapping_sub(1), b, e, e.wrapping_add(1)]);
        }
        values
    }

    fn arb_protocol() -> impl Strategy<Value = ProtocolType> {
        prop_oneof![
            Just(ProtocolType::Any),
            Just(ProtocolType::Tcp),
            Just(ProtocolType::Udp),
            Just(ProtocolType::Ip),
            Just(ProtocolType::Arp),
        ]
    }

    prop_compose! {
        fn arb_rule()(
            block in any::<bool>(),
            protocol in arb_protocol(),
            port in proptest::option::of((0u32..100, 0u32..20)),
        ) -> CompiledRule {
            let dst_port = match port {
                Some((start, len)) => {
                    let mut set = PortSet::default();
                    set.ranges.insert_range(start, start + len).unwrap();
                    set.ranges.clean();
                    PortCriterion::Set(Arc::new(set))
                }
                None => PortCriterion::Any,
            };
            CompiledRule {
                dst_port,
                protocols: protocol.layers(),
                ..CompiledRule::any(if block { Action::Block } else { Action::Pass })
            }
        }
    }

    prop_compose! {
        fn arb_packet()(tcp in any::<bool>(), dst_port in 0u16..130) -> DecodedPacket {
            let ip = Layer::Ipv4 { src: Ipv4Addr::new(10, 0, 0, 1), dst: Ipv4Addr::new(10, 0, 0, 2) };
            let transport = if tcp {
                Layer::Tcp { src_port: 9999, dst_port, flags: Default::default() }
            } else {
                Layer::Udp { src_port: 9999, dst_port }
            };
            DecodedPacket::from_layers([Layer::Ethernet, ip, transport])
        }
    }

    proptest! {
        #[test]
        fn test_clean_is_canonical_and_preserves_membership(
            ranges in proptest::collection::vec(arb_u32_range(), 0..40)
        ) {
            let set = build(&ranges);
            let pairs: Vec<_> = set.iter().copied().collect();
            for w in pairs.windows(2) {
                // Sorted, disjoint and not touching
                prop_assert!(w[0].end() < w[1].begin());
                prop_assert!(w[1].begin() - w[0].end() > 1);
            }
            for value in probes_u32(&ranges) {
                prop_assert_eq!(set.contains(value), in_any(&ranges, value), "value {}", value);
            }
        }

        #[test]
        fn test_clean_is_idempotent(ranges in proptest::collection::vec(arb_u32_range(), 0..40)) {
            let once = build(&ranges);
            let twice = once.merge(&IntervalSet::new());
            prop_assert_eq!(once.iter().collect::<Vec<_>>(), twice.iter().collect::<Vec<_>>());
        }

        #[test]
        fn test_merge_is_union(
            a in proptest::collection::vec(arb_u32_range(), 0..20),
            b in proptest::collection::vec(arb_u32_range(), 0..20),
        ) {
            let (sa, sb) = (build(&a), build(&b));
            let merged = sa.merge(&sb);
            let mut probes = probes_u32(&a);
            probes.extend(probes_u32(&b));
            for value in probes {
                prop_assert_eq!(merged.contains(value), sa.contains(value) || sb.contains(value));
            }
        }

        #[test]
        fn test_u128_membership(ranges in proptest::collection::vec(arb_u128_range(), 0..30)) {
            let set = build(&ranges);
            let mut probes = vec![0, u128::MAX, 1u128 << 64, (1u128 << 64) - 1];
            for &(b, e) in &ranges {
                probes.extend([b.wrapping_sub(1), b, e, e.wrapping_add(1)]);
            }
            for value in probes {
                prop_assert_eq!(set.contains(value), in_any(&ranges, value));
            }
        }

        #[test]
        fn test_named_set_is_union_of_parts(
            a in (any::<u8>(), 8u8..=32),
            b in (any::<u8>(), 8u8..=32),
            host in any::<u32>(),
        ) {
            let cidr = |(first, prefix): (u8, u8)| format!("{first}.0.0.0/{prefix}");
            let mut reg = SetRegistry::with_services(ServiceDirectory::empty());
            reg.define_ip("a", &[cidr(a)]).unwrap();
            reg.define_ip("all", &["a".to_string(), cidr(b)]).unwrap();

            let addr = IpAddr::V4(Ipv4Addr::from(host));
            let part_a = reg.resolve_ip(&cidr(a)).unwrap();
            let part_b = reg.resolve_ip(&cidr(b)).unwrap();
            let all = reg.resolve_ip("all").unwrap();
            prop_assert_eq!(all.matches(addr), part_a.matches(addr) || part_b.matches(addr));

            // Network addresses are always members of their own block
            let network = IpAddr::V4(Ipv4Addr::new(a.0, 0, 0, 0));
            prop_assert!(all.matches(network));
        }

        #[test]
        fn test_evaluate_is_last_match_fold(
            rules in proptest::collection::vec(arb_rule(), 0..12),
            packet in arb_packet(),
        ) {
            let mut expected = None;
            for rule in &rules {
                if rule_matches(rule, &packet) {
                    expected = Some(&rule.action);
                }
            }
            prop_assert_eq!(evaluate(&rules, &packet), expected);
        }

        #[test]
        fn test_reversing_two_matching_rules_flips_verdict(packet in arb_packet()) {
            let first = CompiledRule::any(Action::Block);
            let second = CompiledRule::any(Action::Pass);
            let forward = [first.clone(), second.clone()];
            let reversed = [second, first];
            prop_assert_eq!(evaluate(&forward, &packet), Some(&Action::Pass));
            prop_assert_eq!(evaluate(&reversed, &packet), Some(&Action::Block));
        }

        #[test]
        fn test_wildcards_match_any_addresses_and_ports(
            src in any::<u128>(),
            dst in any::<u32>(),
            sport in any::<u16>(),
            dport in any::<u16>(),
        ) {
            let rule = CompiledRule {
                src_ip: IpCriterion::Any,
                ..CompiledRule::any(Action::Pass)
            };
            let packet = DecodedPacket::from_layers([
                Layer::Ethernet,
                Layer::Ipv6 { src: src.into(), dst: Ipv4Addr::from(dst).to_ipv6_mapped() },
                Layer::Sctp { src_port: sport, dst_port: dport },
            ]);
            prop_assert!(packet.contains(LayerType::Sctp));
            prop_assert!(rule_matches(&rule, &packet));
        }
    }
}
