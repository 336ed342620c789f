// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Test packets, and a [`FlowFilterContext`] backed by [`PacketHeaders`].

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::missing_panics_doc
)]

use crate::action::{ActionStatus, FlowAction};
use crate::context::{ConditionVerdict, FlowFilterContext};
use crate::fields::{DecodedPacket, FlowMatch, MatchFields, PacketHeaders};
use crate::ident::ConditionName;
use etherparse::{Icmpv4Type, PacketBuilder, VlanId};
use std::collections::HashMap;

pub const SRC_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 1];
pub const DST_MAC: [u8; 6] = [0x02, 0, 0, 0, 0, 2];
pub const SRC_IP: [u8; 4] = [10, 0, 0, 1];
pub const DST_IP: [u8; 4] = [10, 0, 0, 2];

/// Builds an untagged IPv4/TCP packet with no payload.
#[must_use]
pub fn tcp_packet(sport: u16, dport: u16) -> DecodedPacket {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(SRC_IP, DST_IP, 64)
        .tcp(sport, dport, 1, 1024);
    let mut buf = Vec::with_capacity(builder.size(0));
    builder.write(&mut buf, &[]).unwrap();
    DecodedPacket::parse(&buf).unwrap()
}

/// Builds an IPv4/UDP packet tagged with VLAN 100. The UDP checksum is computed.
#[must_use]
pub fn udp_packet(sport: u16, dport: u16, payload: &[u8]) -> DecodedPacket {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .single_vlan(VlanId::try_new(100).unwrap())
        .ipv4(SRC_IP, DST_IP, 64)
        .udp(sport, dport);
    let mut buf = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut buf, payload).unwrap();
    DecodedPacket::parse(&buf).unwrap()
}

/// Builds an untagged IPv4/ICMP packet with the given type and code.
#[must_use]
pub fn icmp_packet(icmp_type: u8, icmp_code: u8) -> DecodedPacket {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(SRC_IP, DST_IP, 64)
        .icmpv4(Icmpv4Type::Unknown {
            type_u8: icmp_type,
            code_u8: icmp_code,
            bytes5to8: [0; 4],
        });
    let mut buf = Vec::with_capacity(builder.size(0));
    builder.write(&mut buf, &[]).unwrap();
    DecodedPacket::parse(&buf).unwrap()
}

/// A named flow condition, as the pipeline would compile it: the fields it reads, and a
/// predicate over them.
#[derive(Debug, Clone, Copy)]
pub struct TestCondition {
    pub fields: MatchFields,
    pub matches: fn(&FlowMatch) -> bool,
}

/// Matches every packet.
#[must_use]
pub fn always() -> TestCondition {
    TestCondition {
        fields: MatchFields::empty(),
        matches: |_| true,
    }
}

/// Matches no packet.
#[must_use]
pub fn never() -> TestCondition {
    TestCondition {
        fields: MatchFields::empty(),
        matches: |_| false,
    }
}

/// Matches packets on VLAN 100.
#[must_use]
pub fn is_vlan_100() -> TestCondition {
    TestCondition {
        fields: MatchFields::VLAN_ID,
        matches: |m| m.vlan_id.map(VlanId::value) == Some(100),
    }
}

/// Matches ICMP echo requests; does not apply to other transport protocols.
#[must_use]
pub fn is_echo_request() -> TestCondition {
    TestCondition {
        fields: MatchFields::ICMP_TYPE,
        matches: |m| m.icmp_type == Some(8),
    }
}

/// A [`FlowFilterContext`] for one packet, which records what filters asked of it.
#[derive(Debug)]
pub struct TestContext<'a> {
    headers: PacketHeaders<'a>,
    conditions: HashMap<String, TestCondition>,
    flooding: bool,
    vlan_override: Option<VlanId>,
    drops: usize,
    redirects: usize,
    resolved: Vec<String>,
}

impl<'a> TestContext<'a> {
    #[must_use]
    pub fn new(packet: &'a DecodedPacket) -> Self {
        Self {
            headers: packet.headers(),
            conditions: HashMap::new(),
            flooding: false,
            vlan_override: None,
            drops: 0,
            redirects: 0,
            resolved: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_condition(mut self, name: &str, condition: TestCondition) -> Self {
        self.conditions.insert(name.to_string(), condition);
        self
    }

    #[must_use]
    pub fn flooding(mut self) -> Self {
        self.flooding = true;
        self
    }

    pub fn headers(&mut self) -> &mut PacketHeaders<'a> {
        &mut self.headers
    }

    /// Number of drop directives requested.
    #[must_use]
    pub fn drops(&self) -> usize {
        self.drops
    }

    /// Number of redirects recorded in the chain.
    #[must_use]
    pub fn redirects(&self) -> usize {
        self.redirects
    }

    #[must_use]
    pub fn vlan_override(&self) -> Option<VlanId> {
        self.vlan_override
    }

    /// The names of the conditions resolved so far, in order.
    #[must_use]
    pub fn resolved(&self) -> &[String] {
        &self.resolved
    }
}

impl FlowFilterContext for TestContext<'_> {
    fn is_flooding(&self) -> bool {
        self.flooding
    }

    fn set_vlan_override(&mut self, vid: VlanId) {
        self.vlan_override = Some(vid);
    }

    fn install_drop(&mut self) {
        self.drops += 1;
    }

    fn apply_action(&mut self, action: &FlowAction) -> ActionStatus {
        self.headers.apply(action)
    }

    fn resolve_condition(&mut self, condition: &ConditionName) -> ConditionVerdict {
        self.resolved.push(condition.to_string());
        let Some(&TestCondition { fields, matches }) = self.conditions.get(condition.as_str())
        else {
            return ConditionVerdict::Inapplicable;
        };
        if !self.headers.supports(fields) {
            return ConditionVerdict::Inapplicable;
        }
        let mut m = FlowMatch::default();
        self.headers.set_match(&mut m, fields);
        if fields.contains(MatchFields::VLAN_ID) && self.vlan_override.is_some() {
            m.vlan_id = self.vlan_override;
        }
        if matches(&m) {
            ConditionVerdict::Match
        } else {
            ConditionVerdict::NoMatch
        }
    }

    fn is_first_redirect(&mut self) -> bool {
        self.redirects += 1;
        self.redirects == 1
    }
}
