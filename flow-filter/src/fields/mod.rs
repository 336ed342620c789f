// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Packet field caches.
//!
//! Each protocol layer present in a packet gets its own cache, which gives typed access to the
//! header fields of that layer. A cache holds two snapshots:
//!
//! - the _original_ values, decoded lazily, field by field, from the decoded packet the cache was
//!   built from. They never change once decoded.
//! - the _modified_ values, created on the first write as a full copy of the original values,
//!   and the only target of writes afterwards.
//!
//! Getters return the modified value if there is one, the original value otherwise. Matching
//! (see [`FlowMatch`]) only ever looks at original values: filters match the packet as it entered
//! the virtual node, not the edits staged by other filters.
//!
//! Once the packet survived filtering, `commit` compares both snapshots and emits one
//! [`FieldMutation`] per differing field to a [`MutationSink`], followed by the new checksum of
//! the transport layer when it covers a changed field.
//!
//! Caches are strictly per packet: they are neither [`Sync`] nor meant to be reused.

mod ether;
mod headers;
mod icmp;
mod inet4;
mod port;
mod source;

pub use ether::{EtherFields, EtherValues};
pub use headers::{PacketHeaders, TransportFields};
pub use icmp::{IcmpFields, IcmpValues};
pub use inet4::{Inet4Fields, Inet4Values};
pub use port::{
    PortFields, PortValues, PseudoHeader, TcpFields, UDP_CHECKSUM_DISABLED, UdpFields,
};
pub use source::{
    DecodedPacket, EtherFrame, EtherSource, IcmpSource, Inet4Source, PortSource, TcpSource,
    Transport, UdpSource,
};

use crate::mac::Mac;
use bitflags::bitflags;
use etherparse::{EtherType, IpDscp, IpNumber, VlanId, VlanPcp};
use std::net::Ipv4Addr;

/// A single header field edit, emitted at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldMutation {
    DlSrc(Mac),
    DlDst(Mac),
    /// Set the VLAN ID; zero means the frame leaves untagged.
    VlanId(VlanId),
    VlanPcp(VlanPcp),
    Inet4Src(Ipv4Addr),
    Inet4Dst(Ipv4Addr),
    Dscp(IpDscp),
    TpSrc(u16),
    TpDst(u16),
    IcmpType(u8),
    IcmpCode(u8),
    IcmpChecksum(u16),
    TcpChecksum(u16),
    UdpChecksum(u16),
}

/// The receiver of the field edits produced by a commit.
pub trait MutationSink {
    fn push(&mut self, mutation: FieldMutation);
}

impl MutationSink for Vec<FieldMutation> {
    fn push(&mut self, mutation: FieldMutation) {
        Vec::push(self, mutation);
    }
}

bitflags! {
    /// The set of header fields a match predicate is interested in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MatchFields: u16 {
        const DL_SRC = 1 << 0;
        const DL_DST = 1 << 1;
        const ETHER_TYPE = 1 << 2;
        const VLAN_ID = 1 << 3;
        const VLAN_PCP = 1 << 4;
        const INET_SRC = 1 << 5;
        const INET_DST = 1 << 6;
        const INET_PROTO = 1 << 7;
        const INET_DSCP = 1 << 8;
        const TP_SRC = 1 << 9;
        const TP_DST = 1 << 10;
        const ICMP_TYPE = 1 << 11;
        const ICMP_CODE = 1 << 12;

        const ETHER = Self::DL_SRC.bits()
            | Self::DL_DST.bits()
            | Self::ETHER_TYPE.bits()
            | Self::VLAN_ID.bits()
            | Self::VLAN_PCP.bits();
        const INET4 = Self::INET_SRC.bits()
            | Self::INET_DST.bits()
            | Self::INET_PROTO.bits()
            | Self::INET_DSCP.bits();
        const PORTS = Self::TP_SRC.bits() | Self::TP_DST.bits();
        const ICMP = Self::ICMP_TYPE.bits() | Self::ICMP_CODE.bits();
    }
}

/// The header field values a flow condition matches against.
///
/// Only the fields requested through [`MatchFields`] are populated; everything else stays `None`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlowMatch {
    pub dl_src: Option<Mac>,
    pub dl_dst: Option<Mac>,
    pub ether_type: Option<EtherType>,
    pub vlan_id: Option<VlanId>,
    pub vlan_pcp: Option<VlanPcp>,
    pub inet_src: Option<Ipv4Addr>,
    pub inet_dst: Option<Ipv4Addr>,
    pub inet_proto: Option<IpNumber>,
    pub inet_dscp: Option<IpDscp>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
    pub icmp_type: Option<u8>,
    pub icmp_code: Option<u8>,
}

/// Decode a field on first access and keep it.
fn lazy<T: Copy>(slot: &mut Option<T>, decode: impl FnOnce() -> T) -> T {
    *slot.get_or_insert_with(decode)
}

/// Emits one mutation per field which differs between two snapshots.
struct Diff<'s> {
    sink: &'s mut dyn MutationSink,
    emitted: bool,
}

impl<'s> Diff<'s> {
    fn new(sink: &'s mut dyn MutationSink) -> Self {
        Self {
            sink,
            emitted: false,
        }
    }

    fn field<T: PartialEq>(
        &mut self,
        original: T,
        modified: T,
        mutation: impl FnOnce(T) -> FieldMutation,
    ) -> &mut Self {
        if original != modified {
            self.sink.push(mutation(modified));
            self.emitted = true;
        }
        self
    }

    fn emitted(&self) -> bool {
        self.emitted
    }
}
