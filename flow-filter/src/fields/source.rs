// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The decoded packet the field caches read from.

use crate::errors::DecodeError;
use crate::fields::headers::PacketHeaders;
use crate::fields::port::{PortValues, PseudoHeader};
use crate::mac::Mac;
use etherparse::err::ValueTooBigError;
use etherparse::{
    EtherType, Ethernet2Header, Icmpv4Header, Icmpv4Type, IpDscp, IpNumber, Ipv4Header,
    SingleVlanHeader, TcpHeader, UdpHeader, VlanId, VlanPcp,
};
use std::net::Ipv4Addr;
use tracing::trace;

/// Read access to the ethernet fields of a decoded packet.
pub trait EtherSource {
    fn source(&self) -> Mac;
    fn destination(&self) -> Mac;
    /// The ether type of the payload, after any VLAN tag.
    fn ether_type(&self) -> EtherType;
    /// The VLAN ID, zero for an untagged frame.
    fn vlan_id(&self) -> VlanId;
    fn vlan_pcp(&self) -> VlanPcp;
}

/// Read access to the IPv4 fields of a decoded packet.
pub trait Inet4Source {
    fn source(&self) -> Ipv4Addr;
    fn destination(&self) -> Ipv4Addr;
    fn protocol(&self) -> IpNumber;
    fn dscp(&self) -> IpDscp;
}

/// Read access to the ICMPv4 fields of a decoded packet.
pub trait IcmpSource {
    fn icmp_type(&self) -> u8;
    fn icmp_code(&self) -> u8;
    fn checksum(&self) -> u16;
    /// The checksum of the message with its type and code replaced.
    fn calc_checksum(&self, icmp_type: u8, icmp_code: u8, payload: &[u8]) -> u16;
}

/// Read access to the ports of a TCP or UDP header.
pub trait PortSource {
    fn source_port(&self) -> u16;
    fn destination_port(&self) -> u16;
}

/// Read access to the TCP specific fields.
pub trait TcpSource: PortSource {
    fn checksum(&self) -> u16;
    /// The checksum of the segment with its ports replaced, over the given IPv4 addresses.
    ///
    /// # Errors
    ///
    /// Fails if the segment is too large for its length to fit the pseudo header.
    fn calc_checksum(
        &self,
        ports: PortValues,
        pseudo: &PseudoHeader,
        payload: &[u8],
    ) -> Result<u16, ValueTooBigError<usize>>;
}

/// Read access to the UDP specific fields.
pub trait UdpSource: PortSource {
    /// Length of the UDP header and payload.
    fn length(&self) -> u16;
    fn checksum(&self) -> u16;
}

/// An ethernet header and its optional 802.1Q tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EtherFrame {
    pub eth: Ethernet2Header,
    pub vlan: Option<SingleVlanHeader>,
}

impl EtherSource for EtherFrame {
    fn source(&self) -> Mac {
        Mac(self.eth.source)
    }

    fn destination(&self) -> Mac {
        Mac(self.eth.destination)
    }

    fn ether_type(&self) -> EtherType {
        self.vlan
            .as_ref()
            .map_or(self.eth.ether_type, |vlan| vlan.ether_type)
    }

    fn vlan_id(&self) -> VlanId {
        self.vlan.as_ref().map_or(VlanId::ZERO, |vlan| vlan.vlan_id)
    }

    fn vlan_pcp(&self) -> VlanPcp {
        self.vlan.as_ref().map_or(VlanPcp::ZERO, |vlan| vlan.pcp)
    }
}

impl Inet4Source for Ipv4Header {
    fn source(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.source)
    }

    fn destination(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.destination)
    }

    fn protocol(&self) -> IpNumber {
        self.protocol
    }

    fn dscp(&self) -> IpDscp {
        self.dscp
    }
}

impl IcmpSource for Icmpv4Header {
    fn icmp_type(&self) -> u8 {
        self.to_bytes()[0]
    }

    fn icmp_code(&self) -> u8 {
        self.to_bytes()[1]
    }

    fn checksum(&self) -> u16 {
        self.checksum
    }

    fn calc_checksum(&self, icmp_type: u8, icmp_code: u8, payload: &[u8]) -> u16 {
        let bytes = self.to_bytes();
        let Some((head, tail)) = bytes.split_first_chunk::<8>() else {
            return self.checksum;
        };
        let rewritten = Icmpv4Type::Unknown {
            type_u8: icmp_type,
            code_u8: icmp_code,
            bytes5to8: [head[4], head[5], head[6], head[7]],
        };
        // timestamp messages carry header bytes beyond the first eight
        if tail.is_empty() {
            rewritten.calc_checksum(payload)
        } else {
            rewritten.calc_checksum(&[tail, payload].concat())
        }
    }
}

impl PortSource for TcpHeader {
    fn source_port(&self) -> u16 {
        self.source_port
    }

    fn destination_port(&self) -> u16 {
        self.destination_port
    }
}

impl TcpSource for TcpHeader {
    fn checksum(&self) -> u16 {
        self.checksum
    }

    fn calc_checksum(
        &self,
        ports: PortValues,
        pseudo: &PseudoHeader,
        payload: &[u8],
    ) -> Result<u16, ValueTooBigError<usize>> {
        let mut header = self.clone();
        header.source_port = ports.source;
        header.destination_port = ports.destination;
        header.calc_checksum_ipv4_raw(pseudo.source.octets(), pseudo.destination.octets(), payload)
    }
}

impl PortSource for UdpHeader {
    fn source_port(&self) -> u16 {
        self.source_port
    }

    fn destination_port(&self) -> u16 {
        self.destination_port
    }
}

impl UdpSource for UdpHeader {
    fn length(&self) -> u16 {
        self.length
    }

    fn checksum(&self) -> u16 {
        self.checksum
    }
}

/// The transport layer of a decoded packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Tcp(TcpHeader),
    Udp(UdpHeader),
    Icmp4(Icmpv4Header),
}

/// A packet decoded into its protocol layers.
///
/// This is the immutable source the field caches of a [`PacketHeaders`] decode their original
/// values from. Only IPv4 is decoded above the link layer; for other network protocols the
/// network and transport layers are absent and the rest of the frame is kept as payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    frame: EtherFrame,
    inet4: Option<Ipv4Header>,
    transport: Option<Transport>,
    payload: Vec<u8>,
}

impl DecodedPacket {
    /// Assemble a decoded packet from already decoded layers.
    #[must_use]
    pub fn new(
        frame: EtherFrame,
        inet4: Option<Ipv4Header>,
        transport: Option<Transport>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            frame,
            inet4,
            transport,
            payload,
        }
    }

    /// Decode an ethernet frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] if one of the headers is truncated or invalid.
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        let (eth, rest) = Ethernet2Header::from_slice(buf)?;
        let (vlan, ether_type, rest) = if eth.ether_type == EtherType::VLAN_TAGGED_FRAME {
            let (vlan, rest) = SingleVlanHeader::from_slice(rest)?;
            let ether_type = vlan.ether_type;
            (Some(vlan), ether_type, rest)
        } else {
            (None, eth.ether_type, rest)
        };
        let frame = EtherFrame { eth, vlan };
        if ether_type != EtherType::IPV4 {
            trace!("Not decoding past ethernet for ether type {:#06x}", ether_type.0);
            return Ok(Self::new(frame, None, None, rest.to_vec()));
        }

        let (ipv4, rest) = Ipv4Header::from_slice(rest)?;
        // ignore ethernet padding
        let ip_payload_len = usize::from(ipv4.total_len).saturating_sub(ipv4.header_len());
        let rest = rest.get(..ip_payload_len).unwrap_or(rest);
        if ipv4.fragment_offset.value() != 0 {
            trace!("Not decoding transport header of a non-first fragment");
            return Ok(Self::new(frame, Some(ipv4), None, rest.to_vec()));
        }

        let (transport, rest) = match ipv4.protocol {
            IpNumber::TCP => {
                let (tcp, rest) = TcpHeader::from_slice(rest)?;
                (Some(Transport::Tcp(tcp)), rest)
            }
            IpNumber::UDP => {
                let (udp, rest) = UdpHeader::from_slice(rest)?;
                (Some(Transport::Udp(udp)), rest)
            }
            IpNumber::ICMP => {
                let (icmp, rest) = Icmpv4Header::from_slice(rest)?;
                (Some(Transport::Icmp4(icmp)), rest)
            }
            _ => (None, rest),
        };
        Ok(Self::new(frame, Some(ipv4), transport, rest.to_vec()))
    }

    #[must_use]
    pub fn frame(&self) -> &EtherFrame {
        &self.frame
    }

    #[must_use]
    pub fn inet4(&self) -> Option<&Ipv4Header> {
        self.inet4.as_ref()
    }

    #[must_use]
    pub fn transport(&self) -> Option<&Transport> {
        self.transport.as_ref()
    }

    /// The bytes following the last decoded header.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Build a fresh set of field caches over this packet.
    #[must_use]
    pub fn headers(&self) -> PacketHeaders<'_> {
        PacketHeaders::new(self)
    }
}
