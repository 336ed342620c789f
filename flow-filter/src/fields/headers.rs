// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The field caches of all the protocol layers of one packet.

use super::ether::EtherFields;
use super::icmp::IcmpFields;
use super::inet4::Inet4Fields;
use super::port::{PseudoHeader, TcpFields, UdpFields};
use super::source::{DecodedPacket, Transport};
use super::{FlowMatch, MatchFields, MutationSink};
use crate::action::{ActionStatus, FlowAction};
use crate::errors::CommitError;
use etherparse::{Icmpv4Header, TcpHeader, UdpHeader};
use tracing::warn;

/// Field cache of the transport layer of a packet.
#[derive(Debug)]
pub enum TransportFields<'a> {
    Tcp(TcpFields<'a, TcpHeader>),
    Udp(UdpFields<'a, UdpHeader>),
    Icmp(IcmpFields<'a, Icmpv4Header>),
}

/// Stage `value` unless the field already holds it.
fn stage<T: PartialEq>(current: T, value: T, set: impl FnOnce(T)) -> ActionStatus {
    if current == value {
        ActionStatus::Unchanged
    } else {
        set(value);
        ActionStatus::Applied
    }
}

/// One field cache per protocol layer present in a packet.
///
/// A [`PacketHeaders`] is created for a packet entering a virtual node and dropped once the packet
/// leaves it. It is the natural backing store of a [`FlowFilterContext`]: actions are routed to
/// it with [`PacketHeaders::apply`], conditions read it through [`PacketHeaders::set_match`], and
/// the forwarding path calls [`PacketHeaders::commit`] on packets which survived filtering.
///
/// [`FlowFilterContext`]: crate::FlowFilterContext
#[derive(Debug)]
pub struct PacketHeaders<'a> {
    ether: EtherFields<'a>,
    inet4: Option<Inet4Fields<'a>>,
    transport: Option<TransportFields<'a>>,
    payload: &'a [u8],
}

impl<'a> PacketHeaders<'a> {
    #[must_use]
    pub fn new(packet: &'a DecodedPacket) -> Self {
        let transport = packet.transport().map(|transport| match transport {
            Transport::Tcp(tcp) => TransportFields::Tcp(TcpFields::new(tcp)),
            Transport::Udp(udp) => TransportFields::Udp(UdpFields::new(udp)),
            Transport::Icmp4(icmp) => TransportFields::Icmp(IcmpFields::new(icmp)),
        });
        Self {
            ether: EtherFields::new(packet.frame()),
            inet4: packet.inet4().map(Inet4Fields::new),
            transport,
            payload: packet.payload(),
        }
    }

    pub fn ether(&mut self) -> &mut EtherFields<'a> {
        &mut self.ether
    }

    pub fn inet4(&mut self) -> Option<&mut Inet4Fields<'a>> {
        self.inet4.as_mut()
    }

    pub fn transport(&mut self) -> Option<&mut TransportFields<'a>> {
        self.transport.as_mut()
    }

    pub fn tcp(&mut self) -> Option<&mut TcpFields<'a, TcpHeader>> {
        match &mut self.transport {
            Some(TransportFields::Tcp(tcp)) => Some(tcp),
            _ => None,
        }
    }

    pub fn udp(&mut self) -> Option<&mut UdpFields<'a, UdpHeader>> {
        match &mut self.transport {
            Some(TransportFields::Udp(udp)) => Some(udp),
            _ => None,
        }
    }

    pub fn icmp(&mut self) -> Option<&mut IcmpFields<'a, Icmpv4Header>> {
        match &mut self.transport {
            Some(TransportFields::Icmp(icmp)) => Some(icmp),
            _ => None,
        }
    }

    /// Returns true if the packet carries every layer needed to populate `fields`.
    ///
    /// A condition over, say, ICMP fields cannot apply to a TCP packet.
    #[must_use]
    pub fn supports(&self, fields: MatchFields) -> bool {
        let needs_inet4 = fields.intersects(MatchFields::INET4);
        let needs_ports = fields.intersects(MatchFields::PORTS);
        let needs_icmp = fields.intersects(MatchFields::ICMP);
        (!needs_inet4 || self.inet4.is_some())
            && (!needs_ports
                || matches!(
                    self.transport,
                    Some(TransportFields::Tcp(_) | TransportFields::Udp(_))
                ))
            && (!needs_icmp || matches!(self.transport, Some(TransportFields::Icmp(_))))
    }

    /// Populate `m` with the requested fields, as the packet was received.
    pub fn set_match(&mut self, m: &mut FlowMatch, fields: MatchFields) {
        self.ether.set_match(m, fields);
        if let Some(inet4) = &mut self.inet4 {
            inet4.set_match(m, fields);
        }
        match &mut self.transport {
            Some(TransportFields::Tcp(tcp)) => tcp.set_match(m, fields),
            Some(TransportFields::Udp(udp)) => udp.set_match(m, fields),
            Some(TransportFields::Icmp(icmp)) => icmp.set_match(m, fields),
            None => {}
        }
    }

    /// Stage the edit of a flow action into the cache of the layer it applies to.
    pub fn apply(&mut self, action: &FlowAction) -> ActionStatus {
        match *action {
            FlowAction::SetDlSrc(mac) => {
                let ether = &mut self.ether;
                stage(ether.source(), mac, |v| {
                    ether.set_source(v);
                })
            }
            FlowAction::SetDlDst(mac) => {
                let ether = &mut self.ether;
                stage(ether.destination(), mac, |v| {
                    ether.set_destination(v);
                })
            }
            FlowAction::SetVlanPcp(pcp) => {
                let ether = &mut self.ether;
                stage(ether.vlan_pcp(), pcp, |v| {
                    ether.set_vlan_pcp(v);
                })
            }
            FlowAction::SetInet4Src(addr) => match &mut self.inet4 {
                Some(inet4) => stage(inet4.source(), addr, |v| {
                    inet4.set_source(v);
                }),
                None => ActionStatus::MissingLayer,
            },
            FlowAction::SetInet4Dst(addr) => match &mut self.inet4 {
                Some(inet4) => stage(inet4.destination(), addr, |v| {
                    inet4.set_destination(v);
                }),
                None => ActionStatus::MissingLayer,
            },
            FlowAction::SetDscp(dscp) => match &mut self.inet4 {
                Some(inet4) => stage(inet4.dscp(), dscp, |v| {
                    inet4.set_dscp(v);
                }),
                None => ActionStatus::MissingLayer,
            },
            FlowAction::SetTpSrc(port) => match &mut self.transport {
                Some(TransportFields::Tcp(tcp)) => {
                    let ports = tcp.ports();
                    stage(ports.source(), port, |v| {
                        ports.set_source(v);
                    })
                }
                Some(TransportFields::Udp(udp)) => {
                    let ports = udp.ports();
                    stage(ports.source(), port, |v| {
                        ports.set_source(v);
                    })
                }
                _ => ActionStatus::MissingLayer,
            },
            FlowAction::SetTpDst(port) => match &mut self.transport {
                Some(TransportFields::Tcp(tcp)) => {
                    let ports = tcp.ports();
                    stage(ports.destination(), port, |v| {
                        ports.set_destination(v);
                    })
                }
                Some(TransportFields::Udp(udp)) => {
                    let ports = udp.ports();
                    stage(ports.destination(), port, |v| {
                        ports.set_destination(v);
                    })
                }
                _ => ActionStatus::MissingLayer,
            },
            FlowAction::SetIcmpType(icmp_type) => match &mut self.transport {
                Some(TransportFields::Icmp(icmp)) => stage(icmp.icmp_type(), icmp_type, |v| {
                    icmp.set_icmp_type(v);
                }),
                _ => ActionStatus::MissingLayer,
            },
            FlowAction::SetIcmpCode(icmp_code) => match &mut self.transport {
                Some(TransportFields::Icmp(icmp)) => stage(icmp.icmp_code(), icmp_code, |v| {
                    icmp.set_icmp_code(v);
                }),
                _ => ActionStatus::MissingLayer,
            },
        }
    }

    /// Emit every staged edit which differs from the packet as received.
    ///
    /// Layers are committed from the outermost in, so that TCP and UDP checksums are computed over
    /// the IPv4 addresses the packet leaves with. Returns true if anything was emitted.
    ///
    /// # Errors
    ///
    /// Returns a [`CommitError`] if a checksum cannot be recomputed; the packet must then be
    /// discarded.
    pub fn commit(&mut self, sink: &mut dyn MutationSink) -> Result<bool, CommitError> {
        let mut emitted = self.ether.commit(sink);
        let pseudo = match &mut self.inet4 {
            Some(inet4) => {
                let changed = inet4.commit(sink);
                emitted |= changed;
                Some(PseudoHeader {
                    source: inet4.source(),
                    destination: inet4.destination(),
                    changed,
                })
            }
            None => None,
        };
        match (&mut self.transport, pseudo) {
            (Some(TransportFields::Tcp(tcp)), Some(pseudo)) => {
                emitted |= tcp.commit(sink, &pseudo, self.payload).inspect_err(|e| {
                    warn!("Failed to commit tcp header: {e}");
                })?;
            }
            (Some(TransportFields::Udp(udp)), Some(pseudo)) => {
                emitted |= udp.commit(sink, &pseudo, self.payload).inspect_err(|e| {
                    warn!("Failed to commit udp header: {e}");
                })?;
            }
            (Some(TransportFields::Tcp(tcp)), None) => emitted |= tcp.ports().commit(sink),
            (Some(TransportFields::Udp(udp)), None) => emitted |= udp.ports().commit(sink),
            (Some(TransportFields::Icmp(icmp)), _) => emitted |= icmp.commit(sink, self.payload),
            (None, _) => {}
        }
        Ok(emitted)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::fields::FieldMutation;
    use crate::mac::Mac;
    use crate::fields::EtherFrame;
    use crate::test_utils::{DST_IP, DST_MAC, SRC_IP, SRC_MAC, icmp_packet, tcp_packet, udp_packet};
    use etherparse::{EtherType, Ethernet2Header, IpDscp, IpNumber, Ipv4Header};
    use std::net::Ipv4Addr;
    use tracing_test::traced_test;

    #[test]
    fn actions_reach_their_layer() {
        let packet = tcp_packet(40000, 80);
        let mut headers = packet.headers();
        assert_eq!(headers.apply(&FlowAction::SetTpDst(8080)), ActionStatus::Applied);
        assert_eq!(headers.apply(&FlowAction::SetTpDst(8080)), ActionStatus::Unchanged);
        assert_eq!(
            headers.apply(&FlowAction::SetIcmpType(3)),
            ActionStatus::MissingLayer
        );
        let dscp = IpDscp::try_new(46).unwrap();
        assert_eq!(headers.apply(&FlowAction::SetDscp(dscp)), ActionStatus::Applied);
        assert_eq!(headers.tcp().unwrap().ports().destination(), 8080);
        assert_eq!(headers.inet4().unwrap().dscp(), dscp);
    }

    #[test]
    fn setting_the_current_value_is_ignored() {
        let packet = udp_packet(5000, 53, &[1, 2, 3, 4]);
        let mut headers = packet.headers();
        let current = headers.ether().source();
        assert_eq!(
            headers.apply(&FlowAction::SetDlSrc(current)),
            ActionStatus::Unchanged
        );
        assert!(!headers.ether().is_modified());
        let mut sink = Vec::new();
        assert!(!headers.commit(&mut sink).unwrap());
        assert!(sink.is_empty());
    }

    #[test]
    fn commit_all_layers() {
        let packet = udp_packet(5000, 53, &[1, 2, 3, 4]);
        let mut headers = packet.headers();
        let mac = Mac([0x02, 0xbb, 0, 0, 0, 9]);
        let addr = Ipv4Addr::new(192, 0, 2, 1);
        headers.apply(&FlowAction::SetDlDst(mac));
        headers.apply(&FlowAction::SetInet4Dst(addr));

        let mut sink = Vec::new();
        assert!(headers.commit(&mut sink).unwrap());
        // the udp checksum of the test packet is enabled, and covers the destination address
        assert!(matches!(
            sink.as_slice(),
            [
                FieldMutation::DlDst(m),
                FieldMutation::Inet4Dst(a),
                FieldMutation::UdpChecksum(_),
            ] if *m == mac && *a == addr
        ));
    }

    #[test]
    fn supported_fields() {
        let icmp = icmp_packet(8, 0);
        let headers = icmp.headers();
        assert!(headers.supports(MatchFields::ETHER | MatchFields::INET4 | MatchFields::ICMP));
        assert!(!headers.supports(MatchFields::TP_DST));

        let udp = udp_packet(5000, 53, &[]);
        let headers = udp.headers();
        assert!(headers.supports(MatchFields::PORTS));
        assert!(!headers.supports(MatchFields::ICMP_CODE));
    }

    #[test]
    fn match_reads_original_values() {
        let packet = tcp_packet(40000, 80);
        let mut headers = packet.headers();
        headers.apply(&FlowAction::SetTpDst(8080));
        let mut m = FlowMatch::default();
        headers.set_match(&mut m, MatchFields::TP_DST | MatchFields::INET_PROTO);
        assert_eq!(m.tp_dst, Some(80));
        assert_eq!(m.inet_proto, Some(etherparse::IpNumber::TCP));
        assert_eq!(m.dl_src, None);
    }

    #[test]
    fn tcp_checksum_follows_the_rewrite() {
        let packet = tcp_packet(40000, 80);
        let Some(Transport::Tcp(raw)) = packet.transport() else {
            unreachable!("expected a tcp header");
        };
        let mut rewritten = raw.clone();
        rewritten.destination_port = 8080;
        let expected = rewritten
            .calc_checksum_ipv4_raw(SRC_IP, DST_IP, packet.payload())
            .unwrap();

        let mut headers = packet.headers();
        headers.apply(&FlowAction::SetTpDst(8080));
        let mut sink = Vec::new();
        assert!(headers.commit(&mut sink).unwrap());
        assert_eq!(
            sink,
            vec![
                FieldMutation::TpDst(8080),
                FieldMutation::TcpChecksum(expected),
            ]
        );
    }

    #[test]
    fn icmp_checksum_follows_the_rewrite() {
        let packet = icmp_packet(8, 0);
        let mut headers = packet.headers();
        headers.apply(&FlowAction::SetIcmpType(0));
        let mut sink = Vec::new();
        assert!(headers.commit(&mut sink).unwrap());
        assert!(matches!(
            sink.as_slice(),
            [FieldMutation::IcmpType(0), FieldMutation::IcmpChecksum(_)]
        ));
    }

    #[test]
    #[traced_test]
    fn oversized_segment_fails_to_commit() {
        let frame = EtherFrame {
            eth: Ethernet2Header {
                source: SRC_MAC,
                destination: DST_MAC,
                ether_type: EtherType::IPV4,
            },
            vlan: None,
        };
        let inet4 = Ipv4Header::new(0, 64, IpNumber::TCP, SRC_IP, DST_IP).unwrap();
        let tcp = etherparse::TcpHeader::new(40000, 80, 1, 1024);
        let packet = DecodedPacket::new(
            frame,
            Some(inet4),
            Some(Transport::Tcp(tcp)),
            vec![0; 70_000],
        );

        let mut headers = packet.headers();
        headers.apply(&FlowAction::SetTpSrc(1234));
        let mut sink = Vec::new();
        assert!(matches!(
            headers.commit(&mut sink),
            Err(CommitError::TcpChecksum(_))
        ));
        assert!(logs_contain("WARN"));
        assert!(logs_contain("Failed to commit tcp header"));
    }
}
