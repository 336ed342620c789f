// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow actions: header field edits applied by a flow filter to the packets it matches.

use crate::errors::{ConfigError, ConfigResult};
use crate::mac::Mac;
use etherparse::{IpDscp, VlanPcp};
use std::fmt::Display;
use std::net::Ipv4Addr;

/// A header field edit.
///
/// Actions are not applied to the packet directly: the [`FlowFilterContext`] routes them to the
/// field cache of the relevant protocol layer, where they are staged until commit.
///
/// [`FlowFilterContext`]: crate::FlowFilterContext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowAction {
    /// Set the source mac address.
    SetDlSrc(Mac),
    /// Set the destination mac address.
    SetDlDst(Mac),
    /// Set the 802.1Q priority code point.
    SetVlanPcp(VlanPcp),
    /// Set the IPv4 source address.
    SetInet4Src(Ipv4Addr),
    /// Set the IPv4 destination address.
    SetInet4Dst(Ipv4Addr),
    /// Set the DSCP field of the IPv4 header.
    SetDscp(IpDscp),
    /// Set the TCP or UDP source port.
    SetTpSrc(u16),
    /// Set the TCP or UDP destination port.
    SetTpDst(u16),
    /// Set the ICMPv4 type.
    SetIcmpType(u8),
    /// Set the ICMPv4 code.
    SetIcmpCode(u8),
}

impl FlowAction {
    /// Check that the action carries a value which may legally be written to a packet.
    pub fn validate(&self) -> ConfigResult {
        match *self {
            FlowAction::SetDlSrc(mac) if !mac.is_valid_src() => Err(ConfigError::BadSourceMac(mac)),
            FlowAction::SetDlDst(mac) if !mac.is_valid_dst() => {
                Err(ConfigError::BadDestinationMac(mac))
            }
            FlowAction::SetTpSrc(0) | FlowAction::SetTpDst(0) => Err(ConfigError::ZeroPort),
            _ => Ok(()),
        }
    }
}

impl Display for FlowAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowAction::SetDlSrc(mac) => write!(f, "set-dl-src({mac})"),
            FlowAction::SetDlDst(mac) => write!(f, "set-dl-dst({mac})"),
            FlowAction::SetVlanPcp(pcp) => write!(f, "set-vlan-pcp({})", pcp.value()),
            FlowAction::SetInet4Src(addr) => write!(f, "set-inet-src({addr})"),
            FlowAction::SetInet4Dst(addr) => write!(f, "set-inet-dst({addr})"),
            FlowAction::SetDscp(dscp) => write!(f, "set-inet-dscp({})", dscp.value()),
            FlowAction::SetTpSrc(port) => write!(f, "set-port-src({port})"),
            FlowAction::SetTpDst(port) => write!(f, "set-port-dst({port})"),
            FlowAction::SetIcmpType(t) => write!(f, "set-icmp-type({t})"),
            FlowAction::SetIcmpCode(c) => write!(f, "set-icmp-code({c})"),
        }
    }
}

/// A flow action with its position in the owning filter's action list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterAction {
    pub order: u32,
    pub action: FlowAction,
}

/// The result of applying a [`FlowAction`] to a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// The edit was staged.
    Applied,
    /// The field already holds the requested value.
    Unchanged,
    /// The packet does not carry the protocol layer the action edits.
    MissingLayer,
}

impl ActionStatus {
    #[must_use]
    pub fn is_applied(self) -> bool {
        self == ActionStatus::Applied
    }
}
