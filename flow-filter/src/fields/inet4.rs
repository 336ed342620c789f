// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! IPv4 field cache.

use super::{Diff, FieldMutation, FlowMatch, MatchFields, MutationSink, lazy};
use crate::fields::source::Inet4Source;
use etherparse::{IpDscp, IpNumber, Ipv4Header};
use std::net::Ipv4Addr;

/// A complete set of IPv4 header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inet4Values {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: IpNumber,
    pub dscp: IpDscp,
}

#[derive(Debug, Default, Clone, Copy)]
struct LazyInet4 {
    source: Option<Ipv4Addr>,
    destination: Option<Ipv4Addr>,
    protocol: Option<IpNumber>,
    dscp: Option<IpDscp>,
}

/// Field cache of the IPv4 layer of a packet.
#[derive(Debug)]
pub struct Inet4Fields<'a, S: Inet4Source + ?Sized = Ipv4Header> {
    raw: &'a S,
    original: LazyInet4,
    modified: Option<Inet4Values>,
}

impl<'a, S: Inet4Source + ?Sized> Inet4Fields<'a, S> {
    #[must_use]
    pub fn new(raw: &'a S) -> Self {
        Self {
            raw,
            original: LazyInet4::default(),
            modified: None,
        }
    }

    fn original_source(&mut self) -> Ipv4Addr {
        let raw = self.raw;
        lazy(&mut self.original.source, || raw.source())
    }

    fn original_destination(&mut self) -> Ipv4Addr {
        let raw = self.raw;
        lazy(&mut self.original.destination, || raw.destination())
    }

    fn original_protocol(&mut self) -> IpNumber {
        let raw = self.raw;
        lazy(&mut self.original.protocol, || raw.protocol())
    }

    fn original_dscp(&mut self) -> IpDscp {
        let raw = self.raw;
        lazy(&mut self.original.dscp, || raw.dscp())
    }

    /// The original values, decoding whatever was not decoded yet.
    pub fn original(&mut self) -> Inet4Values {
        Inet4Values {
            source: self.original_source(),
            destination: self.original_destination(),
            protocol: self.original_protocol(),
            dscp: self.original_dscp(),
        }
    }

    fn modified_values(&mut self) -> &mut Inet4Values {
        let values = match self.modified {
            Some(values) => values,
            None => self.original(),
        };
        self.modified.get_or_insert(values)
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified.is_some()
    }

    pub fn source(&mut self) -> Ipv4Addr {
        match self.modified {
            Some(values) => values.source,
            None => self.original_source(),
        }
    }

    pub fn destination(&mut self) -> Ipv4Addr {
        match self.modified {
            Some(values) => values.destination,
            None => self.original_destination(),
        }
    }

    /// The protocol of the payload. It cannot be edited.
    pub fn protocol(&mut self) -> IpNumber {
        match self.modified {
            Some(values) => values.protocol,
            None => self.original_protocol(),
        }
    }

    pub fn dscp(&mut self) -> IpDscp {
        match self.modified {
            Some(values) => values.dscp,
            None => self.original_dscp(),
        }
    }

    pub fn set_source(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.modified_values().source = addr;
        self
    }

    pub fn set_destination(&mut self, addr: Ipv4Addr) -> &mut Self {
        self.modified_values().destination = addr;
        self
    }

    pub fn set_dscp(&mut self, dscp: IpDscp) -> &mut Self {
        self.modified_values().dscp = dscp;
        self
    }

    /// Populate the requested IPv4 fields of `m` from the original values.
    pub fn set_match(&mut self, m: &mut FlowMatch, fields: MatchFields) {
        let original = self.original();
        if fields.contains(MatchFields::INET_SRC) {
            m.inet_src = Some(original.source);
        }
        if fields.contains(MatchFields::INET_DST) {
            m.inet_dst = Some(original.destination);
        }
        if fields.contains(MatchFields::INET_PROTO) {
            m.inet_proto = Some(original.protocol);
        }
        if fields.contains(MatchFields::INET_DSCP) {
            m.inet_dscp = Some(original.dscp);
        }
    }

    /// Emit the IPv4 fields which were changed. Returns true if anything was emitted.
    pub fn commit(&mut self, sink: &mut dyn MutationSink) -> bool {
        let Some(modified) = self.modified else {
            return false;
        };
        let original = self.original();
        let mut diff = Diff::new(sink);
        diff.field(original.source, modified.source, FieldMutation::Inet4Src)
            .field(
                original.destination,
                modified.destination,
                FieldMutation::Inet4Dst,
            )
            .field(original.dscp, modified.dscp, FieldMutation::Dscp);
        diff.emitted()
    }
}
