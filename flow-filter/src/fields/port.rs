// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Field caches for the port based transport protocols (TCP and UDP).

use super::{Diff, FieldMutation, FlowMatch, MatchFields, MutationSink, lazy};
use crate::errors::CommitError;
use crate::fields::source::{PortSource, TcpSource, UdpSource};
use etherparse::{TcpHeader, UdpHeader};
use std::net::Ipv4Addr;
use tracing::trace;

/// A UDP checksum of zero means the sender did not compute a checksum.
pub const UDP_CHECKSUM_DISABLED: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortValues {
    pub source: u16,
    pub destination: u16,
}

#[derive(Debug, Default, Clone, Copy)]
struct LazyPorts {
    source: Option<u16>,
    destination: Option<u16>,
}

/// Field cache of the ports of a TCP or UDP header.
#[derive(Debug)]
pub struct PortFields<'a, S: PortSource + ?Sized = TcpHeader> {
    raw: &'a S,
    original: LazyPorts,
    modified: Option<PortValues>,
}

impl<'a, S: PortSource + ?Sized> PortFields<'a, S> {
    #[must_use]
    pub fn new(raw: &'a S) -> Self {
        Self {
            raw,
            original: LazyPorts::default(),
            modified: None,
        }
    }

    fn original_source(&mut self) -> u16 {
        let raw = self.raw;
        lazy(&mut self.original.source, || raw.source_port())
    }

    fn original_destination(&mut self) -> u16 {
        let raw = self.raw;
        lazy(&mut self.original.destination, || raw.destination_port())
    }

    pub fn original(&mut self) -> PortValues {
        PortValues {
            source: self.original_source(),
            destination: self.original_destination(),
        }
    }

    fn modified_values(&mut self) -> &mut PortValues {
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

    pub fn source(&mut self) -> u16 {
        match self.modified {
            Some(values) => values.source,
            None => self.original_source(),
        }
    }

    pub fn destination(&mut self) -> u16 {
        match self.modified {
            Some(values) => values.destination,
            None => self.original_destination(),
        }
    }

    pub fn set_source(&mut self, port: u16) -> &mut Self {
        self.modified_values().source = port;
        self
    }

    pub fn set_destination(&mut self, port: u16) -> &mut Self {
        self.modified_values().destination = port;
        self
    }

    pub fn set_match(&mut self, m: &mut FlowMatch, fields: MatchFields) {
        let original = self.original();
        if fields.contains(MatchFields::TP_SRC) {
            m.tp_src = Some(original.source);
        }
        if fields.contains(MatchFields::TP_DST) {
            m.tp_dst = Some(original.destination);
        }
    }

    pub fn commit(&mut self, sink: &mut dyn MutationSink) -> bool {
        let Some(modified) = self.modified else {
            return false;
        };
        let original = self.original();
        let mut diff = Diff::new(sink);
        diff.field(original.source, modified.source, FieldMutation::TpSrc)
            .field(
                original.destination,
                modified.destination,
                FieldMutation::TpDst,
            );
        diff.emitted()
    }
}

/// The IPv4 addresses a transport checksum covers, as they will be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PseudoHeader {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// Whether either address differs from the packet as received.
    pub changed: bool,
}

/// Field cache of a TCP header: its ports, plus checksum maintenance at commit time.
#[derive(Debug)]
pub struct TcpFields<'a, S: TcpSource + ?Sized = TcpHeader> {
    raw: &'a S,
    ports: PortFields<'a, S>,
    checksum: Option<u16>,
}

impl<'a, S: TcpSource + ?Sized> TcpFields<'a, S> {
    #[must_use]
    pub fn new(raw: &'a S) -> Self {
        Self {
            raw,
            ports: PortFields::new(raw),
            checksum: None,
        }
    }

    pub fn ports(&mut self) -> &mut PortFields<'a, S> {
        &mut self.ports
    }

    /// The checksum of the packet as received.
    pub fn original_checksum(&mut self) -> u16 {
        let raw = self.raw;
        lazy(&mut self.checksum, || raw.checksum())
    }

    pub fn set_match(&mut self, m: &mut FlowMatch, fields: MatchFields) {
        self.ports.set_match(m, fields);
    }

    /// Emit the changed ports, and a new checksum if a port or an address of the pseudo header
    /// changed.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::TcpChecksum`] if the segment is too large for a checksum to be
    /// computed.
    pub fn commit(
        &mut self,
        sink: &mut dyn MutationSink,
        pseudo: &PseudoHeader,
        payload: &[u8],
    ) -> Result<bool, CommitError> {
        let mut emitted = self.ports.commit(sink);
        if !emitted && !pseudo.changed {
            return Ok(emitted);
        }
        let ports = PortValues {
            source: self.ports.source(),
            destination: self.ports.destination(),
        };
        let checksum = self
            .raw
            .calc_checksum(ports, pseudo, payload)
            .map_err(CommitError::TcpChecksum)?;
        if checksum != self.original_checksum() {
            sink.push(FieldMutation::TcpChecksum(checksum));
            emitted = true;
        }
        Ok(emitted)
    }
}

/// Field cache of a UDP header: its ports, plus checksum maintenance at commit time.
#[derive(Debug)]
pub struct UdpFields<'a, S: UdpSource + ?Sized = UdpHeader> {
    raw: &'a S,
    ports: PortFields<'a, S>,
    checksum: Option<u16>,
}

impl<'a, S: UdpSource + ?Sized> UdpFields<'a, S> {
    #[must_use]
    pub fn new(raw: &'a S) -> Self {
        Self {
            raw,
            ports: PortFields::new(raw),
            checksum: None,
        }
    }

    pub fn ports(&mut self) -> &mut PortFields<'a, S> {
        &mut self.ports
    }

    /// The checksum of the packet as received.
    pub fn original_checksum(&mut self) -> u16 {
        let raw = self.raw;
        lazy(&mut self.checksum, || raw.checksum())
    }

    pub fn set_match(&mut self, m: &mut FlowMatch, fields: MatchFields) {
        self.ports.set_match(m, fields);
    }

    /// Emit the changed ports, and a new checksum if the checksum is enabled and covers a field
    /// that changed.
    ///
    /// `pseudo` holds the IPv4 addresses the packet leaves with, and `payload` the bytes following
    /// the UDP header. Bytes beyond the UDP length are not covered by the checksum.
    ///
    /// # Errors
    ///
    /// Returns [`CommitError::UdpChecksum`] if the payload is too large for a checksum to be
    /// computed.
    pub fn commit(
        &mut self,
        sink: &mut dyn MutationSink,
        pseudo: &PseudoHeader,
        payload: &[u8],
    ) -> Result<bool, CommitError> {
        let mut emitted = self.ports.commit(sink);
        let original = self.original_checksum();
        if original == UDP_CHECKSUM_DISABLED {
            trace!("udp checksum disabled, not recomputing it");
            return Ok(emitted);
        }
        if !emitted && !pseudo.changed {
            return Ok(emitted);
        }
        let length = self.raw.length();
        let covered = usize::from(length).saturating_sub(UdpHeader::LEN);
        let payload = payload.get(..covered).unwrap_or(payload);
        let header = UdpHeader {
            source_port: self.ports.source(),
            destination_port: self.ports.destination(),
            length,
            checksum: 0,
        };
        // etherparse already transmits a computed zero as 0xffff
        let checksum = header
            .calc_checksum_ipv4_raw(
                pseudo.source.octets(),
                pseudo.destination.octets(),
                payload,
            )
            .map_err(CommitError::UdpChecksum)?;
        if checksum != original {
            sink.push(FieldMutation::UdpChecksum(checksum));
            emitted = true;
        }
        Ok(emitted)
    }
}
