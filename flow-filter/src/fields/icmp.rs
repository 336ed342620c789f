// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! ICMPv4 field cache.

use super::{Diff, FieldMutation, FlowMatch, MatchFields, MutationSink, lazy};
use crate::fields::source::IcmpSource;
use etherparse::Icmpv4Header;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpValues {
    pub icmp_type: u8,
    pub icmp_code: u8,
}

#[derive(Debug, Default, Clone, Copy)]
struct LazyIcmp {
    icmp_type: Option<u8>,
    icmp_code: Option<u8>,
    checksum: Option<u16>,
}

/// Field cache of the ICMPv4 layer of a packet.
#[derive(Debug)]
pub struct IcmpFields<'a, S: IcmpSource + ?Sized = Icmpv4Header> {
    raw: &'a S,
    original: LazyIcmp,
    modified: Option<IcmpValues>,
}

impl<'a, S: IcmpSource + ?Sized> IcmpFields<'a, S> {
    #[must_use]
    pub fn new(raw: &'a S) -> Self {
        Self {
            raw,
            original: LazyIcmp::default(),
            modified: None,
        }
    }

    fn original_type(&mut self) -> u8 {
        let raw = self.raw;
        lazy(&mut self.original.icmp_type, || raw.icmp_type())
    }

    fn original_code(&mut self) -> u8 {
        let raw = self.raw;
        lazy(&mut self.original.icmp_code, || raw.icmp_code())
    }

    /// The checksum of the packet as received.
    pub fn original_checksum(&mut self) -> u16 {
        let raw = self.raw;
        lazy(&mut self.original.checksum, || raw.checksum())
    }

    pub fn original(&mut self) -> IcmpValues {
        IcmpValues {
            icmp_type: self.original_type(),
            icmp_code: self.original_code(),
        }
    }

    fn modified_values(&mut self) -> &mut IcmpValues {
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

    pub fn icmp_type(&mut self) -> u8 {
        match self.modified {
            Some(values) => values.icmp_type,
            None => self.original_type(),
        }
    }

    pub fn icmp_code(&mut self) -> u8 {
        match self.modified {
            Some(values) => values.icmp_code,
            None => self.original_code(),
        }
    }

    pub fn set_icmp_type(&mut self, icmp_type: u8) -> &mut Self {
        self.modified_values().icmp_type = icmp_type;
        self
    }

    pub fn set_icmp_code(&mut self, icmp_code: u8) -> &mut Self {
        self.modified_values().icmp_code = icmp_code;
        self
    }

    pub fn set_match(&mut self, m: &mut FlowMatch, fields: MatchFields) {
        let original = self.original();
        if fields.contains(MatchFields::ICMP_TYPE) {
            m.icmp_type = Some(original.icmp_type);
        }
        if fields.contains(MatchFields::ICMP_CODE) {
            m.icmp_code = Some(original.icmp_code);
        }
    }

    /// Emit the changed type and code, followed by the checksum of the rewritten message.
    ///
    /// `payload` holds the bytes following the ICMP header.
    pub fn commit(&mut self, sink: &mut dyn MutationSink, payload: &[u8]) -> bool {
        let Some(modified) = self.modified else {
            return false;
        };
        let original = self.original();
        let mut diff = Diff::new(sink);
        diff.field(
            original.icmp_type,
            modified.icmp_type,
            FieldMutation::IcmpType,
        )
        .field(
            original.icmp_code,
            modified.icmp_code,
            FieldMutation::IcmpCode,
        );
        if !diff.emitted() {
            return false;
        }
        let checksum = self
            .raw
            .calc_checksum(modified.icmp_type, modified.icmp_code, payload);
        diff.field(
            self.original_checksum(),
            checksum,
            FieldMutation::IcmpChecksum,
        );
        true
    }
}
