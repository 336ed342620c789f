// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Ethernet and 802.1Q field cache.

use super::{Diff, FlowMatch, MatchFields, MutationSink, lazy};
use crate::fields::FieldMutation;
use crate::fields::source::{EtherFrame, EtherSource};
use crate::mac::Mac;
use etherparse::{EtherType, VlanId, VlanPcp};

/// A complete set of ethernet header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EtherValues {
    pub source: Mac,
    pub destination: Mac,
    pub ether_type: EtherType,
    pub vlan_id: VlanId,
    pub vlan_pcp: VlanPcp,
}

#[derive(Debug, Default, Clone, Copy)]
struct LazyEther {
    source: Option<Mac>,
    destination: Option<Mac>,
    ether_type: Option<EtherType>,
    vlan_id: Option<VlanId>,
    vlan_pcp: Option<VlanPcp>,
}

/// Field cache of the ethernet layer of a packet.
#[derive(Debug)]
pub struct EtherFields<'a, S: EtherSource + ?Sized = EtherFrame> {
    raw: &'a S,
    original: LazyEther,
    modified: Option<EtherValues>,
}

impl<'a, S: EtherSource + ?Sized> EtherFields<'a, S> {
    #[must_use]
    pub fn new(raw: &'a S) -> Self {
        Self {
            raw,
            original: LazyEther::default(),
            modified: None,
        }
    }

    fn original_source(&mut self) -> Mac {
        let raw = self.raw;
        lazy(&mut self.original.source, || raw.source())
    }

    fn original_destination(&mut self) -> Mac {
        let raw = self.raw;
        lazy(&mut self.original.destination, || raw.destination())
    }

    fn original_ether_type(&mut self) -> EtherType {
        let raw = self.raw;
        lazy(&mut self.original.ether_type, || raw.ether_type())
    }

    fn original_vlan_id(&mut self) -> VlanId {
        let raw = self.raw;
        lazy(&mut self.original.vlan_id, || raw.vlan_id())
    }

    fn original_vlan_pcp(&mut self) -> VlanPcp {
        let raw = self.raw;
        lazy(&mut self.original.vlan_pcp, || raw.vlan_pcp())
    }

    /// The original values, decoding whatever was not decoded yet.
    pub fn original(&mut self) -> EtherValues {
        EtherValues {
            source: self.original_source(),
            destination: self.original_destination(),
            ether_type: self.original_ether_type(),
            vlan_id: self.original_vlan_id(),
            vlan_pcp: self.original_vlan_pcp(),
        }
    }

    fn modified_values(&mut self) -> &mut EtherValues {
        let values = match self.modified {
            Some(values) => values,
            None => self.original(),
        };
        self.modified.get_or_insert(values)
    }

    /// Returns true if a field was written since the cache was created.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified.is_some()
    }

    pub fn source(&mut self) -> Mac {
        match self.modified {
            Some(values) => values.source,
            None => self.original_source(),
        }
    }

    pub fn destination(&mut self) -> Mac {
        match self.modified {
            Some(values) => values.destination,
            None => self.original_destination(),
        }
    }

    /// The ether type of the payload. It cannot be edited.
    pub fn ether_type(&mut self) -> EtherType {
        match self.modified {
            Some(values) => values.ether_type,
            None => self.original_ether_type(),
        }
    }

    /// The VLAN ID, zero if the frame is untagged.
    pub fn vlan_id(&mut self) -> VlanId {
        match self.modified {
            Some(values) => values.vlan_id,
            None => self.original_vlan_id(),
        }
    }

    pub fn vlan_pcp(&mut self) -> VlanPcp {
        match self.modified {
            Some(values) => values.vlan_pcp,
            None => self.original_vlan_pcp(),
        }
    }

    pub fn set_source(&mut self, mac: Mac) -> &mut Self {
        self.modified_values().source = mac;
        self
    }

    pub fn set_destination(&mut self, mac: Mac) -> &mut Self {
        self.modified_values().destination = mac;
        self
    }

    /// Set the VLAN ID the frame leaves with. Zero removes the tag.
    pub fn set_vlan_id(&mut self, vid: VlanId) -> &mut Self {
        self.modified_values().vlan_id = vid;
        self
    }

    pub fn set_vlan_pcp(&mut self, pcp: VlanPcp) -> &mut Self {
        self.modified_values().vlan_pcp = pcp;
        self
    }

    /// Populate the requested ethernet fields of `m` from the original values.
    pub fn set_match(&mut self, m: &mut FlowMatch, fields: MatchFields) {
        let original = self.original();
        if fields.contains(MatchFields::DL_SRC) {
            m.dl_src = Some(original.source);
        }
        if fields.contains(MatchFields::DL_DST) {
            m.dl_dst = Some(original.destination);
        }
        if fields.contains(MatchFields::ETHER_TYPE) {
            m.ether_type = Some(original.ether_type);
        }
        if fields.contains(MatchFields::VLAN_ID) {
            m.vlan_id = Some(original.vlan_id);
        }
        if fields.contains(MatchFields::VLAN_PCP) {
            m.vlan_pcp = Some(original.vlan_pcp);
        }
    }

    /// Emit the ethernet fields which were changed. Returns true if anything was emitted.
    pub fn commit(&mut self, sink: &mut dyn MutationSink) -> bool {
        let Some(modified) = self.modified else {
            return false;
        };
        let original = self.original();
        let mut diff = Diff::new(sink);
        diff.field(original.source, modified.source, FieldMutation::DlSrc)
            .field(
                original.destination,
                modified.destination,
                FieldMutation::DlDst,
            )
            .field(original.vlan_id, modified.vlan_id, FieldMutation::VlanId)
            .field(original.vlan_pcp, modified.vlan_pcp, FieldMutation::VlanPcp);
        diff.emitted()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use std::cell::Cell;

    /// Counts how many times each field is decoded.
    struct CountingEther {
        values: EtherValues,
        decodes: Cell<usize>,
    }

    impl CountingEther {
        fn new() -> Self {
            Self {
                values: EtherValues {
                    source: Mac([0x02, 0, 0, 0, 0, 1]),
                    destination: Mac([0x02, 0, 0, 0, 0, 2]),
                    ether_type: EtherType::IPV4,
                    vlan_id: VlanId::try_new(10).unwrap(),
                    vlan_pcp: VlanPcp::try_new(3).unwrap(),
                },
                decodes: Cell::new(0),
            }
        }

        fn count(&self) {
            self.decodes.set(self.decodes.get() + 1);
        }
    }

    impl EtherSource for CountingEther {
        fn source(&self) -> Mac {
            self.count();
            self.values.source
        }
        fn destination(&self) -> Mac {
            self.count();
            self.values.destination
        }
        fn ether_type(&self) -> EtherType {
            self.count();
            self.values.ether_type
        }
        fn vlan_id(&self) -> VlanId {
            self.count();
            self.values.vlan_id
        }
        fn vlan_pcp(&self) -> VlanPcp {
            self.count();
            self.values.vlan_pcp
        }
    }

    #[test]
    fn fields_are_decoded_once() {
        let raw = CountingEther::new();
        let mut fields = EtherFields::new(&raw);
        assert_eq!(raw.decodes.get(), 0);
        assert_eq!(fields.source(), raw.values.source);
        assert_eq!(fields.source(), raw.values.source);
        assert_eq!(raw.decodes.get(), 1);
        assert_eq!(fields.vlan_id(), raw.values.vlan_id);
        assert_eq!(raw.decodes.get(), 2);

        // the first write decodes whatever remains, and nothing is decoded afterwards
        fields.set_vlan_pcp(VlanPcp::try_new(5).unwrap());
        assert_eq!(raw.decodes.get(), 5);
        fields.original();
        fields.vlan_pcp();
        assert_eq!(raw.decodes.get(), 5);
    }

    #[test]
    fn writes_leave_original_alone() {
        let raw = CountingEther::new();
        let mut fields = EtherFields::new(&raw);
        let mut sibling = EtherFields::new(&raw);
        let mac = Mac([0x02, 0xaa, 0, 0, 0, 1]);

        fields.set_source(mac);
        assert_eq!(fields.source(), mac);
        assert_eq!(fields.original().source, raw.values.source);
        assert_eq!(sibling.source(), raw.values.source);
        assert!(!sibling.is_modified());
    }

    #[test]
    fn match_ignores_staged_edits() {
        let raw = CountingEther::new();
        let mut fields = EtherFields::new(&raw);
        fields.set_destination(Mac::BROADCAST);

        let mut m = FlowMatch::default();
        fields.set_match(&mut m, MatchFields::DL_DST | MatchFields::VLAN_ID);
        assert_eq!(m.dl_dst, Some(raw.values.destination));
        assert_eq!(m.vlan_id, Some(raw.values.vlan_id));
        assert_eq!(m.dl_src, None);
        assert_eq!(m.vlan_pcp, None);
    }

    #[test]
    fn commit_emits_changed_fields_only() {
        let raw = CountingEther::new();
        let mut fields = EtherFields::new(&raw);
        let mut sink = Vec::new();
        assert!(!fields.commit(&mut sink));
        assert!(sink.is_empty());

        // writing back the current value stages nothing worth committing
        fields.set_source(raw.values.source);
        assert!(!fields.commit(&mut sink));
        assert!(sink.is_empty());

        let vid = VlanId::try_new(20).unwrap();
        fields.set_vlan_id(vid).set_destination(Mac::BROADCAST);
        assert!(fields.commit(&mut sink));
        assert_eq!(
            sink,
            vec![
                FieldMutation::DlDst(Mac::BROADCAST),
                FieldMutation::VlanId(vid)
            ]
        );
    }

    #[test]
    fn commit_iff_values_differ() {
        bolero::check!()
            .with_type()
            .for_each(|(src, dst): &(Mac, Mac)| {
                let raw = CountingEther::new();
                let mut fields = EtherFields::new(&raw);
                fields.set_source(*src).set_destination(*dst);
                let mut sink = Vec::new();
                let emitted = fields.commit(&mut sink);
                let expected = usize::from(*src != raw.values.source)
                    + usize::from(*dst != raw.values.destination);
                assert_eq!(sink.len(), expected);
                assert_eq!(emitted, expected != 0);
            });
    }
}
