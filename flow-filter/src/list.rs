// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow filter lists: the ordered set of flow filters of a virtual node, for one direction.

use crate::config::FilterConfig;
use crate::context::FlowFilterContext;
use crate::errors::ConfigError;
use crate::filter::{FilterIndex, FlowFilter};
use crate::ident::ListIdent;
use crate::outcome::FilterOutcome;
use etherparse::VlanId;
use tracing::trace;

/// The flow filters of a virtual node for one direction, sorted by index.
///
/// A list is validated when built and never modified afterwards: a configuration change builds
/// a new list, which replaces the old one (see [`SharedFilterList`]).
///
/// [`SharedFilterList`]: crate::SharedFilterList
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFilterList {
    ident: ListIdent,
    filters: Vec<FlowFilter>,
}

impl FlowFilterList {
    /// A list with no filters.
    #[must_use]
    pub fn empty(ident: ListIdent) -> Self {
        Self {
            ident,
            filters: Vec::new(),
        }
    }

    /// Build a list from filters given in any order.
    ///
    /// # Errors
    ///
    /// Fails if two filters share an index, or if a filter fails [`FlowFilter::verify`].
    pub fn new(
        ident: ListIdent,
        filters: impl IntoIterator<Item = FlowFilter>,
    ) -> Result<Self, ConfigError> {
        let mut filters: Vec<FlowFilter> = filters.into_iter().collect();
        filters.sort_by_key(FlowFilter::index);
        if let Some(dup) = filters
            .windows(2)
            .find(|pair| pair[0].index() == pair[1].index())
        {
            return Err(ConfigError::DuplicateFilterIndex(dup[0].index()));
        }
        for filter in &filters {
            filter.verify(&ident)?;
        }
        Ok(Self { ident, filters })
    }

    /// Build a list from configuration records.
    ///
    /// # Errors
    ///
    /// Fails if a record is invalid, or as [`FlowFilterList::new`] does.
    pub fn from_config<'c>(
        ident: ListIdent,
        config: impl IntoIterator<Item = &'c FilterConfig>,
    ) -> Result<Self, ConfigError> {
        let filters = config
            .into_iter()
            .map(FlowFilter::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(ident, filters)
    }

    #[must_use]
    pub fn ident(&self) -> &ListIdent {
        &self.ident
    }

    #[must_use]
    pub fn get(&self, index: FilterIndex) -> Option<&FlowFilter> {
        self.filters
            .binary_search_by_key(&index, FlowFilter::index)
            .ok()
            .and_then(|pos| self.filters.get(pos))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlowFilter> {
        self.filters.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Evaluate the filters, in index order, against the packet held by `ctx`.
    ///
    /// If `vlan_override` is set, conditions match against that VLAN ID instead of the one the
    /// packet carries. Evaluation stops at the first filter which matches, and its outcome is
    /// returned; [`FilterOutcome::Continue`] means that no filter matched.
    ///
    /// While the packet is flooded, filters which do not support it are skipped.
    pub fn evaluate<C: FlowFilterContext + ?Sized>(
        &self,
        ctx: &mut C,
        vlan_override: Option<VlanId>,
    ) -> FilterOutcome {
        if let Some(vid) = vlan_override {
            ctx.set_vlan_override(vid);
        }
        let flooding = !self.filters.is_empty() && ctx.is_flooding();
        for filter in &self.filters {
            if flooding && !filter.is_multicast_supported() {
                trace!(
                    "Skipping filter {} while flooding",
                    filter.path(&self.ident)
                );
                continue;
            }
            let outcome = filter.evaluate(ctx, &self.ident);
            if outcome.is_match() {
                return outcome;
            }
        }
        FilterOutcome::Continue
    }
}

impl<'a> IntoIterator for &'a FlowFilterList {
    type Item = &'a FlowFilter;
    type IntoIter = std::slice::Iter<'a, FlowFilter>;

    fn into_iter(self) -> Self::IntoIter {
        self.filters.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::action::FlowAction;
    use crate::filter::{FilterKind, Redirect};
    use crate::ident::{ConditionName, FlowDirection, RedirectDestination, VNodePath};
    use crate::test_utils::{
        TestContext, always, icmp_packet, is_echo_request, is_vlan_100, never, tcp_packet,
    };
    use pretty_assertions::assert_eq;
    use tracing_test::traced_test;

    fn ident() -> ListIdent {
        ListIdent::new(
            VNodePath::interface("t1", "br1", "if1").unwrap(),
            FlowDirection::Input,
        )
    }

    fn filter(index: u32, condition: &str, kind: FilterKind) -> FlowFilter {
        let condition: ConditionName = condition.parse().unwrap();
        FlowFilter::new(FilterIndex::new(index).unwrap(), condition, kind)
    }

    fn redirect_to(interface: &str) -> FilterKind {
        FilterKind::Redirect(Redirect {
            destination: RedirectDestination::new("br1", interface).unwrap(),
            output: false,
        })
    }

    #[test]
    fn filters_are_sorted() {
        let list = FlowFilterList::new(
            ident(),
            [
                filter(5, "c5", FilterKind::Pass),
                filter(1, "c1", FilterKind::Pass),
                filter(10, "c10", FilterKind::Pass),
            ],
        )
        .unwrap();
        let indices: Vec<u16> = list.iter().map(|f| f.index().get()).collect();
        assert_eq!(indices, vec![1, 5, 10]);
        assert_eq!(
            list.get(FilterIndex::new(5).unwrap()).unwrap().condition().as_str(),
            "c5"
        );
        assert!(list.get(FilterIndex::new(6).unwrap()).is_none());
    }

    #[test]
    fn evaluation_follows_index_order() {
        let list = FlowFilterList::new(
            ident(),
            [
                filter(5, "c5", FilterKind::Pass),
                filter(1, "c1", FilterKind::Pass),
                filter(10, "c10", FilterKind::Pass),
            ],
        )
        .unwrap();
        let packet = tcp_packet(40000, 80);
        let mut ctx = TestContext::new(&packet)
            .with_condition("c1", never())
            .with_condition("c5", never())
            .with_condition("c10", never());
        assert_eq!(list.evaluate(&mut ctx, None), FilterOutcome::Continue);
        assert_eq!(ctx.resolved(), ["c1", "c5", "c10"]);
    }

    #[test]
    fn duplicate_index_is_rejected() {
        let err = FlowFilterList::new(
            ident(),
            [
                filter(3, "a", FilterKind::Pass),
                filter(3, "b", FilterKind::Drop),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::DuplicateFilterIndex(FilterIndex::new(3).unwrap())
        );
    }

    #[test]
    fn self_redirect_is_rejected_at_construction() {
        let err = FlowFilterList::new(ident(), [filter(1, "c1", redirect_to("if1"))]).unwrap_err();
        assert!(matches!(err, ConfigError::SelfRedirect(_, _)));
    }

    #[test]
    fn drop_stops_evaluation() {
        let list = FlowFilterList::new(
            ident(),
            [
                filter(1, "c1", FilterKind::Pass),
                filter(5, "c5", FilterKind::Drop),
                filter(10, "c10", FilterKind::Pass),
            ],
        )
        .unwrap();
        let packet = tcp_packet(40000, 80);
        let mut ctx = TestContext::new(&packet)
            .with_condition("c1", never())
            .with_condition("c5", always())
            .with_condition("c10", always());
        assert_eq!(list.evaluate(&mut ctx, None), FilterOutcome::Dropped);
        assert_eq!(ctx.resolved(), ["c1", "c5"]);
        assert_eq!(ctx.drops(), 1);
    }

    #[test]
    fn first_match_wins() {
        let list = FlowFilterList::new(
            ident(),
            [
                filter(1, "c1", FilterKind::Pass)
                    .with_action(1, FlowAction::SetTpDst(8080)),
                filter(2, "c2", FilterKind::Drop),
            ],
        )
        .unwrap();
        let packet = tcp_packet(40000, 80);
        let mut ctx = TestContext::new(&packet)
            .with_condition("c1", always())
            .with_condition("c2", always());
        assert_eq!(list.evaluate(&mut ctx, None), FilterOutcome::Matched);
        assert_eq!(ctx.resolved(), ["c1"]);
        assert_eq!(ctx.drops(), 0);
        assert_eq!(ctx.headers().tcp().unwrap().ports().destination(), 8080);
    }

    #[test]
    fn drop_installs_a_single_directive() {
        let list = FlowFilterList::new(ident(), [filter(10, "c1", FilterKind::Drop)]).unwrap();
        let packet = tcp_packet(40000, 80);
        let mut ctx = TestContext::new(&packet).with_condition("c1", always());
        assert_eq!(list.evaluate(&mut ctx, None), FilterOutcome::Dropped);
        assert_eq!(ctx.drops(), 1);
    }

    #[test]
    fn empty_list_has_no_effect() {
        let list = FlowFilterList::empty(ident());
        assert!(list.is_empty());
        let packet = tcp_packet(40000, 80);
        let mut ctx = TestContext::new(&packet).with_condition("c1", always());
        assert_eq!(list.evaluate(&mut ctx, None), FilterOutcome::Continue);
        assert!(ctx.resolved().is_empty());
        assert_eq!(ctx.drops(), 0);
        assert_eq!(ctx.vlan_override(), None);
        assert!(!ctx.headers().ether().is_modified());
    }

    #[test]
    fn redirect_is_skipped_while_flooding() {
        let list = FlowFilterList::new(
            ident(),
            [
                filter(1, "c1", redirect_to("if2")),
                filter(2, "c2", FilterKind::Drop),
            ],
        )
        .unwrap();
        let packet = tcp_packet(40000, 80);
        let mut ctx = TestContext::new(&packet)
            .with_condition("c1", always())
            .with_condition("c2", always())
            .flooding();
        assert_eq!(list.evaluate(&mut ctx, None), FilterOutcome::Dropped);
        assert_eq!(ctx.resolved(), ["c2"]);
        assert_eq!(ctx.drops(), 0);
    }

    #[test]
    fn vlan_override() {
        let list = FlowFilterList::new(ident(), [filter(1, "vlan100", FilterKind::Drop)]).unwrap();
        let packet = tcp_packet(40000, 80);
        let mut ctx = TestContext::new(&packet).with_condition("vlan100", is_vlan_100());
        assert_eq!(list.evaluate(&mut ctx, None), FilterOutcome::Continue);

        let vid = VlanId::try_new(100).unwrap();
        assert_eq!(list.evaluate(&mut ctx, Some(vid)), FilterOutcome::Dropped);
        assert_eq!(ctx.vlan_override(), Some(vid));
    }

    #[traced_test]
    #[test]
    fn redirects_in_a_chain() {
        let list = FlowFilterList::new(ident(), [filter(1, "always", redirect_to("ifb"))]).unwrap();
        let packet = tcp_packet(40000, 80);
        let mut ctx = TestContext::new(&packet).with_condition("always", always());
        let first = list.evaluate(&mut ctx, None);
        let second = list.evaluate(&mut ctx, None);
        assert!(first.is_terminal());
        assert_eq!(first, second);
        assert_eq!(ctx.redirects(), 2);
        assert!(logs_contain("matched: redirect t1/br1/if1%IN.1"));
        assert!(logs_contain("matched: redirected again t1/br1/if1%IN.1"));
    }

    #[test]
    fn inapplicable_condition_is_skipped() {
        let list = FlowFilterList::new(
            ident(),
            [
                filter(1, "echo", FilterKind::Drop),
                filter(2, "c2", FilterKind::Pass),
            ],
        )
        .unwrap();
        let packet = tcp_packet(40000, 80);
        let mut ctx = TestContext::new(&packet)
            .with_condition("echo", is_echo_request())
            .with_condition("c2", always());
        assert_eq!(list.evaluate(&mut ctx, None), FilterOutcome::Matched);
        assert_eq!(ctx.drops(), 0);

        let packet = icmp_packet(8, 0);
        let mut ctx = TestContext::new(&packet)
            .with_condition("echo", is_echo_request())
            .with_condition("c2", always());
        assert_eq!(list.evaluate(&mut ctx, None), FilterOutcome::Dropped);
    }
}
