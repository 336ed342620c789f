// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! The capabilities flow filter evaluation needs from the forwarding pipeline.

use crate::action::{ActionStatus, FlowAction};
use crate::ident::ConditionName;
use etherparse::VlanId;

/// The result of resolving a named flow condition against a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionVerdict {
    /// The packet matches the condition.
    Match,
    /// The packet does not match the condition.
    NoMatch,
    /// The condition tests fields the packet does not carry (e.g. ICMP fields against a TCP
    /// packet), or no condition goes by that name.
    Inapplicable,
}

/// The state of one packet traversing one virtual node, as seen by flow filters.
///
/// A context lives for exactly one traversal: it is built by the pipeline stage processing the
/// packet, handed to [`FlowFilterList::evaluate`], and dropped afterwards. All methods are
/// synchronous and must not block.
///
/// [`FlowFilterList::evaluate`]: crate::FlowFilterList::evaluate
pub trait FlowFilterContext {
    /// Whether the packet is being copied to several destinations.
    fn is_flooding(&self) -> bool;

    /// Make conditions match against `vid` instead of the VLAN ID the packet carries, for the
    /// current evaluation pass.
    fn set_vlan_override(&mut self, vid: VlanId);

    /// Request a drop entry for the flow of the packet. Calling this more than once for a
    /// packet has no further effect.
    fn install_drop(&mut self);

    /// Stage a header edit into the field cache of the relevant protocol layer.
    fn apply_action(&mut self, action: &FlowAction) -> ActionStatus;

    /// Evaluate the named condition against the packet as it entered the virtual node.
    fn resolve_condition(&mut self, condition: &ConditionName) -> ConditionVerdict;

    /// Returns true the first time it is called within a processing chain, false afterwards.
    fn is_first_redirect(&mut self) -> bool;
}
