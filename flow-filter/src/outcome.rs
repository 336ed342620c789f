// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Outcomes of flow filter evaluation.

use crate::ident::{ConditionName, VInterfacePath};
use std::fmt::Display;

/// Where, and in which direction, a redirected packet must be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectInfo {
    /// Path of the filter which redirected the packet, e.g. `t1/br1/if1%IN.10`.
    pub filter_path: String,
    pub condition: ConditionName,
    pub destination: VInterfacePath,
    /// If true the packet leaves through the destination interface, otherwise it enters the
    /// virtual node through it.
    pub output: bool,
}

impl Display for RedirectInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let direction = if self.output { "OUT" } else { "IN" };
        write!(
            f,
            "{} ({}) -> {}%{direction}",
            self.filter_path, self.condition, self.destination
        )
    }
}

/// The outcome of evaluating a flow filter, or a list of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Nothing matched: evaluation moves on and the packet is unaffected.
    Continue,
    /// A pass filter matched.
    Matched,
    /// A drop filter matched: the packet must be discarded.
    Dropped,
    /// A redirect filter matched: the packet must be dispatched to another virtual interface.
    Redirected(RedirectInfo),
}

impl FilterOutcome {
    /// Returns true for the outcomes which end the processing of the packet by the virtual node.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, FilterOutcome::Dropped | FilterOutcome::Redirected(_))
    }

    /// Returns true if a filter matched.
    #[must_use]
    pub fn is_match(&self) -> bool {
        !matches!(self, FilterOutcome::Continue)
    }
}
