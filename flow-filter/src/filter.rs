// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow filters: a named condition, the actions to apply to the packets matching it, and what
//! to do with those packets.

use crate::action::{FilterAction, FlowAction};
use crate::context::{ConditionVerdict, FlowFilterContext};
use crate::errors::{ConfigError, ConfigResult};
use crate::ident::{ConditionName, ListIdent, RedirectDestination};
use crate::outcome::{FilterOutcome, RedirectInfo};
use std::fmt::Display;
use std::num::NonZero;
use tracing::{debug, info, trace};

/// The position of a flow filter in its list, in [1, 65535].
#[cfg_attr(any(test, feature = "bolero"), derive(bolero::TypeGenerator))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterIndex(NonZero<u16>);

impl FilterIndex {
    /// Build a filter index.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BadFilterIndex`] if `index` is zero or does not fit 16 bits.
    pub fn new(index: u32) -> Result<Self, ConfigError> {
        u16::try_from(index)
            .ok()
            .and_then(NonZero::new)
            .map(Self)
            .ok_or(ConfigError::BadFilterIndex(index))
    }

    #[must_use]
    pub fn get(self) -> u16 {
        self.0.get()
    }
}

impl TryFrom<u32> for FilterIndex {
    type Error = ConfigError;

    fn try_from(index: u32) -> Result<Self, Self::Error> {
        Self::new(index)
    }
}

impl Display for FilterIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The parameters of a redirect filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub destination: RedirectDestination,
    /// Dispatch the packet as leaving through the destination, rather than entering through it.
    pub output: bool,
}

/// What happens to the packets matching a flow filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterKind {
    /// Apply the actions, and let the packet go on.
    Pass,
    /// Discard the packet. Actions are not applied.
    Drop,
    /// Apply the actions, then dispatch the packet to another virtual interface.
    Redirect(Redirect),
}

impl FilterKind {
    /// Returns true if applying actions is pointless for this kind.
    #[must_use]
    pub fn ignores_actions(&self) -> bool {
        matches!(self, FilterKind::Drop)
    }

    /// Returns true if the filter may be evaluated against a packet being flooded.
    #[must_use]
    pub fn is_multicast_supported(&self) -> bool {
        !matches!(self, FilterKind::Redirect(_))
    }

    /// Check whether a filter of this kind may be configured on the given list.
    pub fn can_set(&self, index: FilterIndex, list: &ListIdent) -> ConfigResult {
        let FilterKind::Redirect(redirect) = self else {
            return Ok(());
        };
        let owner = list.owner();
        if owner.is_tenant() {
            return Err(ConfigError::RedirectNotAllowed(index, list.clone()));
        }
        let destination = redirect.destination.resolve(owner);
        if owner.as_interface().as_ref() == Some(&destination) {
            return Err(ConfigError::SelfRedirect(index, destination));
        }
        Ok(())
    }
}

impl Display for FilterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FilterKind::Pass => f.write_str("pass"),
            FilterKind::Drop => f.write_str("drop"),
            FilterKind::Redirect(redirect) => {
                let direction = if redirect.output { "OUT" } else { "IN" };
                write!(f, "redirect {}%{direction}", redirect.destination)
            }
        }
    }
}

/// A flow filter.
///
/// Filters are immutable once built: the actions are kept sorted by order, and a filter is
/// verified against the list it belongs to before the list accepts it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFilter {
    index: FilterIndex,
    condition: ConditionName,
    actions: Vec<FilterAction>,
    kind: FilterKind,
}

impl FlowFilter {
    #[must_use]
    pub fn new(index: FilterIndex, condition: ConditionName, kind: FilterKind) -> Self {
        Self {
            index,
            condition,
            actions: Vec::new(),
            kind,
        }
    }

    /// Add an action, keeping actions sorted by order. Actions sharing an order keep their
    /// insertion order here, and are rejected by [`FlowFilter::verify`].
    #[must_use]
    pub fn with_action(mut self, order: u32, action: FlowAction) -> Self {
        let pos = self.actions.partition_point(|a| a.order <= order);
        self.actions.insert(pos, FilterAction { order, action });
        self
    }

    #[must_use]
    pub fn index(&self) -> FilterIndex {
        self.index
    }

    #[must_use]
    pub fn condition(&self) -> &ConditionName {
        &self.condition
    }

    #[must_use]
    pub fn actions(&self) -> &[FilterAction] {
        &self.actions
    }

    #[must_use]
    pub fn kind(&self) -> &FilterKind {
        &self.kind
    }

    #[must_use]
    pub fn is_multicast_supported(&self) -> bool {
        self.kind.is_multicast_supported()
    }

    /// Validate the filter for the list it is configured on.
    pub fn verify(&self, list: &ListIdent) -> ConfigResult {
        if let Some(dup) = self
            .actions
            .windows(2)
            .find(|pair| pair[0].order == pair[1].order)
        {
            return Err(ConfigError::DuplicateActionOrder(self.index, dup[0].order));
        }
        for action in &self.actions {
            action.action.validate()?;
        }
        self.kind.can_set(self.index, list)
    }

    /// The path of this filter in the given list, as used in logs and redirect information.
    #[must_use]
    pub fn path(&self, list: &ListIdent) -> String {
        format!("{list}.{}", self.index)
    }

    fn apply_actions<C: FlowFilterContext + ?Sized>(&self, ctx: &mut C, path: &str) {
        for FilterAction { order, action } in &self.actions {
            let status = ctx.apply_action(action);
            if status.is_applied() {
                trace!(filter = %path, "action {order} applied: {action}");
            } else {
                trace!(filter = %path, "action {order} ignored ({status:?}): {action}");
            }
        }
    }

    /// Evaluate the filter against the packet held by `ctx`.
    ///
    /// Returns [`FilterOutcome::Continue`] if the condition does not match, or does not apply
    /// to the packet. Otherwise, actions are applied (unless the filter drops the packet) and
    /// the outcome depends on the kind of the filter.
    pub fn evaluate<C: FlowFilterContext + ?Sized>(
        &self,
        ctx: &mut C,
        list: &ListIdent,
    ) -> FilterOutcome {
        let path = self.path(list);
        let condition = self.condition.as_str();
        match ctx.resolve_condition(&self.condition) {
            ConditionVerdict::Inapplicable => {
                debug!(
                    filter = %path,
                    condition, "condition does not apply to packet, skipping filter"
                );
                return FilterOutcome::Continue;
            }
            ConditionVerdict::NoMatch => {
                trace!(filter = %path, condition, "no match");
                return FilterOutcome::Continue;
            }
            ConditionVerdict::Match => {}
        }

        if !self.kind.ignores_actions() {
            self.apply_actions(ctx, &path);
        }

        match &self.kind {
            FilterKind::Pass => {
                debug!(filter = %path, condition, "matched: pass");
                FilterOutcome::Matched
            }
            FilterKind::Drop => {
                let flooding = ctx.is_flooding();
                if !flooding {
                    ctx.install_drop();
                }
                debug!(filter = %path, condition, flooding, "matched: drop");
                FilterOutcome::Dropped
            }
            FilterKind::Redirect(redirect) => {
                let info = RedirectInfo {
                    filter_path: path,
                    condition: self.condition.clone(),
                    destination: redirect.destination.resolve(list.owner()),
                    output: redirect.output,
                };
                if ctx.is_first_redirect() {
                    info!(filter = %info.filter_path, condition, "matched: redirect {info}");
                } else {
                    debug!(
                        filter = %info.filter_path,
                        condition, "matched: redirected again {info}"
                    );
                }
                FilterOutcome::Redirected(info)
            }
        }
    }
}

impl Display for FlowFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.index, self.condition, self.kind)?;
        for FilterAction { order, action } in &self.actions {
            write!(f, " {order}:{action}")?;
        }
        Ok(())
    }
}
