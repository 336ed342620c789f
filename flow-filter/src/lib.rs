// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

#![deny(
    unsafe_code,
    clippy::all,
    clippy::pedantic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

//! # Flow filters for virtual network nodes
//!
//! This crate decides, for every packet traversing a virtual node (a tenant, a bridge or
//! terminal, or one of their interfaces), whether to let it pass, drop it, or redirect it to
//! another virtual interface. It is made of two parts:
//!
//! - The packet field cache ([`fields`]): lazy, copy-on-write views over the decoded header
//!   fields of each protocol layer of a packet. Flow actions stage their edits there, and the
//!   caller commits the difference into the outgoing packet once the packet survived filtering.
//! - The evaluation engine ([`FlowFilter`], [`FlowFilterList`]): an ordered set of rules, each
//!   made of a named condition, a list of field-mutating actions and a terminal kind.
//!
//! The engine talks to the forwarding pipeline through the [`FlowFilterContext`] trait, which
//! resolves named conditions, routes actions to the field caches, and receives drop directives.
//!
//! ```
//! use dataplane_flow_filter::{
//!     FilterIndex, FilterKind, FlowDirection, FlowFilter, FlowFilterList, ListIdent, VNodePath,
//! };
//!
//! let owner = VNodePath::interface("tenant1", "bridge1", "if1").unwrap();
//! let ident = ListIdent::new(owner, FlowDirection::Input);
//! let filter = FlowFilter::new(FilterIndex::new(10).unwrap(), "web".parse().unwrap(), FilterKind::Drop);
//! let list = FlowFilterList::new(ident, [filter]).unwrap();
//! assert_eq!(list.len(), 1);
//! ```

pub mod action;
pub mod config;
pub mod context;
pub mod errors;
pub mod fields;
pub mod filter;
pub mod ident;
pub mod list;
pub mod mac;
pub mod outcome;
pub mod shared;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use action::{FilterAction, FlowAction}; // re-export
pub use config::{ActionConfig, ActionSpec, DestinationConfig, FilterConfig, FilterKindConfig}; // re-export
pub use context::{ConditionVerdict, FlowFilterContext}; // re-export
pub use errors::{CommitError, ConfigError, DecodeError}; // re-export
pub use filter::{FilterIndex, FilterKind, FlowFilter, Redirect}; // re-export
pub use ident::{
    ConditionName, FlowDirection, ListIdent, RedirectDestination, VInterfacePath, VNodeName,
    VNodePath,
}; // re-export
pub use list::FlowFilterList; // re-export
pub use mac::Mac; // re-export
pub use outcome::{FilterOutcome, RedirectInfo}; // re-export
pub use shared::{FilterListReader, SharedFilterList}; // re-export
