// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Error types.
//!
//! Flow filter configuration is validated when filters and filter lists are built, so that
//! evaluation can assume a valid list: any failure there is a [`ConfigError`]. Packets that
//! cannot be decoded yield a [`DecodeError`], and a failure to commit staged header edits
//! (which only affects the packet being processed) is a [`CommitError`].

use crate::filter::FilterIndex;
use crate::ident::{ListIdent, VInterfacePath};
use crate::mac::Mac;
use etherparse::err::{LenError, ValueTooBigError};
use thiserror::Error;

/// The reasons why we may reject a flow filter configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Flow filter index out of range [1, 65535]: {0}")]
    BadFilterIndex(u32),
    #[error("Duplicate flow filter index: {0}")]
    DuplicateFilterIndex(FilterIndex),
    #[error("Duplicate action order {1} in flow filter {0}")]
    DuplicateActionOrder(FilterIndex, u32),
    #[error("Invalid name '{0}': {1}")]
    InvalidName(String, &'static str),
    #[error("Missing mandatory parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Flow filter {0}: destination is only allowed for redirect filters")]
    UnexpectedDestination(FilterIndex),
    #[error("Flow filter {0}: packets cannot be redirected to the interface owning the filter ({1})")]
    SelfRedirect(FilterIndex, VInterfacePath),
    #[error("Flow filter {0}: redirect filters cannot be configured on tenant list {1}")]
    RedirectNotAllowed(FilterIndex, ListIdent),
    #[error("Invalid source mac address for set-dl-src: {0}")]
    BadSourceMac(Mac),
    #[error("Invalid destination mac address for set-dl-dst: {0}")]
    BadDestinationMac(Mac),
    #[error("VLAN priority out of range [0, 7]: {0}")]
    BadVlanPcp(u8),
    #[error("DSCP out of range [0, 63]: {0}")]
    BadDscp(u8),
    #[error("Zero is not a valid transport port")]
    ZeroPort,
    #[error("Filter list {1} cannot replace filter list {0}")]
    ListMismatch(ListIdent, ListIdent),
}

/// Result-like type for configurations
pub type ConfigResult = Result<(), ConfigError>;

/// Errors which may occur while decoding a raw frame into its header layers
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("truncated header: {0}")]
    Length(#[from] LenError),
    #[error("invalid ipv4 header: {0}")]
    Ipv4(#[from] etherparse::err::ipv4::HeaderSliceError),
    #[error("invalid tcp header: {0}")]
    Tcp(#[from] etherparse::err::tcp::HeaderSliceError),
}

/// Errors which may occur while committing staged header edits
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("udp checksum cannot be computed: {0}")]
    UdpChecksum(ValueTooBigError<usize>),
    #[error("tcp checksum cannot be computed: {0}")]
    TcpChecksum(ValueTooBigError<usize>),
}
