// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Sharing flow filter lists between the configuration path and packet processing threads.

use crate::errors::ConfigError;
use crate::ident::ListIdent;
use crate::list::FlowFilterList;
use arc_swap::ArcSwap;
use std::sync::Arc;
use tracing::debug;

/// The writer side of a flow filter list shared with packet processing threads.
///
/// Lists are never modified in place: a configuration change builds a new list, and
/// [`SharedFilterList::replace`] swaps it in. Readers holding the previous list keep evaluating
/// it until they load again.
#[derive(Debug)]
pub struct SharedFilterList {
    list: Arc<ArcSwap<FlowFilterList>>,
}

impl SharedFilterList {
    #[must_use]
    pub fn new(list: FlowFilterList) -> Self {
        Self {
            list: Arc::new(ArcSwap::from_pointee(list)),
        }
    }

    #[must_use]
    pub fn get_reader(&self) -> FilterListReader {
        FilterListReader(self.list.clone())
    }

    #[must_use]
    pub fn ident(&self) -> ListIdent {
        self.list.load().ident().clone()
    }

    /// Replace the shared list, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ListMismatch`] if `list` belongs to another virtual node or
    /// direction.
    pub fn replace(&self, list: FlowFilterList) -> Result<Arc<FlowFilterList>, ConfigError> {
        let current = self.list.load();
        if current.ident() != list.ident() {
            return Err(ConfigError::ListMismatch(
                current.ident().clone(),
                list.ident().clone(),
            ));
        }
        debug!(
            "Replacing flow filter list {}: {} filters",
            list.ident(),
            list.len()
        );
        Ok(self.list.swap(Arc::new(list)))
    }
}

/// The reader side of a shared flow filter list.
#[derive(Debug, Clone)]
pub struct FilterListReader(Arc<ArcSwap<FlowFilterList>>);

impl FilterListReader {
    /// The current list.
    #[must_use]
    pub fn get(&self) -> Arc<FlowFilterList> {
        self.0.load_full()
    }
}
