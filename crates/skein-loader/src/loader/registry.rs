// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Resource registry
//!
//! Process-wide (per loader session) map from normalized module
//! identifier to its resource definition. Guarantees at most one
//! in-flight load per identifier: concurrent requesters share one cell
//! and therefore settle together.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::loader::deferred::Deferred;
use crate::scheduler::Scheduler;
use crate::value::Value;

/// Registry entry tracking one identifier's load.
pub struct ResourceCell {
    /// Normalized identifier
    pub id: String,
    /// Backing deferred, resolved with the module's exported value
    pub deferred: Deferred<Value>,
    /// Resolved URL, set when a fetch is started
    url: Mutex<Option<String>>,
    /// Parent identifier used to resolve the module's own relative
    /// dependencies (set for plugin modules loaded under a mapped path)
    base_name: Mutex<Option<String>>,
    /// Cleared once a named declaration has claimed this identifier; an
    /// anonymous capture for the same fetch is then ignored
    use_net: AtomicBool,
}

impl ResourceCell {
    fn new(id: &str, scheduler: &Arc<Scheduler>) -> Self {
        Self {
            id: id.to_string(),
            deferred: Deferred::new(Arc::clone(scheduler)),
            url: Mutex::new(None),
            base_name: Mutex::new(None),
            use_net: AtomicBool::new(true),
        }
    }

    /// The URL this cell was fetched from, if a fetch was started
    pub fn url(&self) -> Option<String> {
        self.url.lock().clone()
    }

    pub(crate) fn set_url(&self, url: String) {
        *self.url.lock() = Some(url);
    }

    /// Base identifier for the module's own relative dependencies
    pub fn base_name(&self) -> Option<String> {
        self.base_name.lock().clone()
    }

    pub(crate) fn set_base_name(&self, base: String) {
        *self.base_name.lock() = Some(base);
    }

    pub(crate) fn use_net(&self) -> bool {
        self.use_net.load(Ordering::SeqCst)
    }

    pub(crate) fn claim_named(&self) {
        self.use_net.store(false, Ordering::SeqCst);
    }
}

/// Map from normalized identifier to resource definition.
pub struct ResourceRegistry {
    cache: DashMap<String, Arc<ResourceCell>>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }

    /// Return the existing cell for `id`, or create, register and return
    /// a new pending one. Check-and-create is a single atomic step, so
    /// two concurrent requesters can never mint two cells for one
    /// identifier. The boolean is true when this call created the cell.
    pub fn get_or_create(
        &self,
        id: &str,
        scheduler: &Arc<Scheduler>,
    ) -> (Arc<ResourceCell>, bool) {
        let mut created = false;
        let cell = self
            .cache
            .entry(id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(ResourceCell::new(id, scheduler))
            })
            .clone();
        if created {
            tracing::trace!("registered resource '{}'", id);
        }
        (cell, created)
    }

    /// Look up an existing cell without creating one
    pub fn lookup(&self, id: &str) -> Option<Arc<ResourceCell>> {
        self.cache.get(id).map(|entry| Arc::clone(&entry))
    }

    /// Drop an entry. Development escape hatch for reloads; not part of
    /// the production flow, where entries live for the whole session.
    pub fn forget(&self, id: &str) -> Option<Arc<ResourceCell>> {
        self.cache.remove(id).map(|(_, cell)| cell)
    }

    /// Registered identifiers
    pub fn keys(&self) -> Vec<String> {
        self.cache.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Number of registered identifiers
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
