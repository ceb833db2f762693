// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Transport interface
//!
//! The engine never touches the environment that actually fetches and
//! evaluates source; it hands a [`FetchRequest`] to a [`Transport`] and
//! waits for the completion signal. Any definition calls made by the
//! evaluated content must reach [`crate::loader::Loader::define`] with
//! the request's token before the completion settles.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{LoadError, Result};
use crate::loader::{Completion, FetchToken, Loader};

/// One fetch handed to the transport.
pub struct FetchRequest {
    /// Normalized identifier being fetched
    pub id: String,
    /// Resolved URL to fetch
    pub url: String,
    /// Token correlating definition calls back to this fetch
    pub token: FetchToken,
    /// Character set hint; transports may ignore it
    pub charset: String,
}

/// Out-of-band source fetch and evaluation.
///
/// On success the transport resolves `done` with `()`, after every
/// definition call from the evaluated content has reached the loader. On
/// transport failure it rejects `done`; the engine never retries, and
/// timeouts belong to the transport, not here.
pub trait Transport: Send + Sync {
    /// Begin fetching and evaluating the resource described by `request`
    fn fetch(&self, loader: &Loader, request: FetchRequest, done: Completion<()>);
}

/// Script body evaluated by [`MemoryTransport`]
pub type Script = Arc<dyn Fn(&Loader, FetchToken) -> Result<()> + Send + Sync>;

/// In-memory transport mapping URLs to script closures.
///
/// Delivery is synchronous: the script runs inside `fetch`, so
/// definitions can land in the same tick that started the load, the
/// same shape as an environment serving scripts from cache. A script
/// that returns an error is treated as a failed evaluation. Every fetch
/// is appended to a log so tests can check the at-most-one-fetch
/// invariant.
pub struct MemoryTransport {
    sources: Mutex<HashMap<String, Script>>,
    log: Mutex<Vec<String>>,
}

impl MemoryTransport {
    /// Create a transport with no sources
    pub fn new() -> Self {
        Self {
            sources: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Register the script served for `url`
    pub fn add_source(
        &self,
        url: impl Into<String>,
        script: impl Fn(&Loader, FetchToken) -> Result<()> + Send + Sync + 'static,
    ) {
        self.sources.lock().insert(url.into(), Arc::new(script));
    }

    /// URLs fetched so far, in order
    pub fn fetch_log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, loader: &Loader, request: FetchRequest, done: Completion<()>) {
        self.log.lock().push(request.url.clone());
        let script = self.sources.lock().get(&request.url).cloned();
        match script {
            None => {
                let _ = done.reject(LoadError::transport(&request.url));
            }
            Some(script) => match script(loader, request.token) {
                Ok(()) => {
                    let _ = done.resolve(());
                }
                Err(error) => {
                    let _ = done.reject(error);
                }
            },
        }
    }
}
