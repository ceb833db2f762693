// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The loader session
//!
//! Owns the registry, the compiled path table, the definition matcher
//! and the scheduler. All state is per-session: independent loaders in
//! one process do not share anything.

pub mod context;
pub mod deferred;
pub mod define;
mod graph;
pub mod plugin;
pub mod registry;
pub mod resolver;

pub use context::{BindingContext, RESERVED_BINDINGS, Require};
pub use deferred::Deferred;
pub use define::{DefineCall, DefineCallBuilder, Factory, FactoryFn, FetchToken};
pub use plugin::{Completion, Plugin};
pub use registry::{ResourceCell, ResourceRegistry};

use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{LoadError, Result};
use crate::loader::define::{DefinitionMatcher, Slot};
use crate::loader::resolver::{PathMatcher, normalize_name, parent_of, resolve_url};
use crate::scheduler::Scheduler;
use crate::transport::{FetchRequest, Transport};
use crate::value::{Exports, Value};

struct LoaderInner {
    config: Config,
    matcher: PathMatcher,
    registry: ResourceRegistry,
    definitions: DefinitionMatcher,
    scheduler: Arc<Scheduler>,
    transport: Arc<dyn Transport>,
}

/// A loader session.
///
/// Cheaply cloneable handle over shared session state. Create one per
/// independent module universe; the registry, path table and scheduler
/// live and die with it.
#[derive(Clone)]
pub struct Loader {
    inner: Arc<LoaderInner>,
}

impl Loader {
    /// Create a session from a configuration and a transport
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let matcher = PathMatcher::compile(&config);
        Self {
            inner: Arc::new(LoaderInner {
                config,
                matcher,
                registry: ResourceRegistry::new(),
                definitions: DefinitionMatcher::new(),
                scheduler: Arc::new(Scheduler::new()),
                transport,
            }),
        }
    }

    /// Request modules by identifier.
    ///
    /// The only entry point application code needs: resolves every
    /// identifier (fetching on registry miss) and hands back a handle
    /// settling with the exported values in input order, or with the
    /// first failure.
    pub fn request(&self, ids: &[&str]) -> RequestHandle {
        self.request_from(ids, "")
    }

    /// Request modules with relative identifiers resolved against `base`
    pub fn request_from(&self, ids: &[&str], base: &str) -> RequestHandle {
        let names: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let ctx = self.derive_ctx(base, None);
        let deferred = graph::resolve_deps(self, &names, &ctx);
        RequestHandle {
            deferred,
            loader: self.clone(),
        }
    }

    /// Register a module declaration.
    ///
    /// This is the producer side fetched content invokes. Named
    /// declarations resolve their registry entry directly; anonymous
    /// ones are captured against `token` and consumed when that fetch
    /// completes. An anonymous declaration without a token, or a second
    /// anonymous declaration for one fetch, is a protocol violation.
    pub fn define(&self, token: Option<FetchToken>, call: DefineCall) -> Result<()> {
        if let Some(name) = call.id.clone() {
            debug!("named declaration for '{}'", name);
            let (cell, _) = self.inner.registry.get_or_create(&name, &self.inner.scheduler);
            cell.claim_named();
            // an already-resolved entry means the same name arrived from
            // two separately loaded files; leave it alone
            if !cell.deferred.is_settled() {
                self.resolve_definition(&cell, call);
            }
            return Ok(());
        }
        match token {
            Some(token) => {
                let captured = self.inner.definitions.capture(token, call);
                if captured.is_err() {
                    warn!("multiple anonymous declarations in one fetch");
                }
                captured
            }
            None => {
                warn!("anonymous declaration with no fetch token");
                Err(LoadError::AnonymousOutsideFetch)
            }
        }
    }

    /// Drain the scheduler, running queued continuations until idle.
    ///
    /// The embedding host drives this after delivering transport events.
    pub fn run_until_idle(&self) -> usize {
        self.inner.scheduler.run_until_idle()
    }

    /// Drop a registry entry. Development escape hatch for reloads.
    pub fn forget(&self, id: &str) -> bool {
        self.inner.registry.forget(id).is_some()
    }

    /// Registered identifiers; development aide
    pub fn cache_keys(&self) -> Vec<String> {
        self.inner.registry.keys()
    }

    /// The session configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The session scheduler
    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.inner.scheduler)
    }

    pub(crate) fn registry(&self) -> &ResourceRegistry {
        &self.inner.registry
    }

    pub(crate) fn matcher(&self) -> &PathMatcher {
        &self.inner.matcher
    }

    /// Context for a module being defined under `name`
    pub(crate) fn beget_ctx(&self, name: &str, plugin_prefix: Option<String>) -> Arc<BindingContext> {
        let base_name = parent_of(name).to_string();
        let ctx = BindingContext {
            id: name.to_string(),
            base_name,
            url: String::new(),
            plugin_prefix,
            exports: Exports::new(),
            loader: self.clone(),
        };
        let url = if name.is_empty() {
            String::new()
        } else {
            self.to_url_in(&ctx, name)
        };
        Arc::new(BindingContext { url, ..ctx })
    }

    /// Context with an explicit base directory (top-level requests and
    /// plugin-scoped delegation)
    pub(crate) fn derive_ctx(
        &self,
        base_name: &str,
        plugin_prefix: Option<String>,
    ) -> Arc<BindingContext> {
        Arc::new(BindingContext {
            id: String::new(),
            base_name: base_name.to_string(),
            url: String::new(),
            plugin_prefix,
            exports: Exports::new(),
            loader: self.clone(),
        })
    }

    /// Identifier to URL, scoped to a context (and its plugin prefix)
    pub(crate) fn to_url_in(&self, ctx: &BindingContext, id: &str) -> String {
        let normalized = normalize_name(id, &ctx.base_name);
        let path = self
            .inner
            .matcher
            .resolve_path(&normalized, ctx.plugin_prefix.as_deref());
        resolve_url(&path, &self.inner.config.base_url, None)
    }

    pub(crate) fn resolve_deps_in(
        &self,
        ctx: &Arc<BindingContext>,
        names: &[String],
    ) -> Deferred<Vec<Value>> {
        graph::resolve_deps(self, names, ctx)
    }

    /// Fetch-or-lookup for one dependency identifier
    pub(crate) fn fetch_dep(&self, name: &str, ctx: &Arc<BindingContext>) -> Deferred<Value> {
        // plugin-prefixed identifiers bypass ordinary path resolution
        if let Some(pos) = name.find('!') {
            return plugin::fetch_plugin_dep(self, name, pos, ctx);
        }

        let normalized = normalize_name(name, &ctx.base_name);
        let (cell, created) = self
            .inner
            .registry
            .get_or_create(&normalized, &self.inner.scheduler);
        if created {
            let path = self.inner.matcher.resolve_path(&normalized, None);
            cell.set_url(resolve_url(
                &path,
                &self.inner.config.base_url,
                Some(&self.inner.config.default_ext),
            ));
            self.fetch_resource(&cell);
        }
        cell.deferred.clone()
    }

    /// Start the transport fetch backing a registry cell
    pub(crate) fn fetch_resource(&self, cell: &Arc<ResourceCell>) {
        let url = cell.url().unwrap_or_default();
        let token = self.inner.definitions.begin_fetch(&url);
        debug!("fetching '{}' from '{}'", cell.id, url);

        let done: Deferred<()> = Deferred::new(self.scheduler());
        let loader = self.clone();
        let fetched = Arc::clone(cell);
        done.subscribe(move |outcome| loader.finish_fetch(fetched, token, outcome));

        let request = FetchRequest {
            id: cell.id.clone(),
            url,
            token,
            charset: "utf-8".to_string(),
        };
        self.inner.transport.fetch(self, request, Completion::new(done));
    }

    /// Consume the fetch's definition slot once the transport settles
    fn finish_fetch(&self, cell: Arc<ResourceCell>, token: FetchToken, outcome: Result<()>) {
        let slot = self.inner.definitions.finish_fetch(token);
        let url = cell.url().unwrap_or_else(|| cell.id.clone());

        if let Err(error) = outcome {
            if cell.deferred.reject(error).is_err() {
                warn!("transport failure for '{}' arrived after completion", cell.id);
            }
            return;
        }

        // a named declaration claimed this identifier mid-fetch; an
        // anonymous capture from the same fetch is ignored
        if !cell.use_net() {
            return;
        }

        match slot {
            Slot::Empty => {
                let _ = cell
                    .deferred
                    .reject(LoadError::DeclarationNotFound(url));
            }
            Slot::Violated => {
                let _ = cell.deferred.reject(LoadError::MultipleAnonymous(url));
            }
            Slot::Captured(call) => self.resolve_definition(&cell, call),
        }
    }

    /// Resolve a matched declaration: load its dependencies, run the
    /// factory, settle the cell
    fn resolve_definition(&self, cell: &Arc<ResourceCell>, call: DefineCall) {
        debug!("resolving '{}'", cell.id);

        // a remapped module resolves its own relative deps against the
        // mapped location
        let child_name = cell.base_name().unwrap_or_else(|| cell.id.clone());
        let ctx = self.beget_ctx(&child_name, None);

        let deps = call.effective_deps();
        let factory = call.factory;
        let factory_ctx = Arc::clone(&ctx);
        let resolved_cell = Arc::clone(cell);
        let rejected_cell = Arc::clone(cell);

        self.resolve_deps_in(&ctx, &deps).then(
            move |values| {
                let produced = match factory {
                    Factory::Literal(value) => Ok(value),
                    Factory::Function { run, .. } => run(values),
                };
                match produced {
                    Ok(value) => {
                        // a factory that exported through its exports
                        // cell returns Undefined; the cell is the value
                        let value = if value.is_undefined() {
                            Value::Exports(factory_ctx.exports.clone())
                        } else {
                            value
                        };
                        debug!("defined '{}'", resolved_cell.id);
                        if resolved_cell.deferred.resolve(value).is_err() {
                            warn!("duplicate completion for '{}'", resolved_cell.id);
                        }
                    }
                    Err(error) => {
                        let _ = resolved_cell
                            .deferred
                            .reject(LoadError::factory(&resolved_cell.id, error.to_string()));
                    }
                }
            },
            move |error| {
                let _ = rejected_cell.deferred.reject(error);
            },
        );
    }
}

/// Handle on one top-level request.
///
/// Wraps the aggregate deferred and supports sequencing a further
/// request once this one resolves.
#[derive(Clone)]
pub struct RequestHandle {
    deferred: Deferred<Vec<Value>>,
    loader: Loader,
}

impl RequestHandle {
    /// Register outcome callbacks; returns the handle for chaining
    pub fn then(
        self,
        on_resolved: impl FnOnce(Vec<Value>) + Send + 'static,
        on_rejected: impl FnOnce(LoadError) + Send + 'static,
    ) -> Self {
        self.deferred.then(on_resolved, on_rejected);
        self
    }

    /// Sequence another identifier list after this request resolves.
    ///
    /// The new request is only issued once the previous one settles
    /// successfully; a failure anywhere propagates down the chain.
    pub fn next(&self, ids: &[&str]) -> RequestHandle {
        let names: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let loader = self.loader.clone();
        let chained: Deferred<Vec<Value>> = Deferred::new(loader.scheduler());
        let resolved_out = chained.clone();
        let rejected_out = chained.clone();

        self.deferred.then(
            move |_| {
                let ctx = loader.derive_ctx("", None);
                graph::resolve_deps(&loader, &names, &ctx).subscribe(move |outcome| {
                    match outcome {
                        Ok(values) => {
                            let _ = resolved_out.resolve(values);
                        }
                        Err(error) => {
                            let _ = resolved_out.reject(error);
                        }
                    }
                });
            },
            move |error| {
                let _ = rejected_out.reject(error);
            },
        );

        RequestHandle {
            deferred: chained,
            loader: self.loader.clone(),
        }
    }

    /// The underlying aggregate deferred
    pub fn deferred(&self) -> &Deferred<Vec<Value>> {
        &self.deferred
    }

    /// Await the outcome on a futures runtime
    pub fn wait(&self) -> impl std::future::Future<Output = Result<Vec<Value>>> + Send + use<> {
        self.deferred.wait()
    }
}
