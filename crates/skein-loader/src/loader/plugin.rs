// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Plugin delegation protocol
//!
//! An identifier of the form `prefix!resource` hands loading semantics to
//! the module registered under `prefix`: the plugin is loaded as an
//! ordinary module, asked to normalize the resource suffix, and then
//! invoked to load the canonical `prefix!canonical` resource. The
//! delegation state machine per qualified load is
//! `unresolved → plugin-loading → plugin-ready → resource-normalized →
//! resource-loading → {resolved | rejected}`; terminal states are final.

use std::sync::Arc;
use tracing::debug;

use crate::config::PluginConfig;
use crate::error::{LoadError, Result};
use crate::loader::Loader;
use crate::loader::context::{BindingContext, Require};
use crate::loader::deferred::Deferred;
use crate::loader::resolver::{join_path, normalize_name, resolve_url};
use crate::value::Value;

/// Completion callback carrying both resolve and reject capabilities.
///
/// Handed to a plugin's `load` operation (with the loaded value as the
/// payload) and to the transport (with a unit payload); the holder is
/// solely responsible for eventually settling it exactly once. The
/// engine neither retries nor times out.
pub struct Completion<T = Value> {
    deferred: Deferred<T>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            deferred: self.deferred.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Completion<T> {
    pub(crate) fn new(deferred: Deferred<T>) -> Self {
        Self { deferred }
    }

    /// Deliver the loaded value. Fails fast if already settled.
    pub fn resolve(&self, value: T) -> Result<()> {
        self.deferred.resolve(value)
    }

    /// Deliver a failure. Fails fast if already settled.
    pub fn reject(&self, error: LoadError) -> Result<()> {
        self.deferred.reject(error)
    }
}

/// The contract a module must export to serve as a plugin.
pub trait Plugin: Send + Sync {
    /// Load `resource`, eventually calling `completion` exactly once.
    ///
    /// `require` is scoped to the requesting context (its `to_url`
    /// consults plugin-qualified path rules first); `config` is the
    /// flattened plugin-specific configuration overlay.
    fn load(&self, resource: &str, require: Require, completion: Completion, config: PluginConfig);

    /// Canonicalize a resource suffix.
    ///
    /// The default applies the absolutizer alone, which is also what the
    /// engine does for plugins that leave this untouched.
    fn normalize(
        &self,
        resource: &str,
        absolutize: &dyn Fn(&str) -> String,
        _config: &PluginConfig,
    ) -> String {
        absolutize(resource)
    }

    /// Dynamic resources are re-loaded on every reference, never cached
    fn dynamic(&self) -> bool {
        false
    }
}

/// Route a `prefix!resource` identifier through its plugin.
pub(crate) fn fetch_plugin_dep(
    loader: &Loader,
    dep_name: &str,
    delim: usize,
    ctx: &Arc<BindingContext>,
) -> Deferred<Value> {
    let prefix = dep_name[..delim].to_string();
    let res_suffix = dep_name[delim + 1..].to_string();
    let config = loader.config();

    // map the prefix through the path table; a bare result (no slash)
    // falls back to the configured plugin directory
    let mut prefix_path = loader.matcher().resolve_path(&prefix, None);
    if !prefix_path.contains('/') {
        prefix_path = loader
            .matcher()
            .resolve_path(&join_path(&config.plugin_path, &prefix_path), None);
    }

    // the plugin itself is an ordinary module
    let (plugin_cell, created) = loader.registry().get_or_create(&prefix, &loader.scheduler());
    if created {
        plugin_cell.set_url(resolve_url(
            &prefix_path,
            &config.base_url,
            Some(&config.default_ext),
        ));
        plugin_cell.set_base_name(prefix_path);
        loader.fetch_resource(&plugin_cell);
    }

    // the requester's deferred; chained onto the canonical definition
    // once the plugin has told us the canonical name
    let requested: Deferred<Value> = Deferred::new(loader.scheduler());

    let plugin_cfg = config.plugin_config(&prefix);
    let delegate_loader = loader.clone();
    let delegate_ctx = Arc::clone(ctx);
    let result = requested.clone();
    let out = requested.clone();

    plugin_cell.deferred.then(
        move |plugin_value| {
            let Some(plugin) = plugin_value.as_plugin().cloned() else {
                let _ = out.reject(LoadError::plugin(
                    &prefix,
                    "module export does not implement the plugin contract",
                ));
                return;
            };

            let base_name = delegate_ctx.base_name.clone();
            let absolutize = move |id: &str| normalize_name(id, &base_name);
            let normalized = plugin.normalize(&res_suffix, &absolutize, &plugin_cfg);
            let canonical = format!("{prefix}!{normalized}");
            debug!("plugin '{}' normalized '{}' to '{}'", prefix, res_suffix, canonical);

            // derived context: same base, URL resolution scoped to the prefix
            let scoped_ctx = delegate_loader
                .derive_ctx(&delegate_ctx.base_name, Some(prefix.clone()));
            let require = Require::new(scoped_ctx);

            // blank suffixes and dynamic plugins are never cached; every
            // reference re-invokes the plugin's load operation
            let cacheable = !normalized.is_empty() && !plugin.dynamic();
            let canonical_deferred = if cacheable {
                let (cell, created) = delegate_loader
                    .registry()
                    .get_or_create(&canonical, &delegate_loader.scheduler());
                if created {
                    let completion = Completion::new(cell.deferred.clone());
                    plugin.load(&normalized, require, completion, plugin_cfg);
                }
                cell.deferred.clone()
            } else {
                let detached: Deferred<Value> = Deferred::new(delegate_loader.scheduler());
                let completion = Completion::new(detached.clone());
                plugin.load(&normalized, require, completion, plugin_cfg);
                detached
            };

            let chained = out.clone();
            canonical_deferred.subscribe(move |outcome| match outcome {
                Ok(value) => {
                    let _ = chained.resolve(value);
                }
                Err(error) => {
                    let _ = chained.reject(error);
                }
            });
        },
        move |error| {
            // plugin module failed to load: every definition chained on
            // it rejects the same way
            let _ = requested.reject(error);
        },
    );

    result
}
