// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Per-definition binding context and the require capability

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{LoadError, Result};
use crate::loader::Loader;
use crate::loader::deferred::Deferred;
use crate::loader::resolver::normalize_name;
use crate::value::{Exports, Value};

/// Reserved binding names injected into dependency lists
pub const RESERVED_BINDINGS: [&str; 3] = ["require", "exports", "module"];

/// Per-load-site scope.
///
/// One context exists per module being defined. It carries the base
/// identifier for relative resolution, the exports cell, and (during
/// plugin delegation) the plugin prefix that scopes URL resolution.
pub struct BindingContext {
    /// Normalized identifier of the module this context belongs to
    /// (empty for a top-level request)
    pub id: String,
    /// Directory part of `id`, the base for relative dependencies
    pub base_name: String,
    /// Resolved URL of the module
    pub url: String,
    /// Plugin prefix overriding URL resolution, when delegating
    pub plugin_prefix: Option<String>,
    pub(crate) exports: Exports,
    pub(crate) loader: Loader,
}

impl BindingContext {
    /// Resolve a reserved binding name against this context.
    ///
    /// Reserved bindings bind synchronously and never touch the registry.
    pub fn reserved(self: &Arc<Self>, name: &str) -> Option<Value> {
        match name {
            "require" => Some(Value::Require(Require::new(Arc::clone(self)))),
            "exports" => Some(Value::Exports(self.exports.clone())),
            "module" => {
                // CommonJS Modules 1.1.1 shape, with the live exports cell
                let module = BTreeMap::from([
                    ("id".to_string(), Value::string(&self.id)),
                    ("uri".to_string(), Value::string(&self.url)),
                    ("exports".to_string(), Value::Exports(self.exports.clone())),
                ]);
                Some(Value::Object(module))
            }
            _ => None,
        }
    }
}

/// Require capability scoped to one binding context.
///
/// Resolves identifiers to values: synchronously for already-resolved
/// ones, asynchronously otherwise. Plugins receive one of these scoped to
/// the requesting context.
#[derive(Clone)]
pub struct Require {
    ctx: Arc<BindingContext>,
}

impl Require {
    pub(crate) fn new(ctx: Arc<BindingContext>) -> Self {
        Self { ctx }
    }

    /// Synchronous r-value require.
    ///
    /// Returns the cached exported value, or
    /// [`LoadError::NotResolved`] when the identifier has not resolved
    /// yet (or was never requested).
    pub fn sync(&self, id: &str) -> Result<Value> {
        let normalized = normalize_name(id, &self.ctx.base_name);
        let resolved = self
            .ctx
            .loader
            .registry()
            .lookup(&normalized)
            .and_then(|cell| cell.deferred.peek());
        match resolved {
            Some(Ok(value)) => Ok(value),
            _ => Err(LoadError::NotResolved(normalized)),
        }
    }

    /// Asynchronously resolve a dependency list against this context
    pub fn resolve(&self, ids: &[&str]) -> Deferred<Vec<Value>> {
        let names: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.ctx.loader.resolve_deps_in(&self.ctx, &names)
    }

    /// Resolve an identifier to a URL without loading it.
    ///
    /// During plugin delegation the lookup is scoped to the plugin's
    /// prefix, so plugin-qualified path rules apply.
    pub fn to_url(&self, id: &str) -> String {
        self.ctx.loader.to_url_in(&self.ctx, id)
    }

    /// The context this capability is scoped to
    pub fn context(&self) -> &Arc<BindingContext> {
        &self.ctx
    }
}
