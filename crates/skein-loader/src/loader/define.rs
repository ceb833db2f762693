// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module declarations and the definition matcher
//!
//! A fetched resource declares itself by handing the loader a
//! [`DefineCall`]. Named declarations go straight to the registry; an
//! anonymous declaration is captured in a single slot keyed by the fetch
//! token the transport minted, and consumed when that fetch completes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{LoadError, Result};
use crate::value::Value;

/// Factory body invoked with the resolved dependency values
pub type FactoryFn = Box<dyn FnOnce(Vec<Value>) -> Result<Value> + Send + 'static>;

/// What a declaration produces once its dependencies are satisfied.
pub enum Factory {
    /// A literal export value; declared dependencies are still loaded
    Literal(Value),
    /// A factory function
    Function {
        /// The body, run exactly once
        run: FactoryFn,
        /// Number of positional parameters the body expects. Drives the
        /// synchronous-export inference when no dependency list is given.
        arity: usize,
    },
}

/// One module declaration: optional identifier, optional dependency
/// list, and the factory or literal export.
pub struct DefineCall {
    /// Identifier, when the declaration names itself
    pub id: Option<String>,
    /// Declared dependency identifiers
    pub deps: Option<Vec<String>>,
    /// Factory or literal export
    pub factory: Factory,
}

impl DefineCall {
    /// Start an anonymous declaration
    pub fn anonymous() -> DefineCallBuilder {
        DefineCallBuilder { id: None, deps: None }
    }

    /// Start a named declaration
    pub fn named(id: impl Into<String>) -> DefineCallBuilder {
        DefineCallBuilder {
            id: Some(id.into()),
            deps: None,
        }
    }

    /// The dependency list to resolve for this declaration.
    ///
    /// A factory taking at least one positional parameter with no
    /// explicit dependency list is treated as expecting the reserved
    /// `(require, exports, module)` triple, for compatibility with the
    /// synchronous-export calling convention.
    pub fn effective_deps(&self) -> Vec<String> {
        match (&self.deps, &self.factory) {
            (Some(deps), _) => deps.clone(),
            (None, Factory::Function { arity, .. }) if *arity > 0 => {
                vec![
                    "require".to_string(),
                    "exports".to_string(),
                    "module".to_string(),
                ]
            }
            _ => Vec::new(),
        }
    }
}

/// Builder for [`DefineCall`]
pub struct DefineCallBuilder {
    id: Option<String>,
    deps: Option<Vec<String>>,
}

impl DefineCallBuilder {
    /// Declare the dependency list
    pub fn deps(mut self, deps: &[&str]) -> Self {
        self.deps = Some(deps.iter().map(|d| d.to_string()).collect());
        self
    }

    /// Finish with a literal export value
    pub fn value(self, value: Value) -> DefineCall {
        DefineCall {
            id: self.id,
            deps: self.deps,
            factory: Factory::Literal(value),
        }
    }

    /// Finish with a factory of the given positional arity
    pub fn factory(
        self,
        arity: usize,
        run: impl FnOnce(Vec<Value>) -> Result<Value> + Send + 'static,
    ) -> DefineCall {
        DefineCall {
            id: self.id,
            deps: self.deps,
            factory: Factory::Function {
                run: Box::new(run),
                arity,
            },
        }
    }
}

/// Correlates an in-flight fetch with the declarations it produces.
///
/// The transport mints a token at fetch start and retires it at fetch
/// end; anonymous declarations in between land in the token's slot. This
/// replaces ambient currently-executing-script sniffing with an explicit
/// handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FetchToken(u64);

pub(crate) enum Slot {
    Empty,
    Captured(DefineCall),
    /// A second anonymous declaration arrived; the fetch is poisoned
    Violated,
}

pub(crate) struct DefinitionMatcher {
    next_token: AtomicU64,
    slots: Mutex<HashMap<FetchToken, (String, Slot)>>,
}

impl DefinitionMatcher {
    pub(crate) fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a token for a fetch starting against `url`
    pub(crate) fn begin_fetch(&self, url: &str) -> FetchToken {
        let token = FetchToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.slots.lock().insert(token, (url.to_string(), Slot::Empty));
        token
    }

    /// Capture an anonymous declaration for the given fetch
    pub(crate) fn capture(&self, token: FetchToken, call: DefineCall) -> Result<()> {
        let mut slots = self.slots.lock();
        match slots.get_mut(&token) {
            None => Err(LoadError::AnonymousOutsideFetch),
            Some((url, slot)) => {
                if matches!(slot, Slot::Empty) {
                    *slot = Slot::Captured(call);
                    Ok(())
                } else {
                    *slot = Slot::Violated;
                    Err(LoadError::MultipleAnonymous(url.clone()))
                }
            }
        }
    }

    /// Retire the token at fetch end, yielding whatever was captured
    pub(crate) fn finish_fetch(&self, token: FetchToken) -> Slot {
        self.slots
            .lock()
            .remove(&token)
            .map_or(Slot::Empty, |(_, slot)| slot)
    }
}
