// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The module-export value model

use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::loader::context::Require;
use crate::loader::plugin::Plugin;

/// A module's exported value.
///
/// Modules exchange values through the registry, so the type has to cover
/// both plain data and the capabilities the engine injects into factory
/// scopes (`require`, the live exports cell) as well as plugin exports.
#[derive(Clone, Default)]
pub enum Value {
    /// No value; a factory returning this falls back to its exports cell
    #[default]
    Undefined,
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Number
    Number(f64),
    /// String
    String(String),
    /// Ordered list of values
    Array(Vec<Value>),
    /// Keyed map of values
    Object(BTreeMap<String, Value>),
    /// Live exports cell shared with a factory's scope
    Exports(Exports),
    /// A scoped require capability
    Require(Require),
    /// A module implementing the plugin contract
    Plugin(Arc<dyn Plugin>),
    /// Opaque host value
    Native(Arc<dyn Any + Send + Sync>),
}

impl Value {
    /// Shorthand for a string value
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    /// Borrow the string content, if this is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the plugin export, if this is one
    pub fn as_plugin(&self) -> Option<&Arc<dyn Plugin>> {
        match self {
            Self::Plugin(p) => Some(p),
            _ => None,
        }
    }

    /// Borrow the require capability, if this is one
    pub fn as_require(&self) -> Option<&Require> {
        match self {
            Self::Require(r) => Some(r),
            _ => None,
        }
    }

    /// Check for `Undefined`
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            // Capability and opaque values compare by identity
            (Self::Exports(a), Self::Exports(b)) => Arc::ptr_eq(&a.0, &b.0),
            (Self::Plugin(a), Self::Plugin(b)) => Arc::ptr_eq(a, b),
            (Self::Native(a), Self::Native(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "Undefined"),
            Self::Null => write!(f, "Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Number(n) => write!(f, "Number({n})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Array(a) => f.debug_tuple("Array").field(a).finish(),
            Self::Object(o) => f.debug_tuple("Object").field(o).finish(),
            Self::Exports(e) => f.debug_tuple("Exports").field(&e.snapshot()).finish(),
            Self::Require(_) => write!(f, "Require"),
            Self::Plugin(_) => write!(f, "Plugin"),
            Self::Native(_) => write!(f, "Native"),
        }
    }
}

/// A shared, mutable exports cell.
///
/// One cell is created per definition site and injected as the reserved
/// `exports` binding; the `module` binding carries the same cell, so
/// mutations through either are visible to every holder.
#[derive(Clone, Default)]
pub struct Exports(Arc<Mutex<BTreeMap<String, Value>>>);

impl Exports {
    /// Create an empty exports cell
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an exported entry
    pub fn insert(&self, key: impl Into<String>, value: Value) {
        self.0.lock().insert(key.into(), value);
    }

    /// Look up an exported entry
    pub fn get(&self, key: &str) -> Option<Value> {
        self.0.lock().get(key).cloned()
    }

    /// Check whether nothing has been exported yet
    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }

    /// Copy the current contents out of the cell
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.0.lock().clone()
    }
}

impl fmt::Debug for Exports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Exports").field(&self.snapshot()).finish()
    }
}
