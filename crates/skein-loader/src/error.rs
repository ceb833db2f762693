// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the loader engine

use thiserror::Error;

/// Result type for loader operations
pub type Result<T> = std::result::Result<T, LoadError>;

/// Errors that can occur while resolving and loading modules.
///
/// The type is `Clone` because a single failure fans out to every
/// subscriber of the owning resource definition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LoadError {
    /// The transport could not fetch or evaluate the resource
    #[error("script error or http error: {0}")]
    Transport(String),

    /// A fetch completed without any module declaration
    #[error("no module declaration found in {0}")]
    DeclarationNotFound(String),

    /// More than one anonymous declaration arrived for one fetch
    #[error("multiple anonymous declarations found in {0}")]
    MultipleAnonymous(String),

    /// An anonymous declaration arrived with no fetch token to match it to
    #[error("anonymous declaration outside of a fetch")]
    AnonymousOutsideFetch,

    /// `resolve` or `reject` was called on an already-completed deferred
    #[error("deferred already completed")]
    AlreadyCompleted,

    /// Synchronous `require` for a module that has not resolved yet
    #[error("module is not already resolved: {0}")]
    NotResolved(String),

    /// A module factory returned an error
    #[error("error defining module '{id}': {reason}")]
    Factory {
        /// Identifier of the module being defined
        id: String,
        /// Reason for failure
        reason: String,
    },

    /// A plugin module failed to load, or its export is not a plugin
    #[error("plugin '{prefix}' failed: {reason}")]
    Plugin {
        /// Plugin prefix
        prefix: String,
        /// Reason for failure
        reason: String,
    },

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

impl LoadError {
    /// Create a transport error
    pub fn transport(url: impl Into<String>) -> Self {
        Self::Transport(url.into())
    }

    /// Create a factory error
    pub fn factory(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Factory {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a plugin error
    pub fn plugin(prefix: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Plugin {
            prefix: prefix.into(),
            reason: reason.into(),
        }
    }
}
