// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # skein-loader
//!
//! An asynchronous module-loader engine: given a symbolic module
//! identifier, it resolves the identifier to a loadable location,
//! fetches it through a pluggable transport, matches the definitions the
//! fetched content declares, resolves their dependencies recursively and
//! hands back the exported values, without blocking the calling thread.
//!
//! The engine is the dependency-resolution core only. The environment
//! that actually fetches and evaluates source sits behind the
//! [`transport::Transport`] trait; identifier prefixes of the form
//! `prefix!resource` delegate loading semantics to plugin modules.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use skein_loader::{Config, DefineCall, Loader, MemoryTransport, Value};
//!
//! let transport = Arc::new(MemoryTransport::new());
//! transport.add_source("app/main.js", |loader, token| {
//!     loader.define(
//!         Some(token),
//!         DefineCall::anonymous()
//!             .deps(&["app/greeting"])
//!             .factory(1, |deps| Ok(deps[0].clone())),
//!     )
//! });
//! transport.add_source("app/greeting.js", |loader, token| {
//!     loader.define(
//!         Some(token),
//!         DefineCall::anonymous().value(Value::string("hello")),
//!     )
//! });
//!
//! let loader = Loader::new(Config::default(), transport);
//! let handle = loader.request(&["app/main"]);
//! loader.run_until_idle();
//!
//! assert_eq!(
//!     handle.deferred().peek(),
//!     Some(Ok(vec![Value::string("hello")]))
//! );
//! ```
//!
//! ## Concurrency model
//!
//! One logical thread of control: all asynchrony is deferred-callback
//! scheduling on the session [`scheduler::Scheduler`], which the host
//! drains via [`loader::Loader::run_until_idle`]. Subscribers fire in
//! registration order; concurrent requests for one identifier coalesce
//! onto one registry cell, so exactly one fetch happens per identifier.
//! There is no cancellation and no timeout in the engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod loader;
pub mod plugins;
pub mod scheduler;
pub mod transport;
pub mod value;

// Re-exports
pub use config::{Config, PackageSpec, PluginConfig};
pub use error::{LoadError, Result};
pub use loader::{
    BindingContext, Completion, DefineCall, Deferred, FetchToken, Loader, Plugin, RequestHandle,
    Require,
};
pub use transport::{FetchRequest, MemoryTransport, Transport};
pub use value::{Exports, Value};

/// Version of the loader engine
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
