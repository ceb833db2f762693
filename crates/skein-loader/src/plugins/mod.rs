// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Built-in loader plugins
//!
//! Plugins are ordinary modules; the ones here only need a host
//! collaborator for the actual I/O and can be registered with a named
//! declaration exporting [`crate::value::Value::Plugin`].

pub mod text;

pub use text::{TextFetcher, TextPlugin};
