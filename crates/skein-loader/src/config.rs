// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Loader configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flattened option set handed to a plugin's `load` operation.
pub type PluginConfig = BTreeMap<String, serde_json::Value>;

/// Configuration for a loader session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root for relative URL construction
    pub base_url: String,

    /// Extension appended when a resolved path carries no query marker
    pub default_ext: String,

    /// Directory searched for bare plugin prefixes
    pub plugin_path: String,

    /// Prefix to replacement-path rules
    pub paths: BTreeMap<String, String>,

    /// Prefix to package-descriptor rules
    pub packages: BTreeMap<String, PackageSpec>,

    /// Global options visible to every plugin
    pub options: PluginConfig,

    /// Per-prefix option overlays for plugins
    pub plugins: BTreeMap<String, PluginConfig>,

    /// Enable development aides (cache introspection)
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            default_ext: ".js".to_string(),
            plugin_path: "skein/plugin".to_string(),
            paths: BTreeMap::new(),
            packages: BTreeMap::new(),
            options: PluginConfig::new(),
            plugins: BTreeMap::new(),
            debug: false,
        }
    }
}

impl Config {
    /// Effective configuration for one plugin prefix.
    ///
    /// Plugin-specific values shadow global ones; untouched global keys
    /// stay visible. The merge is flattened up front rather than kept as
    /// a live fallback chain.
    pub fn plugin_config(&self, prefix: &str) -> PluginConfig {
        let mut merged = self.options.clone();
        if let Some(overrides) = self.plugins.get(prefix) {
            for (key, value) in overrides {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// A package rule: either a bare location shorthand or a full descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PackageSpec {
    /// Location shorthand; expands to `main: "./lib/main"`, `lib: "./lib"`
    Location(String),
    /// Full descriptor
    Descriptor {
        /// Override for the prefix this rule is keyed under
        #[serde(default)]
        name: Option<String>,
        /// Package location
        #[serde(default)]
        path: Option<String>,
        /// Sub-identifier substituted when the package itself is named
        #[serde(default)]
        main: Option<String>,
        /// Sub-path substituted as the root for sub-identifiers
        #[serde(default)]
        lib: Option<String>,
    },
}
