// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Text loader plugin
//!
//! Loads a resource as a plain string through an abstract text-fetch
//! collaborator; the engine side only resolves the URL and chains the
//! completion.

use std::sync::Arc;

use crate::config::PluginConfig;
use crate::error::Result;
use crate::loader::context::Require;
use crate::loader::plugin::{Completion, Plugin};
use crate::value::Value;

/// Host collaborator performing the actual text fetch
pub trait TextFetcher: Send + Sync {
    /// Fetch the text at `url`, delivering the outcome to `done`
    fn fetch_text(&self, url: &str, done: Box<dyn FnOnce(Result<String>) + Send>);
}

/// The `text!` plugin: resolves a resource to a URL and exports its
/// contents as a string value.
pub struct TextPlugin {
    fetcher: Arc<dyn TextFetcher>,
}

impl TextPlugin {
    /// Create the plugin over a text-fetch collaborator
    pub fn new(fetcher: Arc<dyn TextFetcher>) -> Self {
        Self { fetcher }
    }
}

impl Plugin for TextPlugin {
    fn load(&self, resource: &str, require: Require, completion: Completion, _config: PluginConfig) {
        let url = require.to_url(&name_with_ext(resource, "html"));
        self.fetcher.fetch_text(
            &url,
            Box::new(move |outcome| match outcome {
                Ok(text) => {
                    let _ = completion.resolve(Value::String(text));
                }
                Err(error) => {
                    let _ = completion.reject(error);
                }
            }),
        );
    }
}

// a name whose last dot sits at or before its last slash has no extension
fn name_with_ext(name: &str, default_ext: &str) -> String {
    let dot = name.rfind('.').map_or(-1, |i| i as isize);
    let slash = name.rfind('/').map_or(-1, |i| i as isize);
    if dot <= slash {
        format!("{name}.{default_ext}")
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::LoadError;
    use crate::loader::{DefineCall, Loader};
    use crate::transport::MemoryTransport;
    use parking_lot::Mutex;

    struct MemoryTextFetcher {
        texts: Mutex<std::collections::HashMap<String, String>>,
    }

    impl MemoryTextFetcher {
        fn new(entries: &[(&str, &str)]) -> Arc<Self> {
            Arc::new(Self {
                texts: Mutex::new(
                    entries
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
            })
        }
    }

    impl TextFetcher for MemoryTextFetcher {
        fn fetch_text(&self, url: &str, done: Box<dyn FnOnce(Result<String>) + Send>) {
            match self.texts.lock().get(url) {
                Some(text) => done(Ok(text.clone())),
                None => done(Err(LoadError::transport(url))),
            }
        }
    }

    #[test]
    fn default_extension_applies_only_without_one() {
        assert_eq!(name_with_ext("tmpl/greeting", "html"), "tmpl/greeting.html");
        assert_eq!(name_with_ext("tmpl/greeting.txt", "html"), "tmpl/greeting.txt");
        assert_eq!(name_with_ext("v1.2/note", "html"), "v1.2/note.html");
    }

    #[test]
    fn loads_text_through_the_plugin_contract() {
        let fetcher = MemoryTextFetcher::new(&[("tmpl/greeting.html", "<p>hi</p>")]);
        let transport = Arc::new(MemoryTransport::new());
        let loader = Loader::new(Config::default(), transport);

        loader
            .define(
                None,
                DefineCall::named("text").value(Value::Plugin(Arc::new(TextPlugin::new(fetcher)))),
            )
            .unwrap();

        let handle = loader.request(&["text!tmpl/greeting"]);
        loader.run_until_idle();

        assert_eq!(
            handle.deferred().peek(),
            Some(Ok(vec![Value::string("<p>hi</p>")]))
        );
    }
}
