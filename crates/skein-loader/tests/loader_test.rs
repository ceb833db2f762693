//! Loader engine integration tests
//!
//! Drives the engine end to end over in-memory transports, including the
//! interleavings the registry and graph resolver have to get right:
//! coalesced fetches, out-of-order completion, declaration protocol
//! violations, and plugin delegation.

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use skein_loader::loader::Require;
use skein_loader::transport::FetchRequest;
use skein_loader::{
    Completion, Config, DefineCall, FetchToken, LoadError, Loader, MemoryTransport, Plugin,
    PluginConfig, Result, Transport, Value,
};

/// Transport that parks every fetch until the test completes it, so
/// completion order is under test control.
struct ManualTransport {
    pending: Mutex<Vec<(FetchRequest, Completion<()>)>>,
}

impl ManualTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(Vec::new()),
        })
    }

    fn pending_urls(&self) -> Vec<String> {
        self.pending
            .lock()
            .iter()
            .map(|(request, _)| request.url.clone())
            .collect()
    }

    fn complete(
        &self,
        url: &str,
        loader: &Loader,
        script: impl FnOnce(&Loader, FetchToken) -> Result<()>,
    ) {
        let entry = {
            let mut pending = self.pending.lock();
            let index = pending
                .iter()
                .position(|(request, _)| request.url == url)
                .unwrap_or_else(|| panic!("no pending fetch for {url}"));
            pending.remove(index)
        };
        let (request, done) = entry;
        match script(loader, request.token) {
            Ok(()) => done.resolve(()).unwrap(),
            Err(error) => done.reject(error).unwrap(),
        }
    }

    fn fail(&self, url: &str) {
        let entry = {
            let mut pending = self.pending.lock();
            let index = pending
                .iter()
                .position(|(request, _)| request.url == url)
                .unwrap_or_else(|| panic!("no pending fetch for {url}"));
            pending.remove(index)
        };
        let (request, done) = entry;
        done.reject(LoadError::transport(&request.url)).unwrap();
    }
}

impl Transport for ManualTransport {
    fn fetch(&self, _loader: &Loader, request: FetchRequest, done: Completion<()>) {
        self.pending.lock().push((request, done));
    }
}

fn outcome(handle: &skein_loader::RequestHandle) -> Result<Vec<Value>> {
    handle
        .deferred()
        .peek()
        .expect("request should have settled")
}

#[test]
fn concurrent_requests_for_one_identifier_share_one_fetch() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_source("shared/mod.js", |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::Number(1.0)),
        )
    });

    let loader = Loader::new(Config::default(), transport.clone());
    let first = loader.request(&["shared/mod"]);
    let second = loader.request(&["shared/mod"]);
    loader.run_until_idle();

    assert_eq!(transport.fetch_log(), vec!["shared/mod.js"]);
    assert_eq!(outcome(&first).unwrap(), vec![Value::Number(1.0)]);
    assert_eq!(outcome(&second).unwrap(), vec![Value::Number(1.0)]);
}

#[test]
fn empty_dependency_list_resolves_without_fetching() {
    let transport = Arc::new(MemoryTransport::new());
    let loader = Loader::new(Config::default(), transport.clone());

    let handle = loader.request(&[]);
    loader.run_until_idle();

    assert_eq!(outcome(&handle).unwrap(), Vec::<Value>::new());
    assert!(transport.fetch_log().is_empty());
}

#[test]
fn aggregate_values_preserve_input_order_not_arrival_order() {
    let transport = ManualTransport::new();
    let loader = Loader::new(Config::default(), transport.clone());

    let handle = loader.request(&["x", "y"]);
    loader.run_until_idle();
    assert_eq!(transport.pending_urls(), vec!["x.js", "y.js"]);

    // y arrives first; the result list still reads [x, y]
    transport.complete("y.js", &loader, |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::string("y")),
        )
    });
    loader.run_until_idle();
    assert!(handle.deferred().peek().is_none());

    transport.complete("x.js", &loader, |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::string("x")),
        )
    });
    loader.run_until_idle();

    assert_eq!(
        outcome(&handle).unwrap(),
        vec![Value::string("x"), Value::string("y")]
    );
}

#[test]
fn second_anonymous_declaration_rejects_the_fetch() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_source("bad.js", |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::Number(1.0)),
        )?;
        // a second anonymous declaration poisons the fetch; evaluation
        // itself carries on
        let _ = loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::Number(2.0)),
        );
        Ok(())
    });

    let loader = Loader::new(Config::default(), transport);
    let handle = loader.request(&["bad"]);
    loader.run_until_idle();

    assert_eq!(
        outcome(&handle),
        Err(LoadError::MultipleAnonymous("bad.js".to_string()))
    );
}

#[test]
fn fetch_without_any_declaration_rejects() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_source("empty.js", |_loader, _token| Ok(()));

    let loader = Loader::new(Config::default(), transport);
    let handle = loader.request(&["empty"]);
    loader.run_until_idle();

    assert_eq!(
        outcome(&handle),
        Err(LoadError::DeclarationNotFound("empty.js".to_string()))
    );
}

#[test]
fn transport_failure_rejects_every_requester() {
    let transport = Arc::new(MemoryTransport::new());
    let loader = Loader::new(Config::default(), transport);

    let first = loader.request(&["missing/mod"]);
    let second = loader.request(&["missing/mod"]);
    loader.run_until_idle();

    let expected = Err(LoadError::transport("missing/mod.js"));
    assert_eq!(outcome(&first), expected);
    assert_eq!(outcome(&second), expected);
}

#[test]
fn dependency_failure_short_circuits_without_killing_siblings() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_source("good.js", |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::string("good")),
        )
    });

    let loader = Loader::new(Config::default(), transport.clone());
    let handle = loader.request(&["good", "absent"]);
    loader.run_until_idle();

    assert_eq!(outcome(&handle), Err(LoadError::transport("absent.js")));

    // the sibling settled in the registry; a later request reuses it
    let again = loader.request(&["good"]);
    loader.run_until_idle();
    assert_eq!(outcome(&again).unwrap(), vec![Value::string("good")]);
    assert_eq!(transport.fetch_log(), vec!["good.js", "absent.js"]);
}

#[test]
fn relative_dependencies_resolve_against_the_requesting_module() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_source("app/main.js", |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous()
                .deps(&["./greeting"])
                .factory(1, |deps| Ok(deps[0].clone())),
        )
    });
    transport.add_source("app/greeting.js", |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::string("hello")),
        )
    });

    let loader = Loader::new(Config::default(), transport.clone());
    let handle = loader.request(&["app/main"]);
    loader.run_until_idle();

    assert_eq!(outcome(&handle).unwrap(), vec![Value::string("hello")]);
    assert_eq!(
        transport.fetch_log(),
        vec!["app/main.js", "app/greeting.js"]
    );
}

#[test]
fn path_rules_and_base_url_shape_the_fetched_location() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_source(
        "https://cdn.example/third_party/js/lib.js",
        |loader, token| {
            loader.define(
                Some(token),
                DefineCall::anonymous().value(Value::Bool(true)),
            )
        },
    );

    let config = Config {
        base_url: "https://cdn.example".to_string(),
        paths: [("vendor".to_string(), "third_party/js".to_string())].into(),
        ..Config::default()
    };
    let loader = Loader::new(config, transport.clone());
    let handle = loader.request(&["vendor/lib"]);
    loader.run_until_idle();

    assert_eq!(outcome(&handle).unwrap(), vec![Value::Bool(true)]);
    assert_eq!(
        transport.fetch_log(),
        vec!["https://cdn.example/third_party/js/lib.js"]
    );
}

#[test]
fn named_declaration_resolves_without_a_fetch() {
    let transport = Arc::new(MemoryTransport::new());
    let loader = Loader::new(Config::default(), transport.clone());

    loader
        .define(
            None,
            DefineCall::named("config/settings").value(Value::string("prefilled")),
        )
        .unwrap();

    let handle = loader.request(&["config/settings"]);
    loader.run_until_idle();

    assert_eq!(outcome(&handle).unwrap(), vec![Value::string("prefilled")]);
    assert!(transport.fetch_log().is_empty());
}

#[test]
fn positional_factory_without_deps_gets_the_commonjs_triple() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_source("app/info.js", |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().factory(3, |deps| {
                assert!(matches!(deps[0], Value::Require(_)));
                let exports = match &deps[1] {
                    Value::Exports(cell) => cell.clone(),
                    other => panic!("expected exports cell, got {other:?}"),
                };
                exports.insert("answer", Value::Number(42.0));
                // module binding carries the identifier and uri
                match &deps[2] {
                    Value::Object(module) => {
                        assert_eq!(module.get("id"), Some(&Value::string("app/info")));
                        assert_eq!(module.get("uri"), Some(&Value::string("app/info")));
                    }
                    other => panic!("expected module object, got {other:?}"),
                }
                Ok(Value::Undefined)
            }),
        )
    });

    let loader = Loader::new(Config::default(), transport);
    let handle = loader.request(&["app/info"]);
    loader.run_until_idle();

    let values = outcome(&handle).unwrap();
    match &values[0] {
        Value::Exports(cell) => assert_eq!(cell.get("answer"), Some(Value::Number(42.0))),
        other => panic!("expected the exports cell as the module value, got {other:?}"),
    }
}

#[test]
fn synchronous_require_serves_cached_values_only() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_source("cfg/data.js", |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::Number(7.0)),
        )
    });
    transport.add_source("app/user.js", |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous()
                .deps(&["require", "cfg/data"])
                .factory(2, |deps| {
                    let require = deps[0].as_require().cloned().expect("require binding");
                    assert_eq!(require.sync("cfg/data"), Ok(Value::Number(7.0)));
                    assert_eq!(
                        require.sync("never/loaded"),
                        Err(LoadError::NotResolved("never/loaded".to_string()))
                    );
                    Ok(Value::Bool(true))
                }),
        )
    });

    let loader = Loader::new(Config::default(), transport);
    let handle = loader.request(&["app/user"]);
    loader.run_until_idle();

    assert_eq!(outcome(&handle).unwrap(), vec![Value::Bool(true)]);
}

struct CanonPlugin {
    loads: AtomicUsize,
    dynamic: bool,
}

impl CanonPlugin {
    fn new(dynamic: bool) -> Arc<Self> {
        Arc::new(Self {
            loads: AtomicUsize::new(0),
            dynamic,
        })
    }
}

impl Plugin for CanonPlugin {
    fn load(
        &self,
        resource: &str,
        _require: Require,
        completion: Completion,
        _config: PluginConfig,
    ) {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let _ = completion.resolve(Value::string(format!("loaded:{resource}")));
    }

    fn normalize(
        &self,
        _resource: &str,
        _absolutize: &dyn Fn(&str) -> String,
        _config: &PluginConfig,
    ) -> String {
        "CANON".to_string()
    }

    fn dynamic(&self) -> bool {
        self.dynamic
    }
}

#[test]
fn plugin_normalization_coalesces_spellings_under_the_canonical_name() {
    let plugin = CanonPlugin::new(false);
    let transport = Arc::new(MemoryTransport::new());
    let loader = Loader::new(Config::default(), transport);
    loader
        .define(
            None,
            DefineCall::named("list").value(Value::Plugin(plugin.clone())),
        )
        .unwrap();

    let first = loader.request(&["list!a"]);
    loader.run_until_idle();
    let second = loader.request(&["list!b"]);
    loader.run_until_idle();

    assert_eq!(plugin.loads.load(Ordering::SeqCst), 1);
    assert_eq!(outcome(&first).unwrap(), vec![Value::string("loaded:CANON")]);
    assert_eq!(outcome(&second).unwrap(), vec![Value::string("loaded:CANON")]);
    assert!(loader.cache_keys().contains(&"list!CANON".to_string()));
    assert!(!loader.cache_keys().contains(&"list!a".to_string()));
}

#[test]
fn dynamic_plugin_resources_are_loaded_on_every_reference() {
    let plugin = CanonPlugin::new(true);
    let transport = Arc::new(MemoryTransport::new());
    let loader = Loader::new(Config::default(), transport);
    loader
        .define(
            None,
            DefineCall::named("now").value(Value::Plugin(plugin.clone())),
        )
        .unwrap();

    let first = loader.request(&["now!tick"]);
    loader.run_until_idle();
    let second = loader.request(&["now!tick"]);
    loader.run_until_idle();

    assert_eq!(plugin.loads.load(Ordering::SeqCst), 2);
    assert!(outcome(&first).is_ok());
    assert!(outcome(&second).is_ok());
}

#[test]
fn plugin_module_failure_rejects_everything_chained_on_it() {
    // the plugin prefix maps nowhere; its own fetch fails
    let transport = Arc::new(MemoryTransport::new());
    let loader = Loader::new(Config::default(), transport);

    let first = loader.request(&["missing!a"]);
    let second = loader.request(&["missing!b"]);
    loader.run_until_idle();

    let expected = Err(LoadError::transport("skein/plugin/missing.js"));
    assert_eq!(outcome(&first), expected);
    assert_eq!(outcome(&second), expected);
}

#[test]
fn next_sequences_a_request_after_the_previous_one_resolves() {
    let transport = ManualTransport::new();
    let loader = Loader::new(Config::default(), transport.clone());

    let first = loader.request(&["a"]);
    let chained = first.next(&["b"]);
    loader.run_until_idle();

    // b is not even fetched until a resolves
    assert_eq!(transport.pending_urls(), vec!["a.js"]);

    transport.complete("a.js", &loader, |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::Number(1.0)),
        )
    });
    loader.run_until_idle();
    assert_eq!(transport.pending_urls(), vec!["b.js"]);

    transport.complete("b.js", &loader, |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::Number(2.0)),
        )
    });
    loader.run_until_idle();

    assert_eq!(outcome(&chained).unwrap(), vec![Value::Number(2.0)]);
}

#[test]
fn next_propagates_failure_down_the_chain() {
    let transport = ManualTransport::new();
    let loader = Loader::new(Config::default(), transport.clone());

    let first = loader.request(&["a"]);
    let chained = first.next(&["b"]);
    loader.run_until_idle();

    transport.fail("a.js");
    loader.run_until_idle();

    assert_eq!(outcome(&chained), Err(LoadError::transport("a.js")));
    assert!(transport.pending_urls().is_empty());
}

#[tokio::test]
async fn requests_can_be_awaited_on_a_runtime() {
    let transport = Arc::new(MemoryTransport::new());
    transport.add_source("async/mod.js", |loader, token| {
        loader.define(
            Some(token),
            DefineCall::anonymous().value(Value::string("bridged")),
        )
    });

    let loader = Loader::new(Config::default(), transport);
    let handle = loader.request(&["async/mod"]);
    let pending = handle.wait();
    loader.run_until_idle();

    assert_eq!(pending.await.unwrap(), vec![Value::string("bridged")]);
}
