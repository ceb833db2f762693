// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Dependency graph resolver
//!
//! Resolves a list of declared dependency identifiers against a binding
//! context, concurrently, and settles an aggregate deferred exactly once:
//! with the values in input order when every element is bound, or with
//! the first error. Siblings of a failed dependency keep loading; their
//! eventual settlement is observed only by the registry.

use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;

use crate::loader::Loader;
use crate::loader::context::BindingContext;
use crate::loader::deferred::Deferred;
use crate::value::Value;

struct Aggregate {
    slots: Vec<Value>,
    remaining: usize,
    // guards against double completion when a dependency settles
    // synchronously during the registration sweep
    completed: bool,
}

pub(crate) fn resolve_deps(
    loader: &Loader,
    names: &[String],
    ctx: &Arc<BindingContext>,
) -> Deferred<Vec<Value>> {
    let aggregate_deferred: Deferred<Vec<Value>> = Deferred::new(loader.scheduler());

    let mut pending = Vec::new();
    let mut slots = vec![Value::Undefined; names.len()];

    // reserved bindings bind synchronously and never touch the registry
    for (index, name) in names.iter().enumerate() {
        match ctx.reserved(name) {
            Some(value) => slots[index] = value,
            None => pending.push((index, name.clone())),
        }
    }

    let aggregate = Arc::new(Mutex::new(Aggregate {
        slots,
        remaining: pending.len(),
        completed: false,
    }));

    for (index, name) in pending {
        let dep = loader.fetch_dep(&name, ctx);
        let aggregate = Arc::clone(&aggregate);
        let out = aggregate_deferred.clone();
        dep.subscribe(move |outcome| {
            let mut agg = aggregate.lock();
            if agg.completed {
                return;
            }
            match outcome {
                Ok(value) => {
                    agg.slots[index] = value;
                    agg.remaining -= 1;
                    if agg.remaining == 0 {
                        agg.completed = true;
                        let values = mem::take(&mut agg.slots);
                        drop(agg);
                        let _ = out.resolve(values);
                    }
                }
                Err(error) => {
                    // first failure wins; do not wait for siblings
                    agg.completed = true;
                    drop(agg);
                    let _ = out.reject(error);
                }
            }
        });
    }

    // nothing left to fetch (empty or all-reserved list), and nothing
    // settled synchronously above us
    {
        let mut agg = aggregate.lock();
        if agg.remaining == 0 && !agg.completed {
            agg.completed = true;
            let values = mem::take(&mut agg.slots);
            drop(agg);
            let _ = aggregate_deferred.resolve(values);
        }
    }

    aggregate_deferred
}
