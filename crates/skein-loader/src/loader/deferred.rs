// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Single-resolution deferred value
//!
//! The foundation for everything async in the engine: one completion,
//! many subscribers, callbacks always delivered through the scheduler.

use parking_lot::Mutex;
use std::mem;
use std::sync::Arc;

use crate::error::{LoadError, Result};
use crate::scheduler::Scheduler;

type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

enum State<T> {
    Pending(Vec<Callback<T>>),
    Settled(Result<T>),
}

/// A single-resolution future with multi-subscriber callback registration.
///
/// `resolve` and `reject` are each callable at most once across the pair;
/// a second call fails with [`LoadError::AlreadyCompleted`] and does not
/// disturb the recorded outcome. Subscribers run in registration order,
/// always via the scheduler, never synchronously inside the completing
/// call. Subscribers registered after completion are scheduled immediately
/// with the recorded outcome. There is no cancellation.
pub struct Deferred<T> {
    state: Arc<Mutex<State<T>>>,
    scheduler: Arc<Scheduler>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            scheduler: Arc::clone(&self.scheduler),
        }
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Create a pending deferred bound to a scheduler
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::Pending(Vec::new()))),
            scheduler,
        }
    }

    /// Complete with a value.
    ///
    /// Fails fast with [`LoadError::AlreadyCompleted`] if the deferred has
    /// already settled; this is how duplicate-definition bugs surface
    /// early instead of silently racing.
    pub fn resolve(&self, value: T) -> Result<()> {
        self.settle(Ok(value))
    }

    /// Complete with an error. Same at-most-once contract as `resolve`.
    pub fn reject(&self, error: LoadError) -> Result<()> {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Result<T>) -> Result<()> {
        let subscribers = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Settled(_) => return Err(LoadError::AlreadyCompleted),
                State::Pending(subs) => {
                    let subs = mem::take(subs);
                    *state = State::Settled(outcome.clone());
                    subs
                }
            }
        };
        for callback in subscribers {
            let outcome = outcome.clone();
            self.scheduler.schedule(move || callback(outcome));
        }
        Ok(())
    }

    /// Register a callback for the outcome.
    ///
    /// Never blocks. The callback fires exactly once, on a scheduler
    /// drain, whether the deferred settles later or has settled already.
    pub fn subscribe(&self, callback: impl FnOnce(Result<T>) + Send + 'static) {
        let settled = {
            let mut state = self.state.lock();
            match &mut *state {
                State::Pending(subs) => {
                    subs.push(Box::new(callback));
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        self.scheduler.schedule(move || callback(settled));
    }

    /// Register a resolved/rejected callback pair
    pub fn then(
        &self,
        on_resolved: impl FnOnce(T) + Send + 'static,
        on_rejected: impl FnOnce(LoadError) + Send + 'static,
    ) {
        self.subscribe(move |outcome| match outcome {
            Ok(value) => on_resolved(value),
            Err(error) => on_rejected(error),
        });
    }

    /// Snapshot the outcome if the deferred has settled
    pub fn peek(&self) -> Option<Result<T>> {
        match &*self.state.lock() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// Check whether the deferred has settled
    pub fn is_settled(&self) -> bool {
        matches!(&*self.state.lock(), State::Settled(_))
    }

    /// Bridge into the futures world.
    ///
    /// The returned future completes once the outcome has been delivered
    /// through the scheduler, so the host still has to drive the drain.
    pub fn wait(&self) -> impl std::future::Future<Output = Result<T>> + Send + use<T> {
        let (tx, rx) = futures::channel::oneshot::channel();
        self.subscribe(move |outcome| {
            let _ = tx.send(outcome);
        });
        async move {
            rx.await
                .map_err(|_| LoadError::Generic("loader session ended".to_string()))?
        }
    }
}
