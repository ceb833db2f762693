// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Deferred-job scheduler
//!
//! Stands in for the host's task queue. All subscriber callbacks in the
//! engine run through here, never synchronously inside `resolve`/`reject`,
//! so callers never observe partial continuation stacks.

use parking_lot::Mutex;
use std::collections::VecDeque;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// FIFO queue of deferred jobs.
///
/// The engine assumes a single logical thread of control: jobs are run by
/// whoever drives [`Scheduler::run_until_idle`], one at a time, in the
/// order they were scheduled. Jobs may schedule further jobs; those run
/// within the same drain.
pub struct Scheduler {
    queue: Mutex<VecDeque<Job>>,
}

impl Scheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue a job to run on the next drain
    pub fn schedule(&self, job: impl FnOnce() + Send + 'static) {
        self.queue.lock().push_back(Box::new(job));
    }

    /// Run queued jobs until the queue is empty, returning how many ran.
    ///
    /// Jobs run outside the queue lock, so a job is free to schedule more
    /// work; it is picked up before this call returns.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let job = self.queue.lock().pop_front();
            match job {
                Some(job) => {
                    job();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Number of queued jobs
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Check whether the queue is empty
    pub fn is_idle(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn runs_jobs_in_schedule_order() {
        let sched = Scheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let log = Arc::clone(&log);
            sched.schedule(move || log.lock().push(i));
        }

        assert_eq!(sched.run_until_idle(), 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert!(sched.is_idle());
    }

    #[test]
    fn jobs_scheduled_by_jobs_run_in_the_same_drain() {
        let sched = Arc::new(Scheduler::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner_sched = Arc::clone(&sched);
        let inner_log = Arc::clone(&log);
        sched.schedule(move || {
            inner_log.lock().push("outer");
            let log = Arc::clone(&inner_log);
            inner_sched.schedule(move || log.lock().push("inner"));
        });

        assert_eq!(sched.run_until_idle(), 2);
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }
}
