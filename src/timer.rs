// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Decode phase timing
//!
//! Decoding large traces is expensive, and knowing where the time went is
//! part of a session's diagnostics. A [`Timer`] accumulates named phase
//! durations, per session and per thread. Durations only ever grow; nothing
//! resets them, not even a storage refresh.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::Tid;


/// Accumulated phase timings of a session
#[derive(Debug, Default)]
pub struct Timer {
    process: TaskTimes,
    threads: BTreeMap<Tid, TaskTimes>,
}

impl Timer {
    /// Retrieve the session wide [`TaskTimes`] for recording
    pub fn process(&mut self) -> &mut TaskTimes {
        &mut self.process
    }

    /// Retrieve the [`TaskTimes`] of the given thread for recording
    pub fn thread(&mut self, tid: Tid) -> &mut TaskTimes {
        self.threads.entry(tid).or_default()
    }

    /// Retrieve the session wide [`TaskTimes`] for inspection
    pub fn process_times(&self) -> &TaskTimes {
        &self.process
    }

    /// Retrieve the [`TaskTimes`] of the given thread for inspection
    ///
    /// Returns `None` if no phase was ever timed for that thread.
    pub fn thread_times(&self, tid: Tid) -> Option<&TaskTimes> {
        self.threads.get(&tid)
    }
}

/// Durations accumulated by named phase
#[derive(Debug, Default)]
pub struct TaskTimes {
    durations: BTreeMap<&'static str, Duration>,
}

impl TaskTimes {
    /// Run the given closure, adding its runtime to the named phase
    pub fn time<T>(&mut self, task: &'static str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let res = f();
        *self.durations.entry(task).or_default() += start.elapsed();
        res
    }

    /// Retrieve the total duration recorded for the named phase
    pub fn elapsed(&self, task: &str) -> Option<Duration> {
        self.durations.get(task).copied()
    }

    /// Iterate over all recorded phases and their total durations
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.durations.iter().map(|(task, d)| (*task, *d))
    }

    /// Check whether any phase was recorded at all
    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }
}
