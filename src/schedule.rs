// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Thread-to-cpu execution schedule
//!
//! When tracing per cpu, each trace buffer interleaves the instructions of
//! every thread that ran on that cpu. The schedule, reconstructed from the
//! kernel's context switch records, tells which thread occupied which cpu
//! during which TSC window. It is the only means of attributing per-cpu
//! trace content back to threads.

use std::collections::BTreeSet;

use crate::Tid;
use crate::cpu;


/// A contiguous execution of one thread on one cpu
///
/// The TSC window is half open: a timestamp belongs to the slice if
/// `start_tsc <= tsc < end_tsc`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slice {
    pub tid: Tid,
    pub cpu: cpu::Id,
    pub start_tsc: u64,
    pub end_tsc: u64,
}

impl Slice {
    /// Check whether the given timestamp falls into this slice's window
    pub fn contains(&self, tsc: u64) -> bool {
        self.start_tsc <= tsc && tsc < self.end_tsc
    }
}

/// Chronological record of which thread ran where
///
/// Slices are kept sorted by their window start. A thread migrating between
/// cpus thus appears as a run of slices in the order it actually executed.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct Schedule {
    slices: Vec<Slice>,
}

impl Schedule {
    /// Create a schedule from the given slices
    ///
    /// The slices are brought into chronological order. Slices with equal
    /// window starts keep their relative order.
    pub fn new(mut slices: Vec<Slice>) -> Self {
        slices.sort_by_key(|s| s.start_tsc);
        Self { slices }
    }

    /// Retrieve all slices in chronological order
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    /// Retrieve the number of slices
    pub fn len(&self) -> usize {
        self.slices.len()
    }

    /// Check whether this schedule records no execution at all
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Check whether the given thread ever ran according to this schedule
    pub fn is_traced(&self, tid: Tid) -> bool {
        self.slices.iter().any(|s| s.tid == tid)
    }

    /// Retrieve the ids of all threads that appear in this schedule
    pub fn threads(&self) -> BTreeSet<Tid> {
        self.slices.iter().map(|s| s.tid).collect()
    }

    /// Retrieve the ids of all cpus that appear in this schedule
    pub fn cpus(&self) -> BTreeSet<cpu::Id> {
        self.slices.iter().map(|s| s.cpu).collect()
    }

    /// Iterate over the given thread's slices in chronological order
    pub fn for_thread(&self, tid: Tid) -> impl Iterator<Item = &Slice> + '_ {
        self.slices.iter().filter(move |s| s.tid == tid)
    }

    /// Retrieve the chronologically first slice on the given cpu
    pub fn earliest_on_cpu(&self, cpu: cpu::Id) -> Option<&Slice> {
        self.slices.iter().find(|s| s.cpu == cpu)
    }
}

/// The slices are brought into chronological order on deserialization
impl<'de> serde::Deserialize<'de> for Schedule {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        <Vec<Slice> as serde::Deserialize>::deserialize(deserializer).map(Self::new)
    }
}
