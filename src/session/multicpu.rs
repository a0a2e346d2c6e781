// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Decoding of per-cpu trace buffers

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::BufferSlot;
use super::error::Error;
use crate::Tid;
use crate::cpu::{self, CpuInfo};
use crate::engine::Engine;
use crate::entry::{DecodedThread, Entry};
use crate::schedule::{Schedule, Slice};
use crate::timer::Timer;

/// Decoder state for cpu-granular trace buffers
///
/// Each cpu buffer interleaves the traces of every thread scheduled onto that
/// cpu. Reconstructing a single thread's trace means decoding the full streams
/// of all cpus the thread ran on and picking out the entries falling into that
/// thread's scheduling slices, matched up via their timestamps.
///
/// Both stages are cached: a cpu stream is decoded at most once no matter how
/// many threads' reconstructions need it, and a reconstructed thread is kept
/// until one of its cpus receives a fresh buffer.
#[derive(Debug)]
pub(crate) struct MultiCpuDecoder {
    schedule: Schedule,
    buffers: BTreeMap<cpu::Id, BufferSlot>,
    streams: BTreeMap<cpu::Id, Vec<Entry>>,
    threads: BTreeMap<Tid, Arc<DecodedThread>>,
}

impl MultiCpuDecoder {
    /// Create a decoder for the cpus appearing in the given schedule
    pub fn new(schedule: Schedule) -> Self {
        let buffers = schedule
            .cpus()
            .into_iter()
            .map(|id| (id, BufferSlot::Missing))
            .collect();
        Self {
            schedule,
            buffers,
            streams: BTreeMap::new(),
            threads: BTreeMap::new(),
        }
    }

    /// Create a decoder over trace files from a postmortem bundle
    pub fn from_files(
        files: impl IntoIterator<Item = (cpu::Id, PathBuf)>,
        schedule: Schedule,
    ) -> Self {
        let mut decoder = Self::new(schedule);
        decoder.buffers.extend(
            files
                .into_iter()
                .map(|(id, path)| (id, BufferSlot::File(path))),
        );
        decoder
    }

    /// Retrieve the context switch schedule
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Retrieve the current buffer slots, by cpu
    pub fn buffers(&self) -> impl Iterator<Item = (cpu::Id, &BufferSlot)> {
        self.buffers.iter().map(|(id, slot)| (*id, slot))
    }

    /// Check whether the given thread appears in the schedule
    pub fn is_traced(&self, tid: Tid) -> bool {
        self.schedule.is_traced(tid)
    }

    /// Install a freshly read cpu buffer, discarding decode results built on
    /// the old one
    pub fn set_buffer(&mut self, cpu: cpu::Id, bytes: Vec<u8>) -> Result<(), Error> {
        let Some(slot) = self.buffers.get_mut(&cpu) else {
            return Err(Error::UnknownCpu(cpu));
        };
        *slot = BufferSlot::Bytes(bytes);
        self.streams.remove(&cpu);
        let affected: Vec<_> = self
            .schedule
            .slices()
            .iter()
            .filter(|s| s.cpu == cpu)
            .map(|s| s.tid)
            .collect();
        for tid in affected {
            self.threads.remove(&tid);
        }
        Ok(())
    }

    /// Reconstruct the given thread's trace, or retrieve the cached result
    pub fn decoded_thread(
        &mut self,
        tid: Tid,
        engine: &mut impl Engine,
        cpu_info: &CpuInfo,
        timer: &mut Timer,
    ) -> Result<Arc<DecodedThread>, Error> {
        if let Some(decoded) = self.threads.get(&tid) {
            return Ok(Arc::clone(decoded));
        }
        if !self.schedule.is_traced(tid) {
            return Err(Error::UnknownThread(tid));
        }

        let cpus: BTreeSet<_> = self.schedule.for_thread(tid).map(|s| s.cpu).collect();
        for cpu in cpus {
            self.decode_cpu(cpu, engine, cpu_info, timer);
        }

        let mut entries = Vec::new();
        for slice in self.schedule.for_thread(tid) {
            let earliest = self.schedule.earliest_on_cpu(slice.cpu) == Some(slice);
            if let Some(stream) = self.streams.get(&slice.cpu) {
                extract(stream, slice, earliest, &mut entries);
            }
        }
        debug!(tid, entries = entries.len(), "reconstructed thread trace");
        let decoded = Arc::new(DecodedThread::new(tid, entries));
        self.threads.insert(tid, Arc::clone(&decoded));
        Ok(decoded)
    }

    /// Decode the given cpu's full stream, unless already decoded
    fn decode_cpu(
        &mut self,
        cpu: cpu::Id,
        engine: &mut impl Engine,
        cpu_info: &CpuInfo,
        timer: &mut Timer,
    ) {
        if self.streams.contains_key(&cpu) {
            return;
        }
        let entries = match self.buffers.get(&cpu) {
            Some(slot) => timer
                .process()
                .time(super::DECODE_TASK, || slot.decode(engine, cpu_info)),
            None => Vec::new(),
        };
        debug!(cpu, entries = entries.len(), "decoded cpu trace");
        self.streams.insert(cpu, entries);
    }
}

/// Append the entries of `stream` falling into `slice` to `out`
///
/// An entry falls into a slice if the last timestamp at or before it lies
/// within the slice's window. Entries before the stream's first timestamp
/// cannot be placed that way; they belong to the earliest slice of the
/// stream's cpu.
fn extract(stream: &[Entry], slice: &Slice, earliest: bool, out: &mut Vec<Entry>) {
    let mut last_tsc = None;
    for entry in stream {
        if let Some(tsc) = entry.tsc() {
            last_tsc = Some(tsc);
        }
        let belongs = match last_tsc {
            Some(tsc) => slice.contains(tsc),
            None => earliest,
        };
        if belongs {
            out.push(entry.clone());
        }
    }
}
