// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Decoding of per-thread trace buffers

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::BufferSlot;
use crate::Tid;
use crate::cpu::CpuInfo;
use crate::engine::Engine;
use crate::entry::DecodedThread;
use crate::timer::Timer;

/// Decoder state for a single thread's trace buffer
///
/// The decoder memoizes its decode result. Decoding happens at most once per
/// buffer; handing out the result again is a reference count bump.
#[derive(Debug)]
pub(crate) struct ThreadDecoder {
    tid: Tid,
    slot: BufferSlot,
    decoded: Option<Arc<DecodedThread>>,
}

impl ThreadDecoder {
    /// Create a decoder for a thread without any trace data yet
    pub fn new(tid: Tid) -> Self {
        Self {
            tid,
            slot: BufferSlot::Missing,
            decoded: None,
        }
    }

    /// Create a decoder over a trace file from a postmortem bundle
    pub fn from_file(tid: Tid, path: PathBuf) -> Self {
        Self {
            tid,
            slot: BufferSlot::File(path),
            decoded: None,
        }
    }

    /// Retrieve the origin of this thread's raw trace bytes
    pub fn slot(&self) -> &BufferSlot {
        &self.slot
    }

    /// Install a freshly read trace buffer, discarding any decode result
    pub fn set_buffer(&mut self, bytes: Vec<u8>) {
        self.slot = BufferSlot::Bytes(bytes);
        self.decoded = None;
    }

    /// Retrieve the raw trace size, if any trace data is present
    pub fn raw_size(&self) -> Option<u64> {
        self.slot.raw_size()
    }

    /// Decode this thread's trace, or retrieve the memoized result
    pub fn decode(
        &mut self,
        engine: &mut impl Engine,
        cpu: &CpuInfo,
        timer: &mut Timer,
    ) -> Arc<DecodedThread> {
        if let Some(decoded) = &self.decoded {
            return Arc::clone(decoded);
        }

        let slot = &self.slot;
        let entries = timer
            .thread(self.tid)
            .time(super::DECODE_TASK, || slot.decode(engine, cpu));
        debug!(tid = self.tid, entries = entries.len(), "decoded thread trace");
        let decoded = Arc::new(DecodedThread::new(self.tid, entries));
        self.decoded = Some(Arc::clone(&decoded));
        decoded
    }
}
