// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Trace session orchestration
//!
//! A [`Session`] owns everything belonging to one traced process: the decode
//! [`Engine`], the source of raw trace data and the decode storage caching
//! decoded traces. Sessions come in two flavours:
//! * live sessions observe a process running under a debugger through a
//!   [`LiveProcess`] adapter; see [`Session::live`]
//! * postmortem sessions replay a trace [`Bundle`] saved earlier; see
//!   [`Session::postmortem`]
//!
//! # Decode storage
//!
//! Decoding is expensive, so its results are cached: every thread is decoded
//! at most once per process stop. All cached state lives in a single storage
//! value which is discarded wholesale whenever [`refresh`][Session::refresh]
//! observes that the process stopped anew, identified by the stop generation
//! of the [`LiveProcess`]. Every query refreshes first, so callers always
//! see the trace of the current stop. Decode results are handed out as
//! [`Arc`]ed snapshots which remain readable after the storage they came
//! from is gone.
//!
//! Postmortem sessions never refresh. Their bundle is immutable, and decode
//! results are simply kept for the session's lifetime.

mod error;
mod multicpu;
mod thread;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace};

use multicpu::MultiCpuDecoder;
use thread::ThreadDecoder;

use crate::Tid;
use crate::bundle::{Bundle, CpuTrace, ThreadTrace, Traces};
use crate::config::Config;
use crate::cpu::{self, CpuInfo};
use crate::cursor::Cursor;
use crate::engine::Engine;
use crate::entry::{self, DecodedThread, Entry};
use crate::schedule::Schedule;
use crate::source::{LiveProcess, StartRequest};
use crate::timer::Timer;
use crate::tsc;

pub use error::Error;

/// Timer phase under which decode work is recorded
pub(crate) const DECODE_TASK: &str = "decode";

/// Operations a trace technology offers to a debugger
///
/// [`Session`] implements this trait for any [`Engine`]. It is object safe,
/// so a debugger can drive sessions of different engines, or different trace
/// technologies altogether, through `Box<dyn Trace>`.
pub trait Trace {
    /// Start tracing the live process
    fn start(&mut self, config: Config) -> Result<(), Error>;

    /// Stop tracing the live process
    fn stop(&mut self) -> Result<(), Error>;

    /// Bring the decode storage up to date with the observed process
    fn refresh(&mut self) -> Result<(), Error>;

    /// Check whether the given thread is being traced
    fn is_traced(&mut self, tid: Tid) -> Result<bool, Error>;

    /// Retrieve the decoded trace of the given thread
    fn decoded_thread(&mut self, tid: Tid) -> Result<Arc<DecodedThread>, Error>;

    /// Create a [`Cursor`] over the decoded trace of the given thread
    fn cursor(&mut self, tid: Tid) -> Result<Cursor, Error>;

    /// Retrieve the given thread's raw trace size in bytes
    fn raw_trace_size(&mut self, tid: Tid) -> Result<Option<u64>, Error>;

    /// Summarize the given thread's trace
    fn trace_info(&mut self, tid: Tid) -> Result<Info, Error>;

    /// Retrieve the timestamp converter, if the platform published one
    fn tsc_conversion(&mut self) -> Result<Option<tsc::Conversion>, Error>;

    /// Save the session's raw traces as a postmortem [`Bundle`]
    fn save_to_disk(&mut self, dir: &Path) -> Result<Bundle, Error>;
}

/// A tracing session for a single process
///
/// See the [module level documentation][self] for an overview. All fallible
/// operations report [`Error`]s; queries against threads outside the traced
/// set yield [`Error::UnknownThread`] rather than empty results.
pub struct Session<E> {
    engine: E,
    mode: Mode,
    state: State,
    config: Config,
    storage: Option<Storage>,
    cpu_info: Option<CpuInfo>,
    generation: Option<u64>,
}

impl<E: Engine> Session<E> {
    /// Create a session observing a live process
    ///
    /// The session starts out inactive. Tracing begins with a successful
    /// [`start`][Self::start].
    pub fn live(engine: E, process: impl LiveProcess + 'static) -> Self {
        Self {
            engine,
            mode: Mode::Live(Box::new(process)),
            state: State::Inactive,
            config: Config::default(),
            storage: None,
            cpu_info: None,
            generation: None,
        }
    }

    /// Create a session over a postmortem trace [`Bundle`]
    ///
    /// Trace file paths inside the bundle are used as-is; callers loading a
    /// bundle description from disk usually want to
    /// [`resolve_paths`][Bundle::resolve_paths] first. The bundle's traces
    /// are decoded lazily, on first query of the respective thread.
    pub fn postmortem(engine: E, bundle: Bundle) -> Result<Self, Error> {
        if !bundle.is_supported() {
            return Err(Error::UnsupportedBundle(bundle.kind));
        }
        let Bundle {
            cpu_info,
            tsc_conversion,
            traces,
            ..
        } = bundle;
        let decoders = match traces {
            Traces::PerThread(traces) => Decoders::PerThread(
                traces
                    .into_iter()
                    .map(|t| (t.tid, ThreadDecoder::from_file(t.tid, t.ipt_trace)))
                    .collect(),
            ),
            Traces::PerCpu { traces, schedule } => Decoders::PerCpu(MultiCpuDecoder::from_files(
                traces.into_iter().map(|t| (t.id, t.ipt_trace)),
                schedule,
            )),
        };
        debug!("opened postmortem trace bundle");
        Ok(Self {
            engine,
            mode: Mode::Postmortem,
            state: State::Tracing,
            config: Config::default(),
            storage: Some(Storage {
                decoders,
                tsc_conversion,
                timer: Timer::default(),
            }),
            cpu_info,
            generation: None,
        })
    }

    /// Start tracing the live process
    ///
    /// The configuration is validated against the tracing host's
    /// capabilities and then forwarded to it. On success, the session sets
    /// up empty decode storage; trace content becomes observable after the
    /// process stops.
    ///
    /// Restarting a stopped session is allowed and begins a fresh trace
    /// under the new configuration. Starting while tracing is active yields
    /// [`Error::AlreadyTracing`], postmortem sessions [`Error::NotLive`].
    pub fn start(&mut self, config: Config) -> Result<(), Error> {
        let Mode::Live(process) = &mut self.mode else {
            return Err(Error::NotLive);
        };
        if self.state == State::Tracing {
            return Err(Error::AlreadyTracing);
        }

        let per_cpu_supported = process.supports_per_cpu()?;
        config.validate(per_cpu_supported)?;
        process.start(&StartRequest::new(&config))?;
        let generation = match process.stop_generation() {
            Ok(generation) => Some(generation),
            Err(error) => {
                debug!(%error, "stop generation not available at start");
                None
            }
        };
        info!(
            per_cpu = config.per_cpu,
            buffer_size = config.buffer_size,
            "tracing started"
        );

        let tsc_conversion = fetch_tsc_conversion(process.as_mut());
        let timer = self.storage.take().map(|s| s.timer).unwrap_or_default();
        self.storage = Some(Storage {
            decoders: empty_decoders(&config),
            tsc_conversion,
            timer,
        });
        self.config = config;
        self.state = State::Tracing;
        self.generation = generation;
        Ok(())
    }

    /// Stop tracing the live process
    ///
    /// Ends collection on the tracing host. Decode results of the ended
    /// trace are discarded; only the accumulated [timings][Self::timer]
    /// survive into a possible restart.
    pub fn stop(&mut self) -> Result<(), Error> {
        let Mode::Live(process) = &mut self.mode else {
            return Err(Error::NotLive);
        };
        if self.state != State::Tracing {
            return Err(Error::NotTracing);
        }

        process.stop()?;
        info!("tracing stopped");

        let timer = self.storage.take().map(|s| s.timer).unwrap_or_default();
        self.storage = Some(Storage {
            decoders: empty_decoders(&self.config),
            tsc_conversion: None,
            timer,
        });
        self.state = State::Stopped;
        self.generation = None;
        Ok(())
    }

    /// Bring the decode storage up to date with the observed process
    ///
    /// Compares the process' stop generation against the one the current
    /// storage was built for and replaces the storage wholesale on mismatch,
    /// refetching the TSC conversion and, for per-cpu sessions, the context
    /// switch schedule. Every query performs this check implicitly; calling
    /// it directly only forces the storage rebuild to happen early.
    ///
    /// A no-op for postmortem sessions and outside of active tracing.
    pub fn refresh(&mut self) -> Result<(), Error> {
        if self.state != State::Tracing {
            return Ok(());
        }
        let Mode::Live(process) = &mut self.mode else {
            return Ok(());
        };

        let generation = process.stop_generation()?;
        if self.generation == Some(generation) {
            return Ok(());
        }
        debug!(generation, "process stopped anew, rebuilding decode storage");

        let mut storage = build_storage(process.as_mut(), &self.config)?;
        if let Some(old) = self.storage.take() {
            storage.timer = old.timer;
        }
        self.storage = Some(storage);
        self.generation = Some(generation);
        Ok(())
    }

    /// Check whether the given thread is being traced
    ///
    /// For live per-thread sessions this reflects the configured thread set,
    /// or every thread if none was configured. For per-cpu sessions and
    /// postmortem bundles, the schedule respectively the bundle content
    /// decides. Outside of active tracing, no thread is traced.
    pub fn is_traced(&mut self, tid: Tid) -> Result<bool, Error> {
        self.refresh()?;
        if self.state != State::Tracing {
            return Ok(false);
        }
        let Some(storage) = &self.storage else {
            return Ok(false);
        };
        Ok(match &storage.decoders {
            Decoders::PerThread(decoders) => {
                thread_in_scope(&self.mode, &self.config, decoders, tid)
            }
            Decoders::PerCpu(decoder) => decoder.is_traced(tid),
        })
    }

    /// Retrieve the decoded trace of the given thread
    ///
    /// Decodes the thread's raw trace on first call and memoizes the result
    /// until the next storage replacement; repeated calls are cheap and
    /// yield snapshots of the same sequence. A traced thread without trace
    /// data decodes to an empty sequence, which is not an error.
    pub fn decoded_thread(&mut self, tid: Tid) -> Result<Arc<DecodedThread>, Error> {
        self.refresh()?;
        if self.state != State::Tracing {
            return Err(Error::NotTracing);
        }
        let cpu_info = self.cpu_info()?;

        let Self {
            engine,
            mode,
            config,
            storage,
            ..
        } = self;
        let Some(storage) = storage.as_mut() else {
            return Err(Error::NotTracing);
        };
        match &mut storage.decoders {
            Decoders::PerThread(decoders) => {
                if !thread_in_scope(mode, config, decoders, tid) {
                    return Err(Error::UnknownThread(tid));
                }
                let decoder = decoders
                    .entry(tid)
                    .or_insert_with(|| ThreadDecoder::new(tid));
                Ok(decoder.decode(engine, &cpu_info, &mut storage.timer))
            }
            Decoders::PerCpu(decoder) => {
                decoder.decoded_thread(tid, engine, &cpu_info, &mut storage.timer)
            }
        }
    }

    /// Create a [`Cursor`] over the decoded trace of the given thread
    ///
    /// The cursor holds its own reference to the decode result and stays
    /// usable across refreshes and session teardown.
    pub fn cursor(&mut self, tid: Tid) -> Result<Cursor, Error> {
        self.decoded_thread(tid).map(Cursor::new)
    }

    /// Retrieve the identification of the processor being traced
    ///
    /// Fetched from the live process on first call and kept for the
    /// session's lifetime; processors do not change under a session.
    /// Postmortem sessions serve it from their bundle.
    pub fn cpu_info(&mut self) -> Result<CpuInfo, Error> {
        if let Some(info) = self.cpu_info {
            return Ok(info);
        }
        let Mode::Live(process) = &mut self.mode else {
            return Err(Error::Unavailable {
                what: "cpu info",
                cause: None,
            });
        };
        let info = process.cpu_info().map_err(|cause| Error::Unavailable {
            what: "cpu info",
            cause: Some(cause),
        })?;
        debug!(vendor = %info.vendor, family = info.family, model = info.model, "fetched cpu info");
        self.cpu_info = Some(info);
        Ok(info)
    }

    /// Retrieve the timestamp converter, if the platform published one
    ///
    /// The conversion is fetched when tracing starts and anew with every
    /// storage rebuild. `Ok(None)` means the current trace carries no wall
    /// clock correlation.
    pub fn tsc_conversion(&mut self) -> Result<Option<tsc::Conversion>, Error> {
        self.refresh()?;
        if self.state != State::Tracing {
            return Err(Error::NotTracing);
        }
        let Some(storage) = &self.storage else {
            return Err(Error::NotTracing);
        };
        Ok(storage.tsc_conversion)
    }

    /// Hand over a freshly read per-thread trace buffer
    ///
    /// Called by the debugger integration when it has read a thread's trace
    /// buffer from the tracing host. Replaces the thread's previous buffer
    /// and discards its decode result. Only valid for live sessions tracing
    /// per thread; per-cpu sessions yield [`Error::UnknownThread`].
    pub fn on_thread_buffer_read(&mut self, tid: Tid, bytes: &[u8]) -> Result<(), Error> {
        if matches!(self.mode, Mode::Postmortem) {
            return Err(Error::NotLive);
        }
        self.refresh()?;
        if self.state != State::Tracing {
            return Err(Error::NotTracing);
        }
        let Self {
            mode,
            config,
            storage,
            ..
        } = self;
        let Some(storage) = storage.as_mut() else {
            return Err(Error::NotTracing);
        };
        match &mut storage.decoders {
            Decoders::PerThread(decoders) => {
                if !thread_in_scope(mode, config, decoders, tid) {
                    return Err(Error::UnknownThread(tid));
                }
                trace!(tid, len = bytes.len(), "thread trace buffer received");
                decoders
                    .entry(tid)
                    .or_insert_with(|| ThreadDecoder::new(tid))
                    .set_buffer(bytes.to_vec());
                Ok(())
            }
            Decoders::PerCpu(_) => Err(Error::UnknownThread(tid)),
        }
    }

    /// Hand over a freshly read per-cpu trace buffer
    ///
    /// The per-cpu counterpart of
    /// [`on_thread_buffer_read`][Self::on_thread_buffer_read]. Replaces the
    /// cpu's previous buffer and discards the decode results built on it,
    /// including reconstructed traces of threads scheduled onto that cpu.
    pub fn on_cpu_buffer_read(&mut self, cpu: cpu::Id, bytes: &[u8]) -> Result<(), Error> {
        if matches!(self.mode, Mode::Postmortem) {
            return Err(Error::NotLive);
        }
        self.refresh()?;
        if self.state != State::Tracing {
            return Err(Error::NotTracing);
        }
        let Some(storage) = self.storage.as_mut() else {
            return Err(Error::NotTracing);
        };
        match &mut storage.decoders {
            Decoders::PerCpu(decoder) => {
                trace!(cpu, len = bytes.len(), "cpu trace buffer received");
                decoder.set_buffer(cpu, bytes.to_vec())
            }
            Decoders::PerThread(_) => Err(Error::UnknownCpu(cpu)),
        }
    }

    /// Retrieve the given thread's raw trace size in bytes
    ///
    /// `Ok(None)` means no trace data is present for the thread yet. Per-cpu
    /// sessions always yield `Ok(None)` for threads in the traced set, since
    /// buffer bytes cannot be attributed to single threads without decoding.
    pub fn raw_trace_size(&mut self, tid: Tid) -> Result<Option<u64>, Error> {
        self.refresh()?;
        if self.state != State::Tracing {
            return Err(Error::NotTracing);
        }
        let Self {
            mode,
            config,
            storage,
            ..
        } = self;
        let Some(storage) = storage.as_ref() else {
            return Err(Error::NotTracing);
        };
        match &storage.decoders {
            Decoders::PerThread(decoders) => {
                if !thread_in_scope(mode, config, decoders, tid) {
                    return Err(Error::UnknownThread(tid));
                }
                Ok(decoders.get(&tid).and_then(ThreadDecoder::raw_size))
            }
            Decoders::PerCpu(decoder) => {
                if !decoder.is_traced(tid) {
                    return Err(Error::UnknownThread(tid));
                }
                Ok(None)
            }
        }
    }

    /// Summarize the given thread's trace
    ///
    /// Decodes the thread if necessary. The [`Info`] is a plain value meant
    /// for display to a debugger user.
    pub fn trace_info(&mut self, tid: Tid) -> Result<Info, Error> {
        let decoded = self.decoded_thread(tid)?;
        let raw_trace_size = self.raw_trace_size(tid)?;
        let Some(storage) = &self.storage else {
            return Err(Error::NotTracing);
        };
        let thread_timings = storage
            .timer
            .thread_times(tid)
            .map(|times| times.iter().collect())
            .unwrap_or_default();
        let session_timings = storage.timer.process_times().iter().collect();
        Ok(Info {
            tid,
            raw_trace_size,
            instructions: decoded.instruction_count(),
            errors: decoded.error_count(),
            tsc_range: decoded.first_tsc().zip(decoded.last_tsc()),
            thread_timings,
            session_timings,
        })
    }

    /// Retrieve the accumulated decode phase timings
    ///
    /// `None` before the first [`start`][Self::start] of a live session.
    pub fn timer(&self) -> Option<&Timer> {
        self.storage.as_ref().map(|s| &s.timer)
    }

    /// Save the session's raw traces as a postmortem [`Bundle`]
    ///
    /// Writes one trace file per thread or cpu plus a `trace.json` bundle
    /// description into `dir`, creating it if necessary. The returned bundle
    /// matches the written description, with trace paths pointing into
    /// `dir`. Loading it with [`postmortem`][Self::postmortem] reproduces
    /// the session's decoded traces.
    pub fn save_to_disk(&mut self, dir: &Path) -> Result<Bundle, Error> {
        self.refresh()?;
        if self.state != State::Tracing {
            return Err(Error::NotTracing);
        }
        let cpu_info = self.cpu_info().ok();
        let Some(storage) = &self.storage else {
            return Err(Error::NotTracing);
        };
        std::fs::create_dir_all(dir).map_err(|source| Error::Io {
            path: dir.into(),
            source,
        })?;

        let mut bundle = match &storage.decoders {
            Decoders::PerThread(decoders) => {
                let mut traces = Vec::new();
                for (tid, decoder) in decoders {
                    let path = dir.join(format!("thread-{tid}.trace"));
                    if write_slot(decoder.slot(), &path)? {
                        traces.push(ThreadTrace {
                            tid: *tid,
                            ipt_trace: path,
                        });
                    }
                }
                Bundle::per_thread(traces)
            }
            Decoders::PerCpu(decoder) => {
                let mut traces = Vec::new();
                for (id, slot) in decoder.buffers() {
                    let path = dir.join(format!("cpu-{id}.trace"));
                    if write_slot(slot, &path)? {
                        traces.push(CpuTrace {
                            id,
                            ipt_trace: path,
                        });
                    }
                }
                Bundle::per_cpu(traces, decoder.schedule().clone())
            }
        };
        if let Some(info) = cpu_info {
            bundle = bundle.with_cpu_info(info);
        }
        if let Some(conversion) = storage.tsc_conversion {
            bundle = bundle.with_tsc_conversion(conversion);
        }

        let path = dir.join("trace.json");
        let json = serde_json::to_string_pretty(&bundle)?;
        std::fs::write(&path, json).map_err(|source| Error::Io { path, source })?;
        info!(dir = %dir.display(), "trace bundle saved");
        Ok(bundle)
    }
}

impl<E: Engine> Trace for Session<E> {
    fn start(&mut self, config: Config) -> Result<(), Error> {
        Session::start(self, config)
    }

    fn stop(&mut self) -> Result<(), Error> {
        Session::stop(self)
    }

    fn refresh(&mut self) -> Result<(), Error> {
        Session::refresh(self)
    }

    fn is_traced(&mut self, tid: Tid) -> Result<bool, Error> {
        Session::is_traced(self, tid)
    }

    fn decoded_thread(&mut self, tid: Tid) -> Result<Arc<DecodedThread>, Error> {
        Session::decoded_thread(self, tid)
    }

    fn cursor(&mut self, tid: Tid) -> Result<Cursor, Error> {
        Session::cursor(self, tid)
    }

    fn raw_trace_size(&mut self, tid: Tid) -> Result<Option<u64>, Error> {
        Session::raw_trace_size(self, tid)
    }

    fn trace_info(&mut self, tid: Tid) -> Result<Info, Error> {
        Session::trace_info(self, tid)
    }

    fn tsc_conversion(&mut self) -> Result<Option<tsc::Conversion>, Error> {
        Session::tsc_conversion(self)
    }

    fn save_to_disk(&mut self, dir: &Path) -> Result<Bundle, Error> {
        Session::save_to_disk(self, dir)
    }
}

/// Where a session's raw trace data comes from
enum Mode {
    Live(Box<dyn LiveProcess>),
    Postmortem,
}

/// Collection state of a session
///
/// Postmortem sessions are always `Tracing`. Live sessions move from
/// `Inactive` through `Tracing` to `Stopped`, and back to `Tracing` on a
/// restart.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Inactive,
    Tracing,
    Stopped,
}

/// Cached decode state of a session
///
/// Built for one specific stop generation and replaced as a whole when the
/// process stops anew. Only the timer outlives a replacement; timings
/// accumulate over the session.
struct Storage {
    decoders: Decoders,
    tsc_conversion: Option<tsc::Conversion>,
    timer: Timer,
}

/// Decoders matching the granularity the session traces at
///
/// The variant is fixed by the session configuration, respectively the
/// bundle content, and never changes within one storage.
enum Decoders {
    PerThread(BTreeMap<Tid, ThreadDecoder>),
    PerCpu(MultiCpuDecoder),
}

/// Origin of a decoder's raw trace bytes
#[derive(Debug)]
pub(crate) enum BufferSlot {
    /// No trace data has been made available (yet)
    Missing,
    /// Buffer read from the live tracing host
    Bytes(Vec<u8>),
    /// Trace file of a postmortem bundle, read on first decode
    File(PathBuf),
}

impl BufferSlot {
    /// Decode these bytes with the given engine
    ///
    /// A missing buffer decodes to nothing, without consulting the engine.
    /// An unreadable trace file decodes to a single error entry, embedding
    /// the failure in the trace it affects.
    pub(crate) fn decode(&self, engine: &mut impl Engine, cpu: &CpuInfo) -> Vec<Entry> {
        match self {
            Self::Missing => Vec::new(),
            Self::Bytes(bytes) => engine.decode(bytes, cpu),
            Self::File(path) => match std::fs::read(path) {
                Ok(bytes) => engine.decode(&bytes, cpu),
                Err(error) => {
                    debug!(path = %path.display(), %error, "cannot read trace file");
                    let message = format!("cannot read {}: {error}", path.display());
                    vec![entry::Error::new(message).into()]
                }
            },
        }
    }

    /// Retrieve the raw trace size, if any trace data is present
    pub(crate) fn raw_size(&self) -> Option<u64> {
        match self {
            Self::Missing => None,
            Self::Bytes(bytes) => Some(bytes.len() as u64),
            Self::File(path) => std::fs::metadata(path).map(|m| m.len()).ok(),
        }
    }
}

/// Summary of a single thread's trace, ready for display
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Info {
    /// Id of the summarized thread
    pub tid: Tid,
    /// Raw trace size in bytes, if attributable to the thread
    pub raw_trace_size: Option<u64>,
    /// Number of retired instructions decoded
    pub instructions: usize,
    /// Number of errors embedded in the decoded trace
    pub errors: usize,
    /// TSC window the decoded trace covers, if timestamps were recorded
    pub tsc_range: Option<(u64, u64)>,
    /// Decode phase timings of this thread
    pub thread_timings: Vec<(&'static str, Duration)>,
    /// Decode phase timings not attributable to single threads
    pub session_timings: Vec<(&'static str, Duration)>,
}

impl core::fmt::Display for Info {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "thread {}", self.tid)?;
        match self.raw_trace_size {
            Some(size) => write!(f, "\n  raw trace size: {size} bytes")?,
            None => write!(f, "\n  raw trace size: not available")?,
        }
        write!(f, "\n  instructions: {}", self.instructions)?;
        write!(f, "\n  decode errors: {}", self.errors)?;
        if let Some((first, last)) = self.tsc_range {
            write!(f, "\n  tsc range: {first} .. {last}")?;
        }
        if !self.thread_timings.is_empty() {
            write!(f, "\n  thread timings:")?;
            for (task, duration) in &self.thread_timings {
                write!(f, "\n    {task}: {duration:?}")?;
            }
        }
        if !self.session_timings.is_empty() {
            write!(f, "\n  session timings:")?;
            for (task, duration) in &self.session_timings {
                write!(f, "\n    {task}: {duration:?}")?;
            }
        }
        Ok(())
    }
}

/// Fetch the TSC conversion from `process`, if it can supply one
///
/// Wall clock correlation is best-effort: a failed fetch is logged and
/// leaves the trace without timestamps.
fn fetch_tsc_conversion(process: &mut dyn LiveProcess) -> Option<tsc::Conversion> {
    match process.tsc_conversion() {
        Ok(conversion) => conversion,
        Err(error) => {
            debug!(%error, "TSC conversion parameters not available");
            None
        }
    }
}

/// Build fresh decode storage for the current stop of `process`
fn build_storage(process: &mut dyn LiveProcess, config: &Config) -> Result<Storage, Error> {
    let tsc_conversion = fetch_tsc_conversion(process);
    let decoders = if config.per_cpu {
        let schedule = process.schedule()?;
        debug!(slices = schedule.len(), "fetched context switch schedule");
        Decoders::PerCpu(MultiCpuDecoder::new(schedule))
    } else {
        empty_decoders(config)
    };
    Ok(Storage {
        decoders,
        tsc_conversion,
        timer: Timer::default(),
    })
}

/// Create decoders for the given configuration, without any trace data
fn empty_decoders(config: &Config) -> Decoders {
    if config.per_cpu {
        Decoders::PerCpu(MultiCpuDecoder::new(Schedule::default()))
    } else {
        let decoders = config
            .threads
            .iter()
            .flatten()
            .map(|tid| (*tid, ThreadDecoder::new(*tid)))
            .collect();
        Decoders::PerThread(decoders)
    }
}

/// Check whether the given thread belongs to the session's traced set
///
/// For live sessions the configuration decides: an explicit thread subset if
/// one was requested, every thread of the process otherwise. Postmortem
/// bundles list their traced threads exhaustively.
fn thread_in_scope(
    mode: &Mode,
    config: &Config,
    decoders: &BTreeMap<Tid, ThreadDecoder>,
    tid: Tid,
) -> bool {
    match (mode, &config.threads) {
        (Mode::Live(_), Some(threads)) => threads.contains(&tid),
        (Mode::Live(_), None) => true,
        (Mode::Postmortem, _) => decoders.contains_key(&tid),
    }
}

/// Write the slot's raw bytes to `path`, unless there are none
///
/// Returns whether a file was written.
fn write_slot(slot: &BufferSlot, path: &Path) -> Result<bool, Error> {
    match slot {
        BufferSlot::Missing => Ok(false),
        BufferSlot::Bytes(bytes) => {
            std::fs::write(path, bytes).map_err(|source| Error::Io {
                path: path.into(),
                source,
            })?;
            Ok(true)
        }
        BufferSlot::File(original) => {
            std::fs::copy(original, path).map_err(|source| Error::Io {
                path: original.clone(),
                source,
            })?;
            Ok(true)
        }
    }
}
