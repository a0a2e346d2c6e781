// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0

//! # Intel Processor Trace session orchestration for debuggers
//!
//! This project implements the session layer a debugger needs for working
//! with [Intel Processor Trace](https://man7.org/linux/man-pages/man1/perf-intel-pt.1.html):
//! starting and stopping collection on a live process, caching decoded
//! traces across process stops, attributing cpu-granular trace buffers back
//! to threads and saving and loading postmortem trace bundles. This crate is
//! not concerned with packet-level decoding itself; that part is plugged in
//! as an [`Engine`].
//!
//! See [session] for the orchestration layer and [engine] for the decode
//! engine interface.
//!
//! # Features
//! - live and postmortem sessions behind one query interface
//! - decode-once caching, invalidated exactly when the process stops anew
//! - per-thread and per-cpu trace granularity
//! - thread trace reconstruction from cpu traces via context switch schedules
//! - TSC to wall clock conversion using the perf subsystem's parameters
//! - trace bundles in the format understood by trace-capable debug servers
//!
//! # Example
//!
//! The following example traces a single thread of a toy live process, with
//! trace "buffers" that are plain lists of little-endian instruction
//! pointers and a closure [`Engine`] decoding them.
//!
//! ```
//! use ipt_session::config::Config;
//! use ipt_session::cpu::{CpuInfo, Vendor};
//! use ipt_session::engine;
//! use ipt_session::entry::Instruction;
//! use ipt_session::schedule::Schedule;
//! use ipt_session::session::Session;
//! use ipt_session::source::{self, LiveProcess, StartRequest};
//! use ipt_session::tsc;
//!
//! // A toy tracing host which counts its stops
//! struct Host {
//!     stops: u64,
//! }
//!
//! impl LiveProcess for Host {
//!     fn stop_generation(&mut self) -> Result<u64, source::Error> {
//!         Ok(self.stops)
//!     }
//!     fn supports_per_cpu(&mut self) -> Result<bool, source::Error> {
//!         Ok(false)
//!     }
//!     fn start(&mut self, _request: &StartRequest) -> Result<(), source::Error> {
//!         Ok(())
//!     }
//!     fn stop(&mut self) -> Result<(), source::Error> {
//!         self.stops += 1;
//!         Ok(())
//!     }
//!     fn cpu_info(&mut self) -> Result<CpuInfo, source::Error> {
//!         Ok(CpuInfo {
//!             vendor: Vendor::Intel,
//!             family: 6,
//!             model: 158,
//!             stepping: 10,
//!         })
//!     }
//!     fn tsc_conversion(&mut self) -> Result<Option<tsc::Conversion>, source::Error> {
//!         Ok(None)
//!     }
//!     fn schedule(&mut self) -> Result<Schedule, source::Error> {
//!         Ok(Schedule::default())
//!     }
//! }
//!
//! let engine = engine::from_fn(|buffer: &[u8], _cpu: &CpuInfo| {
//!     buffer
//!         .chunks_exact(8)
//!         .map(|c| u64::from_le_bytes(c.try_into().expect("8 byte chunk")))
//!         .map(|ip| Instruction::new(ip).into())
//!         .collect()
//! });
//!
//! let mut session = Session::live(engine, Host { stops: 0 });
//! session.start(Config::default())?;
//!
//! // ... the thread runs; the debugger reads its trace buffer ...
//! session.on_thread_buffer_read(42, &0x1000u64.to_le_bytes())?;
//!
//! let decoded = session.decoded_thread(42)?;
//! assert_eq!(decoded.instruction_count(), 1);
//! for insn in decoded.instructions() {
//!     println!("ip: {:#x}", insn.ip());
//! }
//! # Ok::<(), ipt_session::session::Error>(())
//! ```

pub mod bundle;
pub mod config;
pub mod cpu;
pub mod cursor;
pub mod engine;
pub mod entry;
pub mod schedule;
pub mod session;
pub mod source;
pub mod timer;
pub mod tsc;

pub use engine::Engine;
pub use session::{Session, Trace};

/// Identifier of a thread, as reported by the traced process' OS
pub type Tid = u64;

/// Name of the trace technology this crate implements
///
/// Appears as the `type` tag in start requests and trace bundles. Bundles
/// tagged differently belong to some other trace technology and are
/// rejected.
pub const TRACE_KIND: &str = "intel-pt";
