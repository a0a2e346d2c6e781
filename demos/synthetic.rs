// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Synthetic capture session
//!
//! This program runs a complete live tracing session against a scripted
//! tracing host instead of a real debugger, then saves the result as a
//! postmortem bundle which the `postmortem` example can load. The raw traces
//! use a toy format of 16 byte records, each a little endian instruction
//! pointer followed by a little endian TSC value, with `u64::MAX` standing
//! for "no timestamp". With `--per-cpu`, the host fabricates a context
//! switch schedule placing each thread in its own TSC window on one of two
//! cpus, and the buffers are handed over per cpu instead of per thread.
//!
//! Run with `RUST_LOG=debug` to watch the session's internals.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::rc::Rc;

use ipt_session::bundle::Traces;
use ipt_session::cpu::{CpuInfo, Vendor};
use ipt_session::schedule::{Schedule, Slice};
use ipt_session::source::{self, LiveProcess, StartRequest};
use ipt_session::{Session, config, engine, entry, tsc};

fn main() {
    let matches = clap::Command::new("Synthetic capture session")
        .arg(
            clap::arg!(<dir> "Directory to save the trace bundle to")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::arg!(-t --threads <NUM> "Number of threads to fabricate")
                .value_parser(clap::value_parser!(u64))
                .default_value("2"),
        )
        .arg(
            clap::arg!(-i --instructions <NUM> "Instructions per thread")
                .value_parser(clap::value_parser!(u64))
                .default_value("16"),
        )
        .arg(
            clap::arg!(--"per-cpu" "Trace per cpu rather than per thread")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let dir = matches
        .get_one::<PathBuf>("dir")
        .expect("No directory specified");
    let threads: u64 = *matches.get_one("threads").expect("No thread count");
    let instructions: u64 = *matches.get_one("instructions").expect("No instruction count");
    let per_cpu = matches.get_flag("per-cpu");

    // The host's script: each thread runs exactly once, in its own TSC window
    let slices = (0..threads)
        .map(|t| Slice {
            tid: TID_BASE + t,
            cpu: cpu_of(t),
            start_tsc: first_tsc(t, instructions),
            end_tsc: first_tsc(t, instructions) + instructions,
        })
        .collect();
    let generation = Rc::new(Cell::new(0));
    let host = Synthetic {
        generation: Rc::clone(&generation),
        schedule: Schedule::new(slices),
    };

    let mut session = Session::live(toy_engine(), host);
    session
        .start(config::Config {
            enable_tsc: true,
            per_cpu,
            ..Default::default()
        })
        .expect("Could not start tracing");

    // The traced process "runs" and "stops"...
    generation.set(1);

    // ...and we hand over the buffers a debugger would now read off the host
    if per_cpu {
        let mut buffers: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        for t in 0..threads {
            let buffer = buffers.entry(cpu_of(t)).or_default();
            for i in 0..instructions {
                buffer.extend_from_slice(&record(ip_of(t, i), first_tsc(t, instructions) + i));
            }
        }
        for (cpu, buffer) in buffers {
            session
                .on_cpu_buffer_read(cpu, &buffer)
                .expect("Could not hand over cpu trace buffer");
        }
    } else {
        for t in 0..threads {
            let buffer: Vec<u8> = (0..instructions)
                .flat_map(|i| record(ip_of(t, i), first_tsc(t, instructions) + i))
                .collect();
            session
                .on_thread_buffer_read(TID_BASE + t, &buffer)
                .expect("Could not hand over thread trace buffer");
        }
    }

    // Decode everything once so the summaries below carry timings
    for t in 0..threads {
        let info = session
            .trace_info(TID_BASE + t)
            .expect("Could not summarize thread");
        println!("{info}");
    }

    let bundle = session
        .save_to_disk(dir)
        .expect("Could not save trace bundle");
    let files = match &bundle.traces {
        Traces::PerThread(traces) => traces.len(),
        Traces::PerCpu { traces, .. } => traces.len(),
    };
    println!(
        "saved {files} trace files and trace.json to {}",
        dir.display()
    );
}

const CPUS: u64 = 2;
const TID_BASE: u64 = 1000;

fn cpu_of(t: u64) -> u32 {
    (t % CPUS) as u32
}

fn ip_of(t: u64, i: u64) -> u64 {
    0x0040_1000 + 0x1000 * t + 4 * i
}

/// TSC of thread `t`'s first instruction
///
/// Windows are spaced so that slices sharing a cpu never overlap, whatever
/// the instruction count.
fn first_tsc(t: u64, instructions: u64) -> u64 {
    (instructions + 1) * (t + 1)
}

/// Scripted stand-in for a tracing host
///
/// Pretends to be a two cpu Intel machine. The stop generation is shared
/// with `main`, which bumps it to simulate the traced process stopping.
struct Synthetic {
    generation: Rc<Cell<u64>>,
    schedule: Schedule,
}

impl LiveProcess for Synthetic {
    fn stop_generation(&mut self) -> Result<u64, source::Error> {
        Ok(self.generation.get())
    }

    fn supports_per_cpu(&mut self) -> Result<bool, source::Error> {
        Ok(true)
    }

    fn start(&mut self, _request: &StartRequest<'_>) -> Result<(), source::Error> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), source::Error> {
        Ok(())
    }

    fn cpu_info(&mut self) -> Result<CpuInfo, source::Error> {
        Ok(CpuInfo {
            vendor: Vendor::Intel,
            family: 6,
            model: 158,
            stepping: 10,
        })
    }

    fn tsc_conversion(&mut self) -> Result<Option<tsc::Conversion>, source::Error> {
        let time_mult = NonZeroU32::new(1000).expect("Could not fabricate TSC parameters");
        Ok(Some(tsc::Conversion {
            time_mult,
            time_shift: 10,
            time_zero: 1_000_000,
        }))
    }

    fn schedule(&mut self) -> Result<Schedule, source::Error> {
        Ok(self.schedule.clone())
    }
}

/// Encode a single timed record of the toy trace format
fn record(ip: u64, tsc: u64) -> [u8; 16] {
    let mut record = [0; 16];
    record[..8].copy_from_slice(&ip.to_le_bytes());
    record[8..].copy_from_slice(&tsc.to_le_bytes());
    record
}

/// Create a decode engine for the toy trace format
fn toy_engine() -> impl engine::Engine {
    engine::from_fn(|buffer: &[u8], _cpu: &CpuInfo| {
        buffer.chunks_exact(16).map(decode_record).collect()
    })
}

fn decode_record(record: &[u8]) -> entry::Entry {
    let ip = u64::from_le_bytes(record[..8].try_into().expect("Could not split record"));
    let tsc = u64::from_le_bytes(record[8..].try_into().expect("Could not split record"));
    if ip == u64::MAX {
        return entry::Error::new("corrupted record").into();
    }
    let insn = entry::Instruction::new(ip);
    match tsc {
        u64::MAX => insn.into(),
        tsc => insn.with_tsc(tsc).into(),
    }
}
