// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Postmortem bundle inspector
//!
//! Loads a trace bundle saved earlier, for instance by the `synthetic`
//! example, decodes the traced threads and prints a summary plus the first
//! few entries of each. The raw traces are expected in the toy format the
//! `synthetic` example produces: 16 byte records, each a little endian
//! instruction pointer followed by a little endian TSC value, with
//! `u64::MAX` standing for "no timestamp".

use std::path::{Path, PathBuf};

use ipt_session::bundle::{Bundle, Traces};
use ipt_session::cpu::CpuInfo;
use ipt_session::{Session, engine, entry};

fn main() {
    let matches = clap::Command::new("Postmortem bundle inspector")
        .arg(
            clap::arg!(<bundle> "Path to the bundle's trace.json")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            clap::arg!(-t --thread <TID> "Inspect only the given thread")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            clap::arg!(-l --limit <NUM> "Entries to print per thread")
                .value_parser(clap::value_parser!(usize))
                .default_value("10"),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = matches
        .get_one::<PathBuf>("bundle")
        .expect("No bundle specified");
    let limit = *matches.get_one::<usize>("limit").expect("No entry limit");

    // Load the bundle description and anchor its trace files next to it
    let json = std::fs::read_to_string(path).expect("Could not read bundle description");
    let mut bundle: Bundle =
        serde_json::from_str(&json).expect("Could not parse bundle description");
    bundle.resolve_paths(path.parent().unwrap_or(Path::new(".")));

    // The threads to inspect: the requested one, or everything in the bundle
    let tids: Vec<u64> = match matches.get_one::<u64>("thread") {
        Some(tid) => vec![*tid],
        None => match &bundle.traces {
            Traces::PerThread(traces) => traces.iter().map(|t| t.tid).collect(),
            Traces::PerCpu { schedule, .. } => schedule.threads().into_iter().collect(),
        },
    };

    let mut session =
        Session::postmortem(toy_engine(), bundle).expect("Could not open trace bundle");
    let conversion = session
        .tsc_conversion()
        .expect("Could not query TSC conversion");

    for tid in tids {
        let info = session.trace_info(tid).expect("Could not summarize thread");
        println!("{info}");

        let cursor = session.cursor(tid).expect("Could not decode thread");
        let total = cursor.len();
        for entry in cursor.take(limit) {
            match entry {
                entry::Entry::Instruction(insn) => {
                    print!("    {:#014x}", insn.ip());
                    if let Some(tsc) = insn.tsc() {
                        print!("  tsc {tsc}");
                        if let Some(conversion) = conversion {
                            print!("  ({} ns)", conversion.to_nanos(tsc));
                        }
                    }
                    println!();
                }
                entry::Entry::Error(error) => println!("    <decode error: {}>", error.message()),
            }
        }
        if total > limit {
            println!("    ... {} more entries", total - limit);
        }
    }
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
