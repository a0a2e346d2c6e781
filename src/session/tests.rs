// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
use super::*;

use core::num::NonZeroU32;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::config;
use crate::cpu::Vendor;
use crate::engine::from_fn;
use crate::entry::Instruction;
use crate::schedule::Slice;
use crate::source;

#[test]
fn start_forwards_the_configuration() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    let config = Config {
        threads: Some(vec![1, 2]),
        buffer_size: 8192,
        enable_tsc: true,
        ..Config::default()
    };
    session.start(config).expect("Could not start tracing");
    assert_eq!(
        host.borrow().starts,
        vec![serde_json::json!({
            "type": "intel-pt",
            "tids": [1, 2],
            "iptTraceSize": 8192,
            "enableTsc": true,
            "perCpuTracing": false,
        })]
    );
}

#[test]
fn start_rejects_invalid_configurations() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));

    let res = session.start(Config {
        buffer_size: 1000,
        ..Config::default()
    });
    assert!(matches!(
        res,
        Err(Error::Configuration(config::Error::InvalidBufferSize(1000))),
    ));

    let res = session.start(Config {
        per_cpu: true,
        ..Config::default()
    });
    assert!(matches!(
        res,
        Err(Error::Configuration(config::Error::PerCpuUnsupported)),
    ));

    // nothing must have reached the host
    assert!(host.borrow().starts.is_empty());
    assert!(matches!(session.decoded_thread(1), Err(Error::NotTracing)));
}

#[test]
fn start_while_tracing_fails() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    assert!(matches!(
        session.start(Config::default()),
        Err(Error::AlreadyTracing),
    ));
    assert_eq!(host.borrow().starts.len(), 1);
}

#[test]
fn thread_decode_happens_once() {
    let host = host();
    let decodes = Rc::new(Cell::new(0));
    let mut session = live_session(Rc::clone(&host), Rc::clone(&decodes));
    session
        .start(Config {
            threads: Some(vec![1, 2]),
            enable_tsc: true,
            ..Config::default()
        })
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(1, &buffer(&[(0x1000, Some(5)), (0x1004, Some(6)), (0x1008, None)]))
        .expect("Could not push buffer");

    let first = session.decoded_thread(1).expect("Could not decode");
    let second = session.decoded_thread(1).expect("Could not decode");
    assert_eq!(decodes.get(), 1);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(ips(&first), [0x1000, 0x1004, 0x1008]);
}

#[test]
fn only_queried_threads_are_decoded() {
    let host = host();
    let decodes = Rc::new(Cell::new(0));
    let mut session = live_session(Rc::clone(&host), Rc::clone(&decodes));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(1, &buffer(&[(0x1000, None)]))
        .expect("Could not push buffer");
    session
        .on_thread_buffer_read(2, &buffer(&[(0x2000, None)]))
        .expect("Could not push buffer");

    session.decoded_thread(1).expect("Could not decode");
    assert_eq!(decodes.get(), 1);
}

#[test]
fn missing_buffers_decode_to_empty() {
    let host = host();
    let decodes = Rc::new(Cell::new(0));
    let mut session = live_session(Rc::clone(&host), Rc::clone(&decodes));
    session
        .start(Config {
            threads: Some(vec![5]),
            ..Config::default()
        })
        .expect("Could not start tracing");

    let decoded = session.decoded_thread(5).expect("Could not decode");
    assert!(decoded.is_empty());
    assert_eq!(decodes.get(), 0);
}

#[test]
fn threads_outside_the_traced_set_are_unknown() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config {
            threads: Some(vec![1, 2]),
            ..Config::default()
        })
        .expect("Could not start tracing");

    assert!(matches!(
        session.decoded_thread(3),
        Err(Error::UnknownThread(3)),
    ));
    assert!(matches!(
        session.raw_trace_size(3),
        Err(Error::UnknownThread(3)),
    ));
    assert!(!session.is_traced(3).expect("Could not query"));
    assert!(session.is_traced(1).expect("Could not query"));
}

#[test]
fn open_scope_traces_every_thread() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");

    assert!(session.is_traced(12345).expect("Could not query"));
    let decoded = session.decoded_thread(12345).expect("Could not decode");
    assert!(decoded.is_empty());
}

#[test]
fn corrupt_records_decode_to_error_entries() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(
            7,
            &buffer(&[(0x1000, None), (u64::MAX, None), (0x1008, None)]),
        )
        .expect("Could not push buffer");

    let decoded = session.decoded_thread(7).expect("Could not decode");
    assert_eq!(decoded.len(), 3);
    assert_eq!(decoded.instruction_count(), 2);
    assert_eq!(decoded.error_count(), 1);
    assert_eq!(ips(&decoded), [0x1000, 0x1008]);
}

#[test]
fn new_stop_generation_discards_decoded_traces() {
    let host = host();
    let decodes = Rc::new(Cell::new(0));
    let mut session = live_session(Rc::clone(&host), Rc::clone(&decodes));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(7, &buffer(&[(0x1000, None)]))
        .expect("Could not push buffer");
    let old = session.decoded_thread(7).expect("Could not decode");

    host.borrow_mut().generation = 1;
    let fresh = session.decoded_thread(7).expect("Could not decode");
    assert!(fresh.is_empty());
    assert_eq!(decodes.get(), 1);
    // the old snapshot remains readable
    assert_eq!(ips(&old), [0x1000]);

    session
        .on_thread_buffer_read(7, &buffer(&[(0x2000, None)]))
        .expect("Could not push buffer");
    let renewed = session.decoded_thread(7).expect("Could not decode");
    assert_eq!(ips(&renewed), [0x2000]);
    assert_eq!(decodes.get(), 2);
}

#[test]
fn unchanged_generation_reuses_the_storage() {
    let host = host();
    host.borrow_mut().per_cpu = true;
    host.borrow_mut().schedule = Schedule::new(vec![slice(1, 0, 10, 20)]);
    let decodes = Rc::new(Cell::new(0));
    let mut session = live_session(Rc::clone(&host), Rc::clone(&decodes));
    session
        .start(per_cpu_config())
        .expect("Could not start tracing");

    host.borrow_mut().generation = 1;
    session
        .on_cpu_buffer_read(0, &buffer(&[(0x1000, Some(10))]))
        .expect("Could not push buffer");
    let first = session.decoded_thread(1).expect("Could not decode");
    let second = session.decoded_thread(1).expect("Could not decode");

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(decodes.get(), 1);
    assert_eq!(host.borrow().schedule_fetches, 1);
    assert_eq!(host.borrow().tsc_fetches, 2);
}

#[test]
fn tsc_conversion_follows_the_storage() {
    let host = host();
    host.borrow_mut().tsc = Some(conversion());
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");

    // available before the process first stops
    assert_eq!(
        session.tsc_conversion().expect("Could not query"),
        Some(conversion()),
    );
    assert_eq!(host.borrow().tsc_fetches, 1);

    host.borrow_mut().tsc = None;
    host.borrow_mut().generation = 1;
    assert_eq!(session.tsc_conversion().expect("Could not query"), None);

    host.borrow_mut().tsc = Some(conversion());
    host.borrow_mut().generation = 2;
    assert_eq!(
        session.tsc_conversion().expect("Could not query"),
        Some(conversion()),
    );
    assert_eq!(host.borrow().tsc_fetches, 3);
}

#[test]
fn tsc_conversion_failures_are_not_fatal() {
    let host = host();
    host.borrow_mut().tsc_fails = true;
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");

    host.borrow_mut().generation = 1;
    session
        .on_thread_buffer_read(7, &buffer(&[(0x1000, None)]))
        .expect("Could not push buffer");
    assert_eq!(ips(&session.decoded_thread(7).expect("Could not decode")), [0x1000]);
    assert_eq!(session.tsc_conversion().expect("Could not query"), None);
}

#[test]
fn schedule_failures_fail_the_refresh() {
    let host = host();
    host.borrow_mut().per_cpu = true;
    host.borrow_mut().schedule_fails = true;
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(per_cpu_config())
        .expect("Could not start tracing");

    host.borrow_mut().generation = 1;
    assert!(matches!(session.decoded_thread(1), Err(Error::Source(_))));

    // the next query retries the rebuild
    host.borrow_mut().schedule_fails = false;
    host.borrow_mut().schedule = Schedule::new(vec![slice(1, 0, 10, 20)]);
    let decoded = session.decoded_thread(1).expect("Could not decode");
    assert!(decoded.is_empty());
}

#[test]
fn cpu_streams_are_decoded_once() {
    let host = host();
    host.borrow_mut().per_cpu = true;
    host.borrow_mut().schedule = Schedule::new(vec![
        slice(1, 0, 10, 20),
        slice(2, 0, 20, 30),
        slice(1, 1, 30, 40),
    ]);
    let decodes = Rc::new(Cell::new(0));
    let mut session = live_session(Rc::clone(&host), Rc::clone(&decodes));
    session
        .start(per_cpu_config())
        .expect("Could not start tracing");

    host.borrow_mut().generation = 1;
    session
        .on_cpu_buffer_read(
            0,
            &buffer(&[(0x1000, Some(10)), (0x1004, None), (0x2000, Some(25))]),
        )
        .expect("Could not push buffer");
    session
        .on_cpu_buffer_read(1, &buffer(&[(0x1008, Some(32))]))
        .expect("Could not push buffer");

    let t1 = session.decoded_thread(1).expect("Could not decode");
    assert_eq!(decodes.get(), 2);
    let t2 = session.decoded_thread(2).expect("Could not decode");
    assert_eq!(decodes.get(), 2);

    // thread 1 migrated from cpu 0 to cpu 1; its entries follow the schedule
    assert_eq!(ips(&t1), [0x1000, 0x1004, 0x1008]);
    assert_eq!(ips(&t2), [0x2000]);
}

#[test]
fn untimed_prefixes_belong_to_the_earliest_slice() {
    let host = host();
    host.borrow_mut().per_cpu = true;
    host.borrow_mut().schedule = Schedule::new(vec![
        slice(3, 1, 5, 15),
        slice(1, 0, 10, 20),
        slice(2, 0, 20, 30),
    ]);
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(per_cpu_config())
        .expect("Could not start tracing");

    host.borrow_mut().generation = 1;
    session
        .on_cpu_buffer_read(
            0,
            &buffer(&[(0x500, None), (0x1000, Some(12)), (0x2000, Some(22))]),
        )
        .expect("Could not push buffer");
    session
        .on_cpu_buffer_read(1, &buffer(&[(0x900, None)]))
        .expect("Could not push buffer");

    let t1 = session.decoded_thread(1).expect("Could not decode");
    let t2 = session.decoded_thread(2).expect("Could not decode");
    let t3 = session.decoded_thread(3).expect("Could not decode");
    assert_eq!(ips(&t1), [0x500, 0x1000]);
    assert_eq!(ips(&t2), [0x2000]);
    assert_eq!(ips(&t3), [0x900]);
}

#[test]
fn cpu_buffer_pushes_invalidate_affected_threads() {
    let host = host();
    host.borrow_mut().per_cpu = true;
    host.borrow_mut().schedule =
        Schedule::new(vec![slice(1, 0, 10, 20), slice(3, 1, 30, 40)]);
    let decodes = Rc::new(Cell::new(0));
    let mut session = live_session(Rc::clone(&host), Rc::clone(&decodes));
    session
        .start(per_cpu_config())
        .expect("Could not start tracing");

    host.borrow_mut().generation = 1;
    session
        .on_cpu_buffer_read(0, &buffer(&[(0x1000, Some(10))]))
        .expect("Could not push buffer");
    session
        .on_cpu_buffer_read(1, &buffer(&[(0x3000, Some(30))]))
        .expect("Could not push buffer");
    session.decoded_thread(1).expect("Could not decode");
    let t3 = session.decoded_thread(3).expect("Could not decode");
    assert_eq!(decodes.get(), 2);

    session
        .on_cpu_buffer_read(0, &buffer(&[(0x5000, Some(11))]))
        .expect("Could not push buffer");
    let t1 = session.decoded_thread(1).expect("Could not decode");
    assert_eq!(ips(&t1), [0x5000]);
    assert_eq!(decodes.get(), 3);
    // thread 3 never ran on cpu 0, its reconstruction survives
    let t3_again = session.decoded_thread(3).expect("Could not decode");
    assert!(Arc::ptr_eq(&t3, &t3_again));
    assert_eq!(decodes.get(), 3);
}

#[test]
fn cpu_buffers_are_rejected_when_tracing_per_thread() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    assert!(matches!(
        session.on_cpu_buffer_read(0, &[]),
        Err(Error::UnknownCpu(0)),
    ));
}

#[test]
fn thread_buffers_are_rejected_when_tracing_per_cpu() {
    let host = host();
    host.borrow_mut().per_cpu = true;
    host.borrow_mut().schedule = Schedule::new(vec![slice(1, 0, 10, 20)]);
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(per_cpu_config())
        .expect("Could not start tracing");
    host.borrow_mut().generation = 1;
    assert!(matches!(
        session.on_thread_buffer_read(1, &[]),
        Err(Error::UnknownThread(1)),
    ));
    assert!(matches!(
        session.on_cpu_buffer_read(9, &[]),
        Err(Error::UnknownCpu(9)),
    ));
}

#[test]
fn queries_require_active_tracing() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));

    assert!(matches!(session.decoded_thread(1), Err(Error::NotTracing)));
    assert!(matches!(session.cursor(1), Err(Error::NotTracing)));
    assert!(matches!(session.tsc_conversion(), Err(Error::NotTracing)));
    assert!(matches!(session.raw_trace_size(1), Err(Error::NotTracing)));
    assert!(matches!(session.stop(), Err(Error::NotTracing)));
    assert!(!session.is_traced(1).expect("Could not query"));
}

#[test]
fn stopped_sessions_can_restart() {
    let host = host();
    let decodes = Rc::new(Cell::new(0));
    let mut session = live_session(Rc::clone(&host), Rc::clone(&decodes));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(7, &buffer(&[(0x1000, None)]))
        .expect("Could not push buffer");
    session.decoded_thread(7).expect("Could not decode");

    session.stop().expect("Could not stop tracing");
    assert_eq!(host.borrow().stops, 1);
    assert!(matches!(session.decoded_thread(7), Err(Error::NotTracing)));
    assert!(!session.is_traced(7).expect("Could not query"));

    session
        .start(Config {
            threads: Some(vec![8]),
            ..Config::default()
        })
        .expect("Could not restart tracing");
    assert_eq!(host.borrow().starts.len(), 2);
    assert!(matches!(
        session.decoded_thread(7),
        Err(Error::UnknownThread(7)),
    ));
    assert!(session.decoded_thread(8).expect("Could not decode").is_empty());

    // timings accumulated before the stop survive it
    let timer = session.timer().expect("Could not access timer");
    assert!(timer.thread_times(7).is_some());
}

#[test]
fn raw_trace_size_reports_buffer_bytes() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(7, &buffer(&[(0x1000, None), (0x1004, None)]))
        .expect("Could not push buffer");

    assert_eq!(session.raw_trace_size(7).expect("Could not query"), Some(32));
    assert_eq!(session.raw_trace_size(8).expect("Could not query"), None);
}

#[test]
fn trace_info_summarizes_a_thread() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(
            7,
            &buffer(&[(0x1000, Some(10)), (u64::MAX, None), (0x1008, Some(42))]),
        )
        .expect("Could not push buffer");

    let info = session.trace_info(7).expect("Could not query");
    assert_eq!(info.tid, 7);
    assert_eq!(info.raw_trace_size, Some(48));
    assert_eq!(info.instructions, 2);
    assert_eq!(info.errors, 1);
    assert_eq!(info.tsc_range, Some((10, 42)));
    assert!(!info.thread_timings.is_empty());

    let text = info.to_string();
    assert!(text.contains("thread 7"));
    assert!(text.contains("instructions: 2"));
    assert!(text.contains("decode errors: 1"));
    assert!(text.contains("tsc range: 10 .. 42"));
}

#[test]
fn cpu_info_is_fetched_once() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(7, &buffer(&[(0x1000, None)]))
        .expect("Could not push buffer");

    session.decoded_thread(7).expect("Could not decode");
    host.borrow_mut().generation = 1;
    session.decoded_thread(7).expect("Could not decode");
    assert_eq!(session.cpu_info().expect("Could not query"), CPU);
    assert_eq!(host.borrow().cpu_info_fetches, 1);
}

#[test]
fn cpu_info_failures_are_retried() {
    let host = Rc::new(RefCell::new(Host::default()));
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(7, &buffer(&[(0x1000, None)]))
        .expect("Could not push buffer");

    assert!(matches!(
        session.decoded_thread(7),
        Err(Error::Unavailable {
            what: "cpu info",
            ..
        }),
    ));

    host.borrow_mut().cpu_info = Some(CPU);
    let decoded = session.decoded_thread(7).expect("Could not decode");
    assert_eq!(ips(&decoded), [0x1000]);
    assert_eq!(host.borrow().cpu_info_fetches, 2);
}

#[test]
fn save_and_load_round_trip() {
    let host = host();
    host.borrow_mut().tsc = Some(conversion());
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    host.borrow_mut().generation = 1;
    session
        .on_thread_buffer_read(1, &buffer(&[(0x1000, None), (0x1004, None)]))
        .expect("Could not push buffer");
    session
        .on_thread_buffer_read(2, &buffer(&[(u64::MAX, None)]))
        .expect("Could not push buffer");

    let dir = scratch_dir("round-trip");
    let bundle = session.save_to_disk(&dir).expect("Could not save");
    let json = std::fs::read_to_string(dir.join("trace.json")).expect("Could not read bundle");
    let loaded: Bundle = serde_json::from_str(&json).expect("Could not parse bundle");
    assert_eq!(loaded, bundle);

    let mut postmortem =
        Session::postmortem(engine(Rc::new(Cell::new(0))), loaded).expect("Could not load");
    assert_eq!(
        ips(&postmortem.decoded_thread(1).expect("Could not decode")),
        [0x1000, 0x1004],
    );
    assert_eq!(
        postmortem
            .decoded_thread(2)
            .expect("Could not decode")
            .error_count(),
        1,
    );
    assert_eq!(postmortem.cpu_info().expect("Could not query"), CPU);
    assert_eq!(
        postmortem.tsc_conversion().expect("Could not query"),
        Some(conversion()),
    );
    assert!(matches!(
        postmortem.decoded_thread(9),
        Err(Error::UnknownThread(9)),
    ));
    assert!(!postmortem.is_traced(9).expect("Could not query"));

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn per_cpu_bundles_keep_their_schedule() {
    let host = host();
    host.borrow_mut().per_cpu = true;
    host.borrow_mut().schedule =
        Schedule::new(vec![slice(1, 0, 10, 20), slice(2, 0, 20, 30)]);
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(per_cpu_config())
        .expect("Could not start tracing");
    host.borrow_mut().generation = 1;
    session
        .on_cpu_buffer_read(0, &buffer(&[(0x1000, Some(10)), (0x2000, Some(25))]))
        .expect("Could not push buffer");

    let dir = scratch_dir("per-cpu-bundle");
    session.save_to_disk(&dir).expect("Could not save");
    let json = std::fs::read_to_string(dir.join("trace.json")).expect("Could not read bundle");
    let loaded: Bundle = serde_json::from_str(&json).expect("Could not parse bundle");

    let mut postmortem =
        Session::postmortem(engine(Rc::new(Cell::new(0))), loaded).expect("Could not load");
    assert_eq!(
        ips(&postmortem.decoded_thread(1).expect("Could not decode")),
        [0x1000],
    );
    assert_eq!(
        ips(&postmortem.decoded_thread(2).expect("Could not decode")),
        [0x2000],
    );
    assert_eq!(postmortem.raw_trace_size(1).expect("Could not query"), None);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn saving_skips_threads_without_data() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config {
            threads: Some(vec![1, 2]),
            ..Config::default()
        })
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(1, &buffer(&[(0x1000, None)]))
        .expect("Could not push buffer");

    let dir = scratch_dir("skip-missing");
    let bundle = session.save_to_disk(&dir).expect("Could not save");
    match &bundle.traces {
        Traces::PerThread(traces) => assert_eq!(traces.len(), 1),
        Traces::PerCpu { .. } => panic!("expected a per-thread bundle"),
    }

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn postmortem_sessions_are_not_live() {
    let bundle = Bundle::per_thread(vec![]).with_cpu_info(CPU);
    let mut session =
        Session::postmortem(engine(Rc::new(Cell::new(0))), bundle).expect("Could not load");

    assert!(matches!(
        session.start(Config::default()),
        Err(Error::NotLive),
    ));
    assert!(matches!(session.stop(), Err(Error::NotLive)));
    assert!(matches!(
        session.on_thread_buffer_read(1, &[]),
        Err(Error::NotLive),
    ));
    assert!(matches!(
        session.on_cpu_buffer_read(0, &[]),
        Err(Error::NotLive),
    ));
}

#[test]
fn unreadable_trace_files_decode_to_error_entries() {
    let bundle = Bundle::per_thread(vec![ThreadTrace {
        tid: 3,
        ipt_trace: "/nonexistent/ipt-session/thread-3.trace".into(),
    }])
    .with_cpu_info(CPU);
    let mut session =
        Session::postmortem(engine(Rc::new(Cell::new(0))), bundle).expect("Could not load");

    let decoded = session.decoded_thread(3).expect("Could not decode");
    assert_eq!(decoded.instruction_count(), 0);
    assert_eq!(decoded.error_count(), 1);
}

#[test]
fn foreign_bundles_are_rejected() {
    let mut bundle = Bundle::per_thread(vec![]);
    bundle.kind = "ctf".into();
    let res = Session::postmortem(engine(Rc::new(Cell::new(0))), bundle);
    assert!(matches!(res, Err(Error::UnsupportedBundle(kind)) if kind == "ctf"));
}

#[test]
fn sessions_are_usable_as_trace_objects() {
    let host = host();
    let mut session: Box<dyn Trace> =
        Box::new(live_session(Rc::clone(&host), Rc::new(Cell::new(0))));
    session
        .start(Config::default())
        .expect("Could not start tracing");

    let mut cursor = session.cursor(7).expect("Could not create cursor");
    assert_eq!(cursor.next(), None);
    assert!(matches!(session.trace_info(7), Ok(Info { tid: 7, .. })));
}

#[test]
fn cursors_walk_the_decoded_trace() {
    let host = host();
    let mut session = live_session(Rc::clone(&host), Rc::new(Cell::new(0)));
    session
        .start(Config::default())
        .expect("Could not start tracing");
    session
        .on_thread_buffer_read(7, &buffer(&[(0x1000, None), (0x1004, None)]))
        .expect("Could not push buffer");

    let mut cursor = session.cursor(7).expect("Could not create cursor");
    let walked: Vec<_> = cursor
        .by_ref()
        .filter_map(|e| e.instruction().map(Instruction::ip))
        .collect();
    assert_eq!(walked, [0x1000, 0x1004]);

    // the cursor survives a storage refresh
    host.borrow_mut().generation = 1;
    session.refresh().expect("Could not refresh");
    cursor.seek_start();
    assert_eq!(cursor.count(), 2);
}

const CPU: CpuInfo = CpuInfo {
    vendor: Vendor::Intel,
    family: 6,
    model: 158,
    stepping: 10,
};

/// Scriptable state of a fake tracing host
#[derive(Default)]
struct Host {
    generation: u64,
    per_cpu: bool,
    starts: Vec<serde_json::Value>,
    stops: usize,
    cpu_info: Option<CpuInfo>,
    cpu_info_fetches: usize,
    tsc: Option<tsc::Conversion>,
    tsc_fails: bool,
    tsc_fetches: usize,
    schedule: Schedule,
    schedule_fails: bool,
    schedule_fetches: usize,
}

fn host() -> Rc<RefCell<Host>> {
    Rc::new(RefCell::new(Host {
        cpu_info: Some(CPU),
        ..Default::default()
    }))
}

/// Adapter exposing a shared [`Host`] as a [`LiveProcess`]
struct FakeProcess(Rc<RefCell<Host>>);

impl LiveProcess for FakeProcess {
    fn stop_generation(&mut self) -> Result<u64, source::Error> {
        Ok(self.0.borrow().generation)
    }

    fn supports_per_cpu(&mut self) -> Result<bool, source::Error> {
        Ok(self.0.borrow().per_cpu)
    }

    fn start(&mut self, request: &StartRequest) -> Result<(), source::Error> {
        let request = serde_json::to_value(request).map_err(source::Error::new)?;
        self.0.borrow_mut().starts.push(request);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), source::Error> {
        self.0.borrow_mut().stops += 1;
        Ok(())
    }

    fn cpu_info(&mut self) -> Result<CpuInfo, source::Error> {
        let mut host = self.0.borrow_mut();
        host.cpu_info_fetches += 1;
        host.cpu_info
            .ok_or_else(|| source::Error::msg("no cpu info"))
    }

    fn tsc_conversion(&mut self) -> Result<Option<tsc::Conversion>, source::Error> {
        let mut host = self.0.borrow_mut();
        host.tsc_fetches += 1;
        if host.tsc_fails {
            Err(source::Error::msg("no tsc conversion"))
        } else {
            Ok(host.tsc)
        }
    }

    fn schedule(&mut self) -> Result<Schedule, source::Error> {
        let mut host = self.0.borrow_mut();
        host.schedule_fetches += 1;
        if host.schedule_fails {
            Err(source::Error::msg("no schedule"))
        } else {
            Ok(host.schedule.clone())
        }
    }
}

/// Create an [`Engine`] for the toy trace format, counting its invocations
///
/// The toy format consists of 16 byte records of an instruction pointer and
/// a TSC, both little endian. A TSC of `u64::MAX` means "no timestamp"; an
/// instruction pointer of `u64::MAX` decodes to an error entry.
fn engine(decodes: Rc<Cell<usize>>) -> impl Engine {
    from_fn(move |buffer: &[u8], _: &CpuInfo| {
        decodes.set(decodes.get() + 1);
        buffer.chunks_exact(16).map(decode_record).collect()
    })
}

fn decode_record(record: &[u8]) -> Entry {
    let ip = u64::from_le_bytes(record[..8].try_into().expect("ip bytes"));
    let tsc = u64::from_le_bytes(record[8..].try_into().expect("tsc bytes"));
    if ip == u64::MAX {
        return entry::Error::new("corrupted record").into();
    }
    let insn = Instruction::new(ip);
    match tsc {
        u64::MAX => insn.into(),
        tsc => insn.with_tsc(tsc).into(),
    }
}

fn live_session(host: Rc<RefCell<Host>>, decodes: Rc<Cell<usize>>) -> Session<impl Engine> {
    Session::live(engine(decodes), FakeProcess(host))
}

fn buffer(records: &[(u64, Option<u64>)]) -> Vec<u8> {
    records
        .iter()
        .flat_map(|(ip, tsc)| {
            let mut bytes = ip.to_le_bytes().to_vec();
            bytes.extend(tsc.unwrap_or(u64::MAX).to_le_bytes());
            bytes
        })
        .collect()
}

fn ips(decoded: &DecodedThread) -> Vec<u64> {
    decoded.instructions().map(Instruction::ip).collect()
}

fn slice(tid: Tid, cpu: cpu::Id, start_tsc: u64, end_tsc: u64) -> Slice {
    Slice {
        tid,
        cpu,
        start_tsc,
        end_tsc,
    }
}

fn conversion() -> tsc::Conversion {
    tsc::Conversion {
        time_mult: NonZeroU32::new(1000).expect("nonzero multiplier"),
        time_shift: 10,
        time_zero: 1_000_000,
    }
}

fn per_cpu_config() -> Config {
    Config {
        per_cpu: true,
        enable_tsc: true,
        ..Config::default()
    }
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ipt-session-{}-{name}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("Could not create scratch dir");
    dir
}
