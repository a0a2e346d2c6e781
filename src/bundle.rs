// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Postmortem trace bundles
//!
//! A bundle describes a trace captured earlier: which threads or cpus were
//! traced, where their raw trace files live, and the session-invariant data
//! (processor identification, TSC conversion parameters) recorded at capture
//! time. Loading a bundle into a
//! [`Session`][crate::session::Session::postmortem] makes the trace
//! queryable exactly like a live one, minus refreshing.
//!
//! Trace file paths are used as given. Loaders reading a bundle from disk
//! should call [`resolve_paths`][Bundle::resolve_paths] to rebase relative
//! paths onto the bundle's directory first.

use std::path::{Path, PathBuf};

use crate::Tid;
use crate::cpu::{self, CpuInfo};
use crate::schedule::Schedule;
use crate::tsc;


/// Description of a captured trace
///
/// The serialized form is a single JSON object, see [`schema`][Self::schema].
/// The two trace representations are mutually exclusive by construction: a
/// bundle either lists per-thread trace files or per-cpu trace files with
/// the context switch schedule needed to interpret them.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    /// Trace technology this bundle was captured with
    #[serde(rename = "type")]
    pub kind: String,
    /// Identification of the processor the trace was collected on
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cpu_info: Option<CpuInfo>,
    /// TSC conversion parameters recorded at capture time
    #[serde(
        rename = "tscPerfZeroConversion",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub tsc_conversion: Option<tsc::Conversion>,
    /// The traced data itself
    #[serde(flatten)]
    pub traces: Traces,
}

impl Bundle {
    /// Create a bundle listing one trace file per thread
    pub fn per_thread(traces: Vec<ThreadTrace>) -> Self {
        Self {
            kind: crate::TRACE_KIND.into(),
            cpu_info: None,
            tsc_conversion: None,
            traces: Traces::PerThread(traces),
        }
    }

    /// Create a bundle listing one trace file per cpu
    pub fn per_cpu(traces: Vec<CpuTrace>, schedule: Schedule) -> Self {
        Self {
            kind: crate::TRACE_KIND.into(),
            cpu_info: None,
            tsc_conversion: None,
            traces: Traces::PerCpu { traces, schedule },
        }
    }

    /// Attach the processor identification recorded at capture time
    pub fn with_cpu_info(self, cpu_info: CpuInfo) -> Self {
        Self {
            cpu_info: Some(cpu_info),
            ..self
        }
    }

    /// Attach the TSC conversion parameters recorded at capture time
    pub fn with_tsc_conversion(self, conversion: tsc::Conversion) -> Self {
        Self {
            tsc_conversion: Some(conversion),
            ..self
        }
    }

    /// Check whether this bundle holds a trace this crate can decode
    pub fn is_supported(&self) -> bool {
        self.kind == crate::TRACE_KIND
    }

    /// Rebase all relative trace file paths onto the given directory
    pub fn resolve_paths(&mut self, dir: &Path) {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = dir.join(&*path);
            }
        };
        match &mut self.traces {
            Traces::PerThread(traces) => traces.iter_mut().for_each(|t| rebase(&mut t.ipt_trace)),
            Traces::PerCpu { traces, .. } => {
                traces.iter_mut().for_each(|t| rebase(&mut t.ipt_trace))
            }
        }
    }

    /// Retrieve a description of the accepted JSON representation
    pub fn schema() -> &'static str {
        r#"{
  "type": "intel-pt",
  "cpuInfo"?: {
    "vendor": "GenuineIntel" | "unknown",
    "family": integer,
    "model": integer,
    "stepping": integer
  },
  "tscPerfZeroConversion"?: {
    "timeMult": integer,
    "timeShift": integer,
    "timeZero": integer
  },
  // Exactly one of "threads" and "cpus" must be present.
  "threads"?: [
    { "tid": integer, "iptTrace": "path to raw thread trace" }
  ],
  "cpus"?: {
    "traces": [
      { "id": integer, "iptTrace": "path to raw cpu trace" }
    ],
    "schedule": [
      { "tid": integer, "cpu": integer, "startTsc": integer, "endTsc": integer }
    ]
  }
}"#
    }
}

/// The traced data listed in a [`Bundle`]
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Traces {
    /// One raw trace file per traced thread
    #[serde(rename = "threads")]
    PerThread(Vec<ThreadTrace>),
    /// One raw trace file per cpu, plus the schedule for attribution
    #[serde(rename = "cpus")]
    PerCpu {
        traces: Vec<CpuTrace>,
        schedule: Schedule,
    },
}

/// Raw trace captured for a single thread
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ThreadTrace {
    pub tid: Tid,
    #[serde(rename = "iptTrace")]
    pub ipt_trace: PathBuf,
}

/// Raw trace captured for a single cpu
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CpuTrace {
    pub id: cpu::Id,
    #[serde(rename = "iptTrace")]
    pub ipt_trace: PathBuf,
}
