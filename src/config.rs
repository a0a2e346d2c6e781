// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Trace session configuration

use crate::Tid;


/// Configuration of a tracing session
///
/// A configuration is fixed when tracing [starts][crate::session::Session::start]
/// and stays in effect until tracing stops. The serialized form uses the
/// field names of the start request understood by trace-capable debug
/// servers, so a configuration can be forwarded on the wire as-is.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Threads to trace, or `None` for all current and future threads
    ///
    /// Ignored and rejected in per-cpu mode, which always covers every
    /// thread of the process.
    #[serde(rename = "tids", skip_serializing_if = "Option::is_none", default)]
    pub threads: Option<Vec<Tid>>,
    /// Size in bytes of the trace buffer allocated per thread, or per cpu
    ///
    /// Must be a power of two, at least [`MIN_BUFFER_SIZE`]. When a buffer
    /// fills up, the oldest data is overwritten.
    #[serde(rename = "iptTraceSize")]
    pub buffer_size: u64,
    /// Cap on the total number of buffer bytes across all threads
    ///
    /// `None` means no cap. Only meaningful when tracing per thread.
    #[serde(
        rename = "processBufferSizeLimit",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub total_buffer_limit: Option<u64>,
    /// Record TSC timestamps alongside the instruction stream
    #[serde(rename = "enableTsc")]
    pub enable_tsc: bool,
    /// Period of synchronization points within the trace, as a power of 2
    ///
    /// `None` leaves the hardware default in place. Whether a given period
    /// is supported depends on the cpu; unsupported values are rejected by
    /// the tracing host when tracing starts.
    #[serde(rename = "psbPeriod", skip_serializing_if = "Option::is_none", default)]
    pub psb_period: Option<u64>,
    /// Trace per cpu instead of per thread
    ///
    /// Per-cpu buffers interleave all threads that ran on the cpu and
    /// require a context switch schedule for attribution.
    #[serde(rename = "perCpuTracing")]
    pub per_cpu: bool,
}

impl Config {
    /// Check this configuration for contradictions
    ///
    /// `per_cpu_supported` states whether the tracing host can collect
    /// cpu-granular traces at all.
    pub fn validate(&self, per_cpu_supported: bool) -> Result<(), Error> {
        if !self.buffer_size.is_power_of_two() || self.buffer_size < MIN_BUFFER_SIZE {
            return Err(Error::InvalidBufferSize(self.buffer_size));
        }
        if let Some(limit) = self.total_buffer_limit {
            if limit < self.buffer_size {
                return Err(Error::LimitBelowBufferSize {
                    limit,
                    unit: self.buffer_size,
                });
            }
        }
        if self.per_cpu {
            if !per_cpu_supported {
                return Err(Error::PerCpuUnsupported);
            }
            if self.threads.is_some() {
                return Err(Error::PerCpuWithThreads);
            }
        }
        Ok(())
    }
}

/// See [CONFIG] for default values of individual fields
impl Default for Config {
    fn default() -> Self {
        CONFIG
    }
}

/// Default [Config]uration
pub const CONFIG: Config = Config {
    threads: None,
    buffer_size: MIN_BUFFER_SIZE,
    total_buffer_limit: None,
    enable_tsc: false,
    psb_period: None,
    per_cpu: false,
};

/// Smallest permissible trace buffer size in bytes
///
/// Trace buffers are mapped in whole pages, so anything smaller than one
/// page is rejected.
pub const MIN_BUFFER_SIZE: u64 = 4096;

/// Configuration errors reported when tracing starts
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The requested buffer size cannot be mapped
    #[error("trace buffer size must be a power of 2 no less than {MIN_BUFFER_SIZE} bytes, got {0}")]
    InvalidBufferSize(u64),
    /// The total cap would not even fit a single buffer
    #[error("total buffer limit {limit} is below the size of a single buffer ({unit})")]
    LimitBelowBufferSize { limit: u64, unit: u64 },
    /// A thread subset was requested together with per-cpu tracing
    #[error("per-cpu tracing always covers all threads, a thread subset cannot be requested")]
    PerCpuWithThreads,
    /// The tracing host cannot collect cpu-granular traces
    #[error("per-cpu tracing is not supported on this host")]
    PerCpuUnsupported,
}
