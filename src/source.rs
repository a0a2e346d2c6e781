// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Live process adapters
//!
//! In live mode, a [`Session`][crate::session::Session] observes a process
//! that is still running under a debugger. Everything it needs from that
//! process goes through the [`LiveProcess`] trait: starting and stopping
//! collection on the tracing host, probing capabilities, and fetching the
//! data that becomes decode storage state after each stop. How an adapter
//! reaches the host, e.g. over a remote debug protocol, is its own concern.
//!
//! Adapter failures are opaque to the session layer. They are wrapped in
//! [`Error`] and surfaced to the caller as-is, never retried.

use std::fmt;

use crate::config::Config;
use crate::cpu::CpuInfo;
use crate::schedule::Schedule;
use crate::tsc;

/// A process being traced live
///
/// The session calls these methods in a fixed pattern: [`start`][Self::start]
/// and [`stop`][Self::stop] bracket collection, [`stop_generation`][Self::stop_generation]
/// is polled on every query to detect that the process has stopped anew, and
/// the fetch methods are called once per observed stop while the session
/// rebuilds its decode storage.
pub trait LiveProcess {
    /// Retrieve the current stop generation
    ///
    /// The generation must change every time the process stops anew. The
    /// session compares it against the generation its storage was built for
    /// and discards the storage on mismatch. Values are compared, never
    /// ordered, so a plain stop counter works.
    fn stop_generation(&mut self) -> Result<u64, Error>;

    /// Check whether the tracing host can collect cpu-granular traces
    fn supports_per_cpu(&mut self) -> Result<bool, Error>;

    /// Start trace collection on the tracing host
    ///
    /// Any error the host reports, e.g. for an unsupported synchronization
    /// period, is returned as-is.
    fn start(&mut self, request: &StartRequest<'_>) -> Result<(), Error>;

    /// Stop trace collection on the tracing host
    fn stop(&mut self) -> Result<(), Error>;

    /// Fetch the identification of the processor being traced
    fn cpu_info(&mut self) -> Result<CpuInfo, Error>;

    /// Fetch the TSC conversion parameters
    ///
    /// Returns `Ok(None)` if the platform does not publish any. That is not
    /// an error; sessions then simply hand out no timestamp converter.
    fn tsc_conversion(&mut self) -> Result<Option<tsc::Conversion>, Error>;

    /// Fetch the context switch schedule covering the trace so far
    ///
    /// Only called for per-cpu sessions, once after each observed stop.
    fn schedule(&mut self) -> Result<Schedule, Error>;
}

impl<P: LiveProcess + ?Sized> LiveProcess for &mut P {
    fn stop_generation(&mut self) -> Result<u64, Error> {
        P::stop_generation(self)
    }

    fn supports_per_cpu(&mut self) -> Result<bool, Error> {
        P::supports_per_cpu(self)
    }

    fn start(&mut self, request: &StartRequest<'_>) -> Result<(), Error> {
        P::start(self, request)
    }

    fn stop(&mut self) -> Result<(), Error> {
        P::stop(self)
    }

    fn cpu_info(&mut self) -> Result<CpuInfo, Error> {
        P::cpu_info(self)
    }

    fn tsc_conversion(&mut self) -> Result<Option<tsc::Conversion>, Error> {
        P::tsc_conversion(self)
    }

    fn schedule(&mut self) -> Result<Schedule, Error> {
        P::schedule(self)
    }
}

impl<P: LiveProcess + ?Sized> LiveProcess for Box<P> {
    fn stop_generation(&mut self) -> Result<u64, Error> {
        P::stop_generation(self.as_mut())
    }

    fn supports_per_cpu(&mut self) -> Result<bool, Error> {
        P::supports_per_cpu(self.as_mut())
    }

    fn start(&mut self, request: &StartRequest<'_>) -> Result<(), Error> {
        P::start(self.as_mut(), request)
    }

    fn stop(&mut self) -> Result<(), Error> {
        P::stop(self.as_mut())
    }

    fn cpu_info(&mut self) -> Result<CpuInfo, Error> {
        P::cpu_info(self.as_mut())
    }

    fn tsc_conversion(&mut self) -> Result<Option<tsc::Conversion>, Error> {
        P::tsc_conversion(self.as_mut())
    }

    fn schedule(&mut self) -> Result<Schedule, Error> {
        P::schedule(self.as_mut())
    }
}

/// Start request forwarded to the tracing host
///
/// Serializes to the JSON object understood by trace-capable debug servers,
/// i.e. the session [`Config`] tagged with the trace technology.
#[derive(Debug, serde::Serialize)]
pub struct StartRequest<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    config: &'a Config,
}

impl<'a> StartRequest<'a> {
    /// Create a start request for the given session configuration
    pub fn new(config: &'a Config) -> Self {
        Self {
            kind: crate::TRACE_KIND,
            config,
        }
    }

    /// Retrieve the session configuration being requested
    pub fn config(&self) -> &Config {
        self.config
    }
}

/// Error reported by a [`LiveProcess`] adapter
///
/// Opaque to the session layer; whatever the adapter put in is what the
/// caller gets out.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(Box<dyn std::error::Error + Send + Sync + 'static>);

impl Error {
    /// Wrap an adapter specific error
    pub fn new(inner: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self(Box::new(inner))
    }

    /// Create an error from a bare message
    pub fn msg(message: impl fmt::Display) -> Self {
        Self(message.to_string().into())
    }
}
