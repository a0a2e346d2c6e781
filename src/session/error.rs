// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Session specific errors

use std::path::PathBuf;

use crate::{Tid, config, cpu, source};

/// Error conditions reported by a [`Session`][super::Session]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested configuration is invalid or unsupported
    #[error(transparent)]
    Configuration(#[from] config::Error),
    /// Tracing was started while already active
    #[error("tracing is already active")]
    AlreadyTracing,
    /// An operation requiring active tracing was invoked without it
    #[error("tracing is not active")]
    NotTracing,
    /// A live-only operation was invoked on a postmortem session
    #[error("operation requires a live process")]
    NotLive,
    /// The given thread is not part of the traced set
    #[error("thread {0} is not traced")]
    UnknownThread(Tid),
    /// The given cpu is not part of the traced set
    #[error("cpu {0} is not traced")]
    UnknownCpu(cpu::Id),
    /// A piece of session-invariant data could not be obtained
    #[error("{what} is not available")]
    Unavailable {
        /// Description of the missing piece
        what: &'static str,
        #[source]
        cause: Option<source::Error>,
    },
    /// The live process adapter reported a failure
    #[error(transparent)]
    Source(#[from] source::Error),
    /// A trace bundle of some other trace technology was loaded
    #[error("cannot decode a {0:?} trace bundle")]
    UnsupportedBundle(String),
    /// A trace bundle could not be encoded for saving
    #[error("cannot encode the trace bundle")]
    EncodeBundle(#[from] serde_json::Error),
    /// Trace data could not be written to or copied from disk
    #[error("cannot access {}", path.display())]
    Io {
        /// File the access failed on
        path: PathBuf,
        source: std::io::Error,
    },
}
