// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Decoded trace entries
//!
//! A decode [`Engine`][crate::engine::Engine] turns a raw trace buffer into a
//! sequence of [`Entry`]s. An entry is either a retired [`Instruction`] or an
//! [`Error`] embedded at the position where decoding failed. Embedding errors
//! rather than aborting keeps the part of the trace that did decode usable.
//!
//! A complete, immutable decode result for one thread is a [`DecodedThread`].

use crate::Tid;

/// Single entry of a decoded instruction trace
///
/// An entry corresponds to either a retired [`Instruction`] or an [`Error`]
/// reported by the decode engine at that position in the trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    /// A retired instruction
    Instruction(Instruction),
    /// A decode error, kept in-band
    ///
    /// Entries before and after the error remain valid. Consumers stepping
    /// over the sequence decide themselves whether to skip or surface it.
    Error(Error),
}

impl Entry {
    /// Retrieve the retired [`Instruction`], if this entry is one
    pub fn instruction(&self) -> Option<&Instruction> {
        match self {
            Self::Instruction(insn) => Some(insn),
            _ => None,
        }
    }

    /// Retrieve the embedded [`Error`], if this entry is one
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }

    /// Check whether this entry is an embedded [`Error`]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Retrieve the TSC attached to this entry
    ///
    /// Only [`Instruction`]s carry timestamps, and only at points where the
    /// processor emitted one. Entries in between inherit the last timestamp
    /// seen before them in the same raw stream.
    pub fn tsc(&self) -> Option<u64> {
        match self {
            Self::Instruction(insn) => insn.tsc(),
            Self::Error(_) => None,
        }
    }
}

impl From<Instruction> for Entry {
    fn from(insn: Instruction) -> Self {
        Self::Instruction(insn)
    }
}

impl From<Error> for Entry {
    fn from(error: Error) -> Self {
        Self::Error(error)
    }
}

/// A single retired instruction
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    ip: u64,
    tsc: Option<u64>,
}

impl Instruction {
    /// Create a new instruction entry without a timestamp
    pub fn new(ip: u64) -> Self {
        Self { ip, tsc: None }
    }

    /// Attach the TSC at which this instruction retired
    pub fn with_tsc(self, tsc: u64) -> Self {
        Self {
            tsc: Some(tsc),
            ..self
        }
    }

    /// Retrieve the instruction pointer
    pub fn ip(&self) -> u64 {
        self.ip
    }

    /// Retrieve the TSC, if the trace carried one at this point
    pub fn tsc(&self) -> Option<u64> {
        self.tsc
    }
}

/// A decode error embedded in an instruction sequence
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct Error {
    message: String,
    ip: Option<u64>,
}

impl Error {
    /// Create a new embedded error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ip: None,
        }
    }

    /// Attach the last instruction pointer known before the error
    pub fn with_ip(self, ip: u64) -> Self {
        Self {
            ip: Some(ip),
            ..self
        }
    }

    /// Retrieve the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Retrieve the last instruction pointer known before the error
    pub fn ip(&self) -> Option<u64> {
        self.ip
    }
}

/// Complete decode result for a single thread
///
/// A decoded thread is an immutable sequence of [`Entry`]s. It is handed out
/// behind an [`Arc`][std::sync::Arc] by the session layer, so a result
/// obtained before a storage refresh remains readable afterwards. Two decode
/// passes over the same raw bytes produce equal sequences.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedThread {
    tid: Tid,
    entries: Vec<Entry>,
}

impl DecodedThread {
    /// Create a decode result from the entries produced for a thread
    pub fn new(tid: Tid, entries: Vec<Entry>) -> Self {
        Self { tid, entries }
    }

    /// Create an empty decode result
    ///
    /// Used for threads that are traced but whose trace buffer has not been
    /// made available (yet).
    pub fn empty(tid: Tid) -> Self {
        Self::new(tid, Vec::new())
    }

    /// Retrieve the id of the thread this trace belongs to
    pub fn tid(&self) -> Tid {
        self.tid
    }

    /// Retrieve all entries in trace order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Retrieve the number of entries, errors included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether this trace contains no entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the retired [`Instruction`]s, skipping embedded errors
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.entries.iter().filter_map(Entry::instruction)
    }

    /// Retrieve the number of retired instructions
    pub fn instruction_count(&self) -> usize {
        self.instructions().count()
    }

    /// Retrieve the number of embedded errors
    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_error()).count()
    }

    /// Retrieve the earliest TSC in the trace, if any entry carries one
    pub fn first_tsc(&self) -> Option<u64> {
        self.entries.iter().find_map(Entry::tsc)
    }

    /// Retrieve the latest TSC in the trace, if any entry carries one
    pub fn last_tsc(&self) -> Option<u64> {
        self.entries.iter().rev().find_map(Entry::tsc)
    }
}
