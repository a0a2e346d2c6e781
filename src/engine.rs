// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Decode engines turning raw trace buffers into [`Entry`] sequences
//!
//! The session layer does not interpret trace packets itself. This module
//! defines the [`Engine`] trait through which a
//! [`Session`][crate::session::Session] hands raw buffers to an external
//! packet decoder, as well as adapters for defining [`Engine`]s from other
//! types:
//!
//! * [`from_fn`] wraps any suitable [`FnMut`] closure,
//! * [`Box`]ed engines allow dynamic dispatch and
//! * with the `either` feature enabled, an [`Either`][either::Either] of two
//!   engines is itself an engine, which helps selecting an engine at runtime.
//!
//! # Error handling
//!
//! Decoding is infallible at this seam. Wherever an engine runs into bytes it
//! cannot interpret, it reports an [`Error`][crate::entry::Error] entry
//! in-band and continues with the next synchronization point, mirroring how
//! hardware trace decoders resynchronize. The session layer never inspects
//! entries, it only caches them.
//!
//! # Sharing engines
//!
//! An [`Engine`] is intended for use by a single [`Session`]. It may be
//! mutated when decoding, e.g. for caching a process image between calls.
//! Engines that are to be shared between threads should implement
//! [`SyncEngine`].
//!
//! # Example
//!
//! The following defines an engine for a toy format in which a trace buffer
//! is a plain array of little endian instruction pointers:
//!
//! ```
//! use ipt_session::cpu::{CpuInfo, Vendor};
//! use ipt_session::engine::{self, Engine};
//! use ipt_session::entry::Instruction;
//!
//! let mut engine = engine::from_fn(|buffer: &[u8], _cpu: &CpuInfo| {
//!     buffer
//!         .chunks_exact(8)
//!         .map(|c| Instruction::new(u64::from_le_bytes(c.try_into().unwrap())).into())
//!         .collect()
//! });
//!
//! let cpu = CpuInfo {
//!     vendor: Vendor::Intel,
//!     family: 6,
//!     model: 158,
//!     stepping: 10,
//! };
//! let decoded = engine.decode(&0x401000u64.to_le_bytes(), &cpu);
//! assert_eq!(decoded[0].instruction().map(|i| i.ip()), Some(0x401000));
//! ```
//!
//! [`Session`]: crate::session::Session

use crate::cpu::CpuInfo;
use crate::entry::Entry;


/// A decoder for raw instruction trace buffers
///
/// See the [module level][self] documentation for more details.
pub trait Engine {
    /// Decode one raw trace buffer collected on the given cpu
    ///
    /// The returned entries are in trace order. Undecodable portions of the
    /// buffer are represented by [`Error`][crate::entry::Error] entries at
    /// the position where decoding failed.
    fn decode(&mut self, buffer: &[u8], cpu: &CpuInfo) -> Vec<Entry>;
}

impl<E: Engine + ?Sized> Engine for &mut E {
    fn decode(&mut self, buffer: &[u8], cpu: &CpuInfo) -> Vec<Entry> {
        E::decode(self, buffer, cpu)
    }
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn decode(&mut self, buffer: &[u8], cpu: &CpuInfo) -> Vec<Entry> {
        E::decode(self.as_mut(), buffer, cpu)
    }
}

#[cfg(feature = "either")]
impl<L: Engine, R: Engine> Engine for either::Either<L, R> {
    fn decode(&mut self, buffer: &[u8], cpu: &CpuInfo) -> Vec<Entry> {
        either::for_both!(self, e => e.decode(buffer, cpu))
    }
}

/// [`Engine`] adapter for an [`FnMut`]
///
/// This forwards calls to [`Engine::decode`] to the wrapped [`FnMut`].
#[derive(Copy, Clone, Debug)]
pub struct Func<F: FnMut(&[u8], &CpuInfo) -> Vec<Entry>> {
    func: F,
}

impl<F: FnMut(&[u8], &CpuInfo) -> Vec<Entry>> Engine for Func<F> {
    fn decode(&mut self, buffer: &[u8], cpu: &CpuInfo) -> Vec<Entry> {
        (self.func)(buffer, cpu)
    }
}

/// Create a [`Func`] [`Engine`] from an [`FnMut`]
pub fn from_fn<F: FnMut(&[u8], &CpuInfo) -> Vec<Entry>>(func: F) -> Func<F> {
    Func { func }
}

/// An [`Engine`] which may be sent or shared between threads
pub trait SyncEngine: Engine + Send + Sync {}

impl<E: Engine + Send + Sync> SyncEngine for E {}
