// Copyright (C) 2026 FZI Forschungszentrum Informatik
// SPDX-License-Identifier: Apache-2.0
//! Stepping through decoded traces
//!
//! A [`Cursor`] walks the entries of one [`DecodedThread`]. It holds its own
//! reference to the decode result, so it stays valid however long the caller
//! keeps it, in particular across a session refresh that replaces the decode
//! storage it was created from. It then keeps reading the snapshot it was
//! created over; obtaining the refreshed trace means asking the session for
//! a new cursor.

use std::sync::Arc;

use crate::entry::{DecodedThread, Entry};


/// Position within a decoded thread trace
///
/// A cursor starts out at the earliest entry. Stepping forward goes through
/// the [`Iterator`] implementation; [`prev`][Self::prev] steps backward.
/// Seeking is cheap and a cursor may be reused for any number of passes.
#[derive(Clone, Debug)]
pub struct Cursor {
    decoded: Arc<DecodedThread>,
    pos: usize,
}

impl Cursor {
    /// Create a cursor positioned at the earliest entry
    pub fn new(decoded: Arc<DecodedThread>) -> Self {
        Self { decoded, pos: 0 }
    }

    /// Retrieve the decode result this cursor walks
    pub fn thread(&self) -> &DecodedThread {
        &self.decoded
    }

    /// Retrieve the current position as an entry index
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Seek to the earliest entry
    pub fn seek_start(&mut self) {
        self.pos = 0;
    }

    /// Seek to the latest entry
    pub fn seek_end(&mut self) {
        self.pos = self.decoded.len().saturating_sub(1);
    }

    /// Retrieve the entry at the current position
    ///
    /// Returns `None` if the trace is empty or the cursor was stepped past
    /// the final entry.
    pub fn current(&self) -> Option<&Entry> {
        self.decoded.entries().get(self.pos)
    }

    /// Step backward, returning the new current entry
    ///
    /// Returns `None` at the earliest entry. Stepping backward after forward
    /// iteration exhausted the cursor yields the final entry.
    pub fn prev(&mut self) -> Option<Entry> {
        if self.pos == 0 {
            return None;
        }
        self.pos -= 1;
        self.current().cloned()
    }
}

/// Stepping forward
///
/// `next` yields the current entry and advances. A cursor yields every entry
/// from its current position to the end of the trace.
impl Iterator for Cursor {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.current().cloned();
        if entry.is_some() {
            self.pos += 1;
        }
        entry
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.decoded.len() - self.pos.min(self.decoded.len());
        (left, Some(left))
    }
}

impl ExactSizeIterator for Cursor {}
