// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! Timestamp and metadata correlation between submissions and completions.
//!
//! A fixed-capacity ring decoupled from the slot arrays: the DSP's
//! consumption unit (bytes or frames) need not match the host's submission
//! unit, so one submitted buffer may account for several decoded frames
//! (byte mode) or exactly one (frame mode). Entries are produced in strict
//! submission order and consumed in strict completion order.

use crate::{
    Error, Result,
    config::Accounting,
    events::{BufferFlags, FrameBuffer, Mark},
};

/// Metadata recorded for one submitted buffer.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationEntry {
    /// Presentation timestamp in microseconds.
    pub timestamp: i64,
    /// Framework tick count correlated with the timestamp.
    pub tick: u32,
    /// Flag word at submission time.
    pub flags: BufferFlags,
    /// Bytes remaining unconsumed from this submission (byte mode mutates
    /// this in place as completions drain the entry).
    pub bytes_submitted: usize,
    /// Mark metadata to propagate with the correlated frame.
    pub mark: Option<Mark>,
}

/// The submission-order metadata ring.
#[derive(Debug)]
pub struct CorrelationQueue {
    entries: Vec<Option<CorrelationEntry>>,
    head: usize,
    tail: usize,
    count: usize,
}

impl CorrelationQueue {
    /// Creates an empty ring of `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        CorrelationQueue {
            entries: (0..capacity).map(|_| None).collect(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Number of entries currently queued.
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns `true` when no entries are queued.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Ring capacity.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Records the metadata of a submitted buffer at the head.
    ///
    /// Codec-configuration buffers carry no presentation data and are
    /// skipped by policy; the call returns `Ok(false)` without queueing.
    ///
    /// # Errors
    ///
    /// [`Error::CapacityExceeded`] when the ring is full — submissions have
    /// outrun completions and queueing would overwrite unread metadata.
    pub fn push(&mut self, buffer: &FrameBuffer) -> Result<bool> {
        if buffer.flags.contains(BufferFlags::CODEC_CONFIG) {
            return Ok(false);
        }
        if self.count == self.entries.len() {
            return Err(Error::CapacityExceeded);
        }

        self.entries[self.head] = Some(CorrelationEntry {
            timestamp: buffer.timestamp,
            tick: buffer.tick,
            flags: buffer.flags,
            bytes_submitted: buffer.filled,
            mark: buffer.mark,
        });
        self.head = (self.head + 1) % self.entries.len();
        self.count += 1;
        Ok(true)
    }

    /// Consumes queued metadata for one completed output buffer.
    ///
    /// Returns a snapshot of the oldest entry at call time, which carries
    /// the timestamp and flags attributed to the completed frame. `None`
    /// when the ring is empty (completion without a correlated submission,
    /// e.g. right after a flush).
    ///
    /// In [`Accounting::Frames`] mode exactly one entry is removed per
    /// call, regardless of `consumed`. In [`Accounting::Bytes`] mode the
    /// walk starts at the tail and debits `consumed` bytes entry by entry:
    /// fully debited entries are removed, and a partially debited entry
    /// keeps its residual in place for the next call.
    pub fn pop_consuming(
        &mut self,
        consumed: usize,
        mode: Accounting,
    ) -> Option<CorrelationEntry> {
        if self.count == 0 {
            return None;
        }
        let oldest = self.entries[self.tail];

        match mode {
            Accounting::Frames => {
                self.remove_tail();
            }
            Accounting::Bytes => {
                let mut remaining = consumed;
                while remaining > 0 && self.count > 0 {
                    let entry = self.entries[self.tail]
                        .as_mut()
                        .expect("counted entry must be present");
                    if entry.bytes_submitted > remaining {
                        entry.bytes_submitted -= remaining;
                        remaining = 0;
                    } else {
                        remaining -= entry.bytes_submitted;
                        self.remove_tail();
                    }
                }
            }
        }

        oldest
    }

    /// The oldest queued entry, carrying any byte-mode residual.
    pub fn peek(&self) -> Option<&CorrelationEntry> {
        if self.count == 0 {
            return None;
        }
        self.entries[self.tail].as_ref()
    }

    /// Discards all queued metadata and resets the ring indices.
    ///
    /// Metadata already attributed to completed buffers is unaffected.
    pub fn flush(&mut self) {
        for entry in &mut self.entries {
            *entry = None;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    fn remove_tail(&mut self) {
        self.entries[self.tail] = None;
        self.tail = (self.tail + 1) % self.entries.len();
        self.count -= 1;
    }
}
