// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! In-flight buffer slot tracking.
//!
//! One fixed-capacity cyclic array per transfer direction records which
//! buffers are currently owned by the DSP. A slot is bound when the buffer
//! is submitted and cleared when the matching completion message arrives
//! (or when a bulk drain reclaims it). The binding key is the DSP address
//! of the mapped communication record, which the node echoes back in
//! buffer-free messages.
//!
//! Invariant: at most one slot references a given buffer identity at any
//! time, and a slot entry is cleared before its DMA mappings are unwound.

use crate::{
    Error, Result,
    events::{Direction, FrameBuffer, SideParams},
    mapper::MappedBuffer,
};

/// The communication record shared with the node for one buffer.
///
/// This struct is DMA-mapped into DSP address space as-is; the node reads
/// it to locate the payload and parameter mappings. Addresses are DSP-side
/// after submission-path fixup.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct CommRecord {
    /// DSP address of the mapped payload (zero if none).
    pub buffer_dsp: u32,
    /// Payload size handed to the node in bytes.
    pub buffer_size: u32,
    /// DSP address of the mapped side-parameter block (zero if none).
    pub param_dsp: u32,
    /// Side-parameter size in bytes.
    pub param_size: u32,
    /// Host address of the payload, echoed for completion bookkeeping.
    pub host_buffer: u64,
    /// Host address of the parameter block.
    pub host_param: u64,
    /// Opaque application token echoed back on completion.
    pub user_arg: u64,
    /// Stream identifier the buffer travels on.
    pub stream: u32,
    /// Input-array cursor at submission time.
    pub in_index: u32,
    /// Output-array cursor at submission time.
    pub out_index: u32,
    /// End-of-stream marker in sentinel mode.
    pub eos_flag: u32,
}

/// The DMA mappings owned by a bound slot.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlotMappings {
    /// Payload mapping, absent for empty payloads.
    pub payload: Option<MappedBuffer>,
    /// Side-parameter mapping.
    pub params: Option<MappedBuffer>,
    /// Communication-record mapping; its DSP address is the slot identity.
    pub comm_record: Option<MappedBuffer>,
}

/// One in-flight binding: the communication record, the submitted buffer
/// metadata and the mappings to unwind on completion.
#[derive(Debug)]
pub struct InFlightSlot {
    /// The communication record shared with the node. Boxed so its host
    /// address stays stable for the lifetime of the DMA mapping.
    pub comm: Box<CommRecord>,
    /// Completion-message identity: DSP address of the mapped record.
    pub identity: u32,
    /// Snapshot of the submitted buffer descriptor.
    pub buffer: FrameBuffer,
    /// The side-parameter block, if one was submitted.
    pub params: Option<SideParams>,
    /// Mappings to unwind before the slot is reused.
    pub mappings: SlotMappings,
}

/// A fixed-capacity cyclic array of in-flight slots for one direction.
#[derive(Debug)]
pub struct SlotArray {
    slots: Vec<Option<InFlightSlot>>,
    cursor: usize,
}

impl SlotArray {
    /// Creates an empty array with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        SlotArray {
            slots: (0..capacity).map(|_| None).collect(),
            cursor: 0,
        }
    }

    /// Number of slots in the array.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of currently bound slots.
    pub fn bound(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// The cursor the next binding will use.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Reserves the next cyclic slot index.
    ///
    /// Fails with [`Error::CapacityExceeded`] when the cyclic successor is
    /// still bound, i.e. the DSP holds as many buffers as the array can
    /// track. The cursor only advances on [`Self::bind`].
    pub fn reserve(&self) -> Result<usize> {
        if self.slots[self.cursor].is_some() {
            return Err(Error::CapacityExceeded);
        }
        Ok(self.cursor)
    }

    /// Binds `slot` at `index` and advances the cyclic cursor.
    ///
    /// The slot must have been obtained from [`Self::reserve`] and still be
    /// empty.
    pub fn bind(&mut self, index: usize, slot: InFlightSlot) {
        debug_assert!(self.slots[index].is_none(), "binding over a live slot");
        self.slots[index] = Some(slot);
        self.cursor = (index + 1) % self.slots.len();
    }

    /// Finds the slot bound with `identity`, scanning at most one full
    /// cycle starting at the cursor.
    ///
    /// Returns `None` when no live binding carries the identity — the
    /// completion message refers to a buffer already reclaimed (e.g. by a
    /// flush) and must be dropped silently.
    pub fn find_by_identity(&self, identity: u32) -> Option<usize> {
        let capacity = self.slots.len();
        let mut index = self.cursor % capacity;
        for _ in 0..capacity {
            if let Some(slot) = &self.slots[index]
                && slot.identity == identity
            {
                return Some(index);
            }
            index = (index + 1) % capacity;
        }
        None
    }

    /// Clears and returns the binding at `index`.
    ///
    /// Releasing an already-released slot is a no-op returning `None`.
    pub fn release(&mut self, index: usize) -> Option<InFlightSlot> {
        self.slots.get_mut(index).and_then(Option::take)
    }

    /// Clears every binding, returning them in ascending index order.
    pub fn drain_all(&mut self) -> Vec<(usize, InFlightSlot)> {
        let mut drained = Vec::new();
        for index in 0..self.slots.len() {
            if let Some(slot) = self.slots[index].take() {
                drained.push((index, slot));
            }
        }
        drained
    }

    /// Clears every binding whose communication record names `stream`,
    /// returning them in ascending index order.
    pub fn drain_stream(&mut self, stream: u8) -> Vec<(usize, InFlightSlot)> {
        let mut drained = Vec::new();
        for index in 0..self.slots.len() {
            if self.slots[index]
                .as_ref()
                .is_some_and(|slot| slot.comm.stream == u32::from(stream))
                && let Some(slot) = self.slots[index].take()
            {
                drained.push((index, slot));
            }
        }
        drained
    }
}

/// The per-direction pair of slot arrays.
#[derive(Debug)]
pub struct SlotStore {
    /// Input-direction bindings (even stream ids).
    pub input: SlotArray,
    /// Output-direction bindings (odd stream ids).
    pub output: SlotArray,
}

impl SlotStore {
    /// Creates empty input/output arrays of `capacity` slots each.
    pub fn new(capacity: usize) -> Self {
        SlotStore {
            input: SlotArray::new(capacity),
            output: SlotArray::new(capacity),
        }
    }

    /// Selects the array for `direction`.
    pub fn array_mut(&mut self, direction: Direction) -> &mut SlotArray {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        }
    }

    /// Immutable variant of [`Self::array_mut`].
    pub fn array(&self, direction: Direction) -> &SlotArray {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }
}
