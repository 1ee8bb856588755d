// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer descriptors, flags and the application-facing event type.
//!
//! Events are delivered as a tagged enum with named fields per event kind,
//! so the callback never reinterprets positional arguments.

use crate::bridge::HostPtr;

bitflags::bitflags! {
    /// Per-buffer flag word shared between the application and the engine.
    ///
    /// The engine reads `EOS` and `CODEC_CONFIG` on submission and may set
    /// `EOS` and `DATA_CORRUPT` on returned buffers; the remaining bits pass
    /// through untouched.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct BufferFlags: u32 {
        /// Last buffer of the stream.
        const EOS = 0x0000_0001;
        /// Buffer is decoded but must not be displayed.
        const DECODE_ONLY = 0x0000_0008;
        /// Payload is damaged (input) or decode failed (output).
        const DATA_CORRUPT = 0x0000_0010;
        /// Buffer starts a sync (key) frame.
        const SYNC_FRAME = 0x0000_0020;
        /// Out-of-band codec configuration, not media data.
        const CODEC_CONFIG = 0x0000_0080;
    }
}

/// Transfer direction of a buffer relative to the DSP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to DSP (compressed data in).
    Input,
    /// DSP to host (decoded data out).
    Output,
}

impl Direction {
    /// Classifies a stream identifier by the even/odd convention: even
    /// stream ids carry input, odd ones output.
    pub fn of_stream(stream: u8) -> Self {
        if stream % 2 == 0 {
            Direction::Input
        } else {
            Direction::Output
        }
    }
}

/// Destination port of a submitted buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferPort {
    /// The primary input stream (stream 0).
    Input,
    /// The primary output stream (stream 1).
    Output,
    /// An explicit sub-stream, classified by parity.
    Stream(u8),
}

impl BufferPort {
    /// The stream identifier encoded into the message command word.
    pub fn stream_id(&self) -> u8 {
        match self {
            BufferPort::Input => 0,
            BufferPort::Output => 1,
            BufferPort::Stream(id) => *id,
        }
    }

    /// The transfer direction this port maps to.
    pub fn direction(&self) -> Direction {
        match self {
            BufferPort::Input => Direction::Input,
            BufferPort::Output => Direction::Output,
            BufferPort::Stream(id) => Direction::of_stream(*id),
        }
    }
}

/// Buffer-mark metadata carried alongside a frame for downstream
/// event signalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    /// Opaque handle of the component to signal.
    pub target: u64,
    /// Opaque payload handed back with the mark event.
    pub data: u64,
}

/// A host-owned media buffer handed to the engine for one DSP round trip.
///
/// The engine never touches the payload memory behind `ptr`; it forwards
/// the address for DMA mapping and tracks the metadata. Ownership of the
/// memory stays with the application, which must keep it valid until the
/// buffer comes back through the event callback.
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffer {
    /// Host address of the payload.
    pub ptr: HostPtr,
    /// Allocated length of the payload in bytes.
    pub capacity: usize,
    /// Valid bytes in the payload (input direction).
    pub filled: usize,
    /// Flag word, see [`BufferFlags`].
    pub flags: BufferFlags,
    /// Presentation timestamp in microseconds.
    pub timestamp: i64,
    /// Framework tick count correlated with the timestamp.
    pub tick: u32,
    /// Optional mark to propagate with this frame.
    pub mark: Option<Mark>,
    /// Opaque application token echoed back on completion.
    pub user_arg: u64,
}

/// An opaque side-parameter block submitted next to a payload.
#[derive(Debug, Clone, Copy)]
pub struct SideParams {
    /// Host address of the parameter block.
    pub ptr: HostPtr,
    /// Length of the block in bytes.
    pub len: usize,
}

/// A buffer returned from the DSP with its completion metadata.
#[derive(Debug, Clone, Copy)]
pub struct CompletedBuffer {
    /// Transfer direction the buffer was submitted on.
    pub direction: Direction,
    /// Stream the buffer travelled on.
    pub stream: u8,
    /// Host address of the payload, as submitted.
    pub ptr: HostPtr,
    /// Allocated length, as submitted.
    pub capacity: usize,
    /// Bytes consumed (input) or produced (output) by the node; zero for
    /// buffers reclaimed through a stop, flush or halt drain.
    pub filled: usize,
    /// The side-parameter block, if one was submitted.
    pub params: Option<SideParams>,
    /// The application token from submission.
    pub user_arg: u64,
    /// Flag word after completion.
    pub flags: BufferFlags,
    /// Presentation timestamp in microseconds.
    pub timestamp: i64,
    /// Framework tick count.
    pub tick: u32,
    /// Mark metadata attached to this frame.
    pub mark: Option<Mark>,
}

/// Which stream-control request an acknowledgment answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamControlAck {
    /// A flush completed; in-flight buffers on the stream were reclaimed.
    Flush,
    /// A general stream-control (parameter block) request completed.
    General,
}

/// Asynchronous notifications delivered to the application callback.
#[derive(Debug, Clone)]
pub enum CodecEvent {
    /// The DSP finished with a buffer; it is back in application ownership.
    BufferProcessed(CompletedBuffer),
    /// A buffer is back in application ownership without having been
    /// processed (failed submission, halted session, destroy drain).
    BufferNotProcessed(CompletedBuffer),
    /// The node accepted the start command.
    ProcessingStarted,
    /// The node acknowledged the pause command.
    ProcessingPaused,
    /// The node acknowledged the stop command; all in-flight buffers have
    /// been returned.
    ProcessingStopped,
    /// A stream-control request was acknowledged.
    StrmCtrlAck {
        stream: u8,
        ack: StreamControlAck,
        /// Node-side status word (zero on success).
        status: u32,
    },
    /// An algorithm-control request was acknowledged.
    AlgCtrlAck {
        /// Node-side status word (zero on success).
        status: u32,
    },
    /// An unsolicited DSP condition. Fatal conditions halt the session;
    /// warnings (e.g. play completed) are informational.
    DspError { fatal: bool, code: u32, arg: u32 },
    /// A message with an unrecognized command class, forwarded verbatim for
    /// codec-specific out-of-band signalling.
    DspMessageReceived { opcode: u32, arg1: u32, arg2: u32 },
    /// A host-side failure inside the dispatch loop that did not stop it.
    InternalError { detail: String },
    /// A failure while bringing up the listener.
    InitError { detail: String },
}

/// Application callback receiving [`CodecEvent`]s from the dispatch thread
/// and, for some degraded paths, the submitting thread.
pub type EventCallback = dyn Fn(CodecEvent) + Send + Sync;
