// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! # CodecLink - Host-side control link for DSP codec nodes
//!
//! Safe, idiomatic Rust layer binding an application media framework to
//! fixed-function codec nodes running on a DSP coprocessor, via the
//! proprietary bridge driver. The hard computational work (decoding)
//! happens inside an opaque node binary; this crate is the glue: buffer
//! lifecycle tracking, message correlation, DMA mapping bookkeeping and
//! error-code translation between the host CPU and the DSP.
//!
//! ## Overview
//!
//! Host-allocated buffers are handed to the DSP, tracked while in flight,
//! matched against asynchronous completion messages coming back from the
//! node, and returned to the application with correct metadata
//! (timestamps, frame flags, error status).
//!
//! ### Key Concepts
//!
//! - **Bridge**: the black-box driver contract ([`Bridge`]), implemented
//!   by the dynamically loaded driver binding ([`DynamicBridge`])
//! - **Session**: one codec node instance ([`CodecSession`]) with its
//!   listener thread and in-flight bookkeeping
//! - **Slot store**: fixed-capacity cyclic arrays tracking which buffers
//!   the DSP currently owns ([`slots`])
//! - **Correlation queue**: submission-order timestamp/metadata ring
//!   consumed in completion order ([`correlation`])
//! - **Events**: completions and acknowledgments delivered as a tagged
//!   enum ([`CodecEvent`]) through the session callback
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐ queue_buffer / control  ┌─────────────────┐
//! │ CodecSession │ ───────────────────────►│  bridge driver  │
//! └──────┬───────┘      (DMA map + msg)    │   (dlopened)    │
//!        │                                 └────────┬────────┘
//!        │ slot store / correlation queue           │ DSP node
//!        │                                          ▼
//! ┌──────┴────────┐   completion messages  ┌─────────────────┐
//! │ dispatch loop │ ◄──────────────────────│  notification   │
//! └──────┬────────┘                        │      set        │
//!        │ CodecEvent callback             └─────────────────┘
//!        ▼
//!   application
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use codeclink::{
//!     BufferPort, CodecConfig, CodecEvent, CodecSession, ControlCommand, FrameBuffer, HostPtr,
//! };
//!
//! # fn main() -> Result<(), codeclink::Error> {
//! let bridge = codeclink::load_bridge("libbridge.so")?;
//! let config_json = std::fs::read_to_string("h264_decoder.json").unwrap();
//! let config: CodecConfig = serde_json::from_str(&config_json).unwrap();
//!
//! let session = CodecSession::new(
//!     bridge,
//!     &config,
//!     Box::new(|event| {
//!         if let CodecEvent::BufferProcessed(buffer) = event {
//!             println!("buffer back: {} bytes at ts {}", buffer.filled, buffer.timestamp);
//!         }
//!     }),
//! )?;
//!
//! session.control(ControlCommand::Start)?;
//!
//! let payload = vec![0u8; 4096];
//! session.queue_buffer(
//!     BufferPort::Input,
//!     FrameBuffer {
//!         ptr: HostPtr(payload.as_ptr() as usize),
//!         capacity: payload.len(),
//!         filled: payload.len(),
//!         flags: Default::default(),
//!         timestamp: 0,
//!         tick: 0,
//!         mark: None,
//!         user_arg: 1,
//!     },
//!     None,
//! )?;
//!
//! session.control(ControlCommand::Stop)?;
//! session.destroy()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! A [`CodecSession`] may be driven from one application thread while its
//! dispatch thread delivers events; all engine state sits behind a single
//! mutex. Control commands that have a protocol acknowledgment block the
//! caller until the dispatch thread signals it.
//!
//! ## Error Model
//!
//! Synchronous failures return [`Error`] up the call stack; DSP-originated
//! asynchronous errors surface exclusively through the event callback.
//! After a fatal DSP error the session is halted: every in-flight buffer
//! is returned (zero-length, corrupt-marked) and subsequent calls
//! short-circuit with [`Error::Hardware`].

mod api;
mod bridge;
mod dispatch;
mod error;
mod session;

pub mod config;
pub mod correlation;
pub mod events;
pub mod mapper;
pub mod slots;

pub use api::{DynamicBridge, load_bridge};
pub use bridge::{
    Bridge, HostPtr, LibraryKind, MappedRegion, NodeHandle, NodeMsg, NotificationId,
    ProcessorHandle, ReservedRegion,
};
pub use codeclink_sys::Status;
pub use config::{Accounting, CodecConfig, NodeAttributes, NodeLibrary};
pub use error::{Error, Result};
pub use events::{
    BufferFlags, BufferPort, CodecEvent, CompletedBuffer, Direction, EventCallback, FrameBuffer,
    Mark, SideParams, StreamControlAck,
};
pub use session::{CodecSession, ControlCommand, LifecycleState, StreamControl};
