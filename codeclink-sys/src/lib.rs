// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! # codeclink-sys: Raw ABI declarations for the DSP bridge driver
//!
//! This crate declares the low-level, unsafe surface of the proprietary
//! bridge driver (`libbridge.so`) that CodecLink loads at runtime, plus the
//! message protocol spoken with the socket node running on the coprocessor.
//!
//! ## Overview
//!
//! `codeclink-sys` exposes:
//! - Raw handle types (`RawProcessor`, `RawNode`, ...)
//! - Driver status codes (`STATUS_OK`, `ERR_TIMEOUT`, ...)
//! - The `#[repr(C)]` node message and node attribute structs
//! - Function-pointer signatures for every dynamically resolved entry point
//! - Socket-node protocol constants (command classes, ack classes,
//!   algorithm status codes)
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe
//! `codeclink` crate instead, which provides RAII session management,
//! `Result`-based error handling and typed events.
//!
//! Unlike a bindgen-generated sys crate, these declarations are maintained
//! by hand: the bridge driver ships no public C headers, only a stable
//! symbol list. The declarations below must stay in sync with that ABI.
//!
//! ## Safety
//!
//! All function types declared here are `unsafe extern "C"`. Callers must
//! uphold the driver's invariants: handles must originate from the matching
//! allocation call, pointers must remain valid for the duration of the
//! operation, and a node handle must not be used after `node_delete`.

use std::os::raw::{c_char, c_void};

/// Driver status word. Zero and positive values indicate success,
/// negative values indicate failure.
pub type Status = i32;

/// Operation completed successfully.
pub const STATUS_OK: Status = 0;
/// General failure inside the driver.
pub const ERR_FAIL: Status = -0x8000;
/// A bounded wait elapsed without the awaited condition.
pub const ERR_TIMEOUT: Status = -0x8001;
/// An argument was null or otherwise invalid.
pub const ERR_POINTER: Status = -0x8002;
/// The driver could not allocate memory or address space.
pub const ERR_MEMORY: Status = -0x8003;
/// A handle did not refer to a live driver object.
pub const ERR_HANDLE: Status = -0x8004;
/// The node's message queue is full.
pub const ERR_QUEUE_FULL: Status = -0x8005;

/// Returns `true` when `status` denotes failure.
#[inline]
pub fn failed(status: Status) -> bool {
    status < 0
}

/// Opaque processor attachment handle.
pub type RawProcessor = *mut c_void;
/// Opaque node handle.
pub type RawNode = *mut c_void;
/// Opaque notification object handle.
pub type RawNotification = *mut c_void;

/// Identifier of the DSP coprocessor on the device.
pub const PROCESSOR_DSP: u32 = 0;

/// Blocking timeout sentinel: wait forever.
pub const TIMEOUT_FOREVER: u32 = u32::MAX;

/// One message exchanged with a node: a command word and two arguments.
///
/// For host-to-node buffer submissions `arg1` carries the DSP address of
/// the mapped communication record; for node-to-host buffer-free messages
/// the node echoes that address back in `arg1` and reports the consumed or
/// produced byte count in `arg2`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodeMsg {
    pub cmd: u32,
    pub arg1: u32,
    pub arg2: u32,
}

/// Scheduling attributes supplied when allocating a node.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeAttrs {
    pub struct_size: u32,
    pub priority: i32,
    pub timeout: u32,
    pub profile_id: u32,
}

/// 128-bit object identifier in the driver's registry format.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RawUuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Kind of DSP-side object being registered with the driver.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// A node executable (phase library).
    Node = 0,
    /// A dependent library the node links against.
    Library = 1,
}

/// Notification kinds the driver can signal.
pub const NOTIFY_NODE_MESSAGE_READY: u32 = 0x0000_0200;
pub const NOTIFY_MMU_FAULT: u32 = 0x0000_0010;
pub const NOTIFY_SYS_ERROR: u32 = 0x0000_0020;

/// Notification delivery type: a waitable signal object.
pub const NOTIFY_TYPE_SIGNAL: u32 = 1;

/// Socket-node message protocol.
///
/// The command word of a [`NodeMsg`] is split in two: the low byte is a
/// stream identifier, the high bits select a command class. Even stream
/// identifiers denote input streams, odd ones output streams.
pub mod node_msg {
    /// Mask selecting the stream identifier.
    pub const STREAM_MASK: u32 = 0x0000_00ff;
    /// Mask selecting the command class.
    pub const CLASS_MASK: u32 = 0xffff_ff00;

    // Host to node.
    pub const HOST_PLAY: u32 = 0x0100;
    pub const HOST_STOP: u32 = 0x0200;
    pub const HOST_PAUSE: u32 = 0x0300;
    pub const HOST_ALG_CTRL: u32 = 0x0400;
    pub const HOST_STRM_CTRL: u32 = 0x0500;
    pub const HOST_SET_BUFF: u32 = 0x0600;

    // Node to host.
    pub const NODE_ACK_STOP: u32 = 0x0200;
    pub const NODE_ACK_PAUSE: u32 = 0x0300;
    pub const NODE_ACK_ALG_CTRL: u32 = 0x0400;
    pub const NODE_ACK_STRM_CTRL: u32 = 0x0500;
    pub const NODE_BUFF_FREE: u32 = 0x0600;
    pub const NODE_EVENT: u32 = 0x0e00;

    /// Stream-control sub-commands (carried in `arg1`).
    pub const STRMCMD_SET_PARAMS: u32 = 3;
    pub const STRMCMD_IDLE: u32 = 4;
    pub const STRMCMD_FLUSH: u32 = 5;

    /// Node-side error status carried in acknowledgment `arg1`.
    pub const NODE_ERR_NONE: u32 = 0;
}

/// Algorithm status codes carried in unsolicited node events.
///
/// Codes below `0x0f00` are warnings; the session stays usable. Codes at
/// or above `0x0f00` are fatal to the algorithm instance.
pub mod alg_status {
    pub const OK: u32 = 0x0000;
    pub const WARN_CONCEALED: u32 = 0x0100;
    pub const WARN_UNDERFLOW: u32 = 0x0200;
    pub const WARN_OVERFLOW: u32 = 0x0300;
    pub const WARN_END_OF_DATA: u32 = 0x0400;
    pub const WARN_PLAY_COMPLETED: u32 = 0x0500;
    pub const WARN_ALG: u32 = 0x0700;
    pub const ERR_BAD_HANDLE: u32 = 0x0f00;
    pub const ERR_DATA_CORRUPT: u32 = 0x0f01;
    pub const ERR_NOT_SUPPORTED: u32 = 0x0f02;
    pub const ERR_ARGUMENT: u32 = 0x0f03;
    pub const ERR_NOT_READY: u32 = 0x0f04;
    pub const ERR_GENERAL: u32 = 0x0fff;

    /// Returns `true` when `code` is fatal to the algorithm instance.
    #[inline]
    pub fn is_fatal(code: u32) -> bool {
        code >= ERR_BAD_HANDLE
    }
}

// Dynamically resolved entry points. Symbol names match the driver's
// exported symbol list.

pub type ProcessorAttachFn =
    unsafe extern "C" fn(processor_id: u32, attrs: *const c_void, out: *mut RawProcessor) -> Status;
pub type ProcessorDetachFn = unsafe extern "C" fn(processor: RawProcessor) -> Status;

pub type RegisterObjectFn =
    unsafe extern "C" fn(uuid: *const RawUuid, kind: u32, path: *const c_char) -> Status;
pub type UnregisterObjectFn = unsafe extern "C" fn(uuid: *const RawUuid, kind: u32) -> Status;

pub type NodeAllocateFn = unsafe extern "C" fn(
    processor: RawProcessor,
    uuid: *const RawUuid,
    create_args: *const u8,
    create_args_len: u32,
    attrs: *const NodeAttrs,
    out: *mut RawNode,
) -> Status;
pub type NodeCreateFn = unsafe extern "C" fn(node: RawNode) -> Status;
pub type NodeRunFn = unsafe extern "C" fn(node: RawNode) -> Status;
pub type NodeTerminateFn = unsafe extern "C" fn(node: RawNode, exit_status: *mut Status) -> Status;
pub type NodeDeleteFn = unsafe extern "C" fn(node: RawNode) -> Status;

pub type ReserveMemoryFn =
    unsafe extern "C" fn(processor: RawProcessor, size: usize, out: *mut *mut c_void) -> Status;
pub type UnreserveMemoryFn =
    unsafe extern "C" fn(processor: RawProcessor, reserved: *mut c_void) -> Status;
pub type MapMemoryFn = unsafe extern "C" fn(
    processor: RawProcessor,
    host_ptr: *mut c_void,
    size: usize,
    reserved: *mut c_void,
    out: *mut *mut c_void,
    flags: u32,
) -> Status;
pub type UnmapMemoryFn =
    unsafe extern "C" fn(processor: RawProcessor, mapped: *mut c_void) -> Status;

pub type NodePutMessageFn =
    unsafe extern "C" fn(node: RawNode, msg: *const NodeMsg, timeout_ms: u32) -> Status;
pub type NodeGetMessageFn =
    unsafe extern "C" fn(node: RawNode, out: *mut NodeMsg, timeout_ms: u32) -> Status;

pub type NodeRegisterNotifyFn = unsafe extern "C" fn(
    node: RawNode,
    event_mask: u32,
    notify_type: u32,
    out: *mut RawNotification,
) -> Status;
pub type ProcessorRegisterNotifyFn = unsafe extern "C" fn(
    processor: RawProcessor,
    event_mask: u32,
    notify_type: u32,
    out: *mut RawNotification,
) -> Status;
pub type WaitForEventsFn = unsafe extern "C" fn(
    notifications: *const RawNotification,
    count: u32,
    out_index: *mut u32,
    timeout_ms: u32,
) -> Status;
