// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! The safe seam over the DSP bridge driver.
//!
//! The engine never calls the driver ABI directly; every interaction goes
//! through the [`Bridge`] trait defined here. The production implementation
//! ([`crate::DynamicBridge`]) forwards to the dynamically loaded driver
//! library, while tests substitute an in-process fake.

use std::{path::Path, time::Duration};

use uuid::Uuid;

use crate::{Result, config::NodeAttributes};

pub use codeclink_sys::NodeMsg;

/// A host virtual address handed to (but never dereferenced by) the engine.
///
/// The engine only forwards host addresses to the driver for DMA mapping;
/// payload memory stays owned by the application throughout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HostPtr(pub usize);

impl HostPtr {
    /// The null host address.
    pub const NULL: HostPtr = HostPtr(0);

    /// Returns `true` if this address is null.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// Opaque handle to an attached coprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorHandle(pub u64);

/// Opaque handle to an allocated codec node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHandle(pub u64);

/// A reserved (but not yet mapped) region of DSP address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedRegion(pub u32);

/// A live mapping of host memory into DSP address space.
///
/// The wrapped value is the DSP-side address, which the node echoes back in
/// completion messages and which therefore serves as the in-flight identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappedRegion(pub u32);

/// Opaque handle to a registered driver notification object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationId(pub u64);

/// Kind of DSP-side object registered with the driver, mirroring the
/// driver's registry classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LibraryKind {
    /// A node executable (phase library).
    Node,
    /// A dependent library the node links against.
    Library,
}

impl LibraryKind {
    pub(crate) fn raw(self) -> u32 {
        match self {
            LibraryKind::Node => codeclink_sys::ObjectKind::Node as u32,
            LibraryKind::Library => codeclink_sys::ObjectKind::Library as u32,
        }
    }
}

/// The black-box contract of the DSP bridge driver.
///
/// One trait method per driver operation the engine consumes: processor
/// attachment, node lifecycle, DMA memory management, node messaging and
/// event notification. Implementations must be usable from the application
/// thread and the dispatch thread concurrently.
///
/// Blocking semantics: [`Bridge::put_message`] blocks until the message is
/// accepted into the node's inbound queue (not until processed);
/// [`Bridge::get_message`] and [`Bridge::wait_for_events`] return
/// [`crate::Error::Timeout`] when the bounded wait elapses.
pub trait Bridge: Send + Sync {
    /// Attaches to the DSP coprocessor and returns a processor handle.
    fn attach_processor(&self) -> Result<ProcessorHandle>;

    /// Detaches from the coprocessor, invalidating the handle.
    fn detach_processor(&self, processor: ProcessorHandle) -> Result<()>;

    /// Registers a DSP-side object (node or dependent library) with the
    /// driver's registry under `uuid`, backed by the file at `path`.
    fn register_library(&self, uuid: &Uuid, kind: LibraryKind, path: &Path) -> Result<()>;

    /// Removes a previously registered object from the driver's registry.
    fn unregister_library(&self, uuid: &Uuid, kind: LibraryKind) -> Result<()>;

    /// Allocates a node instance on the coprocessor.
    ///
    /// `create_args` is the marshalled create-phase argument block; `attrs`
    /// carries scheduling priority, timeout and profile.
    fn allocate_node(
        &self,
        processor: ProcessorHandle,
        uuid: &Uuid,
        create_args: &[u8],
        attrs: &NodeAttributes,
    ) -> Result<NodeHandle>;

    /// Runs the node's create phase.
    fn create_node(&self, node: NodeHandle) -> Result<()>;

    /// Transitions the node to its running (execute) phase.
    fn run_node(&self, node: NodeHandle) -> Result<()>;

    /// Terminates the node and returns its exit status.
    fn terminate_node(&self, node: NodeHandle) -> Result<codeclink_sys::Status>;

    /// Deletes the node, releasing its coprocessor resources.
    fn delete_node(&self, node: NodeHandle) -> Result<()>;

    /// Reserves `size` bytes of DSP virtual address space.
    fn reserve(&self, processor: ProcessorHandle, size: usize) -> Result<ReservedRegion>;

    /// Maps `size` bytes at `host` into the reserved region.
    fn map(
        &self,
        processor: ProcessorHandle,
        host: HostPtr,
        size: usize,
        reserved: ReservedRegion,
    ) -> Result<MappedRegion>;

    /// Tears down a live mapping.
    fn unmap(&self, processor: ProcessorHandle, mapped: MappedRegion) -> Result<()>;

    /// Releases a reserved region of DSP address space.
    fn unreserve(&self, processor: ProcessorHandle, reserved: ReservedRegion) -> Result<()>;

    /// Posts a message to the node's inbound queue.
    ///
    /// `timeout` of `None` blocks until the driver accepts the message.
    fn put_message(&self, node: NodeHandle, msg: NodeMsg, timeout: Option<Duration>) -> Result<()>;

    /// Retrieves the next queued node-to-host message, waiting up to
    /// `timeout`.
    fn get_message(&self, node: NodeHandle, timeout: Duration) -> Result<NodeMsg>;

    /// Registers for a node-scoped notification (message ready).
    fn register_node_notify(&self, node: NodeHandle, event_mask: u32) -> Result<NotificationId>;

    /// Registers for a processor-scoped notification (MMU fault, system
    /// error).
    fn register_processor_notify(
        &self,
        processor: ProcessorHandle,
        event_mask: u32,
    ) -> Result<NotificationId>;

    /// Waits on a notification set, returning the index of the signaled
    /// entry.
    fn wait_for_events(&self, set: &[NotificationId], timeout: Duration) -> Result<usize>;
}
