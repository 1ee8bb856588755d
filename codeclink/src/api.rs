// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic loading of the bridge driver library.
//!
//! The driver ships as a shared object with a stable symbol list; this
//! module resolves every entry point once at load time and implements the
//! safe [`Bridge`] trait over them.

use std::{
    ffi::{CString, OsStr},
    path::Path,
    ptr,
    sync::Arc,
    time::Duration,
};

use uuid::Uuid;

use codeclink_sys as sys;

use crate::{
    Error, Result,
    bridge::{
        Bridge, HostPtr, LibraryKind, MappedRegion, NodeHandle, NodeMsg, NotificationId,
        ProcessorHandle, ReservedRegion,
    },
    config::NodeAttributes,
};

/// The resolved entry-point table of the driver library.
struct BridgeApi {
    processor_attach: sys::ProcessorAttachFn,
    processor_detach: sys::ProcessorDetachFn,
    register_object: sys::RegisterObjectFn,
    unregister_object: sys::UnregisterObjectFn,
    node_allocate: sys::NodeAllocateFn,
    node_create: sys::NodeCreateFn,
    node_run: sys::NodeRunFn,
    node_terminate: sys::NodeTerminateFn,
    node_delete: sys::NodeDeleteFn,
    reserve_memory: sys::ReserveMemoryFn,
    unreserve_memory: sys::UnreserveMemoryFn,
    map_memory: sys::MapMemoryFn,
    unmap_memory: sys::UnmapMemoryFn,
    node_put_message: sys::NodePutMessageFn,
    node_get_message: sys::NodeGetMessageFn,
    node_register_notify: sys::NodeRegisterNotifyFn,
    processor_register_notify: sys::ProcessorRegisterNotifyFn,
    wait_for_events: sys::WaitForEventsFn,
}

/// The production [`Bridge`] implementation, backed by the dynamically
/// loaded driver library.
///
/// The library handle is kept alive for the lifetime of the binding so the
/// resolved function pointers stay valid.
pub struct DynamicBridge {
    api: BridgeApi,
    _library: libloading::Library,
}

/// Loads the bridge driver library and resolves its entry points.
///
/// # Arguments
///
/// * `path` - Path or name of the driver shared object (e.g.
///   `"libbridge.so"`)
///
/// # Errors
///
/// Returns [`Error::LibLoading`] if the library cannot be opened or a
/// required symbol is missing.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> Result<(), codeclink::Error> {
/// let bridge = codeclink::load_bridge("libbridge.so")?;
/// # Ok(())
/// # }
/// ```
pub fn load_bridge(path: impl AsRef<OsStr>) -> Result<Arc<DynamicBridge>> {
    // Safety: the driver library's initialization routines are benign; the
    // resolved symbols are only called through the checked wrappers below.
    unsafe {
        let library = libloading::Library::new(path.as_ref())?;
        macro_rules! resolve {
            ($ty:ty, $name:literal) => {
                *library.get::<$ty>($name)?
            };
        }
        let api = BridgeApi {
            processor_attach: resolve!(sys::ProcessorAttachFn, b"bridge_processor_attach\0"),
            processor_detach: resolve!(sys::ProcessorDetachFn, b"bridge_processor_detach\0"),
            register_object: resolve!(sys::RegisterObjectFn, b"bridge_register_object\0"),
            unregister_object: resolve!(sys::UnregisterObjectFn, b"bridge_unregister_object\0"),
            node_allocate: resolve!(sys::NodeAllocateFn, b"bridge_node_allocate\0"),
            node_create: resolve!(sys::NodeCreateFn, b"bridge_node_create\0"),
            node_run: resolve!(sys::NodeRunFn, b"bridge_node_run\0"),
            node_terminate: resolve!(sys::NodeTerminateFn, b"bridge_node_terminate\0"),
            node_delete: resolve!(sys::NodeDeleteFn, b"bridge_node_delete\0"),
            reserve_memory: resolve!(sys::ReserveMemoryFn, b"bridge_reserve_memory\0"),
            unreserve_memory: resolve!(sys::UnreserveMemoryFn, b"bridge_unreserve_memory\0"),
            map_memory: resolve!(sys::MapMemoryFn, b"bridge_map_memory\0"),
            unmap_memory: resolve!(sys::UnmapMemoryFn, b"bridge_unmap_memory\0"),
            node_put_message: resolve!(sys::NodePutMessageFn, b"bridge_node_put_message\0"),
            node_get_message: resolve!(sys::NodeGetMessageFn, b"bridge_node_get_message\0"),
            node_register_notify: resolve!(
                sys::NodeRegisterNotifyFn,
                b"bridge_node_register_notify\0"
            ),
            processor_register_notify: resolve!(
                sys::ProcessorRegisterNotifyFn,
                b"bridge_processor_register_notify\0"
            ),
            wait_for_events: resolve!(sys::WaitForEventsFn, b"bridge_wait_for_events\0"),
        };
        Ok(Arc::new(DynamicBridge {
            api,
            _library: library,
        }))
    }
}

/// Converts a `uuid::Uuid` to the driver's registry identifier layout.
fn raw_uuid(uuid: &Uuid) -> sys::RawUuid {
    let (data1, data2, data3, data4) = uuid.as_fields();
    sys::RawUuid {
        data1,
        data2,
        data3,
        data4: *data4,
    }
}

fn timeout_ms(timeout: Option<Duration>) -> u32 {
    match timeout {
        None => sys::TIMEOUT_FOREVER,
        Some(duration) => duration.as_millis().min(u128::from(u32::MAX - 1)) as u32,
    }
}

// Handle round trips. Processor, node and notification handles are host
// pointers; reservation and mapping handles carry DSP-side addresses,
// which fit 32 bits on this coprocessor.

fn raw_processor(processor: ProcessorHandle) -> sys::RawProcessor {
    processor.0 as usize as sys::RawProcessor
}

fn raw_node(node: NodeHandle) -> sys::RawNode {
    node.0 as usize as sys::RawNode
}

impl Bridge for DynamicBridge {
    fn attach_processor(&self) -> Result<ProcessorHandle> {
        let mut raw: sys::RawProcessor = ptr::null_mut();
        Error::from_status(unsafe {
            (self.api.processor_attach)(sys::PROCESSOR_DSP, ptr::null(), &mut raw)
        })?;
        if raw.is_null() {
            return Err(Error::Other(
                "driver returned a null processor handle".to_string(),
            ));
        }
        Ok(ProcessorHandle(raw as usize as u64))
    }

    fn detach_processor(&self, processor: ProcessorHandle) -> Result<()> {
        Error::from_status(unsafe { (self.api.processor_detach)(raw_processor(processor)) })
    }

    fn register_library(&self, uuid: &Uuid, kind: LibraryKind, path: &Path) -> Result<()> {
        let raw = raw_uuid(uuid);
        let path = CString::new(path.as_os_str().as_encoded_bytes())?;
        Error::from_status(unsafe {
            (self.api.register_object)(&raw, kind.raw(), path.as_ptr())
        })
    }

    fn unregister_library(&self, uuid: &Uuid, kind: LibraryKind) -> Result<()> {
        let raw = raw_uuid(uuid);
        Error::from_status(unsafe { (self.api.unregister_object)(&raw, kind.raw()) })
    }

    fn allocate_node(
        &self,
        processor: ProcessorHandle,
        uuid: &Uuid,
        create_args: &[u8],
        attrs: &NodeAttributes,
    ) -> Result<NodeHandle> {
        let raw = raw_uuid(uuid);
        let raw_attrs = sys::NodeAttrs {
            struct_size: size_of::<sys::NodeAttrs>() as u32,
            priority: attrs.priority,
            timeout: attrs.timeout_ms,
            profile_id: attrs.profile_id,
        };
        let mut node: sys::RawNode = ptr::null_mut();
        Error::from_status(unsafe {
            (self.api.node_allocate)(
                raw_processor(processor),
                &raw,
                create_args.as_ptr(),
                create_args.len() as u32,
                &raw_attrs,
                &mut node,
            )
        })?;
        if node.is_null() {
            return Err(Error::Other("driver returned a null node handle".to_string()));
        }
        Ok(NodeHandle(node as usize as u64))
    }

    fn create_node(&self, node: NodeHandle) -> Result<()> {
        Error::from_status(unsafe { (self.api.node_create)(raw_node(node)) })
    }

    fn run_node(&self, node: NodeHandle) -> Result<()> {
        Error::from_status(unsafe { (self.api.node_run)(raw_node(node)) })
    }

    fn terminate_node(&self, node: NodeHandle) -> Result<sys::Status> {
        let mut exit_status: sys::Status = 0;
        Error::from_status(unsafe {
            (self.api.node_terminate)(raw_node(node), &mut exit_status)
        })?;
        Ok(exit_status)
    }

    fn delete_node(&self, node: NodeHandle) -> Result<()> {
        Error::from_status(unsafe { (self.api.node_delete)(raw_node(node)) })
    }

    fn reserve(&self, processor: ProcessorHandle, size: usize) -> Result<ReservedRegion> {
        let mut reserved = ptr::null_mut();
        Error::from_status(unsafe {
            (self.api.reserve_memory)(raw_processor(processor), size, &mut reserved)
        })?;
        Ok(ReservedRegion(reserved as usize as u32))
    }

    fn map(
        &self,
        processor: ProcessorHandle,
        host: HostPtr,
        size: usize,
        reserved: ReservedRegion,
    ) -> Result<MappedRegion> {
        let mut mapped = ptr::null_mut();
        Error::from_status(unsafe {
            (self.api.map_memory)(
                raw_processor(processor),
                host.0 as *mut std::os::raw::c_void,
                size,
                reserved.0 as usize as *mut std::os::raw::c_void,
                &mut mapped,
                0,
            )
        })?;
        Ok(MappedRegion(mapped as usize as u32))
    }

    fn unmap(&self, processor: ProcessorHandle, mapped: MappedRegion) -> Result<()> {
        Error::from_status(unsafe {
            (self.api.unmap_memory)(
                raw_processor(processor),
                mapped.0 as usize as *mut std::os::raw::c_void,
            )
        })
    }

    fn unreserve(&self, processor: ProcessorHandle, reserved: ReservedRegion) -> Result<()> {
        Error::from_status(unsafe {
            (self.api.unreserve_memory)(
                raw_processor(processor),
                reserved.0 as usize as *mut std::os::raw::c_void,
            )
        })
    }

    fn put_message(&self, node: NodeHandle, msg: NodeMsg, timeout: Option<Duration>) -> Result<()> {
        Error::from_status(unsafe {
            (self.api.node_put_message)(raw_node(node), &msg, timeout_ms(timeout))
        })
    }

    fn get_message(&self, node: NodeHandle, timeout: Duration) -> Result<NodeMsg> {
        let mut msg = NodeMsg::default();
        Error::from_status(unsafe {
            (self.api.node_get_message)(raw_node(node), &mut msg, timeout_ms(Some(timeout)))
        })?;
        Ok(msg)
    }

    fn register_node_notify(&self, node: NodeHandle, event_mask: u32) -> Result<NotificationId> {
        let mut notification: sys::RawNotification = ptr::null_mut();
        Error::from_status(unsafe {
            (self.api.node_register_notify)(
                raw_node(node),
                event_mask,
                sys::NOTIFY_TYPE_SIGNAL,
                &mut notification,
            )
        })?;
        Ok(NotificationId(notification as usize as u64))
    }

    fn register_processor_notify(
        &self,
        processor: ProcessorHandle,
        event_mask: u32,
    ) -> Result<NotificationId> {
        let mut notification: sys::RawNotification = ptr::null_mut();
        Error::from_status(unsafe {
            (self.api.processor_register_notify)(
                raw_processor(processor),
                event_mask,
                sys::NOTIFY_TYPE_SIGNAL,
                &mut notification,
            )
        })?;
        Ok(NotificationId(notification as usize as u64))
    }

    fn wait_for_events(&self, set: &[NotificationId], timeout: Duration) -> Result<usize> {
        let raw: Vec<sys::RawNotification> = set
            .iter()
            .map(|id| id.0 as usize as sys::RawNotification)
            .collect();
        let mut index: u32 = 0;
        Error::from_status(unsafe {
            (self.api.wait_for_events)(
                raw.as_ptr(),
                raw.len() as u32,
                &mut index,
                timeout_ms(Some(timeout)),
            )
        })?;
        Ok(index as usize)
    }
}
