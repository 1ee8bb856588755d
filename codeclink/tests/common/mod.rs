// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! Shared test fixtures: an in-process fake bridge driver and logging
//! setup.
//!
//! The fake counts reservations and mappings so tests can assert DMA
//! symmetry, records every host-to-node message, and by default answers
//! control commands with the matching acknowledgment the way a socket
//! node would. Buffer completions are never synthesized automatically;
//! tests inject them with [`FakeBridge::push_reply`].

use std::{
    collections::VecDeque,
    path::Path,
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use uuid::Uuid;

use codeclink::{
    Accounting, Bridge, CodecConfig, Error, HostPtr, LibraryKind, MappedRegion, NodeAttributes,
    NodeHandle, NodeLibrary, NodeMsg, NotificationId, ProcessorHandle, ReservedRegion, Result,
};
use codeclink_sys::node_msg;

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// Initializes tracing for tests (respects `RUST_LOG`).
pub fn setup_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });
}

#[derive(Default)]
struct FakeInner {
    replies: VecDeque<NodeMsg>,
    pending_fault: Option<usize>,
    sent: Vec<NodeMsg>,
    live_reservations: usize,
    live_mappings: usize,
    total_maps: u64,
    next_dsp_address: u32,
    auto_ack: bool,
    fail_map: bool,
    fail_put: bool,
}

/// An in-process [`Bridge`] implementation standing in for the driver and
/// the DSP node behind it.
pub struct FakeBridge {
    inner: Mutex<FakeInner>,
    wakeup: Condvar,
}

impl FakeBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeBridge {
            inner: Mutex::new(FakeInner {
                next_dsp_address: 0x1000_0000,
                auto_ack: true,
                ..FakeInner::default()
            }),
            wakeup: Condvar::new(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeInner> {
        self.inner.lock().expect("fake bridge mutex poisoned")
    }

    /// Enqueues a node-to-host message and wakes the dispatch loop.
    pub fn push_reply(&self, msg: NodeMsg) {
        self.lock().replies.push_back(msg);
        self.wakeup.notify_all();
    }

    /// Signals a processor-fault notification (1 = MMU fault, 2 = system
    /// error).
    pub fn raise_fault(&self, index: usize) {
        self.lock().pending_fault = Some(index);
        self.wakeup.notify_all();
    }

    /// Makes subsequent map calls fail.
    pub fn set_fail_map(&self, enabled: bool) {
        self.lock().fail_map = enabled;
    }

    /// Makes subsequent put-message calls fail.
    pub fn set_fail_put(&self, enabled: bool) {
        self.lock().fail_put = enabled;
    }

    /// The most recent host-to-node message.
    pub fn last_sent(&self) -> Option<NodeMsg> {
        self.lock().sent.last().copied()
    }

    /// Live (not yet released) reservation and mapping counts.
    pub fn live_regions(&self) -> (usize, usize) {
        let inner = self.lock();
        (inner.live_reservations, inner.live_mappings)
    }

    /// Total number of map calls ever made.
    pub fn total_maps(&self) -> u64 {
        self.lock().total_maps
    }
}

impl Bridge for FakeBridge {
    fn attach_processor(&self) -> Result<ProcessorHandle> {
        Ok(ProcessorHandle(1))
    }

    fn detach_processor(&self, _processor: ProcessorHandle) -> Result<()> {
        Ok(())
    }

    fn register_library(&self, _uuid: &Uuid, _kind: LibraryKind, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn unregister_library(&self, _uuid: &Uuid, _kind: LibraryKind) -> Result<()> {
        Ok(())
    }

    fn allocate_node(
        &self,
        _processor: ProcessorHandle,
        _uuid: &Uuid,
        _create_args: &[u8],
        _attrs: &NodeAttributes,
    ) -> Result<NodeHandle> {
        Ok(NodeHandle(7))
    }

    fn create_node(&self, _node: NodeHandle) -> Result<()> {
        Ok(())
    }

    fn run_node(&self, _node: NodeHandle) -> Result<()> {
        Ok(())
    }

    fn terminate_node(&self, _node: NodeHandle) -> Result<codeclink::Status> {
        Ok(0)
    }

    fn delete_node(&self, _node: NodeHandle) -> Result<()> {
        Ok(())
    }

    fn reserve(&self, _processor: ProcessorHandle, _size: usize) -> Result<ReservedRegion> {
        let mut inner = self.lock();
        inner.live_reservations += 1;
        let region = inner.next_dsp_address;
        inner.next_dsp_address += 0x10_0000;
        Ok(ReservedRegion(region))
    }

    fn map(
        &self,
        _processor: ProcessorHandle,
        _host: HostPtr,
        _size: usize,
        reserved: ReservedRegion,
    ) -> Result<MappedRegion> {
        let mut inner = self.lock();
        if inner.fail_map {
            return Err(Error::InsufficientResources);
        }
        inner.live_mappings += 1;
        inner.total_maps += 1;
        Ok(MappedRegion(reserved.0 | 0x1))
    }

    fn unmap(&self, _processor: ProcessorHandle, _mapped: MappedRegion) -> Result<()> {
        let mut inner = self.lock();
        assert!(inner.live_mappings > 0, "unmap without a live mapping");
        inner.live_mappings -= 1;
        Ok(())
    }

    fn unreserve(&self, _processor: ProcessorHandle, _reserved: ReservedRegion) -> Result<()> {
        let mut inner = self.lock();
        assert!(inner.live_reservations > 0, "unreserve without a live reservation");
        inner.live_reservations -= 1;
        Ok(())
    }

    fn put_message(
        &self,
        _node: NodeHandle,
        msg: NodeMsg,
        _timeout: Option<Duration>,
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.fail_put {
            return Err(Error::Hardware);
        }
        inner.sent.push(msg);

        if inner.auto_ack {
            let stream = msg.cmd & node_msg::STREAM_MASK;
            let ack = match msg.cmd & node_msg::CLASS_MASK {
                node_msg::HOST_PAUSE => Some(NodeMsg {
                    cmd: node_msg::NODE_ACK_PAUSE,
                    ..NodeMsg::default()
                }),
                node_msg::HOST_STOP => Some(NodeMsg {
                    cmd: node_msg::NODE_ACK_STOP,
                    ..NodeMsg::default()
                }),
                node_msg::HOST_ALG_CTRL => Some(NodeMsg {
                    cmd: node_msg::NODE_ACK_ALG_CTRL,
                    arg1: node_msg::NODE_ERR_NONE,
                    arg2: msg.arg2,
                }),
                node_msg::HOST_STRM_CTRL => Some(NodeMsg {
                    cmd: node_msg::NODE_ACK_STRM_CTRL | stream,
                    arg1: node_msg::NODE_ERR_NONE,
                    arg2: msg.arg2,
                }),
                _ => None,
            };
            if let Some(ack) = ack {
                inner.replies.push_back(ack);
                self.wakeup.notify_all();
            }
        }
        Ok(())
    }

    fn get_message(&self, _node: NodeHandle, _timeout: Duration) -> Result<NodeMsg> {
        match self.lock().replies.pop_front() {
            Some(msg) => Ok(msg),
            None => Err(Error::Timeout),
        }
    }

    fn register_node_notify(&self, _node: NodeHandle, _event_mask: u32) -> Result<NotificationId> {
        Ok(NotificationId(100))
    }

    fn register_processor_notify(
        &self,
        _processor: ProcessorHandle,
        event_mask: u32,
    ) -> Result<NotificationId> {
        Ok(NotificationId(u64::from(event_mask)))
    }

    fn wait_for_events(&self, _set: &[NotificationId], timeout: Duration) -> Result<usize> {
        let mut inner = self.lock();
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(index) = inner.pending_fault.take() {
                return Ok(index);
            }
            if !inner.replies.is_empty() {
                return Ok(0);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            let (guard, _) = self
                .wakeup
                .wait_timeout(inner, deadline - now)
                .expect("fake bridge mutex poisoned");
            inner = guard;
        }
    }
}

/// A codec configuration pointing at the fake driver.
pub fn test_config(accounting: Accounting) -> CodecConfig {
    let node_uuid = Uuid::new_v4();
    CodecConfig {
        node_uuid,
        libraries: vec![NodeLibrary {
            uuid: node_uuid,
            kind: LibraryKind::Node,
            file_name: "videodec_sn.dll64P".to_string(),
        }],
        create_args: vec![4, 320, 240],
        attributes: NodeAttributes::default(),
        queue_capacity: 8,
        accounting,
        dsp_path: Some("/tmp".into()),
    }
}
