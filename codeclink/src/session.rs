// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! Codec session management: node bring-up, buffer submission and the
//! synchronous control-command path.
//!
//! A [`CodecSession`] owns one codec node on the coprocessor, the in-flight
//! bookkeeping for its buffers and the dispatch thread that listens for its
//! messages. Two threads touch a session: the application thread (buffer
//! submission and control commands) and the dispatch thread. All mutable
//! engine state lives behind one mutex; control acknowledgments are handed
//! across threads with a condition variable signaled exclusively by the
//! dispatch thread.

use std::{
    mem,
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use tracing::{debug, error, warn};
use uuid::Uuid;

use codeclink_sys::{NOTIFY_MMU_FAULT, NOTIFY_NODE_MESSAGE_READY, NOTIFY_SYS_ERROR, node_msg};

use crate::{
    Error, Result,
    bridge::{Bridge, LibraryKind, NodeHandle, NodeMsg, NotificationId, ProcessorHandle},
    config::{Accounting, CodecConfig},
    correlation::{CorrelationEntry, CorrelationQueue},
    dispatch,
    events::{
        BufferFlags, BufferPort, CodecEvent, CompletedBuffer, Direction, EventCallback,
        FrameBuffer, SideParams,
    },
    mapper::{self, MappedBuffer},
    slots::{CommRecord, InFlightSlot, SlotMappings, SlotStore},
};

/// Upper bound on stream identifiers tracked for flush bookkeeping.
pub(crate) const MAX_STREAMS: usize = 16;

/// How long a control command waits for its acknowledgment.
const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of a codec session.
///
/// Transitions are driven exclusively by the control-command path (the
/// dispatch thread advances `Started ⇄ Paused → Stopped` on node
/// acknowledgments). The state gates whether submission and control calls
/// may touch the DSP handle at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No driver resources held.
    Unloaded,
    /// Processor attached, libraries registered.
    Loaded,
    /// Node created and running, listener active.
    Initialized,
    /// Decoding.
    Started,
    /// Paused by acknowledgment.
    Paused,
    /// Stopped by acknowledgment; in-flight buffers returned.
    Stopped,
    /// Teardown in progress.
    Destroying,
}

/// Acknowledgment generation counters, bumped by the dispatch thread.
#[derive(Debug, Default)]
pub(crate) struct AckCounters {
    pub pause: u64,
    pub stop: u64,
    pub alg: u64,
    pub strm: u64,
}

/// All engine state guarded by the session mutex.
pub(crate) struct EngineState {
    pub lifecycle: LifecycleState,
    pub slots: SlotStore,
    pub correlation: CorrelationQueue,
    pub flush_pending: [bool; MAX_STREAMS],
    pub alg_ctrl: Vec<Option<MappedBuffer>>,
    pub strm_ctrl: Vec<Option<MappedBuffer>>,
    /// When set, the submit path copies the descriptor's EOS flag into the
    /// communication record and completions carry it back.
    pub eos_sentinel: bool,
    pub acks: AckCounters,
}

/// State shared between the session handle and the dispatch thread.
pub(crate) struct Shared {
    pub bridge: Arc<dyn Bridge>,
    pub processor: ProcessorHandle,
    pub node: NodeHandle,
    pub notifications: Vec<NotificationId>,
    pub engine: Mutex<EngineState>,
    pub ack_cv: Condvar,
    pub shutdown: AtomicBool,
    pub halted: AtomicBool,
    pub accounting: Accounting,
    pub libraries: Vec<(Uuid, LibraryKind)>,
    pub callback: Box<EventCallback>,
}

impl Shared {
    pub(crate) fn engine(&self) -> MutexGuard<'_, EngineState> {
        self.engine.lock().expect("engine mutex poisoned")
    }

    /// Delivers events to the application callback. Callers must not hold
    /// the engine mutex.
    pub(crate) fn emit(&self, events: Vec<CodecEvent>) {
        for event in events {
            (self.callback)(event);
        }
    }

    /// Unwinds every DMA mapping owned by `slot`.
    pub(crate) fn release_slot_mappings(&self, slot: &mut InFlightSlot) {
        let mappings = mem::take(&mut slot.mappings);
        for buffer in [mappings.payload, mappings.params, mappings.comm_record]
            .into_iter()
            .flatten()
        {
            // Failures are logged inside the mapper; cleanup continues.
            let _ = mapper::unmap(self.bridge.as_ref(), self.processor, buffer);
        }
    }
}

/// Builds the application-facing completion record for a reclaimed slot.
pub(crate) fn slot_to_completed(
    slot: &InFlightSlot,
    direction: Direction,
    filled: usize,
    entry: Option<CorrelationEntry>,
    eos_sentinel: bool,
) -> CompletedBuffer {
    let mut flags = slot.buffer.flags;
    let mut timestamp = slot.buffer.timestamp;
    let mut tick = slot.buffer.tick;
    let mut mark = slot.buffer.mark;
    if let Some(entry) = entry {
        timestamp = entry.timestamp;
        tick = entry.tick;
        flags |= entry.flags;
        mark = entry.mark.or(mark);
    }
    if eos_sentinel && slot.comm.eos_flag != 0 {
        flags |= BufferFlags::EOS;
    }
    CompletedBuffer {
        direction,
        stream: slot.comm.stream as u8,
        ptr: slot.buffer.ptr,
        capacity: slot.buffer.capacity,
        filled,
        params: slot.params,
        user_arg: slot.buffer.user_arg,
        flags,
        timestamp,
        tick,
        mark,
    }
}

/// Synchronous commands accepted by [`CodecSession::control`].
#[derive(Debug, Clone, Copy)]
pub enum ControlCommand {
    /// Start (or resume) decoding.
    Start,
    /// Pause decoding; blocks until the node acknowledges.
    Pause,
    /// Stop decoding; blocks until the node acknowledges and every
    /// in-flight buffer has been returned.
    Stop,
    /// Hand an algorithm-parameter block to the node; blocks until
    /// acknowledged.
    AlgControl {
        command: u32,
        block: crate::bridge::HostPtr,
        len: usize,
    },
    /// Stream-scoped control, see [`StreamControl`].
    StreamControl { stream: u8, control: StreamControl },
    /// Raw codec-specific message, fire and forget.
    SendMessage { opcode: u32, arg1: u32, arg2: u32 },
    /// Toggle end-of-stream sentinel propagation (local, no DSP round
    /// trip).
    PropagateEos(bool),
}

/// Stream-control sub-commands.
#[derive(Debug, Clone, Copy)]
pub enum StreamControl {
    /// Discard in-flight buffers on the stream and return them without
    /// decode completion; blocks until the node acknowledges.
    Flush,
    /// Hand a stream-parameter block to the node; blocks until
    /// acknowledged.
    SetParams {
        command: u32,
        block: crate::bridge::HostPtr,
        len: usize,
    },
}

/// One codec node instance: the application-facing handle of the engine.
///
/// # Examples
///
/// ```no_run
/// use codeclink::{CodecConfig, CodecSession, ControlCommand, load_bridge};
///
/// # fn main() -> Result<(), codeclink::Error> {
/// let bridge = load_bridge("libbridge.so")?;
/// let config_json = std::fs::read_to_string("h264_decoder.json").unwrap();
/// let config: CodecConfig = serde_json::from_str(&config_json).unwrap();
///
/// let session = CodecSession::new(
///     bridge,
///     &config,
///     Box::new(|event| println!("codec event: {event:?}")),
/// )?;
/// session.control(ControlCommand::Start)?;
/// # Ok(())
/// # }
/// ```
pub struct CodecSession {
    shared: Arc<Shared>,
    listener: Option<JoinHandle<()>>,
    destroyed: bool,
}

impl CodecSession {
    /// Brings up a codec node and starts its listener.
    ///
    /// The sequence: attach the processor, register the configured node
    /// libraries, allocate/create/run the node, register the notification
    /// set (message ready, MMU fault, system error) and spawn the dispatch
    /// thread. On any failure the steps already taken are unwound.
    ///
    /// # Errors
    ///
    /// Propagates the first driver failure; [`Error::InsufficientResources`]
    /// if the listener thread cannot be spawned.
    pub fn new(
        bridge: Arc<dyn Bridge>,
        config: &CodecConfig,
        callback: Box<EventCallback>,
    ) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(Error::BadParameter);
        }

        let processor = bridge.attach_processor()?;
        debug!(?processor, "processor attached");

        let mut registered: Vec<(Uuid, LibraryKind)> = Vec::new();
        let mut allocated: Option<NodeHandle> = None;
        let setup = (|| -> Result<(NodeHandle, Vec<NotificationId>)> {
            for library in &config.libraries {
                let path = config.resolve_library_path(&library.file_name);
                bridge.register_library(&library.uuid, library.kind, &path)?;
                registered.push((library.uuid, library.kind));
            }
            debug!(libraries = registered.len(), "node libraries registered");

            let node = bridge.allocate_node(
                processor,
                &config.node_uuid,
                &config.create_args_bytes(),
                &config.attributes,
            )?;
            allocated = Some(node);
            bridge.create_node(node)?;
            bridge.run_node(node)?;
            debug!(?node, "node running");

            let notifications = vec![
                bridge.register_node_notify(node, NOTIFY_NODE_MESSAGE_READY)?,
                bridge.register_processor_notify(processor, NOTIFY_MMU_FAULT)?,
                bridge.register_processor_notify(processor, NOTIFY_SYS_ERROR)?,
            ];
            Ok((node, notifications))
        })();

        let (node, notifications) = match setup {
            Ok(value) => value,
            Err(err) => {
                if let Some(node) = allocated {
                    let _ = bridge.delete_node(node);
                }
                for (uuid, kind) in &registered {
                    let _ = bridge.unregister_library(uuid, *kind);
                }
                let _ = bridge.detach_processor(processor);
                return Err(err);
            }
        };

        let capacity = config.queue_capacity;
        let shared = Arc::new(Shared {
            bridge,
            processor,
            node,
            notifications,
            engine: Mutex::new(EngineState {
                lifecycle: LifecycleState::Initialized,
                slots: SlotStore::new(capacity),
                correlation: CorrelationQueue::new(capacity),
                flush_pending: [false; MAX_STREAMS],
                alg_ctrl: vec![None; capacity],
                strm_ctrl: vec![None; capacity],
                eos_sentinel: false,
                acks: AckCounters::default(),
            }),
            ack_cv: Condvar::new(),
            shutdown: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            accounting: config.accounting,
            libraries: registered,
            callback,
        });

        let dispatch_shared = shared.clone();
        let spawned = std::thread::Builder::new()
            .name("codeclink-dispatch".to_string())
            .spawn(move || dispatch::run(dispatch_shared));
        let listener = match spawned {
            Ok(listener) => listener,
            Err(spawn_error) => {
                (shared.callback)(CodecEvent::InitError {
                    detail: format!("failed to spawn dispatch thread: {spawn_error}"),
                });
                let _ = shared.bridge.terminate_node(shared.node);
                let _ = shared.bridge.delete_node(shared.node);
                for (uuid, kind) in &shared.libraries {
                    let _ = shared.bridge.unregister_library(uuid, *kind);
                }
                let _ = shared.bridge.detach_processor(shared.processor);
                return Err(Error::InsufficientResources);
            }
        };

        Ok(CodecSession {
            shared,
            listener: Some(listener),
            destroyed: false,
        })
    }

    /// Hands one buffer to the DSP.
    ///
    /// Under the engine lock: builds the communication record, binds an
    /// in-flight slot, maps the payload, the optional side-parameter block
    /// and the record itself into DSP address space, then posts the
    /// queue-buffer message (blocking until the driver accepts it).
    /// Completion arrives later through the event callback.
    ///
    /// Any failure after the slot is taken releases the slot and unwinds
    /// every mapping made so far; if the buffer had already entered the
    /// engine it is handed back through
    /// [`CodecEvent::BufferNotProcessed`].
    ///
    /// # Errors
    ///
    /// - [`Error::Hardware`] when the session is halted
    /// - [`Error::InvalidState`] outside `Initialized`/`Started`/`Paused`
    /// - [`Error::BadParameter`] for null payloads or out-of-range streams
    /// - [`Error::CapacityExceeded`] when the slot array or correlation
    ///   ring is full
    /// - [`Error::InsufficientResources`] when DMA mapping fails
    pub fn queue_buffer(
        &self,
        port: BufferPort,
        buffer: FrameBuffer,
        params: Option<SideParams>,
    ) -> Result<()> {
        let shared = &self.shared;
        let stream = port.stream_id();
        if usize::from(stream) >= MAX_STREAMS {
            return Err(Error::BadParameter);
        }
        if buffer.ptr.is_null() && buffer.capacity > 0 {
            return Err(Error::BadParameter);
        }
        if let Some(side) = &params
            && side.ptr.is_null()
            && side.len > 0
        {
            return Err(Error::BadParameter);
        }

        let direction = port.direction();
        let mut engine = shared.engine();
        guard_session(shared, &engine, SUBMIT_STATES)?;

        let track_correlation =
            direction == Direction::Input && !buffer.flags.contains(BufferFlags::CODEC_CONFIG);
        if track_correlation && engine.correlation.len() == engine.correlation.capacity() {
            return Err(Error::CapacityExceeded);
        }

        let in_cursor = engine.slots.input.cursor() as u32;
        let out_cursor = engine.slots.output.cursor() as u32;
        let index = engine.slots.array(direction).reserve()?;

        let payload_size = match direction {
            Direction::Input if buffer.filled > 0 => buffer.filled,
            _ => buffer.capacity,
        };
        let mut comm = Box::new(CommRecord {
            buffer_size: payload_size as u32,
            param_size: params.map_or(0, |side| side.len) as u32,
            host_buffer: buffer.ptr.0 as u64,
            host_param: params.map_or(0, |side| side.ptr.0) as u64,
            user_arg: buffer.user_arg,
            stream: u32::from(stream),
            in_index: in_cursor,
            out_index: out_cursor,
            eos_flag: u32::from(engine.eos_sentinel && buffer.flags.contains(BufferFlags::EOS)),
            ..CommRecord::default()
        });

        let mut mappings = SlotMappings::default();
        let mapped = (|| -> Result<u32> {
            if !buffer.ptr.is_null() && payload_size > 0 {
                let payload =
                    mapper::map(shared.bridge.as_ref(), shared.processor, buffer.ptr, payload_size)?;
                comm.buffer_dsp = payload.dsp_address();
                mappings.payload = Some(payload);
            }
            if let Some(side) = &params
                && side.len > 0
            {
                let block =
                    mapper::map(shared.bridge.as_ref(), shared.processor, side.ptr, side.len)?;
                comm.param_dsp = block.dsp_address();
                mappings.params = Some(block);
            }
            let comm_host = crate::bridge::HostPtr(&*comm as *const CommRecord as usize);
            let record = mapper::map(
                shared.bridge.as_ref(),
                shared.processor,
                comm_host,
                mem::size_of::<CommRecord>(),
            )?;
            mappings.comm_record = Some(record);
            Ok(record.dsp_address())
        })();

        let identity = match mapped {
            Ok(identity) => identity,
            Err(err) => {
                for mapping in [mappings.payload, mappings.params, mappings.comm_record]
                    .into_iter()
                    .flatten()
                {
                    let _ = mapper::unmap(shared.bridge.as_ref(), shared.processor, mapping);
                }
                return Err(err);
            }
        };

        engine.slots.array_mut(direction).bind(
            index,
            InFlightSlot {
                comm,
                identity,
                buffer,
                params,
                mappings,
            },
        );

        let msg = NodeMsg {
            cmd: node_msg::HOST_SET_BUFF | u32::from(stream),
            arg1: identity,
            arg2: 0,
        };
        match shared.bridge.put_message(shared.node, msg, None) {
            Ok(()) => {
                if track_correlation {
                    // Capacity was checked above while the lock was held.
                    let _ = engine.correlation.push(&buffer);
                }
                Ok(())
            }
            Err(err) => {
                warn!(?err, identity, "queue-buffer message rejected, unwinding");
                let mut events = Vec::new();
                if let Some(mut slot) = engine.slots.array_mut(direction).release(index) {
                    shared.release_slot_mappings(&mut slot);
                    let mut completed =
                        slot_to_completed(&slot, direction, 0, None, engine.eos_sentinel);
                    completed.flags |= BufferFlags::DATA_CORRUPT;
                    events.push(CodecEvent::BufferNotProcessed(completed));
                }
                drop(engine);
                shared.emit(events);
                Err(err)
            }
        }
    }

    /// Executes a control command, blocking for its acknowledgment where
    /// the protocol defines one.
    ///
    /// # Errors
    ///
    /// - [`Error::Hardware`] when the session is halted
    /// - [`Error::InvalidState`] when the command is illegal in the current
    ///   lifecycle state
    /// - [`Error::Timeout`] when the node does not acknowledge in time
    pub fn control(&self, command: ControlCommand) -> Result<()> {
        let shared = &self.shared;
        match command {
            ControlCommand::PropagateEos(enabled) => {
                shared.engine().eos_sentinel = enabled;
                Ok(())
            }
            ControlCommand::Start => {
                let mut engine = shared.engine();
                guard_session(shared, &engine, CONTROL_STATES)?;
                require_state(
                    &engine,
                    &[
                        LifecycleState::Initialized,
                        LifecycleState::Stopped,
                        LifecycleState::Paused,
                    ],
                )?;
                shared.bridge.put_message(
                    shared.node,
                    NodeMsg {
                        cmd: node_msg::HOST_PLAY,
                        ..NodeMsg::default()
                    },
                    None,
                )?;
                engine.lifecycle = LifecycleState::Started;
                drop(engine);
                shared.emit(vec![CodecEvent::ProcessingStarted]);
                Ok(())
            }
            ControlCommand::Pause => {
                let engine = shared.engine();
                guard_session(shared, &engine, CONTROL_STATES)?;
                require_state(&engine, &[LifecycleState::Started])?;
                let generation = engine.acks.pause;
                shared.bridge.put_message(
                    shared.node,
                    NodeMsg {
                        cmd: node_msg::HOST_PAUSE,
                        ..NodeMsg::default()
                    },
                    None,
                )?;
                wait_for_ack(shared, engine, move |engine| engine.acks.pause > generation)
            }
            ControlCommand::Stop => {
                let engine = shared.engine();
                guard_session(shared, &engine, CONTROL_STATES)?;
                require_state(&engine, &[LifecycleState::Started, LifecycleState::Paused])?;
                let generation = engine.acks.stop;
                shared.bridge.put_message(
                    shared.node,
                    NodeMsg {
                        cmd: node_msg::HOST_STOP,
                        ..NodeMsg::default()
                    },
                    None,
                )?;
                wait_for_ack(shared, engine, move |engine| engine.acks.stop > generation)
            }
            ControlCommand::AlgControl { command, block, len } => {
                let mut engine = shared.engine();
                guard_session(shared, &engine, CONTROL_STATES)?;
                if block.is_null() || len == 0 {
                    return Err(Error::BadParameter);
                }
                let slot = engine
                    .alg_ctrl
                    .iter()
                    .position(Option::is_none)
                    .ok_or(Error::InsufficientResources)?;
                let mapped = mapper::map(shared.bridge.as_ref(), shared.processor, block, len)?;
                engine.alg_ctrl[slot] = Some(mapped);
                let generation = engine.acks.alg;
                let send = shared.bridge.put_message(
                    shared.node,
                    NodeMsg {
                        cmd: node_msg::HOST_ALG_CTRL,
                        arg1: command,
                        arg2: mapped.dsp_address(),
                    },
                    None,
                );
                if let Err(err) = send {
                    engine.alg_ctrl[slot] = None;
                    let _ = mapper::unmap(shared.bridge.as_ref(), shared.processor, mapped);
                    return Err(err);
                }
                wait_for_ack(shared, engine, move |engine| engine.acks.alg > generation)
            }
            ControlCommand::StreamControl { stream, control } => {
                self.stream_control(stream, control)
            }
            ControlCommand::SendMessage { opcode, arg1, arg2 } => {
                let engine = shared.engine();
                guard_session(shared, &engine, CONTROL_STATES)?;
                shared.bridge.put_message(
                    shared.node,
                    NodeMsg {
                        cmd: opcode,
                        arg1,
                        arg2,
                    },
                    None,
                )
            }
        }
    }

    fn stream_control(&self, stream: u8, control: StreamControl) -> Result<()> {
        let shared = &self.shared;
        if usize::from(stream) >= MAX_STREAMS {
            return Err(Error::BadParameter);
        }
        let mut engine = shared.engine();
        guard_session(shared, &engine, CONTROL_STATES)?;
        let generation = engine.acks.strm;

        match control {
            StreamControl::Flush => {
                engine.flush_pending[usize::from(stream)] = true;
                let send = shared.bridge.put_message(
                    shared.node,
                    NodeMsg {
                        cmd: node_msg::HOST_STRM_CTRL | u32::from(stream),
                        arg1: node_msg::STRMCMD_FLUSH,
                        arg2: 0,
                    },
                    None,
                );
                if let Err(err) = send {
                    engine.flush_pending[usize::from(stream)] = false;
                    return Err(err);
                }
            }
            StreamControl::SetParams { command, block, len } => {
                if block.is_null() || len == 0 {
                    return Err(Error::BadParameter);
                }
                let slot = engine
                    .strm_ctrl
                    .iter()
                    .position(Option::is_none)
                    .ok_or(Error::InsufficientResources)?;
                let mapped = mapper::map(shared.bridge.as_ref(), shared.processor, block, len)?;
                engine.strm_ctrl[slot] = Some(mapped);
                let send = shared.bridge.put_message(
                    shared.node,
                    NodeMsg {
                        cmd: node_msg::HOST_STRM_CTRL | u32::from(stream),
                        arg1: command,
                        arg2: mapped.dsp_address(),
                    },
                    None,
                );
                if let Err(err) = send {
                    engine.strm_ctrl[slot] = None;
                    let _ = mapper::unmap(shared.bridge.as_ref(), shared.processor, mapped);
                    return Err(err);
                }
            }
        }

        wait_for_ack(shared, engine, move |engine| engine.acks.strm > generation)
    }

    /// Tears the session down, consuming it.
    ///
    /// Sets the shutdown flag, joins the dispatch thread, terminates and
    /// deletes the node, returns any still-bound buffers (zero filled
    /// length), releases all DMA mappings and the processor attachment.
    /// Normally teardown also runs automatically on drop; this method
    /// allows observing teardown errors.
    pub fn destroy(mut self) -> Result<()> {
        self.destroy_inner()
    }

    fn destroy_inner(&mut self) -> Result<()> {
        if self.destroyed {
            return Ok(());
        }
        self.destroyed = true;
        let shared = &self.shared;

        shared.engine().lifecycle = LifecycleState::Destroying;
        shared.shutdown.store(true, Ordering::Release);
        if let Some(listener) = self.listener.take()
            && listener.join().is_err()
        {
            error!("dispatch thread panicked during shutdown");
        }

        let mut first_error = None;
        match shared.bridge.terminate_node(shared.node) {
            Ok(exit_status) => debug!(exit_status, "node terminated"),
            Err(err) => {
                warn!(?err, "node terminate failed");
                first_error.get_or_insert(err);
            }
        }
        if let Err(err) = shared.bridge.delete_node(shared.node) {
            warn!(?err, "node delete failed");
            first_error.get_or_insert(err);
        }

        let mut events = Vec::new();
        {
            let mut engine_guard = shared.engine();
            let engine = &mut *engine_guard;
            let eos_sentinel = engine.eos_sentinel;
            for (direction, drained) in [
                (Direction::Input, engine.slots.input.drain_all()),
                (Direction::Output, engine.slots.output.drain_all()),
            ] {
                for (_, mut slot) in drained {
                    shared.release_slot_mappings(&mut slot);
                    events.push(CodecEvent::BufferNotProcessed(slot_to_completed(
                        &slot,
                        direction,
                        0,
                        None,
                        eos_sentinel,
                    )));
                }
            }
            for entry in engine
                .alg_ctrl
                .iter_mut()
                .chain(engine.strm_ctrl.iter_mut())
            {
                if let Some(buffer) = entry.take() {
                    let _ = mapper::unmap(shared.bridge.as_ref(), shared.processor, buffer);
                }
            }
            engine.correlation.flush();
            engine.lifecycle = LifecycleState::Unloaded;
        }

        for (uuid, kind) in &shared.libraries {
            if let Err(err) = shared.bridge.unregister_library(uuid, *kind) {
                warn!(?err, %uuid, "library unregister failed");
            }
        }
        if let Err(err) = shared.bridge.detach_processor(shared.processor) {
            warn!(?err, "processor detach failed");
            first_error.get_or_insert(err);
        }

        shared.emit(events);
        debug!("session destroyed");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for CodecSession {
    /// Tears the session down if [`CodecSession::destroy`] was not called.
    fn drop(&mut self) {
        if !self.destroyed
            && let Err(err) = self.destroy_inner()
        {
            error!(?err, "failed to destroy codec session on drop");
        }
    }
}

const SUBMIT_STATES: &[LifecycleState] = &[
    LifecycleState::Initialized,
    LifecycleState::Started,
    LifecycleState::Paused,
];

const CONTROL_STATES: &[LifecycleState] = &[
    LifecycleState::Initialized,
    LifecycleState::Started,
    LifecycleState::Paused,
    LifecycleState::Stopped,
];

/// The centralized DSP-readiness guard run at the entry of every
/// submission and control operation: the session must not be halted, torn
/// down or outside the permitted lifecycle states.
fn guard_session(
    shared: &Shared,
    engine: &EngineState,
    permitted: &[LifecycleState],
) -> Result<()> {
    if shared.halted.load(Ordering::Acquire) {
        return Err(Error::Hardware);
    }
    if matches!(
        engine.lifecycle,
        LifecycleState::Unloaded | LifecycleState::Destroying
    ) {
        return Err(Error::Hardware);
    }
    if !permitted.contains(&engine.lifecycle) {
        return Err(Error::InvalidState(engine.lifecycle));
    }
    Ok(())
}

fn require_state(engine: &EngineState, permitted: &[LifecycleState]) -> Result<()> {
    if permitted.contains(&engine.lifecycle) {
        Ok(())
    } else {
        Err(Error::InvalidState(engine.lifecycle))
    }
}

/// Blocks on the acknowledgment condition variable until `acked` observes
/// the dispatch thread's signal or the bounded wait elapses.
fn wait_for_ack(
    shared: &Shared,
    engine: MutexGuard<'_, EngineState>,
    acked: impl Fn(&EngineState) -> bool,
) -> Result<()> {
    let (engine, wait) = shared
        .ack_cv
        .wait_timeout_while(engine, ACK_TIMEOUT, |engine| !acked(engine))
        .expect("engine mutex poisoned");
    drop(engine);
    if wait.timed_out() {
        Err(Error::Timeout)
    } else {
        Ok(())
    }
}
