// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! The message dispatch core.
//!
//! One thread per session waits on the notification set and drains the
//! node's message queue. Each message is classified by its command class
//! and routed to the slot store, the correlation queue and the application
//! callback. The loop exits only on the session's shutdown flag; transient
//! driver failures are logged and the loop continues.
//!
//! Ordering: messages are handled strictly in delivery order; stop and
//! flush bulk drains return buffers in ascending slot-index order. Events
//! are collected under the engine lock and delivered after it is released,
//! so callbacks may re-enter the session.

use std::{sync::Arc, sync::atomic::Ordering, time::Duration};

use tracing::{debug, error, trace, warn};

use codeclink_sys::{NodeMsg, alg_status, node_msg};

use crate::{
    Error,
    events::{BufferFlags, CodecEvent, Direction, StreamControlAck},
    mapper,
    session::{EngineState, LifecycleState, MAX_STREAMS, Shared, slot_to_completed},
};

/// Bound on one notification wait, so the shutdown flag is observed even
/// when the node is silent.
const WAIT_SLICE: Duration = Duration::from_millis(500);

/// Bound on one message retrieval inside the drain loop.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Notification-set indices, in registration order.
const NOTIFY_INDEX_MESSAGE: usize = 0;
const NOTIFY_INDEX_MMU_FAULT: usize = 1;
const NOTIFY_INDEX_SYS_ERROR: usize = 2;

/// The listener loop body. Runs on the dedicated dispatch thread until the
/// session sets the shutdown flag.
pub(crate) fn run(shared: Arc<Shared>) {
    debug!("dispatch loop running");
    loop {
        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }
        match shared
            .bridge
            .wait_for_events(&shared.notifications, WAIT_SLICE)
        {
            Ok(NOTIFY_INDEX_MESSAGE) => drain_messages(&shared),
            Ok(NOTIFY_INDEX_MMU_FAULT) => processor_fault(&shared, "MMU fault"),
            Ok(NOTIFY_INDEX_SYS_ERROR) => processor_fault(&shared, "system error"),
            Ok(index) => warn!(index, "notification from unexpected index"),
            Err(Error::Timeout) => {}
            Err(err) => trace!(?err, "notification wait failed"),
        }
    }
    debug!("dispatch loop exiting");
}

/// Pulls every currently queued message: one notification can correspond
/// to several of them.
fn drain_messages(shared: &Shared) {
    loop {
        match shared.bridge.get_message(shared.node, DRAIN_TIMEOUT) {
            Ok(msg) => handle_message(shared, msg),
            Err(Error::Timeout) => break,
            Err(err) => {
                debug!(?err, "message retrieval failed, ending drain");
                break;
            }
        }
    }
}

/// Classifies and handles one node-to-host message.
fn handle_message(shared: &Shared, msg: NodeMsg) {
    let stream = (msg.cmd & node_msg::STREAM_MASK) as u8;
    let class = msg.cmd & node_msg::CLASS_MASK;
    trace!(cmd = msg.cmd, arg1 = msg.arg1, arg2 = msg.arg2, "node message");

    let mut events = Vec::new();
    {
        let mut engine = shared.engine();
        match class {
            node_msg::NODE_BUFF_FREE => buffer_free(shared, &mut engine, stream, &msg, &mut events),
            node_msg::NODE_ACK_STOP => stop_ack(shared, &mut engine, &mut events),
            node_msg::NODE_ACK_PAUSE => pause_ack(shared, &mut engine, &mut events),
            node_msg::NODE_ACK_ALG_CTRL => alg_ack(shared, &mut engine, &msg, &mut events),
            node_msg::NODE_ACK_STRM_CTRL => {
                strm_ack(shared, &mut engine, stream, &msg, &mut events)
            }
            node_msg::NODE_EVENT => node_event(shared, &mut engine, &msg, &mut events),
            _ => events.push(CodecEvent::DspMessageReceived {
                opcode: msg.cmd,
                arg1: msg.arg1,
                arg2: msg.arg2,
            }),
        }
    }
    shared.emit(events);
}

/// Steady-state completion: the node is done with one buffer.
///
/// The echoed communication-record address resolves the originating slot;
/// a miss means the buffer was already reclaimed by a flush and the
/// message is dropped silently. The slot is cleared before its mappings
/// are unwound.
fn buffer_free(
    shared: &Shared,
    engine: &mut EngineState,
    stream: u8,
    msg: &NodeMsg,
    events: &mut Vec<CodecEvent>,
) {
    let direction = Direction::of_stream(stream);
    let Some(index) = engine.slots.array(direction).find_by_identity(msg.arg1) else {
        trace!(identity = msg.arg1, "completion for reclaimed buffer, dropping");
        return;
    };
    let Some(mut slot) = engine.slots.array_mut(direction).release(index) else {
        return;
    };
    shared.release_slot_mappings(&mut slot);

    let transferred = msg.arg2 as usize;
    let entry = match direction {
        Direction::Output => engine.correlation.pop_consuming(transferred, shared.accounting),
        Direction::Input => None,
    };
    events.push(CodecEvent::BufferProcessed(slot_to_completed(
        &slot,
        direction,
        transferred,
        entry,
        engine.eos_sentinel,
    )));
}

/// Stop acknowledgment: no further per-buffer completions will arrive, so
/// every still-bound buffer is returned with zero filled length, input
/// array first, each in ascending slot-index order.
fn stop_ack(shared: &Shared, engine: &mut EngineState, events: &mut Vec<CodecEvent>) {
    let eos_sentinel = engine.eos_sentinel;
    for (direction, drained) in [
        (Direction::Input, engine.slots.input.drain_all()),
        (Direction::Output, engine.slots.output.drain_all()),
    ] {
        for (_, mut slot) in drained {
            shared.release_slot_mappings(&mut slot);
            events.push(CodecEvent::BufferProcessed(slot_to_completed(
                &slot,
                direction,
                0,
                None,
                eos_sentinel,
            )));
        }
    }
    engine.correlation.flush();
    engine.lifecycle = LifecycleState::Stopped;
    engine.acks.stop += 1;
    shared.ack_cv.notify_all();
    events.push(CodecEvent::ProcessingStopped);
}

fn pause_ack(shared: &Shared, engine: &mut EngineState, events: &mut Vec<CodecEvent>) {
    engine.lifecycle = LifecycleState::Paused;
    engine.acks.pause += 1;
    shared.ack_cv.notify_all();
    events.push(CodecEvent::ProcessingPaused);
}

/// Algorithm-control acknowledgment: release the matching parameter-block
/// mapping and wake the blocked control call.
fn alg_ack(shared: &Shared, engine: &mut EngineState, msg: &NodeMsg, events: &mut Vec<CodecEvent>) {
    release_control_mapping(shared, &mut engine.alg_ctrl, msg.arg2);
    engine.acks.alg += 1;
    shared.ack_cv.notify_all();
    events.push(CodecEvent::AlgCtrlAck { status: msg.arg1 });
}

/// Stream-control acknowledgment. With a flush pending on the stream this
/// is a flush completion: the stream's in-flight buffers are reclaimed in
/// ascending slot order before the acknowledgment is surfaced.
fn strm_ack(
    shared: &Shared,
    engine: &mut EngineState,
    stream: u8,
    msg: &NodeMsg,
    events: &mut Vec<CodecEvent>,
) {
    let flush_hit = usize::from(stream) < MAX_STREAMS
        && engine.flush_pending[usize::from(stream)]
        && msg.arg1 == node_msg::NODE_ERR_NONE;

    let ack = if flush_hit {
        engine.flush_pending[usize::from(stream)] = false;
        let direction = Direction::of_stream(stream);
        let eos_sentinel = engine.eos_sentinel;
        for (_, mut slot) in engine.slots.array_mut(direction).drain_stream(stream) {
            shared.release_slot_mappings(&mut slot);
            events.push(CodecEvent::BufferProcessed(slot_to_completed(
                &slot,
                direction,
                0,
                None,
                eos_sentinel,
            )));
        }
        if direction == Direction::Input {
            engine.correlation.flush();
        }
        StreamControlAck::Flush
    } else {
        StreamControlAck::General
    };

    release_control_mapping(shared, &mut engine.strm_ctrl, msg.arg2);
    engine.acks.strm += 1;
    shared.ack_cv.notify_all();
    events.push(CodecEvent::StrmCtrlAck {
        stream,
        ack,
        status: msg.arg1,
    });
}

/// Unsolicited node event: warnings (e.g. play completed) are
/// informational, fatal algorithm errors halt the session and reclaim
/// every in-flight buffer.
fn node_event(
    shared: &Shared,
    engine: &mut EngineState,
    msg: &NodeMsg,
    events: &mut Vec<CodecEvent>,
) {
    let code = msg.arg1;
    if alg_status::is_fatal(code) {
        warn!(code, "fatal DSP event, halting session");
        shared.halted.store(true, Ordering::Release);
        halt_drain(shared, engine, events);
        events.push(CodecEvent::DspError {
            fatal: true,
            code,
            arg: msg.arg2,
        });
    } else {
        debug!(code, "DSP warning event");
        events.push(CodecEvent::DspError {
            fatal: false,
            code,
            arg: msg.arg2,
        });
    }
}

/// Processor-scoped fault notification (MMU fault, system error): fatal,
/// the node is presumed dead.
fn processor_fault(shared: &Shared, what: &str) {
    error!(what, "processor fault notification");
    shared.halted.store(true, Ordering::Release);
    let mut events = Vec::new();
    {
        let mut engine = shared.engine();
        halt_drain(shared, &mut engine, &mut events);
    }
    events.push(CodecEvent::DspError {
        fatal: true,
        code: 0,
        arg: 0,
    });
    shared.emit(events);
}

/// Returns every in-flight buffer of a dead session: zero filled length,
/// corrupt marker, no further decode completion will arrive.
fn halt_drain(shared: &Shared, engine: &mut EngineState, events: &mut Vec<CodecEvent>) {
    let eos_sentinel = engine.eos_sentinel;
    for (direction, drained) in [
        (Direction::Input, engine.slots.input.drain_all()),
        (Direction::Output, engine.slots.output.drain_all()),
    ] {
        for (_, mut slot) in drained {
            shared.release_slot_mappings(&mut slot);
            let mut completed = slot_to_completed(&slot, direction, 0, None, eos_sentinel);
            completed.flags |= BufferFlags::DATA_CORRUPT;
            events.push(CodecEvent::BufferNotProcessed(completed));
        }
    }
    engine.correlation.flush();
}

/// Releases the control-block mapping whose DSP address the node echoed
/// back in an acknowledgment.
fn release_control_mapping(
    shared: &Shared,
    table: &mut [Option<mapper::MappedBuffer>],
    dsp_address: u32,
) {
    for entry in table.iter_mut() {
        if entry.map(|mapping| mapping.dsp_address()) == Some(dsp_address) {
            if let Some(mapping) = entry.take() {
                let _ = mapper::unmap(shared.bridge.as_ref(), shared.processor, mapping);
            }
            break;
        }
    }
}
