// SPDX-FileCopyrightText: 2025-2026 Contributors to the CodecLink project.
// SPDX-License-Identifier: Apache-2.0

//! End-to-end engine tests driven through the fake bridge driver.
//!
//! These tests exercise the full submit → complete → reclaim lifecycle:
//! buffer conservation across stop and flush, identity matching, DMA
//! map/unmap symmetry, halted-session short-circuiting and lifecycle
//! gating.

mod common;

use std::{
    sync::{Arc, mpsc},
    time::Duration,
};

use common::{FakeBridge, setup_logging, test_config};

use codeclink::{
    Accounting, BufferFlags, BufferPort, CodecEvent, CodecSession, ControlCommand, Direction,
    Error, FrameBuffer, HostPtr, NodeMsg, StreamControl,
};
use codeclink_sys::{alg_status, node_msg};

const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// One page-aligned payload allocation kept alive for the test duration.
struct TestPayload {
    data: Vec<u8>,
}

impl TestPayload {
    fn new(len: usize) -> Self {
        TestPayload {
            data: vec![0u8; len.max(1)],
        }
    }

    fn ptr(&self) -> HostPtr {
        HostPtr(self.data.as_ptr() as usize)
    }
}

fn frame(payload: &TestPayload, filled: usize, timestamp: i64, user_arg: u64) -> FrameBuffer {
    FrameBuffer {
        ptr: payload.ptr(),
        capacity: payload.data.len(),
        filled,
        flags: BufferFlags::default(),
        timestamp,
        tick: timestamp as u32,
        mark: None,
        user_arg,
    }
}

/// Builds a started session around a fresh fake bridge.
fn started_session(
    accounting: Accounting,
) -> (Arc<FakeBridge>, CodecSession, mpsc::Receiver<CodecEvent>) {
    setup_logging();
    let fake = FakeBridge::new();
    let (tx, rx) = mpsc::channel();
    let session = CodecSession::new(
        fake.clone(),
        &test_config(accounting),
        Box::new(move |event| {
            let _ = tx.send(event);
        }),
    )
    .expect("session bring-up failed");
    session
        .control(ControlCommand::Start)
        .expect("start failed");
    let event = rx.recv_timeout(EVENT_TIMEOUT).expect("no start event");
    assert!(matches!(event, CodecEvent::ProcessingStarted));
    (fake, session, rx)
}

/// The identity the engine encoded into the most recent queue-buffer
/// message.
fn last_submission_identity(fake: &FakeBridge) -> u32 {
    let msg = fake.last_sent().expect("nothing sent");
    assert_eq!(msg.cmd & node_msg::CLASS_MASK, node_msg::HOST_SET_BUFF);
    msg.arg1
}

fn recv_processed(rx: &mpsc::Receiver<CodecEvent>) -> codeclink::CompletedBuffer {
    match rx.recv_timeout(EVENT_TIMEOUT).expect("no completion event") {
        CodecEvent::BufferProcessed(buffer) => buffer,
        other => panic!("expected BufferProcessed, got {other:?}"),
    }
}

/// A submitted buffer comes back through a completion message with the
/// reported byte count and its submission metadata.
#[test]
fn submit_and_complete_roundtrip() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    let payload = TestPayload::new(4096);

    session
        .queue_buffer(BufferPort::Input, frame(&payload, 512, 1000, 42), None)
        .unwrap();
    let identity = last_submission_identity(&fake);

    fake.push_reply(NodeMsg {
        cmd: node_msg::NODE_BUFF_FREE, // stream 0: input
        arg1: identity,
        arg2: 512,
    });

    let completed = recv_processed(&rx);
    assert_eq!(completed.direction, Direction::Input);
    assert_eq!(completed.filled, 512);
    assert_eq!(completed.user_arg, 42);
    assert_eq!(completed.timestamp, 1000);

    session.destroy().unwrap();
}

/// Property: at most one in-flight slot references a given identity. A
/// duplicate completion for an already-cleared slot is dropped silently.
#[test]
fn duplicate_completion_is_dropped() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    let payload = TestPayload::new(4096);

    session
        .queue_buffer(BufferPort::Input, frame(&payload, 100, 0, 1), None)
        .unwrap();
    let identity = last_submission_identity(&fake);

    let completion = NodeMsg {
        cmd: node_msg::NODE_BUFF_FREE,
        arg1: identity,
        arg2: 100,
    };
    fake.push_reply(completion);
    recv_processed(&rx);

    // Replay the same completion, then a recognizable warning event. The
    // next event observed must be the warning: the replay produced nothing.
    fake.push_reply(completion);
    fake.push_reply(NodeMsg {
        cmd: node_msg::NODE_EVENT,
        arg1: alg_status::WARN_PLAY_COMPLETED,
        arg2: 0,
    });
    match rx.recv_timeout(EVENT_TIMEOUT).expect("no event") {
        CodecEvent::DspError { fatal: false, code, .. } => {
            assert_eq!(code, alg_status::WARN_PLAY_COMPLETED);
        }
        other => panic!("expected the warning event, got {other:?}"),
    }

    session.destroy().unwrap();
}

/// Property: conservation of buffers across a flush. N submitted buffers
/// produce exactly N returns with no duplicates and no omissions.
#[test]
fn flush_returns_every_in_flight_buffer() {
    let (_fake, session, rx) = started_session(Accounting::Frames);
    let payloads: Vec<TestPayload> = (0..3).map(|_| TestPayload::new(2048)).collect();

    for (index, payload) in payloads.iter().enumerate() {
        session
            .queue_buffer(
                BufferPort::Input,
                frame(payload, 256, index as i64, index as u64),
                None,
            )
            .unwrap();
    }

    session
        .control(ControlCommand::StreamControl {
            stream: 0,
            control: StreamControl::Flush,
        })
        .unwrap();

    let mut returned = Vec::new();
    let mut saw_ack = false;
    while returned.len() < 3 || !saw_ack {
        match rx.recv_timeout(EVENT_TIMEOUT).expect("missing flush event") {
            CodecEvent::BufferProcessed(buffer) => {
                assert_eq!(buffer.filled, 0);
                returned.push(buffer.user_arg);
            }
            CodecEvent::StrmCtrlAck { stream, .. } => {
                assert_eq!(stream, 0);
                saw_ack = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    returned.sort_unstable();
    assert_eq!(returned, vec![0, 1, 2]);

    session.destroy().unwrap();
}

/// Property: stop-drain completeness. M input and N output buffers bound
/// at stop-acknowledge time come back as exactly M+N zero-length returns,
/// input array first.
#[test]
fn stop_drains_both_directions() {
    let (_fake, session, rx) = started_session(Accounting::Frames);
    let inputs: Vec<TestPayload> = (0..2).map(|_| TestPayload::new(1024)).collect();
    let outputs: Vec<TestPayload> = (0..3).map(|_| TestPayload::new(8192)).collect();

    for (index, payload) in inputs.iter().enumerate() {
        session
            .queue_buffer(BufferPort::Input, frame(payload, 128, 0, index as u64), None)
            .unwrap();
    }
    for (index, payload) in outputs.iter().enumerate() {
        session
            .queue_buffer(
                BufferPort::Output,
                frame(payload, 0, 0, 100 + index as u64),
                None,
            )
            .unwrap();
    }

    session.control(ControlCommand::Stop).unwrap();

    let mut input_args = Vec::new();
    let mut output_args = Vec::new();
    let mut stopped = false;
    while !stopped {
        match rx.recv_timeout(EVENT_TIMEOUT).expect("missing stop event") {
            CodecEvent::BufferProcessed(buffer) => {
                assert_eq!(buffer.filled, 0);
                match buffer.direction {
                    Direction::Input => input_args.push(buffer.user_arg),
                    Direction::Output => output_args.push(buffer.user_arg),
                }
            }
            CodecEvent::ProcessingStopped => stopped = true,
            other => panic!("unexpected event {other:?}"),
        }
    }
    // Ascending slot-index order per array matches submission order here.
    assert_eq!(input_args, vec![0, 1]);
    assert_eq!(output_args, vec![100, 101, 102]);

    session.destroy().unwrap();
}

/// Property: map/unmap symmetry. After a full submit → complete → flush →
/// stop → destroy cycle no reservations or mappings remain live.
#[test]
fn dma_regions_balance_to_zero() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    let first = TestPayload::new(4096);
    let second = TestPayload::new(4096);
    let side = TestPayload::new(128);

    session
        .queue_buffer(
            BufferPort::Input,
            frame(&first, 512, 0, 1),
            Some(codeclink::SideParams {
                ptr: side.ptr(),
                len: side.data.len(),
            }),
        )
        .unwrap();
    let identity = last_submission_identity(&fake);
    session
        .queue_buffer(BufferPort::Input, frame(&second, 512, 1, 2), None)
        .unwrap();

    // Complete the first buffer, flush away the second.
    fake.push_reply(NodeMsg {
        cmd: node_msg::NODE_BUFF_FREE,
        arg1: identity,
        arg2: 512,
    });
    recv_processed(&rx);
    session
        .control(ControlCommand::StreamControl {
            stream: 0,
            control: StreamControl::Flush,
        })
        .unwrap();
    session.control(ControlCommand::Stop).unwrap();
    session.destroy().unwrap();

    assert!(fake.total_maps() >= 4, "payload, side block and records");
    assert_eq!(fake.live_regions(), (0, 0));
}

/// Property: halted-session short-circuit. After a fatal DSP event the
/// in-flight buffers return in one drain and submissions fail with a
/// hardware error without touching the mapper.
#[test]
fn fatal_event_halts_session() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    let stuck = TestPayload::new(2048);
    session
        .queue_buffer(BufferPort::Input, frame(&stuck, 64, 0, 7), None)
        .unwrap();

    fake.push_reply(NodeMsg {
        cmd: node_msg::NODE_EVENT,
        arg1: alg_status::ERR_DATA_CORRUPT,
        arg2: 0,
    });

    let mut drained = false;
    let mut fatal = false;
    while !(drained && fatal) {
        match rx.recv_timeout(EVENT_TIMEOUT).expect("missing halt event") {
            CodecEvent::BufferNotProcessed(buffer) => {
                assert_eq!(buffer.user_arg, 7);
                assert_eq!(buffer.filled, 0);
                assert!(buffer.flags.contains(BufferFlags::DATA_CORRUPT));
                drained = true;
            }
            CodecEvent::DspError { fatal: true, code, .. } => {
                assert_eq!(code, alg_status::ERR_DATA_CORRUPT);
                fatal = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    let maps_before = fake.total_maps();
    let late = TestPayload::new(2048);
    let result = session.queue_buffer(BufferPort::Input, frame(&late, 64, 1, 8), None);
    assert!(matches!(result, Err(Error::Hardware)));
    assert_eq!(fake.total_maps(), maps_before, "mapper touched after halt");

    // Destroy still works on a halted session.
    session.destroy().unwrap();
    assert_eq!(fake.live_regions(), (0, 0));
}

/// A processor fault notification halts the session the same way a fatal
/// node event does.
#[test]
fn mmu_fault_halts_session() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    fake.raise_fault(1);
    match rx.recv_timeout(EVENT_TIMEOUT).expect("no fault event") {
        CodecEvent::DspError { fatal: true, .. } => {}
        other => panic!("expected fatal DspError, got {other:?}"),
    }
    let payload = TestPayload::new(512);
    assert!(matches!(
        session.queue_buffer(BufferPort::Input, frame(&payload, 64, 0, 1), None),
        Err(Error::Hardware)
    ));
    session.destroy().unwrap();
}

/// Frame-accounted correlation: output completions carry input timestamps
/// in exact submission order.
#[test]
fn output_completions_carry_timestamps_in_order() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    let in_a = TestPayload::new(1024);
    let in_b = TestPayload::new(1024);
    let out_a = TestPayload::new(8192);
    let out_b = TestPayload::new(8192);

    session
        .queue_buffer(BufferPort::Input, frame(&in_a, 100, 1111, 1), None)
        .unwrap();
    session
        .queue_buffer(BufferPort::Input, frame(&in_b, 200, 2222, 2), None)
        .unwrap();

    session
        .queue_buffer(BufferPort::Output, frame(&out_a, 0, 0, 11), None)
        .unwrap();
    let out_a_identity = last_submission_identity(&fake);
    session
        .queue_buffer(BufferPort::Output, frame(&out_b, 0, 0, 12), None)
        .unwrap();
    let out_b_identity = last_submission_identity(&fake);

    fake.push_reply(NodeMsg {
        cmd: node_msg::NODE_BUFF_FREE | 1, // stream 1: output
        arg1: out_a_identity,
        arg2: 4096,
    });
    let first = recv_processed(&rx);
    assert_eq!(first.direction, Direction::Output);
    assert_eq!(first.filled, 4096);
    assert_eq!(first.timestamp, 1111);

    fake.push_reply(NodeMsg {
        cmd: node_msg::NODE_BUFF_FREE | 1,
        arg1: out_b_identity,
        arg2: 4096,
    });
    let second = recv_processed(&rx);
    assert_eq!(second.timestamp, 2222);

    session.destroy().unwrap();
}

/// EOS sentinel mode: the submit path folds the descriptor's EOS flag into
/// the communication record and completion carries it back.
#[test]
fn eos_flag_propagates_in_sentinel_mode() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    session.control(ControlCommand::PropagateEos(true)).unwrap();

    let payload = TestPayload::new(1024);
    let mut buffer = frame(&payload, 64, 0, 5);
    buffer.flags |= BufferFlags::EOS;
    session.queue_buffer(BufferPort::Input, buffer, None).unwrap();
    let identity = last_submission_identity(&fake);

    fake.push_reply(NodeMsg {
        cmd: node_msg::NODE_BUFF_FREE,
        arg1: identity,
        arg2: 64,
    });
    let completed = recv_processed(&rx);
    assert!(completed.flags.contains(BufferFlags::EOS));

    session.destroy().unwrap();
}

/// Lifecycle gating: control commands outside their legal states fail
/// without touching the node, and out-of-range streams are rejected.
#[test]
fn lifecycle_and_parameter_gating() {
    setup_logging();
    let fake = FakeBridge::new();
    let (tx, _rx) = mpsc::channel();
    let session = CodecSession::new(
        fake.clone(),
        &test_config(Accounting::Frames),
        Box::new(move |event| {
            let _ = tx.send(event);
        }),
    )
    .unwrap();

    // Pause before start is illegal.
    assert!(matches!(
        session.control(ControlCommand::Pause),
        Err(Error::InvalidState(_))
    ));

    // Streams beyond the tracked range are rejected up front.
    let payload = TestPayload::new(256);
    assert!(matches!(
        session.queue_buffer(BufferPort::Stream(200), frame(&payload, 16, 0, 1), None),
        Err(Error::BadParameter)
    ));

    session.destroy().unwrap();
}

/// A failed map releases its reservation: a failed submission leaves no
/// DSP address space behind.
#[test]
fn map_failure_rolls_back_reservation() {
    let (fake, session, _rx) = started_session(Accounting::Frames);
    fake.set_fail_map(true);

    let payload = TestPayload::new(1024);
    let result = session.queue_buffer(BufferPort::Input, frame(&payload, 64, 0, 3), None);
    assert!(matches!(result, Err(Error::InsufficientResources)));
    assert_eq!(fake.live_regions(), (0, 0));

    fake.set_fail_map(false);
    session.destroy().unwrap();
}

/// A rejected queue-buffer message unwinds the slot and mappings and hands
/// the buffer back.
#[test]
fn failed_submission_unwinds() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    fake.set_fail_put(true);

    let payload = TestPayload::new(1024);
    let result = session.queue_buffer(BufferPort::Input, frame(&payload, 64, 0, 9), None);
    assert!(result.is_err());
    match rx.recv_timeout(EVENT_TIMEOUT).expect("no rollback event") {
        CodecEvent::BufferNotProcessed(buffer) => {
            assert_eq!(buffer.user_arg, 9);
            assert!(buffer.flags.contains(BufferFlags::DATA_CORRUPT));
        }
        other => panic!("expected BufferNotProcessed, got {other:?}"),
    }
    assert_eq!(fake.live_regions(), (0, 0));

    fake.set_fail_put(false);
    session.destroy().unwrap();
}

/// Algorithm-control round trip: the parameter block is mapped, the node
/// acknowledges, and the mapping is released.
#[test]
fn alg_control_maps_and_releases() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    let block = TestPayload::new(256);

    session
        .control(ControlCommand::AlgControl {
            command: 0x20,
            block: block.ptr(),
            len: block.data.len(),
        })
        .unwrap();

    match rx.recv_timeout(EVENT_TIMEOUT).expect("no alg ack event") {
        CodecEvent::AlgCtrlAck { status } => assert_eq!(status, node_msg::NODE_ERR_NONE),
        other => panic!("expected AlgCtrlAck, got {other:?}"),
    }
    assert_eq!(fake.live_regions(), (0, 0));

    session.destroy().unwrap();
}

/// Unrecognized command classes are forwarded verbatim.
#[test]
fn unknown_opcode_forwards_verbatim() {
    let (fake, session, rx) = started_session(Accounting::Frames);
    fake.push_reply(NodeMsg {
        cmd: 0x0800, // not a known class
        arg1: 0xaa,
        arg2: 0xbb,
    });
    match rx.recv_timeout(EVENT_TIMEOUT).expect("no passthrough event") {
        CodecEvent::DspMessageReceived { opcode, arg1, arg2 } => {
            assert_eq!(opcode, 0x0800);
            assert_eq!(arg1, 0xaa);
            assert_eq!(arg2, 0xbb);
        }
        other => panic!("expected DspMessageReceived, got {other:?}"),
    }
    session.destroy().unwrap();
}
