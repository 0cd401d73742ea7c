//! Whole-engine flows: control plane, admission, routing, arbitration.

use roce_engine::config::{Flavor, TransportConfig};
use roce_engine::message::{
    BufDescriptor, ControlRequest, DmaReadResp, DmaRequest, DmaWriteReq, DmaWriteResp,
    WorkRequest, WrOpcode,
};
use roce_engine::packet::{Opcode, Packet, PacketHeader};
use roce_engine::qp::{AttrNotification, QpAttributes, QpState, ServiceType};
use roce_engine::{Status, TransportEngine};

fn config(n: usize) -> TransportConfig {
    let mut config = TransportConfig::with_connections(n);
    config.channel_flavor = Flavor::Sequential;
    config
}

fn rc_attrs(qpn: u32) -> QpAttributes {
    QpAttributes {
        qpn,
        service: ServiceType::ReliableConnection,
    }
}

fn rc_send(dqpn: u32, psn: u32, tag: u8) -> Packet {
    Packet::new(
        PacketHeader {
            opcode: Opcode::RC_SEND_ONLY,
            dqpn,
            psn,
        },
        vec![tag],
    )
}

fn write_frag(qpn: u32, last: bool) -> DmaRequest {
    DmaRequest::Write(DmaWriteReq {
        qpn,
        addr: 0x1000,
        data: vec![0xab],
        last,
    })
}

#[test]
fn create_delivers_pulses_one_step_later_to_matching_slot() {
    let (mut engine, mut handles, mut qps, _dma) = TransportEngine::new(&config(4));
    for qpn in [0x10, 0x20, 0x30] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();
    // Stage 1 resolved this step; no pulse is visible yet.
    for qp in qps.iter() {
        assert!(qp.attr_in.is_empty());
    }

    engine.step().unwrap();
    for qp in qps.iter_mut().take(3) {
        assert_eq!(
            qp.attr_in.try_recv(),
            Ok(AttrNotification {
                recv_psn_reset: true,
                send_psn_reset: true,
            })
        );
        // One-shot: nothing retained past its step.
        assert!(qp.attr_in.is_empty());
    }
    assert!(qps[3].attr_in.is_empty());
}

#[test]
fn modify_pulses_exactly_one_slot_and_one_flag() {
    let (mut engine, mut handles, mut qps, _dma) = TransportEngine::new(&config(4));
    for qpn in [0x10, 0x20] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();
    engine.step().unwrap();
    qps[0].attr_in.try_recv().unwrap();
    qps[1].attr_in.try_recv().unwrap();

    handles.control.send(ControlRequest::ResetRecvPsn(0x20)).unwrap();
    engine.step().unwrap();
    engine.step().unwrap();
    assert_eq!(
        qps[1].attr_in.try_recv(),
        Ok(AttrNotification {
            recv_psn_reset: true,
            send_psn_reset: false,
        })
    );
    assert!(qps[1].attr_in.is_empty());
    assert!(qps[0].attr_in.is_empty());
}

#[test]
fn ingress_is_validated_then_routed_to_owner_only() {
    let (mut engine, mut handles, mut qps, _dma) = TransportEngine::new(&config(4));
    for qpn in [0x10, 0x20, 0x30] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();
    // Only qp 0x30 moves past Init.
    qps[2].state_out.send(QpState::ReadyToSend).unwrap();
    engine.step().unwrap();

    handles.ingress.send(rc_send(0x30, 1, 0)).unwrap();
    handles.ingress.send(rc_send(0x10, 2, 1)).unwrap(); // state disallows (Init)
    handles.ingress.send(rc_send(0x99, 3, 2)).unwrap(); // unknown destination
    engine.step().unwrap();

    assert_eq!(qps[2].pkt_in.try_recv(), Ok(rc_send(0x30, 1, 0)));
    assert!(qps[2].pkt_in.is_empty());
    assert!(qps[0].pkt_in.is_empty());
    assert!(qps[1].pkt_in.is_empty());
    assert!(qps[3].pkt_in.is_empty());
}

#[test]
fn work_requests_route_by_qpn() {
    let (mut engine, mut handles, mut qps, _dma) = TransportEngine::new(&config(2));
    for qpn in [0x10, 0x20] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();

    let wr = WorkRequest {
        qpn: 0x20,
        opcode: WrOpcode::RdmaWrite,
        descriptor: BufDescriptor {
            addr: 0xdead_beef,
            len: 128,
        },
    };
    handles.work.send(wr).unwrap();
    engine.step().unwrap();
    assert_eq!(qps[1].wr_in.try_recv(), Ok(wr));
    assert!(qps[0].wr_in.is_empty());
}

#[test]
fn work_request_to_unknown_qpn_is_a_precondition_violation() {
    let (mut engine, mut handles, _qps, _dma) = TransportEngine::new(&config(2));
    handles.control.send(ControlRequest::Create(rc_attrs(0x10))).unwrap();
    engine.step().unwrap();

    handles
        .work
        .send(WorkRequest {
            qpn: 0x99,
            opcode: WrOpcode::Send,
            descriptor: BufDescriptor { addr: 0, len: 0 },
        })
        .unwrap();
    assert!(engine.step().is_err());
}

#[test]
fn dma_responses_route_back_to_owner() {
    let (mut engine, mut handles, mut qps, mut dma) = TransportEngine::new(&config(2));
    for qpn in [0x10, 0x20] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();

    let read = DmaReadResp {
        qpn: 0x20,
        addr: 0x2000,
        data: vec![1, 2, 3],
    };
    let write = DmaWriteResp {
        qpn: 0x10,
        addr: 0x3000,
    };
    dma.read_resp_out.send(read.clone()).unwrap();
    dma.write_resp_out.send(write).unwrap();
    engine.step().unwrap();

    assert_eq!(qps[1].read_resp_in.try_recv(), Ok(read));
    assert_eq!(qps[0].write_resp_in.try_recv(), Ok(write));
    assert!(qps[0].read_resp_in.is_empty());
    assert!(qps[1].write_resp_in.is_empty());
}

#[test]
fn egress_merge_is_round_robin_and_order_preserving() {
    let (mut engine, mut handles, mut qps, _dma) = TransportEngine::new(&config(3));
    for qpn in [0x10, 0x20, 0x30] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();

    for (i, qp) in qps.iter_mut().enumerate() {
        for seq in 0..3u32 {
            qp.pkt_out.send(rc_send(0x40, seq, i as u8)).unwrap();
        }
    }
    engine.step().unwrap();

    let mut order = Vec::new();
    while let Ok(pkt) = handles.egress.try_recv() {
        order.push((pkt.payload[0], pkt.header.psn));
    }
    assert_eq!(order.len(), 9);
    // No source served twice before every other ready source once.
    for round in order.chunks(3) {
        let mut sources: Vec<u8> = round.iter().map(|&(src, _)| src).collect();
        sources.sort_unstable();
        assert_eq!(sources, vec![0, 1, 2]);
    }
    // Each connection's own stream exits in presentation order.
    for src in 0..3u8 {
        let seqs: Vec<u32> = order
            .iter()
            .filter(|&&(s, _)| s == src)
            .map(|&(_, seq)| seq)
            .collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }
}

#[test]
fn dma_write_fragments_never_interleave() {
    let (mut engine, mut handles, mut qps, mut dma) = TransportEngine::new(&config(2));
    for qpn in [0x10, 0x20] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();

    // Slot 0 owns a three-part write; slot 1 is ready the whole time.
    qps[0].dma_out.send(write_frag(0x10, false)).unwrap();
    qps[0].dma_out.send(write_frag(0x10, false)).unwrap();
    qps[0].dma_out.send(write_frag(0x10, true)).unwrap();
    qps[1]
        .dma_out
        .send(DmaRequest::Read(roce_engine::message::DmaReadReq {
            qpn: 0x20,
            addr: 0x4000,
            len: 64,
        }))
        .unwrap();
    engine.step().unwrap();

    let mut qpns = Vec::new();
    while let Ok(req) = dma.req_in.try_recv() {
        qpns.push(req.qpn());
    }
    assert_eq!(qpns, vec![0x10, 0x10, 0x10, 0x20]);
}

#[test]
fn state_changes_bind_to_the_sending_slot() {
    let (mut engine, mut handles, mut qps, _dma) = TransportEngine::new(&config(2));
    for qpn in [0x10, 0x20] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();

    // Unit 1 reports its own transition; unit 0 stays in Init.
    qps[1].state_out.send(QpState::ReadyToSend).unwrap();
    engine.step().unwrap();

    handles.ingress.send(rc_send(0x20, 1, 0)).unwrap();
    handles.ingress.send(rc_send(0x10, 2, 1)).unwrap();
    engine.step().unwrap();
    assert_eq!(qps[1].pkt_in.try_recv(), Ok(rc_send(0x20, 1, 0)));
    assert!(qps[0].pkt_in.is_empty());
}

#[test]
fn egress_queued_by_a_departed_unit_still_drains() {
    let (mut engine, mut handles, mut qps, _dma) = TransportEngine::new(&config(2));
    for qpn in [0x10, 0x20] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();
    engine.step().unwrap();
    qps[0].attr_in.try_recv().unwrap();
    qps[1].attr_in.try_recv().unwrap();

    // Unit 0 enqueues a packet and then goes away entirely.
    qps[0].pkt_out.send(rc_send(0x40, 0, 0)).unwrap();
    drop(qps.remove(0));

    assert!(engine.step().is_ok());
    assert_eq!(handles.egress.try_recv(), Ok(rc_send(0x40, 0, 0)));
    // Further steps make no work out of the dead endpoint.
    assert!(engine.step().is_ok());
    assert!(handles.egress.is_empty());
}

#[test]
fn full_signal_and_destroy() {
    let (mut engine, mut handles, _qps, _dma) = TransportEngine::new(&config(2));
    for qpn in [0x10, 0x20] {
        handles.control.send(ControlRequest::Create(rc_attrs(qpn))).unwrap();
    }
    engine.step().unwrap();
    assert!(engine.is_full());

    // A create issued against a full table is rejected and swallowed.
    handles.control.send(ControlRequest::Create(rc_attrs(0x30))).unwrap();
    engine.step().unwrap();
    assert!(engine.table().lookup(0x30).is_none());
    assert!(engine.is_full());

    handles.control.send(ControlRequest::Destroy(0x10)).unwrap();
    engine.step().unwrap();
    assert!(!engine.is_full());
    assert!(engine.table().lookup(0x10).is_none());
}

#[test]
fn control_disconnect_completes_the_engine() {
    let (mut engine, handles, _qps, _dma) = TransportEngine::new(&config(2));
    let roce_engine::EngineHandles {
        control,
        work: _work,
        ingress: _ingress,
        egress: _egress,
    } = handles;
    drop(control);
    assert_eq!(engine.step().unwrap(), Status::Disconnected);
}
