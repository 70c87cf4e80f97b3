
use sim_rdma::{
    DeviceConfig, RdmaDevice, RdmaOpcode, WorkRequestBuilder, COMPLETION_STATUS_SUCCESS,
};
use std::sync::Arc;
use std::time::Duration;
use test_utilities::*;

/// Loopback SEND with a posted receive: one send-side and one receive-side
/// completion, data lands in the posted buffer
#[test]
fn loopback_send_with_posted_recv() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    let q = device.create_qp(8, 8, cq, cq);
    walk_to_rts(&device, q);
    connect_loopback(&device, q);

    let mut recv_buf = [0_u8; 64];
    assert!(device.post_recv(q, &recv_wr(&mut recv_buf)));

    let mut payload = *b"RDMA Reply!\0";
    let wr = WorkRequestBuilder::default()
        .opcode(RdmaOpcode::Send)
        .local_addr(payload.as_mut_ptr())
        .length(12)
        .signaled(true)
        .wr_id(7)
        .build()
        .unwrap();
    assert!(device.post_send(q, &wr));

    let send_done = poll_one(&device, cq, Duration::from_secs(1)).unwrap();
    assert_eq!(send_done.wr_id(), 7);
    assert_eq!(send_done.status(), COMPLETION_STATUS_SUCCESS);
    assert_eq!(send_done.length(), 12);

    let recv_done = poll_one(&device, cq, Duration::from_secs(1)).unwrap();
    assert_eq!(recv_done.opcode(), RdmaOpcode::Recv);
    assert_eq!(recv_done.length(), 12);

    assert_eq!(&recv_buf[..12], b"RDMA Reply!\0");
    // the posted receive was consumed
    let info = device.get_qp_info(q).unwrap();
    assert!(info.recv_addr().is_null());
    assert_eq!(info.recv_length(), 0);
}

/// Send before the receive is posted: the payload is staged and the later
/// `post_recv` drains it immediately
#[test]
fn send_before_recv_stages_pending_data() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    let q = device.create_qp(8, 8, cq, cq);
    walk_to_rts(&device, q);
    connect_loopback(&device, q);

    let mut payload = *b"early bird";
    let wr = WorkRequestBuilder::default()
        .local_addr(payload.as_mut_ptr())
        .length(10)
        .signaled(false)
        .build()
        .unwrap();
    assert!(device.post_send(q, &wr));

    // no receive was posted, so the payload sits in the pending stage
    let info = device.get_qp_info(q).unwrap();
    assert_eq!(info.pending_data().as_slice(), b"early bird");

    let mut recv_buf = [0_u8; 64];
    let mut recv = recv_wr(&mut recv_buf);
    let _wr = recv.set_wr_id(21);
    assert!(device.post_recv(q, &recv));

    let recv_done = poll_one(&device, cq, Duration::from_secs(1)).unwrap();
    assert_eq!(recv_done.opcode(), RdmaOpcode::Recv);
    assert_eq!(recv_done.wr_id(), 21);
    assert_eq!(recv_done.length(), 10);
    assert_eq!(&recv_buf[..10], b"early bird");

    // the stage and the buffer registration are both cleared
    let info = device.get_qp_info(q).unwrap();
    assert!(info.pending_data().is_empty());
    assert!(info.recv_addr().is_null());
}

/// A short receive buffer truncates the staged payload to `recv_length`
#[test]
fn staged_drain_truncates_to_recv_length() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    let q = device.create_qp(8, 8, cq, cq);
    walk_to_rts(&device, q);
    connect_loopback(&device, q);

    let mut payload = *b"0123456789abcdef";
    let wr = WorkRequestBuilder::default()
        .local_addr(payload.as_mut_ptr())
        .length(16)
        .signaled(false)
        .build()
        .unwrap();
    assert!(device.post_send(q, &wr));

    let mut recv_buf = [0_u8; 4];
    assert!(device.post_recv(q, &recv_wr(&mut recv_buf)));
    let recv_done = poll_one(&device, cq, Duration::from_secs(1)).unwrap();
    assert_eq!(recv_done.length(), 4);
    assert_eq!(&recv_buf, b"0123");
}

/// A second send into an unserviced queue pair overwrites the pending stage
#[test]
fn later_send_overwrites_pending_data() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    let q = device.create_qp(8, 8, cq, cq);
    walk_to_rts(&device, q);
    connect_loopback(&device, q);

    for text in [&b"first"[..], &b"second"[..]] {
        let mut payload = text.to_vec();
        let wr = WorkRequestBuilder::default()
            .local_addr(payload.as_mut_ptr())
            .length(u32::try_from(payload.len()).unwrap())
            .signaled(false)
            .build()
            .unwrap();
        assert!(device.post_send(q, &wr));
    }
    let info = device.get_qp_info(q).unwrap();
    assert_eq!(info.pending_data().as_slice(), b"second");
}

/// Unsignaled sends deliver data but produce no send-side completion
#[test]
fn unsignaled_send_produces_no_send_completion() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    let q = device.create_qp(8, 8, cq, cq);
    walk_to_rts(&device, q);
    connect_loopback(&device, q);

    let mut recv_buf = [0_u8; 8];
    assert!(device.post_recv(q, &recv_wr(&mut recv_buf)));

    let mut payload = *b"ping";
    let wr = WorkRequestBuilder::default()
        .local_addr(payload.as_mut_ptr())
        .length(4)
        .signaled(false)
        .build()
        .unwrap();
    assert!(device.post_send(q, &wr));

    // the only completion is the receive-side one
    let only = poll_one(&device, cq, Duration::from_secs(1)).unwrap();
    assert_eq!(only.opcode(), RdmaOpcode::Recv);
    assert!(poll_one(&device, cq, Duration::from_millis(50)).is_none());
    assert_eq!(&recv_buf[..4], b"ping");
}

/// Send-side completions of one queue pair come back in posting order
#[test]
fn send_completions_are_fifo() {
    let (device, _env) = isolated_device(DeviceConfig::new());
    let cq = device.create_cq(16);
    let q = device.create_qp(8, 8, cq, cq);
    walk_to_rts(&device, q);

    let mut payload = *b"x";
    for wr_id in 1_u64..=5 {
        let wr = WorkRequestBuilder::default()
            .local_addr(payload.as_mut_ptr())
            .length(1)
            .wr_id(wr_id)
            .build()
            .unwrap();
        assert!(device.post_send(q, &wr));
    }
    let mut completions = Vec::new();
    assert!(device.poll_cq(cq, 16, &mut completions));
    let ids: Vec<u64> = completions.iter().map(|c| c.wr_id()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

/// Two devices sharing one environment deliver across the process-wide
/// registry
#[test]
fn cross_device_delivery() {
    let env = Arc::new(sim_rdma::SimEnv::new());
    let sender = RdmaDevice::with_env(DeviceConfig::new(), Arc::clone(&env));
    let receiver = RdmaDevice::with_env(DeviceConfig::new(), Arc::clone(&env));

    let recv_cq = receiver.create_cq(16);
    // burn one queue pair number so the two devices' handles differ
    let _spare = receiver.create_qp(8, 8, recv_cq, recv_cq);
    let rqp = receiver.create_qp(8, 8, recv_cq, recv_cq);
    walk_to_rts(&receiver, rqp);

    let send_cq = sender.create_cq(16);
    let sqp = sender.create_qp(8, 8, send_cq, send_cq);
    walk_to_rts(&sender, sqp);
    let remote = receiver.get_qp_info(rqp).unwrap();
    assert!(sender.connect_qp(sqp, &remote));

    let mut recv_buf = [0_u8; 32];
    assert!(receiver.post_recv(rqp, &recv_wr(&mut recv_buf)));

    let mut payload = *b"hello over there";
    let wr = WorkRequestBuilder::default()
        .opcode(RdmaOpcode::RdmaWrite)
        .local_addr(payload.as_mut_ptr())
        .length(16)
        .wr_id(3)
        .build()
        .unwrap();
    assert!(sender.post_send(sqp, &wr));

    let send_done = poll_one(&sender, send_cq, Duration::from_secs(1)).unwrap();
    assert_eq!(send_done.wr_id(), 3);
    assert_eq!(send_done.opcode(), RdmaOpcode::RdmaWrite);

    let recv_done = poll_one(&receiver, recv_cq, Duration::from_secs(1)).unwrap();
    assert_eq!(recv_done.opcode(), RdmaOpcode::Recv);
    assert_eq!(recv_done.length(), 16);
    assert_eq!(&recv_buf[..16], b"hello over there");
}
