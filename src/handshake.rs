use crate::control_channel::ControlChannel;
use crate::device::RdmaDevice;
use crate::id;
use crate::message::ControlMsgType;
use crate::queue_pair::{QpState, QpValue};
use tracing::{debug, error};

/// Send queue depth of a queue pair created on the acceptor's behalf
pub(crate) const HANDSHAKE_SEND_WR: u32 = 8;
/// Receive queue depth of a queue pair created on the acceptor's behalf
pub(crate) const HANDSHAKE_RECV_WR: u32 = 8;

/// Walk a queue pair through the canonical `INIT -> RTR -> RTS` sequence
fn walk_to_rts(device: &RdmaDevice, qp_num: u32) -> bool {
    [QpState::Init, QpState::Rtr, QpState::Rts]
        .into_iter()
        .all(|state| device.modify_qp_state(qp_num, state))
}

/// Snapshot the local queue pair for advertisement, substituting a random
/// 24-bit starting psn when none was assigned
fn advertised_info(device: &RdmaDevice, qp_num: u32) -> Option<QpValue> {
    let mut info = device.get_qp_info(qp_num)?;
    if info.psn() == 0 {
        let _info = info.set_psn(id::random_psn());
    }
    Some(info)
}

/// Drive the initiator's half of the connection handshake over an already
/// `Connected` channel.
///
/// Sends `CONNECT_REQUEST` with the local queue pair identity, waits up to
/// `timeout_ms` for an accepting `CONNECT_RESPONSE`, applies the peer
/// identity with `connect_qp`, walks the queue pair to `RTS`, then
/// exchanges `READY` with the acceptor. On any failure an `ERROR` message
/// is sent where possible and false is returned.
pub fn initiate(
    channel: &ControlChannel,
    device: &RdmaDevice,
    qp_num: u32,
    timeout_ms: u32,
) -> bool {
    let Some(local) = advertised_info(device, qp_num) else {
        error!("initiate: queue pair {qp_num} does not exist");
        return false;
    };
    if !channel.send_connect_request(&local) {
        error!("initiate: failed to send connect request");
        return false;
    }
    let Some(response) = channel.receive_message(timeout_ms) else {
        error!("initiate: no connect response within {timeout_ms} ms");
        return false;
    };
    if response.msg_type != ControlMsgType::ConnectResponse {
        let _sent = channel.send_error("expected CONNECT_RESPONSE");
        return false;
    }
    if !response.accept {
        debug!("initiate: peer rejected the connection");
        return false;
    }
    if !device.connect_qp(qp_num, &response.qp_info) {
        let _sent = channel.send_error("failed to apply remote queue pair info");
        return false;
    }
    if !walk_to_rts(device, qp_num) {
        let _sent = channel.send_error("failed to reach RTS");
        return false;
    }
    if !channel.send_ready() {
        return false;
    }
    match channel.receive_message(timeout_ms) {
        Some(msg) if msg.msg_type == ControlMsgType::Ready => {
            debug!("initiate: connection established on qp {qp_num}");
            true
        }
        Some(msg) => {
            error!("initiate: expected READY, got {:?}", msg.msg_type);
            false
        }
        None => {
            error!("initiate: no READY within {timeout_ms} ms");
            false
        }
    }
}

/// Drive the acceptor's half of the connection handshake over an already
/// `Connected` channel.
///
/// Waits up to `timeout_ms` for a `CONNECT_REQUEST`, creates a queue pair
/// bound to `send_cq`/`recv_cq`, applies the initiator's identity, replies
/// with an accepting `CONNECT_RESPONSE`, walks the queue pair to `RTS`, and
/// completes the `READY` exchange. Returns the created queue pair number,
/// or `None` on failure.
pub fn respond(
    channel: &ControlChannel,
    device: &RdmaDevice,
    send_cq: u32,
    recv_cq: u32,
    timeout_ms: u32,
) -> Option<u32> {
    let Some(request) = channel.receive_message(timeout_ms) else {
        error!("respond: no connect request within {timeout_ms} ms");
        return None;
    };
    if request.msg_type != ControlMsgType::ConnectRequest {
        let _sent = channel.send_error("expected CONNECT_REQUEST");
        return None;
    }
    let qp_num = device.create_qp(HANDSHAKE_SEND_WR, HANDSHAKE_RECV_WR, send_cq, recv_cq);
    if qp_num == 0 {
        let _sent = channel.send_error("failed to create queue pair");
        return None;
    }
    if !device.connect_qp(qp_num, &request.qp_info) {
        let _sent = channel.send_error("failed to apply remote queue pair info");
        return None;
    }
    let Some(local) = advertised_info(device, qp_num) else {
        let _sent = channel.send_error("queue pair vanished during handshake");
        return None;
    };
    if !channel.send_connect_response(&local, true) {
        error!("respond: failed to send connect response");
        return None;
    }
    if !walk_to_rts(device, qp_num) {
        let _sent = channel.send_error("failed to reach RTS");
        return None;
    }
    match channel.receive_message(timeout_ms) {
        Some(msg) if msg.msg_type == ControlMsgType::Ready => {}
        Some(msg) => {
            error!("respond: expected READY, got {:?}", msg.msg_type);
            return None;
        }
        None => {
            error!("respond: no READY within {timeout_ms} ms");
            return None;
        }
    }
    if !channel.send_ready() {
        return None;
    }
    debug!("respond: connection established on qp {qp_num}");
    Some(qp_num)
}
