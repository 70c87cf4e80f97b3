use crate::gid::Gid;
use crate::queue_pair::{QpState, QpValue};
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;

/// Upper bound on a control-channel frame payload, in bytes
pub const MAX_FRAME_LEN: usize = 4096;

/// Size of the fixed part of an encoded control message: 1 byte type, 62
/// bytes of queue pair fields, 1 byte accept flag, 4 bytes error length.
/// The error string follows.
pub const WIRE_FIXED_LEN: usize = 68;

/// Type tag of a control message.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum ControlMsgType {
    /// initiator's half of the handshake, carries its queue pair info
    ConnectRequest = 0,
    /// acceptor's reply, carries its queue pair info and the accept flag
    ConnectResponse = 1,
    /// the sender finished its state walk and is ready for verbs traffic
    Ready = 2,
    /// the sender hit a fatal condition; both sides tear down
    Error = 3,
}

/// A control-channel message: the out-of-band unit of the connection
/// handshake.
///
/// The queue pair payload is meaningful for `ConnectRequest` and
/// `ConnectResponse`, the accept flag for `ConnectResponse` only, and the
/// error text for `Error` only; the wire layout always carries all four
/// parts.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlMsg {
    /// Message type tag
    pub msg_type: ControlMsgType,
    /// Queue pair identity payload
    pub qp_info: QpValue,
    /// Whether a connect request was accepted
    pub accept: bool,
    /// Human-readable error description
    pub error_msg: String,
}

impl ControlMsg {
    /// Build a `CONNECT_REQUEST` carrying the local queue pair identity
    #[must_use]
    pub fn connect_request(qp_info: QpValue) -> Self {
        Self {
            msg_type: ControlMsgType::ConnectRequest,
            qp_info,
            accept: false,
            error_msg: String::new(),
        }
    }

    /// Build a `CONNECT_RESPONSE` carrying the acceptor's queue pair
    /// identity and verdict
    #[must_use]
    pub fn connect_response(qp_info: QpValue, accept: bool) -> Self {
        Self {
            msg_type: ControlMsgType::ConnectResponse,
            qp_info,
            accept,
            error_msg: String::new(),
        }
    }

    /// Build a `READY` notification
    #[must_use]
    pub fn ready() -> Self {
        Self {
            msg_type: ControlMsgType::Ready,
            qp_info: QpValue::default(),
            accept: false,
            error_msg: String::new(),
        }
    }

    /// Build an `ERROR` notification with a description
    #[must_use]
    pub fn error(text: &str) -> Self {
        Self {
            msg_type: ControlMsgType::Error,
            qp_info: QpValue::default(),
            accept: false,
            error_msg: text.to_owned(),
        }
    }
}

impl Default for ControlMsg {
    #[inline]
    fn default() -> Self {
        Self::connect_request(QpValue::default())
    }
}

/// Why a control-message frame failed to decode.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireError {
    /// the buffer ended before the named field
    #[error("insufficient data for {0}")]
    Truncated(&'static str),
    /// the type tag byte names no known message type
    #[error("unknown message type byte {0}")]
    UnknownMsgType(u8),
    /// the state byte names no known queue pair state
    #[error("unknown queue pair state byte {0}")]
    UnknownQpState(u8),
    /// the error string is not valid UTF-8
    #[error("error string is not valid utf-8")]
    BadErrorString,
}

/// Serialize a control message into its wire form: 1 byte type, the queue
/// pair fields in declaration order (scalars little-endian, gids raw),
/// 1 byte accept flag, then the u32 error length and its UTF-8 bytes.
#[must_use]
#[allow(clippy::as_conversions)] // enum discriminants fit in u8 by repr
pub fn encode(msg: &ControlMsg) -> Vec<u8> {
    let qp = &msg.qp_info;
    let mut buf = Vec::with_capacity(WIRE_FIXED_LEN.saturating_add(msg.error_msg.len()));
    buf.push(msg.msg_type as u8);
    buf.extend_from_slice(&qp.qp_num().to_le_bytes());
    buf.extend_from_slice(&qp.dest_qp_num().to_le_bytes());
    buf.extend_from_slice(&qp.lid().to_le_bytes());
    buf.extend_from_slice(&qp.remote_lid().to_le_bytes());
    buf.push(qp.port_num());
    buf.extend_from_slice(&qp.qp_access_flags().to_le_bytes());
    buf.extend_from_slice(&qp.psn().to_le_bytes());
    buf.extend_from_slice(&qp.remote_psn().to_le_bytes());
    buf.extend_from_slice(qp.gid().as_bytes());
    buf.extend_from_slice(qp.remote_gid().as_bytes());
    buf.extend_from_slice(&qp.mtu().to_le_bytes());
    buf.push(qp.state() as u8);
    buf.push(u8::from(msg.accept));
    let error_len: u32 = msg.error_msg.len().try_into().unwrap_or(u32::MAX);
    buf.extend_from_slice(&error_len.to_le_bytes());
    buf.extend_from_slice(msg.error_msg.as_bytes());
    buf
}

/// A cursor over an encoded frame that names the field it was reading when
/// the data ran out
struct FrameReader<'a> {
    /// remaining bytes
    data: &'a [u8],
}

impl<'a> FrameReader<'a> {
    /// Take the next `n` bytes
    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], WireError> {
        if self.data.len() < n {
            return Err(WireError::Truncated(field));
        }
        let (head, rest) = self.data.split_at(n);
        self.data = rest;
        Ok(head)
    }

    /// Read one byte
    fn read_u8(&mut self, field: &'static str) -> Result<u8, WireError> {
        Ok(self.take(1, field)?[0])
    }

    /// Read a little-endian u16
    fn read_u16(&mut self, field: &'static str) -> Result<u16, WireError> {
        let bytes = self.take(2, field)?;
        // split length is checked above
        #[allow(clippy::unwrap_used)]
        Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Read a little-endian u32
    fn read_u32(&mut self, field: &'static str) -> Result<u32, WireError> {
        let bytes = self.take(4, field)?;
        // split length is checked above
        #[allow(clippy::unwrap_used)]
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    /// Read a raw 16-byte gid
    fn read_gid(&mut self, field: &'static str) -> Result<Gid, WireError> {
        let bytes = self.take(16, field)?;
        // split length is checked above
        #[allow(clippy::unwrap_used)]
        Ok(Gid::from_bytes(bytes.try_into().unwrap()))
    }
}

/// Deserialize a control message from its wire form.
///
/// The receive-staging fields of the queue pair payload are not part of the
/// wire format and come back at their defaults.
pub fn decode(data: &[u8]) -> Result<ControlMsg, WireError> {
    let mut reader = FrameReader { data };
    let type_byte = reader.read_u8("message type")?;
    let msg_type =
        ControlMsgType::from_u8(type_byte).ok_or(WireError::UnknownMsgType(type_byte))?;

    let mut qp = QpValue::default();
    let _qp = qp.set_qp_num(reader.read_u32("qp_num")?);
    let _qp = qp.set_dest_qp_num(reader.read_u32("dest_qp_num")?);
    let _qp = qp.set_lid(reader.read_u16("lid")?);
    let _qp = qp.set_remote_lid(reader.read_u16("remote_lid")?);
    let _qp = qp.set_port_num(reader.read_u8("port_num")?);
    let _qp = qp.set_qp_access_flags(reader.read_u32("qp_access_flags")?);
    let _qp = qp.set_psn(reader.read_u32("psn")?);
    let _qp = qp.set_remote_psn(reader.read_u32("remote_psn")?);
    let _qp = qp.set_gid(reader.read_gid("gid")?);
    let _qp = qp.set_remote_gid(reader.read_gid("remote_gid")?);
    let _qp = qp.set_mtu(reader.read_u32("mtu")?);
    let state_byte = reader.read_u8("state")?;
    let state = QpState::from_u8(state_byte).ok_or(WireError::UnknownQpState(state_byte))?;
    let _qp = qp.set_state(state);

    let accept = reader.read_u8("accept flag")? != 0;
    let error_len: usize = reader.read_u32("error_msg length")?.try_into().map_err(|_e| {
        WireError::Truncated("error_msg length")
    })?;
    let error_msg = if error_len > 0 {
        let bytes = reader.take(error_len, "error_msg content")?;
        String::from_utf8(bytes.to_vec()).map_err(|_e| WireError::BadErrorString)?
    } else {
        String::new()
    };

    Ok(ControlMsg {
        msg_type,
        qp_info: qp,
        accept,
        error_msg,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_qp() -> QpValue {
        let mut qp = QpValue::default();
        let _qp = qp.set_qp_num(2000);
        let _qp = qp.set_dest_qp_num(1000);
        let _qp = qp.set_lid(1);
        let _qp = qp.set_remote_lid(2);
        let _qp = qp.set_port_num(1);
        let _qp = qp.set_qp_access_flags(0x7);
        let _qp = qp.set_psn(100);
        let _qp = qp.set_remote_psn(2000);
        let _qp = qp.set_gid(Gid::from_bytes([0xfe; 16]));
        let _qp = qp.set_remote_gid(Gid::from_bytes([0x80; 16]));
        let _qp = qp.set_mtu(1024);
        let _qp = qp.set_state(QpState::Init);
        qp
    }

    fn assert_wire_fields_eq(a: &QpValue, b: &QpValue) {
        assert_eq!(a.qp_num(), b.qp_num());
        assert_eq!(a.dest_qp_num(), b.dest_qp_num());
        assert_eq!(a.lid(), b.lid());
        assert_eq!(a.remote_lid(), b.remote_lid());
        assert_eq!(a.port_num(), b.port_num());
        assert_eq!(a.qp_access_flags(), b.qp_access_flags());
        assert_eq!(a.psn(), b.psn());
        assert_eq!(a.remote_psn(), b.remote_psn());
        assert_eq!(a.gid(), b.gid());
        assert_eq!(a.remote_gid(), b.remote_gid());
        assert_eq!(a.mtu(), b.mtu());
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn fixed_prefix_length() {
        let msg = ControlMsg::ready();
        assert_eq!(encode(&msg).len(), WIRE_FIXED_LEN);
    }

    #[test]
    fn round_trip_connect_request() {
        let msg = ControlMsg::connect_request(sample_qp());
        let decoded = decode(&encode(&msg)).unwrap();
        assert_eq!(decoded.msg_type, ControlMsgType::ConnectRequest);
        assert_wire_fields_eq(&decoded.qp_info, &msg.qp_info);
        assert!(!decoded.accept);
        assert!(decoded.error_msg.is_empty());
    }

    #[test]
    fn round_trip_connect_response() {
        let msg = ControlMsg::connect_response(sample_qp(), true);
        let decoded = decode(&encode(&msg)).unwrap();
        assert_eq!(decoded.msg_type, ControlMsgType::ConnectResponse);
        assert!(decoded.accept);
    }

    #[test]
    fn round_trip_error_with_long_text() {
        let text = "x".repeat(4000);
        let msg = ControlMsg::error(&text);
        let decoded = decode(&encode(&msg)).unwrap();
        assert_eq!(decoded.msg_type, ControlMsgType::Error);
        assert_eq!(decoded.error_msg, text);
    }

    #[test]
    fn unknown_type_byte_is_rejected() {
        let mut bytes = encode(&ControlMsg::ready());
        bytes[0] = 9;
        assert_eq!(decode(&bytes), Err(WireError::UnknownMsgType(9)));
    }

    #[test]
    fn unknown_state_byte_is_rejected() {
        let mut bytes = encode(&ControlMsg::ready());
        // state is the last byte of the queue pair block
        bytes[62] = 0xff;
        assert_eq!(decode(&bytes), Err(WireError::UnknownQpState(0xff)));
    }

    #[test]
    fn truncated_frames_name_the_missing_field() {
        let bytes = encode(&ControlMsg::connect_request(sample_qp()));
        assert_eq!(decode(&[]), Err(WireError::Truncated("message type")));
        assert_eq!(decode(&bytes[..3]), Err(WireError::Truncated("qp_num")));
        assert_eq!(
            decode(&bytes[..WIRE_FIXED_LEN.checked_sub(1).unwrap()]),
            Err(WireError::Truncated("error_msg length"))
        );
        let msg = ControlMsg::error("boom");
        let full = encode(&msg);
        assert_eq!(
            decode(&full[..full.len().checked_sub(1).unwrap()]),
            Err(WireError::Truncated("error_msg content"))
        );
    }

    #[test]
    fn declared_error_length_beyond_frame_is_truncation() {
        let mut bytes = encode(&ControlMsg::ready());
        // claim a 16-byte error string that is not there
        bytes[64] = 16;
        assert_eq!(
            decode(&bytes),
            Err(WireError::Truncated("error_msg content"))
        );
    }
}
