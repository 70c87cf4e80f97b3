use crate::gid::Gid;
use getset::{CopyGetters, Getters, Setters};
use num_derive::FromPrimitive;
use std::ptr;
use std::time::Instant;

/// Default path MTU of a freshly created queue pair, in bytes
pub(crate) const DEFAULT_MTU: u32 = 1024;
/// Default physical port of a freshly created queue pair
pub(crate) const DEFAULT_PORT_NUM: u8 = 1;

/// Lifecycle state of a queue pair.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum QpState {
    /// freshly created, not yet initialized
    Reset = 0,
    /// initialized, port and access rights assigned
    Init = 1,
    /// ready to receive
    Rtr = 2,
    /// ready to send
    Rts = 3,
    /// send queue drain
    Sqd = 4,
    /// send queue error
    Sqe = 5,
    /// error
    Err = 6,
}

impl QpState {
    /// Whether the canonical reliable-connection graph permits moving from
    /// `self` to `next`.
    ///
    /// The happy path is `RESET -> INIT -> RTR -> RTS`; a queue pair may
    /// drain (`RTS -> SQD -> RTS`), recover a send-queue error
    /// (`SQE -> RTS`), and from any state enter `ERR` or fall back to
    /// `RESET`.
    #[must_use]
    pub fn valid_transition(self, next: Self) -> bool {
        if matches!(next, Self::Err | Self::Reset) {
            return true;
        }
        matches!(
            (self, next),
            (Self::Reset, Self::Init)
                | (Self::Init, Self::Rtr)
                | (Self::Rtr, Self::Rts)
                | (Self::Rts, Self::Sqd)
                | (Self::Sqd, Self::Rts)
                | (Self::Sqe, Self::Rts)
        )
    }
}

/// How `modify_qp_state` validates a requested transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransitionPolicy {
    /// enforce the canonical reliable-connection transition graph
    Canonical,
    /// accept every transition; compatibility mode for callers that expect
    /// unvalidated state walks
    Permissive,
}

impl Default for TransitionPolicy {
    #[inline]
    fn default() -> Self {
        Self::Canonical
    }
}

/// The backing record of a simulated queue pair.
///
/// Identity and addressing fields travel over the control channel during
/// connection setup; the receive-staging fields (`recv_addr`,
/// `recv_length`, `pending_data`) only ever live in the owning device's
/// residency store.
#[derive(Clone, Debug, PartialEq, Getters, CopyGetters, Setters)]
pub struct QpValue {
    /// Local queue pair number
    #[getset(get_copy = "pub", set = "pub")]
    qp_num: u32,
    /// Remote queue pair number, 0 until connected
    #[getset(get_copy = "pub", set = "pub")]
    dest_qp_num: u32,
    /// Local port LID
    #[getset(get_copy = "pub", set = "pub")]
    lid: u16,
    /// Remote port LID
    #[getset(get_copy = "pub", set = "pub")]
    remote_lid: u16,
    /// Physical port this queue pair sends through
    #[getset(get_copy = "pub", set = "pub")]
    port_num: u8,
    /// Raw access permission bits
    #[getset(get_copy = "pub", set = "pub")]
    qp_access_flags: u32,
    /// Local starting packet sequence number
    #[getset(get_copy = "pub", set = "pub")]
    psn: u32,
    /// Remote starting packet sequence number
    #[getset(get_copy = "pub", set = "pub")]
    remote_psn: u32,
    /// Local gid (RoCE addressing)
    #[getset(get_copy = "pub", set = "pub")]
    gid: Gid,
    /// Remote gid
    #[getset(get_copy = "pub", set = "pub")]
    remote_gid: Gid,
    /// Path MTU in bytes
    #[getset(get_copy = "pub", set = "pub")]
    mtu: u32,
    /// Current lifecycle state
    #[getset(get_copy = "pub", set = "pub")]
    state: QpState,
    /// Completion queue bound to the send queue
    #[getset(get_copy = "pub")]
    send_cq: u32,
    /// Completion queue bound to the receive queue
    #[getset(get_copy = "pub")]
    recv_cq: u32,
    /// When this record was created
    #[getset(get_copy = "pub")]
    created_time: Instant,
    /// Posted receive buffer, null when none is outstanding
    #[getset(get_copy = "pub")]
    recv_addr: *mut u8,
    /// Capacity of the posted receive buffer
    #[getset(get_copy = "pub")]
    recv_length: u32,
    /// Inbound payload delivered before any receive buffer was posted.
    /// Holds at most one payload; a later inbound send overwrites it.
    #[getset(get = "pub")]
    pending_data: Vec<u8>,
}

// SAFETY: `recv_addr` references caller-owned registered memory; the caller
// guarantees the buffer outlives the posted receive, as with real verbs.
unsafe impl Send for QpValue {}
// SAFETY: same contract as `Send`; all mutation happens under the owning
// residency store's lock.
unsafe impl Sync for QpValue {}

impl QpValue {
    /// Create a fresh queue pair record in `RESET`, bound to its two
    /// completion queues
    pub(crate) fn new(qp_num: u32, send_cq: u32, recv_cq: u32) -> Self {
        Self {
            qp_num,
            dest_qp_num: 0,
            lid: 0,
            remote_lid: 0,
            port_num: DEFAULT_PORT_NUM,
            qp_access_flags: 0,
            psn: 0,
            remote_psn: 0,
            gid: Gid::default(),
            remote_gid: Gid::default(),
            mtu: DEFAULT_MTU,
            state: QpState::Reset,
            send_cq,
            recv_cq,
            created_time: Instant::now(),
            recv_addr: ptr::null_mut(),
            recv_length: 0,
            pending_data: Vec::new(),
        }
    }

    /// Copy the peer's identity into this record's remote-side fields
    pub(crate) fn apply_remote(&mut self, remote: &Self) {
        self.dest_qp_num = remote.qp_num;
        self.remote_lid = remote.lid;
        self.remote_psn = remote.psn;
        self.remote_gid = remote.gid;
    }

    /// Whether a receive buffer is currently posted
    pub(crate) fn has_posted_recv(&self) -> bool {
        !self.recv_addr.is_null()
    }

    /// Record a posted receive buffer
    pub(crate) fn stage_recv(&mut self, addr: *mut u8, length: u32) {
        self.recv_addr = addr;
        self.recv_length = length;
    }

    /// Clear the posted receive buffer after it was consumed
    pub(crate) fn clear_recv(&mut self) {
        self.recv_addr = ptr::null_mut();
        self.recv_length = 0;
    }

    /// Overwrite the staged inbound payload
    pub(crate) fn stage_pending(&mut self, payload: &[u8]) {
        self.pending_data.clear();
        self.pending_data.extend_from_slice(payload);
    }

    /// Take the staged inbound payload, leaving the stage empty
    pub(crate) fn take_pending(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending_data)
    }
}

impl Default for QpValue {
    #[inline]
    fn default() -> Self {
        Self::new(0, 0, 0)
    }
}
