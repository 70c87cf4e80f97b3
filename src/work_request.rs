use derive_builder::Builder;
use getset::{CopyGetters, Setters};
use num_derive::FromPrimitive;
use std::ptr;

/// Operation type of a work request or a completion entry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
#[repr(u8)]
pub enum RdmaOpcode {
    /// two-sided send, consumes a posted receive on the remote side
    Send = 0,
    /// receive completion opcode, never posted directly
    Recv = 1,
    /// one-sided write into remote memory
    RdmaWrite = 2,
    /// one-sided read from remote memory
    RdmaRead = 3,
    /// atomic compare-and-swap
    AtomicCmpAndSwp = 4,
    /// atomic fetch-and-add
    AtomicFetchAndAdd = 5,
}

/// A unit of I/O submitted to a queue pair.
///
/// `local_addr` points into caller-owned memory; the simulator reads from it
/// (`post_send`) or writes into it (`post_recv`) and never takes ownership.
/// `remote_addr`/`rkey` are carried for the one-sided opcodes but the
/// simulated data path delivers through the remote queue pair's posted
/// receive buffer.
#[derive(Copy, Clone, Debug, CopyGetters, Setters, Builder)]
#[builder(derive(Debug, Copy))]
#[getset(get_copy = "pub", set = "pub")]
pub struct WorkRequest {
    /// Operation type
    #[builder(default = "RdmaOpcode::Send")]
    opcode: RdmaOpcode,
    /// Local buffer address, caller owned
    #[builder(default = "ptr::null_mut()")]
    local_addr: *mut u8,
    /// Local memory key of the buffer
    #[builder(default)]
    lkey: u32,
    /// Length of the transfer in bytes
    #[builder(default)]
    length: u32,
    /// Remote buffer address, used by the one-sided opcodes
    #[builder(default)]
    remote_addr: u64,
    /// Remote memory key, used by the one-sided opcodes
    #[builder(default)]
    rkey: u32,
    /// Optional immediate data
    #[builder(default)]
    imm_data: u32,
    /// Whether this request produces a completion entry
    #[builder(default = "true")]
    signaled: bool,
    /// Caller-chosen id reported back in the completion entry
    #[builder(default)]
    wr_id: u64,
}

// SAFETY: `local_addr` references caller-owned registered memory; as with
// real verbs, the caller guarantees the buffer outlives the request.
unsafe impl Send for WorkRequest {}
// SAFETY: same contract as `Send`
unsafe impl Sync for WorkRequest {}

impl Default for WorkRequest {
    #[inline]
    fn default() -> Self {
        Self {
            opcode: RdmaOpcode::Send,
            local_addr: ptr::null_mut(),
            lkey: 0,
            length: 0,
            remote_addr: 0,
            rkey: 0,
            imm_data: 0,
            signaled: true,
            wr_id: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let wr = WorkRequestBuilder::default().build().unwrap();
        assert_eq!(wr.opcode(), RdmaOpcode::Send);
        assert!(wr.local_addr().is_null());
        assert!(wr.signaled());
        assert_eq!(wr.wr_id(), 0);
    }

    #[test]
    fn builder_overrides() {
        let mut buf = [0_u8; 8];
        let wr = WorkRequestBuilder::default()
            .opcode(RdmaOpcode::RdmaWrite)
            .local_addr(buf.as_mut_ptr())
            .length(8)
            .signaled(false)
            .wr_id(42)
            .build()
            .unwrap();
        assert_eq!(wr.opcode(), RdmaOpcode::RdmaWrite);
        assert_eq!(wr.length(), 8);
        assert!(!wr.signaled());
        assert_eq!(wr.wr_id(), 42);
    }

    #[test]
    fn opcode_from_byte() {
        use num_traits::FromPrimitive;
        assert_eq!(RdmaOpcode::from_u8(2), Some(RdmaOpcode::RdmaWrite));
        assert_eq!(RdmaOpcode::from_u8(9), None);
    }
}
