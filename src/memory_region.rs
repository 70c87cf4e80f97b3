use getset::CopyGetters;

/// The backing record of a registered memory region: a window into
/// caller-owned memory identified by its `lkey`.
///
/// The simulator records the `(addr, length, access)` triple and nothing
/// else; it never allocates, frees, or touches the memory behind `addr`
/// outside of an explicit data transfer.
#[derive(Copy, Clone, Debug, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct MrValue {
    /// Local memory key
    lkey: u32,
    /// Start of the registered window, caller owned
    addr: *mut u8,
    /// Length of the window in bytes
    length: u64,
    /// Raw access permission bits
    access_flags: u32,
}

// SAFETY: `addr` references caller-owned memory; registration does not
// transfer ownership and the caller keeps the buffer alive, as with real
// verbs.
unsafe impl Send for MrValue {}
// SAFETY: same contract as `Send`
unsafe impl Sync for MrValue {}

impl MrValue {
    /// Record a registration
    pub(crate) fn new(lkey: u32, addr: *mut u8, length: u64, access_flags: u32) -> Self {
        Self {
            lkey,
            addr,
            length,
            access_flags,
        }
    }
}
