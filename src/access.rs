use enumflags2::{bitflags, BitFlags};

lazy_static! {
    /// The default access right of a simulated queue pair or memory region:
    /// `LocalWrite` | `RemoteRead` | `RemoteWrite` | `RemoteAtomic`
    pub static ref DEFAULT_ACCESS: BitFlags<AccessFlag> = AccessFlag::LocalWrite
        | AccessFlag::RemoteWrite
        | AccessFlag::RemoteRead
        | AccessFlag::RemoteAtomic;
}

/// Access permissions of a queue pair or a registered memory region.
///
/// The simulated device stores permissions as a raw `u32`
/// (`qp_access_flags` on a queue pair, `access_flags` on a memory region);
/// this wrapper hides the raw bits behind typed flags.
#[bitflags]
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AccessFlag {
    /// local write permission
    LocalWrite,
    /// remote write permission
    RemoteWrite,
    /// remote read permission
    RemoteRead,
    /// remote atomic operation permission
    RemoteAtomic,
}

/// Convert typed access flags into the raw `u32` the device records carry.
#[inline]
#[must_use]
pub fn flags_into_raw(flags: BitFlags<AccessFlag>) -> u32 {
    flags.bits()
}

/// Recover typed access flags from a raw `u32`, ignoring unknown bits.
#[inline]
#[must_use]
pub fn flags_from_raw(raw: u32) -> BitFlags<AccessFlag> {
    BitFlags::from_bits_truncate(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_round_trip() {
        let flags = AccessFlag::LocalWrite | AccessFlag::RemoteRead;
        let raw = flags_into_raw(flags);
        assert_eq!(flags_from_raw(raw), flags);
    }

    #[test]
    fn unknown_bits_are_dropped() {
        let raw = flags_into_raw(*DEFAULT_ACCESS) | 0x8000_0000;
        assert_eq!(flags_from_raw(raw), *DEFAULT_ACCESS);
    }
}
