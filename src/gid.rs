use std::fmt;

/// A 128-bit global identifier of a simulated port (RoCE addressing).
#[derive(Default, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub struct Gid {
    /// Gid raw data
    raw: [u8; 16],
}

impl Gid {
    /// Build a gid from its raw bytes
    #[inline]
    #[must_use]
    pub fn from_bytes(raw: [u8; 16]) -> Self {
        Self { raw }
    }

    /// The raw bytes of this gid
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.raw
    }

    /// First 64 bits
    #[allow(dead_code)]
    pub(crate) fn subnet_prefix(&self) -> u64 {
        // into always success
        #[allow(clippy::unwrap_used)]
        u64::from_be_bytes(self.raw[..8].try_into().unwrap())
    }

    /// Last 64 bits
    #[allow(dead_code)]
    pub(crate) fn interface_id(&self) -> u64 {
        // into always success
        #[allow(clippy::unwrap_used)]
        u64::from_be_bytes(self.raw[8..].try_into().unwrap())
    }
}

/// Encodes a gid to a hex string and process it
fn gid_to_hex<R>(gid: &Gid, f: impl FnOnce(&str) -> R) -> R {
    let src: &[u8; 16] = gid.as_bytes();
    let mut buf: [u8; 32] = [0; 32];
    // SAFETY: The buf is two times of src, which is required by hex::encode_to_slice.
    // Therefore, the unwrap_unchecked on hex::encode_to_slice is safe.
    // After the hex encoding, the bytes in buf are valid UTF-8, because hex::encode_to_slice
    // only produces bytes in the ASCII range (0x00 - 0x7F), which are valid UTF-8.
    let ans = unsafe {
        hex::encode_to_slice(src, &mut buf).unwrap_unchecked();
        std::str::from_utf8(&buf).unwrap_unchecked()
    };
    f(ans)
}

impl fmt::Debug for Gid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        gid_to_hex(self, |s| write!(f, "Gid({s})"))
    }
}

impl fmt::LowerHex for Gid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        gid_to_hex(self, |s| <str as fmt::Display>::fmt(s, f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gid_fmt() {
        let mut raw = [0_u8; 16];
        raw[0] = 0xfe;
        raw[1] = 0x80;
        raw[15] = 0x01;
        let gid = Gid::from_bytes(raw);
        assert_eq!(
            format!("{gid:x}"),
            "fe800000000000000000000000000001"
        );
        assert_eq!(
            format!("{gid:?}"),
            "Gid(fe800000000000000000000000000001)"
        );
    }

    #[test]
    fn prefix_and_interface_id() {
        let mut raw = [0_u8; 16];
        raw[7] = 0x02;
        raw[15] = 0x03;
        let gid = Gid::from_bytes(raw);
        assert_eq!(gid.subnet_prefix(), 0x02);
        assert_eq!(gid.interface_id(), 0x03);
    }
}
