use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

/// Create a random u64 id.
///
/// To avoid id duplication, this fn concatenates `SystemTime` and a random
/// number into a u64. The syscall may have some overhead, which can be
/// improved later by balancing the pros and cons.
pub(crate) fn random_u64() -> u64 {
    let start = SystemTime::now();
    // No time can be earlier than Unix Epoch
    #[allow(clippy::unwrap_used)]
    let since_the_epoch = start.duration_since(UNIX_EPOCH).unwrap();
    let time = since_the_epoch.subsec_micros();
    let rand = rand::thread_rng().gen::<u32>();
    let left: u64 = time.into();
    let right: u64 = rand.into();
    left.wrapping_shl(32) | right
}

/// Create a random 24-bit starting packet sequence number.
///
/// Connection initiators advertise this when their queue pair was created
/// with the default psn of 0.
pub(crate) fn random_psn() -> u32 {
    #[allow(clippy::as_conversions)] // masked to 24 bits, always fits
    let psn = (random_u64() & 0x00FF_FFFF) as u32;
    psn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psn_fits_in_24_bits() {
        for _ in 0_i32..100_i32 {
            assert!(random_psn() <= 0x00FF_FFFF);
        }
    }
}
