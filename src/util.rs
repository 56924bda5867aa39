use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::BufMut;

// offset in seconds between unix epoch and ntp epoch
const NTP_UNIX_OFFSET: u64 = 0x83AA7E80;

/// get_padding_size returns the padding required to make the length a multiple of 4
pub(crate) fn get_padding_size(len: usize) -> usize {
    if len % 4 == 0 {
        0
    } else {
        4 - (len % 4)
    }
}

/// put_padding writes RFC 3550 padding: zeros, with the last octet holding the padding count.
pub(crate) fn put_padding(mut buf: &mut [u8], len: usize) {
    let padding_size = get_padding_size(len);
    for i in 0..padding_size {
        if i == padding_size - 1 {
            buf.put_u8(padding_size as u8);
        } else {
            buf.put_u8(0);
        }
    }
}

/// put_null_padding pads with null octets up to the next 32-bit boundary.
pub(crate) fn put_null_padding(mut buf: &mut [u8], len: usize) {
    for _ in 0..get_padding_size(len) {
        buf.put_u8(0);
    }
}

/// unix2ntp converts a wall clock time into a 64-bit NTP timestamp.
pub fn unix2ntp(st: SystemTime) -> u64 {
    let u = st
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_nanos() as u64;
    let mut s = u / 1_000_000_000;
    s += NTP_UNIX_OFFSET;
    let mut f = u % 1_000_000_000;
    f <<= 32;
    f /= 1_000_000_000;
    s <<= 32;

    s | f
}

/// compact_ntp returns the middle 32 bits of an NTP timestamp, as carried in the LSR field.
pub fn compact_ntp(ntp: u64) -> u32 {
    ((ntp >> 16) & 0xFFFF_FFFF) as u32
}

/// duration_to_dlsr expresses a delay in units of 1/65536 seconds, saturating at u32::MAX.
pub(crate) fn duration_to_dlsr(d: Duration) -> u32 {
    let units = d.as_secs() as u128 * 65536 + (d.subsec_nanos() as u128 * 65536) / 1_000_000_000;
    units.min(u32::MAX as u128) as u32
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_padding_size() {
        let tests = vec![(0, 0), (1, 3), (2, 2), (3, 1), (4, 0), (100, 0), (500, 0)];

        for (n, p) in tests {
            assert_eq!(
                get_padding_size(n),
                p,
                "Test case returned wrong value for input {n}"
            );
        }
    }

    #[test]
    fn test_put_padding() {
        let mut buf = [0xffu8; 3];
        put_padding(&mut buf, 5);
        assert_eq!(buf, [0x00, 0x00, 0x03]);

        let mut buf = [0xffu8; 3];
        put_null_padding(&mut buf, 5);
        assert_eq!(buf, [0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_ntp_conversion() {
        let st = UNIX_EPOCH + Duration::new(1, 500_000_000);
        let ntp = unix2ntp(st);
        assert_eq!(ntp >> 32, NTP_UNIX_OFFSET + 1);
        assert_eq!(ntp & 0xFFFF_FFFF, 0x8000_0000);
        assert_eq!(compact_ntp(ntp), (((NTP_UNIX_OFFSET + 1) & 0xFFFF) << 16) as u32 | 0x8000);
    }

    #[test]
    fn test_duration_to_dlsr() {
        assert_eq!(duration_to_dlsr(Duration::from_secs(1)), 65536);
        assert_eq!(duration_to_dlsr(Duration::from_millis(500)), 32768);
        assert_eq!(duration_to_dlsr(Duration::from_secs(u32::MAX as u64)), u32::MAX);
    }
}
