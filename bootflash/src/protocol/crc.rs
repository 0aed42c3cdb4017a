//! CRC-32 (ISO-HDLC) checksum used to protect the whole firmware image.

/// Reflected CRC-32 polynomial.
pub const CRC32_POLY: u32 = 0xEDB88320;

/// Compute the CRC-32 of `data`.
///
/// Bit-by-bit reflected implementation: init `0xFFFFFFFF`, final XOR
/// `0xFFFFFFFF`. Matches the checksum the bootloader recomputes over flash
/// after the transfer.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;

    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ CRC32_POLY;
            } else {
                crc >>= 1;
            }
        }
    }

    crc ^ 0xFFFFFFFF
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32(&[]), 0x00000000);
    }

    #[test]
    fn test_crc32_single_bytes() {
        assert_eq!(crc32(&[0x00]), 0xD202EF8D);
        // The standard CRC-32 of a single 0xFF byte.
        assert_eq!(crc32(&[0xFF]), 0xFF000000);
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_crc32_hello() {
        assert_eq!(crc32(b"hello"), 0x3610A686);
    }

    #[test]
    fn test_crc32_order_sensitive() {
        assert_ne!(crc32(&[0x01, 0x02]), crc32(&[0x02, 0x01]));
    }
}
