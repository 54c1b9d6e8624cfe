//! CRC-32C (Castagnoli) as stored in framed block headers.

use crc::{Crc, CRC_32_ISCSI};

const CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

const MASK_DELTA: u32 = 0xa282_ead8;

pub fn checksum(data: &[u8]) -> u32 {
    CASTAGNOLI.checksum(data)
}

/// Rotate right by 15 bits and add a constant, so that checksums of data
/// containing embedded checksums stay well distributed.
pub fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

pub fn masked_checksum(data: &[u8]) -> u32 {
    mask(checksum(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        assert_eq!(checksum(b"123456789"), 0xe306_9283);
        assert_eq!(checksum(&[0u8; 32]), 0x8a91_36aa);
        assert_eq!(checksum(&[0xffu8; 32]), 0x62a8_ab43);
    }

    #[test]
    fn mask_rotates_and_offsets() {
        assert_eq!(mask(0), MASK_DELTA);
        assert_eq!(mask(1 << 15), 1u32.wrapping_add(MASK_DELTA));
        assert_eq!(masked_checksum(b"123456789"), mask(0xe306_9283));
    }
}
