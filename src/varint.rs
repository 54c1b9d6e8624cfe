use crate::error::{Error, Result};

/// A u32 never needs more than 5 varint bytes.
pub const MAX_VARINT_LEN: usize = 5;

/// Number of bytes `write_varint` uses for `value`.
pub fn varint_len(mut value: u32) -> usize {
    let mut n = 1;
    while value >= 0x80 {
        value >>= 7;
        n += 1;
    }
    n
}

/// Writes `value` at the start of `dst`, 7 bits per byte, low group first.
/// Returns the number of bytes written.
pub fn write_varint(dst: &mut [u8], mut value: u32) -> usize {
    let mut i = 0;
    while value >= 0x80 {
        dst[i] = (value as u8) | 0x80;
        value >>= 7;
        i += 1;
    }
    dst[i] = value as u8;
    i + 1
}

/// Reads a varint starting at `src[0]`, returning the value and the number
/// of bytes it occupied.
pub fn read_varint(src: &[u8]) -> Result<(u32, usize)> {
    let mut value: u32 = 0;
    for i in 0..MAX_VARINT_LEN {
        let b = match src.get(i) {
            Some(&b) => b,
            None => return Err(Error::InvalidVarint("input ends inside the length header")),
        };
        if i == MAX_VARINT_LEN - 1 {
            if b & 0x80 != 0 {
                return Err(Error::InvalidVarint(
                    "last byte of the length header has the continuation bit set",
                ));
            }
            if b > 0x0f {
                return Err(Error::InvalidVarint("length header overflows 32 bits"));
            }
        }
        value |= u32::from(b & 0x7f) << (7 * i);
        if b & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    unreachable!("the fifth byte always terminates the loop")
}
