//! Word access used by the block encoder and decoder.
//!
//! Every call site guarantees the accessed range lies inside the slice. The
//! safe implementation re-checks that guarantee, the unchecked one only
//! asserts it in debug builds.

use byteorder::{ByteOrder, LittleEndian};

pub trait Memory {
    /// Little-endian load of the 4 bytes at `index`.
    fn load_u32(buf: &[u8], index: usize) -> u32;

    /// Little-endian load of the 8 bytes at `index`.
    fn load_u64(buf: &[u8], index: usize) -> u64;

    /// Little-endian store of 8 bytes at `index`.
    fn store_u64(buf: &mut [u8], index: usize, value: u64);

    /// Copy `len` bytes from `src[src_index..]` to `dst[dst_index..]`.
    fn copy_bytes(src: &[u8], src_index: usize, dst: &mut [u8], dst_index: usize, len: usize);
}

/// Bounds-checked slice access.
#[derive(Debug, Clone, Copy, Default)]
pub struct SafeMemory;

impl Memory for SafeMemory {
    #[inline]
    fn load_u32(buf: &[u8], index: usize) -> u32 {
        LittleEndian::read_u32(&buf[index..index + 4])
    }

    #[inline]
    fn load_u64(buf: &[u8], index: usize) -> u64 {
        LittleEndian::read_u64(&buf[index..index + 8])
    }

    #[inline]
    fn store_u64(buf: &mut [u8], index: usize, value: u64) {
        LittleEndian::write_u64(&mut buf[index..index + 8], value)
    }

    #[inline]
    fn copy_bytes(src: &[u8], src_index: usize, dst: &mut [u8], dst_index: usize, len: usize) {
        dst[dst_index..dst_index + len].copy_from_slice(&src[src_index..src_index + len]);
    }
}

/// Raw unaligned pointer access.
#[cfg(feature = "unchecked")]
#[derive(Debug, Clone, Copy, Default)]
pub struct UncheckedMemory;

#[cfg(feature = "unchecked")]
impl Memory for UncheckedMemory {
    #[inline]
    fn load_u32(buf: &[u8], index: usize) -> u32 {
        debug_assert!(index + 4 <= buf.len());
        unsafe { u32::from_le(std::ptr::read_unaligned(buf.as_ptr().add(index) as *const u32)) }
    }

    #[inline]
    fn load_u64(buf: &[u8], index: usize) -> u64 {
        debug_assert!(index + 8 <= buf.len());
        unsafe { u64::from_le(std::ptr::read_unaligned(buf.as_ptr().add(index) as *const u64)) }
    }

    #[inline]
    fn store_u64(buf: &mut [u8], index: usize, value: u64) {
        debug_assert!(index + 8 <= buf.len());
        unsafe {
            std::ptr::write_unaligned(buf.as_mut_ptr().add(index) as *mut u64, value.to_le())
        }
    }

    #[inline]
    fn copy_bytes(src: &[u8], src_index: usize, dst: &mut [u8], dst_index: usize, len: usize) {
        debug_assert!(src_index + len <= src.len());
        debug_assert!(dst_index + len <= dst.len());
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr().add(src_index),
                dst.as_mut_ptr().add(dst_index),
                len,
            )
        }
    }
}

#[cfg(feature = "unchecked")]
pub type NativeMemory = UncheckedMemory;

#[cfg(not(feature = "unchecked"))]
pub type NativeMemory = SafeMemory;
