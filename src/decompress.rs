use std::io::{self, BufRead, Read};
use std::marker::PhantomData;
use std::mem;

use byteorder::{BigEndian, ByteOrder};

use crate::crc32c::masked_checksum;
use crate::definitions::*;
use crate::error::{Error, Result};
use crate::memory::{Memory, NativeMemory};
use crate::pool::BufferPool;
use crate::varint::read_varint;

/// Framed stream reader.
///
/// Validates the stream header on construction and then yields the
/// decoded contents of each block in turn. A repeated stream header between
/// blocks is skipped, so concatenated streams read as one.
pub struct Decompressor<R: Read> {
    inner: R,
    decoder: Decoder,
    pool: BufferPool,
    verify_checksums: bool,
    // Raw block payload as read from `inner`.
    input: Vec<u8>,
    decoded: Vec<u8>,
    // Bytes i..j of the current block have not yet been passed on.
    i: usize,
    j: usize,
    current_is_decoded: bool,
    eof: bool,
    closed: bool,
}

impl<R: Read> Decompressor<R> {
    /// Reader that verifies the checksum of every block.
    pub fn new(inner: R) -> io::Result<Decompressor<R>> {
        Decompressor::with_pool(inner, true, BufferPool::new())
    }

    pub fn with_pool(
        mut inner: R,
        verify_checksums: bool,
        mut pool: BufferPool,
    ) -> io::Result<Decompressor<R>> {
        let mut header = [0u8; MAGIC_HEADER.len()];
        let n = read_fully(&mut inner, &mut header)?;
        if n != header.len() || header != MAGIC_HEADER {
            return Err(Error::InvalidStreamHeader.into());
        }

        let input = pool.allocate_input_buffer(MAX_BLOCK_SIZE);
        let decoded = pool.allocate_output_buffer(MAX_BLOCK_SIZE);
        Ok(Decompressor {
            inner,
            decoder: Decoder::new(),
            pool,
            verify_checksums,
            input,
            decoded,
            i: 0,
            j: 0,
            current_is_decoded: false,
            eof: false,
            closed: false,
        })
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Closes the stream and hands back the pool holding its buffers.
    pub fn into_pool(mut self) -> BufferPool {
        self.close();
        mem::replace(&mut self.pool, BufferPool::new())
    }

    /// Returns the stream buffers to the pool. Later calls are no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.pool
            .release_input_buffer(mem::replace(&mut self.input, Vec::new()));
        self.pool
            .release_output_buffer(mem::replace(&mut self.decoded, Vec::new()));
        self.i = 0;
        self.j = 0;
        self.closed = true;
        debug!("snappy: decompressor closed");
    }

    /// Reads the next block into the buffers. Returns false on a clean end
    /// of stream, which is only accepted at a block boundary.
    fn read_block(&mut self) -> Result<bool> {
        loop {
            let mut header = [0u8; BLOCK_HEADER_SIZE];
            let n = read_fully(&mut self.inner, &mut header)?;
            if n == 0 {
                return Ok(false);
            }
            if n < header.len() {
                return Err(Error::UnexpectedEof("block header"));
            }
            if header == MAGIC_HEADER {
                debug!("snappy: stream header repeated, continuing");
                continue;
            }

            let flag = header[0];
            if flag != FLAG_UNCOMPRESSED && flag != FLAG_COMPRESSED {
                return Err(Error::InvalidBlockFlag(flag));
            }
            let len = BigEndian::read_u16(&header[1..3]) as usize;
            if len == 0 || len > MAX_BLOCK_SIZE {
                return Err(Error::InvalidBlockLength(len));
            }
            let expected = BigEndian::read_u32(&header[3..7]);

            if read_fully(&mut self.inner, &mut self.input[..len])? < len {
                return Err(Error::UnexpectedEof("block payload"));
            }

            let data = if flag == FLAG_COMPRESSED {
                let payload = &self.input[..len];
                if self.decoder.decompressed_len(payload)? > MAX_BLOCK_SIZE {
                    return Err(Error::Corrupt("block decodes past the maximum block size"));
                }
                let n = self.decoder.decompress(payload, &mut self.decoded)?;
                self.current_is_decoded = true;
                &self.decoded[..n]
            } else {
                self.current_is_decoded = false;
                &self.input[..len]
            };

            if self.verify_checksums {
                let actual = masked_checksum(data);
                if actual != expected {
                    return Err(Error::ChecksumMismatch { expected, actual });
                }
            }

            trace!("snappy: read block flag={} stored={} raw={}", flag, len, data.len());
            self.i = 0;
            self.j = data.len();
            return Ok(true);
        }
    }

    fn current(&self) -> &[u8] {
        if self.current_is_decoded {
            &self.decoded[self.i..self.j]
        } else {
            &self.input[self.i..self.j]
        }
    }
}

impl<R: Read> Read for Decompressor<R> {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(dst.len());
            dst[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<R: Read> BufRead for Decompressor<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.closed {
            return Err(Error::Closed.into());
        }
        while self.i >= self.j && !self.eof {
            if !self.read_block()? {
                self.eof = true;
            }
        }
        Ok(self.current())
    }

    fn consume(&mut self, amt: usize) {
        self.i = (self.i + amt).min(self.j);
    }
}

impl<R: Read> Drop for Decompressor<R> {
    fn drop(&mut self) {
        self.close();
    }
}

// Reads until dst is full or the source is exhausted, returning the count.
fn read_fully<R: Read>(inner: &mut R, dst: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < dst.len() {
        match inner.read(&mut dst[n..]) {
            Ok(0) => break,
            Ok(m) => n += m,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

// A 3-byte copy tag yields at most 64 bytes, so no block decodes to more
// than 22 times its encoded size.
const MAX_EXPANSION: usize = 22;

// Word masks for 0..=4 trailer bytes.
const WORD_MASK: [u32; 5] = [0, 0xff, 0xffff, 0xff_ffff, 0xffff_ffff];

// Decoding table indexed by tag byte:
//   bits 0..7   length, or the base literal length when the length follows
//   bits 8..10  high bits of a COPY_1 offset
//   bits 11..13 number of trailer bytes after the tag byte
static OP_TABLE: [u16; 256] = build_op_table();

const fn build_op_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let b = i as u16;
        let m = b >> 2;
        table[i] = match b & 0x03 {
            0x00 => {
                if m < 60 {
                    m + 1
                } else {
                    1 | ((m - 59) << 11)
                }
            }
            0x01 => (4 + (m & 0x07)) | ((b >> 5) << 8) | (1 << 11),
            0x02 => (m + 1) | (2 << 11),
            _ => (m + 1) | (4 << 11),
        };
        i += 1;
    }
    table
}

// Error for input that ran out in the middle of a tag.
fn truncated(produced: usize, expected: usize) -> Error {
    if produced < expected {
        Error::LengthMismatch {
            expected,
            actual: produced,
        }
    } else {
        Error::Corrupt("input ends inside a tag")
    }
}

/// Raw block decoder.
pub struct Decoder<M: Memory = NativeMemory> {
    memory: PhantomData<M>,
}

impl Decoder<NativeMemory> {
    pub fn new() -> Decoder<NativeMemory> {
        Decoder::with_memory()
    }
}

impl Default for Decoder<NativeMemory> {
    fn default() -> Decoder<NativeMemory> {
        Decoder::new()
    }
}

impl<M: Memory> Decoder<M> {
    /// Builds a decoder over an explicit word-access implementation.
    pub fn with_memory() -> Decoder<M> {
        Decoder {
            memory: PhantomData,
        }
    }

    /// Returns the uncompressed length declared by the block header.
    pub fn decompressed_len(&self, src: &[u8]) -> Result<usize> {
        read_varint(src).map(|(n, _)| n as usize)
    }

    /// Decompresses `src` into `dst` and returns the number of bytes written.
    ///
    /// `dst` must hold at least `decompressed_len(src)` bytes.
    pub fn decompress(&self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        let (expected, header_len) = read_varint(src)?;
        let expected = expected as usize;
        if dst.len() < expected {
            return Err(Error::BufferTooSmall {
                given: dst.len(),
                min: expected,
            });
        }
        let dst = &mut dst[..expected];

        let (s, d) = self.decode_fast(src, header_len, dst, 0)?;
        let d = self.decode_slow(src, s, dst, d)?;

        if d != expected {
            return Err(Error::LengthMismatch {
                expected,
                actual: d,
            });
        }
        Ok(d)
    }

    /// Decompresses `src` into a new vector.
    ///
    /// A declared length no block of `src.len()` bytes could produce is
    /// rejected before anything is allocated.
    pub fn decompress_vec(&self, src: &[u8]) -> Result<Vec<u8>> {
        let n = self.decompressed_len(src)?;
        if n > src.len().saturating_mul(MAX_EXPANSION) {
            return Err(Error::Corrupt("declared length exceeds what the input can expand to"));
        }
        let mut dst = vec![0; n];
        self.decompress(src, &mut dst)?;
        Ok(dst)
    }

    // Decodes tags while at least five input bytes remain, so the tag byte
    // and up to four trailer bytes can be read with one word load. Returns
    // the input and output positions reached.
    fn decode_fast(
        &self,
        src: &[u8],
        mut s: usize,
        dst: &mut [u8],
        mut d: usize,
    ) -> Result<(usize, usize)> {
        while s + 5 <= src.len() {
            let opcode = src[s];
            let entry = OP_TABLE[opcode as usize];
            let trailer_bytes = (entry >> 11) as usize;
            let trailer = (M::load_u32(src, s + 1) & WORD_MASK[trailer_bytes]) as usize;
            s += 1 + trailer_bytes;
            let length = (entry & 0xff) as usize;

            if opcode & 0x03 == TAG_LITERAL {
                let literal_len = length + trailer;
                if literal_len <= 16 && dst.len() - d >= 16 && src.len() - s >= 16 {
                    // Copies 16 bytes; anything past the literal is
                    // overwritten by later tags.
                    M::store_u64(dst, d, M::load_u64(src, s));
                    M::store_u64(dst, d + 8, M::load_u64(src, s + 8));
                } else {
                    if literal_len > dst.len() - d {
                        return Err(Error::Corrupt("literal overruns the declared length"));
                    }
                    if literal_len > src.len() - s {
                        return Err(truncated(d, dst.len()));
                    }
                    M::copy_bytes(src, s, dst, d, literal_len);
                }
                s += literal_len;
                d += literal_len;
            } else {
                let offset = (entry & 0x700) as usize + trailer;
                copy_match::<M>(dst, d, offset, length)?;
                d += length;
            }
        }
        Ok((s, d))
    }

    // Same per-tag decoding as decode_fast, reading trailers byte by byte
    // with explicit bounds checks for the last few bytes of input.
    fn decode_slow(&self, src: &[u8], mut s: usize, dst: &mut [u8], mut d: usize) -> Result<usize> {
        while s < src.len() {
            let opcode = src[s];
            let entry = OP_TABLE[opcode as usize];
            let trailer_bytes = (entry >> 11) as usize;
            s += 1;
            if trailer_bytes > src.len() - s {
                return Err(truncated(d, dst.len()));
            }
            let mut trailer = 0usize;
            for (k, &b) in src[s..s + trailer_bytes].iter().enumerate() {
                trailer |= (b as usize) << (8 * k);
            }
            s += trailer_bytes;
            let length = (entry & 0xff) as usize;

            if opcode & 0x03 == TAG_LITERAL {
                let literal_len = length + trailer;
                if literal_len > dst.len() - d {
                    return Err(Error::Corrupt("literal overruns the declared length"));
                }
                if literal_len > src.len() - s {
                    return Err(truncated(d, dst.len()));
                }
                M::copy_bytes(src, s, dst, d, literal_len);
                s += literal_len;
                d += literal_len;
            } else {
                let offset = (entry & 0x700) as usize + trailer;
                copy_match::<M>(dst, d, offset, length)?;
                d += length;
            }
        }
        Ok(d)
    }
}

// Copies `length` bytes from `offset` bytes back in dst to dst[d..].
fn copy_match<M: Memory>(dst: &mut [u8], d: usize, offset: usize, length: usize) -> Result<()> {
    if offset == 0 || offset > d {
        return Err(Error::InvalidCopyOffset {
            offset,
            position: d,
        });
    }
    if length > dst.len() - d {
        return Err(Error::Corrupt("copy overruns the declared length"));
    }
    let src = d - offset;

    if offset >= 8 && length <= 16 && dst.len() - d >= 16 {
        // The second load may read bytes the first store just wrote, which
        // is what a byte-by-byte copy would see too.
        let a = M::load_u64(dst, src);
        M::store_u64(dst, d, a);
        let b = M::load_u64(dst, src + 8);
        M::store_u64(dst, d + 8, b);
    } else {
        incremental_copy(dst, src, d, length);
    }
    Ok(())
}

// Overlapping copy: every pass copies the whole pattern produced so far, so
// the distance between src and the write position doubles each time.
fn incremental_copy(dst: &mut [u8], src: usize, mut d: usize, length: usize) {
    let mut remaining = length;
    while remaining > 0 {
        let chunk = remaining.min(d - src);
        dst.copy_within(src..src + chunk, d);
        d += chunk;
        remaining -= chunk;
    }
}

/// Returns the uncompressed length declared by the block header of `src`.
pub fn decompressed_len(src: &[u8]) -> Result<usize> {
    Decoder::new().decompressed_len(src)
}

pub fn decompress(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    Decoder::new().decompress(src, dst)
}

pub fn decompress_vec(src: &[u8]) -> Result<Vec<u8>> {
    Decoder::new().decompress_vec(src)
}
