use std::io::{self, BufWriter, Write};
use std::marker::PhantomData;
use std::mem;

use byteorder::{BigEndian, ByteOrder};

use crate::crc32c::masked_checksum;
use crate::definitions::*;
use crate::error::{Error, Result};
use crate::memory::{Memory, NativeMemory};
use crate::pool::BufferPool;
use crate::varint::write_varint;

// Matching stops this many bytes before the end of a fragment, so the word
// loads of the match finder never run past the input.
const INPUT_MARGIN_BYTES: usize = 15;

const MIN_HASH_TABLE_SIZE: usize = 1 << 8;
const MAX_HASH_TABLE_SIZE: usize = 1 << 14;

const HASH_MULTIPLIER: u32 = 0x1e35_a7bd;

/// Framed stream writer.
///
/// Emits the stream header on construction, then buffers written bytes into
/// blocks of up to `MAX_BLOCK_SIZE` bytes. Each block is stored compressed
/// unless compression saves less than 12.5%.
pub struct Compressor<W: Write> {
    inner: BufWriter<W>,
    encoder: Encoder,
    // input[..pos] holds bytes not yet emitted as a block.
    input: Vec<u8>,
    pos: usize,
    output: Vec<u8>,
    closed: bool,
}

impl<W: Write> Compressor<W> {
    pub fn new(inner: W) -> io::Result<Compressor<W>> {
        Compressor::with_pool(inner, BufferPool::new())
    }

    pub fn with_pool(inner: W, pool: BufferPool) -> io::Result<Compressor<W>> {
        let mut encoder = Encoder::with_pool(pool);
        let input = encoder.pool_mut().allocate_input_buffer(MAX_BLOCK_SIZE);
        let output = encoder
            .pool_mut()
            .allocate_output_buffer(max_compressed_len(MAX_BLOCK_SIZE));

        let mut inner = BufWriter::new(inner);
        inner.write_all(&MAGIC_HEADER)?;

        Ok(Compressor {
            inner,
            encoder,
            input,
            pos: 0,
            output,
            closed: false,
        })
    }

    pub fn get_ref(&self) -> &W {
        self.inner.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.inner.get_mut()
    }

    /// Closes the stream and hands back the pool holding its buffers, for
    /// the next stream or encoder to borrow from.
    ///
    /// If closing fails the error is returned and the pool is dropped; call
    /// `close` first to keep the pool regardless.
    pub fn into_pool(mut self) -> io::Result<BufferPool> {
        self.close()?;
        Ok(mem::replace(self.encoder.pool_mut(), BufferPool::new()))
    }

    /// Writes any buffered bytes as a final block, flushes the sink and
    /// returns the stream buffers to the pool. Later calls are no-ops.
    pub fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.flush_block().and_then(|_| self.inner.flush());

        let pool = self.encoder.pool_mut();
        pool.release_input_buffer(mem::replace(&mut self.input, Vec::new()));
        pool.release_output_buffer(mem::replace(&mut self.output, Vec::new()));
        self.closed = true;
        debug!("snappy: compressor closed");

        result
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(Error::Closed.into());
        }
        Ok(())
    }

    fn flush_block(&mut self) -> io::Result<()> {
        if self.pos == 0 {
            return Ok(());
        }
        write_block(
            &mut self.inner,
            &mut self.encoder,
            &self.input[..self.pos],
            &mut self.output,
        )?;
        self.pos = 0;
        Ok(())
    }
}

impl<W: Write> Write for Compressor<W> {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;

        // A whole block with nothing staged skips the copy into `input`.
        if self.pos == 0 && src.len() >= MAX_BLOCK_SIZE {
            write_block(
                &mut self.inner,
                &mut self.encoder,
                &src[..MAX_BLOCK_SIZE],
                &mut self.output,
            )?;
            return Ok(MAX_BLOCK_SIZE);
        }

        let n = src.len().min(MAX_BLOCK_SIZE - self.pos);
        self.input[self.pos..self.pos + n].copy_from_slice(&src[..n]);
        self.pos += n;
        if self.pos == MAX_BLOCK_SIZE {
            self.flush_block()?;
        }
        Ok(n)
    }

    // Emits the staged bytes as a (possibly short) block.
    fn flush(&mut self) -> io::Result<()> {
        self.ensure_open()?;
        self.flush_block()?;
        self.inner.flush()
    }
}

impl<W: Write> Drop for Compressor<W> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

fn write_block<W: Write>(
    inner: &mut W,
    encoder: &mut Encoder,
    block: &[u8],
    scratch: &mut [u8],
) -> io::Result<()> {
    let checksum = masked_checksum(block);
    let n = encoder.compress(block, scratch)?;

    // Keep the compressed form only if it saves at least 12.5%.
    let (flag, body) = if n >= block.len() - block.len() / 8 {
        (FLAG_UNCOMPRESSED, block)
    } else {
        (FLAG_COMPRESSED, &scratch[..n])
    };

    let mut header = [0u8; BLOCK_HEADER_SIZE];
    header[0] = flag;
    BigEndian::write_u16(&mut header[1..3], body.len() as u16);
    BigEndian::write_u32(&mut header[3..7], checksum);

    inner.write_all(&header)?;
    inner.write_all(body)?;
    trace!(
        "snappy: wrote block flag={} raw={} stored={}",
        flag,
        block.len(),
        body.len()
    );
    Ok(())
}

/// Raw block encoder.
///
/// Owns the pool that lends it a hash table for each `compress` call.
pub struct Encoder<M: Memory = NativeMemory> {
    pool: BufferPool,
    memory: PhantomData<M>,
}

impl Encoder<NativeMemory> {
    pub fn new() -> Encoder<NativeMemory> {
        Encoder::with_pool(BufferPool::new())
    }

    pub fn with_pool(pool: BufferPool) -> Encoder<NativeMemory> {
        Encoder::with_memory(pool)
    }
}

impl Default for Encoder<NativeMemory> {
    fn default() -> Encoder<NativeMemory> {
        Encoder::new()
    }
}

impl<M: Memory> Encoder<M> {
    /// Builds an encoder over an explicit word-access implementation.
    pub fn with_memory(pool: BufferPool) -> Encoder<M> {
        Encoder {
            pool,
            memory: PhantomData,
        }
    }

    pub fn pool_mut(&mut self) -> &mut BufferPool {
        &mut self.pool
    }

    pub fn into_pool(self) -> BufferPool {
        self.pool
    }

    /// Compresses `src` into `dst` and returns the number of bytes written.
    ///
    /// `dst` must hold at least `max_compressed_len(src.len())` bytes.
    pub fn compress(&mut self, src: &[u8], dst: &mut [u8]) -> Result<usize> {
        if src.len() > MAX_INPUT_SIZE {
            return Err(Error::TooBig {
                given: src.len(),
                max: MAX_INPUT_SIZE,
            });
        }
        let min = max_compressed_len(src.len());
        if dst.len() < min {
            return Err(Error::BufferTooSmall {
                given: dst.len(),
                min,
            });
        }

        // Start Block with varint-encoded length of decompressed bytes
        let mut d = write_varint(dst, src.len() as u32);

        let mut table = self.pool.allocate_hash_table(MAX_HASH_TABLE_SIZE);
        for fragment in src.chunks(MAX_BLOCK_SIZE) {
            let table = &mut table[..hash_table_size(fragment.len())];
            for slot in table.iter_mut() {
                *slot = 0;
            }
            d = compress_fragment::<M>(fragment, dst, d, table);
        }
        self.pool.release_hash_table(table);

        Ok(d)
    }

    /// Compresses `src` into a new vector sized to the result.
    pub fn compress_vec(&mut self, src: &[u8]) -> Result<Vec<u8>> {
        let mut dst = vec![0; max_compressed_len(src.len())];
        let n = self.compress(src, &mut dst)?;
        dst.truncate(n);
        Ok(dst)
    }
}

/// Compresses `src` into `dst` with a one-off encoder.
pub fn compress(src: &[u8], dst: &mut [u8]) -> Result<usize> {
    Encoder::new().compress(src, dst)
}

pub fn compress_vec(src: &[u8]) -> Result<Vec<u8>> {
    Encoder::new().compress_vec(src)
}

// max_compressed_len returns the maximum length of a snappy block, given its
// uncompressed length.
pub fn max_compressed_len(src_len: usize) -> usize {
    32 + src_len + src_len / 6
}

// Smallest power of two in [MIN_HASH_TABLE_SIZE, MAX_HASH_TABLE_SIZE] that is
// not smaller than the fragment.
fn hash_table_size(fragment_len: usize) -> usize {
    let mut size = MIN_HASH_TABLE_SIZE;
    while size < MAX_HASH_TABLE_SIZE && size < fragment_len {
        size <<= 1;
    }
    size
}

#[inline]
fn hash(bytes: u32, shift: u32) -> usize {
    (bytes.wrapping_mul(HASH_MULTIPLIER) >> shift) as usize
}

// Compresses one fragment of at most MAX_BLOCK_SIZE bytes, appending tokens
// to dst at d. Table entries are positions relative to the fragment start.
fn compress_fragment<M: Memory>(
    src: &[u8],
    dst: &mut [u8],
    mut d: usize,
    table: &mut [u16],
) -> usize {
    debug_assert!(src.len() <= MAX_BLOCK_SIZE);
    debug_assert!(table.len().is_power_of_two());

    let src_len = src.len();
    let shift = 32 - table.len().trailing_zeros();
    let mut next_emit = 0;
    let mut s = 0;

    if src_len >= INPUT_MARGIN_BYTES {
        let s_limit = src_len - INPUT_MARGIN_BYTES;

        s += 1;
        let mut next_hash = hash(M::load_u32(src, s), shift);

        'fragment: loop {
            // The lookup stride grows by one byte every 32 misses, so
            // incompressible input is skipped quickly.
            let mut skip: u32 = 32;
            let mut next_s = s;
            let mut candidate: usize;
            loop {
                s = next_s;
                let h = next_hash;
                next_s = s + (skip >> 5) as usize;
                skip += 1;
                if next_s > s_limit {
                    break 'fragment;
                }
                next_hash = hash(M::load_u32(src, next_s), shift);
                candidate = table[h] as usize;
                table[h] = s as u16;
                if M::load_u32(src, s) == M::load_u32(src, candidate) {
                    break;
                }
            }

            // Otherwise, we have a match. First, emit any pending literal bytes.
            d = emit_literal::<M>(dst, d, &src[next_emit..s]);

            // Emit matches for as long as the byte after the previous one
            // starts another.
            loop {
                debug_assert!(candidate < s);
                let base = s;
                let matched = 4 + find_match_length::<M>(src, candidate + 4, s + 4, src_len);
                s += matched;
                d = emit_copy(dst, d, base - candidate, matched);
                next_emit = s;
                if s >= s_limit {
                    break 'fragment;
                }

                // Hash every position the match spanned so later lookups can
                // find them. All of them are below s_limit here.
                for p in base + 1..s - 1 {
                    table[hash(M::load_u32(src, p), shift)] = p as u16;
                }
                let prev_hash = hash(M::load_u32(src, s - 1), shift);
                table[prev_hash] = (s - 1) as u16;
                let cur_hash = hash(M::load_u32(src, s), shift);
                candidate = table[cur_hash] as usize;
                table[cur_hash] = s as u16;
                if M::load_u32(src, s) != M::load_u32(src, candidate) {
                    break;
                }
            }

            s += 1;
            next_hash = hash(M::load_u32(src, s), shift);
        }
    }

    // Emit any final pending literal bytes and return.
    if next_emit < src_len {
        d = emit_literal::<M>(dst, d, &src[next_emit..]);
    }
    d
}

// Counts matching bytes of src[s1..] and src[s2..] with s1 < s2, stopping at
// limit.
fn find_match_length<M: Memory>(src: &[u8], mut s1: usize, mut s2: usize, limit: usize) -> usize {
    let start = s2;
    while s2 + 8 <= limit {
        let diff = M::load_u64(src, s1) ^ M::load_u64(src, s2);
        if diff != 0 {
            return s2 - start + (diff.trailing_zeros() / 8) as usize;
        }
        s1 += 8;
        s2 += 8;
    }
    while s2 < limit && src[s1] == src[s2] {
        s1 += 1;
        s2 += 1;
    }
    s2 - start
}

// emit_literal writes a literal chunk at dst[d..] and returns the new write
// position.
fn emit_literal<M: Memory>(dst: &mut [u8], mut d: usize, lit: &[u8]) -> usize {
    let n = lit.len() - 1;
    if n < 60 {
        dst[d] = (n as u8) << 2 | TAG_LITERAL;
        d += 1;
    } else {
        let count = if n < 1 << 8 {
            1
        } else if n < 1 << 16 {
            2
        } else if n < 1 << 24 {
            3
        } else {
            4
        };
        dst[d] = ((59 + count) as u8) << 2 | TAG_LITERAL;
        d += 1;
        for i in 0..count {
            dst[d + i] = (n >> (8 * i)) as u8;
        }
        d += count;
    }
    M::copy_bytes(lit, 0, dst, d, lit.len());
    d + lit.len()
}

// emit_copy writes one or more copy chunks and returns the new write position.
fn emit_copy(dst: &mut [u8], mut d: usize, offset: usize, mut length: usize) -> usize {
    debug_assert!(length >= 4);
    debug_assert!(offset > 0 && offset <= MAX_BLOCK_SIZE);

    // Pieces of 64, then one of 60 if needed so the tail stays >= 4.
    while length >= 68 {
        d = emit_copy_at_most_64(dst, d, offset, 64);
        length -= 64;
    }
    if length > 64 {
        d = emit_copy_at_most_64(dst, d, offset, 60);
        length -= 60;
    }
    emit_copy_at_most_64(dst, d, offset, length)
}

fn emit_copy_at_most_64(dst: &mut [u8], d: usize, offset: usize, length: usize) -> usize {
    debug_assert!(length >= 1 && length <= 64);
    if length >= 4 && length < 12 && offset < 1 << 11 {
        dst[d] = ((offset >> 8) as u8) << 5 | ((length - 4) as u8) << 2 | TAG_COPY_1;
        dst[d + 1] = offset as u8;
        d + 2
    } else {
        dst[d] = ((length - 1) as u8) << 2 | TAG_COPY_2;
        dst[d + 1] = offset as u8;
        dst[d + 2] = (offset >> 8) as u8;
        d + 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SafeMemory;

    fn literal(lit: &[u8]) -> Vec<u8> {
        let mut dst = vec![0; lit.len() + 5];
        let n = emit_literal::<SafeMemory>(&mut dst, 0, lit);
        dst.truncate(n);
        dst
    }

    fn copy(offset: usize, length: usize) -> Vec<u8> {
        let mut dst = vec![0; 32];
        let n = emit_copy(&mut dst, 0, offset, length);
        dst.truncate(n);
        dst
    }

    #[test]
    fn literal_tags() {
        assert_eq!(literal(b"a"), vec![0x00, b'a']);
        assert_eq!(literal(&[7; 60])[0], 59 << 2);
        assert_eq!(&literal(&[7; 61])[..2], &[0xF0, 60]);
        assert_eq!(&literal(&[7; 256])[..2], &[0xF0, 255]);
        assert_eq!(&literal(&[7; 257])[..3], &[0xF4, 0x00, 0x01]);
        assert_eq!(literal(&[7; 300]).len(), 303);
    }

    #[test]
    fn short_copy_uses_two_bytes() {
        // length 11, offset 2047
        assert_eq!(copy(2047, 11), vec![(7 << 5) | (7 << 2) | TAG_COPY_1, 0xff]);
        assert_eq!(copy(5, 4), vec![TAG_COPY_1, 5]);
    }

    #[test]
    fn long_or_far_copy_uses_three_bytes() {
        assert_eq!(copy(2048, 4), vec![(3 << 2) | TAG_COPY_2, 0x00, 0x08]);
        assert_eq!(copy(10, 12), vec![(11 << 2) | TAG_COPY_2, 10, 0]);
        assert_eq!(copy(10, 64), vec![(63 << 2) | TAG_COPY_2, 10, 0]);
    }

    #[test]
    fn long_copy_is_split() {
        // 64 + 4
        assert_eq!(
            copy(100, 68),
            vec![(63 << 2) | TAG_COPY_2, 100, 0, TAG_COPY_1, 100]
        );
        // 60 + 5
        assert_eq!(
            copy(100, 65),
            vec![(59 << 2) | TAG_COPY_2, 100, 0, (1 << 2) | TAG_COPY_1, 100]
        );
        // 64 + 64 + 64 + 4, all far enough to need three bytes
        assert_eq!(copy(3000, 196).len(), 4 * 3);
    }

    #[test]
    fn hash_table_sizes() {
        assert_eq!(hash_table_size(0), 256);
        assert_eq!(hash_table_size(300), 512);
        assert_eq!(hash_table_size(16384), 16384);
        assert_eq!(hash_table_size(32768), 16384);
    }

    #[test]
    fn match_length() {
        let src = b"abcdefghijabcdefghijabcdefXYZ";
        assert_eq!(find_match_length::<SafeMemory>(src, 0, 10, src.len()), 16);
        assert_eq!(find_match_length::<SafeMemory>(src, 0, 20, src.len()), 6);
    }

    #[test]
    fn match_positions_are_hashed() {
        // 24 distinct bytes, the same 24 again, then a distinct tail.
        let mut src: Vec<u8> = (0..24).collect();
        src.extend(0..24u8);
        src.extend(100..130u8);
        let mut table = vec![0u16; hash_table_size(src.len())];
        let mut dst = vec![0; max_compressed_len(src.len())];
        compress_fragment::<SafeMemory>(&src, &mut dst, 0, &mut table);

        let shift = 32 - table.len().trailing_zeros();
        for p in 25..47 {
            let h = hash(SafeMemory::load_u32(&src, p), shift);
            assert_eq!(table[h] as usize, p, "position {}", p);
        }
    }

    #[test]
    fn repeated_input_compresses() {
        let src = vec![b'x'; 1000];
        let out = compress_vec(&src).unwrap();
        assert!(out.len() < 100, "compressed to {} bytes", out.len());
    }

    #[test]
    fn rejects_small_output() {
        let src = [0u8; 100];
        let mut dst = [0u8; 100];
        match compress(&src, &mut dst) {
            Err(Error::BufferTooSmall { given: 100, min }) => {
                assert_eq!(min, max_compressed_len(100))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn hash_table_goes_back_to_pool() {
        let mut encoder = Encoder::new();
        encoder.compress_vec(&[1u8; 5000]).unwrap();
        let table = encoder.pool_mut().allocate_hash_table(1);
        assert_eq!(table.len(), MAX_HASH_TABLE_SIZE);
    }
}
