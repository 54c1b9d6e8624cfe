#[macro_use]
extern crate log;

// Definitions
mod definitions {

    //
    // Each encoded block begins with the varint-encoded length of the decoded data,
    // followed by a sequence of chunks. Chunks begin and end on byte boundaries.
    // The first byte of each chunk is broken into its 2 least and 6 most
    // significant bits called l and m: l ranges in [0, 4) and m ranges in
    // [0, 64). l is the chunk tag.
    // Zero means a literal tag. All other values mean a copy tag.
    //
    // For literal tags:
    // - If m < 60, the next 1 + m bytes are literal bytes.
    // - Otherwise, let n be the little-endian unsigned integer denoted by the next
    // m - 59 bytes. The next 1 + n bytes after that are literal bytes.
    //
    // For copy tags, length bytes are copied from offset bytes ago, in the style of
    // Lempel-Ziv compression algorithms. In particular:
    // - For l == 1, the offset ranges in [0, 1<<11) and the length in [4, 12).
    // The length is 4 + the low 3 bits of m. The high 3 bits of m form bits 8-10
    // of the offset. The next byte is bits 0-7 of the offset.
    // - For l == 2, the offset ranges in [0, 1<<16) and the length in [1, 65).
    // The length is 1 + m. The offset is the little-endian unsigned integer
    // denoted by the next 2 bytes.
    // - For l == 3, the length is 1 + m and the offset is the little-endian
    // unsigned integer denoted by the next 4 bytes. Only ever decoded.
    //
    pub const TAG_LITERAL: u8 = 0x00;
    pub const TAG_COPY_1: u8 = 0x01;
    pub const TAG_COPY_2: u8 = 0x02;

    // Input is compressed in independent fragments of this size, and framed
    // streams never carry a block larger than this.
    pub const MAX_BLOCK_SIZE: usize = 1 << 15;

    // The length header is a varint of at most 32 bits.
    pub const MAX_INPUT_SIZE: usize = ::std::u32::MAX as usize;

    // Framed streams start with this, and may repeat it between blocks.
    pub const MAGIC_HEADER: [u8; 7] = *b"snappy\0";

    // flag (1), length (2, big-endian), masked crc32c (4, big-endian)
    pub const BLOCK_HEADER_SIZE: usize = 7;

    pub const FLAG_UNCOMPRESSED: u8 = 0x00;
    pub const FLAG_COMPRESSED: u8 = 0x01;
}

pub mod crc32c;
pub mod error;
pub mod memory;
pub mod pool;
pub mod varint;

// Snappy Compressor
mod compress;
pub use self::compress::{compress, compress_vec, max_compressed_len, Compressor, Encoder};

// Snappy Decompressor
mod decompress;
pub use self::decompress::{decompress, decompress_vec, decompressed_len, Decoder, Decompressor};

pub use self::definitions::{MAGIC_HEADER, MAX_BLOCK_SIZE};
pub use self::error::{Error, Result};
pub use self::pool::BufferPool;
