use std::io;
use std::result;

use thiserror::Error;

pub type Result<T> = result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A copy tag referenced bytes before the start of the block.
    #[error("snappy: invalid copy offset {offset} for opcode at output position {position}")]
    InvalidCopyOffset { offset: usize, position: usize },

    /// The block decoded to a different number of bytes than its header declared.
    #[error("snappy: recorded length is {expected} bytes but actual length after decompression is {actual} bytes")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("snappy: invalid varint length header: {0}")]
    InvalidVarint(&'static str),

    #[error("snappy: corrupt input: {0}")]
    Corrupt(&'static str),

    #[error("snappy: stream does not start with the snappy magic header")]
    InvalidStreamHeader,

    #[error("snappy: invalid block flag {0:#04x}")]
    InvalidBlockFlag(u8),

    #[error("snappy: invalid block length {0}")]
    InvalidBlockLength(usize),

    #[error("snappy: block checksum {actual:#010x} does not match recorded checksum {expected:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("snappy: unexpected end of input in {0}")]
    UnexpectedEof(&'static str),

    #[error("snappy: stream is closed")]
    Closed,

    /// The output buffer cannot hold the result of the operation.
    #[error("snappy: output buffer (size = {given}) is smaller than required (size = {min})")]
    BufferTooSmall { given: usize, min: usize },

    #[error("snappy: input buffer (size = {given}) is larger than allowed (size = {max})")]
    TooBig { given: usize, max: usize },

    #[error("snappy: I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// True for errors caused by damaged compressed data.
    pub fn is_corruption(&self) -> bool {
        match *self {
            Error::InvalidCopyOffset { .. }
            | Error::LengthMismatch { .. }
            | Error::InvalidVarint(_)
            | Error::Corrupt(_) => true,
            _ => false,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> io::Error {
        match err {
            Error::Io(inner) => inner,
            Error::UnexpectedEof(_) => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            Error::BufferTooSmall { .. } | Error::TooBig { .. } => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            Error::Closed => io::Error::new(io::ErrorKind::Other, err),
            _ => io::Error::new(io::ErrorKind::InvalidData, err),
        }
    }
}
