extern crate snappy_codec;

use quickcheck::{QuickCheck, TestResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use snappy_codec::varint::{read_varint, write_varint};
use snappy_codec::{
    compress, compress_vec, decompress, decompress_vec, decompressed_len, max_compressed_len,
    BufferPool, Encoder, Error,
};

fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill(&mut data[..]);
    data
}

// Text-like data with plenty of short repeats.
fn words(len: usize, seed: u64) -> Vec<u8> {
    const WORDS: &[&[u8]] = &[
        b"the ", b"quick ", b"red ", b"fox ", b"jumped ", b"over ", b"lazy ", b"dog ", b"\n",
    ];
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = Vec::with_capacity(len + 8);
    while data.len() < len {
        data.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())]);
    }
    data.truncate(len);
    data
}

fn roundtrip(data: &[u8]) {
    let compressed = compress_vec(data).unwrap();
    assert!(compressed.len() <= max_compressed_len(data.len()));
    assert_eq!(decompressed_len(&compressed).unwrap(), data.len());

    let decompressed = decompress_vec(&compressed).unwrap();
    assert!(decompressed == data, "roundtrip failed for {} bytes", data.len());
}

#[test]
/// Snappy: Roundtrip Uncompressible Data
fn should_do_uncompressible() {
    roundtrip(b"123456789abcdefg");
    roundtrip(b"The quick red fox jumped over the lazy dog");
}

#[test]
/// Snappy: Roundtrip Compressible Data
fn should_do_compressible() {
    roundtrip(b"1111111100000000");
    roundtrip(&[b'a'; 1000]);
    roundtrip(&words(100_000, 7));
}

#[test]
/// Snappy: Test Empty
fn should_do_empty() {
    let a = [];
    roundtrip(&a);
    assert_eq!(compress_vec(&a).unwrap(), vec![0]);
}

#[test]
fn should_do_boundary_lengths() {
    for &len in &[0, 1, 59, 60, 61, 16384, 32768, 32769, 65536] {
        roundtrip(&random_bytes(len, len as u64));
        roundtrip(&words(len, len as u64));
    }
}

#[test]
fn should_do_every_small_length() {
    let text = words(200, 3);
    for len in 0..text.len() {
        roundtrip(&text[..len]);
    }
}

#[test]
fn should_compress_text() {
    let data = words(65536, 11);
    let compressed = compress_vec(&data).unwrap();
    assert!(compressed.len() < data.len() / 2, "{} bytes", compressed.len());
}

#[test]
fn incompressible_input_stays_in_bound() {
    for &len in &[1000, 32768, 100_000] {
        let data = random_bytes(len, 99);
        let compressed = compress_vec(&data).unwrap();
        assert!(compressed.len() <= len + len / 6 + 32);
    }
}

#[test]
fn compress_into_caller_buffer() {
    let data = words(5000, 5);
    let mut dst = vec![0xAA; max_compressed_len(data.len()) + 10];
    let n = compress(&data, &mut dst).unwrap();

    let mut out = vec![0; data.len()];
    assert_eq!(decompress(&dst[..n], &mut out).unwrap(), data.len());
    assert_eq!(out, data);
}

#[test]
fn encoder_with_shared_pool() {
    let mut encoder = Encoder::with_pool(BufferPool::new());
    for seed in 0..4 {
        let data = words(40_000, seed);
        let compressed = encoder.compress_vec(&data).unwrap();
        assert_eq!(decompress_vec(&compressed).unwrap(), data);
    }
}

#[test]
fn copy_offset_before_block_start_is_corrupt() {
    let data = words(1000, 1);
    let mut compressed = compress_vec(&data).unwrap();

    // The first tag after the 2-byte length header is a literal; turn it into
    // a copy of one byte from one byte back, before anything was written.
    assert_eq!(compressed[2] & 0x03, 0x00);
    compressed[2] = 0x02;
    compressed[3] = 1;
    compressed[4] = 0;

    for _ in 0..2 {
        match decompress_vec(&compressed) {
            Err(Error::InvalidCopyOffset { offset: 1, position: 0 }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn truncated_block_reports_both_lengths() {
    let data = words(1000, 2);
    let compressed = compress_vec(&data).unwrap();
    for cut in 1..10 {
        let truncated = &compressed[..compressed.len() - cut];
        match decompress_vec(truncated) {
            Err(Error::LengthMismatch { expected, actual }) => {
                assert_eq!(expected, 1000);
                assert!(actual < 1000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}

#[test]
fn varint_header_sizes() {
    let cases = [
        (0u32, 1usize),
        (127, 1),
        (128, 2),
        (16383, 2),
        (16384, 3),
        (2_097_151, 3),
        (2_097_152, 4),
    ];
    for &(value, len) in &cases {
        let mut buf = [0u8; 5];
        assert_eq!(write_varint(&mut buf, value), len);
        assert_eq!(read_varint(&buf).unwrap(), (value, len));
    }

    // The compressed form of 16384 bytes starts with a 3-byte header.
    let compressed = compress_vec(&[0u8; 16384]).unwrap();
    assert_eq!(&compressed[..3], &[0x80, 0x80, 0x01]);
}

#[test]
fn malformed_varint_is_corrupt() {
    let err = decompress_vec(&[0xff, 0xff, 0xff, 0xff, 0xff, 0x00]).unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn qc_roundtrip() {
    fn p(bytes: Vec<u8>) -> TestResult {
        let compressed = compress_vec(&bytes).unwrap();
        if compressed.len() > max_compressed_len(bytes.len()) {
            return TestResult::failed();
        }
        TestResult::from_bool(decompress_vec(&compressed).unwrap() == bytes)
    }
    QuickCheck::new()
        .tests(1000)
        .quickcheck(p as fn(Vec<u8>) -> TestResult);
}

#[test]
fn qc_decompress_never_panics() {
    fn p(bytes: Vec<u8>) -> bool {
        let _ = decompress_vec(&bytes);
        true
    }
    QuickCheck::new()
        .tests(2000)
        .quickcheck(p as fn(Vec<u8>) -> bool);
}

#[test]
fn huge_declared_length_is_corrupt() {
    let err = decompress_vec(&[0xff, 0xff, 0xff, 0xff, 0x0f, 0x00]).unwrap_err();
    assert!(err.is_corruption());
}
