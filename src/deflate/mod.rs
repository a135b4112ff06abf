//! A self-contained RFC 1951 DEFLATE codec: LZ77 match finding, canonical
//! Huffman coding with length-limited (package-merge) code construction on
//! the encode side, and a symbol-at-a-time state machine on the decode
//! side. Used for response body compression and by the standalone
//! `deflate` binary; carries no dependency on any compression crate.

mod bitstream;
mod deflate;
mod error;
mod huffman;
mod inflate;
mod lz77;

pub use deflate::deflate;
pub use error::{DeflateError, Result};
pub use inflate::inflate;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(data: &[u8]) {
        let mut compressed = Vec::new();
        deflate(Cursor::new(data), &mut compressed).expect("deflate failed");

        let mut decompressed = Vec::new();
        inflate(Cursor::new(&compressed), &mut decompressed).expect("inflate failed");

        assert_eq!(decompressed, data);
    }

    #[test]
    fn empty_input() {
        roundtrip(b"");
    }

    #[test]
    fn short_literal_run() {
        roundtrip(b"hello, world");
    }

    #[test]
    fn highly_repetitive() {
        roundtrip(&b"abcabcabcabcabcabcabcabcabcabc".repeat(50));
    }

    #[test]
    fn all_same_byte() {
        roundtrip(&vec![b'z'; 10_000]);
    }

    #[test]
    fn random_looking_bytes() {
        let mut data = Vec::with_capacity(4096);
        let mut x: u32 = 0x12345678;
        for _ in 0..4096 {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            data.push((x & 0xff) as u8);
        }
        roundtrip(&data);
    }

    #[test]
    fn spans_multiple_blocks() {
        let mut data = Vec::new();
        for i in 0..200_000u32 {
            data.push((i % 251) as u8);
        }
        roundtrip(&data);
    }

    #[test]
    fn rejects_truncated_stream() {
        let mut compressed = Vec::new();
        deflate(Cursor::new(b"some data to compress" as &[u8]), &mut compressed).unwrap();
        compressed.truncate(compressed.len() / 2);

        let mut out = Vec::new();
        let err = inflate(Cursor::new(&compressed), &mut out).unwrap_err();
        assert!(matches!(
            err,
            DeflateError::ShortBuffer | DeflateError::NotFinished | DeflateError::BadHuffmanCode
        ));
    }
}
