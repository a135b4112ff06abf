use std::fmt;

/// The failure taxonomy a DEFLATE stream can raise, named after the
/// specific malformed-input condition rather than grouped into one generic
/// "corrupt data" error — callers (notably the HTTP layer deciding between
/// a 400 and a 502) care which side produced the bad bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeflateError {
    /// Output or input buffer ran out before the stream said it should.
    ShortBuffer,
    /// A back-reference distance pointed further back than any byte this
    /// stream has produced.
    LongDistance,
    /// The 2-bit block type field held the reserved value `11`.
    BadBlockType,
    /// A stored block's `LEN`/`NLEN` one's-complement pair didn't match.
    BadLenCheck,
    /// A dynamic block's `HLIT`/`HDIST`/`HCLEN` counts were out of range.
    BadSizeCode,
    /// A decoded distance code had no matching base/extra-bits entry.
    BadDistCode,
    /// A Huffman code did not resolve to any symbol (invalid bit pattern).
    BadHuffmanCode,
    /// The code-length alphabet failed to describe a valid canonical tree.
    BadTrees,
    /// Package-merge produced a tree exceeding the maximum code length.
    TreeTooStupid,
    /// Input ended mid-block with no final-block marker seen.
    NotFinished,
}

impl fmt::Display for DeflateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            DeflateError::ShortBuffer => "short buffer",
            DeflateError::LongDistance => "back-reference distance too long",
            DeflateError::BadBlockType => "invalid block type",
            DeflateError::BadLenCheck => "stored block length check failed",
            DeflateError::BadSizeCode => "invalid dynamic block size header",
            DeflateError::BadDistCode => "invalid distance code",
            DeflateError::BadHuffmanCode => "invalid huffman code",
            DeflateError::BadTrees => "invalid huffman tree description",
            DeflateError::TreeTooStupid => "huffman tree exceeds maximum code length",
            DeflateError::NotFinished => "stream ended before final block",
        };
        write!(f, "{msg}")
    }
}

impl std::error::Error for DeflateError {}

pub type Result<T> = std::result::Result<T, DeflateError>;
