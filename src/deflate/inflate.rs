use std::io::{self, Read, Write};

use super::bitstream::BitReader;
use super::error::{DeflateError, Result};
use super::huffman::DecodeTable;

const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];
const DIST_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];
const CLEN_ORDER: [usize; 19] =
    [16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15];

fn fixed_literal_lengths() -> Vec<u8> {
    let mut l = vec![0u8; 288];
    for (i, item) in l.iter_mut().enumerate().take(288) {
        *item = match i {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    l
}

fn fixed_distance_lengths() -> Vec<u8> {
    vec![5u8; 30]
}

struct Window {
    buf: Vec<u8>,
}

impl Window {
    fn new() -> Self {
        Self { buf: Vec::new() }
    }

    fn push(&mut self, b: u8, out: &mut impl Write) -> io::Result<()> {
        self.buf.push(b);
        out.write_all(&[b])
    }

    fn copy_match(&mut self, dist: usize, len: usize, out: &mut impl Write) -> Result<()> {
        if dist > self.buf.len() {
            return Err(DeflateError::LongDistance);
        }
        let start = self.buf.len() - dist;
        for k in 0..len {
            let b = self.buf[start + k];
            self.buf.push(b);
            out.write_all(&[b]).map_err(|_| DeflateError::ShortBuffer)?;
        }
        Ok(())
    }
}

/// Decompresses a raw DEFLATE stream (RFC 1951, no zlib/gzip wrapper) from
/// `input` into `output`, returning the number of bytes written.
pub fn inflate<R: Read, W: Write>(input: R, mut output: W) -> Result<u64> {
    let mut reader = BitReader::new(input);
    let mut window = Window::new();
    let mut written = 0u64;

    loop {
        let bfinal = reader.read_bits(1).map_err(|_| DeflateError::NotFinished)?;
        let btype = reader.read_bits(2).map_err(|_| DeflateError::NotFinished)?;

        match btype {
            0 => {
                reader.align_to_byte();
                let len_lo = reader.read_aligned_byte().map_err(|_| DeflateError::ShortBuffer)?;
                let len_hi = reader.read_aligned_byte().map_err(|_| DeflateError::ShortBuffer)?;
                let nlen_lo = reader.read_aligned_byte().map_err(|_| DeflateError::ShortBuffer)?;
                let nlen_hi = reader.read_aligned_byte().map_err(|_| DeflateError::ShortBuffer)?;
                let len = u16::from_le_bytes([len_lo, len_hi]);
                let nlen = u16::from_le_bytes([nlen_lo, nlen_hi]);
                if len != !nlen {
                    return Err(DeflateError::BadLenCheck);
                }
                for _ in 0..len {
                    let b = reader.read_aligned_byte().map_err(|_| DeflateError::ShortBuffer)?;
                    window.push(b, &mut output).map_err(|_| DeflateError::ShortBuffer)?;
                    written += 1;
                }
            }
            1 => {
                let lit = DecodeTable::build(&fixed_literal_lengths())?;
                let dist = DecodeTable::build(&fixed_distance_lengths())?;
                written += inflate_block(&mut reader, &lit, &dist, &mut window, &mut output)?;
            }
            2 => {
                let (lit, dist) = read_dynamic_trees(&mut reader)?;
                written += inflate_block(&mut reader, &lit, &dist, &mut window, &mut output)?;
            }
            _ => return Err(DeflateError::BadBlockType),
        }

        if bfinal == 1 {
            break;
        }
    }

    Ok(written)
}

fn read_dynamic_trees<R: Read>(reader: &mut BitReader<R>) -> Result<(DecodeTable, DecodeTable)> {
    let hlit = reader.read_bits(5).map_err(|_| DeflateError::BadSizeCode)? as usize + 257;
    let hdist = reader.read_bits(5).map_err(|_| DeflateError::BadSizeCode)? as usize + 1;
    let hclen = reader.read_bits(4).map_err(|_| DeflateError::BadSizeCode)? as usize + 4;

    if hlit > 286 || hdist > 30 || hclen > 19 {
        return Err(DeflateError::BadSizeCode);
    }

    let mut cl_lengths = [0u8; 19];
    for i in 0..hclen {
        let v = reader.read_bits(3).map_err(|_| DeflateError::BadSizeCode)?;
        cl_lengths[CLEN_ORDER[i]] = v as u8;
    }
    let cl_table = DecodeTable::build(&cl_lengths)?;

    let total = hlit + hdist;
    let mut lengths = Vec::with_capacity(total);
    while lengths.len() < total {
        let peek = reader.peek_bits(cl_table.max_len().max(1)).map_err(|_| DeflateError::BadTrees)?;
        let (sym, consumed) = cl_table.decode(peek)?;
        reader.consume_bits(consumed as u32);

        match sym {
            0..=15 => lengths.push(sym as u8),
            16 => {
                let prev = *lengths.last().ok_or(DeflateError::BadTrees)?;
                let rep = reader.read_bits(2).map_err(|_| DeflateError::BadTrees)? + 3;
                for _ in 0..rep {
                    lengths.push(prev);
                }
            }
            17 => {
                let rep = reader.read_bits(3).map_err(|_| DeflateError::BadTrees)? + 3;
                for _ in 0..rep {
                    lengths.push(0);
                }
            }
            18 => {
                let rep = reader.read_bits(7).map_err(|_| DeflateError::BadTrees)? + 11;
                for _ in 0..rep {
                    lengths.push(0);
                }
            }
            _ => return Err(DeflateError::BadTrees),
        }
    }

    if lengths.len() != total {
        return Err(DeflateError::BadTrees);
    }

    let lit_lengths = &lengths[..hlit];
    let dist_lengths = &lengths[hlit..];

    let lit = DecodeTable::build(lit_lengths)?;
    let dist = DecodeTable::build(dist_lengths)?;
    Ok((lit, dist))
}

fn inflate_block<R: Read, W: Write>(
    reader: &mut BitReader<R>,
    lit: &DecodeTable,
    dist: &DecodeTable,
    window: &mut Window,
    output: &mut W,
) -> Result<u64> {
    let mut written = 0u64;
    loop {
        let peek = reader.peek_bits(lit.max_len().max(1)).map_err(|_| DeflateError::ShortBuffer)?;
        let (sym, consumed) = lit.decode(peek)?;
        reader.consume_bits(consumed as u32);

        match sym {
            0..=255 => {
                window.push(sym as u8, output).map_err(|_| DeflateError::ShortBuffer)?;
                written += 1;
            }
            256 => break,
            257..=285 => {
                let idx = sym as usize - 257;
                if idx >= LENGTH_BASE.len() {
                    return Err(DeflateError::BadHuffmanCode);
                }
                let extra = reader.read_bits(LENGTH_EXTRA[idx] as u32).map_err(|_| DeflateError::ShortBuffer)?;
                let len = LENGTH_BASE[idx] as usize + extra as usize;

                let dpeek = reader.peek_bits(dist.max_len().max(1)).map_err(|_| DeflateError::ShortBuffer)?;
                let (dsym, dconsumed) = dist.decode(dpeek)?;
                reader.consume_bits(dconsumed as u32);
                let didx = dsym as usize;
                if didx >= DIST_BASE.len() {
                    return Err(DeflateError::BadDistCode);
                }
                let dextra = reader.read_bits(DIST_EXTRA[didx] as u32).map_err(|_| DeflateError::ShortBuffer)?;
                let distance = DIST_BASE[didx] as usize + dextra as usize;

                window.copy_match(distance, len, output)?;
                written += len as u64;
            }
            _ => return Err(DeflateError::BadHuffmanCode),
        }
    }
    Ok(written)
}
