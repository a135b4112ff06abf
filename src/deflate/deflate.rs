use std::io::{self, Read, Write};

use super::bitstream::BitWriter;
use super::error::Result;
use super::huffman::{package_merge, CodeTable};
use super::lz77::{self, Token};

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

/// Input is chunked into blocks no larger than this before a fresh pair of
/// dynamic Huffman trees is emitted, bounding how stale a block's symbol
/// statistics can get on long streams.
const BLOCK_SIZE: usize = 1 << 16;

fn length_code(len: usize) -> (usize, u16, u8) {
    let mut idx = LENGTH_BASE.len() - 1;
    for (i, &base) in LENGTH_BASE.iter().enumerate() {
        if base as usize <= len {
            idx = i;
        } else {
            break;
        }
    }
    let extra_bits = LENGTH_EXTRA[idx];
    let extra_val = (len - LENGTH_BASE[idx] as usize) as u16;
    (257 + idx, extra_val, extra_bits)
}

fn dist_code(dist: usize) -> (usize, u16, u8) {
    let mut idx = DIST_BASE.len() - 1;
    for (i, &base) in DIST_BASE.iter().enumerate() {
        if base as usize <= dist {
            idx = i;
        } else {
            break;
        }
    }
    let extra_bits = DIST_EXTRA[idx];
    let extra_val = (dist - DIST_BASE[idx] as usize) as u16;
    (idx, extra_val, extra_bits)
}

fn write_code<W: Write>(w: &mut BitWriter<W>, table: &CodeTable, symbol: usize) -> io::Result<()> {
    let (code, len) = table.code_of(symbol);
    // Canonical codes are assigned MSB-first; the bitstream wants them
    // written LSB-first, so reverse before handing to the bit writer.
    let mut rev = 0u32;
    let mut c = code as u32;
    for _ in 0..len {
        rev = (rev << 1) | (c & 1);
        c >>= 1;
    }
    w.write_bits(rev, len as u32)
}

fn write_code_lengths<W: Write>(
    w: &mut BitWriter<W>,
    cl_table: &CodeTable,
    lengths: &[u8],
) -> io::Result<()> {
    let mut i = 0;
    while i < lengths.len() {
        let val = lengths[i];
        let mut run = 1;
        while i + run < lengths.len() && lengths[i + run] == val && run < 138 {
            run += 1;
        }

        if val == 0 {
            let mut rem = run;
            while rem >= 11 {
                let take = rem.min(138);
                write_code(w, cl_table, 18)?;
                w.write_bits((take - 11) as u32, 7)?;
                rem -= take;
            }
            while rem >= 3 {
                let take = rem.min(10);
                write_code(w, cl_table, 17)?;
                w.write_bits((take - 3) as u32, 3)?;
                rem -= take;
            }
            for _ in 0..rem {
                write_code(w, cl_table, 0)?;
            }
        } else {
            write_code(w, cl_table, val as usize)?;
            let mut rem = run - 1;
            while rem >= 3 {
                let take = rem.min(6);
                write_code(w, cl_table, 16)?;
                w.write_bits((take - 3) as u32, 2)?;
                rem -= take;
            }
            for _ in 0..rem {
                write_code(w, cl_table, val as usize)?;
            }
        }
        i += run;
    }
    Ok(())
}

fn build_cl_table(lit_lengths: &[u8], dist_lengths: &[u8]) -> (CodeTable, Vec<u8>, Vec<u8>) {
    let combined: Vec<u8> = lit_lengths.iter().chain(dist_lengths.iter()).copied().collect();
    let mut freqs = [0u32; 19];
    let mut i = 0;
    while i < combined.len() {
        let val = combined[i];
        let mut run = 1;
        while i + run < combined.len() && combined[i + run] == val && run < 138 {
            run += 1;
        }
        if val == 0 && run >= 3 {
            freqs[if run >= 11 { 18 } else { 17 }] += 1;
        } else if val != 0 && run >= 4 {
            freqs[val as usize] += 1;
            freqs[16] += 1;
        } else {
            freqs[val as usize] += run as u32;
        }
        i += run;
    }
    let cl_lengths = package_merge(&freqs, 7).expect("code-length alphabet never exceeds 7 bits");
    let table = CodeTable::from_lengths(&cl_lengths).expect("cl code always valid");
    (table, cl_lengths.to_vec(), combined)
}

fn encode_block<W: Write>(w: &mut BitWriter<W>, chunk: &[u8], is_final: bool) -> io::Result<()> {
    let tokens = lz77::tokenize(chunk);

    let mut lit_freqs = [0u32; 286];
    let mut dist_freqs = [0u32; 30];
    lit_freqs[256] = 1; // end-of-block symbol always present

    for tok in &tokens {
        match *tok {
            Token::Literal(b) => lit_freqs[b as usize] += 1,
            Token::Match { len, dist } => {
                let (lsym, _, _) = length_code(len as usize);
                lit_freqs[lsym] += 1;
                let (dsym, _, _) = dist_code(dist as usize);
                dist_freqs[dsym] += 1;
            }
        }
    }
    if dist_freqs.iter().all(|&f| f == 0) {
        dist_freqs[0] = 1;
    }

    let lit_lengths = package_merge(&lit_freqs, 15).expect("286 symbols always fit in a 15-bit code");
    let dist_lengths = package_merge(&dist_freqs, 15).expect("30 symbols always fit in a 15-bit code");

    let lit_table = CodeTable::from_lengths(&lit_lengths).expect("lit code always valid");
    let dist_table = CodeTable::from_lengths(&dist_lengths).expect("dist code always valid");

    let hlit = lit_lengths.iter().rposition(|&l| l != 0).map(|i| i + 1).unwrap_or(257).max(257);
    let hdist = dist_lengths.iter().rposition(|&l| l != 0).map(|i| i + 1).unwrap_or(1).max(1);

    let (cl_table, cl_lengths, combined) = build_cl_table(&lit_lengths[..hlit], &dist_lengths[..hdist]);
    let hclen = {
        let mut last = CLEN_ORDER.len();
        while last > 4 && cl_lengths[CLEN_ORDER[last - 1]] == 0 {
            last -= 1;
        }
        last
    };

    w.write_bits(is_final as u32, 1)?;
    w.write_bits(2, 2)?; // dynamic Huffman block

    w.write_bits((hlit - 257) as u32, 5)?;
    w.write_bits((hdist - 1) as u32, 5)?;
    w.write_bits((hclen - 4) as u32, 4)?;

    for &idx in CLEN_ORDER.iter().take(hclen) {
        w.write_bits(cl_lengths[idx] as u32, 3)?;
    }

    write_code_lengths(w, &cl_table, &combined)?;

    for tok in &tokens {
        match *tok {
            Token::Literal(b) => write_code(w, &lit_table, b as usize)?,
            Token::Match { len, dist } => {
                let (lsym, lextra_val, lextra_bits) = length_code(len as usize);
                write_code(w, &lit_table, lsym)?;
                if lextra_bits > 0 {
                    w.write_bits(lextra_val as u32, lextra_bits as u32)?;
                }
                let (dsym, dextra_val, dextra_bits) = dist_code(dist as usize);
                write_code(w, &dist_table, dsym)?;
                if dextra_bits > 0 {
                    w.write_bits(dextra_val as u32, dextra_bits as u32)?;
                }
            }
        }
    }
    write_code(w, &lit_table, 256)
}

/// Compresses `input` into a raw DEFLATE stream (RFC 1951, no zlib/gzip
/// wrapper) written to `output`, chunking the input into `BLOCK_SIZE`
/// pieces so each gets its own freshly fitted dynamic Huffman tree.
pub fn deflate<R: Read, W: Write>(mut input: R, output: W) -> Result<()> {
    let mut data = Vec::new();
    input.read_to_end(&mut data).map_err(|_| super::error::DeflateError::ShortBuffer)?;

    let mut w = BitWriter::new(output);

    if data.is_empty() {
        encode_block(&mut w, &[], true).map_err(|_| super::error::DeflateError::ShortBuffer)?;
    } else {
        let chunks: Vec<&[u8]> = data.chunks(BLOCK_SIZE).collect();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.into_iter().enumerate() {
            encode_block(&mut w, chunk, i == last).map_err(|_| super::error::DeflateError::ShortBuffer)?;
        }
    }

    w.finish().map_err(|_| super::error::DeflateError::ShortBuffer)?;
    Ok(())
}
