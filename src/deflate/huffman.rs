use super::error::{DeflateError, Result};

pub const MAX_BITS: usize = 15;

/// A canonical Huffman code: `lengths[symbol]` is the bit length DEFLATE
/// assigns that symbol (0 meaning unused), codes derived per RFC 1951
/// §3.2.2 (shortest codes first, symbols in order within a length).
#[derive(Debug, Clone)]
pub struct CodeTable {
    pub lengths: Vec<u8>,
    codes: Vec<u16>,
}

impl CodeTable {
    pub fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let max_len = lengths.iter().copied().max().unwrap_or(0) as usize;
        if max_len > MAX_BITS {
            return Err(DeflateError::BadTrees);
        }
        let mut bl_count = [0u32; MAX_BITS + 1];
        for &l in lengths {
            if l as usize > MAX_BITS {
                return Err(DeflateError::BadTrees);
            }
            bl_count[l as usize] += 1;
        }
        bl_count[0] = 0;

        let mut next_code = [0u32; MAX_BITS + 2];
        let mut code = 0u32;
        for bits in 1..=max_len {
            code = (code + bl_count[bits - 1]) << 1;
            next_code[bits] = code;
        }

        let mut codes = vec![0u16; lengths.len()];
        for (sym, &len) in lengths.iter().enumerate() {
            if len != 0 {
                let len = len as usize;
                codes[sym] = next_code[len] as u16;
                next_code[len] += 1;
            }
        }

        Ok(Self { lengths: lengths.to_vec(), codes })
    }

    pub fn code_of(&self, symbol: usize) -> (u16, u8) {
        (self.codes[symbol], self.lengths[symbol])
    }
}

/// Flat decode table keyed by `(fast_bits)` lookahead: for every possible
/// bit pattern of the longest code in this tree, records the symbol and
/// how many bits it actually consumed. Built once per block, used for
/// every symbol decode in that block.
pub struct DecodeTable {
    max_len: u32,
    // table[pattern] = (symbol, length) or length 0 for unused patterns.
    table: Vec<(u16, u8)>,
}

impl DecodeTable {
    pub fn build(lengths: &[u8]) -> Result<Self> {
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        if max_len == 0 {
            return Ok(Self { max_len: 0, table: Vec::new() });
        }
        if max_len as usize > MAX_BITS {
            return Err(DeflateError::BadTrees);
        }
        let codes = CodeTable::from_lengths(lengths)?;
        let size = 1usize << max_len;
        let mut table = vec![(0u16, 0u8); size];

        for (sym, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let (code, len) = codes.code_of(sym);
            // Reverse the code's bits: the bitstream is read LSB-first but
            // canonical codes are assigned MSB-first, so the bits must be
            // mirrored before indexing the flat table.
            let rev = reverse_bits(code, len);
            let step = 1usize << len;
            let mut idx = rev as usize;
            while idx < size {
                table[idx] = (sym as u16, len);
                idx += step;
            }
        }

        Ok(Self { max_len: max_len as u32, table })
    }

    pub fn max_len(&self) -> u32 {
        self.max_len
    }

    /// Looks up the symbol for the low `max_len` bits of `bits` (as
    /// returned by a LSB-first peek), returning `(symbol, consumed_bits)`.
    pub fn decode(&self, bits: u32) -> Result<(u16, u8)> {
        let idx = (bits as usize) & ((1usize << self.max_len) - 1);
        let (sym, len) = self.table[idx];
        if len == 0 {
            return Err(DeflateError::BadHuffmanCode);
        }
        Ok((sym, len))
    }
}

fn reverse_bits(code: u16, len: u8) -> u16 {
    let mut c = code;
    let mut r = 0u16;
    for _ in 0..len {
        r = (r << 1) | (c & 1);
        c >>= 1;
    }
    r
}

/// Builds a length-limited canonical Huffman code over `freqs` via
/// package-merge: symbols with zero frequency get length 0 (unused).
/// Guarantees no code exceeds `max_len` bits, unlike a plain Huffman tree
/// which can grow arbitrarily deep on skewed frequency distributions.
pub fn package_merge(freqs: &[u32], max_len: usize) -> Result<Vec<u8>> {
    let n = freqs.len();
    let symbols: Vec<usize> = (0..n).filter(|&i| freqs[i] > 0).collect();

    if symbols.is_empty() {
        return Ok(vec![0u8; n]);
    }
    if symbols.len() == 1 {
        let mut lengths = vec![0u8; n];
        lengths[symbols[0]] = 1;
        return Ok(lengths);
    }

    if (1usize << max_len) < symbols.len() {
        return Err(DeflateError::TreeTooStupid);
    }

    // Package-merge over `2*(symbols.len()-1)` leaf-count target, per the
    // classic coin-collector's formulation (Larmore & Hirschberg).
    #[derive(Clone)]
    struct Package {
        weight: u64,
        members: Vec<usize>,
    }

    let mut leaves: Vec<Package> = symbols
        .iter()
        .map(|&sym| Package { weight: freqs[sym] as u64, members: vec![sym] })
        .collect();
    leaves.sort_by_key(|p| p.weight);

    let mut counts = vec![0u32; n];
    let mut coins: Vec<Package> = leaves.clone();

    for _level in 0..max_len - 1 {
        coins.sort_by_key(|p| p.weight);
        let mut next: Vec<Package> = Vec::new();
        let mut i = 0;
        while i + 1 < coins.len() {
            next.push(Package {
                weight: coins[i].weight + coins[i + 1].weight,
                members: {
                    let mut m = coins[i].members.clone();
                    m.extend_from_slice(&coins[i + 1].members);
                    m
                },
            });
            i += 2;
        }
        coins = leaves.iter().cloned().chain(next.into_iter()).collect();
    }

    coins.sort_by_key(|p| p.weight);
    let take = 2 * (symbols.len() - 1);
    for pkg in coins.into_iter().take(take) {
        for sym in pkg.members {
            counts[sym] += 1;
        }
    }

    let mut lengths = vec![0u8; n];
    for &sym in &symbols {
        let len = counts[sym];
        if len == 0 || len as usize > max_len {
            return Err(DeflateError::TreeTooStupid);
        }
        lengths[sym] = len as u8;
    }

    Ok(lengths)
}
