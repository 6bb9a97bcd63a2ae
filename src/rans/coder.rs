//! Implements the rANS encoder/decoder pair as a single stateful object.
use crate::error::{validate_cdf, validate_symbol, CodecError};
use crate::rans::L;

/// A rANS coder: a single 32-bit state `x` plus a stack of renormalization
/// words.
///
/// `encode` pushes onto the word stack as it renormalizes; `decode` pops
/// from the same stack. This makes the object usable interactively — encode
/// a run of symbols, then decode them back in reverse order, without ever
/// calling [`RansCoder::flush`] — or as a conventional one-shot encoder
/// whose `flush`ed byte stream is later handed to a fresh decoder built with
/// [`RansCoder::from_stream`].
pub struct RansCoder {
    x: u32,
    /// Renormalization words, in the order they were pushed by `encode`.
    /// `decode` pops from the back, consuming them in reverse.
    words: Vec<u16>,
    /// Set once `flush` has been called; forbids further `encode` calls.
    flushed: bool,
    /// Bytes produced by the most recent `flush`, independent of any
    /// `words`/`x` mutation a later `decode` performs.
    finalized_bytes: Vec<u8>,
}

impl Default for RansCoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RansCoder {
    /// Creates a new coder in the normalized initial state `x = L`, ready to
    /// encode.
    pub fn new() -> Self {
        Self {
            x: L,
            words: Vec::new(),
            flushed: false,
            finalized_bytes: Vec::new(),
        }
    }

    /// Reconstructs a decode-only coder from a stream produced by
    /// [`RansCoder::bit_stream`].
    ///
    /// The final four bytes seed `x`; the remaining bytes become the word
    /// stack, read back in the order `decode` needs them. The result is
    /// already in the closed phase: `encode` on it is rejected.
    pub fn from_stream(stream: &[u8]) -> Result<Self, CodecError> {
        if stream.len() < 4 {
            return Err(CodecError::StreamCorrupt);
        }
        let (words_bytes, x_bytes) = stream.split_at(stream.len() - 4);
        let x = u32::from_be_bytes([x_bytes[0], x_bytes[1], x_bytes[2], x_bytes[3]]);
        if words_bytes.len() % 2 != 0 {
            return Err(CodecError::StreamCorrupt);
        }
        let words = words_bytes
            .chunks_exact(2)
            .map(|w| u16::from_be_bytes([w[0], w[1]]))
            .collect();
        Ok(Self {
            x,
            words,
            flushed: true,
            finalized_bytes: Vec::new(),
        })
    }

    /// The number of renormalization words pushed so far.
    pub fn words_written(&self) -> u64 {
        self.words.len() as u64
    }

    /// Resets the coder to its initial encoding state, discarding any
    /// pending words and clearing the flushed/closed phase.
    pub fn reset(&mut self) {
        self.x = L;
        self.words.clear();
        self.flushed = false;
        self.finalized_bytes.clear();
    }

    /// Encodes a single symbol against `cdf` at the given `precision`.
    pub fn encode(&mut self, symbol: i32, cdf: &[i32], precision: u8) -> Result<(), CodecError> {
        let k = validate_cdf(cdf, precision)?;
        if self.flushed {
            return Err(CodecError::UseAfterFlush);
        }
        let s = validate_symbol(symbol, cdf, k)?;
        self.encode_validated(s, cdf, precision);
        Ok(())
    }

    /// Encodes every symbol in `symbols` against the same shared `cdf`.
    pub fn encode_nx1(
        &mut self,
        symbols: &[i32],
        cdf: &[i32],
        precision: u8,
    ) -> Result<(), CodecError> {
        let k = validate_cdf(cdf, precision)?;
        if self.flushed {
            return Err(CodecError::UseAfterFlush);
        }
        for &symbol in symbols {
            let s = validate_symbol(symbol, cdf, k)?;
            self.encode_validated(s, cdf, precision);
        }
        Ok(())
    }

    /// Encodes every symbol in `symbols` against its own row of `cdfs`.
    ///
    /// `cdfs` is a contiguous matrix with row stride `K + 1`.
    pub fn encode_nxn(
        &mut self,
        symbols: &[i32],
        cdfs: &[i32],
        precision: u8,
    ) -> Result<(), CodecError> {
        if self.flushed {
            return Err(CodecError::UseAfterFlush);
        }
        if symbols.is_empty() {
            return Ok(());
        }
        if cdfs.len() % symbols.len() != 0 {
            return Err(CodecError::LengthMismatch {
                expected: symbols.len(),
                actual: cdfs.len(),
            });
        }
        let row_len = cdfs.len() / symbols.len();
        for (i, &symbol) in symbols.iter().enumerate() {
            let row = &cdfs[i * row_len..(i + 1) * row_len];
            let k = validate_cdf(row, precision)?;
            let s = validate_symbol(symbol, row, k)?;
            self.encode_validated(s, row, precision);
        }
        Ok(())
    }

    /// Encodes symbol index `s` (already validated against `cdf`).
    fn encode_validated(&mut self, s: usize, cdf: &[i32], precision: u8) {
        let freq = (cdf[s + 1] - cdf[s]) as u64;
        let cum = cdf[s] as u64;

        let threshold = ((L as u64 >> precision) << 16) * freq;
        while u64::from(self.x) >= threshold {
            self.words.push(self.x as u16);
            self.x >>= 16;
        }

        let x64 = u64::from(self.x);
        self.x = (((x64 / freq) << precision) + (x64 % freq) + cum) as u32;
    }

    /// Decodes a single symbol against `cdf` at the given `precision`, given
    /// an alphabet size of `k`.
    ///
    /// Returns [`CodecError::StreamCorrupt`] if renormalization needs a word
    /// and the stack is already empty.
    pub fn decode(&mut self, k: u32, cdf: &[i32], precision: u8) -> Result<i32, CodecError> {
        let declared_k = validate_cdf(cdf, precision)?;
        debug_assert_eq!(declared_k, k);

        let mask = (1_u32 << precision) - 1;
        let slot = (self.x & mask) as i32;
        let s = find_symbol(cdf, slot, k);

        let freq = (cdf[s as usize + 1] - cdf[s as usize]) as u64;
        let cum = cdf[s as usize] as u64;

        let x64 = u64::from(self.x);
        self.x = (freq * (x64 >> precision) + u64::from(slot as u32) - cum) as u32;

        self.renormalize()?;
        Ok(s as i32)
    }

    /// Decodes `out.len()` symbols against the same shared `cdf`.
    pub fn decode_nx1(
        &mut self,
        k: u32,
        cdf: &[i32],
        precision: u8,
        out: &mut [i32],
    ) -> Result<(), CodecError> {
        for slot in out.iter_mut() {
            *slot = self.decode(k, cdf, precision)?;
        }
        Ok(())
    }

    /// Decodes `out.len()` symbols, each against its own row of `cdfs`.
    ///
    /// `cdfs` is a contiguous matrix with row stride `k + 1`; its length
    /// must equal `out.len() * (k + 1)`.
    pub fn decode_nxn(
        &mut self,
        k: u32,
        cdfs: &[i32],
        precision: u8,
        out: &mut [i32],
    ) -> Result<(), CodecError> {
        let row_len = (k + 1) as usize;
        let expected = out.len() * row_len;
        if cdfs.len() != expected {
            return Err(CodecError::LengthMismatch {
                expected,
                actual: cdfs.len(),
            });
        }
        for (i, slot) in out.iter_mut().enumerate() {
            let row = &cdfs[i * row_len..(i + 1) * row_len];
            *slot = self.decode(k, row, precision)?;
        }
        Ok(())
    }

    /// Pulls words back into `x` while it sits below the normalized range.
    fn renormalize(&mut self) -> Result<(), CodecError> {
        while self.x < L {
            let word = self.words.pop().ok_or(CodecError::StreamCorrupt)?;
            self.x = (self.x << 16) | u32::from(word);
        }
        Ok(())
    }

    /// Finalizes the current state into a byte stream: every pushed
    /// renormalization word (big-endian, in push order), followed by the
    /// current `x` (four bytes, big-endian).
    ///
    /// Forbids further `encode` calls, but not further `decode` calls — the
    /// live word stack and `x` are untouched by this call, so interactive
    /// decoding may continue after a `flush` taken only to snapshot the
    /// stream so far.
    pub fn flush(&mut self) -> Result<(), CodecError> {
        let mut bytes = Vec::with_capacity(self.words.len() * 2 + 4);
        for word in &self.words {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes.extend_from_slice(&self.x.to_be_bytes());
        self.finalized_bytes = bytes;
        self.flushed = true;
        Ok(())
    }

    /// The byte stream produced by the most recent `flush`.
    ///
    /// Empty until `flush` has been called at least once.
    pub fn bit_stream(&self) -> &[u8] {
        &self.finalized_bytes
    }
}

/// Finds `s` such that `cdf[s] <= slot < cdf[s+1]`, for `s in [0, k)`.
fn find_symbol(cdf: &[i32], slot: i32, k: u32) -> u32 {
    for s in 0..k {
        if slot < cdf[s as usize + 1] {
            return s;
        }
    }
    k - 1
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    const CDF: [i32; 6] = [0, 13107, 26214, 39321, 52428, 65536];

    #[test]
    fn test_single_symbol_round_trips_via_flush() {
        let mut enc = RansCoder::new();
        for s in [0, 1, 2, 3, 4] {
            enc.encode(s, &CDF, 16).unwrap();
        }
        enc.flush().unwrap();

        let mut dec = RansCoder::from_stream(enc.bit_stream()).unwrap();
        for s in [4, 3, 2, 1, 0] {
            assert_eq!(dec.decode(5, &CDF, 16).unwrap(), s);
        }
    }

    #[test]
    fn test_interactive_mode_without_flush() {
        let mut coder = RansCoder::new();
        coder.encode(3, &CDF, 16).unwrap();
        coder.encode(1, &CDF, 16).unwrap();

        assert_eq!(coder.decode(5, &CDF, 16).unwrap(), 1);
        assert_eq!(coder.decode(5, &CDF, 16).unwrap(), 3);
    }

    #[test]
    fn test_encode_after_decode_is_rejected_until_reset() {
        let mut coder = RansCoder::new();
        coder.encode(3, &CDF, 16).unwrap();
        coder.decode(5, &CDF, 16).unwrap();
        assert_eq!(coder.encode(1, &CDF, 16), Err(CodecError::UseAfterFlush));

        coder.reset();
        coder.encode(1, &CDF, 16).unwrap();
    }

    #[test]
    fn test_encode_after_flush_is_rejected() {
        let mut enc = RansCoder::new();
        enc.encode(0, &CDF, 16).unwrap();
        enc.flush().unwrap();
        assert_eq!(enc.encode(0, &CDF, 16), Err(CodecError::UseAfterFlush));
    }

    #[test]
    fn test_encode_nxn_with_empty_symbols_after_flush_is_rejected() {
        let mut enc = RansCoder::new();
        enc.flush().unwrap();
        assert_eq!(
            enc.encode_nxn(&[], &[], 16),
            Err(CodecError::UseAfterFlush)
        );
    }

    #[test]
    fn test_decode_continues_after_flush_snapshot() {
        let mut coder = RansCoder::new();
        coder.encode(3, &CDF, 16).unwrap();
        coder.encode(1, &CDF, 16).unwrap();
        coder.flush().unwrap();

        assert_eq!(coder.decode(5, &CDF, 16).unwrap(), 1);
        assert_eq!(coder.decode(5, &CDF, 16).unwrap(), 3);
    }

    #[test]
    fn test_decode_on_exhausted_stream_is_stream_corrupt() {
        let mut enc = RansCoder::new();
        enc.encode(2, &CDF, 16).unwrap();
        enc.flush().unwrap();

        let mut dec = RansCoder::from_stream(enc.bit_stream()).unwrap();
        assert_eq!(dec.decode(5, &CDF, 16).unwrap(), 2);
        assert_eq!(dec.decode(5, &CDF, 16), Err(CodecError::StreamCorrupt));
    }

    #[test]
    fn test_from_stream_rejects_too_short_buffer() {
        assert_eq!(
            RansCoder::from_stream(&[0, 1, 2]),
            Err(CodecError::StreamCorrupt)
        );
    }

    #[test]
    fn test_batch_nx1_round_trips() {
        let symbols: Vec<i32> = (0..500).map(|i| i % 5).collect();
        let mut enc = RansCoder::new();
        enc.encode_nx1(&symbols, &CDF, 16).unwrap();
        enc.flush().unwrap();

        let mut dec = RansCoder::from_stream(enc.bit_stream()).unwrap();
        let mut out = vec![0_i32; symbols.len()];
        dec.decode_nx1(5, &CDF, 16, &mut out).unwrap();
        let expected: Vec<i32> = symbols.iter().rev().copied().collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_batch_nxn_matches_nx1_stream() {
        let symbols: Vec<i32> = (0..300).map(|i| i % 5).collect();
        let cdfs: Vec<i32> = symbols.iter().flat_map(|_| CDF.iter().copied()).collect();

        let mut enc_nx1 = RansCoder::new();
        enc_nx1.encode_nx1(&symbols, &CDF, 16).unwrap();
        enc_nx1.flush().unwrap();

        let mut enc_nxn = RansCoder::new();
        enc_nxn.encode_nxn(&symbols, &cdfs, 16).unwrap();
        enc_nxn.flush().unwrap();

        assert_eq!(enc_nx1.bit_stream(), enc_nxn.bit_stream());

        let mut dec = RansCoder::from_stream(enc_nxn.bit_stream()).unwrap();
        let mut out = vec![0_i32; symbols.len()];
        dec.decode_nxn(5, &cdfs, 16, &mut out).unwrap();
        let expected: Vec<i32> = symbols.iter().rev().copied().collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_decode_nxn_rejects_length_mismatch() {
        let mut enc = RansCoder::new();
        enc.encode(0, &CDF, 16).unwrap();
        enc.flush().unwrap();
        let mut dec = RansCoder::from_stream(enc.bit_stream()).unwrap();
        let cdfs: Vec<i32> = CDF.to_vec();
        let mut out = vec![0_i32; 2];
        assert_eq!(
            dec.decode_nxn(5, &cdfs, 16, &mut out),
            Err(CodecError::LengthMismatch {
                expected: 12,
                actual: 6
            })
        );
    }

    #[test]
    fn test_random_round_trip() {
        use nanorand::Rng;
        let mut rng = nanorand::WyRand::new_seed(99);
        let symbols: Vec<i32> = (0..3000)
            .map(|_| rng.generate_range(0_u32..5) as i32)
            .collect();

        let mut enc = RansCoder::new();
        for &s in &symbols {
            enc.encode(s, &CDF, 16).unwrap();
        }
        enc.flush().unwrap();

        let mut dec = RansCoder::from_stream(enc.bit_stream()).unwrap();
        for &s in symbols.iter().rev() {
            assert_eq!(dec.decode(5, &CDF, 16).unwrap(), s);
        }
    }

    #[test]
    fn test_max_alphabet_at_max_precision_round_trips() {
        let k: usize = 1 << 16;
        let mut cdf = vec![0_i32; k + 1];
        for (i, slot) in cdf.iter_mut().enumerate() {
            *slot = i as i32;
        }

        let symbols = [0_i32, 1, 2, k as i32 - 1, k as i32 / 2];
        let mut enc = RansCoder::new();
        for &s in &symbols {
            enc.encode(s, &cdf, 16).unwrap();
        }
        enc.flush().unwrap();

        let mut dec = RansCoder::from_stream(enc.bit_stream()).unwrap();
        for &s in symbols.iter().rev() {
            assert_eq!(dec.decode(k as u32, &cdf, 16).unwrap(), s);
        }
    }

    #[test]
    fn test_words_written_counts_renormalization_pushes() {
        let mut enc = RansCoder::new();
        assert_eq!(enc.words_written(), 0);
        for _ in 0..100 {
            enc.encode(2, &CDF, 16).unwrap();
        }
        assert!(enc.words_written() > 0);
    }
}
