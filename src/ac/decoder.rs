//! Implements the arithmetic decoder.
use crate::ac::{SECOND, TOP, WORKING_BITS};
use crate::bitstream::BitReader;
use crate::error::{validate_cdf, CodecError};

/// The arithmetic decoder.
///
/// Mirrors `AcEncoder`: it maintains the same `[low, high)` interval, plus a
/// sliding `value` register loaded from the input stream, and recovers
/// symbols by locating `value` within the caller's CDF.
pub struct AcDecoder<'d> {
    low: u32,
    high: u32,
    value: u32,
    reader: BitReader<'d>,
}

impl<'d> AcDecoder<'d> {
    /// Constructs a decoder over a finalized stream produced by `AcEncoder`.
    pub fn new(stream: &'d [u8]) -> Self {
        let mut reader = BitReader::new(stream);
        let mut value: u32 = 0;
        for _ in 0..WORKING_BITS {
            value = (value << 1) | u32::from(reader.read_bit());
        }
        Self {
            low: 0,
            high: u32::MAX,
            value,
            reader,
        }
    }

    /// The number of bits consumed from the stream so far.
    pub fn bits_read(&self) -> u64 {
        self.reader.bits_read()
    }

    /// Decodes a single symbol against `cdf` at `precision`, given an
    /// alphabet size of `k` symbols.
    pub fn decode(&mut self, k: u32, cdf: &[i32], precision: u8) -> Result<i32, CodecError> {
        validate_cdf(cdf, precision)?;
        let s = self.decode_validated(k, cdf, precision);
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

    /// Decodes one symbol, returning its index (not yet cast to `i32`).
    fn decode_validated(&mut self, k: u32, cdf: &[i32], precision: u8) -> u32 {
        let range = u64::from(self.high) - u64::from(self.low) + 1;
        let numerator = (u64::from(self.value) - u64::from(self.low) + 1) * (1_u64 << precision) - 1;
        let scaled = (numerator / range) as i32;

        let s = find_symbol(cdf, scaled, k);

        let cdf_lo = cdf[s as usize] as u64;
        let cdf_hi = cdf[s as usize + 1] as u64;
        self.high = self.low + ((range * cdf_hi) >> precision) as u32 - 1;
        self.low += ((range * cdf_lo) >> precision) as u32;

        self.renormalize();
        s
    }

    /// Renormalizes identically to the encoder, except bits are read in
    /// from the stream rather than written out.
    fn renormalize(&mut self) {
        loop {
            if self.high < TOP {
                self.low <<= 1;
                self.high = (self.high << 1) | 1;
            } else if self.low >= TOP {
                self.low = (self.low - TOP) << 1;
                self.high = ((self.high - TOP) << 1) | 1;
            } else if self.low >= SECOND && self.high < TOP + SECOND {
                self.low = (self.low - SECOND) << 1;
                self.high = ((self.high - SECOND) << 1) | 1;
            } else {
                break;
            }
            self.value = (self.value << 1) | u32::from(self.reader.read_bit());
        }
    }
}

/// Finds `s` such that `cdf[s] <= scaled < cdf[s+1]`, for `s in [0, k)`.
///
/// A linear scan is correct and cache-friendly for the small alphabets this
/// library targets; the tie rule (strict `<` on the upper bound) must match
/// across any binary-search variant to keep decoders bit-exact.
fn find_symbol(cdf: &[i32], scaled: i32, k: u32) -> u32 {
    for s in 0..k {
        if scaled < cdf[s as usize + 1] {
            return s;
        }
    }
    k - 1
}
