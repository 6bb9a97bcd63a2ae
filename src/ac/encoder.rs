//! Implements the arithmetic encoder.
use crate::ac::{SECOND, TOP};
use crate::bitstream::BitWriter;
use crate::error::{validate_cdf, validate_symbol, CodecError};

/// The arithmetic encoder.
///
/// Maintains the `[low, high)` interval in 32-bit registers and a count of
/// "pending" bits deferred by E3 renormalization until a later E1 or E2
/// resolves which way they settle.
///
/// See the module documentation for the renormalization rules.
pub struct AcEncoder {
    low: u32,
    high: u32,
    /// The number of bits whose emission has been deferred by E3.
    pending: u64,
    writer: BitWriter,
    flushed: bool,
}

impl Default for AcEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl AcEncoder {
    /// Creates a new encoder with an empty interval and an empty stream.
    pub fn new() -> Self {
        Self {
            low: 0,
            high: u32::MAX,
            pending: 0,
            writer: BitWriter::new(),
            flushed: false,
        }
    }

    /// The number of bits committed to the stream so far.
    ///
    /// This does not include bits still deferred in `pending`, which have
    /// not yet settled to a value.
    pub fn bits_written(&self) -> u64 {
        self.writer.bits_written()
    }

    /// Encodes a single symbol against `cdf` at the given `precision`.
    ///
    /// `cdf[0]` must be `0`, `cdf[K]` must be `1 << precision`, `cdf` must be
    /// non-decreasing, and `cdf[symbol] != cdf[symbol + 1]` (the symbol must
    /// not carry zero probability).
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
    /// `cdfs` is a contiguous matrix with row stride `K + 1`; row `i` is the
    /// CDF used for `symbols[i]`.
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

    /// Encodes symbol index `s` (already validated against `cdf`) at `precision`.
    fn encode_validated(&mut self, s: usize, cdf: &[i32], precision: u8) {
        let range = u64::from(self.high) - u64::from(self.low) + 1;
        let cdf_lo = cdf[s] as u64;
        let cdf_hi = cdf[s + 1] as u64;

        self.high = self.low + ((range * cdf_hi) >> precision) as u32 - 1;
        self.low += ((range * cdf_lo) >> precision) as u32;

        self.renormalize();
    }

    /// Renormalizes `low`/`high` while E1, E2 or E3 applies, emitting bits.
    fn renormalize(&mut self) {
        loop {
            if self.high < TOP {
                // E1: both registers' top bit has settled to 0.
                self.writer.write_bit_with_pending(false, self.pending);
                self.pending = 0;
                self.low <<= 1;
                self.high = (self.high << 1) | 1;
            } else if self.low >= TOP {
                // E2: both registers' top bit has settled to 1.
                self.writer.write_bit_with_pending(true, self.pending);
                self.pending = 0;
                self.low = (self.low - TOP) << 1;
                self.high = ((self.high - TOP) << 1) | 1;
            } else if self.low >= SECOND && self.high < TOP + SECOND {
                // E3: the interval straddles the midpoint; defer a bit.
                self.pending += 1;
                self.low = (self.low - SECOND) << 1;
                self.high = ((self.high - SECOND) << 1) | 1;
            } else {
                break;
            }
        }
    }

    /// Finalizes the stream. Must be called exactly once before `bit_stream`
    /// reflects the fully encoded symbols; no further `encode` calls are
    /// permitted afterward.
    pub fn flush(&mut self) -> Result<(), CodecError> {
        if self.flushed {
            return Err(CodecError::UseAfterFlush);
        }
        self.pending += 1;
        let bit = self.low < SECOND;
        self.writer.write_bit_with_pending(bit, self.pending);
        self.pending = 0;
        self.flushed = true;
        Ok(())
    }

    /// The finalized byte sequence, MSB-first, zero-padded to a whole byte.
    ///
    /// Only meaningful after `flush()`.
    pub fn bit_stream(&self) -> &[u8] {
        self.writer.as_bytes()
    }
}
