use std::io::{self, Read, Write};

/// Renormalization threshold: one output byte per 8 bits of range shrinkage.
const TOP_VALUE: u32 = 1 << 24;

/// Carry-counting range encoder over a 32-bit range.
///
/// Carries are resolved lazily: the most recent unresolved output byte is
/// held in `cache` and a counter tracks how many `0xFF` bytes are pending
/// behind it. The first emitted byte is always zero (the initial cache) and
/// is skipped by [`RangeDecoder::new`].
pub struct RangeEncoder<W: Write> {
    sink:    W,
    low:     u64,
    range:   u32,
    cache:   u8,
    pending: u64,
}

impl<W: Write> RangeEncoder<W> {
    /// Create an encoder in its started state, writing coded bytes to `sink`.
    pub fn new(sink: W) -> Self {
        Self { sink, low: 0, range: u32::MAX, cache: 0, pending: 1 }
    }

    /// Narrow the range to the `[cum_freq, cum_freq + sym_freq)` slice of a
    /// `total`-wide frequency line, emitting bytes as the range shrinks.
    ///
    /// # Errors
    /// If the underlying sink fails.
    pub fn encode_frequency(&mut self, sym_freq: u32, cum_freq: u32, total: u32) -> io::Result<()> {
        let r = self.range / total;
        self.low += u64::from(r) * u64::from(cum_freq);
        self.range = r * sym_freq;

        while self.range < TOP_VALUE {
            self.range <<= 8;
            self.shift_low()?;
        }
        Ok(())
    }

    fn shift_low(&mut self) -> io::Result<()> {
        // The top byte resolves once low can no longer overflow into it.
        if (self.low as u32) < 0xFF00_0000 || self.low > u64::from(u32::MAX) {
            let carry = (self.low >> 32) as u8;
            let mut byte = self.cache;
            while self.pending > 0 {
                self.sink.write_all(&[byte.wrapping_add(carry)])?;
                byte = 0xFF;
                self.pending -= 1;
            }
            self.cache = (self.low >> 24) as u8;
        }
        self.pending += 1;
        self.low = (self.low << 8) & u64::from(u32::MAX);
        Ok(())
    }

    /// Flush the remaining state and hand back the sink.
    ///
    /// # Errors
    /// If the underlying sink fails.
    pub fn finish(mut self) -> io::Result<W> {
        for _ in 0..5 {
            self.shift_low()?;
        }
        Ok(self.sink)
    }
}

/// Range decoder, mirror of [`RangeEncoder`].
///
/// Reading past the end of the source yields zero bytes: the decoder may
/// legitimately renormalize a few bytes beyond the logical end of a stream.
pub struct RangeDecoder<R: Read> {
    source: R,
    code:   u32,
    range:  u32,
}

impl<R: Read> RangeDecoder<R> {
    /// Create a decoder in its started state. Consumes the five leading
    /// bytes of the stream (the first is the encoder's constant zero).
    ///
    /// # Errors
    /// If the underlying source fails.
    pub fn new(source: R) -> io::Result<Self> {
        let mut decoder = Self { source, code: 0, range: u32::MAX };
        for _ in 0..5 {
            decoder.code = (decoder.code << 8) | u32::from(decoder.next_byte()?);
        }
        Ok(decoder)
    }

    /// The cumulative frequency the encoder targeted, on a `total`-wide line.
    /// May return a value `>= total` on a corrupt stream; callers must treat
    /// that as a format error.
    #[must_use]
    pub fn cumulative_freq(&self, total: u32) -> u32 {
        self.code / (self.range / total)
    }

    /// Consume the `[cum_freq, cum_freq + sym_freq)` slice identified via
    /// [`Self::cumulative_freq`] and renormalize.
    ///
    /// # Errors
    /// If the underlying source fails.
    pub fn update_frequency(&mut self, sym_freq: u32, cum_freq: u32, total: u32) -> io::Result<()> {
        let r = self.range / total;
        self.code -= r * cum_freq;
        self.range = r * sym_freq;

        while self.range < TOP_VALUE {
            self.code = (self.code << 8) | u32::from(self.next_byte()?);
            self.range <<= 8;
        }
        Ok(())
    }

    fn next_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        loop {
            match self.source.read(&mut buf) {
                Ok(0) => return Ok(0),
                Ok(_) => return Ok(buf[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_frequency_roundtrip() -> io::Result<()> {
        // A fixed 4-symbol frequency line: {4, 2, 1, 1}, total 8.
        let freqs: [(u32, u32); 4] = [(4, 0), (2, 4), (1, 6), (1, 7)];
        let symbols: Vec<usize> = (0..2000).map(|i| (i * 7 + i / 13) % 4).collect();

        let mut encoder = RangeEncoder::new(Vec::new());
        for &s in &symbols {
            let (f, c) = freqs[s];
            encoder.encode_frequency(f, c, 8)?;
        }
        let bytes = encoder.finish()?;

        let mut decoder = RangeDecoder::new(bytes.as_slice())?;
        for &s in &symbols {
            let target = decoder.cumulative_freq(8);
            let decoded = freqs.iter().position(|&(f, c)| target >= c && target < c + f);
            assert_eq!(decoded, Some(s));
            let (f, c) = freqs[s];
            decoder.update_frequency(f, c, 8)?;
        }
        Ok(())
    }

    #[test]
    fn empty_stream_decodes_zero_bytes() -> io::Result<()> {
        let encoder = RangeEncoder::new(Vec::new());
        let bytes = encoder.finish()?;
        assert_eq!(bytes.len(), 5);
        assert_eq!(bytes[0], 0);

        // A decoder over it starts cleanly and tolerates running dry.
        let decoder = RangeDecoder::new(bytes.as_slice())?;
        assert_eq!(decoder.cumulative_freq(4), 0);
        Ok(())
    }
}
