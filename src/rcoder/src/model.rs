use std::io::{self, Read, Write};

use crate::{CoderError, RangeDecoder, RangeEncoder};

/// Adaptive frequency model over a small alphabet.
///
/// Per-symbol counters grow by `adder` per coded symbol and are halved
/// (rounding up) whenever the total reaches `1 << max_log`, so no counter
/// ever exceeds its cap. The same model is instantiated on both the encode
/// and the decode side; it stays in sync as long as both sides code the
/// same symbol sequence.
#[derive(Debug, Clone)]
pub struct Model {
    stats:      Vec<u32>,
    total:      u32,
    rescale_at: u32,
    adder:      u32,
}

impl Model {
    /// A model over `no_symbols` symbols with counter cap `1 << max_log`.
    /// `init` seeds the per-symbol counters; all-ones when `None`.
    #[must_use]
    pub fn new(no_symbols: usize, max_log: u32, adder: u32, init: Option<&[u32]>) -> Self {
        let stats: Vec<u32> = match init {
            Some(init) => init.to_vec(),
            None       => vec![1; no_symbols],
        };
        let total = stats.iter().sum();
        Self { stats, total, rescale_at: 1 << max_log, adder }
    }

    /// Code `symbol` through `rc`.
    ///
    /// # Errors
    /// If the coded byte sink fails.
    pub fn encode<W: Write>(&mut self, rc: &mut RangeEncoder<W>, symbol: u8) -> io::Result<()> {
        let cum: u32 = self.stats[..symbol as usize].iter().sum();
        rc.encode_frequency(self.stats[symbol as usize], cum, self.total)?;
        self.update(symbol);
        Ok(())
    }

    /// Decode the next symbol from `rc`.
    ///
    /// # Errors
    /// [`CoderError::CorruptStream`] when the coded frequency falls outside
    /// the model's frequency line (bit errors surface here, lazily).
    pub fn decode<R: Read>(&mut self, rc: &mut RangeDecoder<R>) -> Result<u8, CoderError> {
        let target = rc.cumulative_freq(self.total);
        if target >= self.total {
            return Err(CoderError::CorruptStream);
        }

        let mut cum = 0u32;
        let mut symbol = 0usize;
        while cum + self.stats[symbol] <= target {
            cum += self.stats[symbol];
            symbol += 1;
        }

        rc.update_frequency(self.stats[symbol], cum, self.total)?;
        self.update(symbol as u8);
        Ok(symbol as u8)
    }

    fn update(&mut self, symbol: u8) {
        self.stats[symbol as usize] += self.adder;
        self.total += self.adder;

        if self.total >= self.rescale_at {
            self.total = 0;
            for s in &mut self.stats {
                *s = (*s + 1) / 2;
                self.total += *s;
            }
        }
    }
}
