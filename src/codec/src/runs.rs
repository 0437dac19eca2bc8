//! Context-coded emission of PBWT runs.
//!
//! Every run is a symbol followed by a length. The symbol is coded under a
//! sliding context of the last four symbols; the length as a bit-length
//! prefix class under a sliding symbol/prefix context, followed by either
//! the low bits of the length or, for runs of 512 and longer, an escape and
//! three raw bytes. Both contexts restart at their all-ones mask on every
//! variant.

use std::io::{Read, Write};

use rcoder::{Context, ContextMap, Model, RangeDecoder, RangeEncoder};

use crate::{bit_len, CodecError};

const CTX_SYMBOL_FLAG: Context = 1 << 60;
const CTX_SYMBOL_MASK: Context = 0xFFFF;

const CTX_PREFIX_FLAG: Context = 2 << 60;
const CTX_PREFIX_MASK: Context = 0xF_FFFF;

const CTX_SUFFIX_FLAG: Context = 3 << 60;
const CTX_LARGE1_FLAG: Context = 4 << 60;
const CTX_LARGE2_FLAG: Context = 5 << 60;
const CTX_LARGE3_FLAG: Context = 6 << 60;

/// Prefix class at which the length escapes to three raw bytes.
const LARGE_PREFIX: u32 = 10;

/// Sliding run-coding state shared by one side (encode or decode) of a
/// genotype stream. The map owns one adaptive model per context ever seen.
pub(crate) struct RunContexts {
    coders:     ContextMap,
    ctx_symbol: Context,
    ctx_prefix: Context,
}

fn symbol_model() -> Model {
    Model::new(4, 15, 1, None)
}

fn prefix_model() -> Model {
    Model::new(11, 10, 1, None)
}

fn byte_model() -> Model {
    Model::new(256, 15, 1, None)
}

impl RunContexts {
    pub(crate) fn new() -> Self {
        Self { coders: ContextMap::new(), ctx_symbol: CTX_SYMBOL_MASK, ctx_prefix: CTX_PREFIX_MASK }
    }

    /// Restart the sliding contexts for a new variant.
    pub(crate) fn reset(&mut self) {
        self.ctx_symbol = CTX_SYMBOL_MASK;
        self.ctx_prefix = CTX_PREFIX_MASK;
    }

    fn push_symbol(&mut self, symbol: u8) {
        self.ctx_symbol = ((self.ctx_symbol << 4) + Context::from(symbol)) & CTX_SYMBOL_MASK;
        self.ctx_prefix = ((self.ctx_prefix << 4) + Context::from(symbol)) & CTX_PREFIX_MASK;
    }

    fn push_prefix(&mut self, prefix: u32) {
        self.ctx_prefix = ((self.ctx_prefix << 4) + Context::from(prefix)) & CTX_PREFIX_MASK;
    }

    pub(crate) fn encode_run<W: Write>(
        &mut self,
        rc: &mut RangeEncoder<W>,
        symbol: u8,
        len: u32,
    ) -> Result<(), CodecError> {
        let sym_ctx = CTX_SYMBOL_FLAG + self.ctx_symbol;
        self.coders.entry(sym_ctx, symbol_model).encode(rc, symbol)?;
        self.push_symbol(symbol);
        self.coders.prefetch(CTX_SYMBOL_FLAG + self.ctx_symbol);

        let prefix_ctx = CTX_PREFIX_FLAG + self.ctx_prefix;
        let prefix = bit_len(len);
        self.push_prefix(prefix);
        self.coders.prefetch(CTX_PREFIX_FLAG + self.ctx_prefix);

        if prefix < 2 {
            self.coders.entry(prefix_ctx, prefix_model).encode(rc, prefix as u8)?;
        } else if prefix < LARGE_PREFIX {
            self.coders.entry(prefix_ctx, prefix_model).encode(rc, prefix as u8)?;

            let low = 1u32 << (prefix - 1);
            let suffix_ctx = CTX_SUFFIX_FLAG + (Context::from(symbol) << 8) + Context::from(prefix);
            self.coders
                .entry(suffix_ctx, || Model::new(1 << (prefix - 1), 15, 1, None))
                .encode(rc, (len - low) as u8)?;
        } else {
            self.coders.entry(prefix_ctx, prefix_model).encode(rc, LARGE_PREFIX as u8)?;

            let bytes = [(len >> 16) & 0xFF, (len >> 8) & 0xFF, len & 0xFF];
            let ctx1 = CTX_LARGE1_FLAG + (Context::from(symbol) << 16);
            self.coders.entry(ctx1, byte_model).encode(rc, bytes[0] as u8)?;

            let ctx2 = CTX_LARGE2_FLAG + (Context::from(symbol) << 16) + Context::from(bytes[0]);
            self.coders.entry(ctx2, byte_model).encode(rc, bytes[1] as u8)?;

            let ctx3 = CTX_LARGE3_FLAG
                + (Context::from(symbol) << 16)
                + (Context::from(bytes[0]) << 8)
                + Context::from(bytes[1]);
            self.coders.entry(ctx3, byte_model).encode(rc, bytes[2] as u8)?;
        }
        Ok(())
    }

    pub(crate) fn decode_run<R: Read>(
        &mut self,
        rc: &mut RangeDecoder<R>,
    ) -> Result<(u8, u32), CodecError> {
        let sym_ctx = CTX_SYMBOL_FLAG + self.ctx_symbol;
        let symbol = self.coders.entry(sym_ctx, symbol_model).decode(rc)?;
        self.push_symbol(symbol);
        self.coders.prefetch(CTX_SYMBOL_FLAG + self.ctx_symbol);

        let prefix_ctx = CTX_PREFIX_FLAG + self.ctx_prefix;
        let mut prefix = u32::from(self.coders.entry(prefix_ctx, prefix_model).decode(rc)?);

        let len = if prefix < 2 {
            prefix
        } else if prefix < LARGE_PREFIX {
            let low = 1u32 << (prefix - 1);
            let suffix_ctx = CTX_SUFFIX_FLAG + (Context::from(symbol) << 8) + Context::from(prefix);
            let suffix = self
                .coders
                .entry(suffix_ctx, || Model::new(1 << (prefix - 1), 15, 1, None))
                .decode(rc)?;
            low + u32::from(suffix)
        } else {
            let ctx1 = CTX_LARGE1_FLAG + (Context::from(symbol) << 16);
            let b1 = u32::from(self.coders.entry(ctx1, byte_model).decode(rc)?);

            let ctx2 = CTX_LARGE2_FLAG + (Context::from(symbol) << 16) + Context::from(b1);
            let b2 = u32::from(self.coders.entry(ctx2, byte_model).decode(rc)?);

            let ctx3 = CTX_LARGE3_FLAG
                + (Context::from(symbol) << 16)
                + (Context::from(b1) << 8)
                + Context::from(b2);
            let b3 = u32::from(self.coders.entry(ctx3, byte_model).decode(rc)?);

            let len = (b1 << 16) + (b2 << 8) + b3;
            prefix = bit_len(len);
            len
        };

        self.push_prefix(prefix);
        self.coders.prefetch(CTX_PREFIX_FLAG + self.ctx_prefix);
        Ok((symbol, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn run_stream_roundtrip() {
        let mut rng = StdRng::seed_from_u64(21);
        // Mix of short, mid and escape-length runs over several variants.
        let variants: Vec<Vec<(u8, u32)>> = (0..50)
            .map(|_| {
                (0..rng.gen_range(1..20))
                    .map(|_| {
                        let len = match rng.gen_range(0..4) {
                            0 => rng.gen_range(0..2),
                            1 => rng.gen_range(2..512),
                            2 => rng.gen_range(512..100_000),
                            _ => 1,
                        };
                        (rng.gen_range(0..4u8), len)
                    })
                    .collect()
            })
            .collect();

        let mut contexts = RunContexts::new();
        let mut rc = RangeEncoder::new(Vec::new());
        for variant in &variants {
            contexts.reset();
            for &(symbol, len) in variant {
                contexts.encode_run(&mut rc, symbol, len).unwrap();
            }
        }
        let bytes = rc.finish().unwrap();

        let mut contexts = RunContexts::new();
        let mut rc = RangeDecoder::new(bytes.as_slice()).unwrap();
        for variant in &variants {
            contexts.reset();
            for &expected in variant {
                assert_eq!(contexts.decode_run(&mut rc).unwrap(), expected);
            }
        }
    }
}
