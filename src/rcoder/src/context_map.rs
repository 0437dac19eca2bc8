use crate::{Context, Model};

/// Multiplicative hash constant (64-bit golden ratio).
const HASH_MUL: u64 = 0x9e37_79b9_7f4a_7c13;

const INITIAL_CAPACITY: usize = 16;
const MAX_FILL_FACTOR: f64 = 0.4;

struct Bucket {
    ctx:   Context,
    model: Model,
}

/// Sparse map from 64-bit context keys to adaptive models.
///
/// Open-addressed with linear probing; doubles in capacity at 40% load.
/// The map owns every model it contains. Contexts are never removed, so
/// probe chains stay valid for the lifetime of the map.
pub struct ContextMap {
    data:    Vec<Option<Bucket>>,
    mask:    usize,
    filled:  usize,
    grow_at: usize,
}

impl ContextMap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data:    (0..INITIAL_CAPACITY).map(|_| None).collect(),
            mask:    INITIAL_CAPACITY - 1,
            filled:  0,
            grow_at: (INITIAL_CAPACITY as f64 * MAX_FILL_FACTOR) as usize,
        }
    }

    /// Number of contexts seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.filled
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    fn hash(&self, ctx: Context) -> usize {
        (HASH_MUL.wrapping_mul(ctx) as usize) & self.mask
    }

    fn grow(&mut self) {
        let old = std::mem::replace(
            &mut self.data,
            (0..(self.mask + 1) * 2).map(|_| None).collect(),
        );
        self.mask = self.data.len() - 1;
        self.grow_at = (self.data.len() as f64 * MAX_FILL_FACTOR) as usize;

        for bucket in old.into_iter().flatten() {
            let mut h = self.hash(bucket.ctx);
            while self.data[h].is_some() {
                h = (h + 1) & self.mask;
            }
            self.data[h] = Some(bucket);
        }
    }

    /// The model registered under `ctx`, inserting `create()` on first use.
    pub fn entry(&mut self, ctx: Context, create: impl FnOnce() -> Model) -> &mut Model {
        if self.filled >= self.grow_at {
            self.grow();
        }

        let mut h = self.hash(ctx);
        loop {
            match &self.data[h] {
                Some(bucket) if bucket.ctx == ctx => break,
                Some(_) => h = (h + 1) & self.mask,
                None => {
                    self.data[h] = Some(Bucket { ctx, model: create() });
                    self.filled += 1;
                    break;
                }
            }
        }

        match &mut self.data[h] {
            Some(bucket) => &mut bucket.model,
            None => unreachable!("probe always ends on an occupied slot"),
        }
    }

    /// Warm the cache line of the bucket `ctx` is likely to land in.
    /// A latency hint only; has no observable effect.
    #[inline]
    pub fn prefetch(&self, ctx: Context) {
        #[cfg(target_arch = "x86_64")]
        // SAFETY: the probed index is in bounds by construction and
        // prefetching cannot fault on a valid address.
        unsafe {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            let h = self.hash(ctx);
            _mm_prefetch::<_MM_HINT_T0>(self.data.as_ptr().add(h).cast::<i8>());
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = ctx;
    }
}

impl Default for ContextMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_model() -> Model {
        Model::new(4, 10, 1, None)
    }

    #[test]
    fn entry_inserts_once_per_context() {
        let mut map = ContextMap::new();

        for round in 0..3 {
            for ctx in 0..100u64 {
                let _ = map.entry(ctx.wrapping_mul(0x1234_5678_9abc_def1), tiny_model);
            }
            // Re-touching the same contexts never duplicates them.
            assert_eq!(map.len(), 100, "round {round}");
        }
    }

    #[test]
    fn survives_growth_past_initial_capacity() {
        let mut map = ContextMap::new();
        for ctx in 0..10_000u64 {
            let model = map.entry(ctx, tiny_model);
            // Leave a per-context fingerprint by advancing the stats.
            let mut enc = crate::RangeEncoder::new(Vec::new());
            model.encode(&mut enc, (ctx % 4) as u8).unwrap();
        }
        assert_eq!(map.len(), 10_000);
        map.prefetch(3);
    }
}
