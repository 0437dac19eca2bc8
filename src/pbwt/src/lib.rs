//! Positional Burrows-Wheeler Transform over the 4-symbol genotype alphabet.
//!
//! A [`Pbwt`] carries a permutation of the haplotype columns from one
//! variant to the next, so that haplotypes which agreed recently become
//! neighbours and identical values form long runs. Columns are exchanged in
//! run-length encoded form: `(symbol, length)` pairs covering the column in
//! permuted order.
//!
//! The permutation is only committed for variants carrying enough signal
//! (the neglect limit); near-monomorphic variants leave the order untouched,
//! which keeps the neighbourhood stable across long stretches of rare
//! variation.

/// Alphabet size of a haplotype column.
pub const SIGMA: usize = 4;

/// One maximal constant-symbol interval of a permuted column.
pub type Run = (u8, u32);

/// Exclusive prefix sums of the symbol histogram, plus the largest symbol
/// frequency. After this, `hist[s]` is the number of elements with symbol
/// `< s` in the column.
fn cumulate(hist: &mut [u32; SIGMA]) -> u32 {
    let max_count = *hist.iter().max().expect("SIGMA > 0");
    let mut sum = 0u32;
    for h in hist.iter_mut() {
        let count = *h;
        *h = sum;
        sum += count;
    }
    max_count
}

fn histogram_of_runs(rle: &[Run]) -> [u32; SIGMA] {
    let mut hist = [0u32; SIGMA];
    for &(symbol, len) in rle {
        hist[symbol as usize] += len;
    }
    hist
}

/// Forward/reverse PBWT state over a fixed column width.
pub struct Pbwt {
    no_items:      u32,
    neglect_limit: u32,
    perm_prev:     Vec<u32>,
    perm_cur:      Vec<u32>,
}

impl Pbwt {
    /// A PBWT over columns of `no_items` haplotypes, starting from the
    /// identity permutation.
    #[must_use]
    pub fn new(no_items: u32, neglect_limit: u32) -> Self {
        Self {
            no_items,
            neglect_limit,
            perm_prev: (0..no_items).collect(),
            perm_cur:  (0..no_items).collect(),
        }
    }

    #[must_use]
    pub fn no_items(&self) -> u32 {
        self.no_items
    }

    /// Commit rule: keep the freshly scattered permutation only when the
    /// column carries at least `neglect_limit` minority symbols.
    fn commit(&mut self, max_count: u32) {
        if self.no_items - max_count >= self.neglect_limit {
            std::mem::swap(&mut self.perm_prev, &mut self.perm_cur);
        }
    }

    fn committed(&self, max_count: u32) -> bool {
        self.no_items - max_count >= self.neglect_limit
    }

    /// Run-length encode `column` in permuted order and advance the
    /// permutation. `rle` is cleared first.
    pub fn encode(&mut self, column: &[u8], rle: &mut Vec<Run>) {
        debug_assert_eq!(column.len(), self.no_items as usize);
        rle.clear();

        let mut hist = [0u32; SIGMA];
        for &symbol in column {
            hist[symbol as usize] += 1;
        }
        let max_count = cumulate(&mut hist);

        let mut prev_symbol = column[self.perm_prev[0] as usize];
        let mut run_len = 0u32;

        for i in 0..self.no_items as usize {
            let item = self.perm_prev[i];
            let cur_symbol = column[item as usize];

            if cur_symbol == prev_symbol {
                run_len += 1;
            } else {
                rle.push((prev_symbol, run_len));
                prev_symbol = cur_symbol;
                run_len = 1;
            }

            self.perm_cur[hist[cur_symbol as usize] as usize] = item;
            hist[cur_symbol as usize] += 1;
        }
        rle.push((prev_symbol, run_len));

        self.commit(max_count);
    }

    /// Expand `rle` back into a column (in original haplotype order) while
    /// advancing the permutation exactly as [`Self::encode`] would.
    pub fn decode(&mut self, rle: &[Run], column: &mut Vec<u8>) {
        column.clear();
        column.resize(self.no_items as usize, 0);

        let mut hist = histogram_of_runs(rle);
        let max_count = cumulate(&mut hist);

        let mut runs = rle.iter();
        let (mut cur_symbol, mut cur_cnt) = *runs.next().expect("decode of an empty column");

        for i in 0..self.no_items as usize {
            let item = self.perm_prev[i];
            column[item as usize] = cur_symbol;

            self.perm_cur[hist[cur_symbol as usize] as usize] = item;
            hist[cur_symbol as usize] += 1;

            cur_cnt -= 1;
            if cur_cnt == 0 {
                if let Some(&(symbol, cnt)) = runs.next() {
                    cur_symbol = symbol;
                    cur_cnt = cnt;
                }
            }
        }

        self.commit(max_count);
    }

    /// The symbol a virtual position holds in this column, and the position
    /// it maps to under the next permutation. Positions of haplotypes that
    /// are not part of the column (a tracked external sample) move exactly
    /// like column members would.
    #[must_use]
    pub fn track_item(&self, rle: &[Run], pos: u32) -> (u8, u32) {
        let mut hist = histogram_of_runs(rle);
        let max_count = cumulate(&mut hist);
        self.track_with(rle, &hist, max_count, pos)
    }

    /// [`Self::track_item`] for two positions, sharing the histogram pass.
    #[must_use]
    pub fn track_items(&self, rle: &[Run], pos: [u32; 2]) -> ([u8; 2], [u32; 2]) {
        let mut hist = histogram_of_runs(rle);
        let max_count = cumulate(&mut hist);

        let mut values = [0u8; 2];
        let mut new_pos = [0u32; 2];
        for j in 0..2 {
            let (value, mapped) = self.track_with(rle, &hist, max_count, pos[j]);
            values[j] = value;
            new_pos[j] = mapped;
        }
        (values, new_pos)
    }

    fn track_with(&self, rle: &[Run], hist: &[u32; SIGMA], max_count: u32, pos: u32) -> (u8, u32) {
        debug_assert!(pos < self.no_items);

        let mut cur_pos = 0u32;
        let mut occurrences = [0u32; SIGMA];
        let mut value = rle.last().map_or(0, |&(symbol, _)| symbol);

        for &(symbol, len) in rle {
            if pos < cur_pos + len {
                value = symbol;
                occurrences[symbol as usize] += pos - cur_pos;
                break;
            }
            occurrences[symbol as usize] += len;
            cur_pos += len;
        }

        let new_pos = if self.committed(max_count) {
            hist[value as usize] + occurrences[value as usize]
        } else {
            pos
        };
        (value, new_pos)
    }

    /// Where a haplotype sitting at `pos` would land under the next
    /// permutation if its value were `assumed`, together with the two runs
    /// bracketing `pos`: `runs[0]` is the (possibly truncated) run ending at
    /// `pos`, `runs[1]` the remainder of the current run or the next one.
    #[must_use]
    pub fn estimate_value(&self, rle: &[Run], pos: u32, assumed: u8) -> ([Run; 2], u32) {
        let mut hist = histogram_of_runs(rle);
        let max_count = cumulate(&mut hist);

        let mut runs = [(0u8, 0u32); 2];
        let mut cur_pos = 0u32;
        let mut count_before = 0u32;

        if pos == 0 {
            runs[1] = rle[0];
        } else {
            for (i, &(symbol, len)) in rle.iter().enumerate() {
                if pos == cur_pos + len {
                    runs[0] = (symbol, len);
                    if i + 1 < rle.len() {
                        runs[1] = rle[i + 1];
                    }
                    if assumed == symbol {
                        count_before += len;
                    }
                    break;
                } else if pos < cur_pos + len {
                    let left = pos - cur_pos;
                    runs[0] = (symbol, left);
                    runs[1] = (symbol, len - left);
                    if assumed == symbol {
                        count_before += left;
                    }
                    break;
                }

                cur_pos += len;
                if assumed == symbol {
                    count_before += len;
                }
            }
        }

        let new_pos = if self.committed(max_count) {
            hist[assumed as usize] + count_before
        } else {
            pos
        };
        (runs, new_pos)
    }

    /// Invert the scatter mapping: given a position in next-permutation
    /// order and the symbol expected there, recover the position in
    /// previous-permutation order. `None` when the column holds a different
    /// symbol at `pos_cur`; callers use that to stop walking history.
    #[must_use]
    pub fn revert_decode(&self, pos_cur: u32, rle: &[Run], reference: u8) -> Option<u32> {
        let mut hist = histogram_of_runs(rle);
        let _ = cumulate(&mut hist);

        let mut value = (SIGMA - 1) as u8;
        for s in 1..SIGMA {
            if pos_cur < hist[s] {
                value = (s - 1) as u8;
                break;
            }
        }

        if value != reference {
            return None;
        }

        // The scatter put the (r+1)-th occurrence of `value` at slot
        // `hist[value] + r`; walk the runs back to that occurrence.
        let mut rank = pos_cur - hist[value as usize];
        let mut cur_pos = 0u32;

        for &(symbol, len) in rle {
            if symbol == value {
                if rank < len {
                    return Some(cur_pos + rank);
                }
                rank -= len;
            }
            cur_pos += len;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_column(rng: &mut StdRng, len: usize, skew: bool) -> Vec<u8> {
        (0..len)
            .map(|_| {
                if skew && rng.gen_bool(0.9) {
                    0
                } else {
                    rng.gen_range(0..SIGMA as u8)
                }
            })
            .collect()
    }

    fn run_sum(rle: &[Run]) -> u32 {
        rle.iter().map(|&(_, len)| len).sum()
    }

    #[test]
    fn encode_decode_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        let width = 64u32;

        let mut fwd = Pbwt::new(width, 3);
        let mut rev = Pbwt::new(width, 3);
        let mut rle = Vec::new();
        let mut restored = Vec::new();

        for variant in 0..500 {
            let column = random_column(&mut rng, width as usize, variant % 3 == 0);
            fwd.encode(&column, &mut rle);
            assert_eq!(run_sum(&rle), width, "variant {variant}");

            rev.decode(&rle, &mut restored);
            assert_eq!(restored, column, "variant {variant}");
        }
    }

    #[test]
    fn neglect_limit_keeps_permutation_stable() {
        // 1000 monomorphic columns must leave the permutation untouched:
        // every emitted RLE stays a single run over the identity order.
        let width = 40u32;
        let mut pbwt = Pbwt::new(width, 10);
        let mut rle = Vec::new();

        for _ in 0..1000 {
            pbwt.encode(&vec![0u8; width as usize], &mut rle);
            assert_eq!(rle, vec![(0u8, width)]);
        }

        // One polymorphic column over the still-identity order: the first
        // half ref, the second half alt encodes as exactly two runs.
        let mut column = vec![0u8; width as usize];
        for symbol in column.iter_mut().skip(width as usize / 2) {
            *symbol = 1;
        }
        pbwt.encode(&column, &mut rle);
        assert_eq!(rle, vec![(0u8, width / 2), (1u8, width / 2)]);
    }

    #[test]
    fn track_item_follows_column_members() {
        // After encoding, the position of a column member under the new
        // permutation must match where decode scatters it.
        let mut rng = StdRng::seed_from_u64(99);
        let width = 32u32;

        let mut pbwt = Pbwt::new(width, 1);
        let tracker = Pbwt::new(width, 1);
        let mut rle = Vec::new();

        let column = random_column(&mut rng, width as usize, false);
        // Tracked from the identity order: item at position p holds column[p].
        let expectations: Vec<(u8, u32)> =
            (0..width).map(|p| tracker.track_item(&rle_of(&column), p)).collect();
        pbwt.encode(&column, &mut rle);

        for (p, &(value, new_pos)) in expectations.iter().enumerate() {
            assert_eq!(value, column[p]);
            assert_eq!(pbwt.perm_prev[new_pos as usize], p as u32);
        }
    }

    fn rle_of(column: &[u8]) -> Vec<Run> {
        let mut rle: Vec<Run> = Vec::new();
        for &symbol in column {
            match rle.last_mut() {
                Some((last, len)) if *last == symbol => *len += 1,
                _ => rle.push((symbol, 1)),
            }
        }
        rle
    }

    #[test]
    fn revert_law() {
        // revert_decode inverts track_item whenever the commit rule fired.
        let mut rng = StdRng::seed_from_u64(0xbeef);
        let width = 48u32;
        let pbwt = Pbwt::new(width, 1);

        for _ in 0..200 {
            let column = random_column(&mut rng, width as usize, false);
            let rle = rle_of(&column);
            for pos in 0..width {
                let (value, new_pos) = pbwt.track_item(&rle, pos);
                assert_eq!(pbwt.revert_decode(new_pos, &rle, value), Some(pos));
            }
        }
    }

    #[test]
    fn revert_decode_rejects_wrong_symbol() {
        let pbwt = Pbwt::new(6, 1);
        let rle = vec![(0u8, 3u32), (1u8, 3u32)];
        // Position 0 in the new order belongs to symbol 0.
        assert_eq!(pbwt.revert_decode(0, &rle, 1), None);
        assert!(pbwt.revert_decode(0, &rle, 0).is_some());
    }

    #[test]
    fn estimate_value_agrees_with_track_item() {
        let mut rng = StdRng::seed_from_u64(0xcafe);
        let width = 48u32;
        let pbwt = Pbwt::new(width, 1);

        for _ in 0..100 {
            let column = random_column(&mut rng, width as usize, true);
            let rle = rle_of(&column);
            for pos in 0..width {
                let (value, new_pos) = pbwt.track_item(&rle, pos);
                let (_, estimated) = pbwt.estimate_value(&rle, pos, value);
                assert_eq!(estimated, new_pos);
            }
        }
    }

    #[test]
    fn estimate_value_bracketing_runs() {
        let pbwt = Pbwt::new(10, 1);
        let rle = vec![(0u8, 4u32), (1u8, 3u32), (3u8, 3u32)];

        // At position 0 there is no left run.
        let (runs, _) = pbwt.estimate_value(&rle, 0, 0);
        assert_eq!(runs, [(0, 0), (0, 4)]);

        // On a run boundary the whole left run and the next run.
        let (runs, _) = pbwt.estimate_value(&rle, 4, 0);
        assert_eq!(runs, [(0, 4), (1, 3)]);

        // Mid-run: both halves carry the run's symbol.
        let (runs, _) = pbwt.estimate_value(&rle, 5, 1);
        assert_eq!(runs, [(1, 1), (1, 2)]);

        // One past the last item: left run only.
        let (runs, _) = pbwt.estimate_value(&rle, 10, 1);
        assert_eq!(runs, [(3, 3), (0, 0)]);
    }

    #[test]
    fn estimate_value_positions_an_external_sample() {
        // A sample virtually appended after the column (pos == width) lands
        // after every column member sharing its assumed value.
        let pbwt = Pbwt::new(6, 1);
        let rle = vec![(0u8, 2u32), (1u8, 2u32), (0u8, 2u32)];

        let (_, pos_for_ref) = pbwt.estimate_value(&rle, 6, 0);
        assert_eq!(pos_for_ref, 4); // after the four 0s

        let (_, pos_for_alt) = pbwt.estimate_value(&rle, 6, 1);
        assert_eq!(pos_for_alt, 6); // after the 0-block and both 1s
    }
}
