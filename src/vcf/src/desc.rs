use std::cmp::Ordering;

/// The textual description of one variant row: every VCF column except the
/// genotypes. Fields other than `pos` are carried as opaque strings; the
/// codecs compress them as NUL-delimited blobs and never interpret them.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct VariantDesc {
    pub chrom:      String,
    pub pos:        i64,
    pub id:         String,
    pub ref_allele: String,
    pub alt:        String,
    pub qual:       String,
    pub filter:     String,
    pub info:       String,
}

impl VariantDesc {
    /// The end-of-stream sentinel: an empty `chrom`, which compares greater
    /// than every real chromosome under [`Self::merge_cmp`].
    #[must_use]
    pub fn end_of_stream() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_end_of_stream(&self) -> bool {
        self.chrom.is_empty()
    }

    /// Merge equality: two descriptors name the same site when `chrom` and
    /// `pos` agree. Two end-of-stream sentinels are the same site.
    ///
    /// Deliberately weaker than [`Self::merge_cmp`] (which also orders by
    /// `alt`): during the extra-variants merge, rows of a multi-allelic
    /// site must pair up even when their ALT spellings differ.
    #[must_use]
    pub fn same_site(&self, other: &Self) -> bool {
        if self.chrom.is_empty() && other.chrom.is_empty() {
            return true;
        }
        self.chrom == other.chrom && self.pos == other.pos
    }

    /// Merge ordering: `chrom` lexicographic with empty comparing greater,
    /// then `pos`, then `alt`.
    #[must_use]
    pub fn merge_cmp(&self, other: &Self) -> Ordering {
        if self.chrom != other.chrom {
            if self.chrom.is_empty() {
                return Ordering::Greater;
            }
            if other.chrom.is_empty() {
                return Ordering::Less;
            }
            return self.chrom.cmp(&other.chrom);
        }
        self.pos.cmp(&other.pos).then_with(|| self.alt.cmp(&other.alt))
    }
}
