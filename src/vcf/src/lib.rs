//! Variant I/O provider: plain-text and gzip-compressed VCF files.
//!
//! The codecs never touch VCF syntax themselves; they consume and produce
//! `(VariantDesc, genotype byte vector)` pairs through [`VcfReader`] and
//! [`VcfWriter`]. Multi-allelic records are decomposed on the way in (one
//! record per ALT allele, the remaining alleles folded into the `multi`
//! genotype symbol) so that downstream code only ever sees the 4-symbol
//! alphabet.

pub mod desc;
pub mod genotype;
pub mod reader;
pub mod writer;

mod error;

pub use desc::VariantDesc;
pub use error::VcfError;
pub use reader::VcfReader;
pub use writer::{OutputFormat, VcfWriter};
