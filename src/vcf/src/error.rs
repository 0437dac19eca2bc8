use thiserror::Error;

#[derive(Error, Debug)]
pub enum VcfError {
    #[error("Failed to read or write the VCF file")]
    Io(#[from] std::io::Error),

    #[error("Unrecognized file extension: '{0}' (expected .vcf or .vcf.gz)")]
    UnknownExtension(String),

    #[error("Reached the end of the file without finding a #CHROM header line")]
    MissingHeaderLine,

    #[error("Record at line {line} is truncated: missing the {field} field")]
    TruncatedRecord { line: usize, field: &'static str },

    #[error("Record at line {line} carries an unparseable POS field: '{pos}'")]
    InvalidPosition { line: usize, pos: String },

    #[error("Record at line {line} carries an unparseable genotype: '{genotype}'")]
    InvalidGenotype { line: usize, genotype: String },

    #[error("Unsupported ploidy ({0}): only haploid and diploid data are handled")]
    UnsupportedPloidy(usize),

    #[error("Ploidy changes at line {line}: expected {expected} allele(s) per sample")]
    InconsistentPloidy { line: usize, expected: u8 },
}
