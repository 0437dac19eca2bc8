use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Default neglect limit: permutation updates are skipped for variants
/// with fewer minority alleles than this.
pub const DEFAULT_NEGLECT_LIMIT: u32 = 10;

#[derive(Parser, Debug)]
#[clap(name="gtpack", author, version, about, long_about = None)]
#[clap(propagate_version = true)]
/// GTPack-rs: compressed databases of VCF genotype collections
pub struct Cli {
    /// Set the verbosity level (-v -vv -vvv)
    ///
    /// Multiple levels allowed: -v: Info | -vv: Debug | -vvv: Trace {n}
    ///
    /// Warnings are emitted even when this flag is off; use --quiet/-q to
    /// silence them.
    #[clap(short='v', long, parse(from_occurrences), global=true)]
    pub verbose: u8,

    /// Disable warnings. Only errors will be displayed.
    #[clap(short='q', long, global=true)]
    pub quiet: bool,

    #[clap(subcommand)]
    pub commands: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compress a multi-sample VCF file into a genotype database
    #[clap(name = "compress-db")]
    CompressDb {
        /// Ignore rare variants when updating the haplotype order; the
        /// value is a lower limit on the number of alternative alleles.
        #[clap(long = "neglect-limit", alias = "nl", default_value_t = DEFAULT_NEGLECT_LIMIT)]
        neglect_limit: u32,

        /// Path to the input VCF (or VCF.GZ) file
        #[clap(value_name = "input-vcf")]
        input_vcf: PathBuf,

        /// Path to the output database (two files, `_db` and `_gt`)
        #[clap(value_name = "output-db")]
        output_db: PathBuf,
    },

    /// Restore the multi-sample VCF file from a genotype database
    #[clap(name = "decompress-db")]
    DecompressDb {
        #[clap(flatten)]
        output: OutputArgs,

        /// Path to the input database
        #[clap(value_name = "input-db")]
        input_db: PathBuf,

        /// Path to the output VCF file
        #[clap(value_name = "output-vcf")]
        output_vcf: PathBuf,
    },

    /// Compress a single-sample VCF file against a genotype database
    #[clap(name = "compress-sample")]
    CompressSample {
        /// Store the sample file's own header (as a delta against the
        /// database header)
        #[clap(long = "store-header", alias = "sh")]
        store_header: bool,

        /// Allow different variant sets in the sample file and the database
        #[clap(long = "extra-variants", alias = "ev")]
        extra_variants: bool,

        /// Path to the database obtained with `compress-db`
        #[clap(value_name = "database")]
        database: PathBuf,

        /// Path to the input VCF file containing exactly one sample
        #[clap(value_name = "input-sample")]
        input_sample: PathBuf,

        /// Path to the output compressed sample file
        #[clap(value_name = "compressed-sample")]
        compressed_sample: PathBuf,
    },

    /// Restore a single-sample VCF file compressed with `compress-sample`
    #[clap(name = "decompress-sample")]
    DecompressSample {
        #[clap(flatten)]
        output: OutputArgs,

        /// Path to the database obtained with `compress-db`
        #[clap(value_name = "database")]
        database: PathBuf,

        /// Path to the compressed sample file
        #[clap(value_name = "compressed-sample")]
        compressed_sample: PathBuf,

        /// Path to the output single-sample VCF file
        #[clap(value_name = "output-sample")]
        output_sample: PathBuf,
    },

    /// Extract a single sample directly from a genotype database
    #[clap(name = "extract-sample")]
    ExtractSample {
        #[clap(flatten)]
        output: OutputArgs,

        /// Path to the database obtained with `compress-db`
        #[clap(value_name = "database")]
        database: PathBuf,

        /// Id of the sample to extract
        #[clap(value_name = "sample-id")]
        sample_id: String,

        /// Path to the output single-sample VCF file
        #[clap(value_name = "output-sample")]
        output_sample: PathBuf,
    },
}

/// Shape of the written VCF output, shared by every decompressing command.
#[derive(Args, Debug, Clone, Copy)]
pub struct OutputArgs {
    /// Emit gzip-compressed output (plain VCF text by default)
    #[clap(short = 'b', long = "compressed")]
    pub compressed: bool,

    /// Compression level of the output (0 to 9; 0 disables compression)
    #[clap(short = 'c', long = "compression-level", default_value_t = 1)]
    pub compression_level: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn positional_order_is_preserved() {
        let cli = Cli::try_parse_from([
            "gtpack", "compress-sample", "--ev", "db_path", "in.vcf", "out_sample",
        ])
        .unwrap();

        match cli.commands {
            Commands::CompressSample { extra_variants, database, input_sample, compressed_sample, .. } => {
                assert!(extra_variants);
                assert_eq!(database, PathBuf::from("db_path"));
                assert_eq!(input_sample, PathBuf::from("in.vcf"));
                assert_eq!(compressed_sample, PathBuf::from("out_sample"));
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn neglect_limit_flag() {
        let cli =
            Cli::try_parse_from(["gtpack", "compress-db", "--nl", "25", "in.vcf", "out_db"]).unwrap();
        match cli.commands {
            Commands::CompressDb { neglect_limit, .. } => assert_eq!(neglect_limit, 25),
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn compressed_output_flags() {
        let cli = Cli::try_parse_from([
            "gtpack", "decompress-db", "-b", "-c", "7", "in_db", "out.vcf",
        ])
        .unwrap();
        match cli.commands {
            Commands::DecompressDb { output, .. } => {
                assert!(output.compressed);
                assert_eq!(output.compression_level, 7);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
