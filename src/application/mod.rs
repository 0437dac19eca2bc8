//! The five pipeline drivers.
//!
//! Every driver is a two-worker pipeline: a producer thread feeds batches
//! of 8192 variants through a bounded rendezvous channel to the consumer
//! on the calling thread. Batches move by value; `None` is the termination
//! token, so no shared mutable state crosses the thread boundary. All
//! coder and PBWT state lives on exactly one side of the channel.

pub mod compress_db;
pub mod compress_sample;
pub mod decompress_db;
pub mod decompress_sample;
pub mod extract_sample;

mod pipeline;
mod tracking;

use anyhow::Result;
use parser::Commands;

/// Dispatch one parsed subcommand.
///
/// # Errors
/// Any fatal error of the selected pipeline.
pub fn run(commands: &Commands) -> Result<()> {
    match commands {
        Commands::CompressDb { neglect_limit, input_vcf, output_db } => {
            compress_db::run(input_vcf, output_db, *neglect_limit)
        }
        Commands::DecompressDb { output, input_db, output_vcf } => {
            decompress_db::run(input_db, output_vcf, *output)
        }
        Commands::CompressSample { store_header, extra_variants, database, input_sample, compressed_sample } => {
            compress_sample::run(database, input_sample, compressed_sample, *store_header, *extra_variants)
        }
        Commands::DecompressSample { output, database, compressed_sample, output_sample } => {
            decompress_sample::run(database, compressed_sample, output_sample, *output)
        }
        Commands::ExtractSample { output, database, sample_id, output_sample } => {
            extract_sample::run(database, sample_id, output_sample, *output)
        }
    }
}
