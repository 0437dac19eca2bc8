use std::{path::Path, sync::mpsc, thread};

use anyhow::{anyhow, Context, Result};
use codec::DbWriter;
use log::info;
use vcf::{VariantDesc, VcfReader};

use super::pipeline::{recv_batches, send_batches, variant_progress};

type Record = (VariantDesc, Vec<u8>);

/// Build a compressed database from a multi-sample VCF file.
///
/// # Errors
/// Any I/O, parsing or coding failure is fatal.
pub fn run(input_vcf: &Path, output_db: &Path, neglect_limit: u32) -> Result<()> {
    let mut reader = VcfReader::open(input_vcf)
        .with_context(|| format!("Cannot open: {}", input_vcf.display()))?;
    let ploidy = reader.ploidy().context("While probing the input ploidy")?;

    let mut writer = DbWriter::create(
        output_db,
        reader.no_samples(),
        ploidy,
        neglect_limit,
        reader.header(),
        reader.samples(),
    )
    .with_context(|| format!("Cannot create database: {}", output_db.display()))?;

    let progress = variant_progress(None);

    let outcome = thread::scope(|scope| -> Result<()> {
        let (tx, rx) = mpsc::sync_channel::<Option<Vec<Record>>>(1);

        let producer = scope.spawn(move || {
            send_batches(&tx, || reader.next_variant().map_err(Into::into))
        });

        let consumed = recv_batches(&rx, |batch| {
            for (desc, data) in &batch {
                writer.write_variant(desc, data)?;
            }
            progress.inc(batch.len() as u64);
            Ok(())
        });

        drop(rx);
        let produced = producer.join().map_err(|_| anyhow!("VCF reader thread panicked"))?;
        produced.context("While reading the input VCF")?;
        consumed.context("While compressing genotypes")
    });
    outcome?;

    let no_variants = writer.no_variants();
    writer.finish().context("While writing the database")?;
    progress.finish_and_clear();
    info!("Compressed {no_variants} variant(s) into {}", output_db.display());
    Ok(())
}
