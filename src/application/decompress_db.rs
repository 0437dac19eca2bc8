use std::{path::Path, sync::mpsc, thread};

use anyhow::{anyhow, Context, Result};
use codec::DbReader;
use log::info;
use parser::OutputArgs;
use vcf::{VariantDesc, VcfWriter};

use super::pipeline::{output_format, recv_batches, send_batches, variant_progress};

type Record = (VariantDesc, Vec<u8>);

/// Restore the multi-sample VCF file from a compressed database.
///
/// # Errors
/// Any I/O, format or coding failure is fatal.
pub fn run(input_db: &Path, output_vcf: &Path, output: OutputArgs) -> Result<()> {
    let mut db = DbReader::open(input_db)
        .with_context(|| format!("Cannot open database: {}", input_db.display()))?;

    let mut writer = VcfWriter::create(output_vcf, output_format(output))
        .with_context(|| format!("Cannot create: {}", output_vcf.display()))?;
    writer.set_ploidy(db.ploidy());
    writer.write_header(db.header(), db.samples())?;

    let no_variants = db.no_variants();
    let progress = variant_progress(Some(u64::from(no_variants)));

    let outcome = thread::scope(|scope| -> Result<()> {
        let (tx, rx) = mpsc::sync_channel::<Option<Vec<Record>>>(1);

        let producer = scope.spawn(move || {
            send_batches(&tx, || db.read_variant().map_err(Into::into))
        });

        let consumed = recv_batches(&rx, |batch| {
            for (desc, data) in &batch {
                writer.write_variant(desc, data)?;
            }
            progress.inc(batch.len() as u64);
            Ok(())
        });

        drop(rx);
        let produced = producer.join().map_err(|_| anyhow!("Database reader thread panicked"))?;
        produced.context("While decoding the database")?;
        consumed.context("While writing the output VCF")?;

        writer.finish().context("While closing the output VCF")?;
        Ok(())
    });
    outcome?;

    progress.finish_and_clear();
    info!("Decompressed {no_variants} variant(s) into {}", output_vcf.display());
    Ok(())
}
