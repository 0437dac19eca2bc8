use std::{path::Path, sync::mpsc, thread};

use anyhow::{anyhow, bail, Context, Result};
use codec::DbReader;
use log::info;
use parser::OutputArgs;
use vcf::{genotype, VariantDesc, VcfWriter};

use super::pipeline::{output_format, recv_batches, send_batches, variant_progress};

type Record = (VariantDesc, u8);

/// Pull one sample out of a database without decoding full columns: the
/// sample's haplotypes are followed through the permutations with the
/// PBWT position-tracking queries.
///
/// # Errors
/// Fatal on I/O or coding failure, or when the sample id is absent.
pub fn run(
    database: &Path,
    sample_id: &str,
    output_sample: &Path,
    output: OutputArgs,
) -> Result<()> {
    let mut db = DbReader::open(database)
        .with_context(|| format!("Cannot open database: {}", database.display()))?;

    let Some(sample_idx) = db.samples().iter().position(|s| s == sample_id) else {
        bail!("Sample: {sample_id} does not exist");
    };

    let ploidy = db.ploidy();
    let no_variants = db.no_variants();

    let mut writer = VcfWriter::create(output_sample, output_format(output))
        .with_context(|| format!("Cannot open: {}", output_sample.display()))?;
    writer.set_ploidy(ploidy);
    writer.write_header(db.header(), &[sample_id.to_string()])?;

    let mut positions = if ploidy == 1 {
        [sample_idx as u32; 2]
    } else {
        [2 * sample_idx as u32, 2 * sample_idx as u32 + 1]
    };

    let progress = variant_progress(Some(u64::from(no_variants)));

    let outcome = thread::scope(|scope| -> Result<()> {
        let (tx, rx) = mpsc::sync_channel::<Option<Vec<Record>>>(1);

        let producer = scope.spawn(move || {
            send_batches(&tx, || {
                let Some((desc, rle)) = db.read_variant_raw_desc()? else {
                    return Ok(None);
                };

                let byte = if ploidy == 1 {
                    let (value, new_pos) = db.pbwt().track_item(&rle, positions[0]);
                    positions[0] = new_pos;
                    genotype::pack([value, 0], 1, false)
                } else {
                    let (values, new_pos) = db.pbwt().track_items(&rle, positions);
                    positions = new_pos;
                    genotype::pack(values, 2, true)
                };
                Ok(Some((desc, byte)))
            })
        });

        let consumed = recv_batches(&rx, |batch| {
            for (desc, byte) in &batch {
                writer.write_variant(desc, &[*byte])?;
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
    info!("Extracted sample '{sample_id}' into {}", output_sample.display());
    Ok(())
}
