use std::{path::Path, sync::mpsc, thread};

use anyhow::{anyhow, Context, Result};
use codec::sample::flag;
use codec::{DbReader, SampleReader};
use log::info;
use pbwt::Run;
use vcf::{genotype, VariantDesc, VcfWriter};

use super::pipeline::{output_format, recv_batches, send_batches, variant_progress};
use super::tracking::SampleTracker;
use parser::OutputArgs;

type Record = (VariantDesc, u8);

/// Restore a single-sample VCF file from a compressed sample and its
/// database.
///
/// # Errors
/// Any I/O, format or coding failure is fatal.
pub fn run(
    database: &Path,
    compressed_sample: &Path,
    output_sample: &Path,
    output: OutputArgs,
) -> Result<()> {
    let mut db = DbReader::open(database)
        .with_context(|| format!("Cannot open database: {}", database.display()))?;
    let mut sfile = SampleReader::open(compressed_sample)
        .with_context(|| format!("Cannot open: {}", compressed_sample.display()))?;

    let extra_variants = sfile.extra_variants();
    let sample_name = sfile.sample_name().to_string();
    let header = sfile.read_header(db.header())?;
    let parked = sfile.take_extra_variants();

    let ploidy = db.ploidy();
    let no_variants = db.no_variants();

    let mut writer = VcfWriter::create(output_sample, output_format(output))
        .with_context(|| format!("Cannot open: {}", output_sample.display()))?;
    writer.set_ploidy(ploidy);
    writer.write_header(&header, &[sample_name.clone()])?;

    let start_pos = db.no_samples() * u32::from(ploidy);
    let mut tracker = SampleTracker::new(ploidy, start_pos);

    let progress = variant_progress((!extra_variants).then_some(u64::from(no_variants)));

    let outcome = thread::scope(|scope| -> Result<()> {
        let (tx, rx) = mpsc::sync_channel::<Option<Vec<Record>>>(1);

        let producer = scope.spawn(move || -> Result<()> {
            if extra_variants {
                // A valid stream never carries more flags than database
                // rows plus parked sample rows; anything past that is
                // corruption, not a longer batch.
                let flag_budget = no_variants as usize + parked.len() + 1;
                let mut parked = parked.into_iter();

                loop {
                    // One flag block per batch, closed by a 3 (more
                    // batches follow) or the final 4.
                    let mut flags = Vec::new();
                    let terminator = loop {
                        let f = sfile.get_flag()?;
                        if f >= flag::END_OF_BATCH {
                            break f;
                        }
                        flags.push(f);
                        if flags.len() > flag_budget {
                            return Err(anyhow!("Flag stream does not terminate: the sample file is corrupt"));
                        }
                    };

                    let mut batch = Vec::with_capacity(flags.len());
                    for &f in &flags {
                        match f {
                            flag::MATCH => {
                                let (desc, rle) = db
                                    .read_variant_raw_desc()?
                                    .ok_or_else(|| anyhow!("Database exhausted mid-stream"))?;
                                let byte = decode_variant(&db, &mut sfile, &mut tracker, rle)?;
                                batch.push((desc, byte));
                            }
                            flag::SAMPLE_ONLY => {
                                let record = parked
                                    .next()
                                    .ok_or_else(|| anyhow!("Extra-variants list exhausted"))?;
                                batch.push(record);
                            }
                            _ => {
                                // A database row with no counterpart in
                                // the sample: consume and drop.
                                let _ = db.read_variant_raw_desc()?;
                            }
                        }
                    }

                    if !batch.is_empty() && tx.send(Some(batch)).is_err() {
                        return Ok(());
                    }
                    if terminator == flag::END_OF_FILE {
                        let _ = tx.send(None);
                        return Ok(());
                    }
                }
            } else {
                send_batches(&tx, || match db.read_variant_raw_desc()? {
                    Some((desc, rle)) => {
                        let byte = decode_variant(&db, &mut sfile, &mut tracker, rle)?;
                        Ok(Some((desc, byte)))
                    }
                    None => Ok(None),
                })
            }
        });

        let consumed = recv_batches(&rx, |batch| {
            for (desc, byte) in &batch {
                writer.write_variant(desc, &[*byte])?;
            }
            progress.inc(batch.len() as u64);
            Ok(())
        });

        drop(rx);
        let produced = producer.join().map_err(|_| anyhow!("Sample decoder thread panicked"))?;
        produced.context("While decoding the sample stream")?;
        consumed.context("While writing the output VCF")?;

        writer.finish().context("While closing the output VCF")?;
        Ok(())
    });
    outcome?;

    progress.finish_and_clear();
    info!("Decompressed sample '{sample_name}' into {}", output_sample.display());
    Ok(())
}

/// Decode one matched variant: per haplotype, rebuild the context runs
/// (value-agnostic), decode the symbol, then advance with the real value.
fn decode_variant(
    db: &DbReader,
    sfile: &mut SampleReader,
    tracker: &mut SampleTracker,
    rle: Vec<Run>,
) -> Result<u8> {
    let pbwt = db.pbwt();
    let ploidy = tracker.haplotypes();
    let mut byte = if ploidy == 2 { genotype::PHASED_BIT } else { 0 };
    let mut symbols = [0u8; 2];

    for j in 0..ploidy {
        let (runs, _) = pbwt.estimate_value(&rle, tracker.position(j), 0);
        let (pred, succ) = tracker.counters(j);
        let value = sfile.get_value(&runs, pred, succ)?;

        let (runs, new_pos) = pbwt.estimate_value(&rle, tracker.position(j), value);
        byte += value << (2 * j);
        symbols[j] = value;
        tracker.advance(pbwt, &rle, j, value, &runs, new_pos);
    }

    tracker.push_history(rle, symbols);
    Ok(byte)
}
