use std::{cmp::Ordering, path::Path, sync::mpsc, thread};

use anyhow::{anyhow, bail, Context, Result};
use codec::sample::flag;
use codec::{DbReader, SampleWriter};
use log::info;
use pbwt::Run;
use vcf::{genotype, VariantDesc, VcfReader};

use super::pipeline::{variant_progress, BATCH_SIZE};
use super::tracking::SampleTracker;

/// One haplotype residual, ready for the coder: the symbol, its context
/// runs and the agreement counters at coding time.
type Residual = (u8, [Run; 2], u32, u32);

/// One pipeline batch: the alignment flags and the residuals they cover.
type Batch = (Vec<u8>, Vec<Residual>);

/// Compress a single-sample VCF file against a database.
///
/// # Errors
/// Any I/O, schema or coding failure is fatal.
pub fn run(
    database: &Path,
    input_sample: &Path,
    compressed_sample: &Path,
    store_header: bool,
    extra_variants: bool,
) -> Result<()> {
    let mut db = DbReader::open(database)
        .with_context(|| format!("Cannot open database: {}", database.display()))?;
    let mut vfile = VcfReader::open(input_sample)
        .with_context(|| format!("Cannot open: {}", input_sample.display()))?;

    if vfile.no_samples() != 1 {
        bail!("File to compress must contain exactly 1 sample ({} found)", vfile.no_samples());
    }
    let sample_name = vfile.samples()[0].clone();

    let ploidy = db.ploidy();
    match vfile.ploidy() {
        Ok(sample_ploidy) if sample_ploidy != ploidy => {
            bail!("Sample ploidy ({sample_ploidy}) does not match the database ploidy ({ploidy})")
        }
        _ => {} // an empty sample file stays ploidy-agnostic
    }

    let mut sfile = SampleWriter::create(compressed_sample, extra_variants)
        .with_context(|| format!("Cannot open: {}", compressed_sample.display()))?;
    let sample_header = store_header.then(|| vfile.header().to_string());
    sfile.write_header_and_name(db.header(), sample_header.as_deref(), &sample_name)?;

    let start_pos = db.no_samples() * u32::from(ploidy);
    let mut tracker = SampleTracker::new(ploidy, start_pos);

    let progress = variant_progress(None);

    let (parked, outcome) = thread::scope(|scope| {
        let (tx, rx) = mpsc::sync_channel::<Option<Batch>>(1);

        let producer = scope.spawn(move || -> Result<Vec<(VariantDesc, u8)>> {
            let mut parked = Vec::new();
            let mut cur_db: Option<(VariantDesc, Vec<Run>)> = None;
            let mut cur_sample: Option<(VariantDesc, Vec<u8>)> = None;
            let mut exhausted = false;

            while !exhausted {
                let mut flags = Vec::new();
                let mut residuals = Vec::new();

                for _ in 0..BATCH_SIZE {
                    if extra_variants {
                        if cur_db.is_none() {
                            cur_db = db.read_variant_raw_desc()?;
                        }
                        if cur_sample.is_none() {
                            cur_sample = vfile.next_variant()?;
                        }

                        let sentinel = VariantDesc::end_of_stream();
                        let db_desc = cur_db.as_ref().map_or(&sentinel, |(desc, _)| desc);
                        let sample_desc = cur_sample.as_ref().map_or(&sentinel, |(desc, _)| desc);

                        if db_desc.is_end_of_stream() && sample_desc.is_end_of_stream() {
                            exhausted = true;
                            break;
                        }

                        if sample_desc.same_site(db_desc) {
                            flags.push(flag::MATCH);
                            let (_, rle) = cur_db.take().expect("matched a live db row");
                            let (_, data) = cur_sample.take().expect("matched a live sample row");
                            encode_variant(&db, &mut tracker, rle, data[0], &mut residuals);
                        } else if sample_desc.merge_cmp(db_desc) == Ordering::Less {
                            flags.push(flag::SAMPLE_ONLY);
                            let (desc, data) = cur_sample.take().expect("parked a live sample row");
                            parked.push((desc, data[0]));
                        } else {
                            flags.push(flag::DB_ONLY);
                            cur_db = None;
                        }
                    } else {
                        // Aligned mode: both lists advance in lockstep.
                        let Some(rle) = db.read_variant_raw()? else {
                            exhausted = true;
                            break;
                        };
                        let Some((_, data)) = vfile.next_variant()? else {
                            exhausted = true;
                            break;
                        };
                        encode_variant(&db, &mut tracker, rle, data[0], &mut residuals);
                    }
                }

                if (!flags.is_empty() || !residuals.is_empty())
                    && tx.send(Some((flags, residuals))).is_err()
                {
                    return Ok(parked);
                }
            }
            let _ = tx.send(None);
            Ok(parked)
        });

        let mut consumed: Result<()> = Ok(());
        loop {
            match rx.recv() {
                Ok(Some((flags, residuals))) => {
                    let n = flags.len().max(residuals.len());
                    if let Err(e) = write_batch(&mut sfile, extra_variants, &flags, &residuals) {
                        consumed = Err(e);
                        break;
                    }
                    progress.inc(n as u64);
                }
                Ok(None) | Err(_) => break,
            }
        }

        drop(rx);
        let produced = producer.join().map_err(|_| anyhow!("Sample coder thread panicked"));
        (produced, consumed)
    });

    let parked = parked?.context("While coding the sample")?;
    outcome.context("While writing the sample stream")?;

    sfile.put_flag(flag::END_OF_FILE)?;
    if extra_variants {
        sfile.write_extra_variants(&parked)?;
        info!("Parked {} sample-only variant(s)", parked.len());
    }
    sfile.finish().context("While closing the sample file")?;

    progress.finish_and_clear();
    info!("Compressed sample '{sample_name}' into {}", compressed_sample.display());
    Ok(())
}

/// Code one matched variant: per haplotype, collect the residual under the
/// current neighbourhood context, then advance the tracker.
fn encode_variant(
    db: &DbReader,
    tracker: &mut SampleTracker,
    rle: Vec<Run>,
    genotype_byte: u8,
    residuals: &mut Vec<Residual>,
) {
    let pbwt = db.pbwt();
    let mut symbols = [0u8; 2];

    for j in 0..tracker.haplotypes() {
        let value = genotype::haplotype(genotype_byte, j as u8);
        symbols[j] = value;

        let (runs, new_pos) = pbwt.estimate_value(&rle, tracker.position(j), value);
        let (pred, succ) = tracker.counters(j);
        residuals.push((value, runs, pred, succ));

        tracker.advance(pbwt, &rle, j, value, &runs, new_pos);
    }

    tracker.push_history(rle, symbols);
}

/// Write one batch to the coded stream: its flag block (terminated by the
/// batch marker) when alignment is on, then the residuals.
fn write_batch(
    sfile: &mut SampleWriter,
    extra_variants: bool,
    flags: &[u8],
    residuals: &[Residual],
) -> Result<()> {
    if extra_variants {
        for &f in flags {
            sfile.put_flag(f)?;
        }
        sfile.put_flag(flag::END_OF_BATCH)?;
    }
    for (value, runs, pred, succ) in residuals {
        sfile.put_value(*value, runs, *pred, *succ)?;
    }
    Ok(())
}
