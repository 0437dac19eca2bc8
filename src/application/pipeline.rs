use std::sync::mpsc::{Receiver, SyncSender};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use logger::Logger;
use parser::OutputArgs;
use vcf::OutputFormat;

/// Variants per pipeline batch.
pub(crate) const BATCH_SIZE: usize = 8192;

/// Fill-and-send loop of a producer thread. `produce` yields one item at a
/// time; items are grouped into batches of [`BATCH_SIZE`] and a final
/// `None` closes the stream. A send failure means the consumer is gone
/// (usually because it hit an error of its own) and ends the loop quietly.
pub(crate) fn send_batches<T>(
    tx: &SyncSender<Option<Vec<T>>>,
    mut produce: impl FnMut() -> Result<Option<T>>,
) -> Result<()> {
    loop {
        let mut batch = Vec::with_capacity(BATCH_SIZE);
        while batch.len() < BATCH_SIZE {
            match produce()? {
                Some(item) => batch.push(item),
                None => {
                    if !batch.is_empty() {
                        let _ = tx.send(Some(batch));
                    }
                    let _ = tx.send(None);
                    return Ok(());
                }
            }
        }
        if tx.send(Some(batch)).is_err() {
            return Ok(());
        }
    }
}

/// Consumer loop: apply `consume` to every batch until the `None` token
/// (or until the producer hangs up).
pub(crate) fn recv_batches<T>(
    rx: &Receiver<Option<Vec<T>>>,
    mut consume: impl FnMut(Vec<T>) -> Result<()>,
) -> Result<()> {
    loop {
        match rx.recv() {
            Ok(Some(batch)) => consume(batch)?,
            Ok(None) | Err(_) => return Ok(()),
        }
    }
}

/// A per-batch progress bar attached to the logger's terminal, so bars and
/// log lines do not tear each other. Falls back to a detached bar when the
/// logger is not installed (library callers, tests).
pub(crate) fn variant_progress(total: Option<u64>) -> ProgressBar {
    let bar = match total {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    let template = match total {
        Some(_) => "[{bar:30}] {pos}/{len} variants ({elapsed})",
        None => "{spinner} {pos} variants ({elapsed})",
    };
    if let Ok(style) = ProgressStyle::with_template(template) {
        bar.set_style(style);
    }
    match Logger::try_multi() {
        Some(multi) => multi.add(bar),
        None => bar,
    }
}

/// Map the CLI output flags onto the VCF writer's format. Level 0 is the
/// uncompressed marker, `-b` without it defaults to compression level 1.
pub(crate) fn output_format(args: OutputArgs) -> OutputFormat {
    if args.compressed && args.compression_level > 0 {
        OutputFormat::Gzip { level: args.compression_level.min(9) }
    } else {
        OutputFormat::Plain
    }
}
