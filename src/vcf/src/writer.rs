use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use flate2::{write::GzEncoder, Compression};

use crate::{genotype, VariantDesc, VcfError};

/// Output encoding of the written VCF text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    /// gzip-compressed text at the given deflate level (1..=9).
    Gzip { level: u32 },
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::Plain(w) => w.write(buf),
            Sink::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::Plain(w) => w.flush(),
            Sink::Gzip(w) => w.flush(),
        }
    }
}

/// Writer for a (possibly gzip-compressed) VCF file.
pub struct VcfWriter {
    sink:   Sink,
    ploidy: u8,
}

impl VcfWriter {
    /// # Errors
    /// If the file cannot be created.
    pub fn create(path: &Path, format: OutputFormat) -> Result<Self, VcfError> {
        let file = BufWriter::new(File::create(path)?);
        let sink = match format {
            OutputFormat::Plain => Sink::Plain(file),
            OutputFormat::Gzip { level } => {
                Sink::Gzip(GzEncoder::new(file, Compression::new(level)))
            }
        };
        Ok(Self { sink, ploidy: 2 })
    }

    pub fn set_ploidy(&mut self, ploidy: u8) {
        self.ploidy = ploidy;
    }

    /// Write the meta-header followed by the `#CHROM` line naming `samples`.
    ///
    /// # Errors
    /// If the underlying sink fails.
    pub fn write_header(&mut self, header: &str, samples: &[String]) -> Result<(), VcfError> {
        let w = &mut self.sink;
        w.write_all(header.as_bytes())?;
        if !header.is_empty() && !header.ends_with('\n') {
            w.write_all(b"\n")?;
        }

        w.write_all(b"#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO")?;
        if !samples.is_empty() {
            w.write_all(b"\tFORMAT")?;
            for sample in samples {
                write!(w, "\t{sample}")?;
            }
        }
        w.write_all(b"\n")?;
        Ok(())
    }

    /// Write one record; `data` holds one packed genotype byte per sample.
    ///
    /// # Errors
    /// If the underlying sink fails.
    pub fn write_variant(&mut self, desc: &VariantDesc, data: &[u8]) -> Result<(), VcfError> {
        let ploidy = self.ploidy;
        let w = &mut self.sink;
        write!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\tGT",
            desc.chrom, desc.pos, desc.id, desc.ref_allele, desc.alt, desc.qual, desc.filter, desc.info
        )?;

        for &byte in data {
            if ploidy == 1 {
                write!(w, "\t{}", allele_char(genotype::haplotype(byte, 0)))?;
            } else {
                let sep = if byte & genotype::PHASED_BIT != 0 { '|' } else { '/' };
                write!(
                    w,
                    "\t{}{}{}",
                    allele_char(genotype::haplotype(byte, 0)),
                    sep,
                    allele_char(genotype::haplotype(byte, 1))
                )?;
            }
        }
        w.write_all(b"\n")?;
        Ok(())
    }

    /// Flush and close the output stream.
    ///
    /// # Errors
    /// If flushing fails, or the gzip stream cannot be finalized.
    pub fn finish(self) -> Result<(), VcfError> {
        match self.sink {
            Sink::Plain(mut w) => w.flush()?,
            Sink::Gzip(w) => {
                let mut inner = w.finish()?;
                inner.flush()?;
            }
        }
        Ok(())
    }
}

fn allele_char(symbol: u8) -> char {
    match symbol {
        genotype::MISSING => '.',
        symbol => char::from(b'0' + symbol),
    }
}
