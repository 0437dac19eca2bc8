//! The compressed genotype database.
//!
//! A database is a pair of sibling files. `<name>_db` holds the fixed
//! header (`no_variants`, `no_samples`, `ploidy`, `neglect_limit`) followed
//! by eleven length-prefixed LZMA blocks of NUL-delimited text columns:
//! `meta, header, samples, chrom, pos, id, ref, alt, qual, filter, info`
//! (`pos` stores decimal deltas from the previous position). `<name>_gt` is
//! one unframed range-coder stream of PBWT runs, one RLE column per
//! variant, with the last run of every column stored as length zero.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, trace};
use pbwt::{Pbwt, Run};
use rcoder::{RangeDecoder, RangeEncoder};
use vcf::{genotype, VariantDesc};

use crate::columns::{append_number, append_text, TextColumn};
use crate::runs::RunContexts;
use crate::{lzma, CodecError};

/// Format magic carried in the `meta` column.
const META_MAGIC: &str = "GTPK2";

/// LZMA preset for the descriptor columns.
const DESC_PRESET: u32 = 9;

fn sibling(stem: &Path, suffix: &str) -> PathBuf {
    let mut name = stem.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Writer half of the database codec.
pub struct DbWriter {
    db_file:       File,
    rc:            RangeEncoder<BufWriter<File>>,
    contexts:      RunContexts,
    pbwt:          Pbwt,
    no_variants:   u32,
    no_samples:    u32,
    ploidy:        u8,
    neglect_limit: u32,
    prev_pos:      i64,

    // Descriptor columns, buffered until `finish`.
    meta:       Vec<u8>,
    header:     Vec<u8>,
    samples:    Vec<u8>,
    chrom:      Vec<u8>,
    pos:        Vec<u8>,
    id:         Vec<u8>,
    ref_allele: Vec<u8>,
    alt:        Vec<u8>,
    qual:       Vec<u8>,
    filter:     Vec<u8>,
    info:       Vec<u8>,

    // Per-variant scratch.
    column: Vec<u8>,
    rle:    Vec<Run>,
}

impl DbWriter {
    /// Create `<stem>_db` and `<stem>_gt` and set up the coder state.
    ///
    /// # Errors
    /// If either file cannot be created, or the ploidy is unsupported.
    pub fn create(
        stem: &Path,
        no_samples: u32,
        ploidy: u8,
        neglect_limit: u32,
        header: &str,
        samples: &[String],
    ) -> Result<Self, CodecError> {
        if ploidy != 1 && ploidy != 2 {
            return Err(CodecError::Schema(format!("unsupported ploidy ({ploidy})")));
        }

        let db_file = File::create(sibling(stem, "_db"))?;
        let gt_file = File::create(sibling(stem, "_gt"))?;

        let mut meta = Vec::new();
        append_text(&mut meta, META_MAGIC);
        let mut header_col = Vec::new();
        append_text(&mut header_col, header);
        let mut samples_col = Vec::new();
        for sample in samples {
            append_text(&mut samples_col, sample);
        }

        let no_items = no_samples * u32::from(ploidy);
        Ok(Self {
            db_file,
            rc: RangeEncoder::new(BufWriter::new(gt_file)),
            contexts: RunContexts::new(),
            pbwt: Pbwt::new(no_items, neglect_limit),
            no_variants: 0,
            no_samples,
            ploidy,
            neglect_limit,
            prev_pos: 0,
            meta,
            header: header_col,
            samples: samples_col,
            chrom: Vec::new(),
            pos: Vec::new(),
            id: Vec::new(),
            ref_allele: Vec::new(),
            alt: Vec::new(),
            qual: Vec::new(),
            filter: Vec::new(),
            info: Vec::new(),
            column: Vec::with_capacity(no_items as usize),
            rle: Vec::new(),
        })
    }

    /// Append one variant: descriptor fields into the text columns, the
    /// genotype bytes through the PBWT into the run stream.
    ///
    /// # Errors
    /// If the run stream cannot be written.
    pub fn write_variant(&mut self, desc: &VariantDesc, data: &[u8]) -> Result<(), CodecError> {
        append_text(&mut self.chrom, &desc.chrom);
        append_number(&mut self.pos, desc.pos - self.prev_pos);
        self.prev_pos = desc.pos;
        append_text(&mut self.id, &desc.id);
        append_text(&mut self.ref_allele, &desc.ref_allele);
        append_text(&mut self.alt, &desc.alt);
        append_text(&mut self.qual, &desc.qual);
        append_text(&mut self.filter, &desc.filter);
        append_text(&mut self.info, &desc.info);

        self.column.clear();
        if self.ploidy == 1 {
            self.column.extend(data.iter().map(|&b| b & 0b11));
        } else {
            for &byte in data {
                self.column.push(genotype::haplotype(byte, 0));
                self.column.push(genotype::haplotype(byte, 1));
            }
        }

        self.pbwt.encode(&self.column, &mut self.rle);
        if let Some(last) = self.rle.last_mut() {
            last.1 = 0; // fill-to-the-end convention
        }

        self.contexts.reset();
        for &(symbol, len) in &self.rle {
            self.contexts.encode_run(&mut self.rc, symbol, len)?;
        }

        self.no_variants += 1;
        Ok(())
    }

    #[must_use]
    pub fn no_variants(&self) -> u32 {
        self.no_variants
    }

    /// Flush the run stream and write the descriptor file.
    ///
    /// # Errors
    /// If compression or file I/O fails.
    pub fn finish(self) -> Result<(), CodecError> {
        let mut gt_sink = self.rc.finish()?;
        gt_sink.flush()?;

        let mut db = BufWriter::new(self.db_file);
        db.write_u32::<LittleEndian>(self.no_variants)?;
        db.write_u32::<LittleEndian>(self.no_samples)?;
        db.write_u8(self.ploidy)?;
        db.write_u32::<LittleEndian>(self.neglect_limit)?;

        for (name, column) in [
            ("meta", &self.meta),
            ("header", &self.header),
            ("samples", &self.samples),
            ("chrom", &self.chrom),
            ("pos", &self.pos),
            ("id", &self.id),
            ("ref", &self.ref_allele),
            ("alt", &self.alt),
            ("qual", &self.qual),
            ("filter", &self.filter),
            ("info", &self.info),
        ] {
            let packed = lzma::compress(column, DESC_PRESET)?;
            trace!("column {name}: {} -> {} bytes", column.len(), packed.len());
            db.write_u32::<LittleEndian>(packed.len() as u32)?;
            db.write_all(&packed)?;
        }
        db.flush()?;

        debug!("Database closed: {} variant(s)", self.no_variants);
        Ok(())
    }
}

/// Reader half of the database codec.
pub struct DbReader {
    rc:            RangeDecoder<BufReader<File>>,
    contexts:      RunContexts,
    pbwt:          Pbwt,
    no_variants:   u32,
    i_variant:     u32,
    no_samples:    u32,
    ploidy:        u8,
    neglect_limit: u32,
    prev_pos:      i64,

    header:  String,
    samples: Vec<String>,

    chrom:      TextColumn,
    pos:        TextColumn,
    id:         TextColumn,
    ref_allele: TextColumn,
    alt:        TextColumn,
    qual:       TextColumn,
    filter:     TextColumn,
    info:       TextColumn,

    column: Vec<u8>,
}

impl DbReader {
    /// Open `<stem>_db` / `<stem>_gt`, inflate the descriptor columns and
    /// start the run-stream decoder.
    ///
    /// # Errors
    /// On I/O failure, malformed columns or a foreign magic value.
    pub fn open(stem: &Path) -> Result<Self, CodecError> {
        let mut db = BufReader::new(File::open(sibling(stem, "_db"))?);
        let gt = BufReader::new(File::open(sibling(stem, "_gt"))?);

        let no_variants = db.read_u32::<LittleEndian>()?;
        let no_samples = db.read_u32::<LittleEndian>()?;
        let ploidy = db.read_u8()?;
        let neglect_limit = db.read_u32::<LittleEndian>()?;

        if ploidy != 1 && ploidy != 2 {
            return Err(CodecError::Schema(format!("unsupported ploidy ({ploidy})")));
        }

        let mut read_column = || -> Result<Vec<u8>, CodecError> {
            let len = db.read_u32::<LittleEndian>()? as usize;
            let mut packed = vec![0u8; len];
            db.read_exact(&mut packed)?;
            lzma::decompress(&packed)
        };

        let mut meta = TextColumn::new(read_column()?);
        let mut header = TextColumn::new(read_column()?);
        let mut samples_col = TextColumn::new(read_column()?);
        let chrom = TextColumn::new(read_column()?);
        let pos = TextColumn::new(read_column()?);
        let id = TextColumn::new(read_column()?);
        let ref_allele = TextColumn::new(read_column()?);
        let alt = TextColumn::new(read_column()?);
        let qual = TextColumn::new(read_column()?);
        let filter = TextColumn::new(read_column()?);
        let info = TextColumn::new(read_column()?);

        let magic = meta.read_text()?;
        if magic != META_MAGIC {
            return Err(CodecError::Schema(format!("not a genotype database (magic '{magic}')")));
        }

        let header = header.read_text()?;
        let mut samples = Vec::with_capacity(no_samples as usize);
        for _ in 0..no_samples {
            samples.push(samples_col.read_text()?);
        }
        debug!("Opened database: {no_variants} variant(s), {no_samples} sample(s), ploidy {ploidy}");

        let no_items = no_samples * u32::from(ploidy);
        Ok(Self {
            rc: RangeDecoder::new(gt)?,
            contexts: RunContexts::new(),
            pbwt: Pbwt::new(no_items, neglect_limit),
            no_variants,
            i_variant: 0,
            no_samples,
            ploidy,
            neglect_limit,
            prev_pos: 0,
            header,
            samples,
            chrom,
            pos,
            id,
            ref_allele,
            alt,
            qual,
            filter,
            info,
            column: Vec::with_capacity(no_items as usize),
        })
    }

    #[must_use]
    pub fn no_variants(&self) -> u32 {
        self.no_variants
    }

    #[must_use]
    pub fn no_samples(&self) -> u32 {
        self.no_samples
    }

    #[must_use]
    pub fn ploidy(&self) -> u8 {
        self.ploidy
    }

    #[must_use]
    pub fn neglect_limit(&self) -> u32 {
        self.neglect_limit
    }

    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    #[must_use]
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    /// PBWT calculator over this database's column width; the position
    /// tracking queries of the sample codec go through this.
    #[must_use]
    pub fn pbwt(&self) -> &Pbwt {
        &self.pbwt
    }

    fn read_desc(&mut self) -> Result<VariantDesc, CodecError> {
        let chrom = self.chrom.read_text()?;
        let pos = self.pos.read_number()? + self.prev_pos;
        self.prev_pos = pos;
        Ok(VariantDesc {
            chrom,
            pos,
            id: self.id.read_text()?,
            ref_allele: self.ref_allele.read_text()?,
            alt: self.alt.read_text()?,
            qual: self.qual.read_text()?,
            filter: self.filter.read_text()?,
            info: self.info.read_text()?,
        })
    }

    fn read_runs(&mut self) -> Result<Vec<Run>, CodecError> {
        let no_items = self.pbwt.no_items();
        let mut rle = Vec::new();
        let mut total = 0u32;

        self.contexts.reset();
        while total < no_items {
            let (symbol, mut len) = self.contexts.decode_run(&mut self.rc)?;
            if len == 0 {
                len = no_items - total;
            }
            if len > no_items - total {
                return Err(CodecError::Format("run overflows its genotype column"));
            }
            rle.push((symbol, len));
            total += len;
        }
        Ok(rle)
    }

    /// The next variant as a descriptor plus packed genotype bytes, or
    /// `None` past the last variant. Diploid bytes come back phased.
    ///
    /// # Errors
    /// On a corrupt stream or exhausted descriptor columns.
    pub fn read_variant(&mut self) -> Result<Option<(VariantDesc, Vec<u8>)>, CodecError> {
        if self.i_variant >= self.no_variants {
            return Ok(None);
        }

        let desc = self.read_desc()?;
        let rle = self.read_runs()?;

        let mut column = std::mem::take(&mut self.column);
        self.pbwt.decode(&rle, &mut column);

        let data: Vec<u8> = if self.ploidy == 1 {
            column.clone()
        } else {
            column
                .chunks_exact(2)
                .map(|pair| genotype::pack([pair[0], pair[1]], 2, true))
                .collect()
        };
        self.column = column;

        self.i_variant += 1;
        Ok(Some((desc, data)))
    }

    /// The next variant's RLE runs without undoing the PBWT; the sample
    /// codec consumes runs, not columns. Does not advance the permutation.
    ///
    /// # Errors
    /// On a corrupt stream.
    pub fn read_variant_raw(&mut self) -> Result<Option<Vec<Run>>, CodecError> {
        if self.i_variant >= self.no_variants {
            return Ok(None);
        }
        let rle = self.read_runs()?;
        self.i_variant += 1;
        Ok(Some(rle))
    }

    /// [`Self::read_variant_raw`] plus the descriptor.
    ///
    /// # Errors
    /// On a corrupt stream or exhausted descriptor columns.
    pub fn read_variant_raw_desc(&mut self) -> Result<Option<(VariantDesc, Vec<Run>)>, CodecError> {
        if self.i_variant >= self.no_variants {
            return Ok(None);
        }
        let desc = self.read_desc()?;
        let rle = self.read_runs()?;
        self.i_variant += 1;
        Ok(Some((desc, rle)))
    }
}
