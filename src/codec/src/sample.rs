//! The single-sample codec.
//!
//! One additional sample is coded against a database: for every database
//! variant the sample's allele is range-coded under a context built from
//! the two runs bracketing the position the PBWT would give the sample,
//! plus two counters measuring for how many recent variants the sample
//! agreed with its left and right neighbours. A 5-symbol flag stream
//! (match / sample-only / db-only / end-of-batch / end-of-file) aligns the
//! two variant lists when they differ; sample-only rows are parked in an
//! LZMA-compressed side list.
//!
//! File layout, in write order: the extra-variants marker byte, the
//! optional header delta (LZMA with the database header as shared
//! history), the sample name, the optional extra-variants blocks, and the
//! range-coder stream until end of file.

use std::{
    fs::File,
    io::{BufReader, Cursor, Read, Write},
    path::Path,
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use pbwt::Run;
use rcoder::{Context, ContextMap, Model, RangeDecoder, RangeEncoder};
use vcf::VariantDesc;

use crate::columns::{append_text, TextColumn};
use crate::{bit_len, lzma, CodecError};

/// Upper bound on the neighbourhood agreement counters and on the history
/// depth they are recomputed from.
pub const MAX_TRACKED_DIST: u32 = 2048;

/// LZMA preset for the header delta and the extra-variants blocks.
const EV_PRESET: u32 = 9;

const CTX_FLAG_TAG: Context = 1 << 62;
const CTX_FLAG_MASK: Context = 0xFFF;

/// Flag codes of the extra-variants stream.
pub mod flag {
    /// Sample and database describe the same site.
    pub const MATCH: u8 = 0;
    /// The sample carries a variant the database does not.
    pub const SAMPLE_ONLY: u8 = 1;
    /// The database carries a variant the sample does not.
    pub const DB_ONLY: u8 = 2;
    /// End of one batch of flags.
    pub const END_OF_BATCH: u8 = 3;
    /// End of the whole stream.
    pub const END_OF_FILE: u8 = 4;
}

/// Context for one residual: bracketing runs in the low 32 bits, the
/// dominant agreement counter's magnitude above, tagged by which side
/// dominates.
fn residual_context(runs: &[Run; 2], no_pred_same: u32, no_succ_same: u32) -> Context {
    let mut ctx: Context = 0;

    for (i, &(symbol, len)) in runs.iter().enumerate() {
        ctx += Context::from(symbol) << (16 * i + 8);
        ctx += Context::from((bit_len(len) + 1) / 4) << (16 * i);
    }

    if no_pred_same > no_succ_same {
        ctx += 1 << 62;
        ctx += Context::from((bit_len(no_pred_same) + 3) / 4) << 32;
    } else {
        if no_pred_same < no_succ_same {
            ctx += 2 << 62;
        }
        ctx += Context::from((bit_len(no_succ_same) + 3) / 4) << 40;
    }

    ctx
}

fn residual_model() -> Model {
    Model::new(4, 13, 4, Some(&[1, 1, 1, 1]))
}

fn flag_model() -> Model {
    Model::new(5, 15, 4, Some(&[1, 1, 1, 1, 1]))
}

/// The latest position strictly before `max_pos` whose symbol is `value`.
#[must_use]
pub fn find_prev_value(rle: &[Run], max_pos: u32, value: u8) -> Option<u32> {
    if max_pos == 0 {
        return None;
    }
    let mut found = None;
    let mut cur_pos = 0u32;

    for &(symbol, len) in rle {
        if symbol == value {
            if cur_pos + len >= max_pos {
                found = Some(max_pos - 1);
                cur_pos = max_pos;
            } else {
                found = Some(cur_pos + len - 1);
                cur_pos += len;
            }
        } else {
            cur_pos += len;
        }

        if cur_pos >= max_pos {
            break;
        }
    }
    found
}

/// `min_pos`, when any run of `value` reaches it or lies beyond it.
#[must_use]
pub fn find_next_value(rle: &[Run], min_pos: u32, value: u8) -> Option<u32> {
    let mut cur_pos = 0u32;

    for &(symbol, len) in rle {
        if symbol == value && cur_pos + len >= min_pos {
            return Some(min_pos);
        }
        cur_pos += len;
    }
    None
}

/// Writer half of the sample codec.
pub struct SampleWriter {
    file:     File,
    rc:       RangeEncoder<Vec<u8>>,
    coders:   ContextMap,
    ctx_flag: Context,
}

impl SampleWriter {
    /// Create the sample file and write the extra-variants marker.
    ///
    /// # Errors
    /// If the file cannot be created.
    pub fn create(path: &Path, extra_variants: bool) -> Result<Self, CodecError> {
        let mut file = File::create(path)?;
        file.write_u8(u8::from(extra_variants))?;
        Ok(Self {
            file,
            rc: RangeEncoder::new(Vec::new()),
            coders: ContextMap::new(),
            ctx_flag: 0,
        })
    }

    /// Write the optional header delta (compressed against the database
    /// header) and the sample name.
    ///
    /// # Errors
    /// If compression or file I/O fails.
    pub fn write_header_and_name(
        &mut self,
        db_header: &str,
        sample_header: Option<&str>,
        sample_name: &str,
    ) -> Result<(), CodecError> {
        match sample_header {
            Some(header) if !header.is_empty() => {
                self.file.write_u8(1)?;
                let blob =
                    lzma::compress_with_history(db_header.as_bytes(), header.as_bytes(), EV_PRESET)?;
                self.file.write_u32::<LittleEndian>(blob.len() as u32)?;
                self.file.write_all(&blob)?;
            }
            _ => self.file.write_u8(0)?,
        }

        self.file.write_u16::<LittleEndian>(sample_name.len() as u16)?;
        self.file.write_all(sample_name.as_bytes())?;
        Ok(())
    }

    /// Code one haplotype residual.
    ///
    /// # Errors
    /// If the coded stream cannot be written.
    pub fn put_value(
        &mut self,
        value: u8,
        runs: &[Run; 2],
        no_pred_same: u32,
        no_succ_same: u32,
    ) -> Result<(), CodecError> {
        let ctx = residual_context(runs, no_pred_same, no_succ_same);
        self.coders.entry(ctx, residual_model).encode(&mut self.rc, value)?;
        Ok(())
    }

    /// Code one alignment flag.
    ///
    /// # Errors
    /// If the coded stream cannot be written.
    pub fn put_flag(&mut self, flag: u8) -> Result<(), CodecError> {
        let ctx = CTX_FLAG_TAG + self.ctx_flag;
        self.coders.entry(ctx, flag_model).encode(&mut self.rc, flag)?;
        self.ctx_flag = ((self.ctx_flag << 2) + Context::from(flag)) & CTX_FLAG_MASK;
        Ok(())
    }

    /// Write the parked sample-only variants as nine LZMA blocks
    /// (`chrom, pos, id, ref, alt, qual, filter, info, gt`), preceded by a
    /// presence marker. INFO is blanked; POS is a 4-byte little-endian
    /// delta; GT is the raw genotype byte.
    ///
    /// # Errors
    /// If compression or file I/O fails.
    pub fn write_extra_variants(
        &mut self,
        variants: &[(VariantDesc, u8)],
    ) -> Result<(), CodecError> {
        if variants.is_empty() {
            self.file.write_u8(0)?;
            return Ok(());
        }
        self.file.write_u8(1)?;

        let mut chrom = Vec::new();
        let mut pos = Vec::new();
        let mut id = Vec::new();
        let mut ref_allele = Vec::new();
        let mut alt = Vec::new();
        let mut qual = Vec::new();
        let mut filter = Vec::new();
        let mut info = Vec::new();
        let mut gt = Vec::new();

        let mut prev_pos = 0i64;
        for (desc, genotype) in variants {
            append_text(&mut chrom, &desc.chrom);
            append_text(&mut id, &desc.id);
            append_text(&mut ref_allele, &desc.ref_allele);
            append_text(&mut alt, &desc.alt);
            append_text(&mut qual, &desc.qual);
            append_text(&mut filter, &desc.filter);
            append_text(&mut info, ".");

            let delta = (desc.pos - prev_pos) as u32;
            prev_pos = desc.pos;
            pos.extend_from_slice(&delta.to_le_bytes());

            gt.push(*genotype);
        }

        for column in [&chrom, &pos, &id, &ref_allele, &alt, &qual, &filter, &info, &gt] {
            let packed = lzma::compress(column, EV_PRESET)?;
            self.file.write_u32::<LittleEndian>(packed.len() as u32)?;
            self.file.write_all(&packed)?;
        }
        Ok(())
    }

    /// Flush the range-coder stream to the file and close it.
    ///
    /// # Errors
    /// If file I/O fails.
    pub fn finish(self) -> Result<(), CodecError> {
        let bytes = self.rc.finish()?;
        let mut file = self.file;
        file.write_all(&bytes)?;
        file.flush()?;
        debug!("Sample stream closed: {} coded byte(s), {} context(s)", bytes.len(), self.coders.len());
        Ok(())
    }
}

/// Reader half of the sample codec.
pub struct SampleReader {
    rc:             RangeDecoder<Cursor<Vec<u8>>>,
    coders:         ContextMap,
    ctx_flag:       Context,
    extra_variants: bool,
    header_blob:    Vec<u8>,
    sample_name:    String,
    parked:         Vec<(VariantDesc, u8)>,
}

impl SampleReader {
    /// Open a sample file: parse the framing sections and start the
    /// decoder over the remaining bytes.
    ///
    /// # Errors
    /// On I/O failure or malformed framing.
    pub fn open(path: &Path) -> Result<Self, CodecError> {
        let mut file = BufReader::new(File::open(path)?);

        let extra_variants = file.read_u8()? != 0;

        let header_present = file.read_u8()? != 0;
        let header_blob = if header_present {
            let len = file.read_u32::<LittleEndian>()? as usize;
            let mut blob = vec![0u8; len];
            file.read_exact(&mut blob)?;
            blob
        } else {
            Vec::new()
        };

        let name_len = file.read_u16::<LittleEndian>()? as usize;
        let mut name = vec![0u8; name_len];
        file.read_exact(&mut name)?;
        let sample_name = String::from_utf8_lossy(&name).into_owned();

        let parked = if extra_variants {
            Self::read_extra_variants(&mut file)?
        } else {
            Vec::new()
        };

        let mut coded = Vec::new();
        file.read_to_end(&mut coded)?;

        debug!("Opened sample '{sample_name}': {} parked variant(s)", parked.len());
        Ok(Self {
            rc: RangeDecoder::new(Cursor::new(coded))?,
            coders: ContextMap::new(),
            ctx_flag: 0,
            extra_variants,
            header_blob,
            sample_name,
            parked,
        })
    }

    fn read_extra_variants(file: &mut impl Read) -> Result<Vec<(VariantDesc, u8)>, CodecError> {
        if file.read_u8()? == 0 {
            return Ok(Vec::new());
        }

        let mut read_column = || -> Result<Vec<u8>, CodecError> {
            let len = file.read_u32::<LittleEndian>()? as usize;
            let mut packed = vec![0u8; len];
            file.read_exact(&mut packed)?;
            lzma::decompress(&packed)
        };

        let mut chrom = TextColumn::new(read_column()?);
        let pos = read_column()?;
        let mut id = TextColumn::new(read_column()?);
        let mut ref_allele = TextColumn::new(read_column()?);
        let mut alt = TextColumn::new(read_column()?);
        let mut qual = TextColumn::new(read_column()?);
        let mut filter = TextColumn::new(read_column()?);
        let mut info = TextColumn::new(read_column()?);
        let gt = read_column()?;

        let no_variants = gt.len();
        if pos.len() != no_variants * 4 {
            return Err(CodecError::Format("extra-variants POS block length mismatch"));
        }

        let mut variants = Vec::with_capacity(no_variants);
        let mut prev_pos = 0u32;
        for i in 0..no_variants {
            let delta_bytes: [u8; 4] = pos[i * 4..i * 4 + 4]
                .try_into()
                .map_err(|_| CodecError::Format("truncated extra-variants POS block"))?;
            let cur = u32::from_le_bytes(delta_bytes).wrapping_add(prev_pos);
            prev_pos = cur;

            variants.push((
                VariantDesc {
                    chrom:      chrom.read_text()?,
                    pos:        i64::from(cur),
                    id:         id.read_text()?,
                    ref_allele: ref_allele.read_text()?,
                    alt:        alt.read_text()?,
                    qual:       qual.read_text()?,
                    filter:     filter.read_text()?,
                    info:       info.read_text()?,
                },
                gt[i],
            ));
        }
        Ok(variants)
    }

    #[must_use]
    pub fn extra_variants(&self) -> bool {
        self.extra_variants
    }

    #[must_use]
    pub fn sample_name(&self) -> &str {
        &self.sample_name
    }

    /// Recover the sample's own header: the stored delta against the
    /// database header, or the database header itself when none was stored.
    ///
    /// # Errors
    /// If the stored delta does not decompress.
    pub fn read_header(&self, db_header: &str) -> Result<String, CodecError> {
        if self.header_blob.is_empty() {
            return Ok(db_header.to_string());
        }
        let text = lzma::decompress_with_history(db_header.as_bytes(), &self.header_blob, EV_PRESET)?;
        Ok(String::from_utf8_lossy(&text).into_owned())
    }

    /// The parked sample-only variants, in file order.
    pub fn take_extra_variants(&mut self) -> Vec<(VariantDesc, u8)> {
        std::mem::take(&mut self.parked)
    }

    /// Decode one haplotype residual.
    ///
    /// # Errors
    /// On a corrupt stream.
    pub fn get_value(
        &mut self,
        runs: &[Run; 2],
        no_pred_same: u32,
        no_succ_same: u32,
    ) -> Result<u8, CodecError> {
        let ctx = residual_context(runs, no_pred_same, no_succ_same);
        Ok(self.coders.entry(ctx, residual_model).decode(&mut self.rc)?)
    }

    /// Decode one alignment flag.
    ///
    /// # Errors
    /// On a corrupt stream.
    pub fn get_flag(&mut self) -> Result<u8, CodecError> {
        let ctx = CTX_FLAG_TAG + self.ctx_flag;
        let flag = self.coders.entry(ctx, flag_model).decode(&mut self.rc)?;
        self.ctx_flag = ((self.ctx_flag << 2) + Context::from(flag)) & CTX_FLAG_MASK;
        Ok(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prev_and_next_value_scans() {
        // Column: 0 0 1 1 3 3 0 0  (positions 0..8)
        let rle: Vec<Run> = vec![(0, 2), (1, 2), (3, 2), (0, 2)];

        assert_eq!(find_prev_value(&rle, 8, 0), Some(7));
        assert_eq!(find_prev_value(&rle, 6, 0), Some(1));
        assert_eq!(find_prev_value(&rle, 4, 1), Some(3));
        assert_eq!(find_prev_value(&rle, 2, 1), None);
        assert_eq!(find_prev_value(&rle, 8, 2), None);
        assert_eq!(find_prev_value(&rle, 0, 0), None);

        assert_eq!(find_next_value(&rle, 0, 0), Some(0));
        assert_eq!(find_next_value(&rle, 2, 1), Some(2));
        assert_eq!(find_next_value(&rle, 4, 1), Some(4));
        assert_eq!(find_next_value(&rle, 6, 3), Some(6));
        assert_eq!(find_next_value(&rle, 7, 1), None);
        assert_eq!(find_next_value(&rle, 0, 2), None);
    }

    #[test]
    fn residual_context_tags_dominant_side() {
        let runs: [Run; 2] = [(1, 5), (0, 2)];

        let balanced = residual_context(&runs, 4, 4);
        let pred_heavy = residual_context(&runs, 9, 4);
        let succ_heavy = residual_context(&runs, 4, 9);

        assert_eq!(balanced >> 62, 0);
        assert_eq!(pred_heavy >> 62, 1);
        assert_eq!(succ_heavy >> 62, 2);
        assert_ne!(balanced, pred_heavy);
        assert_ne!(pred_heavy, succ_heavy);
    }

    #[test]
    fn value_and_flag_stream_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample");

        let runs_a: [Run; 2] = [(0, 12), (1, 3)];
        let runs_b: [Run; 2] = [(1, 1), (1, 7)];
        let values = [0u8, 1, 0, 0, 3, 2, 1, 0];
        let flags = [0u8, 0, 1, 2, 0, 3];

        let mut writer = SampleWriter::create(&path, true).unwrap();
        writer.write_header_and_name("##db\n", None, "NA12878").unwrap();
        writer.write_extra_variants(&[]).unwrap();
        for &f in &flags {
            writer.put_flag(f).unwrap();
        }
        for (i, &v) in values.iter().enumerate() {
            let runs = if i % 2 == 0 { &runs_a } else { &runs_b };
            writer.put_value(v, runs, i as u32, (i / 2) as u32).unwrap();
        }
        writer.put_flag(flag::END_OF_FILE).unwrap();
        writer.finish().unwrap();

        let mut reader = SampleReader::open(&path).unwrap();
        assert!(reader.extra_variants());
        assert_eq!(reader.sample_name(), "NA12878");
        assert_eq!(reader.read_header("##db\n").unwrap(), "##db\n");
        assert!(reader.take_extra_variants().is_empty());

        for &f in &flags {
            assert_eq!(reader.get_flag().unwrap(), f);
        }
        for (i, &v) in values.iter().enumerate() {
            let runs = if i % 2 == 0 { &runs_a } else { &runs_b };
            assert_eq!(reader.get_value(runs, i as u32, (i / 2) as u32).unwrap(), v);
        }
        assert_eq!(reader.get_flag().unwrap(), flag::END_OF_FILE);
    }

    #[test]
    fn extra_variants_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample_ev");

        let parked: Vec<(VariantDesc, u8)> = vec![
            (
                VariantDesc {
                    chrom:      "chr1".into(),
                    pos:        1000,
                    id:         "rs1".into(),
                    ref_allele: "A".into(),
                    alt:        "T".into(),
                    qual:       "30".into(),
                    filter:     "PASS".into(),
                    info:       "AC=1".into(),
                },
                0b0001_0001,
            ),
            (
                VariantDesc {
                    chrom:      "chr2".into(),
                    pos:        50,
                    id:         ".".into(),
                    ref_allele: "G".into(),
                    alt:        "C".into(),
                    qual:       ".".into(),
                    filter:     ".".into(),
                    info:       ".".into(),
                },
                0b0001_0100,
            ),
        ];

        let mut writer = SampleWriter::create(&path, true).unwrap();
        writer
            .write_header_and_name("##db-header\n", Some("##sample-header\n"), "S1")
            .unwrap();
        writer.write_extra_variants(&parked).unwrap();
        writer.put_flag(flag::END_OF_FILE).unwrap();
        writer.finish().unwrap();

        let mut reader = SampleReader::open(&path).unwrap();
        assert_eq!(reader.read_header("##db-header\n").unwrap(), "##sample-header\n");

        let restored = reader.take_extra_variants();
        assert_eq!(restored.len(), 2);
        for ((got_desc, got_gt), (want_desc, want_gt)) in restored.iter().zip(&parked) {
            assert_eq!(got_desc.chrom, want_desc.chrom);
            assert_eq!(got_desc.pos, want_desc.pos);
            assert_eq!(got_desc.id, want_desc.id);
            assert_eq!(got_desc.ref_allele, want_desc.ref_allele);
            assert_eq!(got_desc.alt, want_desc.alt);
            assert_eq!(got_desc.info, "."); // INFO is blanked in the side list
            assert_eq!(got_gt, want_gt);
        }
    }
}
