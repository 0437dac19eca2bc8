use std::{
    ffi::OsStr,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use flate2::read::MultiGzDecoder;
use log::debug;

use crate::{genotype, VariantDesc, VcfError};

/// CHROM, POS, ID, REF, ALT, QUAL, FILTER, INFO, FORMAT.
const FIXED_FIELDS: usize = 9;

/// One sample's parsed GT field: allele indices (`-1` = missing) plus the
/// phasing separator.
struct SampleGt {
    alleles: [i32; 2],
    phased:  bool,
}

/// A fully parsed data line, possibly mid-way through multi-allelic
/// decomposition: `curr_alt` names the ALT allele (1-based) the next
/// emitted record describes.
struct ParsedLine {
    chrom:         String,
    pos:           i64,
    id:            String,
    ref_allele:    String,
    alts:          Vec<String>,
    qual:          String,
    filter:        String,
    info:          String,
    genotypes:     Vec<SampleGt>,
    curr_alt:      usize,
    predecomposed: bool,
}

/// Streaming reader over a `.vcf` or bgzf-compressed `.vcf.gz` file.
///
/// Yields one `(VariantDesc, genotype bytes)` record per ALT allele:
/// a line with `m > 1` ALT alleles is decomposed into `m` records whose ALT
/// column reads `<allele>,<M>`, with every non-described alternate folded
/// into the `multi` symbol. Already-decomposed input (`X,<M>`) passes
/// through unchanged.
pub struct VcfReader {
    source:  BufReader<Box<dyn Read + Send>>,
    header:  String,
    samples: Vec<String>,
    ploidy:  Option<u8>,
    line_no: usize,
    pending: Option<ParsedLine>,
}

impl VcfReader {
    /// Open `path` and parse the meta-header and the sample list.
    /// A `.gz` extension selects bgzf/gzip decompression.
    ///
    /// # Errors
    /// On I/O failure, unknown extension, or a missing `#CHROM` line.
    pub fn open(path: &Path) -> Result<Self, VcfError> {
        let source: Box<dyn Read + Send> = match path.extension().and_then(OsStr::to_str) {
            Some("vcf") => Box::new(File::open(path)?),
            // bgzf files are concatenated gzip members.
            Some("gz") => Box::new(MultiGzDecoder::new(File::open(path)?)),
            other => return Err(VcfError::UnknownExtension(other.unwrap_or("").to_string())),
        };
        let mut source = BufReader::new(source);

        let mut header = String::new();
        let mut samples = Vec::new();
        let mut line_no = 0;
        loop {
            let mut line = String::new();
            if source.read_line(&mut line)? == 0 {
                return Err(VcfError::MissingHeaderLine);
            }
            line_no += 1;

            if line.starts_with("#CHROM") {
                samples = line
                    .trim_end()
                    .split('\t')
                    .skip(FIXED_FIELDS)
                    .map(ToString::to_string)
                    .collect();
                break;
            }
            header.push_str(&line);
        }
        debug!("Opened {}: {} sample(s)", path.display(), samples.len());

        Ok(Self { source, header, samples, ploidy: None, line_no, pending: None })
    }

    /// The meta-header: every line before `#CHROM`, newlines included.
    #[must_use]
    pub fn header(&self) -> &str {
        &self.header
    }

    #[must_use]
    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    #[must_use]
    pub fn no_samples(&self) -> u32 {
        self.samples.len() as u32
    }

    /// The ploidy of the data, detected from the first record (and enforced
    /// constant afterwards). Reads ahead by one record when necessary.
    ///
    /// # Errors
    /// When the file holds no data records, or the ploidy is not 1 or 2.
    pub fn ploidy(&mut self) -> Result<u8, VcfError> {
        if self.ploidy.is_none() && self.pending.is_none() {
            self.pending = self.parse_next_line()?;
        }
        self.ploidy.ok_or(VcfError::UnsupportedPloidy(0))
    }

    /// The next decomposed record, or `None` at end of file.
    ///
    /// # Errors
    /// On I/O failure or a malformed record.
    pub fn next_variant(&mut self) -> Result<Option<(VariantDesc, Vec<u8>)>, VcfError> {
        if self.pending.is_none() {
            self.pending = self.parse_next_line()?;
        }
        let Some(line) = self.pending.as_mut() else {
            return Ok(None);
        };

        let alt = match line.alts.len() {
            0 => ".".to_string(),
            1 => line.alts[0].clone(),
            _ => format!("{},<M>", line.alts[line.curr_alt - 1]),
        };
        let desc = VariantDesc {
            chrom:      line.chrom.clone(),
            pos:        line.pos,
            id:         line.id.clone(),
            ref_allele: line.ref_allele.clone(),
            alt,
            qual:       line.qual.clone(),
            filter:     line.filter.clone(),
            info:       line.info.clone(),
        };

        let curr_alt = line.curr_alt as i32;
        let fold = |allele: i32| -> u8 {
            if allele < 0 {
                genotype::MISSING
            } else if allele == 0 {
                genotype::REF
            } else if allele == curr_alt {
                genotype::ALT
            } else {
                genotype::MULTI
            }
        };

        let ploidy = self.ploidy.unwrap_or(2);
        let data: Vec<u8> = line
            .genotypes
            .iter()
            .map(|gt| genotype::pack([fold(gt.alleles[0]), fold(gt.alleles[1])], ploidy, gt.phased))
            .collect();

        if !line.predecomposed && line.alts.len() > 1 && line.curr_alt < line.alts.len() {
            line.curr_alt += 1;
        } else {
            self.pending = None;
        }

        Ok(Some((desc, data)))
    }

    fn parse_next_line(&mut self) -> Result<Option<ParsedLine>, VcfError> {
        let mut line = String::new();
        loop {
            line.clear();
            if self.source.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            self.line_no += 1;
            if !line.trim_end().is_empty() {
                break;
            }
        }

        let line_no = self.line_no;
        let mut fields = line.trim_end().split('\t');
        let mut next_field = |field: &'static str| {
            fields.next().ok_or(VcfError::TruncatedRecord { line: line_no, field })
        };

        let chrom = next_field("CHROM")?.to_string();
        let pos_text = next_field("POS")?;
        let pos: i64 = pos_text
            .parse()
            .map_err(|_| VcfError::InvalidPosition { line: line_no, pos: pos_text.to_string() })?;
        let id = next_field("ID")?.to_string();
        let ref_allele = next_field("REF")?.to_string();
        let alt_field = next_field("ALT")?;
        let qual = next_field("QUAL")?.to_string();
        let filter = next_field("FILTER")?.to_string();
        let info = next_field("INFO")?.to_string();
        let _format = next_field("FORMAT")?;

        let alts: Vec<String> = if alt_field == "." {
            Vec::new()
        } else {
            alt_field.split(',').map(ToString::to_string).collect()
        };
        let predecomposed = alts.len() == 2 && alts[1] == "<M>";

        let mut genotypes = Vec::with_capacity(self.samples.len());
        for _ in 0..self.samples.len() {
            let column = next_field("GT")?;
            genotypes.push(self.parse_gt(column, line_no)?);
        }

        Ok(Some(ParsedLine {
            chrom,
            pos,
            id,
            ref_allele,
            alts,
            qual,
            filter,
            info,
            genotypes,
            curr_alt: 1,
            predecomposed,
        }))
    }

    fn parse_gt(&mut self, column: &str, line_no: usize) -> Result<SampleGt, VcfError> {
        let token = column.split(':').next().unwrap_or("");
        let invalid = || VcfError::InvalidGenotype { line: line_no, genotype: column.to_string() };

        let (phased, first, second) = if let Some((a, b)) = token.split_once('|') {
            (true, a, Some(b))
        } else if let Some((a, b)) = token.split_once('/') {
            (false, a, Some(b))
        } else {
            (false, token, None)
        };

        let parse_allele = |text: &str| -> Result<i32, VcfError> {
            if text == "." {
                Ok(-1)
            } else {
                text.parse::<i32>().map_err(|_| invalid())
            }
        };

        let sample_ploidy = if second.is_some() { 2u8 } else { 1u8 };
        match self.ploidy {
            None => {
                self.ploidy = Some(sample_ploidy);
                debug!("Detected ploidy {sample_ploidy}");
            }
            Some(expected) if expected != sample_ploidy => {
                return Err(VcfError::InconsistentPloidy { line: line_no, expected });
            }
            Some(_) => {}
        }

        let alleles = [
            parse_allele(first)?,
            match second {
                Some(text) => parse_allele(text)?,
                None       => 0,
            },
        ];
        Ok(SampleGt { alleles, phased })
    }
}
