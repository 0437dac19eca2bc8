use std::fmt::Write as _;
use std::path::Path;

use vcf::{VariantDesc, VcfReader};

pub const HEADER: &str = "##fileformat=VCFv4.2\n##source=gtpack-tests\n";

/// One input VCF row; descriptor fields default to unremarkable values.
#[derive(Clone)]
pub struct Row {
    pub chrom:      String,
    pub pos:        i64,
    pub id:         String,
    pub ref_allele: String,
    pub alt:        String,
    pub qual:       String,
    pub filter:     String,
    pub info:       String,
    pub gts:        Vec<String>,
}

impl Row {
    pub fn new(chrom: &str, pos: i64, gts: &[&str]) -> Self {
        Self {
            chrom:      chrom.to_string(),
            pos,
            id:         ".".to_string(),
            ref_allele: "A".to_string(),
            alt:        "G".to_string(),
            qual:       ".".to_string(),
            filter:     "PASS".to_string(),
            info:       ".".to_string(),
            gts:        gts.iter().map(ToString::to_string).collect(),
        }
    }
}

pub fn render_vcf(samples: &[&str], rows: &[Row]) -> String {
    let mut text = String::from(HEADER);
    text.push_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT");
    for sample in samples {
        let _ = write!(text, "\t{sample}");
    }
    text.push('\n');

    for row in rows {
        let _ = write!(
            text,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\tGT",
            row.chrom, row.pos, row.id, row.ref_allele, row.alt, row.qual, row.filter, row.info
        );
        for gt in &row.gts {
            let _ = write!(text, "\t{gt}");
        }
        text.push('\n');
    }
    text
}

pub fn write_vcf(path: &Path, samples: &[&str], rows: &[Row]) {
    std::fs::write(path, render_vcf(samples, rows)).unwrap();
}

/// Every record of a VCF file, as the variant layer sees it.
pub fn read_records(path: &Path) -> Vec<(VariantDesc, Vec<u8>)> {
    let mut reader = VcfReader::open(path).unwrap();
    let mut records = Vec::new();
    while let Some(record) = reader.next_variant().unwrap() {
        records.push(record);
    }
    records
}

/// A deterministic diploid genotype string, skewed towards hom-ref.
pub fn skewed_gt(seed: u64) -> String {
    let a0 = u8::from(seed.wrapping_mul(0x9e37_79b9) % 10 == 0);
    let a1 = u8::from(seed.wrapping_mul(0x85eb_ca6b) % 7 == 0);
    format!("{a0}|{a1}")
}
