mod common;

use common::{read_records, skewed_gt, write_vcf, Row};
use parser::OutputArgs;
use pretty_assertions::assert_eq;

fn plain_output() -> OutputArgs {
    OutputArgs { compressed: false, compression_level: 1 }
}

/// A database of `no_samples` diploid samples over `no_variants` rows at
/// positions `100, 110, 120, ...` on chr1.
fn build_db(dir: &std::path::Path, no_samples: u64, no_variants: u64) -> (std::path::PathBuf, Vec<Row>) {
    let input = dir.join("db_in.vcf");
    let db = dir.join("db");

    let samples: Vec<String> = (0..no_samples).map(|i| format!("S{i}")).collect();
    let sample_refs: Vec<&str> = samples.iter().map(String::as_str).collect();

    let rows: Vec<Row> = (0..no_variants)
        .map(|i| {
            let gts: Vec<String> = (0..no_samples).map(|s| skewed_gt(i * no_samples + s)).collect();
            let gt_refs: Vec<&str> = gts.iter().map(String::as_str).collect();
            Row::new("chr1", 100 + i as i64 * 10, &gt_refs)
        })
        .collect();
    write_vcf(&input, &sample_refs, &rows);

    gtpack_rs::application::compress_db::run(&input, &db, 10).unwrap();
    (db, rows)
}

#[test]
fn extract_sample_from_database() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.vcf");
    let db = dir.path().join("db");
    let out = dir.path().join("b.vcf");

    write_vcf(&input, &["A", "B", "C"], &[Row::new("chr1", 100, &["0|0", "0|1", "1|1"])]);
    gtpack_rs::application::compress_db::run(&input, &db, 10).unwrap();

    gtpack_rs::application::extract_sample::run(&db, "B", &out, plain_output()).unwrap();

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains("\tFORMAT\tB\n"));
    assert!(text.ends_with("chr1\t100\t.\tA\tG\t.\tPASS\t.\tGT\t0|1\n"));
}

#[test]
fn extract_sample_tracks_across_variants() {
    let dir = tempfile::tempdir().unwrap();
    let (db, rows) = build_db(dir.path(), 8, 120);
    let out = dir.path().join("s3.vcf");

    gtpack_rs::application::extract_sample::run(&db, "S3", &out, plain_output()).unwrap();

    let extracted = read_records(&out);
    assert_eq!(extracted.len(), rows.len());
    for (record, row) in extracted.iter().zip(&rows) {
        assert_eq!(record.0.pos, row.pos);
        assert_eq!(format!("{}|{}", record.1[0] & 0b11, (record.1[0] >> 2) & 0b11), row.gts[3]);
    }
}

#[test]
fn unknown_sample_is_a_fatal_lookup_error() {
    let dir = tempfile::tempdir().unwrap();
    let (db, _) = build_db(dir.path(), 3, 5);

    let result = gtpack_rs::application::extract_sample::run(
        &db,
        "NOT_THERE",
        &dir.path().join("x.vcf"),
        plain_output(),
    );
    assert!(result.unwrap_err().to_string().contains("does not exist"));
}

#[test]
fn sample_roundtrip_aligned() {
    let dir = tempfile::tempdir().unwrap();
    let (db, rows) = build_db(dir.path(), 3, 100);

    // A new sample aligned one-to-one with the database variants.
    let sample_rows: Vec<Row> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let gt = skewed_gt(0xABCD + i as u64);
            Row::new(&row.chrom, row.pos, &[gt.as_str()])
        })
        .collect();
    let sample_vcf = dir.path().join("sample.vcf");
    write_vcf(&sample_vcf, &["NEW"], &sample_rows);

    let packed = dir.path().join("sample.gts");
    let restored = dir.path().join("restored.vcf");

    gtpack_rs::application::compress_sample::run(&db, &sample_vcf, &packed, false, false).unwrap();
    gtpack_rs::application::decompress_sample::run(&db, &packed, &restored, plain_output()).unwrap();

    assert_eq!(read_records(&restored), read_records(&sample_vcf));

    let text = std::fs::read_to_string(&restored).unwrap();
    assert!(text.contains("\tFORMAT\tNEW\n"));
}

#[test]
fn sample_roundtrip_with_extra_variants() {
    let dir = tempfile::tempdir().unwrap();
    let (db, rows) = build_db(dir.path(), 3, 100);

    // The sample omits five database variants and carries seven private
    // ones at interleaved positions.
    let omitted = [10usize, 25, 40, 60, 85];
    let private_pos = [105i64, 255, 405, 555, 705, 855, 1005];

    let mut sample_rows: Vec<Row> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if omitted.contains(&i) {
            continue;
        }
        let gt = skewed_gt(0xFEED + i as u64);
        sample_rows.push(Row::new(&row.chrom, row.pos, &[gt.as_str()]));
    }
    for (k, &pos) in private_pos.iter().enumerate() {
        let mut row = Row::new("chr1", pos, &[if k % 2 == 0 { "1|0" } else { "0|1" }]);
        row.id = format!("rs{k}");
        row.ref_allele = "C".to_string();
        row.alt = "T".to_string();
        sample_rows.push(row);
    }
    sample_rows.sort_by_key(|row| row.pos);
    assert_eq!(sample_rows.len(), 102);

    let sample_vcf = dir.path().join("sample.vcf");
    write_vcf(&sample_vcf, &["NEW"], &sample_rows);

    let packed = dir.path().join("sample.gts");
    let restored = dir.path().join("restored.vcf");

    gtpack_rs::application::compress_sample::run(&db, &sample_vcf, &packed, false, true).unwrap();
    gtpack_rs::application::decompress_sample::run(&db, &packed, &restored, plain_output()).unwrap();

    let restored_records = read_records(&restored);
    assert_eq!(restored_records.len(), 102);
    assert_eq!(restored_records, read_records(&sample_vcf));
}

#[test]
fn sample_header_is_stored_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let (db, rows) = build_db(dir.path(), 3, 10);

    let sample_rows: Vec<Row> = rows
        .iter()
        .map(|row| Row::new(&row.chrom, row.pos, &["0|1"]))
        .collect();
    let sample_vcf = dir.path().join("sample.vcf");

    // Give the sample file its own distinctive header line.
    let mut text = common::render_vcf(&["NEW"], &sample_rows);
    text = text.replace("##source=gtpack-tests", "##source=private-caller-v3");
    std::fs::write(&sample_vcf, text).unwrap();

    let packed = dir.path().join("sample.gts");
    let restored = dir.path().join("restored.vcf");

    gtpack_rs::application::compress_sample::run(&db, &sample_vcf, &packed, true, false).unwrap();
    gtpack_rs::application::decompress_sample::run(&db, &packed, &restored, plain_output()).unwrap();

    let restored_text = std::fs::read_to_string(&restored).unwrap();
    assert!(restored_text.contains("##source=private-caller-v3"));

    // Without -sh the database header is used instead.
    gtpack_rs::application::compress_sample::run(&db, &sample_vcf, &packed, false, false).unwrap();
    gtpack_rs::application::decompress_sample::run(&db, &packed, &restored, plain_output()).unwrap();
    let restored_text = std::fs::read_to_string(&restored).unwrap();
    assert!(restored_text.contains("##source=gtpack-tests"));
}

#[test]
fn multi_sample_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (db, rows) = build_db(dir.path(), 3, 5);

    let bad_rows: Vec<Row> =
        rows.iter().map(|row| Row::new(&row.chrom, row.pos, &["0|1", "1|1"])).collect();
    let bad_vcf = dir.path().join("two_samples.vcf");
    write_vcf(&bad_vcf, &["X", "Y"], &bad_rows);

    let result = gtpack_rs::application::compress_sample::run(
        &db,
        &bad_vcf,
        &dir.path().join("out.gts"),
        false,
        false,
    );
    assert!(result.unwrap_err().to_string().contains("exactly 1 sample"));
}
