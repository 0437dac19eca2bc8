//! LZMA compression of the textual descriptor columns.
//!
//! Thin wrapper over liblzma (`xz2`), plus the shared-history scheme used
//! for the sample-header delta: compress `history` and `history + NUL +
//! text` separately at the same preset, then store only the head of the
//! combined stream and its tail from the point where it diverges from the
//! history-only stream. Identical presets make liblzma deterministic, so
//! the decoder can regenerate the history stream and splice the middle
//! back in.

use std::io::{Read, Write};

use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::CodecError;

/// Leading bytes of the combined stream always stored verbatim (stream
/// header, dictionary properties and early block bytes differ between the
/// two streams even when their inputs share a long prefix).
const HISTORY_STEM: usize = 60;

/// Compress `data` at the given preset. Empty input maps to empty output.
///
/// # Errors
/// If liblzma fails.
pub fn compress(data: &[u8], preset: u32) -> Result<Vec<u8>, CodecError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut encoder = XzEncoder::new(Vec::new(), preset);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`compress`].
///
/// # Errors
/// If the stream is not valid LZMA data.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, CodecError> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    XzDecoder::new_multi_decoder(data).read_to_end(&mut out)?;
    Ok(out)
}

/// Compress `text` against a shared `history` prefix.
///
/// Output layout: a 4-byte big-endian count of bytes (from offset
/// [`HISTORY_STEM`] on) shared between the history-only and the combined
/// stream, the first [`HISTORY_STEM`] bytes of the combined stream, and its
/// tail from the divergence point. A count of zero flags the degenerate
/// short-stream case, where the combined stream follows verbatim.
///
/// # Errors
/// If liblzma fails.
pub fn compress_with_history(history: &[u8], text: &[u8], preset: u32) -> Result<Vec<u8>, CodecError> {
    let history_comp = compress(history, preset)?;

    let mut combined = Vec::with_capacity(history.len() + text.len() + 1);
    combined.extend_from_slice(history);
    combined.push(0);
    combined.extend_from_slice(text);
    let combined_comp = compress(&combined, preset)?;

    let mut out = Vec::new();
    if history_comp.len() < HISTORY_STEM || combined_comp.len() < HISTORY_STEM {
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&combined_comp);
        return Ok(out);
    }

    let mut same = HISTORY_STEM;
    while same < history_comp.len()
        && same < combined_comp.len()
        && history_comp[same] == combined_comp[same]
    {
        same += 1;
    }

    out.extend_from_slice(&(same as u32).to_be_bytes());
    out.extend_from_slice(&combined_comp[..HISTORY_STEM]);
    out.extend_from_slice(&combined_comp[same..]);
    Ok(out)
}

/// Inverse of [`compress_with_history`]; `history` and `preset` must match
/// the compressing side.
///
/// # Errors
/// [`CodecError::Format`] when the blob does not splice back into a valid
/// stream.
pub fn decompress_with_history(history: &[u8], blob: &[u8], preset: u32) -> Result<Vec<u8>, CodecError> {
    let same_bytes: [u8; 4] = blob
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or(CodecError::Format("history-compressed blob shorter than its length field"))?;
    let same = u32::from_be_bytes(same_bytes) as usize;

    let combined_comp = if same == 0 {
        blob[4..].to_vec()
    } else {
        let history_comp = compress(history, preset)?;
        if same < HISTORY_STEM || same > history_comp.len() || blob.len() < 4 + HISTORY_STEM {
            return Err(CodecError::Format("inconsistent shared-prefix length"));
        }
        let mut stream = Vec::new();
        stream.extend_from_slice(&blob[4..4 + HISTORY_STEM]);
        stream.extend_from_slice(&history_comp[HISTORY_STEM..same]);
        stream.extend_from_slice(&blob[4 + HISTORY_STEM..]);
        stream
    };

    let combined = decompress(&combined_comp)?;
    if combined.len() < history.len() + 1 {
        return Err(CodecError::Format("history-compressed blob shorter than its history"));
    }
    Ok(combined[history.len() + 1..].to_vec())
}
