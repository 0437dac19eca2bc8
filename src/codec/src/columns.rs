//! NUL-delimited text columns.
//!
//! Descriptor fields are stored column-wise: one byte buffer per VCF
//! column, each value terminated by a NUL. Numbers (the POS deltas) are
//! spelled as decimal strings so the LZMA stage sees pure text.

use crate::CodecError;

pub(crate) fn append_text(buf: &mut Vec<u8>, text: &str) {
    buf.extend_from_slice(text.as_bytes());
    buf.push(0);
}

pub(crate) fn append_number(buf: &mut Vec<u8>, value: i64) {
    append_text(buf, &value.to_string());
}

/// Read cursor over one decompressed column.
pub(crate) struct TextColumn {
    data:   Vec<u8>,
    cursor: usize,
}

impl TextColumn {
    pub(crate) fn new(data: Vec<u8>) -> Self {
        Self { data, cursor: 0 }
    }

    pub(crate) fn read_text(&mut self) -> Result<String, CodecError> {
        if self.cursor >= self.data.len() {
            return Err(CodecError::Format("descriptor column exhausted"));
        }
        let start = self.cursor;
        while self.cursor < self.data.len() && self.data[self.cursor] != 0 {
            self.cursor += 1;
        }
        let text = String::from_utf8_lossy(&self.data[start..self.cursor]).into_owned();
        self.cursor += 1; // NUL
        Ok(text)
    }

    pub(crate) fn read_number(&mut self) -> Result<i64, CodecError> {
        self.read_text()?
            .parse()
            .map_err(|_| CodecError::Format("non-numeric value in a numeric descriptor column"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_number_roundtrip() {
        let mut buf = Vec::new();
        append_text(&mut buf, "chr1");
        append_text(&mut buf, "");
        append_number(&mut buf, -42);

        let mut column = TextColumn::new(buf);
        assert_eq!(column.read_text().unwrap(), "chr1");
        assert_eq!(column.read_text().unwrap(), "");
        assert_eq!(column.read_number().unwrap(), -42);
        assert!(column.read_text().is_err());
    }
}
