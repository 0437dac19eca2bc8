use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Failed to read or write a codec file")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Coder(#[from] rcoder::CoderError),

    #[error("Malformed compressed data: {0}")]
    Format(&'static str),

    #[error("Schema mismatch: {0}")]
    Schema(String),
}
