use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoderError {
    #[error("Failed to read or write the coded byte stream")]
    Io(#[from] std::io::Error),

    #[error("Decoded a cumulative frequency outside the model range: the stream is corrupt")]
    CorruptStream,
}
