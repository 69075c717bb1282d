use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KoshelfError {
    #[error("invalid book path {}: missing file extension", .path.display())]
    MissingExtension { path: PathBuf },

    #[error("parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("book not in library: {0}")]
    UnknownBook(String),

    #[error("{0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, KoshelfError>;
