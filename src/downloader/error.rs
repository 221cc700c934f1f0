use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("cannot derive a filename from url: {0}")]
    NoFilename(String),

    #[error("http status {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("range request for {url} answered with status {status} instead of 206")]
    RangeNotHonored { url: String, status: u16 },

    #[error("size mismatch for {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: String,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type FetchResult<T> = Result<T, FetchError>;
