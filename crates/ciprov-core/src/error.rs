//! Error types for ciprov.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("payload error: {0}")]
    Payload(String),
}

pub type Result<T> = std::result::Result<T, Error>;
