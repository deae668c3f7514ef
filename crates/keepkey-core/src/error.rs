//! Error types for the core library

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid origin: {0}")]
    InvalidOrigin(String),

    #[error("Invalid hex payload: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("Invalid request id: {0}")]
    InvalidRequestId(String),

    #[error("Unknown bridge state code: {0}")]
    UnknownStateCode(i8),
}
