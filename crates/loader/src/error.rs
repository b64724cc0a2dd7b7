//! Error types for the data loader.
//!
//! None of these escape the [`crate::DataLoader`] operations: they are
//! logged and replaced with empty results. They are public so that the
//! decode helpers and connection providers can be used on their own.

use std::path::PathBuf;

use arrow::error::ArrowError;
use ertdata_api::{QueryError, TransportError};
use ertdata_types::{FrameShapeError, InvalidBaseUrl};
use parquet::errors::ParquetError;
use thiserror::Error;

/// A response body could not be turned into the expected shape.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid parquet payload: {0}")]
    Parquet(#[from] ParquetError),

    #[error("invalid columnar payload: {0}")]
    Arrow(#[from] ArrowError),

    #[error("inconsistent table: {0}")]
    Shape(#[from] FrameShapeError),

    #[error("expected {expected} but found {found}")]
    UnexpectedShape { expected: &'static str, found: String },

    #[error("response is missing field `{0}`")]
    MissingField(&'static str),
}

/// Any failure inside a loader operation.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl From<serde_json::Error> for LoaderError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(DecodeError::Json(error))
    }
}

/// Connection info could not be resolved for a project.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot read storage server info at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid storage server info at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage server info at {path} lists no URL")]
    MissingUrl { path: PathBuf },

    #[error(transparent)]
    InvalidUrl(#[from] InvalidBaseUrl),

    #[error("no storage connection available: {0}")]
    Provider(String),
}
