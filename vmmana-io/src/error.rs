//! I/O error types.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),

    /// Invalid file format.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Malformed row in a text table.
    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// A run folder without event files.
    #[error("no event files found in {}", .0.display())]
    NoRunFiles(PathBuf),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Json(#[from] serde_json::Error),

    /// The converter executable could not be started.
    #[error("failed to start converter {program}: {source}")]
    ConverterSpawn {
        program: PathBuf,
        source: std::io::Error,
    },

    /// The converter exited unsuccessfully.
    #[error("converter failed on {}: {status}", input.display())]
    ConverterFailed {
        input: PathBuf,
        status: std::process::ExitStatus,
    },

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] vmmana_core::Error),
}
