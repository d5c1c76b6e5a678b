//! vmmana-io: File I/O for vmmana.
//!
//! This crate reads HDF5 event files and run folders, calibration tables
//! and JSON configuration, writes CSV artifacts and drives the external
//! raw-data converter.
//!

pub mod calibration;
pub mod config;
pub mod convert;
mod error;
#[cfg(feature = "hdf5")]
pub mod event_store;
pub mod writer;

pub use calibration::{read_calibration, read_calibration_table};
pub use config::{AnalysisConfig, ConverterConfig, EdgeRange, NoiseConfig, QualifierConfig};
pub use convert::{ConversionReport, Converter};
pub use error::{Error, Result};
#[cfg(feature = "hdf5")]
pub use event_store::{
    discover_run_files, load_run, read_clusters, read_event_file, read_hits, write_event_file,
    EventFile,
};
pub use writer::{ArtifactWriter, FitSummaryRow};
