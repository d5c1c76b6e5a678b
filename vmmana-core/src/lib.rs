//! vmmana-core: Core types for 2D Micromegas VMM analysis.
//!
//! This crate provides the typed hit and cluster records, run collections,
//! fiducial regions, gain estimation and charge sharing.
//!

pub mod calibration;
pub mod cluster;
pub mod error;
pub mod gain;
pub mod hit;
pub mod region;
pub mod run;
pub mod sharing;

pub use calibration::{BadChannel, ChannelCalibration, ChannelVoltage};
pub use cluster::{Cluster, PlaneCluster};
pub use error::{Error, FitError, Result};
pub use gain::{GainEstimate, PlaneGains, ELECTRONS_PER_FC, PRIMARY_ELECTRONS_FE55};
pub use hit::{Hit, HitField, Plane, CHANNELS_PER_VMM};
pub use region::{Region, RegionBounds, Selection, StripRange};
pub use run::{RunCollection, SegmentSummary};
pub use sharing::{mean_charge_sharing, mean_electrons, SharingPolicy};
