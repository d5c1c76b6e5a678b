//! vmmana-algorithms: Numerical analyses for 2D Micromegas VMM data.
//!
//! This crate provides:
//! - **Histograms** - weighted 1D/2D binning with explicit edges
//! - **Crystal Ball** - line shape density and CDF
//! - **Peak fitting** - outlier-robust weighted Levenberg-Marquardt fit
//! - **Gain analysis** - selection, gain, fit and charge sharing in one pass
//! - **Occupancy** - strip hit rates, cluster maps, activity and noisy channels
//! - **Qualification** - bad channels from pedestal/threshold calibration
//!

pub mod analysis;
pub mod crystal_ball;
pub mod fit;
pub mod histogram;
pub mod occupancy;
pub mod qualify;

pub use analysis::{
    analyze_gain, region_gain_rates, FitOutcome, GainFit, GainRateBinning, GainReport,
    RegionGainRate, FIT_COLUMNS,
};
pub use crystal_ball::CrystalBall;
pub use fit::{fit_crystal_ball, zscore_filter, FitConfig, Measurement, PeakFit};
pub use histogram::{strip_edges, Histogram1D, Histogram2D};
pub use occupancy::{
    activity_timeline, channel_counts, cluster_rate_map, field_histograms, hit_rate,
    noisy_channels, ActivityPoint, NoisyChannel,
};
pub use qualify::{
    find_bad_channels, is_bad, threshold_profiles, BadChannelRule, ProfilePoint,
    QualifierLimits, ThresholdProfile,
};
