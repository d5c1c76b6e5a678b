//! JSON analysis configuration.
//!
//! Every field has a default, so an empty object `{}` is a complete
//! configuration. Command-line flags override values read from file.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use vmmana_algorithms::histogram::arange_edges;
use vmmana_algorithms::occupancy::{DEFAULT_NOISE_THRESHOLD, DEFAULT_VMM_COUNT};
use vmmana_algorithms::{BadChannelRule, FitConfig, GainRateBinning, QualifierLimits};
use vmmana_core::{PlaneGains, Region, SharingPolicy};

/// Default duration of one event file, in seconds.
pub const DEFAULT_SEGMENT_DURATION_S: f64 = 600.0;

/// Evenly spaced strip edges `start, start + step, ...` below `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeRange {
    pub start: f64,
    pub stop: f64,
    pub step: f64,
}

impl Default for EdgeRange {
    fn default() -> Self {
        Self {
            start: -0.5,
            stop: 499.5,
            step: 1.0,
        }
    }
}

impl EdgeRange {
    /// Materializes the edges.
    ///
    /// # Errors
    /// Returns a configuration error for an empty range or non-positive step.
    pub fn edges(&self) -> Result<Vec<f64>> {
        Ok(arange_edges(self.start, self.stop, self.step)?)
    }
}

/// Noisy channel scan settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Chips `0..vmm_count` are scanned.
    pub vmm_count: u8,
    /// Channels with more hits than this are noisy.
    pub threshold: u64,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            vmm_count: DEFAULT_VMM_COUNT,
            threshold: DEFAULT_NOISE_THRESHOLD,
        }
    }
}

/// Channel qualification settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualifierConfig {
    pub rule: BadChannelRule,
    pub limits: QualifierLimits,
    /// Expected distance of the threshold above the pedestal, in mV.
    pub threshold_offset_mv: f64,
}

impl Default for QualifierConfig {
    fn default() -> Self {
        Self {
            rule: BadChannelRule::default(),
            limits: QualifierLimits::default(),
            threshold_offset_mv: 100.0,
        }
    }
}

/// Settings of the external raw-data converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Converter executable.
    pub executable: PathBuf,
    /// Detector geometry file.
    pub geometry: PathBuf,
    /// Front-end time calibration file.
    pub calibration: PathBuf,
    /// Extension of raw capture files.
    pub input_extension: String,
    /// Bunch crossing clock in MHz.
    pub bc_clock: u32,
    /// TAC slope in ns.
    pub tac_slope: u32,
    pub threshold: u32,
    /// Minimum cluster size per plane.
    pub cluster_size: u32,
    /// Minimum summed cluster size over both planes.
    pub combined_cluster_size: u32,
    /// Missing strips allowed inside a cluster.
    pub missing_strips: u32,
    /// Maximum time between hits of a cluster, in ns.
    pub delta_time_hits: u32,
    /// Maximum span of a cluster, in ns.
    pub span_cluster: u32,
    /// Maximum time between the planes of a cluster, in ns.
    pub delta_time_planes: u32,
    /// Lower bound of the charge ratio between planes.
    pub charge_ratio_lower: u32,
    /// Upper bound of the charge ratio between planes.
    pub charge_ratio_upper: u32,
    /// Which record kinds to save.
    pub save: String,
    pub info: String,
    pub data_format: String,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("convertFile"),
            geometry: PathBuf::from("geometry.json"),
            calibration: PathBuf::from("vmm_calibration.json"),
            input_extension: "pcapng".to_string(),
            bc_clock: 40,
            tac_slope: 60,
            threshold: 0,
            cluster_size: 2,
            combined_cluster_size: 4,
            missing_strips: 1,
            delta_time_hits: 200,
            span_cluster: 1500,
            delta_time_planes: 200,
            charge_ratio_lower: 0,
            charge_ratio_upper: 1000,
            save: "[[1],[1],[1]]".to_string(),
            info: "vmmana".to_string(),
            data_format: "SRS".to_string(),
        }
    }
}

/// Everything an invocation needs besides its input paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Duration covered by one event file, in seconds.
    pub segment_duration_s: f64,
    /// Preamplifier gains of the two planes.
    pub gains: PlaneGains,
    pub fit: FitConfig,
    pub sharing: SharingPolicy,
    /// Regions analysed in addition to all clusters.
    pub regions: Vec<Region>,
    pub strip_edges: EdgeRange,
    /// Gain binning of run comparisons.
    pub compare: GainRateBinning,
    pub noise: NoiseConfig,
    pub qualifier: QualifierConfig,
    pub converter: ConverterConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            segment_duration_s: DEFAULT_SEGMENT_DURATION_S,
            gains: PlaneGains::default(),
            fit: FitConfig::default(),
            sharing: SharingPolicy::default(),
            regions: Region::QUADRANTS.to_vec(),
            strip_edges: EdgeRange::default(),
            compare: GainRateBinning::default(),
            noise: NoiseConfig::default(),
            qualifier: QualifierConfig::default(),
            converter: ConverterConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid JSON or
    /// holds invalid values.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let reader = BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        log::debug!("loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Loads configuration from a JSON string.
    ///
    /// # Errors
    /// Returns an error if the string is not valid JSON or holds invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks values that the type system cannot.
    ///
    /// # Errors
    /// Returns a configuration error naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.gains.validate()?;
        if !(self.segment_duration_s.is_finite() && self.segment_duration_s > 0.0) {
            return Err(vmmana_core::Error::ConfigError(format!(
                "segment duration must be positive, got {} s",
                self.segment_duration_s
            ))
            .into());
        }
        self.strip_edges.edges()?;
        self.fit.validate()?;
        self.compare.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_object_is_default() {
        let config = AnalysisConfig::from_json("{}").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.fit.bins, 100);
        assert_eq!(config.regions, Region::QUADRANTS.to_vec());
        assert_eq!(config.strip_edges.edges().unwrap().len(), 500);
    }

    #[test]
    fn test_partial_override() {
        let json = r#"{
            "segment_duration_s": 300.0,
            "gains": { "x_mv_per_fc": 9.0, "y_mv_per_fc": 4.5 },
            "fit": { "sigma_seed": 800.0 },
            "regions": ["a", "bottom left"],
            "sharing": "propagate",
            "qualifier": { "rule": "basic" }
        }"#;
        let config = AnalysisConfig::from_json(json).unwrap();
        assert!((config.segment_duration_s - 300.0).abs() < f64::EPSILON);
        assert!((config.gains.x_mv_per_fc - 9.0).abs() < f64::EPSILON);
        assert!((config.fit.sigma_seed - 800.0).abs() < f64::EPSILON);
        assert_eq!(config.fit.bins, 100);
        assert_eq!(config.regions, vec![Region::A, Region::BottomLeft]);
        assert_eq!(config.sharing, SharingPolicy::Propagate);
        assert_eq!(config.qualifier.rule, BadChannelRule::Basic);
        assert!((config.qualifier.limits.max_pedestal_mv - 250.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            AnalysisConfig::from_json(r#"{"regions": ["e"]}"#),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_json(r#"{"gains": {"x_mv_per_fc": 0.0, "y_mv_per_fc": 4.5}}"#),
            Err(Error::CoreError(_))
        ));
        assert!(AnalysisConfig::from_json(r#"{"segment_duration_s": -1.0}"#).is_err());
    }

    #[test]
    fn test_invalid_fit_settings_fail_fast() {
        let json = r#"{"fit": {"bins": 0, "shape_seeds": [], "z_cut": -1.0}}"#;
        assert!(matches!(
            AnalysisConfig::from_json(json),
            Err(Error::CoreError(vmmana_core::Error::ConfigError(_)))
        ));
        assert!(AnalysisConfig::from_json(r#"{"fit": {"shape_seeds": []}}"#).is_err());
        assert!(
            AnalysisConfig::from_json(r#"{"compare": {"min": 5000.0, "max": 5000.0}}"#).is_err()
        );
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let config = AnalysisConfig {
            segment_duration_s: 120.0,
            ..AnalysisConfig::default()
        };
        file.write_all(config.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(AnalysisConfig::from_file(file.path()).unwrap(), config);
    }
}
