//! Channel qualification from pedestal and threshold calibration.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use vmmana_core::{BadChannel, ChannelCalibration, Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which conditions mark a channel as bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BadChannelRule {
    /// Pedestal too high, above the threshold, too close to the threshold or too low.
    #[default]
    Strict,
    /// Pedestal too high or above the threshold.
    Basic,
}

impl FromStr for BadChannelRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "basic" => Ok(Self::Basic),
            other => Err(Error::ConfigError(format!(
                "unknown bad-channel rule '{other}' (expected strict or basic)"
            ))),
        }
    }
}

impl fmt::Display for BadChannelRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Strict => "strict",
            Self::Basic => "basic",
        })
    }
}

/// Voltage limits in mV.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct QualifierLimits {
    pub max_pedestal_mv: f64,
    pub min_pedestal_mv: f64,
    /// Smallest allowed distance between threshold and pedestal.
    pub min_margin_mv: f64,
}

impl Default for QualifierLimits {
    fn default() -> Self {
        Self {
            max_pedestal_mv: 250.0,
            min_pedestal_mv: 140.0,
            min_margin_mv: 70.0,
        }
    }
}

/// Returns true if the channel fails the rule.
#[must_use]
pub fn is_bad(
    calibration: &ChannelCalibration,
    rule: BadChannelRule,
    limits: &QualifierLimits,
) -> bool {
    let pedestal = calibration.pedestal_mv;
    let basic = pedestal > limits.max_pedestal_mv || pedestal > calibration.threshold_mv;
    match rule {
        BadChannelRule::Basic => basic,
        BadChannelRule::Strict => {
            basic
                || calibration.margin_mv() < limits.min_margin_mv
                || pedestal < limits.min_pedestal_mv
        }
    }
}

/// Channels failing the rule, in input order.
#[must_use]
pub fn find_bad_channels(
    calibrations: &[ChannelCalibration],
    rule: BadChannelRule,
    limits: &QualifierLimits,
) -> Vec<BadChannel> {
    let bad: Vec<BadChannel> = calibrations
        .iter()
        .filter(|calibration| is_bad(calibration, rule, limits))
        .map(ChannelCalibration::id)
        .collect();
    log::info!(
        "{} of {} channels flagged bad ({rule} rule)",
        bad.len(),
        calibrations.len()
    );
    bad
}

/// One channel of a threshold profile.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProfilePoint {
    pub channel: u8,
    pub pedestal_mv: f64,
    pub threshold_mv: f64,
    /// Pedestal plus the configured threshold offset.
    pub expected_threshold_mv: f64,
}

/// Pedestal, measured and expected thresholds across the channels of one chip.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ThresholdProfile {
    pub vmm: u8,
    pub points: Vec<ProfilePoint>,
}

/// Groups calibrations by chip, sorted by chip and channel.
#[must_use]
pub fn threshold_profiles(
    calibrations: &[ChannelCalibration],
    offset_mv: f64,
) -> Vec<ThresholdProfile> {
    let mut by_vmm: BTreeMap<u8, Vec<ProfilePoint>> = BTreeMap::new();
    for calibration in calibrations {
        by_vmm.entry(calibration.vmm).or_default().push(ProfilePoint {
            channel: calibration.channel,
            pedestal_mv: calibration.pedestal_mv,
            threshold_mv: calibration.threshold_mv,
            expected_threshold_mv: calibration.pedestal_mv + offset_mv,
        });
    }
    by_vmm
        .into_iter()
        .map(|(vmm, mut points)| {
            points.sort_by_key(|point| point.channel);
            ThresholdProfile { vmm, points }
        })
        .collect()
}
