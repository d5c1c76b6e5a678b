//! Front-end calibration records.

use crate::{Error, Result};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One row of a pedestal or threshold calibration table.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelVoltage {
    /// VMM chip id.
    pub vmm: u8,
    /// Channel on the chip.
    pub channel: u8,
    /// Measured voltage in mV.
    pub voltage_mv: f64,
}

/// Pedestal and measured threshold of one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelCalibration {
    /// VMM chip id.
    pub vmm: u8,
    /// Channel on the chip.
    pub channel: u8,
    /// Baseline voltage in mV.
    pub pedestal_mv: f64,
    /// Measured threshold voltage in mV.
    pub threshold_mv: f64,
}

impl ChannelCalibration {
    /// Creates a calibration row.
    #[must_use]
    pub fn new(vmm: u8, channel: u8, pedestal_mv: f64, threshold_mv: f64) -> Self {
        Self {
            vmm,
            channel,
            pedestal_mv,
            threshold_mv,
        }
    }

    /// Distance between measured threshold and pedestal.
    #[inline]
    #[must_use]
    pub fn margin_mv(&self) -> f64 {
        (self.threshold_mv - self.pedestal_mv).abs()
    }

    /// The channel this row describes.
    #[must_use]
    pub fn id(&self) -> BadChannel {
        BadChannel {
            vmm: self.vmm,
            channel: self.channel,
        }
    }
}

/// A (VMM, channel) pair flagged for masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BadChannel {
    /// VMM chip id.
    pub vmm: u8,
    /// Channel on the chip.
    pub channel: u8,
}

impl fmt::Display for BadChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VMM {} channel {}", self.vmm, self.channel)
    }
}

/// Pairs pedestal and threshold tables row by row.
///
/// # Errors
/// Returns `LengthMismatch` if the tables differ in length and `ConfigError`
/// if a row refers to different channels in the two tables.
pub fn pair_tables(
    pedestals: &[ChannelVoltage],
    thresholds: &[ChannelVoltage],
) -> Result<Vec<ChannelCalibration>> {
    if pedestals.len() != thresholds.len() {
        return Err(Error::LengthMismatch {
            column: "threshold",
            expected: pedestals.len(),
            found: thresholds.len(),
        });
    }

    pedestals
        .iter()
        .zip(thresholds)
        .enumerate()
        .map(|(row, (pedestal, threshold))| {
            if (pedestal.vmm, pedestal.channel) != (threshold.vmm, threshold.channel) {
                return Err(Error::ConfigError(format!(
                    "row {row}: pedestal is for VMM {} channel {} but threshold is for VMM {} channel {}",
                    pedestal.vmm, pedestal.channel, threshold.vmm, threshold.channel
                )));
            }
            Ok(ChannelCalibration::new(
                pedestal.vmm,
                pedestal.channel,
                pedestal.voltage_mv,
                threshold.voltage_mv,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(vmm: u8, channel: u8, voltage_mv: f64) -> ChannelVoltage {
        ChannelVoltage {
            vmm,
            channel,
            voltage_mv,
        }
    }

    #[test]
    fn test_pair_tables() {
        let pedestals = vec![row(0, 0, 170.0), row(0, 1, 180.0)];
        let thresholds = vec![row(0, 0, 270.0), row(0, 1, 285.0)];
        let paired = pair_tables(&pedestals, &thresholds).unwrap();
        assert_eq!(paired.len(), 2);
        assert!((paired[1].margin_mv() - 105.0).abs() < f64::EPSILON);
        assert_eq!(paired[1].id(), BadChannel { vmm: 0, channel: 1 });
    }

    #[test]
    fn test_pair_tables_mismatch() {
        let pedestals = vec![row(0, 0, 170.0)];
        assert!(matches!(
            pair_tables(&pedestals, &[]),
            Err(Error::LengthMismatch { .. })
        ));
        assert!(matches!(
            pair_tables(&pedestals, &[row(1, 0, 250.0)]),
            Err(Error::ConfigError(_))
        ));
    }
}
