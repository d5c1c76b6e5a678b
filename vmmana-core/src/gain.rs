//! Conversion of cluster amplitudes into electron counts and gain.
//!
//! One ADC count is taken as one mV at the preamplifier output, so an
//! amplitude divided by the preamp gain (mV/fC) is a charge in fC.

use crate::cluster::Cluster;
use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Electrons per femtocoulomb.
pub const ELECTRONS_PER_FC: f64 = 6240.0;

/// Mean number of primary electrons from a 5.9 keV X-ray in Ar/CO2 70:30.
pub const PRIMARY_ELECTRONS_FE55: f64 = 167.5;

/// Preamplifier gain setting of each plane, in mV/fC.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaneGains {
    /// Plane 0 (x) gain.
    pub x_mv_per_fc: f64,
    /// Plane 1 (y) gain.
    pub y_mv_per_fc: f64,
}

impl Default for PlaneGains {
    fn default() -> Self {
        Self {
            x_mv_per_fc: 16.0,
            y_mv_per_fc: 4.5,
        }
    }
}

impl PlaneGains {
    /// Creates validated plane gains.
    ///
    /// # Errors
    /// Returns `ConfigError` unless both gains are finite and positive.
    pub fn new(x_mv_per_fc: f64, y_mv_per_fc: f64) -> Result<Self> {
        let gains = Self {
            x_mv_per_fc,
            y_mv_per_fc,
        };
        gains.validate()?;
        Ok(gains)
    }

    /// Checks that both gains are finite and positive.
    ///
    /// # Errors
    /// Returns `ConfigError` naming the offending plane.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [("x", self.x_mv_per_fc), ("y", self.y_mv_per_fc)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::ConfigError(format!(
                    "{label} plane gain must be positive, got {value} mV/fC"
                )));
            }
        }
        Ok(())
    }
}

/// Electron counts and gain derived from one cluster.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GainEstimate {
    /// Electrons collected on plane 0.
    pub electrons_x: f64,
    /// Electrons collected on plane 1.
    pub electrons_y: f64,
    /// Sum over both planes.
    pub electrons: f64,
    /// Total electrons per primary electron.
    pub gain: f64,
}

impl GainEstimate {
    /// Derives electron counts and gain from plane amplitudes.
    #[inline]
    #[must_use]
    pub fn from_amplitudes(adc0: f64, adc1: f64, gains: &PlaneGains) -> Self {
        let electrons_x = ELECTRONS_PER_FC * adc0 / gains.x_mv_per_fc;
        let electrons_y = ELECTRONS_PER_FC * adc1 / gains.y_mv_per_fc;
        let electrons = electrons_x + electrons_y;
        Self {
            electrons_x,
            electrons_y,
            electrons,
            gain: electrons / PRIMARY_ELECTRONS_FE55,
        }
    }

    /// Ratio of plane 0 to plane 1 electrons.
    #[inline]
    #[must_use]
    pub fn sharing_ratio(&self) -> f64 {
        self.electrons_x / self.electrons_y
    }
}

/// Derives the gain estimate of one cluster.
#[inline]
#[must_use]
pub fn estimate(cluster: &Cluster, gains: &PlaneGains) -> GainEstimate {
    GainEstimate::from_amplitudes(cluster.adc0(), cluster.adc1(), gains)
}

/// Derives gain estimates for every cluster, in order.
#[must_use]
pub fn estimate_all(clusters: &[Cluster], gains: &PlaneGains) -> Vec<GainEstimate> {
    clusters.iter().map(|cluster| estimate(cluster, gains)).collect()
}

/// Extracts the gain column of a set of estimates.
#[must_use]
pub fn gain_values(estimates: &[GainEstimate]) -> Vec<f64> {
    estimates.iter().map(|estimate| estimate.gain).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_electrons_per_plane() {
        let gains = PlaneGains::new(9.0, 4.5).unwrap();
        let estimate = GainEstimate::from_amplitudes(9.0, 2.25, &gains);
        assert_relative_eq!(estimate.electrons_x, 6240.0);
        assert_relative_eq!(estimate.electrons_y, 3120.0);
        assert_relative_eq!(estimate.electrons, 9360.0);
        assert_relative_eq!(estimate.gain, 9360.0 / 167.5);
        assert_relative_eq!(estimate.sharing_ratio(), 2.0);
    }

    #[test]
    fn test_estimate_all_preserves_order() {
        let gains = PlaneGains::default();
        let clusters = vec![
            Cluster::new(0.0, 0.0, 16.0, 4.5),
            Cluster::new(0.0, 0.0, 32.0, 9.0),
        ];
        let estimates = estimate_all(&clusters, &gains);
        assert_eq!(estimates.len(), 2);
        assert_relative_eq!(estimates[0].electrons, 2.0 * ELECTRONS_PER_FC);
        assert_relative_eq!(estimates[1].electrons, 4.0 * ELECTRONS_PER_FC);
        assert_eq!(gain_values(&estimates).len(), 2);
    }

    #[test]
    fn test_plane_gains_validation() {
        assert!(PlaneGains::new(0.0, 4.5).is_err());
        assert!(PlaneGains::new(9.0, -1.0).is_err());
        assert!(PlaneGains::new(f64::INFINITY, 4.5).is_err());
        assert!(PlaneGains::new(9.0, 4.5).is_ok());
    }

    #[test]
    fn test_zero_y_amplitude_gives_infinite_ratio() {
        let gains = PlaneGains::default();
        let estimate = GainEstimate::from_amplitudes(10.0, 0.0, &gains);
        assert!(estimate.sharing_ratio().is_infinite());
    }
}
