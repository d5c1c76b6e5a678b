//! Gain analysis pipeline: selection, gain estimation, peak fit and charge sharing.

use crate::fit::{fit_histogram, prepare_histogram, FitConfig, PeakFit};
use crate::histogram::Histogram1D;
use vmmana_core::gain::{estimate_all, gain_values};
use vmmana_core::{
    mean_charge_sharing, mean_electrons, Cluster, Error, FitError, PlaneGains, Region, Result,
    Selection, SharingPolicy,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Column names of [`FitOutcome::values`].
pub const FIT_COLUMNS: [&str; 11] = [
    "beta",
    "beta_err",
    "m",
    "m_err",
    "mu",
    "mu_err",
    "sigma",
    "sigma_err",
    "charge_sharing",
    "electrons_x",
    "electrons_y",
];

/// A trusted gain peak with the plane quantities of the same cluster set.
#[derive(Debug, Clone, PartialEq)]
pub struct GainFit {
    pub peak: PeakFit,
    pub charge_sharing: f64,
    pub mean_electrons_x: f64,
    pub mean_electrons_y: f64,
}

/// Result of fitting one selection.
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome {
    Success(GainFit),
    Failed(FitError),
}

impl FitOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The eleven summary values in [`FIT_COLUMNS`] order; all NaN on failure.
    #[must_use]
    pub fn values(&self) -> [f64; 11] {
        match self {
            Self::Success(fit) => {
                let p = &fit.peak;
                [
                    p.beta.value,
                    p.beta.error,
                    p.m.value,
                    p.m.error,
                    p.mu.value,
                    p.mu.error,
                    p.sigma.value,
                    p.sigma.error,
                    fit.charge_sharing,
                    fit.mean_electrons_x,
                    fit.mean_electrons_y,
                ]
            }
            Self::Failed(_) => [f64::NAN; 11],
        }
    }

    /// Failure diagnostic, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Success(_) => None,
            Self::Failed(err) => Some(err.to_string()),
        }
    }

    #[must_use]
    pub fn peak(&self) -> Option<&PeakFit> {
        match self {
            Self::Success(fit) => Some(&fit.peak),
            Self::Failed(_) => None,
        }
    }
}

/// Everything the gain pipeline produces for one selection.
#[derive(Debug, Clone)]
pub struct GainReport {
    pub selection: Selection,
    /// Clusters inside the selection.
    pub clusters: usize,
    /// Gain histogram after outlier rejection; absent if too few samples survived.
    pub histogram: Option<Histogram1D>,
    pub outcome: FitOutcome,
}

impl GainReport {
    /// Fitted density at the histogram bin centres, next to the measured density.
    ///
    /// Rows are `(center, measured, fitted)`. Empty unless the fit succeeded.
    #[must_use]
    pub fn fit_curve(&self) -> Vec<(f64, f64, f64)> {
        match (&self.histogram, self.outcome.peak()) {
            (Some(hist), Some(peak)) => hist
                .centers()
                .into_iter()
                .zip(hist.density())
                .map(|(x, measured)| (x, measured, peak.density_at(x)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Runs the gain pipeline on the clusters inside `selection`.
///
/// Fit failures are reported in the outcome and logged; they are not errors.
#[must_use]
pub fn analyze_gain(
    clusters: &[Cluster],
    gains: &PlaneGains,
    selection: Selection,
    fit_config: &FitConfig,
    sharing: SharingPolicy,
) -> GainReport {
    let selected = selection.apply(clusters);
    let estimates = estimate_all(&selected, gains);
    let values = gain_values(&estimates);

    let (histogram, fitted) = match prepare_histogram(&values, fit_config) {
        Ok(hist) => {
            let fitted = fit_histogram(&hist, fit_config);
            (Some(hist), fitted)
        }
        Err(err) => (None, Err(err)),
    };

    let outcome = match fitted {
        Ok(peak) => {
            let (mean_electrons_x, mean_electrons_y) = mean_electrons(&estimates);
            log::info!(
                "{selection}: gain peak at {:.1} +/- {:.1} from {} clusters",
                peak.mu.value,
                peak.mu.error,
                selected.len()
            );
            FitOutcome::Success(GainFit {
                peak,
                charge_sharing: mean_charge_sharing(&estimates, sharing),
                mean_electrons_x,
                mean_electrons_y,
            })
        }
        Err(err) => {
            log::warn!("{selection}: gain fit failed: {err}");
            FitOutcome::Failed(err)
        }
    };

    GainReport {
        selection,
        clusters: selected.len(),
        histogram,
        outcome,
    }
}

/// Binning of the per-region gain rate histograms.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GainRateBinning {
    pub min: f64,
    pub max: f64,
    pub bins: usize,
}

impl Default for GainRateBinning {
    fn default() -> Self {
        Self {
            min: 2000.0,
            max: 15000.0,
            bins: 100,
        }
    }
}

impl GainRateBinning {
    /// Checks that the binning describes at least one non-empty bin.
    ///
    /// # Errors
    /// Returns `ConfigError` naming the offending value.
    pub fn validate(&self) -> Result<()> {
        if self.bins == 0 {
            return Err(Error::ConfigError(
                "gain rate binning needs at least one bin".to_string(),
            ));
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.max > self.min) {
            return Err(Error::ConfigError(format!(
                "gain rate range [{}, {}] is empty",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Gain rate histogram and charge sharing of one region of one run.
#[derive(Debug, Clone)]
pub struct RegionGainRate {
    pub region: Region,
    /// Clusters per second per gain bin.
    pub histogram: Histogram1D,
    pub charge_sharing: f64,
}

/// Gain rate histograms of the given regions, normalized by `duration_s`.
///
/// # Errors
/// Returns `ConfigError` for a non-positive duration or invalid binning.
pub fn region_gain_rates(
    clusters: &[Cluster],
    gains: &PlaneGains,
    duration_s: f64,
    regions: &[Region],
    binning: &GainRateBinning,
    sharing: SharingPolicy,
) -> Result<Vec<RegionGainRate>> {
    if !(duration_s.is_finite() && duration_s > 0.0) {
        return Err(Error::ConfigError(format!(
            "data-taking duration must be positive, got {duration_s} s"
        )));
    }
    binning.validate()?;
    let weight = 1.0 / duration_s;

    regions
        .iter()
        .map(|&region| {
            let estimates = estimate_all(&Selection::Region(region).apply(clusters), gains);
            let mut histogram = Histogram1D::uniform(binning.bins, binning.min, binning.max)?;
            for estimate in &estimates {
                histogram.fill_weighted(estimate.gain, weight);
            }
            Ok(RegionGainRate {
                region,
                histogram,
                charge_sharing: mean_charge_sharing(&estimates, sharing),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_small_selection_fails_with_nan_values() {
        let clusters: Vec<Cluster> = (0..50)
            .map(|i| Cluster::new(300.0, 300.0, 100.0 + f64::from(i), 50.0))
            .collect();
        let report = analyze_gain(
            &clusters,
            &PlaneGains::default(),
            Selection::Region(Region::B),
            &FitConfig::default(),
            SharingPolicy::default(),
        );
        assert_eq!(report.clusters, 50);
        assert!(report.histogram.is_none());
        assert!(report.outcome.values().iter().all(|v| v.is_nan()));
        assert!(report.outcome.message().unwrap().contains("only 50 samples"));
        assert!(report.fit_curve().is_empty());
    }

    #[test]
    fn test_empty_region() {
        let clusters = vec![Cluster::new(10.0, 10.0, 100.0, 50.0)];
        let report = analyze_gain(
            &clusters,
            &PlaneGains::default(),
            Selection::Region(Region::A),
            &FitConfig::default(),
            SharingPolicy::default(),
        );
        assert_eq!(report.clusters, 0);
        assert!(!report.outcome.is_success());
    }

    #[test]
    fn test_region_gain_rates() {
        let gains = PlaneGains::new(1.0, 1.0).unwrap();
        // gain = 6240 * (adc0 + adc1) / 167.5, so adc sum 167.5 gives 6240.
        let clusters = vec![
            Cluster::new(300.0, 200.0, 100.0, 67.5),
            Cluster::new(300.0, 200.0, 100.0, 67.5),
            Cluster::new(200.0, 200.0, 100.0, 67.5),
        ];
        let rates = region_gain_rates(
            &clusters,
            &gains,
            10.0,
            &Region::QUADRANTS,
            &GainRateBinning::default(),
            SharingPolicy::default(),
        )
        .unwrap();
        assert_eq!(rates.len(), 4);
        assert_eq!(rates[0].region, Region::A);
        assert_relative_eq!(rates[0].histogram.total(), 0.2, epsilon = 1e-12);
        assert_relative_eq!(rates[2].histogram.total(), 0.1, epsilon = 1e-12);
        assert_relative_eq!(rates[0].charge_sharing, 100.0 / 67.5, epsilon = 1e-12);
        assert!(rates[1].charge_sharing.is_nan());
        let binning = GainRateBinning::default();
        let sharing = SharingPolicy::default();
        assert!(
            region_gain_rates(&clusters, &gains, 0.0, &Region::QUADRANTS, &binning, sharing)
                .is_err()
        );
    }

    #[test]
    fn test_gain_rate_binning_validation() {
        assert!(GainRateBinning::default().validate().is_ok());
        let no_bins = GainRateBinning {
            bins: 0,
            ..GainRateBinning::default()
        };
        assert!(matches!(no_bins.validate(), Err(Error::ConfigError(_))));
        let reversed = GainRateBinning {
            min: 15000.0,
            max: 2000.0,
            bins: 100,
        };
        assert!(matches!(reversed.validate(), Err(Error::ConfigError(_))));
    }
}
