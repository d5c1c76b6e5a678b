//! Outlier-robust Crystal Ball peak fitting.
//!
//! The fitter works on binned data:
//! 1. samples with a z-score of `z_cut` or more are rejected,
//! 2. the rest is histogrammed over `[0, max]` and turned into a density,
//! 3. the Crystal Ball density is fitted to the populated bins by weighted
//!    Levenberg-Marquardt least squares, with `sqrt(count)` bin errors taken
//!    as absolute,
//! 4. the fit is rejected if the location is not better known than its size.

use crate::crystal_ball::CrystalBall;
use crate::histogram::Histogram1D;
use nalgebra::{Matrix4, Vector4};
use vmmana_core::{Error, FitError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

type FitResult<T> = std::result::Result<T, FitError>;

/// Fitter settings.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FitConfig {
    /// Histogram bins over `[0, max]`.
    pub bins: usize,
    /// Samples with `|z| >= z_cut` are rejected.
    pub z_cut: f64,
    /// Minimum number of samples left after rejection.
    pub min_samples: usize,
    /// Starting width of the Gaussian core.
    pub sigma_seed: f64,
    /// `(beta, m)` starting shapes, tried in order while the fit fails to converge.
    pub shape_seeds: Vec<(f64, f64)>,
    /// Iteration limit per attempt.
    pub max_iterations: usize,
    /// Relative chi-square and parameter change counted as converged.
    pub tolerance: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            bins: 100,
            z_cut: 3.0,
            min_samples: 100,
            sigma_seed: 1600.0,
            shape_seeds: vec![(1.0, 2.0), (2.0, 2.0)],
            max_iterations: 500,
            tolerance: 1e-10,
        }
    }
}

impl FitConfig {
    /// Checks settings that would make every fit fail regardless of the data.
    ///
    /// # Errors
    /// Returns `ConfigError` naming the first invalid setting.
    pub fn validate(&self) -> vmmana_core::Result<()> {
        let invalid = |message: String| Err(Error::ConfigError(format!("fit: {message}")));
        if self.bins == 0 {
            return invalid("bins must be at least 1".to_string());
        }
        if !(self.z_cut.is_finite() && self.z_cut > 0.0) {
            return invalid(format!("z_cut must be positive, got {}", self.z_cut));
        }
        if self.min_samples == 0 {
            return invalid("min_samples must be at least 1".to_string());
        }
        if !(self.sigma_seed.is_finite() && self.sigma_seed > 0.0) {
            return invalid(format!(
                "sigma_seed must be positive, got {}",
                self.sigma_seed
            ));
        }
        if self.shape_seeds.is_empty() {
            return invalid("shape_seeds must not be empty".to_string());
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1".to_string());
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return invalid(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            ));
        }
        Ok(())
    }
}

/// A fitted value with its standard error.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Measurement {
    pub value: f64,
    pub error: f64,
}

/// Crystal Ball parameters with standard errors.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakFit {
    pub beta: Measurement,
    pub m: Measurement,
    pub mu: Measurement,
    pub sigma: Measurement,
    /// Weighted sum of squared residuals at the optimum.
    pub chi2: f64,
    /// Populated bins minus free parameters.
    pub ndf: usize,
    /// Iterations used by the successful attempt.
    pub iterations: usize,
}

impl PeakFit {
    /// The fitted line shape.
    #[must_use]
    pub fn shape(&self) -> CrystalBall {
        CrystalBall::new(self.beta.value, self.m.value, self.mu.value, self.sigma.value)
    }

    /// Fitted density at `x`.
    #[must_use]
    pub fn density_at(&self, x: f64) -> f64 {
        self.shape().pdf(x)
    }
}

/// Keeps the finite values whose z-score magnitude is below `z_cut`.
///
/// The spread is the population standard deviation. With zero spread every
/// z-score is undefined and nothing is kept.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn zscore_filter(values: &[f64], z_cut: f64) -> Vec<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return finite;
    }
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let variance = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if !(std.is_finite() && std > 0.0) {
        return Vec::new();
    }
    finite
        .into_iter()
        .filter(|v| ((v - mean) / std).abs() < z_cut)
        .collect()
}

/// Rejects outliers and bins the remaining values over `[0, max]`.
///
/// # Errors
/// `InsufficientSamples` if fewer than `min_samples` values survive, and
/// `TooFewBins` if the values do not span a positive range.
pub fn prepare_histogram(values: &[f64], config: &FitConfig) -> FitResult<Histogram1D> {
    let kept = zscore_filter(values, config.z_cut);
    log::debug!(
        "z-score filter kept {} of {} samples",
        kept.len(),
        values.len()
    );
    if kept.len() < config.min_samples {
        return Err(FitError::InsufficientSamples {
            remaining: kept.len(),
            required: config.min_samples,
        });
    }

    let max = kept.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut hist =
        Histogram1D::uniform(config.bins, 0.0, max).map_err(|_| FitError::TooFewBins {
            populated: 0,
            required: CrystalBall::PARAMS,
        })?;
    hist.fill_all(kept);
    Ok(hist)
}

/// Fits the Crystal Ball density to a histogram.
///
/// # Errors
/// Any [`FitError`] other than `InsufficientSamples`.
pub fn fit_histogram(hist: &Histogram1D, config: &FitConfig) -> FitResult<PeakFit> {
    let data = BinnedData::from_histogram(hist);
    if data.len() < CrystalBall::PARAMS {
        return Err(FitError::TooFewBins {
            populated: data.len(),
            required: CrystalBall::PARAMS,
        });
    }

    // Equal-width bins: the fullest bin is also the densest.
    let peak_bin = hist.argmax().unwrap_or_default();
    let mu_seed = hist.centers()[peak_bin];

    let mut last_error = FitError::NotConverged { iterations: 0 };
    for &(beta, m) in &config.shape_seeds {
        let seed = CrystalBall::new(beta, m, mu_seed, config.sigma_seed);
        match minimize(&data, seed, config) {
            Ok(minimum) => return minimum.into_peak_fit(data.len()),
            Err(err @ FitError::NotConverged { .. }) => {
                log::debug!("fit from beta={beta}, m={m} did not converge, reseeding");
                last_error = err;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_error)
}

/// Rejects outliers, bins and fits `values`.
///
/// # Errors
/// Any [`FitError`]; see [`prepare_histogram`] and [`fit_histogram`].
pub fn fit_crystal_ball(values: &[f64], config: &FitConfig) -> FitResult<PeakFit> {
    let hist = prepare_histogram(values, config)?;
    fit_histogram(&hist, config)
}

/// Populated bins with absolute errors.
struct BinnedData {
    x: Vec<f64>,
    y: Vec<f64>,
    sigma: Vec<f64>,
}

impl BinnedData {
    fn from_histogram(hist: &Histogram1D) -> Self {
        let mut data = Self {
            x: Vec::new(),
            y: Vec::new(),
            sigma: Vec::new(),
        };
        for ((&count, center), density) in hist
            .counts()
            .iter()
            .zip(hist.centers())
            .zip(hist.density())
        {
            if count > 0.0 {
                data.x.push(center);
                data.y.push(density);
                data.sigma.push(count.sqrt() / count * density);
            }
        }
        data
    }

    fn len(&self) -> usize {
        self.x.len()
    }

    /// Weighted residuals, or `None` if any is not finite.
    fn residuals(&self, shape: &CrystalBall) -> Option<Vec<f64>> {
        let residuals: Vec<f64> = self
            .x
            .iter()
            .zip(&self.y)
            .zip(&self.sigma)
            .map(|((&x, &y), &sigma)| (shape.pdf(x) - y) / sigma)
            .collect();
        residuals
            .iter()
            .all(|r| r.is_finite())
            .then_some(residuals)
    }

    /// Forward-difference Jacobian of the residuals, falling back to a
    /// backward step at the edge of the parameter domain.
    fn jacobian(&self, shape: &CrystalBall, base: &[f64]) -> Option<Vec<[f64; 4]>> {
        let params = shape.to_array();
        let mut jac = vec![[0.0; 4]; base.len()];
        for j in 0..CrystalBall::PARAMS {
            let h = f64::EPSILON.sqrt() * params[j].abs().max(1.0);
            let shifted = |step: f64| {
                let mut p = params;
                p[j] += step;
                let candidate = CrystalBall::from_array(p);
                if candidate.is_valid() {
                    self.residuals(&candidate)
                } else {
                    None
                }
            };
            let (residuals, step) = match shifted(h) {
                Some(r) => (r, h),
                None => (shifted(-h)?, -h),
            };
            for (row, (r, r0)) in jac.iter_mut().zip(residuals.iter().zip(base)) {
                row[j] = (r - r0) / step;
            }
        }
        Some(jac)
    }
}

fn sum_squares(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

/// `(J^T J, J^T r)`.
fn normal_equations(jac: &[[f64; 4]], residuals: &[f64]) -> (Matrix4<f64>, Vector4<f64>) {
    let mut jtj = Matrix4::zeros();
    let mut jtr = Vector4::zeros();
    for (row, &r) in jac.iter().zip(residuals) {
        let g = Vector4::from_row_slice(row);
        jtj += g * g.transpose();
        jtr += g * r;
    }
    (jtj, jtr)
}

struct Minimum {
    shape: CrystalBall,
    chi2: f64,
    curvature: Matrix4<f64>,
    iterations: usize,
}

impl Minimum {
    fn into_peak_fit(self, points: usize) -> FitResult<PeakFit> {
        let covariance = self
            .curvature
            .try_inverse()
            .ok_or(FitError::SingularCovariance)?;
        let p = self.shape.to_array();
        let measure = |i: usize| Measurement {
            value: p[i],
            error: covariance[(i, i)].sqrt(),
        };
        let fit = PeakFit {
            beta: measure(0),
            m: measure(1),
            mu: measure(2),
            sigma: measure(3),
            chi2: self.chi2,
            ndf: points.saturating_sub(CrystalBall::PARAMS),
            iterations: self.iterations,
        };

        if !fit.mu.error.is_finite() || fit.mu.error > fit.mu.value.abs() {
            return Err(FitError::UntrustworthyLocation {
                mu: fit.mu.value,
                mu_err: fit.mu.error,
            });
        }
        Ok(fit)
    }
}

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;

/// Levenberg-Marquardt with Marquardt diagonal scaling.
fn minimize(data: &BinnedData, seed: CrystalBall, config: &FitConfig) -> FitResult<Minimum> {
    let not_converged = |iterations| FitError::NotConverged { iterations };

    let mut shape = seed;
    let mut residuals = data.residuals(&shape).ok_or(not_converged(0))?;
    let mut chi2 = sum_squares(&residuals);
    let mut lambda = LAMBDA_START;
    let mut refresh = true;
    let mut jtj = Matrix4::zeros();
    let mut jtr = Vector4::zeros();

    for iteration in 1..=config.max_iterations {
        if refresh {
            let jac = data
                .jacobian(&shape, &residuals)
                .ok_or(not_converged(iteration))?;
            (jtj, jtr) = normal_equations(&jac, &residuals);
            refresh = false;
        }

        let mut damped = jtj;
        for i in 0..CrystalBall::PARAMS {
            damped[(i, i)] += lambda * jtj[(i, i)].max(f64::MIN_POSITIVE);
        }
        let step = damped.cholesky().map(|chol| chol.solve(&(-jtr)));

        let accepted = step.and_then(|step| {
            let params = shape.to_array();
            let mut next = params;
            for (p, dp) in next.iter_mut().zip(step.iter()) {
                *p += dp;
            }
            let candidate = CrystalBall::from_array(next);
            if !candidate.is_valid() {
                return None;
            }
            let candidate_residuals = data.residuals(&candidate)?;
            let candidate_chi2 = sum_squares(&candidate_residuals);
            (candidate_chi2 < chi2).then(|| {
                let small_step = params.iter().zip(next).all(|(&p, n)| {
                    (n - p).abs() <= config.tolerance * (p.abs() + config.tolerance)
                });
                (candidate, candidate_residuals, candidate_chi2, small_step)
            })
        });

        match accepted {
            Some((candidate, candidate_residuals, candidate_chi2, small_step)) => {
                let reduction = (chi2 - candidate_chi2) / chi2.max(f64::MIN_POSITIVE);
                shape = candidate;
                residuals = candidate_residuals;
                chi2 = candidate_chi2;
                lambda = (lambda / 10.0).max(f64::EPSILON);
                refresh = true;
                if reduction <= config.tolerance || small_step {
                    return finish(data, shape, chi2, &residuals, iteration);
                }
            }
            None => {
                lambda *= 10.0;
                if lambda > LAMBDA_MAX {
                    // No downhill step left at any damping.
                    return finish(data, shape, chi2, &residuals, iteration);
                }
            }
        }
    }
    Err(not_converged(config.max_iterations))
}

fn finish(
    data: &BinnedData,
    shape: CrystalBall,
    chi2: f64,
    residuals: &[f64],
    iterations: usize,
) -> FitResult<Minimum> {
    let jac = data
        .jacobian(&shape, residuals)
        .ok_or(FitError::SingularCovariance)?;
    let (curvature, _) = normal_equations(&jac, residuals);
    Ok(Minimum {
        shape,
        chi2,
        curvature,
        iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic sample: the `(i + 0.5) / n` quantiles of `shape`.
    fn quantile_sample(shape: &CrystalBall, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let u = (i as f64 + 0.5) / n as f64;
                let mut lo = shape.loc - 200.0 * shape.scale;
                let mut hi = shape.loc + 20.0 * shape.scale;
                for _ in 0..100 {
                    let mid = 0.5 * (lo + hi);
                    if shape.cdf(mid) < u {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                0.5 * (lo + hi)
            })
            .collect()
    }

    #[test]
    fn test_zscore_filter() {
        let mut values = vec![10.0; 20];
        values.push(1000.0);
        let kept = zscore_filter(&values, 3.0);
        assert_eq!(kept.len(), 20);
        assert!(kept.iter().all(|&v| (v - 10.0).abs() < f64::EPSILON));
    }

    #[test]
    fn test_zscore_filter_zero_spread_rejects_all() {
        assert!(zscore_filter(&[5.0; 200], 3.0).is_empty());
        assert!(zscore_filter(&[], 3.0).is_empty());
    }

    #[test]
    fn test_too_few_samples() {
        let values: Vec<f64> = (0..99).map(f64::from).collect();
        assert_eq!(
            fit_crystal_ball(&values, &FitConfig::default()),
            Err(FitError::InsufficientSamples {
                remaining: 99,
                required: 100
            })
        );
    }

    #[test]
    fn test_recovers_location() {
        let truth = CrystalBall::new(1.5, 3.0, 8000.0, 1200.0);
        let values = quantile_sample(&truth, 4000);
        let fit = fit_crystal_ball(&values, &FitConfig::default()).unwrap();
        assert!(
            (fit.mu.value - truth.loc).abs() < 0.05 * truth.loc,
            "mu = {}",
            fit.mu.value
        );
        assert!((fit.sigma.value - truth.scale).abs() < 0.25 * truth.scale);
        assert!(fit.mu.error < fit.mu.value.abs());
        assert!(fit.density_at(fit.mu.value) > 0.0);
    }

    #[test]
    fn test_reseeds_after_failed_start() {
        let truth = CrystalBall::new(1.5, 3.0, 8000.0, 1200.0);
        let values = quantile_sample(&truth, 4000);
        let config = FitConfig {
            shape_seeds: vec![(-1.0, 2.0), (2.0, 2.0)],
            ..FitConfig::default()
        };
        let fit = fit_crystal_ball(&values, &config).unwrap();
        assert!((fit.mu.value - truth.loc).abs() < 0.1 * truth.loc);

        let config = FitConfig {
            shape_seeds: vec![(-1.0, 2.0)],
            ..FitConfig::default()
        };
        assert_eq!(
            fit_crystal_ball(&values, &config),
            Err(FitError::NotConverged { iterations: 0 })
        );
    }

    #[test]
    fn test_location_quality_gate() {
        let minimum = |curvature: f64| Minimum {
            shape: CrystalBall::new(1.0, 2.0, 10.0, 3.0),
            chi2: 1.0,
            curvature: Matrix4::identity() * curvature,
            iterations: 5,
        };

        // sigma_mu = 1 / sqrt(curvature)
        let fit = minimum(1.0).into_peak_fit(20).unwrap();
        assert!((fit.mu.error - 1.0).abs() < 1e-12);
        assert_eq!(fit.ndf, 16);

        assert!(matches!(
            minimum(1e-4).into_peak_fit(20),
            Err(FitError::UntrustworthyLocation { mu, mu_err })
                if (mu - 10.0).abs() < 1e-12 && (mu_err - 100.0).abs() < 1e-9
        ));
        assert_eq!(
            minimum(0.0).into_peak_fit(20),
            Err(FitError::SingularCovariance)
        );
    }

    #[test]
    fn test_config_validation() {
        assert!(FitConfig::default().validate().is_ok());
        let invalid = [
            FitConfig {
                bins: 0,
                ..FitConfig::default()
            },
            FitConfig {
                z_cut: -1.0,
                ..FitConfig::default()
            },
            FitConfig {
                min_samples: 0,
                ..FitConfig::default()
            },
            FitConfig {
                sigma_seed: 0.0,
                ..FitConfig::default()
            },
            FitConfig {
                shape_seeds: Vec::new(),
                ..FitConfig::default()
            },
            FitConfig {
                max_iterations: 0,
                ..FitConfig::default()
            },
        ];
        for config in &invalid {
            assert!(
                matches!(config.validate(), Err(Error::ConfigError(_))),
                "{config:?}"
            );
        }
    }

    #[test]
    fn test_non_positive_values_cannot_be_binned() {
        let values: Vec<f64> = (0..200).map(|i| -1.0 - f64::from(i)).collect();
        assert!(matches!(
            prepare_histogram(&values, &FitConfig::default()),
            Err(FitError::TooFewBins { .. })
        ));
    }
}
