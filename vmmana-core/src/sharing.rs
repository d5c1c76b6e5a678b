//! Charge sharing between the two readout planes.

use crate::gain::GainEstimate;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How non-finite per-cluster ratios enter the mean.
///
/// A cluster with no charge on plane 1 has an infinite (or NaN) ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum SharingPolicy {
    /// Average every ratio; one non-finite ratio makes the mean non-finite.
    Propagate,
    /// Drop non-finite ratios before averaging.
    #[default]
    FiniteOnly,
}

/// Mean of `electrons_x / electrons_y` over the estimates.
///
/// Returns NaN when nothing is left to average.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_charge_sharing(estimates: &[GainEstimate], policy: SharingPolicy) -> f64 {
    let (sum, count) = estimates
        .iter()
        .map(GainEstimate::sharing_ratio)
        .filter(|ratio| policy == SharingPolicy::Propagate || ratio.is_finite())
        .fold((0.0, 0usize), |(sum, count), ratio| (sum + ratio, count + 1));

    if count == 0 {
        return f64::NAN;
    }
    sum / count as f64
}

/// Mean electrons collected on plane 0 and plane 1.
///
/// Returns `(NaN, NaN)` for an empty set.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_electrons(estimates: &[GainEstimate]) -> (f64, f64) {
    if estimates.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = estimates.len() as f64;
    let (sum_x, sum_y) = estimates.iter().fold((0.0, 0.0), |(x, y), estimate| {
        (x + estimate.electrons_x, y + estimate.electrons_y)
    });
    (sum_x / n, sum_y / n)
}
