//! Weighted 1D and 2D histograms with explicit bin edges.
//!
//! Binning follows the usual convention: every bin is half-open `[lo, hi)`
//! except the last one, which also includes its upper edge. Values outside
//! the edges are dropped.

use ndarray::Array2;
use vmmana_core::{Error, Result};

/// Default strip binning: one bin per strip, centred on integer strip indices.
pub const STRIP_EDGES_START: f64 = -0.5;
/// Exclusive end of the default strip edge range.
pub const STRIP_EDGES_STOP: f64 = 499.5;

/// Evenly spaced values in `[start, stop)`, like `arange`.
///
/// # Errors
/// Returns `ConfigError` if the step is not positive or fewer than two edges result.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn arange_edges(start: f64, stop: f64, step: f64) -> Result<Vec<f64>> {
    if !(step.is_finite() && step > 0.0) {
        return Err(Error::ConfigError(format!(
            "edge step must be positive, got {step}"
        )));
    }
    let n = ((stop - start) / step).ceil();
    if !(n.is_finite() && n >= 2.0) {
        return Err(Error::ConfigError(format!(
            "edge range [{start}, {stop}) with step {step} yields fewer than two edges"
        )));
    }
    Ok((0..n as usize).map(|i| start + i as f64 * step).collect())
}

/// Default strip edges: -0.5, 0.5, ..., 498.5.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn strip_edges() -> Vec<f64> {
    (0..500).map(|i| STRIP_EDGES_START + f64::from(i)).collect()
}

fn validate_edges(edges: &[f64]) -> Result<()> {
    if edges.len() < 2 {
        return Err(Error::ConfigError(format!(
            "a histogram needs at least two edges, got {}",
            edges.len()
        )));
    }
    if edges.iter().any(|edge| !edge.is_finite()) || edges.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::ConfigError(
            "histogram edges must be finite and strictly increasing".to_string(),
        ));
    }
    Ok(())
}

/// Index of the bin containing `value`, if any.
fn locate(edges: &[f64], value: f64) -> Option<usize> {
    let first = *edges.first()?;
    let last = *edges.last()?;
    if value.is_nan() || value < first || value > last {
        return None;
    }
    if value == last {
        return Some(edges.len() - 2);
    }
    Some(edges.partition_point(|&edge| edge <= value) - 1)
}

/// Weighted one-dimensional histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    edges: Vec<f64>,
    counts: Vec<f64>,
}

impl Histogram1D {
    /// Creates an empty histogram over the given edges.
    ///
    /// # Errors
    /// Returns `ConfigError` for fewer than two or non-increasing edges.
    pub fn from_edges(edges: Vec<f64>) -> Result<Self> {
        validate_edges(&edges)?;
        let counts = vec![0.0; edges.len() - 1];
        Ok(Self { edges, counts })
    }

    /// Creates an empty histogram with `bins` equal bins over `[min, max]`.
    ///
    /// # Errors
    /// Returns `ConfigError` if `bins` is zero or the range is empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn uniform(bins: usize, min: f64, max: f64) -> Result<Self> {
        if bins == 0 {
            return Err(Error::ConfigError("histogram needs at least one bin".to_string()));
        }
        if !(min.is_finite() && max.is_finite() && max > min) {
            return Err(Error::ConfigError(format!(
                "histogram range [{min}, {max}] is empty"
            )));
        }
        let width = (max - min) / bins as f64;
        let mut edges: Vec<f64> = (0..bins).map(|i| min + i as f64 * width).collect();
        edges.push(max);
        Self::from_edges(edges)
    }

    /// Adds one entry with unit weight.
    #[inline]
    pub fn fill(&mut self, value: f64) {
        self.fill_weighted(value, 1.0);
    }

    /// Adds one entry with the given weight.
    #[inline]
    pub fn fill_weighted(&mut self, value: f64, weight: f64) {
        if let Some(bin) = locate(&self.edges, value) {
            self.counts[bin] += weight;
        }
    }

    /// Fills every value with unit weight.
    pub fn fill_all<I: IntoIterator<Item = f64>>(&mut self, values: I) {
        for value in values {
            self.fill(value);
        }
    }

    /// Bin edges.
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Per-bin weighted counts.
    #[must_use]
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Number of bins.
    #[must_use]
    pub fn bins(&self) -> usize {
        self.counts.len()
    }

    /// Bin centres.
    #[must_use]
    pub fn centers(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
    }

    /// Bin widths.
    #[must_use]
    pub fn widths(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Sum of all bin contents.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.counts.iter().sum()
    }

    /// Counts normalized to unit integral (probability density).
    ///
    /// Every bin is NaN if the histogram is empty.
    #[must_use]
    pub fn density(&self) -> Vec<f64> {
        let total = self.total();
        self.counts
            .iter()
            .zip(self.widths())
            .map(|(count, width)| count / (total * width))
            .collect()
    }

    /// Index of the first bin with the largest content.
    #[must_use]
    pub fn argmax(&self) -> Option<usize> {
        self.counts
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &count)| match best {
                Some((_, max)) if count <= max => best,
                _ => Some((i, count)),
            })
            .map(|(i, _)| i)
    }
}

/// Weighted two-dimensional histogram, indexed `[x_bin, y_bin]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    x_edges: Vec<f64>,
    y_edges: Vec<f64>,
    counts: Array2<f64>,
}

impl Histogram2D {
    /// Creates an empty histogram over the given edges.
    ///
    /// # Errors
    /// Returns `ConfigError` for invalid edges on either axis.
    pub fn from_edges(x_edges: Vec<f64>, y_edges: Vec<f64>) -> Result<Self> {
        validate_edges(&x_edges)?;
        validate_edges(&y_edges)?;
        let counts = Array2::zeros((x_edges.len() - 1, y_edges.len() - 1));
        Ok(Self {
            x_edges,
            y_edges,
            counts,
        })
    }

    /// Adds one entry with the given weight.
    pub fn fill_weighted(&mut self, x: f64, y: f64, weight: f64) {
        if let (Some(i), Some(j)) = (locate(&self.x_edges, x), locate(&self.y_edges, y)) {
            self.counts[[i, j]] += weight;
        }
    }

    /// Bin edges along x.
    #[must_use]
    pub fn x_edges(&self) -> &[f64] {
        &self.x_edges
    }

    /// Bin edges along y.
    #[must_use]
    pub fn y_edges(&self) -> &[f64] {
        &self.y_edges
    }

    /// Bin contents.
    #[must_use]
    pub fn counts(&self) -> &Array2<f64> {
        &self.counts
    }

    /// Sum of all bin contents.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.counts.sum()
    }
}
