//! Hit and cluster rates, per-segment activity and noisy channel detection.

use crate::histogram::{Histogram1D, Histogram2D};
use vmmana_core::{
    BadChannel, Cluster, Error, Hit, HitField, Plane, Result, RunCollection, CHANNELS_PER_VMM,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default count above which a channel is noisy.
pub const DEFAULT_NOISE_THRESHOLD: u64 = 100_000;

/// Default number of VMM chips scanned for noisy channels.
pub const DEFAULT_VMM_COUNT: u8 = 16;

fn rate_weight(duration_s: f64) -> Result<f64> {
    if duration_s.is_finite() && duration_s > 0.0 {
        Ok(1.0 / duration_s)
    } else {
        Err(Error::ConfigError(format!(
            "data-taking duration must be positive, got {duration_s} s"
        )))
    }
}

/// Per-strip hit rate of one plane in counts per second.
///
/// # Errors
/// Returns `ConfigError` for invalid edges or a non-positive duration.
pub fn hit_rate(
    hits: &[Hit],
    plane: Plane,
    edges: &[f64],
    duration_s: f64,
) -> Result<Histogram1D> {
    let weight = rate_weight(duration_s)?;
    let mut hist = Histogram1D::from_edges(edges.to_vec())?;
    for hit in hits.iter().filter(|hit| hit.plane == plane) {
        hist.fill_weighted(hit.pos, weight);
    }
    log::debug!(
        "plane {plane}: {:.3} hits/s over {} strips",
        hist.total(),
        hist.bins()
    );
    Ok(hist)
}

/// Cluster rate map over (pos0, pos1) in counts per second.
///
/// # Errors
/// Returns `ConfigError` for invalid edges or a non-positive duration.
pub fn cluster_rate_map(
    clusters: &[Cluster],
    edges: &[f64],
    duration_s: f64,
) -> Result<Histogram2D> {
    let weight = rate_weight(duration_s)?;
    let mut map = Histogram2D::from_edges(edges.to_vec(), edges.to_vec())?;
    for cluster in clusters {
        map.fill_weighted(cluster.pos0(), cluster.pos1(), weight);
    }
    Ok(map)
}

/// Records contributed by one segment of a run.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ActivityPoint {
    /// Zero-based segment index.
    pub segment: usize,
    /// Elapsed data-taking time at the end of the segment, in seconds.
    pub elapsed_s: f64,
    pub hits: usize,
    pub clusters: usize,
}

/// Per-segment activity of a run, in segment order.
///
/// A segment without hits or clusters usually means the converter produced an
/// empty file.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn activity_timeline(run: &RunCollection) -> Vec<ActivityPoint> {
    run.segments
        .iter()
        .enumerate()
        .map(|(segment, summary)| ActivityPoint {
            segment,
            elapsed_s: (segment + 1) as f64 * run.segment_duration_s(),
            hits: summary.hits,
            clusters: summary.clusters,
        })
        .collect()
}

/// Hits per channel of one chip. Channels outside `0..64` are ignored.
#[must_use]
pub fn channel_counts(hits: &[Hit], vmm: u8) -> [u64; CHANNELS_PER_VMM] {
    let mut counts = [0; CHANNELS_PER_VMM];
    for hit in hits.iter().filter(|hit| hit.vmm == vmm) {
        if let Some(count) = counts.get_mut(usize::from(hit.ch)) {
            *count += 1;
        }
    }
    counts
}

/// A channel whose hit count exceeds the noise threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NoisyChannel {
    pub channel: BadChannel,
    pub count: u64,
}

/// Channels of chips `0..vmm_count` with strictly more than `threshold` hits.
#[must_use]
pub fn noisy_channels(hits: &[Hit], vmm_count: u8, threshold: u64) -> Vec<NoisyChannel> {
    let mut noisy = Vec::new();
    for vmm in 0..vmm_count {
        for (channel, &count) in channel_counts(hits, vmm).iter().enumerate() {
            if count > threshold {
                noisy.push(NoisyChannel {
                    channel: BadChannel {
                        vmm,
                        // Bounded by CHANNELS_PER_VMM.
                        channel: u8::try_from(channel).unwrap_or(u8::MAX),
                    },
                    count,
                });
            }
        }
    }
    if !noisy.is_empty() {
        log::info!("{} noisy channels above {threshold} hits", noisy.len());
    }
    noisy
}

/// Distribution of one hit field in each run, binned on a shared range.
///
/// The range spans the finite values of every run, so the histograms can be
/// overlaid bin by bin. A degenerate range `[v, v]` is widened to
/// `[v - 0.5, v + 0.5]`, and runs without values give `[0, 1]`.
///
/// # Errors
/// Returns `ConfigError` if `bins` is zero.
pub fn field_histograms(
    runs: &[&[Hit]],
    field: HitField,
    bins: usize,
) -> Result<Vec<Histogram1D>> {
    let (min, max) = runs
        .iter()
        .flat_map(|hits| hits.iter())
        .map(|hit| field.value(hit))
        .filter(|v| v.is_finite())
        .fold(None, |range: Option<(f64, f64)>, v| match range {
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            None => Some((v, v)),
        })
        .map_or((0.0, 1.0), |(lo, hi)| {
            if hi > lo {
                (lo, hi)
            } else {
                (lo - 0.5, hi + 0.5)
            }
        });
    log::debug!("{field}: shared range [{min}, {max}] over {} runs", runs.len());

    runs.iter()
        .map(|hits| -> Result<Histogram1D> {
            let mut hist = Histogram1D::uniform(bins, min, max)?;
            hist.fill_all(hits.iter().map(|hit| field.value(hit)));
            Ok(hist)
        })
        .collect()
}
