//! Run collections: all records of one data-taking run.

use crate::cluster::Cluster;
use crate::hit::{Hit, Plane};
use crate::{Error, Result};
use std::path::PathBuf;

/// Bookkeeping for one event file of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSummary {
    /// File the records came from.
    pub path: PathBuf,
    /// Hits contributed by this file.
    pub hits: usize,
    /// Clusters contributed by this file.
    pub clusters: usize,
}

/// Hits and clusters of every segment of a run, in segment order.
///
/// Segments are appended in filename order, which is taken to be
/// chronological. The run duration is `segments * segment_duration_s` and is
/// only used as a normalization divisor.
#[derive(Debug, Clone, Default)]
pub struct RunCollection {
    /// All hits, concatenated.
    pub hits: Vec<Hit>,
    /// All clusters, concatenated.
    pub clusters: Vec<Cluster>,
    /// One entry per appended segment.
    pub segments: Vec<SegmentSummary>,
    segment_duration_s: f64,
}

impl RunCollection {
    /// Creates an empty run whose segments each cover `segment_duration_s`.
    ///
    /// # Errors
    /// Returns `ConfigError` if the duration is not strictly positive.
    pub fn new(segment_duration_s: f64) -> Result<Self> {
        if !(segment_duration_s.is_finite() && segment_duration_s > 0.0) {
            return Err(Error::ConfigError(format!(
                "segment duration must be positive, got {segment_duration_s} s"
            )));
        }
        Ok(Self {
            segment_duration_s,
            ..Self::default()
        })
    }

    /// Appends the records of one segment.
    pub fn push_segment(&mut self, path: PathBuf, hits: Vec<Hit>, clusters: Vec<Cluster>) {
        self.segments.push(SegmentSummary {
            path,
            hits: hits.len(),
            clusters: clusters.len(),
        });
        self.hits.extend(hits);
        self.clusters.extend(clusters);
    }

    /// Duration covered by one segment in seconds.
    #[must_use]
    pub fn segment_duration_s(&self) -> f64 {
        self.segment_duration_s
    }

    /// Total data-taking duration in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_s(&self) -> f64 {
        self.segments.len() as f64 * self.segment_duration_s
    }

    /// Iterates over the hits of one plane.
    pub fn hits_on(&self, plane: Plane) -> impl Iterator<Item = &Hit> {
        self.hits.iter().filter(move |hit| hit.plane == plane)
    }

    /// Returns true if no segment has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
