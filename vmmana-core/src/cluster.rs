//! Reconstructed cluster records.

use crate::hit::Plane;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The part of a 2D cluster measured on one readout plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlaneCluster {
    /// Number of strips in the cluster.
    pub size: u16,
    /// Summed amplitude.
    pub adc: f64,
    /// Charge-weighted position (strip units).
    pub pos: f64,
    /// Charge-weighted time.
    pub time: f64,
    /// Position from the micro-TPC reconstruction.
    pub pos_utpc: f64,
    /// Time from the micro-TPC reconstruction.
    pub time_utpc: f64,
    /// Position weighted by squared charge.
    pub pos_charge2: f64,
    /// Time weighted by squared charge.
    pub time_charge2: f64,
}

impl PlaneCluster {
    /// Creates a plane cluster from position and amplitude; alternative
    /// reconstructions default to the same position.
    #[must_use]
    pub fn new(pos: f64, adc: f64) -> Self {
        Self {
            size: 1,
            adc,
            pos,
            time: 0.0,
            pos_utpc: pos,
            time_utpc: 0.0,
            pos_charge2: pos,
            time_charge2: 0.0,
        }
    }
}

/// A reconstructed event with one measurement per plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Cluster {
    /// Cluster id within its file.
    pub id: u64,
    /// Detector id.
    pub det: u8,
    /// Plane 0 (x) measurement.
    pub x: PlaneCluster,
    /// Plane 1 (y) measurement.
    pub y: PlaneCluster,
    /// Time difference between the two planes.
    pub delta_plane: f64,
}

impl Cluster {
    /// Creates a cluster from positions and amplitudes on both planes.
    #[must_use]
    pub fn new(pos0: f64, pos1: f64, adc0: f64, adc1: f64) -> Self {
        Self {
            id: 0,
            det: 0,
            x: PlaneCluster::new(pos0, adc0),
            y: PlaneCluster::new(pos1, adc1),
            delta_plane: 0.0,
        }
    }

    /// Returns the measurement on the given plane.
    #[inline]
    #[must_use]
    pub fn plane(&self, plane: Plane) -> &PlaneCluster {
        match plane {
            Plane::X => &self.x,
            Plane::Y => &self.y,
        }
    }

    /// Plane 0 position.
    #[inline]
    #[must_use]
    pub fn pos0(&self) -> f64 {
        self.x.pos
    }

    /// Plane 1 position.
    #[inline]
    #[must_use]
    pub fn pos1(&self) -> f64 {
        self.y.pos
    }

    /// Plane 0 summed amplitude.
    #[inline]
    #[must_use]
    pub fn adc0(&self) -> f64 {
        self.x.adc
    }

    /// Plane 1 summed amplitude.
    #[inline]
    #[must_use]
    pub fn adc1(&self) -> f64 {
        self.y.adc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_accessors() {
        let cluster = Cluster::new(290.5, 160.0, 120.0, 80.0);
        assert!((cluster.pos0() - 290.5).abs() < f64::EPSILON);
        assert!((cluster.pos1() - 160.0).abs() < f64::EPSILON);
        assert!((cluster.adc0() - 120.0).abs() < f64::EPSILON);
        assert!((cluster.adc1() - 80.0).abs() < f64::EPSILON);
        assert!((cluster.plane(Plane::Y).pos_utpc - 160.0).abs() < f64::EPSILON);
    }
}
