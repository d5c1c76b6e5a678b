//! Fiducial regions of the 2D readout.
//!
//! The boxes follow the detector geometry with VMM 8-15 reading x and VMM 0-7
//! reading y. Regions a-d sit under single VMM pairs and do not tile the
//! detector; the two "bottom" regions are half-open.

use crate::cluster::Cluster;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Inclusive interval on one strip axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StripRange {
    /// Lower bound, inclusive.
    pub min: f64,
    /// Upper bound, inclusive.
    pub max: f64,
}

impl StripRange {
    /// Closed interval `[min, max]`.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Interval `[min, +inf)`.
    #[must_use]
    pub const fn at_least(min: f64) -> Self {
        Self {
            min,
            max: f64::INFINITY,
        }
    }

    /// Interval `(-inf, max]`.
    #[must_use]
    pub const fn at_most(max: f64) -> Self {
        Self {
            min: f64::NEG_INFINITY,
            max,
        }
    }

    /// Returns true if `value` lies inside the interval.
    #[inline]
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Axis-aligned box in (pos0, pos1) strip space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionBounds {
    /// Range on plane 0.
    pub pos0: StripRange,
    /// Range on plane 1.
    pub pos1: StripRange,
}

impl RegionBounds {
    /// Returns true if the position lies inside the box.
    #[inline]
    #[must_use]
    pub fn contains(&self, pos0: f64, pos1: f64) -> bool {
        self.pos0.contains(pos0) && self.pos1.contains(pos1)
    }
}

const LOW: StripRange = StripRange::new(156.0, 217.0);
const HIGH: StripRange = StripRange::new(280.0, 342.0);

/// Named fiducial region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub enum Region {
    /// Under VMM 13 (x) and VMM 5 (y).
    A,
    /// Under VMM 13 (x) and VMM 2 (y).
    B,
    /// Under VMM 10 (x) and VMM 5 (y).
    C,
    /// Under VMM 10 (x) and VMM 2 (y).
    D,
    /// pos0 <= 217 and pos1 <= 217.
    BottomLeft,
    /// pos0 >= 280 and pos1 <= 217.
    BottomRight,
}

impl Region {
    /// Every region.
    pub const ALL: [Region; 6] = [
        Region::A,
        Region::B,
        Region::C,
        Region::D,
        Region::BottomLeft,
        Region::BottomRight,
    ];

    /// The four non-overlapping single-VMM-pair regions.
    pub const QUADRANTS: [Region; 4] = [Region::A, Region::B, Region::C, Region::D];

    /// Returns the region's box.
    #[must_use]
    pub fn bounds(self) -> RegionBounds {
        match self {
            Region::A => RegionBounds {
                pos0: HIGH,
                pos1: LOW,
            },
            Region::B => RegionBounds {
                pos0: HIGH,
                pos1: HIGH,
            },
            Region::C => RegionBounds {
                pos0: LOW,
                pos1: LOW,
            },
            Region::D => RegionBounds {
                pos0: LOW,
                pos1: HIGH,
            },
            Region::BottomLeft => RegionBounds {
                pos0: StripRange::at_most(LOW.max),
                pos1: StripRange::at_most(LOW.max),
            },
            Region::BottomRight => RegionBounds {
                pos0: StripRange::at_least(HIGH.min),
                pos1: StripRange::at_most(LOW.max),
            },
        }
    }

    /// Canonical name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Region::A => "a",
            Region::B => "b",
            Region::C => "c",
            Region::D => "d",
            Region::BottomLeft => "bottom-left",
            Region::BottomRight => "bottom-right",
        }
    }

    /// Returns true if the cluster's (pos0, pos1) lies inside the region.
    #[inline]
    #[must_use]
    pub fn contains(self, cluster: &Cluster) -> bool {
        self.bounds().contains(cluster.pos0(), cluster.pos1())
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Region::A),
            "b" => Ok(Region::B),
            "c" => Ok(Region::C),
            "d" => Ok(Region::D),
            "bottom-left" | "bottom left" | "bottom_left" => Ok(Region::BottomLeft),
            "bottom-right" | "bottom right" | "bottom_right" => Ok(Region::BottomRight),
            _ => Err(Error::InvalidRegion(s.to_string())),
        }
    }
}

impl TryFrom<String> for Region {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Region> for String {
    fn from(region: Region) -> Self {
        region.name().to_string()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which clusters an analysis runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selection {
    /// Every cluster.
    All,
    /// Clusters inside one region.
    Region(Region),
}

impl Selection {
    /// Label used in artifact names.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Selection::All => "all_areas",
            Selection::Region(region) => region.name(),
        }
    }

    /// Returns true if the cluster is selected.
    #[inline]
    #[must_use]
    pub fn contains(self, cluster: &Cluster) -> bool {
        match self {
            Selection::All => true,
            Selection::Region(region) => region.contains(cluster),
        }
    }

    /// Returns the selected clusters, preserving order.
    #[must_use]
    pub fn apply(self, clusters: &[Cluster]) -> Vec<Cluster> {
        let selected: Vec<Cluster> = clusters
            .iter()
            .filter(|cluster| self.contains(cluster))
            .copied()
            .collect();
        log::debug!(
            "selection {}: kept {} of {} clusters",
            self.label(),
            selected.len(),
            clusters.len()
        );
        selected
    }
}

impl From<Region> for Selection {
    fn from(region: Region) -> Self {
        Selection::Region(region)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Returns the clusters inside `region`, preserving order.
#[must_use]
pub fn fiducialize(clusters: &[Cluster], region: Region) -> Vec<Cluster> {
    Selection::Region(region).apply(clusters)
}

/// Like [`fiducialize`], with the region given by name.
///
/// # Errors
/// Returns `InvalidRegion` if the name is not a known region.
pub fn fiducialize_named(clusters: &[Cluster], name: &str) -> Result<Vec<Cluster>> {
    let region: Region = name.parse()?;
    Ok(fiducialize(clusters, region))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(pos0: f64, pos1: f64) -> Cluster {
        Cluster::new(pos0, pos1, 100.0, 100.0)
    }

    #[test]
    fn test_region_boundaries_inclusive() {
        assert!(Region::A.contains(&at(280.0, 156.0)));
        assert!(Region::A.contains(&at(342.0, 217.0)));
        assert!(!Region::A.contains(&at(279.9, 200.0)));
        assert!(!Region::A.contains(&at(300.0, 217.1)));

        assert!(Region::D.contains(&at(156.0, 342.0)));
        assert!(!Region::D.contains(&at(156.0, 342.5)));
    }

    #[test]
    fn test_quadrants_never_overlap() {
        let mut inside = 0;
        for i in 0..=1000 {
            for j in 0..=1000 {
                let cluster = at(f64::from(i) * 0.5, f64::from(j) * 0.5);
                let hits = Region::QUADRANTS
                    .iter()
                    .filter(|r| r.contains(&cluster))
                    .count();
                assert!(
                    hits <= 1,
                    "({}, {}) in {hits} regions",
                    cluster.pos0(),
                    cluster.pos1()
                );
                inside += hits;
            }
        }
        // Half-strip grid points per side: 123 over [156, 217], 125 over [280, 342].
        assert_eq!(inside, (123 + 125) * (123 + 125));
    }

    #[test]
    fn test_bottom_regions_half_open() {
        assert!(Region::BottomLeft.contains(&at(0.0, 0.0)));
        assert!(Region::BottomLeft.contains(&at(217.0, 217.0)));
        assert!(!Region::BottomLeft.contains(&at(218.0, 10.0)));

        assert!(Region::BottomRight.contains(&at(499.0, -3.0)));
        assert!(!Region::BottomRight.contains(&at(279.0, 100.0)));
        assert!(!Region::BottomRight.contains(&at(300.0, 250.0)));
    }

    #[test]
    fn test_region_names() {
        for region in Region::ALL {
            assert_eq!(region.name().parse::<Region>().unwrap(), region);
        }
        assert_eq!("bottom left".parse::<Region>().unwrap(), Region::BottomLeft);
        assert_eq!(" B ".parse::<Region>().unwrap(), Region::B);
        assert_eq!(
            "e".parse::<Region>(),
            Err(Error::InvalidRegion("e".to_string()))
        );
    }

    #[test]
    fn test_fiducialize_named_rejects_unknown() {
        let clusters = vec![at(300.0, 300.0)];
        assert!(matches!(
            fiducialize_named(&clusters, "centre"),
            Err(Error::InvalidRegion(_))
        ));
        assert_eq!(fiducialize_named(&clusters, "b").unwrap().len(), 1);
    }

    #[test]
    fn test_selection_all_keeps_everything() {
        let clusters = vec![at(0.0, 0.0), at(300.0, 300.0), at(499.0, 499.0)];
        assert_eq!(Selection::All.apply(&clusters).len(), 3);
        assert_eq!(Selection::All.label(), "all_areas");
        assert_eq!(Selection::from(Region::C).label(), "c");
    }
}
