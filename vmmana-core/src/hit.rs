//! Strip hit records and readout planes.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Number of channels on one VMM chip.
pub const CHANNELS_PER_VMM: usize = 64;

/// One of the two orthogonal strip directions of the 2D readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Plane {
    /// Plane 0, strips measuring x.
    X,
    /// Plane 1, strips measuring y.
    Y,
}

impl Plane {
    /// Both planes in index order.
    pub const BOTH: [Plane; 2] = [Plane::X, Plane::Y];

    /// Returns the plane index used by the event files.
    #[inline]
    #[must_use]
    pub fn index(self) -> u8 {
        match self {
            Plane::X => 0,
            Plane::Y => 1,
        }
    }

    /// Returns the axis label ("x" or "y").
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Plane::X => "x",
            Plane::Y => "y",
        }
    }
}

impl TryFrom<u8> for Plane {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Plane::X),
            1 => Ok(Plane::Y),
            other => Err(Error::InvalidPlane(other)),
        }
    }
}

impl fmt::Display for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single strip signal as produced by the external decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Hit {
    /// Hit id within its file.
    pub id: u64,
    /// Detector id.
    pub det: u8,
    /// Readout plane.
    pub plane: Plane,
    /// Front-end card id.
    pub fec: u8,
    /// VMM chip id.
    pub vmm: u8,
    /// Channel on the chip.
    pub ch: u8,
    /// Strip index.
    pub pos: f64,
    /// Hit time.
    pub time: f64,
    /// Chip-local time.
    pub chip_time: f64,
    /// Amplitude.
    pub adc: u16,
    /// Readout timestamp.
    pub readout_time: f64,
    /// Bunch crossing id.
    pub bcid: u16,
    /// Fine time (TDC).
    pub tdc: u16,
    /// Whether the amplitude exceeded the threshold.
    pub over_threshold: bool,
}

impl Hit {
    /// Creates a hit with the fields the analyses use; the rest are zeroed.
    #[must_use]
    pub fn new(plane: Plane, vmm: u8, ch: u8, pos: f64, adc: u16) -> Self {
        Self {
            id: 0,
            det: 0,
            plane,
            fec: 0,
            vmm,
            ch,
            pos,
            time: 0.0,
            chip_time: 0.0,
            adc,
            readout_time: 0.0,
            bcid: 0,
            tdc: 0,
            over_threshold: true,
        }
    }
}

/// A column of the hit record, for comparing field distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum HitField {
    Id,
    Det,
    Plane,
    Fec,
    Vmm,
    ReadoutTime,
    Time,
    Ch,
    Pos,
    Bcid,
    Tdc,
    Adc,
    OverThreshold,
    ChipTime,
}

impl HitField {
    /// Every field, in event file column order.
    pub const ALL: [HitField; 14] = [
        HitField::Id,
        HitField::Det,
        HitField::Plane,
        HitField::Fec,
        HitField::Vmm,
        HitField::ReadoutTime,
        HitField::Time,
        HitField::Ch,
        HitField::Pos,
        HitField::Bcid,
        HitField::Tdc,
        HitField::Adc,
        HitField::OverThreshold,
        HitField::ChipTime,
    ];

    /// Column name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            HitField::Id => "id",
            HitField::Det => "det",
            HitField::Plane => "plane",
            HitField::Fec => "fec",
            HitField::Vmm => "vmm",
            HitField::ReadoutTime => "readout_time",
            HitField::Time => "time",
            HitField::Ch => "ch",
            HitField::Pos => "pos",
            HitField::Bcid => "bcid",
            HitField::Tdc => "tdc",
            HitField::Adc => "adc",
            HitField::OverThreshold => "over_threshold",
            HitField::ChipTime => "chip_time",
        }
    }

    /// The field of `hit` as a number; the plane is its index, flags are 0 or 1.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn value(self, hit: &Hit) -> f64 {
        match self {
            HitField::Id => hit.id as f64,
            HitField::Det => f64::from(hit.det),
            HitField::Plane => f64::from(hit.plane.index()),
            HitField::Fec => f64::from(hit.fec),
            HitField::Vmm => f64::from(hit.vmm),
            HitField::ReadoutTime => hit.readout_time,
            HitField::Time => hit.time,
            HitField::Ch => f64::from(hit.ch),
            HitField::Pos => hit.pos,
            HitField::Bcid => f64::from(hit.bcid),
            HitField::Tdc => f64::from(hit.tdc),
            HitField::Adc => f64::from(hit.adc),
            HitField::OverThreshold => f64::from(u8::from(hit.over_threshold)),
            HitField::ChipTime => hit.chip_time,
        }
    }
}

impl FromStr for HitField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        HitField::ALL
            .into_iter()
            .find(|field| field.name() == name)
            .ok_or_else(|| Error::ConfigError(format!("unknown hit field '{s}'")))
    }
}

impl fmt::Display for HitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_from_index() {
        assert_eq!(Plane::try_from(0).unwrap(), Plane::X);
        assert_eq!(Plane::try_from(1).unwrap(), Plane::Y);
        assert_eq!(Plane::try_from(2), Err(Error::InvalidPlane(2)));
    }

    #[test]
    fn test_plane_index_roundtrip() {
        for plane in Plane::BOTH {
            assert_eq!(Plane::try_from(plane.index()).unwrap(), plane);
        }
        assert_eq!(Plane::Y.to_string(), "y");
    }

    #[test]
    fn test_hit_new() {
        let hit = Hit::new(Plane::Y, 3, 17, 201.0, 450);
        assert_eq!(hit.plane, Plane::Y);
        assert_eq!(hit.vmm, 3);
        assert_eq!(hit.ch, 17);
        assert!((hit.pos - 201.0).abs() < f64::EPSILON);
        assert_eq!(hit.adc, 450);
    }

    #[test]
    fn test_hit_field_values() {
        let mut hit = Hit::new(Plane::Y, 3, 17, 201.0, 450);
        hit.bcid = 4000;
        hit.over_threshold = false;
        assert!((HitField::Plane.value(&hit) - 1.0).abs() < f64::EPSILON);
        assert!((HitField::Ch.value(&hit) - 17.0).abs() < f64::EPSILON);
        assert!((HitField::Bcid.value(&hit) - 4000.0).abs() < f64::EPSILON);
        assert!(HitField::OverThreshold.value(&hit).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_field_names() {
        for field in HitField::ALL {
            assert_eq!(field.name().parse::<HitField>().unwrap(), field);
        }
        assert_eq!(" ADC".parse::<HitField>().unwrap(), HitField::Adc);
        assert!(matches!(
            "charge".parse::<HitField>(),
            Err(Error::ConfigError(_))
        ));
    }
}
