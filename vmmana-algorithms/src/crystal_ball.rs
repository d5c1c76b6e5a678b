//! Crystal Ball line shape.
//!
//! A Gaussian core joined to a power-law tail on the low side at
//! `z = -beta`, with `z = (x - loc) / scale`. Parameterised as
//! `(beta, m, loc, scale)`.

use statrs::function::erf::erf;
use std::f64::consts::{FRAC_PI_2, SQRT_2};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters of a Crystal Ball distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrystalBall {
    /// Transition point between core and tail, in units of `scale`.
    pub beta: f64,
    /// Power of the tail.
    pub m: f64,
    /// Location of the Gaussian core.
    pub loc: f64,
    /// Width of the Gaussian core.
    pub scale: f64,
}

impl CrystalBall {
    /// Number of free parameters.
    pub const PARAMS: usize = 4;

    #[must_use]
    pub const fn new(beta: f64, m: f64, loc: f64, scale: f64) -> Self {
        Self {
            beta,
            m,
            loc,
            scale,
        }
    }

    /// Parameters as `[beta, m, loc, scale]`.
    #[must_use]
    pub const fn to_array(self) -> [f64; 4] {
        [self.beta, self.m, self.loc, self.scale]
    }

    /// Inverse of [`CrystalBall::to_array`].
    #[must_use]
    pub const fn from_array(p: [f64; 4]) -> Self {
        Self::new(p[0], p[1], p[2], p[3])
    }

    /// Returns true if the parameters define a normalizable density:
    /// `beta > 0`, `m > 1`, `scale > 0`, all finite.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.to_array().iter().all(|p| p.is_finite())
            && self.beta > 0.0
            && self.m > 1.0
            && self.scale > 0.0
    }

    /// Normalization of the standardized density.
    fn norm(&self) -> f64 {
        let (beta, m) = (self.beta, self.m);
        let tail = m / beta / (m - 1.0) * (-0.5 * beta * beta).exp();
        let core = FRAC_PI_2.sqrt() * (1.0 + erf(beta / SQRT_2));
        1.0 / (tail + core)
    }

    /// Tail coefficients `(A, B)` with tail density `A * (B - z)^-m`.
    fn tail_coefficients(&self) -> (f64, f64) {
        let (beta, m) = (self.beta, self.m);
        let a = (m / beta).powf(m) * (-0.5 * beta * beta).exp();
        let b = m / beta - beta;
        (a, b)
    }

    /// Probability density at `x`. NaN for invalid parameters.
    #[must_use]
    pub fn pdf(&self, x: f64) -> f64 {
        if !self.is_valid() {
            return f64::NAN;
        }
        let z = (x - self.loc) / self.scale;
        let density = if z > -self.beta {
            (-0.5 * z * z).exp()
        } else {
            let (a, b) = self.tail_coefficients();
            a * (b - z).powf(-self.m)
        };
        self.norm() * density / self.scale
    }

    /// Cumulative distribution at `x`. NaN for invalid parameters.
    #[must_use]
    pub fn cdf(&self, x: f64) -> f64 {
        if !self.is_valid() {
            return f64::NAN;
        }
        let (beta, m) = (self.beta, self.m);
        let z = (x - self.loc) / self.scale;
        let norm = self.norm();
        if z <= -beta {
            let (a, b) = self.tail_coefficients();
            norm * a * (b - z).powf(1.0 - m) / (m - 1.0)
        } else {
            let tail = (m / beta) * (-0.5 * beta * beta).exp() / (m - 1.0);
            let core = FRAC_PI_2.sqrt() * (erf(z / SQRT_2) + erf(beta / SQRT_2));
            norm * (tail + core)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pdf_integrates_to_one() {
        let shape = CrystalBall::new(1.0, 2.5, 0.0, 1.0);
        // The m = 2.5 tail decays slowly, so integrate far and add the closed-form remainder.
        let (lo, hi, n) = (-400.0, 12.0, 400_000);
        let step = (hi - lo) / f64::from(n);
        let integral: f64 = (0..n)
            .map(|i| shape.pdf(lo + (f64::from(i) + 0.5) * step) * step)
            .sum();
        assert_relative_eq!(integral + shape.cdf(lo), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_cdf_limits_and_continuity() {
        let shape = CrystalBall::new(1.5, 3.0, 10.0, 2.0);
        assert_relative_eq!(shape.cdf(1e6), 1.0, epsilon = 1e-9);
        assert!(shape.cdf(-1e6) < 1e-6);

        let joint = shape.loc - shape.beta * shape.scale;
        assert_relative_eq!(shape.cdf(joint - 1e-9), shape.cdf(joint + 1e-9), epsilon = 1e-7);
        assert_relative_eq!(shape.pdf(joint - 1e-9), shape.pdf(joint + 1e-9), epsilon = 1e-7);
    }

    #[test]
    fn test_cdf_matches_pdf_derivative() {
        let shape = CrystalBall::new(1.0, 2.0, 5.0, 1.5);
        for x in [0.0, 2.0, 3.6, 5.0, 7.5] {
            let h = 1e-5;
            let derivative = (shape.cdf(x + h) - shape.cdf(x - h)) / (2.0 * h);
            assert_relative_eq!(derivative, shape.pdf(x), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_peak_at_location() {
        let shape = CrystalBall::new(2.0, 2.0, 3000.0, 400.0);
        assert!(shape.pdf(3000.0) > shape.pdf(2990.0));
        assert!(shape.pdf(3000.0) > shape.pdf(3010.0));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(CrystalBall::new(0.0, 2.0, 0.0, 1.0).pdf(0.0).is_nan());
        assert!(CrystalBall::new(1.0, 1.0, 0.0, 1.0).pdf(0.0).is_nan());
        assert!(CrystalBall::new(1.0, 2.0, 0.0, -1.0).cdf(0.0).is_nan());
        assert!(!CrystalBall::new(1.0, 2.0, f64::NAN, 1.0).is_valid());
    }
}
