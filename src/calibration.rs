//! Calibration curves mapping ambient brightness to backlight level.
//!
//! Each power source has its own quadratic `y = a0 + a1*x + a2*x^2`, fitted
//! with least squares against the configured control points. The control
//! points are spread evenly over `[0, CURVE_DOMAIN]`, which is why ambient
//! readings are scaled by [`CURVE_DOMAIN`] before evaluation.

use log::{debug, warn};

use crate::config::{Conf, CurvePoints, PowerSource};

/// Upper end of the domain the curves are fitted on.
pub(crate) const CURVE_DOMAIN: f64 = 10.0;

/// Coefficients `[a0, a1, a2]` of a quadratic.
pub(crate) type Coefficients = [f64; 3];

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Calibration {
    fits: [Coefficients; 2],
}

impl Calibration {
    /// Fit both power sources from their control points.
    pub fn new(conf: &Conf) -> Self {
        let mut cal = Self {
            fits: [[0.0; 3]; 2],
        };
        for source in PowerSource::ALL {
            cal.recalibrate(source, conf.curve(source));
        }
        cal
    }

    #[cfg(test)]
    pub fn from_coefficients(ac: Coefficients, battery: Coefficients) -> Self {
        Self {
            fits: [ac, battery],
        }
    }

    pub fn coefficients(&self, source: PowerSource) -> Coefficients {
        self.fits[source.index()]
    }

    /// Refit a single power source. The other source is left untouched.
    pub fn recalibrate(&mut self, source: PowerSource, points: &CurvePoints) {
        match polynomial_fit(&points.0) {
            Some(fit) => {
                debug!("Curve for {source}: {fit:?}");
                self.fits[source.index()] = fit;
            }
            None => warn!("Could not fit a curve for {source}, keeping previous one"),
        }
    }

    /// Evaluate the curve of `source` at `x` (already scaled to the curve
    /// domain), clamped to `[0, 1]`.
    pub fn evaluate(&self, source: PowerSource, x: f64) -> f64 {
        let [a0, a1, a2] = self.fits[source.index()];
        (a0 + a1 * x + a2 * x * x).clamp(0.0, 1.0)
    }
}

/// Least squares quadratic through `points`, placed at evenly spaced
/// abscissae over `[0, CURVE_DOMAIN]`.
///
/// Returns `None` when the system is singular (fewer than 3 points).
pub(crate) fn polynomial_fit(points: &[f64]) -> Option<Coefficients> {
    if points.len() < 3 {
        return None;
    }
    let step = CURVE_DOMAIN / (points.len() - 1) as f64;

    // Normal equations: m * a = v
    let mut m = [[0.0f64; 3]; 3];
    let mut v = [0.0f64; 3];
    for (i, &y) in points.iter().enumerate() {
        let x = i as f64 * step;
        let pow = [1.0, x, x * x, x * x * x, x * x * x * x];
        for r in 0..3 {
            for c in 0..3 {
                m[r][c] += pow[r + c];
            }
            v[r] += y * pow[r];
        }
    }
    solve3(m, v)
}

/// Gaussian elimination with partial pivoting.
fn solve3(mut m: [[f64; 3]; 3], mut v: [f64; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot][col].abs() < 1e-12 {
            return None;
        }
        m.swap(col, pivot);
        v.swap(col, pivot);
        for row in col + 1..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= factor * m[col][k];
            }
            v[row] -= factor * v[col];
        }
    }
    let mut out = [0.0; 3];
    for row in (0..3).rev() {
        let tail: f64 = (row + 1..3).map(|k| m[row][k] * out[k]).sum();
        out[row] = (v[row] - tail) / m[row][row];
    }
    Some(out)
}
