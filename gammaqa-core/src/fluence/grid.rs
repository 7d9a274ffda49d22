use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GammaError, Result};

/// Tolerance used when comparing spacing/origin of two maps (mm).
const REGISTRATION_EPS_MM: f64 = 1e-9;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PixelSpacing {
    pub x_mm: f64,
    pub y_mm: f64,
}

impl PixelSpacing {
    pub fn isotropic(mm: f64) -> Self {
        Self { x_mm: mm, y_mm: mm }
    }
}

/// Geometry of a map: everything that must agree before two maps are compared.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Shape {
    pub rows: usize,
    pub cols: usize,
    pub spacing: PixelSpacing,
    pub origin_mm: [f64; 2],
}

impl Shape {
    pub fn is_registered_with(&self, other: &Shape) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= REGISTRATION_EPS_MM;
        self.rows == other.rows
            && self.cols == other.cols
            && close(self.spacing.x_mm, other.spacing.x_mm)
            && close(self.spacing.y_mm, other.spacing.y_mm)
            && close(self.origin_mm[0], other.origin_mm[0])
            && close(self.origin_mm[1], other.origin_mm[1])
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {}x{} mm, origin ({}, {}) mm",
            self.rows,
            self.cols,
            self.spacing.x_mm,
            self.spacing.y_mm,
            self.origin_mm[0],
            self.origin_mm[1]
        )
    }
}

#[derive(Deserialize)]
struct RawFluenceMap {
    rows: usize,
    cols: usize,
    spacing: PixelSpacing,
    #[serde(default)]
    origin_mm: [f64; 2],
    dose: Vec<f64>,
}

/// Sampled 2D dose grid, row-major, with physical pixel spacing.
///
/// Doses are finite and non-negative; construction rejects anything else so
/// the gamma engine never has to re-check.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "RawFluenceMap")]
pub struct FluenceMap {
    rows: usize,
    cols: usize,
    spacing: PixelSpacing,
    origin_mm: [f64; 2],
    dose: Vec<f64>,
}

impl TryFrom<RawFluenceMap> for FluenceMap {
    type Error = GammaError;

    fn try_from(raw: RawFluenceMap) -> Result<Self> {
        FluenceMap::with_origin(raw.rows, raw.cols, raw.spacing, raw.origin_mm, raw.dose)
    }
}

impl FluenceMap {
    pub fn new(rows: usize, cols: usize, spacing: PixelSpacing, dose: Vec<f64>) -> Result<Self> {
        Self::with_origin(rows, cols, spacing, [0.0, 0.0], dose)
    }

    pub fn with_origin(
        rows: usize,
        cols: usize,
        spacing: PixelSpacing,
        origin_mm: [f64; 2],
        dose: Vec<f64>,
    ) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(GammaError::InvalidMap(format!(
                "empty grid ({rows}x{cols})"
            )));
        }
        let expected = rows.checked_mul(cols).ok_or_else(|| {
            GammaError::InvalidMap(format!("grid {rows}x{cols} is too large"))
        })?;
        if dose.len() != expected {
            return Err(GammaError::InvalidMap(format!(
                "expected {expected} samples for {rows}x{cols}, got {}",
                dose.len()
            )));
        }
        let spacing_ok = |v: f64| v.is_finite() && v > 0.0;
        if !spacing_ok(spacing.x_mm) || !spacing_ok(spacing.y_mm) {
            return Err(GammaError::InvalidMap(format!(
                "pixel spacing must be positive, got {}x{} mm",
                spacing.x_mm, spacing.y_mm
            )));
        }
        if !origin_mm.iter().all(|v| v.is_finite()) {
            return Err(GammaError::InvalidMap("origin must be finite".into()));
        }
        if let Some(i) = dose.iter().position(|d| !d.is_finite() || *d < 0.0) {
            return Err(GammaError::InvalidMap(format!(
                "sample {i} is not a finite non-negative dose ({})",
                dose[i]
            )));
        }
        Ok(Self {
            rows,
            cols,
            spacing,
            origin_mm,
            dose,
        })
    }

    /// Build a map by evaluating `f(row, col)` for every pixel.
    pub fn from_fn<F>(rows: usize, cols: usize, spacing: PixelSpacing, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> f64,
    {
        let mut dose = Vec::with_capacity(rows.checked_mul(cols).unwrap_or(0));
        for r in 0..rows {
            for c in 0..cols {
                dose.push(f(r, c));
            }
        }
        Self::new(rows, cols, spacing, dose)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn spacing(&self) -> PixelSpacing {
        self.spacing
    }

    pub fn shape(&self) -> Shape {
        Shape {
            rows: self.rows,
            cols: self.cols,
            spacing: self.spacing,
            origin_mm: self.origin_mm,
        }
    }

    pub fn doses(&self) -> &[f64] {
        &self.dose
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.dose[row * self.cols + col]
    }

    pub fn max_dose(&self) -> f64 {
        self.dose.iter().copied().fold(0.0, f64::max)
    }

    /// Bilinear sample at fractional pixel coordinates (`x` = column, `y` = row).
    /// Returns `None` outside the sampled area.
    #[inline]
    pub fn sample(&self, x: f64, y: f64) -> Option<f64> {
        let (c0, fx) = axis_cell(x, self.cols)?;
        let (r0, fy) = axis_cell(y, self.rows)?;
        let c1 = if fx > 0.0 { c0 + 1 } else { c0 };
        let r1 = if fy > 0.0 { r0 + 1 } else { r0 };

        let p00 = self.get(r0, c0);
        let p10 = self.get(r0, c1);
        let p01 = self.get(r1, c0);
        let p11 = self.get(r1, c1);
        Some(
            (1.0 - fx) * (1.0 - fy) * p00
                + fx * (1.0 - fy) * p10
                + (1.0 - fx) * fy * p01
                + fx * fy * p11,
        )
    }
}

/// Split a fractional coordinate into (lower index, fraction) for an axis of
/// `n` samples. Exact hits on the last sample are allowed.
#[inline]
fn axis_cell(v: f64, n: usize) -> Option<(usize, f64)> {
    const SNAP: f64 = 1e-9;
    let last = (n - 1) as f64;
    if v < -SNAP || v > last + SNAP {
        return None;
    }
    let v = v.clamp(0.0, last);
    let i = v.floor();
    let frac = v - i;
    if frac < SNAP {
        return Some((i as usize, 0.0));
    }
    if frac > 1.0 - SNAP {
        return Some((i as usize + 1, 0.0));
    }
    Some((i as usize, frac))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp() -> FluenceMap {
        FluenceMap::from_fn(2, 3, PixelSpacing::isotropic(1.0), |r, c| (r * 10 + c) as f64).unwrap()
    }

    #[test]
    fn sample_hits_grid_points_exactly() {
        let m = ramp();
        assert_eq!(m.sample(0.0, 0.0), Some(0.0));
        assert_eq!(m.sample(2.0, 1.0), Some(12.0));
    }

    #[test]
    fn sample_interpolates_between_pixels() {
        let m = ramp();
        let v = m.sample(0.5, 0.5).unwrap();
        assert!((v - 5.5).abs() < 1e-12);
    }

    #[test]
    fn sample_outside_is_none() {
        let m = ramp();
        assert_eq!(m.sample(-0.5, 0.0), None);
        assert_eq!(m.sample(0.0, 1.5), None);
    }

    #[test]
    fn single_row_map_samples_along_its_axis() {
        let m = FluenceMap::new(1, 2, PixelSpacing::isotropic(1.0), vec![0.0, 4.0]).unwrap();
        assert_eq!(m.sample(0.25, 0.0), Some(1.0));
        assert_eq!(m.sample(0.25, 0.5), None);
    }

    #[test]
    fn rejects_negative_dose() {
        let err = FluenceMap::new(1, 2, PixelSpacing::isotropic(1.0), vec![1.0, -0.1]).unwrap_err();
        assert!(matches!(err, GammaError::InvalidMap(_)));
    }

    #[test]
    fn rejects_length_mismatch() {
        let err = FluenceMap::new(2, 2, PixelSpacing::isotropic(1.0), vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, GammaError::InvalidMap(_)));
    }

    #[test]
    fn rejects_overflowing_dimensions() {
        let huge = 1usize << (usize::BITS / 2 + 1);
        let err = FluenceMap::new(huge, huge, PixelSpacing::isotropic(1.0), vec![]).unwrap_err();
        assert!(matches!(err, GammaError::InvalidMap(m) if m.contains("too large")));
    }

    #[test]
    fn registration_compares_geometry() {
        let a = ramp().shape();
        let mut b = a;
        assert!(a.is_registered_with(&b));
        b.spacing.x_mm = 0.5;
        assert!(!a.is_registered_with(&b));
    }
}
