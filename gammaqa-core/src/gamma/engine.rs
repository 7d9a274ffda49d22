use rayon::prelude::*;
use tracing::debug;

use crate::error::{GammaError, Result};
use crate::fluence::grid::FluenceMap;
use crate::gamma::params::{GammaParameters, Normalization};

/// One candidate displacement of the reference search window.
#[derive(Clone, Copy, Debug)]
struct Offset {
    dx_px: f64,
    dy_px: f64,
    /// (distance / DTA)^2
    spatial: f64,
}

/// Per-pixel gamma values; `None` marks samples below the low-dose threshold.
#[derive(Clone, Debug)]
pub struct GammaMap {
    pub rows: usize,
    pub cols: usize,
    pub values: Vec<Option<f64>>,
}

impl GammaMap {
    pub fn evaluable(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    pub fn passing(&self) -> usize {
        self.values
            .iter()
            .filter(|v| matches!(v, Some(g) if *g <= 1.0))
            .count()
    }

    /// Percentage of evaluable samples with gamma <= 1.
    pub fn pass_percentage(&self) -> Result<f64> {
        let evaluable = self.evaluable();
        if evaluable == 0 {
            return Err(GammaError::EmptyEvaluableSet);
        }
        Ok(100.0 * self.passing() as f64 / evaluable as f64)
    }
}

/// Gamma pass percentage of `evaluated` against `reference`, with the
/// low-dose threshold taken against the reference map's own maximum.
pub fn evaluate(
    reference: &FluenceMap,
    evaluated: &FluenceMap,
    params: &GammaParameters,
) -> Result<f64> {
    gamma_map(reference, evaluated, params, None)?.pass_percentage()
}

/// Like [`evaluate`], but thresholds against `threshold_max` (e.g. a
/// session-wide reference maximum).
pub fn evaluate_with_reference_max(
    reference: &FluenceMap,
    evaluated: &FluenceMap,
    params: &GammaParameters,
    threshold_max: f64,
) -> Result<f64> {
    gamma_map(reference, evaluated, params, Some(threshold_max))?.pass_percentage()
}

pub fn gamma_map(
    reference: &FluenceMap,
    evaluated: &FluenceMap,
    params: &GammaParameters,
    threshold_max: Option<f64>,
) -> Result<GammaMap> {
    let ref_shape = reference.shape();
    let eval_shape = evaluated.shape();
    if !ref_shape.is_registered_with(&eval_shape) {
        return Err(GammaError::DimensionMismatch {
            reference: ref_shape,
            evaluated: eval_shape,
        });
    }

    let global_max = reference.max_dose();
    let cutoff = params.threshold_fraction() * threshold_max.unwrap_or(global_max);
    let dose_fraction = params.dose_fraction();
    let normalization = params.normalization();
    let offsets = search_offsets(reference, params);
    debug!(
        candidates = offsets.len(),
        cutoff, global_max, "gamma search window ready"
    );

    let cols = evaluated.cols();
    let eval_doses = evaluated.doses();
    let values: Vec<Option<f64>> = (0..eval_doses.len())
        .into_par_iter()
        .map(|i| {
            let dose = eval_doses[i];
            if dose <= cutoff {
                return None;
            }
            let (row, col) = (i / cols, i % cols);
            let mut best = f64::INFINITY;
            for off in &offsets {
                // Offsets are sorted by spatial term; nothing further can win.
                if off.spatial >= best {
                    break;
                }
                let Some(ref_dose) = reference.sample(col as f64 + off.dx_px, row as f64 + off.dy_px)
                else {
                    continue;
                };
                let criterion = match normalization {
                    Normalization::Local => dose_fraction * ref_dose,
                    Normalization::Global => dose_fraction * global_max,
                };
                let g2 = off.spatial + dose_term(dose - ref_dose, criterion);
                if g2 < best {
                    best = g2;
                }
            }
            Some(best.sqrt())
        })
        .collect();

    Ok(GammaMap {
        rows: evaluated.rows(),
        cols,
        values,
    })
}

#[inline]
fn dose_term(delta: f64, criterion: f64) -> f64 {
    if criterion > 0.0 {
        let r = delta / criterion;
        r * r
    } else if delta == 0.0 {
        0.0
    } else {
        f64::INFINITY
    }
}

/// Displacements on a `resolution_mm` lattice within the DTA disc, in pixel
/// units of `grid`, ordered by increasing spatial term. DTA = 0 degenerates to
/// the zero offset alone.
fn search_offsets(grid: &FluenceMap, params: &GammaParameters) -> Vec<Offset> {
    let dta = params.distance_to_agreement_mm();
    let res = params.resolution_mm();
    let spacing = grid.spacing();
    if dta == 0.0 {
        return vec![Offset {
            dx_px: 0.0,
            dy_px: 0.0,
            spatial: 0.0,
        }];
    }

    let steps = (dta / res + 1e-9).floor() as i64;
    let mut out = Vec::with_capacity(((2 * steps + 1) * (2 * steps + 1)) as usize);
    for j in -steps..=steps {
        for i in -steps..=steps {
            let dx_mm = i as f64 * res;
            let dy_mm = j as f64 * res;
            let dist = dx_mm.hypot(dy_mm);
            if dist > dta * (1.0 + 1e-9) {
                continue;
            }
            let s = dist / dta;
            out.push(Offset {
                dx_px: dx_mm / spacing.x_mm,
                dy_px: dy_mm / spacing.y_mm,
                spatial: s * s,
            });
        }
    }
    out.sort_by(|a, b| a.spatial.total_cmp(&b.spatial));
    out
}
