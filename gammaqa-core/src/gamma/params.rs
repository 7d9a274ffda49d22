use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GammaError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Normalization {
    /// Dose criterion relative to the reference dose at each candidate point.
    Local,
    /// Dose criterion relative to the reference map maximum.
    Global,
}

impl Normalization {
    pub fn label(self) -> &'static str {
        match self {
            Normalization::Local => "Local",
            Normalization::Global => "Global",
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which reference maximum the low-dose threshold is taken against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdBasis {
    /// Maximum of the beam's own reference map.
    #[default]
    PerBeam,
    /// Maximum over every reference map in the session.
    PerSession,
}

/// Largest DTA / resolution ratio accepted. The search window holds up to
/// `(2 * MAX_SEARCH_STEPS + 1)^2` offsets, about a million at this limit.
pub const MAX_SEARCH_STEPS: f64 = 500.0;

/// Gamma criteria shared by every beam of a session. Validated on
/// construction and immutable afterwards.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GammaParameters {
    distance_to_agreement_mm: f64,
    dose_difference_percent: f64,
    low_dose_threshold_percent: f64,
    resolution_mm: f64,
    normalization: Normalization,
    threshold_basis: ThresholdBasis,
}

impl GammaParameters {
    pub fn new(
        distance_to_agreement_mm: f64,
        dose_difference_percent: f64,
        low_dose_threshold_percent: f64,
        resolution_mm: f64,
        normalization: Normalization,
    ) -> Result<Self> {
        if !distance_to_agreement_mm.is_finite() || distance_to_agreement_mm < 0.0 {
            return Err(GammaError::InvalidParameters(format!(
                "distance to agreement must be >= 0 mm, got {distance_to_agreement_mm}"
            )));
        }
        if !dose_difference_percent.is_finite() || dose_difference_percent <= 0.0 {
            return Err(GammaError::InvalidParameters(format!(
                "dose difference must be > 0 %, got {dose_difference_percent}"
            )));
        }
        if !(0.0..=100.0).contains(&low_dose_threshold_percent) {
            return Err(GammaError::InvalidParameters(format!(
                "low-dose threshold must be within 0..=100 %, got {low_dose_threshold_percent}"
            )));
        }
        if !resolution_mm.is_finite() || resolution_mm <= 0.0 {
            return Err(GammaError::InvalidParameters(format!(
                "resolution must be > 0 mm, got {resolution_mm}"
            )));
        }
        if distance_to_agreement_mm / resolution_mm > MAX_SEARCH_STEPS {
            return Err(GammaError::InvalidParameters(format!(
                "search window too fine: DTA {distance_to_agreement_mm} mm at resolution \
                 {resolution_mm} mm exceeds {MAX_SEARCH_STEPS} steps per side"
            )));
        }
        Ok(Self {
            distance_to_agreement_mm,
            dose_difference_percent,
            low_dose_threshold_percent,
            resolution_mm,
            normalization,
            threshold_basis: ThresholdBasis::PerBeam,
        })
    }

    pub fn with_threshold_basis(mut self, basis: ThresholdBasis) -> Self {
        self.threshold_basis = basis;
        self
    }

    pub fn distance_to_agreement_mm(&self) -> f64 {
        self.distance_to_agreement_mm
    }

    pub fn dose_difference_percent(&self) -> f64 {
        self.dose_difference_percent
    }

    pub fn low_dose_threshold_percent(&self) -> f64 {
        self.low_dose_threshold_percent
    }

    pub fn resolution_mm(&self) -> f64 {
        self.resolution_mm
    }

    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    pub fn threshold_basis(&self) -> ThresholdBasis {
        self.threshold_basis
    }

    pub(crate) fn dose_fraction(&self) -> f64 {
        self.dose_difference_percent / 100.0
    }

    pub(crate) fn threshold_fraction(&self) -> f64 {
        self.low_dose_threshold_percent / 100.0
    }
}

impl fmt::Display for GammaParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DTA {:.1} mm, DD {:.2} %, threshold {:.1} %, resolution {:.1} mm, {}",
            self.distance_to_agreement_mm,
            self.dose_difference_percent,
            self.low_dose_threshold_percent,
            self.resolution_mm,
            self.normalization
        )
    }
}
