// gammaqa_core/src/domain.rs
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::error::{GammaError, Result};
use crate::gamma::params::{GammaParameters, Normalization};

#[derive(Clone, Debug, PartialEq)]
pub struct BeamResult {
    pub beam_id: String,
    pub pass_percentage: f64,
}

/// A beam left out of the aggregate under the exclusion policy.
#[derive(Clone, Debug, PartialEq)]
pub struct ExcludedBeam {
    pub beam_id: String,
    pub reason: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionResult {
    pub patient_id: String,
    pub beam_results: Vec<BeamResult>,
    pub aggregate_pass_percentage: f64,
    pub excluded: Vec<ExcludedBeam>,
}

/// One persisted row of the results log.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultRecord {
    pub timestamp: PrimitiveDateTime,
    pub patient_id: String,
    pub location: String,
    pub threshold_percent: f64,
    pub gamma_percent: f64,
    pub normalization: Normalization,
    pub external_gamma_percent: f64,
}

impl ResultRecord {
    /// Build the record for a scored session. Gamma is rounded to two
    /// decimals; the external (Octavius) value must be a percentage.
    pub fn from_session(
        session: &SessionResult,
        params: &GammaParameters,
        location: &str,
        external_gamma_percent: f64,
        timestamp: PrimitiveDateTime,
    ) -> Result<Self> {
        if !(0.0..=100.0).contains(&external_gamma_percent) {
            return Err(GammaError::InvalidParameters(format!(
                "external gamma must be within 0..=100 %, got {external_gamma_percent}"
            )));
        }
        Ok(Self {
            timestamp,
            patient_id: session.patient_id.clone(),
            location: location.to_string(),
            threshold_percent: params.low_dose_threshold_percent(),
            gamma_percent: round2(session.aggregate_pass_percentage),
            normalization: params.normalization(),
            external_gamma_percent,
        })
    }

    pub fn timestamp_text(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

/// Current wall-clock time at second precision, local when the offset is
/// known, UTC otherwise.
pub fn now_timestamp() -> PrimitiveDateTime {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let now = now.replace_nanosecond(0).unwrap_or(now);
    PrimitiveDateTime::new(now.date(), now.time())
}

pub fn format_timestamp(ts: PrimitiveDateTime) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    // Infallible for a PrimitiveDateTime with this description.
    ts.format(&fmt).unwrap_or_else(|_| ts.to_string())
}

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
