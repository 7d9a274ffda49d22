use std::path::PathBuf;

use tracing::{info, warn};

use crate::decode::{DecodedBeam, LogDecoder, beam_id};
use crate::domain::{BeamResult, ExcludedBeam, SessionResult};
use crate::error::{GammaError, Result};
use crate::gamma::engine::{evaluate, evaluate_with_reference_max};
use crate::gamma::params::{GammaParameters, ThresholdBasis};

/// What to do when one beam of a session cannot be decoded or scored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abandon the whole session.
    #[default]
    FailFast,
    /// Leave the beam out, record why, and average the rest.
    ExcludeFailed,
}

/// Unweighted mean of the beams' pass percentages.
pub fn aggregate(beam_results: &[BeamResult]) -> Result<f64> {
    if beam_results.is_empty() {
        return Err(GammaError::EmptySession);
    }
    let sum: f64 = beam_results.iter().map(|b| b.pass_percentage).sum();
    Ok(sum / beam_results.len() as f64)
}

/// Scores every beam of one session with shared criteria.
pub struct SessionAggregator<'a, D: LogDecoder> {
    decoder: &'a D,
    params: GammaParameters,
    policy: FailurePolicy,
}

impl<'a, D: LogDecoder> SessionAggregator<'a, D> {
    pub fn new(decoder: &'a D, params: GammaParameters) -> Self {
        Self {
            decoder,
            params,
            policy: FailurePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Decode and score `paths` in order.
    pub fn score_paths(&self, patient_id: &str, paths: &[PathBuf]) -> Result<SessionResult> {
        let mut beams = Vec::with_capacity(paths.len());
        let mut excluded = Vec::new();
        for p in paths {
            match self.decoder.decode(p) {
                Ok(b) => beams.push(b),
                Err(e) => self.reject(beam_id(p), e, &mut excluded)?,
            }
        }
        self.score_beams(patient_id, &beams, excluded)
    }

    /// Score already decoded beams in order.
    pub fn score_decoded(&self, patient_id: &str, beams: &[DecodedBeam]) -> Result<SessionResult> {
        self.score_beams(patient_id, beams, Vec::new())
    }

    fn score_beams(
        &self,
        patient_id: &str,
        beams: &[DecodedBeam],
        mut excluded: Vec<ExcludedBeam>,
    ) -> Result<SessionResult> {
        let session_max = match self.params.threshold_basis() {
            ThresholdBasis::PerBeam => None,
            ThresholdBasis::PerSession => Some(
                beams
                    .iter()
                    .map(|b| b.planned.max_dose())
                    .fold(0.0, f64::max),
            ),
        };

        let mut beam_results = Vec::with_capacity(beams.len());
        for beam in beams {
            let scored = match session_max {
                Some(max) => {
                    evaluate_with_reference_max(&beam.planned, &beam.delivered, &self.params, max)
                }
                None => evaluate(&beam.planned, &beam.delivered, &self.params),
            };
            match scored {
                Ok(pass_percentage) => {
                    info!(
                        patient = patient_id,
                        beam = %beam.beam_id,
                        pass = pass_percentage,
                        "beam scored"
                    );
                    beam_results.push(BeamResult {
                        beam_id: beam.beam_id.clone(),
                        pass_percentage,
                    });
                }
                Err(e) => self.reject(beam.beam_id.clone(), e, &mut excluded)?,
            }
        }

        let aggregate_pass_percentage = aggregate(&beam_results)?;
        info!(
            patient = patient_id,
            beams = beam_results.len(),
            excluded = excluded.len(),
            pass = aggregate_pass_percentage,
            "session scored"
        );
        Ok(SessionResult {
            patient_id: patient_id.to_string(),
            beam_results,
            aggregate_pass_percentage,
            excluded,
        })
    }

    fn reject(&self, beam: String, err: GammaError, excluded: &mut Vec<ExcludedBeam>) -> Result<()> {
        match self.policy {
            FailurePolicy::FailFast => Err(GammaError::Beam {
                beam,
                source: Box::new(err),
            }),
            FailurePolicy::ExcludeFailed => {
                warn!(beam = %beam, error = %err, "beam excluded from session");
                excluded.push(ExcludedBeam {
                    beam_id: beam,
                    reason: err.to_string(),
                });
                Ok(())
            }
        }
    }
}
