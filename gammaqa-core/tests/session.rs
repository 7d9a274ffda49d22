use std::path::{Path, PathBuf};

use gammaqa_core::decode::{FluencePair, collect_session_files};
use gammaqa_core::patient::patient_id_from_path;
use gammaqa_core::{
    DecodedBeam, FailurePolicy, FluenceFileDecoder, FluenceMap, GammaError, GammaParameters,
    Normalization, PixelSpacing, SessionAggregator, ThresholdBasis,
};
use tempfile::TempDir;

fn flat(value: f64) -> FluenceMap {
    FluenceMap::new(3, 3, PixelSpacing::isotropic(1.0), vec![value; 9]).unwrap()
}

fn write_pair(dir: &Path, name: &str, planned: FluenceMap, delivered: FluenceMap) -> PathBuf {
    let p = dir.join(name);
    let pair = FluencePair { planned, delivered };
    std::fs::write(&p, serde_json::to_vec(&pair).unwrap()).unwrap();
    p
}

fn params() -> GammaParameters {
    GammaParameters::new(1.0, 3.0, 10.0, 0.5, Normalization::Global).unwrap()
}

#[test]
fn session_over_directory_scores_each_beam_in_order() {
    let tmp = TempDir::new().unwrap();
    write_pair(tmp.path(), "ABCDEFGHIJKL_arc2.json", flat(1.0), flat(1.0));
    // arc1: one pixel 10 % hot -> 8 of 9 pass
    let mut hot = vec![1.0; 9];
    hot[4] = 1.1;
    let hot = FluenceMap::new(3, 3, PixelSpacing::isotropic(1.0), hot).unwrap();
    write_pair(tmp.path(), "ABCDEFGHIJKL_arc1.json", flat(1.0), hot);

    let files = collect_session_files(&[tmp.path().to_path_buf()]).unwrap();
    let patient = patient_id_from_path(&files[0]).unwrap();
    let session = SessionAggregator::new(&FluenceFileDecoder, params())
        .score_paths(&patient, &files)
        .unwrap();

    assert_eq!(session.patient_id, "ABCDEFGHIJKL");
    let ids: Vec<_> = session.beam_results.iter().map(|b| b.beam_id.as_str()).collect();
    assert_eq!(ids, vec!["ABCDEFGHIJKL_arc1", "ABCDEFGHIJKL_arc2"]);
    let arc1 = session.beam_results[0].pass_percentage;
    assert!((arc1 - 800.0 / 9.0).abs() < 1e-9);
    assert!((session.aggregate_pass_percentage - (arc1 + 100.0) / 2.0).abs() < 1e-9);
    assert!(session.excluded.is_empty());
}

#[test]
fn fail_fast_aborts_on_undecodable_beam() {
    let tmp = TempDir::new().unwrap();
    let good = write_pair(tmp.path(), "ABCDEFGHIJKL_arc1.json", flat(1.0), flat(1.0));
    let bad = tmp.path().join("ABCDEFGHIJKL_arc2.json");
    std::fs::write(&bad, b"not json").unwrap();

    let err = SessionAggregator::new(&FluenceFileDecoder, params())
        .score_paths("ABCDEFGHIJKL", &[good, bad])
        .unwrap_err();
    match err {
        GammaError::Beam { beam, source } => {
            assert_eq!(beam, "ABCDEFGHIJKL_arc2");
            assert!(matches!(*source, GammaError::Decode { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn fail_fast_aborts_on_mismatched_beam() {
    let tmp = TempDir::new().unwrap();
    let good = write_pair(tmp.path(), "ABCDEFGHIJKL_arc1.json", flat(1.0), flat(1.0));
    let wide = FluenceMap::new(3, 4, PixelSpacing::isotropic(1.0), vec![1.0; 12]).unwrap();
    let bad = write_pair(tmp.path(), "ABCDEFGHIJKL_arc2.json", flat(1.0), wide);

    let err = SessionAggregator::new(&FluenceFileDecoder, params())
        .score_paths("ABCDEFGHIJKL", &[good, bad])
        .unwrap_err();
    assert!(err.to_string().contains("ABCDEFGHIJKL_arc2"));
    assert!(matches!(
        err,
        GammaError::Beam { ref source, .. } if matches!(**source, GammaError::DimensionMismatch { .. })
    ));
}

#[test]
fn exclusion_policy_averages_remaining_beams() {
    let tmp = TempDir::new().unwrap();
    let good = write_pair(tmp.path(), "ABCDEFGHIJKL_arc1.json", flat(1.0), flat(1.0));
    let bad = tmp.path().join("ABCDEFGHIJKL_arc2.json");
    std::fs::write(&bad, b"{}").unwrap();

    let session = SessionAggregator::new(&FluenceFileDecoder, params())
        .with_policy(FailurePolicy::ExcludeFailed)
        .score_paths("ABCDEFGHIJKL", &[good, bad])
        .unwrap();
    assert_eq!(session.beam_results.len(), 1);
    assert_eq!(session.aggregate_pass_percentage, 100.0);
    assert_eq!(session.excluded.len(), 1);
    assert_eq!(session.excluded[0].beam_id, "ABCDEFGHIJKL_arc2");
}

#[test]
fn exclusion_policy_with_no_survivors_is_empty_session() {
    let tmp = TempDir::new().unwrap();
    let bad = tmp.path().join("ABCDEFGHIJKL_arc1.json");
    std::fs::write(&bad, b"[]").unwrap();
    let err = SessionAggregator::new(&FluenceFileDecoder, params())
        .with_policy(FailurePolicy::ExcludeFailed)
        .score_paths("ABCDEFGHIJKL", &[bad])
        .unwrap_err();
    assert!(matches!(err, GammaError::EmptySession));
}

#[test]
fn session_threshold_basis_uses_the_session_maximum() {
    let beams = vec![
        DecodedBeam {
            beam_id: "high".into(),
            planned: flat(10.0),
            delivered: flat(10.0),
        },
        DecodedBeam {
            beam_id: "low".into(),
            planned: flat(1.0),
            delivered: flat(1.0),
        },
    ];
    let p = GammaParameters::new(1.0, 3.0, 20.0, 0.5, Normalization::Global).unwrap();

    let per_beam = SessionAggregator::new(&FluenceFileDecoder, p)
        .score_decoded("ABCDEFGHIJKL", &beams)
        .unwrap();
    assert_eq!(per_beam.aggregate_pass_percentage, 100.0);

    // 20 % of the session max (10) leaves nothing evaluable in the low beam.
    let per_session = p.with_threshold_basis(ThresholdBasis::PerSession);
    let err = SessionAggregator::new(&FluenceFileDecoder, per_session)
        .score_decoded("ABCDEFGHIJKL", &beams)
        .unwrap_err();
    assert!(matches!(
        err,
        GammaError::Beam { ref beam, ref source } if beam == "low" && matches!(**source, GammaError::EmptyEvaluableSet)
    ));
}
