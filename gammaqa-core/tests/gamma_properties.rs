use gammaqa_core::{
    FluenceMap, GammaError, GammaParameters, Normalization, PixelSpacing, evaluate, gamma_map,
};

fn bump() -> FluenceMap {
    FluenceMap::from_fn(20, 20, PixelSpacing::isotropic(1.0), |r, c| {
        let dr = r as f64 - 9.5;
        let dc = c as f64 - 9.5;
        0.05 + (-(dr * dr + dc * dc) / 30.0).exp()
    })
    .unwrap()
}

fn stripe(rows: usize, cols: usize, at: usize) -> FluenceMap {
    FluenceMap::from_fn(rows, cols, PixelSpacing::isotropic(1.0), |_, c| {
        if c == at { 1.0 } else { 0.0 }
    })
    .unwrap()
}

/// Ramp with the right half delivered 5 % hot.
fn hot_half(scale: f64) -> (FluenceMap, FluenceMap) {
    let sp = PixelSpacing::isotropic(1.0);
    let reference = FluenceMap::from_fn(2, 20, sp, |_, c| scale * (10.0 + c as f64)).unwrap();
    let evaluated = FluenceMap::from_fn(2, 20, sp, |_, c| {
        let base = scale * (10.0 + c as f64);
        if c >= 10 { base * 1.05 } else { base }
    })
    .unwrap();
    (reference, evaluated)
}

#[test]
fn identical_maps_pass_everywhere() {
    let m = bump();
    for norm in [Normalization::Local, Normalization::Global] {
        for (dta, dd, thr, res) in [
            (0.0, 0.44, 10.0, 0.1),
            (1.0, 1.0, 0.0, 0.5),
            (3.0, 3.0, 50.0, 1.0),
            (2.0, 2.0, 99.0, 0.25),
        ] {
            let p = GammaParameters::new(dta, dd, thr, res, norm).unwrap();
            assert_eq!(evaluate(&m, &m, &p).unwrap(), 100.0, "{p}");
        }
    }
}

#[test]
fn shift_beyond_dta_fails_everywhere() {
    let reference = stripe(9, 20, 5);
    let evaluated = stripe(9, 20, 9);
    for norm in [Normalization::Local, Normalization::Global] {
        let p = GammaParameters::new(2.0, 3.0, 10.0, 0.5, norm).unwrap();
        assert_eq!(evaluate(&reference, &evaluated, &p).unwrap(), 0.0);
    }
}

#[test]
fn shift_within_dta_passes() {
    let reference = stripe(9, 20, 5);
    let evaluated = stripe(9, 20, 6);
    let p = GammaParameters::new(2.0, 3.0, 10.0, 0.5, Normalization::Global).unwrap();
    assert_eq!(evaluate(&reference, &evaluated, &p).unwrap(), 100.0);
}

#[test]
fn uniform_scaling_keeps_pass_rate() {
    for norm in [Normalization::Local, Normalization::Global] {
        let p = GammaParameters::new(1.0, 3.0, 10.0, 0.5, norm).unwrap();
        let (r1, e1) = hot_half(1.0);
        let base = evaluate(&r1, &e1, &p).unwrap();
        assert!(base > 0.0 && base < 100.0, "{norm}: {base}");
        for k in [4.0, 0.25] {
            let (rk, ek) = hot_half(k);
            assert_eq!(evaluate(&rk, &ek, &p).unwrap(), base, "{norm} x{k}");
        }
    }
}

#[test]
fn low_dose_samples_do_not_count() {
    // One hot failing pixel below threshold; the rest agree exactly.
    let sp = PixelSpacing::isotropic(1.0);
    let reference = FluenceMap::new(1, 4, sp, vec![1.0, 1.0, 1.0, 0.0]).unwrap();
    let evaluated = FluenceMap::new(1, 4, sp, vec![1.0, 1.0, 1.0, 0.05]).unwrap();
    let p = GammaParameters::new(0.0, 1.0, 10.0, 0.1, Normalization::Global).unwrap();
    assert_eq!(evaluate(&reference, &evaluated, &p).unwrap(), 100.0);

    let map = gamma_map(&reference, &evaluated, &p, None).unwrap();
    assert_eq!(map.evaluable(), 3);
}

#[test]
fn local_normalization_is_stricter_below_max() {
    // Half-max pixel delivered 2 % hot: within 3 % global, outside 1 % local.
    let sp = PixelSpacing::isotropic(1.0);
    let reference = FluenceMap::new(1, 2, sp, vec![1.0, 0.5]).unwrap();
    let evaluated = FluenceMap::new(1, 2, sp, vec![1.0, 0.51]).unwrap();
    let global = GammaParameters::new(0.0, 3.0, 10.0, 0.1, Normalization::Global).unwrap();
    let local = GammaParameters::new(0.0, 1.0, 10.0, 0.1, Normalization::Local).unwrap();
    assert_eq!(evaluate(&reference, &evaluated, &global).unwrap(), 100.0);
    assert_eq!(evaluate(&reference, &evaluated, &local).unwrap(), 50.0);
}

#[test]
fn mismatched_dimensions_are_rejected() {
    let p = GammaParameters::new(1.0, 3.0, 10.0, 0.5, Normalization::Global).unwrap();
    let a = stripe(9, 20, 5);
    let b = stripe(9, 21, 5);
    assert!(matches!(
        evaluate(&a, &b, &p),
        Err(GammaError::DimensionMismatch { .. })
    ));

    let c = FluenceMap::new(9, 20, PixelSpacing::isotropic(0.5), a.doses().to_vec()).unwrap();
    assert!(matches!(
        evaluate(&a, &c, &p),
        Err(GammaError::DimensionMismatch { .. })
    ));
}

#[test]
fn all_zero_maps_have_no_evaluable_set() {
    let zero = FluenceMap::new(3, 3, PixelSpacing::isotropic(1.0), vec![0.0; 9]).unwrap();
    let p = GammaParameters::new(1.0, 3.0, 10.0, 0.5, Normalization::Global).unwrap();
    assert!(matches!(
        evaluate(&zero, &zero, &p),
        Err(GammaError::EmptyEvaluableSet)
    ));
}
