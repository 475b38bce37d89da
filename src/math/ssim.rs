//! Structural similarity between two station vectors.
//!
//! A day is treated as a one-dimensional "image" whose pixels are stations.
//! The index combines three terms computed over the valid (non no-data)
//! positions of both vectors:
//!
//! ```text
//! luminance = (2·μ1·μ2 + C0) / (μ1² + μ2² + C0)
//! contrast  = (2·σ1·σ2 + C1) / (σ1² + σ2² + C1)
//! structure = (σ12 + C2)     / (σ1·σ2 + C2)
//! ssim      = luminance^p0 · contrast^p1 · structure^p2
//! ```
//!
//! with `C[i] = (k[i]·L)²` and `L` the largest valid value of either vector.
//! Standard deviations and the covariance use the `N − 1` denominator.

use crate::domain::SsimParams;
use crate::error::AppError;

/// Values within this distance of the sentinel are treated as missing.
pub const NODATA_TOLERANCE: f64 = 0.01;

pub fn is_nodata(x: f64, nodata: f64) -> bool {
    (x - nodata).abs() <= NODATA_TOLERANCE
}

/// The three factors of the index before exponentiation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsimTerms {
    pub luminance: f64,
    pub contrast: f64,
    pub structure: f64,
}

impl SsimTerms {
    pub fn combine(&self, power: &[f64; 3]) -> f64 {
        self.luminance.powf(power[0]) * self.contrast.powf(power[1]) * self.structure.powf(power[2])
    }
}

/// Structural similarity of `a` and `b`.
///
/// Errors when the vectors differ in length, share no valid position, or the
/// configured exponents turn the index non-finite.
pub fn ssim(a: &[f64], b: &[f64], params: &SsimParams) -> Result<f64, AppError> {
    let terms = ssim_terms(a, b, params)?;
    let value = terms.combine(&params.power);
    if !value.is_finite() {
        return Err(AppError::algorithm(format!(
            "non-finite similarity (luminance={:.6}, contrast={:.6}, structure={:.6}, power={:?})",
            terms.luminance, terms.contrast, terms.structure, params.power
        )));
    }
    Ok(value)
}

pub fn ssim_terms(a: &[f64], b: &[f64], params: &SsimParams) -> Result<SsimTerms, AppError> {
    if a.len() != b.len() {
        return Err(AppError::data(format!(
            "station vectors differ in length ({} vs {})",
            a.len(),
            b.len()
        )));
    }

    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b.iter())
        .filter(|(x, y)| !is_nodata(**x, params.nodata) && !is_nodata(**y, params.nodata))
        .map(|(x, y)| (*x, *y))
        .collect();

    if pairs.is_empty() {
        return Err(AppError::data(
            "empty station vector: every position is no-data",
        ));
    }

    let n = pairs.len() as f64;
    let range = pairs
        .iter()
        .flat_map(|(x, y)| [*x, *y])
        .fold(f64::NEG_INFINITY, f64::max);

    let mean1 = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean2 = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    // A single valid station has no spread.
    let (var1, var2, cov) = if pairs.len() > 1 {
        let mut s11 = 0.0;
        let mut s22 = 0.0;
        let mut s12 = 0.0;
        for (x, y) in &pairs {
            let dx = x - mean1;
            let dy = y - mean2;
            s11 += dx * dx;
            s22 += dy * dy;
            s12 += dx * dy;
        }
        (s11 / (n - 1.0), s22 / (n - 1.0), s12 / (n - 1.0))
    } else {
        (0.0, 0.0, 0.0)
    };
    let sd1 = var1.sqrt();
    let sd2 = var2.sqrt();

    let c: [f64; 3] = [
        (params.k[0] * range).powi(2),
        (params.k[1] * range).powi(2),
        (params.k[2] * range).powi(2),
    ];

    Ok(SsimTerms {
        luminance: stabilized_ratio(
            2.0 * mean1 * mean2 + c[0],
            mean1 * mean1 + mean2 * mean2 + c[0],
        ),
        contrast: stabilized_ratio(2.0 * sd1 * sd2 + c[1], var1 + var2 + c[1]),
        structure: stabilized_ratio(cov + c[2], sd1 * sd2 + c[2]),
    })
}

// 0/0 only arises when both statistics vanish, i.e. the two sides agree.
fn stabilized_ratio(numer: f64, denom: f64) -> f64 {
    if denom == 0.0 {
        if numer == 0.0 { 1.0 } else { f64::NAN }
    } else {
        numer / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn params() -> SsimParams {
        SsimParams::default()
    }

    #[test]
    fn identical_vectors_score_one() {
        let x = [1.0, 4.0, 2.5, 0.0, 7.0];
        let v = ssim(&x, &x, &params()).unwrap();
        assert!((v - 1.0).abs() < 1e-12, "got {v}");
    }

    #[test]
    fn dissimilar_vectors_score_lower() {
        let x = [1.0, 4.0, 2.5, 0.0, 7.0];
        let y = [7.0, 0.0, 2.5, 4.0, 1.0];
        let same = ssim(&x, &x, &params()).unwrap();
        let other = ssim(&x, &y, &params()).unwrap();
        assert!(other < same);
    }

    #[test]
    fn terms_match_hand_computation() {
        let p = SsimParams {
            k: [0.0, 0.0, 0.0],
            ..params()
        };
        let a = [1.0, 3.0];
        let b = [2.0, 4.0];
        let t = ssim_terms(&a, &b, &p).unwrap();
        // means 2 and 3; both sd = sqrt(2); cov = 2
        assert!((t.luminance - 12.0 / 13.0).abs() < 1e-12);
        assert!((t.contrast - 1.0).abs() < 1e-12);
        assert!((t.structure - 1.0).abs() < 1e-12);
    }

    #[test]
    fn nodata_positions_are_excluded() {
        let p = params();
        let a = [1.0, -9999.0, 3.0, 5.0];
        let b = [1.0, 42.0, 3.0, 5.0];
        let v = ssim(&a, &b, &p).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn all_nodata_is_a_data_error() {
        let p = params();
        let a = [-9999.0, -9999.005];
        let b = [1.0, 2.0];
        let err = ssim(&a, &b, &p).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }

    #[test]
    fn all_zero_vectors_are_identical() {
        let a = [0.0, 0.0, 0.0];
        let v = ssim(&a, &a, &params()).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_station_compares_levels_only() {
        let v = ssim(&[2.0], &[2.0], &params()).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
        let w = ssim(&[2.0], &[4.0], &params()).unwrap();
        assert!(w < 1.0);
    }

    proptest! {
        #[test]
        fn ssim_is_symmetric(
            pairs in prop::collection::vec((0.0f64..100.0, 0.0f64..100.0), 2..12)
        ) {
            let a: Vec<f64> = pairs.iter().map(|p| p.0).collect();
            let b: Vec<f64> = pairs.iter().map(|p| p.1).collect();
            let ab = ssim(&a, &b, &params()).unwrap();
            let ba = ssim(&b, &a, &params()).unwrap();
            prop_assert!((ab - ba).abs() < 1e-12);
        }

        #[test]
        fn self_similarity_is_maximal(
            a in prop::collection::vec(0.0f64..100.0, 2..12),
            b in prop::collection::vec(0.0f64..100.0, 12),
        ) {
            let b = &b[..a.len()];
            let aa = ssim(&a, &a, &params()).unwrap();
            let ab = ssim(&a, b, &params()).unwrap();
            prop_assert!((aa - 1.0).abs() < 1e-9);
            prop_assert!(ab <= aa + 1e-9);
        }
    }
}
