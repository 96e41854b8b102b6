//! # Shingle Encoder
//!
//! Slopes are quantized into twenty 10°-wide grades (0 for -90°, 19 for +90°).
//! A shingle of length `k` encodes `k` consecutive grades as a base-100
//! integer, so `(10, 7)` becomes `1007`. A signature is the *set* of shingles
//! of a profile: repeated patterns collapse, only the repertoire matters.

use std::collections::BTreeSet;

use crate::error::{Result, TrailError};

/// Signature of a track: distinct shingles in ascending order.
pub type SignatureSet = BTreeSet<u64>;

/// Number of quantized slope grades.
pub const GRADE_COUNT: u8 = 20;

/// Longest shingle whose base-100 encoding fits in a `u64`.
pub const MAX_SHINGLE_LENGTH: usize = 9;

/// Map a slope in degrees to its 10° grade in `0..=19`.
///
/// ```rust
/// use trail_matcher::quantize;
///
/// assert_eq!(quantize(-90.0), 0);
/// assert_eq!(quantize(0.0), 9);
/// assert_eq!(quantize(14.9), 10);
/// assert_eq!(quantize(90.0), 19);
/// ```
pub fn quantize(slope_degrees: f64) -> u8 {
    if slope_degrees.is_nan() {
        return 9;
    }
    if slope_degrees >= 90.0 {
        return GRADE_COUNT - 1;
    }
    let grade = (slope_degrees / 10.0).floor() + 9.0;
    grade.clamp(0.0, f64::from(GRADE_COUNT - 1)) as u8
}

/// Encode a slope sequence as a set of `k`-length shingles.
///
/// With `k == 1` the signature is the set of grades present. With `k > 1`
/// each window of `k` consecutive grades becomes one shingle. Sequences
/// shorter than `k` give an empty set.
pub fn shingle(slopes: &[f64], k: usize) -> Result<SignatureSet> {
    if k == 0 || k > MAX_SHINGLE_LENGTH {
        return Err(TrailError::InvalidShingleLength {
            length: k,
            max: MAX_SHINGLE_LENGTH,
        });
    }

    let grades: Vec<u8> = slopes.iter().map(|&s| quantize(s)).collect();
    Ok(grades
        .windows(k)
        .map(|window| {
            window
                .iter()
                .fold(0u64, |acc, &g| acc * 100 + u64::from(g))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_boundaries() {
        assert_eq!(quantize(-90.0), 0);
        assert_eq!(quantize(-89.9), 0);
        assert_eq!(quantize(-0.1), 8);
        assert_eq!(quantize(0.0), 9);
        assert_eq!(quantize(10.0), 10);
        assert_eq!(quantize(-20.0), 7);
        assert_eq!(quantize(89.9), 17);
        assert_eq!(quantize(90.0), 19);
        assert_eq!(quantize(-400.0), 0);
        assert_eq!(quantize(400.0), 19);
    }

    #[test]
    fn test_quantize_monotonic() {
        let mut prev = quantize(-90.0);
        for i in -900..=900 {
            let q = quantize(i as f64 / 10.0);
            assert!(q >= prev, "grade dropped at {}", i as f64 / 10.0);
            assert!(q < GRADE_COUNT);
            prev = q;
        }
    }

    #[test]
    fn test_single_grades_collapse() {
        let set = shingle(&[10.0, 10.0, -20.0, -20.0], 1).unwrap();
        assert_eq!(set, SignatureSet::from([10, 7]));
    }

    #[test]
    fn test_pairs_keep_order() {
        let set = shingle(&[10.0, 10.0, -20.0, -20.0], 2).unwrap();
        assert_eq!(set, SignatureSet::from([1010, 1007, 707]));

        let reversed = shingle(&[-20.0, -20.0, 10.0, 10.0], 2).unwrap();
        assert_eq!(reversed, SignatureSet::from([707, 710, 1010]));
    }

    #[test]
    fn test_cardinality_bounds() {
        let slopes: Vec<f64> = (0..200).map(|i| (i as f64 * 7.3) % 180.0 - 90.0).collect();
        assert!(shingle(&slopes, 1).unwrap().len() <= GRADE_COUNT as usize);
        for k in 2..=4 {
            assert!(shingle(&slopes, k).unwrap().len() <= slopes.len() - k + 1);
        }
    }

    #[test]
    fn test_longest_shingle_fits() {
        let steep = [90.0; MAX_SHINGLE_LENGTH];
        let set = shingle(&steep, MAX_SHINGLE_LENGTH).unwrap();
        assert_eq!(set, SignatureSet::from([191_919_191_919_191_919]));
    }

    #[test]
    fn test_short_input_and_bad_k() {
        assert!(shingle(&[1.0], 2).unwrap().is_empty());
        assert!(shingle(&[], 1).unwrap().is_empty());
        assert!(matches!(
            shingle(&[1.0], 0),
            Err(TrailError::InvalidShingleLength { length: 0, .. })
        ));
        assert!(shingle(&[1.0; 12], 10).is_err());
    }
}
