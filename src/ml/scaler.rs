//! Min-max scaling fitted on the training split.
//!
//! `v -> (v - min) / (max - min)` per column. A column that is constant in
//! the training data maps to 0.0. Values outside the fitted range are not
//! clamped, so inference inputs may scale outside [0, 1].

use ndarray::{Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::features::FeatureMatrix;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ScalerError {
    #[error("Cannot fit a scaler on empty data")]
    EmptyData,
    #[error("Expected {expected} features, got {found}")]
    FeatureCountMismatch { expected: usize, found: usize },
}

/// Unfitted min-max scaler
#[derive(Debug, Clone, Copy, Default)]
pub struct MinMaxScaler;

impl MinMaxScaler {
    pub fn new() -> Self {
        Self
    }

    /// Record per-column minimum and maximum of the raw features
    pub fn fit(&self, data: &FeatureMatrix) -> Result<FittedMinMaxScaler, ScalerError> {
        if data.is_empty() {
            return Err(ScalerError::EmptyData);
        }

        let min = data
            .features
            .fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
        let max = data
            .features
            .fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));

        tracing::debug!("Fitted min-max scaler: min={:?} max={:?}", min.to_vec(), max.to_vec());

        Ok(FittedMinMaxScaler {
            min: min.to_vec(),
            max: max.to_vec(),
        })
    }
}

/// Frozen scaler statistics. Immutable once fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedMinMaxScaler {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl FittedMinMaxScaler {
    pub fn original_min(&self) -> &[f64] {
        &self.min
    }

    pub fn original_max(&self) -> &[f64] {
        &self.max
    }

    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    /// Scale a raw feature matrix
    pub fn scale(&self, features: &Array2<f64>) -> Result<Array2<f64>, ScalerError> {
        if features.ncols() != self.n_features() {
            return Err(ScalerError::FeatureCountMismatch {
                expected: self.n_features(),
                found: features.ncols(),
            });
        }

        let min = Array1::from_vec(self.min.clone());
        let range = Array1::from_iter(self.min.iter().zip(&self.max).map(|(lo, hi)| hi - lo));

        let mut scaled = features.to_owned();
        for mut row in scaled.rows_mut() {
            Zip::from(&mut row)
                .and(&min)
                .and(&range)
                .for_each(|v, &lo, &r| *v = if r == 0.0 { 0.0 } else { (*v - lo) / r });
        }
        Ok(scaled)
    }

    /// Return a copy of `data` with its scaled features filled in
    pub fn transform(&self, data: &FeatureMatrix) -> Result<FeatureMatrix, ScalerError> {
        let scaled = self.scale(&data.features)?;
        Ok(FeatureMatrix {
            features: data.features.clone(),
            scaled: Some(scaled),
            labels: data.labels.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn train_matrix() -> FeatureMatrix {
        FeatureMatrix::new(
            array![[1.0, 10.0, 5.0], [3.0, 20.0, 5.0], [2.0, 15.0, 5.0]],
            None,
        )
    }

    #[test]
    fn test_fit_records_min_max() {
        let fitted = MinMaxScaler::new().fit(&train_matrix()).unwrap();

        assert_eq!(fitted.original_min(), &[1.0, 10.0, 5.0]);
        assert_eq!(fitted.original_max(), &[3.0, 20.0, 5.0]);
    }

    #[test]
    fn test_transform_into_unit_range() {
        let data = train_matrix();
        let fitted = MinMaxScaler::new().fit(&data).unwrap();
        let scaled = fitted.transform(&data).unwrap();
        let s = scaled.scaled.unwrap();

        assert_relative_eq!(s[[0, 0]], 0.0);
        assert_relative_eq!(s[[1, 0]], 1.0);
        assert_relative_eq!(s[[2, 1]], 0.5);
        assert!(s.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_constant_column_maps_to_zero() {
        let data = train_matrix();
        let fitted = MinMaxScaler::new().fit(&data).unwrap();
        let s = fitted.scale(&data.features).unwrap();

        assert!(s.column(2).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_out_of_range_values_are_not_clamped() {
        let fitted = MinMaxScaler::new().fit(&train_matrix()).unwrap();
        let s = fitted.scale(&array![[5.0, 0.0, 5.0]]).unwrap();

        assert_relative_eq!(s[[0, 0]], 2.0);
        assert_relative_eq!(s[[0, 1]], -1.0);
    }

    #[test]
    fn test_transform_does_not_refit() {
        let fitted = MinMaxScaler::new().fit(&train_matrix()).unwrap();
        let before = fitted.clone();

        let other = FeatureMatrix::new(array![[100.0, -5.0, 9.0]], None);
        let _ = fitted.transform(&other).unwrap();

        assert_eq!(fitted, before);
    }

    #[test]
    fn test_fit_on_empty_data_fails() {
        let empty = FeatureMatrix::new(Array2::zeros((0, 3)), None);
        assert_eq!(MinMaxScaler::new().fit(&empty), Err(ScalerError::EmptyData));
    }

    #[test]
    fn test_feature_count_mismatch() {
        let fitted = MinMaxScaler::new().fit(&train_matrix()).unwrap();
        let result = fitted.scale(&array![[1.0, 2.0]]);

        assert_eq!(
            result,
            Err(ScalerError::FeatureCountMismatch {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn test_transform_keeps_raw_features_and_labels() {
        let data = FeatureMatrix::new(
            array![[1.0, 10.0, 5.0], [3.0, 20.0, 6.0]],
            Some(array![7.0, 8.0]),
        );
        let fitted = MinMaxScaler::new().fit(&data).unwrap();
        let out = fitted.transform(&data).unwrap();

        assert_eq!(out.features, data.features);
        assert_eq!(out.labels, data.labels);
        assert!(out.scaled.is_some());
    }

    // ==================== Property-Based Tests ====================

    mod proptest_tests {
        use proptest::prelude::*;

        use super::*;

        fn matrix() -> impl Strategy<Value = FeatureMatrix> {
            prop::collection::vec(prop::array::uniform3(-1.0e6f64..1.0e6), 1..50).prop_map(|rows| {
                let n = rows.len();
                let flat: Vec<f64> = rows.into_iter().flatten().collect();
                FeatureMatrix::new(Array2::from_shape_vec((n, 3), flat).unwrap(), None)
            })
        }

        proptest! {
            #[test]
            fn training_rows_scale_into_unit_range(data in matrix()) {
                let fitted = MinMaxScaler::new().fit(&data).unwrap();
                let scaled = fitted.scale(&data.features).unwrap();

                for &v in scaled.iter() {
                    prop_assert!((0.0..=1.0).contains(&v), "scaled value {} outside [0, 1]", v);
                }
            }

            #[test]
            fn transform_never_changes_fitted_stats(data in matrix(), other in matrix()) {
                let fitted = MinMaxScaler::new().fit(&data).unwrap();
                let before = fitted.clone();
                let _ = fitted.transform(&other).unwrap();
                prop_assert_eq!(fitted, before);
            }
        }
    }
}
