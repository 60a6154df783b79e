use ndarray::Array2;
use std::collections::BTreeMap;

use crate::utils::AnalysisError;

/// Validate feature matrix dimensions and values
///
/// # Arguments
/// * `features` - Feature matrix to validate
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(AnalysisError::ValidationError)` if invalid
pub fn validate_features(features: &Array2<f64>) -> Result<(), AnalysisError> {
    if features.nrows() == 0 {
        return Err(AnalysisError::ValidationError(
            "feature matrix cannot be empty".to_string(),
        ));
    }

    if features.ncols() == 0 {
        return Err(AnalysisError::ValidationError(
            "feature matrix must have at least one column".to_string(),
        ));
    }

    for value in features.iter() {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::ValidationError(
                "feature matrix contains NaN or Inf values".to_string(),
            ));
        }
    }

    Ok(())
}

/// Build the one-column feature matrix for a group's numeric values
pub fn group_features(values: &[f64]) -> Result<Array2<f64>, AnalysisError> {
    let features = Array2::from_shape_vec((values.len(), 1), values.to_vec())
        .map_err(|e| AnalysisError::ValidationError(format!("failed to create Array2: {}", e)))?;
    validate_features(&features)?;
    Ok(features)
}

/// Partition row indices by key, keeping each partition in input order
///
/// Keys are ordered, so iterating the partitions is deterministic.
pub fn partition_by<T, K, F>(items: &[T], key: F) -> BTreeMap<K, Vec<usize>>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut partitions: BTreeMap<K, Vec<usize>> = BTreeMap::new();
    for (idx, item) in items.iter().enumerate() {
        partitions.entry(key(item)).or_default().push(idx);
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_validate_features_valid() {
        let features = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        assert!(validate_features(&features).is_ok());
    }

    #[test]
    fn test_validate_features_empty_rows() {
        let features = Array2::<f64>::zeros((0, 2));
        assert!(validate_features(&features).is_err());
    }

    #[test]
    fn test_validate_features_empty_cols() {
        let features = Array2::<f64>::zeros((2, 0));
        assert!(validate_features(&features).is_err());
    }

    #[test]
    fn test_validate_features_with_nan() {
        let features = arr2(&[[1.0, f64::NAN], [3.0, 4.0]]);
        let result = validate_features(&features);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("NaN"));
    }

    #[test]
    fn test_group_features_shape() {
        let features = group_features(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(features.nrows(), 3);
        assert_eq!(features.ncols(), 1);
        assert_eq!(features[[2, 0]], 3.0);
    }

    #[test]
    fn test_group_features_rejects_inf() {
        assert!(group_features(&[1.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn test_partition_by_preserves_order() {
        let items = ["b1", "a1", "b2", "a2", "c1"];
        let parts = partition_by(&items, |s| s.chars().next().unwrap());

        assert_eq!(parts.keys().collect::<Vec<_>>(), vec![&'a', &'b', &'c']);
        assert_eq!(parts[&'a'], vec![1, 3]);
        assert_eq!(parts[&'b'], vec![0, 2]);
        assert_eq!(parts[&'c'], vec![4]);
    }
}
