use super::error::AnalysisError;

/// Validate the expected outlier fraction is within (0, 0.5]
///
/// # Arguments
/// * `contamination` - Expected share of outliers in a group
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(AnalysisError::ValidationError)` if out of range
pub fn validate_contamination(contamination: f64) -> Result<(), AnalysisError> {
    if !(contamination > 0.0 && contamination <= 0.5) {
        return Err(AnalysisError::ValidationError(format!(
            "contamination must be in (0, 0.5], got {}",
            contamination
        )));
    }
    Ok(())
}

/// Percentile of `values` using linear interpolation between closest ranks
///
/// `q` is expressed in percent, `[0, 100]`. Returns `None` for empty input.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let q = q.clamp(0.0, 100.0);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}
