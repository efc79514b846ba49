/// Result of validating one embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddingQualityReport {
    pub is_valid: bool,
    pub dimension: usize,
    pub norm: f32,
    pub quality_score: f32,
    pub issues: Vec<String>,
}

/// Validate basic properties of an embedding vector.
///
/// Checks exact dimension and that every component is finite. Passing
/// vectors score their L2 norm; failing vectors score 0.
pub fn validate_embedding(embedding: &[f32], expected_dimension: usize) -> EmbeddingQualityReport {
    let mut issues: Vec<String> = Vec::new();

    let dimension = embedding.len();
    if dimension != expected_dimension {
        issues.push(format!(
            "dimension mismatch: got {dimension}, expected {expected_dimension}"
        ));
    }

    let mut norm_sq = 0.0f32;
    let mut non_finite_reported = false;
    for value in embedding {
        if !value.is_finite() && !non_finite_reported {
            issues.push("embedding contains non-finite value (NaN or Inf)".to_string());
            non_finite_reported = true;
        }
        norm_sq += value * value;
    }

    let norm = if dimension > 0 { norm_sq.sqrt() } else { 0.0 };
    let is_valid = issues.is_empty();

    EmbeddingQualityReport {
        is_valid,
        dimension,
        norm,
        quality_score: if is_valid { norm } else { 0.0 },
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_vector_scores_its_norm() {
        let report = validate_embedding(&[3.0, 4.0], 2);
        assert!(report.is_valid);
        assert!((report.norm - 5.0).abs() < 1e-6);
        assert!((report.quality_score - 5.0).abs() < 1e-6);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn dimension_mismatch_invalidates() {
        let report = validate_embedding(&[1.0, 2.0, 3.0], 2);
        assert!(!report.is_valid);
        assert_eq!(report.quality_score, 0.0);
        assert_eq!(report.issues.len(), 1);
    }

    #[test]
    fn non_finite_components_invalidate() {
        let report = validate_embedding(&[1.0, f32::NAN], 2);
        assert!(!report.is_valid);
        assert_eq!(report.quality_score, 0.0);
        assert!(report.issues[0].contains("non-finite"));

        let report = validate_embedding(&[f32::INFINITY, 0.0], 2);
        assert!(!report.is_valid);
    }
}
