//! Confidence scorer: a deterministic weighted composite in `[0, 1]`.

use crate::items::ItemsStats;
use faktur_core::{ConfidenceComponents, ConfidenceScore, IssueCode, ValidationResult};

const W_ANCHORS: f64 = 0.30;
const W_ARITHMETIC: f64 = 0.30;
const W_NUMERIC_PURITY: f64 = 0.20;
const W_GRID_ALIGNMENT: f64 = 0.10;
const W_TOTALS: f64 = 0.10;

/// Alignment delta at which the grid-alignment component bottoms out.
const MAX_ALIGNMENT_DELTA: f64 = 0.05;

/// Evidence feeding the confidence score.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceInputs<'a> {
    /// Fraction of anchor classes matched in the winning region.
    pub header_coverage: f64,
    /// Mean token-to-column-midline distance from fusion.
    pub mean_alignment_delta: f64,
    /// Numeric purity accounting from the item builder.
    pub stats: Option<&'a ItemsStats>,
}

/// Score one document. A document with no extracted rows scores zero
/// across the board rather than averaging over nothing.
#[must_use = "returns the confidence score"]
pub fn score(inputs: ConfidenceInputs<'_>, validation: &ValidationResult) -> ConfidenceScore {
    let has_rows = inputs
        .stats
        .map_or(false, |s| s.numeric_cells > 0);
    if !has_rows && validation.row_checks.is_empty() {
        return ConfidenceScore::default();
    }

    let arithmetic = if validation.row_checks.is_empty() {
        0.0
    } else {
        let passed = validation.row_checks.iter().filter(|c| c.passed).count();
        passed as f64 / validation.row_checks.len() as f64
    };

    let numeric_purity = inputs.stats.map_or(0.0, ItemsStats::purity);

    let grid_alignment =
        1.0 - (inputs.mean_alignment_delta / MAX_ALIGNMENT_DELTA).clamp(0.0, 1.0);

    // Totals: resolution coverage, halved when a severe totals mismatch
    // was recorded.
    let totals_struct = &validation.totals;
    let resolved = [
        totals_struct.subtotal,
        totals_struct.tax_base,
        totals_struct.tax_amount,
        totals_struct.grand_total,
    ]
    .iter()
    .filter(|t| t.is_some())
    .count();
    let mut totals = resolved as f64 / 4.0;
    if validation
        .issues
        .iter()
        .any(|i| i.code == IssueCode::SevereMismatch && i.field.is_some())
    {
        totals /= 2.0;
    }

    let components = ConfidenceComponents {
        anchors: inputs.header_coverage.clamp(0.0, 1.0),
        arithmetic,
        numeric_purity,
        grid_alignment,
        totals,
    };
    let overall = W_ANCHORS * components.anchors
        + W_ARITHMETIC * components.arithmetic
        + W_NUMERIC_PURITY * components.numeric_purity
        + W_GRID_ALIGNMENT * components.grid_alignment
        + W_TOTALS * components.totals;

    ConfidenceScore { overall: overall.clamp(0.0, 1.0), components }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktur_core::{Issue, RowCheck, Totals};

    fn check(passed: bool) -> RowCheck {
        RowCheck {
            row: 0,
            computed: Some(100.0),
            printed: Some(100.0),
            tolerance: 1.0,
            passed,
            severe: false,
        }
    }

    #[test]
    fn test_empty_document_scores_zero() {
        let score = score(ConfidenceInputs::default(), &ValidationResult::default());
        assert_eq!(score.overall, 0.0);
        assert_eq!(score.components, ConfidenceComponents::default());
    }

    #[test]
    fn test_clean_document_scores_high() {
        let stats = ItemsStats { numeric_cells: 6, numeric_parsed: 6 };
        let validation = ValidationResult {
            row_checks: vec![check(true), check(true)],
            totals: Totals {
                subtotal: Some(1.0),
                tax_base: Some(1.0),
                tax_amount: Some(1.0),
                grand_total: Some(1.0),
            },
            issues: Vec::new(),
        };
        let inputs = ConfidenceInputs {
            header_coverage: 1.0,
            mean_alignment_delta: 0.0,
            stats: Some(&stats),
        };
        let score = score(inputs, &validation);
        assert!((score.overall - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_rows_drag_arithmetic() {
        let stats = ItemsStats { numeric_cells: 4, numeric_parsed: 4 };
        let validation = ValidationResult {
            row_checks: vec![check(true), check(false)],
            ..ValidationResult::default()
        };
        let inputs = ConfidenceInputs {
            header_coverage: 1.0,
            mean_alignment_delta: 0.0,
            stats: Some(&stats),
        };
        let score = score(inputs, &validation);
        assert!((score.components.arithmetic - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_severe_totals_mismatch_halves_totals_component() {
        let stats = ItemsStats { numeric_cells: 2, numeric_parsed: 2 };
        let validation = ValidationResult {
            row_checks: vec![check(true)],
            totals: Totals {
                subtotal: Some(1.0),
                tax_base: Some(1.0),
                tax_amount: Some(1.0),
                grand_total: Some(1.0),
            },
            issues: vec![Issue::field(
                IssueCode::SevereMismatch,
                "subtotal",
                "printed differs from computed",
            )],
        };
        let inputs = ConfidenceInputs {
            header_coverage: 1.0,
            mean_alignment_delta: 0.0,
            stats: Some(&stats),
        };
        let score = score(inputs, &validation);
        assert!((score.components.totals - 0.5).abs() < 1e-9);
    }
}
