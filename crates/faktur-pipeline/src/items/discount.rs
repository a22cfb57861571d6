//! Two-pass discount resolution and proration.
//!
//! Pass one settles each row's own discount (an absolute amount wins
//! over a percentage on the same row). Pass two prorates a document-level
//! discount across the lines by their *residual weight*
//! `line_base - row_discount`, so a row that already stated its own
//! discount absorbs proportionally less of the document discount. Each
//! share rounds half-up and the rounding residual is reconciled so the
//! allocated shares sum exactly to the rounded document discount. The
//! allocator is a pure function of its inputs; running it on
//! already-discounted output changes nothing because the inputs it reads
//! never include its own results.

use crate::numeric::round_half_up;
use faktur_core::ReconcileStrategy;

/// Per-line discount evidence, read by the allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiscountInput {
    /// Line base (`qty × unit_price`, or the printed amount when qty or
    /// price is missing). The proration weighs by what remains of it
    /// after the row's own discount.
    pub line_base: f64,
    /// Percentage stated on the row, if any.
    pub row_percent: Option<f64>,
    /// Absolute amount stated on the row, if any.
    pub row_amount: Option<f64>,
}

/// A document-level discount found by the configured patterns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DocDiscount {
    /// Percentage of the document subtotal.
    Percent(f64),
    /// Absolute amount.
    Amount(f64),
}

/// Resolved discount for one line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiscountLine {
    /// Row-stated discount after pass one.
    pub row_discount: f64,
    /// Share of the document-level discount after pass two.
    pub allocated_share: f64,
    /// Final discount amount (`row_discount + allocated_share`).
    pub discount_amount: f64,
    /// Stated percentage, or back-derived from the final amount.
    pub discount_percent: Option<f64>,
}

/// Resolve and prorate discounts across the document's lines.
#[must_use = "returns the per-line discount resolution"]
pub fn allocate(
    inputs: &[DiscountInput],
    doc: Option<DocDiscount>,
    rounding: u32,
    reconcile: ReconcileStrategy,
) -> Vec<DiscountLine> {
    if inputs.is_empty() {
        return Vec::new();
    }

    // Pass one: row-stated discounts. Absolute beats percent on a row.
    let mut lines: Vec<DiscountLine> = inputs
        .iter()
        .map(|input| {
            let row_discount = match (input.row_amount, input.row_percent) {
                (Some(amount), _) => round_half_up(amount, rounding),
                (None, Some(percent)) => {
                    round_half_up(input.line_base * percent / 100.0, rounding)
                }
                (None, None) => 0.0,
            };
            DiscountLine { row_discount, ..DiscountLine::default() }
        })
        .collect();

    // Pass two: prorate the document-level discount by residual weight.
    if let Some(doc) = doc {
        let weights: Vec<f64> = inputs
            .iter()
            .zip(&lines)
            .map(|(input, line)| (input.line_base - line.row_discount).max(0.0))
            .collect();
        let total_weight: f64 = weights.iter().sum();
        let target = match doc {
            DocDiscount::Amount(amount) => round_half_up(amount, rounding),
            DocDiscount::Percent(percent) => {
                round_half_up(total_weight * percent / 100.0, rounding)
            }
        };
        if total_weight > 0.0 && target != 0.0 {
            let mut allocated_sum = 0.0;
            for (line, weight) in lines.iter_mut().zip(&weights) {
                let share = target * weight / total_weight;
                line.allocated_share = round_half_up(share, rounding);
                allocated_sum += line.allocated_share;
            }

            // Reconcile the rounding residual onto one line.
            let residual = round_half_up(target - allocated_sum, rounding);
            if residual != 0.0 {
                let index = match reconcile {
                    ReconcileStrategy::FirstLine => 0,
                    ReconcileStrategy::LargestLine => {
                        let mut best = 0;
                        for (i, input) in inputs.iter().enumerate().skip(1) {
                            // Strict `>` keeps the first line on ties.
                            if input.line_base > inputs[best].line_base {
                                best = i;
                            }
                        }
                        best
                    }
                };
                lines[index].allocated_share =
                    round_half_up(lines[index].allocated_share + residual, rounding);
            }
        }
    }

    // Final amounts and back-derived percentages.
    for (line, input) in lines.iter_mut().zip(inputs) {
        line.discount_amount =
            round_half_up(line.row_discount + line.allocated_share, rounding);
        line.discount_percent = match input.row_percent {
            Some(percent) if input.row_amount.is_none() => Some(percent),
            _ if line.discount_amount != 0.0 && input.line_base > 0.0 => {
                Some(round_half_up(
                    line.discount_amount / input.line_base * 100.0,
                    4,
                ))
            }
            _ => None,
        };
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bases(values: &[f64]) -> Vec<DiscountInput> {
        values
            .iter()
            .map(|&line_base| DiscountInput { line_base, ..DiscountInput::default() })
            .collect()
    }

    #[test]
    fn test_row_amount_beats_row_percent() {
        let inputs = vec![DiscountInput {
            line_base: 1000.0,
            row_percent: Some(10.0),
            row_amount: Some(50.0),
        }];
        let lines = allocate(&inputs, None, 2, ReconcileStrategy::LargestLine);
        assert_eq!(lines[0].discount_amount, 50.0);
    }

    #[test]
    fn test_row_percent_applies_to_base() {
        let inputs = vec![DiscountInput {
            line_base: 1000.0,
            row_percent: Some(10.0),
            row_amount: None,
        }];
        let lines = allocate(&inputs, None, 2, ReconcileStrategy::LargestLine);
        assert_eq!(lines[0].discount_amount, 100.0);
        assert_eq!(lines[0].discount_percent, Some(10.0));
    }

    #[test]
    fn test_doc_percent_prorates_and_conserves() {
        // 10% of 1000.01 = 100.00 after rounding; three unequal lines.
        let inputs = bases(&[333.34, 333.34, 333.33]);
        let lines = allocate(
            &inputs,
            Some(DocDiscount::Percent(10.0)),
            2,
            ReconcileStrategy::LargestLine,
        );
        let sum: f64 = lines.iter().map(|l| l.allocated_share).sum();
        assert!((sum - 100.0).abs() < 1e-9, "shares sum to {sum}");
    }

    #[test]
    fn test_row_discount_shrinks_doc_allocation() {
        // The row that already gave up 50 weighs 50 against the other
        // row's 100, so a 30 document discount splits 10/20, not 15/15.
        let inputs = vec![
            DiscountInput {
                line_base: 100.0,
                row_amount: Some(50.0),
                ..DiscountInput::default()
            },
            DiscountInput { line_base: 100.0, ..DiscountInput::default() },
        ];
        let lines = allocate(
            &inputs,
            Some(DocDiscount::Amount(30.0)),
            2,
            ReconcileStrategy::LargestLine,
        );
        assert_eq!(lines[0].allocated_share, 10.0);
        assert_eq!(lines[1].allocated_share, 20.0);
        assert_eq!(lines[0].discount_amount, 60.0);
        assert_eq!(lines[1].discount_amount, 20.0);
    }

    #[test]
    fn test_doc_percent_applies_to_residual_weight() {
        // 5% of the residual 900 + 1000, not of the raw 2000.
        let inputs = vec![
            DiscountInput {
                line_base: 1000.0,
                row_percent: Some(10.0),
                ..DiscountInput::default()
            },
            DiscountInput { line_base: 1000.0, ..DiscountInput::default() },
        ];
        let lines = allocate(
            &inputs,
            Some(DocDiscount::Percent(5.0)),
            2,
            ReconcileStrategy::LargestLine,
        );
        assert_eq!(lines[0].allocated_share, 45.0);
        assert_eq!(lines[1].allocated_share, 50.0);
        assert_eq!(lines[0].discount_amount, 145.0);
    }

    #[test]
    fn test_residual_goes_to_largest_line() {
        // 100 over three equal thirds rounds to 33.33 each; the residual
        // cent lands on the first (largest-tie) line.
        let inputs = bases(&[100.0, 100.0, 100.0]);
        let lines = allocate(
            &inputs,
            Some(DocDiscount::Amount(100.0)),
            2,
            ReconcileStrategy::LargestLine,
        );
        assert_eq!(lines[0].allocated_share, 33.34);
        assert_eq!(lines[1].allocated_share, 33.33);
        assert_eq!(lines[2].allocated_share, 33.33);
    }

    #[test]
    fn test_residual_first_line_strategy() {
        // Equal halves of 0.03 round up to 0.02 each; the -0.01
        // residual is taken from the first line.
        let inputs = bases(&[100.0, 100.0]);
        let lines = allocate(
            &inputs,
            Some(DocDiscount::Amount(0.03)),
            2,
            ReconcileStrategy::FirstLine,
        );
        assert_eq!(lines[0].allocated_share, 0.01);
        assert_eq!(lines[1].allocated_share, 0.02);
    }

    #[test]
    fn test_back_derived_percent() {
        let inputs = bases(&[200.0, 800.0]);
        let lines = allocate(
            &inputs,
            Some(DocDiscount::Amount(100.0)),
            2,
            ReconcileStrategy::LargestLine,
        );
        // 10% of each base.
        assert_eq!(lines[0].discount_percent, Some(10.0));
        assert_eq!(lines[1].discount_percent, Some(10.0));
    }

    #[test]
    fn test_no_discount_anywhere() {
        let lines = allocate(&bases(&[100.0]), None, 2, ReconcileStrategy::LargestLine);
        assert_eq!(lines[0].discount_amount, 0.0);
        assert_eq!(lines[0].discount_percent, None);
    }

    #[test]
    fn test_zero_base_lines_get_no_share() {
        let inputs = bases(&[0.0, 100.0]);
        let lines = allocate(
            &inputs,
            Some(DocDiscount::Amount(10.0)),
            2,
            ReconcileStrategy::LargestLine,
        );
        assert_eq!(lines[0].allocated_share, 0.0);
        assert_eq!(lines[1].allocated_share, 10.0);
    }
}
