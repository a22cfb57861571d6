//! Arithmetic validation: row checks, printed totals, derived totals.
//!
//! Row checks compare `qty × unit_price` against the printed amount
//! under the configured tolerance; a missing quantity is back-derived
//! from `amount ÷ unit_price` when the division is exact. Printed totals
//! are scanned from the footer lines by label; computed totals come from
//! the derived-totals formula. Each configured total resolves through
//! its fallback chain, and discrepancies degrade the document via
//! issues — validation never aborts a run.

use crate::numeric::{parse_decimal, round_half_up};
use crate::textline::TextLine;
use faktur_core::{
    CompiledTemplate, Issue, IssueCode, LineItem, RowCheck, Tolerance, Totals, TotalsSource,
    ValidationResult,
};
use once_cell::sync::Lazy;
use regex::Regex;

static SUBTOTAL_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsub\s*total\b").unwrap());
static TAX_BASE_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(dpp|tax\s*base)\b").unwrap());
static GRAND_TOTAL_LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(grand\s*total|total\s*due|amount\s*due)\b").unwrap());

/// Validation output plus the quantities derived along the way, which
/// the caller writes back onto the items.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    /// The validation result proper.
    pub result: ValidationResult,
    /// `(item index, derived qty)` pairs.
    pub derived_qty: Vec<(usize, f64)>,
}

fn allowance(tolerance: Tolerance, computed: f64) -> f64 {
    (tolerance.rel * computed.abs()).max(tolerance.abs)
}

/// Last numeric value on a footer line, scanning right to left.
fn last_numeric(line: &TextLine) -> Option<f64> {
    line.token_ids
        .iter()
        .rev()
        .zip(line.char_spans.iter().rev())
        .find_map(|(_, &(start, end))| parse_decimal(&line.text[start..end]))
}

/// Totals as printed in the footer band.
#[derive(Debug, Clone, Copy, Default)]
struct PrintedTotals {
    subtotal: Option<f64>,
    tax_base: Option<f64>,
    tax_amount: Option<f64>,
    grand_total: Option<f64>,
}

fn scan_printed(template: &CompiledTemplate, footer_lines: &[TextLine]) -> PrintedTotals {
    let tax_label = template.defaults.tax_label.to_lowercase();

    let mut printed = PrintedTotals::default();
    for line in footer_lines {
        let Some(value) = last_numeric(line) else {
            continue;
        };
        if printed.subtotal.is_none() && SUBTOTAL_LABEL_RE.is_match(&line.text) {
            printed.subtotal = Some(value);
        } else if printed.tax_base.is_none() && TAX_BASE_LABEL_RE.is_match(&line.text) {
            printed.tax_base = Some(value);
        } else if printed.grand_total.is_none() && GRAND_TOTAL_LABEL_RE.is_match(&line.text) {
            printed.grand_total = Some(value);
        } else if printed.tax_amount.is_none() && line.text.to_lowercase().contains(&tax_label) {
            printed.tax_amount = Some(value);
        }
    }
    printed
}

impl PrintedTotals {
    fn get(&self, name: &str) -> Option<f64> {
        match name {
            "subtotal" => self.subtotal,
            "tax_base" => self.tax_base,
            "tax_amount" => self.tax_amount,
            "grand_total" => self.grand_total,
            _ => None,
        }
    }
}

/// Validate the extracted items against the printed totals.
#[must_use = "returns the validation outcome"]
pub fn validate(
    template: &CompiledTemplate,
    items: &[LineItem],
    footer_lines: &[TextLine],
) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    let row_tolerance = template.tolerances.amount_from_qty_price;

    // Row arithmetic, deriving missing quantities where exact.
    for (index, item) in items.iter().enumerate() {
        let qty = item.qty.or_else(|| {
            let (price, amount) = (item.unit_price?, item.amount?);
            if price == 0.0 {
                return None;
            }
            let derived = round_half_up(amount / price, 6);
            if (derived * price - amount).abs() < 1e-6 {
                outcome.derived_qty.push((index, derived));
                outcome.result.issues.push(Issue::row(
                    IssueCode::DerivedQty,
                    index,
                    format!("qty derived as {derived} from amount / unit_price"),
                ));
                Some(derived)
            } else {
                None
            }
        });

        let computed = qty.zip(item.unit_price).map(|(q, p)| q * p);
        let (Some(computed), Some(printed)) = (computed, item.amount) else {
            continue;
        };
        let tolerance = allowance(row_tolerance, computed);
        let deviation = (computed - printed).abs();
        let passed = deviation <= tolerance;
        let severe = deviation > 3.0 * tolerance;
        if severe {
            outcome.result.issues.push(Issue::row(
                IssueCode::SevereMismatch,
                index,
                format!("qty x unit_price = {computed} but amount is {printed}"),
            ));
        }
        outcome.result.row_checks.push(RowCheck {
            row: index,
            computed: Some(computed),
            printed: Some(printed),
            tolerance,
            passed,
            severe,
        });
    }

    // Printed and computed totals.
    let printed = scan_printed(template, footer_lines);
    let factor = template.defaults.tax_base_factor;
    let net: f64 = items
        .iter()
        .map(|i| i.amount.unwrap_or(0.0) - i.discount_amount.unwrap_or(0.0))
        .sum();
    let computed_subtotal = if items.iter().any(|i| i.amount.is_some()) {
        Some(net)
    } else {
        None
    };
    let computed_tax_base = computed_subtotal.map(|s| s * factor.num / factor.den);
    let computed_tax_amount =
        computed_tax_base.map(|b| b * template.defaults.tax_rate_percent / 100.0);
    let computed_grand = computed_subtotal
        .zip(computed_tax_amount)
        .map(|(s, t)| s + t);
    let computed_of = |name: &str| -> Option<f64> {
        match name {
            "subtotal" => computed_subtotal,
            "tax_base" => computed_tax_base,
            "tax_amount" => computed_tax_amount,
            "grand_total" => computed_grand,
            _ => None,
        }
    };

    // Resolve each total through its fallback chain; unconfigured totals
    // use printed-then-computed.
    let default_chain = |name: &str| {
        vec![
            TotalsSource::Printed(name.to_string()),
            TotalsSource::Computed(name.to_string()),
        ]
    };
    let names = ["grand_total", "subtotal", "tax_amount", "tax_base"];
    let mut totals = Totals::default();
    for name in names {
        let chain = template
            .totals
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, sources)| sources.clone())
            .unwrap_or_else(|| default_chain(name));
        let mut resolved = None;
        for source in &chain {
            resolved = match source {
                TotalsSource::Printed(path) => printed.get(path),
                TotalsSource::Computed(path) => computed_of(path),
            };
            if resolved.is_some() {
                break;
            }
        }
        if resolved.is_none() {
            outcome.result.issues.push(Issue::field(
                IssueCode::TotalsMissing,
                name,
                format!("no source in the fallback chain produced '{name}'"),
            ));
        }
        match name {
            "subtotal" => totals.subtotal = resolved,
            "tax_base" => totals.tax_base = resolved,
            "tax_amount" => totals.tax_amount = resolved,
            "grand_total" => totals.grand_total = resolved,
            _ => {}
        }
    }

    // Cross-check printed against computed where both exist.
    let subtotal_tolerance = template.tolerances.subtotal;
    for (name, printed_value, computed_value) in [
        ("subtotal", printed.subtotal, computed_subtotal),
        ("grand_total", printed.grand_total, computed_grand),
    ] {
        let (Some(p), Some(c)) = (printed_value, computed_value) else {
            continue;
        };
        let tolerance = allowance(subtotal_tolerance, c);
        let deviation = (p - c).abs();
        if deviation > 3.0 * tolerance {
            outcome.result.issues.push(Issue::field(
                IssueCode::SevereMismatch,
                name,
                format!("printed {name} {p} differs from computed {c}"),
            ));
        } else if deviation > tolerance {
            log::debug!("{name}: printed {p} vs computed {c} outside tolerance {tolerance}");
        }
    }

    outcome.result.totals = totals;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::textline::cluster_lines;
    use faktur_core::{BoundingBox, TemplateConfig, Token, TokenId};
    use rstest::rstest;

    fn template() -> CompiledTemplate {
        TemplateConfig::from_json(r#"{"fields": {}, "header": {"fields": {}}}"#)
            .unwrap()
            .compile()
            .unwrap()
    }

    fn item(qty: Option<f64>, unit_price: Option<f64>, amount: Option<f64>) -> LineItem {
        LineItem { no: 1, qty, unit_price, amount, ..LineItem::default() }
    }

    fn footer_lines(rows: &[&[&str]]) -> (Vec<Token>, Vec<TextLine>) {
        let mut tokens = Vec::new();
        let mut id = 0u32;
        for (r, row) in rows.iter().enumerate() {
            for (c, text) in row.iter().enumerate() {
                tokens.push(Token {
                    id: TokenId(id),
                    page: 0,
                    text: (*text).to_string(),
                    bbox: BoundingBox::new(
                        0.1 + 0.2 * c as f64,
                        0.85 + 0.04 * r as f64,
                        0.25 + 0.2 * c as f64,
                        0.87 + 0.04 * r as f64,
                    ),
                });
                id += 1;
            }
        }
        let ids: Vec<TokenId> = tokens.iter().map(|t| t.id).collect();
        let lines = cluster_lines(&tokens, &ids);
        (tokens, lines)
    }

    #[rstest]
    // 10 × 1000 = 10000; tolerance = max(0.5% × 10000, 1) = 50.
    #[case(10_049.0, true, false)]
    #[case(10_050.0, true, false)]
    #[case(10_051.0, false, false)]
    // 3× tolerance = 150; beyond that the mismatch is severe.
    #[case(10_151.0, false, true)]
    fn test_row_tolerance_boundary(
        #[case] printed: f64,
        #[case] passed: bool,
        #[case] severe: bool,
    ) {
        let items = vec![item(Some(10.0), Some(1000.0), Some(printed))];
        let outcome = validate(&template(), &items, &[]);
        let check = &outcome.result.row_checks[0];
        assert_eq!(check.passed, passed, "printed {printed}");
        assert_eq!(check.severe, severe, "printed {printed}");
    }

    #[test]
    fn test_qty_derived_when_division_exact() {
        let items = vec![item(None, Some(250.0), Some(1000.0))];
        let outcome = validate(&template(), &items, &[]);
        assert_eq!(outcome.derived_qty, vec![(0, 4.0)]);
        assert!(outcome
            .result
            .issues
            .iter()
            .any(|i| i.code == IssueCode::DerivedQty));
        assert!(outcome.result.row_checks[0].passed);
    }

    #[test]
    fn test_printed_totals_win_over_computed() {
        let items = vec![item(Some(2.0), Some(500.0), Some(1000.0))];
        let (_, lines) = footer_lines(&[
            &["SUBTOTAL", "1.000,00"],
            &["PPN", "110,00"],
            &["GRAND TOTAL", "1.110,00"],
        ]);
        let outcome = validate(&template(), &items, &lines);
        let totals = &outcome.result.totals;
        assert_eq!(totals.subtotal, Some(1000.0));
        assert_eq!(totals.tax_amount, Some(110.0));
        assert_eq!(totals.grand_total, Some(1110.0));
    }

    #[test]
    fn test_derived_totals_fill_missing_printed() {
        let items = vec![item(Some(2.0), Some(500.0), Some(1000.0))];
        let outcome = validate(&template(), &items, &[]);
        let totals = &outcome.result.totals;
        assert_eq!(totals.subtotal, Some(1000.0));
        // tax_base = 1000 × 11/12, tax = 12% of that, grand = subtotal + tax.
        let tax_base = totals.tax_base.unwrap();
        assert!((tax_base - 1000.0 * 11.0 / 12.0).abs() < 1e-9);
        let tax = totals.tax_amount.unwrap();
        assert!((tax - tax_base * 0.12).abs() < 1e-9);
        assert!((totals.grand_total.unwrap() - (1000.0 + tax)).abs() < 1e-9);
    }

    #[test]
    fn test_totals_missing_issue_when_nothing_resolves() {
        let items = vec![item(Some(2.0), Some(500.0), None)];
        let outcome = validate(&template(), &items, &[]);
        assert!(outcome
            .result
            .issues
            .iter()
            .any(|i| i.code == IssueCode::TotalsMissing));
    }

    #[test]
    fn test_severe_subtotal_mismatch_flagged() {
        let items = vec![item(Some(1.0), Some(1000.0), Some(1000.0))];
        let (_, lines) = footer_lines(&[&["SUBTOTAL", "5.000,00"]]);
        let outcome = validate(&template(), &items, &lines);
        assert!(outcome
            .result
            .issues
            .iter()
            .any(|i| i.code == IssueCode::SevereMismatch
                && i.field.as_deref() == Some("subtotal")));
    }
}
