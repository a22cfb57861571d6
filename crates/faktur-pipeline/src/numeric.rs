//! Locale-aware numeric and date parsing, plus monetary rounding.
//!
//! These helpers are the single implementation used by the cell
//! normalizer, the field parsers, and the validator, so a value parses
//! the same way everywhere. Supported numeric shapes: `1,234,567.89`,
//! `1.234.567,89`, `Rp 218.785,41`, `(1.234)` (parenthesized negative),
//! `-1234`, `10%`.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Currency symbols and codes stripped before numeric parsing.
static CURRENCY_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:rp\.?|idr|usd|eur|sgd|jpy|gbp|us\$|s\$|[$€£¥])\s*").unwrap()
});

static NUMERIC_SHAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(?-?\d[\d.,\s]*\)?%?$").unwrap());

/// Whether a string looks like a numeric value (after symbol stripping).
#[must_use = "returns whether the text looks numeric"]
pub fn looks_numeric(text: &str) -> bool {
    let stripped = CURRENCY_PREFIX_RE.replace(text.trim(), "");
    !stripped.is_empty() && NUMERIC_SHAPE_RE.is_match(stripped.trim())
}

/// Parse a decimal/monetary value.
///
/// Separator disambiguation: when both `.` and `,` are present, the
/// rightmost one is the decimal separator. A lone separator followed by
/// exactly two digits at the end is treated as decimal; otherwise it is
/// a thousands separator (so `218.785` reads as 218785, matching how
/// Indonesian invoices print integers).
#[must_use = "returns the parsed value, if numeric"]
pub fn parse_decimal(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let stripped = CURRENCY_PREFIX_RE.replace(trimmed, "");
    let mut s = stripped.trim().to_string();

    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') {
        negative = true;
        s = s[1..s.len() - 1].trim().to_string();
    }
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.trim().to_string();
    }
    s.retain(|c| c != ' ');
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || c == '.' || c == ',') {
        return None;
    }

    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');
    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(d), None) => single_separator_role(&s, d, '.'),
        (None, Some(c)) => single_separator_role(&s, c, ','),
        (None, None) => None,
    };

    let mut canonical = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '.' | ',' => {
                if Some(c) == decimal_sep {
                    canonical.push('.');
                }
            }
            other => canonical.push(other),
        }
    }
    // A thousands-separated decimal can still carry several separators;
    // only the final decimal point survives above, so reject leftovers.
    if canonical.matches('.').count() > 1 {
        return None;
    }
    let value: f64 = canonical.parse().ok()?;
    Some(if negative { -value } else { value })
}

/// Decide whether a lone separator at `pos` is the decimal point.
fn single_separator_role(s: &str, pos: usize, sep: char) -> Option<char> {
    let digits_after = s.len() - pos - 1;
    // Multiple occurrences of the same separator are grouping.
    if s.matches(sep).count() > 1 {
        return None;
    }
    // "218.785" is grouping, "218.78" / "218.7" is decimal.
    if digits_after == 3 {
        None
    } else {
        Some(sep)
    }
}

/// Parse an integer, tolerating grouping separators.
#[must_use = "returns the parsed integer, if numeric"]
pub fn parse_integer(text: &str) -> Option<i64> {
    let value = parse_decimal(text)?;
    if value.fract().abs() < 1e-9 {
        Some(value as i64)
    } else {
        None
    }
}

/// Parse a percentage: `10%`, `10 %`, `10,5%`, or a bare number.
#[must_use = "returns the parsed percent, if numeric"]
pub fn parse_percent(text: &str) -> Option<f64> {
    let trimmed = text.trim().trim_end_matches('%').trim();
    parse_decimal(trimmed)
}

/// Date formats tried in order; first hit wins.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Normalize a date string to ISO `YYYY-MM-DD`.
#[must_use = "returns the normalized date, if parseable"]
pub fn normalize_date(text: &str) -> Option<String> {
    let trimmed = text.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Round half-up (away from zero) at `decimals` places.
///
/// This is the only rounding primitive in the pipeline; it runs exactly
/// twice per monetary value — once during discount allocation, once at
/// final export.
#[must_use = "returns the rounded value"]
pub fn round_half_up(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = value * factor;
    // Nudge past representation error so x.5 inputs round away from zero.
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5 + 1e-9).floor()
    } else {
        (scaled - 0.5 - 1e-9).ceil()
    };
    rounded / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1,234,567.89", 1_234_567.89)]
    #[case("1.234.567,89", 1_234_567.89)]
    #[case("Rp 218.785,41", 218_785.41)]
    #[case("Rp218.785,41", 218_785.41)]
    #[case("218.785", 218_785.0)]
    #[case("218.78", 218.78)]
    #[case("218,7", 218.7)]
    #[case("(1.234)", -1234.0)]
    #[case("-42", -42.0)]
    #[case("US$ 12.50", 12.5)]
    fn test_parse_decimal(#[case] input: &str, #[case] expected: f64) {
        let parsed = parse_decimal(input).unwrap();
        assert!(
            (parsed - expected).abs() < 1e-9,
            "{input}: got {parsed}, want {expected}"
        );
    }

    #[rstest]
    #[case("")]
    #[case("N/A")]
    #[case("12AB")]
    #[case("1.2.3.4,5,6")]
    fn test_parse_decimal_rejects(#[case] input: &str) {
        assert_eq!(parse_decimal(input), None);
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer("1.234"), Some(1234));
        assert_eq!(parse_integer("12,5"), None);
    }

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("10%"), Some(10.0));
        assert_eq!(parse_percent("2,5 %"), Some(2.5));
    }

    #[rstest]
    #[case("2026-02-16", "2026-02-16")]
    #[case("16/02/2026", "2026-02-16")]
    #[case("16 February 2026", "2026-02-16")]
    #[case("February 16, 2026", "2026-02-16")]
    fn test_normalize_date(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_date(input).as_deref(), Some(expected));
    }

    #[test]
    fn test_normalize_date_rejects_garbage() {
        assert_eq!(normalize_date("not a date"), None);
    }

    #[rstest]
    #[case(2.5, 0, 3.0)]
    #[case(2.4, 0, 2.0)]
    #[case(-2.5, 0, -3.0)]
    #[case(1.005, 2, 1.01)]
    #[case(218_785.414, 2, 218_785.41)]
    fn test_round_half_up(#[case] value: f64, #[case] decimals: u32, #[case] expected: f64) {
        assert!((round_half_up(value, decimals) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_looks_numeric() {
        assert!(looks_numeric("Rp 218.785,41"));
        assert!(looks_numeric("(1,234.00)"));
        assert!(looks_numeric("10%"));
        assert!(!looks_numeric("QTY"));
        assert!(!looks_numeric("PCS 30"));
    }
}
