//! Configured parser chains applied to normalized cell text.

use crate::numeric::{parse_decimal, parse_integer, parse_percent};
use faktur_core::ParserKind;
use once_cell::sync::Lazy;
use regex::Regex;

/// Result of running a parser chain over one cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedCell {
    /// Text after textual parsers (code cleanup, control stripping).
    pub text: String,
    /// Numeric value, when a numeric parser succeeded.
    pub number: Option<f64>,
    /// Unit captured by the `qty_unit` parser, if any.
    pub unit: Option<String>,
}

/// `30 PCS`, `12.5 KG`, also `PCS 30`.
static QTY_UNIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:(?P<n1>[\d.,]+)\s*(?P<u1>[A-Za-z]{1,6})|(?P<u2>[A-Za-z]{1,6})\s*(?P<n2>[\d.,]+))$")
        .unwrap()
});

/// Apply a parser chain to a cell's normalized text.
///
/// Parsers run in the configured order; the first numeric parser to
/// succeed wins `number`, textual parsers rewrite `text`. A chain that
/// matches nothing leaves the cell as plain text with no number.
#[must_use = "returns the parsed cell"]
pub fn apply_parsers(parsers: &[ParserKind], text: &str) -> ParsedCell {
    let mut out = ParsedCell { text: text.trim().to_string(), number: None, unit: None };

    for parser in parsers {
        match parser {
            ParserKind::Integer => {
                if out.number.is_none() {
                    out.number = parse_integer(&out.text).map(|v| v as f64);
                }
            }
            ParserKind::Decimal => {
                if out.number.is_none() {
                    out.number = parse_decimal(&out.text);
                }
            }
            ParserKind::Percent => {
                if out.number.is_none() {
                    out.number = parse_percent(&out.text);
                }
            }
            ParserKind::QtyUnit => {
                if out.number.is_none() {
                    if let Some(caps) = QTY_UNIT_RE.captures(&out.text) {
                        let number = caps
                            .name("n1")
                            .or_else(|| caps.name("n2"))
                            .and_then(|m| parse_decimal(m.as_str()));
                        let unit = caps
                            .name("u1")
                            .or_else(|| caps.name("u2"))
                            .map(|m| m.as_str().to_uppercase());
                        if let Some(n) = number {
                            out.number = Some(n);
                            out.unit = unit;
                        }
                    } else {
                        // Bare number with no unit still counts.
                        out.number = parse_decimal(&out.text);
                    }
                }
            }
            ParserKind::Code => {
                out.text = out
                    .text
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
                    .to_uppercase();
            }
            ParserKind::StripControl => {
                out.text.retain(|c| !c.is_control());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qty_unit_both_orders() {
        let parsed = apply_parsers(&[ParserKind::QtyUnit], "30 PCS");
        assert_eq!(parsed.number, Some(30.0));
        assert_eq!(parsed.unit.as_deref(), Some("PCS"));

        let parsed = apply_parsers(&[ParserKind::QtyUnit], "KG 12,5");
        assert_eq!(parsed.number, Some(12.5));
        assert_eq!(parsed.unit.as_deref(), Some("KG"));
    }

    #[test]
    fn test_qty_unit_bare_number() {
        let parsed = apply_parsers(&[ParserKind::QtyUnit], "30");
        assert_eq!(parsed.number, Some(30.0));
        assert_eq!(parsed.unit, None);
    }

    #[test]
    fn test_decimal_chain() {
        let parsed = apply_parsers(&[ParserKind::Decimal], "218785.41");
        assert_eq!(parsed.number, Some(218_785.41));
    }

    #[test]
    fn test_code_uppercases() {
        let parsed = apply_parsers(&[ParserKind::Code], "  abc  123 ");
        assert_eq!(parsed.text, "ABC 123");
    }

    #[test]
    fn test_unparseable_stays_text() {
        let parsed = apply_parsers(&[ParserKind::Decimal], "N/A");
        assert_eq!(parsed.number, None);
        assert_eq!(parsed.text, "N/A");
    }
}
