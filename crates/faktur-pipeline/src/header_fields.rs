//! Header field extraction: invoice metadata from the top of the page.
//!
//! Each configured field rule finds its label (or matches its regex)
//! inside the first `search_row_limit` logical lines of the configured
//! pages. Label-style rules take their value from the text right of the
//! label on the same line, falling back to the line directly below with
//! the greatest horizontal overlap. Dates are normalized to ISO; the
//! currency falls back to keyword/symbol detection and finally to the
//! template default. Every extracted value keeps token backrefs, except
//! the configured default, which has no source tokens.

use crate::numeric::normalize_date;
use crate::textline::{cluster_page_lines, TextLine};
use faktur_core::{
    CompiledHeaderField, CompiledTemplate, HeaderFields, HeaderMatchKind, Token, TokenId,
};
use once_cell::sync::Lazy;
use regex::Regex;

static CURRENCY_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(IDR|USD|EUR|SGD|JPY|GBP)\b").unwrap());

/// Currency symbols and their ISO codes, tried after explicit codes.
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("Rp", "IDR"),
    ("US$", "USD"),
    ("S$", "SGD"),
    ("$", "USD"),
    ("€", "EUR"),
    ("£", "GBP"),
    ("¥", "JPY"),
];

/// One extracted value with its provenance.
#[derive(Debug, Clone)]
struct Extracted {
    value: String,
    token_ids: Vec<TokenId>,
}

/// Value right of a matched label span, else the line below.
fn value_near_label(
    lines: &[TextLine],
    line_idx: usize,
    match_end: usize,
    tokens: &[Token],
) -> Option<Extracted> {
    let line = &lines[line_idx];
    let rest = line.text[match_end..]
        .trim_start_matches([':', '.', ' '])
        .trim();
    if !rest.is_empty() {
        let start = line.text.len() - rest.len();
        return Some(Extracted {
            value: rest.to_string(),
            token_ids: line.tokens_in_span(start, line.text.len()),
        });
    }

    // Fall back to the closest line below with the greatest horizontal
    // overlap with the label span.
    let label_box = line.span_bbox(0, match_end, tokens)?;
    let mut best: Option<(f64, usize)> = None;
    for (i, candidate) in lines.iter().enumerate().skip(line_idx + 1) {
        if candidate.bbox.y0 <= line.bbox.y1 {
            continue;
        }
        let overlap = candidate
            .bbox
            .intersection_area(&faktur_core::BoundingBox::new(
                label_box.x0,
                candidate.bbox.y0,
                label_box.x1,
                candidate.bbox.y1,
            ));
        let better = match best {
            None => overlap > 0.0,
            Some((best_overlap, _)) => overlap > best_overlap,
        };
        if better {
            best = Some((overlap, i));
        }
        // Lines are in reading order; once past the next text row,
        // nothing closer will appear.
        if best.is_some() && candidate.bbox.y0 > line.bbox.y1 + 0.05 {
            break;
        }
    }
    let (_, below) = best?;
    Some(Extracted {
        value: lines[below].text.clone(),
        token_ids: lines[below].token_ids.clone(),
    })
}

fn find_literal(haystack: &str, needle: &str, case_sensitive: bool) -> Option<(usize, usize)> {
    if case_sensitive {
        haystack.find(needle).map(|start| (start, start + needle.len()))
    } else {
        haystack
            .to_lowercase()
            .find(&needle.to_lowercase())
            .map(|start| (start, start + needle.len()))
    }
}

fn extract_field(
    rule: &CompiledHeaderField,
    lines: &[TextLine],
    tokens: &[Token],
) -> Option<Extracted> {
    // An alias narrows the search to the alias label's line onward.
    let from = match &rule.alias {
        Some(label) => lines
            .iter()
            .position(|line| find_literal(&line.text, label, rule.case_sensitive).is_some())?,
        None => 0,
    };
    for (line_idx, line) in lines.iter().enumerate().skip(from) {
        match rule.match_kind {
            HeaderMatchKind::Regex => {
                let regex = rule.regex.as_ref()?;
                if let Some(caps) = regex.captures(&line.text) {
                    let m = caps.get(1).or_else(|| caps.get(0))?;
                    return Some(Extracted {
                        value: m.as_str().trim().to_string(),
                        token_ids: line.tokens_in_span(m.start(), m.end()),
                    });
                }
            }
            HeaderMatchKind::Contains => {
                if let Some((_, end)) =
                    find_literal(&line.text, &rule.literal, rule.case_sensitive)
                {
                    if let Some(extracted) = value_near_label(lines, line_idx, end, tokens) {
                        return Some(extracted);
                    }
                }
            }
            HeaderMatchKind::Equals => {
                let equal = if rule.case_sensitive {
                    line.text.trim() == rule.literal
                } else {
                    line.text.trim().eq_ignore_ascii_case(&rule.literal)
                };
                if equal {
                    if let Some(extracted) =
                        value_near_label(lines, line_idx, line.text.len(), tokens)
                    {
                        return Some(extracted);
                    }
                }
            }
        }
    }
    None
}

/// Scan lines for currency evidence: explicit codes first, symbols next.
fn detect_currency(lines: &[TextLine]) -> Option<Extracted> {
    for line in lines {
        if let Some(m) = CURRENCY_CODE_RE.find(&line.text) {
            return Some(Extracted {
                value: m.as_str().to_string(),
                token_ids: line.tokens_in_span(m.start(), m.end()),
            });
        }
    }
    for line in lines {
        for (symbol, code) in CURRENCY_SYMBOLS {
            if let Some(start) = line.text.find(symbol) {
                return Some(Extracted {
                    value: (*code).to_string(),
                    token_ids: line.tokens_in_span(start, start + symbol.len()),
                });
            }
        }
    }
    None
}

/// Extract the configured header fields.
#[must_use = "returns the extracted header fields"]
pub fn extract_header(template: &CompiledTemplate, tokens: &[Token]) -> HeaderFields {
    let mut header = HeaderFields::default();

    let mut lines: Vec<TextLine> = Vec::new();
    for &page in &template.header.pages {
        let mut page_lines = cluster_page_lines(tokens, page);
        page_lines.truncate(template.header.search_row_limit);
        lines.extend(page_lines);
    }

    for rule in &template.header.fields {
        let Some(extracted) = extract_field(rule, &lines, tokens) else {
            log::debug!("header field '{}' not found", rule.name);
            continue;
        };
        let value = match rule.name.as_str() {
            "invoice_date" => {
                normalize_date(&extracted.value).unwrap_or_else(|| extracted.value.clone())
            }
            _ => extracted.value.clone(),
        };
        match rule.name.as_str() {
            "invoice_number" => header.invoice_number = Some(value),
            "invoice_date" => header.invoice_date = Some(value),
            "buyer_name" => header.buyer_name = Some(value),
            "seller_name" => header.seller_name = Some(value),
            "currency" => header.currency = Some(value),
            other => {
                log::warn!("ignoring unknown header field '{other}'");
                continue;
            }
        }
        header.backrefs.insert(rule.name.clone(), extracted.token_ids);
    }

    // Currency: detection sweep, then the template default.
    if header.currency.is_none() {
        if let Some(found) = detect_currency(&lines) {
            header.currency = Some(found.value);
            header.backrefs.insert("currency".to_string(), found.token_ids);
        } else {
            header.currency = Some(template.defaults.currency.clone());
        }
    }

    header
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktur_core::{BoundingBox, TemplateConfig};

    fn token(id: u32, x: f64, y: f64, text: &str) -> Token {
        Token {
            id: TokenId(id),
            page: 0,
            text: text.to_string(),
            bbox: BoundingBox::new(x, y, x + 0.08, y + 0.02),
        }
    }

    fn template(fields: &str) -> CompiledTemplate {
        TemplateConfig::from_json(&format!(
            r#"{{"fields": {{}}, "header": {{"fields": {fields}}}}}"#
        ))
        .unwrap()
        .compile()
        .unwrap()
    }

    #[test]
    fn test_regex_field_with_capture() {
        let template = template(
            r#"{"invoice_number": {"match": "regex", "pattern": "invoice\\s*no\\.?\\s*:?\\s*(\\S+)"}}"#,
        );
        let tokens = vec![
            token(0, 0.1, 0.05, "Invoice"),
            token(1, 0.2, 0.05, "No:"),
            token(2, 0.3, 0.05, "INV-2026-001"),
        ];
        let header = extract_header(&template, &tokens);
        assert_eq!(header.invoice_number.as_deref(), Some("INV-2026-001"));
        assert_eq!(header.backrefs["invoice_number"], vec![TokenId(2)]);
    }

    #[test]
    fn test_contains_label_value_right_of() {
        let template = template(
            r#"{"invoice_date": {"match": "contains", "pattern": "Date"}}"#,
        );
        let tokens = vec![
            token(0, 0.1, 0.05, "Date:"),
            token(1, 0.2, 0.05, "16/02/2026"),
        ];
        let header = extract_header(&template, &tokens);
        assert_eq!(header.invoice_date.as_deref(), Some("2026-02-16"));
    }

    #[test]
    fn test_contains_label_value_below() {
        let template = template(
            r#"{"buyer_name": {"match": "contains", "pattern": "Bill To"}}"#,
        );
        let tokens = vec![
            token(0, 0.1, 0.05, "Bill"),
            token(1, 0.18, 0.05, "To"),
            token(2, 0.1, 0.09, "PT"),
            token(3, 0.18, 0.09, "Maju"),
            token(4, 0.26, 0.09, "Jaya"),
        ];
        let header = extract_header(&template, &tokens);
        assert_eq!(header.buyer_name.as_deref(), Some("PT Maju Jaya"));
    }

    #[test]
    fn test_alias_narrows_the_search() {
        // Two "Date:" labels; the alias pins the one under "Shipment".
        let template = template(
            r#"{"invoice_date": {"match": "contains", "pattern": "Date", "alias": "Shipment"}}"#,
        );
        let tokens = vec![
            token(0, 0.1, 0.05, "Date:"),
            token(1, 0.2, 0.05, "01/01/2026"),
            token(2, 0.1, 0.10, "Shipment"),
            token(3, 0.1, 0.14, "Date:"),
            token(4, 0.2, 0.14, "16/02/2026"),
        ];
        let header = extract_header(&template, &tokens);
        assert_eq!(header.invoice_date.as_deref(), Some("2026-02-16"));
    }

    #[test]
    fn test_currency_detected_from_symbol() {
        let template = template(r#"{}"#);
        let tokens = vec![token(0, 0.5, 0.1, "Rp"), token(1, 0.58, 0.1, "218.785,41")];
        let header = extract_header(&template, &tokens);
        assert_eq!(header.currency.as_deref(), Some("IDR"));
        assert!(!header.backrefs["currency"].is_empty());
    }

    #[test]
    fn test_currency_defaults_without_evidence() {
        let template = template(r#"{}"#);
        let tokens = vec![token(0, 0.1, 0.1, "hello")];
        let header = extract_header(&template, &tokens);
        assert_eq!(header.currency.as_deref(), Some("IDR"));
        assert!(!header.backrefs.contains_key("currency"));
    }
}
