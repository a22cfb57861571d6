//! Unit-of-measure resolution along the configured precedence chain.

use crate::textline::TextLine;
use faktur_core::{CompiledTemplate, TokenId, UomSource};

/// Unit evidence available for one row.
#[derive(Debug, Clone, Default)]
pub struct UomEvidence {
    /// Unit stated on the row itself (from the qty cell or a unit
    /// column), with its provenance tokens.
    pub row_unit: Option<(String, Vec<TokenId>)>,
    /// Header-row cell texts with their tokens, for suffix patterns
    /// like `QTY (PCS)`.
    pub header_cells: Vec<(String, Vec<TokenId>)>,
}

/// Resolve one row's unit of measure.
///
/// Sources are tried strictly in the template's precedence order; the
/// first one that produces a unit wins, regardless of what later sources
/// would say. Header-suffix and document patterns must capture the unit
/// in their `unit` group (enforced at compile time). Returns the unit
/// and its provenance tokens; the static default has no provenance.
#[must_use = "returns the resolved unit and its provenance"]
pub fn resolve_uom(
    template: &CompiledTemplate,
    evidence: &UomEvidence,
    doc_lines: &[TextLine],
) -> (Option<String>, Vec<TokenId>) {
    for source in &template.uom.precedence {
        match source {
            UomSource::Row => {
                if let Some((unit, ids)) = &evidence.row_unit {
                    return (Some(unit.clone()), ids.clone());
                }
            }
            UomSource::HeaderSuffix => {
                for (text, ids) in &evidence.header_cells {
                    for pattern in &template.uom.header_suffix_patterns {
                        if let Some(caps) = pattern.captures(text) {
                            if let Some(unit) = caps.name("unit") {
                                return (Some(unit.as_str().to_uppercase()), ids.clone());
                            }
                        }
                    }
                }
            }
            UomSource::DocPattern => {
                for line in doc_lines {
                    for pattern in &template.uom.doc_patterns {
                        if let Some(caps) = pattern.captures(&line.text) {
                            if let Some(unit) = caps.name("unit") {
                                let ids = line.tokens_in_span(unit.start(), unit.end());
                                return (Some(unit.as_str().to_uppercase()), ids);
                            }
                        }
                    }
                }
            }
            UomSource::Default => {
                if let Some(unit) = &template.uom.default {
                    return (Some(unit.clone()), Vec::new());
                }
            }
        }
    }
    (None, Vec::new())
}
