//! Anchor detector: column-header keyword evidence inside content bands.
//!
//! A fixed set of keyword classes (item number, code, description,
//! quantity, unit price, amount) is fuzzy-matched against logical lines
//! in the content band, tolerating spacing and line-break variation. A
//! line matching at least two distinct classes becomes a table-header
//! hypothesis, which is turned into a [`CandidateRegion`] spanning from
//! that line down to the end of the content band.

use crate::segmenter::PageBands;
use crate::textline::{cluster_lines, TextLine};
use faktur_core::{BoundingBox, Token, TokenId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Recognized column-header keyword classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorClass {
    /// Item / serial number column.
    ItemNumber,
    /// Product / HS code column.
    Code,
    /// Description column.
    Description,
    /// Quantity column.
    Quantity,
    /// Unit price column.
    UnitPrice,
    /// Line amount column.
    Amount,
}

/// All classes, in scoring order.
pub const ANCHOR_CLASSES: [AnchorClass; 6] = [
    AnchorClass::ItemNumber,
    AnchorClass::Code,
    AnchorClass::Description,
    AnchorClass::Quantity,
    AnchorClass::UnitPrice,
    AnchorClass::Amount,
];

static ITEM_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(no\.?|item\s*no\.?|sr\.?\s*no\.?|#)$").unwrap());
static CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(hs\s*code|code|sku|part\s*no\.?|kode(\s*barang)?)\b").unwrap()
});
static DESCRIPTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(description(\s*of\s*goods)?|desc\.?|nama\s*barang|item\s*description|particulars)\b")
        .unwrap()
});
static QUANTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(qty\.?|quantity|jumlah|kuantitas)\b").unwrap());
static UNIT_PRICE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(unit\s*price|price|rate|harga\s*satuan|price/unit)\b").unwrap()
});
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(amount|total(\s*price)?|jumlah\s*harga|line\s*total|value)\b").unwrap()
});

impl AnchorClass {
    /// Keyword pattern for the class.
    #[must_use = "returns the class keyword pattern"]
    pub fn pattern(self) -> &'static Regex {
        match self {
            Self::ItemNumber => &ITEM_NUMBER_RE,
            Self::Code => &CODE_RE,
            Self::Description => &DESCRIPTION_RE,
            Self::Quantity => &QUANTITY_RE,
            Self::UnitPrice => &UNIT_PRICE_RE,
            Self::Amount => &AMOUNT_RE,
        }
    }
}

/// Token evidence for one recognized keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// Keyword class.
    pub keyword_class: AnchorClass,
    /// Matched tokens.
    pub token_ids: Vec<TokenId>,
    /// Union box of the matched tokens.
    pub bbox: BoundingBox,
}

/// Scoring components of a candidate region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RegionScore {
    /// Fraction of anchor classes found in the header line.
    pub header_coverage: f64,
    /// Fraction of numeric-looking tokens in numeric columns.
    pub numeric_purity: f64,
    /// How well token centers track column midlines.
    pub alignment_quality: f64,
    /// Fraction of empty cells.
    pub empty_cell_rate: f64,
    /// Overlap of the region with the footer band.
    pub footer_penalty: f64,
}

impl RegionScore {
    /// Weighted total per the fixed scoring formula.
    #[must_use = "returns the weighted region score"]
    pub fn total(&self) -> f64 {
        0.35 * self.header_coverage + 0.35 * self.numeric_purity
            + 0.15 * self.alignment_quality
            + 0.10 * (1.0 - self.empty_cell_rate)
            - 0.05 * self.footer_penalty
    }
}

/// A scored bounding box hypothesized to contain the item table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRegion {
    /// Page of the region.
    pub page: u32,
    /// Region box.
    pub bbox: BoundingBox,
    /// Weighted score (preliminary at this stage; finalized by the
    /// geometry resolver).
    pub score: f64,
    /// Score components.
    pub components: RegionScore,
    /// Anchors found in the header line, in class order.
    pub anchors: Vec<Anchor>,
}

impl CandidateRegion {
    /// Anchor for a given class, if matched.
    #[must_use = "returns the anchor for the class, if present"]
    pub fn anchor(&self, class: AnchorClass) -> Option<&Anchor> {
        self.anchors.iter().find(|a| a.keyword_class == class)
    }
}

/// Match anchors on one logical line, tolerating split keywords.
///
/// Each class pattern is tried against every single token and every pair
/// of horizontally adjacent tokens (covering headers broken as
/// `UNIT` + `PRICE`), and against the whole line for `equals`-style
/// patterns like the bare `No.` column.
fn match_line_anchors(line: &TextLine, tokens: &[Token]) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    for class in ANCHOR_CLASSES {
        let pattern = class.pattern();
        let mut hit: Option<Vec<TokenId>> = None;

        for (i, &id) in line.token_ids.iter().enumerate() {
            let text = tokens[id.index()].text.trim();
            if pattern.is_match(text) {
                hit = Some(vec![id]);
                break;
            }
            if let Some(&next) = line.token_ids.get(i + 1) {
                let pair = format!("{} {}", text, tokens[next.index()].text.trim());
                if pattern.is_match(&pair) {
                    hit = Some(vec![id, next]);
                    break;
                }
            }
        }

        if let Some(token_ids) = hit {
            let mut bbox = tokens[token_ids[0].index()].bbox;
            for id in &token_ids[1..] {
                bbox = bbox.union(&tokens[id.index()].bbox);
            }
            anchors.push(Anchor { keyword_class: class, token_ids, bbox });
        }
    }
    anchors
}

/// Minimum distinct classes for a line to count as a table header.
const MIN_HEADER_CLASSES: usize = 2;

/// Detect candidate table regions inside the content bands.
#[must_use = "returns the candidate regions"]
pub fn detect_regions(tokens: &[Token], pages: &[PageBands]) -> Vec<CandidateRegion> {
    let mut regions = Vec::new();

    for page_bands in pages {
        let Some(content) = page_bands.content() else {
            continue;
        };
        let ids: Vec<TokenId> = tokens
            .iter()
            .filter(|t| {
                t.page == page_bands.page
                    && t.bbox.y_center() >= content.y0
                    && t.bbox.y_center() <= content.y1
            })
            .map(|t| t.id)
            .collect();
        let lines = cluster_lines(tokens, &ids);

        for (line_idx, line) in lines.iter().enumerate() {
            let anchors = match_line_anchors(line, tokens);
            if anchors.len() < MIN_HEADER_CLASSES {
                continue;
            }

            // Region: from the header line down to the end of the
            // content band, spanning the anchors' x-range with padding.
            let mut x0 = f64::MAX;
            let mut x1 = f64::MIN;
            for anchor in &anchors {
                x0 = x0.min(anchor.bbox.x0);
                x1 = x1.max(anchor.bbox.x1);
            }
            let pad = 0.02;
            let bbox = BoundingBox::new(
                (x0 - pad).max(0.0),
                line.bbox.y0,
                (x1 + pad).min(1.0),
                content.y1,
            );
            let components = RegionScore {
                header_coverage: anchors.len() as f64 / ANCHOR_CLASSES.len() as f64,
                ..RegionScore::default()
            };
            log::debug!(
                "page {}: header line {} matched {} anchor classes",
                page_bands.page,
                line_idx,
                anchors.len()
            );
            regions.push(CandidateRegion {
                page: page_bands.page,
                bbox,
                score: components.total(),
                components,
                anchors,
            });
        }
    }

    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmenter::segment_pages;
    use faktur_core::BoundingBox;

    fn token(id: u32, x: f64, y: f64, text: &str) -> Token {
        Token {
            id: TokenId(id),
            page: 0,
            text: text.to_string(),
            bbox: BoundingBox::new(x, y, x + 0.08, y + 0.02),
        }
    }

    fn header_row_tokens() -> Vec<Token> {
        vec![
            token(0, 0.05, 0.35, "No."),
            token(1, 0.15, 0.35, "Description"),
            token(2, 0.45, 0.35, "QTY"),
            token(3, 0.60, 0.35, "UNIT"),
            token(4, 0.69, 0.35, "PRICE"),
            token(5, 0.85, 0.35, "AMOUNT"),
            token(6, 0.15, 0.42, "Widget"),
            token(7, 0.45, 0.42, "30"),
        ]
    }

    #[test]
    fn test_header_line_yields_region() {
        let tokens = header_row_tokens();
        let pages = segment_pages(&tokens);
        let regions = detect_regions(&tokens, &pages);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert!(region.anchor(AnchorClass::ItemNumber).is_some());
        assert!(region.anchor(AnchorClass::Description).is_some());
        assert!(region.anchor(AnchorClass::Quantity).is_some());
        assert!(region.anchor(AnchorClass::Amount).is_some());
        // "UNIT" + "PRICE" split across tokens still matches.
        let unit_price = region.anchor(AnchorClass::UnitPrice).unwrap();
        assert_eq!(unit_price.token_ids.len(), 2);
        assert!(region.components.header_coverage > 0.8);
    }

    #[test]
    fn test_single_keyword_line_is_not_a_header() {
        let tokens = vec![token(0, 0.1, 0.4, "Description"), token(1, 0.1, 0.5, "hello")];
        let pages = segment_pages(&tokens);
        let regions = detect_regions(&tokens, &pages);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_region_spans_to_content_band_end() {
        let tokens = header_row_tokens();
        let pages = segment_pages(&tokens);
        let content_y1 = pages[0].content().unwrap().y1;
        let regions = detect_regions(&tokens, &pages);
        assert!((regions[0].bbox.y1 - content_y1).abs() < 1e-9);
    }
}
