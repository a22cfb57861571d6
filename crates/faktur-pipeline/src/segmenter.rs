//! Band segmenter: partitions each page into header/content/footer.
//!
//! Stable header and footer regions are found from keyword evidence in
//! the page margins; everything between them is the content band. Table
//! detection and item extraction run only inside content bands, totals
//! extraction only inside footer bands. A page without a content band
//! simply yields zero candidate regions — never a fatal error.

use faktur_core::Token;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Band classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandKind {
    /// Top-of-page region holding invoice metadata.
    Header,
    /// Region where table detection runs.
    Content,
    /// Bottom region holding totals and notes.
    Footer,
}

/// One horizontal band of a page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    /// Page the band belongs to.
    pub page: u32,
    /// Band classification.
    pub kind: BandKind,
    /// Top edge.
    pub y0: f64,
    /// Bottom edge.
    pub y1: f64,
    /// Segmentation confidence.
    pub confidence: f64,
}

/// Band set for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageBands {
    /// Page number.
    pub page: u32,
    /// Bands, top to bottom.
    pub bands: Vec<Band>,
}

impl PageBands {
    /// The page's content band, if any.
    #[must_use = "returns the content band, if present"]
    pub fn content(&self) -> Option<&Band> {
        self.bands.iter().find(|b| b.kind == BandKind::Content)
    }

    /// The page's footer band, if any.
    #[must_use = "returns the footer band, if present"]
    pub fn footer(&self) -> Option<&Band> {
        self.bands.iter().find(|b| b.kind == BandKind::Footer)
    }

    /// The page's header band, if any.
    #[must_use = "returns the header band, if present"]
    pub fn header(&self) -> Option<&Band> {
        self.bands.iter().find(|b| b.kind == BandKind::Header)
    }
}

/// Keywords that pin the header band: invoice metadata labels.
static HEADER_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(invoice|faktur|tax\s+invoice|date|tanggal|npwp|bill\s+to|sold\s+to)\b")
        .unwrap()
});

/// Keywords that pin the footer band: totals and closing matter.
static FOOTER_KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(sub\s*total|subtotal|grand\s*total|total\s+due|amount\s+due|ppn|dpp|vat|tax|terbilang|payment|bank|signature)\b",
    )
    .unwrap()
});

/// Portion of the page searched for header keywords. Recorded in the
/// manifest parameters.
pub const HEADER_SEARCH_LIMIT: f64 = 0.30;
/// Portion of the page (from the top) where footer keywords start
/// counting. Recorded in the manifest parameters.
pub const FOOTER_SEARCH_START: f64 = 0.60;
/// Positional defaults when no keyword evidence exists.
const DEFAULT_HEADER_Y: f64 = 0.08;
const DEFAULT_FOOTER_Y: f64 = 0.94;

/// Segment every page of the run into bands.
///
/// Pages are identified from the tokens themselves; a page with no
/// tokens at all contributes no band set.
#[must_use = "returns the per-page bands"]
pub fn segment_pages(tokens: &[Token]) -> Vec<PageBands> {
    let mut pages: Vec<u32> = tokens.iter().map(|t| t.page).collect();
    pages.sort_unstable();
    pages.dedup();

    pages
        .into_iter()
        .map(|page| segment_page(tokens, page))
        .collect()
}

fn segment_page(tokens: &[Token], page: u32) -> PageBands {
    let page_tokens: Vec<&Token> = tokens.iter().filter(|t| t.page == page).collect();

    // Deepest header keyword in the top margin pins the header band.
    let mut header_y = DEFAULT_HEADER_Y;
    let mut header_keyword = false;
    for token in &page_tokens {
        if token.bbox.y1 <= HEADER_SEARCH_LIMIT && HEADER_KEYWORD_RE.is_match(&token.text) {
            header_keyword = true;
            if token.bbox.y1 > header_y {
                header_y = token.bbox.y1;
            }
        }
    }

    // Highest footer keyword in the bottom region pins the footer band.
    let mut footer_y = DEFAULT_FOOTER_Y;
    let mut footer_keyword = false;
    for token in &page_tokens {
        if token.bbox.y0 >= FOOTER_SEARCH_START && FOOTER_KEYWORD_RE.is_match(&token.text) {
            footer_keyword = true;
            if token.bbox.y0 < footer_y {
                footer_y = token.bbox.y0;
            }
        }
    }

    // Small nudge so boundary tokens fall cleanly on one side.
    let header_y = (header_y + 0.005).min(FOOTER_SEARCH_START);
    let footer_y = (footer_y - 0.005).max(header_y);

    let mut bands = vec![Band {
        page,
        kind: BandKind::Header,
        y0: 0.0,
        y1: header_y,
        confidence: if header_keyword { 0.9 } else { 0.6 },
    }];

    let has_content = page_tokens
        .iter()
        .any(|t| t.bbox.y_center() > header_y && t.bbox.y_center() < footer_y);
    if has_content {
        bands.push(Band {
            page,
            kind: BandKind::Content,
            y0: header_y,
            y1: footer_y,
            confidence: if header_keyword && footer_keyword { 0.9 } else { 0.7 },
        });
    } else {
        log::debug!("page {page}: no content band (header_y={header_y}, footer_y={footer_y})");
    }

    bands.push(Band {
        page,
        kind: BandKind::Footer,
        y0: footer_y,
        y1: 1.0,
        confidence: if footer_keyword { 0.9 } else { 0.6 },
    });

    PageBands { page, bands }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktur_core::{BoundingBox, TokenId};

    fn token(id: u32, page: u32, y: f64, text: &str) -> Token {
        Token {
            id: TokenId(id),
            page,
            text: text.to_string(),
            bbox: BoundingBox::new(0.1, y, 0.3, y + 0.02),
        }
    }

    #[test]
    fn test_keyword_anchored_bands() {
        let tokens = vec![
            token(0, 0, 0.05, "INVOICE"),
            token(1, 0, 0.10, "Date: 16/02/2026"),
            token(2, 0, 0.40, "Widget A"),
            token(3, 0, 0.85, "SUBTOTAL"),
            token(4, 0, 0.90, "1.000.000"),
        ];
        let pages = segment_pages(&tokens);
        assert_eq!(pages.len(), 1);
        let bands = &pages[0];
        let header = bands.header().unwrap();
        let content = bands.content().unwrap();
        let footer = bands.footer().unwrap();
        assert!(header.y1 >= 0.12, "header should extend past the Date row");
        assert!(content.y0 == header.y1);
        assert!(footer.y0 <= 0.85, "footer should start at SUBTOTAL");
        assert!(header.confidence > 0.8);
        assert!(footer.confidence > 0.8);
    }

    #[test]
    fn test_page_without_content_band() {
        // Header keyword page with nothing between bands.
        let tokens = vec![token(0, 0, 0.05, "INVOICE"), token(1, 0, 0.96, "page 1 of 2")];
        let pages = segment_pages(&tokens);
        assert!(pages[0].content().is_none());
    }

    #[test]
    fn test_positional_defaults_without_keywords() {
        let tokens = vec![token(0, 0, 0.5, "something")];
        let pages = segment_pages(&tokens);
        let header = pages[0].header().unwrap();
        assert!(header.confidence < 0.7);
        assert!(pages[0].content().is_some());
    }

    #[test]
    fn test_multiple_pages_segment_independently() {
        let tokens = vec![
            token(0, 0, 0.05, "INVOICE"),
            token(1, 0, 0.5, "row"),
            token(2, 1, 0.5, "row"),
        ];
        let pages = segment_pages(&tokens);
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page, 0);
        assert_eq!(pages[1].page, 1);
    }
}
