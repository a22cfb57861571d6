//! Cell normalizer: text cleanup before field interpretation.
//!
//! Repairs hyphenated line wraps, flattens remaining line breaks to
//! spaces, strips control characters and non-breaking spaces, rewrites
//! whole-cell numerals into canonical dot-decimal form, and normalizes
//! whole-cell dates to ISO. Provenance token ids pass through untouched.

use crate::cells::{Cell, CellGrid};
use crate::numeric::{looks_numeric, normalize_date, parse_decimal, parse_percent};
use serde::{Deserialize, Serialize};

/// A cell with its cleaned text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCell {
    /// The reconstructed cell, unchanged.
    #[serde(flatten)]
    pub cell: Cell,
    /// Cleaned text used by all downstream interpretation.
    pub normalized_text: String,
}

/// The normalized grid for one page. Structure mirrors [`CellGrid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedGrid {
    /// Page of the grid.
    pub page: u32,
    /// Normalized cells, row-major.
    pub cells: Vec<NormalizedCell>,
    /// Grid shape and labeling, carried from reconstruction.
    pub layout: crate::cells::CellGrid,
}

impl NormalizedGrid {
    /// Normalized cell at `(row, col)`.
    #[inline]
    #[must_use = "returns the normalized cell"]
    pub fn cell(&self, row: usize, col: usize) -> &NormalizedCell {
        &self.cells[row * self.layout.n_cols + col]
    }
}

/// Render a parsed numeral in canonical dot-decimal form.
fn canonical_number(value: f64) -> String {
    // Shortest round-trip form; integers print without a fraction.
    format!("{value}")
}

/// Normalize one cell's text.
#[must_use = "returns the cleaned text"]
pub fn normalize_text(raw: &str) -> String {
    // Hyphenated wrap: "fasten-\ners" rejoins without the hyphen.
    let mut text = raw.replace("-\n", "");
    text = text.replace('\n', " ");
    text = text.replace('\u{00A0}', " ");
    text.retain(|c| !c.is_control());
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");

    if text.is_empty() {
        return text;
    }
    if looks_numeric(&text) {
        if let Some(stripped) = text.strip_suffix('%') {
            if let Some(value) = parse_percent(stripped) {
                return format!("{}%", canonical_number(value));
            }
        } else if let Some(value) = parse_decimal(&text) {
            return canonical_number(value);
        }
    }
    if let Some(iso) = normalize_date(&text) {
        return iso;
    }
    text
}

/// Normalize every cell of a grid.
#[must_use = "returns the normalized grid"]
pub fn normalize_grid(grid: &CellGrid) -> NormalizedGrid {
    let cells = grid
        .cells
        .iter()
        .map(|cell| NormalizedCell {
            cell: cell.clone(),
            normalized_text: normalize_text(&cell.raw_text),
        })
        .collect();
    NormalizedGrid {
        page: grid.page,
        cells,
        layout: grid.clone(),
    }
}
