//! Cell reconstructor: turns fused-grid token groups into text cells.
//!
//! Tokens inside one cell are clustered into lines and joined with a
//! newline between lines and single spaces within a line, so a wrapped
//! description keeps its break for the normalizer's hyphen repair. Every
//! cell keeps its contributing token ids for provenance.

use crate::anchors::AnchorClass;
use crate::fusion::FusedGrid;
use crate::textline::cluster_lines;
use faktur_core::{Token, TokenId};
use serde::{Deserialize, Serialize};

/// One reconstructed cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Row of the cell.
    pub row: usize,
    /// Column of the cell.
    pub col: usize,
    /// Contributing tokens, in reading order.
    pub token_ids: Vec<TokenId>,
    /// Cell text; lines joined with `\n`, tokens within a line with
    /// single spaces.
    pub raw_text: String,
}

impl Cell {
    /// Whether the cell holds no text.
    #[inline]
    #[must_use = "returns whether the cell is empty"]
    pub fn is_empty(&self) -> bool {
        self.raw_text.is_empty()
    }
}

/// The reconstructed cell grid for one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellGrid {
    /// Page of the grid.
    pub page: u32,
    /// Cells, row-major.
    pub cells: Vec<Cell>,
    /// Number of rows.
    pub n_rows: usize,
    /// Number of columns.
    pub n_cols: usize,
    /// Column boundaries, kept for positional field mapping.
    pub col_bounds: Vec<f64>,
    /// Anchor class per column, where known.
    pub column_classes: Vec<Option<AnchorClass>>,
    /// Header row index.
    pub header_row: usize,
    /// Rows flagged as continuations by the fusion stage.
    pub continuation_rows: Vec<usize>,
    /// Alignment delta carried through for confidence scoring.
    pub mean_alignment_delta: f64,
}

impl CellGrid {
    /// Cell at `(row, col)`.
    #[inline]
    #[must_use = "returns the cell"]
    pub fn cell(&self, row: usize, col: usize) -> &Cell {
        &self.cells[row * self.n_cols + col]
    }

    /// Column index of an anchor class, if labeled.
    #[must_use = "returns the column for the class, if present"]
    pub fn column_of(&self, class: AnchorClass) -> Option<usize> {
        self.column_classes.iter().position(|c| *c == Some(class))
    }

    /// Data rows: every row below the header.
    #[inline]
    #[must_use = "returns the data row indices"]
    pub fn data_rows(&self) -> std::ops::Range<usize> {
        (self.header_row + 1)..self.n_rows
    }

    /// Horizontal center of a column.
    #[inline]
    #[must_use = "returns the column center"]
    pub fn col_center(&self, col: usize) -> f64 {
        (self.col_bounds[col] + self.col_bounds[col + 1]) / 2.0
    }
}

/// Join one cell's tokens into text, preserving internal line breaks.
fn cell_text(tokens: &[Token], ids: &[TokenId]) -> String {
    let lines = cluster_lines(tokens, ids);
    lines
        .iter()
        .map(|line| line.text.as_str())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reconstruct all cells of a fused grid.
#[must_use = "returns the reconstructed cell grid"]
pub fn reconstruct(grid: &FusedGrid, tokens: &[Token]) -> CellGrid {
    let n_rows = grid.n_rows();
    let n_cols = grid.n_cols();
    let mut cells = Vec::with_capacity(n_rows * n_cols);
    for row in 0..n_rows {
        for col in 0..n_cols {
            let ids = grid.cell(row, col).to_vec();
            let raw_text = cell_text(tokens, &ids);
            cells.push(Cell { row, col, token_ids: ids, raw_text });
        }
    }
    CellGrid {
        page: grid.page,
        cells,
        n_rows,
        n_cols,
        col_bounds: grid.col_bounds.clone(),
        column_classes: grid.column_classes.clone(),
        header_row: grid.header_row,
        continuation_rows: grid.continuation_rows.clone(),
        mean_alignment_delta: grid.mean_alignment_delta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktur_core::BoundingBox;

    fn token(id: u32, x: f64, y: f64, text: &str) -> Token {
        Token {
            id: TokenId(id),
            page: 0,
            text: text.to_string(),
            bbox: BoundingBox::new(x, y, x + 0.08, y + 0.02),
        }
    }

    #[test]
    fn test_multiline_cell_keeps_break() {
        let tokens = vec![
            token(0, 0.15, 0.42, "Industrial"),
            token(1, 0.24, 0.42, "grade"),
            token(2, 0.15, 0.45, "fastener"),
        ];
        let ids: Vec<TokenId> = tokens.iter().map(|t| t.id).collect();
        assert_eq!(cell_text(&tokens, &ids), "Industrial grade\nfastener");
    }

    #[test]
    fn test_empty_cell_yields_empty_text() {
        let tokens: Vec<Token> = Vec::new();
        assert_eq!(cell_text(&tokens, &[]), "");
    }
}
