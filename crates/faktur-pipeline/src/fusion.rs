//! Fusion: merge resolved geometry with token evidence into one grid.
//!
//! The geometry resolver gives boundaries; this stage assigns tokens to
//! cells, snaps interior boundaries onto real token gaps, drops columns
//! that contain nothing, labels columns with their anchor classes, and
//! flags continuation rows (a wrapped description with no item number of
//! its own). The output still carries no semantics beyond structure —
//! text interpretation starts at the cell reconstructor.

use crate::anchors::AnchorClass;
use crate::detector::{column_classes, GridGeometry, ResolvedGeometry};
use faktur_core::{Token, TokenId};
use serde::{Deserialize, Serialize};

/// Snap window for boundary adjustment, in page widths. Recorded in the
/// manifest parameters.
pub const SNAP_WINDOW: f64 = 0.02;

/// One page's fused table grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedGrid {
    /// Page of the grid.
    pub page: u32,
    /// Row boundaries after snapping.
    pub row_bounds: Vec<f64>,
    /// Column boundaries after snapping and empty-column removal.
    pub col_bounds: Vec<f64>,
    /// Tokens per cell, row-major, in reading order.
    pub cell_tokens: Vec<Vec<TokenId>>,
    /// Anchor class per column, where known.
    pub column_classes: Vec<Option<AnchorClass>>,
    /// Index of the header row.
    pub header_row: usize,
    /// Rows flagged as continuations of the row above.
    pub continuation_rows: Vec<usize>,
    /// Mean distance from token centers to their column midlines,
    /// carried forward for confidence scoring.
    pub mean_alignment_delta: f64,
}

impl FusedGrid {
    /// Number of rows.
    #[inline]
    #[must_use = "returns the row count"]
    pub fn n_rows(&self) -> usize {
        self.row_bounds.len().saturating_sub(1)
    }

    /// Number of columns.
    #[inline]
    #[must_use = "returns the column count"]
    pub fn n_cols(&self) -> usize {
        self.col_bounds.len().saturating_sub(1)
    }

    /// Tokens of the cell at `(row, col)`.
    #[must_use = "returns the cell's tokens"]
    pub fn cell(&self, row: usize, col: usize) -> &[TokenId] {
        &self.cell_tokens[row * self.n_cols() + col]
    }

    /// Column index of a given anchor class, if labeled.
    #[must_use = "returns the column for the class, if present"]
    pub fn column_of(&self, class: AnchorClass) -> Option<usize> {
        self.column_classes.iter().position(|c| *c == Some(class))
    }
}

/// Snap an interior boundary onto the nearest token gap within the
/// window. A gap is the midpoint between the right edge of the nearest
/// token left of the boundary and the left edge of the nearest token
/// right of it.
fn snap_boundary(bound: f64, edges: &[(f64, f64)]) -> f64 {
    let mut left_edge = f64::MIN;
    let mut right_edge = f64::MAX;
    for &(lo, hi) in edges {
        // Token straddling the boundary: leave the boundary alone.
        if lo < bound && hi > bound {
            return bound;
        }
        if hi <= bound && hi > left_edge {
            left_edge = hi;
        }
        if lo >= bound && lo < right_edge {
            right_edge = lo;
        }
    }
    if left_edge == f64::MIN || right_edge == f64::MAX {
        return bound;
    }
    let gap_center = (left_edge + right_edge) / 2.0;
    if (gap_center - bound).abs() <= SNAP_WINDOW {
        gap_center
    } else {
        bound
    }
}

/// Fuse a resolved geometry with the page's tokens.
#[must_use = "returns the fused grid"]
pub fn fuse(resolved: &ResolvedGeometry, tokens: &[Token]) -> FusedGrid {
    let geometry = &resolved.geometry;
    let page = geometry.page;
    let members: Vec<&Token> = tokens
        .iter()
        .filter(|t| {
            t.page == page
                && geometry
                    .bbox
                    .contains_point(t.bbox.x_center(), t.bbox.y_center())
        })
        .collect();

    // Snap interior column boundaries onto token gaps.
    let x_edges: Vec<(f64, f64)> = members.iter().map(|t| (t.bbox.x0, t.bbox.x1)).collect();
    let mut col_bounds = geometry.col_bounds.clone();
    for bound in col_bounds.iter_mut().skip(1).take(geometry.n_cols().saturating_sub(1)) {
        *bound = snap_boundary(*bound, &x_edges);
    }

    // Snap interior row boundaries onto vertical gaps the same way.
    let y_edges: Vec<(f64, f64)> = members.iter().map(|t| (t.bbox.y0, t.bbox.y1)).collect();
    let mut row_bounds = geometry.row_bounds.clone();
    for bound in row_bounds.iter_mut().skip(1).take(geometry.n_rows().saturating_sub(1)) {
        *bound = snap_boundary(*bound, &y_edges);
    }

    let snapped = GridGeometry {
        page,
        bbox: geometry.bbox,
        row_bounds,
        col_bounds,
    };
    let mut classes = column_classes(&snapped, &resolved.region);

    // Assign tokens to cells and accumulate the alignment delta.
    let n_rows = snapped.n_rows();
    let n_cols = snapped.n_cols();
    let mut cell_tokens: Vec<Vec<TokenId>> = vec![Vec::new(); n_rows * n_cols];
    let mut delta_sum = 0.0;
    let mut delta_count = 0usize;
    for token in &members {
        if let Some((row, col)) = snapped.locate(token) {
            cell_tokens[row * n_cols + col].push(token.id);
            let cell = snapped.cell_box(row, col);
            delta_sum += (token.bbox.x_center() - cell.x_center()).abs();
            delta_count += 1;
        }
    }

    // Drop columns with no tokens at all.
    let occupied_cols: Vec<usize> = (0..n_cols)
        .filter(|&col| (0..n_rows).any(|row| !cell_tokens[row * n_cols + col].is_empty()))
        .collect();
    if occupied_cols.len() < n_cols {
        log::debug!(
            "page {page}: dropping {} empty column(s)",
            n_cols - occupied_cols.len()
        );
        let mut kept_bounds = Vec::with_capacity(occupied_cols.len() + 1);
        for &col in &occupied_cols {
            kept_bounds.push(snapped.col_bounds[col]);
        }
        kept_bounds.push(snapped.col_bounds[n_cols]);
        let mut kept_cells = Vec::with_capacity(n_rows * occupied_cols.len());
        for row in 0..n_rows {
            for &col in &occupied_cols {
                kept_cells.push(std::mem::take(&mut cell_tokens[row * n_cols + col]));
            }
        }
        classes = occupied_cols.iter().map(|&col| classes[col]).collect();
        cell_tokens = kept_cells;
        return finish(
            page,
            snapped.row_bounds,
            kept_bounds,
            cell_tokens,
            classes,
            tokens,
            delta_sum,
            delta_count,
        );
    }

    finish(
        page,
        snapped.row_bounds,
        snapped.col_bounds,
        cell_tokens,
        classes,
        tokens,
        delta_sum,
        delta_count,
    )
}

#[allow(clippy::too_many_arguments)]
fn finish(
    page: u32,
    row_bounds: Vec<f64>,
    col_bounds: Vec<f64>,
    mut cell_tokens: Vec<Vec<TokenId>>,
    column_classes: Vec<Option<AnchorClass>>,
    tokens: &[Token],
    delta_sum: f64,
    delta_count: usize,
) -> FusedGrid {
    let n_cols = col_bounds.len().saturating_sub(1);
    let n_rows = row_bounds.len().saturating_sub(1);

    // Reading order within each cell.
    for ids in &mut cell_tokens {
        faktur_core::sort_reading_order(tokens, ids);
    }

    let mut grid = FusedGrid {
        page,
        row_bounds,
        col_bounds,
        cell_tokens,
        column_classes,
        header_row: 0,
        continuation_rows: Vec::new(),
        mean_alignment_delta: if delta_count == 0 {
            0.0
        } else {
            delta_sum / delta_count as f64
        },
    };

    // A data row whose item-number and code cells are empty while its
    // description cell has text is a wrapped continuation.
    let number_col = grid.column_of(AnchorClass::ItemNumber);
    let code_col = grid.column_of(AnchorClass::Code);
    let desc_col = grid.column_of(AnchorClass::Description);
    if let Some(desc) = desc_col {
        for row in (grid.header_row + 1)..n_rows {
            let number_empty = number_col.map_or(true, |c| grid.cell(row, c).is_empty());
            let code_empty = code_col.map_or(true, |c| grid.cell(row, c).is_empty());
            let desc_filled = !grid.cell(row, desc).is_empty();
            let numeric_cols_empty = (0..n_cols)
                .filter(|&c| {
                    matches!(
                        grid.column_classes[c],
                        Some(
                            AnchorClass::Quantity
                                | AnchorClass::UnitPrice
                                | AnchorClass::Amount
                        )
                    )
                })
                .all(|c| grid.cell(row, c).is_empty());
            if number_empty && code_empty && desc_filled && numeric_cols_empty {
                grid.continuation_rows.push(row);
            }
        }
    }

    grid
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::detect_regions;
    use crate::detector::resolve_page;
    use crate::segmenter::segment_pages;
    use faktur_core::BoundingBox;

    fn token(id: u32, x: f64, y: f64, w: f64, text: &str) -> Token {
        Token {
            id: TokenId(id),
            page: 0,
            text: text.to_string(),
            bbox: BoundingBox::new(x, y, x + w, y + 0.02),
        }
    }

    fn wrapped_table() -> Vec<Token> {
        vec![
            token(0, 0.05, 0.35, 0.04, "No."),
            token(1, 0.15, 0.35, 0.12, "Description"),
            token(2, 0.45, 0.35, 0.05, "QTY"),
            token(3, 0.60, 0.35, 0.10, "Price"),
            token(4, 0.80, 0.35, 0.10, "Amount"),
            token(5, 0.05, 0.42, 0.02, "1"),
            token(6, 0.15, 0.42, 0.12, "Industrial"),
            token(7, 0.45, 0.42, 0.03, "30"),
            token(8, 0.60, 0.42, 0.08, "218.785,41"),
            token(9, 0.80, 0.42, 0.09, "6.563.562,30"),
            // Continuation: description text only.
            token(10, 0.15, 0.47, 0.12, "grade fastener"),
            token(11, 0.05, 0.54, 0.02, "2"),
            token(12, 0.15, 0.54, 0.10, "Gasket"),
            token(13, 0.45, 0.54, 0.03, "5"),
            token(14, 0.60, 0.54, 0.08, "100.000,00"),
            token(15, 0.80, 0.54, 0.09, "500.000,00"),
        ]
    }

    fn fuse_table(tokens: &[Token]) -> FusedGrid {
        let pages = segment_pages(tokens);
        let regions = detect_regions(tokens, &pages);
        let resolved = resolve_page(&pages[0], &regions, tokens).unwrap();
        fuse(&resolved, tokens)
    }

    #[test]
    fn test_cells_hold_their_tokens() {
        let tokens = wrapped_table();
        let grid = fuse_table(&tokens);
        assert_eq!(grid.n_cols(), 5);
        let qty_col = grid.column_of(AnchorClass::Quantity).unwrap();
        assert_eq!(grid.cell(1, qty_col), &[TokenId(7)]);
        let amount_col = grid.column_of(AnchorClass::Amount).unwrap();
        assert_eq!(grid.cell(1, amount_col), &[TokenId(9)]);
    }

    #[test]
    fn test_continuation_row_flagged() {
        let tokens = wrapped_table();
        let grid = fuse_table(&tokens);
        assert_eq!(grid.continuation_rows, vec![2]);
    }

    #[test]
    fn test_header_row_is_first() {
        let tokens = wrapped_table();
        let grid = fuse_table(&tokens);
        assert_eq!(grid.header_row, 0);
        let desc_col = grid.column_of(AnchorClass::Description).unwrap();
        assert_eq!(grid.cell(0, desc_col), &[TokenId(1)]);
    }

    #[test]
    fn test_alignment_delta_is_small_for_clean_table() {
        let tokens = wrapped_table();
        let grid = fuse_table(&tokens);
        assert!(grid.mean_alignment_delta < 0.1);
    }
}
