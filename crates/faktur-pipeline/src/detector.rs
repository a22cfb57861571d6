//! Geometry resolver: row/column grid detection inside candidate regions.
//!
//! Two interchangeable strategies implement the [`TableGeometryDetector`]
//! capability:
//!
//! - [`LatticeDetector`] — strict: column boundaries derived from the
//!   header anchor positions, rows from inter-line gaps. Fails cleanly
//!   when the header evidence is too thin.
//! - [`StreamDetector`] — loose fallback: column boundaries from valleys
//!   in the token x-density histogram; works without anchors.
//!
//! Every attempt runs under a fixed, enumerated parameter set — there is
//! no randomness anywhere. Attempts are scored with the weighted formula
//! from [`RegionScore`]; the best region per page is kept, with ties
//! broken by column/token L1 distance and then top-y. Below the
//! acceptance threshold the region is inflated once and retried; the
//! last resort is a relaxed page-wide sweep. Output is geometry only —
//! boundaries and cell boxes, never text.

use crate::anchors::{AnchorClass, CandidateRegion, RegionScore};
use crate::segmenter::{Band, PageBands};
use crate::textline::cluster_lines;
use faktur_core::{BoundingBox, Token, TokenId};
use serde::{Deserialize, Serialize};

/// Score a region must reach to be accepted as-is.
pub const ACCEPT_THRESHOLD: f64 = 0.45;
/// Score threshold for the relaxed page-wide sweep.
pub const RELAXED_THRESHOLD: f64 = 0.30;
/// Inflation applied before the single retry (spec band: 5–10%).
pub const INFLATE_FACTOR: f64 = 0.075;

/// Row/column grid geometry within one region. Geometry only — no text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    /// Page of the grid.
    pub page: u32,
    /// Region the grid was resolved in.
    pub bbox: BoundingBox,
    /// Row boundaries, top to bottom (`rows + 1` entries).
    pub row_bounds: Vec<f64>,
    /// Column boundaries, left to right (`cols + 1` entries).
    pub col_bounds: Vec<f64>,
}

impl GridGeometry {
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

    /// Box of the cell at `(row, col)`.
    #[must_use = "returns the cell box"]
    pub fn cell_box(&self, row: usize, col: usize) -> BoundingBox {
        BoundingBox::new(
            self.col_bounds[col],
            self.row_bounds[row],
            self.col_bounds[col + 1],
            self.row_bounds[row + 1],
        )
    }

    /// Index of the band `[bounds[i], bounds[i+1])` containing `v`.
    #[must_use = "returns the band index, if inside the bounds"]
    pub fn band_index(bounds: &[f64], v: f64) -> Option<usize> {
        if bounds.len() < 2 || v < bounds[0] || v > bounds[bounds.len() - 1] {
            return None;
        }
        for i in 0..bounds.len() - 1 {
            if v < bounds[i + 1] || i == bounds.len() - 2 {
                return Some(i);
            }
        }
        None
    }

    /// Cell coordinates of a token center, if inside the grid.
    #[must_use = "returns the (row, col) of the token center"]
    pub fn locate(&self, token: &Token) -> Option<(usize, usize)> {
        let row = Self::band_index(&self.row_bounds, token.bbox.y_center())?;
        let col = Self::band_index(&self.col_bounds, token.bbox.x_center())?;
        Some((row, col))
    }
}

/// Fixed parameter set for one detection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorParams {
    /// Histogram bin count for the stream strategy.
    pub histogram_bins: usize,
    /// Minimum empty-bin run treated as a column valley.
    pub min_valley_bins: usize,
    /// Minimum rows for a usable grid.
    pub min_rows: usize,
    /// Minimum columns for a usable grid.
    pub min_cols: usize,
}

impl DetectorParams {
    /// Strict parameters used on the first pass.
    #[must_use = "returns the strict parameter set"]
    pub const fn strict() -> Self {
        Self { histogram_bins: 64, min_valley_bins: 2, min_rows: 2, min_cols: 3 }
    }

    /// Relaxed parameters used by the page-wide sweep.
    #[must_use = "returns the relaxed parameter set"]
    pub const fn relaxed() -> Self {
        Self { histogram_bins: 48, min_valley_bins: 1, min_rows: 2, min_cols: 2 }
    }
}

/// Capability interface for grid detection strategies.
///
/// The pipeline depends only on this trait, so a different backing
/// implementation (e.g. a ruling-line detector fed from vector graphics)
/// can be swapped in without touching any stage.
pub trait TableGeometryDetector {
    /// Strategy name, recorded with the resolved geometry.
    fn name(&self) -> &'static str;

    /// Attempt to resolve a grid inside the region. `None` means the
    /// strategy found nothing usable — a recoverable, stage-local miss.
    fn detect(&self, region: &CandidateRegion, tokens: &[Token]) -> Option<GridGeometry>;
}

/// Tokens whose center lies inside a box.
fn tokens_in_box<'a>(tokens: &'a [Token], page: u32, bbox: &BoundingBox) -> Vec<&'a Token> {
    tokens
        .iter()
        .filter(|t| t.page == page && bbox.contains_point(t.bbox.x_center(), t.bbox.y_center()))
        .collect()
}

/// Row boundaries from logical lines inside the region.
fn row_bounds_from_lines(region: &BoundingBox, tokens: &[Token], ids: &[TokenId]) -> Vec<f64> {
    let lines = cluster_lines(tokens, ids);
    if lines.is_empty() {
        return Vec::new();
    }
    let mut bounds = Vec::with_capacity(lines.len() + 1);
    bounds.push(region.y0.min(lines[0].bbox.y0));
    for pair in lines.windows(2) {
        bounds.push((pair[0].bbox.y1 + pair[1].bbox.y0) / 2.0);
    }
    bounds.push(region.y1.max(lines[lines.len() - 1].bbox.y1));
    bounds
}

/// Strict strategy: columns from header anchors, rows from line gaps.
#[derive(Debug, Clone, Copy)]
pub struct LatticeDetector {
    /// Parameter set for this attempt.
    pub params: DetectorParams,
}

impl TableGeometryDetector for LatticeDetector {
    fn name(&self) -> &'static str {
        "lattice"
    }

    fn detect(&self, region: &CandidateRegion, tokens: &[Token]) -> Option<GridGeometry> {
        if region.anchors.len() < self.params.min_cols {
            return None;
        }
        let mut anchors: Vec<&crate::anchors::Anchor> = region.anchors.iter().collect();
        anchors.sort_by(|a, b| a.bbox.x_center().total_cmp(&b.bbox.x_center()));

        let mut col_bounds = Vec::with_capacity(anchors.len() + 1);
        col_bounds.push(region.bbox.x0.min(anchors[0].bbox.x0));
        for pair in anchors.windows(2) {
            col_bounds.push((pair[0].bbox.x1 + pair[1].bbox.x0) / 2.0);
        }
        col_bounds.push(region.bbox.x1.max(anchors[anchors.len() - 1].bbox.x1));

        let member_ids: Vec<TokenId> = tokens_in_box(tokens, region.page, &region.bbox)
            .iter()
            .map(|t| t.id)
            .collect();
        let row_bounds = row_bounds_from_lines(&region.bbox, tokens, &member_ids);
        if row_bounds.len() < self.params.min_rows + 1 {
            return None;
        }

        Some(GridGeometry { page: region.page, bbox: region.bbox, row_bounds, col_bounds })
    }
}

/// Loose strategy: columns from token x-density valleys.
#[derive(Debug, Clone, Copy)]
pub struct StreamDetector {
    /// Parameter set for this attempt.
    pub params: DetectorParams,
}

impl TableGeometryDetector for StreamDetector {
    fn name(&self) -> &'static str {
        "stream"
    }

    fn detect(&self, region: &CandidateRegion, tokens: &[Token]) -> Option<GridGeometry> {
        let members = tokens_in_box(tokens, region.page, &region.bbox);
        if members.is_empty() {
            return None;
        }

        // Coverage histogram over the region width.
        let bins = self.params.histogram_bins;
        let width = region.bbox.width();
        if width <= 0.0 {
            return None;
        }
        let mut covered = vec![false; bins];
        for token in &members {
            let from = (((token.bbox.x0 - region.bbox.x0) / width) * bins as f64).floor() as i64;
            let to = (((token.bbox.x1 - region.bbox.x0) / width) * bins as f64).ceil() as i64;
            for bin in from.max(0)..to.min(bins as i64) {
                covered[bin as usize] = true;
            }
        }

        // Interior valleys become column separators.
        let mut col_bounds = vec![region.bbox.x0];
        let mut run_start: Option<usize> = None;
        for (i, &c) in covered.iter().enumerate() {
            match (c, run_start) {
                (false, None) => run_start = Some(i),
                (true, Some(start)) => {
                    let len = i - start;
                    if len >= self.params.min_valley_bins && start > 0 {
                        let center = (start + i) as f64 / 2.0;
                        col_bounds.push(region.bbox.x0 + center / bins as f64 * width);
                    }
                    run_start = None;
                }
                _ => {}
            }
        }
        col_bounds.push(region.bbox.x1);
        if col_bounds.len() < self.params.min_cols + 1 {
            return None;
        }

        let member_ids: Vec<TokenId> = members.iter().map(|t| t.id).collect();
        let row_bounds = row_bounds_from_lines(&region.bbox, tokens, &member_ids);
        if row_bounds.len() < self.params.min_rows + 1 {
            return None;
        }

        Some(GridGeometry { page: region.page, bbox: region.bbox, row_bounds, col_bounds })
    }
}

/// Map each header anchor to the grid column containing its center.
#[must_use = "returns the anchor class per column"]
pub fn column_classes(geometry: &GridGeometry, region: &CandidateRegion) -> Vec<Option<AnchorClass>> {
    let mut classes = vec![None; geometry.n_cols()];
    for anchor in &region.anchors {
        if let Some(col) = GridGeometry::band_index(&geometry.col_bounds, anchor.bbox.x_center()) {
            classes[col] = Some(anchor.keyword_class);
        }
    }
    classes
}

/// Score a resolved geometry against its region and page context.
#[must_use = "returns the score components"]
pub fn score_geometry(
    geometry: &GridGeometry,
    region: &CandidateRegion,
    tokens: &[Token],
    footer: Option<&Band>,
) -> RegionScore {
    let members = tokens_in_box(tokens, geometry.page, &geometry.bbox);
    let classes = column_classes(geometry, region);
    let header_row = 0usize;

    let numeric_cols: Vec<usize> = classes
        .iter()
        .enumerate()
        .filter(|(_, c)| {
            matches!(
                c,
                Some(AnchorClass::Quantity | AnchorClass::UnitPrice | AnchorClass::Amount)
            )
        })
        .map(|(i, _)| i)
        .collect();

    let mut numeric_considered = 0usize;
    let mut numeric_like = 0usize;
    let mut alignment_sum = 0.0;
    let mut alignment_count = 0usize;
    let mut occupied = vec![false; geometry.n_rows() * geometry.n_cols()];

    for token in &members {
        let Some((row, col)) = geometry.locate(token) else {
            continue;
        };
        occupied[row * geometry.n_cols() + col] = true;

        let cell = geometry.cell_box(row, col);
        let half_width = (cell.width() / 2.0).max(1e-6);
        let offset = ((token.bbox.x_center() - cell.x_center()).abs() / half_width).min(1.0);
        alignment_sum += 1.0 - offset;
        alignment_count += 1;

        if row != header_row {
            let in_numeric_col = if numeric_cols.is_empty() {
                true
            } else {
                numeric_cols.contains(&col)
            };
            if in_numeric_col {
                numeric_considered += 1;
                if crate::numeric::looks_numeric(&token.text) {
                    numeric_like += 1;
                }
            }
        }
    }

    let empty_cells = occupied.iter().filter(|o| !**o).count();
    let total_cells = occupied.len().max(1);

    let footer_penalty = footer.map_or(0.0, |f| {
        let footer_box = BoundingBox::new(0.0, f.y0, 1.0, f.y1);
        geometry.bbox.intersection_over_self(&footer_box)
    });

    RegionScore {
        header_coverage: region.components.header_coverage,
        numeric_purity: if numeric_considered == 0 {
            0.0
        } else {
            numeric_like as f64 / numeric_considered as f64
        },
        alignment_quality: if alignment_count == 0 {
            0.0
        } else {
            alignment_sum / alignment_count as f64
        },
        empty_cell_rate: empty_cells as f64 / total_cells as f64,
        footer_penalty,
    }
}

/// Tie-break metric: mean L1 distance between each column's midline and
/// the mean x-center of the tokens that landed in it.
fn column_l1(geometry: &GridGeometry, tokens: &[Token]) -> f64 {
    let members = tokens_in_box(tokens, geometry.page, &geometry.bbox);
    let n_cols = geometry.n_cols();
    let mut sums = vec![0.0; n_cols];
    let mut counts = vec![0usize; n_cols];
    for token in &members {
        if let Some((_, col)) = geometry.locate(token) {
            sums[col] += token.bbox.x_center();
            counts[col] += 1;
        }
    }
    let mut total = 0.0;
    let mut used = 0usize;
    for col in 0..n_cols {
        if counts[col] > 0 {
            let cluster_center = sums[col] / counts[col] as f64;
            let cell_center =
                (geometry.col_bounds[col] + geometry.col_bounds[col + 1]) / 2.0;
            total += (cluster_center - cell_center).abs();
            used += 1;
        }
    }
    if used == 0 {
        f64::MAX
    } else {
        total / used as f64
    }
}

/// A geometry that won the per-page selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedGeometry {
    /// The resolved grid.
    pub geometry: GridGeometry,
    /// The region that produced it (carries anchors for later stages).
    pub region: CandidateRegion,
    /// Final score components.
    pub score: RegionScore,
    /// Weighted total.
    pub total: f64,
    /// Strategy that produced the grid.
    pub strategy: String,
}

fn best_attempt(
    regions: &[CandidateRegion],
    tokens: &[Token],
    footer: Option<&Band>,
    params: DetectorParams,
) -> Option<ResolvedGeometry> {
    let lattice = LatticeDetector { params };
    let stream = StreamDetector { params };
    let strategies: [&dyn TableGeometryDetector; 2] = [&lattice, &stream];

    let mut best: Option<(ResolvedGeometry, f64)> = None;
    for region in regions {
        for strategy in strategies {
            let Some(geometry) = strategy.detect(region, tokens) else {
                continue;
            };
            let score = score_geometry(&geometry, region, tokens, footer);
            let total = score.total();
            let l1 = column_l1(&geometry, tokens);
            let candidate = ResolvedGeometry {
                geometry,
                region: region.clone(),
                score,
                total,
                strategy: strategy.name().to_string(),
            };
            let replace = match &best {
                None => true,
                Some((current, current_l1)) => {
                    total > current.total
                        || (total == current.total && l1 < *current_l1)
                        || (total == current.total
                            && l1 == *current_l1
                            && candidate.geometry.bbox.y0 < current.geometry.bbox.y0)
                }
            };
            if replace {
                best = Some((candidate, l1));
            }
        }
    }
    best.map(|(resolved, _)| resolved)
}

/// Resolve the grid for one page: score, select, inflate-retry, sweep.
///
/// Returns `None` when the page genuinely has no usable table — the
/// document degrades to "no items on this page".
#[must_use = "returns the resolved geometry, if any"]
pub fn resolve_page(
    page_bands: &PageBands,
    regions: &[CandidateRegion],
    tokens: &[Token],
) -> Option<ResolvedGeometry> {
    let page = page_bands.page;
    let footer = page_bands.footer();
    let page_regions: Vec<CandidateRegion> =
        regions.iter().filter(|r| r.page == page).cloned().collect();

    // Pass 1: strict parameters on the detected regions.
    if let Some(best) = best_attempt(&page_regions, tokens, footer, DetectorParams::strict()) {
        if best.total >= ACCEPT_THRESHOLD {
            return Some(best);
        }
        log::debug!(
            "page {page}: best score {:.3} below threshold, inflating regions",
            best.total
        );
    }

    // Pass 2: inflate each region once and retry.
    let inflated: Vec<CandidateRegion> = page_regions
        .iter()
        .map(|r| {
            let mut region = r.clone();
            region.bbox = region.bbox.inflated(INFLATE_FACTOR);
            region
        })
        .collect();
    if let Some(best) = best_attempt(&inflated, tokens, footer, DetectorParams::strict()) {
        if best.total >= ACCEPT_THRESHOLD {
            return Some(best);
        }
    }

    // Last resort: relaxed page-wide sweep over the content band.
    let content = page_bands.content()?;
    let sweep_region = CandidateRegion {
        page,
        bbox: BoundingBox::new(0.0, content.y0, 1.0, content.y1),
        score: 0.0,
        components: RegionScore::default(),
        anchors: page_regions
            .first()
            .map(|r| r.anchors.clone())
            .unwrap_or_default(),
    };
    let stream = StreamDetector { params: DetectorParams::relaxed() };
    let geometry = stream.detect(&sweep_region, tokens)?;
    let score = score_geometry(&geometry, &sweep_region, tokens, footer);
    let total = score.total();
    if total >= RELAXED_THRESHOLD {
        log::debug!("page {page}: accepted page-wide sweep with score {total:.3}");
        Some(ResolvedGeometry {
            geometry,
            region: sweep_region,
            score,
            total,
            strategy: "stream_sweep".to_string(),
        })
    } else {
        log::debug!("page {page}: sweep score {total:.3} below relaxed threshold, no table");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::detect_regions;
    use crate::segmenter::segment_pages;

    fn token(id: u32, x: f64, y: f64, w: f64, text: &str) -> Token {
        Token {
            id: TokenId(id),
            page: 0,
            text: text.to_string(),
            bbox: BoundingBox::new(x, y, x + w, y + 0.02),
        }
    }

    fn table_tokens() -> Vec<Token> {
        vec![
            token(0, 0.05, 0.35, 0.04, "No."),
            token(1, 0.15, 0.35, 0.12, "Description"),
            token(2, 0.45, 0.35, 0.05, "QTY"),
            token(3, 0.60, 0.35, 0.10, "Price"),
            token(4, 0.80, 0.35, 0.10, "Amount"),
            token(5, 0.05, 0.42, 0.02, "1"),
            token(6, 0.15, 0.42, 0.10, "Widget"),
            token(7, 0.45, 0.42, 0.03, "30"),
            token(8, 0.60, 0.42, 0.08, "218.785,41"),
            token(9, 0.80, 0.42, 0.09, "6.563.562,30"),
            token(10, 0.05, 0.49, 0.02, "2"),
            token(11, 0.15, 0.49, 0.10, "Gadget"),
            token(12, 0.45, 0.49, 0.03, "5"),
            token(13, 0.60, 0.49, 0.08, "100.000,00"),
            token(14, 0.80, 0.49, 0.09, "500.000,00"),
        ]
    }

    #[test]
    fn test_lattice_detects_grid_from_anchors() {
        let tokens = table_tokens();
        let pages = segment_pages(&tokens);
        let regions = detect_regions(&tokens, &pages);
        assert_eq!(regions.len(), 1);

        let lattice = LatticeDetector { params: DetectorParams::strict() };
        let geometry = lattice.detect(&regions[0], &tokens).unwrap();
        assert_eq!(geometry.n_cols(), 5);
        assert!(geometry.n_rows() >= 3);
    }

    #[test]
    fn test_resolved_page_clears_threshold() {
        let tokens = table_tokens();
        let pages = segment_pages(&tokens);
        let regions = detect_regions(&tokens, &pages);
        let resolved = resolve_page(&pages[0], &regions, &tokens).unwrap();
        assert!(resolved.total >= ACCEPT_THRESHOLD, "score {}", resolved.total);
        assert!(resolved.score.numeric_purity > 0.9);
        assert!(resolved.score.empty_cell_rate < 0.5);
    }

    #[test]
    fn test_locate_assigns_tokens_to_cells() {
        let tokens = table_tokens();
        let pages = segment_pages(&tokens);
        let regions = detect_regions(&tokens, &pages);
        let resolved = resolve_page(&pages[0], &regions, &tokens).unwrap();
        let geometry = &resolved.geometry;
        // The qty token of the first data row lands in the QTY column.
        let (row, col) = geometry.locate(&tokens[7]).unwrap();
        assert_eq!(row, 1);
        let classes = column_classes(geometry, &resolved.region);
        assert_eq!(classes[col], Some(AnchorClass::Quantity));
    }

    #[test]
    fn test_page_without_regions_falls_back_to_sweep_or_none() {
        // Numeric-ish columns but no header keywords at all.
        let tokens = vec![
            token(0, 0.1, 0.40, 0.10, "alpha"),
            token(1, 0.5, 0.40, 0.05, "10"),
            token(2, 0.8, 0.40, 0.05, "20"),
            token(3, 0.1, 0.47, 0.10, "beta"),
            token(4, 0.5, 0.47, 0.05, "30"),
            token(5, 0.8, 0.47, 0.05, "40"),
        ];
        let pages = segment_pages(&tokens);
        let regions = detect_regions(&tokens, &pages);
        assert!(regions.is_empty());
        // Sweep may or may not clear the relaxed threshold; either way
        // resolution must not panic and must be deterministic.
        let a = resolve_page(&pages[0], &regions, &tokens);
        let b = resolve_page(&pages[0], &regions, &tokens);
        assert_eq!(a.is_some(), b.is_some());
    }

    #[test]
    fn test_stream_detector_finds_column_valleys() {
        let tokens = table_tokens();
        let pages = segment_pages(&tokens);
        let regions = detect_regions(&tokens, &pages);
        let stream = StreamDetector { params: DetectorParams::relaxed() };
        let geometry = stream.detect(&regions[0], &tokens).unwrap();
        assert!(geometry.n_cols() >= 3);
    }
}
