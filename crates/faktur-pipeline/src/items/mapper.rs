//! Field mapper: assigns semantic field names to grid columns.
//!
//! Primary evidence is the template's `header_synonyms` matched against
//! the header-row cell text. Candidate (field, column) pairs are scored
//! by match length with a whole-cell bonus, then assigned greedily from
//! the best score down, each field and each column used at most once.
//! Ties break by field name, then by leftmost column, so the assignment
//! is deterministic. Fields left unmapped fall back to their
//! `position_hint` range; a required field that still has no column is
//! logged by the builder, never an error.

use crate::normalize::NormalizedGrid;
use faktur_core::{CompiledField, CompiledTemplate};
use std::collections::BTreeMap;

/// Field name → column index, for one grid.
pub type ColumnMap = BTreeMap<String, usize>;

/// Bonus for a synonym consuming the entire header cell.
const WHOLE_CELL_BONUS: i64 = 16;

fn synonym_score(field: &CompiledField, header_text: &str) -> i64 {
    let trimmed = header_text.trim();
    if trimmed.is_empty() {
        return 0;
    }
    let mut best = 0i64;
    for synonym in &field.header_synonyms {
        if let Some(m) = synonym.find(trimmed) {
            let mut score = (m.end() - m.start()) as i64;
            if m.start() == 0 && m.end() == trimmed.len() {
                score += WHOLE_CELL_BONUS;
            }
            best = best.max(score);
        }
    }
    best
}

/// Map template fields onto the columns of one grid.
#[must_use = "returns the field-to-column assignment"]
pub fn map_columns(template: &CompiledTemplate, grid: &NormalizedGrid) -> ColumnMap {
    let layout = &grid.layout;
    let header_row = layout.header_row;

    // Score every (field, column) pair against the header cells.
    let mut candidates: Vec<(i64, &str, usize)> = Vec::new();
    for field in &template.fields {
        for col in 0..layout.n_cols {
            let header_text = &grid.cell(header_row, col).normalized_text;
            let score = synonym_score(field, header_text);
            if score > 0 {
                candidates.push((score, field.name.as_str(), col));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(b.1)).then(a.2.cmp(&b.2)));

    let mut map = ColumnMap::new();
    let mut used_cols = vec![false; layout.n_cols];
    for (_, name, col) in candidates {
        if used_cols[col] || map.contains_key(name) {
            continue;
        }
        used_cols[col] = true;
        map.insert(name.to_string(), col);
    }

    // Positional fallback for fields the header evidence missed.
    for field in &template.fields {
        if map.contains_key(&field.name) {
            continue;
        }
        let Some(hint) = field.position_hint else {
            continue;
        };
        let mut best: Option<(f64, usize)> = None;
        for col in 0..layout.n_cols {
            if used_cols[col] {
                continue;
            }
            let center = layout.col_center(col);
            if center < hint.x0 || center > hint.x1 {
                continue;
            }
            let distance = (center - hint.midpoint()).abs();
            let better = match best {
                None => true,
                // Strict `<` keeps the leftmost column on exact ties.
                Some((best_distance, _)) => distance < best_distance,
            };
            if better {
                best = Some((distance, col));
            }
        }
        if let Some((_, col)) = best {
            used_cols[col] = true;
            map.insert(field.name.clone(), col);
            log::debug!(
                "page {}: field '{}' mapped positionally to column {col}",
                grid.page,
                field.name
            );
        }
    }

    map
}
