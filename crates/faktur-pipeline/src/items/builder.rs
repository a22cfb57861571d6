//! Line-item builder: turns normalized grid rows into line items.
//!
//! Rows are filtered (exclusion patterns, blanks), continuation rows are
//! stitched into the item above them, and each surviving row's cells run
//! through the configured parser chains. Discount resolution happens
//! once, over the whole document's items, after every grid has been
//! read. Items keep full token provenance.

use crate::items::discount::{allocate, DiscountInput, DocDiscount};
use crate::items::mapper::{map_columns, ColumnMap};
use crate::items::parsers::apply_parsers;
use crate::items::uom::{resolve_uom, UomEvidence};
use crate::normalize::NormalizedGrid;
use crate::numeric::parse_percent;
use crate::textline::TextLine;
use faktur_core::{
    CompiledTemplate, DiscountSource, Issue, IssueCode, LineItem, TokenId,
};
use rustc_hash::FxHashSet;

/// Numeric-purity accounting over the qty/price/amount columns.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ItemsStats {
    /// Non-empty cells in numeric-typed columns.
    pub numeric_cells: usize,
    /// Of those, cells that parsed to a number.
    pub numeric_parsed: usize,
}

impl ItemsStats {
    /// Fraction of numeric-column cells that parsed.
    #[must_use = "returns the numeric purity"]
    pub fn purity(&self) -> f64 {
        if self.numeric_cells == 0 {
            0.0
        } else {
            self.numeric_parsed as f64 / self.numeric_cells as f64
        }
    }
}

/// Builder output: items, issues, purity accounting.
#[derive(Debug, Default)]
pub struct BuiltItems {
    /// Extracted items in document order.
    pub items: Vec<LineItem>,
    /// Issues raised while building (continuation merges).
    pub issues: Vec<Issue>,
    /// Numeric purity accounting.
    pub stats: ItemsStats,
}

/// Find the document-level discount, honoring the precedence order.
fn find_doc_discount(template: &CompiledTemplate, doc_lines: &[TextLine]) -> Option<DocDiscount> {
    for source in &template.discount.precedence {
        let (patterns, build): (_, fn(f64) -> DocDiscount) = match source {
            DiscountSource::Row => continue,
            DiscountSource::DocPercent => {
                (&template.discount.doc_percent_patterns, DocDiscount::Percent)
            }
            DiscountSource::DocAmount => {
                (&template.discount.doc_amount_patterns, DocDiscount::Amount)
            }
        };
        for line in doc_lines {
            for pattern in patterns {
                if let Some(caps) = pattern.captures(&line.text) {
                    if let Some(value) = caps.name("value") {
                        if let Some(parsed) = crate::numeric::parse_decimal(value.as_str()) {
                            return Some(build(parsed));
                        }
                    }
                }
            }
        }
    }
    None
}

fn mapped_text<'a>(
    grid: &'a NormalizedGrid,
    map: &ColumnMap,
    row: usize,
    field: &str,
) -> Option<&'a str> {
    let col = *map.get(field)?;
    let text = grid.cell(row, col).normalized_text.as_str();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn mapped_tokens(grid: &NormalizedGrid, map: &ColumnMap, row: usize, field: &str) -> Vec<TokenId> {
    map.get(field)
        .map(|&col| grid.cell(row, col).cell.token_ids.clone())
        .unwrap_or_default()
}

/// Parse one field through its configured chain, returning the number.
fn parse_number(
    template: &CompiledTemplate,
    grid: &NormalizedGrid,
    map: &ColumnMap,
    row: usize,
    field: &str,
) -> Option<f64> {
    let text = mapped_text(grid, map, row, field)?;
    let parsers = template.field(field).map(|f| f.parsers.as_slice())?;
    apply_parsers(parsers, text).number
}

/// Build line items from every page's normalized grid.
#[must_use = "returns the built items"]
pub fn build_items(
    template: &CompiledTemplate,
    grids: &[NormalizedGrid],
    doc_lines: &[TextLine],
) -> BuiltItems {
    let mut out = BuiltItems::default();
    let mut row_discounts: Vec<(Option<f64>, Option<f64>)> = Vec::new();

    for grid in grids {
        let map = map_columns(template, grid);
        let continuation: FxHashSet<usize> =
            grid.layout.continuation_rows.iter().copied().collect();
        for field in &template.fields {
            if field.required && !map.contains_key(&field.name) {
                log::warn!(
                    "page {}: required field '{}' has no column",
                    grid.page,
                    field.name
                );
            }
        }

        let header_cells: Vec<(String, Vec<TokenId>)> = (0..grid.layout.n_cols)
            .map(|col| {
                let cell = grid.cell(grid.layout.header_row, col);
                (cell.normalized_text.clone(), cell.cell.token_ids.clone())
            })
            .collect();

        for row in grid.layout.data_rows() {
            let row_cells: Vec<&crate::normalize::NormalizedCell> =
                (0..grid.layout.n_cols).map(|col| grid.cell(row, col)).collect();
            let row_text = row_cells
                .iter()
                .map(|c| c.normalized_text.as_str())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if row_text.is_empty() {
                continue;
            }

            // Continuation rows append into the item above, but only the
            // description text, and only when the field allows merging.
            if continuation.contains(&row) {
                let mergeable =
                    template.field("description").map_or(false, |f| f.merge);
                if !mergeable {
                    log::debug!(
                        "page {}: continuation row {row} dropped; description does not merge",
                        grid.page
                    );
                    continue;
                }
                if let Some(item) = out.items.last_mut() {
                    if let Some(extra) = mapped_text(grid, &map, row, "description") {
                        if !item.description.is_empty() {
                            item.description.push(' ');
                        }
                        item.description.push_str(extra);
                    }
                    for cell in &row_cells {
                        item.backrefs.extend(cell.cell.token_ids.iter().copied());
                    }
                    out.issues.push(Issue::row(
                        IssueCode::ContinuationApplied,
                        out.items.len() - 1,
                        format!("wrapped row {row} merged into item {}", out.items.len()),
                    ));
                }
                continue;
            }

            if template.row_filters.iter().any(|re| re.is_match(&row_text)) {
                log::debug!("page {}: row {row} excluded by filter", grid.page);
                continue;
            }

            // Cell parsing.
            let qty_parsed = mapped_text(grid, &map, row, "qty").map(|text| {
                let parsers = template
                    .field("qty")
                    .map(|f| f.parsers.as_slice())
                    .unwrap_or_default();
                apply_parsers(parsers, text)
            });
            let qty = qty_parsed.as_ref().and_then(|p| p.number);
            let unit_price = parse_number(template, grid, &map, row, "unit_price");
            let amount = parse_number(template, grid, &map, row, "amount");

            // Row unit evidence: the qty cell's unit, else a dedicated
            // uom column.
            let row_unit = qty_parsed
                .as_ref()
                .and_then(|p| p.unit.clone())
                .map(|unit| (unit, mapped_tokens(grid, &map, row, "qty")))
                .or_else(|| {
                    mapped_text(grid, &map, row, "uom").map(|text| {
                        (text.to_uppercase(), mapped_tokens(grid, &map, row, "uom"))
                    })
                });
            let evidence = UomEvidence { row_unit, header_cells: header_cells.clone() };
            let (uom, uom_ids) = resolve_uom(template, &evidence, doc_lines);

            // Row-stated discount evidence, resolved document-wide later.
            let row_percent = mapped_text(grid, &map, row, "discount_percent")
                .and_then(parse_percent)
                .or_else(|| {
                    mapped_text(grid, &map, row, "discount").and_then(|text| {
                        text.strip_suffix('%').and_then(parse_percent)
                    })
                });
            let row_amount = parse_number(template, grid, &map, row, "discount_amount")
                .or_else(|| {
                    mapped_text(grid, &map, row, "discount")
                        .filter(|t| !t.ends_with('%'))
                        .and_then(crate::numeric::parse_decimal)
                });

            let no = parse_number(template, grid, &map, row, "no")
                .filter(|v| *v >= 1.0 && v.fract() == 0.0)
                .map(|v| v as u32)
                .unwrap_or(out.items.len() as u32 + 1);

            let mut backrefs: Vec<TokenId> = Vec::new();
            for cell in &row_cells {
                backrefs.extend(cell.cell.token_ids.iter().copied());
            }
            // Units resolved from outside the row (header suffix, document
            // pattern) still carry their source tokens.
            for id in uom_ids {
                if !backrefs.contains(&id) {
                    backrefs.push(id);
                }
            }

            // Purity accounting over the numeric-typed columns.
            for (field, value) in
                [("qty", qty), ("unit_price", unit_price), ("amount", amount)]
            {
                if mapped_text(grid, &map, row, field).is_some() {
                    out.stats.numeric_cells += 1;
                    if value.is_some() {
                        out.stats.numeric_parsed += 1;
                    }
                }
            }

            out.items.push(LineItem {
                no,
                description: mapped_text(grid, &map, row, "description")
                    .unwrap_or_default()
                    .to_string(),
                qty,
                unit_price,
                amount,
                uom,
                sku: mapped_text(grid, &map, row, "sku").map(str::to_string),
                code: mapped_text(grid, &map, row, "code").map(str::to_string),
                hs_code: mapped_text(grid, &map, row, "hs_code").map(str::to_string),
                backrefs,
                ..LineItem::default()
            });
            row_discounts.push((row_percent, row_amount));
        }
    }

    // Document-wide discount resolution, one allocator call.
    let doc_discount = find_doc_discount(template, doc_lines);
    let inputs: Vec<DiscountInput> = out
        .items
        .iter()
        .zip(&row_discounts)
        .map(|(item, &(row_percent, row_amount))| DiscountInput {
            line_base: item
                .qty
                .zip(item.unit_price)
                .map(|(q, p)| q * p)
                .or(item.amount)
                .unwrap_or(0.0),
            row_percent,
            row_amount,
        })
        .collect();
    let resolved = allocate(
        &inputs,
        doc_discount,
        template.discount.rounding,
        template.discount.reconcile,
    );
    for (item, line) in out.items.iter_mut().zip(&resolved) {
        if line.discount_amount != 0.0 {
            item.discount_amount = Some(line.discount_amount);
            item.discount_percent = line.discount_percent;
        } else if let Some(percent) = line.discount_percent {
            item.discount_percent = Some(percent);
        }
    }

    out
}
