//! Pipeline executor: runs every stage in order and stamps the manifest.
//!
//! Stage order: segmentation, anchor detection, geometry resolution,
//! fusion, cell reconstruction, normalization, then item building and
//! header extraction side by side, then validation, confidence, and
//! assembly. Each intermediate artifact is hashed into the manifest so a
//! re-run can prove it reproduced the same bytes.

use crate::anchors::detect_regions;
use crate::assemble::{artifact_hash, assemble, SCHEMA_VERSION};
use crate::cells::reconstruct;
use crate::confidence::{score, ConfidenceInputs};
use crate::detector::{
    resolve_page, DetectorParams, ResolvedGeometry, ACCEPT_THRESHOLD, INFLATE_FACTOR,
    RELAXED_THRESHOLD,
};
use crate::fusion::{fuse, SNAP_WINDOW};
use crate::header_fields::extract_header;
use crate::items::build_items;
use crate::normalize::normalize_grid;
use crate::segmenter::{segment_pages, FOOTER_SEARCH_START, HEADER_SEARCH_LIMIT};
use crate::textline::{cluster_page_lines, TextLine};
use crate::validate::validate;
use faktur_core::{
    FakturError, FinalDocument, LineItemType, Manifest, Result, TemplateConfig, Token,
};
use std::collections::BTreeMap;

/// Pipeline implementation version, recorded in the manifest.
pub const PIPELINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One processed document with its reproducibility manifest.
#[derive(Debug)]
pub struct ExtractionOutput {
    /// The canonical output document.
    pub document: FinalDocument,
    /// The manifest attesting the run.
    pub manifest: Manifest,
}

/// A compiled, reusable document pipeline.
///
/// Construction compiles the template once; `process` can then run any
/// number of documents, in parallel if the caller wishes, since the
/// pipeline itself is immutable.
#[derive(Debug)]
pub struct DocumentPipeline {
    template: faktur_core::CompiledTemplate,
    currency_decimals: u32,
}

impl DocumentPipeline {
    /// Compile a template into a ready pipeline.
    pub fn new(config: TemplateConfig) -> Result<Self> {
        let template = config.compile()?;
        Ok(Self {
            currency_decimals: template.currency_decimals,
            template,
        })
    }

    /// Process one document's tokens into a final document and manifest.
    ///
    /// The same `(tokens, template)` pair always produces byte-identical
    /// output.
    pub fn process(&self, tokens: &[Token]) -> Result<ExtractionOutput> {
        // Token ids double as slice indices everywhere downstream.
        for (index, token) in tokens.iter().enumerate() {
            if token.id.index() != index {
                return Err(FakturError::StageError {
                    stage: "input",
                    reason: format!(
                        "token id {} at position {index}; ids must equal positions",
                        token.id.0
                    ),
                });
            }
        }

        let mut hashes: BTreeMap<String, String> = BTreeMap::new();
        hashes.insert("tokens".to_string(), artifact_hash(&tokens)?);

        let pages = segment_pages(tokens);
        hashes.insert("segmentized".to_string(), artifact_hash(&pages)?);

        let regions = detect_regions(tokens, &pages);
        let resolved: Vec<ResolvedGeometry> = pages
            .iter()
            .filter_map(|page_bands| resolve_page(page_bands, &regions, tokens))
            .collect();
        hashes.insert("geometry".to_string(), artifact_hash(&resolved)?);
        log::debug!(
            "resolved {} table grid(s) across {} page(s)",
            resolved.len(),
            pages.len()
        );

        let fused: Vec<_> = resolved.iter().map(|r| fuse(r, tokens)).collect();
        hashes.insert("fused_grid".to_string(), artifact_hash(&fused)?);

        let cell_grids: Vec<_> = fused.iter().map(|g| reconstruct(g, tokens)).collect();
        hashes.insert("cells".to_string(), artifact_hash(&cell_grids)?);

        let normalized: Vec<_> = cell_grids.iter().map(normalize_grid).collect();
        hashes.insert("cells_normalized".to_string(), artifact_hash(&normalized)?);

        // Line views shared by items, header, and totals extraction.
        let doc_lines: Vec<TextLine> = pages
            .iter()
            .flat_map(|p| cluster_page_lines(tokens, p.page))
            .collect();
        let footer_lines: Vec<TextLine> = pages
            .iter()
            .filter_map(|p| p.footer().copied())
            .flat_map(|footer| {
                cluster_page_lines(tokens, footer.page)
                    .into_iter()
                    .filter(move |line| {
                        let center = (line.bbox.y0 + line.bbox.y1) / 2.0;
                        center >= footer.y0 && center <= footer.y1
                    })
            })
            .collect();

        // Items and header fields read disjoint inputs.
        let (mut built, header) = rayon::join(
            || build_items(&self.template, &normalized, &doc_lines),
            || extract_header(&self.template, tokens),
        );
        hashes.insert("items".to_string(), artifact_hash(&built.items)?);
        hashes.insert("fields".to_string(), artifact_hash(&header)?);

        let outcome = validate(&self.template, &built.items, &footer_lines);
        hashes.insert("validation".to_string(), artifact_hash(&outcome.result)?);

        // Write derived quantities back onto their items.
        for &(index, qty) in &outcome.derived_qty {
            if let Some(item) = built.items.get_mut(index) {
                item.qty = Some(qty);
                item.item_type = LineItemType::DerivedQty;
            }
        }

        let coverage = if resolved.is_empty() {
            0.0
        } else {
            resolved.iter().map(|r| r.score.header_coverage).sum::<f64>()
                / resolved.len() as f64
        };
        let alignment = if fused.is_empty() {
            0.0
        } else {
            fused.iter().map(|g| g.mean_alignment_delta).sum::<f64>() / fused.len() as f64
        };
        let confidence = score(
            ConfidenceInputs {
                header_coverage: coverage,
                mean_alignment_delta: alignment,
                stats: Some(&built.stats),
            },
            &outcome.result,
        );
        hashes.insert("confidence".to_string(), artifact_hash(&confidence)?);

        let document = assemble(
            self.currency_decimals,
            header,
            built.items,
            outcome.result,
            confidence,
            built.issues,
        );
        hashes.insert("final".to_string(), artifact_hash(&document)?);

        // Every fixed constant a re-run would need to reproduce the
        // output byte for byte.
        let strict = DetectorParams::strict();
        let relaxed = DetectorParams::relaxed();
        let mut parameters = BTreeMap::new();
        parameters.insert("accept_threshold".to_string(), ACCEPT_THRESHOLD.into());
        parameters.insert("relaxed_threshold".to_string(), RELAXED_THRESHOLD.into());
        parameters.insert("inflate_factor".to_string(), INFLATE_FACTOR.into());
        parameters.insert("snap_window".to_string(), SNAP_WINDOW.into());
        parameters.insert(
            "histogram_bins".to_string(),
            (strict.histogram_bins as u64).into(),
        );
        parameters.insert(
            "min_valley_bins".to_string(),
            (strict.min_valley_bins as u64).into(),
        );
        parameters.insert(
            "relaxed_histogram_bins".to_string(),
            (relaxed.histogram_bins as u64).into(),
        );
        parameters.insert(
            "relaxed_min_valley_bins".to_string(),
            (relaxed.min_valley_bins as u64).into(),
        );
        parameters.insert(
            "header_search_limit".to_string(),
            HEADER_SEARCH_LIMIT.into(),
        );
        parameters.insert(
            "footer_search_start".to_string(),
            FOOTER_SEARCH_START.into(),
        );
        parameters.insert(
            "currency_decimals".to_string(),
            self.currency_decimals.into(),
        );
        parameters.insert(
            "tax_rate_percent".to_string(),
            self.template.defaults.tax_rate_percent.into(),
        );

        let manifest = Manifest {
            schema_version: SCHEMA_VERSION.to_string(),
            pipeline_version: PIPELINE_VERSION.to_string(),
            parameters,
            seeds: BTreeMap::new(),
            per_stage_hash: hashes,
        };

        Ok(ExtractionOutput { document, manifest })
    }
}
