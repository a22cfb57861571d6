//! Deterministic invoice extraction over positioned text tokens.
//!
//! The pipeline turns a page of `(text, bbox)` tokens into a validated,
//! hash-stamped invoice document. Stages run in a fixed order:
//!
//! ```text
//! tokens
//!   └─ segmenter        page bands (header / content / footer)
//!   └─ anchors          column-header keyword regions
//!   └─ detector         row/column grid geometry per page
//!   └─ fusion           tokens assigned to cells, boundaries snapped
//!   └─ cells            cell text reconstruction
//!   └─ normalize        text cleanup, canonical numerals and dates
//!   ├─ items            column mapping, parsing, UOM, discounts
//!   ├─ header_fields    invoice metadata            (runs alongside)
//!   └─ validate         row arithmetic and totals
//!   └─ confidence       weighted composite score
//!   └─ assemble         final document + manifest hashes
//! ```
//!
//! Everything is deterministic: no randomness, fixed parameters, stable
//! orderings. The same tokens and template always produce byte-identical
//! output, which the manifest's per-stage SHA-256 hashes attest.
//!
//! # Example
//!
//! ```no_run
//! use faktur_core::TemplateConfig;
//! use faktur_pipeline::DocumentPipeline;
//!
//! # fn run(template_json: &str, tokens: Vec<faktur_core::Token>) -> faktur_core::Result<()> {
//! let config = TemplateConfig::from_json(template_json)?;
//! let pipeline = DocumentPipeline::new(config)?;
//! let output = pipeline.process(&tokens)?;
//! println!("{}", output.document.confidence.overall);
//! # Ok(())
//! # }
//! ```

pub mod anchors;
pub mod assemble;
pub mod cells;
pub mod confidence;
pub mod detector;
pub mod executor;
pub mod fusion;
pub mod header_fields;
pub mod items;
pub mod normalize;
pub mod numeric;
pub mod segmenter;
pub mod textline;
pub mod validate;

pub use anchors::{Anchor, AnchorClass, CandidateRegion, RegionScore};
pub use assemble::{artifact_hash, to_canonical_json, SCHEMA_VERSION};
pub use cells::{Cell, CellGrid};
pub use detector::{
    GridGeometry, LatticeDetector, ResolvedGeometry, StreamDetector, TableGeometryDetector,
};
pub use executor::{DocumentPipeline, ExtractionOutput, PIPELINE_VERSION};
pub use fusion::FusedGrid;
pub use items::{BuiltItems, ItemsStats};
pub use normalize::{NormalizedCell, NormalizedGrid};
pub use segmenter::{Band, BandKind, PageBands};
pub use textline::TextLine;
pub use validate::ValidationOutcome;
