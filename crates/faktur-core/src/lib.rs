//! # faktur-core — Leaf types for the faktur extraction pipeline
//!
//! This crate holds everything the pipeline stages share but none of the
//! stage logic itself:
//!
//! - [`Token`] / [`TokenId`] — positioned text units, the only text
//!   source in the pipeline, referenced arena-style by every derived
//!   structure.
//! - [`BoundingBox`] — normalized `[0, 1]` geometry used by bands,
//!   anchors, regions, and cells alike.
//! - [`TemplateConfig`] / [`CompiledTemplate`] — the per-template
//!   configuration document and its validated, immutable compiled form.
//! - [`FinalDocument`] / [`Manifest`] — the canonical output and its
//!   reproducibility manifest.
//! - [`FakturError`] — the fatal error taxonomy; non-fatal data issues
//!   are value-level [`Issue`] records instead.
//!
//! The stage implementations live in the `faktur-pipeline` crate.

pub mod config;
pub mod document;
pub mod error;
pub mod geometry;
pub mod token;

pub use config::{
    CompiledDiscount, CompiledField, CompiledHeader, CompiledHeaderField, CompiledTemplate,
    CompiledUom, DiscountConfig, DiscountSource, FieldConfig, HeaderConfig, HeaderFieldConfig,
    HeaderMatchKind, ParserKind, PositionHint, ReconcileStrategy, TaxBaseFactor, TemplateConfig,
    TemplateDefaults, Tolerance, TolerancesConfig, TotalsConfig, TotalsSource, UomConfig,
    UomSource,
};
pub use document::{
    ConfidenceComponents, ConfidenceScore, FinalDocument, HeaderFields, Issue, IssueCode,
    LineItem, LineItemType, Manifest, RowCheck, Totals, ValidationResult,
};
pub use error::{FakturError, Result};
pub use geometry::BoundingBox;
pub use token::{join_in_reading_order, sort_reading_order, Token, TokenId};
