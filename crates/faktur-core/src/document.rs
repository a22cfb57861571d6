//! Canonical output document and manifest types.
//!
//! These are the types the final assembler serializes. Key ordering is
//! deterministic by construction: struct fields serialize in declaration
//! order and all dynamic maps are `BTreeMap`s.

use crate::token::TokenId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Non-fatal data issue codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueCode {
    /// A configured total could not be resolved from any source.
    #[serde(rename = "TOTALS_MISSING")]
    TotalsMissing,
    /// Quantity was absent and derived from `amount ÷ unit_price`.
    #[serde(rename = "DERIVED_QTY")]
    DerivedQty,
    /// A discrepancy exceeded 3× its tolerance.
    #[serde(rename = "SEVERE_MISMATCH")]
    SevereMismatch,
    /// A continuation row was merged into the preceding item.
    #[serde(rename = "CONTINUATION_APPLIED")]
    ContinuationApplied,
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TotalsMissing => write!(f, "TOTALS_MISSING"),
            Self::DerivedQty => write!(f, "DERIVED_QTY"),
            Self::SevereMismatch => write!(f, "SEVERE_MISMATCH"),
            Self::ContinuationApplied => write!(f, "CONTINUATION_APPLIED"),
        }
    }
}

/// One recorded data issue. Issues accumulate; they never abort a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue code.
    pub code: IssueCode,
    /// Human-readable detail.
    pub message: String,
    /// Zero-based line-item index the issue concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row: Option<usize>,
    /// Field name the issue concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Issue {
    /// Document-level issue.
    #[must_use = "returns the constructed issue"]
    pub fn document(code: IssueCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), row: None, field: None }
    }

    /// Row-level issue.
    #[must_use = "returns the constructed issue"]
    pub fn row(code: IssueCode, row: usize, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), row: Some(row), field: None }
    }

    /// Field-level issue.
    #[must_use = "returns the constructed issue"]
    pub fn field(code: IssueCode, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), row: None, field: Some(field.into()) }
    }
}

/// Kind of a built line item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineItemType {
    /// A regular goods/services row.
    #[default]
    Item,
    /// A row whose quantity was derived rather than printed.
    DerivedQty,
}

/// One extracted line item.
///
/// Numeric fields are `None` when neither printed nor derivable.
/// Continuation merges only ever append to `description` and `backrefs`;
/// resolved numeric fields are never rewritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Item number as printed, else the 1-based sequence position.
    pub no: u32,
    /// Description text (continuation rows append here).
    pub description: String,
    /// Quantity, with source decimals preserved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<f64>,
    /// Unit price.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    /// Line amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// Resolved unit of measure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uom: Option<String>,
    /// Stock keeping unit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    /// Product code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Harmonized system code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hs_code: Option<String>,
    /// Discount percentage (stated or back-derived).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<f64>,
    /// Final discount amount (row discount + allocated share).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_amount: Option<f64>,
    /// Row kind.
    #[serde(rename = "type")]
    pub item_type: LineItemType,
    /// Token provenance for the whole row.
    pub backrefs: Vec<TokenId>,
}

/// Extracted header fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeaderFields {
    /// Invoice number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_number: Option<String>,
    /// Invoice date, ISO `YYYY-MM-DD` when parseable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_date: Option<String>,
    /// Buyer name, raw — identity resolution is a collaborator's job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer_name: Option<String>,
    /// Seller name, raw.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller_name: Option<String>,
    /// ISO currency code.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Token provenance per extracted field.
    pub backrefs: BTreeMap<String, Vec<TokenId>>,
}

/// Result of one arithmetic row check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowCheck {
    /// Zero-based line-item index.
    pub row: usize,
    /// `qty × unit_price` as computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed: Option<f64>,
    /// Printed amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub printed: Option<f64>,
    /// Allowed deviation for this row.
    pub tolerance: f64,
    /// Whether the check passed.
    pub passed: bool,
    /// Whether the deviation exceeded 3× the tolerance.
    pub severe: bool,
}

/// Resolved document totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    /// Sum of line amounts / printed subtotal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<f64>,
    /// Tax base (reference template: `subtotal × 11/12`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_base: Option<f64>,
    /// Tax amount.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<f64>,
    /// Grand total.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grand_total: Option<f64>,
}

/// Validation output: row checks, resolved totals, and issues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Per-row arithmetic checks.
    pub row_checks: Vec<RowCheck>,
    /// Resolved totals.
    pub totals: Totals,
    /// Issues raised during validation.
    pub issues: Vec<Issue>,
}

/// Confidence score components, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceComponents {
    /// Anchors matched and aligned (weight 0.30).
    pub anchors: f64,
    /// Row arithmetic pass rate (weight 0.30).
    pub arithmetic: f64,
    /// Numeric purity of qty/price/amount columns (weight 0.20).
    pub numeric_purity: f64,
    /// Grid alignment, inverse of the fusion alignment delta (weight 0.10).
    pub grid_alignment: f64,
    /// Totals reconciliation (weight 0.10).
    pub totals: f64,
}

/// Weighted composite confidence score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScore {
    /// Weighted overall score in `[0, 1]`.
    pub overall: f64,
    /// Individual components, reported for auditability.
    pub components: ConfidenceComponents,
}

/// The canonical output document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalDocument {
    /// Output schema version.
    pub schema_version: String,
    /// Extracted header fields.
    pub header: HeaderFields,
    /// Extracted line items in `(page, top-y, left-x)` order.
    pub items: Vec<LineItem>,
    /// Validation output.
    pub validation: ValidationResult,
    /// Confidence score.
    pub confidence: ConfidenceScore,
    /// Provenance map: populated field path → token ids.
    pub provenance: BTreeMap<String, Vec<TokenId>>,
    /// All accumulated issues, document order.
    pub issues: Vec<Issue>,
}

/// Reproducibility manifest stamped next to every document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Output schema version.
    pub schema_version: String,
    /// Pipeline implementation version.
    pub pipeline_version: String,
    /// Fixed parameter set the run used.
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Seeds (none are used today; recorded for the contract).
    pub seeds: BTreeMap<String, u64>,
    /// SHA-256 hex digest per intermediate artifact.
    pub per_stage_hash: BTreeMap<String, String>,
}
