//! Template configuration: raw schema and compiled rule set.
//!
//! The configuration document arrives as JSON (or any serde source) in
//! the shape the template contract specifies. It is parsed **once** into
//! [`TemplateConfig`] and then compiled into an immutable
//! [`CompiledTemplate`] before any document is processed: regexes are
//! compiled, capture groups are checked, precedence names are resolved
//! into closed enums. Compilation failures are fatal [`ConfigError`]s
//! naming the stage and field; nothing is silently defaulted.
//!
//! [`ConfigError`]: crate::FakturError::ConfigError

use crate::error::{FakturError, Result};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Raw schema (deserialized as-is from the template document)
// ---------------------------------------------------------------------------

/// Per-template stage parameters, as deserialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Line-item field mapping rules, keyed by semantic field name
    /// (`qty`, `unit_price`, `amount`, `description`, ...).
    pub fields: BTreeMap<String, FieldConfig>,
    /// Unit-of-measure resolution rules.
    #[serde(default)]
    pub uom: UomConfig,
    /// Discount resolution and proration rules.
    #[serde(default)]
    pub discount: DiscountConfig,
    /// Row exclusion patterns (totals, notes, VAT lines).
    #[serde(default)]
    pub row_filters: Vec<String>,
    /// Decimal count for monetary rounding at export.
    #[serde(default = "default_currency_decimals")]
    pub currency_decimals: u32,
    /// Arithmetic tolerances.
    #[serde(default)]
    pub tolerances: TolerancesConfig,
    /// Header field match rules.
    pub header: HeaderConfig,
    /// Ordered fallback source paths per total.
    #[serde(default)]
    pub totals: TotalsConfig,
    /// Template defaults (currency, tax label, tax formula constants).
    #[serde(default)]
    pub defaults: TemplateDefaults,
}

fn default_currency_decimals() -> u32 {
    2
}

/// Mapping rule for one line-item field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    /// Regexes matched against the header cell text.
    #[serde(default)]
    pub header_synonyms: Vec<String>,
    /// Positional fallback range in normalized x.
    #[serde(default)]
    pub position_hint: Option<PositionHint>,
    /// Parser chain applied to the cell text.
    #[serde(default)]
    pub parsers: Vec<String>,
    /// Whether an unmapped column is a data issue.
    #[serde(default)]
    pub required: bool,
    /// Whether continuation rows may append into this field.
    #[serde(default)]
    pub merge: bool,
}

/// Horizontal range used by the positional mapping fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionHint {
    /// Left edge of the range.
    pub x0: f64,
    /// Right edge of the range.
    pub x1: f64,
}

impl PositionHint {
    /// Range midpoint.
    #[inline]
    #[must_use = "returns the midpoint of the hint range"]
    pub fn midpoint(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }
}

/// Unit-of-measure resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UomConfig {
    /// Resolution order; defaults to `row → header_suffix → doc_pattern → default`.
    #[serde(default = "default_uom_precedence")]
    pub precedence: Vec<String>,
    /// Patterns run against header cells; each needs a named group `unit`.
    #[serde(default)]
    pub header_suffix_patterns: Vec<String>,
    /// Patterns run against the whole document text; named group `unit`.
    #[serde(default)]
    pub doc_patterns: Vec<String>,
    /// Static fallback unit.
    #[serde(default)]
    pub default: Option<String>,
}

impl Default for UomConfig {
    fn default() -> Self {
        Self {
            precedence: default_uom_precedence(),
            header_suffix_patterns: Vec::new(),
            doc_patterns: Vec::new(),
            default: None,
        }
    }
}

fn default_uom_precedence() -> Vec<String> {
    vec![
        "row".to_string(),
        "header_suffix".to_string(),
        "doc_pattern".to_string(),
        "default".to_string(),
    ]
}

/// Discount resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountConfig {
    /// Resolution order; defaults to `row → doc_percent → doc_amount`.
    #[serde(default = "default_discount_precedence")]
    pub precedence: Vec<String>,
    /// Document-level percent patterns; named group `value`.
    #[serde(default)]
    pub doc_percent_patterns: Vec<String>,
    /// Document-level absolute amount patterns; named group `value`.
    #[serde(default)]
    pub doc_amount_patterns: Vec<String>,
    /// Decimals for per-line share rounding (half-up).
    #[serde(default = "default_currency_decimals")]
    pub rounding: u32,
    /// Residual reconciliation strategy (`largest_line` or `first_line`).
    #[serde(default = "default_reconcile")]
    pub reconcile: String,
}

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            precedence: default_discount_precedence(),
            doc_percent_patterns: Vec::new(),
            doc_amount_patterns: Vec::new(),
            rounding: default_currency_decimals(),
            reconcile: default_reconcile(),
        }
    }
}

fn default_discount_precedence() -> Vec<String> {
    vec![
        "row".to_string(),
        "doc_percent".to_string(),
        "doc_amount".to_string(),
    ]
}

fn default_reconcile() -> String {
    "largest_line".to_string()
}

/// One relative/absolute tolerance pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tolerance {
    /// Absolute allowance in currency units.
    pub abs: f64,
    /// Relative allowance as a fraction of the computed value.
    pub rel: f64,
}

/// Arithmetic tolerances for validation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TolerancesConfig {
    /// Row check: `|qty × unit_price − amount|`.
    #[serde(default = "default_row_tolerance")]
    pub amount_from_qty_price: Tolerance,
    /// Subtotal check: `|Σ row amount − subtotal|`.
    #[serde(default = "default_subtotal_tolerance")]
    pub subtotal: Tolerance,
}

impl Default for TolerancesConfig {
    fn default() -> Self {
        Self {
            amount_from_qty_price: default_row_tolerance(),
            subtotal: default_subtotal_tolerance(),
        }
    }
}

fn default_row_tolerance() -> Tolerance {
    Tolerance { abs: 1.0, rel: 0.005 }
}

fn default_subtotal_tolerance() -> Tolerance {
    Tolerance { abs: 2.0, rel: 0.003 }
}

/// Header field extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderConfig {
    /// Pages to scan (zero-based).
    #[serde(default = "default_header_pages")]
    pub pages: Vec<u32>,
    /// Maximum logical rows scanned per page.
    #[serde(default = "default_search_row_limit")]
    pub search_row_limit: usize,
    /// Match rule per header field name.
    pub fields: BTreeMap<String, HeaderFieldConfig>,
}

fn default_header_pages() -> Vec<u32> {
    vec![0]
}

fn default_search_row_limit() -> usize {
    40
}

/// Match rule for one header field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderFieldConfig {
    /// Match kind: `contains`, `equals`, or `regex`.
    #[serde(rename = "match")]
    pub match_kind: String,
    /// Literal text or regex, depending on the match kind.
    pub pattern: String,
    /// Anchor label whose neighborhood the pattern is applied in.
    #[serde(default)]
    pub alias: Option<String>,
    /// Case-sensitive matching (default: insensitive).
    #[serde(default)]
    pub case_sensitive: bool,
}

/// Ordered fallback source paths per total name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TotalsConfig {
    /// `totals.fields.<name>` → ordered source paths such as
    /// `printed.subtotal` or `computed.subtotal`.
    #[serde(default)]
    pub fields: BTreeMap<String, Vec<String>>,
}

/// Ratio used by the derived tax-base formula.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaxBaseFactor {
    /// Numerator.
    pub num: f64,
    /// Denominator.
    pub den: f64,
}

/// Template defaults: currency, tax label, and tax-formula constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDefaults {
    /// ISO currency code when the document states none.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Label of the tax line in the footer (e.g. `PPN`, `VAT`).
    #[serde(default = "default_tax_label")]
    pub tax_label: String,
    /// Tax rate as a percentage.
    #[serde(default = "default_tax_rate")]
    pub tax_rate_percent: f64,
    /// Tax base ratio; the reference template uses 11/12.
    #[serde(default = "default_tax_base_factor")]
    pub tax_base_factor: TaxBaseFactor,
}

impl Default for TemplateDefaults {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            tax_label: default_tax_label(),
            tax_rate_percent: default_tax_rate(),
            tax_base_factor: default_tax_base_factor(),
        }
    }
}

fn default_currency() -> String {
    "IDR".to_string()
}

fn default_tax_label() -> String {
    "PPN".to_string()
}

fn default_tax_rate() -> f64 {
    12.0
}

fn default_tax_base_factor() -> TaxBaseFactor {
    TaxBaseFactor { num: 11.0, den: 12.0 }
}

// ---------------------------------------------------------------------------
// Compiled rule set (immutable, validated, shared read-only)
// ---------------------------------------------------------------------------

/// Cell parser kinds, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParserKind {
    /// Integer with separators stripped.
    Integer,
    /// Decimal / monetary value, separator- and symbol-aware.
    Decimal,
    /// Percentage (`10%`, `10 %`, `10`).
    Percent,
    /// Combined quantity and unit (`30 PCS`).
    QtyUnit,
    /// Code cleanup: trim, collapse inner whitespace, uppercase.
    Code,
    /// Strip control characters only.
    StripControl,
}

impl ParserKind {
    fn parse(name: &str, field: &str) -> Result<Self> {
        match name {
            "integer" => Ok(Self::Integer),
            "decimal" | "money" => Ok(Self::Decimal),
            "percent" => Ok(Self::Percent),
            "qty_unit" => Ok(Self::QtyUnit),
            "code" => Ok(Self::Code),
            "strip_control" => Ok(Self::StripControl),
            other => Err(FakturError::ConfigError {
                stage: "field_mapper",
                field: field.to_string(),
                reason: format!("unknown parser '{other}'"),
            }),
        }
    }
}

/// UOM resolution sources, a closed set evaluated in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UomSource {
    /// In-row unit (from the quantity cell or a dedicated column).
    Row,
    /// Unit captured from a header cell suffix pattern.
    HeaderSuffix,
    /// Unit captured from a document-level pattern.
    DocPattern,
    /// Static default from the configuration.
    Default,
}

impl UomSource {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "row" => Ok(Self::Row),
            "header_suffix" => Ok(Self::HeaderSuffix),
            "doc_pattern" => Ok(Self::DocPattern),
            "default" => Ok(Self::Default),
            other => Err(FakturError::ConfigError {
                stage: "uom",
                field: "precedence".to_string(),
                reason: format!("unknown UOM source '{other}'"),
            }),
        }
    }
}

/// Discount resolution sources, evaluated in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    /// Discount stated on the row itself.
    Row,
    /// Document-level percentage discount.
    DocPercent,
    /// Document-level absolute discount.
    DocAmount,
}

impl DiscountSource {
    fn parse(name: &str) -> Result<Self> {
        match name {
            "row" => Ok(Self::Row),
            "doc_percent" => Ok(Self::DocPercent),
            "doc_amount" => Ok(Self::DocAmount),
            other => Err(FakturError::ConfigError {
                stage: "discount",
                field: "precedence".to_string(),
                reason: format!("unknown discount source '{other}'"),
            }),
        }
    }
}

/// Where the rounding residual of a prorated discount goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileStrategy {
    /// Add the residual to the line with the largest base.
    LargestLine,
    /// Add the residual to the first line.
    FirstLine,
}

/// Header match kinds, a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderMatchKind {
    /// Substring match.
    Contains,
    /// Whole-value match.
    Equals,
    /// Regex match; capture group 1 (or the whole match) is the value.
    Regex,
}

/// Compiled mapping rule for one line-item field.
#[derive(Debug)]
pub struct CompiledField {
    /// Semantic field name.
    pub name: String,
    /// Compiled header synonyms.
    pub header_synonyms: Vec<Regex>,
    /// Positional fallback range.
    pub position_hint: Option<PositionHint>,
    /// Parser chain.
    pub parsers: Vec<ParserKind>,
    /// Whether the field must map to a column.
    pub required: bool,
    /// Whether continuation rows append into this field.
    pub merge: bool,
}

/// Compiled UOM rules.
#[derive(Debug)]
pub struct CompiledUom {
    /// Evaluation order.
    pub precedence: Vec<UomSource>,
    /// Header suffix patterns, each with a `unit` group.
    pub header_suffix_patterns: Vec<Regex>,
    /// Document-level patterns, each with a `unit` group.
    pub doc_patterns: Vec<Regex>,
    /// Static default.
    pub default: Option<String>,
}

/// Compiled discount rules.
#[derive(Debug)]
pub struct CompiledDiscount {
    /// Evaluation order.
    pub precedence: Vec<DiscountSource>,
    /// Document percent patterns, each with a `value` group.
    pub doc_percent_patterns: Vec<Regex>,
    /// Document amount patterns, each with a `value` group.
    pub doc_amount_patterns: Vec<Regex>,
    /// Per-line rounding decimals.
    pub rounding: u32,
    /// Residual reconciliation strategy.
    pub reconcile: ReconcileStrategy,
}

/// Compiled header field rule.
#[derive(Debug)]
pub struct CompiledHeaderField {
    /// Field name (`invoice_number`, `buyer_name`, ...).
    pub name: String,
    /// Match kind.
    pub match_kind: HeaderMatchKind,
    /// Literal pattern text (contains/equals).
    pub literal: String,
    /// Compiled regex (regex kind only).
    pub regex: Option<Regex>,
    /// Anchor label to search near, if any.
    pub alias: Option<String>,
    /// Case-sensitive matching.
    pub case_sensitive: bool,
}

/// Compiled header extraction rules.
#[derive(Debug)]
pub struct CompiledHeader {
    /// Pages to scan.
    pub pages: Vec<u32>,
    /// Row scan limit per page.
    pub search_row_limit: usize,
    /// Rules in deterministic (name) order.
    pub fields: Vec<CompiledHeaderField>,
}

/// One resolved totals source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TotalsSource {
    /// Value printed in the footer band.
    Printed(String),
    /// Value computed by the derived-totals formula.
    Computed(String),
}

/// Fully compiled, immutable template. Safe to share read-only across
/// parallel document runs.
#[derive(Debug)]
pub struct CompiledTemplate {
    /// Line-item field rules in deterministic (name) order.
    pub fields: Vec<CompiledField>,
    /// UOM rules.
    pub uom: CompiledUom,
    /// Discount rules.
    pub discount: CompiledDiscount,
    /// Row exclusion patterns.
    pub row_filters: Vec<Regex>,
    /// Monetary decimals at export.
    pub currency_decimals: u32,
    /// Arithmetic tolerances.
    pub tolerances: TolerancesConfig,
    /// Header extraction rules.
    pub header: CompiledHeader,
    /// Ordered totals fallback chains, in deterministic (name) order.
    pub totals: Vec<(String, Vec<TotalsSource>)>,
    /// Template defaults.
    pub defaults: TemplateDefaults,
}

fn compile_regex(
    pattern: &str,
    case_sensitive: bool,
    stage: &'static str,
    field: &str,
) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|source| FakturError::PatternError {
            stage,
            field: field.to_string(),
            source,
        })
}

fn require_capture_group(
    re: &Regex,
    group: &str,
    stage: &'static str,
    field: &str,
) -> Result<()> {
    if re.capture_names().flatten().any(|name| name == group) {
        Ok(())
    } else {
        Err(FakturError::ConfigError {
            stage,
            field: field.to_string(),
            reason: format!("missing named capture group '{group}'"),
        })
    }
}

impl TemplateConfig {
    /// Parse a template document from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| FakturError::SchemaError {
            reason: e.to_string(),
        })
    }

    /// Compile the raw configuration into an immutable rule set.
    ///
    /// All regexes are compiled, capture groups verified, and precedence
    /// names resolved here; document processing never touches raw
    /// configuration strings again.
    pub fn compile(&self) -> Result<CompiledTemplate> {
        // Line-item fields (BTreeMap iteration is already name-ordered).
        let mut fields = Vec::with_capacity(self.fields.len());
        for (name, raw) in &self.fields {
            let mut header_synonyms = Vec::with_capacity(raw.header_synonyms.len());
            for (i, syn) in raw.header_synonyms.iter().enumerate() {
                let label = format!("fields.{name}.header_synonyms[{i}]");
                header_synonyms.push(compile_regex(syn, false, "field_mapper", &label)?);
            }
            if let Some(hint) = raw.position_hint {
                if !(0.0..=1.0).contains(&hint.x0)
                    || !(0.0..=1.0).contains(&hint.x1)
                    || hint.x0 >= hint.x1
                {
                    return Err(FakturError::ConfigError {
                        stage: "field_mapper",
                        field: format!("fields.{name}.position_hint"),
                        reason: format!(
                            "expected 0 <= x0 < x1 <= 1, got [{}, {}]",
                            hint.x0, hint.x1
                        ),
                    });
                }
            }
            let mut parsers = Vec::with_capacity(raw.parsers.len());
            for parser in &raw.parsers {
                parsers.push(ParserKind::parse(parser, &format!("fields.{name}.parsers"))?);
            }
            fields.push(CompiledField {
                name: name.clone(),
                header_synonyms,
                position_hint: raw.position_hint,
                parsers,
                required: raw.required,
                merge: raw.merge,
            });
        }

        // UOM rules.
        let mut uom_precedence = Vec::with_capacity(self.uom.precedence.len());
        for source in &self.uom.precedence {
            uom_precedence.push(UomSource::parse(source)?);
        }
        let mut header_suffix_patterns = Vec::new();
        for (i, pat) in self.uom.header_suffix_patterns.iter().enumerate() {
            let label = format!("uom.header_suffix_patterns[{i}]");
            let re = compile_regex(pat, false, "uom", &label)?;
            require_capture_group(&re, "unit", "uom", &label)?;
            header_suffix_patterns.push(re);
        }
        let mut doc_patterns = Vec::new();
        for (i, pat) in self.uom.doc_patterns.iter().enumerate() {
            let label = format!("uom.doc_patterns[{i}]");
            let re = compile_regex(pat, false, "uom", &label)?;
            require_capture_group(&re, "unit", "uom", &label)?;
            doc_patterns.push(re);
        }

        // Discount rules.
        let mut discount_precedence = Vec::with_capacity(self.discount.precedence.len());
        for source in &self.discount.precedence {
            discount_precedence.push(DiscountSource::parse(source)?);
        }
        let mut doc_percent_patterns = Vec::new();
        for (i, pat) in self.discount.doc_percent_patterns.iter().enumerate() {
            let label = format!("discount.doc_percent_patterns[{i}]");
            let re = compile_regex(pat, false, "discount", &label)?;
            require_capture_group(&re, "value", "discount", &label)?;
            doc_percent_patterns.push(re);
        }
        let mut doc_amount_patterns = Vec::new();
        for (i, pat) in self.discount.doc_amount_patterns.iter().enumerate() {
            let label = format!("discount.doc_amount_patterns[{i}]");
            let re = compile_regex(pat, false, "discount", &label)?;
            require_capture_group(&re, "value", "discount", &label)?;
            doc_amount_patterns.push(re);
        }
        let reconcile = match self.discount.reconcile.as_str() {
            "largest_line" => ReconcileStrategy::LargestLine,
            "first_line" => ReconcileStrategy::FirstLine,
            other => {
                return Err(FakturError::ConfigError {
                    stage: "discount",
                    field: "reconcile".to_string(),
                    reason: format!("unknown reconcile strategy '{other}'"),
                })
            }
        };

        // Row filters.
        let mut row_filters = Vec::with_capacity(self.row_filters.len());
        for (i, pat) in self.row_filters.iter().enumerate() {
            row_filters.push(compile_regex(
                pat,
                false,
                "line_item_builder",
                &format!("row_filters[{i}]"),
            )?);
        }

        // Header rules.
        let mut header_fields = Vec::with_capacity(self.header.fields.len());
        for (name, raw) in &self.header.fields {
            let match_kind = match raw.match_kind.as_str() {
                "contains" => HeaderMatchKind::Contains,
                "equals" => HeaderMatchKind::Equals,
                "regex" => HeaderMatchKind::Regex,
                other => {
                    return Err(FakturError::ConfigError {
                        stage: "header_fields",
                        field: format!("header.fields.{name}.match"),
                        reason: format!("unknown match kind '{other}'"),
                    })
                }
            };
            let regex = if match_kind == HeaderMatchKind::Regex {
                Some(compile_regex(
                    &raw.pattern,
                    raw.case_sensitive,
                    "header_fields",
                    &format!("header.fields.{name}.pattern"),
                )?)
            } else {
                None
            };
            header_fields.push(CompiledHeaderField {
                name: name.clone(),
                match_kind,
                literal: raw.pattern.clone(),
                regex,
                alias: raw.alias.clone(),
                case_sensitive: raw.case_sensitive,
            });
        }

        // Totals fallback chains.
        let mut totals = Vec::with_capacity(self.totals.fields.len());
        for (name, paths) in &self.totals.fields {
            let mut sources = Vec::with_capacity(paths.len());
            for path in paths {
                let source = if let Some(rest) = path.strip_prefix("printed.") {
                    TotalsSource::Printed(rest.to_string())
                } else if let Some(rest) = path.strip_prefix("computed.") {
                    TotalsSource::Computed(rest.to_string())
                } else {
                    return Err(FakturError::ConfigError {
                        stage: "validator",
                        field: format!("totals.fields.{name}"),
                        reason: format!(
                            "source path '{path}' must start with 'printed.' or 'computed.'"
                        ),
                    });
                };
                sources.push(source);
            }
            totals.push((name.clone(), sources));
        }

        if self.defaults.tax_base_factor.den == 0.0 {
            return Err(FakturError::ConfigError {
                stage: "validator",
                field: "defaults.tax_base_factor".to_string(),
                reason: "denominator must be non-zero".to_string(),
            });
        }

        log::debug!(
            "compiled template: {} field rule(s), {} header rule(s), {} row filter(s)",
            fields.len(),
            header_fields.len(),
            row_filters.len()
        );

        Ok(CompiledTemplate {
            fields,
            uom: CompiledUom {
                precedence: uom_precedence,
                header_suffix_patterns,
                doc_patterns,
                default: self.uom.default.clone(),
            },
            discount: CompiledDiscount {
                precedence: discount_precedence,
                doc_percent_patterns,
                doc_amount_patterns,
                rounding: self.discount.rounding,
                reconcile,
            },
            row_filters,
            currency_decimals: self.currency_decimals,
            tolerances: self.tolerances,
            header: CompiledHeader {
                pages: self.header.pages.clone(),
                search_row_limit: self.header.search_row_limit,
                fields: header_fields,
            },
            totals,
            defaults: self.defaults.clone(),
        })
    }
}

impl CompiledTemplate {
    /// Look up a compiled line-item field rule by name.
    #[must_use = "returns the field rule, if configured"]
    pub fn field(&self, name: &str) -> Option<&CompiledField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config_json() -> String {
        r#"{
            "fields": {
                "qty": {
                    "header_synonyms": ["\\bqty\\b", "quantity"],
                    "parsers": ["qty_unit"],
                    "required": true
                },
                "description": {
                    "header_synonyms": ["description"],
                    "position_hint": {"x0": 0.1, "x1": 0.5},
                    "merge": true
                }
            },
            "uom": {
                "header_suffix_patterns": ["\\((?P<unit>[A-Z]{2,4})\\)"]
            },
            "discount": {
                "doc_percent_patterns": ["discount\\s*(?P<value>\\d+)%"]
            },
            "row_filters": ["^total"],
            "header": {
                "fields": {
                    "invoice_number": {
                        "match": "regex",
                        "pattern": "invoice\\s*no\\.?\\s*:?\\s*(\\S+)"
                    }
                }
            },
            "totals": {
                "fields": {
                    "subtotal": ["printed.subtotal", "computed.subtotal"]
                }
            }
        }"#
        .to_string()
    }

    #[test]
    fn test_minimal_config_compiles() {
        let config = TemplateConfig::from_json(&minimal_config_json()).unwrap();
        let compiled = config.compile().unwrap();
        assert_eq!(compiled.fields.len(), 2);
        assert_eq!(
            compiled.uom.precedence,
            vec![
                UomSource::Row,
                UomSource::HeaderSuffix,
                UomSource::DocPattern,
                UomSource::Default
            ]
        );
        assert_eq!(compiled.discount.reconcile, ReconcileStrategy::LargestLine);
        assert_eq!(compiled.currency_decimals, 2);
        assert_eq!(compiled.totals[0].0, "subtotal");
        assert_eq!(
            compiled.totals[0].1,
            vec![
                TotalsSource::Printed("subtotal".to_string()),
                TotalsSource::Computed("subtotal".to_string())
            ]
        );
    }

    #[test]
    fn test_uom_pattern_requires_unit_group() {
        let mut config = TemplateConfig::from_json(&minimal_config_json()).unwrap();
        config.uom.header_suffix_patterns = vec!["\\(([A-Z]+)\\)".to_string()];
        let err = config.compile().unwrap_err();
        assert!(err.to_string().contains("unit"));
    }

    #[test]
    fn test_invalid_regex_is_fatal_with_field_name() {
        let mut config = TemplateConfig::from_json(&minimal_config_json()).unwrap();
        config.row_filters = vec!["(unclosed".to_string()];
        let err = config.compile().unwrap_err();
        assert!(err.to_string().contains("row_filters[0]"));
    }

    #[test]
    fn test_unknown_parser_rejected() {
        let mut config = TemplateConfig::from_json(&minimal_config_json()).unwrap();
        config
            .fields
            .get_mut("qty")
            .unwrap()
            .parsers
            .push("fancy".to_string());
        let err = config.compile().unwrap_err();
        assert!(err.to_string().contains("fancy"));
    }

    #[test]
    fn test_unknown_totals_source_rejected() {
        let mut config = TemplateConfig::from_json(&minimal_config_json()).unwrap();
        config
            .totals
            .fields
            .insert("grand_total".to_string(), vec!["guessed.total".to_string()]);
        let err = config.compile().unwrap_err();
        assert!(err.to_string().contains("guessed.total"));
    }

    #[test]
    fn test_position_hint_bounds_checked() {
        let mut config = TemplateConfig::from_json(&minimal_config_json()).unwrap();
        config.fields.get_mut("description").unwrap().position_hint =
            Some(PositionHint { x0: 0.5, x1: 0.2 });
        assert!(config.compile().is_err());
    }
}
