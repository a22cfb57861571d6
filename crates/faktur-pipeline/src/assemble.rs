//! Final assembly: canonical JSON, artifact hashing, monetary rounding.
//!
//! The canonical form is serde_json's compact output over types whose
//! key order is fixed by construction (struct declaration order,
//! `BTreeMap`s for anything dynamic). Identical inputs therefore produce
//! byte-identical documents, which is what the manifest hashes attest.

use crate::numeric::round_half_up;
use faktur_core::{
    ConfidenceScore, FakturError, FinalDocument, HeaderFields, Issue, LineItem, Result,
    ValidationResult,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Output schema version stamped into document and manifest.
pub const SCHEMA_VERSION: &str = "1.0";

/// Serialize a value in canonical (compact, fixed-key-order) form.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(FakturError::SerializeError)
}

/// SHA-256 hex digest of a value's canonical form.
pub fn artifact_hash<T: Serialize>(value: &T) -> Result<String> {
    let json = to_canonical_json(value)?;
    let digest = Sha256::digest(json.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        hex.push_str(&format!("{byte:02x}"));
    }
    Ok(hex)
}

fn round_money(value: Option<f64>, decimals: u32) -> Option<f64> {
    value.map(|v| round_half_up(v, decimals))
}

/// Assemble the final document.
///
/// Monetary fields are rounded here, once, at the configured decimals;
/// quantities keep their source precision and percentages round at four
/// places. Provenance paths are `header.<field>` and `items.<index>`.
#[must_use = "returns the assembled document"]
pub fn assemble(
    currency_decimals: u32,
    header: HeaderFields,
    mut items: Vec<LineItem>,
    mut validation: ValidationResult,
    confidence: ConfidenceScore,
    builder_issues: Vec<Issue>,
) -> FinalDocument {
    let mut provenance: BTreeMap<String, Vec<faktur_core::TokenId>> = BTreeMap::new();
    for (field, ids) in &header.backrefs {
        if !ids.is_empty() {
            provenance.insert(format!("header.{field}"), ids.clone());
        }
    }

    for (index, item) in items.iter_mut().enumerate() {
        item.unit_price = round_money(item.unit_price, currency_decimals);
        item.amount = round_money(item.amount, currency_decimals);
        item.discount_amount = round_money(item.discount_amount, currency_decimals);
        item.discount_percent = item.discount_percent.map(|p| round_half_up(p, 4));
        if !item.backrefs.is_empty() {
            provenance.insert(format!("items.{index}"), item.backrefs.clone());
        }
    }

    let totals = &mut validation.totals;
    totals.subtotal = round_money(totals.subtotal, currency_decimals);
    totals.tax_base = round_money(totals.tax_base, currency_decimals);
    totals.tax_amount = round_money(totals.tax_amount, currency_decimals);
    totals.grand_total = round_money(totals.grand_total, currency_decimals);

    // Builder issues first (they arose earlier in the run), then
    // validation issues, giving one stable document-order list.
    let mut issues = builder_issues;
    issues.extend(validation.issues.iter().cloned());

    FinalDocument {
        schema_version: SCHEMA_VERSION.to_string(),
        header,
        items,
        validation,
        confidence,
        provenance,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faktur_core::TokenId;

    #[test]
    fn test_hash_is_stable_and_hex() {
        let item = LineItem { no: 1, description: "x".into(), ..LineItem::default() };
        let a = artifact_hash(&item).unwrap();
        let b = artifact_hash(&item).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let a = LineItem { no: 1, ..LineItem::default() };
        let b = LineItem { no: 2, ..LineItem::default() };
        assert_ne!(artifact_hash(&a).unwrap(), artifact_hash(&b).unwrap());
    }

    #[test]
    fn test_assemble_rounds_money_not_qty() {
        let items = vec![LineItem {
            no: 1,
            qty: Some(0.125),
            unit_price: Some(218_785.414),
            amount: Some(6_563_562.299),
            ..LineItem::default()
        }];
        let doc = assemble(
            2,
            HeaderFields::default(),
            items,
            ValidationResult::default(),
            ConfidenceScore::default(),
            Vec::new(),
        );
        assert_eq!(doc.items[0].qty, Some(0.125));
        assert_eq!(doc.items[0].unit_price, Some(218_785.41));
        assert_eq!(doc.items[0].amount, Some(6_563_562.30));
    }

    #[test]
    fn test_provenance_paths() {
        let mut header = HeaderFields::default();
        header.invoice_number = Some("INV-1".into());
        header
            .backrefs
            .insert("invoice_number".into(), vec![TokenId(3)]);
        let items = vec![LineItem {
            no: 1,
            backrefs: vec![TokenId(5), TokenId(6)],
            ..LineItem::default()
        }];
        let doc = assemble(
            2,
            header,
            items,
            ValidationResult::default(),
            ConfidenceScore::default(),
            Vec::new(),
        );
        assert_eq!(doc.provenance["header.invoice_number"], vec![TokenId(3)]);
        assert_eq!(doc.provenance["items.0"], vec![TokenId(5), TokenId(6)]);
    }
}
