//! Token model — the only source of text in the pipeline.
//!
//! Tokens are produced by an external tokenizer collaborator and never
//! mutated afterwards. Every downstream structure refers to tokens by
//! [`TokenId`] (an arena index into the run's token slice); nothing ever
//! holds a back-pointer from a token to a derived field, so provenance
//! stays one-directional and cycle-free.

use crate::geometry::BoundingBox;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Arena index of a token within one pipeline run.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TokenId(pub u32);

impl TokenId {
    /// Index into the run's token slice.
    #[inline]
    #[must_use = "returns the arena index"]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A positioned unit of extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Arena id, equal to the token's position in the run slice.
    pub id: TokenId,
    /// Zero-based page number.
    pub page: u32,
    /// Extracted text, exactly as the tokenizer produced it.
    pub text: String,
    /// Normalized bounding box, top-left origin.
    pub bbox: BoundingBox,
}

impl Token {
    /// Reading-order comparison: `(page, y_top, x_left)`.
    #[must_use = "returns the reading-order comparison"]
    pub fn reading_order_cmp(&self, other: &Self) -> Ordering {
        self.page
            .cmp(&other.page)
            .then(self.bbox.y0.total_cmp(&other.bbox.y0))
            .then(self.bbox.x0.total_cmp(&other.bbox.x0))
    }
}

/// Sort token indices into reading order `(page, y_top, x_left)`.
///
/// The sort is stable and uses `total_cmp`, so identical inputs always
/// produce identical orderings — part of the determinism contract.
pub fn sort_reading_order(tokens: &[Token], indices: &mut [TokenId]) {
    indices.sort_by(|a, b| tokens[a.index()].reading_order_cmp(&tokens[b.index()]));
}

/// Join token texts in reading order with single spaces.
#[must_use = "returns the joined text"]
pub fn join_in_reading_order(tokens: &[Token], ids: &[TokenId]) -> String {
    let mut ordered: Vec<TokenId> = ids.to_vec();
    sort_reading_order(tokens, &mut ordered);
    let mut out = String::new();
    for id in ordered {
        let text = tokens[id.index()].text.trim();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(text);
    }
    out
}
