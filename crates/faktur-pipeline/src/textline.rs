//! Logical text lines: tokens clustered by vertical position.
//!
//! Several stages reason about "the same printed line" — anchor
//! detection, header field extraction, printed-totals scanning. This
//! module clusters a token subset into [`TextLine`]s by y-center
//! proximity and keeps per-token character spans inside the joined line
//! text, so a regex match span can be mapped back to the tokens that
//! produced it.

use faktur_core::{BoundingBox, Token, TokenId};

/// One logical line of tokens on a page.
#[derive(Debug, Clone)]
pub struct TextLine {
    /// Page the line is on.
    pub page: u32,
    /// Member tokens, left to right.
    pub token_ids: Vec<TokenId>,
    /// Union box of the member tokens.
    pub bbox: BoundingBox,
    /// Member texts joined with single spaces.
    pub text: String,
    /// Byte span of each member token inside `text`, parallel to
    /// `token_ids`.
    pub char_spans: Vec<(usize, usize)>,
}

impl TextLine {
    /// Tokens whose span intersects `[start, end)` of the line text.
    #[must_use = "returns the token ids overlapping the span"]
    pub fn tokens_in_span(&self, start: usize, end: usize) -> Vec<TokenId> {
        self.token_ids
            .iter()
            .zip(&self.char_spans)
            .filter(|(_, (s, e))| *s < end && *e > start)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Bounding box covering only the tokens in `[start, end)`.
    #[must_use = "returns the union box of the span tokens"]
    pub fn span_bbox(&self, start: usize, end: usize, tokens: &[Token]) -> Option<BoundingBox> {
        let ids = self.tokens_in_span(start, end);
        let mut bbox: Option<BoundingBox> = None;
        for id in ids {
            let b = tokens[id.index()].bbox;
            bbox = Some(match bbox {
                Some(acc) => acc.union(&b),
                None => b,
            });
        }
        bbox
    }
}

/// Median token height of a set, used as the line clustering scale.
fn median_height(tokens: &[Token], ids: &[TokenId]) -> f64 {
    let mut heights: Vec<f64> = ids
        .iter()
        .map(|id| tokens[id.index()].bbox.height())
        .collect();
    if heights.is_empty() {
        return 0.015;
    }
    heights.sort_by(f64::total_cmp);
    heights[heights.len() / 2]
}

/// Cluster a token subset into logical lines.
///
/// Tokens are sorted in reading order first; a new line starts whenever
/// the page changes or a token's y-center departs from the running line
/// center by more than 60% of the median token height. The clustering is
/// purely positional and fully deterministic.
#[must_use = "returns the clustered lines"]
pub fn cluster_lines(tokens: &[Token], ids: &[TokenId]) -> Vec<TextLine> {
    if ids.is_empty() {
        return Vec::new();
    }
    let mut ordered: Vec<TokenId> = ids.to_vec();
    faktur_core::sort_reading_order(tokens, &mut ordered);

    let threshold = (median_height(tokens, ids) * 0.6).max(0.004);

    let mut lines: Vec<Vec<TokenId>> = Vec::new();
    let mut current: Vec<TokenId> = vec![ordered[0]];
    let mut current_center = tokens[ordered[0].index()].bbox.y_center();
    let mut current_page = tokens[ordered[0].index()].page;

    for &id in ordered.iter().skip(1) {
        let token = &tokens[id.index()];
        let center = token.bbox.y_center();
        if token.page != current_page || (center - current_center).abs() > threshold {
            lines.push(std::mem::take(&mut current));
            current_center = center;
            current_page = token.page;
        } else {
            // Running mean keeps slightly sloped lines together.
            let n = current.len() as f64;
            current_center = (current_center * n + center) / (n + 1.0);
        }
        current.push(id);
    }
    lines.push(current);

    lines
        .into_iter()
        .map(|mut member_ids| {
            // Left to right within the line.
            member_ids
                .sort_by(|a, b| tokens[a.index()].bbox.x0.total_cmp(&tokens[b.index()].bbox.x0));
            let mut text = String::new();
            let mut char_spans = Vec::with_capacity(member_ids.len());
            let mut bbox = tokens[member_ids[0].index()].bbox;
            for (i, id) in member_ids.iter().enumerate() {
                let token = &tokens[id.index()];
                bbox = bbox.union(&token.bbox);
                if i > 0 {
                    text.push(' ');
                }
                let start = text.len();
                text.push_str(token.text.trim());
                char_spans.push((start, text.len()));
            }
            TextLine {
                page: tokens[member_ids[0].index()].page,
                token_ids: member_ids,
                bbox,
                text,
                char_spans,
            }
        })
        .collect()
}

/// Cluster every token of a page into lines.
#[must_use = "returns the clustered lines"]
pub fn cluster_page_lines(tokens: &[Token], page: u32) -> Vec<TextLine> {
    let ids: Vec<TokenId> = tokens
        .iter()
        .filter(|t| t.page == page)
        .map(|t| t.id)
        .collect();
    cluster_lines(tokens, &ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(id: u32, x: f64, y: f64, text: &str) -> Token {
        Token {
            id: TokenId(id),
            page: 0,
            text: text.to_string(),
            bbox: BoundingBox::new(x, y, x + 0.08, y + 0.02),
        }
    }

    #[test]
    fn test_two_lines_cluster_separately() {
        let tokens = vec![
            token(0, 0.1, 0.10, "QTY"),
            token(1, 0.4, 0.10, "PRICE"),
            token(2, 0.1, 0.20, "30"),
            token(3, 0.4, 0.20, "218"),
        ];
        let ids: Vec<TokenId> = tokens.iter().map(|t| t.id).collect();
        let lines = cluster_lines(&tokens, &ids);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "QTY PRICE");
        assert_eq!(lines[1].text, "30 218");
    }

    #[test]
    fn test_span_maps_back_to_tokens() {
        let tokens = vec![
            token(0, 0.1, 0.1, "Invoice"),
            token(1, 0.2, 0.1, "No:"),
            token(2, 0.3, 0.1, "INV-001"),
        ];
        let ids: Vec<TokenId> = tokens.iter().map(|t| t.id).collect();
        let lines = cluster_lines(&tokens, &ids);
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line.text, "Invoice No: INV-001");
        let pos = line.text.find("INV-001").unwrap();
        let hit = line.tokens_in_span(pos, pos + 7);
        assert_eq!(hit, vec![TokenId(2)]);
    }

    #[test]
    fn test_slightly_jittered_tokens_stay_on_one_line() {
        let tokens = vec![
            token(0, 0.1, 0.100, "a"),
            token(1, 0.3, 0.103, "b"),
            token(2, 0.5, 0.098, "c"),
        ];
        let ids: Vec<TokenId> = tokens.iter().map(|t| t.id).collect();
        let lines = cluster_lines(&tokens, &ids);
        assert_eq!(lines.len(), 1);
    }
}
