//! Geometry primitives shared by every pipeline stage.
//!
//! All coordinates are normalized to `[0, 1]` with a top-left origin:
//! `y` increases downward, so a page header has a smaller `y0` than the
//! footer. Tokens, bands, candidate regions, and grid cells all use the
//! same [`BoundingBox`] type so overlap math is uniform across stages.

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in normalized page coordinates.
///
/// Invariant expected by callers: `x0 <= x1` and `y0 <= y1`. The overlap
/// helpers normalize defensively so an inverted box degrades to a zero
/// area instead of a negative one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left edge.
    pub x0: f64,
    /// Top edge.
    pub y0: f64,
    /// Right edge.
    pub x1: f64,
    /// Bottom edge.
    pub y1: f64,
}

impl BoundingBox {
    /// Create a new box from edge coordinates.
    #[inline]
    #[must_use = "returns the constructed bounding box"]
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Box width.
    #[inline]
    #[must_use = "returns the width of the box"]
    pub fn width(&self) -> f64 {
        (self.x1 - self.x0).abs()
    }

    /// Box height.
    #[inline]
    #[must_use = "returns the height of the box"]
    pub fn height(&self) -> f64 {
        (self.y1 - self.y0).abs()
    }

    /// Box area.
    #[inline]
    #[must_use = "returns the area of the box"]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Horizontal center.
    #[inline]
    #[must_use = "returns the x center"]
    pub fn x_center(&self) -> f64 {
        (self.x0 + self.x1) / 2.0
    }

    /// Vertical center.
    #[inline]
    #[must_use = "returns the y center"]
    pub fn y_center(&self) -> f64 {
        (self.y0 + self.y1) / 2.0
    }

    /// Whether a point lies inside the box (edges inclusive).
    #[inline]
    #[must_use = "returns whether the point is inside"]
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    /// Intersection area with another box.
    #[must_use = "returns the intersection area"]
    pub fn intersection_area(&self, other: &Self) -> f64 {
        let x_overlap = (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0);
        let y_overlap = (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0);
        x_overlap * y_overlap
    }

    /// Overlap fraction from this box's perspective.
    #[must_use = "returns the overlap fraction relative to this box"]
    pub fn intersection_over_self(&self, other: &Self) -> f64 {
        let area = self.area();
        if area <= 0.0 {
            return 0.0;
        }
        self.intersection_area(other) / area
    }

    /// Whether the two boxes share any horizontal extent.
    #[inline]
    #[must_use = "returns whether boxes overlap horizontally"]
    pub fn overlaps_horizontally(&self, other: &Self) -> bool {
        !(self.x1 <= other.x0 || other.x1 <= self.x0)
    }

    /// Whether the two boxes share any vertical extent.
    #[inline]
    #[must_use = "returns whether boxes overlap vertically"]
    pub fn overlaps_vertically(&self, other: &Self) -> bool {
        !(self.y1 <= other.y0 || other.y1 <= self.y0)
    }

    /// Smallest box covering both boxes.
    #[must_use = "returns the union box"]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Grow the box by `factor` of its own size in every direction,
    /// clamped to the unit page.
    #[must_use = "returns the inflated box"]
    pub fn inflated(&self, factor: f64) -> Self {
        let dx = self.width() * factor;
        let dy = self.height() * factor;
        Self {
            x0: (self.x0 - dx).max(0.0),
            y0: (self.y0 - dy).max(0.0),
            x1: (self.x1 + dx).min(1.0),
            y1: (self.y1 + dy).min(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_area_and_centers() {
        let b = BoundingBox::new(0.1, 0.2, 0.5, 0.4);
        assert!((b.area() - 0.08).abs() < 1e-12);
        assert!((b.x_center() - 0.3).abs() < 1e-12);
        assert!((b.y_center() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_intersection() {
        let a = BoundingBox::new(0.0, 0.0, 0.5, 0.5);
        let b = BoundingBox::new(0.25, 0.25, 0.75, 0.75);
        assert!((a.intersection_area(&b) - 0.0625).abs() < 1e-12);
        assert!((a.intersection_over_self(&b) - 0.25).abs() < 1e-12);

        let disjoint = BoundingBox::new(0.6, 0.6, 0.9, 0.9);
        assert_eq!(a.intersection_area(&disjoint), 0.0);
    }

    #[rstest]
    #[case(0.15, 0.15, true)]
    #[case(0.1, 0.2, true)]
    #[case(0.05, 0.15, false)]
    #[case(0.15, 0.25, false)]
    fn test_contains_point(#[case] x: f64, #[case] y: f64, #[case] inside: bool) {
        let b = BoundingBox::new(0.1, 0.1, 0.2, 0.2);
        assert_eq!(b.contains_point(x, y), inside);
    }

    #[test]
    fn test_inflated_clamps_to_page() {
        let b = BoundingBox::new(0.0, 0.9, 1.0, 1.0);
        let inflated = b.inflated(0.5);
        assert_eq!(inflated.x0, 0.0);
        assert_eq!(inflated.x1, 1.0);
        assert_eq!(inflated.y1, 1.0);
        assert!(inflated.y0 < 0.9);
    }

    #[test]
    fn test_union() {
        let a = BoundingBox::new(0.1, 0.1, 0.2, 0.2);
        let b = BoundingBox::new(0.3, 0.05, 0.4, 0.15);
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(0.1, 0.05, 0.4, 0.2));
    }
}
