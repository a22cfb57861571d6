//! Line-item extraction: column mapping, cell parsing, UOM and discount
//! resolution, and row-to-item assembly.

pub mod builder;
pub mod discount;
pub mod mapper;
pub mod parsers;
pub mod uom;

pub use builder::{build_items, BuiltItems, ItemsStats};
pub use discount::{allocate, DiscountInput, DiscountLine, DocDiscount};
pub use mapper::{map_columns, ColumnMap};
pub use parsers::{apply_parsers, ParsedCell};
pub use uom::{resolve_uom, UomEvidence};
