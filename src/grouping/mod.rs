//! Presentation grouping for a report. Pure: no storage, no clock.

pub mod algorithm;
pub mod types;

pub use algorithm::group_comparisons;
pub use types::{BrowserVariants, ComparisonGroup, GroupingStrategy, ViewportVariants};
