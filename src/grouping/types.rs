use serde::Serialize;

use crate::db::Comparison;

/// How a dashboard should lay out the variants of one group.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingStrategy {
    /// Single variant.
    Flat,
    /// More than one distinct browser.
    Browser,
    /// One browser, several viewports or devices.
    Viewport,
}

/// Comparisons sharing one viewport within a browser bucket. `None` is the explicit "missing" key.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewportVariants {
    pub viewport: Option<String>,
    pub comparisons: Vec<Comparison>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BrowserVariants {
    pub browser: Option<String>,
    pub viewports: Vec<ViewportVariants>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonGroup {
    pub name: String,
    /// Sorted by viewport area, largest first.
    pub comparisons: Vec<Comparison>,
    pub grouping_strategy: GroupingStrategy,
    pub variants: Vec<BrowserVariants>,
    pub browsers: Vec<String>,
    pub viewports: Vec<String>,
    pub devices: Vec<String>,
}

impl ComparisonGroup {
    pub fn variant_count(&self) -> usize {
        self.comparisons.len()
    }

    pub fn is_multi_variant(&self) -> bool {
        self.variant_count() > 1
    }
}
