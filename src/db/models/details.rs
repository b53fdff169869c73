use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

/// Heavy diagnostic sidecar of one comparison.
///
/// Only built through [`DiffDiagnostics::into_details`], which yields `None` when every field is
/// empty, so a stored row always carries something worth showing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonDetails {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diff_clusters: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity_stats: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hotspot_analysis: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub confirmed_regions: Vec<Value>,
}

impl ComparisonDetails {
    pub fn has_diff_clusters(&self) -> bool {
        !self.diff_clusters.is_empty()
    }

    pub fn has_confirmed_regions(&self) -> bool {
        !self.confirmed_regions.is_empty()
    }
}

/// Loosely-populated diagnostics as produced by a differ or found in legacy files.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DiffDiagnostics {
    #[serde(default)]
    pub diff_clusters: Option<Vec<Value>>,
    #[serde(default)]
    pub intensity_stats: Option<Value>,
    #[serde(default)]
    pub bounding_box: Option<BoundingBox>,
    #[serde(default)]
    pub region_analysis: Option<Value>,
    #[serde(default)]
    pub hotspot_analysis: Option<Value>,
    #[serde(default)]
    pub confirmed_regions: Option<Vec<Value>>,
}

impl DiffDiagnostics {
    pub fn into_details(self) -> Option<ComparisonDetails> {
        let details = ComparisonDetails {
            diff_clusters: self.diff_clusters.unwrap_or_default(),
            intensity_stats: self.intensity_stats.filter(has_content),
            bounding_box: self.bounding_box,
            region_analysis: self.region_analysis.filter(has_content),
            hotspot_analysis: self.hotspot_analysis.filter(has_content),
            confirmed_regions: self.confirmed_regions.unwrap_or_default(),
        };

        let empty = details.diff_clusters.is_empty()
            && details.intensity_stats.is_none()
            && details.bounding_box.is_none()
            && details.region_analysis.is_none()
            && details.hotspot_analysis.is_none()
            && details.confirmed_regions.is_empty();

        if empty {
            None
        } else {
            Some(details)
        }
    }
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(fields) => !fields.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_diagnostics_produce_no_details() {
        let diagnostics = DiffDiagnostics {
            diff_clusters: Some(vec![]),
            intensity_stats: Some(json!({})),
            region_analysis: Some(Value::Null),
            ..Default::default()
        };
        assert!(diagnostics.into_details().is_none());
    }

    #[test]
    fn any_heavy_field_produces_details() {
        let details = DiffDiagnostics {
            confirmed_regions: Some(vec![json!({"x": 1})]),
            ..Default::default()
        }
        .into_details()
        .unwrap();
        assert!(details.has_confirmed_regions());
        assert!(!details.has_diff_clusters());
    }
}
