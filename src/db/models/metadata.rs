use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum MetadataKey {
    Baseline,
    Hotspot,
    Region,
    BaselineBuild,
}

impl MetadataKey {
    pub const ALL: [MetadataKey; 4] = [
        MetadataKey::Baseline,
        MetadataKey::Hotspot,
        MetadataKey::Region,
        MetadataKey::BaselineBuild,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataKey::Baseline => "baseline",
            MetadataKey::Hotspot => "hotspot",
            MetadataKey::Region => "region",
            MetadataKey::BaselineBuild => "baseline_build",
        }
    }
}

impl fmt::Display for MetadataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_version() -> u32 {
    BUNDLE_VERSION
}

/// Versioned envelope for one category of auxiliary metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBundle {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub downloaded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Value,
    #[serde(default)]
    pub payload: Value,
}

impl MetadataBundle {
    pub fn new(downloaded_at: Option<DateTime<Utc>>, summary: Value, payload: Value) -> Self {
        Self {
            version: BUNDLE_VERSION,
            downloaded_at,
            summary,
            payload,
        }
    }
}
