//! Dispatch table for the four metadata bundles.
//!
//! Each [`MetadataKey`] maps to one [`MetadataCodec`] naming its legacy file, its one-time import
//! marker, and the functions that turn stored or legacy JSON into a [`MetadataBundle`] and back.
//! Adding a key without a codec fails to compile.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};

use crate::db::models::{MetadataBundle, MetadataKey};

pub struct MetadataCodec {
    pub key: MetadataKey,
    /// Path relative to the state directory.
    pub legacy_file: &'static str,
    pub legacy_marker: &'static str,
    pub decode: fn(Value) -> Result<MetadataBundle>,
    pub encode: fn(&MetadataBundle) -> Result<Value>,
}

const BASELINE: MetadataCodec = MetadataCodec {
    key: MetadataKey::Baseline,
    legacy_file: "baselines/metadata.json",
    legacy_marker: "metadata:baseline",
    decode: decode_baseline,
    encode: encode_object_payload,
};

const HOTSPOT: MetadataCodec = MetadataCodec {
    key: MetadataKey::Hotspot,
    legacy_file: "hotspots.json",
    legacy_marker: "metadata:hotspot",
    decode: decode_hotspot,
    encode: encode_any_payload,
};

const REGION: MetadataCodec = MetadataCodec {
    key: MetadataKey::Region,
    legacy_file: "regions.json",
    legacy_marker: "metadata:region",
    decode: decode_region,
    encode: encode_any_payload,
};

const BASELINE_BUILD: MetadataCodec = MetadataCodec {
    key: MetadataKey::BaselineBuild,
    legacy_file: "baseline-build.json",
    legacy_marker: "metadata:baseline_build",
    decode: decode_baseline_build,
    encode: encode_object_payload,
};

pub fn codec(key: MetadataKey) -> &'static MetadataCodec {
    match key {
        MetadataKey::Baseline => &BASELINE,
        MetadataKey::Hotspot => &HOTSPOT,
        MetadataKey::Region => &REGION,
        MetadataKey::BaselineBuild => &BASELINE_BUILD,
    }
}

fn is_envelope(fields: &Map<String, Value>) -> bool {
    fields.contains_key("payload")
}

fn decode_envelope(value: Value) -> Result<MetadataBundle> {
    serde_json::from_value(value).context("malformed metadata envelope")
}

fn expect_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(anyhow!("expected a JSON object, got {other}")),
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds.
fn timestamp_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|key| match fields.get(*key)? {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(number) => number
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    })
}

fn decode_baseline(value: Value) -> Result<MetadataBundle> {
    let fields = expect_object(value)?;
    if is_envelope(&fields) {
        return decode_envelope(Value::Object(fields));
    }

    let screenshot_count = fields
        .get("screenshots")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    let summary = json!({
        "buildId": fields.get("buildId").cloned().unwrap_or(Value::Null),
        "buildName": fields.get("buildName").cloned().unwrap_or(Value::Null),
        "screenshotCount": screenshot_count,
    });
    let downloaded_at = timestamp_field(&fields, &["downloadedAt", "createdAt"]);
    Ok(MetadataBundle::new(
        downloaded_at,
        summary,
        Value::Object(fields),
    ))
}

/// Legacy analysis files look like `{downloadedAt, summary, <section>: {...}}`.
fn decode_sectioned(value: Value, section: &str) -> Result<MetadataBundle> {
    let mut fields = expect_object(value)?;
    if is_envelope(&fields) {
        return decode_envelope(Value::Object(fields));
    }

    let downloaded_at = timestamp_field(&fields, &["downloadedAt", "downloaded_at"]);
    let summary = fields.remove("summary").unwrap_or(Value::Null);
    let payload = match fields.remove(section) {
        Some(section_payload) => section_payload,
        None => {
            fields.remove("downloadedAt");
            fields.remove("downloaded_at");
            Value::Object(fields)
        }
    };
    Ok(MetadataBundle::new(downloaded_at, summary, payload))
}

fn decode_hotspot(value: Value) -> Result<MetadataBundle> {
    decode_sectioned(value, "hotspots")
}

fn decode_region(value: Value) -> Result<MetadataBundle> {
    decode_sectioned(value, "regions")
}

fn decode_baseline_build(value: Value) -> Result<MetadataBundle> {
    let fields = expect_object(value)?;
    if is_envelope(&fields) {
        return decode_envelope(Value::Object(fields));
    }

    let build_id = fields
        .get("buildId")
        .or_else(|| fields.get("id"))
        .cloned()
        .unwrap_or(Value::Null);
    let summary = json!({
        "buildId": build_id,
        "name": fields.get("name").or_else(|| fields.get("buildName")).cloned().unwrap_or(Value::Null),
    });
    let downloaded_at = timestamp_field(&fields, &["downloadedAt", "createdAt"]);
    Ok(MetadataBundle::new(
        downloaded_at,
        summary,
        Value::Object(fields),
    ))
}

fn encode_envelope(bundle: &MetadataBundle) -> Result<Value> {
    serde_json::to_value(bundle).context("failed to encode metadata envelope")
}

fn encode_object_payload(bundle: &MetadataBundle) -> Result<Value> {
    if !bundle.payload.is_object() {
        bail!("payload must be a JSON object");
    }
    encode_envelope(bundle)
}

fn encode_any_payload(bundle: &MetadataBundle) -> Result<Value> {
    if !(bundle.payload.is_object() || bundle.payload.is_null()) {
        bail!("payload must be a JSON object or null");
    }
    encode_envelope(bundle)
}
