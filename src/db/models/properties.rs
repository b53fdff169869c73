use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn label(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Canonical property bag attached to a comparison.
///
/// Callers send several shapes; [`Properties::normalize`] folds them into this one at the input
/// boundary so the rest of the crate never checks for alternatives.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Properties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(flatten)]
    pub custom: BTreeMap<String, Value>,
}

const WELL_KNOWN: [&str; 4] = ["browser", "device", "url", "selector"];
const WIDTH_KEYS: [&str; 2] = ["viewport_width", "viewportWidth"];
const HEIGHT_KEYS: [&str; 2] = ["viewport_height", "viewportHeight"];

impl Properties {
    /// Accepts `null`, a flat object, or an object wrapping the real bag under `properties`.
    /// Viewports may arrive as `{width, height}`, `"WxH"`, or flat `viewport_width/height`.
    pub fn normalize(raw: &Value) -> Result<Self, ValidationError> {
        let mut bag = match raw {
            Value::Null => return Ok(Self::default()),
            Value::Object(map) => map.clone(),
            other => {
                return Err(ValidationError::InvalidProperties(format!(
                    "expected an object, got {}",
                    json_kind(other)
                )))
            }
        };

        if let Some(Value::Object(inner)) = bag.remove("properties") {
            for (key, value) in inner {
                bag.insert(key, value);
            }
        }

        let viewport = take_viewport(&mut bag)?;

        let mut props = Self {
            viewport,
            ..Self::default()
        };
        for key in WELL_KNOWN {
            let value = take_string(&mut bag, key)?;
            match key {
                "browser" => props.browser = value,
                "device" => props.device = value,
                "url" => props.url = value,
                _ => props.selector = value,
            }
        }

        for (key, value) in bag {
            if key.trim().is_empty() {
                return Err(ValidationError::InvalidProperties(
                    "property keys must not be empty".into(),
                ));
            }
            if !value.is_null() {
                props.custom.insert(key, value);
            }
        }

        Ok(props)
    }

    pub fn viewport_label(&self) -> Option<String> {
        self.viewport.map(|viewport| viewport.label())
    }

    /// Stable identity of a logical screenshot across runs.
    pub fn signature(&self, name: &str, extra_keys: &[String]) -> String {
        let mut parts = vec![
            name.to_string(),
            self.viewport_label().unwrap_or_default(),
            self.browser.clone().unwrap_or_default(),
            self.device.clone().unwrap_or_default(),
        ];
        for key in extra_keys {
            parts.push(self.lookup(key).unwrap_or_default());
        }
        parts.join("|")
    }

    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "browser" => self.browser.clone(),
            "device" => self.device.clone(),
            "url" => self.url.clone(),
            "selector" => self.selector.clone(),
            "viewport" => self.viewport_label(),
            other => self.custom.get(other).map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }),
        }
    }
}

fn take_string(bag: &mut Map<String, Value>, key: &str) -> Result<Option<String>, ValidationError> {
    match bag.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(other) => Err(ValidationError::InvalidProperties(format!(
            "'{key}' must be a string, got {}",
            json_kind(&other)
        ))),
    }
}

fn take_viewport(bag: &mut Map<String, Value>) -> Result<Option<Viewport>, ValidationError> {
    let width = take_first(bag, &WIDTH_KEYS);
    let height = take_first(bag, &HEIGHT_KEYS);

    match bag.remove("viewport") {
        Some(Value::Object(fields)) => {
            let width = fields.get("width").cloned().unwrap_or(Value::Null);
            let height = fields.get("height").cloned().unwrap_or(Value::Null);
            viewport_from(&width, &height).map(Some)
        }
        Some(Value::String(label)) => parse_label(&label).map(Some),
        Some(Value::Null) | None => match (width, height) {
            (None, None) => Ok(None),
            (Some(width), Some(height)) => viewport_from(&width, &height).map(Some),
            _ => Err(ValidationError::InvalidProperties(
                "viewport width and height must be given together".into(),
            )),
        },
        Some(other) => Err(ValidationError::InvalidProperties(format!(
            "'viewport' must be an object or \"WxH\", got {}",
            json_kind(&other)
        ))),
    }
}

fn take_first(bag: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    let mut found = None;
    for key in keys {
        if let Some(value) = bag.remove(*key) {
            if found.is_none() && !value.is_null() {
                found = Some(value);
            }
        }
    }
    found
}

fn viewport_from(width: &Value, height: &Value) -> Result<Viewport, ValidationError> {
    Ok(Viewport {
        width: dimension(width, "width")?,
        height: dimension(height, "height")?,
    })
}

fn dimension(value: &Value, field: &str) -> Result<u32, ValidationError> {
    let parsed = match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| v.fract() == 0.0 && *v >= 0.0).map(|v| v as u64)),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed.and_then(|v| u32::try_from(v).ok()) {
        Some(v) if v > 0 => Ok(v),
        _ => Err(ValidationError::InvalidProperties(format!(
            "viewport {field} must be a positive integer, got {value}"
        ))),
    }
}

fn parse_label(label: &str) -> Result<Viewport, ValidationError> {
    let (width, height) = label
        .split_once(['x', 'X'])
        .ok_or_else(|| ValidationError::InvalidProperties(format!("bad viewport '{label}'")))?;
    viewport_from(
        &Value::String(width.to_string()),
        &Value::String(height.to_string()),
    )
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
