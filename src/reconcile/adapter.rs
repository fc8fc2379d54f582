//! Transport-boundary normalization of dashboard payloads.
//!
//! Older producers emit several shapes for the same data: the snapshot may
//! arrive wrapped in the `{data, error}` envelope or bare, series may be a
//! list of `{name, data}` objects, a `number[][]`, a flat `number[]`, or a
//! single object, and labels may be strings or small objects. Everything is
//! normalized here into [`StatBundle`] and [`DashboardSnapshot`]; nothing
//! past this module sees the raw shapes.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::models::stats::{
    BundleSource, DashboardSnapshot, DataType, DetailRecord, Series, StatBundle, StatName,
    BUNDLE_VERSION,
};

/// Keys tried, in order, when a label arrives as an object.
const LABEL_KEYS: [&str; 5] = ["label", "name", "administration", "user", "product"];

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("server reported an error: {0}")]
    Envelope(String),

    #[error("{stat}: {reason}")]
    Shape { stat: StatName, reason: String },
}

fn shape(stat: StatName, reason: impl Into<String>) -> AdapterError {
    AdapterError::Shape {
        stat,
        reason: reason.into(),
    }
}

/// Parse a raw transport payload into a snapshot.
pub fn parse_snapshot(raw: &str) -> Result<DashboardSnapshot, AdapterError> {
    normalize_snapshot(serde_json::from_str(raw)?)
}

/// Normalize an enveloped or bare snapshot object.
///
/// Unknown top-level keys are skipped. A bundle that cannot be normalized
/// fails the whole payload so a half-read snapshot is never applied.
pub fn normalize_snapshot(value: Value) -> Result<DashboardSnapshot, AdapterError> {
    let object = unwrap_envelope(value)?;

    let generated_at = object
        .get("generated_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let is_cached = object
        .get("is_cached")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let mut bundles = BTreeMap::new();
    for (key, raw) in &object {
        let Ok(stat) = StatName::from_str(key) else {
            if key != "generated_at" && key != "is_cached" {
                tracing::debug!(key = %key, "Skipping unknown payload key");
            }
            continue;
        };
        bundles.insert(stat, normalize_bundle(stat, raw)?);
    }

    Ok(DashboardSnapshot {
        bundles,
        generated_at,
        is_cached,
    })
}

fn unwrap_envelope(value: Value) -> Result<Map<String, Value>, AdapterError> {
    let Value::Object(mut object) = value else {
        return Err(AdapterError::NotAnObject);
    };
    if !object.contains_key("error") {
        return Ok(object);
    }

    match object.remove("data") {
        Some(Value::Object(inner)) => Ok(inner),
        _ => {
            let message = object
                .get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .map(|m| match m {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default();
            Err(AdapterError::Envelope(message))
        }
    }
}

/// Normalize one bundle in any legacy shape.
///
/// Missing `is_real_data` is read as `false`. The fingerprint is always
/// recomputed locally.
pub fn normalize_bundle(stat: StatName, value: &Value) -> Result<StatBundle, AdapterError> {
    let object = value
        .as_object()
        .ok_or_else(|| shape(stat, "bundle is not an object"))?;

    let labels = match object.get("labels") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| label_of(item).ok_or_else(|| shape(stat, "unreadable label")))
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => return Err(shape(stat, "labels is not an array")),
        None => Vec::new(),
    };

    let series = match object.get("series").or_else(|| object.get("data")) {
        Some(raw) => series_of(stat, raw)?,
        None => Vec::new(),
    };
    if let Some(bad) = series.iter().find(|s| s.data.len() != labels.len()) {
        return Err(shape(
            stat,
            format!(
                "series '{}' has {} values for {} labels",
                bad.name,
                bad.data.len(),
                labels.len()
            ),
        ));
    }

    let details = object
        .get("all_data")
        .and_then(|raw| serde_json::from_value::<Vec<DetailRecord>>(raw.clone()).ok())
        .unwrap_or_default();
    let data_type = object
        .get("data_type")
        .and_then(|raw| serde_json::from_value::<DataType>(raw.clone()).ok())
        .unwrap_or_else(|| stat.data_type());
    let is_real_data = object
        .get("is_real_data")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let source = object
        .get("source")
        .and_then(|raw| serde_json::from_value::<BundleSource>(raw.clone()).ok())
        .unwrap_or(if is_real_data {
            BundleSource::Database
        } else {
            BundleSource::Synthetic
        });
    let error = object
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(StatBundle {
        name: stat,
        version: BUNDLE_VERSION,
        labels,
        series,
        details,
        data_type,
        is_real_data,
        source,
        error,
        fingerprint: String::new(),
    }
    .sealed())
}

fn label_of(item: &Value) -> Option<String> {
    match item {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => LABEL_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

fn number_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Null => Some(0),
        _ => None,
    }
}

fn numbers_of(stat: StatName, items: &[Value]) -> Result<Vec<i64>, AdapterError> {
    items
        .iter()
        .map(|v| number_of(v).ok_or_else(|| shape(stat, format!("non-numeric value {v}"))))
        .collect()
}

fn series_of(stat: StatName, raw: &Value) -> Result<Vec<Series>, AdapterError> {
    let default_name = stat.series_name();
    match raw {
        Value::Object(map) => Ok(vec![object_series(stat, map, default_name)?]),
        Value::Array(items) if items.is_empty() => Ok(Vec::new()),
        Value::Array(items) => match &items[0] {
            Value::Object(_) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let map = item
                        .as_object()
                        .ok_or_else(|| shape(stat, "mixed series entries"))?;
                    object_series(stat, map, &nth_name(default_name, i))
                })
                .collect(),
            Value::Array(_) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let values = item
                        .as_array()
                        .ok_or_else(|| shape(stat, "mixed series entries"))?;
                    Ok(Series {
                        name: nth_name(default_name, i),
                        data: numbers_of(stat, values)?,
                    })
                })
                .collect(),
            _ => Ok(vec![Series {
                name: default_name.to_string(),
                data: numbers_of(stat, items)?,
            }]),
        },
        _ => Err(shape(stat, "series is neither an array nor an object")),
    }
}

fn object_series(
    stat: StatName,
    map: &Map<String, Value>,
    fallback_name: &str,
) -> Result<Series, AdapterError> {
    let data = map
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| shape(stat, "series object without data"))?;
    Ok(Series {
        name: map
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(fallback_name)
            .to_string(),
        data: numbers_of(stat, data)?,
    })
}

fn nth_name(base: &str, i: usize) -> String {
    if i == 0 {
        base.to_string()
    } else {
        format!("{base}_{}", i + 1)
    }
}
