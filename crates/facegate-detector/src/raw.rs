//! Raw detector records and their normalization.
//!
//! Detectors report boxes in their own native layout and with loosely typed
//! numbers (floats, integers, sometimes numeric strings). Normalization turns
//! each record into a [`Detection`] or rejects that record alone.

use std::collections::BTreeMap;

use facegate_models::{BoundingBox, Detection, DetectionSet, Keypoints};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Native box layout of a detector backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxFormat {
    /// `[x, y, width, height]` (MTCNN).
    #[default]
    Xywh,
    /// `[x1, y1, x2, y2]`.
    Corners,
}

/// One record as produced by a detector, before any validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    #[serde(rename = "box", default)]
    pub bbox: Option<Value>,
    #[serde(default)]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub keypoints: Option<Value>,
}

impl RawDetection {
    /// Build a record from already numeric parts.
    pub fn from_numbers(
        bbox: [f64; 4],
        confidence: Option<f64>,
        keypoints: impl IntoIterator<Item = (String, [f64; 2])>,
    ) -> Self {
        let keypoints: serde_json::Map<String, Value> = keypoints
            .into_iter()
            .map(|(name, [x, y])| (name, serde_json::json!([x, y])))
            .collect();

        Self {
            bbox: Some(serde_json::json!(bbox)),
            confidence: confidence.map(|c| serde_json::json!(c)),
            keypoints: Some(Value::Object(keypoints)),
        }
    }
}

/// Why a single raw record was dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedDetection {
    #[error("record has no box")]
    MissingBox,

    #[error("box has {0} entries, expected 4")]
    BoxArity(usize),

    #[error("non-numeric box coordinate: {0}")]
    Coordinate(Value),

    #[error("inverted box corners")]
    InvertedBox,

    #[error("non-numeric confidence: {0}")]
    Confidence(Value),

    #[error("malformed keypoint '{0}'")]
    Keypoint(String),
}

/// Coerce a loosely typed number to `f64`.
///
/// Accepts JSON numbers and numeric strings; rejects everything that is not
/// finite.
fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Truncate toward zero, the way integral conversion does.
fn truncate(n: f64) -> Option<i64> {
    let t = n.trunc();
    (t >= i64::MIN as f64 && t <= i64::MAX as f64).then_some(t as i64)
}

/// Coerce one coordinate to an integer pixel value.
pub fn coerce_coordinate(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) if n.is_i64() => n.as_i64(),
        other => truncate(numeric(other)?),
    }
}

fn normalize_box(value: &Value, format: BoxFormat) -> Result<BoundingBox, MalformedDetection> {
    let entries = value
        .as_array()
        .ok_or_else(|| MalformedDetection::Coordinate(value.clone()))?;
    if entries.len() != 4 {
        return Err(MalformedDetection::BoxArity(entries.len()));
    }

    let mut nums = [0f64; 4];
    for (slot, entry) in nums.iter_mut().zip(entries) {
        *slot = numeric(entry).ok_or_else(|| MalformedDetection::Coordinate(entry.clone()))?;
    }

    let corners = match format {
        BoxFormat::Xywh => {
            let [x, y, w, h] = nums;
            [x, y, x + w, y + h]
        }
        BoxFormat::Corners => nums,
    };

    let mut ints = [0i64; 4];
    for (slot, n) in ints.iter_mut().zip(corners) {
        *slot = truncate(n).ok_or_else(|| MalformedDetection::Coordinate(serde_json::json!(n)))?;
    }

    BoundingBox::try_from(ints).map_err(|_| MalformedDetection::InvertedBox)
}

fn normalize_confidence(value: Option<&Value>) -> Result<Option<f32>, MalformedDetection> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) => numeric(v)
            .map(|c| Some(c as f32))
            .ok_or_else(|| MalformedDetection::Confidence(v.clone())),
    }
}

fn normalize_keypoints(value: Option<&Value>) -> Result<Keypoints, MalformedDetection> {
    let map = match value {
        None | Some(Value::Null) => return Ok(Keypoints::new()),
        Some(Value::Object(map)) => map,
        Some(_) => return Err(MalformedDetection::Keypoint("<keypoints>".to_string())),
    };

    let mut keypoints = BTreeMap::new();
    for (name, coords) in map {
        let point = coords
            .as_array()
            .filter(|c| c.len() == 2)
            .and_then(|c| Some([coerce_coordinate(&c[0])?, coerce_coordinate(&c[1])?]))
            .ok_or_else(|| MalformedDetection::Keypoint(name.clone()))?;
        keypoints.insert(name.clone(), point);
    }
    Ok(keypoints)
}

/// Normalize one record into a [`Detection`].
pub fn normalize(raw: &RawDetection, format: BoxFormat) -> Result<Detection, MalformedDetection> {
    let bbox = raw.bbox.as_ref().ok_or(MalformedDetection::MissingBox)?;
    let bbox = normalize_box(bbox, format)?;
    let score = normalize_confidence(raw.confidence.as_ref())?;
    let keypoints = normalize_keypoints(raw.keypoints.as_ref())?;

    Ok(Detection::new(bbox, score, keypoints))
}

/// Normalize a batch, dropping malformed records and keeping order.
///
/// Returns the surviving detections and the number of dropped records.
pub fn normalize_all(raws: &[RawDetection], format: BoxFormat) -> (DetectionSet, usize) {
    let mut dropped = 0;
    let set: DetectionSet = raws
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| match normalize(raw, format) {
            Ok(detection) => Some(detection),
            Err(reason) => {
                debug!(index, %reason, "Dropping malformed detection");
                dropped += 1;
                None
            }
        })
        .collect();

    (set, dropped)
}
