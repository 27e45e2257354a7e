//! Normalized detection records.
//!
//! Every detector backend is adapted into these types. Boxes are always in
//! corner form (`[x1, y1, x2, y2]`) with integer pixel coordinates; they are
//! not guaranteed to lie inside the source image.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Integer pixel coordinate `[x, y]`.
pub type Point = [i64; 2];

/// Named facial landmarks (`left_eye`, `nose`, ...) mapped to pixel coordinates.
pub type Keypoints = BTreeMap<String, Point>;

/// Corner-form bounding box in pixel coordinates.
///
/// Serialized as a flat `[x1, y1, x2, y2]` array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "[i64; 4]", into = "[i64; 4]")]
pub struct BoundingBox {
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid box [{0}, {1}, {2}, {3}]: corners are inverted")]
pub struct InvalidBox(pub i64, pub i64, pub i64, pub i64);

impl BoundingBox {
    /// Create a box from its corners. Fails when `x2 < x1` or `y2 < y1`.
    pub fn new(x1: i64, y1: i64, x2: i64, y2: i64) -> Result<Self, InvalidBox> {
        if x2 < x1 || y2 < y1 {
            return Err(InvalidBox(x1, y1, x2, y2));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    #[inline]
    pub fn x1(&self) -> i64 {
        self.x1
    }

    #[inline]
    pub fn y1(&self) -> i64 {
        self.y1
    }

    #[inline]
    pub fn x2(&self) -> i64 {
        self.x2
    }

    #[inline]
    pub fn y2(&self) -> i64 {
        self.y2
    }

    /// Box width in pixels.
    #[inline]
    pub fn width(&self) -> i64 {
        self.x2.saturating_sub(self.x1)
    }

    /// Box height in pixels.
    #[inline]
    pub fn height(&self) -> i64 {
        self.y2.saturating_sub(self.y1)
    }

    /// Corners as a `[x1, y1, x2, y2]` array.
    pub fn to_array(&self) -> [i64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Intersect the box with `[0, width] x [0, height]`.
    ///
    /// Returns `None` when nothing of the box with positive area remains.
    pub fn clip(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x1 = self.x1.clamp(0, width as i64);
        let y1 = self.y1.clamp(0, height as i64);
        let x2 = self.x2.clamp(0, width as i64);
        let y2 = self.y2.clamp(0, height as i64);

        if x2 <= x1 || y2 <= y1 {
            return None;
        }

        Some(BoundingBox { x1, y1, x2, y2 })
    }
}

impl TryFrom<[i64; 4]> for BoundingBox {
    type Error = InvalidBox;

    fn try_from([x1, y1, x2, y2]: [i64; 4]) -> Result<Self, Self::Error> {
        BoundingBox::new(x1, y1, x2, y2)
    }
}

impl From<BoundingBox> for [i64; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

/// A single detected face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    /// Confidence reported by the detector. `None` means the detector did not
    /// report one, which is not the same as a zero confidence.
    pub score: Option<f32>,
    #[serde(default)]
    pub keypoints: Keypoints,
}

impl Detection {
    pub fn new(bbox: BoundingBox, score: Option<f32>, keypoints: Keypoints) -> Self {
        Self {
            bbox,
            score,
            keypoints,
        }
    }
}

/// Detections in the detector's native order.
///
/// The order is never changed: boxes, scores and keypoints derived from the
/// set stay positionally aligned.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionSet(Vec<Detection>);

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self(detections)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<Detection> {
        self.0
    }

    /// Keep detections matching `keep`, preserving order.
    pub fn retain(mut self, keep: impl FnMut(&Detection) -> bool) -> Self {
        self.0.retain(keep);
        self
    }

    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.0.iter().map(|d| d.bbox).collect()
    }

    pub fn keypoints(&self) -> Vec<Keypoints> {
        self.0.iter().map(|d| d.keypoints.clone()).collect()
    }

    pub fn scores(&self) -> Vec<Option<f32>> {
        self.0.iter().map(|d| d.score).collect()
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<I: IntoIterator<Item = Detection>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for DetectionSet {
    type Item = Detection;
    type IntoIter = std::vec::IntoIter<Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
