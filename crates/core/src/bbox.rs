//! Bounding-box geometry and region identity.
//!
//! A box has no identity of its own. Two boxes denote the same region when
//! their coordinates agree within a tolerance, or, when both sides carry a
//! surrogate id, when those ids are equal.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Tolerances
// ---------------------------------------------------------------------------

/// Tolerance for treating boxes from different pipeline stages (AI output vs.
/// a slightly adjusted edit) as the same region.
pub const SEMANTIC_TOLERANCE: f64 = 2.0;

/// Tolerance for suppressing exact re-insertion of an already present entry.
pub const DUPLICATE_TOLERANCE: f64 = 0.5;

// ---------------------------------------------------------------------------
// BoundingBox
// ---------------------------------------------------------------------------

/// Axis-aligned rectangle as `[x1, y1, x2, y2]`.
///
/// Always holds four finite coordinates; anything that cannot be coerced
/// into that shape is rejected at construction with
/// [`CoreError::MalformedBox`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox([f64; 4]);

impl BoundingBox {
    /// Build a box from four coordinates.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Result<Self, CoreError> {
        let coords = [x1, y1, x2, y2];
        if let Some(bad) = coords.iter().find(|c| !c.is_finite()) {
            return Err(CoreError::MalformedBox(format!(
                "coordinate {bad} is not a finite number"
            )));
        }
        Ok(Self(coords))
    }

    /// Coerce a JSON value into a box.
    ///
    /// Accepts an array of exactly four elements, each either a JSON number
    /// or a string holding a number.
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        let items = value.as_array().ok_or_else(|| {
            CoreError::MalformedBox(format!("expected an array of 4 coordinates, got {value}"))
        })?;

        if items.len() != 4 {
            return Err(CoreError::MalformedBox(format!(
                "expected 4 coordinates, got {}",
                items.len()
            )));
        }

        let mut coords = [0.0; 4];
        for (slot, item) in coords.iter_mut().zip(items) {
            *slot = coerce_coordinate(item).ok_or_else(|| {
                CoreError::MalformedBox(format!("coordinate {item} is not a finite number"))
            })?;
        }
        Ok(Self(coords))
    }

    pub fn coords(&self) -> [f64; 4] {
        self.0
    }

    /// True iff every coordinate differs from `other`'s by strictly less
    /// than `tolerance`.
    pub fn matches(&self, other: &BoundingBox, tolerance: f64) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| (a - b).abs() < tolerance)
    }
}

fn coerce_coordinate(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [x1, y1, x2, y2] = self.0;
        write!(f, "[{x1}, {y1}, {x2}, {y2}]")
    }
}

// ---------------------------------------------------------------------------
// Region identity
// ---------------------------------------------------------------------------

/// A box together with the surrogate id of the entry that owns it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub id: Option<Uuid>,
    pub bbox: BoundingBox,
}

impl Region {
    pub fn new(id: Option<Uuid>, bbox: BoundingBox) -> Self {
        Self { id, bbox }
    }

    /// Whether two regions denote the same real-world area.
    ///
    /// Coordinates within `tolerance` always match. Equal ids on both sides
    /// also match, so an entry is still found after its box has moved; a
    /// differing or unknown id never vetoes a coordinate match.
    pub fn same_as(&self, other: &Region, tolerance: f64) -> bool {
        self.same_id(other) || self.bbox.matches(&other.bbox, tolerance)
    }

    /// Both regions are tagged, with the same id.
    pub fn same_id(&self, other: &Region) -> bool {
        matches!((self.id, other.id), (Some(a), Some(b)) if a == b)
    }
}

/// Index of the entry a region targets: the one carrying its id when there
/// is one, else the first whose region satisfies `matches`.
pub fn find_target<T>(
    items: &[T],
    target: &Region,
    region_of: impl Fn(&T) -> Region,
    matches: impl Fn(&T) -> bool,
) -> Option<usize> {
    items
        .iter()
        .position(|item| region_of(item).same_id(target))
        .or_else(|| items.iter().position(matches))
}
