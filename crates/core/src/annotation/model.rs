//! Per-inspection annotation state and its entry types.
//!
//! Field names follow the stored JSON layout (`box`, `originalBox`, `class`,
//! `userId`, `type`, `deletedFrom`) so that snapshots round-trip unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::bbox::{BoundingBox, Region, SEMANTIC_TOLERANCE};
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Enumerations
// ---------------------------------------------------------------------------

/// Detector class: either the numeric index emitted by the model or a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassLabel {
    Index(i64),
    Name(String),
}

/// How an edited/added record came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationKind {
    #[default]
    Added,
    Edited,
    Recovered,
}

impl AnnotationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Edited => "edited",
            Self::Recovered => "recovered",
        }
    }

    /// Case-insensitive parse. Unknown values yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "added" => Some(Self::Added),
            "edited" => Some(Self::Edited),
            "recovered" => Some(Self::Recovered),
            _ => None,
        }
    }
}

/// Which store a box lived in before it was deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Ai,
    Edited,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Edited => "edited",
        }
    }

    /// Case-insensitive parse; `manual` is an alias of `edited`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ai" => Some(Self::Ai),
            "edited" | "manual" => Some(Self::Edited),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Missing or unrecognized kinds are treated as additions.
pub(crate) fn lenient_kind<'de, D: Deserializer<'de>>(d: D) -> Result<AnnotationKind, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw
        .as_deref()
        .and_then(AnnotationKind::parse)
        .unwrap_or_default())
}

/// Empty or unrecognized provenance reads as absent.
pub(crate) fn lenient_provenance<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Provenance>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.as_deref().and_then(Provenance::parse))
}

/// RFC 3339, or a zone-less ISO date-time read as UTC. Anything else reads as
/// absent rather than failing the whole entry.
pub(crate) fn lenient_timestamp<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<Option<Timestamp>, D::Error> {
    let raw: Option<String> = Option::deserialize(d)?;
    Ok(raw.as_deref().map(str::trim).and_then(|s| {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .or_else(|_| {
                chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc())
            })
            .ok()
    }))
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One detector output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub class: Option<ClassLabel>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl Prediction {
    pub fn region(&self) -> Region {
        Region::new(self.id, self.bbox)
    }
}

/// A human edit, manual addition or recovered box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_box: Option<BoundingBox>,
    #[serde(default)]
    pub class: Option<ClassLabel>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(rename = "type", default, deserialize_with = "lenient_kind")]
    pub kind: AnnotationKind,
}

impl AnnotationRecord {
    pub fn region(&self) -> Region {
        Region::new(self.id, self.bbox)
    }

    /// The region this record replaced, when it is an edit of another box.
    pub fn original_region(&self) -> Option<Region> {
        self.original_box.map(|ob| Region::new(self.id, ob))
    }

    /// Whether `region` is this record's current or original area.
    pub fn covers(&self, region: &Region, tolerance: f64) -> bool {
        self.region().same_as(region, tolerance)
            || self
                .original_region()
                .is_some_and(|o| o.same_as(region, tolerance))
    }
}

/// A deleted box, kept so the deletion can be undone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(
        default,
        deserialize_with = "lenient_provenance",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_from: Option<Provenance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_box: Option<BoundingBox>,
    #[serde(default)]
    pub class: Option<ClassLabel>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<Timestamp>,
    #[serde(default)]
    pub user_id: Option<String>,
}

impl Tombstone {
    pub fn region(&self) -> Region {
        Region::new(self.id, self.bbox)
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// The three stored collections for one inspection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectionAnnotationState {
    #[serde(default)]
    pub predictions: Vec<Prediction>,
    #[serde(default, rename = "editedOrManuallyAddedBoxes")]
    pub records: Vec<AnnotationRecord>,
    #[serde(default, rename = "deletedBoundingBoxes")]
    pub tombstones: Vec<Tombstone>,
}

/// Entry counts for one inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AnnotationSummary {
    pub prediction_count: usize,
    pub record_count: usize,
    pub tombstone_count: usize,
    pub has_changes: bool,
}

impl InspectionAnnotationState {
    /// Initial state right after an image has been analyzed.
    pub fn from_predictions(predictions: Vec<Prediction>) -> Self {
        Self {
            predictions,
            ..Self::default()
        }
    }

    /// Swap in a fresh analysis result, keeping human edits and deletions.
    ///
    /// Untagged incoming predictions that land on an area already known to
    /// the state (an edited record's original box, or a tombstone) take over
    /// that area's id, so the existing suppression keeps applying.
    pub fn replace_predictions(&mut self, predictions: Vec<Prediction>) {
        self.predictions = predictions
            .into_iter()
            .map(|mut p| {
                if p.id.is_none() {
                    p.id = self.known_id_at(&p.bbox);
                }
                p
            })
            .collect();
    }

    fn known_id_at(&self, bbox: &BoundingBox) -> Option<Uuid> {
        let from_records = self.records.iter().find_map(|r| {
            r.original_box
                .filter(|ob| ob.matches(bbox, SEMANTIC_TOLERANCE))
                .and(r.id)
        });
        from_records.or_else(|| {
            self.tombstones
                .iter()
                .find(|t| t.bbox.matches(bbox, SEMANTIC_TOLERANCE))
                .and_then(|t| t.id)
        })
    }

    /// Drop all three collections (image removed, or retraining cleanup).
    pub fn clear(&mut self) {
        self.predictions.clear();
        self.records.clear();
        self.tombstones.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty() && self.records.is_empty() && self.tombstones.is_empty()
    }

    /// Give every untagged entry a fresh surrogate id.
    ///
    /// The engines never mint ids themselves; callers run this after a merge
    /// or recovery, before persisting.
    pub fn assign_missing_ids(&mut self, mut next_id: impl FnMut() -> Uuid) {
        let slots = self
            .predictions
            .iter_mut()
            .map(|p| &mut p.id)
            .chain(self.records.iter_mut().map(|r| &mut r.id))
            .chain(self.tombstones.iter_mut().map(|t| &mut t.id));
        for slot in slots {
            if slot.is_none() {
                *slot = Some(next_id());
            }
        }
    }

    pub fn summary(&self) -> AnnotationSummary {
        AnnotationSummary {
            prediction_count: self.predictions.len(),
            record_count: self.records.len(),
            tombstone_count: self.tombstones.len(),
            has_changes: !self.records.is_empty() || !self.tombstones.is_empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bx(x1: f64, y1: f64, x2: f64, y2: f64) -> BoundingBox {
        BoundingBox::new(x1, y1, x2, y2).unwrap()
    }

    fn prediction(b: BoundingBox) -> Prediction {
        Prediction {
            id: None,
            bbox: b,
            class: Some(ClassLabel::Index(0)),
            confidence: Some(0.9),
        }
    }

    #[test]
    fn kind_parse_is_case_insensitive() {
        assert_eq!(AnnotationKind::parse("Edited"), Some(AnnotationKind::Edited));
        assert_eq!(AnnotationKind::parse(" added "), Some(AnnotationKind::Added));
        assert_eq!(AnnotationKind::parse("RECOVERED"), Some(AnnotationKind::Recovered));
        assert_eq!(AnnotationKind::parse("moved"), None);
    }

    #[test]
    fn provenance_parse_accepts_manual_alias() {
        assert_eq!(Provenance::parse("manual"), Some(Provenance::Edited));
        assert_eq!(Provenance::parse("AI"), Some(Provenance::Ai));
        assert_eq!(Provenance::parse(""), None);
        assert_eq!(Provenance::parse("model"), None);
    }

    #[test]
    fn record_uses_stored_field_names() {
        let value = json!({
            "box": [1, 2, 3, 4],
            "originalBox": [0, 0, 3, 3],
            "class": "hotspot",
            "confidence": 0.5,
            "comment": "moved",
            "userId": "inspector-7",
            "type": "EDITED"
        });
        let record: AnnotationRecord = serde_json::from_value(value).unwrap();
        assert_eq!(record.kind, AnnotationKind::Edited);
        assert_eq!(record.class, Some(ClassLabel::Name("hotspot".into())));
        assert_eq!(record.user_id.as_deref(), Some("inspector-7"));

        let out = serde_json::to_value(&record).unwrap();
        assert_eq!(out["type"], "edited");
        assert_eq!(out["originalBox"], json!([0.0, 0.0, 3.0, 3.0]));
        assert!(out.get("id").is_none());
    }

    #[test]
    fn timestamps_are_read_leniently() {
        let record: AnnotationRecord = serde_json::from_value(json!({
            "box": [1, 2, 3, 4],
            "timestamp": "2025-03-01T10:15:00"
        }))
        .unwrap();
        assert_eq!(record.timestamp.unwrap().to_rfc3339(), "2025-03-01T10:15:00+00:00");

        let record: AnnotationRecord =
            serde_json::from_value(json!({"box": [1, 2, 3, 4], "timestamp": "yesterday"})).unwrap();
        assert_eq!(record.timestamp, None);
    }

    #[test]
    fn record_without_type_is_added() {
        let record: AnnotationRecord =
            serde_json::from_value(json!({"box": [1, 2, 3, 4]})).unwrap();
        assert_eq!(record.kind, AnnotationKind::Added);
    }

    #[test]
    fn tombstone_reads_legacy_manual_provenance() {
        let t: Tombstone =
            serde_json::from_value(json!({"box": [1, 2, 3, 4], "deletedFrom": "manual"})).unwrap();
        assert_eq!(t.deleted_from, Some(Provenance::Edited));
        let t: Tombstone = serde_json::from_value(json!({"box": [1, 2, 3, 4]})).unwrap();
        assert_eq!(t.deleted_from, None);
    }

    #[test]
    fn record_covers_current_and_original() {
        let record = AnnotationRecord {
            id: None,
            bbox: bx(12.0, 12.0, 52.0, 52.0),
            original_box: Some(bx(10.0, 10.0, 50.0, 50.0)),
            class: None,
            confidence: None,
            comment: None,
            timestamp: None,
            user_id: None,
            kind: AnnotationKind::Edited,
        };
        let original = Region::new(None, bx(10.5, 10.0, 50.0, 50.0));
        let current = Region::new(None, bx(12.0, 12.0, 52.0, 52.0));
        let elsewhere = Region::new(None, bx(80.0, 80.0, 90.0, 90.0));
        assert!(record.covers(&original, SEMANTIC_TOLERANCE));
        assert!(record.covers(&current, SEMANTIC_TOLERANCE));
        assert!(!record.covers(&elsewhere, SEMANTIC_TOLERANCE));
    }

    #[test]
    fn summary_reports_changes() {
        let mut state = InspectionAnnotationState::from_predictions(vec![prediction(bx(
            0.0, 0.0, 5.0, 5.0,
        ))]);
        assert!(!state.summary().has_changes);

        state.tombstones.push(Tombstone {
            id: None,
            bbox: bx(0.0, 0.0, 5.0, 5.0),
            deleted_from: Some(Provenance::Ai),
            original_box: None,
            class: None,
            confidence: None,
            comment: None,
            timestamp: None,
            user_id: None,
        });
        let summary = state.summary();
        assert_eq!(summary.prediction_count, 1);
        assert_eq!(summary.tombstone_count, 1);
        assert!(summary.has_changes);

        state.clear();
        assert!(state.is_empty());
    }

    #[test]
    fn assign_missing_ids_keeps_existing() {
        let keep = Uuid::new_v4();
        let mut tagged = prediction(bx(0.0, 0.0, 1.0, 1.0));
        tagged.id = Some(keep);
        let mut state =
            InspectionAnnotationState::from_predictions(vec![tagged, prediction(bx(5.0, 5.0, 6.0, 6.0))]);

        let fresh = Uuid::new_v4();
        state.assign_missing_ids(|| fresh);

        assert_eq!(state.predictions[0].id, Some(keep));
        assert_eq!(state.predictions[1].id, Some(fresh));
    }

    #[test]
    fn replace_predictions_inherits_ids_of_known_areas() {
        let record_id = Uuid::new_v4();
        let tombstone_id = Uuid::new_v4();
        let mut state = InspectionAnnotationState::default();
        state.records.push(AnnotationRecord {
            id: Some(record_id),
            bbox: bx(12.0, 12.0, 52.0, 52.0),
            original_box: Some(bx(10.0, 10.0, 50.0, 50.0)),
            class: None,
            confidence: None,
            comment: None,
            timestamp: None,
            user_id: None,
            kind: AnnotationKind::Edited,
        });
        state.tombstones.push(Tombstone {
            id: Some(tombstone_id),
            bbox: bx(100.0, 100.0, 120.0, 120.0),
            deleted_from: Some(Provenance::Ai),
            original_box: None,
            class: None,
            confidence: None,
            comment: None,
            timestamp: None,
            user_id: None,
        });

        state.replace_predictions(vec![
            prediction(bx(10.5, 10.0, 50.0, 50.5)),
            prediction(bx(100.0, 101.0, 120.0, 120.0)),
            prediction(bx(300.0, 300.0, 320.0, 320.0)),
        ]);

        assert_eq!(state.predictions[0].id, Some(record_id));
        assert_eq!(state.predictions[1].id, Some(tombstone_id));
        assert_eq!(state.predictions[2].id, None);
        assert_eq!(state.records.len(), 1);
        assert_eq!(state.tombstones.len(), 1);
    }
}
