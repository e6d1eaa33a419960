//! Incoming annotation batch as submitted by a client.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::annotation::model::{
    lenient_kind, lenient_provenance, lenient_timestamp, AnnotationKind, ClassLabel, Provenance,
};
use crate::bbox::{BoundingBox, Region};
use crate::types::Timestamp;

/// An edit of an existing box, or a manually added one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingEdit {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default)]
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

impl IncomingEdit {
    pub fn region(&self) -> Region {
        Region::new(self.id, self.bbox)
    }

    pub fn original_region(&self) -> Option<Region> {
        self.original_box.map(|ob| Region::new(self.id, ob))
    }

    /// The area an `Edited` entry takes over from the AI list: its original
    /// box, or the current box when the client did not send one.
    pub fn replaced_region(&self) -> Region {
        Region::new(self.id, self.original_box.unwrap_or(self.bbox))
    }

    /// Whether `region` is this edit's current or original area.
    pub fn touches(&self, region: &Region, tolerance: f64) -> bool {
        self.region().same_as(region, tolerance)
            || self
                .original_region()
                .is_some_and(|o| o.same_as(region, tolerance))
    }
}

/// A request to delete one box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingDeletion {
    #[serde(default)]
    pub id: Option<Uuid>,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    #[serde(default, deserialize_with = "lenient_provenance")]
    pub deleted_from: Option<Provenance>,
    #[serde(default)]
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

impl IncomingDeletion {
    pub fn region(&self) -> Region {
        Region::new(self.id, self.bbox)
    }
}

/// One merge batch: edits/additions plus deletions, both in client order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationUpdate {
    #[serde(default)]
    pub edits: Vec<IncomingEdit>,
    #[serde(default)]
    pub deletions: Vec<IncomingDeletion>,
}

impl AnnotationUpdate {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.deletions.is_empty()
    }

    /// Fill in `now` for every entry the client sent without a timestamp.
    pub fn stamp_missing_timestamps(&mut self, now: Timestamp) {
        let slots = self
            .edits
            .iter_mut()
            .map(|e| &mut e.timestamp)
            .chain(self.deletions.iter_mut().map(|d| &mut d.timestamp));
        for slot in slots {
            slot.get_or_insert(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbox::SEMANTIC_TOLERANCE;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    #[test]
    fn edit_defaults_to_added() {
        let edit: IncomingEdit = serde_json::from_value(json!({"box": [0, 0, 5, 5]})).unwrap();
        assert_eq!(edit.kind, AnnotationKind::Added);
        assert!(edit.original_box.is_none());

        let edit: IncomingEdit =
            serde_json::from_value(json!({"box": [0, 0, 5, 5], "type": "resized"})).unwrap();
        assert_eq!(edit.kind, AnnotationKind::Added);
    }

    #[test]
    fn replaced_region_falls_back_to_current_box() {
        let edit: IncomingEdit =
            serde_json::from_value(json!({"box": [12, 12, 52, 52], "type": "edited"})).unwrap();
        assert_eq!(edit.replaced_region().bbox.coords(), [12.0, 12.0, 52.0, 52.0]);

        let edit: IncomingEdit = serde_json::from_value(json!({
            "box": [12, 12, 52, 52],
            "originalBox": [10, 10, 50, 50],
            "type": "edited"
        }))
        .unwrap();
        assert_eq!(edit.replaced_region().bbox.coords(), [10.0, 10.0, 50.0, 50.0]);
    }

    #[test]
    fn touches_checks_both_boxes() {
        let edit: IncomingEdit = serde_json::from_value(json!({
            "box": [12, 12, 52, 52],
            "originalBox": [10, 10, 50, 50],
            "type": "edited"
        }))
        .unwrap();
        let original = Region::new(None, BoundingBox::new(10.0, 10.0, 50.0, 50.0).unwrap());
        let unrelated = Region::new(None, BoundingBox::new(0.0, 0.0, 5.0, 5.0).unwrap());
        assert!(edit.touches(&original, SEMANTIC_TOLERANCE));
        assert!(!edit.touches(&unrelated, SEMANTIC_TOLERANCE));
    }

    #[test]
    fn deletion_with_blank_provenance_reads_as_absent() {
        let del: IncomingDeletion =
            serde_json::from_value(json!({"box": [0, 0, 5, 5], "deletedFrom": " "})).unwrap();
        assert_eq!(del.deleted_from, None);
    }

    #[test]
    fn stamp_only_fills_gaps() {
        let earlier = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        let mut update = AnnotationUpdate {
            edits: vec![serde_json::from_value(json!({"box": [0, 0, 5, 5]})).unwrap()],
            deletions: vec![serde_json::from_value(json!({
                "box": [9, 9, 20, 20],
                "timestamp": "2025-01-01T00:00:00Z"
            }))
            .unwrap()],
        };

        update.stamp_missing_timestamps(now);

        assert_eq!(update.edits[0].timestamp, Some(now));
        assert_eq!(update.deletions[0].timestamp, Some(earlier));
    }
}
