//! Inspection annotation row and listing types.

use serde::Serialize;
use sqlx::FromRow;
use thermal_core::annotation::codec::{decode_state, DecodedState};
use thermal_core::error::CoreError;
use thermal_core::types::{DbId, Timestamp};

/// A row from the `inspection_annotations` table.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InspectionAnnotationRow {
    pub inspection_id: DbId,
    pub transformer_no: Option<String>,
    pub ai_predictions: serde_json::Value,
    pub edited_boxes: serde_json::Value,
    pub deleted_boxes: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl InspectionAnnotationRow {
    /// Decode the stored collections, skipping unusable entries.
    pub fn decode(&self) -> Result<DecodedState, CoreError> {
        decode_state(&self.ai_predictions, &self.edited_boxes, &self.deleted_boxes)
    }
}

/// An inspection that carries human edits or deletions.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnnotationChangeEntry {
    pub inspection_id: DbId,
    pub transformer_no: Option<String>,
    pub edited_count: i64,
    pub deleted_count: i64,
    pub updated_at: Timestamp,
}

/// Store-wide annotation counts, used before a retraining cleanup.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AnnotationStats {
    pub total_inspections: i64,
    pub inspections_with_changes: i64,
    pub inspections_with_edited_boxes: i64,
    pub inspections_with_deleted_boxes: i64,
}
