//! Effective view: the box set a client should display.
//!
//! Derived on every read, never stored. AI predictions come first, in
//! prediction order, followed by the surviving records in record order.

use serde::Serialize;
use uuid::Uuid;

use crate::annotation::model::{AnnotationKind, ClassLabel, InspectionAnnotationState};
use crate::bbox::{BoundingBox, Region, SEMANTIC_TOLERANCE};
use crate::types::Timestamp;

/// Which store an effective box was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveSource {
    Ai,
    Edited,
}

/// The `type` reported for an effective box. AI boxes report `ai`; records
/// report their own kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectiveKind {
    Ai,
    Added,
    Edited,
    Recovered,
}

impl From<AnnotationKind> for EffectiveKind {
    fn from(kind: AnnotationKind) -> Self {
        match kind {
            AnnotationKind::Added => Self::Added,
            AnnotationKind::Edited => Self::Edited,
            AnnotationKind::Recovered => Self::Recovered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectiveBox {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub class: Option<ClassLabel>,
    pub confidence: Option<f64>,
    pub source: EffectiveSource,
    #[serde(rename = "type")]
    pub kind: EffectiveKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_box: Option<BoundingBox>,
}

pub type EffectiveView = Vec<EffectiveBox>;

/// Build the effective view of `state`.
///
/// A prediction is hidden when a tombstone or a record's original box covers
/// it; a record is hidden when a tombstone covers it.
pub fn build_effective_view(state: &InspectionAnnotationState) -> EffectiveView {
    let tombstones: Vec<Region> = state.tombstones.iter().map(|t| t.region()).collect();
    let replaced: Vec<Region> = state
        .records
        .iter()
        .filter_map(|r| r.original_region())
        .collect();

    let ai = state
        .predictions
        .iter()
        .filter(|p| {
            let region = p.region();
            !covered(&region, &tombstones) && !covered(&region, &replaced)
        })
        .map(|p| EffectiveBox {
            id: p.id,
            bbox: p.bbox,
            class: p.class.clone(),
            confidence: p.confidence,
            source: EffectiveSource::Ai,
            kind: EffectiveKind::Ai,
            comment: None,
            timestamp: None,
            user_id: None,
            original_box: None,
        });

    let edited = state
        .records
        .iter()
        .filter(|r| !covered(&r.region(), &tombstones))
        .map(|r| EffectiveBox {
            id: r.id,
            bbox: r.bbox,
            class: r.class.clone(),
            confidence: r.confidence,
            source: EffectiveSource::Edited,
            kind: r.kind.into(),
            comment: r.comment.clone(),
            timestamp: r.timestamp,
            user_id: r.user_id.clone(),
            original_box: r.original_box,
        });

    ai.chain(edited).collect()
}

fn covered(region: &Region, suppressors: &[Region]) -> bool {
    suppressors
        .iter()
        .any(|s| s.same_as(region, SEMANTIC_TOLERANCE))
}
