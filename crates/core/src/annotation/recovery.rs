//! Recovery engine: restore a deleted box from its tombstone.

use serde_json::Value;
use uuid::Uuid;

use crate::annotation::model::{
    AnnotationKind, AnnotationRecord, InspectionAnnotationState, Prediction, Provenance, Tombstone,
};
use crate::bbox::{find_target, BoundingBox, Region, DUPLICATE_TOLERANCE, SEMANTIC_TOLERANCE};
use crate::error::CoreError;

/// Which tombstone to restore, and where to.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryRequest {
    pub target: BoundingBox,
    pub id: Option<Uuid>,
    /// `ai`, `edited` or `manual`. Falls back to the tombstone's provenance.
    pub destination: Option<String>,
}

impl RecoveryRequest {
    /// Read a request body of the form `{"box": [...], "id"?, "destination"?}`.
    ///
    /// An unusable `box` is [`CoreError::MalformedBox`]; a missing box or a
    /// bad `id` is [`CoreError::Validation`].
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        let body = value.as_object().ok_or_else(|| {
            CoreError::Validation("recovery request must be a JSON object".to_string())
        })?;

        let target = body
            .get("box")
            .ok_or_else(|| CoreError::Validation("recovery request needs a box".to_string()))
            .and_then(BoundingBox::from_value)?;

        let id = match body.get("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(
                Uuid::parse_str(raw.trim())
                    .map_err(|e| CoreError::Validation(format!("invalid id '{raw}': {e}")))?,
            ),
            Some(other) => {
                return Err(CoreError::Validation(format!("invalid id {other}")));
            }
        };

        let destination = match body.get("destination") {
            None | Some(Value::Null) => None,
            Some(Value::String(hint)) => Some(hint.clone()),
            Some(other) => return Err(CoreError::InvalidDestination(other.to_string())),
        };

        Ok(Self {
            target,
            id,
            destination,
        })
    }

    pub fn region(&self) -> Region {
        Region::new(self.id, self.target)
    }
}

/// Restore the first tombstone matching `request` into its destination list.
///
/// Works on a copy of `state`; on error nothing has changed.
pub fn recover_box(
    state: &InspectionAnnotationState,
    request: &RecoveryRequest,
) -> Result<InspectionAnnotationState, CoreError> {
    let target = request.region();
    let index = find_target(&state.tombstones, &target, Tombstone::region, |t| {
        t.bbox.matches(&target.bbox, SEMANTIC_TOLERANCE)
    })
    .ok_or(CoreError::TombstoneNotFound(request.target))?;

    let mut next = state.clone();
    let tombstone = next.tombstones.remove(index);
    let destination = resolve_destination(request.destination.as_deref(), &tombstone)?;
    let restored = tombstone.region();

    match destination {
        Provenance::Ai => {
            next.predictions
                .retain(|p| !p.region().same_as(&restored, DUPLICATE_TOLERANCE));
            next.predictions.push(Prediction {
                id: tombstone.id,
                bbox: tombstone.bbox,
                class: tombstone.class,
                confidence: tombstone.confidence,
            });
        }
        Provenance::Edited => {
            next.records
                .retain(|r| !r.region().same_as(&restored, DUPLICATE_TOLERANCE));
            next.records.push(AnnotationRecord {
                id: tombstone.id,
                bbox: tombstone.bbox,
                original_box: None,
                class: tombstone.class,
                confidence: tombstone.confidence,
                comment: tombstone.comment,
                timestamp: tombstone.timestamp,
                user_id: tombstone.user_id,
                kind: AnnotationKind::Recovered,
            });
        }
    }

    Ok(next)
}

/// Hint first, then the tombstone's provenance, then `Edited`.
fn resolve_destination(hint: Option<&str>, tombstone: &Tombstone) -> Result<Provenance, CoreError> {
    match hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(h) => Provenance::parse(h).ok_or_else(|| CoreError::InvalidDestination(h.to_string())),
        None => Ok(tombstone.deleted_from.unwrap_or(Provenance::Edited)),
    }
}
