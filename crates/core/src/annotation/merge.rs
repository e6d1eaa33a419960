//! Merge engine: applies one batch of edits, additions and deletions onto an
//! inspection's annotation state.
//!
//! The steps are order-sensitive:
//!
//! 1. drop deletions that target a box edited in the same batch;
//! 2. infer the provenance of deletions that do not state one;
//! 3. filter the AI predictions replaced by edits, hit by deletions or
//!    already tombstoned;
//! 4. apply deletions (before edits, so stale manual entries go first);
//! 5. apply edits/additions in place or append them;
//! 6. drop tombstones resurrected by a surviving record.
//!
//! The input state is never mutated; the new state is returned whole.

use serde::Serialize;
use uuid::Uuid;

use crate::annotation::model::{
    AnnotationKind, AnnotationRecord, InspectionAnnotationState, Prediction, Provenance, Tombstone,
};
use crate::annotation::update::{AnnotationUpdate, IncomingDeletion, IncomingEdit};
use crate::bbox::{find_target, BoundingBox, Region, DUPLICATE_TOLERANCE, SEMANTIC_TOLERANCE};

/// Counters describing what one merge did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Deletions dropped because the same batch edits that box.
    pub conflicting_deletions: usize,
    /// Deletions that matched an existing tombstone and changed nothing.
    pub duplicate_deletions: usize,
    pub tombstones_added: usize,
    pub predictions_removed: usize,
    pub records_removed: usize,
    pub records_updated: usize,
    pub records_added: usize,
    /// Tombstones cleared because a record now occupies their area.
    pub tombstones_resurrected: usize,
}

/// Result of [`apply_annotation_update`].
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub state: InspectionAnnotationState,
    pub stats: MergeStats,
}

/// Merge `update` into `state`, returning the new state.
pub fn apply_annotation_update(
    state: &InspectionAnnotationState,
    update: &AnnotationUpdate,
) -> MergeOutcome {
    let mut stats = MergeStats::default();

    let edits: Vec<IncomingEdit> = update
        .edits
        .iter()
        .cloned()
        .map(|edit| adopt_edit_identity(edit, state))
        .collect();
    let deletions: Vec<IncomingDeletion> = update
        .deletions
        .iter()
        .cloned()
        .map(|deletion| adopt_deletion_identity(deletion, state))
        .collect();

    // 1. An edit wins over a deletion of the same box in one batch.
    let (deletions, conflicting): (Vec<_>, Vec<_>) = deletions.into_iter().partition(|d| {
        let region = d.region();
        !edits
            .iter()
            .any(|e| e.touches(&region, SEMANTIC_TOLERANCE))
    });
    stats.conflicting_deletions = conflicting.len();

    // 2. Provenance is judged against the records as they were before this batch.
    let deletions: Vec<(IncomingDeletion, Provenance)> = deletions
        .into_iter()
        .map(|d| {
            let provenance = d
                .deleted_from
                .unwrap_or_else(|| infer_provenance(&d.region(), &state.records));
            (d, provenance)
        })
        .collect();

    // 3. AI predictions replaced by an edit, hit by a deletion, or lying
    //    under a tombstone left by an earlier batch.
    let mut predictions = Vec::with_capacity(state.predictions.len());
    for prediction in &state.predictions {
        let region = prediction.region();
        let replaced = edits.iter().any(|e| {
            e.kind == AnnotationKind::Edited
                && e.replaced_region().same_as(&region, SEMANTIC_TOLERANCE)
        });
        let deleted = deletions
            .iter()
            .any(|(d, _)| d.region().same_as(&region, SEMANTIC_TOLERANCE))
            || state
                .tombstones
                .iter()
                .any(|t| t.region().same_as(&region, SEMANTIC_TOLERANCE));
        if replaced || deleted {
            stats.predictions_removed += 1;
        } else {
            predictions.push(prediction.clone());
        }
    }

    // 4. Deletions.
    let mut records = state.records.clone();
    let mut tombstones = state.tombstones.clone();
    for (deletion, provenance) in &deletions {
        let region = deletion.region();

        let mut removed: Option<AnnotationRecord> = None;
        if *provenance == Provenance::Edited {
            records.retain(|r| {
                if !r.region().same_as(&region, SEMANTIC_TOLERANCE) {
                    return true;
                }
                stats.records_removed += 1;
                removed.get_or_insert_with(|| r.clone());
                false
            });
        }

        let already_logged = tombstones.iter().any(|t| {
            t.deleted_from == Some(*provenance) && t.region().same_as(&region, DUPLICATE_TOLERANCE)
        });
        if already_logged {
            stats.duplicate_deletions += 1;
            continue;
        }

        let source_prediction = match provenance {
            Provenance::Ai => state
                .predictions
                .iter()
                .find(|p| p.region().same_as(&region, SEMANTIC_TOLERANCE)),
            Provenance::Edited => None,
        };
        tombstones.push(tombstone_for(
            deletion,
            *provenance,
            removed.as_ref(),
            source_prediction,
        ));
        stats.tombstones_added += 1;
    }

    // 5. Edits and additions.
    for edit in &edits {
        let index = match edit.kind {
            AnnotationKind::Edited => {
                let replaced = edit.replaced_region();
                find_target(&records, &replaced, AnnotationRecord::region, |r| {
                    r.covers(&replaced, SEMANTIC_TOLERANCE)
                })
            }
            AnnotationKind::Added | AnnotationKind::Recovered => {
                let current = edit.region();
                find_target(&records, &current, AnnotationRecord::region, |r| {
                    r.region().same_as(&current, SEMANTIC_TOLERANCE)
                })
            }
        };

        match index {
            Some(i) => {
                update_record(&mut records[i], edit);
                stats.records_updated += 1;
            }
            None => {
                records.push(record_from_edit(edit));
                stats.records_added += 1;
            }
        }
    }

    // 6. A live record supersedes any tombstone over its area.
    let before = tombstones.len();
    tombstones.retain(|t| {
        let region = t.region();
        !records
            .iter()
            .any(|r| r.covers(&region, SEMANTIC_TOLERANCE))
    });
    stats.tombstones_resurrected = before - tombstones.len();

    MergeOutcome {
        state: InspectionAnnotationState {
            predictions,
            records,
            tombstones,
        },
        stats,
    }
}

/// `Edited` when the box belongs to an existing record, `Ai` otherwise.
fn infer_provenance(region: &Region, records: &[AnnotationRecord]) -> Provenance {
    if records
        .iter()
        .any(|r| r.region().same_as(region, SEMANTIC_TOLERANCE))
    {
        Provenance::Edited
    } else {
        Provenance::Ai
    }
}

// ---------------------------------------------------------------------------
// Identity adoption
// ---------------------------------------------------------------------------

/// Untagged edits inherit the id of the entry they act on.
fn adopt_edit_identity(mut edit: IncomingEdit, state: &InspectionAnnotationState) -> IncomingEdit {
    if edit.id.is_some() {
        return edit;
    }
    edit.id = match edit.kind {
        AnnotationKind::Edited => {
            let target = edit.original_box.unwrap_or(edit.bbox);
            record_id_covering(&target, state).or_else(|| prediction_id_at(&target, state))
        }
        AnnotationKind::Added | AnnotationKind::Recovered => state
            .records
            .iter()
            .find(|r| r.bbox.matches(&edit.bbox, SEMANTIC_TOLERANCE))
            .and_then(|r| r.id),
    };
    edit
}

/// Untagged deletions inherit the id of the live entry they remove.
fn adopt_deletion_identity(
    mut deletion: IncomingDeletion,
    state: &InspectionAnnotationState,
) -> IncomingDeletion {
    if deletion.id.is_some() {
        return deletion;
    }
    let target = deletion.bbox;
    deletion.id = match deletion.deleted_from {
        Some(Provenance::Ai) => prediction_id_at(&target, state),
        Some(Provenance::Edited) => record_id_at(&target, state),
        None => record_id_at(&target, state).or_else(|| prediction_id_at(&target, state)),
    };
    deletion
}

fn record_id_at(target: &BoundingBox, state: &InspectionAnnotationState) -> Option<Uuid> {
    state
        .records
        .iter()
        .find(|r| r.bbox.matches(target, SEMANTIC_TOLERANCE))
        .and_then(|r| r.id)
}

fn record_id_covering(target: &BoundingBox, state: &InspectionAnnotationState) -> Option<Uuid> {
    state
        .records
        .iter()
        .find(|r| {
            r.bbox.matches(target, SEMANTIC_TOLERANCE)
                || r
                    .original_box
                    .is_some_and(|ob| ob.matches(target, SEMANTIC_TOLERANCE))
        })
        .and_then(|r| r.id)
}

fn prediction_id_at(target: &BoundingBox, state: &InspectionAnnotationState) -> Option<Uuid> {
    state
        .predictions
        .iter()
        .find(|p| p.bbox.matches(target, SEMANTIC_TOLERANCE))
        .and_then(|p| p.id)
}

// ---------------------------------------------------------------------------
// Entry construction
// ---------------------------------------------------------------------------

/// Build the tombstone for a deletion, filling gaps from the entry it removed.
fn tombstone_for(
    deletion: &IncomingDeletion,
    provenance: Provenance,
    removed: Option<&AnnotationRecord>,
    prediction: Option<&Prediction>,
) -> Tombstone {
    let mut tombstone = Tombstone {
        id: deletion.id,
        bbox: deletion.bbox,
        deleted_from: Some(provenance),
        original_box: deletion.original_box,
        class: deletion.class.clone(),
        confidence: deletion.confidence,
        comment: deletion.comment.clone(),
        timestamp: deletion.timestamp,
        user_id: deletion.user_id.clone(),
    };

    if let Some(record) = removed {
        tombstone.id = tombstone.id.or(record.id);
        tombstone.original_box = tombstone.original_box.or(record.original_box);
        tombstone.class = tombstone.class.or_else(|| record.class.clone());
        tombstone.confidence = tombstone.confidence.or(record.confidence);
        tombstone.comment = tombstone.comment.or_else(|| record.comment.clone());
        tombstone.user_id = tombstone.user_id.or_else(|| record.user_id.clone());
    }
    if let Some(prediction) = prediction {
        tombstone.id = tombstone.id.or(prediction.id);
        tombstone.class = tombstone.class.or_else(|| prediction.class.clone());
        tombstone.confidence = tombstone.confidence.or(prediction.confidence);
    }

    tombstone
}

fn record_from_edit(edit: &IncomingEdit) -> AnnotationRecord {
    AnnotationRecord {
        id: edit.id,
        bbox: edit.bbox,
        original_box: match edit.kind {
            AnnotationKind::Edited => edit.original_box,
            AnnotationKind::Added | AnnotationKind::Recovered => None,
        },
        class: edit.class.clone(),
        confidence: edit.confidence,
        comment: edit.comment.clone(),
        timestamp: edit.timestamp,
        user_id: edit.user_id.clone(),
        kind: edit.kind,
    }
}

/// Overwrite a matched record with the incoming edit.
///
/// The first original box a record was given is kept across re-edits, and a
/// record that carries one stays `Edited`.
fn update_record(record: &mut AnnotationRecord, edit: &IncomingEdit) {
    record.bbox = edit.bbox;
    if edit.kind == AnnotationKind::Edited {
        record.original_box = record.original_box.or(edit.original_box);
    }
    record.id = record.id.or(edit.id);
    record.class = edit.class.clone();
    record.confidence = edit.confidence;
    record.comment = edit.comment.clone();
    record.timestamp = edit.timestamp;
    record.user_id = edit.user_id.clone();
    record.kind = if record.original_box.is_some() {
        AnnotationKind::Edited
    } else {
        edit.kind
    };
}
