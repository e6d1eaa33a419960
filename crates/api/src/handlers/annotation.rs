//! Handlers for per-inspection bounding-box annotations.
//!
//! Every write runs load, engine call and store inside one transaction that
//! holds the row lock, so concurrent saves to one inspection serialize.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgConnection;
use uuid::Uuid;

use thermal_core::annotation::codec::{
    decode_predictions, decode_update, encode_state, DecodedState, SkippedEntry,
};
use thermal_core::annotation::{
    apply_annotation_update, build_effective_view, recover_box, AnnotationSummary,
    EffectiveView, InspectionAnnotationState, MergeStats, RecoveryRequest,
};
use thermal_core::error::CoreError;
use thermal_core::types::DbId;
use thermal_db::repositories::InspectionAnnotationRepo;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/* --------------------------------------------------------------------------
   Request / response types
   -------------------------------------------------------------------------- */

/// Body of `PUT /inspections/{id}/annotations`.
///
/// Both collections may be arrays, single objects or JSON text.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAnnotationsRequest {
    #[serde(default, alias = "edits")]
    pub edited_or_manually_added_boxes: Value,
    #[serde(default, alias = "deletions")]
    pub deleted_bounding_boxes: Value,
    #[serde(default)]
    pub transformer_no: Option<String>,
}

/// Body of `PUT /inspections/{id}/annotations/predictions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestPredictionsRequest {
    /// Detector output: `{"predictions": [...]}` or a bare list.
    pub predictions: Value,
    #[serde(default)]
    pub transformer_no: Option<String>,
}

/// Stored collections of one inspection.
#[derive(Debug, Serialize)]
pub struct AnnotationsResponse {
    pub inspection_id: DbId,
    pub transformer_no: Option<String>,
    pub annotations: InspectionAnnotationState,
    pub summary: AnnotationSummary,
    /// Stored or submitted entries that could not be decoded.
    pub skipped: Vec<SkippedEntry>,
}

/// Result of a merge.
#[derive(Debug, Serialize)]
pub struct MergeResponse {
    #[serde(flatten)]
    pub annotations: AnnotationsResponse,
    pub stats: MergeStats,
}

/// Effective view in its wire wrapper.
#[derive(Debug, Serialize)]
pub struct EffectiveViewResponse {
    pub inspection_id: DbId,
    pub predictions: EffectiveView,
}

/* --------------------------------------------------------------------------
   Helpers
   -------------------------------------------------------------------------- */

fn not_found(inspection_id: DbId) -> CoreError {
    CoreError::NotFound {
        entity: "InspectionAnnotations",
        id: inspection_id,
    }
}

/// Load and lock the stored state, or 404.
async fn load_locked(
    conn: &mut PgConnection,
    inspection_id: DbId,
) -> AppResult<(Option<String>, DecodedState)> {
    let row = InspectionAnnotationRepo::load_for_update(conn, inspection_id)
        .await?
        .ok_or_else(|| not_found(inspection_id))?;
    let decoded = row.decode()?;
    Ok((row.transformer_no, decoded))
}

/// Tag untagged entries and write the state back.
async fn store(
    conn: &mut PgConnection,
    inspection_id: DbId,
    state: &mut InspectionAnnotationState,
) -> AppResult<()> {
    state.assign_missing_ids(Uuid::now_v7);
    InspectionAnnotationRepo::replace(conn, inspection_id, &encode_state(state)?)
        .await?
        .ok_or_else(|| not_found(inspection_id))?;
    Ok(())
}

fn log_skipped(inspection_id: DbId, skipped: &[SkippedEntry]) {
    for entry in skipped {
        tracing::warn!(
            inspection_id,
            collection = entry.collection,
            index = entry.index,
            reason = %entry.reason,
            "Skipped malformed annotation entry"
        );
    }
}

fn annotations_response(
    inspection_id: DbId,
    transformer_no: Option<String>,
    annotations: InspectionAnnotationState,
    skipped: Vec<SkippedEntry>,
) -> AnnotationsResponse {
    AnnotationsResponse {
        inspection_id,
        transformer_no,
        summary: annotations.summary(),
        annotations,
        skipped,
    }
}

/* --------------------------------------------------------------------------
   Handlers
   -------------------------------------------------------------------------- */

/// GET /inspections/{id}/annotations
///
/// Stored predictions, records and tombstones with their summary.
pub async fn get_annotations(
    State(state): State<AppState>,
    Path(inspection_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let row = InspectionAnnotationRepo::find(&state.pool, inspection_id)
        .await?
        .ok_or_else(|| not_found(inspection_id))?;
    let decoded = row.decode()?;
    log_skipped(inspection_id, &decoded.skipped);

    Ok(Json(DataResponse {
        data: annotations_response(
            inspection_id,
            row.transformer_no,
            decoded.state,
            decoded.skipped,
        ),
    }))
}

/// GET /inspections/{id}/annotations/effective
///
/// The box set to display: surviving predictions, then surviving records.
pub async fn get_effective_view(
    State(state): State<AppState>,
    Path(inspection_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let row = InspectionAnnotationRepo::find(&state.pool, inspection_id)
        .await?
        .ok_or_else(|| not_found(inspection_id))?;
    let decoded = row.decode()?;
    log_skipped(inspection_id, &decoded.skipped);

    Ok(Json(DataResponse {
        data: EffectiveViewResponse {
            inspection_id,
            predictions: build_effective_view(&decoded.state),
        },
    }))
}

/// PUT /inspections/{id}/annotations
///
/// Merge a batch of edits, additions and deletions into the stored state.
/// Creates the inspection's row on first use.
pub async fn save_annotations(
    State(state): State<AppState>,
    Path(inspection_id): Path<DbId>,
    Json(input): Json<SaveAnnotationsRequest>,
) -> AppResult<impl IntoResponse> {
    let mut incoming = decode_update(
        &input.edited_or_manually_added_boxes,
        &input.deleted_bounding_boxes,
    )?;
    incoming.update.stamp_missing_timestamps(Utc::now());

    let mut tx = state.pool.begin().await?;
    InspectionAnnotationRepo::initialize(&mut *tx, inspection_id, input.transformer_no.as_deref())
        .await?;
    let (transformer_no, current) = load_locked(&mut *tx, inspection_id).await?;

    let outcome = apply_annotation_update(&current.state, &incoming.update);
    let mut next = outcome.state;
    store(&mut *tx, inspection_id, &mut next).await?;
    tx.commit().await?;

    let mut skipped = current.skipped;
    skipped.extend(incoming.skipped);
    log_skipped(inspection_id, &skipped);

    tracing::info!(
        inspection_id,
        edits = incoming.update.edits.len(),
        deletions = incoming.update.deletions.len(),
        conflicting_deletions = outcome.stats.conflicting_deletions,
        duplicate_deletions = outcome.stats.duplicate_deletions,
        tombstones_added = outcome.stats.tombstones_added,
        tombstones_resurrected = outcome.stats.tombstones_resurrected,
        "Annotations merged"
    );

    Ok(Json(DataResponse {
        data: MergeResponse {
            annotations: annotations_response(inspection_id, transformer_no, next, skipped),
            stats: outcome.stats,
        },
    }))
}

/// POST /inspections/{id}/annotations/recover
///
/// Restore a deleted box into the AI list or the edited list.
pub async fn recover_deleted_box(
    State(state): State<AppState>,
    Path(inspection_id): Path<DbId>,
    Json(body): Json<Value>,
) -> AppResult<impl IntoResponse> {
    let input = RecoveryRequest::from_value(&body)?;

    let mut tx = state.pool.begin().await?;
    let (transformer_no, current) = load_locked(&mut *tx, inspection_id).await?;

    let mut next = recover_box(&current.state, &input)?;
    store(&mut *tx, inspection_id, &mut next).await?;
    tx.commit().await?;

    log_skipped(inspection_id, &current.skipped);
    tracing::info!(
        inspection_id,
        target = %input.target,
        destination = input.destination.as_deref().unwrap_or("default"),
        "Deleted box recovered"
    );

    Ok(Json(DataResponse {
        data: annotations_response(inspection_id, transformer_no, next, current.skipped),
    }))
}

/// PUT /inspections/{id}/annotations/predictions
///
/// Store a fresh detector result. Human edits and deletions are kept, and
/// new predictions landing on known areas inherit their ids.
pub async fn ingest_predictions(
    State(state): State<AppState>,
    Path(inspection_id): Path<DbId>,
    Json(input): Json<IngestPredictionsRequest>,
) -> AppResult<impl IntoResponse> {
    let mut skipped = Vec::new();
    let predictions = decode_predictions(&input.predictions, &mut skipped)?;

    let mut tx = state.pool.begin().await?;
    InspectionAnnotationRepo::initialize(&mut *tx, inspection_id, input.transformer_no.as_deref())
        .await?;
    let (transformer_no, current) = load_locked(&mut *tx, inspection_id).await?;

    let mut next = current.state;
    next.replace_predictions(predictions);
    store(&mut *tx, inspection_id, &mut next).await?;
    tx.commit().await?;

    skipped.extend(current.skipped);
    log_skipped(inspection_id, &skipped);
    tracing::info!(
        inspection_id,
        predictions = next.predictions.len(),
        "Predictions ingested"
    );

    Ok(Json(DataResponse {
        data: annotations_response(inspection_id, transformer_no, next, skipped),
    }))
}

/// DELETE /inspections/{id}/annotations
///
/// Drop all three collections, e.g. after the image was removed.
pub async fn clear_annotations(
    State(state): State<AppState>,
    Path(inspection_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !InspectionAnnotationRepo::clear(&state.pool, inspection_id).await? {
        return Err(not_found(inspection_id).into());
    }
    tracing::info!(inspection_id, "Annotations cleared");
    Ok(StatusCode::NO_CONTENT)
}
