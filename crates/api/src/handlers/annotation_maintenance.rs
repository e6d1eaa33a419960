//! Store-wide annotation maintenance: change listings, statistics and the
//! cleanup run after the detector has been retrained on the human edits.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use thermal_db::repositories::InspectionAnnotationRepo;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Optional transformer filter shared by listing and cleanup.
#[derive(Debug, Deserialize)]
pub struct TransformerFilter {
    pub transformer_no: Option<String>,
}

impl TransformerFilter {
    fn transformer_no(&self) -> Option<&str> {
        self.transformer_no
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub cleared: u64,
}

/// GET /annotations/changes
///
/// Inspections carrying edited records or tombstones (`?transformer_no`).
pub async fn list_changes(
    State(state): State<AppState>,
    Query(filter): Query<TransformerFilter>,
) -> AppResult<impl IntoResponse> {
    let entries =
        InspectionAnnotationRepo::list_with_changes(&state.pool, filter.transformer_no()).await?;
    Ok(Json(DataResponse { data: entries }))
}

/// GET /annotations/stats
pub async fn annotation_stats(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let stats = InspectionAnnotationRepo::stats(&state.pool).await?;
    Ok(Json(DataResponse { data: stats }))
}

/// POST /annotations/cleanup
///
/// Clear the annotation collections of every inspection, or of one
/// transformer's inspections with `?transformer_no`.
pub async fn cleanup_annotations(
    State(state): State<AppState>,
    Query(filter): Query<TransformerFilter>,
) -> AppResult<impl IntoResponse> {
    let cleared = match filter.transformer_no() {
        Some(transformer_no) => {
            InspectionAnnotationRepo::clear_by_transformer(&state.pool, transformer_no).await?
        }
        None => InspectionAnnotationRepo::clear_all(&state.pool).await?,
    };

    tracing::info!(
        transformer_no = filter.transformer_no().unwrap_or("all"),
        cleared,
        "Annotation cleanup completed"
    );

    Ok(Json(DataResponse {
        data: CleanupResult { cleared },
    }))
}
