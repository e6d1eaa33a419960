//! Route definitions for inspection annotations.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::{annotation, annotation_maintenance};
use crate::state::AppState;

/// Inspection-scoped annotation routes, nested under `/inspections`.
///
/// ```text
/// GET    /{id}/annotations              get_annotations
/// PUT    /{id}/annotations              save_annotations
/// DELETE /{id}/annotations              clear_annotations
/// GET    /{id}/annotations/effective    get_effective_view
/// POST   /{id}/annotations/recover      recover_deleted_box
/// PUT    /{id}/annotations/predictions  ingest_predictions
/// ```
pub fn inspection_router() -> Router<AppState> {
    Router::new()
        .route(
            "/{id}/annotations",
            get(annotation::get_annotations)
                .put(annotation::save_annotations)
                .delete(annotation::clear_annotations),
        )
        .route(
            "/{id}/annotations/effective",
            get(annotation::get_effective_view),
        )
        .route(
            "/{id}/annotations/recover",
            post(annotation::recover_deleted_box),
        )
        .route(
            "/{id}/annotations/predictions",
            put(annotation::ingest_predictions),
        )
}

/// Store-wide maintenance routes, nested under `/annotations`.
///
/// ```text
/// GET    /changes    list_changes (?transformer_no)
/// GET    /stats      annotation_stats
/// POST   /cleanup    cleanup_annotations (?transformer_no)
/// ```
pub fn maintenance_router() -> Router<AppState> {
    Router::new()
        .route("/changes", get(annotation_maintenance::list_changes))
        .route("/stats", get(annotation_maintenance::annotation_stats))
        .route("/cleanup", post(annotation_maintenance::cleanup_annotations))
}
