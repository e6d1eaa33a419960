pub mod annotation;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /inspections/{id}/annotations                  stored collections, merge, clear
/// /inspections/{id}/annotations/effective        effective view
/// /inspections/{id}/annotations/recover          recover a deleted box
/// /inspections/{id}/annotations/predictions      ingest detector output
///
/// /annotations/changes                           inspections with human changes
/// /annotations/stats                             store-wide counts
/// /annotations/cleanup                           retraining cleanup
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/inspections", annotation::inspection_router())
        .nest("/annotations", annotation::maintenance_router())
}
