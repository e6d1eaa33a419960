//! Liveness of the service and its annotation store.
//!
//! ```text
//! GET /health   status, store reachability, inspection count, matcher tolerances
//! ```

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use thermal_core::bbox::{DUPLICATE_TOLERANCE, SEMANTIC_TOLERANCE};
use thermal_db::repositories::InspectionAnnotationRepo;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when the store cannot be read.
    pub status: &'static str,
    pub version: &'static str,
    pub store: StoreHealth,
    pub matching: MatchingTolerances,
}

#[derive(Serialize)]
pub struct StoreHealth {
    pub reachable: bool,
    /// Absent when the store is unreachable.
    pub inspections: Option<i64>,
}

/// Coordinate tolerances the merge and recovery engines compare boxes with.
#[derive(Serialize)]
pub struct MatchingTolerances {
    pub semantic: f64,
    pub duplicate: f64,
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let inspections = match InspectionAnnotationRepo::stats(&state.pool).await {
        Ok(stats) => Some(stats.total_inspections),
        Err(e) => {
            tracing::warn!(error = %e, "Annotation store unreachable");
            None
        }
    };
    let reachable = inspections.is_some();

    Json(HealthResponse {
        status: if reachable { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store: StoreHealth {
            reachable,
            inspections,
        },
        matching: MatchingTolerances {
            semantic: SEMANTIC_TOLERANCE,
            duplicate: DUPLICATE_TOLERANCE,
        },
    })
}

/// Mount health check routes (root level, not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
