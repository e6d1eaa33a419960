//! Integration tests for the inspection annotation record store.
//!
//! Exercises the repository against a real database to verify that:
//! - Rows are created on first use and keep their transformer number
//! - `replace` stores all three collections atomically inside a transaction
//! - Clearing empties the collections but keeps the row
//! - Change listings and statistics only count edited/deleted entries

use assert_matches::assert_matches;
use serde_json::json;
use sqlx::PgPool;
use thermal_core::annotation::codec::{encode_state, EncodedCollections};
use thermal_core::annotation::{
    apply_annotation_update, AnnotationUpdate, InspectionAnnotationState, Provenance,
};
use thermal_db::repositories::InspectionAnnotationRepo;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed(pool: &PgPool, inspection_id: i64, transformer_no: &str, collections: EncodedCollections) {
    let mut tx = pool.begin().await.unwrap();
    InspectionAnnotationRepo::initialize(&mut *tx, inspection_id, Some(transformer_no))
        .await
        .unwrap();
    InspectionAnnotationRepo::replace(&mut *tx, inspection_id, &collections)
        .await
        .unwrap()
        .expect("row was just initialized");
    tx.commit().await.unwrap();
}

fn predictions_only() -> EncodedCollections {
    EncodedCollections {
        ai_predictions: json!({"predictions": [{"class": 0, "confidence": 0.9, "box": [10, 10, 50, 50]}]}),
        edited_boxes: json!([]),
        deleted_boxes: json!([]),
    }
}

fn with_changes() -> EncodedCollections {
    EncodedCollections {
        ai_predictions: json!({"predictions": []}),
        edited_boxes: json!([{"box": [1, 1, 5, 5], "type": "added"}]),
        deleted_boxes: json!([{"box": [10, 10, 50, 50], "deletedFrom": "ai"}]),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_initialize_creates_empty_row(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    InspectionAnnotationRepo::initialize(&mut *conn, 7, Some("TX-001"))
        .await
        .unwrap();
    // A second call without a transformer number keeps the first one.
    InspectionAnnotationRepo::initialize(&mut *conn, 7, None)
        .await
        .unwrap();
    drop(conn);

    let row = InspectionAnnotationRepo::find(&pool, 7).await.unwrap().unwrap();
    assert_eq!(row.transformer_no.as_deref(), Some("TX-001"));

    let decoded = row.decode().unwrap();
    assert!(decoded.state.is_empty());
    assert!(decoded.skipped.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_find_missing_returns_none(pool: PgPool) {
    assert!(InspectionAnnotationRepo::find(&pool, 999).await.unwrap().is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_merge_round_trip_through_store(pool: PgPool) {
    seed(&pool, 1, "TX-001", predictions_only()).await;

    let mut tx = pool.begin().await.unwrap();
    let row = InspectionAnnotationRepo::load_for_update(&mut *tx, 1)
        .await
        .unwrap()
        .unwrap();
    let state = row.decode().unwrap().state;
    let update: AnnotationUpdate = serde_json::from_value(json!({
        "edits": [],
        "deletions": [{"box": [10, 10, 50, 50]}]
    }))
    .unwrap();
    let merged = apply_annotation_update(&state, &update).state;
    InspectionAnnotationRepo::replace(&mut *tx, 1, &encode_state(&merged).unwrap())
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let stored = InspectionAnnotationRepo::find(&pool, 1)
        .await
        .unwrap()
        .unwrap()
        .decode()
        .unwrap()
        .state;
    assert!(stored.predictions.is_empty());
    assert_eq!(stored.tombstones.len(), 1);
    assert_eq!(stored.tombstones[0].deleted_from, Some(Provenance::Ai));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_rolled_back_replace_is_not_visible(pool: PgPool) {
    seed(&pool, 1, "TX-001", predictions_only()).await;

    let mut tx = pool.begin().await.unwrap();
    let empty = encode_state(&InspectionAnnotationState::default()).unwrap();
    InspectionAnnotationRepo::replace(&mut *tx, 1, &empty)
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    let row = InspectionAnnotationRepo::find(&pool, 1).await.unwrap().unwrap();
    assert_eq!(row.decode().unwrap().state.predictions.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_replace_missing_row_returns_none(pool: PgPool) {
    let mut conn = pool.acquire().await.unwrap();
    let result = InspectionAnnotationRepo::replace(&mut *conn, 42, &predictions_only()).await;
    assert_matches!(result, Ok(None));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_clear_keeps_row(pool: PgPool) {
    seed(&pool, 1, "TX-001", with_changes()).await;

    assert!(InspectionAnnotationRepo::clear(&pool, 1).await.unwrap());
    assert!(!InspectionAnnotationRepo::clear(&pool, 2).await.unwrap());

    let row = InspectionAnnotationRepo::find(&pool, 1).await.unwrap().unwrap();
    assert!(row.decode().unwrap().state.is_empty());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_clear_by_transformer_only_touches_that_transformer(pool: PgPool) {
    seed(&pool, 1, "TX-001", with_changes()).await;
    seed(&pool, 2, "TX-001", with_changes()).await;
    seed(&pool, 3, "TX-002", with_changes()).await;

    let cleared = InspectionAnnotationRepo::clear_by_transformer(&pool, "TX-001")
        .await
        .unwrap();
    assert_eq!(cleared, 2);

    let remaining = InspectionAnnotationRepo::list_with_changes(&pool, None)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].inspection_id, 3);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_clear_all_counts_rows_with_content(pool: PgPool) {
    seed(&pool, 1, "TX-001", with_changes()).await;
    seed(&pool, 2, "TX-002", predictions_only()).await;
    let mut conn = pool.acquire().await.unwrap();
    InspectionAnnotationRepo::initialize(&mut *conn, 3, None)
        .await
        .unwrap();
    drop(conn);

    assert_eq!(InspectionAnnotationRepo::clear_all(&pool).await.unwrap(), 2);
    assert_eq!(InspectionAnnotationRepo::clear_all(&pool).await.unwrap(), 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_with_changes_filters_and_counts(pool: PgPool) {
    seed(&pool, 1, "TX-001", with_changes()).await;
    seed(&pool, 2, "TX-001", predictions_only()).await;
    seed(&pool, 3, "TX-002", with_changes()).await;

    let all = InspectionAnnotationRepo::list_with_changes(&pool, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let tx1 = InspectionAnnotationRepo::list_with_changes(&pool, Some("TX-001"))
        .await
        .unwrap();
    assert_eq!(tx1.len(), 1);
    assert_eq!(tx1[0].inspection_id, 1);
    assert_eq!(tx1[0].edited_count, 1);
    assert_eq!(tx1[0].deleted_count, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_legacy_text_blobs_are_counted_as_empty(pool: PgPool) {
    seed(
        &pool,
        1,
        "TX-001",
        EncodedCollections {
            ai_predictions: json!(null),
            edited_boxes: json!("[{\"box\": [1, 1, 5, 5]}]"),
            deleted_boxes: json!([]),
        },
    )
    .await;

    let stats = InspectionAnnotationRepo::stats(&pool).await.unwrap();
    assert_eq!(stats.total_inspections, 1);
    assert_eq!(stats.inspections_with_changes, 0);

    // The codec still reads the text blob.
    let row = InspectionAnnotationRepo::find(&pool, 1).await.unwrap().unwrap();
    assert_eq!(row.decode().unwrap().state.records.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_stats_counts_each_kind_of_change(pool: PgPool) {
    seed(&pool, 1, "TX-001", with_changes()).await;
    seed(
        &pool,
        2,
        "TX-001",
        EncodedCollections {
            ai_predictions: json!({"predictions": []}),
            edited_boxes: json!([]),
            deleted_boxes: json!([{"box": [0, 0, 10, 10], "deletedFrom": "edited"}]),
        },
    )
    .await;
    seed(&pool, 3, "TX-002", predictions_only()).await;

    let stats = InspectionAnnotationRepo::stats(&pool).await.unwrap();
    assert_eq!(stats.total_inspections, 3);
    assert_eq!(stats.inspections_with_changes, 2);
    assert_eq!(stats.inspections_with_edited_boxes, 1);
    assert_eq!(stats.inspections_with_deleted_boxes, 2);
}
