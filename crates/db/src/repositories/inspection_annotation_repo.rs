//! Repository for the `inspection_annotations` table.

use sqlx::{PgConnection, PgPool};
use thermal_core::annotation::codec::EncodedCollections;
use thermal_core::types::DbId;

use crate::models::inspection_annotation::{
    AnnotationChangeEntry, AnnotationStats, InspectionAnnotationRow,
};

/// Column list for inspection_annotations queries.
const COLUMNS: &str = "inspection_id, transformer_no, ai_predictions, edited_boxes, \
    deleted_boxes, created_at, updated_at";

/// Number of entries in a stored edited/deleted collection. Legacy non-array
/// values count as empty.
const EDITED_COUNT: &str = "(CASE WHEN jsonb_typeof(edited_boxes) = 'array' \
    THEN jsonb_array_length(edited_boxes) ELSE 0 END)::BIGINT";
const DELETED_COUNT: &str = "(CASE WHEN jsonb_typeof(deleted_boxes) = 'array' \
    THEN jsonb_array_length(deleted_boxes) ELSE 0 END)::BIGINT";

/// SET clause resetting all three collections to empty.
const CLEARED: &str = "ai_predictions = '{\"predictions\": []}'::jsonb, \
    edited_boxes = '[]'::jsonb, deleted_boxes = '[]'::jsonb";

/// Loads and stores the annotation collections of one inspection.
///
/// Merges and recoveries must run between [`Self::load_for_update`] and
/// [`Self::replace`] inside one transaction, so concurrent writers to the
/// same inspection are serialized by the row lock.
pub struct InspectionAnnotationRepo;

impl InspectionAnnotationRepo {
    /// Find the annotation row of an inspection.
    pub async fn find(
        pool: &PgPool,
        inspection_id: DbId,
    ) -> Result<Option<InspectionAnnotationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM inspection_annotations WHERE inspection_id = $1");
        sqlx::query_as::<_, InspectionAnnotationRow>(&query)
            .bind(inspection_id)
            .fetch_optional(pool)
            .await
    }

    /// Create the empty row for an inspection if it does not exist yet.
    ///
    /// A non-null `transformer_no` is recorded on an existing row as well.
    pub async fn initialize(
        conn: &mut PgConnection,
        inspection_id: DbId,
        transformer_no: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO inspection_annotations (inspection_id, transformer_no)
             VALUES ($1, $2)
             ON CONFLICT (inspection_id) DO UPDATE
                SET transformer_no = COALESCE(EXCLUDED.transformer_no, inspection_annotations.transformer_no)",
        )
        .bind(inspection_id)
        .bind(transformer_no)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Load and lock the row for the rest of the caller's transaction.
    pub async fn load_for_update(
        conn: &mut PgConnection,
        inspection_id: DbId,
    ) -> Result<Option<InspectionAnnotationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM inspection_annotations
             WHERE inspection_id = $1
             FOR UPDATE"
        );
        sqlx::query_as::<_, InspectionAnnotationRow>(&query)
            .bind(inspection_id)
            .fetch_optional(conn)
            .await
    }

    /// Overwrite all three collections at once.
    pub async fn replace(
        conn: &mut PgConnection,
        inspection_id: DbId,
        collections: &EncodedCollections,
    ) -> Result<Option<InspectionAnnotationRow>, sqlx::Error> {
        let query = format!(
            "UPDATE inspection_annotations SET
                ai_predictions = $2,
                edited_boxes = $3,
                deleted_boxes = $4
             WHERE inspection_id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, InspectionAnnotationRow>(&query)
            .bind(inspection_id)
            .bind(&collections.ai_predictions)
            .bind(&collections.edited_boxes)
            .bind(&collections.deleted_boxes)
            .fetch_optional(conn)
            .await
    }

    /// Empty all collections of one inspection (image removed).
    ///
    /// Returns `true` if the row existed.
    pub async fn clear(pool: &PgPool, inspection_id: DbId) -> Result<bool, sqlx::Error> {
        let query = format!("UPDATE inspection_annotations SET {CLEARED} WHERE inspection_id = $1");
        let result = sqlx::query(&query).bind(inspection_id).execute(pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Empty the collections of every inspection (retraining cleanup).
    ///
    /// Returns the number of rows that had anything to clear.
    pub async fn clear_all(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let query = format!(
            "UPDATE inspection_annotations SET {CLEARED}
             WHERE {EDITED_COUNT} > 0 OR {DELETED_COUNT} > 0
                OR ai_predictions <> '{{\"predictions\": []}}'::jsonb"
        );
        let result = sqlx::query(&query).execute(pool).await?;
        tracing::debug!(rows = result.rows_affected(), "Cleared all inspection annotations");
        Ok(result.rows_affected())
    }

    /// Empty the collections of every inspection of one transformer.
    pub async fn clear_by_transformer(
        pool: &PgPool,
        transformer_no: &str,
    ) -> Result<u64, sqlx::Error> {
        let query = format!("UPDATE inspection_annotations SET {CLEARED} WHERE transformer_no = $1");
        let result = sqlx::query(&query).bind(transformer_no).execute(pool).await?;
        tracing::debug!(
            transformer_no,
            rows = result.rows_affected(),
            "Cleared inspection annotations for transformer"
        );
        Ok(result.rows_affected())
    }

    /// Inspections with at least one edited record or tombstone, most
    /// recently changed first, optionally limited to one transformer.
    pub async fn list_with_changes(
        pool: &PgPool,
        transformer_no: Option<&str>,
    ) -> Result<Vec<AnnotationChangeEntry>, sqlx::Error> {
        let query = format!(
            "SELECT inspection_id, transformer_no,
                    {EDITED_COUNT} AS edited_count,
                    {DELETED_COUNT} AS deleted_count,
                    updated_at
             FROM inspection_annotations
             WHERE ({EDITED_COUNT} > 0 OR {DELETED_COUNT} > 0)
               AND ($1::TEXT IS NULL OR transformer_no = $1)
             ORDER BY updated_at DESC, inspection_id ASC"
        );
        sqlx::query_as::<_, AnnotationChangeEntry>(&query)
            .bind(transformer_no)
            .fetch_all(pool)
            .await
    }

    /// Store-wide counts of inspections with human changes.
    pub async fn stats(pool: &PgPool) -> Result<AnnotationStats, sqlx::Error> {
        let query = format!(
            "SELECT COUNT(*) AS total_inspections,
                    COUNT(*) FILTER (WHERE {EDITED_COUNT} > 0 OR {DELETED_COUNT} > 0)
                        AS inspections_with_changes,
                    COUNT(*) FILTER (WHERE {EDITED_COUNT} > 0) AS inspections_with_edited_boxes,
                    COUNT(*) FILTER (WHERE {DELETED_COUNT} > 0) AS inspections_with_deleted_boxes
             FROM inspection_annotations"
        );
        sqlx::query_as::<_, AnnotationStats>(&query).fetch_one(pool).await
    }
}
