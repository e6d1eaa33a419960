use crate::bbox::BoundingBox;
use crate::types::DbId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Malformed box: {0}")]
    MalformedBox(String),

    #[error("No deleted box matches {0}")]
    TombstoneNotFound(BoundingBox),

    #[error("Invalid recovery destination '{0}'. Must be one of: ai, edited, manual")]
    InvalidDestination(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
