//! Lenient JSON codec for stored collections and incoming batches.
//!
//! Stored blobs predate the typed model: collections may be arrays, single
//! objects, `null`, or strings holding any of those, and individual entries
//! may carry unusable boxes. Such entries are skipped and reported instead
//! of failing the whole inspection.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::annotation::model::{AnnotationRecord, InspectionAnnotationState, Prediction, Tombstone};
use crate::annotation::update::AnnotationUpdate;
use crate::error::CoreError;

/// Key wrapping the prediction list in stored and wire form.
pub const PREDICTIONS_KEY: &str = "predictions";

/// One entry dropped during decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedEntry {
    pub collection: &'static str,
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedState {
    pub state: InspectionAnnotationState,
    pub skipped: Vec<SkippedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedUpdate {
    pub update: AnnotationUpdate,
    pub skipped: Vec<SkippedEntry>,
}

/// The three collections in their stored JSON form.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCollections {
    pub ai_predictions: Value,
    pub edited_boxes: Value,
    pub deleted_boxes: Value,
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a detector result: `{"predictions": [...]}`, a bare array or `null`.
pub fn decode_predictions(
    value: &Value,
    skipped: &mut Vec<SkippedEntry>,
) -> Result<Vec<Prediction>, CoreError> {
    decode_entries("predictions", value, skipped)
}

pub fn decode_records(
    value: &Value,
    skipped: &mut Vec<SkippedEntry>,
) -> Result<Vec<AnnotationRecord>, CoreError> {
    decode_entries("edited", value, skipped)
}

pub fn decode_tombstones(
    value: &Value,
    skipped: &mut Vec<SkippedEntry>,
) -> Result<Vec<Tombstone>, CoreError> {
    decode_entries("deleted", value, skipped)
}

/// Decode the three stored collections of one inspection.
pub fn decode_state(
    ai_predictions: &Value,
    edited_boxes: &Value,
    deleted_boxes: &Value,
) -> Result<DecodedState, CoreError> {
    let mut skipped = Vec::new();
    let state = InspectionAnnotationState {
        predictions: decode_predictions(ai_predictions, &mut skipped)?,
        records: decode_records(edited_boxes, &mut skipped)?,
        tombstones: decode_tombstones(deleted_boxes, &mut skipped)?,
    };
    Ok(DecodedState { state, skipped })
}

/// Decode an incoming batch from its two request fields.
pub fn decode_update(edits: &Value, deletions: &Value) -> Result<DecodedUpdate, CoreError> {
    let mut skipped = Vec::new();
    let update = AnnotationUpdate {
        edits: decode_entries("edits", edits, &mut skipped)?,
        deletions: decode_entries("deletions", deletions, &mut skipped)?,
    };
    Ok(DecodedUpdate { update, skipped })
}

fn decode_entries<T: DeserializeOwned>(
    collection: &'static str,
    value: &Value,
    skipped: &mut Vec<SkippedEntry>,
) -> Result<Vec<T>, CoreError> {
    let items = unwrap_collection(collection, value)?;
    let mut out = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        if !item.is_object() {
            skipped.push(SkippedEntry {
                collection,
                index,
                reason: format!("expected an object, got {item}"),
            });
            continue;
        }
        match serde_json::from_value::<T>(item) {
            Ok(entry) => out.push(entry),
            Err(e) => skipped.push(SkippedEntry {
                collection,
                index,
                reason: e.to_string(),
            }),
        }
    }
    Ok(out)
}

/// Reduce any accepted collection shape to a list of raw entries.
fn unwrap_collection(collection: &str, value: &Value) -> Result<Vec<Value>, CoreError> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => Ok(items.clone()),
        Value::Object(map) => match map.get(PREDICTIONS_KEY) {
            Some(inner) => unwrap_collection(collection, inner),
            None => Ok(vec![value.clone()]),
        },
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(Vec::new());
            }
            let parsed: Value = serde_json::from_str(text).map_err(|e| {
                CoreError::Validation(format!("{collection} is not valid JSON: {e}"))
            })?;
            if parsed.is_string() {
                return Err(CoreError::Validation(format!(
                    "{collection} holds a nested JSON string"
                )));
            }
            unwrap_collection(collection, &parsed)
        }
        other => Err(CoreError::Validation(format!(
            "{collection} must be a list of boxes, got {other}"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

pub fn encode_state(state: &InspectionAnnotationState) -> Result<EncodedCollections, CoreError> {
    Ok(EncodedCollections {
        ai_predictions: json!({ PREDICTIONS_KEY: encode(&state.predictions)? }),
        edited_boxes: encode(&state.records)?,
        deleted_boxes: encode(&state.tombstones)?,
    })
}

fn encode<T: Serialize>(entries: &T) -> Result<Value, CoreError> {
    serde_json::to_value(entries)
        .map_err(|e| CoreError::Internal(format!("Failed to encode annotations: {e}")))
}
