//! Annotation reconciliation engine for thermal inspection images.
//!
//! Pure domain logic with no I/O: box matching, the per-inspection
//! annotation state, the merge/recovery engines and the effective view.

pub mod annotation;
pub mod bbox;
pub mod error;
pub mod types;
