//! Bounding-box annotation reconciliation.
//!
//! Three independently mutable collections describe one inspection: the AI
//! predictions, the edited/added records and the deletion tombstones. The
//! merge and recovery engines are the only writers; the effective view is
//! derived from them and never stored.

pub mod codec;
pub mod effective;
pub mod merge;
pub mod model;
pub mod recovery;
pub mod update;

pub use effective::{
    build_effective_view, EffectiveBox, EffectiveKind, EffectiveSource, EffectiveView,
};
pub use merge::{apply_annotation_update, MergeOutcome, MergeStats};
pub use model::{
    AnnotationKind, AnnotationRecord, AnnotationSummary, ClassLabel, InspectionAnnotationState,
    Prediction, Provenance, Tombstone,
};
pub use recovery::{recover_box, RecoveryRequest};
pub use update::{AnnotationUpdate, IncomingDeletion, IncomingEdit};
