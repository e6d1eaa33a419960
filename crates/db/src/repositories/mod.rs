//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that take
//! `&PgPool`, or a `&mut PgConnection` when the call must join a caller's
//! transaction.

pub mod inspection_annotation_repo;

pub use inspection_annotation_repo::InspectionAnnotationRepo;
