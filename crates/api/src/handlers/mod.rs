pub mod annotation;
pub mod annotation_maintenance;
