//! Row structs and DTOs, one module per table.

pub mod inspection_annotation;
