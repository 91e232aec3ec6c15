//! Data models for the export engine.
//!
//! This module re-exports all model types used throughout the application.

pub mod export;
pub mod field;
pub mod query;
pub mod request;

// Re-export commonly used types
pub use export::{DataSource, Export, Row, RowSource};
pub use field::{FieldModel, FieldType};
pub use query::{Column, Join, JoinType, Query, Table};
pub use request::{ExportRequest, FileType};
