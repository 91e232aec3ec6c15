//! Export Engine Library
//!
//! Metadata-driven exports: a named export request is resolved to its data
//! source, rows are fetched from a stored SQL script or a query synthesized
//! from a table/column/join graph, filtered, mapped to output fields and
//! rendered as CSV, PDF or XLSX (SQLite, PostgreSQL, MySQL).

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod writer;

pub use catalog::{ExportRepository, InMemoryCatalog, QueryRepository, export_from_query};
pub use config::Config;
pub use error::{ErrorSink, ExportError, ExportResult, Violation};
pub use pipeline::{ExportOutcome, ExportService, ExportState};
