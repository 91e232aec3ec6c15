//! Database access layer.
//!
//! This module provides:
//! - Connection pool management
//! - Data source execution (scripts and synthesized queries)
//! - The read-only SQL guard
//! - Script sources with a refreshable cache
//! - Row decoding to JSON

pub mod executor;
pub mod pool;
pub mod scripts;
pub mod sql_guard;
pub mod types;

pub use executor::DataSourceExecutor;
pub use pool::{DatabaseType, DbPool};
pub use scripts::{FileScriptSource, ScriptSource, StaticScripts};
pub use sql_guard::validate_export_sql;
