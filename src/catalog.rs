//! Export catalog.
//!
//! Storage-agnostic repository ports for export and query definitions, plus an
//! in-memory implementation that can be loaded from a JSON document:
//!
//! ```json
//! {
//!   "queries": [ { "name": "...", "columns": [...], "joins": [...] } ],
//!   "exports": [ { "name": "...", "fields": [...], "data_source": {...} } ]
//! }
//! ```
//!
//! A query without an export of the same name gets one derived from its
//! columns (see [`export_from_query`]).

use crate::error::{ExportError, ExportResult};
use crate::models::{DataSource, Export, FieldModel, Query};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// Export definitions by name.
pub trait ExportRepository: Send + Sync {
    fn find_by_name(&self, name: &str) -> Option<Export>;
    fn find_all(&self) -> Vec<Export>;
    /// Validate and store an export, replacing one with the same name.
    fn save(&self, export: Export) -> ExportResult<()>;
}

/// Query-by-example definitions by name.
pub trait QueryRepository: Send + Sync {
    fn find_by_name(&self, name: &str) -> Option<Query>;
    fn find_all(&self) -> Vec<Query>;
    /// Validate and store a query, replacing one with the same name.
    fn save(&self, query: Query) -> ExportResult<()>;
}

/// Build an export that outputs every column of a query in declaration order.
///
/// Field name and property are the column's output alias, the label is the
/// upper-cased column name.
pub fn export_from_query(query: &Query) -> ExportResult<Export> {
    query.validate()?;

    let fields = query
        .columns
        .iter()
        .zip(query.output_names())
        .enumerate()
        .map(|(position, (column, alias))| {
            FieldModel::new(alias, position as u32)
                .with_label(column.name.to_uppercase())
                .with_type(column.field_type)
        })
        .collect();

    Ok(Export::new(
        query.name.clone(),
        fields,
        DataSource::query(query.name.clone(), query.clone()),
    ))
}

/// Serialized catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub queries: Vec<Query>,
    #[serde(default)]
    pub exports: Vec<Export>,
}

/// In-memory catalog implementing both repository ports.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    exports: RwLock<HashMap<String, Export>>,
    queries: RwLock<HashMap<String, Query>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog from a parsed document, validating every entry.
    pub fn from_document(document: CatalogDocument) -> ExportResult<Self> {
        let catalog = Self::new();
        for export in document.exports {
            ExportRepository::save(&catalog, export)?;
        }
        for query in document.queries {
            if ExportRepository::find_by_name(&catalog, &query.name).is_none() {
                let derived = export_from_query(&query)?;
                debug!(export = %derived.name, fields = derived.fields.len(), "Derived export from query");
                ExportRepository::save(&catalog, derived)?;
            }
            QueryRepository::save(&catalog, query)?;
        }
        Ok(catalog)
    }

    /// Parse a catalog from JSON text.
    pub fn from_json(json: &str) -> ExportResult<Self> {
        let document: CatalogDocument = serde_json::from_str(json).map_err(|e| {
            ExportError::configuration(format!("Invalid catalog JSON: {}", e), "catalog")
        })?;
        Self::from_document(document)
    }

    /// Load a catalog file.
    pub fn from_file(path: &Path) -> ExportResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            ExportError::configuration(
                format!("Failed to read catalog: {}", e),
                path.display().to_string(),
            )
        })?;
        let catalog = Self::from_json(&json)?;
        info!(
            path = %path.display(),
            exports = catalog.exports.read().len(),
            queries = catalog.queries.read().len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    /// Snapshot of the catalog contents.
    pub fn to_document(&self) -> CatalogDocument {
        let mut queries: Vec<_> = self.queries.read().values().cloned().collect();
        queries.sort_by(|a, b| a.name.cmp(&b.name));
        let mut exports: Vec<_> = self.exports.read().values().cloned().collect();
        exports.sort_by(|a, b| a.name.cmp(&b.name));
        CatalogDocument { queries, exports }
    }
}

impl ExportRepository for InMemoryCatalog {
    fn find_by_name(&self, name: &str) -> Option<Export> {
        self.exports.read().get(name).cloned()
    }

    fn find_all(&self) -> Vec<Export> {
        self.exports.read().values().cloned().collect()
    }

    fn save(&self, export: Export) -> ExportResult<()> {
        export.validate()?;
        self.exports.write().insert(export.name.clone(), export);
        Ok(())
    }
}

impl QueryRepository for InMemoryCatalog {
    fn find_by_name(&self, name: &str) -> Option<Query> {
        self.queries.read().get(name).cloned()
    }

    fn find_all(&self) -> Vec<Query> {
        self.queries.read().values().cloned().collect()
    }

    fn save(&self, query: Query) -> ExportResult<()> {
        if query.name.trim().is_empty() {
            return Err(ExportError::configuration(
                "query name must not be blank",
                "query",
            ));
        }
        query.validate()?;
        self.queries.write().insert(query.name.clone(), query);
        Ok(())
    }
}
