//! Export factory resolution.
//!
//! The resolver maps a request's export name to a `DataFetcher`: a strategy
//! value owning everything needed to produce the export's rows. Only exports
//! whose data source carries a row source have a factory.

use crate::catalog::ExportRepository;
use crate::db::DataSourceExecutor;
use crate::error::{ExportError, ExportResult};
use crate::models::{Export, Row};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Produces the rows of one export.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    fn export(&self) -> &Export;

    async fn fetch(&self) -> ExportResult<Vec<Row>>;
}

pub trait ExportFactoryResolver: Send + Sync {
    /// True when the export exists and can produce rows.
    fn has_factory(&self, export_name: &str) -> bool;

    fn resolve(&self, export_name: &str) -> ExportResult<Box<dyn DataFetcher>>;

    /// Names of all configured exports, sorted.
    fn available_exports(&self) -> Vec<String>;
}

/// Fetches an export's rows through a `DataSourceExecutor`.
pub struct SqlDataFetcher {
    export: Export,
    executor: DataSourceExecutor,
}

impl SqlDataFetcher {
    pub fn new(export: Export, executor: DataSourceExecutor) -> Self {
        Self { export, executor }
    }
}

#[async_trait]
impl DataFetcher for SqlDataFetcher {
    fn export(&self) -> &Export {
        &self.export
    }

    async fn fetch(&self) -> ExportResult<Vec<Row>> {
        self.executor.fetch(&self.export.data_source).await
    }
}

/// Resolves exports from a catalog, reading definitions fresh per call.
pub struct MetaExportResolver {
    exports: Arc<dyn ExportRepository>,
    executor: DataSourceExecutor,
}

impl MetaExportResolver {
    pub fn new(exports: Arc<dyn ExportRepository>, executor: DataSourceExecutor) -> Self {
        Self { exports, executor }
    }

    fn configured(&self, export_name: &str) -> Option<Export> {
        self.exports
            .find_by_name(export_name)
            .filter(Export::is_configured)
    }
}

impl ExportFactoryResolver for MetaExportResolver {
    fn has_factory(&self, export_name: &str) -> bool {
        self.configured(export_name).is_some()
    }

    fn resolve(&self, export_name: &str) -> ExportResult<Box<dyn DataFetcher>> {
        let export = self
            .configured(export_name)
            .ok_or_else(|| ExportError::not_found(export_name))?;
        debug!(export = %export_name, data_source = %export.data_source.name, "Resolved export");
        Ok(Box::new(SqlDataFetcher::new(export, self.executor.clone())))
    }

    fn available_exports(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .exports
            .find_all()
            .into_iter()
            .filter(Export::is_configured)
            .map(|e| e.name)
            .collect();
        names.sort();
        names
    }
}
