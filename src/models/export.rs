//! Export definitions.
//!
//! An `Export` combines ordered field metadata with exactly one `DataSource`.
//! The data source carries at most one row source: a stored script or a
//! query-by-example definition. The two are mutually exclusive by
//! construction, so a catalog entry naming both is rejected when it is parsed.

use crate::error::{ExportError, ExportResult};
use crate::models::field::{FieldModel, duplicate_index, ordered_fields};
use crate::models::query::Query;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A fetched row: column/property name to value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Where a data source gets its rows from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowSource {
    /// Name of a stored SQL script
    Script(String),
    /// Query-by-example definition
    Query(Query),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "DataSourceRecord", into = "DataSourceRecord")]
pub struct DataSource {
    pub name: String,
    pub source: Option<RowSource>,
}

/// Stored shape of a data source: two optional references.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DataSourceRecord {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<Query>,
}

impl TryFrom<DataSourceRecord> for DataSource {
    type Error = String;

    fn try_from(record: DataSourceRecord) -> Result<Self, Self::Error> {
        let source = match (record.script, record.query) {
            (Some(_), Some(_)) => {
                return Err(format!(
                    "data source '{}' sets both a script and a query; choose one",
                    record.name
                ));
            }
            (Some(script), None) => Some(RowSource::Script(script)),
            (None, Some(query)) => Some(RowSource::Query(query)),
            (None, None) => None,
        };
        Ok(Self {
            name: record.name,
            source,
        })
    }
}

impl From<DataSource> for DataSourceRecord {
    fn from(ds: DataSource) -> Self {
        let (script, query) = match ds.source {
            Some(RowSource::Script(script)) => (Some(script), None),
            Some(RowSource::Query(query)) => (None, Some(query)),
            None => (None, None),
        };
        Self {
            name: ds.name,
            script,
            query,
        }
    }
}

impl DataSource {
    /// A data source with no row source; fetches nothing.
    pub fn unconfigured(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
        }
    }

    pub fn script(name: impl Into<String>, script_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: Some(RowSource::Script(script_name.into())),
        }
    }

    pub fn query(name: impl Into<String>, query: Query) -> Self {
        Self {
            name: name.into(),
            source: Some(RowSource::Query(query)),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.source.is_some()
    }

    pub fn script_name(&self) -> Option<&str> {
        match &self.source {
            Some(RowSource::Script(name)) => Some(name),
            _ => None,
        }
    }

    pub fn query_ref(&self) -> Option<&Query> {
        match &self.source {
            Some(RowSource::Query(query)) => Some(query),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub name: String,
    pub fields: Vec<FieldModel>,
    pub data_source: DataSource,
}

impl Export {
    pub fn new(name: impl Into<String>, fields: Vec<FieldModel>, data_source: DataSource) -> Self {
        Self {
            name: name.into(),
            fields,
            data_source,
        }
    }

    /// True when the export can produce rows.
    pub fn is_configured(&self) -> bool {
        self.data_source.is_configured()
    }

    /// Fields in output order.
    pub fn ordered_fields(&self) -> Vec<FieldModel> {
        ordered_fields(&self.fields)
    }

    /// Check the invariants a stored export must satisfy.
    pub fn validate(&self) -> ExportResult<()> {
        let object = format!("export '{}'", self.name);
        if self.name.trim().is_empty() {
            return Err(ExportError::configuration("export name must not be blank", object));
        }
        if let Some(index) = duplicate_index(&self.fields) {
            return Err(ExportError::configuration(
                format!("field index {} is used more than once", index),
                object,
            ));
        }
        if let Some(query) = self.data_source.query_ref() {
            query.validate()?;
        }
        Ok(())
    }
}
