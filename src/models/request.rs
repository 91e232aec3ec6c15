//! Export request models.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Output formats an export can be rendered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Csv,
    Pdf,
    Xlsx,
}

impl FileType {
    pub const ALL: [FileType; 3] = [FileType::Csv, FileType::Pdf, FileType::Xlsx];

    /// Parse a file type, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "pdf" => Some(Self::Pdf),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Pdf => "pdf",
            Self::Xlsx => "xlsx",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

/// A request to run one export.
///
/// `file_type` is kept as received so validation can report unknown values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub export_name: String,
    pub file_type: String,
    /// Parameters whose keys match a field property become equality filters
    #[serde(default)]
    pub parameters: BTreeMap<String, JsonValue>,
}

impl ExportRequest {
    pub fn new(export_name: impl Into<String>, file_type: impl Into<String>) -> Self {
        Self {
            export_name: export_name.into(),
            file_type: file_type.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// The parsed file type, if it is one we support.
    pub fn file_type(&self) -> Option<FileType> {
        FileType::parse(&self.file_type)
    }
}
