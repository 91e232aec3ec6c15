//! Field metadata models.
//!
//! A `FieldModel` describes one output column of an export: which row property
//! feeds it, how it is labelled, where it sits in the output and what type its
//! values must have.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;

/// Field type codes. Drive formatting and calculator selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FieldType {
    #[default]
    String,
    Number,
    Date,
    Boolean,
    DateTime,
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

impl FieldType {
    pub const ALL: [FieldType; 5] = [
        FieldType::String,
        FieldType::Number,
        FieldType::Date,
        FieldType::Boolean,
        FieldType::DateTime,
    ];

    pub fn code(&self) -> u32 {
        match self {
            Self::String => 1,
            Self::Number => 2,
            Self::Date => 3,
            Self::Boolean => 4,
            Self::DateTime => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Number => "NUMBER",
            Self::Date => "DATE",
            Self::Boolean => "BOOLEAN",
            Self::DateTime => "DATETIME",
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    /// Check that a calculated value is compatible with this type.
    ///
    /// NULL is compatible with every type. Numbers decoded as strings (DECIMAL
    /// columns) and integer booleans (SQLite) are accepted.
    pub fn check(&self, value: &JsonValue) -> Result<(), String> {
        let ok = match (self, value) {
            (_, JsonValue::Null) => true,
            (Self::String, v) => !v.is_array() && !v.is_object(),
            (Self::Number, JsonValue::Number(_)) => true,
            (Self::Number, JsonValue::String(s)) => s.trim().parse::<f64>().is_ok(),
            (Self::Boolean, JsonValue::Bool(_)) => true,
            (Self::Boolean, JsonValue::Number(n)) => matches!(n.as_i64(), Some(0 | 1)),
            (Self::Date, JsonValue::String(s)) => parse_date(s).is_some(),
            (Self::DateTime, JsonValue::String(s)) => parse_datetime(s).is_some(),
            _ => false,
        };

        if ok {
            Ok(())
        } else {
            Err(format!("value {} is not a valid {}", value, self.name()))
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Parse a date value, accepting a leading date portion of a timestamp.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

/// Parse a timestamp in RFC 3339 or one of the common SQL text formats.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Metadata for one output column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldModel {
    pub name: String,
    /// Key looked up in each row
    pub property_name: String,
    /// Display name; the field name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Output position, unique within an export
    pub index: u32,
    #[serde(default)]
    pub field_type: FieldType,
}

impl FieldModel {
    /// Create a STRING field whose property name equals its name.
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        let name = name.into();
        Self {
            property_name: name.clone(),
            name,
            label: None,
            index,
            field_type: FieldType::String,
        }
    }

    pub fn with_property(mut self, property_name: impl Into<String>) -> Self {
        self.property_name = property_name.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_type(mut self, field_type: FieldType) -> Self {
        self.field_type = field_type;
        self
    }

    /// Text used for the column header.
    pub fn header(&self) -> &str {
        self.label
            .as_deref()
            .filter(|l| !l.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Return the fields in output order (index ascending).
pub fn ordered_fields(fields: &[FieldModel]) -> Vec<FieldModel> {
    let mut ordered = fields.to_vec();
    ordered.sort_by_key(|f| f.index);
    ordered
}

/// Find the first index used by more than one field.
pub fn duplicate_index(fields: &[FieldModel]) -> Option<u32> {
    let mut seen = HashSet::new();
    fields.iter().map(|f| f.index).find(|i| !seen.insert(*i))
}
