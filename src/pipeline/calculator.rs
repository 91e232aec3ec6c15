//! Field value calculators.
//!
//! A calculator derives the output value of one field from a row. The default
//! looks the field's property up in the row. `CalculatorRegistry` lets callers
//! override the calculator per field name or per field type.

use crate::error::{ExportError, ExportResult};
use crate::models::field::{parse_date, parse_datetime};
use crate::models::{FieldModel, FieldType, Row};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

pub trait ValueCalculator: Send + Sync {
    fn calculate(&self, field: &FieldModel, row: &Row) -> ExportResult<JsonValue>;

    /// Whether the result must satisfy the field type. Formatting calculators
    /// return display text and opt out.
    fn checks_type(&self, _field: &FieldModel) -> bool {
        true
    }
}

/// `row[field.property_name]`, null when missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PropertyCalculator;

impl ValueCalculator for PropertyCalculator {
    fn calculate(&self, field: &FieldModel, row: &Row) -> ExportResult<JsonValue> {
        Ok(row
            .get(&field.property_name)
            .cloned()
            .unwrap_or(JsonValue::Null))
    }
}

/// Formats DATE and DATETIME values with a chrono format string.
#[derive(Debug, Clone)]
pub struct DateFormatCalculator {
    format: String,
}

impl DateFormatCalculator {
    pub fn new(format: impl Into<String>) -> Self {
        Self {
            format: format.into(),
        }
    }
}

impl ValueCalculator for DateFormatCalculator {
    fn calculate(&self, field: &FieldModel, row: &Row) -> ExportResult<JsonValue> {
        let value = PropertyCalculator.calculate(field, row)?;
        let text = match &value {
            JsonValue::Null => return Ok(JsonValue::Null),
            JsonValue::String(s) => s,
            other => {
                return Err(ExportError::calculation(
                    &field.name,
                    format!("expected a date string, got {}", other),
                ));
            }
        };

        let formatted = match field.field_type {
            FieldType::Date => parse_date(text).map(|d| d.format(&self.format).to_string()),
            _ => parse_datetime(text).map(|dt| dt.format(&self.format).to_string()),
        };
        formatted.map(JsonValue::String).ok_or_else(|| {
            ExportError::calculation(
                &field.name,
                format!("'{}' is not a valid {}", text, field.field_type),
            )
        })
    }

    fn checks_type(&self, _field: &FieldModel) -> bool {
        false
    }
}

/// Calculator lookup: field name override, then field type override, then the
/// default.
#[derive(Clone)]
pub struct CalculatorRegistry {
    by_name: HashMap<String, Arc<dyn ValueCalculator>>,
    by_type: HashMap<FieldType, Arc<dyn ValueCalculator>>,
    default: Arc<dyn ValueCalculator>,
}

impl Default for CalculatorRegistry {
    fn default() -> Self {
        Self {
            by_name: HashMap::new(),
            by_type: HashMap::new(),
            default: Arc::new(PropertyCalculator),
        }
    }
}

impl CalculatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(
        mut self,
        field_name: impl Into<String>,
        calculator: impl ValueCalculator + 'static,
    ) -> Self {
        self.by_name.insert(field_name.into(), Arc::new(calculator));
        self
    }

    pub fn with_type(mut self, field_type: FieldType, calculator: impl ValueCalculator + 'static) -> Self {
        self.by_type.insert(field_type, Arc::new(calculator));
        self
    }

    pub fn with_default(mut self, calculator: impl ValueCalculator + 'static) -> Self {
        self.default = Arc::new(calculator);
        self
    }

    pub fn calculator_for(&self, field: &FieldModel) -> &dyn ValueCalculator {
        self.by_name
            .get(&field.name)
            .or_else(|| self.by_type.get(&field.field_type))
            .unwrap_or(&self.default)
            .as_ref()
    }
}

impl ValueCalculator for CalculatorRegistry {
    fn calculate(&self, field: &FieldModel, row: &Row) -> ExportResult<JsonValue> {
        self.calculator_for(field).calculate(field, row)
    }

    fn checks_type(&self, field: &FieldModel) -> bool {
        self.calculator_for(field).checks_type(field)
    }
}

/// Calculate a field value and check it against the field type.
pub fn checked_value(
    calculator: &dyn ValueCalculator,
    field: &FieldModel,
    row: &Row,
) -> ExportResult<JsonValue> {
    let value = calculator.calculate(field, row)?;
    if calculator.checks_type(field) {
        field
            .field_type
            .check(&value)
            .map_err(|message| ExportError::calculation(&field.name, message))?;
    }
    Ok(value)
}
