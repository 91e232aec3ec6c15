//! Row filters.
//!
//! A `FilterChain` is an ordered AND of predicates. Evaluation stops at the
//! first predicate that rejects the row. A predicate that fails counts as a
//! rejection: the failure goes to the error sink and the next row is
//! evaluated normally.

use crate::error::{ErrorSink, ExportError, ExportResult};
use crate::models::{FieldModel, Row};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A predicate over fetched rows.
pub trait DataFilter: Send + Sync {
    /// Name used when reporting failures.
    fn name(&self) -> &str;

    fn allows(&self, row: &Row) -> ExportResult<bool>;
}

/// Ordered predicates evaluated with short-circuit AND.
#[derive(Clone, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn DataFilter>>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl DataFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn push(&mut self, filter: Arc<dyn DataFilter>) {
        self.filters.push(filter);
    }

    /// Append another chain's filters after this chain's.
    pub fn extend(&mut self, other: &FilterChain) {
        self.filters.extend(other.filters.iter().cloned());
    }

    /// Equality filters for request parameters naming a field property.
    ///
    /// Parameters that match no field are ignored.
    pub fn from_parameters(fields: &[FieldModel], parameters: &BTreeMap<String, JsonValue>) -> Self {
        let mut chain = Self::new();
        for (key, value) in parameters {
            match fields.iter().find(|f| f.property_name == *key) {
                Some(field) => {
                    chain = chain.with(PropertyEquals::new(field.property_name.clone(), value.clone()))
                }
                None => debug!(parameter = %key, "Parameter matches no field, ignored"),
            }
        }
        chain
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Decide whether a row is admitted.
    pub fn allow(&self, row: &Row, sink: &mut dyn ErrorSink) -> bool {
        for filter in &self.filters {
            match filter.allows(row) {
                Ok(true) => {}
                Ok(false) => return false,
                Err(e) => {
                    let error = match e {
                        ExportError::Filter { .. } => e,
                        other => ExportError::filter(filter.name(), other.to_string()),
                    };
                    sink.report(error);
                    return false;
                }
            }
        }
        true
    }

    /// Keep admitted rows, in their original order.
    pub fn apply(&self, rows: Vec<Row>, sink: &mut dyn ErrorSink) -> Vec<Row> {
        if self.filters.is_empty() {
            return rows;
        }
        rows.into_iter().filter(|row| self.allow(row, sink)).collect()
    }
}

/// Loose scalar equality: numbers compare numerically, so a DECIMAL decoded as
/// `"9.50"` equals a parameter `9.5`, and everything else compares as text.
fn values_match(actual: &JsonValue, expected: &JsonValue) -> bool {
    if actual == expected {
        return true;
    }
    let as_f64 = |v: &JsonValue| match v {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    if let (Some(a), Some(b)) = (as_f64(actual), as_f64(expected)) {
        return a == b;
    }
    match (actual, expected) {
        (JsonValue::String(a), b) | (b, JsonValue::String(a)) if !b.is_null() => {
            *a == b.to_string().trim_matches('"')
        }
        _ => false,
    }
}

/// Admits rows whose property equals a value.
#[derive(Debug, Clone)]
pub struct PropertyEquals {
    name: String,
    property: String,
    value: JsonValue,
}

impl PropertyEquals {
    pub fn new(property: impl Into<String>, value: JsonValue) -> Self {
        let property = property.into();
        Self {
            name: format!("{} = {}", property, value),
            property,
            value,
        }
    }
}

impl DataFilter for PropertyEquals {
    fn name(&self) -> &str {
        &self.name
    }

    fn allows(&self, row: &Row) -> ExportResult<bool> {
        let actual = row.get(&self.property).ok_or_else(|| {
            ExportError::filter(&self.name, format!("row has no property '{}'", self.property))
        })?;
        Ok(values_match(actual, &self.value))
    }
}

/// Admits rows where a property is present and not null.
#[derive(Debug, Clone)]
pub struct NotNull {
    name: String,
    property: String,
}

impl NotNull {
    pub fn new(property: impl Into<String>) -> Self {
        let property = property.into();
        Self {
            name: format!("{} is not null", property),
            property,
        }
    }
}

impl DataFilter for NotNull {
    fn name(&self) -> &str {
        &self.name
    }

    fn allows(&self, row: &Row) -> ExportResult<bool> {
        Ok(row.get(&self.property).is_some_and(|v| !v.is_null()))
    }
}

type FilterFn = dyn Fn(&Row) -> ExportResult<bool> + Send + Sync;

/// A named closure predicate.
pub struct FnFilter {
    name: String,
    predicate: Box<FilterFn>,
}

impl FnFilter {
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Row) -> ExportResult<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl DataFilter for FnFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn allows(&self, row: &Row) -> ExportResult<bool> {
        (self.predicate)(row)
    }
}
