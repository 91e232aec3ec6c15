//! Format-specific export writers.
//!
//! Every writer renders the same thing: one header row with the field labels,
//! then one row per admitted data row, columns in field index order. Values
//! come from the writer's value calculator; a value that fails calculation or
//! its type check is reported as a warning and rendered as an empty cell.

pub mod csv;
pub mod pdf;
pub mod style;
pub mod xlsx;

use crate::error::{ErrorSink, ExportError, ExportResult};
use crate::models::{FieldModel, FileType, Row};
use crate::pipeline::calculator::{ValueCalculator, checked_value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use self::csv::CsvWriter;
pub use self::pdf::PdfWriter;
pub use self::style::{
    BodyStyle, CellStyle, HeaderStyle, PageSize, Rgb, StyleAdapter, StyleDefaults, StyleResolver,
};
pub use self::xlsx::XlsxWriter;

/// Per-call output settings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputConfig {
    /// Document or sheet title
    pub title: Option<String>,
    /// Style overrides by dotted key, e.g. `header.background`
    pub styles: BTreeMap<String, String>,
}

impl OutputConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_style(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(key.into(), value.into());
        self
    }

    pub fn style(&self, key: &str) -> Option<&str> {
        self.styles.get(key).map(String::as_str)
    }
}

/// Rendered document plus what happened while rendering it.
#[derive(Debug, Clone)]
pub struct RenderedOutput {
    pub bytes: Vec<u8>,
    pub rows_written: usize,
    pub warnings: Vec<ExportError>,
}

pub trait DataWriter: Send {
    /// Fields in output order.
    fn fields(&self) -> &[FieldModel];

    fn value_calculator(&self) -> &dyn ValueCalculator;

    /// Render rows. Only encoder failures are returned. A cell that fails its
    /// calculation or type check becomes a warning on the rendered output.
    fn write_data(&mut self, output: &OutputConfig, items: &[Row]) -> ExportResult<()>;

    /// Record a non-fatal problem; it ends up in `RenderedOutput::warnings`.
    fn write_error(&mut self, error: ExportError);

    /// Field by property name, ignoring case.
    fn field(&self, property_name: &str) -> Option<&FieldModel> {
        self.fields()
            .iter()
            .find(|f| f.property_name.eq_ignore_ascii_case(property_name))
    }

    fn field_count(&self) -> usize {
        self.fields().len()
    }

    fn finish(self: Box<Self>) -> ExportResult<RenderedOutput>;
}

/// Sink that hands reported errors to a writer's `write_error`.
pub struct WriterErrors<'a>(pub &'a mut dyn DataWriter);

impl ErrorSink for WriterErrors<'_> {
    fn report(&mut self, error: ExportError) {
        self.0.write_error(error);
    }
}

/// State shared by every writer.
pub(crate) struct WriterCore {
    fields: Vec<FieldModel>,
    calculator: Arc<dyn ValueCalculator>,
    styles: Arc<StyleDefaults>,
    warnings: Vec<ExportError>,
    rows_written: usize,
}

impl WriterCore {
    pub(crate) fn new(
        fields: &[FieldModel],
        calculator: Arc<dyn ValueCalculator>,
        styles: Arc<StyleDefaults>,
    ) -> Self {
        Self {
            fields: crate::models::field::ordered_fields(fields),
            calculator,
            styles,
            warnings: Vec::new(),
            rows_written: 0,
        }
    }

    pub(crate) fn fields(&self) -> &[FieldModel] {
        &self.fields
    }

    pub(crate) fn calculator(&self) -> &dyn ValueCalculator {
        self.calculator.as_ref()
    }

    pub(crate) fn report(&mut self, error: ExportError) {
        self.warnings.report(error);
    }

    pub(crate) fn headers(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.header().to_string()).collect()
    }

    /// Values for one row in field order; failed cells are `None`.
    pub(crate) fn cells(&mut self, row: &Row) -> Vec<Option<JsonValue>> {
        let mut cells = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match checked_value(self.calculator.as_ref(), field, row) {
                Ok(value) => cells.push(Some(value)),
                Err(e) => {
                    self.warnings.report(e);
                    cells.push(None);
                }
            }
        }
        cells
    }

    /// Resolve header and body styles, reporting malformed layers.
    pub(crate) fn styles(&mut self, output: &OutputConfig) -> (CellStyle, CellStyle) {
        let resolver = StyleResolver::new(output, &self.styles);
        let header = HeaderStyle.style(&resolver, &mut self.warnings);
        let body = BodyStyle.style(&resolver, &mut self.warnings);
        (header, body)
    }

    pub(crate) fn resolver<'a>(&'a self, output: &'a OutputConfig) -> StyleResolver<'a> {
        StyleResolver::new(output, &self.styles)
    }

    pub(crate) fn record_row(&mut self) {
        self.rows_written += 1;
    }

    pub(crate) fn finish(self, bytes: Vec<u8>) -> RenderedOutput {
        RenderedOutput {
            bytes,
            rows_written: self.rows_written,
            warnings: self.warnings,
        }
    }
}

/// Plain text for a cell value. Empty for null and failed cells.
pub fn cell_text(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Create the writer for a file type.
pub fn create_writer(
    file_type: FileType,
    fields: &[FieldModel],
    calculator: Arc<dyn ValueCalculator>,
    styles: Arc<StyleDefaults>,
) -> Box<dyn DataWriter> {
    match file_type {
        FileType::Csv => Box::new(CsvWriter::new(fields, calculator, styles)),
        FileType::Pdf => Box::new(PdfWriter::new(fields, calculator, styles)),
        FileType::Xlsx => Box::new(XlsxWriter::new(fields, calculator, styles)),
    }
}
