//! XLSX writer backed by `rust_xlsxwriter`.
//!
//! Numbers and booleans are written as native cells so spreadsheets can
//! compute with them. Everything else is written as text.

use crate::error::{ExportError, ExportResult};
use crate::models::{FieldModel, FieldType, Row};
use crate::pipeline::calculator::ValueCalculator;
use crate::writer::{
    CellStyle, DataWriter, OutputConfig, RenderedOutput, StyleDefaults, WriterCore, cell_text,
};
use rust_xlsxwriter::{Color, Format, Workbook, Worksheet, XlsxError};
use serde_json::Value as JsonValue;
use std::sync::Arc;

const MAX_SHEET_NAME: usize = 31;

pub struct XlsxWriter {
    core: WriterCore,
    bytes: Vec<u8>,
}

impl XlsxWriter {
    pub fn new(
        fields: &[FieldModel],
        calculator: Arc<dyn ValueCalculator>,
        styles: Arc<StyleDefaults>,
    ) -> Self {
        Self {
            core: WriterCore::new(fields, calculator, styles),
            bytes: Vec::new(),
        }
    }
}

fn render_error(e: XlsxError) -> ExportError {
    ExportError::render("xlsx", e.to_string())
}

fn format_for(style: &CellStyle) -> Format {
    let format = Format::new()
        .set_background_color(Color::RGB(style.background.to_u32()))
        .set_font_color(Color::RGB(style.font_color.to_u32()));
    if style.bold { format.set_bold() } else { format }
}

/// Excel forbids `[]:*?/\` in sheet names and caps them at 31 characters.
fn sheet_name(title: &str) -> Option<String> {
    let name: String = title
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(MAX_SHEET_NAME)
        .collect();
    let name = name.trim().trim_matches('\'').to_string();
    (!name.is_empty()).then_some(name)
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    field: &FieldModel,
    value: Option<&JsonValue>,
    format: &Format,
) -> Result<(), XlsxError> {
    match value {
        None | Some(JsonValue::Null) => {
            sheet.write_blank(row, col, format)?;
        }
        Some(JsonValue::Number(n)) => match n.as_f64() {
            Some(v) => {
                sheet.write_number_with_format(row, col, v, format)?;
            }
            None => {
                sheet.write_string_with_format(row, col, n.to_string(), format)?;
            }
        },
        Some(JsonValue::Bool(b)) => {
            sheet.write_boolean_with_format(row, col, *b, format)?;
        }
        // DECIMAL columns arrive as text
        Some(JsonValue::String(s)) if field.field_type == FieldType::Number => {
            match s.trim().parse::<f64>() {
                Ok(v) => sheet.write_number_with_format(row, col, v, format)?,
                Err(_) => sheet.write_string_with_format(row, col, s.as_str(), format)?,
            };
        }
        Some(other) => {
            sheet.write_string_with_format(row, col, cell_text(Some(other)), format)?;
        }
    }
    Ok(())
}

impl DataWriter for XlsxWriter {
    fn fields(&self) -> &[FieldModel] {
        self.core.fields()
    }

    fn value_calculator(&self) -> &dyn ValueCalculator {
        self.core.calculator()
    }

    fn write_data(&mut self, output: &OutputConfig, items: &[Row]) -> ExportResult<()> {
        let (header_style, body_style) = self.core.styles(output);
        let header_format = format_for(&header_style);
        let body_format = format_for(&body_style);

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        if let Some(name) = output.title.as_deref().and_then(sheet_name) {
            sheet.set_name(name).map_err(render_error)?;
        }

        for (col, header) in self.core.headers().into_iter().enumerate() {
            sheet
                .write_string_with_format(0, col as u16, header, &header_format)
                .map_err(render_error)?;
        }

        let fields = self.core.fields().to_vec();
        for (idx, item) in items.iter().enumerate() {
            let row = idx as u32 + 1;
            let cells = self.core.cells(item);
            for (col, (field, value)) in fields.iter().zip(&cells).enumerate() {
                write_cell(sheet, row, col as u16, field, value.as_ref(), &body_format)
                    .map_err(render_error)?;
            }
            self.core.record_row();
        }

        sheet.autofit();
        self.bytes = workbook.save_to_buffer().map_err(render_error)?;
        Ok(())
    }

    fn write_error(&mut self, error: ExportError) {
        self.core.report(error);
    }

    fn finish(self: Box<Self>) -> ExportResult<RenderedOutput> {
        let Self { core, bytes } = *self;
        Ok(core.finish(bytes))
    }
}
