//! CSV writer. Plain text, so style configuration does not apply.

use crate::error::{ExportError, ExportResult};
use crate::models::{FieldModel, Row};
use crate::pipeline::calculator::ValueCalculator;
use crate::writer::{DataWriter, OutputConfig, RenderedOutput, StyleDefaults, WriterCore, cell_text};
use std::sync::Arc;

pub struct CsvWriter {
    core: WriterCore,
    bytes: Vec<u8>,
}

impl CsvWriter {
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

fn render_error(e: impl std::fmt::Display) -> ExportError {
    ExportError::render("csv", e.to_string())
}

impl DataWriter for CsvWriter {
    fn fields(&self) -> &[FieldModel] {
        self.core.fields()
    }

    fn value_calculator(&self) -> &dyn ValueCalculator {
        self.core.calculator()
    }

    fn write_data(&mut self, _output: &OutputConfig, items: &[Row]) -> ExportResult<()> {
        let mut writer = ::csv::WriterBuilder::new()
            .terminator(::csv::Terminator::CRLF)
            .from_writer(Vec::new());

        writer.write_record(self.core.headers()).map_err(render_error)?;
        for row in items {
            let record: Vec<String> = self
                .core
                .cells(row)
                .iter()
                .map(|cell| cell_text(cell.as_ref()))
                .collect();
            writer.write_record(&record).map_err(render_error)?;
            self.core.record_row();
        }

        self.bytes = writer.into_inner().map_err(render_error)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FieldType;
    use crate::pipeline::calculator::PropertyCalculator;
    use crate::writer::style::HEADER_BACKGROUND;
    use serde_json::json;

    fn rows() -> Vec<Row> {
        vec![
            json!({"id": 1, "total": 9.5, "note": "a, \"quoted\" note"}),
            json!({"id": 2, "total": 3.0, "note": null}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect()
    }

    fn render(fields: &[FieldModel], output: &OutputConfig) -> RenderedOutput {
        let mut writer = Box::new(CsvWriter::new(
            fields,
            Arc::new(PropertyCalculator),
            Arc::new(StyleDefaults::new()),
        ));
        writer.write_data(output, &rows()).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_header_and_rows_in_index_order() {
        let fields = [
            FieldModel::new("total", 1).with_type(FieldType::Number),
            FieldModel::new("id", 0).with_type(FieldType::Number),
        ];
        let out = render(&fields, &OutputConfig::new());
        let text = String::from_utf8(out.bytes).unwrap();
        assert_eq!(text, "id,total\r\n1,9.5\r\n2,3.0\r\n");
        assert_eq!(out.rows_written, 2);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_quoting_and_empty_cells() {
        let fields = [FieldModel::new("note", 0).with_label("Note")];
        let out = render(&fields, &OutputConfig::new());
        let text = String::from_utf8(out.bytes).unwrap();
        assert_eq!(text, "Note\r\n\"a, \"\"quoted\"\" note\"\r\n\"\"\r\n");
    }

    #[test]
    fn test_styles_do_not_change_output() {
        let fields = [FieldModel::new("id", 0)];
        let plain = render(&fields, &OutputConfig::new());
        let styled = render(
            &fields,
            &OutputConfig::new().with_style(HEADER_BACKGROUND, "#zzz"),
        );
        assert_eq!(plain.bytes, styled.bytes);
        assert!(styled.warnings.is_empty());
    }
}
