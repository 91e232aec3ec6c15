//! PDF writer backed by `lopdf`.
//!
//! Renders a simple paginated table: an optional title, then the header row
//! repeated on every page, then data rows. Columns share the usable page width
//! equally and text that does not fit is truncated. Only the standard
//! Helvetica fonts are used, so characters outside ASCII print as `?`.

use crate::error::{ExportError, ExportResult};
use crate::models::{FieldModel, Row};
use crate::pipeline::calculator::ValueCalculator;
use crate::writer::style::{PDF_PAGE_ORIENTATION, PDF_PAGE_SIZE, PageSize, parse_landscape};
use crate::writer::{
    CellStyle, DataWriter, OutputConfig, RenderedOutput, Rgb, StyleDefaults, WriterCore, cell_text,
};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};
use std::sync::Arc;

const MARGIN: f32 = 36.0;
const FONT_SIZE: f32 = 9.0;
const TITLE_FONT_SIZE: f32 = 12.0;
const ROW_HEIGHT: f32 = 16.0;
const CELL_PADDING: f32 = 3.0;
/// Average Helvetica glyph width relative to the font size
const GLYPH_WIDTH: f32 = 0.5;

pub struct PdfWriter {
    core: WriterCore,
    bytes: Vec<u8>,
}

impl PdfWriter {
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

fn render_error(e: lopdf::Error) -> ExportError {
    ExportError::render("pdf", e.to_string())
}

/// Page geometry for one document.
#[derive(Debug, Clone, Copy)]
struct Layout {
    width: f32,
    height: f32,
    column_width: f32,
    title_height: f32,
}

impl Layout {
    fn new(size: PageSize, landscape: bool, columns: usize, has_title: bool) -> Self {
        let (w, h) = size.dimensions();
        let (width, height) = if landscape { (h, w) } else { (w, h) };
        let columns = columns.max(1) as f32;
        Self {
            width,
            height,
            column_width: (width - 2.0 * MARGIN) / columns,
            title_height: if has_title { TITLE_FONT_SIZE * 2.0 } else { 0.0 },
        }
    }

    /// Data rows that fit under the header on one page.
    fn rows_per_page(&self) -> usize {
        let usable = self.height - 2.0 * MARGIN - self.title_height - ROW_HEIGHT;
        ((usable / ROW_HEIGHT).floor() as usize).max(1)
    }

    /// Top edge of the header row.
    fn table_top(&self) -> f32 {
        self.height - MARGIN - self.title_height
    }

    fn max_chars(&self) -> usize {
        let usable = (self.column_width - 2.0 * CELL_PADDING).max(0.0);
        (usable / (FONT_SIZE * GLYPH_WIDTH)).floor() as usize
    }
}

/// Printable Helvetica text, truncated to `max_chars`.
fn pdf_text(s: &str, max_chars: usize) -> String {
    let printable: String = s
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect();
    if printable.len() <= max_chars {
        printable
    } else if max_chars <= 2 {
        printable.chars().take(max_chars).collect()
    } else {
        let mut cut: String = printable.chars().take(max_chars - 2).collect();
        cut.push_str("..");
        cut
    }
}

fn fill_color(color: Rgb) -> Operation {
    let (r, g, b) = color.to_unit();
    Operation::new("rg", vec![r.into(), g.into(), b.into()])
}

fn text_op(font: &str, size: f32, x: f32, y: f32, text: String) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(text)]),
        Operation::new("ET", vec![]),
    ]
}

/// Draw one table row whose top edge is at `top`.
fn table_row(ops: &mut Vec<Operation>, layout: &Layout, top: f32, texts: &[String], style: &CellStyle) {
    let bottom = top - ROW_HEIGHT;
    ops.push(fill_color(style.background));
    ops.push(Operation::new(
        "re",
        vec![
            MARGIN.into(),
            bottom.into(),
            (layout.width - 2.0 * MARGIN).into(),
            ROW_HEIGHT.into(),
        ],
    ));
    ops.push(Operation::new("f", vec![]));

    ops.push(fill_color(style.font_color));
    let font = if style.bold { "F2" } else { "F1" };
    let max_chars = layout.max_chars();
    for (col, text) in texts.iter().enumerate() {
        let x = MARGIN + col as f32 * layout.column_width + CELL_PADDING;
        let y = bottom + (ROW_HEIGHT - FONT_SIZE) / 2.0 + 1.0;
        ops.extend(text_op(font, FONT_SIZE, x, y, pdf_text(text, max_chars)));
    }
}

impl PdfWriter {
    fn page_setup(&mut self, output: &OutputConfig) -> (PageSize, bool) {
        let mut warnings: Vec<ExportError> = Vec::new();
        let (size, landscape) = {
            let resolver = self.core.resolver(output);
            (
                resolver.resolve(PDF_PAGE_SIZE, PageSize::default(), PageSize::parse, &mut warnings),
                resolver.resolve(PDF_PAGE_ORIENTATION, false, parse_landscape, &mut warnings),
            )
        };
        for warning in warnings {
            self.core.report(warning);
        }
        (size, landscape)
    }
}

impl DataWriter for PdfWriter {
    fn fields(&self) -> &[FieldModel] {
        self.core.fields()
    }

    fn value_calculator(&self) -> &dyn ValueCalculator {
        self.core.calculator()
    }

    fn write_data(&mut self, output: &OutputConfig, items: &[Row]) -> ExportResult<()> {
        let (header_style, body_style) = self.core.styles(output);
        let (size, landscape) = self.page_setup(output);
        let title = output.title.as_deref().filter(|t| !t.trim().is_empty());
        let layout = Layout::new(size, landscape, self.core.fields().len(), title.is_some());
        let headers = self.core.headers();

        let mut body: Vec<Vec<String>> = Vec::with_capacity(items.len());
        for item in items {
            let texts = self
                .core
                .cells(item)
                .iter()
                .map(|cell| cell_text(cell.as_ref()))
                .collect();
            body.push(texts);
            self.core.record_row();
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let resources = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
        });

        let mut page_ids: Vec<ObjectId> = Vec::new();
        let chunks: Vec<&[Vec<String>]> = if body.is_empty() {
            vec![&body[..]]
        } else {
            body.chunks(layout.rows_per_page()).collect()
        };

        for chunk in chunks {
            let mut ops = Vec::new();
            if let Some(title) = title {
                ops.push(fill_color(Rgb::BLACK));
                ops.extend(text_op(
                    "F2",
                    TITLE_FONT_SIZE,
                    MARGIN,
                    layout.height - MARGIN - TITLE_FONT_SIZE,
                    pdf_text(title, usize::MAX),
                ));
            }

            let mut top = layout.table_top();
            table_row(&mut ops, &layout, top, &headers, &header_style);
            for texts in chunk {
                top -= ROW_HEIGHT;
                table_row(&mut ops, &layout, top, texts, &body_style);
            }

            let content = Content { operations: ops };
            let stream = Stream::new(dictionary! {}, content.encode().map_err(render_error)?);
            let content_id = doc.add_object(stream);
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            page_ids.push(page_id);
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => page_ids.len() as i64,
            "Resources" => resources,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                layout.width.into(),
                layout.height.into(),
            ],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)
            .map_err(|e| ExportError::render("pdf", e.to_string()))?;
        self.bytes = bytes;
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
