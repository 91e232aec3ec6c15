//! Style resolution for rendered exports.
//!
//! Every style key is resolved from the most to the least specific layer:
//! 1. the per-call `OutputConfig`
//! 2. process-wide `StyleDefaults` loaded from TOML at startup
//! 3. a constant built into the adapter
//!
//! A layer holding a malformed value is reported as a `StyleConfig` warning
//! and skipped; resolution continues with the next layer.

use crate::error::{ErrorSink, ExportError, ExportResult};
use crate::writer::OutputConfig;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

pub const HEADER_BACKGROUND: &str = "header.background";
pub const HEADER_FONT_COLOR: &str = "header.font.color";
pub const CELL_BACKGROUND: &str = "cell.background";
pub const CELL_FONT_COLOR: &str = "cell.font.color";
pub const PDF_PAGE_SIZE: &str = "pdf.page.size";
pub const PDF_PAGE_ORIENTATION: &str = "pdf.page.orientation";

/// An RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const HEADER_GREEN: Rgb = Rgb(0x1c, 0x82, 0x14);

    /// Parse `#RRGGBB`.
    pub fn parse_hex(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if s.len() != 7 || !s.starts_with('#') || !s.is_ascii() {
            return Err(format!("expected #RRGGBB, got '{}'", s));
        }
        if !s[1..].bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("invalid hex digits in '{}'", s));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&s[range], 16).map_err(|_| format!("invalid hex digits in '{}'", s))
        };
        Ok(Rgb(channel(1..3)?, channel(3..5)?, channel(5..7)?))
    }

    /// Packed `0xRRGGBB`.
    pub fn to_u32(self) -> u32 {
        (u32::from(self.0) << 16) | (u32::from(self.1) << 8) | u32::from(self.2)
    }

    /// Channels scaled to `0.0..=1.0`.
    pub fn to_unit(self) -> (f32, f32, f32) {
        (
            f32::from(self.0) / 255.0,
            f32::from(self.1) / 255.0,
            f32::from(self.2) / 255.0,
        )
    }
}

/// Process-wide style defaults keyed by dotted names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleDefaults {
    values: BTreeMap<String, String>,
}

impl StyleDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Parse TOML, flattening nested tables into dotted keys.
    ///
    /// `[header] background = "#000000"` becomes `header.background`.
    pub fn from_toml_str(s: &str) -> ExportResult<Self> {
        let table: toml::Table = toml::from_str(s).map_err(|e| {
            ExportError::configuration(format!("Invalid style TOML: {}", e), "styles")
        })?;
        let mut values = BTreeMap::new();
        flatten("", &table, &mut values);
        Ok(Self { values })
    }

    pub fn from_file(path: &Path) -> ExportResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExportError::configuration(
                format!("Failed to read styles: {}", e),
                path.display().to_string(),
            )
        })?;
        let defaults = Self::from_toml_str(&text)?;
        info!(path = %path.display(), keys = defaults.len(), "Style defaults loaded");
        Ok(defaults)
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut BTreeMap<String, String>) {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::Table(nested) => flatten(&full, nested, out),
            toml::Value::String(s) => {
                out.insert(full, s.clone());
            }
            other => {
                out.insert(full, other.to_string());
            }
        }
    }
}

/// Looks style keys up through the layers.
pub struct StyleResolver<'a> {
    output: &'a OutputConfig,
    defaults: &'a StyleDefaults,
}

impl<'a> StyleResolver<'a> {
    pub fn new(output: &'a OutputConfig, defaults: &'a StyleDefaults) -> Self {
        Self { output, defaults }
    }

    fn layers(&self, key: &str) -> impl Iterator<Item = &'a str> {
        [self.output.style(key), self.defaults.get(key)]
            .into_iter()
            .flatten()
    }

    /// First layer value that parses, else `fallback`.
    pub fn resolve<T>(
        &self,
        key: &str,
        fallback: T,
        parse: impl Fn(&str) -> Result<T, String>,
        sink: &mut dyn ErrorSink,
    ) -> T {
        for raw in self.layers(key) {
            match parse(raw) {
                Ok(value) => return value,
                Err(message) => sink.report(ExportError::style_config(key, raw, message)),
            }
        }
        fallback
    }

    pub fn color(&self, key: &str, fallback: Rgb, sink: &mut dyn ErrorSink) -> Rgb {
        self.resolve(key, fallback, Rgb::parse_hex, sink)
    }
}

/// Resolved presentation for a row of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellStyle {
    pub background: Rgb,
    pub font_color: Rgb,
    pub bold: bool,
}

/// Supplies keys and constants for one kind of cell.
pub trait StyleAdapter {
    fn background_key(&self) -> &'static str;
    fn font_color_key(&self) -> &'static str;
    fn default_background(&self) -> Rgb;
    fn default_font_color(&self) -> Rgb;
    fn bold(&self) -> bool;

    fn style(&self, resolver: &StyleResolver<'_>, sink: &mut dyn ErrorSink) -> CellStyle {
        CellStyle {
            background: resolver.color(self.background_key(), self.default_background(), sink),
            font_color: resolver.color(self.font_color_key(), self.default_font_color(), sink),
            bold: self.bold(),
        }
    }
}

/// Column headers: bold white text on green.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderStyle;

impl StyleAdapter for HeaderStyle {
    fn background_key(&self) -> &'static str {
        HEADER_BACKGROUND
    }
    fn font_color_key(&self) -> &'static str {
        HEADER_FONT_COLOR
    }
    fn default_background(&self) -> Rgb {
        Rgb::HEADER_GREEN
    }
    fn default_font_color(&self) -> Rgb {
        Rgb::WHITE
    }
    fn bold(&self) -> bool {
        true
    }
}

/// Data cells: black text on white.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyStyle;

impl StyleAdapter for BodyStyle {
    fn background_key(&self) -> &'static str {
        CELL_BACKGROUND
    }
    fn font_color_key(&self) -> &'static str {
        CELL_FONT_COLOR
    }
    fn default_background(&self) -> Rgb {
        Rgb::WHITE
    }
    fn default_font_color(&self) -> Rgb {
        Rgb::BLACK
    }
    fn bold(&self) -> bool {
        false
    }
}

/// PDF page sizes in points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageSize {
    #[default]
    A4,
    A3,
    Letter,
    Legal,
}

impl PageSize {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A4" => Ok(Self::A4),
            "A3" => Ok(Self::A3),
            "LETTER" => Ok(Self::Letter),
            "LEGAL" => Ok(Self::Legal),
            other => Err(format!(
                "unknown page size '{}', expected A4, A3, LETTER or LEGAL",
                other
            )),
        }
    }

    /// Portrait (width, height).
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            Self::A4 => (595.0, 842.0),
            Self::A3 => (842.0, 1191.0),
            Self::Letter => (612.0, 792.0),
            Self::Legal => (612.0, 1008.0),
        }
    }
}

/// Parse `portrait` / `landscape` into a landscape flag.
pub fn parse_landscape(s: &str) -> Result<bool, String> {
    match s.trim().to_ascii_lowercase().as_str() {
        "portrait" => Ok(false),
        "landscape" => Ok(true),
        other => Err(format!(
            "unknown orientation '{}', expected portrait or landscape",
            other
        )),
    }
}
