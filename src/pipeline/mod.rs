//! Export pipeline: request validation, factory resolution, row filtering,
//! value calculation and the service tying them together.

pub mod calculator;
pub mod filter;
pub mod resolver;
pub mod service;
pub mod validator;

pub use calculator::{
    CalculatorRegistry, DateFormatCalculator, PropertyCalculator, ValueCalculator, checked_value,
};
pub use filter::{DataFilter, FilterChain, FnFilter, NotNull, PropertyEquals};
pub use resolver::{DataFetcher, ExportFactoryResolver, MetaExportResolver, SqlDataFetcher};
pub use service::{ExportOutcome, ExportService, ExportState, format_size};
pub use validator::RequestValidator;
