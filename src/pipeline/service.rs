//! Export execution.
//!
//! `ExportService::run` drives one request through
//! `Resolving → Fetching → Filtering → Rendering → Completed`. Failures while
//! resolving or fetching move the run to `Failed` and are returned as errors;
//! item-level problems along the way are collected as warnings on the outcome.

use crate::error::{ExportError, ExportResult};
use crate::models::{ExportRequest, FileType};
use crate::pipeline::calculator::{CalculatorRegistry, ValueCalculator};
use crate::pipeline::filter::{DataFilter, FilterChain};
use crate::pipeline::resolver::ExportFactoryResolver;
use crate::pipeline::validator::RequestValidator;
use crate::writer::{OutputConfig, StyleDefaults, WriterErrors, create_writer};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Instrument, debug, error, info, info_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportState {
    Resolving,
    Fetching,
    Filtering,
    Rendering,
    Completed,
    Failed,
}

impl ExportState {
    pub fn can_transition_to(self, next: ExportState) -> bool {
        use ExportState::*;
        matches!(
            (self, next),
            (Resolving, Fetching)
                | (Fetching, Filtering)
                | (Filtering, Rendering)
                | (Rendering, Completed)
                | (Resolving, Failed)
                | (Fetching, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ExportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Resolving => "resolving",
            Self::Fetching => "fetching",
            Self::Filtering => "filtering",
            Self::Rendering => "rendering",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Current state of one run; logs every transition.
struct Run {
    state: ExportState,
}

impl Run {
    fn new() -> Self {
        debug!(state = %ExportState::Resolving, "Export state");
        Self {
            state: ExportState::Resolving,
        }
    }

    fn advance(&mut self, next: ExportState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        debug!(from = %self.state, to = %next, "Export state");
        self.state = next;
    }

    /// Move to `Failed` when the current state allows it, then hand back the error.
    fn fail(&mut self, err: ExportError) -> ExportError {
        if self.state.can_transition_to(ExportState::Failed) {
            self.advance(ExportState::Failed);
        }
        error!(state = %self.state, error = %err, "Export aborted");
        err
    }
}

/// Result of a completed export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub export_name: String,
    pub file_type: FileType,
    pub bytes: Vec<u8>,
    pub rows_fetched: usize,
    pub rows_written: usize,
    pub warnings: Vec<ExportError>,
    pub state: ExportState,
}

impl ExportOutcome {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Default output file name, `<export>.<extension>`.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.export_name, self.file_type.extension())
    }
}

/// Format bytes as a human-readable size string.
pub fn format_size(bytes: usize) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

/// Runs export requests.
pub struct ExportService {
    resolver: Arc<dyn ExportFactoryResolver>,
    calculator: Arc<dyn ValueCalculator>,
    styles: Arc<StyleDefaults>,
    filters: FilterChain,
    fetch_timeout: Option<Duration>,
}

impl ExportService {
    pub fn new(resolver: Arc<dyn ExportFactoryResolver>, styles: Arc<StyleDefaults>) -> Self {
        Self {
            resolver,
            calculator: Arc::new(CalculatorRegistry::new()),
            styles,
            filters: FilterChain::new(),
            fetch_timeout: None,
        }
    }

    pub fn with_calculator(mut self, calculator: impl ValueCalculator + 'static) -> Self {
        self.calculator = Arc::new(calculator);
        self
    }

    /// Add a filter applied to every export after the request parameter filters.
    pub fn with_filter(mut self, filter: impl DataFilter + 'static) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Abort fetches that take longer than `timeout`.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    pub fn available_exports(&self) -> Vec<String> {
        self.resolver.available_exports()
    }

    /// Run one export request.
    pub async fn run(&self, request: &ExportRequest, output: &OutputConfig) -> ExportResult<ExportOutcome> {
        let run_id = uuid::Uuid::new_v4();
        let span = info_span!(
            "export",
            run_id = %run_id,
            export = %request.export_name.trim(),
            file_type = %request.file_type
        );
        self.execute(request, output).instrument(span).await
    }

    async fn execute(&self, request: &ExportRequest, output: &OutputConfig) -> ExportResult<ExportOutcome> {
        let start = Instant::now();
        let mut run = Run::new();

        let file_type = RequestValidator::new(self.resolver.as_ref())
            .validate(request)
            .map_err(|e| run.fail(e))?;
        let export_name = request.export_name.trim();
        let fetcher = self.resolver.resolve(export_name).map_err(|e| run.fail(e))?;
        let export = fetcher.export().clone();

        run.advance(ExportState::Fetching);
        let fetched = match self.fetch_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetcher.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(ExportError::data_fetch(
                    format!("Fetching rows timed out after {:?}", limit),
                    "Increase the query timeout or narrow the export query",
                )),
            },
            None => fetcher.fetch().await,
        };
        let rows = fetched.map_err(|e| run.fail(e))?;
        let rows_fetched = rows.len();
        info!(rows = rows_fetched, "Rows fetched");

        run.advance(ExportState::Filtering);
        let fields = export.ordered_fields();
        let mut writer = create_writer(file_type, &fields, self.calculator.clone(), self.styles.clone());
        let mut chain = FilterChain::from_parameters(&fields, &request.parameters);
        chain.extend(&self.filters);
        let admitted = chain.apply(rows, &mut WriterErrors(writer.as_mut()));
        debug!(
            filters = chain.len(),
            admitted = admitted.len(),
            rejected = rows_fetched - admitted.len(),
            "Rows filtered"
        );

        run.advance(ExportState::Rendering);
        let output = match &output.title {
            Some(_) => output.clone(),
            None => output.clone().with_title(export.name.clone()),
        };
        if let Err(e) = writer.write_data(&output, &admitted) {
            error!(error = %e, "Rendering failed");
            return Err(e);
        }
        let rendered = writer.finish()?;

        run.advance(ExportState::Completed);
        info!(
            rows = rendered.rows_written,
            warnings = rendered.warnings.len(),
            size = %format_size(rendered.bytes.len()),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Export completed"
        );

        Ok(ExportOutcome {
            export_name: export.name,
            file_type,
            bytes: rendered.bytes,
            rows_fetched,
            rows_written: rendered.rows_written,
            warnings: rendered.warnings,
            state: run.state,
        })
    }
}
