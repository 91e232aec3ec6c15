//! Export request validation.

use crate::error::{ExportError, ExportResult, Violation};
use crate::models::{ExportRequest, FileType};
use crate::pipeline::resolver::ExportFactoryResolver;

/// Validates requests against the configured exports.
///
/// All violations are collected before failing, so callers see every problem
/// with a request at once.
pub struct RequestValidator<'a> {
    resolver: &'a dyn ExportFactoryResolver,
}

impl<'a> RequestValidator<'a> {
    pub fn new(resolver: &'a dyn ExportFactoryResolver) -> Self {
        Self { resolver }
    }

    pub fn violations(&self, request: &ExportRequest) -> Vec<Violation> {
        let mut violations = Vec::new();

        let name = request.export_name.trim();
        if name.is_empty() {
            violations.push(Violation::new("export_name", "must not be blank"));
        } else if !self.resolver.has_factory(name) {
            violations.push(Violation::new(
                "export_name",
                format!("no export factory found for '{}'", name),
            ));
        }

        if request.file_type().is_none() {
            let expected: Vec<_> = FileType::ALL.iter().map(FileType::extension).collect();
            violations.push(Violation::new(
                "file_type",
                format!(
                    "unknown file type '{}', expected one of {}",
                    request.file_type,
                    expected.join(", ")
                ),
            ));
        }

        violations
    }

    /// Validate a request, returning its parsed file type.
    pub fn validate(&self, request: &ExportRequest) -> ExportResult<FileType> {
        let violations = self.violations(request);
        match request.file_type() {
            Some(file_type) if violations.is_empty() => Ok(file_type),
            _ => Err(ExportError::request_validation(violations)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::resolver::DataFetcher;

    struct Known(&'static str);

    impl ExportFactoryResolver for Known {
        fn has_factory(&self, export_name: &str) -> bool {
            export_name == self.0
        }

        fn resolve(&self, export_name: &str) -> ExportResult<Box<dyn DataFetcher>> {
            Err(ExportError::not_found(export_name))
        }

        fn available_exports(&self) -> Vec<String> {
            vec![self.0.to_string()]
        }
    }

    #[test]
    fn test_valid_request() {
        let resolver = Known("orders");
        let validator = RequestValidator::new(&resolver);
        let file_type = validator
            .validate(&ExportRequest::new("orders", "CSV"))
            .unwrap();
        assert_eq!(file_type, FileType::Csv);
    }

    #[test]
    fn test_collects_every_violation() {
        let resolver = Known("orders");
        let validator = RequestValidator::new(&resolver);
        let err = validator
            .validate(&ExportRequest::new("missing", "docx"))
            .unwrap_err();
        let fields: Vec<_> = err.violations().iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["export_name", "file_type"]);
        assert!(err.to_string().contains("expected one of csv, pdf, xlsx"));
    }

    #[test]
    fn test_blank_name() {
        let resolver = Known("orders");
        let validator = RequestValidator::new(&resolver);
        let violations = validator.violations(&ExportRequest::new("  ", "pdf"));
        assert_eq!(violations, vec![Violation::new("export_name", "must not be blank")]);
    }
}
