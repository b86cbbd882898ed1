//! Write-only diagnostic sink.

use crate::utils::config::FrontendConfig;
use crate::utils::errors::{Diagnostic, DiagnosticSeverity, ErrorCode};
use crate::utils::location::Span;
use std::sync::Arc;

/// Accumulates diagnostics in the order they are reported.
///
/// Severity overrides from the [`FrontendConfig`] are applied on insertion,
/// so disabled codes never enter the list.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    config: Arc<FrontendConfig>,
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty sink with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty sink with the given configuration.
    pub fn with_config(config: Arc<FrontendConfig>) -> Self {
        Self { config, items: Vec::new() }
    }

    /// An empty sink sharing this sink's configuration.
    pub fn fork(&self) -> Self {
        Self::with_config(Arc::clone(&self.config))
    }

    /// The configuration this sink applies.
    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    /// Record a diagnostic.
    pub fn push(&mut self, mut diagnostic: Diagnostic) {
        match self.config.severity_for(diagnostic.code, diagnostic.severity) {
            Some(severity) => {
                diagnostic.severity = severity;
                log::debug!("{}", diagnostic);
                self.items.push(diagnostic);
            }
            None => log::trace!("suppressed {}", diagnostic),
        }
    }

    /// Record a diagnostic with the code's default severity.
    pub fn emit(&mut self, code: ErrorCode, span: Span, message: impl Into<String>) {
        self.push(Diagnostic::new(code, message).with_span(span));
    }

    /// Severity a diagnostic with `code` would be recorded at, `None` if disabled.
    pub fn severity_of(&self, code: ErrorCode) -> Option<DiagnosticSeverity> {
        self.config.severity_for(code, code.default_severity())
    }

    /// Move every diagnostic of `other` into this sink.
    pub fn append(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }

    /// Number of errors recorded.
    pub fn error_count(&self) -> usize {
        self.items.iter().filter(|d| d.is_error()).count()
    }

    /// Number of warnings recorded.
    pub fn warning_count(&self) -> usize {
        self.items.iter().filter(|d| d.severity == DiagnosticSeverity::Warning).count()
    }

    /// Check if any errors were recorded.
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(Diagnostic::is_error)
    }

    /// Check if the sink is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of recorded diagnostics.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Iterate recorded diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// Check whether a diagnostic with the given code was recorded.
    pub fn contains(&self, code: ErrorCode) -> bool {
        self.items.iter().any(|d| d.code == code)
    }

    /// Consume the sink.
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
