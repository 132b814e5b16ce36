//! Structured diagnostics for configure decisions.
//!
//! Locator and converter decisions are collected in a [`ConfigureLog`] so
//! the host can replay them through its own issue reporter and tests can
//! assert on them. Each record is also emitted as the matching `tracing`
//! event at record time, so nothing needs to be replayed just to see it in
//! the build log.

use tracing::{error, info, warn};

use crate::error::DiagnosticCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

/// One recorded message, optionally tagged with a stable diagnostic code.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<DiagnosticCode>,
    pub message: String,
}

/// Ordered log of configure diagnostics.
#[derive(Debug, Default)]
pub struct ConfigureLog {
    records: Vec<Diagnostic>,
}

impl ConfigureLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.record(Severity::Info, None, message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.record(Severity::Warn, None, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(Severity::Error, None, message.into());
    }

    pub fn warn_with(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.record(Severity::Warn, Some(code), message.into());
    }

    pub fn error_with(&mut self, code: DiagnosticCode, message: impl Into<String>) {
        self.record(Severity::Error, Some(code), message.into());
    }

    fn record(&mut self, severity: Severity, code: Option<DiagnosticCode>, message: String) {
        match severity {
            Severity::Info => info!("{message}"),
            Severity::Warn => warn!("{message}"),
            Severity::Error => error!("{message}"),
        }
        self.records.push(Diagnostic {
            severity,
            code,
            message,
        });
    }

    pub fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    pub fn infos(&self) -> Vec<&str> {
        self.messages(Severity::Info)
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.messages(Severity::Warn)
    }

    pub fn errors(&self) -> Vec<&str> {
        self.messages(Severity::Error)
    }

    pub fn has_errors(&self) -> bool {
        self.records
            .iter()
            .any(|record| record.severity == Severity::Error)
    }

    /// Records carrying the given stable code.
    pub fn with_code(&self, code: DiagnosticCode) -> Vec<&Diagnostic> {
        self.records
            .iter()
            .filter(|record| record.code == Some(code))
            .collect()
    }

    fn messages(&self, severity: Severity) -> Vec<&str> {
        self.records
            .iter()
            .filter(|record| record.severity == severity)
            .map(|record| record.message.as_str())
            .collect()
    }
}
