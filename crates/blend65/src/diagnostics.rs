//! Diagnostic codes, severities, and the ordered diagnostic stream.
//!
//! Every pass reports through a [`DiagnosticBag`] and keeps going after the
//! first error wherever it can, so one invocation surfaces as many problems
//! as possible. Codes are stable strings: downstream tooling matches on the
//! code, never on the message text.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::source::{SourceRegistry, SourceSpan};

/// How severe a diagnostic is.
///
/// Presence of any [`Severity::Error`] fails the compile; warnings and info
/// never block code emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Stable diagnostic codes.
///
/// The serialized form is the code string reported to users and matched by
/// tests and tooling (e.g. `ZP_OVERFLOW`). Variants carry a default severity
/// via [`DiagnosticCode::default_severity`]; a few codes are emitted at a
/// different severity in context (`NUMERIC_OVERFLOW` is an error for literal
/// overflow but only informational for may-overflow arithmetic).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // --- Symbol errors ---
    DuplicateDeclaration,
    SymbolNotFound,
    UnknownType,
    ConstRequiresInitializer,
    ConstReassignment,
    MissingTypeAnnotation,

    // --- Type errors ---
    TypeMismatch,
    ReturnTypeMismatch,
    ArgumentTypeMismatch,
    ArgumentCountMismatch,
    InvalidLValue,
    InvalidOperator,
    NumericOverflow,
    NotCallable,

    // --- Control-flow ---
    ControlFlowOutsideLoop,
    UnreachableCode,
    MayNotReturn,
    MissingReturnValue,
    UnexpectedReturnValue,

    // --- Module system ---
    ModuleNotFound,
    SymbolNotExported,
    NoExports,
    ImportConflict,
    ModuleCycle,

    // --- Memory layout ---
    ZpOverflow,
    MapOverlap,
    ZpMapOverlap,
    SelfModifyingCode,

    // --- Frames ---
    FrameOverflow,
    RecursionInfo,
}

impl DiagnosticCode {
    /// The severity this code is normally emitted at.
    #[must_use]
    pub fn default_severity(self) -> Severity {
        match self {
            Self::UnreachableCode | Self::MayNotReturn | Self::SelfModifyingCode => Severity::Warning,
            Self::RecursionInfo => Severity::Info,
            _ => Severity::Error,
        }
    }
}

/// One reported problem with a stable code, location, and optional fix hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    pub location: SourceSpan,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Creates a diagnostic at the code's default severity.
    #[must_use]
    pub fn new(code: DiagnosticCode, message: impl Into<String>, location: SourceSpan) -> Self {
        Self {
            code,
            severity: code.default_severity(),
            message: message.into(),
            location,
            suggestion: None,
        }
    }

    /// Overrides the default severity.
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Attaches a suggested fix shown after the message.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Renders the diagnostic with the source line it points at.
    #[must_use]
    pub fn render(&self, sources: &SourceRegistry) -> String {
        let mut out = self.to_string();
        if let Some(snippet) = sources.snippet(self.location) {
            out.push('\n');
            out.push_str("  | ");
            out.push_str(snippet);
        }
        if let Some(suggestion) = &self.suggestion {
            out.push('\n');
            out.push_str("  = suggestion: ");
            out.push_str(suggestion);
        }
        out
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        write!(
            f,
            "{severity}[{}] {}: {}",
            self.code, self.location, self.message
        )
    }
}

/// Ordered, append-only diagnostic stream shared by all passes.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Reports `code` at its default severity.
    pub fn report(&mut self, code: DiagnosticCode, message: impl Into<String>, location: SourceSpan) {
        self.push(Diagnostic::new(code, message, location));
    }

    /// Reports `code` forced to [`Severity::Info`].
    pub fn report_info(&mut self, code: DiagnosticCode, message: impl Into<String>, location: SourceSpan) {
        self.push(Diagnostic::new(code, message, location).with_severity(Severity::Info));
    }

    /// Forwards diagnostics produced upstream (parser) or by a sub-pass.
    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics.iter().filter(|d| d.severity == severity).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// All diagnostics with the given code, in insertion order.
    pub fn with_code(&self, code: DiagnosticCode) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.code == code)
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

impl<'a> IntoIterator for &'a DiagnosticBag {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.iter()
    }
}
