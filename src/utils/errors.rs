//! Error types for the DM front end.
//!
//! Two channels exist side by side:
//!
//! - *Abort* errors ([`ParseError`], [`SemanticError`]) are returned through
//!   `Result` and unwind to the nearest statement or declaration boundary,
//!   where they are converted into a diagnostic and compilation resumes.
//! - *Diagnostics* ([`Diagnostic`]) are plain data appended to a
//!   [`Diagnostics`](crate::utils::diagnostics::Diagnostics) sink. Recording
//!   one never changes control flow.

use thiserror::Error;
use serde::{Serialize, Deserialize};
use crate::utils::location::Span;
use std::fmt;
use std::str::FromStr;

/// Top-level error type for the front end.
#[derive(Error, Debug)]
pub enum CompileError {
    /// Error during parsing
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Error during expression resolution or statement compilation
    #[error("Semantic error: {0}")]
    Semantic(#[from] SemanticError),

    /// Compilation finished but reported errors
    #[error("{0} error(s) reported")]
    Reported(usize),

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error that abandons the statement being parsed.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct ParseError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of parse error
    pub kind: ParseErrorKind,
    /// Expected tokens (if applicable)
    pub expected: Vec<String>,
    /// What was found
    pub found: Option<String>,
}

impl ParseError {
    /// Create a parse error with no expectation details.
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
            expected: Vec::new(),
            found: None,
        }
    }

    /// Record what was found instead.
    pub fn with_found(mut self, found: impl Into<String>) -> Self {
        self.found = Some(found.into());
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)?;
        if !self.expected.is_empty() {
            write!(f, " (expected: {})", self.expected.join(", "))?;
        }
        if let Some(ref found) = self.found {
            write!(f, " (found: {})", found)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseErrorKind {
    /// Unexpected token
    UnexpectedToken,
    /// Expected a specific token
    ExpectedToken,
    /// Expected an expression
    ExpectedExpression,
    /// Expected an identifier
    ExpectedIdentifier,
    /// Malformed path
    InvalidPath,
    /// Invalid syntax
    InvalidSyntax,
    /// Wrong number of arguments to a built-in
    InvalidArgumentCount,
    /// Unexpected end of file
    UnexpectedEof,
}

impl ParseErrorKind {
    /// The diagnostic code reported for this kind of error.
    pub fn code(self) -> ErrorCode {
        match self {
            ParseErrorKind::ExpectedExpression => ErrorCode::MissingExpression,
            ParseErrorKind::InvalidArgumentCount => ErrorCode::InvalidArgumentCount,
            ParseErrorKind::InvalidPath => ErrorCode::BadExpression,
            _ => ErrorCode::BadToken,
        }
    }
}

/// Error that abandons the expression or statement being compiled.
#[derive(Error, Debug, Clone, PartialEq)]
pub struct SemanticError {
    /// The error message
    pub message: String,
    /// Location in source
    pub span: Span,
    /// The kind of semantic error
    pub kind: SemanticErrorKind,
}

impl SemanticError {
    /// Create a semantic error.
    pub fn new(kind: SemanticErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self { message: message.into(), span, kind }
    }
}

impl fmt::Display for SemanticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message, self.span)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SemanticErrorKind {
    /// Name not visible in the current scope mode
    UnknownIdentifier,
    /// Type path does not exist in the object tree
    UnknownType,
    /// Field does not exist on a statically known type
    UnknownField,
    /// Proc does not exist on a statically known type
    UnknownProc,
    /// `new`/`locate` without a type and without an inferred one
    MissingInferredType,
    /// Expression used where an l-value is required
    InvalidReference,
    /// Name used outside the context that gives it meaning
    InvalidContext,
    /// A compile-time constant was required
    ConstantRequired,
    /// Invalid argument to a built-in
    BadArgument,
}

impl SemanticErrorKind {
    /// The diagnostic code reported for this kind of error.
    pub fn code(self) -> ErrorCode {
        match self {
            SemanticErrorKind::UnknownIdentifier
            | SemanticErrorKind::UnknownType
            | SemanticErrorKind::UnknownField
            | SemanticErrorKind::UnknownProc => ErrorCode::ItemDoesntExist,
            SemanticErrorKind::MissingInferredType => ErrorCode::BadExpression,
            SemanticErrorKind::InvalidReference => ErrorCode::InvalidReference,
            SemanticErrorKind::InvalidContext => ErrorCode::BadExpression,
            SemanticErrorKind::ConstantRequired => ErrorCode::HardConstContext,
            SemanticErrorKind::BadArgument => ErrorCode::BadArgument,
        }
    }
}

/// Stable diagnostic codes.
///
/// 0-999 are errors that cannot be demoted, 2000-2999 flag questionable
/// behaviour and 3000-3999 are stylistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ErrorCode {
    Unknown = 0,
    BadToken = 1,
    BadExpression = 11,
    MissingExpression = 12,
    InvalidArgumentCount = 13,
    InvalidVarDefinition = 14,
    MissingBody = 15,
    BadLabel = 19,
    InvalidReference = 50,
    BadArgument = 100,
    InvalidArgumentKey = 101,
    ItemDoesntExist = 404,
    HardConstContext = 500,
    WriteToConstant = 501,
    DuplicateVariable = 2100,
    MalformedRange = 2300,
    InvalidRange = 2301,
    InvalidSetStatement = 2302,
    MissingInterpolatedExpression = 2500,
    UnimplementedAccess = 2800,
    EmptyBlock = 3100,
    EmptyProc = 3101,
    UnreachableCode = 3102,
    SuspiciousSwitchCase = 3201,
    AssignmentInConditional = 3202,
    PickWeightedSyntax = 3203,
    ExtraToken = 3205,
    ParserRecovery = 3206,
}

impl ErrorCode {
    const ALL: [ErrorCode; 28] = [
        ErrorCode::Unknown,
        ErrorCode::BadToken,
        ErrorCode::BadExpression,
        ErrorCode::MissingExpression,
        ErrorCode::InvalidArgumentCount,
        ErrorCode::InvalidVarDefinition,
        ErrorCode::MissingBody,
        ErrorCode::BadLabel,
        ErrorCode::InvalidReference,
        ErrorCode::BadArgument,
        ErrorCode::InvalidArgumentKey,
        ErrorCode::ItemDoesntExist,
        ErrorCode::HardConstContext,
        ErrorCode::WriteToConstant,
        ErrorCode::DuplicateVariable,
        ErrorCode::MalformedRange,
        ErrorCode::InvalidRange,
        ErrorCode::InvalidSetStatement,
        ErrorCode::MissingInterpolatedExpression,
        ErrorCode::UnimplementedAccess,
        ErrorCode::EmptyBlock,
        ErrorCode::EmptyProc,
        ErrorCode::UnreachableCode,
        ErrorCode::SuspiciousSwitchCase,
        ErrorCode::AssignmentInConditional,
        ErrorCode::PickWeightedSyntax,
        ErrorCode::ExtraToken,
        ErrorCode::ParserRecovery,
    ];

    /// The numeric code.
    pub fn number(self) -> u32 {
        self as u32
    }

    /// Look up a code by its number.
    pub fn from_number(number: u32) -> Option<ErrorCode> {
        Self::ALL.iter().copied().find(|code| code.number() == number)
    }

    /// Whether the code may be demoted below an error.
    pub fn is_forced_error(self) -> bool {
        self.number() < 1000
    }

    /// Severity used when no override is configured.
    pub fn default_severity(self) -> DiagnosticSeverity {
        match self {
            c if c.is_forced_error() => DiagnosticSeverity::Error,
            ErrorCode::InvalidSetStatement | ErrorCode::InvalidRange => DiagnosticSeverity::Error,
            ErrorCode::EmptyProc | ErrorCode::ParserRecovery => DiagnosticSeverity::Note,
            _ => DiagnosticSeverity::Warning,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OD{:04}", self.number())
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    /// Accepts `3100`, `OD3100` or the variant name (`EmptyBlock`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("OD").unwrap_or(s);
        if let Ok(number) = digits.parse::<u32>() {
            return ErrorCode::from_number(number).ok_or_else(|| format!("unknown diagnostic code {}", s));
        }
        ErrorCode::ALL
            .iter()
            .copied()
            .find(|code| format!("{:?}", code).eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown diagnostic code {}", s))
    }
}

/// A recoverable problem found while compiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: DiagnosticSeverity,
    /// Stable code
    pub code: ErrorCode,
    /// Message
    pub message: String,
    /// Primary span
    pub span: Option<Span>,
    /// Additional notes
    pub notes: Vec<String>,
    /// Suggested fix (if any)
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    /// Note - informational message
    Note,
    /// Warning - compilation continues
    Warning,
    /// Error - the output will not be usable
    Error,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Note => write!(f, "note"),
            DiagnosticSeverity::Warning => write!(f, "warning"),
            DiagnosticSeverity::Error => write!(f, "error"),
        }
    }
}

impl Diagnostic {
    /// Create a diagnostic with the code's default severity.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: code.default_severity(),
            code,
            message: message.into(),
            span: None,
            notes: Vec::new(),
            suggestion: None,
        }
    }

    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unknown, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        let mut diagnostic = Self::new(ErrorCode::Unknown, message);
        diagnostic.severity = DiagnosticSeverity::Warning;
        diagnostic
    }

    /// Replace the default severity.
    pub fn with_severity(mut self, severity: DiagnosticSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// Add a span to the diagnostic.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Add a note to the diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Add a suggestion to the diagnostic.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Check if this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.code, self.message)?;
        if let Some(span) = self.span {
            write!(f, " at {}", span)?;
        }
        Ok(())
    }
}

impl From<ParseError> for Diagnostic {
    fn from(err: ParseError) -> Self {
        let mut diagnostic = Diagnostic::new(err.kind.code(), err.message).with_span(err.span);
        if !err.expected.is_empty() {
            diagnostic = diagnostic.with_note(format!("expected: {}", err.expected.join(", ")));
        }
        if let Some(found) = err.found {
            diagnostic = diagnostic.with_note(format!("found: {}", found));
        }
        diagnostic
    }
}

impl From<SemanticError> for Diagnostic {
    fn from(err: SemanticError) -> Self {
        Diagnostic::new(err.kind.code(), err.message).with_span(err.span)
    }
}

/// Result type using CompileError.
pub type DmResult<T> = Result<T, CompileError>;

/// Result of parsing one construct.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result of resolving or compiling one construct.
pub type SemanticResult<T> = Result<T, SemanticError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError {
            message: "Unexpected token".to_string(),
            span: Span::new(1, 5, 1, 10),
            kind: ParseErrorKind::UnexpectedToken,
            expected: vec!["identifier".to_string()],
            found: Some("number".to_string()),
        };
        let s = format!("{}", err);
        assert!(s.contains("Unexpected token"));
        assert!(s.contains("identifier"));
    }

    #[test]
    fn test_code_lookup() {
        assert_eq!("3100".parse::<ErrorCode>(), Ok(ErrorCode::EmptyBlock));
        assert_eq!("OD3202".parse::<ErrorCode>(), Ok(ErrorCode::AssignmentInConditional));
        assert_eq!("emptyblock".parse::<ErrorCode>(), Ok(ErrorCode::EmptyBlock));
        assert!("9999".parse::<ErrorCode>().is_err());
    }

    #[test]
    fn test_default_severity() {
        assert_eq!(ErrorCode::ItemDoesntExist.default_severity(), DiagnosticSeverity::Error);
        assert_eq!(ErrorCode::EmptyBlock.default_severity(), DiagnosticSeverity::Warning);
        assert_eq!(ErrorCode::ParserRecovery.default_severity(), DiagnosticSeverity::Note);
    }

    #[test]
    fn test_semantic_error_to_diagnostic() {
        let err = SemanticError::new(SemanticErrorKind::UnknownIdentifier, "Unknown identifier \"x\"", Span::new(3, 1, 3, 2));
        let diagnostic = Diagnostic::from(err);
        assert_eq!(diagnostic.code, ErrorCode::ItemDoesntExist);
        assert!(diagnostic.is_error());
        assert_eq!(diagnostic.span.map(|s| s.start_line), Some(3));
    }
}
