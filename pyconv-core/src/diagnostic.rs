//! Recorded warnings and fatal conditions.
//!
//! Diagnostics are collected in traversal order and never reordered or
//! de-duplicated. Codes starting with `W` are recoverable; codes starting
//! with `E` abort the conversion.

use serde::Serialize;

use crate::span::{SourceLocation, SourceMap, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Fatal,
}

impl core::fmt::Display for Severity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Fatal => f.write_str("fatal"),
        }
    }
}

/// Stable identifiers for every diagnostic the converter can produce.
pub mod codes {
    pub const UNSUPPORTED_CONSTRUCT: &str = "W0001";
    pub const TYPE_CHANGED: &str = "W0002";
    pub const NON_BOOLEAN_CONDITION: &str = "W0003";
    pub const UNSUPPORTED_OPERANDS: &str = "W0004";
    pub const ARGUMENT_TYPE: &str = "W0005";
    pub const STRING_CONCAT: &str = "W0006";
    pub const RETURN_TYPES: &str = "W0007";
    pub const PENDING_RETURN: &str = "W0008";
    pub const INTEGER_RANGE: &str = "W0009";

    pub const SYNTAX: &str = "E0001";
    pub const UNDECLARED_NAME: &str = "E0002";
    pub const ARITY_MISMATCH: &str = "E0003";
    pub const LIMIT_EXCEEDED: &str = "E0004";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    #[serde(skip)]
    pub span: Span,
    pub location: SourceLocation,
}

impl Diagnostic {
    pub fn warning(
        code: &'static str,
        message: impl Into<String>,
        span: Span,
        source: &SourceMap<'_>,
    ) -> Self {
        Diagnostic {
            severity: Severity::Warning,
            code,
            message: message.into(),
            span,
            location: source.location(span.start),
        }
    }

    pub fn fatal(
        code: &'static str,
        message: impl Into<String>,
        span: Span,
        source: &SourceMap<'_>,
    ) -> Self {
        Diagnostic {
            severity: Severity::Fatal,
            code,
            message: message.into(),
            span,
            location: source.location(span.start),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}: {}[{}]: {}",
            self.location, self.severity, self.code, self.message
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_location_severity_and_code() {
        let source = SourceMap::new("x = 1\ny = x + \"a\"\n");
        let diag = Diagnostic::warning(
            codes::UNSUPPORTED_OPERANDS,
            "unsupported operand types for `+`: `int` and `str`",
            Span::new(10, 17),
            &source,
        );
        assert_eq!(
            diag.to_string(),
            "2:5: warning[W0004]: unsupported operand types for `+`: `int` and `str`"
        );
        assert!(!diag.is_fatal());
    }
}
