use thiserror::Error;

use crate::diagnostic::{Diagnostic, codes};
use crate::span::{SourceMap, Span};

/// Fatal conditions. Any of these aborts the conversion; everything
/// recoverable is a [`Diagnostic`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("syntax error: {message}")]
    Syntax { message: String, span: Span },
    #[error("undeclared name `{name}`")]
    UndeclaredName { name: String, span: Span },
    #[error("function `{name}` expects {expected} arguments but received {given}")]
    ArityMismatch {
        name: String,
        expected: String,
        given: usize,
        span: Span,
    },
    #[error("nesting depth exceeds the limit of {limit}")]
    InternalLimitExceeded { limit: usize, span: Span },
    #[error("no rendering rule for {0}")]
    BackendEmission(String),
}

impl CoreError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        CoreError::Syntax {
            message: message.into(),
            span,
        }
    }

    /// Internal invariant violations are kept out of the user-facing
    /// diagnostic list.
    pub fn is_internal(&self) -> bool {
        matches!(self, CoreError::BackendEmission(_))
    }

    /// The user-facing fatal diagnostic for this error, if it has one.
    pub fn to_diagnostic(&self, source: &SourceMap<'_>) -> Option<Diagnostic> {
        let (code, span) = match self {
            CoreError::Syntax { span, .. } => (codes::SYNTAX, *span),
            CoreError::UndeclaredName { span, .. } => (codes::UNDECLARED_NAME, *span),
            CoreError::ArityMismatch { span, .. } => (codes::ARITY_MISMATCH, *span),
            CoreError::InternalLimitExceeded { span, .. } => (codes::LIMIT_EXCEEDED, *span),
            CoreError::BackendEmission(_) => return None,
        };
        Some(Diagnostic::fatal(code, self.to_string(), span, source))
    }
}
