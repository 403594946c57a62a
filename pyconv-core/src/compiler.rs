//! Conversion pipeline and result assembly.
//!
//! `source -> parser -> typecheck -> codegen`, with every fatal condition
//! folded into a [`ConversionResult`] by [`convert`].

use serde::Serialize;
use tracing::{debug, warn};

use crate::codegen;
use crate::diagnostic::Diagnostic;
use crate::error::CoreError;
use crate::options::{ConvertOptions, Target};
use crate::parser::parse;
use crate::span::SourceMap;
use crate::typecheck::{Analysis, analyze};

/// Outcome of one conversion call.
///
/// On failure `generated_code` is empty and `diagnostics` holds at most the
/// one fatal diagnostic that stopped the conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionResult {
    pub generated_code: String,
    pub diagnostics: Vec<Diagnostic>,
    pub success: bool,
    pub error: Option<String>,
}

/// A successful conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    pub generated_code: String,
    /// Warnings in traversal order.
    pub diagnostics: Vec<Diagnostic>,
}

#[tracing::instrument(level = "debug", skip_all, fields(output = %target, bytes = source.len()))]
pub fn try_convert(
    source: &str,
    target: Target,
    options: &ConvertOptions,
) -> Result<Conversion, CoreError> {
    let module = parse(source, options)?;
    debug!(statements = module.body.len(), "parsed");

    let map = SourceMap::new(source);
    let Analysis { module, diagnostics } = analyze(&module, &map, target, options)?;
    let generated_code = codegen::generate(&module, target, options)?;

    Ok(Conversion {
        generated_code,
        diagnostics,
    })
}

/// Converts `source` to `target`. Never fails; fatal conditions are
/// reported through `success`, `error` and the diagnostic list.
pub fn convert(source: &str, target: Target, options: &ConvertOptions) -> ConversionResult {
    match try_convert(source, target, options) {
        Ok(conversion) => ConversionResult {
            generated_code: conversion.generated_code,
            diagnostics: conversion.diagnostics,
            success: true,
            error: None,
        },
        Err(err) => {
            let map = SourceMap::new(source);
            let diagnostics = err.to_diagnostic(&map).into_iter().collect();
            let error = if err.is_internal() {
                format!("internal error: {err}")
            } else {
                err.to_string()
            };
            warn!(%error, "conversion failed");
            ConversionResult {
                generated_code: String::new(),
                diagnostics,
                success: false,
                error: Some(error),
            }
        }
    }
}
