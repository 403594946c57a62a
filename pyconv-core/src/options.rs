//! Per-conversion configuration.

use serde::{Deserialize, Serialize};

/// Output language of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "C")]
    C,
    #[serde(rename = "CPP")]
    Cpp,
}

impl Target {
    /// Whether `str + str` has a direct rendering in this language.
    pub fn string_concat_supported(self) -> bool {
        matches!(self, Target::Cpp)
    }

    pub fn name(self) -> &'static str {
        match self {
            Target::C => "C",
            Target::Cpp => "C++",
        }
    }
}

impl core::fmt::Display for Target {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tunables for a single conversion. Constructed per call; nothing here is
/// global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Maximum nesting of blocks, expressions and scopes. Exceeding it is a
    /// fatal `InternalLimitExceeded`, reported long before the native stack
    /// runs out.
    pub max_depth: usize,
    /// Spaces per indentation level in generated code.
    pub indent_width: usize,
}

pub const DEFAULT_MAX_DEPTH: usize = 200;
pub const DEFAULT_INDENT_WIDTH: usize = 4;

impl Default for ConvertOptions {
    fn default() -> Self {
        ConvertOptions {
            max_depth: DEFAULT_MAX_DEPTH,
            indent_width: DEFAULT_INDENT_WIDTH,
        }
    }
}

impl ConvertOptions {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_indent_width(mut self, indent_width: usize) -> Self {
        self.indent_width = indent_width;
        self
    }
}
