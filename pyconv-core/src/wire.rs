//! JSON shapes exchanged with transports.
//!
//! A request names the source text and the target; the response is either
//! the generated code with rendered diagnostics or a bare error.

use serde::{Deserialize, Serialize};

use crate::compiler::convert;
use crate::options::{ConvertOptions, Target};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub source_text: String,
    pub target: Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSuccess {
    pub generated_code: String,
    /// Diagnostics rendered as `line:column: severity[code]: message`.
    pub diagnostics: Vec<String>,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct WireFailure {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum WireResponse {
    Success(WireSuccess),
    Failure(WireFailure),
}

/// Runs one request. Diagnostics keep their traversal order.
pub fn handle(request: &WireRequest, options: &ConvertOptions) -> WireResponse {
    let result = convert(&request.source_text, request.target, options);
    match result.error {
        None => WireResponse::Success(WireSuccess {
            generated_code: result.generated_code,
            diagnostics: result
                .diagnostics
                .iter()
                .map(ToString::to_string)
                .collect(),
            success: result.success,
        }),
        Some(error) => WireResponse::Failure(WireFailure { error }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_camel_case_request() {
        let request: WireRequest =
            serde_json::from_value(json!({ "sourceText": "x = 1\n", "target": "CPP" }))
                .expect("valid request");
        assert_eq!(request.target, Target::Cpp);
        assert_eq!(request.source_text, "x = 1\n");
    }

    #[test]
    fn rejects_unknown_target() {
        let parsed: Result<WireRequest, _> =
            serde_json::from_value(json!({ "sourceText": "", "target": "RUST" }));
        assert!(parsed.is_err());
    }

    #[test]
    fn success_response_lists_rendered_diagnostics() {
        let request = WireRequest {
            source_text: "s = \"a\"\ns = 1\nprint(s)\n".to_string(),
            target: Target::C,
        };
        let response = handle(&request, &ConvertOptions::default());
        let json = serde_json::to_value(&response).expect("serializes");
        assert_eq!(json["success"], true);
        assert_eq!(
            json["diagnostics"],
            json!([
                "2:1: warning[W0002]: type changed, coercion ignored: `s` is `str` but is assigned `int`"
            ])
        );
        assert!(json["generatedCode"]
            .as_str()
            .is_some_and(|code| code.contains("printf(\"%s\\n\", s);")));
    }

    #[test]
    fn failure_response_only_carries_the_error() {
        let request = WireRequest {
            source_text: "print(missing)\n".to_string(),
            target: Target::Cpp,
        };
        let response = handle(&request, &ConvertOptions::default());
        assert_eq!(
            serde_json::to_value(&response).expect("serializes"),
            json!({ "error": "undeclared name `missing`" })
        );
    }
}
