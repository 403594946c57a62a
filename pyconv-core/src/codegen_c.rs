//! C backend.
//!
//! `print` becomes a single `printf` whose format string is built from the
//! argument types; string literal arguments are inlined into the format.

use crate::ast::BinOp;
use crate::builtins::BuiltinKind;
use crate::codegen::{
    self, Backend, Headers, Operand, PREC_ATOM, PREC_EQUALITY, PREC_LOWEST, PREC_RELATIONAL,
    PREC_UNARY,
};
use crate::error::CoreError;
use crate::hir::PrintLayout;
use crate::options::Target;
use crate::types::Type;

const STDIO: &str = "<stdio.h>";
const STDLIB: &str = "<stdlib.h>";
const STRING: &str = "<string.h>";
const STDBOOL: &str = "<stdbool.h>";
const MATH: &str = "<math.h>";

#[derive(Debug, Clone, Copy, Default)]
pub struct CBackend;

impl Backend for CBackend {
    fn target(&self) -> Target {
        Target::C
    }

    fn render_type(&self, ty: Type, headers: &mut Headers) -> &'static str {
        match ty {
            Type::Int | Type::Unknown => "int",
            Type::Float => "double",
            Type::Bool => {
                headers.insert(STDBOOL);
                "bool"
            }
            Type::Str => "const char*",
            Type::Void => "void",
        }
    }

    fn render_bool(&self, value: bool, headers: &mut Headers) -> &'static str {
        headers.insert(STDBOOL);
        if value { "true" } else { "false" }
    }

    fn math_call(&self, name: &str, args: &[String], headers: &mut Headers) -> String {
        headers.insert(MATH);
        format!("{name}({})", args.join(", "))
    }

    fn math_header(&self) -> &'static str {
        MATH
    }

    fn render_print(
        &self,
        args: &[Operand],
        layout: &PrintLayout,
        headers: &mut Headers,
    ) -> Result<String, CoreError> {
        headers.insert(STDIO);
        let mut format = String::new();
        let mut values = Vec::new();
        for (index, arg) in args.iter().enumerate() {
            if index > 0 {
                format.push_str(&format_text(&layout.sep));
            }
            if let Some(text) = arg.str_literal() {
                format.push_str(&format_text(text));
                continue;
            }
            match arg.ty {
                Type::Int | Type::Unknown => {
                    format.push_str("%d");
                    values.push(arg.text.clone());
                }
                Type::Float => {
                    format.push_str("%g");
                    values.push(arg.text.clone());
                }
                Type::Str => {
                    format.push_str("%s");
                    values.push(arg.text.clone());
                }
                Type::Bool => {
                    format.push_str("%s");
                    values.push(format!(
                        "{} ? \"True\" : \"False\"",
                        arg.at(PREC_LOWEST + 1)
                    ));
                }
                Type::Void => {
                    return Err(CoreError::BackendEmission(
                        "printing a value of type None".to_string(),
                    ));
                }
            }
        }
        format.push_str(&format_text(&layout.end));

        let mut call = format!("printf(\"{format}\"");
        for value in values {
            call.push_str(", ");
            call.push_str(&value);
        }
        call.push(')');
        Ok(call)
    }

    fn render_string_compare(
        &self,
        op: BinOp,
        left: &Operand,
        right: &Operand,
        headers: &mut Headers,
    ) -> Operand {
        headers.insert(STRING);
        let prec = if matches!(op, BinOp::Eq | BinOp::NotEq) {
            PREC_EQUALITY
        } else {
            PREC_RELATIONAL
        };
        Operand::new(
            format!("strcmp({}, {}) {} 0", left.text, right.text, c_comparison(op)),
            prec,
            Type::Bool,
        )
    }

    fn render_concat(
        &self,
        _left: &Operand,
        _right: &Operand,
        _headers: &mut Headers,
    ) -> Result<Operand, CoreError> {
        Err(CoreError::BackendEmission(
            "string concatenation in C".to_string(),
        ))
    }

    fn render_builtin(
        &self,
        kind: BuiltinKind,
        args: &[Operand],
        ty: Type,
        headers: &mut Headers,
    ) -> Result<Operand, CoreError> {
        let [arg] = args else {
            return Err(CoreError::BackendEmission(format!(
                "{kind:?} with {} arguments",
                args.len()
            )));
        };
        let operand = match (kind, arg.ty) {
            (BuiltinKind::Len, _) => {
                headers.insert(STRING);
                Operand::new(format!("(int)strlen({})", arg.text), PREC_UNARY, ty)
            }
            (BuiltinKind::IntCast, Type::Str) => {
                headers.insert(STDLIB);
                Operand::new(format!("atoi({})", arg.text), PREC_ATOM, ty)
            }
            (BuiltinKind::IntCast, _) => {
                Operand::new(format!("(int){}", arg.at(PREC_UNARY)), PREC_UNARY, ty)
            }
            (BuiltinKind::FloatCast, Type::Str) => {
                headers.insert(STDLIB);
                Operand::new(format!("atof({})", arg.text), PREC_ATOM, ty)
            }
            (BuiltinKind::FloatCast, _) => {
                Operand::new(format!("(double){}", arg.at(PREC_UNARY)), PREC_UNARY, ty)
            }
            (BuiltinKind::Abs, Type::Float) => {
                let text = self.math_call("fabs", std::slice::from_ref(&arg.text), headers);
                Operand::new(text, PREC_ATOM, ty)
            }
            (BuiltinKind::Abs, _) => {
                headers.insert(STDLIB);
                Operand::new(format!("abs({})", arg.text), PREC_ATOM, ty)
            }
            (BuiltinKind::Print | BuiltinKind::Range, _) => {
                return Err(CoreError::BackendEmission(format!(
                    "{kind:?} in expression position"
                )));
            }
        };
        Ok(operand)
    }
}

/// Text for a `printf` format string: C-escaped with `%` doubled.
fn format_text(text: &str) -> String {
    codegen::escape(text).replace('%', "%%")
}

fn c_comparison(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "==",
        BinOp::NotEq => "!=",
        BinOp::Lt => "<",
        BinOp::LtE => "<=",
        BinOp::Gt => ">",
        _ => ">=",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn operand(text: &str, ty: Type) -> Operand {
        Operand::new(text, PREC_ATOM, ty)
    }

    fn literal(text: &str) -> Operand {
        Operand {
            text: codegen::quote(text),
            prec: PREC_ATOM,
            ty: Type::Str,
            literal: Some(text.to_string()),
        }
    }

    #[test]
    fn maps_types_to_keywords() {
        let mut headers = Headers::new();
        assert_eq!(CBackend.render_type(Type::Str, &mut headers), "const char*");
        assert_eq!(CBackend.render_type(Type::Unknown, &mut headers), "int");
        assert!(headers.is_empty());
        assert_eq!(CBackend.render_type(Type::Bool, &mut headers), "bool");
        assert!(headers.contains(STDBOOL));
    }

    #[test]
    fn print_builds_one_format_from_argument_types() {
        let mut headers = Headers::new();
        let args = [
            literal("x ="),
            operand("x", Type::Int),
            operand("y", Type::Float),
            operand("ok", Type::Bool),
            operand("s", Type::Str),
        ];
        let call = CBackend
            .render_print(&args, &PrintLayout::default(), &mut headers)
            .expect("renders");
        assert_eq!(
            call,
            "printf(\"x = %d %g %s %s\\n\", x, y, ok ? \"True\" : \"False\", s)"
        );
        assert!(headers.contains(STDIO));
    }

    #[test]
    fn print_layout_and_percent_signs_are_escaped() {
        let mut headers = Headers::new();
        let layout = PrintLayout {
            sep: "%".to_string(),
            end: String::new(),
        };
        let args = [literal("100%"), operand("n", Type::Int)];
        let call = CBackend
            .render_print(&args, &layout, &mut headers)
            .expect("renders");
        assert_eq!(call, "printf(\"100%%%%%d\", n)");
    }

    #[test]
    fn empty_print_prints_newline() {
        let mut headers = Headers::new();
        let call = CBackend
            .render_print(&[], &PrintLayout::default(), &mut headers)
            .expect("renders");
        assert_eq!(call, "printf(\"\\n\")");
    }

    #[test]
    fn string_comparison_uses_strcmp() {
        let mut headers = Headers::new();
        let rendered = CBackend.render_string_compare(
            BinOp::Eq,
            &operand("a", Type::Str),
            &literal("b"),
            &mut headers,
        );
        assert_eq!(rendered.text, "strcmp(a, \"b\") == 0");
        assert!(headers.contains(STRING));
    }

    #[test]
    fn concatenation_is_refused() {
        let mut headers = Headers::new();
        let err = CBackend
            .render_concat(&literal("a"), &literal("b"), &mut headers)
            .unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn builtins_pick_type_specific_functions() {
        let mut headers = Headers::new();
        let len = CBackend
            .render_builtin(BuiltinKind::Len, &[operand("s", Type::Str)], Type::Int, &mut headers)
            .expect("renders");
        assert_eq!(len.text, "(int)strlen(s)");

        let abs = CBackend
            .render_builtin(BuiltinKind::Abs, &[operand("f", Type::Float)], Type::Float, &mut headers)
            .expect("renders");
        assert_eq!(abs.text, "fabs(f)");

        let parsed = CBackend
            .render_builtin(BuiltinKind::IntCast, &[operand("s", Type::Str)], Type::Int, &mut headers)
            .expect("renders");
        assert_eq!(parsed.text, "atoi(s)");

        let sum = Operand::new("a + b", codegen::PREC_ADDITIVE, Type::Int);
        let widened = CBackend
            .render_builtin(BuiltinKind::FloatCast, &[sum], Type::Float, &mut headers)
            .expect("renders");
        assert_eq!(widened.text, "(double)(a + b)");

        assert_eq!(
            headers.into_iter().collect::<Vec<_>>(),
            vec![MATH, STDLIB, STRING]
        );
    }
}
