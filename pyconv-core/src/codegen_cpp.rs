//! C++ backend.

use crate::ast::BinOp;
use crate::builtins::BuiltinKind;
use crate::codegen::{
    Backend, Headers, Operand, PREC_ADDITIVE, PREC_ATOM, PREC_EQUALITY, PREC_RELATIONAL,
    PREC_SHIFT, quote,
};
use crate::error::CoreError;
use crate::hir::PrintLayout;
use crate::options::Target;
use crate::types::Type;

const IOSTREAM: &str = "<iostream>";
const STRING: &str = "<string>";
const CMATH: &str = "<cmath>";

#[derive(Debug, Clone, Copy, Default)]
pub struct CppBackend;

impl CppBackend {
    /// A string operand usable on the left of `+` or a comparison: literals
    /// are wrapped so the `std::string` overloads apply.
    fn string_value(&self, operand: &Operand, headers: &mut Headers) -> String {
        match operand.str_literal() {
            Some(_) => {
                headers.insert(STRING);
                format!("std::string({})", operand.text)
            }
            None => operand.text.clone(),
        }
    }
}

impl Backend for CppBackend {
    fn target(&self) -> Target {
        Target::Cpp
    }

    fn render_type(&self, ty: Type, headers: &mut Headers) -> &'static str {
        match ty {
            Type::Int => "int",
            Type::Float => "double",
            Type::Bool => "bool",
            Type::Str => {
                headers.insert(STRING);
                "std::string"
            }
            Type::Void => "void",
            Type::Unknown => "auto",
        }
    }

    fn render_bool(&self, value: bool, _headers: &mut Headers) -> &'static str {
        if value { "true" } else { "false" }
    }

    fn math_call(&self, name: &str, args: &[String], headers: &mut Headers) -> String {
        headers.insert(CMATH);
        format!("std::{name}({})", args.join(", "))
    }

    fn math_header(&self) -> &'static str {
        CMATH
    }

    fn render_print(
        &self,
        args: &[Operand],
        layout: &PrintLayout,
        headers: &mut Headers,
    ) -> Result<String, CoreError> {
        headers.insert(IOSTREAM);
        let mut parts = Vec::with_capacity(args.len() * 2 + 1);
        for (index, arg) in args.iter().enumerate() {
            if index > 0 && !layout.sep.is_empty() {
                parts.push(quote(&layout.sep));
            }
            let part = match arg.ty {
                Type::Bool => format!("({} ? \"True\" : \"False\")", arg.text),
                Type::Void => {
                    return Err(CoreError::BackendEmission(
                        "printing a value of type None".to_string(),
                    ));
                }
                _ => arg.at(PREC_SHIFT + 1),
            };
            parts.push(part);
        }
        match layout.end.as_str() {
            "\n" => parts.push("std::endl".to_string()),
            "" => {}
            end => parts.push(quote(end)),
        }
        if parts.is_empty() {
            parts.push(quote(""));
        }
        Ok(format!("std::cout << {}", parts.join(" << ")))
    }

    fn render_string_compare(
        &self,
        op: BinOp,
        left: &Operand,
        right: &Operand,
        headers: &mut Headers,
    ) -> Operand {
        let prec = if matches!(op, BinOp::Eq | BinOp::NotEq) {
            PREC_EQUALITY
        } else {
            PREC_RELATIONAL
        };
        let left = self.string_value(left, headers);
        Operand::new(
            format!("{left} {} {}", op.symbol(), right.at(prec + 1)),
            prec,
            Type::Bool,
        )
    }

    fn render_concat(
        &self,
        left: &Operand,
        right: &Operand,
        headers: &mut Headers,
    ) -> Result<Operand, CoreError> {
        let left = match left.str_literal() {
            Some(_) => self.string_value(left, headers),
            None => left.at(PREC_ADDITIVE),
        };
        Ok(Operand::new(
            format!("{left} + {}", right.at(PREC_ADDITIVE + 1)),
            PREC_ADDITIVE,
            Type::Str,
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
        let text = match (kind, arg.ty) {
            (BuiltinKind::Len, _) => {
                let value = match arg.str_literal() {
                    Some(_) => self.string_value(arg, headers),
                    None => arg.at(PREC_ATOM),
                };
                format!("static_cast<int>({value}.length())")
            }
            (BuiltinKind::IntCast, Type::Str) => {
                headers.insert(STRING);
                format!("std::stoi({})", arg.text)
            }
            (BuiltinKind::IntCast, _) => format!("static_cast<int>({})", arg.text),
            (BuiltinKind::FloatCast, Type::Str) => {
                headers.insert(STRING);
                format!("std::stod({})", arg.text)
            }
            (BuiltinKind::FloatCast, _) => format!("static_cast<double>({})", arg.text),
            (BuiltinKind::Abs, _) => self.math_call("abs", std::slice::from_ref(&arg.text), headers),
            (BuiltinKind::Print | BuiltinKind::Range, _) => {
                return Err(CoreError::BackendEmission(format!(
                    "{kind:?} in expression position"
                )));
            }
        };
        Ok(Operand::new(text, PREC_ATOM, ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::generate;
    use crate::options::ConvertOptions;
    use crate::parser::parse;
    use crate::span::SourceMap;
    use crate::typecheck::analyze;
    use pretty_assertions::assert_eq;

    fn operand(text: &str, prec: u8, ty: Type) -> Operand {
        Operand::new(text, prec, ty)
    }

    fn literal(text: &str) -> Operand {
        Operand {
            text: quote(text),
            prec: PREC_ATOM,
            ty: Type::Str,
            literal: Some(text.to_string()),
        }
    }

    fn render(source: &str) -> String {
        let options = ConvertOptions::default();
        let module = parse(source, &options).expect("parses");
        let map = SourceMap::new(source);
        let analysis = analyze(&module, &map, Target::Cpp, &options).expect("analyzes");
        generate(&analysis.module, Target::Cpp, &options).expect("generates")
    }

    #[test]
    fn print_chains_stream_insertions() {
        let mut headers = Headers::new();
        let args = [
            literal("sum:"),
            operand("a + b", PREC_ADDITIVE, Type::Int),
            operand("a < b", PREC_RELATIONAL, Type::Bool),
        ];
        let call = CppBackend
            .render_print(&args, &PrintLayout::default(), &mut headers)
            .expect("renders");
        assert_eq!(
            call,
            "std::cout << \"sum:\" << \" \" << a + b << \" \" << (a < b ? \"True\" : \"False\") << std::endl"
        );
        assert!(headers.contains(IOSTREAM));
    }

    #[test]
    fn print_end_literal_replaces_endl() {
        let mut headers = Headers::new();
        let layout = PrintLayout {
            sep: String::new(),
            end: "!".to_string(),
        };
        let args = [operand("x", PREC_ATOM, Type::Int), operand("y", PREC_ATOM, Type::Int)];
        let call = CppBackend
            .render_print(&args, &layout, &mut headers)
            .expect("renders");
        assert_eq!(call, "std::cout << x << y << \"!\"");
    }

    #[test]
    fn concatenation_wraps_literal_left_operand() {
        let mut headers = Headers::new();
        let joined = CppBackend
            .render_concat(&literal("a"), &operand("s", PREC_ATOM, Type::Str), &mut headers)
            .expect("renders");
        assert_eq!(joined.text, "std::string(\"a\") + s");
        assert!(headers.contains(STRING));
    }

    #[test]
    fn unknown_type_is_auto() {
        let mut headers = Headers::new();
        assert_eq!(CppBackend.render_type(Type::Unknown, &mut headers), "auto");
        assert_eq!(CppBackend.render_type(Type::Str, &mut headers), "std::string");
    }

    #[test]
    fn converts_function_with_parameters() {
        let code = render("def add(a, b):\n    return a + b\nprint(add(1, 2))\n");
        assert_eq!(
            code,
            "\
#include <iostream>

int add(int a, int b) {
    return a + b;
}

int main() {
    std::cout << add(1, 2) << std::endl;
    return 0;
}
"
        );
    }

    #[test]
    fn strings_use_std_string() {
        let code = render("s = \"ab\"\nt = s + \"c\"\nn = len(t)\nif s == \"ab\":\n    print(t)\n");
        assert!(code.contains("#include <string>"));
        assert!(code.contains("std::string s = \"ab\";"));
        assert!(code.contains("std::string t = s + \"c\";"));
        assert!(code.contains("int n = static_cast<int>(t.length());"));
        assert!(code.contains("if (s == \"ab\") {"));
    }

    #[test]
    fn power_and_floor_division_use_cmath() {
        let code = render("x = 2 ** 3\ny = 7.5 // 2\nz = 7 // 2\n");
        assert!(code.contains("#include <cmath>"));
        assert!(code.contains("double x = std::pow(2, 3);"));
        assert!(code.contains("double y = std::floor(7.5 / 2);"));
        assert!(code.contains("int z = 7 / 2;"));
    }
}
