//! Converter base shared by the C and C++ backends.
//!
//! [`Emitter`] walks a [`HirModule`] and owns everything both targets agree
//! on: layout and indentation, statement order, operator precedence and
//! parenthesisation, prototypes for forward-referenced functions, header
//! collection, the floor-division helpers and placeholder comments. A
//! [`Backend`] only supplies tokens and the hooks where the two languages
//! diverge.

use std::collections::BTreeSet;

use tracing::debug;

use crate::ast::{BinOp, UnaryOp};
use crate::builtins::BuiltinKind;
use crate::codegen_c::CBackend;
use crate::codegen_cpp::CppBackend;
use crate::error::CoreError;
use crate::hir::{
    Callee, Entry, HirExpr, HirExprKind, HirFunction, HirModule, HirStmt, HirStmtKind, Literal,
    LoopDirection, PrintLayout,
};
use crate::options::{ConvertOptions, Target};
use crate::stack::ensure_sufficient_stack;
use crate::types::Type;

/// Include targets collected while emitting, e.g. `<stdio.h>`. Sorted so
/// output is deterministic.
pub type Headers = BTreeSet<&'static str>;

pub const PREC_LOWEST: u8 = 0;
pub const PREC_OR: u8 = 1;
pub const PREC_AND: u8 = 2;
pub const PREC_BIT_OR: u8 = 3;
pub const PREC_BIT_XOR: u8 = 4;
pub const PREC_BIT_AND: u8 = 5;
pub const PREC_EQUALITY: u8 = 6;
pub const PREC_RELATIONAL: u8 = 7;
pub const PREC_SHIFT: u8 = 8;
pub const PREC_ADDITIVE: u8 = 9;
pub const PREC_MULTIPLICATIVE: u8 = 10;
pub const PREC_UNARY: u8 = 11;
pub const PREC_ATOM: u8 = 12;

/// Functions giving `//` and `%` their flooring semantics, emitted once
/// ahead of the first function that needs them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Helper {
    FloorDiv,
    FloorMod,
    FloatMod,
}

impl Helper {
    fn name(self) -> &'static str {
        match self {
            Helper::FloorDiv => "pyconv_floordiv",
            Helper::FloorMod => "pyconv_mod",
            Helper::FloatMod => "pyconv_fmod",
        }
    }
}

/// A rendered subexpression together with the binding strength of its
/// outermost operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Operand {
    pub text: String,
    pub prec: u8,
    pub ty: Type,
    /// Source text of a string literal operand, for backends that inline it.
    pub literal: Option<String>,
}

impl Operand {
    pub fn new(text: impl Into<String>, prec: u8, ty: Type) -> Self {
        Operand {
            text: text.into(),
            prec,
            ty,
            literal: None,
        }
    }

    /// The text, parenthesised unless it binds at least as tight as
    /// `min_prec`.
    pub fn at(&self, min_prec: u8) -> String {
        if self.prec < min_prec {
            format!("({})", self.text)
        } else {
            self.text.clone()
        }
    }

    pub fn str_literal(&self) -> Option<&str> {
        self.literal.as_deref()
    }
}

/// Target-specific rendering hooks.
pub trait Backend {
    fn target(&self) -> Target;

    /// Type keyword, registering any header the keyword needs.
    fn render_type(&self, ty: Type, headers: &mut Headers) -> &'static str;

    fn render_bool(&self, value: bool, headers: &mut Headers) -> &'static str;

    fn render_str(&self, text: &str, _headers: &mut Headers) -> String {
        quote(text)
    }

    /// Calls a function from the C math library, e.g. `pow` or `floor`.
    fn math_call(&self, name: &str, args: &[String], headers: &mut Headers) -> String;

    /// Header declaring `HUGE_VAL` and the math functions.
    fn math_header(&self) -> &'static str;

    /// A whole `print` statement, without the trailing `;`.
    fn render_print(
        &self,
        args: &[Operand],
        layout: &PrintLayout,
        headers: &mut Headers,
    ) -> Result<String, CoreError>;

    /// `left op right` for two string operands.
    fn render_string_compare(
        &self,
        op: BinOp,
        left: &Operand,
        right: &Operand,
        headers: &mut Headers,
    ) -> Operand;

    fn render_concat(
        &self,
        left: &Operand,
        right: &Operand,
        headers: &mut Headers,
    ) -> Result<Operand, CoreError>;

    /// `len`, `int`, `float` and `abs`. `ty` is the analyzed result type.
    fn render_builtin(
        &self,
        kind: BuiltinKind,
        args: &[Operand],
        ty: Type,
        headers: &mut Headers,
    ) -> Result<Operand, CoreError>;
}

/// Renders `module` as source text of `target`.
#[tracing::instrument(level = "debug", skip_all, fields(output = %target))]
pub fn generate(
    module: &HirModule,
    target: Target,
    options: &ConvertOptions,
) -> Result<String, CoreError> {
    let code = match target {
        Target::C => Emitter::new(&CBackend, options).emit_module(module)?,
        Target::Cpp => Emitter::new(&CppBackend, options).emit_module(module)?,
    };
    debug!(bytes = code.len(), "code generated");
    Ok(code)
}

pub struct Emitter<'b, B: Backend> {
    backend: &'b B,
    indent_width: usize,
    level: usize,
    headers: Headers,
    helpers: BTreeSet<Helper>,
    out: String,
}

impl<'b, B: Backend> Emitter<'b, B> {
    pub fn new(backend: &'b B, options: &ConvertOptions) -> Self {
        Emitter {
            backend,
            indent_width: options.indent_width,
            level: 0,
            headers: Headers::new(),
            helpers: BTreeSet::new(),
            out: String::new(),
        }
    }

    pub fn emit_module(mut self, module: &HirModule) -> Result<String, CoreError> {
        debug!(
            output = %self.backend.target(),
            functions = module.functions.len(),
            "emitting module"
        );
        let mut sections = Vec::new();

        if !module.globals.is_empty() {
            for stmt in &module.globals {
                self.emit_statement(stmt)?;
            }
            sections.push(std::mem::take(&mut self.out));
        }

        if module.entry == Entry::UserDefined && !module.body.is_empty() {
            for stmt in &module.body {
                self.emit_statement(stmt)?;
            }
            sections.push(std::mem::take(&mut self.out));
        }

        let prototypes: Vec<String> = module
            .functions
            .iter()
            .filter(|function| function.needs_prototype)
            .map(|function| format!("{};\n", self.signature(function)))
            .collect();
        if !prototypes.is_empty() {
            sections.push(prototypes.concat());
        }

        for function in &module.functions {
            self.emit_function(function)?;
            sections.push(std::mem::take(&mut self.out));
        }

        if module.entry == Entry::Generated {
            self.line("int main() {");
            self.level += 1;
            for stmt in &module.body {
                self.emit_statement(stmt)?;
            }
            self.line("return 0;");
            self.level -= 1;
            self.line("}");
            sections.push(std::mem::take(&mut self.out));
        }

        if !self.helpers.is_empty() {
            let helpers = std::mem::take(&mut self.helpers);
            let definitions: Vec<String> = helpers
                .into_iter()
                .map(|helper| self.helper_definition(helper))
                .collect();
            sections.insert(0, definitions.join("\n"));
        }

        let mut code = String::new();
        if !self.headers.is_empty() {
            for header in &self.headers {
                code.push_str("#include ");
                code.push_str(header);
                code.push('\n');
            }
            code.push('\n');
        }
        code.push_str(&sections.join("\n"));
        Ok(code)
    }

    pub fn emit_function(&mut self, function: &HirFunction) -> Result<(), CoreError> {
        let signature = self.signature(function);
        self.line(&format!("{signature} {{"));
        self.level += 1;
        for stmt in &function.body {
            self.emit_statement(stmt)?;
        }
        self.level -= 1;
        self.line("}");
        Ok(())
    }

    fn signature(&mut self, function: &HirFunction) -> String {
        let params: Vec<String> = function
            .params
            .iter()
            .map(|param| {
                let ty = self.backend.render_type(param.ty, &mut self.headers);
                format!("{ty} {}", param.name.name)
            })
            .collect();
        let result = self.backend.render_type(function.result, &mut self.headers);
        format!("{result} {}({})", function.name.name, params.join(", "))
    }

    /// C definition of `helper`. Both targets accept the same text.
    fn helper_definition(&mut self, helper: Helper) -> String {
        let int = self.backend.render_type(Type::Int, &mut self.headers);
        let float = self.backend.render_type(Type::Float, &mut self.headers);
        let name = helper.name();
        match helper {
            Helper::FloorDiv => format!(
                "static {int} {name}({int} a, {int} b) {{\n    {int} q = a / b;\n    if (a % b != 0 && (a < 0) != (b < 0)) {{\n        q -= 1;\n    }}\n    return q;\n}}\n"
            ),
            Helper::FloorMod => format!(
                "static {int} {name}({int} a, {int} b) {{\n    {int} r = a % b;\n    if (r != 0 && (r < 0) != (b < 0)) {{\n        r += b;\n    }}\n    return r;\n}}\n"
            ),
            Helper::FloatMod => {
                let fmod = self.backend.math_call(
                    "fmod",
                    &["a".to_string(), "b".to_string()],
                    &mut self.headers,
                );
                format!(
                    "static {float} {name}({float} a, {float} b) {{\n    {float} r = {fmod};\n    if (r != 0 && (r < 0) != (b < 0)) {{\n        r += b;\n    }}\n    return r;\n}}\n"
                )
            }
        }
    }

    pub fn emit_statement(&mut self, stmt: &HirStmt) -> Result<(), CoreError> {
        ensure_sufficient_stack(|| self.emit_statement_kind(stmt))
    }

    fn emit_statement_kind(&mut self, stmt: &HirStmt) -> Result<(), CoreError> {
        match &stmt.kind {
            HirStmtKind::VarDecl { name, value } => {
                let ty = self.backend.render_type(stmt.ty, &mut self.headers);
                match value {
                    Some(value) => {
                        let value = self.emit_expression(value)?;
                        self.line(&format!("{ty} {} = {};", name.name, value.text));
                    }
                    None => self.line(&format!("{ty} {};", name.name)),
                }
            }
            HirStmtKind::Assign { name, value } => {
                let value = self.emit_expression(value)?;
                self.line(&format!("{} = {};", name.name, value.text));
            }
            HirStmtKind::If {
                cond,
                then_body,
                else_body,
            } => {
                let cond = self.emit_expression(cond)?;
                self.line(&format!("if ({}) {{", cond.text));
                self.emit_if_tail(then_body, else_body)?;
            }
            HirStmtKind::While { cond, body } => {
                let cond = self.emit_expression(cond)?;
                self.line(&format!("while ({}) {{", cond.text));
                self.emit_block(body)?;
                self.line("}");
            }
            HirStmtKind::For {
                var,
                declare,
                start,
                stop,
                step,
                direction,
                body,
            } => {
                let var = var.name.as_str();
                let start = match start {
                    Some(start) => self.emit_expression(start)?.text,
                    None => "0".to_string(),
                };
                let stop = self.emit_expression(stop)?.at(PREC_RELATIONAL + 1);
                let init = if *declare {
                    let ty = self.backend.render_type(Type::Int, &mut self.headers);
                    format!("{ty} {var} = {start}")
                } else {
                    format!("{var} = {start}")
                };
                let step = match step {
                    Some(step) => Some(self.emit_expression(step)?),
                    None => None,
                };
                let test = match (direction, &step) {
                    (LoopDirection::Up, _) => format!("{var} < {stop}"),
                    (LoopDirection::Down, _) => format!("{var} > {stop}"),
                    (LoopDirection::StepSign, Some(step)) => format!(
                        "{} > 0 ? {var} < {stop} : {var} > {stop}",
                        step.at(PREC_RELATIONAL + 1)
                    ),
                    (LoopDirection::StepSign, None) => {
                        return Err(CoreError::BackendEmission(
                            "loop tests a step it does not have".to_string(),
                        ));
                    }
                };
                let update = match step {
                    Some(step) => format!("{var} += {}", step.text),
                    None => format!("{var}++"),
                };
                self.line(&format!("for ({init}; {test}; {update}) {{"));
                self.emit_block(body)?;
                self.line("}");
            }
            HirStmtKind::Return(Some(value)) => {
                let value = self.emit_expression(value)?;
                self.line(&format!("return {};", value.text));
            }
            HirStmtKind::Return(None) => self.line("return;"),
            HirStmtKind::Expr(expr) => {
                let text = match &expr.kind {
                    HirExprKind::Call {
                        callee: Callee::Print(layout),
                        args,
                    } => {
                        let args = args
                            .iter()
                            .map(|arg| self.emit_expression(arg))
                            .collect::<Result<Vec<_>, _>>()?;
                        self.backend.render_print(&args, layout, &mut self.headers)?
                    }
                    _ => self.emit_expression(expr)?.text,
                };
                self.line(&format!("{text};"));
            }
            HirStmtKind::Break => self.line("break;"),
            HirStmtKind::Continue => self.line("continue;"),
            HirStmtKind::Pass => {}
            HirStmtKind::Unsupported(placeholder) => {
                self.line(&format!(
                    "// unsupported {}: {}",
                    placeholder.construct, placeholder.snippet
                ));
            }
        }
        Ok(())
    }

    /// Body and `else` part of an `if` whose header is already written.
    /// A lone nested `if` in the `else` part continues as `} else if`.
    fn emit_if_tail(
        &mut self,
        then_body: &[HirStmt],
        else_body: &[HirStmt],
    ) -> Result<(), CoreError> {
        self.emit_block(then_body)?;
        match else_body {
            [] => self.line("}"),
            [
                HirStmt {
                    kind:
                        HirStmtKind::If {
                            cond,
                            then_body,
                            else_body,
                        },
                    ..
                },
            ] => {
                let cond = self.emit_expression(cond)?;
                self.line(&format!("}} else if ({}) {{", cond.text));
                self.emit_if_tail(then_body, else_body)?;
            }
            _ => {
                self.line("} else {");
                self.emit_block(else_body)?;
                self.line("}");
            }
        }
        Ok(())
    }

    fn emit_block(&mut self, body: &[HirStmt]) -> Result<(), CoreError> {
        self.level += 1;
        for stmt in body {
            self.emit_statement(stmt)?;
        }
        self.level -= 1;
        Ok(())
    }

    pub fn emit_expression(&mut self, expr: &HirExpr) -> Result<Operand, CoreError> {
        ensure_sufficient_stack(|| self.emit_expression_kind(expr))
    }

    fn emit_expression_kind(&mut self, expr: &HirExpr) -> Result<Operand, CoreError> {
        match &expr.kind {
            HirExprKind::Literal(literal) => Ok(self.emit_literal(literal)),
            HirExprKind::Name(name) => Ok(Operand::new(name.as_str(), PREC_ATOM, expr.ty)),
            HirExprKind::Binary { op, left, right } => {
                let left = self.emit_expression(left)?;
                let right = self.emit_expression(right)?;
                self.emit_binary(*op, &left, &right, expr.ty)
            }
            HirExprKind::Unary { op, operand } => {
                let operand = self.emit_expression(operand)?;
                let text = match op {
                    UnaryOp::Not => format!("!{}", operand.at(PREC_UNARY)),
                    UnaryOp::Neg | UnaryOp::Pos => {
                        let sign = if *op == UnaryOp::Neg { "-" } else { "+" };
                        let inner = operand.at(PREC_UNARY);
                        if inner.starts_with(['-', '+']) {
                            format!("{sign}({inner})")
                        } else {
                            format!("{sign}{inner}")
                        }
                    }
                    UnaryOp::Invert => format!("~{}", operand.at(PREC_UNARY)),
                };
                Ok(Operand::new(text, PREC_UNARY, expr.ty))
            }
            HirExprKind::Call { callee, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.emit_expression(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                match callee {
                    Callee::Function(name) => {
                        let args: Vec<&str> = args.iter().map(|arg| arg.text.as_str()).collect();
                        Ok(Operand::new(
                            format!("{}({})", name.name, args.join(", ")),
                            PREC_ATOM,
                            expr.ty,
                        ))
                    }
                    Callee::Builtin(kind) => {
                        self.backend
                            .render_builtin(*kind, &args, expr.ty, &mut self.headers)
                    }
                    Callee::Print(_) => Err(CoreError::BackendEmission(
                        "print in expression position".to_string(),
                    )),
                }
            }
            HirExprKind::Unsupported(placeholder) => Err(CoreError::BackendEmission(format!(
                "placeholder for {} inside a statement",
                placeholder.construct
            ))),
        }
    }

    fn emit_literal(&mut self, literal: &Literal) -> Operand {
        match literal {
            Literal::Int(value) => Operand::new(value.to_string(), PREC_ATOM, Type::Int),
            Literal::Float(value) => {
                let text = match float_literal(*value) {
                    Some(text) => text,
                    None => {
                        self.headers.insert(self.backend.math_header());
                        "HUGE_VAL".to_string()
                    }
                };
                Operand::new(text, PREC_ATOM, Type::Float)
            }
            Literal::Bool(value) => Operand::new(
                self.backend.render_bool(*value, &mut self.headers),
                PREC_ATOM,
                Type::Bool,
            ),
            Literal::Str(text) => Operand {
                text: self.backend.render_str(text, &mut self.headers),
                prec: PREC_ATOM,
                ty: Type::Str,
                literal: Some(text.clone()),
            },
        }
    }

    fn emit_binary(
        &mut self,
        op: BinOp,
        left: &Operand,
        right: &Operand,
        ty: Type,
    ) -> Result<Operand, CoreError> {
        let strings = left.ty == Type::Str && right.ty == Type::Str;
        if strings && op == BinOp::Add {
            return self.backend.render_concat(left, right, &mut self.headers);
        }
        if strings && op.is_comparison() {
            return Ok(self
                .backend
                .render_string_compare(op, left, right, &mut self.headers));
        }
        match op {
            BinOp::Pow => {
                let args = [left.text.clone(), right.text.clone()];
                let text = self.backend.math_call("pow", &args, &mut self.headers);
                Ok(Operand::new(text, PREC_ATOM, ty))
            }
            BinOp::FloorDiv | BinOp::Mod if ty == Type::Int && !both_natural(left, right) => {
                let helper = if op == BinOp::FloorDiv {
                    Helper::FloorDiv
                } else {
                    Helper::FloorMod
                };
                Ok(self.call_helper(helper, left, right, ty))
            }
            BinOp::Mod if ty == Type::Float => Ok(self.call_helper(Helper::FloatMod, left, right, ty)),
            BinOp::FloorDiv if ty == Type::Float => {
                let quotient = format!(
                    "{} / {}",
                    left.at(PREC_MULTIPLICATIVE),
                    right.at(PREC_MULTIPLICATIVE + 1)
                );
                let text = self.backend.math_call("floor", &[quotient], &mut self.headers);
                Ok(Operand::new(text, PREC_ATOM, ty))
            }
            _ => {
                let (symbol, prec) = binary_operator(op).ok_or_else(|| {
                    CoreError::BackendEmission(format!("operator `{}`", op.symbol()))
                })?;
                let text = format!("{} {symbol} {}", left.at(prec), right.at(prec + 1));
                Ok(Operand::new(text, prec, ty))
            }
        }
    }

    fn call_helper(&mut self, helper: Helper, left: &Operand, right: &Operand, ty: Type) -> Operand {
        self.helpers.insert(helper);
        let text = format!("{}({}, {})", helper.name(), left.text, right.text);
        Operand::new(text, PREC_ATOM, ty)
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.level * self.indent_width {
            self.out.push(' ');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }
}

/// Truncating and flooring division agree when both operands are
/// non-negative literals.
fn both_natural(left: &Operand, right: &Operand) -> bool {
    let natural = |operand: &Operand| {
        !operand.text.is_empty() && operand.text.bytes().all(|byte| byte.is_ascii_digit())
    };
    natural(left) && natural(right)
}

/// C spelling and precedence of an operator shared by both targets.
fn binary_operator(op: BinOp) -> Option<(&'static str, u8)> {
    let entry = match op {
        BinOp::Or => ("||", PREC_OR),
        BinOp::And => ("&&", PREC_AND),
        BinOp::BitOr => ("|", PREC_BIT_OR),
        BinOp::BitXor => ("^", PREC_BIT_XOR),
        BinOp::BitAnd => ("&", PREC_BIT_AND),
        BinOp::Eq => ("==", PREC_EQUALITY),
        BinOp::NotEq => ("!=", PREC_EQUALITY),
        BinOp::Lt => ("<", PREC_RELATIONAL),
        BinOp::LtE => ("<=", PREC_RELATIONAL),
        BinOp::Gt => (">", PREC_RELATIONAL),
        BinOp::GtE => (">=", PREC_RELATIONAL),
        BinOp::LShift => ("<<", PREC_SHIFT),
        BinOp::RShift => (">>", PREC_SHIFT),
        BinOp::Add => ("+", PREC_ADDITIVE),
        BinOp::Sub => ("-", PREC_ADDITIVE),
        BinOp::Mul => ("*", PREC_MULTIPLICATIVE),
        BinOp::Div | BinOp::FloorDiv => ("/", PREC_MULTIPLICATIVE),
        BinOp::Mod => ("%", PREC_MULTIPLICATIVE),
        BinOp::Pow | BinOp::MatMul => return None,
    };
    Some(entry)
}

/// Shortest round-tripping spelling of a finite float, always with a
/// fractional part or exponent.
fn float_literal(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let text = format!("{value:?}");
    if text.contains(['.', 'e', 'E']) {
        Some(text)
    } else {
        Some(format!("{text}.0"))
    }
}

/// Double-quoted C string literal.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    quoted.push_str(&escape(text));
    quoted.push('"');
    quoted
}

/// Escapes `text` for use inside a C string literal.
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            '\r' => escaped.push_str("\\r"),
            // Octal escapes stop after three digits, unlike `\x`.
            ch if (ch as u32) < 0x20 || ch == '\u{7f}' => {
                escaped.push_str(&format!("\\{:03o}", ch as u32));
            }
            ch => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hir::HirIdent;
    use crate::parser::parse;
    use crate::span::{SourceMap, Span};
    use crate::typecheck::analyze;
    use pretty_assertions::assert_eq;

    fn render(source: &str, target: Target, options: &ConvertOptions) -> String {
        let module = parse(source, options).expect("parses");
        let map = SourceMap::new(source);
        let analysis = analyze(&module, &map, target, options).expect("analyzes");
        generate(&analysis.module, target, options).expect("generates")
    }

    fn render_c(source: &str) -> String {
        render(source, Target::C, &ConvertOptions::default())
    }

    #[test]
    fn lays_out_functions_then_generated_main() {
        let code = render_c("def twice(a):\n    return a * 2\ny = twice(4)\n");
        assert_eq!(
            code,
            "\
int twice(int a) {
    return a * 2;
}

int main() {
    int y = twice(4);
    return 0;
}
"
        );
    }

    #[test]
    fn parenthesises_by_precedence() {
        let code = render_c("a = 1\nb = 2\nc = (a + b) * 3\nd = a - (b - 1)\ne = a - b - 1\n");
        assert!(code.contains("int c = (a + b) * 3;"));
        assert!(code.contains("int d = a - (b - 1);"));
        assert!(code.contains("int e = a - b - 1;"));
    }

    #[test]
    fn nested_negation_keeps_tokens_apart() {
        let code = render_c("a = 1\nb = - -a\nc = not (a < 2)\n");
        assert!(code.contains("int b = -(-a);"));
        assert!(code.contains("bool c = !(a < 2);"));
    }

    #[test]
    fn elif_chains_render_as_else_if() {
        let source = "\
x = 3
if x < 1:
    x = 1
elif x < 2:
    x = 2
else:
    x = 0
";
        let code = render_c(source);
        assert!(code.contains(
            "    if (x < 1) {\n        x = 1;\n    } else if (x < 2) {\n        x = 2;\n    } else {\n        x = 0;\n    }\n"
        ));
    }

    #[test]
    fn counting_loops() {
        let code = render_c(
            "for i in range(3):\n    pass\nfor j in range(1, 10, 2):\n    pass\nfor k in range(5, 0, -1):\n    pass\n",
        );
        assert!(code.contains("for (int i = 0; i < 3; i++) {"));
        assert!(code.contains("for (int j = 1; j < 10; j += 2) {"));
        assert!(code.contains("for (int k = 5; k > 0; k += -1) {"));
    }

    #[test]
    fn variable_steps_test_their_sign() {
        let code = render_c("s = -1\nfor i in range(10, 0, s):\n    print(i)\n");
        assert!(code.contains("for (int i = 10; s > 0 ? i < 0 : i > 0; i += s) {"));
    }

    #[test]
    fn integer_floor_division_and_modulo_use_helpers() {
        let code = render_c("a = -7 // 2\nb = -7 % 3\nc = 7 // 2\nd = a % c\n");
        assert!(code.contains("int a = pyconv_floordiv(-7, 2);"));
        assert!(code.contains("int b = pyconv_mod(-7, 3);"));
        assert!(code.contains("int c = 7 / 2;"));
        assert!(code.contains("int d = pyconv_mod(a, c);"));
        assert!(code.starts_with("static int pyconv_floordiv(int a, int b) {\n"));
        assert!(code.contains("static int pyconv_mod(int a, int b) {\n    int r = a % b;\n"));
        assert!(!code.contains("pyconv_fmod"));
    }

    #[test]
    fn float_modulo_floors_too() {
        let code = render("x = 5.5\ny = x % -2.0\n", Target::Cpp, &ConvertOptions::default());
        assert!(code.contains("#include <cmath>"));
        assert!(code.contains("double r = std::fmod(a, b);"));
        assert!(code.contains("double y = pyconv_fmod(x, -2.0);"));
    }

    #[test]
    fn forward_references_get_prototypes() {
        let code = render_c("def f():\n    return g(1)\ndef g(a):\n    return a\n");
        assert!(code.starts_with("int g(int a);\n\nint f() {"));
    }

    #[test]
    fn placeholders_render_as_comments() {
        let code = render_c("class Foo:\n    pass\nx = [1, 2]\n");
        assert!(code.contains("    // unsupported class definition: class Foo:\n"));
        assert!(code.contains("    // unsupported list literal: x = [1, 2]\n"));
    }

    #[test]
    fn module_constants_are_declared_at_file_scope() {
        let code = render_c("LIMIT = 10\ndef f(n):\n    return n * LIMIT\nprint(f(2))\n");
        assert_eq!(
            code,
            "\
#include <stdio.h>

int LIMIT = 10;

int f(int n) {
    return n * LIMIT;
}

int main() {
    printf(\"%d\\n\", f(2));
    return 0;
}
"
        );
    }

    #[test]
    fn user_defined_main_replaces_generated_one() {
        let code = render_c("def main():\n    print(1)\nmain()\n");
        assert_eq!(
            code,
            "\
#include <stdio.h>

int main() {
    printf(\"%d\\n\", 1);
    return 0;
}
"
        );
    }

    #[test]
    fn honours_indent_width() {
        let options = ConvertOptions::default().with_indent_width(2);
        let code = render("if 1:\n    x = 1\n", Target::C, &options);
        assert!(code.contains("\n  if (1) {\n    int x = 1;\n  }\n"));
    }

    #[test]
    fn float_literals_keep_a_fraction() {
        assert_eq!(float_literal(2.5).as_deref(), Some("2.5"));
        assert_eq!(float_literal(3.0).as_deref(), Some("3.0"));
        assert_eq!(float_literal(f64::INFINITY), None);
        let code = render_c("x = 1e999\n");
        assert!(code.contains("#include <math.h>"));
        assert!(code.contains("double x = HUGE_VAL;"));
    }

    #[test]
    fn escapes_string_literals() {
        assert_eq!(quote("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
        assert_eq!(escape("\u{1}2"), "\\0012");
    }

    #[test]
    fn print_in_expression_position_is_an_emission_error() {
        let span = Span::default();
        let print = HirExpr {
            kind: HirExprKind::Call {
                callee: Callee::Print(PrintLayout::default()),
                args: Vec::new(),
            },
            ty: Type::Void,
            span,
        };
        let module = HirModule {
            globals: Vec::new(),
            functions: Vec::new(),
            body: vec![HirStmt {
                kind: HirStmtKind::VarDecl {
                    name: HirIdent {
                        name: "x".to_string(),
                        span,
                    },
                    value: Some(print),
                },
                ty: Type::Int,
                span,
            }],
            entry: Entry::Generated,
        };
        let err = generate(&module, Target::Cpp, &ConvertOptions::default()).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn stray_expression_placeholders_are_emission_errors() {
        let span = Span::default();
        let placeholder = crate::hir::Placeholder {
            construct: "subscript".to_string(),
            message: "subscript is not supported".to_string(),
            snippet: "a[0]".to_string(),
        };
        let module = HirModule {
            globals: Vec::new(),
            functions: Vec::new(),
            body: vec![HirStmt {
                kind: HirStmtKind::Return(Some(HirExpr {
                    kind: HirExprKind::Unsupported(placeholder),
                    ty: Type::Unknown,
                    span,
                })),
                ty: Type::Unknown,
                span,
            }],
            entry: Entry::Generated,
        };
        let err = generate(&module, Target::C, &ConvertOptions::default()).unwrap_err();
        assert!(err.is_internal());
    }

    #[test]
    fn output_is_deterministic() {
        let source = "def f(a, b=2):\n    return a ** b\nprint(f(3), len(\"abc\"), abs(-1.5))\n";
        for target in [Target::C, Target::Cpp] {
            let first = render(source, target, &ConvertOptions::default());
            let second = render(source, target, &ConvertOptions::default());
            assert_eq!(first, second);
        }
    }
}
