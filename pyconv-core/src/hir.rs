//! High-level intermediate representation (HIR).
//!
//! HIR is the typed form produced by the analyzer and consumed by the
//! emitter. The variant sets are closed: anything the analyzer could not
//! classify is an `Unsupported` node carrying a [`Placeholder`], so both
//! backends can match exhaustively.

use crate::ast::{BinOp, UnaryOp};
use crate::builtins::BuiltinKind;
use crate::span::Span;
use crate::stack::ensure_sufficient_stack;
use crate::types::Type;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HirIdent {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirParam {
    pub name: HirIdent,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirFunction {
    pub name: HirIdent,
    pub params: Vec<HirParam>,
    pub result: Type,
    pub body: Vec<HirStmt>,
    /// Called before its definition, so a prototype must precede it.
    pub needs_prototype: bool,
    pub span: Span,
}

/// How the program is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entry {
    /// Top-level statements become the body of a generated `int main()`.
    Generated,
    /// The program defines `main` itself; `HirModule::body` only holds
    /// placeholders for rejected top-level statements.
    UserDefined,
}

/// A converted compilation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct HirModule {
    /// Module constants read by functions, declared at file scope.
    pub globals: Vec<HirStmt>,
    pub functions: Vec<HirFunction>,
    pub body: Vec<HirStmt>,
    pub entry: Entry,
}

/// Opaque stand-in for a construct the converter cannot translate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholder {
    /// Short name of the construct, e.g. `class definition`.
    pub construct: String,
    pub message: String,
    /// First line of the original source text.
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirStmt {
    pub kind: HirStmtKind,
    /// Declared type for declarations and assignments, `Void` for pure
    /// control flow, `Unknown` for placeholders.
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirStmtKind {
    VarDecl {
        name: HirIdent,
        value: Option<HirExpr>,
    },
    Assign {
        name: HirIdent,
        value: HirExpr,
    },
    If {
        cond: HirExpr,
        then_body: Vec<HirStmt>,
        else_body: Vec<HirStmt>,
    },
    While {
        cond: HirExpr,
        body: Vec<HirStmt>,
    },
    /// Counting loop lowered from `for var in range(...)`.
    For {
        var: HirIdent,
        /// The loop variable is new and declared by the loop header.
        declare: bool,
        start: Option<HirExpr>,
        stop: HirExpr,
        step: Option<HirExpr>,
        direction: LoopDirection,
        body: Vec<HirStmt>,
    },
    Return(Option<HirExpr>),
    Expr(HirExpr),
    Break,
    Continue,
    Pass,
    Unsupported(Placeholder),
}

/// Which way a counting loop runs, decided from its step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopDirection {
    Up,
    Down,
    /// The step is a variable; its sign is tested on every iteration.
    StepSign,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HirExpr {
    pub kind: HirExprKind,
    pub ty: Type,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

/// Separator and terminator of a `print` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrintLayout {
    pub sep: String,
    pub end: String,
}

impl Default for PrintLayout {
    fn default() -> Self {
        PrintLayout {
            sep: " ".to_string(),
            end: "\n".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee {
    Function(HirIdent),
    Builtin(BuiltinKind),
    /// Only valid as a whole statement. When an argument was an f-string
    /// the arguments are its flattened pieces, separators included, and
    /// `sep` is empty.
    Print(PrintLayout),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HirExprKind {
    Literal(Literal),
    Name(String),
    /// Arithmetic, comparison and boolean operators alike.
    Binary {
        op: BinOp,
        left: Box<HirExpr>,
        right: Box<HirExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<HirExpr>,
    },
    Call {
        callee: Callee,
        args: Vec<HirExpr>,
    },
    /// Never reaches the emitter: the analyzer turns the enclosing
    /// statement into an `HirStmtKind::Unsupported`.
    Unsupported(Placeholder),
}

impl HirExpr {
    pub fn literal(literal: Literal, span: Span) -> Self {
        let ty = match &literal {
            Literal::Int(_) => Type::Int,
            Literal::Float(_) => Type::Float,
            Literal::Bool(_) => Type::Bool,
            Literal::Str(_) => Type::Str,
        };
        HirExpr {
            kind: HirExprKind::Literal(literal),
            ty,
            span,
        }
    }

    /// First placeholder anywhere inside this expression.
    pub fn placeholder(&self) -> Option<&Placeholder> {
        ensure_sufficient_stack(|| match &self.kind {
            HirExprKind::Unsupported(placeholder) => Some(placeholder),
            HirExprKind::Binary { left, right, .. } => {
                left.placeholder().or_else(|| right.placeholder())
            }
            HirExprKind::Unary { operand, .. } => operand.placeholder(),
            HirExprKind::Call { args, .. } => args.iter().find_map(HirExpr::placeholder),
            HirExprKind::Literal(_) | HirExprKind::Name(_) => None,
        })
    }
}

impl HirStmt {
    pub fn is_return(&self) -> bool {
        matches!(self.kind, HirStmtKind::Return(_))
    }

    /// First placeholder in the statement's own expressions. Nested bodies
    /// are not searched.
    pub fn expression_placeholder(&self) -> Option<&Placeholder> {
        match &self.kind {
            HirStmtKind::VarDecl { value, .. } => value.as_ref().and_then(HirExpr::placeholder),
            HirStmtKind::Assign { value, .. } | HirStmtKind::Expr(value) => value.placeholder(),
            HirStmtKind::If { cond, .. } | HirStmtKind::While { cond, .. } => cond.placeholder(),
            HirStmtKind::For {
                start, stop, step, ..
            } => start
                .iter()
                .chain(Some(stop))
                .chain(step.iter())
                .find_map(HirExpr::placeholder),
            HirStmtKind::Return(value) => value.as_ref().and_then(HirExpr::placeholder),
            HirStmtKind::Break
            | HirStmtKind::Continue
            | HirStmtKind::Pass
            | HirStmtKind::Unsupported(_) => None,
        }
    }
}
