//! Semantic analysis: scope and type resolution from [`ast::Module`] to
//! [`HirModule`].
//!
//! One recursive descent, one visit per syntax shape. Recoverable problems
//! become warnings and, for constructs without a translation, `Unsupported`
//! HIR nodes; fatal conditions are returned as [`CoreError`].

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::ast::{self, BinOp, CmpOp, Constant, ExprKind, FStringPart, StmtKind, UnaryOp};
use crate::builtins::{self, BuiltinDescriptor, BuiltinKind};
use crate::diagnostic::{Diagnostic, codes};
use crate::error::CoreError;
use crate::hir::{
    Callee, Entry, HirExpr, HirExprKind, HirFunction, HirIdent, HirModule, HirParam, HirStmt,
    HirStmtKind, Literal, LoopDirection, Placeholder, PrintLayout,
};
use crate::options::{ConvertOptions, Target};
use crate::scope::{FunctionSig, ParamOrigin, ParamSig, Scope, ScopeStack, Symbol};
use crate::span::{SourceMap, Span};
use crate::stack::ensure_sufficient_stack;
use crate::types::{self, Type};

type AResult<T> = Result<T, CoreError>;

/// Typed program plus the warnings recorded while building it, in
/// traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub module: HirModule,
    pub diagnostics: Vec<Diagnostic>,
}

#[tracing::instrument(level = "debug", skip_all, fields(output = %target))]
pub fn analyze(
    module: &ast::Module,
    source: &SourceMap<'_>,
    target: Target,
    options: &ConvertOptions,
) -> Result<Analysis, CoreError> {
    let mut analyzer = Analyzer::new(source, target, options);
    let module = analyzer.analyze_module(module)?;
    debug!(
        functions = module.functions.len(),
        diagnostics = analyzer.diagnostics.len(),
        "analysis finished"
    );
    Ok(Analysis {
        module,
        diagnostics: analyzer.diagnostics,
    })
}

/// Resolved meaning of a name at the current point of the traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Variable(Type),
    /// Hoisted module constant.
    Global(Type),
    Function,
    Unsupported,
    Free,
}

struct FunctionContext {
    name: String,
    is_main: bool,
    declared: Option<Type>,
    inferred: Option<Type>,
    saw_unknown: bool,
}

enum FunctionOutcome {
    Converted(HirFunction),
    Rejected(HirStmt),
}

struct Analyzer<'a, 'src> {
    source: &'a SourceMap<'src>,
    target: Target,
    scopes: ScopeStack,
    /// Locals of the generated `main`, parked here while a function body is
    /// analyzed so they stay invisible to it.
    main_scope: Scope,
    function: Option<FunctionContext>,
    /// Names declared in blocks that have already been left.
    retired: HashSet<String>,
    defined: HashSet<String>,
    forward_called: HashSet<String>,
    diagnostics: Vec<Diagnostic>,
    depth: usize,
    max_depth: usize,
}

impl<'a, 'src> Analyzer<'a, 'src> {
    fn new(source: &'a SourceMap<'src>, target: Target, options: &ConvertOptions) -> Self {
        Analyzer {
            source,
            target,
            scopes: ScopeStack::new(options.max_depth),
            main_scope: Scope::default(),
            function: None,
            retired: HashSet::new(),
            defined: HashSet::new(),
            forward_called: HashSet::new(),
            diagnostics: Vec::new(),
            depth: 0,
            max_depth: options.max_depth,
        }
    }

    // -----------------------------------------------------------------
    // Module level
    // -----------------------------------------------------------------

    fn analyze_module(&mut self, module: &ast::Module) -> AResult<HirModule> {
        let top_level = unwrap_main_guards(&module.body);
        let entry = if top_level.iter().any(|stmt| is_main_definition(stmt)) {
            Entry::UserDefined
        } else {
            Entry::Generated
        };
        self.declare_signatures(&top_level);
        let (globals, hoisted) = self.hoist_constants(&top_level);

        let mut functions = Vec::new();
        let mut body = Vec::new();
        for stmt in top_level {
            if hoisted.contains(&stmt.span) {
                continue;
            }
            match &stmt.kind {
                StmtKind::FunctionDef(def) => match self.analyze_function(def, stmt.span)? {
                    FunctionOutcome::Converted(function) => functions.push(function),
                    FunctionOutcome::Rejected(placeholder) => body.push(placeholder),
                },
                _ if entry == Entry::UserDefined => {
                    if let Some(stmt) = self.analyze_beside_main(stmt)? {
                        body.push(stmt);
                    }
                }
                _ => self.in_main_scope(stmt.span, |a| a.analyze_stmt(stmt, &mut body))?,
            }
        }

        for function in &mut functions {
            function.needs_prototype = self.forward_called.contains(&function.name.name);
        }
        Ok(HirModule {
            globals,
            functions,
            body,
            entry,
        })
    }

    /// Moves `NAME = literal` to file scope when NAME is assigned exactly
    /// once at module level and read inside some function. Returns the
    /// declarations and the spans of the statements they replace.
    fn hoist_constants(&mut self, top_level: &[&ast::Stmt]) -> (Vec<HirStmt>, HashSet<Span>) {
        let mut assignments: HashMap<String, usize> = HashMap::new();
        let mut read_in_functions = HashSet::new();
        for stmt in top_level {
            let mut names = Vec::new();
            collect_bound_names(std::slice::from_ref(*stmt), &mut names);
            for name in names {
                *assignments.entry(name).or_default() += 1;
            }
            if let StmtKind::FunctionDef(def) = &stmt.kind {
                collect_read_names(&def.body, &mut read_in_functions);
            }
        }

        let mut globals = Vec::new();
        let mut hoisted = HashSet::new();
        for stmt in top_level {
            let Some((target, value, ty)) = constant_definition(stmt) else {
                continue;
            };
            let ExprKind::Name(name) = &target.kind else {
                continue;
            };
            if assignments.get(name) != Some(&1) || !read_in_functions.contains(name) {
                continue;
            }
            self.scopes.declare_global(name, Symbol::Global(ty));
            hoisted.insert(stmt.span);
            globals.push(HirStmt {
                kind: HirStmtKind::VarDecl {
                    name: HirIdent {
                        name: name.clone(),
                        span: target.span,
                    },
                    value: Some(value),
                },
                ty,
                span: stmt.span,
            });
        }
        if !globals.is_empty() {
            debug!(count = globals.len(), "module constants hoisted");
        }
        (globals, hoisted)
    }

    /// Top-level statement of a program that defines its own `main`.
    fn analyze_beside_main(&mut self, stmt: &ast::Stmt) -> AResult<Option<HirStmt>> {
        match &stmt.kind {
            StmtKind::Expr(expr) if is_bare_call(expr, "main") || is_docstring(expr) => Ok(None),
            StmtKind::Expr(_)
            | StmtKind::Assign { .. }
            | StmtKind::AugAssign { .. }
            | StmtKind::AnnAssign { .. }
            | StmtKind::If { .. }
            | StmtKind::While { .. }
            | StmtKind::For { .. }
            | StmtKind::Return(_)
            | StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue => Ok(Some(
                self.unsupported_stmt("top-level statement alongside main()", stmt.span),
            )),
            _ => {
                let mut out = Vec::new();
                self.in_main_scope(stmt.span, |a| a.analyze_stmt(stmt, &mut out))?;
                Ok(out.into_iter().next())
            }
        }
    }

    /// Declares every module-level function up front so calls may precede
    /// definitions.
    fn declare_signatures(&mut self, top_level: &[&ast::Stmt]) {
        for stmt in top_level {
            let StmtKind::FunctionDef(def) = &stmt.kind else {
                continue;
            };
            if self.scopes.lookup(&def.name.name).is_some() {
                continue;
            }
            let sig = signature(def);
            self.scopes
                .declare_global(&def.name.name, Symbol::Function(sig));
        }
    }

    fn in_main_scope<T>(
        &mut self,
        span: Span,
        f: impl FnOnce(&mut Self) -> AResult<T>,
    ) -> AResult<T> {
        let scope = std::mem::take(&mut self.main_scope);
        self.scopes.enter(scope, span)?;
        let result = f(self);
        if let Some(scope) = self.scopes.pop() {
            self.main_scope = scope;
        }
        result
    }

    // -----------------------------------------------------------------
    // Functions
    // -----------------------------------------------------------------

    fn analyze_function(&mut self, def: &ast::FunctionDef, span: Span) -> AResult<FunctionOutcome> {
        let name = def.name.name.as_str();
        if let Some(construct) = rejected_definition(def) {
            return Ok(FunctionOutcome::Rejected(self.unsupported_stmt(construct, span)));
        }
        if self.defined.contains(name) {
            return Ok(FunctionOutcome::Rejected(
                self.unsupported_stmt("function redefinition", span),
            ));
        }
        let params = match self.scopes.lookup(name) {
            Some(Symbol::Function(sig)) => sig.params.clone(),
            _ => signature(def).params,
        };
        self.report_signature(def, &params);

        let is_main = name == "main";
        let declared = if is_main {
            Some(Type::Int)
        } else {
            def.returns.as_ref().and_then(annotation_type)
        };
        self.function = Some(FunctionContext {
            name: name.to_string(),
            is_main,
            declared,
            inferred: None,
            saw_unknown: false,
        });
        let outer_retired = std::mem::take(&mut self.retired);

        self.scopes.push(span)?;
        for param in &params {
            self.scopes.declare(&param.name, Symbol::Variable(param.ty));
        }
        let mut body = Vec::new();
        self.analyze_body(&def.body, span, &mut body)?;
        self.scopes.pop();
        self.retired = outer_retired;

        let context = self.function.take();
        let result = match context {
            Some(FunctionContext {
                declared: Some(ty), ..
            }) => ty,
            Some(FunctionContext {
                inferred: Some(ty), ..
            }) => ty,
            Some(FunctionContext {
                saw_unknown: true, ..
            }) => Type::Unknown,
            _ => Type::Void,
        };
        if is_main && !body.last().is_some_and(HirStmt::is_return) {
            body.push(HirStmt {
                kind: HirStmtKind::Return(Some(HirExpr::literal(Literal::Int(0), span))),
                ty: Type::Int,
                span,
            });
        }
        if let Some(sig) = self.scopes.function_mut(name) {
            sig.result = Some(result);
        }
        self.defined.insert(name.to_string());
        debug!(function = name, result = %result, "function analyzed");

        let params = def
            .params
            .args
            .iter()
            .zip(&params)
            .map(|(param, sig)| HirParam {
                name: HirIdent {
                    name: sig.name.clone(),
                    span: param.name.span,
                },
                ty: sig.ty,
            })
            .collect();
        Ok(FunctionOutcome::Converted(HirFunction {
            name: HirIdent {
                name: name.to_string(),
                span: def.name.span,
            },
            params,
            result,
            body,
            needs_prototype: false,
            span,
        }))
    }

    /// Warnings for the parts of a signature that were ignored.
    fn report_signature(&mut self, def: &ast::FunctionDef, params: &[ParamSig]) {
        for (param, sig) in def.params.args.iter().zip(params) {
            if let Some(annotation) = &param.annotation {
                if annotation_type(annotation).is_none() {
                    let message = format!(
                        "annotation `{}` of parameter `{}` is not supported, assuming `{}`",
                        self.source.snippet(annotation.span),
                        sig.name,
                        sig.ty
                    );
                    self.warn(codes::UNSUPPORTED_CONSTRUCT, message, annotation.span);
                }
            }
            if let Some(default) = &param.default {
                if sig.default.is_none() {
                    let message =
                        format!("non-literal default of parameter `{}` is not supported", sig.name);
                    self.warn(codes::UNSUPPORTED_CONSTRUCT, message, default.span);
                }
            }
        }
        if let Some(returns) = &def.returns {
            if annotation_type(returns).is_none() && def.name.name != "main" {
                let message = format!(
                    "return annotation `{}` is not supported",
                    self.source.snippet(returns.span)
                );
                self.warn(codes::UNSUPPORTED_CONSTRUCT, message, returns.span);
            }
        }
    }

    fn record_return(&mut self, ty: Type, span: Span) {
        let Some(context) = self.function.as_mut() else {
            return;
        };
        if context.is_main {
            return;
        }
        if ty == Type::Unknown {
            context.saw_unknown = true;
            return;
        }
        let name = context.name.clone();
        if let Some(declared) = context.declared {
            if !Type::accepts_argument(declared, ty) {
                let message =
                    format!("`{name}` returns `{ty}` but is declared to return `{declared}`");
                self.warn(codes::RETURN_TYPES, message, span);
            }
            return;
        }
        let previous = context.inferred;
        if previous == Some(Type::Unknown) {
            return;
        }
        let joined = match previous {
            None => Some(ty),
            Some(previous) => types::join(previous, ty),
        };
        let result = joined.unwrap_or(Type::Unknown);
        context.inferred = Some(result);
        if let Some(sig) = self.scopes.function_mut(&name) {
            sig.result = Some(result);
        }
        if let (None, Some(previous)) = (joined, previous) {
            let message =
                format!("inconsistent return types in `{name}`: `{previous}` and `{ty}`");
            self.warn(codes::RETURN_TYPES, message, span);
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn analyze_body(
        &mut self,
        stmts: &[ast::Stmt],
        span: Span,
        out: &mut Vec<HirStmt>,
    ) -> AResult<()> {
        self.nested(span, |a| {
            for stmt in stmts {
                a.analyze_stmt(stmt, out)?;
            }
            Ok(())
        })
    }

    /// Analyzes `stmts` in a fresh child scope.
    fn analyze_block(&mut self, stmts: &[ast::Stmt], span: Span) -> AResult<Vec<HirStmt>> {
        self.scopes.push(span)?;
        let mut out = Vec::new();
        self.analyze_body(stmts, span, &mut out)?;
        self.retire_scope();
        Ok(out)
    }

    fn retire_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            self.retired.extend(scope.names().map(str::to_string));
        }
    }

    fn analyze_stmt(&mut self, stmt: &ast::Stmt, out: &mut Vec<HirStmt>) -> AResult<()> {
        let span = stmt.span;
        let hir = match &stmt.kind {
            StmtKind::Expr(expr) => {
                if is_docstring(expr) {
                    return Ok(());
                }
                self.analyze_expr_stmt(expr, span)?
            }
            StmtKind::Assign { targets, value } => self.analyze_assign(targets, value, span)?,
            StmtKind::AugAssign { target, op, value } => {
                self.analyze_aug_assign(target, *op, value, span)?
            }
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => self.analyze_ann_assign(target, annotation, value.as_ref(), span)?,
            StmtKind::If { test, body, orelse } => {
                let cond = self.analyze_condition(test)?;
                let then_body = self.analyze_block(body, span)?;
                let else_body = self.analyze_block(orelse, span)?;
                control(
                    HirStmtKind::If {
                        cond,
                        then_body,
                        else_body,
                    },
                    span,
                )
            }
            StmtKind::While { test, body, orelse } => {
                if orelse.is_empty() {
                    let cond = self.analyze_condition(test)?;
                    let body = self.analyze_block(body, span)?;
                    control(HirStmtKind::While { cond, body }, span)
                } else {
                    self.bind_names_in(body);
                    self.bind_names_in(orelse);
                    self.unsupported_stmt("while-else loop", span)
                }
            }
            StmtKind::For {
                target,
                iter,
                body,
                orelse,
                is_async,
            } => self.analyze_for(target, iter, body, orelse, *is_async, span)?,
            StmtKind::FunctionDef(def) => {
                self.bind_unsupported(&def.name.name);
                self.unsupported_stmt("nested function definition", span)
            }
            StmtKind::ClassDef { name, .. } => {
                self.bind_unsupported(&name.name);
                self.unsupported_stmt("class definition", span)
            }
            StmtKind::Return(value) => self.analyze_return(value.as_ref(), span)?,
            StmtKind::Pass => control(HirStmtKind::Pass, span),
            StmtKind::Break => control(HirStmtKind::Break, span),
            StmtKind::Continue => control(HirStmtKind::Continue, span),
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                self.bind_names_in(body);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        self.bind_unsupported(&name.name);
                    }
                    self.bind_names_in(&handler.body);
                }
                self.bind_names_in(orelse);
                self.bind_names_in(finalbody);
                self.unsupported_stmt("try statement", span)
            }
            StmtKind::With { items, body, .. } => {
                let mut names = Vec::new();
                for item in items {
                    if let Some(target) = &item.target {
                        collect_target_names(target, &mut names);
                    }
                }
                for name in names {
                    self.bind_unsupported(&name);
                }
                self.bind_names_in(body);
                self.unsupported_stmt("with statement", span)
            }
            StmtKind::Import(aliases) => {
                for alias in aliases {
                    self.bind_unsupported(alias_binding(alias));
                }
                self.unsupported_stmt("import statement", span)
            }
            StmtKind::ImportFrom { names, .. } => {
                for alias in names.iter().filter(|alias| alias.name != "*") {
                    self.bind_unsupported(alias_binding(alias));
                }
                self.unsupported_stmt("import statement", span)
            }
            StmtKind::Raise { .. } => self.unsupported_stmt("raise statement", span),
            StmtKind::Global(_) => self.unsupported_stmt("global declaration", span),
            StmtKind::Nonlocal(_) => self.unsupported_stmt("nonlocal declaration", span),
            StmtKind::Delete(_) => self.unsupported_stmt("del statement", span),
            StmtKind::Assert { .. } => self.unsupported_stmt("assert statement", span),
        };
        let hir = self.lift_placeholder(hir);
        out.push(hir);
        Ok(())
    }

    /// A statement whose own expressions hold a placeholder has no valid
    /// rendering, so the whole statement becomes one. The inner construct
    /// has already been reported.
    fn lift_placeholder(&mut self, stmt: HirStmt) -> HirStmt {
        let Some(inner) = stmt.expression_placeholder() else {
            return stmt;
        };
        let placeholder = Placeholder {
            construct: inner.construct.clone(),
            message: inner.message.clone(),
            snippet: self.source.snippet(stmt.span).to_string(),
        };
        if let HirStmtKind::VarDecl { name, .. } = &stmt.kind {
            self.scopes.declare(&name.name, Symbol::Unsupported);
        }
        HirStmt {
            kind: HirStmtKind::Unsupported(placeholder),
            ty: Type::Unknown,
            span: stmt.span,
        }
    }

    fn analyze_expr_stmt(&mut self, expr: &ast::Expr, span: Span) -> AResult<HirStmt> {
        if let ExprKind::Call {
            func,
            args,
            keywords,
        } = &expr.kind
        {
            if func.name() == Some("print") && self.binding("print") == Binding::Free {
                return self.analyze_print(args, keywords, expr.span, span);
            }
        }
        let value = self.analyze_expr(expr)?;
        Ok(control(HirStmtKind::Expr(value), span))
    }

    fn analyze_print(
        &mut self,
        args: &[ast::Expr],
        keywords: &[ast::Keyword],
        call_span: Span,
        span: Span,
    ) -> AResult<HirStmt> {
        let mut layout = PrintLayout::default();
        for keyword in keywords {
            let Some(arg) = &keyword.arg else {
                return Ok(self.unsupported_stmt("print with keyword unpacking", span));
            };
            let ExprKind::Constant(Constant::Str(text)) = &keyword.value.kind else {
                return Ok(self.unsupported_stmt("print with a non-literal separator", span));
            };
            match arg.name.as_str() {
                "sep" => layout.sep = text.clone(),
                "end" => layout.end = text.clone(),
                other => {
                    return Ok(self.unsupported_stmt(&format!("print keyword `{other}`"), span));
                }
            }
        }
        if args
            .iter()
            .any(|arg| matches!(arg.kind, ExprKind::Starred(_)))
        {
            return Ok(self.unsupported_stmt("print with argument unpacking", span));
        }

        let interpolated = args
            .iter()
            .any(|arg| matches!(arg.kind, ExprKind::FString(_)));
        let mut values = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            if interpolated && index > 0 && !layout.sep.is_empty() {
                values.push(HirExpr::literal(Literal::Str(layout.sep.clone()), arg.span));
            }
            let ExprKind::FString(parts) = &arg.kind else {
                values.push(self.print_value(arg)?);
                continue;
            };
            for part in parts {
                match part {
                    FStringPart::Literal(text) => {
                        values.push(HirExpr::literal(Literal::Str(text.clone()), arg.span));
                    }
                    FStringPart::Field {
                        value,
                        modifier: None,
                    } => values.push(self.print_value(value)?),
                    FStringPart::Field { value, .. } => values.push(
                        self.unsupported_expr("f-string conversion or format spec", value.span),
                    ),
                }
            }
        }
        if interpolated {
            layout.sep.clear();
        }
        let call = HirExpr {
            kind: HirExprKind::Call {
                callee: Callee::Print(layout),
                args: values,
            },
            ty: Type::Void,
            span: call_span,
        };
        Ok(control(HirStmtKind::Expr(call), span))
    }

    fn print_value(&mut self, arg: &ast::Expr) -> AResult<HirExpr> {
        let value = self.analyze_expr(arg)?;
        if value.ty == Type::Void {
            return Ok(self.unsupported_expr("printing a call without a value", arg.span));
        }
        Ok(value)
    }

    fn analyze_assign(
        &mut self,
        targets: &[ast::Expr],
        value: &ast::Expr,
        span: Span,
    ) -> AResult<HirStmt> {
        let [target] = targets else {
            let mut names = Vec::new();
            for target in targets {
                collect_target_names(target, &mut names);
            }
            for name in names {
                self.bind_unsupported(&name);
            }
            return Ok(self.unsupported_stmt("chained assignment", span));
        };
        match &target.kind {
            ExprKind::Name(name) => {
                let value = self.analyze_expr(value)?;
                Ok(self.assign_name(name, target.span, value, None, span))
            }
            ExprKind::Tuple(_) | ExprKind::List(_) | ExprKind::Starred(_) => {
                let mut names = Vec::new();
                collect_target_names(target, &mut names);
                for name in names {
                    self.bind_unsupported(&name);
                }
                Ok(self.unsupported_stmt("tuple assignment", span))
            }
            ExprKind::Subscript { .. } => Ok(self.unsupported_stmt("subscript assignment", span)),
            ExprKind::Attribute { .. } => Ok(self.unsupported_stmt("attribute assignment", span)),
            _ => Ok(self.unsupported_stmt("assignment target", span)),
        }
    }

    fn analyze_aug_assign(
        &mut self,
        target: &ast::Expr,
        op: BinOp,
        value: &ast::Expr,
        span: Span,
    ) -> AResult<HirStmt> {
        let ExprKind::Name(name) = &target.kind else {
            return Ok(self.unsupported_stmt("augmented assignment to a non-name target", span));
        };
        if op == BinOp::MatMul {
            return Ok(self.unsupported_stmt("matrix multiplication", span));
        }
        if matches!(self.binding(name), Binding::Global(_)) {
            return Ok(self.unsupported_stmt("augmented assignment to a module constant", span));
        }
        let current = self.analyze_name(name, target.span)?;
        let rhs = self.analyze_expr(value)?;
        let combined = self.binary(op, current, rhs, span);
        Ok(self.assign_name(name, target.span, combined, None, span))
    }

    fn analyze_ann_assign(
        &mut self,
        target: &ast::Expr,
        annotation: &ast::Expr,
        value: Option<&ast::Expr>,
        span: Span,
    ) -> AResult<HirStmt> {
        let ExprKind::Name(name) = &target.kind else {
            return Ok(self.unsupported_stmt("annotated assignment to a non-name target", span));
        };
        let Some(annotated) = annotation_type(annotation).filter(|ty| *ty != Type::Void) else {
            self.bind_unsupported(name);
            return Ok(self.unsupported_stmt("annotated assignment with an unsupported type", span));
        };
        let ident = HirIdent {
            name: name.clone(),
            span: target.span,
        };
        match value {
            Some(value) => {
                let value = self.analyze_expr(value)?;
                Ok(self.assign_name(name, target.span, value, Some(annotated), span))
            }
            None => match self.binding(name) {
                Binding::Free | Binding::Unsupported | Binding::Global(_) => {
                    self.scopes.declare(name, Symbol::Variable(annotated));
                    Ok(HirStmt {
                        kind: HirStmtKind::VarDecl {
                            name: ident,
                            value: None,
                        },
                        ty: annotated,
                        span,
                    })
                }
                Binding::Variable(_) | Binding::Function => Ok(control(HirStmtKind::Pass, span)),
            },
        }
    }

    /// Declares or reassigns `name`. The declared type of an existing
    /// variable never changes.
    fn assign_name(
        &mut self,
        name: &str,
        name_span: Span,
        value: HirExpr,
        annotation: Option<Type>,
        span: Span,
    ) -> HirStmt {
        if value.ty == Type::Void {
            return self.unsupported_stmt("assignment of a call without a value", span);
        }
        let ident = HirIdent {
            name: name.to_string(),
            span: name_span,
        };
        match self.binding(name) {
            Binding::Variable(declared) => match type_conflict(name, declared, value.ty) {
                Some(message) => self.type_changed("type-changing assignment", message, span),
                None => HirStmt {
                    kind: HirStmtKind::Assign { name: ident, value },
                    ty: declared,
                    span,
                },
            },
            Binding::Function => self.unsupported_stmt("function rebinding", span),
            Binding::Unsupported | Binding::Free | Binding::Global(_) => {
                let (ty, value) = match annotation {
                    Some(annotated) => match type_conflict(name, annotated, value.ty) {
                        Some(message) => {
                            self.warn(codes::TYPE_CHANGED, message, span);
                            (annotated, None)
                        }
                        None => (annotated, Some(value)),
                    },
                    None => (value.ty, Some(value)),
                };
                self.scopes.declare(name, Symbol::Variable(ty));
                HirStmt {
                    kind: HirStmtKind::VarDecl { name: ident, value },
                    ty,
                    span,
                }
            }
        }
    }

    /// A statement dropped because it would change a declared type. The
    /// type-change warning is its only diagnostic.
    fn type_changed(&mut self, construct: &str, message: String, span: Span) -> HirStmt {
        let placeholder = self.placeholder(codes::TYPE_CHANGED, construct, message, span);
        HirStmt {
            kind: HirStmtKind::Unsupported(placeholder),
            ty: Type::Unknown,
            span,
        }
    }

    fn analyze_for(
        &mut self,
        target: &ast::Expr,
        iter: &ast::Expr,
        body: &[ast::Stmt],
        orelse: &[ast::Stmt],
        is_async: bool,
        span: Span,
    ) -> AResult<HirStmt> {
        let rejected = if is_async {
            Some("async for loop")
        } else if !orelse.is_empty() {
            Some("for-else loop")
        } else {
            None
        };
        let range = match (&target.kind, &iter.kind) {
            (
                ExprKind::Name(var),
                ExprKind::Call {
                    func,
                    args,
                    keywords,
                },
            ) if func.name() == Some("range")
                && self.binding("range") == Binding::Free
                && keywords.is_empty()
                && !args.iter().any(|arg| matches!(arg.kind, ExprKind::Starred(_))) =>
            {
                Some((var, args))
            }
            _ => None,
        };
        let (Some((var, args)), None) = (range, rejected) else {
            let mut names = Vec::new();
            collect_target_names(target, &mut names);
            for name in names {
                self.bind_unsupported(&name);
            }
            self.bind_names_in(body);
            self.bind_names_in(orelse);
            let construct = rejected.unwrap_or("for loop over a non-range iterable");
            return Ok(self.unsupported_stmt(construct, span));
        };

        if args.is_empty() || args.len() > 3 {
            return Err(CoreError::ArityMismatch {
                name: "range".to_string(),
                expected: "1 to 3".to_string(),
                given: args.len(),
                span: iter.span,
            });
        }
        let mut bounds = Vec::with_capacity(args.len());
        for arg in args {
            let value = self.analyze_expr(arg)?;
            if !matches!(value.ty, Type::Int | Type::Bool | Type::Unknown) {
                let message = format!("`range` expects `int` arguments, got `{}`", value.ty);
                self.warn(codes::ARGUMENT_TYPE, message, arg.span);
            }
            bounds.push(value);
        }
        let mut bounds = bounds.into_iter();
        let (start, stop, step) = match (bounds.next(), bounds.next(), bounds.next()) {
            (Some(stop), None, _) => (None, stop, None),
            (Some(start), Some(stop), step) => (Some(start), stop, step),
            (None, _, _) => {
                return Err(CoreError::ArityMismatch {
                    name: "range".to_string(),
                    expected: "1 to 3".to_string(),
                    given: 0,
                    span: iter.span,
                });
            }
        };

        let direction = match step.as_ref().map(loop_direction) {
            None => Ok(LoopDirection::Up),
            Some(direction) => direction,
        };
        let direction = match direction {
            Ok(direction) => direction,
            Err(construct) => {
                self.bind_unsupported(var);
                self.bind_names_in(body);
                return Ok(self.unsupported_stmt(construct, span));
            }
        };

        let declare = match self.binding(var) {
            Binding::Variable(ty) if matches!(ty, Type::Int | Type::Unknown) => false,
            Binding::Variable(ty) => {
                self.bind_names_in(body);
                let message =
                    format!("type changed, coercion ignored: loop variable `{var}` is `{ty}`");
                return Ok(self.type_changed("loop over a variable of another type", message, span));
            }
            Binding::Function => return Ok(self.unsupported_stmt("function rebinding", span)),
            Binding::Unsupported | Binding::Free | Binding::Global(_) => true,
        };

        self.scopes.push(span)?;
        if declare {
            self.scopes.declare(var, Symbol::Variable(Type::Int));
        }
        let mut hir_body = Vec::new();
        self.analyze_body(body, span, &mut hir_body)?;
        self.retire_scope();

        Ok(control(
            HirStmtKind::For {
                var: HirIdent {
                    name: var.clone(),
                    span: target.span,
                },
                declare,
                start,
                stop,
                step,
                direction,
                body: hir_body,
            },
            span,
        ))
    }

    fn analyze_return(&mut self, value: Option<&ast::Expr>, span: Span) -> AResult<HirStmt> {
        let Some(is_main) = self.function.as_ref().map(|context| context.is_main) else {
            return Ok(self.unsupported_stmt("return outside a function", span));
        };
        match value {
            None if is_main => Ok(HirStmt {
                kind: HirStmtKind::Return(Some(HirExpr::literal(Literal::Int(0), span))),
                ty: Type::Int,
                span,
            }),
            None => Ok(control(HirStmtKind::Return(None), span)),
            Some(expr) => {
                let value = self.analyze_expr(expr)?;
                self.record_return(value.ty, expr.span);
                let ty = value.ty;
                Ok(HirStmt {
                    kind: HirStmtKind::Return(Some(value)),
                    ty,
                    span,
                })
            }
        }
    }

    fn analyze_condition(&mut self, test: &ast::Expr) -> AResult<HirExpr> {
        let cond = self.analyze_expr(test)?;
        if cond.ty != Type::Unknown && !cond.ty.is_truthy_compatible() {
            let message = format!(
                "non-boolean condition, implicit truthiness assumed for `{}`",
                cond.ty
            );
            self.warn(codes::NON_BOOLEAN_CONDITION, message, test.span);
        }
        Ok(cond)
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn analyze_expr(&mut self, expr: &ast::Expr) -> AResult<HirExpr> {
        self.nested(expr.span, |a| a.analyze_expr_kind(expr))
    }

    fn analyze_expr_kind(&mut self, expr: &ast::Expr) -> AResult<HirExpr> {
        let span = expr.span;
        let construct = match &expr.kind {
            ExprKind::Name(name) => return self.analyze_name(name, span),
            ExprKind::Constant(constant) => return Ok(self.analyze_constant(constant, span)),
            ExprKind::BinOp { left, op, right } => {
                if *op == BinOp::MatMul {
                    return Ok(self.unsupported_expr("matrix multiplication", span));
                }
                let left = self.analyze_expr(left)?;
                let right = self.analyze_expr(right)?;
                return Ok(self.binary(*op, left, right, span));
            }
            ExprKind::UnaryOp { op, operand } => {
                let operand = match (op, &operand.kind) {
                    // `-2147483648` fits even though its magnitude does not.
                    (UnaryOp::Neg, ExprKind::Constant(Constant::Int(value))) => {
                        self.check_int_range(value.checked_neg(), span);
                        HirExpr::literal(Literal::Int(*value), operand.span)
                    }
                    _ => self.analyze_expr(operand)?,
                };
                return Ok(self.unary(*op, operand, span));
            }
            ExprKind::Compare {
                left,
                ops,
                comparators,
            } => return self.analyze_compare(left, ops, comparators, span),
            ExprKind::Call {
                func,
                args,
                keywords,
            } => return self.analyze_call(func, args, keywords, span),
            ExprKind::FString(_) => "f-string outside print",
            ExprKind::Attribute { .. } => "attribute access",
            ExprKind::Subscript { .. } => "subscript",
            ExprKind::Slice { .. } => "slice",
            ExprKind::List(_) => "list literal",
            ExprKind::Tuple(_) => "tuple",
            ExprKind::Set(_) => "set literal",
            ExprKind::Dict { .. } => "dict literal",
            ExprKind::ListComp { .. } => "list comprehension",
            ExprKind::SetComp { .. } => "set comprehension",
            ExprKind::DictComp { .. } => "dict comprehension",
            ExprKind::GeneratorExp { .. } => "generator expression",
            ExprKind::Lambda { .. } => "lambda",
            ExprKind::IfExp { .. } => "conditional expression",
            ExprKind::NamedExpr { .. } => "assignment expression",
            ExprKind::Starred(_) => "starred expression",
            ExprKind::Yield(_) | ExprKind::YieldFrom(_) => "yield expression",
            ExprKind::Await(_) => "await expression",
        };
        Ok(self.unsupported_expr(construct, span))
    }

    fn analyze_name(&mut self, name: &str, span: Span) -> AResult<HirExpr> {
        match self.binding(name) {
            Binding::Variable(ty) | Binding::Global(ty) => Ok(HirExpr {
                kind: HirExprKind::Name(name.to_string()),
                ty,
                span,
            }),
            Binding::Function => Ok(self.unsupported_expr("function used as a value", span)),
            Binding::Unsupported => {
                Ok(self.unsupported_expr("name bound by an unsupported construct", span))
            }
            Binding::Free => {
                if self.function.is_some() && self.main_scope.get(name).is_some() {
                    return Ok(
                        self.unsupported_expr("module-level variable used inside a function", span)
                    );
                }
                if self.retired.contains(name) {
                    return Ok(self.unsupported_expr("variable declared in an inner block", span));
                }
                if name == "print" {
                    return Ok(self.unsupported_expr("print used as a value", span));
                }
                if builtins::find_builtin(name).is_some() || builtins::is_unsupported_builtin(name)
                {
                    return Ok(self.unsupported_expr(&format!("builtin `{name}` used as a value"), span));
                }
                Err(CoreError::UndeclaredName {
                    name: name.to_string(),
                    span,
                })
            }
        }
    }

    fn analyze_constant(&mut self, constant: &Constant, span: Span) -> HirExpr {
        let literal = match constant {
            Constant::Int(value) => {
                self.check_int_range(Some(*value), span);
                Literal::Int(*value)
            }
            Constant::BigInt(_) => {
                return self.unsupported_expr("integer literal wider than 64 bits", span);
            }
            Constant::Float(value) => Literal::Float(*value),
            Constant::Str(text) => Literal::Str(text.clone()),
            Constant::Bool(value) => Literal::Bool(*value),
            Constant::None => return self.unsupported_expr("None", span),
            Constant::Bytes(_) => return self.unsupported_expr("bytes literal", span),
            Constant::Complex(_) => return self.unsupported_expr("complex literal", span),
            Constant::Ellipsis => return self.unsupported_expr("ellipsis", span),
        };
        HirExpr::literal(literal, span)
    }

    /// Both targets declare `int` variables, which are 32 bits wide on
    /// every platform the output is meant for.
    fn check_int_range(&mut self, value: Option<i64>, span: Span) {
        if value.is_some_and(|value| i32::try_from(value).is_ok()) {
            return;
        }
        let message = format!(
            "integer literal `{}` does not fit a 32-bit `int`",
            self.source.snippet(span)
        );
        self.warn(codes::INTEGER_RANGE, message, span);
    }

    /// Types `left op right` with the promotion table.
    fn binary(&mut self, op: BinOp, left: HirExpr, right: HirExpr, span: Span) -> HirExpr {
        if op == BinOp::Add
            && left.ty == Type::Str
            && right.ty == Type::Str
            && !self.target.string_concat_supported()
        {
            let placeholder = self.placeholder(
                codes::STRING_CONCAT,
                "string concatenation",
                "string concatenation unsupported for this target".to_string(),
                span,
            );
            return HirExpr {
                kind: HirExprKind::Unsupported(placeholder),
                ty: Type::Unknown,
                span,
            };
        }

        let ty = if left.ty == Type::Unknown || right.ty == Type::Unknown {
            Type::Unknown
        } else if let Some(ty) = types::binary_result(op, left.ty, right.ty) {
            ty
        } else {
            let message = format!(
                "unsupported operand types for `{}`: `{}` and `{}`",
                op.symbol(),
                left.ty,
                right.ty
            );
            self.warn(codes::UNSUPPORTED_OPERANDS, message, span);
            Type::Unknown
        };
        HirExpr {
            kind: HirExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: HirExpr, span: Span) -> HirExpr {
        let ty = match (op, operand.ty) {
            (_, Type::Unknown) => Type::Unknown,
            (UnaryOp::Not, ty) => {
                if !ty.is_truthy_compatible() {
                    let message =
                        format!("non-boolean condition, implicit truthiness assumed for `{ty}`");
                    self.warn(codes::NON_BOOLEAN_CONDITION, message, span);
                }
                Type::Bool
            }
            (UnaryOp::Neg | UnaryOp::Pos, ty) if ty.is_numeric() => ty,
            (UnaryOp::Neg | UnaryOp::Pos | UnaryOp::Invert, Type::Bool) => Type::Int,
            (UnaryOp::Invert, Type::Int) => Type::Int,
            (op, ty) => {
                let message = format!("unsupported operand type for `{}`: `{ty}`", op.symbol());
                self.warn(codes::UNSUPPORTED_OPERANDS, message, span);
                Type::Unknown
            }
        };
        HirExpr {
            kind: HirExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
            span,
        }
    }

    fn analyze_compare(
        &mut self,
        left: &ast::Expr,
        ops: &[CmpOp],
        comparators: &[ast::Expr],
        span: Span,
    ) -> AResult<HirExpr> {
        let binop = match (ops, comparators) {
            ([CmpOp::In | CmpOp::NotIn], _) => {
                return Ok(self.unsupported_expr("membership test", span));
            }
            ([CmpOp::Is | CmpOp::IsNot], _) => {
                return Ok(self.unsupported_expr("identity test", span));
            }
            ([op], [comparator]) => op.as_binop().map(|binop| (binop, comparator)),
            _ => None,
        };
        let Some((op, comparator)) = binop else {
            return Ok(self.unsupported_expr("chained comparison", span));
        };
        let left = self.analyze_expr(left)?;
        let right = self.analyze_expr(comparator)?;
        Ok(self.binary(op, left, right, span))
    }

    fn analyze_call(
        &mut self,
        func: &ast::Expr,
        args: &[ast::Expr],
        keywords: &[ast::Keyword],
        span: Span,
    ) -> AResult<HirExpr> {
        let Some(name) = func.name() else {
            let construct = match func.kind {
                ExprKind::Attribute { .. } => "method call",
                _ => "call of a computed callee",
            };
            return Ok(self.unsupported_expr(construct, span));
        };
        if args
            .iter()
            .any(|arg| matches!(arg.kind, ExprKind::Starred(_)))
        {
            return Ok(self.unsupported_expr("argument unpacking", span));
        }
        match self.binding(name) {
            Binding::Function => self.call_function(name, func.span, args, keywords, span),
            Binding::Variable(_) | Binding::Global(_) | Binding::Unsupported => {
                Ok(self.unsupported_expr("call of a non-function value", span))
            }
            Binding::Free => match builtins::find_builtin(name) {
                Some(builtin) => self.call_builtin(builtin, args, keywords, span),
                None if builtins::is_unsupported_builtin(name) => {
                    Ok(self.unsupported_expr(&format!("builtin `{name}`"), span))
                }
                None => Err(CoreError::UndeclaredName {
                    name: name.to_string(),
                    span: func.span,
                }),
            },
        }
    }

    fn call_function(
        &mut self,
        name: &str,
        name_span: Span,
        args: &[ast::Expr],
        keywords: &[ast::Keyword],
        span: Span,
    ) -> AResult<HirExpr> {
        let sig = match self.scopes.lookup(name) {
            Some(Symbol::Function(sig)) => sig.clone(),
            _ => {
                return Err(CoreError::UndeclaredName {
                    name: name.to_string(),
                    span: name_span,
                });
            }
        };
        if sig.opaque {
            return Ok(self.unsupported_expr("call to an unsupported function", span));
        }
        if !keywords.is_empty() {
            return Ok(self.unsupported_expr("keyword argument", span));
        }
        let given = args.len();
        if given < sig.required_params() || given > sig.params.len() {
            return Err(CoreError::ArityMismatch {
                name: name.to_string(),
                expected: sig.arity_text(),
                given,
                span,
            });
        }

        let mut values = Vec::with_capacity(sig.params.len());
        for (index, (arg, param)) in args.iter().zip(&sig.params).enumerate() {
            let value = self.analyze_expr(arg)?;
            self.check_argument(&sig, param, index, &value);
            values.push(value);
        }
        values.extend(
            sig.params
                .iter()
                .skip(given)
                .filter_map(|param| param.default.clone()),
        );

        let forward = !self.defined.contains(name)
            && self
                .function
                .as_ref()
                .is_some_and(|context| context.name != name);
        if forward {
            self.forward_called.insert(name.to_string());
        }
        let ty = match sig.result {
            Some(ty) => ty,
            None => {
                let message = format!("return type of `{name}` is not known yet, assuming `int`");
                self.warn(codes::PENDING_RETURN, message, span);
                Type::Int
            }
        };
        Ok(HirExpr {
            kind: HirExprKind::Call {
                callee: Callee::Function(HirIdent {
                    name: name.to_string(),
                    span: name_span,
                }),
                args: values,
            },
            ty,
            span,
        })
    }

    fn check_argument(&mut self, sig: &FunctionSig, param: &ParamSig, index: usize, value: &HirExpr) {
        if value.ty == Type::Unknown || Type::accepts_argument(param.ty, value.ty) {
            return;
        }
        let message = match param.origin {
            ParamOrigin::AssumedInt => format!(
                "parameter type inferred as int by default: `{}` of `{}` receives `{}`",
                param.name, sig.name, value.ty
            ),
            ParamOrigin::Annotation | ParamOrigin::Default => format!(
                "argument {} of `{}` expects `{}`, got `{}`",
                index + 1,
                sig.name,
                param.ty,
                value.ty
            ),
        };
        self.warn(codes::ARGUMENT_TYPE, message, value.span);
    }

    fn call_builtin(
        &mut self,
        builtin: &'static BuiltinDescriptor,
        args: &[ast::Expr],
        keywords: &[ast::Keyword],
        span: Span,
    ) -> AResult<HirExpr> {
        match builtin.kind {
            BuiltinKind::Print => return Ok(self.unsupported_expr("print used as a value", span)),
            BuiltinKind::Range => {
                return Ok(self.unsupported_expr("range outside a for loop", span));
            }
            BuiltinKind::Len | BuiltinKind::IntCast | BuiltinKind::FloatCast | BuiltinKind::Abs => {}
        }
        if !keywords.is_empty() {
            return Ok(self.unsupported_expr("keyword argument", span));
        }
        if !builtin.accepts_arity(args.len()) {
            return Err(CoreError::ArityMismatch {
                name: builtin.name.to_string(),
                expected: builtin.arity_text(),
                given: args.len(),
                span,
            });
        }

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.analyze_expr(arg)?);
        }
        let arg_ty = values.first().map_or(Type::Unknown, |value| value.ty);
        let accepted = match builtin.kind {
            BuiltinKind::Len => matches!(arg_ty, Type::Str | Type::Unknown),
            BuiltinKind::Abs => matches!(arg_ty, Type::Int | Type::Float | Type::Bool | Type::Unknown),
            _ => !matches!(arg_ty, Type::Void),
        };
        if !accepted {
            let message = format!("`{}` does not accept `{arg_ty}`", builtin.name);
            self.warn(codes::ARGUMENT_TYPE, message, span);
        }
        let ty = match builtin.kind {
            BuiltinKind::Len | BuiltinKind::IntCast => Type::Int,
            BuiltinKind::FloatCast => Type::Float,
            _ => match arg_ty {
                Type::Int | Type::Float => arg_ty,
                Type::Bool => Type::Int,
                _ => Type::Unknown,
            },
        };
        Ok(HirExpr {
            kind: HirExprKind::Call {
                callee: Callee::Builtin(builtin.kind),
                args: values,
            },
            ty,
            span,
        })
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn nested<T>(&mut self, span: Span, f: impl FnOnce(&mut Self) -> AResult<T>) -> AResult<T> {
        if self.depth >= self.max_depth {
            return Err(CoreError::InternalLimitExceeded {
                limit: self.max_depth,
                span,
            });
        }
        self.depth += 1;
        let result = ensure_sufficient_stack(|| f(self));
        self.depth -= 1;
        result
    }

    fn binding(&self, name: &str) -> Binding {
        match self.scopes.lookup(name) {
            Some(Symbol::Variable(ty)) => Binding::Variable(*ty),
            Some(Symbol::Global(ty)) => Binding::Global(*ty),
            Some(Symbol::Function(_)) => Binding::Function,
            Some(Symbol::Unsupported) => Binding::Unsupported,
            None => Binding::Free,
        }
    }

    /// Marks `name` as bound by a rejected construct, unless a real binding
    /// is already visible. Module-level bindings go to the global scope so
    /// function bodies see them too.
    fn bind_unsupported(&mut self, name: &str) {
        if matches!(self.binding(name), Binding::Variable(_) | Binding::Function) {
            return;
        }
        if self.function.is_none() {
            self.scopes.declare_global(name, Symbol::Unsupported);
        } else {
            self.scopes.declare(name, Symbol::Unsupported);
        }
    }

    fn bind_names_in(&mut self, stmts: &[ast::Stmt]) {
        let mut names = Vec::new();
        collect_bound_names(stmts, &mut names);
        for name in names {
            self.bind_unsupported(&name);
        }
    }

    fn warn(&mut self, code: &'static str, message: impl Into<String>, span: Span) {
        let diagnostic = Diagnostic::warning(code, message, span, self.source);
        trace!(%diagnostic, "recorded diagnostic");
        self.diagnostics.push(diagnostic);
    }

    fn placeholder(
        &mut self,
        code: &'static str,
        construct: &str,
        message: String,
        span: Span,
    ) -> Placeholder {
        self.warn(code, message.clone(), span);
        Placeholder {
            construct: construct.to_string(),
            message,
            snippet: self.source.snippet(span).to_string(),
        }
    }

    fn unsupported_stmt(&mut self, construct: &str, span: Span) -> HirStmt {
        let message = format!("{construct} is not supported");
        let placeholder = self.placeholder(codes::UNSUPPORTED_CONSTRUCT, construct, message, span);
        HirStmt {
            kind: HirStmtKind::Unsupported(placeholder),
            ty: Type::Unknown,
            span,
        }
    }

    fn unsupported_expr(&mut self, construct: &str, span: Span) -> HirExpr {
        let message = format!("{construct} is not supported");
        let placeholder = self.placeholder(codes::UNSUPPORTED_CONSTRUCT, construct, message, span);
        HirExpr {
            kind: HirExprKind::Unsupported(placeholder),
            ty: Type::Unknown,
            span,
        }
    }
}

fn control(kind: HirStmtKind, span: Span) -> HirStmt {
    HirStmt {
        kind,
        ty: Type::Void,
        span,
    }
}

/// Signature of a module-level function, computed before any body is
/// analyzed. Emits no diagnostics.
fn signature(def: &ast::FunctionDef) -> FunctionSig {
    let params = def
        .params
        .args
        .iter()
        .map(|param| {
            let default = param.default.as_ref().and_then(literal_value);
            let annotated = param.annotation.as_ref().and_then(annotation_type);
            let (ty, origin) = match (annotated, &default) {
                (Some(ty), _) => (ty, ParamOrigin::Annotation),
                (None, Some(value)) => (value.ty, ParamOrigin::Default),
                (None, None) => (Type::Int, ParamOrigin::AssumedInt),
            };
            ParamSig {
                name: param.name.name.clone(),
                ty,
                origin,
                default,
            }
        })
        .collect();
    let result = if def.name.name == "main" {
        Some(Type::Int)
    } else {
        def.returns.as_ref().and_then(annotation_type)
    };
    FunctionSig {
        name: def.name.name.clone(),
        params,
        result,
        opaque: rejected_definition(def).is_some(),
    }
}

/// Why a module-level definition cannot be converted, if it cannot.
fn rejected_definition(def: &ast::FunctionDef) -> Option<&'static str> {
    if def.is_async {
        Some("async function")
    } else if !def.decorators.is_empty() {
        Some("decorator")
    } else if !def.params.is_simple() {
        Some("variadic or keyword-only parameters")
    } else {
        None
    }
}

fn annotation_type(annotation: &ast::Expr) -> Option<Type> {
    match &annotation.kind {
        ExprKind::Name(name) => Type::from_annotation(name),
        ExprKind::Constant(Constant::Str(name)) => Type::from_annotation(name),
        ExprKind::Constant(Constant::None) => Some(Type::Void),
        _ => None,
    }
}

/// A literal usable as a parameter default.
fn literal_value(expr: &ast::Expr) -> Option<HirExpr> {
    let literal = match &expr.kind {
        ExprKind::Constant(Constant::Int(value)) => Literal::Int(*value),
        ExprKind::Constant(Constant::Float(value)) => Literal::Float(*value),
        ExprKind::Constant(Constant::Str(text)) => Literal::Str(text.clone()),
        ExprKind::Constant(Constant::Bool(value)) => Literal::Bool(*value),
        ExprKind::UnaryOp {
            op: UnaryOp::Neg,
            operand,
        } => match &operand.kind {
            ExprKind::Constant(Constant::Int(value)) => Literal::Int(value.checked_neg()?),
            ExprKind::Constant(Constant::Float(value)) => Literal::Float(-value),
            _ => return None,
        },
        _ => return None,
    };
    Some(HirExpr::literal(literal, expr.span))
}

/// Direction of a counting loop from its step, or the construct to report
/// when no direction can be given.
fn loop_direction(step: &HirExpr) -> Result<LoopDirection, &'static str> {
    let constant = match &step.kind {
        HirExprKind::Literal(Literal::Int(value)) => Some(*value),
        HirExprKind::Unary { op, operand } => match (op, &operand.kind) {
            (UnaryOp::Neg, HirExprKind::Literal(Literal::Int(value))) => {
                Some(value.saturating_neg())
            }
            (UnaryOp::Pos, HirExprKind::Literal(Literal::Int(value))) => Some(*value),
            _ => None,
        },
        _ => None,
    };
    match constant {
        Some(0) => Err("range with a zero step"),
        Some(value) if value > 0 => Ok(LoopDirection::Up),
        Some(_) => Ok(LoopDirection::Down),
        None => match step.kind {
            HirExprKind::Name(_) => Ok(LoopDirection::StepSign),
            // Lifted into a statement placeholder afterwards.
            HirExprKind::Unsupported(_) => Ok(LoopDirection::Up),
            _ => Err("range step that is neither a literal nor a variable"),
        },
    }
}

/// Message for assigning `assigned` to a variable declared as `declared`,
/// if the two conflict.
fn type_conflict(name: &str, declared: Type, assigned: Type) -> Option<String> {
    if assigned == Type::Unknown
        || declared == Type::Unknown
        || Type::accepts_argument(declared, assigned)
    {
        return None;
    }
    Some(format!(
        "type changed, coercion ignored: `{name}` is `{declared}` but is assigned `{assigned}`"
    ))
}

/// `NAME = literal` or `NAME: T = literal` with a compatible literal.
fn constant_definition(stmt: &ast::Stmt) -> Option<(&ast::Expr, HirExpr, Type)> {
    match &stmt.kind {
        StmtKind::Assign { targets, value } => {
            let [target] = targets.as_slice() else {
                return None;
            };
            let value = literal_value(value)?;
            let ty = value.ty;
            Some((target, value, ty))
        }
        StmtKind::AnnAssign {
            target,
            annotation,
            value: Some(value),
        } => {
            let ty = annotation_type(annotation).filter(|ty| *ty != Type::Void)?;
            let value = literal_value(value).filter(|value| Type::accepts_argument(ty, value.ty))?;
            Some((target, value, ty))
        }
        _ => None,
    }
}

/// Names read anywhere in `stmts`, nested function bodies excluded.
fn collect_read_names(stmts: &[ast::Stmt], names: &mut HashSet<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Expr(value)
            | StmtKind::Assign { value, .. }
            | StmtKind::Return(Some(value)) => collect_expr_names(value, names),
            StmtKind::AugAssign { target, value, .. } => {
                collect_expr_names(target, names);
                collect_expr_names(value, names);
            }
            StmtKind::AnnAssign {
                value: Some(value), ..
            } => collect_expr_names(value, names),
            StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
                collect_expr_names(test, names);
                collect_read_names(body, names);
                collect_read_names(orelse, names);
            }
            StmtKind::For {
                iter, body, orelse, ..
            } => {
                collect_expr_names(iter, names);
                collect_read_names(body, names);
                collect_read_names(orelse, names);
            }
            _ => {}
        }
    }
}

fn collect_expr_names(expr: &ast::Expr, names: &mut HashSet<String>) {
    ensure_sufficient_stack(|| match &expr.kind {
        ExprKind::Name(name) => {
            names.insert(name.clone());
        }
        ExprKind::BinOp { left, right, .. } => {
            collect_expr_names(left, names);
            collect_expr_names(right, names);
        }
        ExprKind::UnaryOp { operand, .. } => collect_expr_names(operand, names),
        ExprKind::Compare {
            left, comparators, ..
        } => {
            collect_expr_names(left, names);
            for comparator in comparators {
                collect_expr_names(comparator, names);
            }
        }
        ExprKind::Call {
            func,
            args,
            keywords,
        } => {
            collect_expr_names(func, names);
            for arg in args {
                collect_expr_names(arg, names);
            }
            for keyword in keywords {
                collect_expr_names(&keyword.value, names);
            }
        }
        ExprKind::IfExp { test, body, orelse } => {
            collect_expr_names(test, names);
            collect_expr_names(body, names);
            collect_expr_names(orelse, names);
        }
        ExprKind::FString(parts) => {
            for part in parts {
                if let FStringPart::Field { value, .. } = part {
                    collect_expr_names(value, names);
                }
            }
        }
        ExprKind::Attribute { value, .. } | ExprKind::Starred(value) => {
            collect_expr_names(value, names);
        }
        ExprKind::Subscript { value, index } => {
            collect_expr_names(value, names);
            collect_expr_names(index, names);
        }
        ExprKind::List(items) | ExprKind::Tuple(items) | ExprKind::Set(items) => {
            for item in items {
                collect_expr_names(item, names);
            }
        }
        _ => {}
    })
}

/// Flattens `if __name__ == "__main__":` guards into the top level.
fn unwrap_main_guards(body: &[ast::Stmt]) -> Vec<&ast::Stmt> {
    let mut flat = Vec::with_capacity(body.len());
    for stmt in body {
        match &stmt.kind {
            StmtKind::If { test, body, orelse } if orelse.is_empty() && is_main_guard(test) => {
                flat.extend(body.iter());
            }
            _ => flat.push(stmt),
        }
    }
    flat
}

fn is_main_guard(test: &ast::Expr) -> bool {
    let ExprKind::Compare {
        left,
        ops,
        comparators,
    } = &test.kind
    else {
        return false;
    };
    let is_name = |expr: &ast::Expr| expr.name() == Some("__name__");
    let is_main = |expr: &ast::Expr| {
        matches!(&expr.kind, ExprKind::Constant(Constant::Str(text)) if text == "__main__")
    };
    match (ops.as_slice(), comparators.as_slice()) {
        ([CmpOp::Eq], [right]) => {
            (is_name(left) && is_main(right)) || (is_main(left) && is_name(right))
        }
        _ => false,
    }
}

fn is_main_definition(stmt: &ast::Stmt) -> bool {
    matches!(&stmt.kind, StmtKind::FunctionDef(def) if def.name.name == "main")
}

fn is_bare_call(expr: &ast::Expr, callee: &str) -> bool {
    matches!(
        &expr.kind,
        ExprKind::Call { func, args, keywords }
            if func.name() == Some(callee) && args.is_empty() && keywords.is_empty()
    )
}

fn is_docstring(expr: &ast::Expr) -> bool {
    matches!(expr.kind, ExprKind::Constant(Constant::Str(_)))
}

fn alias_binding(alias: &ast::Alias) -> &str {
    match &alias.asname {
        Some(asname) => asname.as_str(),
        None => alias.name.split('.').next().unwrap_or(alias.name.as_str()),
    }
}

fn collect_target_names(target: &ast::Expr, names: &mut Vec<String>) {
    match &target.kind {
        ExprKind::Name(name) => names.push(name.clone()),
        ExprKind::Tuple(items) | ExprKind::List(items) => {
            for item in items {
                collect_target_names(item, names);
            }
        }
        ExprKind::Starred(inner) => collect_target_names(inner, names),
        _ => {}
    }
}

/// Names a block of rejected statements would have bound.
fn collect_bound_names(stmts: &[ast::Stmt], names: &mut Vec<String>) {
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    collect_target_names(target, names);
                }
            }
            StmtKind::AugAssign { target, .. } | StmtKind::AnnAssign { target, .. } => {
                collect_target_names(target, names);
            }
            StmtKind::For {
                target,
                body,
                orelse,
                ..
            } => {
                collect_target_names(target, names);
                collect_bound_names(body, names);
                collect_bound_names(orelse, names);
            }
            StmtKind::If { body, orelse, .. } | StmtKind::While { body, orelse, .. } => {
                collect_bound_names(body, names);
                collect_bound_names(orelse, names);
            }
            StmtKind::FunctionDef(def) => names.push(def.name.name.clone()),
            StmtKind::ClassDef { name, .. } => names.push(name.name.clone()),
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_bound_names(body, names);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        names.push(name.name.clone());
                    }
                    collect_bound_names(&handler.body, names);
                }
                collect_bound_names(orelse, names);
                collect_bound_names(finalbody, names);
            }
            StmtKind::With { items, body, .. } => {
                for item in items {
                    if let Some(target) = &item.target {
                        collect_target_names(target, names);
                    }
                }
                collect_bound_names(body, names);
            }
            StmtKind::Import(aliases) => {
                names.extend(aliases.iter().map(|alias| alias_binding(alias).to_string()));
            }
            StmtKind::ImportFrom { names: aliases, .. } => names.extend(
                aliases
                    .iter()
                    .filter(|alias| alias.name != "*")
                    .map(|alias| alias_binding(alias).to_string()),
            ),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn analyze_with(source: &str, target: Target, options: &ConvertOptions) -> AResult<Analysis> {
        let module = parse(source, &ConvertOptions::default())?;
        let map = SourceMap::new(source);
        analyze(&module, &map, target, options)
    }

    fn analyze_c(source: &str) -> Analysis {
        analyze_with(source, Target::C, &ConvertOptions::default()).expect("analysis succeeds")
    }

    fn codes_of(analysis: &Analysis) -> Vec<&'static str> {
        analysis.diagnostics.iter().map(|d| d.code).collect()
    }

    fn function<'m>(analysis: &'m Analysis, name: &str) -> &'m HirFunction {
        analysis
            .module
            .functions
            .iter()
            .find(|function| function.name.name == name)
            .expect("function exists")
    }

    #[test]
    fn first_assignment_declares_with_inferred_type() {
        let analysis = analyze_c("x = 5\ny = 2.5\nprint(x)\n");
        assert!(analysis.diagnostics.is_empty());
        let body = &analysis.module.body;
        assert!(matches!(body[0].kind, HirStmtKind::VarDecl { .. }));
        assert_eq!(body[0].ty, Type::Int);
        assert_eq!(body[1].ty, Type::Float);
        assert_eq!(analysis.module.entry, Entry::Generated);
    }

    #[test]
    fn reassignment_keeps_declared_type_and_warns_once() {
        let analysis = analyze_c("s = \"a\"\ns = \"b\"\ns = 3\n");
        assert_eq!(codes_of(&analysis), vec![codes::TYPE_CHANGED]);
        assert_eq!(analysis.diagnostics[0].location.line, 3);
        assert!(analysis.diagnostics[0].message.contains("type changed, coercion ignored"));
        let body = &analysis.module.body;
        assert!(matches!(body[1].kind, HirStmtKind::Assign { .. }));
        let HirStmtKind::Unsupported(placeholder) = &body[2].kind else {
            panic!("expected the conflicting assignment to be dropped");
        };
        assert_eq!(placeholder.construct, "type-changing assignment");
        assert_eq!(placeholder.snippet, "s = 3");
    }

    #[test]
    fn conflicting_annotation_keeps_the_declaration_without_value() {
        let analysis = analyze_c("n: int = \"a\"\nprint(n)\n");
        assert_eq!(codes_of(&analysis), vec![codes::TYPE_CHANGED]);
        let HirStmtKind::VarDecl { value, .. } = &analysis.module.body[0].kind else {
            panic!("expected declaration");
        };
        assert!(value.is_none());
        assert_eq!(analysis.module.body[0].ty, Type::Int);
    }

    #[test]
    fn loop_over_a_variable_of_another_type_is_dropped() {
        let analysis = analyze_c("i = \"s\"\nfor i in range(3):\n    print(i)\n");
        assert_eq!(codes_of(&analysis), vec![codes::TYPE_CHANGED]);
        assert!(matches!(analysis.module.body[1].kind, HirStmtKind::Unsupported(_)));
    }

    #[test]
    fn int_widens_into_float_variable_without_warning() {
        let analysis = analyze_c("x = 1.5\nx = 2\n");
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn reading_an_unassigned_name_is_fatal() {
        let err = analyze_with("print(y)\n", Target::C, &ConvertOptions::default()).unwrap_err();
        assert_eq!(
            err,
            CoreError::UndeclaredName {
                name: "y".to_string(),
                span: Span::new(6, 7),
            }
        );
    }

    #[test]
    fn wrong_argument_count_is_fatal() {
        let source = "def f(a, b):\n    return a\nf(1)\n";
        let err = analyze_with(source, Target::C, &ConvertOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ArityMismatch { ref name, ref expected, given: 1, .. }
                if name == "f" && expected == "2"
        ));
    }

    #[test]
    fn default_typed_parameters_are_silent_when_used_consistently() {
        let analysis = analyze_c("def add(a, b):\n    return a + b\nx = add(1, 2)\n");
        assert!(analysis.diagnostics.is_empty());
        let add = function(&analysis, "add");
        assert_eq!(add.result, Type::Int);
        assert!(add.params.iter().all(|param| param.ty == Type::Int));
    }

    #[test]
    fn mismatched_argument_for_assumed_int_parameter_warns() {
        let analysis = analyze_c("def f(a):\n    return a\nf(\"hi\")\n");
        assert_eq!(codes_of(&analysis), vec![codes::ARGUMENT_TYPE]);
        assert!(analysis.diagnostics[0]
            .message
            .contains("parameter type inferred as int by default"));
    }

    #[test]
    fn literal_defaults_fill_missing_arguments() {
        let analysis = analyze_c("def f(a, b=2.5):\n    return a + b\nx = f(1)\n");
        assert!(analysis.diagnostics.is_empty());
        assert_eq!(function(&analysis, "f").result, Type::Float);
        let HirStmtKind::VarDecl { value: Some(value), .. } = &analysis.module.body[0].kind else {
            panic!("expected declaration");
        };
        let HirExprKind::Call { args, .. } = &value.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(analysis.module.body[0].ty, Type::Float);
    }

    #[test]
    fn annotated_float_parameter_accepts_int_argument() {
        let analysis = analyze_c("def f(a: float):\n    return a\ny = f(1)\n");
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn class_becomes_single_placeholder() {
        let analysis = analyze_c("class Foo:\n    pass\nx = 1\n");
        assert_eq!(codes_of(&analysis), vec![codes::UNSUPPORTED_CONSTRUCT]);
        assert!(analysis.diagnostics[0].message.contains("class"));
        let HirStmtKind::Unsupported(placeholder) = &analysis.module.body[0].kind else {
            panic!("expected placeholder");
        };
        assert_eq!(placeholder.snippet, "class Foo:");
        assert!(matches!(analysis.module.body[1].kind, HirStmtKind::VarDecl { .. }));
    }

    #[test]
    fn expression_placeholders_replace_their_statement() {
        let analysis = analyze_c("squares = [i * i for i in range(3)]\nprint(1)\n");
        assert_eq!(analysis.diagnostics.len(), 1);
        assert!(analysis.diagnostics[0].message.contains("comprehension"));
        let HirStmtKind::Unsupported(placeholder) = &analysis.module.body[0].kind else {
            panic!("expected statement placeholder");
        };
        assert_eq!(placeholder.construct, "list comprehension");
        assert_eq!(placeholder.snippet, "squares = [i * i for i in range(3)]");
        assert_eq!(analysis.module.body.len(), 2);
    }

    #[test]
    fn placeholders_nested_in_operands_are_lifted() {
        let source = "def f(n):\n    return n * [1][0]\nx = 1 + len([2])\nprint(x)\n";
        let analysis = analyze_c(source);
        assert!(matches!(
            function(&analysis, "f").body[0].kind,
            HirStmtKind::Unsupported(_)
        ));
        assert!(matches!(analysis.module.body[0].kind, HirStmtKind::Unsupported(_)));
        // `x` now names a dropped declaration.
        assert!(matches!(analysis.module.body[1].kind, HirStmtKind::Unsupported(_)));
        assert!(analysis
            .module
            .body
            .iter()
            .all(|stmt| stmt.expression_placeholder().is_none()));
    }

    #[test]
    fn uses_of_names_bound_by_rejected_constructs_degrade() {
        let analysis = analyze_c("from math import sqrt\nx = sqrt(2)\n");
        assert_eq!(
            codes_of(&analysis),
            vec![codes::UNSUPPORTED_CONSTRUCT, codes::UNSUPPORTED_CONSTRUCT]
        );
    }

    #[test]
    fn non_boolean_condition_warns() {
        let analysis = analyze_c("s = \"a\"\nif s:\n    pass\n");
        assert_eq!(codes_of(&analysis), vec![codes::NON_BOOLEAN_CONDITION]);
        assert!(analysis.diagnostics[0]
            .message
            .starts_with("non-boolean condition, implicit truthiness assumed"));
    }

    #[test]
    fn string_concatenation_depends_on_target() {
        let source = "a = \"x\"\nb = a + \"y\"\n";
        let c = analyze_c(source);
        assert_eq!(codes_of(&c), vec![codes::STRING_CONCAT]);
        assert_eq!(
            c.diagnostics[0].message,
            "string concatenation unsupported for this target"
        );

        let cpp = analyze_with(source, Target::Cpp, &ConvertOptions::default())
            .expect("analysis succeeds");
        assert!(cpp.diagnostics.is_empty());
        assert_eq!(cpp.module.body[1].ty, Type::Str);
    }

    #[test]
    fn mixed_operands_are_unknown_and_warn() {
        let analysis = analyze_c("x = 1 + \"a\"\n");
        assert_eq!(codes_of(&analysis), vec![codes::UNSUPPORTED_OPERANDS]);
        assert_eq!(
            analysis.diagnostics[0].message,
            "unsupported operand types for `+`: `int` and `str`"
        );
        assert_eq!(analysis.module.body[0].ty, Type::Unknown);
    }

    #[test]
    fn forward_call_is_pending_and_needs_prototype() {
        let source = "def f():\n    return g()\ndef g():\n    return 1.5\n";
        let analysis = analyze_c(source);
        assert_eq!(codes_of(&analysis), vec![codes::PENDING_RETURN]);
        assert!(function(&analysis, "g").needs_prototype);
        assert!(!function(&analysis, "f").needs_prototype);
        assert_eq!(function(&analysis, "f").result, Type::Int);
        assert_eq!(function(&analysis, "g").result, Type::Float);
    }

    #[test]
    fn recursion_after_first_return_is_resolved() {
        let source = "\
def fact(n):
    if n <= 1:
        return 1
    return n * fact(n - 1)
";
        let analysis = analyze_c(source);
        assert!(analysis.diagnostics.is_empty());
        let fact = function(&analysis, "fact");
        assert_eq!(fact.result, Type::Int);
        assert!(!fact.needs_prototype);
    }

    #[test]
    fn return_types_join_and_conflicts_warn() {
        let joined = analyze_c("def f(a):\n    if a:\n        return 1\n    return 2.5\n");
        assert!(joined.diagnostics.is_empty());
        assert_eq!(function(&joined, "f").result, Type::Float);

        let conflicting = analyze_c("def f(a):\n    if a:\n        return 1\n    return \"s\"\n");
        assert_eq!(codes_of(&conflicting), vec![codes::RETURN_TYPES]);
        assert_eq!(function(&conflicting, "f").result, Type::Unknown);
    }

    #[test]
    fn function_without_value_return_is_void() {
        let analysis = analyze_c("def hello():\n    print(\"hi\")\n");
        assert_eq!(function(&analysis, "hello").result, Type::Void);
    }

    #[test]
    fn explicit_main_and_guard_are_recognised() {
        let source = "\
def main():
    print(1)
x = 1
if __name__ == \"__main__\":
    main()
";
        let analysis = analyze_c(source);
        assert_eq!(analysis.module.entry, Entry::UserDefined);
        assert_eq!(analysis.module.body.len(), 1);
        assert!(analysis.diagnostics[0]
            .message
            .contains("top-level statement alongside main()"));
        let main = function(&analysis, "main");
        assert_eq!(main.result, Type::Int);
        assert!(main.body.last().is_some_and(HirStmt::is_return));
    }

    #[test]
    fn module_constants_read_by_functions_are_hoisted() {
        let analysis = analyze_c("LIMIT = 10\ndef f(n):\n    return n * LIMIT\nprint(f(2), LIMIT)\n");
        assert!(analysis.diagnostics.is_empty());
        let [global] = analysis.module.globals.as_slice() else {
            panic!("expected one module constant");
        };
        assert!(matches!(
            &global.kind,
            HirStmtKind::VarDecl { name, value: Some(_) } if name.name == "LIMIT"
        ));
        assert_eq!(global.ty, Type::Int);
        assert_eq!(analysis.module.body.len(), 1);
        assert_eq!(function(&analysis, "f").result, Type::Int);
    }

    #[test]
    fn reassigned_module_variables_stay_invisible_inside_functions() {
        let analysis = analyze_c("x = 1\nx = 2\ndef f():\n    return x\n");
        assert!(analysis.module.globals.is_empty());
        assert_eq!(codes_of(&analysis), vec![codes::UNSUPPORTED_CONSTRUCT]);
        assert!(analysis.diagnostics[0].message.contains("module-level variable"));
    }

    #[test]
    fn module_constants_cannot_be_updated() {
        let analysis = analyze_c("N = 1\ndef f():\n    N += 1\n    return N\n");
        assert_eq!(analysis.module.globals.len(), 1);
        assert!(analysis.diagnostics[0]
            .message
            .contains("augmented assignment to a module constant"));
    }

    #[test]
    fn block_locals_do_not_leak() {
        let analysis = analyze_c("if 1:\n    y = 2\nprint(y)\n");
        assert_eq!(codes_of(&analysis), vec![codes::UNSUPPORTED_CONSTRUCT]);
        assert!(analysis.diagnostics[0].message.contains("inner block"));
    }

    #[test]
    fn range_loops_become_counting_loops() {
        let analysis = analyze_c("for i in range(10, 0, -1):\n    print(i)\n");
        let HirStmtKind::For {
            var,
            declare,
            start,
            step,
            direction,
            ..
        } = &analysis.module.body[0].kind
        else {
            panic!("expected counting loop");
        };
        assert_eq!(var.name, "i");
        assert!(*declare);
        assert!(start.is_some());
        assert!(step.is_some());
        assert_eq!(*direction, LoopDirection::Down);
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn loop_direction_follows_the_step() {
        let direction_of = |source: &str| {
            let analysis = analyze_c(source);
            match analysis.module.body.last().map(|stmt| &stmt.kind) {
                Some(HirStmtKind::For { direction, .. }) => Some(*direction),
                _ => None,
            }
        };
        assert_eq!(direction_of("for i in range(3):\n    pass\n"), Some(LoopDirection::Up));
        assert_eq!(direction_of("for i in range(0, 9, +3):\n    pass\n"), Some(LoopDirection::Up));
        assert_eq!(
            direction_of("s = -2\nfor i in range(9, 0, s):\n    pass\n"),
            Some(LoopDirection::StepSign)
        );
        assert_eq!(direction_of("s = 2\nfor i in range(9, 0, s * 2):\n    pass\n"), None);
    }

    #[test]
    fn zero_step_loops_are_unsupported() {
        let analysis = analyze_c("for i in range(0, 3, 0):\n    x = i\nprint(1)\n");
        assert_eq!(
            analysis.diagnostics[0].message,
            "range with a zero step is not supported"
        );
        assert!(matches!(analysis.module.body[0].kind, HirStmtKind::Unsupported(_)));
    }

    #[test]
    fn other_loops_are_unsupported() {
        let analysis = analyze_c("for c in \"abc\":\n    print(c)\nwhile 1:\n    break\nelse:\n    pass\n");
        let messages: Vec<&str> = analysis
            .diagnostics
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec![
                "for loop over a non-range iterable is not supported",
                "while-else loop is not supported",
            ]
        );
    }

    #[test]
    fn print_layout_comes_from_literal_keywords() {
        let analysis = analyze_c("print(1, 2, sep=\", \", end=\"\")\n");
        let HirStmtKind::Expr(call) = &analysis.module.body[0].kind else {
            panic!("expected expression statement");
        };
        let HirExprKind::Call {
            callee: Callee::Print(layout),
            args,
        } = &call.kind
        else {
            panic!("expected print");
        };
        assert_eq!(layout.sep, ", ");
        assert_eq!(layout.end, "");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn f_strings_in_print_are_flattened() {
        let analysis = analyze_c("x = 3\nprint(f\"x={x}\", 1)\n");
        assert!(analysis.diagnostics.is_empty());
        let HirStmtKind::Expr(call) = &analysis.module.body[1].kind else {
            panic!("expected expression statement");
        };
        let HirExprKind::Call {
            callee: Callee::Print(layout),
            args,
        } = &call.kind
        else {
            panic!("expected print");
        };
        assert_eq!(layout.sep, "");
        let kinds: Vec<&HirExprKind> = args.iter().map(|arg| &arg.kind).collect();
        assert_eq!(
            kinds,
            vec![
                &HirExprKind::Literal(Literal::Str("x=".to_string())),
                &HirExprKind::Name("x".to_string()),
                &HirExprKind::Literal(Literal::Str(" ".to_string())),
                &HirExprKind::Literal(Literal::Int(1)),
            ]
        );
    }

    #[test]
    fn f_strings_with_format_specs_or_outside_print_are_unsupported() {
        let analysis = analyze_c("x = 3\nprint(f\"{x:>4}\")\ns = f\"{x}\"\n");
        let messages: Vec<&str> = analysis
            .diagnostics
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec![
                "f-string conversion or format spec is not supported",
                "f-string outside print is not supported",
            ]
        );
        assert!(matches!(analysis.module.body[1].kind, HirStmtKind::Unsupported(_)));
    }

    #[test]
    fn integer_literals_outside_int_range_warn() {
        let analysis = analyze_c("a = 2147483647\nb = -2147483648\nc = 2147483648\nd = 99999999999999999999\n");
        assert_eq!(
            codes_of(&analysis),
            vec![codes::INTEGER_RANGE, codes::UNSUPPORTED_CONSTRUCT]
        );
        assert_eq!(analysis.diagnostics[0].location.line, 3);
        assert_eq!(
            analysis.diagnostics[0].message,
            "integer literal `2147483648` does not fit a 32-bit `int`"
        );
    }

    #[test]
    fn decorated_functions_are_rejected() {
        let analysis = analyze_c("@cache\ndef f():\n    return 1\n");
        assert_eq!(analysis.diagnostics[0].message, "decorator is not supported");
    }

    #[test]
    fn print_as_value_is_a_placeholder() {
        let analysis = analyze_c("x = print(1)\n");
        assert_eq!(
            analysis.diagnostics[0].message,
            "print used as a value is not supported"
        );
    }

    #[test]
    fn rebinding_a_function_is_unsupported() {
        let analysis = analyze_c("def f():\n    return 1\nf = 2\n");
        assert!(analysis.diagnostics[0].message.contains("function rebinding"));
    }

    #[test]
    fn docstrings_are_dropped() {
        let analysis = analyze_c("\"\"\"Module doc.\"\"\"\ndef f():\n    \"\"\"Doc.\"\"\"\n    return 1\n");
        assert!(analysis.diagnostics.is_empty());
        assert!(analysis.module.body.is_empty());
        assert_eq!(function(&analysis, "f").body.len(), 1);
    }

    #[test]
    fn deep_nesting_is_refused() {
        let mut source = String::new();
        for level in 0..12 {
            source.push_str(&" ".repeat(level));
            source.push_str("if 1:\n");
        }
        source.push_str(&" ".repeat(12));
        source.push_str("pass\n");
        let options = ConvertOptions::default().with_max_depth(6);
        let err = analyze_with(&source, Target::C, &options).unwrap_err();
        assert!(matches!(err, CoreError::InternalLimitExceeded { limit: 6, .. }));
    }

    #[test]
    fn analysis_grows_the_stack_for_deep_expressions() {
        let source = format!("x = {}1{}\n", "-(".repeat(1_000), ")".repeat(1_000));
        let options = ConvertOptions::default().with_max_depth(10_000);
        let analysis = std::thread::Builder::new()
            .stack_size(1024 * 1024)
            .spawn(move || {
                let module = parse(&source, &options).map_err(|err| err.to_string())?;
                let map = SourceMap::new(&source);
                analyze(&module, &map, Target::C, &options).map_err(|err| err.to_string())
            })
            .expect("thread spawns")
            .join()
            .expect("analysis does not overflow");
        assert!(analysis.expect("analysis succeeds").diagnostics.is_empty());
    }

    #[test]
    fn builtins_type_their_results() {
        let analysis = analyze_c("s = \"abc\"\nn = len(s)\nf = float(n)\na = abs(-2.5)\ni = int(a)\n");
        assert!(analysis.diagnostics.is_empty());
        let types: Vec<Type> = analysis.module.body.iter().map(|stmt| stmt.ty).collect();
        assert_eq!(
            types,
            vec![Type::Str, Type::Int, Type::Float, Type::Float, Type::Int]
        );
    }
}
