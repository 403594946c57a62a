//! Lexical scope stack used by the analyzer.
//!
//! A fresh stack is built for every conversion and threaded through the
//! traversal. The bottom scope is the global scope holding function
//! signatures and hoisted module constants; function bodies, the generated
//! `main` body and every nested block get their own scope above it.

use std::collections::HashMap;

use crate::error::CoreError;
use crate::hir::HirExpr;
use crate::span::Span;
use crate::types::Type;

/// Where a parameter's type came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamOrigin {
    Annotation,
    /// Taken from a literal default value.
    Default,
    /// Neither annotated nor defaulted; assumed `int`.
    AssumedInt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub name: String,
    pub ty: Type,
    pub origin: ParamOrigin,
    /// Literal default used to fill omitted trailing arguments.
    pub default: Option<HirExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSig {
    pub name: String,
    pub params: Vec<ParamSig>,
    /// `None` while the return type is still unknown, e.g. during the
    /// analysis of a recursive body before its first `return`.
    pub result: Option<Type>,
    /// The definition itself is unsupported; calls degrade to placeholders.
    pub opaque: bool,
}

impl FunctionSig {
    pub fn required_params(&self) -> usize {
        self.params
            .iter()
            .take_while(|param| param.default.is_none())
            .count()
    }

    /// Arity for diagnostics, e.g. `2` or `1 to 3`.
    pub fn arity_text(&self) -> String {
        let required = self.required_params();
        let total = self.params.len();
        if required == total {
            total.to_string()
        } else {
            format!("{required} to {total}")
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Variable(Type),
    /// Module-level constant emitted at file scope. Functions read it, but
    /// an assignment inside a function declares a local that shadows it.
    Global(Type),
    Function(FunctionSig),
    /// Bound by a construct the converter rejected (class, import, tuple
    /// assignment, ...). Uses degrade to placeholders.
    Unsupported,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    symbols: HashMap<String, Symbol>,
}

impl Scope {
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }
}

#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
    max_depth: usize,
}

impl ScopeStack {
    /// A stack holding only the global scope.
    pub fn new(max_depth: usize) -> Self {
        ScopeStack {
            scopes: vec![Scope::default()],
            max_depth,
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn push(&mut self, span: Span) -> Result<(), CoreError> {
        self.enter(Scope::default(), span)
    }

    /// Re-enter a scope that was popped earlier, keeping its bindings.
    pub fn enter(&mut self, scope: Scope, span: Span) -> Result<(), CoreError> {
        if self.scopes.len() > self.max_depth {
            return Err(CoreError::InternalLimitExceeded {
                limit: self.max_depth,
                span,
            });
        }
        self.scopes.push(scope);
        Ok(())
    }

    /// Pops the innermost scope. The global scope is never popped.
    pub fn pop(&mut self) -> Option<Scope> {
        if self.scopes.len() > 1 {
            self.scopes.pop()
        } else {
            None
        }
    }

    pub fn declare(&mut self, name: &str, symbol: Symbol) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.symbols.insert(name.to_string(), symbol);
        }
    }

    pub fn declare_global(&mut self, name: &str, symbol: Symbol) {
        if let Some(scope) = self.scopes.first_mut() {
            scope.symbols.insert(name.to_string(), symbol);
        }
    }

    /// Innermost binding of `name`, walking outward.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut FunctionSig> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| match scope.symbols.get_mut(name) {
                Some(Symbol::Function(sig)) => Some(sig),
                _ => None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_walk_outward_and_respect_shadowing() {
        let mut scopes = ScopeStack::new(8);
        scopes.declare("x", Symbol::Variable(Type::Int));
        scopes.push(Span::default()).expect("within limit");
        assert_eq!(scopes.lookup("x"), Some(&Symbol::Variable(Type::Int)));

        scopes.declare("x", Symbol::Variable(Type::Str));
        assert_eq!(scopes.lookup("x"), Some(&Symbol::Variable(Type::Str)));

        scopes.pop();
        assert_eq!(scopes.lookup("x"), Some(&Symbol::Variable(Type::Int)));
    }

    #[test]
    fn popped_bindings_disappear() {
        let mut scopes = ScopeStack::new(8);
        scopes.push(Span::default()).expect("within limit");
        scopes.declare("y", Symbol::Variable(Type::Float));
        let scope = scopes.pop().expect("inner scope");
        assert!(scopes.lookup("y").is_none());

        scopes.enter(scope, Span::default()).expect("within limit");
        assert_eq!(scopes.lookup("y"), Some(&Symbol::Variable(Type::Float)));
    }

    #[test]
    fn global_scope_survives_pop() {
        let mut scopes = ScopeStack::new(8);
        assert!(scopes.pop().is_none());
        assert_eq!(scopes.depth(), 1);
    }

    #[test]
    fn refuses_to_grow_past_the_limit() {
        let mut scopes = ScopeStack::new(3);
        for _ in 0..3 {
            scopes.push(Span::default()).expect("within limit");
        }
        let err = scopes.push(Span::new(4, 5)).unwrap_err();
        assert!(matches!(err, CoreError::InternalLimitExceeded { limit: 3, .. }));
    }

    #[test]
    fn function_signatures_are_mutable_in_place() {
        let mut scopes = ScopeStack::new(8);
        scopes.declare_global(
            "f",
            Symbol::Function(FunctionSig {
                name: "f".to_string(),
                params: Vec::new(),
                result: None,
                opaque: false,
            }),
        );
        scopes.push(Span::default()).expect("within limit");
        if let Some(sig) = scopes.function_mut("f") {
            sig.result = Some(Type::Float);
        }
        assert!(matches!(
            scopes.lookup("f"),
            Some(Symbol::Function(FunctionSig { result: Some(Type::Float), .. }))
        ));
    }
}
