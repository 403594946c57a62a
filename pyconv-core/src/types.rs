//! Static types inferred for converted programs.
//!
//! The source language is dynamically typed; every value the converter
//! accepts is pinned to one of these types by the analyzer. `Unknown` marks
//! a use that could not be resolved and always travels together with a
//! diagnostic.

use crate::ast::BinOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    Str,
    Void,
    Unknown,
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Types a condition may have without a truthiness warning.
    pub fn is_truthy_compatible(self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::Bool)
    }

    /// Whether a value of type `given` may be passed where `expected` is
    /// declared. Ints widen to floats; everything else must match.
    pub fn accepts_argument(expected: Type, given: Type) -> bool {
        expected == given || (expected == Type::Float && given == Type::Int)
    }

    /// Name used in diagnostics; matches the source language's spelling.
    pub fn source_name(self) -> &'static str {
        match self {
            Type::Int => "int",
            Type::Float => "float",
            Type::Bool => "bool",
            Type::Str => "str",
            Type::Void => "None",
            Type::Unknown => "unknown",
        }
    }

    /// Type named by an annotation such as `x: int`.
    pub fn from_annotation(name: &str) -> Option<Type> {
        match name {
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "bool" => Some(Type::Bool),
            "str" => Some(Type::Str),
            "None" => Some(Type::Void),
            _ => None,
        }
    }
}

impl core::fmt::Display for Type {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.source_name())
    }
}

/// Numeric promotion: Int∘Int→Int, any Float operand makes the result
/// Float.
fn promote_numeric(left: Type, right: Type) -> Option<Type> {
    match (left, right) {
        (Type::Int, Type::Int) => Some(Type::Int),
        (l, r) if l.is_numeric() && r.is_numeric() => Some(Type::Float),
        _ => None,
    }
}

/// Result type of `left op right`, or `None` when the combination is not
/// in the promotion table.
pub fn binary_result(op: BinOp, left: Type, right: Type) -> Option<Type> {
    use BinOp::*;

    match op {
        Add => match (left, right) {
            (Type::Str, Type::Str) => Some(Type::Str),
            _ => promote_numeric(left, right),
        },
        Sub | Mul | Div | FloorDiv => promote_numeric(left, right),
        Mod => match (left, right) {
            (Type::Int, Type::Int) => Some(Type::Int),
            _ => None,
        },
        Pow => promote_numeric(left, right).map(|_| Type::Float),
        BitAnd | BitOr | BitXor | LShift | RShift => match (left, right) {
            (Type::Int, Type::Int) => Some(Type::Int),
            (Type::Bool, Type::Bool) if matches!(op, BitAnd | BitOr | BitXor) => Some(Type::Bool),
            _ => None,
        },
        Eq | NotEq | Lt | LtE | Gt | GtE => {
            let comparable = (left.is_numeric() && right.is_numeric())
                || (left == Type::Str && right == Type::Str)
                || (left == Type::Bool && right == Type::Bool && matches!(op, Eq | NotEq));
            comparable.then_some(Type::Bool)
        }
        And | Or => (left.is_truthy_compatible() && right.is_truthy_compatible())
            .then_some(Type::Bool),
        MatMul => None,
    }
}

/// Join of two return types: identical types join to themselves and
/// numeric types follow the promotion table.
pub fn join(a: Type, b: Type) -> Option<Type> {
    if a == b {
        return Some(a);
    }
    promote_numeric(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_follows_promotion_table() {
        assert_eq!(binary_result(BinOp::Add, Type::Int, Type::Int), Some(Type::Int));
        assert_eq!(binary_result(BinOp::Mul, Type::Int, Type::Float), Some(Type::Float));
        assert_eq!(binary_result(BinOp::Sub, Type::Float, Type::Int), Some(Type::Float));
        assert_eq!(binary_result(BinOp::Div, Type::Int, Type::Int), Some(Type::Int));
    }

    #[test]
    fn only_addition_concatenates_strings() {
        assert_eq!(binary_result(BinOp::Add, Type::Str, Type::Str), Some(Type::Str));
        assert_eq!(binary_result(BinOp::Sub, Type::Str, Type::Str), None);
        assert_eq!(binary_result(BinOp::Add, Type::Str, Type::Int), None);
    }

    #[test]
    fn comparisons_and_logic_yield_bool() {
        assert_eq!(binary_result(BinOp::Lt, Type::Int, Type::Float), Some(Type::Bool));
        assert_eq!(binary_result(BinOp::Eq, Type::Str, Type::Str), Some(Type::Bool));
        assert_eq!(binary_result(BinOp::Lt, Type::Bool, Type::Bool), None);
        assert_eq!(binary_result(BinOp::And, Type::Bool, Type::Int), Some(Type::Bool));
        assert_eq!(binary_result(BinOp::Or, Type::Str, Type::Bool), None);
    }

    #[test]
    fn power_is_always_float() {
        assert_eq!(binary_result(BinOp::Pow, Type::Int, Type::Int), Some(Type::Float));
    }

    #[test]
    fn unknown_never_promotes() {
        assert_eq!(binary_result(BinOp::Add, Type::Unknown, Type::Int), None);
        assert_eq!(join(Type::Unknown, Type::Int), None);
    }

    #[test]
    fn join_widens_numeric_returns() {
        assert_eq!(join(Type::Int, Type::Float), Some(Type::Float));
        assert_eq!(join(Type::Str, Type::Str), Some(Type::Str));
        assert_eq!(join(Type::Void, Type::Int), None);
    }
}
