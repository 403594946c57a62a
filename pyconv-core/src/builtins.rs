//! Built-in functions understood by the converter.
//!
//! The analyzer resolves a call to one of these names only when no user
//! symbol shadows it. Backends map each [`BuiltinKind`] to their own
//! rendering.

/// Kind of builtin, used by backends to decide how to lower a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    /// `print(*values, sep=.., end=..)`, statement position only.
    Print,
    /// `len(str)`.
    Len,
    /// `int(x)` conversion.
    IntCast,
    /// `float(x)` conversion.
    FloatCast,
    /// `abs(x)`.
    Abs,
    /// `range(...)`, only as the iterable of a `for` loop.
    Range,
}

/// Metadata about a single builtin symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinDescriptor {
    /// Name in the source language.
    pub name: &'static str,
    pub kind: BuiltinKind,
    /// Accepted positional argument counts, `None` for variadic.
    pub arity: Option<(usize, usize)>,
}

impl BuiltinDescriptor {
    pub fn accepts_arity(&self, given: usize) -> bool {
        match self.arity {
            Some((min, max)) => (min..=max).contains(&given),
            None => true,
        }
    }

    /// Human readable arity, e.g. `1` or `1 to 3`.
    pub fn arity_text(&self) -> String {
        match self.arity {
            Some((min, max)) if min == max => min.to_string(),
            Some((min, max)) => format!("{min} to {max}"),
            None => "any number of".to_string(),
        }
    }
}

/// The complete list of builtins known to the converter.
pub const BUILTINS: &[BuiltinDescriptor] = &[
    BuiltinDescriptor {
        name: "print",
        kind: BuiltinKind::Print,
        arity: None,
    },
    BuiltinDescriptor {
        name: "len",
        kind: BuiltinKind::Len,
        arity: Some((1, 1)),
    },
    BuiltinDescriptor {
        name: "int",
        kind: BuiltinKind::IntCast,
        arity: Some((1, 1)),
    },
    BuiltinDescriptor {
        name: "float",
        kind: BuiltinKind::FloatCast,
        arity: Some((1, 1)),
    },
    BuiltinDescriptor {
        name: "abs",
        kind: BuiltinKind::Abs,
        arity: Some((1, 1)),
    },
    BuiltinDescriptor {
        name: "range",
        kind: BuiltinKind::Range,
        arity: Some((1, 3)),
    },
];

/// Builtins of the source language with no rendering in either target.
/// Calls to them degrade to placeholders instead of failing name
/// resolution.
const UNSUPPORTED_BUILTINS: &[&str] = &[
    "all", "any", "bin", "bool", "chr", "dict", "dir", "divmod", "enumerate", "exit", "filter",
    "format", "getattr", "hasattr", "hash", "hex", "id", "input", "isinstance", "iter", "list",
    "map", "max", "min", "next", "oct", "open", "ord", "pow", "quit", "repr", "reversed",
    "round", "set", "setattr", "sorted", "str", "sum", "super", "tuple", "type", "vars", "zip",
];

/// Look up a builtin by its source-level name.
pub fn find_builtin(name: &str) -> Option<&'static BuiltinDescriptor> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

pub fn is_unsupported_builtin(name: &str) -> bool {
    UNSUPPORTED_BUILTINS.binary_search(&name).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_builtins_by_name() {
        assert_eq!(find_builtin("len").map(|b| b.kind), Some(BuiltinKind::Len));
        assert!(find_builtin("printf").is_none());
    }

    #[test]
    fn range_accepts_one_to_three_arguments() {
        let range = find_builtin("range").expect("range is a builtin");
        assert!(!range.accepts_arity(0));
        assert!(range.accepts_arity(3));
        assert!(!range.accepts_arity(4));
        assert_eq!(range.arity_text(), "1 to 3");
    }

    #[test]
    fn unsupported_builtin_table_is_sorted() {
        assert!(UNSUPPORTED_BUILTINS.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(is_unsupported_builtin("input"));
        assert!(!is_unsupported_builtin("len"));
    }
}
