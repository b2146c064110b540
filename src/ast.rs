//! This module defines the expression data model shared by the reader, the evaluator
//! and the host bridge. The main enum, [`Expr`], covers symbols, lists, typed arrays,
//! scalar atoms and callable functions. Helper functions such as [`val`], [`sym`] and
//! [`nil`] are provided for convenient tree construction in tests, and conversion
//! traits make it easy to build expressions from Rust literals, arrays and vectors.
//!
//! Lists and arrays are reference counted, so cloning an expression is cheap and
//! reference identity (the `is` builtin) is observable on them.

use crate::Error;
use crate::function::Function;
use crate::host::HostObject;
use crate::numeric::{Decimal, Number};
use std::fmt;
use std::rc::Rc;

/// Core expression type
///
/// To build a tree by hand, use the helper functions:
/// - `val(42)` for atoms, `sym("name")` for symbols, `nil()` for the empty list
/// - `val([1, 2, 3])` for homogeneous lists
/// - `val(vec![sym("op"), val(42)])` for mixed lists
#[derive(Clone)]
pub enum Expr {
    /// Identifiers, compared by name
    Symbol(String),
    /// Lists; the empty list is the canonical nil value
    List(Rc<[Expr]>),
    /// Array literals, immutable once read
    Array(Rc<Array>),
    /// Scalars
    Atom(Atom),
    /// Native, lambda and host functions
    Function(Rc<Function>),
}

/// Scalar values
#[derive(Clone)]
pub enum Atom {
    Null,
    Bool(bool),
    Number(Number),
    Str(Rc<str>),
    /// Opaque value owned by the host program
    Object(HostObject),
}

/// Element representation chosen for an array literal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    Int,
    Float,
    Mixed,
}

/// Array payload. Homogeneous numeric literals are stored unboxed.
#[derive(Clone)]
pub enum Array {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Mixed(Vec<Atom>),
}

impl Array {
    /// Build an array from parsed atoms, picking the narrowest element kind.
    /// An empty array is `Mixed`.
    pub fn from_atoms(atoms: Vec<Atom>) -> Array {
        if atoms.is_empty() {
            return Array::Mixed(atoms);
        }

        let ints: Option<Vec<i64>> = atoms
            .iter()
            .map(|atom| match atom {
                Atom::Number(Number::Int(n)) => Some(*n),
                _ => None,
            })
            .collect();
        if let Some(ints) = ints {
            return Array::Int(ints);
        }

        let floats: Option<Vec<f64>> = atoms
            .iter()
            .map(|atom| match atom {
                Atom::Number(Number::Float(x)) => Some(*x),
                _ => None,
            })
            .collect();
        if let Some(floats) = floats {
            return Array::Float(floats);
        }

        Array::Mixed(atoms)
    }

    pub fn kind(&self) -> ArrayKind {
        match self {
            Array::Int(_) => ArrayKind::Int,
            Array::Float(_) => ArrayKind::Float,
            Array::Mixed(_) => ArrayKind::Mixed,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Array::Int(items) => items.len(),
            Array::Float(items) => items.len(),
            Array::Mixed(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index` as an atom
    pub fn get(&self, index: usize) -> Option<Atom> {
        match self {
            Array::Int(items) => items.get(index).map(|n| Atom::Number(Number::Int(*n))),
            Array::Float(items) => items.get(index).map(|x| Atom::Number(Number::Float(*x))),
            Array::Mixed(items) => items.get(index).cloned(),
        }
    }

    /// All elements as atoms
    pub fn atoms(&self) -> Vec<Atom> {
        (0..self.len()).filter_map(|i| self.get(i)).collect()
    }
}

impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Array::Int(a), Array::Int(b)) => a == b,
            (Array::Float(a), Array::Float(b)) => a == b,
            (Array::Mixed(a), Array::Mixed(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Atom::Null, Atom::Null) => true,
            (Atom::Bool(a), Atom::Bool(b)) => a == b,
            (Atom::Number(a), Atom::Number(b)) => a == b,
            (Atom::Str(a), Atom::Str(b)) => a == b,
            (Atom::Object(a), Atom::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Atom {
    /// Reference identity for shared payloads, value equality for immediates
    fn is_identical(&self, other: &Atom) -> bool {
        match (self, other) {
            (Atom::Str(a), Atom::Str(b)) => Rc::ptr_eq(a, b),
            (Atom::Object(a), Atom::Object(b)) => a.ptr_eq(b),
            _ => self == other,
        }
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expr::Symbol(a), Expr::Symbol(b)) => a == b,
            (Expr::List(a), Expr::List(b)) => a == b,
            (Expr::Array(a), Expr::Array(b)) => a == b,
            (Expr::Atom(a), Expr::Atom(b)) => a == b,
            (Expr::Function(a), Expr::Function(b)) => Rc::ptr_eq(a, b),
            _ => false, // Different variants are never equal
        }
    }
}

impl Expr {
    /// The empty list
    pub fn nil() -> Expr {
        Expr::List(Rc::from(Vec::new()))
    }

    pub fn null() -> Expr {
        Expr::Atom(Atom::Null)
    }

    pub fn list(items: Vec<Expr>) -> Expr {
        Expr::List(Rc::from(items))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Expr::List(items) if items.is_empty())
    }

    /// `null`, `false` and the empty list are falsy; everything else is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Expr::Atom(Atom::Null | Atom::Bool(false))) && !self.is_nil()
    }

    /// Identity as observed by `is`: shared values compare by reference, immediate
    /// scalars and symbols by value
    pub fn is_identical(&self, other: &Expr) -> bool {
        match (self, other) {
            (Expr::Symbol(a), Expr::Symbol(b)) => a == b,
            (Expr::List(a), Expr::List(b)) => Rc::ptr_eq(a, b),
            (Expr::Array(a), Expr::Array(b)) => Rc::ptr_eq(a, b),
            (Expr::Function(a), Expr::Function(b)) => Rc::ptr_eq(a, b),
            (Expr::Atom(a), Expr::Atom(b)) => a.is_identical(b),
            _ => false,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expr::Symbol(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Expr]> {
        match self {
            Expr::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short description of the variant, used in type error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Expr::Symbol(_) => "symbol",
            Expr::List(_) => "list",
            Expr::Array(_) => "array",
            Expr::Function(_) => "function",
            Expr::Atom(Atom::Null) => "null",
            Expr::Atom(Atom::Bool(_)) => "boolean",
            Expr::Atom(Atom::Number(_)) => "number",
            Expr::Atom(Atom::Str(_)) => "string",
            Expr::Atom(Atom::Object(_)) => "object",
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Symbol(s) => write!(f, "Symbol({s})"),
            Expr::List(items) => {
                write!(f, "List(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item:?}")?;
                }
                write!(f, ")")
            }
            Expr::Array(array) => write!(f, "Array({:?}, {array})", array.kind()),
            Expr::Atom(atom) => write!(f, "{atom:?}"),
            Expr::Function(func) => write!(f, "{func}"),
        }
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Null => write!(f, "Null"),
            Atom::Bool(b) => write!(f, "Bool({b})"),
            Atom::Number(n) => write!(f, "{n:?}"),
            Atom::Str(s) => write!(f, "Str({s:?})"),
            Atom::Object(obj) => write!(f, "Object({})", obj.type_name()),
        }
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Array({:?}, {self})", self.kind())
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Null => write!(f, "null"),
            Atom::Bool(b) => write!(f, "{b}"),
            Atom::Number(n) => write!(f, "{n}"),
            Atom::Str(s) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Atom::Object(obj) => write!(f, "Object({})", obj.type_name()),
        }
    }
}

impl fmt::Display for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, atom) in self.atoms().iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{atom}")?;
        }
        write!(f, "]")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Symbol(s) => write!(f, "{s}"),
            Expr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Expr::Array(array) => write!(f, "{array}"),
            Expr::Atom(atom) => write!(f, "{atom}"),
            Expr::Function(func) => write!(f, "{func}"),
        }
    }
}

// From trait implementations for Expr - enables .into() conversion
impl From<Atom> for Expr {
    fn from(atom: Atom) -> Self {
        Expr::Atom(atom)
    }
}

impl From<Number> for Expr {
    fn from(n: Number) -> Self {
        Expr::Atom(Atom::Number(n))
    }
}

impl From<Decimal> for Expr {
    fn from(d: Decimal) -> Self {
        Number::reduce(d).into()
    }
}

impl From<i64> for Expr {
    fn from(n: i64) -> Self {
        Number::Int(n).into()
    }
}

impl From<i32> for Expr {
    fn from(n: i32) -> Self {
        Number::Int(i64::from(n)).into()
    }
}

impl From<usize> for Expr {
    fn from(n: usize) -> Self {
        match i64::try_from(n) {
            Ok(n) => n.into(),
            Err(_) => Decimal::new(n.into(), 0).into(),
        }
    }
}

impl From<f64> for Expr {
    fn from(x: f64) -> Self {
        Number::Float(x).into()
    }
}

impl From<bool> for Expr {
    fn from(b: bool) -> Self {
        Expr::Atom(Atom::Bool(b))
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Atom(Atom::Str(Rc::from(s)))
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Atom(Atom::Str(Rc::from(s)))
    }
}

impl From<Array> for Expr {
    fn from(array: Array) -> Self {
        Expr::Array(Rc::new(array))
    }
}

impl From<Function> for Expr {
    fn from(func: Function) -> Self {
        Expr::Function(Rc::new(func))
    }
}

impl From<Rc<Function>> for Expr {
    fn from(func: Rc<Function>) -> Self {
        Expr::Function(func)
    }
}

impl From<HostObject> for Expr {
    fn from(obj: HostObject) -> Self {
        Expr::Atom(Atom::Object(obj))
    }
}

impl<T: Into<Expr>> From<Vec<T>> for Expr {
    fn from(v: Vec<T>) -> Self {
        Expr::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Expr>, const N: usize> From<[T; N]> for Expr {
    fn from(arr: [T; N]) -> Self {
        Expr::List(arr.into_iter().map(Into::into).collect())
    }
}

// Fallible conversions from `Expr` back into Rust types.

impl TryFrom<Expr> for i64 {
    type Error = Error;

    fn try_from(expr: Expr) -> Result<i64, Error> {
        match expr {
            Expr::Atom(Atom::Number(Number::Int(n))) => Ok(n),
            other => Err(Error::TypeError(format!(
                "expected integer, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Expr> for bool {
    type Error = Error;

    fn try_from(expr: Expr) -> Result<bool, Error> {
        match expr {
            Expr::Atom(Atom::Bool(b)) => Ok(b),
            other => Err(Error::TypeError(format!(
                "expected boolean, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Expr> for Number {
    type Error = Error;

    fn try_from(expr: Expr) -> Result<Number, Error> {
        match expr {
            Expr::Atom(Atom::Number(n)) => Ok(n),
            other => Err(Error::TypeError(format!(
                "expected number, got {}",
                other.type_name()
            ))),
        }
    }
}

impl TryFrom<Expr> for Rc<Function> {
    type Error = Error;

    fn try_from(expr: Expr) -> Result<Rc<Function>, Error> {
        match expr {
            Expr::Function(func) => Ok(func),
            other => Err(Error::TypeError(format!(
                "expected function, got {}",
                other.type_name()
            ))),
        }
    }
}

/// Helper function for creating symbols - works great in mixed lists!
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn sym<S: AsRef<str>>(name: S) -> Expr {
    Expr::Symbol(name.as_ref().to_owned())
}

/// Helper function for creating expressions from anything convertible
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn val<T: Into<Expr>>(value: T) -> Expr {
    value.into()
}

/// The empty list
#[cfg_attr(not(test), expect(dead_code))]
pub(crate) fn nil() -> Expr {
    Expr::nil()
}

#[cfg(test)]
mod helper_function_tests {
    use super::*;

    #[test]
    fn test_helper_functions_data_driven() {
        let test_cases = vec![
            (val(42), Expr::Atom(Atom::Number(Number::Int(42)))),
            (val(-17i32), Expr::Atom(Atom::Number(Number::Int(-17)))),
            (val(1.5), Expr::Atom(Atom::Number(Number::Float(1.5)))),
            (val(true), Expr::Atom(Atom::Bool(true))),
            (val("hello"), Expr::Atom(Atom::Str(Rc::from("hello")))),
            (sym("foo-bar?"), Expr::Symbol("foo-bar?".to_owned())),
            (sym(String::from("test")), Expr::Symbol("test".to_owned())),
            (nil(), Expr::list(vec![])),
            (
                val([1, 2, 3]),
                Expr::list(vec![val(1), val(2), val(3)]),
            ),
            (
                val(vec![sym("op"), val(42), val("result")]),
                Expr::list(vec![
                    Expr::Symbol("op".to_owned()),
                    val(42),
                    val("result"),
                ]),
            ),
        ];

        for (i, (actual, expected)) in test_cases.iter().enumerate() {
            assert_eq!(actual, expected, "Test case {} failed", i + 1);
        }
    }

    #[test]
    fn test_equality_is_variant_strict() {
        assert_ne!(val(1), val(1.0));
        assert_ne!(sym("a"), val("a"));
        assert_ne!(nil(), Expr::null());
        assert_eq!(val([1, 2]), val([1, 2]));
        assert_eq!(val("foo"), val("foo"));
    }

    #[test]
    fn test_identity() {
        let list = val([1, 2]);
        assert!(list.is_identical(&list.clone()));
        assert!(!list.is_identical(&val([1, 2])));

        let s = val("foo");
        assert!(s.is_identical(&s.clone()));
        assert!(!s.is_identical(&val("foo")));

        assert!(val(1).is_identical(&val(1)));
        assert!(sym("x").is_identical(&sym("x")));
        assert!(Expr::null().is_identical(&Expr::null()));
    }

    #[test]
    fn test_truthiness() {
        let test_cases = vec![
            (Expr::null(), false),
            (val(false), false),
            (nil(), false),
            (val(true), true),
            (val(0), true),
            (val(""), true),
            (val([0]), true),
            (val(Array::from_atoms(vec![])), true),
            (sym("x"), true),
        ];

        for (expr, expected) in test_cases {
            assert_eq!(expr.is_truthy(), expected, "truthiness of {expr}");
        }
    }

    #[test]
    fn test_array_kind_inference() {
        let int = |n| Atom::Number(Number::Int(n));
        let float = |x| Atom::Number(Number::Float(x));

        let test_cases = vec![
            (vec![], ArrayKind::Mixed),
            (vec![int(1), int(2)], ArrayKind::Int),
            (vec![float(1.5), float(2.0)], ArrayKind::Float),
            (vec![int(1), float(2.0)], ArrayKind::Mixed),
            (vec![Atom::Str(Rc::from("a")), Atom::Null], ArrayKind::Mixed),
        ];

        for (atoms, expected) in test_cases {
            let array = Array::from_atoms(atoms);
            assert_eq!(array.kind(), expected, "kind of {array}");
        }
    }

    #[test]
    fn test_display() {
        let test_cases = vec![
            (val(5), "5"),
            (val(-5), "-5"),
            (val(1.5), "1.5"),
            (val(2.0), "2.0"),
            (val(1e300), "1e300"),
            (val("a\"b\\c"), r#""a\"b\\c""#),
            (Expr::null(), "null"),
            (val(true), "true"),
            (nil(), "()"),
            (val([1, 2, 3]), "(1 2 3)"),
            (val(vec![sym("quote"), sym("x")]), "(quote x)"),
            (val(Array::from_atoms(vec![])), "[]"),
            (
                val(Array::Int(vec![1, 2, 3])),
                "[1 2 3]",
            ),
            (
                val(Array::Mixed(vec![Atom::Str(Rc::from("x")), Atom::Bool(false)])),
                "[\"x\" false]",
            ),
        ];

        for (expr, expected) in test_cases {
            assert_eq!(expr.to_string(), expected);
        }
    }
}
