//! Built-in operations registry.
//!
//! Every builtin is an ordinary Rust function with typed parameters, wired through
//! the same adapter layer used for custom registration (see
//! [`crate::evaluator::intooperation`]). The registry is built once and bound into
//! each environment created by [`crate::default_environment`].
//!
//! ```lisp
//! (+ 1 2.5)              ; arithmetic over the numeric tower
//! (< 1 2 3)              ; every later argument compared against the first
//! (cons 1 '(2 3))        ; list construction
//! (apply + 1 '(2 3))     ; a trailing list argument is spliced
//! ```
//!
//! ## Functions vs Special Forms
//!
//! Functions evaluate all arguments before application. Special forms (`def`,
//! `lambda`, `if`, `quote`, `progn`, `let*`) control evaluation of their operands and
//! are handled directly by the evaluator; they are not in this registry.
//!
//! `eval` and `exec` need the environment they were installed into and are added
//! by `default_environment` rather than listed here.
//!
//! ## Adding New Operations
//!
//! 1. **Implement the function** with typed parameters (`Expr`, `i64`, `Number`,
//!    `&str`, `Rc<Function>`, or an iterator such as `NumIter<'_>`)
//! 2. **Add to BUILTIN_OPS** with its name, parameter labels and arity
//! 3. **Add tests** covering edge cases and error conditions

use crate::Error;
use crate::ast::Expr;
use crate::evaluator::intooperation::{IntoOperation, IntoVariadicOperation, OperationFn};
use crate::evaluator::{Arity, NumIter, ValueIter};
use crate::function::Function;
use crate::numeric::{self, Number};
use std::rc::Rc;
use std::sync::{Arc, LazyLock};

/// Definition of a built-in operation
#[derive(Clone)]
pub struct BuiltinOp {
    /// The name the operation is bound to
    pub name: &'static str,
    /// Parameter-kind labels shown in the function's display form
    pub params: &'static [&'static str],
    /// The implementation, via the canonical erased builtin signature
    pub func: Arc<OperationFn>,
    /// Expected number of arguments
    pub arity: Arity,
}

impl std::fmt::Debug for BuiltinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinOp")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        // Names uniquely identify operations
        self.name == other.name
    }
}

//
// Builtin Function Implementations
//

// Comparisons coerce to f64 and hold when every later argument satisfies the
// relation against the first one.
macro_rules! numeric_comparison {
    ($name:ident, $op:tt) => {
        fn $name(first: Number, rest: NumIter<'_>) -> bool {
            let first = first.to_f64();
            rest.map(Number::to_f64).all(|n| first $op n)
        }
    };
}

numeric_comparison!(builtin_lt, <);
numeric_comparison!(builtin_gt, >);
numeric_comparison!(builtin_le, <=);
numeric_comparison!(builtin_ge, >=);

fn builtin_add(args: NumIter<'_>) -> Result<Number, Error> {
    numeric::sum(args)
}

fn builtin_sub(first: Number, rest: NumIter<'_>) -> Result<Number, Error> {
    numeric::difference(&first, rest)
}

fn builtin_mul(args: NumIter<'_>) -> Result<Number, Error> {
    numeric::product(args)
}

fn builtin_div(first: Number, rest: NumIter<'_>) -> Result<Number, Error> {
    numeric::quotient(&first, rest)
}

fn builtin_is(first: Expr, second: Expr) -> bool {
    first.is_identical(&second)
}

fn builtin_eq(first: Expr, second: Expr) -> bool {
    first.is_identical(&second) || first == second
}

fn builtin_car(mut list: ValueIter<'_>) -> Result<Expr, Error> {
    match list.next() {
        Some(first) => Ok(first.clone()),
        None => Err(Error::IndexOutOfRange { index: 0, len: 0 }),
    }
}

fn builtin_cdr(mut list: ValueIter<'_>) -> Result<Expr, Error> {
    let Some(_) = list.next() else {
        return Err(Error::IndexOutOfRange { index: 1, len: 0 });
    };

    Ok(Expr::list(list.cloned().collect()))
}

fn builtin_cons(first: Expr, rest: Expr) -> Expr {
    match rest {
        Expr::List(tail) => {
            let mut items = Vec::with_capacity(tail.len() + 1);
            items.push(first);
            items.extend_from_slice(&tail);
            Expr::list(items)
        }
        other => Expr::list(vec![first, other]),
    }
}

fn builtin_length(seq: Expr) -> Result<usize, Error> {
    match seq {
        Expr::List(items) => Ok(items.len()),
        Expr::Array(array) => Ok(array.len()),
        other => Err(Error::TypeError(format!(
            "expected list or array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_list(args: ValueIter<'_>) -> Expr {
    Expr::list(args.cloned().collect())
}

fn builtin_map(func: Rc<Function>, list: ValueIter<'_>) -> Result<Expr, Error> {
    let mapped = list
        .map(|item| func.invoke(vec![item.clone()]))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Expr::list(mapped))
}

fn builtin_nth(index: i64, seq: Expr) -> Result<Expr, Error> {
    let len = match &seq {
        Expr::List(items) => items.len(),
        Expr::Array(array) => array.len(),
        other => {
            return Err(Error::TypeError(format!(
                "expected list or array, got {}",
                other.type_name()
            )));
        }
    };
    let out_of_range = || Error::IndexOutOfRange { index, len };
    let position = usize::try_from(index).map_err(|_| out_of_range())?;

    match &seq {
        Expr::List(items) => items.get(position).cloned().ok_or_else(out_of_range),
        Expr::Array(array) => array.get(position).map(Expr::Atom).ok_or_else(out_of_range),
        _ => Err(out_of_range()),
    }
}

fn builtin_apply(func: Rc<Function>, args: ValueIter<'_>) -> Result<Expr, Error> {
    let mut call_args: Vec<Expr> = args.cloned().collect();
    if let Some(Expr::List(tail)) = call_args.last().cloned() {
        call_args.pop();
        call_args.extend_from_slice(&tail);
    }
    func.invoke(call_args)
}

fn builtin_parse(text: &str) -> Result<Expr, Error> {
    crate::parse(text)
}

/// Global registry of all built-in operations.
///
/// The underlying builtin implementations are wired through the same adapter layer
/// used for custom builtin registration. This is done once at initialization time
/// via a `LazyLock`.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    fn builtin_fixed<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoOperation<Args>,
    {
        <F as IntoOperation<Args>>::into_operation(f)
    }

    fn builtin_variadic<Args, F>(f: F) -> Arc<OperationFn>
    where
        F: IntoVariadicOperation<Args>,
    {
        <F as IntoVariadicOperation<Args>>::into_variadic_operation(f)
    }

    vec![
        // Arithmetic operations
        BuiltinOp {
            name: "+",
            params: &["numbers..."],
            func: builtin_variadic::<(NumIter<'static>,), _>(builtin_add),
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "-",
            params: &["number", "numbers..."],
            func: builtin_variadic::<(Number, NumIter<'static>), _>(builtin_sub),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: "*",
            params: &["numbers..."],
            func: builtin_variadic::<(NumIter<'static>,), _>(builtin_mul),
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "/",
            params: &["number", "numbers..."],
            func: builtin_variadic::<(Number, NumIter<'static>), _>(builtin_div),
            arity: Arity::AtLeast(1),
        },
        // Comparison operations
        BuiltinOp {
            name: "<",
            params: &["number", "numbers..."],
            func: builtin_variadic::<(Number, NumIter<'static>), _>(builtin_lt),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: ">",
            params: &["number", "numbers..."],
            func: builtin_variadic::<(Number, NumIter<'static>), _>(builtin_gt),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: "<=",
            params: &["number", "numbers..."],
            func: builtin_variadic::<(Number, NumIter<'static>), _>(builtin_le),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            name: ">=",
            params: &["number", "numbers..."],
            func: builtin_variadic::<(Number, NumIter<'static>), _>(builtin_ge),
            arity: Arity::AtLeast(1),
        },
        // Identity and equality
        BuiltinOp {
            name: "is",
            params: &["value", "value"],
            func: builtin_fixed::<(Expr, Expr), _>(builtin_is),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            name: "eq",
            params: &["value", "value"],
            func: builtin_fixed::<(Expr, Expr), _>(builtin_eq),
            arity: Arity::Exact(2),
        },
        // List operations
        BuiltinOp {
            name: "car",
            params: &["list"],
            func: builtin_fixed::<(ValueIter<'static>,), _>(builtin_car),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            name: "cdr",
            params: &["list"],
            func: builtin_fixed::<(ValueIter<'static>,), _>(builtin_cdr),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            name: "cons",
            params: &["value", "list"],
            func: builtin_fixed::<(Expr, Expr), _>(builtin_cons),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            name: "length",
            params: &["sequence"],
            func: builtin_fixed::<(Expr,), _>(builtin_length),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            name: "list",
            params: &["values..."],
            func: builtin_variadic::<(ValueIter<'static>,), _>(builtin_list),
            arity: Arity::Any,
        },
        BuiltinOp {
            name: "map",
            params: &["function", "list"],
            func: builtin_fixed::<(Rc<Function>, ValueIter<'static>), _>(builtin_map),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            name: "nth",
            params: &["int", "sequence"],
            func: builtin_fixed::<(i64, Expr), _>(builtin_nth),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            name: "apply",
            params: &["function", "values..."],
            func: builtin_variadic::<(Rc<Function>, ValueIter<'static>), _>(builtin_apply),
            arity: Arity::AtLeast(1),
        },
        // Reader access
        BuiltinOp {
            name: "parse",
            params: &["string"],
            func: builtin_fixed::<(&str,), _>(builtin_parse),
            arity: Arity::Exact(1),
        },
    ]
});

/// Get all builtin operations (for internal use by evaluator)
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}
