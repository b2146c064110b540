use crate::Error;
use crate::ast::{Atom, Expr};
use crate::evaluator::Arity;
use crate::function::Function;
use crate::numeric::Number;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

// Adapters from typed Rust fns to `OperationFn`. Callers go through the
// `Environment::register_*` methods; only the iterator types are re-exported.

/// Erased native signature. The argument vector is owned so adapters can move
/// values out of it.
pub(crate) type OperationFn = dyn Fn(Vec<Expr>) -> Result<Expr, Error> + Send + Sync;

// ---------------------------------------------------------------------
// Parameter conversion
// ---------------------------------------------------------------------

/// A Rust parameter type a native can declare.
///
/// `Param<'a>` may borrow from the argument slot it was converted from.
pub trait FromParam {
    /// The parameter type as seen by the builtin
    type Param<'a>;

    /// Label shown in the function's display form
    const KIND: &'static str;

    /// Borrows (`&str`, list iterators) or takes the argument.
    fn from_arg<'a>(value: &'a mut Expr) -> Result<Self::Param<'a>, Error>;
}

impl FromParam for Expr {
    type Param<'a> = Expr;

    const KIND: &'static str = "value";

    fn from_arg<'a>(value: &'a mut Expr) -> Result<Self::Param<'a>, Error> {
        // Taken, not cloned: `is` must still see the same payload.
        Ok(std::mem::replace(value, Expr::null()))
    }
}

// By-value parameters obtained through `TryFrom<Expr>` (see `ast.rs`).
macro_rules! impl_from_param_by_value {
    ($( $T:ty => $kind:literal ),+ $(,)?) => {
        $(
            impl FromParam for $T {
                type Param<'a> = $T;

                const KIND: &'static str = $kind;

                fn from_arg<'a>(value: &'a mut Expr) -> Result<Self::Param<'a>, Error> {
                    let owned = std::mem::replace(value, Expr::null());
                    <$T>::try_from(owned)
                }
            }
        )+
    };
}

impl_from_param_by_value!(
    i64 => "int",
    bool => "boolean",
    Number => "number",
    Rc<Function> => "function",
);

impl FromParam for &str {
    type Param<'a> = &'a str;

    const KIND: &'static str = "string";

    fn from_arg<'a>(value: &'a mut Expr) -> Result<Self::Param<'a>, Error> {
        if let Expr::Atom(Atom::Str(s)) = value {
            Ok(&**s)
        } else {
            Err(Error::TypeError(format!(
                "expected string, got {}",
                value.type_name()
            )))
        }
    }
}

// List arguments as iterator parameters

impl<'b, K> FromParam for TypedValueIter<'b, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    const KIND: &'static str = "list";

    fn from_arg<'a>(value: &'a mut Expr) -> Result<Self::Param<'a>, Error> {
        if let Expr::List(items) = value {
            TypedValueIter::<K>::new(&**items)
        } else {
            Err(Error::TypeError(format!(
                "expected list, got {}",
                value.type_name()
            )))
        }
    }
}

// ---------------------------------------------------------------------
// Typed slice iterators
// ---------------------------------------------------------------------

/// Element type of a [`TypedValueIter`]: validates the whole slice once, then
/// projects each element.
#[doc(hidden)]
pub trait ValueElementKind {
    type Item<'a>;

    /// Label for a rest parameter of this kind
    const REST: &'static str;

    fn precheck(slice: &[Expr]) -> Result<(), Error>;
    fn project<'a>(v: &'a Expr) -> Self::Item<'a>;
}

/// Iterator over a slice of arguments or list items, typed by `K`
#[doc(hidden)]
pub struct TypedValueIter<'a, K: ValueElementKind> {
    inner: std::slice::Iter<'a, Expr>,
    _marker: PhantomData<K>,
}

impl<'a, K> TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    pub(crate) fn new(values: &'a [Expr]) -> Result<Self, Error> {
        K::precheck(values)?;
        Ok(TypedValueIter {
            inner: values.iter(),
            _marker: PhantomData,
        })
    }
}

impl<'a, K> Iterator for TypedValueIter<'a, K>
where
    K: ValueElementKind,
{
    type Item = K::Item<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let v = self.inner.next()?;
        Some(K::project(v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, K> ExactSizeIterator for TypedValueIter<'a, K> where K: ValueElementKind {}
impl<'a, K> FusedIterator for TypedValueIter<'a, K> where K: ValueElementKind {}

// Element kinds

/// Any value, by reference
#[doc(hidden)]
pub struct ValueKind;

impl ValueElementKind for ValueKind {
    type Item<'a> = &'a Expr;

    const REST: &'static str = "values...";

    fn precheck(_slice: &[Expr]) -> Result<(), Error> {
        Ok(())
    }

    fn project<'a>(v: &'a Expr) -> Self::Item<'a> {
        v
    }
}

#[doc(hidden)]
pub struct NumberKind;

impl ValueElementKind for NumberKind {
    type Item<'a> = &'a Number;

    const REST: &'static str = "numbers...";

    fn precheck(slice: &[Expr]) -> Result<(), Error> {
        match slice
            .iter()
            .find(|v| !matches!(v, Expr::Atom(Atom::Number(_))))
        {
            Some(v) => Err(Error::TypeError(format!(
                "expected number, got {}",
                v.type_name()
            ))),
            None => Ok(()),
        }
    }

    fn project<'a>(v: &'a Expr) -> Self::Item<'a> {
        if let Expr::Atom(Atom::Number(n)) = v {
            n
        } else {
            debug_assert!(false, "NumberKind::project saw non-number after precheck");
            unreachable!("NumberKind invariant violated")
        }
    }
}

#[doc(hidden)]
pub struct StringKind;

impl ValueElementKind for StringKind {
    type Item<'a> = &'a str;

    const REST: &'static str = "strings...";

    fn precheck(slice: &[Expr]) -> Result<(), Error> {
        match slice
            .iter()
            .find(|v| !matches!(v, Expr::Atom(Atom::Str(_))))
        {
            Some(v) => Err(Error::TypeError(format!(
                "expected string, got {}",
                v.type_name()
            ))),
            None => Ok(()),
        }
    }

    fn project<'a>(v: &'a Expr) -> Self::Item<'a> {
        if let Expr::Atom(Atom::Str(s)) = v {
            &**s
        } else {
            debug_assert!(false, "StringKind::project saw non-string after precheck");
            unreachable!("StringKind invariant violated")
        }
    }
}

/// Items of a list argument (or the rest arguments), unconverted.
pub type ValueIter<'a> = TypedValueIter<'a, ValueKind>;

/// Borrowed iterator over numeric arguments. Every element is checked
/// up front, so a non-number anywhere fails before the builtin runs.
pub type NumIter<'a> = TypedValueIter<'a, NumberKind>;

/// Borrowed iterator over string arguments, checked like [`NumIter`].
pub type StringIter<'a> = TypedValueIter<'a, StringKind>;

// ---------------------------------------------------------------------
// Rest parameters
// ---------------------------------------------------------------------

/// Builds the trailing parameter of a variadic native from the remaining arguments
pub trait FromRest {
    type Param<'a>;

    const KIND: &'static str;

    fn from_rest<'a>(slice: &'a [Expr]) -> Result<Self::Param<'a>, Error>;
}

impl<K> FromRest for TypedValueIter<'static, K>
where
    K: ValueElementKind,
{
    type Param<'a> = TypedValueIter<'a, K>;

    const KIND: &'static str = K::REST;

    fn from_rest<'a>(slice: &'a [Expr]) -> Result<Self::Param<'a>, Error> {
        TypedValueIter::<K>::new(slice)
    }
}

// ---------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------

/// Return types a native may use: `T` or `Result<T, Error>` for `T: Into<Expr>`
pub trait IntoExprResult {
    fn into_expr_result(self) -> Result<Expr, Error>;
}

impl<T> IntoExprResult for Result<T, Error>
where
    T: Into<Expr>,
{
    fn into_expr_result(self) -> Result<Expr, Error> {
        self.map(Into::into)
    }
}

impl<T> IntoExprResult for T
where
    T: Into<Expr>,
{
    fn into_expr_result(self) -> Result<Expr, Error> {
        Ok(self.into())
    }
}

/// A fixed-arity typed fn; `Args` is its parameter tuple.
pub trait IntoOperation<Args> {
    fn into_operation(self) -> Arc<OperationFn>;

    /// Display labels of the parameters, in order
    fn parameter_kinds() -> Vec<&'static str>;
}

/// A typed fn whose last parameter is a `ValueIter`, `NumIter` or `StringIter`
/// over the remaining arguments.
pub trait IntoVariadicOperation<Args> {
    fn into_variadic_operation(self) -> Arc<OperationFn>;

    /// Display labels of the parameters, the rest parameter last
    fn parameter_kinds() -> Vec<&'static str>;
}

// ---------------------------------------------------------------------
// Variadic adapters
// ---------------------------------------------------------------------

// Rest parameter only
impl<F, I, R> IntoVariadicOperation<(I,)> for F
where
    I: FromRest,
    F: for<'a> Fn(<I as FromRest>::Param<'a>) -> R + Send + Sync + 'static,
    R: IntoExprResult,
{
    fn into_variadic_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Expr>| {
            let rest_param: <I as FromRest>::Param<'_> = <I as FromRest>::from_rest(&args[..])?;
            let result: R = (self)(rest_param);
            result.into_expr_result()
        })
    }

    fn parameter_kinds() -> Vec<&'static str> {
        vec![I::KIND]
    }
}

// `$prefix` leading parameters, then the rest
macro_rules! impl_into_variadic_operation_for_prefix_and_rest {
    ($prefix:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, I, R, $( $A ),+> IntoVariadicOperation<( $( $A, )+ I, )> for F
        where
            I: FromRest,
            $( $A: FromParam, )+
            F: for<'a> Fn(
                    $( <$A as FromParam>::Param<'a> ),+,
                    <I as FromRest>::Param<'a>,
                ) -> R
                + Send
                + Sync
                + 'static,
            R: IntoExprResult,
        {
            fn into_variadic_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Expr>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+, ref mut rest @ .. ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let rest_param: <I as FromRest>::Param<'_> =
                                <I as FromRest>::from_rest(&*rest)?;

                            let result: R = (self)( $( $p ),+, rest_param );
                            result.into_expr_result()
                        }
                        _ => Err(Error::arity(Arity::AtLeast($prefix), len)),
                    }
                })
            }

            fn parameter_kinds() -> Vec<&'static str> {
                vec![ $( <$A as FromParam>::KIND, )+ I::KIND ]
            }
        }
    };
}

impl_into_variadic_operation_for_prefix_and_rest!(1, v0, p0: A1);
impl_into_variadic_operation_for_prefix_and_rest!(2, v0, p0: A1, v1, p1: A2);
impl_into_variadic_operation_for_prefix_and_rest!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);

// ---------------------------------------------------------------------
// Fixed-arity adapters
// ---------------------------------------------------------------------

// Checks the count, then splits the owned arguments into one slot per
// parameter so each conversion may borrow or take its slot.
macro_rules! impl_into_operation_for_arity {
    ($arity:expr, $( $v:ident, $p:ident : $A:ident ),+ ) => {
        impl<F, R, $( $A ),+> IntoOperation<( $( $A, )+ )> for F
        where
            F: for<'a> Fn( $( <$A as FromParam>::Param<'a> ),+ ) -> R
                + Send
                + Sync
                + 'static,
            $( $A: FromParam, )+
            R: IntoExprResult,
        {
            fn into_operation(self) -> Arc<OperationFn> {
                Arc::new(move |mut args: Vec<Expr>| {
                    let len = args.len();
                    match args.as_mut_slice() {
                        &mut [ $( ref mut $v ),+ ] => {
                            $(
                                let $p: <$A as FromParam>::Param<'_> =
                                    <$A as FromParam>::from_arg($v)?;
                            )+

                            let result: R = (self)( $( $p ),+ );
                            result.into_expr_result()
                        }
                        _ => Err(Error::arity(Arity::Exact($arity), len)),
                    }
                })
            }

            fn parameter_kinds() -> Vec<&'static str> {
                vec![ $( <$A as FromParam>::KIND ),+ ]
            }
        }
    };
}

// No parameters
impl<F, R> IntoOperation<()> for F
where
    F: Fn() -> R + Send + Sync + 'static,
    R: IntoExprResult,
{
    fn into_operation(self) -> Arc<OperationFn> {
        Arc::new(move |args: Vec<Expr>| {
            if !args.is_empty() {
                return Err(Error::arity(Arity::Exact(0), args.len()));
            }

            let result: R = (self)();
            result.into_expr_result()
        })
    }

    fn parameter_kinds() -> Vec<&'static str> {
        Vec::new()
    }
}

impl_into_operation_for_arity!(1, v0, p0: A1);
impl_into_operation_for_arity!(2, v0, p0: A1, v1, p1: A2);
impl_into_operation_for_arity!(3, v0, p0: A1, v1, p1: A2, v2, p2: A3);
impl_into_operation_for_arity!(4, v0, p0: A1, v1, p1: A2, v2, p2: A3, v3, p3: A4);
impl_into_operation_for_arity!(5, v0, p0: A1, v1, p1: A2, v2, p2: A3, v3, p3: A4, v4, p4: A5);
