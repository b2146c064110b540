//! Bridge between programs and functions supplied by the embedding Rust program.
//!
//! Host functions see plain [`HostValue`]s instead of expression trees. A
//! [`HostCallable`] may be bound to a receiver [`HostObject`], which is how methods on
//! host types are exposed. Typed closures are adapted with [`host_fn`] and
//! [`host_method`]:
//!
//! ```
//! use littlelisp::host::host_fn;
//! use littlelisp::{default_environment, execute};
//!
//! let env = default_environment();
//! env.register_host_function("hypot", host_fn::<(f64, f64), _>(|a: f64, b: f64| a.hypot(b)));
//! assert_eq!(execute("(hypot 3 4)", &env).unwrap().to_string(), "5.0");
//! ```

use crate::Error;
use crate::ast::{Array, Atom, Expr};
use crate::evaluator::Arity;
use crate::function::Function;
use crate::numeric::{Decimal, Number};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An opaque value owned by the host. Clones share the same underlying value, and
/// identity (`is`) is pointer identity of that value.
#[derive(Clone)]
pub struct HostObject {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

impl HostObject {
    pub fn new<T: Any>(value: T) -> Self {
        HostObject {
            value: Rc::new(value),
            type_name: short_type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    /// Unqualified name of the wrapped type, e.g. `Counter` for `app::Counter<u8>`
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn ptr_eq(&self, other: &HostObject) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.value), Rc::as_ptr(&other.value))
    }
}

impl fmt::Debug for HostObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostObject({})", self.type_name)
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

/// Value representation seen by host functions
#[derive(Debug, Clone)]
pub enum HostValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A number too large for `i64` or too precise for `f64`
    Decimal(Decimal),
    Str(String),
    List(Vec<HostValue>),
    Array(Array),
    Object(HostObject),
    Function(Rc<Function>),
}

impl HostValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            HostValue::Null => "null",
            HostValue::Bool(_) => "boolean",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "double",
            HostValue::Decimal(_) => "decimal",
            HostValue::Str(_) => "string",
            HostValue::List(_) => "list",
            HostValue::Array(_) => "array",
            HostValue::Object(_) => "object",
            HostValue::Function(_) => "function",
        }
    }
}

impl From<&Atom> for HostValue {
    fn from(atom: &Atom) -> Self {
        match atom {
            Atom::Null => HostValue::Null,
            Atom::Bool(b) => HostValue::Bool(*b),
            Atom::Number(Number::Int(i)) => HostValue::Int(*i),
            Atom::Number(Number::Float(x)) => HostValue::Float(*x),
            Atom::Number(Number::Big(d)) => HostValue::Decimal(d.clone()),
            Atom::Str(s) => HostValue::Str(s.to_string()),
            Atom::Object(obj) => HostValue::Object(obj.clone()),
        }
    }
}

impl From<&Expr> for HostValue {
    fn from(expr: &Expr) -> Self {
        match expr {
            Expr::Symbol(name) => HostValue::Str(name.clone()),
            Expr::List(items) => HostValue::List(items.iter().map(HostValue::from).collect()),
            Expr::Array(array) => HostValue::Array((**array).clone()),
            Expr::Atom(atom) => HostValue::from(atom),
            Expr::Function(func) => HostValue::Function(Rc::clone(func)),
        }
    }
}

impl From<HostValue> for Expr {
    fn from(value: HostValue) -> Self {
        match value {
            HostValue::Null => Expr::null(),
            HostValue::Bool(b) => b.into(),
            HostValue::Int(i) => i.into(),
            HostValue::Float(x) => x.into(),
            HostValue::Decimal(d) => d.into(),
            HostValue::Str(s) => s.into(),
            HostValue::List(items) => Expr::list(items.into_iter().map(Expr::from).collect()),
            HostValue::Array(array) => array.into(),
            HostValue::Object(obj) => obj.into(),
            HostValue::Function(func) => func.into(),
        }
    }
}

/// A function provided by the host program.
///
/// `receiver` is the object the function was bound to, if any.
pub trait HostCallable {
    /// Display labels of the parameters, e.g. `["int", "int"]`
    fn parameter_kinds(&self) -> Vec<String>;

    fn call(&self, receiver: Option<&HostObject>, args: Vec<HostValue>)
    -> Result<HostValue, Error>;
}

/// A named host callable, optionally bound to a receiver
#[derive(Clone)]
pub struct HostFunction {
    name: String,
    receiver: Option<HostObject>,
    callable: Rc<dyn HostCallable>,
}

impl HostFunction {
    pub fn new(name: impl Into<String>, callable: impl HostCallable + 'static) -> Self {
        HostFunction {
            name: name.into(),
            receiver: None,
            callable: Rc::new(callable),
        }
    }

    /// Bind this function to `receiver`, replacing any previous binding
    pub fn bound(self, receiver: HostObject) -> Self {
        HostFunction {
            receiver: Some(receiver),
            ..self
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn receiver(&self) -> Option<&HostObject> {
        self.receiver.as_ref()
    }

    pub fn parameter_kinds(&self) -> Vec<String> {
        self.callable.parameter_kinds()
    }

    pub fn invoke(&self, args: Vec<Expr>) -> Result<Expr, Error> {
        let args = args.iter().map(HostValue::from).collect();
        match self.callable.call(self.receiver.as_ref(), args) {
            Ok(value) => Ok(value.into()),
            Err(Error::Host { source, .. }) => Err(Error::Host {
                function: self.name.clone(),
                source,
            }),
            Err(other) => Err(other),
        }
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("receiver", &self.receiver)
            .finish_non_exhaustive()
    }
}

// The function name is filled in by `HostFunction::invoke`.
fn failure(source: BoxError) -> Error {
    Error::Host {
        function: String::new(),
        source,
    }
}

// =====================================================================
// Parameter and return conversions
// =====================================================================

/// Conversion from a host value into a typed closure parameter
pub trait FromHost: Sized {
    /// Label shown in the function's display form
    const KIND: &'static str;

    fn from_host(value: HostValue) -> Result<Self, Error>;
}

fn mismatch(kind: &str, value: &HostValue) -> Error {
    Error::TypeError(format!("expected {kind}, got {}", value.type_name()))
}

impl FromHost for HostValue {
    const KIND: &'static str = "value";

    fn from_host(value: HostValue) -> Result<Self, Error> {
        Ok(value)
    }
}

impl FromHost for i64 {
    const KIND: &'static str = "int";

    fn from_host(value: HostValue) -> Result<Self, Error> {
        match value {
            HostValue::Int(i) => Ok(i),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromHost for u32 {
    const KIND: &'static str = "int";

    fn from_host(value: HostValue) -> Result<Self, Error> {
        match value {
            HostValue::Int(i) => u32::try_from(i)
                .map_err(|_| Error::TypeError(format!("{i} is out of range for an unsigned int"))),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromHost for f64 {
    const KIND: &'static str = "double";

    fn from_host(value: HostValue) -> Result<Self, Error> {
        match value {
            HostValue::Float(x) => Ok(x),
            HostValue::Int(i) => Ok(i as f64),
            HostValue::Decimal(d) => Ok(d.to_f64()),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromHost for bool {
    const KIND: &'static str = "boolean";

    fn from_host(value: HostValue) -> Result<Self, Error> {
        match value {
            HostValue::Bool(b) => Ok(b),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromHost for String {
    const KIND: &'static str = "string";

    fn from_host(value: HostValue) -> Result<Self, Error> {
        match value {
            HostValue::Str(s) => Ok(s),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromHost for HostObject {
    const KIND: &'static str = "object";

    fn from_host(value: HostValue) -> Result<Self, Error> {
        match value {
            HostValue::Object(obj) => Ok(obj),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

impl FromHost for Vec<HostValue> {
    const KIND: &'static str = "list";

    fn from_host(value: HostValue) -> Result<Self, Error> {
        match value {
            HostValue::List(items) => Ok(items),
            HostValue::Array(array) => Ok(array.atoms().iter().map(HostValue::from).collect()),
            other => Err(mismatch(Self::KIND, &other)),
        }
    }
}

/// Conversion from a closure's return value into a host value
pub trait IntoHost {
    fn into_host(self) -> HostValue;
}

impl IntoHost for HostValue {
    fn into_host(self) -> HostValue {
        self
    }
}

impl IntoHost for () {
    fn into_host(self) -> HostValue {
        HostValue::Null
    }
}

impl IntoHost for i64 {
    fn into_host(self) -> HostValue {
        HostValue::Int(self)
    }
}

impl IntoHost for i32 {
    fn into_host(self) -> HostValue {
        HostValue::Int(self.into())
    }
}

impl IntoHost for u32 {
    fn into_host(self) -> HostValue {
        HostValue::Int(self.into())
    }
}

impl IntoHost for f64 {
    fn into_host(self) -> HostValue {
        HostValue::Float(self)
    }
}

impl IntoHost for bool {
    fn into_host(self) -> HostValue {
        HostValue::Bool(self)
    }
}

impl IntoHost for String {
    fn into_host(self) -> HostValue {
        HostValue::Str(self)
    }
}

impl IntoHost for &str {
    fn into_host(self) -> HostValue {
        HostValue::Str(self.to_owned())
    }
}

impl IntoHost for HostObject {
    fn into_host(self) -> HostValue {
        HostValue::Object(self)
    }
}

impl<T: IntoHost> IntoHost for Vec<T> {
    fn into_host(self) -> HostValue {
        HostValue::List(self.into_iter().map(IntoHost::into_host).collect())
    }
}

impl<T: IntoHost> IntoHost for Option<T> {
    fn into_host(self) -> HostValue {
        self.map_or(HostValue::Null, IntoHost::into_host)
    }
}

/// Normalizes closure return types to `Result<HostValue, Error>`.
///
/// Plain values convert directly; `Err` values of any error type become
/// [`Error::Host`] carrying the original error as its source.
pub trait IntoHostResult {
    fn into_host_result(self) -> Result<HostValue, Error>;
}

impl<T: IntoHost> IntoHostResult for T {
    fn into_host_result(self) -> Result<HostValue, Error> {
        Ok(self.into_host())
    }
}

impl<T, E> IntoHostResult for Result<T, E>
where
    T: IntoHost,
    E: Into<BoxError>,
{
    fn into_host_result(self) -> Result<HostValue, Error> {
        self.map(IntoHost::into_host).map_err(|e| failure(e.into()))
    }
}

// =====================================================================
// Typed adapters
// =====================================================================

/// A Rust closure adapted to [`HostCallable`]; see [`host_fn`]
pub struct TypedHostFn<Args, F> {
    func: F,
    _args: PhantomData<fn(Args)>,
}

/// Adapt a closure taking up to four [`FromHost`] parameters.
///
/// The parameter tuple is given explicitly: `host_fn::<(i64, u32), _>(..)`.
pub fn host_fn<Args, F>(func: F) -> TypedHostFn<Args, F>
where
    TypedHostFn<Args, F>: HostCallable,
{
    TypedHostFn {
        func,
        _args: PhantomData,
    }
}

impl<F, R> HostCallable for TypedHostFn<(), F>
where
    F: Fn() -> R,
    R: IntoHostResult,
{
    fn parameter_kinds(&self) -> Vec<String> {
        Vec::new()
    }

    fn call(
        &self,
        _receiver: Option<&HostObject>,
        args: Vec<HostValue>,
    ) -> Result<HostValue, Error> {
        if !args.is_empty() {
            return Err(Error::arity(Arity::Exact(0), args.len()));
        }
        (self.func)().into_host_result()
    }
}

macro_rules! impl_host_callable_for_arity {
    ($n:literal; $( $v:ident : $A:ident ),+) => {
        impl<F, R, $( $A ),+> HostCallable for TypedHostFn<( $( $A, )+ ), F>
        where
            F: Fn( $( $A ),+ ) -> R,
            $( $A: FromHost, )+
            R: IntoHostResult,
        {
            fn parameter_kinds(&self) -> Vec<String> {
                vec![ $( $A::KIND.to_owned() ),+ ]
            }

            fn call(
                &self,
                _receiver: Option<&HostObject>,
                args: Vec<HostValue>,
            ) -> Result<HostValue, Error> {
                let [ $( $v ),+ ]: [HostValue; $n] = args
                    .try_into()
                    .map_err(|args: Vec<HostValue>| Error::arity(Arity::Exact($n), args.len()))?;
                (self.func)( $( $A::from_host($v)? ),+ ).into_host_result()
            }
        }
    };
}

impl_host_callable_for_arity!(1; a: A1);
impl_host_callable_for_arity!(2; a: A1, b: A2);
impl_host_callable_for_arity!(3; a: A1, b: A2, c: A3);
impl_host_callable_for_arity!(4; a: A1, b: A2, c: A3, d: A4);

/// A method on host type `T`; see [`host_method`]
pub struct HostMethod<T, F> {
    kinds: Vec<String>,
    func: F,
    _receiver: PhantomData<fn(&T)>,
}

/// Adapt a closure receiving the bound `T` receiver and the raw arguments.
///
/// `kinds` labels the parameters and fixes the arity. Calling the method unbound, or
/// bound to an object of another type, is a type error.
pub fn host_method<T, F>(kinds: &[&str], func: F) -> HostMethod<T, F>
where
    T: Any,
    F: Fn(&T, Vec<HostValue>) -> Result<HostValue, Error>,
{
    HostMethod {
        kinds: kinds.iter().map(|&k| k.to_owned()).collect(),
        func,
        _receiver: PhantomData,
    }
}

impl<T, F> HostCallable for HostMethod<T, F>
where
    T: Any,
    F: Fn(&T, Vec<HostValue>) -> Result<HostValue, Error>,
{
    fn parameter_kinds(&self) -> Vec<String> {
        self.kinds.clone()
    }

    fn call(&self, receiver: Option<&HostObject>, args: Vec<HostValue>) -> Result<HostValue, Error> {
        let receiver = receiver
            .ok_or_else(|| Error::TypeError("method called without a receiver".to_owned()))?;
        let target = receiver.downcast_ref::<T>().ok_or_else(|| {
            Error::TypeError(format!(
                "expected receiver of type {}, got {}",
                short_type_name::<T>(),
                receiver.type_name()
            ))
        })?;
        if args.len() != self.kinds.len() {
            return Err(Error::arity(Arity::Exact(self.kinds.len()), args.len()));
        }
        (self.func)(target, args)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{nil, val};
    use std::cell::Cell;

    struct Counter {
        hits: Cell<i64>,
    }

    fn to_radix(mut n: i64, radix: u32) -> Result<String, String> {
        if !(2..=36).contains(&radix) {
            return Err(format!("unsupported radix {radix}"));
        }
        if n == 0 {
            return Ok("0".to_owned());
        }
        let negative = n < 0;
        let mut digits = Vec::new();
        while n != 0 {
            let digit = (n % i64::from(radix)).unsigned_abs();
            digits.push(std::char::from_digit(u32::try_from(digit).unwrap(), radix).unwrap());
            n /= i64::from(radix);
        }
        if negative {
            digits.push('-');
        }
        Ok(digits.iter().rev().collect())
    }

    fn to_string_fn() -> HostFunction {
        HostFunction::new("toString", host_fn::<(i64, u32), _>(to_radix))
    }

    #[test]
    fn test_short_type_names() {
        assert_eq!(HostObject::new(Counter { hits: Cell::new(0) }).type_name(), "Counter");
        assert_eq!(HostObject::new(vec![1_u8]).type_name(), "Vec");
        assert_eq!(HostObject::new(5_i64).type_name(), "i64");
    }

    #[test]
    fn test_object_identity() {
        let a = HostObject::new(1_i64);
        let b = a.clone();
        let c = HostObject::new(1_i64);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.downcast_ref::<i64>(), Some(&1));
        assert!(a.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_typed_host_fn() {
        let f = to_string_fn();
        assert_eq!(f.parameter_kinds(), vec!["int", "int"]);
        assert_eq!(f.invoke(vec![val(11), val(16)]).unwrap(), val("b"));
        assert_eq!(f.invoke(vec![val(-255), val(16)]).unwrap(), val("-ff"));

        let err = f.invoke(vec![val(11)]).unwrap_err();
        assert!(matches!(err, Error::Arity { got: 1, .. }), "{err:?}");

        let err = f.invoke(vec![val("11"), val(16)]).unwrap_err();
        assert!(matches!(err, Error::TypeError(_)), "{err:?}");

        let err = f.invoke(vec![val(11), val(-1)]).unwrap_err();
        assert!(matches!(err, Error::TypeError(_)), "{err:?}");
    }

    #[test]
    fn test_host_failure_names_function() {
        let err = to_string_fn().invoke(vec![val(11), val(99)]).unwrap_err();
        match &err {
            Error::Host { function, source } => {
                assert_eq!(function, "toString");
                assert_eq!(source.to_string(), "unsupported radix 99");
            }
            other => panic!("expected host error, got {other:?}"),
        }
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_return_conversions() {
        let unit = HostFunction::new("noop", host_fn::<(), _>(|| {}));
        assert_eq!(unit.invoke(vec![]).unwrap(), Expr::null());

        let listing = HostFunction::new(
            "range",
            host_fn::<(i64,), _>(|n: i64| (0..n).collect::<Vec<i64>>()),
        );
        assert_eq!(listing.invoke(vec![val(3)]).unwrap(), val([0, 1, 2]));
        assert_eq!(listing.invoke(vec![val(0)]).unwrap(), nil());

        let maybe = HostFunction::new(
            "positive",
            host_fn::<(i64,), _>(|n: i64| (n > 0).then_some(n)),
        );
        assert_eq!(maybe.invoke(vec![val(-1)]).unwrap(), Expr::null());

        let ints_as_doubles = HostFunction::new(
            "half",
            host_fn::<(f64,), _>(|x: f64| x / 2.0),
        );
        assert_eq!(ints_as_doubles.invoke(vec![val(3)]).unwrap(), val(1.5));
    }

    #[test]
    fn test_bound_method() {
        let counter = HostObject::new(Counter { hits: Cell::new(0) });
        let bump = host_method::<Counter, _>(&["int"], |c: &Counter, args: Vec<HostValue>| {
            let step = i64::from_host(args.into_iter().next().unwrap_or(HostValue::Null))?;
            c.hits.set(c.hits.get() + step);
            Ok(HostValue::Int(c.hits.get()))
        });
        let unbound = HostFunction::new("bump", bump);
        let bound = unbound.clone().bound(counter.clone());

        assert_eq!(bound.invoke(vec![val(2)]).unwrap(), val(2));
        assert_eq!(bound.invoke(vec![val(3)]).unwrap(), val(5));
        assert_eq!(counter.downcast_ref::<Counter>().unwrap().hits.get(), 5);

        assert!(matches!(unbound.invoke(vec![val(1)]), Err(Error::TypeError(_))));
        assert!(matches!(bound.invoke(vec![]), Err(Error::Arity { .. })));

        let wrong = unbound.bound(HostObject::new("not a counter"));
        assert!(matches!(wrong.invoke(vec![val(1)]), Err(Error::TypeError(_))));
    }

    #[test]
    fn test_value_conversions() {
        let expr = Expr::list(vec![
            Expr::Symbol("sym".to_owned()),
            val(1.5),
            val(true),
            Expr::null(),
        ]);
        let host = HostValue::from(&expr);
        match &host {
            HostValue::List(items) => {
                assert!(matches!(&items[0], HostValue::Str(s) if s == "sym"));
                assert!(matches!(items[1], HostValue::Float(x) if x == 1.5));
                assert!(matches!(items[2], HostValue::Bool(true)));
                assert!(matches!(items[3], HostValue::Null));
            }
            other => panic!("expected list, got {other:?}"),
        }

        let big = Decimal::parse("9223372036854775808").unwrap();
        let back = Expr::from(HostValue::Decimal(big.clone()));
        assert_eq!(back, Expr::from(big));
        assert_eq!(Expr::from(HostValue::Decimal(Decimal::parse("42.0").unwrap())), val(42));
    }
}
