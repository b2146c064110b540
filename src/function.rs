//! Callable values: native builtins, closures and host functions

use crate::Error;
use crate::ast::Expr;
use crate::builtinops::BuiltinOp;
use crate::evaluator::{Arity, Environment, eval_sequence};
use crate::host::HostFunction;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

/// Erased signature of a native function
pub type NativeFn = dyn Fn(Vec<Expr>) -> Result<Expr, Error>;

/// A builtin implemented in Rust
#[derive(Clone)]
pub struct NativeFunction {
    name: String,
    /// Parameter-kind labels, used only for display
    params: Vec<String>,
    arity: Arity,
    func: Rc<NativeFn>,
}

impl NativeFunction {
    pub fn new(
        name: impl Into<String>,
        params: &[&str],
        arity: Arity,
        func: impl Fn(Vec<Expr>) -> Result<Expr, Error> + 'static,
    ) -> Self {
        NativeFunction {
            name: name.into(),
            params: params.iter().map(|&p| p.to_owned()).collect(),
            arity,
            func: Rc::new(func),
        }
    }

    pub(crate) fn from_builtin(op: &BuiltinOp) -> Self {
        let inner = Arc::clone(&op.func);
        NativeFunction {
            name: op.name.to_owned(),
            params: op.params.iter().map(|&p| p.to_owned()).collect(),
            arity: op.arity,
            func: Rc::new(move |args: Vec<Expr>| inner(args)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    pub fn invoke(&self, args: Vec<Expr>) -> Result<Expr, Error> {
        self.arity.validate(args.len())?;
        (self.func)(args)
    }
}

/// A closure created by `lambda`
#[derive(Clone)]
pub struct Lambda {
    params: Vec<String>,
    body: Rc<[Expr]>,
    env: Environment,
}

impl Lambda {
    /// `params` must be distinct; the evaluator checks this when reading `lambda` forms.
    pub fn new(params: Vec<String>, body: Rc<[Expr]>, env: Environment) -> Self {
        Lambda { params, body, env }
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn invoke(&self, args: Vec<Expr>) -> Result<Expr, Error> {
        if args.len() != self.params.len() {
            return Err(Error::arity(Arity::Exact(self.params.len()), args.len()));
        }

        let scope = Environment::with_parent(&self.env);
        for (param, arg) in self.params.iter().zip(args) {
            scope.bind(param, arg);
        }
        eval_sequence(&self.body, &scope)
    }
}

/// Any value that can appear in call position
#[derive(Clone)]
pub enum Function {
    Native(NativeFunction),
    Lambda(Lambda),
    Host(HostFunction),
}

impl Function {
    pub fn invoke(&self, args: Vec<Expr>) -> Result<Expr, Error> {
        match self {
            Function::Native(native) => native.invoke(args),
            Function::Lambda(lambda) => lambda.invoke(args),
            Function::Host(host) => host.invoke(args),
        }
    }

    /// Names shown between the parentheses of the display form
    pub fn parameter_names(&self) -> Vec<String> {
        match self {
            Function::Native(native) => native.params.clone(),
            Function::Lambda(lambda) => lambda.params.clone(),
            Function::Host(host) => host.parameter_kinds(),
        }
    }

    /// The registered name; closures are anonymous
    pub fn name(&self) -> Option<&str> {
        match self {
            Function::Native(native) => Some(native.name()),
            Function::Lambda(_) => None,
            Function::Host(host) => Some(host.name()),
        }
    }
}

impl From<NativeFunction> for Function {
    fn from(native: NativeFunction) -> Self {
        Function::Native(native)
    }
}

impl From<Lambda> for Function {
    fn from(lambda: Lambda) -> Self {
        Function::Lambda(lambda)
    }
}

impl From<HostFunction> for Function {
    fn from(host: HostFunction) -> Self {
        Function::Host(host)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.parameter_names().join(","))
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use crate::host::host_fn;

    #[test]
    fn test_display_forms() {
        let env = Environment::new();
        let test_cases: Vec<(Function, &str)> = vec![
            (
                Lambda::new(vec![], Rc::from(vec![]), env.clone()).into(),
                "Function()",
            ),
            (
                Lambda::new(
                    vec!["x".into(), "y".into(), "z".into()],
                    Rc::from(vec![sym("x")]),
                    env.clone(),
                )
                .into(),
                "Function(x,y,z)",
            ),
            (
                NativeFunction::new("first", &["list"], Arity::Exact(1), |_| Ok(Expr::nil()))
                    .into(),
                "Function(list)",
            ),
            (
                HostFunction::new(
                    "toString",
                    host_fn::<(i64, u32), _>(|n: i64, _radix: u32| n.to_string()),
                )
                .into(),
                "Function(int,int)",
            ),
        ];

        for (i, (func, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(func.to_string(), expected, "display #{}", i + 1);
        }
    }

    #[test]
    fn test_native_arity_is_checked_before_call() {
        let native = NativeFunction::new("pair", &["value", "value"], Arity::Exact(2), |args| {
            Ok(Expr::list(args))
        });
        assert_eq!(
            native.invoke(vec![val(1), val(2)]).unwrap(),
            val([1, 2])
        );
        assert!(matches!(
            native.invoke(vec![val(1)]),
            Err(Error::Arity { got: 1, .. })
        ));
    }

    #[test]
    fn test_lambda_binds_in_fresh_scope() {
        let env = Environment::new();
        env.define("y", val(10)).unwrap();
        let add_y = Lambda::new(
            vec!["x".into()],
            Rc::from(vec![Expr::list(vec![sym("list"), sym("x"), sym("y")])]),
            env.clone(),
        );
        env.register_builtin_operation::<_, (Expr, Expr)>("list", |a: Expr, b: Expr| {
            Expr::list(vec![a, b])
        });

        assert_eq!(add_y.invoke(vec![val(1)]).unwrap(), val([1, 10]));
        assert!(!env.contains("x"));
        assert!(matches!(
            add_y.invoke(vec![]),
            Err(Error::Arity { got: 0, .. })
        ));
    }

    #[test]
    fn test_empty_body_yields_null() {
        let lambda = Lambda::new(vec![], Rc::from(vec![]), Environment::new());
        assert_eq!(lambda.invoke(vec![]).unwrap(), Expr::null());
    }
}
