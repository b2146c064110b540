use crate::Error;
use crate::ast::{Atom, Expr};
use crate::builtinops::get_builtin_ops;
use crate::function::{Function, Lambda, NativeFunction};
use crate::host::{HostCallable, HostFunction};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace, warn};

pub mod intooperation;

use intooperation::{IntoOperation, IntoVariadicOperation};
pub use intooperation::{NumIter, StringIter, ValueIter};

/// Expected number of arguments for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly N arguments
    Exact(usize),
    /// At least N arguments
    AtLeast(usize),
    /// Any number of arguments
    Any,
}

impl Arity {
    /// Check if the given number of arguments is valid for this arity
    pub fn validate(self, got: usize) -> Result<(), Error> {
        let ok = match self {
            Arity::Exact(n) => got == n,
            Arity::AtLeast(n) => got >= n,
            Arity::Any => true,
        };
        if ok {
            Ok(())
        } else {
            Err(Error::arity(self, got))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Any => write!(f, "any number of"),
        }
    }
}

/// Names that always read as atoms and can never be bound
const RESERVED_NAMES: [&str; 3] = ["null", "true", "false"];

#[derive(Default)]
struct Scope {
    bindings: HashMap<String, Expr>,
    parent: Option<Environment>,
}

/// Environment for variable bindings.
///
/// A cheap shared handle: clones refer to the same scope, so a definition made
/// through one handle is visible through every other. Child scopes are created for
/// each lambda invocation and each `let*`.
#[derive(Clone, Default)]
pub struct Environment(Rc<RefCell<Scope>>);

/// A non-owning handle to an [`Environment`]
#[derive(Clone)]
pub struct WeakEnvironment(Weak<RefCell<Scope>>);

impl WeakEnvironment {
    pub fn upgrade(&self) -> Result<Environment, Error> {
        self.0
            .upgrade()
            .map(Environment)
            .ok_or_else(|| Error::EvalError("Environment is no longer available".to_owned()))
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(RefCell::new(Scope {
            bindings: HashMap::new(),
            parent: Some(parent.clone()),
        })))
    }

    /// Bind `name` in this scope, replacing any existing binding here.
    /// `null`, `true` and `false` are rejected.
    pub fn define(&self, name: impl Into<String>, value: Expr) -> Result<(), Error> {
        let name = name.into();
        if RESERVED_NAMES.contains(&name.as_str()) {
            return Err(Error::ReservedName(name));
        }
        self.bind(name, value);
        Ok(())
    }

    pub(crate) fn bind(&self, name: impl Into<String>, value: Expr) {
        self.0.borrow_mut().bindings.insert(name.into(), value);
    }

    /// Resolve `name` in this scope or the nearest enclosing one
    pub fn get(&self, name: &str) -> Result<Expr, Error> {
        self.lookup(name)
            .ok_or_else(|| Error::UndefinedSymbol(name.to_owned()))
    }

    pub fn lookup(&self, name: &str) -> Option<Expr> {
        let mut current = self.clone();
        loop {
            let parent = {
                let scope = current.0.borrow();
                if let Some(value) = scope.bindings.get(name) {
                    return Some(value.clone());
                }
                scope.parent.clone()?
            };
            current = parent;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Bind the current value of `from` under the name `to` as well
    pub fn alias(&self, from: &str, to: &str) -> Result<(), Error> {
        let value = self.get(from)?;
        self.define(to, value)
    }

    /// This scope followed by each enclosing scope, innermost first
    fn chain(&self) -> Vec<Environment> {
        let mut chain = vec![self.clone()];
        while let Some(parent) = chain
            .last()
            .and_then(|env| env.0.borrow().parent.clone())
        {
            chain.push(parent);
        }
        chain
    }

    /// Every visible name starting with `prefix`, sorted and deduplicated
    pub fn complete(&self, prefix: &str) -> Vec<String> {
        let mut names = BTreeSet::new();
        for env in self.chain() {
            let scope = env.0.borrow();
            names.extend(
                scope
                    .bindings
                    .keys()
                    .filter(|name| name.starts_with(prefix))
                    .cloned(),
            );
        }
        names.into_iter().collect()
    }

    /// Get all bindings in this environment and its parents.
    /// Returns a Vec of (name, value) pairs sorted by name; inner bindings shadow
    /// outer ones.
    pub fn bindings(&self) -> Vec<(String, Expr)> {
        let mut bindings = BTreeMap::new();
        for env in self.chain().iter().rev() {
            let scope = env.0.borrow();
            for (name, value) in &scope.bindings {
                bindings.insert(name.clone(), value.clone());
            }
        }
        bindings.into_iter().collect()
    }

    pub fn downgrade(&self) -> WeakEnvironment {
        WeakEnvironment(Rc::downgrade(&self.0))
    }

    /// Register a builtin that works on the raw argument slice.
    ///
    /// This is the low-level API: it accepts a function that already works on
    /// `&[Expr]`. For most new code prefer
    /// [`Environment::register_builtin_operation`], which converts arguments and
    /// checks arity for you.
    ///
    /// # Example
    /// ```
    /// use littlelisp::ast::Expr;
    /// use littlelisp::{Error, default_environment, execute};
    ///
    /// fn count_args(args: &[Expr]) -> Result<Expr, Error> {
    ///     Ok(args.len().into())
    /// }
    ///
    /// let env = default_environment();
    /// env.register_builtin_function("count-args", count_args);
    /// assert_eq!(execute("(count-args 1 2 3)", &env).unwrap().to_string(), "3");
    /// ```
    pub fn register_builtin_function(&self, name: &str, func: fn(&[Expr]) -> Result<Expr, Error>) {
        let native = NativeFunction::new(name, &["args..."], Arity::Any, move |args: Vec<Expr>| {
            func(&args)
        });
        self.bind(name, Function::from(native).into());
    }

    /// Register a strongly-typed Rust function as a builtin operation using
    /// automatic argument extraction and result conversion.
    ///
    /// ```
    /// use littlelisp::{default_environment, execute};
    ///
    /// fn add(a: i64, b: i64) -> i64 {
    ///     a + b
    /// }
    ///
    /// let env = default_environment();
    /// env.register_builtin_operation::<_, (i64, i64)>("add", add);
    /// assert_eq!(execute("(add 2 8)", &env).unwrap().to_string(), "10");
    /// ```
    ///
    /// Supported parameter types:
    /// - `i64`, `bool`, `Number`
    /// - `&str` (borrowed string slices)
    /// - `Expr` (owned access to the raw argument)
    /// - `Rc<Function>` (anything callable)
    /// - `ValueIter<'_>`, `NumIter<'_>`, `StringIter<'_>` (elements of a list argument)
    ///
    /// Supported return types are any `R: Into<Expr>` and `Result<R, Error>`.
    ///
    /// Arity is enforced automatically and the parameter types become the
    /// function's display form (`Function(int,int)` above). Conversion errors
    /// yield `TypeError`.
    pub fn register_builtin_operation<F, Args>(&self, name: &str, func: F)
    where
        F: IntoOperation<Args> + 'static,
    {
        let params = <F as IntoOperation<Args>>::parameter_kinds();
        let arity = Arity::Exact(params.len());
        let op = func.into_operation();
        let native = NativeFunction::new(name, &params, arity, move |args: Vec<Expr>| op(args));
        self.bind(name, Function::from(native).into());
    }

    /// Register a variadic builtin operation with explicit arity metadata.
    ///
    /// This is intended for functions whose Rust signature ends in a "rest"
    /// parameter, expressed using the iterator types from
    /// [`intooperation`]:
    /// - rest of all arguments as values: `fn(ValueIter<'_>) -> R`
    /// - numeric tail: `fn(NumIter<'_>) -> R`
    /// - fixed prefix plus numeric tail: `fn(i64, NumIter<'_>) -> R`
    ///
    /// The provided [`Arity`] is checked before the function runs, since
    /// minimum and maximum argument counts of variadic operations are not always
    /// derivable from the Rust type signature alone.
    pub fn register_variadic_builtin_operation<F, Args>(&self, name: &str, arity: Arity, func: F)
    where
        F: IntoVariadicOperation<Args> + 'static,
    {
        let params = <F as IntoVariadicOperation<Args>>::parameter_kinds();
        let op = func.into_variadic_operation();
        let native = NativeFunction::new(name, &params, arity, move |args: Vec<Expr>| op(args));
        self.bind(name, Function::from(native).into());
    }

    /// Bind a host callable under `name`
    pub fn register_host_function(&self, name: &str, callable: impl HostCallable + 'static) {
        let host = HostFunction::new(name, callable);
        self.bind(name, Function::from(host).into());
    }
}

impl fmt::Debug for Environment {
    // Values may hold closures over this very environment, so only names are shown.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scope = self.0.borrow();
        let mut names: Vec<_> = scope.bindings.keys().collect();
        names.sort_unstable();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("has_parent", &scope.parent.is_some())
            .finish()
    }
}

/// Forms whose operands are not evaluated before dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecialForm {
    Def,
    Lambda,
    If,
    Quote,
    Progn,
    LetStar,
}

impl SpecialForm {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "def" => Some(SpecialForm::Def),
            "lambda" => Some(SpecialForm::Lambda),
            "if" => Some(SpecialForm::If),
            "quote" => Some(SpecialForm::Quote),
            "progn" => Some(SpecialForm::Progn),
            "let*" => Some(SpecialForm::LetStar),
            _ => None,
        }
    }

    fn eval(self, args: &[Expr], env: &Environment) -> Result<Expr, Error> {
        match self {
            SpecialForm::Def => eval_def(args, env),
            SpecialForm::Lambda => eval_lambda(args, env),
            SpecialForm::If => eval_if(args, env),
            SpecialForm::Quote => eval_quote(args),
            SpecialForm::Progn => eval_sequence(args, env),
            SpecialForm::LetStar => eval_let_star(args, env),
        }
    }
}

/// Evaluate an expression (public API)
pub fn evaluate(expr: &Expr, env: &Environment) -> Result<Expr, Error> {
    match expr {
        Expr::Symbol(name) => env.get(name),

        // Self-evaluating forms, including the empty list
        Expr::Atom(_) | Expr::Array(_) | Expr::Function(_) => Ok(expr.clone()),

        Expr::List(items) => {
            let (head, args) = match &items[..] {
                [head, args @ ..] => (head, args),
                [] => return Ok(expr.clone()),
            };
            if let Expr::Symbol(name) = head
                && let Some(form) = SpecialForm::from_name(name)
            {
                trace!(form = name.as_str(), operands = args.len(), "special form");
                return form.eval(args, env);
            }
            eval_call(head, args, env)
        }
    }
}

/// Evaluate `forms` in order and return the last result; `null` when there are none
pub(crate) fn eval_sequence(forms: &[Expr], env: &Environment) -> Result<Expr, Error> {
    let mut result = Expr::null();
    for form in forms {
        result = evaluate(form, env)?;
    }
    Ok(result)
}

fn eval_call(head: &Expr, arg_exprs: &[Expr], env: &Environment) -> Result<Expr, Error> {
    let callee = evaluate(head, env)?;
    let Expr::Function(func) = callee else {
        return Err(Error::Runtime {
            head: head.to_string(),
            callee: callee.to_string(),
            source: Box::new(Error::TypeError(format!(
                "Cannot apply non-function: {callee}"
            ))),
        });
    };

    let args = arg_exprs
        .iter()
        .map(|arg| evaluate(arg, env))
        .collect::<Result<Vec<_>, _>>()?;

    trace!(head = %head, callee = %func, args = args.len(), "call");
    func.invoke(args).map_err(|err| {
        if err.is_argument_error() {
            Error::Runtime {
                head: head.to_string(),
                callee: func.to_string(),
                source: Box::new(err),
            }
        } else {
            err
        }
    })
}

fn eval_def(args: &[Expr], env: &Environment) -> Result<Expr, Error> {
    let [target, value_expr] = args else {
        return Err(Error::arity(Arity::Exact(2), args.len()));
    };
    let Expr::Symbol(name) = target else {
        return Err(Error::TypeError(format!(
            "def expects a symbol name, got {target}"
        )));
    };

    let value = evaluate(value_expr, env)?;
    debug!(name = name.as_str(), "def");
    env.define(name.as_str(), value.clone())?;
    Ok(value)
}

fn eval_lambda(args: &[Expr], env: &Environment) -> Result<Expr, Error> {
    let Some((param_list, body)) = args.split_first() else {
        return Err(Error::arity(Arity::AtLeast(1), 0));
    };
    let Expr::List(param_exprs) = param_list else {
        return Err(Error::TypeError(format!(
            "lambda expects a parameter list, got {param_list}"
        )));
    };

    let mut seen = HashSet::new();
    let mut params = Vec::with_capacity(param_exprs.len());
    for param in param_exprs.iter() {
        let Expr::Symbol(name) = param else {
            return Err(Error::TypeError(format!(
                "lambda parameter must be a symbol, got {param}"
            )));
        };
        if !seen.insert(name.as_str()) {
            return Err(Error::TypeError(format!(
                "duplicate lambda parameter: {name}"
            )));
        }
        params.push(name.clone());
    }

    let lambda = Lambda::new(params, Rc::from(body), env.clone());
    Ok(Function::from(lambda).into())
}

fn eval_if(args: &[Expr], env: &Environment) -> Result<Expr, Error> {
    let [condition, then_branch, else_forms @ ..] = args else {
        return Err(Error::arity(Arity::AtLeast(2), args.len()));
    };

    if evaluate(condition, env)?.is_truthy() {
        evaluate(then_branch, env)
    } else if else_forms.is_empty() {
        Ok(Expr::nil())
    } else {
        eval_sequence(else_forms, env)
    }
}

fn eval_quote(args: &[Expr]) -> Result<Expr, Error> {
    match args {
        [quoted] => Ok(quoted.clone()),
        _ => Err(Error::arity(Arity::Exact(1), args.len())),
    }
}

fn eval_let_star(args: &[Expr], env: &Environment) -> Result<Expr, Error> {
    let Some((binding_list, body)) = args.split_first() else {
        return Err(Error::arity(Arity::AtLeast(1), 0));
    };
    let Expr::List(bindings) = binding_list else {
        return Err(Error::TypeError(format!(
            "let* expects a binding list, got {binding_list}"
        )));
    };

    let scope = Environment::with_parent(env);
    for binding in bindings.iter() {
        match binding.as_list() {
            Some([Expr::Symbol(name), value_expr]) => {
                let value = evaluate(value_expr, &scope)?;
                scope.bind(name.as_str(), value);
            }
            _ => {
                return Err(Error::TypeError(format!(
                    "let* binding must be (name value), got {binding}"
                )));
            }
        }
    }
    eval_sequence(body, &scope)
}

/// Create an environment holding every builtin plus `eval`, `exec` and the `=`
/// alias of `eq`.
///
/// `eval` and `exec` act on the environment returned here. They hold it weakly, so
/// calling them after the environment has been dropped is an error.
pub fn default_environment() -> Environment {
    let env = Environment::new();

    for builtin_op in get_builtin_ops() {
        let native = NativeFunction::from_builtin(builtin_op);
        env.bind(builtin_op.name, Function::from(native).into());
    }

    let ambient = env.downgrade();
    let eval = NativeFunction::new(
        "eval",
        &["expression"],
        Arity::Exact(1),
        move |args: Vec<Expr>| match args.as_slice() {
            [expr] => evaluate(expr, &ambient.upgrade()?),
            _ => Err(Error::arity(Arity::Exact(1), args.len())),
        },
    );
    env.bind("eval", Function::from(eval).into());

    let ambient = env.downgrade();
    let exec = NativeFunction::new(
        "exec",
        &["text"],
        Arity::Exact(1),
        move |args: Vec<Expr>| match args.as_slice() {
            [Expr::Atom(Atom::Str(text))] => crate::execute(text, &ambient.upgrade()?),
            [other] => Err(Error::TypeError(format!(
                "expected string, got {}",
                other.type_name()
            ))),
            _ => Err(Error::arity(Arity::Exact(1), args.len())),
        },
    );
    env.bind("exec", Function::from(exec).into());

    if let Err(err) = env.alias("eq", "=") {
        warn!(%err, "could not alias eq");
    }

    env
}
