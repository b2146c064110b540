#![expect(clippy::unwrap_used)] // test code OK

use littlelisp::ast::{Atom, Expr};
use littlelisp::evaluator::Arity;
use littlelisp::function::{Function, NativeFunction};
use littlelisp::host::{HostFunction, HostObject, HostValue, host_fn, host_method};
use littlelisp::{Error, complete, complete_input, default_environment, execute, tokenize};
use std::cell::RefCell;

/// Run `lines` in one session, returning the display form of each result or error
fn session(lines: &[&str]) -> Vec<String> {
    let env = default_environment();
    lines
        .iter()
        .map(|line| match execute(line, &env) {
            Ok(value) => value.to_string(),
            Err(err) => format!("error: {}", err.root_cause()),
        })
        .collect()
}

#[test]
fn test_definitions_persist_across_lines() {
    let env = default_environment();
    assert_eq!(execute("(def x 5)", &env).unwrap().to_string(), "5");
    assert!(env.contains("x"));
    assert_eq!(execute("(* x x)", &env).unwrap().to_string(), "25");
}

#[test]
fn test_session_transcript() {
    let transcript = [
        ("(+ 1 2 3)", "6"),
        ("(+ 9223372036854775807 1)", "9223372036854775808"),
        ("(/ 1 4)", "0.25"),
        ("(def foo 123)", "123"),
        ("(def add (lambda (x y) (+ x y)))", "Function(x,y)"),
        ("(add 2 8) (add 1 5)", "6"),
        ("(if (< 1 2 0) 1 2 3)", "3"),
        ("((lambda (x) (+ 1 x)) 41)", "42"),
        ("(let* ((a 1) (b (+ a 1))) (list a b))", "(1 2)"),
        ("(map (lambda (x) (* x x)) '(1 2 3))", "(1 4 9)"),
        ("(nth 1 [0.5 1.5 2.5])", "1.5"),
        ("(cons 'a '(b c))", "(a b c)"),
        ("(length \"unused\")", "error: Type error: expected list or array, got string"),
        ("(apply + 1 2 '(3 4))", "10"),
        ("(eq \"foo\" \"foo\")", "true"),
        ("(is \"foo\" \"foo\")", "false"),
        ("car", "Function(list)"),
        ("(car '())", "error: Index 0 out of range for length 0"),
        ("undefined", "error: Symbol undefined: undefined"),
        ("(def null 1)", "error: Type error: def expects a symbol name, got null"),
        ("(exec \"(def z 7) (+ z 1)\")", "8"),
        ("z", "7"),
        ("(eval (list '+ 1 2))", "3"),
    ];

    let lines: Vec<&str> = transcript.iter().map(|(line, _)| *line).collect();
    let results = session(&lines);
    for ((line, expected), actual) in transcript.iter().zip(&results) {
        assert_eq!(actual, expected, "result of {line}");
    }
}

#[test]
fn test_bound_integer_overflow_promotes() {
    let env = default_environment();
    env.define("INT_MAX", Expr::from(i64::MAX)).unwrap();

    let result = execute("(+ INT_MAX 1)", &env).unwrap();
    assert_eq!(result.to_string(), "9223372036854775808");
    assert_eq!(execute("(- (+ INT_MAX 1) 1)", &env).unwrap(), Expr::from(i64::MAX));
    assert_eq!(
        execute("(* INT_MAX 2)", &env).unwrap().to_string(),
        "18446744073709551614"
    );
}

#[test]
fn test_big_factorial() {
    let env = default_environment();
    execute(
        "(def fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))",
        &env,
    )
    .unwrap();
    let result = execute("(fact 100)", &env).unwrap().to_string();
    assert_eq!(result.len(), 158);
    assert!(result.starts_with("93326215443944152681"));
    assert!(result.ends_with("000000000000000000000000"));
}

#[test]
fn test_completion() {
    let env = default_environment();
    assert_eq!(complete("ca", &env), vec!["car"]);

    let all = complete("", &env);
    let mut sorted = all.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(all, sorted);

    execute("(def cadr (lambda (l) (car (cdr l))))", &env).unwrap();
    assert_eq!(complete("ca", &env), vec!["cadr", "car"]);

    let completion = complete_input("(map (lambda (x) (ca", &env).unwrap();
    assert_eq!(completion.replacement, "(map (lambda (x) (ca");
    assert_eq!(completion.candidates, vec!["cadr", "car"]);
    assert!(complete_input("(zzz", &env).is_none());
}

#[test]
fn test_runtime_errors_carry_call_site() {
    let env = default_environment();
    execute("(def second (lambda (l) (car (cdr l))))", &env).unwrap();

    let err = execute("(second '(1))", &env).unwrap_err();
    let Error::Runtime { head, callee, .. } = &err else {
        panic!("expected a runtime error, got {err:?}");
    };
    assert_eq!(head, "car");
    assert_eq!(callee, "Function(list)");
    assert!(matches!(err.root_cause(), Error::IndexOutOfRange { index: 0, len: 0 }));

    let err = execute("(second)", &env).unwrap_err();
    assert!(err.to_string().starts_with("second: Function(l)\n"), "{err}");
}

#[test]
fn test_host_functions_and_methods() {
    struct Counter {
        hits: RefCell<i64>,
    }

    let env = default_environment();
    env.register_host_function(
        "toString",
        host_fn::<(i64, u32), _>(|n: i64, radix: u32| match radix {
            2 => format!("{n:b}"),
            16 => format!("{n:x}"),
            _ => n.to_string(),
        }),
    );
    assert_eq!(execute("(toString 11 16)", &env).unwrap(), Expr::from("b"));
    assert_eq!(execute("toString", &env).unwrap().to_string(), "Function(int,int)");

    let counter = HostObject::new(Counter {
        hits: RefCell::new(0),
    });
    let bump = HostFunction::new(
        "bump",
        host_method::<Counter, _>(&["int"], |counter: &Counter, args: Vec<HostValue>| {
            let by = match args.as_slice() {
                [HostValue::Int(by)] => *by,
                _ => return Err(Error::TypeError("expected int".to_owned())),
            };
            *counter.hits.borrow_mut() += by;
            Ok(HostValue::Int(*counter.hits.borrow()))
        }),
    )
    .bound(counter.clone());
    env.define("bump", Function::from(bump).into()).unwrap();
    env.define("counter", counter.into()).unwrap();

    assert_eq!(execute("(bump 2)", &env).unwrap(), Expr::from(2));
    assert_eq!(execute("(bump 3)", &env).unwrap(), Expr::from(5));
    assert_eq!(execute("counter", &env).unwrap().to_string(), "Object(Counter)");
    assert!(execute("(bump \"x\")", &env).is_err());
}

#[test]
fn test_native_registration() {
    let env = default_environment();
    let shout = NativeFunction::new("shout", &["string"], Arity::Exact(1), |args: Vec<Expr>| {
        match args.as_slice() {
            [Expr::Atom(Atom::Str(s))] => Ok(Expr::from(s.to_uppercase())),
            _ => Err(Error::TypeError("expected string".to_owned())),
        }
    });
    env.define("shout", Function::from(shout).into()).unwrap();

    assert_eq!(execute("(shout \"hi\")", &env).unwrap(), Expr::from("HI"));
    assert_eq!(
        session(&["(car 1 2)"]),
        vec!["error: Arity error: expected exactly 1 arguments, got 2"]
    );
}

#[test]
fn test_tokenize_surface() {
    assert_eq!(
        tokenize("(print \"a b\" 'x)"),
        vec!["(", "print", "\"", "a b", "\"", "'", "x", ")"]
    );
    assert!(tokenize("").is_empty());
}

#[cfg(feature = "formatter")]
#[test]
fn test_formatted_programs_still_evaluate() {
    let program = "(def f (lambda (n) (if (< n 2) n (+ (f (- n 1)) (f (- n 2)))))) (f 10)";
    let formatted = littlelisp::format(program);
    assert_ne!(formatted, program);
    let env = default_environment();
    assert_eq!(execute(&formatted, &env).unwrap(), Expr::from(55));
}
