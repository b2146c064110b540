use littlelisp::ast::Expr;
use littlelisp::evaluator::{Arity, Environment};
use littlelisp::function::{Function, NativeFunction};
use littlelisp::{Error, ParseErrorKind, complete_input, default_environment, execute, parse};
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Context, Editor, Helper};
use std::cell::Cell;
use std::panic;
use std::process;
use std::rc::Rc;

/// Work the `clear` and `reset` builtins ask the loop to do after the current line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Clear,
    Reset,
}

type Pending = Rc<Cell<Option<Request>>>;

fn main() {
    init_tracing();

    let result = panic::catch_unwind(|| {
        run_repl();
    });

    if let Err(panic_info) = result {
        eprintln!("The REPL encountered an unexpected error and must exit.");

        if let Some(msg) = panic_info.downcast_ref::<&str>() {
            eprintln!("Error: {msg}");
        } else if let Some(msg) = panic_info.downcast_ref::<String>() {
            eprintln!("Error: {msg}");
        } else {
            eprintln!("Error: Unknown panic occurred");
        }

        process::exit(1);
    }
}

/// Enable with `RUST_LOG=littlelisp=debug` or `RUST_LOG=littlelisp=trace`.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

fn run_repl() {
    println!("littlelisp");
    println!("Enter expressions like: (+ 1 2)");
    println!("Type :help for more commands, or Ctrl+D to exit.");
    println!();

    let mut rl: Editor<LispHelper, DefaultHistory> = match Editor::new() {
        Ok(rl) => rl,
        Err(err) => {
            eprintln!("Could not initialize REPL: {err}");
            process::exit(1);
        }
    };

    let pending: Pending = Rc::new(Cell::new(None));
    let mut env = session_environment(&pending);
    rl.set_helper(Some(LispHelper { env: env.clone() }));

    loop {
        match rl.readline("lisp> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                match line {
                    ":help" => {
                        print_help();
                        continue;
                    }
                    ":env" => {
                        print_environment(&env);
                        continue;
                    }
                    ":quit" | ":exit" => {
                        println!("Goodbye!");
                        break;
                    }
                    _ => {}
                }

                let result = execute(line, &env);

                match pending.take() {
                    Some(Request::Clear) => {
                        if let Err(err) = rl.clear_screen() {
                            println!("Error: {err}");
                        }
                        continue;
                    }
                    Some(Request::Reset) => {
                        env = session_environment(&pending);
                        rl.set_helper(Some(LispHelper { env: env.clone() }));
                        println!("Environment reset.");
                        continue;
                    }
                    None => {}
                }

                match result {
                    Ok(value) => {
                        println!("{value}");
                        // `_` is an ordinary name, so this cannot fail
                        let _ = env.define("_", value);
                    }
                    Err(err) => print_error(&err),
                }
            }

            Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                println!("Error: {err:?}");
                break;
            }
        }
    }
}

/// A default environment plus the shell-only builtins
fn session_environment(pending: &Pending) -> Environment {
    let env = default_environment();
    for (name, request) in [("clear", Request::Clear), ("reset", Request::Reset)] {
        let pending = Rc::clone(pending);
        let native = NativeFunction::new(name, &[], Arity::Exact(0), move |_args: Vec<Expr>| {
            pending.set(Some(request));
            Ok(Expr::null())
        });
        let _ = env.define(name, Function::from(native).into());
    }
    env
}

fn print_error(err: &Error) {
    match err {
        Error::Runtime { head, callee, .. } => {
            println!("Error in ({head} ...) calling {callee}: {}", err.root_cause());
        }
        other => println!("Error: {other}"),
    }
}

fn print_help() {
    println!("Commands:");
    println!("  :help      - Show this help message");
    println!("  :env       - Show current environment bindings");
    println!("  :quit      - Exit the interpreter");
    println!("  :exit      - Exit the interpreter");
    println!("  Ctrl+D     - Exit the interpreter");
    println!("  Tab        - Complete the name being typed");
    println!();
    println!("Builtins provided by this shell:");
    println!("  (clear)    - Clear the screen");
    println!("  (reset)    - Start over with a fresh environment");
    println!("  _          - The last result");
    println!();
    println!("Examples:");
    println!("  (+ 1 2 3)");
    println!("  (def sq (lambda (x) (* x x)))");
    println!("  (map sq '(1 2 3))");
    println!("  (let* ((a 1) (b (+ a 1))) (list a b))");
    println!("  (nth 1 [0.5 1.5 2.5])");
    println!();
}

fn print_environment(env: &Environment) {
    let bindings = env.bindings();

    if bindings.is_empty() {
        println!("Environment is empty.");
        return;
    }

    println!("Environment bindings ({} total):", bindings.len());
    println!();

    let (functions, values): (Vec<_>, Vec<_>) = bindings
        .into_iter()
        .partition(|(_, value)| matches!(value, Expr::Function(_)));

    if !functions.is_empty() {
        println!("Functions ({}):", functions.len());
        let mut col = 0;
        for (name, _) in &functions {
            print!("  {name:<15}");
            col += 1;
            if col % 4 == 0 {
                println!();
            }
        }
        if col % 4 != 0 {
            println!();
        }
        println!();
    }

    if !values.is_empty() {
        println!("Values ({}):", values.len());
        for (name, value) in values {
            println!("  {name} = {value}");
        }
    }
}

struct LispHelper {
    env: Environment,
}

impl Completer for LispHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let before = &line[..pos];
        let start = before
            .rfind(|c: char| c.is_whitespace() || "()[]'\"".contains(c))
            .map_or(0, |i| i + before[i..].chars().next().map_or(1, char::len_utf8));

        let Some(completion) = complete_input(before, &self.env) else {
            return Ok((start, Vec::new()));
        };
        let pairs = match completion.candidates.as_slice() {
            [only] => vec![Pair {
                display: only.clone(),
                replacement: completion.replacement[start..].to_owned(),
            }],
            many => many
                .iter()
                .map(|name| Pair {
                    display: name.clone(),
                    replacement: name.clone(),
                })
                .collect(),
        };
        Ok((start, pairs))
    }
}

impl Hinter for LispHelper {
    type Hint = String;
}

impl Highlighter for LispHelper {}

impl Validator for LispHelper {
    // Keep reading lines while the input is an unfinished form
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        match parse(ctx.input()) {
            Err(Error::Parse(err)) if err.kind == ParseErrorKind::Incomplete => {
                Ok(ValidationResult::Incomplete)
            }
            _ => Ok(ValidationResult::Valid(None)),
        }
    }
}

impl Helper for LispHelper {}
