//! littlelisp - a small Lisp with an exact numeric tower and a source formatter
//!
//! This crate provides a tree-walking interpreter for a compact Lisp dialect together
//! with an idempotent formatter for the same surface syntax. Programs are tokenized,
//! read into [`ast::Expr`] trees and evaluated against a lexically scoped
//! [`evaluator::Environment`].
//!
//! ```lisp
//! (def fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))
//! (fact 30)                      ; exact big integer, no overflow
//! (let* ((a 1) (b (+ a 1))) b)   ; sequential bindings
//! (map (lambda (x) (* x x)) '(1 2 3))
//! (nth 1 [0.5 1.5 2.5])          ; typed array literals
//! ```
//!
//! ## Numeric Tower
//!
//! Arithmetic is performed on exact decimals and reduced back to the narrowest
//! representation that preserves the value: `i64` for whole numbers that fit, an exact
//! big integer for those that don't, `f64` for fractions. Comparisons coerce to `f64`.
//!
//! ## Host Bridge
//!
//! Rust closures can be exposed to programs either as native builtins (working on
//! [`ast::Expr`] values through typed adapters) or as host functions working on plain
//! [`host::HostValue`]s, optionally bound to a receiver object.
//!
//! ## Modules
//!
//! - `lexer`: token scanner shared by the reader and the formatter
//! - `reader`: token stream to expression tree
//! - `ast`: expression data model
//! - `numeric`: exact decimal arithmetic and reduction
//! - `function`: native, lambda and host function values
//! - `host`: host value conversions and callable adapters
//! - `evaluator`: environments and evaluation
//! - `builtinops`: built-in operation registry
//! - `formatter`: whitespace-preserving token tree and visitor pipeline

use std::fmt;

/// Maximum nesting depth accepted by the reader and the formatter's tree builder
pub const MAX_PARSE_DEPTH: usize = 512;

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (stray closers, non-atoms inside arrays)
    InvalidSyntax,
    /// Input ended before the expression was complete (unterminated string or list)
    Incomplete,
    /// Expression nesting exceeded the configured maximum depth
    TooDeeplyNested,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Snippet of the input being parsed (max 100 chars)
    pub context: Option<String>,
    /// The problematic token, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Attach a snippet of `input` as context, replacing newlines with visible markers
    pub fn with_context(mut self, input: &str) -> Self {
        const MAX_CONTEXT: usize = 100;

        let mut snippet: String = input.chars().take(MAX_CONTEXT).collect();
        if input.chars().nth(MAX_CONTEXT).is_some() {
            snippet.push_str("[...]");
        }
        self.context = Some(snippet.replace('\n', "\\n").replace('\r', ""));
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParseError: {}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

/// Error types for the interpreter
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Symbol undefined: {0}")]
    UndefinedSymbol(String),
    #[error("Type error: {0}")]
    TypeError(String),
    #[error("Arity error: expected {expected} arguments, got {got}")]
    Arity {
        expected: evaluator::Arity,
        got: usize,
    },
    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("Reserved name cannot be rebound: {0}")]
    ReservedName(String),
    #[error("Evaluation error: {0}")]
    EvalError(String),
    /// An argument-shape failure raised by a callee, tagged with the call site
    #[error("{head}: {callee}\n{source}")]
    Runtime {
        head: String,
        callee: String,
        #[source]
        source: Box<Error>,
    },
    #[error("Host function {function} failed: {source}")]
    Host {
        function: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    pub fn arity(expected: evaluator::Arity, got: usize) -> Self {
        Error::Arity { expected, got }
    }

    /// Whether this error describes a callee rejecting the shape of its arguments.
    /// These are the errors the evaluator tags with the offending call site.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Error::TypeError(_) | Error::Arity { .. } | Error::IndexOutOfRange { .. }
        )
    }

    /// The innermost error beneath any call-site wrappers
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Error::Runtime { source, .. } = current {
            current = source;
        }
        current
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod function;
pub mod host;
pub mod lexer;
pub mod numeric;
pub mod reader;

#[cfg(feature = "formatter")]
pub mod formatter;

use ast::Expr;
use evaluator::Environment;

pub use evaluator::{default_environment, evaluate};
#[cfg(feature = "formatter")]
pub use formatter::{Formatter, format};
pub use lexer::tokenize;
pub use reader::{ParseConfig, parse, parse_with_config};

/// Parse `text` and evaluate it in `env`
pub fn execute(text: &str, env: &Environment) -> Result<Expr, Error> {
    let expr = parse(text)?;
    evaluate(&expr, env)
}

/// Names bound in `env` (or any enclosing scope) that start with `prefix`, sorted
pub fn complete(prefix: &str, env: &Environment) -> Vec<String> {
    env.complete(prefix)
}

/// Result of completing the symbol at the end of a partial input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// The full input with the trailing symbol completed as far as it is unambiguous
    pub replacement: String,
    /// Every bound name that matched the trailing symbol
    pub candidates: Vec<String>,
}

/// Complete the symbol being typed at the end of `input`.
///
/// A single match is completed in full and followed by a space. Several matches are
/// completed up to their longest common prefix. Returns `None` when nothing matches.
pub fn complete_input(input: &str, env: &Environment) -> Option<Completion> {
    let stem_start = input
        .char_indices()
        .rev()
        .take_while(|&(_, c)| !lexer::is_breaking(c))
        .last()
        .map_or(input.len(), |(i, _)| i);
    let (leading, stem) = input.split_at(stem_start);

    let candidates = env.complete(stem);
    let replacement = match candidates.as_slice() {
        [] => return None,
        [only] => format!("{leading}{only} "),
        many => format!("{leading}{}", common_prefix(many)),
    };
    Some(Completion {
        replacement,
        candidates,
    })
}

fn common_prefix(words: &[String]) -> &str {
    let Some((first, rest)) = words.split_first() else {
        return "";
    };
    let mut end = first.len();
    for word in rest {
        let shared = first
            .char_indices()
            .zip(word.chars())
            .take_while(|((_, a), b)| a == b)
            .last()
            .map_or(0, |((i, c), _)| i + c.len_utf8());
        end = end.min(shared);
    }
    &first[..end]
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    #[test]
    fn test_complete_input() {
        let env = default_environment();
        let test_cases = vec![
            ("(ca", Some("(car ")),
            ("(c", Some("(c")),
            ("(le", Some("(length ")),
            ("(+ 1 (na", None),
            ("(ma", Some("(map ")),
            ("(e", Some("(e")),
            ("(ev", Some("(eval ")),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let completion = complete_input(input, &env);
            assert_eq!(
                completion.as_ref().map(|c| c.replacement.as_str()),
                expected,
                "completion #{} for {input:?}",
                i + 1
            );
        }

        let many = complete_input("(c", &env).unwrap();
        assert_eq!(many.candidates, vec!["car", "cdr", "cons"]);
    }

    #[test]
    fn test_error_root_cause_and_display() {
        let env = default_environment();
        let err = execute("(car '())", &env).unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
        assert!(matches!(err.root_cause(), Error::IndexOutOfRange { .. }));

        let rendered = err.to_string();
        assert!(rendered.starts_with("car: Function(list)\n"), "{rendered}");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_parse_error_context() {
        let err = ParseError::from_message(ParseErrorKind::Incomplete, "Unterminated list")
            .with_context("(a\nb");
        assert_eq!(err.context.as_deref(), Some("(a\\nb"));
        assert!(err.to_string().contains("Unterminated list"));
    }
}
