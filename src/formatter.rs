//! Source formatter.
//!
//! The input is read into a [`tree::Token`] tree that keeps every character, then each
//! [`Visitor`] of the pipeline rewrites whitespace in a full pre-order walk before the
//! next one starts. When the tree is written back out, every line break (inserted by a
//! visitor or taken from the source) is indented to one column past the start of the
//! enclosing aggregate.
//!
//! ```
//! assert_eq!(littlelisp::format("(if a b c d)"), "(if a\n  b\n c\n d)");
//! assert_eq!(littlelisp::format("( a b c [ 1 2 3] ' foo)"), "(a b c [1 2 3] 'foo)");
//! ```

pub mod tree;
pub mod visitors;

use tracing::debug;
use tree::{AggregateKind, AggregateToken, Token};
pub use visitors::Visitor;

/// Format `text` with the default pipeline
pub fn format(text: &str) -> String {
    Formatter::new().format(text)
}

/// An ordered pipeline of visitors
pub struct Formatter {
    visitors: Vec<Box<dyn Visitor>>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter {
    /// A formatter running the default passes
    pub fn new() -> Self {
        Formatter {
            visitors: visitors::default_visitors(),
        }
    }

    /// A formatter with no passes; only line indentation is rewritten
    pub fn empty() -> Self {
        Formatter {
            visitors: Vec::new(),
        }
    }

    /// Append `visitor` after the passes already present
    #[must_use]
    pub fn add_visitor(mut self, visitor: impl Visitor + 'static) -> Self {
        self.visitors.push(Box::new(visitor));
        self
    }

    /// Format `text`. Input nested too deeply to build a tree is returned unchanged.
    pub fn format(&mut self, text: &str) -> String {
        let mut root = match tree::build(text) {
            Ok(root) => root,
            Err(err) => {
                debug!(%err, "leaving input unformatted");
                return text.to_owned();
            }
        };

        for visitor in &mut self.visitors {
            walk(visitor.as_mut(), None, &mut root, 0);
        }

        let mut writer = Writer::default();
        writer.write(&root, 0);
        writer.out
    }
}

fn walk(visitor: &mut dyn Visitor, parent: Option<AggregateKind>, node: &mut Token, depth: usize) {
    visitor.visit(parent, node, depth);
    if let Token::Aggregate(agg) = node {
        let kind = agg.kind;
        for child in &mut agg.children {
            walk(visitor, Some(kind), child, depth + 1);
        }
    }
}

#[derive(Default)]
struct Writer {
    out: String,
    column: usize,
}

impl Writer {
    /// Write `token`; line breaks directly inside it are indented to `indent`
    fn write(&mut self, token: &Token, indent: usize) {
        match token {
            Token::Atom(atom) if atom.line_break => {
                self.new_line(indent);
                self.push_text(atom.text.strip_prefix('\n').unwrap_or(&atom.text));
            }
            Token::Atom(atom) => self.push_text(&atom.text),
            Token::Aggregate(agg) => self.write_children(agg),
        }
    }

    /// Source newlines are re-indented like inserted breaks: the indentation that
    /// followed them is dropped and replaced. A newline ahead of a blank line, the
    /// end of input, or directly ahead of the closing delimiter is written bare.
    fn write_children(&mut self, agg: &AggregateToken) {
        let indent = match agg.kind {
            AggregateKind::Root => 0,
            _ => self.column + 1,
        };
        if matches!(agg.kind, AggregateKind::Str | AggregateKind::Comment) {
            for child in &agg.children {
                self.write(child, indent);
            }
            return;
        }

        let mut i = 0;
        while let Some(child) = agg.children.get(i) {
            i += 1;
            if !is_source_newline(child) {
                self.write(child, indent);
                continue;
            }

            let run_start = i;
            while agg.children.get(i).is_some_and(is_indentation) {
                i += 1;
            }
            let pad = match agg.children.get(i) {
                None => false,
                Some(Token::Atom(next)) if next.is_newline() => false,
                Some(_) if i == run_start && agg.is_closed() && i == agg.children.len() - 1 => {
                    false
                }
                Some(_) => true,
            };
            self.new_line(if pad { indent } else { 0 });
        }
    }

    fn new_line(&mut self, indent: usize) {
        self.out.push('\n');
        self.out.extend(std::iter::repeat_n(' ', indent));
        self.column = indent;
    }

    fn push_text(&mut self, text: &str) {
        self.out.push_str(text);
        self.column = match text.rfind('\n') {
            Some(pos) => text[pos + 1..].chars().count(),
            None => self.column + text.chars().count(),
        };
    }
}

fn is_source_newline(token: &Token) -> bool {
    matches!(token, Token::Atom(atom) if !atom.line_break && atom.text == "\n")
}

fn is_indentation(token: &Token) -> bool {
    matches!(token, Token::Atom(atom) if atom.is_whitespace() && !atom.is_newline())
}

#[cfg(test)]
mod tests {
    use super::tree::AtomToken;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_reference_fixtures() {
        let test_cases = vec![
            (
                "(let ((foo (+ 1 1))) (bar) (baz))",
                "(let ((foo (+ 1 1)))\n (bar)\n (baz))",
            ),
            (
                "(let ((foo 1) (bar 2)) (baz) (buzz))",
                "(let ((foo 1)\n      (bar 2))\n (baz)\n (buzz))",
            ),
            ("(if a b)", "(if a\n  b)"),
            ("(if a b c d)", "(if a\n  b\n c\n d)"),
            (
                "(let ((a 1) (b 2)) (if (> a b) 'foo 'bar))",
                "(let ((a 1)\n      (b 2))\n (if (> a b)\n   'foo\n  'bar))",
            ),
            (
                "(if a (let ((a 1)(b 2)) 'foo 'bar) baz)",
                "(if a\n  (let ((a 1)\n        (b 2))\n   'foo\n   'bar)\n baz)",
            ),
            ("(progn a b c d)", "(progn\n a\n b\n c\n d)"),
            ("( a b c [ 1 2 3] ' foo)", "(a b c [1 2 3] 'foo)"),
            ("((a b c)[ 1 2 3]'foo(a b c))", "((a b c) [1 2 3] 'foo (a b c))"),
            ("(lambda (x y z) 'foo)", "(lambda (x y z)\n 'foo)"),
            ("(lambda (x y z) 'foo 'bar)", "(lambda (x y z)\n 'foo\n 'bar)"),
            (
                "(map (lambda (n) (+ n 1)) '(1 2 3))",
                "(map (lambda (n)\n      (+ n 1))\n '(1 2 3))",
            ),
            ("(let* ((a 1) (b a)) b)", "(let* ((a 1)\n       (b a))\n b)"),
            ("(foo (bar\n      baz) qux)", "(foo (bar\n      baz)\n qux)"),
            ("(f '\n(g a b) c)", "(f '(g a b) c)"),
        ];

        for (input, expected) in test_cases {
            assert_eq!(format(input), expected, "formatting {input:?}");
        }
    }

    #[test]
    fn test_comments() {
        let test_cases = vec![
            ("; blah", "; blah"),
            ("(  ; foo\n)", "(; foo\n)"),
            ("(a  ; foo\n  )", "(a ; foo\n )"),
            ("(a  ;; foo\n  )", "(a\n ;; foo\n )"),
            ("a ;; top\n(b)", "a\n;; top\n(b)"),
        ];

        for (input, expected) in test_cases {
            assert_eq!(format(input), expected, "formatting {input:?}");
        }
    }

    #[test]
    fn test_partial_input() {
        let test_cases = vec![
            ("", ""),
            ("(", "("),
            (")", ")"),
            ("()", "()"),
            ("(if a )", "(if a\n )"),
            ("(if a", "(if a"),
            ("\"unterminated", "\"unterminated"),
            ("(a]", "(a ]"),
        ];

        for (input, expected) in test_cases {
            assert_eq!(format(input), expected, "formatting {input:?}");
        }
    }

    #[test]
    fn test_idempotency() {
        let inputs = [
            "(if a\n )",
            "\"\"",
            "(let ((a 1) (b 2)) (if (> a b) 'foo 'bar))",
            "(if a (let ((a 1)(b 2)) 'foo 'bar) baz)",
            "(map (lambda (n) (+ n 1)) '(1 2 3))",
            "(a  ;; foo\n  )",
            "(f (a\n b) c d)",
            "(if (g\n x) y z)",
            "(def fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))",
            "(foo (bar\n      baz) qux)",
            "(if\na b c)",
            "(f a\n\n   b)",
            "(f '\n(g a b) c)",
            "(x [1\n     2])",
            "a\n    b\n",
        ];

        for input in inputs {
            let once = format(input);
            assert_eq!(format(&once), once, "formatting {input:?} twice");
        }
    }

    #[test]
    fn test_custom_visitor() {
        let mut formatter = Formatter::new().add_visitor(
            |_parent: Option<AggregateKind>, node: &mut Token, _depth: usize| {
                if let Token::Atom(atom) = node {
                    atom.text.push('!');
                }
            },
        );
        assert_eq!(formatter.format("(a b c)"), "(!a! !b! !c!)!");
    }

    #[test]
    fn test_source_newlines_are_reindented() {
        let test_cases = vec![
            ("(if\na b c)", "(if\n a\n  b\n c)"),
            ("(f a\n\n   b)", "(f a\n\n b)"),
            ("(x [1\n     2])", "(x [1\n    2])"),
            ("a\n    b", "a\nb"),
            ("(a\n)", "(a\n)"),
            ("(a\n   )", "(a\n )"),
            ("(a\n   ", "(a\n"),
            // String bodies are never touched
            ("(f \"a\n   b\")", "(f \"a\n   b\")"),
        ];

        for (input, expected) in test_cases {
            assert_eq!(format(input), expected, "formatting {input:?}");
        }
    }

    #[test]
    fn test_empty_pipeline_only_reindents() {
        let input = "(  odd\n\tspacing ;; c\n  [1  2])";
        assert_eq!(
            Formatter::empty().format(input),
            "(  odd\n spacing ;; c\n [1  2])"
        );
        let flat = "(  odd  spacing\t[1  2])";
        assert_eq!(Formatter::empty().format(flat), flat);
    }

    #[test]
    fn test_too_deep_input_is_unchanged() {
        let deep = format!("{}x", "(  ".repeat(crate::MAX_PARSE_DEPTH + 1));
        assert_eq!(format(&deep), deep);
    }

    #[test]
    fn test_line_break_indentation() {
        let mut formatter = Formatter::empty().add_visitor(
            |_parent: Option<AggregateKind>, node: &mut Token, _depth: usize| {
                if let Token::Aggregate(agg) = node
                    && agg.kind == AggregateKind::Array
                    && let Some(space) = agg.children.get_mut(2)
                {
                    *space = Token::Atom(AtomToken::line_break());
                }
            },
        );
        assert_eq!(formatter.format("(foo [a b])"), "(foo [a\n      b])");
    }
}
