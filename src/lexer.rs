//! Token scanner shared by the reader and the formatter.
//!
//! The scanner recognises delimiters, words, whitespace, string literals and (in
//! source mode) line comments. The engine tokenizer flattens these lexemes into plain
//! token strings, discarding whitespace; the formatter consumes the lexemes directly so
//! that every source character survives.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_till, take_while1},
    character::complete::{char, one_of, satisfy},
    combinator::map,
};

/// Characters that terminate a word in every mode
pub(crate) const DELIMITERS: &str = "()[]'\"";

/// How comments are treated by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Evaluation syntax: `;` is an ordinary word character
    Engine,
    /// Formatter syntax: `;` starts a comment running to the end of the line
    Source,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Lexeme<'a> {
    Open(char),
    Close(char),
    Quote,
    Word(&'a str),
    Space(char),
    Str {
        /// Content with escapes removed
        body: String,
        /// Content exactly as written between the quotes
        raw: &'a str,
        closed: bool,
    },
    /// Comment text after the `;`, excluding the line terminator
    Comment(&'a str),
}

/// Whether `c` ends a word in evaluation syntax
pub(crate) fn is_breaking(c: char) -> bool {
    c.is_whitespace() || DELIMITERS.contains(c)
}

fn is_word_char(c: char, mode: Mode) -> bool {
    !is_breaking(c) && !(mode == Mode::Source && c == ';')
}

fn delimiter(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(one_of("()[]'"), |c: char| match c {
        '(' | '[' => Lexeme::Open(c),
        ')' | ']' => Lexeme::Close(c),
        _ => Lexeme::Quote,
    })
    .parse(input)
}

fn space(input: &str) -> IResult<&str, Lexeme<'_>> {
    map(satisfy(|c: char| c.is_whitespace()), Lexeme::Space).parse(input)
}

fn comment(input: &str) -> IResult<&str, Lexeme<'_>> {
    let (rest, _) = char(';').parse(input)?;
    map(take_till(|c: char| c == '\n'), Lexeme::Comment).parse(rest)
}

fn word(mode: Mode) -> impl FnMut(&str) -> IResult<&str, Lexeme<'_>> {
    move |input| map(take_while1(move |c: char| is_word_char(c, mode)), Lexeme::Word).parse(input)
}

/// Scan a string literal. A backslash keeps the following character verbatim;
/// running out of input yields an unclosed literal rather than an error.
fn string_literal(input: &str) -> IResult<&str, Lexeme<'_>> {
    let (after_quote, _) = char('"').parse(input)?;
    let mut body = String::new();
    let mut chars = after_quote.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                let lexeme = Lexeme::Str {
                    body,
                    raw: &after_quote[..i],
                    closed: true,
                };
                return Ok((&after_quote[i + 1..], lexeme));
            }
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    body.push(escaped);
                }
            }
            other => body.push(other),
        }
    }

    let lexeme = Lexeme::Str {
        body,
        raw: after_quote,
        closed: false,
    };
    Ok(("", lexeme))
}

/// Split `text` into lexemes. Every input character belongs to exactly one lexeme.
pub(crate) fn scan(text: &str, mode: Mode) -> Vec<Lexeme<'_>> {
    let mut lexemes = Vec::new();
    let mut input = text;

    while !input.is_empty() {
        let step = match mode {
            Mode::Engine => alt((delimiter, string_literal, space, word(mode))).parse(input),
            Mode::Source => {
                alt((delimiter, string_literal, comment, space, word(mode))).parse(input)
            }
        };
        match step {
            Ok((rest, lexeme)) => {
                lexemes.push(lexeme);
                input = rest;
            }
            Err(err) => {
                tracing::debug!(%err, remaining = input.len(), "scanner stopped");
                break;
            }
        }
    }

    lexemes
}

/// Split `text` into engine tokens.
///
/// Delimiters are standalone tokens and whitespace separates tokens without being
/// emitted. A closed string literal always yields `"`, its unescaped content (even
/// when empty) and `"`.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    for lexeme in scan(text, Mode::Engine) {
        match lexeme {
            Lexeme::Open(c) | Lexeme::Close(c) => tokens.push(c.to_string()),
            Lexeme::Quote => tokens.push("'".to_owned()),
            Lexeme::Word(word) => tokens.push(word.to_owned()),
            // Engine mode has no comments
            Lexeme::Space(_) | Lexeme::Comment(_) => {}
            Lexeme::Str { body, closed, .. } => {
                tokens.push("\"".to_owned());
                if closed || !body.is_empty() {
                    tokens.push(body);
                }
                if closed {
                    tokens.push("\"".to_owned());
                }
            }
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_data_driven() {
        let test_cases: Vec<(&str, Vec<&str>)> = vec![
            ("", vec![]),
            ("   \n\t ", vec![]),
            ("foo", vec!["foo"]),
            ("(a b c)", vec!["(", "a", "b", "c", ")"]),
            ("( a b c ) ", vec!["(", "a", "b", "c", ")"]),
            ("(a b [c])", vec!["(", "a", "b", "[", "c", "]", ")"]),
            (
                "(a b \"foo bar\")",
                vec!["(", "a", "b", "\"", "foo bar", "\"", ")"],
            ),
            ("(a b \"  \")", vec!["(", "a", "b", "\"", "  ", "\"", ")"]),
            ("'(a b c)", vec!["'", "(", "a", "b", "c", ")"]),
            ("\"\"", vec!["\"", "", "\""]),
            // Escapes keep the following character and drop the backslash
            (r#""a\"b""#, vec!["\"", "a\"b", "\""]),
            (r#""a\\b""#, vec!["\"", "a\\b", "\""]),
            (r#""a\nb""#, vec!["\"", "anb", "\""]),
            // Unterminated strings keep what was read
            ("\"abc", vec!["\"", "abc"]),
            ("\"", vec!["\""]),
            // Semicolons are ordinary word characters for the engine
            ("a;b", vec!["a;b"]),
            ("; not (a comment)", vec![";", "not", "(", "a", "comment", ")"]),
            ("foo'bar", vec!["foo", "'", "bar"]),
            ("(+ 1.5 -2)", vec!["(", "+", "1.5", "-2", ")"]),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(tokenize(input), expected, "tokenize #{} of {input:?}", i + 1);
        }
    }

    #[test]
    fn test_scan_source_mode_keeps_everything() {
        let lexemes = scan("(a ; note\n \"x\\\"y\")", Mode::Source);
        assert_eq!(
            lexemes,
            vec![
                Lexeme::Open('('),
                Lexeme::Word("a"),
                Lexeme::Space(' '),
                Lexeme::Comment(" note"),
                Lexeme::Space('\n'),
                Lexeme::Space(' '),
                Lexeme::Str {
                    body: "x\"y".to_owned(),
                    raw: "x\\\"y",
                    closed: true,
                },
                Lexeme::Close(')'),
            ]
        );
    }

    #[test]
    fn test_engine_mode_never_yields_comments() {
        let lexemes = scan("(a ;; b\n c)", Mode::Engine);
        assert!(!lexemes.iter().any(|l| matches!(l, Lexeme::Comment(_))));
        assert!(lexemes.contains(&Lexeme::Word(";;")));
    }

    #[test]
    fn test_scan_comment_at_end_of_input() {
        assert_eq!(
            scan(";; done", Mode::Source),
            vec![Lexeme::Comment("; done")]
        );
        assert_eq!(scan(";", Mode::Source), vec![Lexeme::Comment("")]);
    }
}
