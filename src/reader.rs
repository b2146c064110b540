//! Reader: turns engine tokens into an expression tree.
//!
//! Tokens are consumed left to right from a queue. A program holding several top-level
//! forms is read as `(progn f1 f2 ...)`, and `'X` is read as `(quote X)`.

use crate::ast::{Array, Atom, Expr};
use crate::lexer::tokenize;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;

/// Reader limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseConfig {
    /// Forms nested this deep or deeper are rejected
    pub max_depth: usize,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            max_depth: MAX_PARSE_DEPTH,
        }
    }
}

/// Parse `text` with the default [`ParseConfig`]
pub fn parse(text: &str) -> Result<Expr, Error> {
    parse_with_config(text, ParseConfig::default())
}

pub fn parse_with_config(text: &str, config: ParseConfig) -> Result<Expr, Error> {
    let mut reader = Reader {
        tokens: tokenize(text).into(),
        max_depth: config.max_depth,
    };
    if reader.tokens.is_empty() {
        return Err(invalid("Empty input", None).with_context(text).into());
    }

    let mut forms = Vec::new();
    while !reader.tokens.is_empty() {
        let form = reader.read_form(0).map_err(|err| err.with_context(text))?;
        forms.push(form);
    }

    if forms.len() == 1
        && let Some(form) = forms.pop()
    {
        return Ok(form);
    }
    debug!(forms = forms.len(), "wrapping top-level forms in progn");
    forms.insert(0, Expr::Symbol("progn".to_owned()));
    Ok(Expr::list(forms))
}

struct Reader {
    tokens: VecDeque<String>,
    max_depth: usize,
}

impl Reader {
    fn read_form(&mut self, depth: usize) -> Result<Expr, ParseError> {
        if depth >= self.max_depth {
            return Err(ParseError::from_message(
                ParseErrorKind::TooDeeplyNested,
                format!("Expression nested deeper than {} levels", self.max_depth),
            ));
        }

        let token = self
            .tokens
            .pop_front()
            .ok_or_else(|| incomplete("Unexpected end of input"))?;
        match token.as_str() {
            "(" => self.read_list(depth),
            "[" => self.read_array(),
            "\"" => Ok(Atom::Str(self.read_string()?).into()),
            "'" => {
                let quoted = self.read_form(depth + 1)?;
                Ok(Expr::list(vec![Expr::Symbol("quote".to_owned()), quoted]))
            }
            ")" | "]" => Err(invalid("Unexpected closing delimiter", Some(&token))),
            _ => Ok(atomize(&token)),
        }
    }

    fn read_list(&mut self, depth: usize) -> Result<Expr, ParseError> {
        let mut items = Vec::new();
        loop {
            match self.tokens.front().map(String::as_str) {
                None => return Err(incomplete("Unterminated list")),
                Some(")") => {
                    self.tokens.pop_front();
                    return Ok(Expr::list(items));
                }
                Some("]") => return Err(invalid("Mismatched closing delimiter", Some("]"))),
                Some(_) => items.push(self.read_form(depth + 1)?),
            }
        }
    }

    /// Array elements are atoms only, so nesting cannot grow here
    fn read_array(&mut self) -> Result<Expr, ParseError> {
        let mut atoms = Vec::new();
        loop {
            let token = self
                .tokens
                .pop_front()
                .ok_or_else(|| incomplete("Unterminated array"))?;
            match token.as_str() {
                "]" => return Ok(Array::from_atoms(atoms).into()),
                "\"" => atoms.push(Atom::Str(self.read_string()?)),
                ")" => return Err(invalid("Mismatched closing delimiter", Some(&token))),
                "(" | "[" | "'" => {
                    return Err(invalid("Array elements must be atoms", Some(&token)));
                }
                _ => match atomize(&token) {
                    Expr::Atom(atom) => atoms.push(atom),
                    _ => return Err(invalid("Array elements must be atoms", Some(&token))),
                },
            }
        }
    }

    /// Content and closing quote of a string whose opening quote was just read
    fn read_string(&mut self) -> Result<Rc<str>, ParseError> {
        let content = self
            .tokens
            .pop_front()
            .ok_or_else(|| incomplete("Unterminated string"))?;
        match self.tokens.pop_front().as_deref() {
            Some("\"") => Ok(Rc::from(content)),
            _ => Err(incomplete("Unterminated string")),
        }
    }
}

/// Read a non-delimiter token as a number, a reserved atom or a symbol
fn atomize(token: &str) -> Expr {
    if let Ok(n) = token.parse::<i64>() {
        return n.into();
    }
    if looks_numeric(token)
        && let Ok(x) = token.parse::<f64>()
    {
        return x.into();
    }
    match token {
        "null" => Expr::null(),
        "true" => true.into(),
        "false" => false.into(),
        _ => Expr::Symbol(token.to_owned()),
    }
}

// Keeps `inf`, `-infinity` and `NaN` as symbols.
fn looks_numeric(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '+' | '-' | '.'))
        && token.contains(|c: char| c.is_ascii_digit())
}

fn incomplete(message: &str) -> ParseError {
    ParseError::from_message(ParseErrorKind::Incomplete, message)
}

fn invalid(message: &str, found: Option<&str>) -> ParseError {
    ParseError::new(
        ParseErrorKind::InvalidSyntax,
        message,
        None,
        found.map(str::to_owned),
    )
}
