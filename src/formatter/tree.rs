//! Whitespace-preserving token tree.
//!
//! Every source character ends up in exactly one atom, so writing the atoms back out
//! in order reproduces the input until a visitor changes something.

use crate::lexer::{Lexeme, Mode, scan};
use crate::{MAX_PARSE_DEPTH, ParseError, ParseErrorKind};
use std::iter::Peekable;

/// What an aggregate was opened by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateKind {
    /// The whole input; has no delimiters
    Root,
    List,
    Array,
    Str,
    Comment,
    /// A `'`, any whitespace after it and the form it quotes
    Quote,
}

impl AggregateKind {
    /// Closing delimiter, for the kinds that have one
    pub fn closer(self) -> Option<&'static str> {
        match self {
            AggregateKind::List => Some(")"),
            AggregateKind::Array => Some("]"),
            AggregateKind::Str => Some("\""),
            AggregateKind::Root | AggregateKind::Comment | AggregateKind::Quote => None,
        }
    }

    /// Whether children of this kind start with an opening delimiter
    pub fn has_opener(self) -> bool {
        self != AggregateKind::Root
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtomToken {
    pub text: String,
    /// Newline inserted by a visitor. Source newlines are ordinary atoms; the writer
    /// indents both.
    pub line_break: bool,
}

impl AtomToken {
    pub fn new(text: impl Into<String>) -> Self {
        AtomToken {
            text: text.into(),
            line_break: false,
        }
    }

    pub fn line_break() -> Self {
        AtomToken {
            text: "\n".to_owned(),
            line_break: true,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        self.line_break || (!self.text.is_empty() && self.text.chars().all(char::is_whitespace))
    }

    pub fn is_newline(&self) -> bool {
        self.line_break || self.text.contains(['\n', '\r'])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateToken {
    pub kind: AggregateKind,
    pub children: Vec<Token>,
}

impl AggregateToken {
    pub fn new(kind: AggregateKind) -> Self {
        AggregateToken {
            kind,
            children: Vec::new(),
        }
    }

    /// Whether the last child is this aggregate's closing delimiter
    pub fn is_closed(&self) -> bool {
        match (self.kind.closer(), self.children.as_slice()) {
            (Some(closer), [_, .., Token::Atom(last)]) => last.text == closer,
            _ => false,
        }
    }

    /// Indices of the children between the delimiters
    pub fn inner_range(&self) -> std::ops::Range<usize> {
        let start = usize::from(self.kind.has_opener()).min(self.children.len());
        let end = if self.is_closed() {
            self.children.len() - 1
        } else {
            self.children.len()
        };
        start..end.max(start)
    }

    /// Indices of the logical elements: children other than delimiters, whitespace
    /// and comments
    pub fn elements(&self) -> Vec<usize> {
        self.inner_range()
            .filter(|&i| match &self.children[i] {
                Token::Atom(atom) => !atom.is_whitespace(),
                Token::Aggregate(agg) => agg.kind != AggregateKind::Comment,
            })
            .collect()
    }

    /// Text of the first logical element when it is a plain atom
    pub fn head(&self) -> Option<&str> {
        let first = *self.elements().first()?;
        match &self.children[first] {
            Token::Atom(atom) => Some(&atom.text),
            Token::Aggregate(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Atom(AtomToken),
    Aggregate(AggregateToken),
}

impl Token {
    pub fn atom(text: impl Into<String>) -> Self {
        Token::Atom(AtomToken::new(text))
    }

    pub fn as_aggregate(&self) -> Option<&AggregateToken> {
        match self {
            Token::Aggregate(agg) => Some(agg),
            Token::Atom(_) => None,
        }
    }

    pub fn kind(&self) -> Option<AggregateKind> {
        self.as_aggregate().map(|agg| agg.kind)
    }

    pub fn is_whitespace(&self) -> bool {
        matches!(self, Token::Atom(atom) if atom.is_whitespace())
    }

    /// Whether this token renders across more than one line
    pub fn spans_lines(&self) -> bool {
        match self {
            Token::Atom(atom) => atom.is_newline(),
            Token::Aggregate(agg) => agg.children.iter().any(Token::spans_lines),
        }
    }
}

/// Build the tree for `text`. Unterminated aggregates are accepted; only nesting
/// beyond [`MAX_PARSE_DEPTH`] fails.
pub fn build(text: &str) -> Result<Token, ParseError> {
    let mut lexemes = scan(text, Mode::Source).into_iter().peekable();
    let mut root = AggregateToken::new(AggregateKind::Root);
    while lexemes.peek().is_some() {
        if let Some(node) = read_node(&mut lexemes, 1)? {
            root.children.push(node);
        }
    }
    Ok(Token::Aggregate(root))
}

type Lexemes<'a> = Peekable<std::vec::IntoIter<Lexeme<'a>>>;

fn read_node(lexemes: &mut Lexemes<'_>, depth: usize) -> Result<Option<Token>, ParseError> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(ParseError::from_message(
            ParseErrorKind::TooDeeplyNested,
            format!("Expression nested deeper than {MAX_PARSE_DEPTH} levels"),
        ));
    }
    let Some(lexeme) = lexemes.next() else {
        return Ok(None);
    };

    let node = match lexeme {
        Lexeme::Open(open) => {
            let (kind, close) = if open == '(' {
                (AggregateKind::List, ')')
            } else {
                (AggregateKind::Array, ']')
            };
            let mut agg = AggregateToken::new(kind);
            agg.children.push(Token::atom(open));
            loop {
                match lexemes.peek() {
                    None => break,
                    Some(Lexeme::Close(c)) if *c == close => {
                        lexemes.next();
                        agg.children.push(Token::atom(close));
                        break;
                    }
                    Some(_) => {
                        if let Some(child) = read_node(lexemes, depth + 1)? {
                            agg.children.push(child);
                        }
                    }
                }
            }
            Token::Aggregate(agg)
        }
        Lexeme::Quote => {
            let mut agg = AggregateToken::new(AggregateKind::Quote);
            agg.children.push(Token::atom("'"));
            while let Some(Lexeme::Space(c)) = lexemes.peek() {
                agg.children.push(Token::atom(*c));
                lexemes.next();
            }
            let quotable = !matches!(
                lexemes.peek(),
                None | Some(Lexeme::Close(_) | Lexeme::Comment(_))
            );
            if quotable && let Some(child) = read_node(lexemes, depth + 1)? {
                agg.children.push(child);
            }
            Token::Aggregate(agg)
        }
        Lexeme::Str { raw, closed, .. } => {
            let mut agg = AggregateToken::new(AggregateKind::Str);
            agg.children.push(Token::atom("\""));
            if !raw.is_empty() {
                agg.children.push(Token::atom(raw));
            }
            if closed {
                agg.children.push(Token::atom("\""));
            }
            Token::Aggregate(agg)
        }
        Lexeme::Comment(body) => {
            let mut agg = AggregateToken::new(AggregateKind::Comment);
            agg.children.push(Token::atom(";"));
            if !body.is_empty() {
                agg.children.push(Token::atom(body));
            }
            Token::Aggregate(agg)
        }
        Lexeme::Close(c) | Lexeme::Space(c) => Token::atom(c),
        Lexeme::Word(word) => Token::atom(word),
    };
    Ok(Some(node))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn render(token: &Token) -> String {
        match token {
            Token::Atom(atom) => atom.text.clone(),
            Token::Aggregate(agg) => agg.children.iter().map(render).collect(),
        }
    }

    fn root_children(text: &str) -> Vec<Token> {
        match build(text).unwrap() {
            Token::Aggregate(root) => root.children,
            Token::Atom(_) => panic!("root should be an aggregate"),
        }
    }

    #[test]
    fn test_every_character_round_trips() {
        let inputs = [
            "",
            "(a b c)",
            "( a  b\n\tc )",
            "[1 2 \"x y\"] 'foo",
            "(a ; comment\n b)",
            "\"esc\\\"aped\" ;; trailing",
            "(unterminated (list",
            "\"open string",
            ")) stray ]",
            "' ' (a)",
            "(a]",
        ];
        for input in inputs {
            assert_eq!(render(&build(input).unwrap()), input, "round trip of {input:?}");
        }
    }

    #[test]
    fn test_aggregate_shapes() {
        let children = root_children("(a [1] \"s\" 'x) ; c\n)");
        let kinds: Vec<_> = children.iter().map(Token::kind).collect();
        assert_eq!(
            kinds,
            vec![
                Some(AggregateKind::List),
                None,
                Some(AggregateKind::Comment),
                None,
                None,
            ]
        );

        let list = children[0].as_aggregate().unwrap();
        assert!(list.is_closed());
        assert_eq!(list.head(), Some("a"));
        let element_kinds: Vec<_> = list
            .elements()
            .into_iter()
            .map(|i| list.children[i].kind())
            .collect();
        assert_eq!(
            element_kinds,
            vec![
                None,
                Some(AggregateKind::Array),
                Some(AggregateKind::Str),
                Some(AggregateKind::Quote),
            ]
        );

        // The stray closer at the end is a plain atom
        assert_eq!(children[4], Token::atom(')'));
    }

    #[test]
    fn test_quote_takes_whitespace_and_next_form() {
        let children = root_children("' (a b)");
        let [Token::Aggregate(quote)] = children.as_slice() else {
            panic!("expected a single quote aggregate, got {children:?}");
        };
        assert_eq!(quote.kind, AggregateKind::Quote);
        assert_eq!(quote.children.len(), 3);
        assert_eq!(quote.children[1], Token::atom(' '));
        assert_eq!(quote.children[2].kind(), Some(AggregateKind::List));

        // Nothing to quote before a closer
        let children = root_children("(')");
        let list = children[0].as_aggregate().unwrap();
        assert!(list.is_closed());
        assert_eq!(list.children[1].as_aggregate().unwrap().children.len(), 1);
    }

    #[test]
    fn test_unterminated_aggregates() {
        let children = root_children("(if a");
        let list = children[0].as_aggregate().unwrap();
        assert!(!list.is_closed());
        assert_eq!(list.elements().len(), 2);
        assert_eq!(list.inner_range(), 1..4);
    }

    #[test]
    fn test_depth_limit() {
        let deep = "(".repeat(MAX_PARSE_DEPTH);
        let err = build(&deep).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested);
        assert!(build(&"(".repeat(MAX_PARSE_DEPTH - 2)).is_ok());
    }

    #[test]
    fn test_spans_lines() {
        let children = root_children("(a\n b) (c)");
        assert!(children[0].spans_lines());
        assert!(!children[2].spans_lines());

        let mut broken = AggregateToken::new(AggregateKind::List);
        broken.children.push(Token::Atom(AtomToken::line_break()));
        assert!(Token::Aggregate(broken).spans_lines());
    }
}
