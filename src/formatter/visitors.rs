//! Rewrite passes run over the token tree.
//!
//! Each pass sees every node in pre-order and rewrites the children of the
//! aggregates it cares about. Passes only ever add, remove or replace whitespace.

use super::tree::{AggregateKind, AggregateToken, AtomToken, Token};

/// A rewrite pass over the token tree.
///
/// `parent` is the kind of the aggregate holding `node` (`None` for the root) and
/// `depth` is the number of aggregates above `node`.
pub trait Visitor {
    fn visit(&mut self, parent: Option<AggregateKind>, node: &mut Token, depth: usize);
}

impl<F> Visitor for F
where
    F: FnMut(Option<AggregateKind>, &mut Token, usize),
{
    fn visit(&mut self, parent: Option<AggregateKind>, node: &mut Token, depth: usize) {
        self(parent, node, depth);
    }
}

/// The passes every [`Formatter`](super::Formatter) starts with, in order
pub fn default_visitors() -> Vec<Box<dyn Visitor>> {
    vec![
        Box::new(WhitespaceNormalizer),
        Box::new(LetFormatter),
        Box::new(IfFormatter),
        Box::new(ProgramFormatter),
        Box::new(LambdaFormatter),
        Box::new(CommentFormatter),
        Box::new(ContinuationFormatter),
    ]
}

/// Collapses runs of spaces, trims the space after an opener and separates
/// adjacent elements. A quote is joined to the form it quotes, across line
/// breaks too.
pub struct WhitespaceNormalizer;

impl Visitor for WhitespaceNormalizer {
    fn visit(&mut self, _parent: Option<AggregateKind>, node: &mut Token, _depth: usize) {
        let Token::Aggregate(agg) = node else {
            return;
        };
        if matches!(agg.kind, AggregateKind::Str | AggregateKind::Comment) {
            return;
        }

        if agg.kind == AggregateKind::Quote
            && agg.children.last().is_some_and(|last| !last.is_whitespace())
            && agg.children.len() > 2
        {
            agg.children.retain(|child| !child.is_whitespace());
            return;
        }

        collapse_spaces(&mut agg.children);
        if agg.kind != AggregateKind::Root
            && matches!(agg.children.get(1), Some(Token::Atom(atom)) if atom.text == " ")
        {
            agg.children.remove(1);
        }
        if matches!(agg.kind, AggregateKind::List | AggregateKind::Array) {
            separate_elements(agg);
        }
    }
}

fn is_space(token: &Token) -> bool {
    matches!(token, Token::Atom(atom) if atom.is_whitespace() && !atom.is_newline())
}

fn collapse_spaces(children: &mut Vec<Token>) {
    let mut collapsed: Vec<Token> = Vec::with_capacity(children.len());
    for child in children.drain(..) {
        if is_space(&child) {
            if collapsed.last().is_some_and(is_space) {
                continue;
            }
            collapsed.push(Token::atom(' '));
        } else {
            collapsed.push(child);
        }
    }
    *children = collapsed;
}

fn separate_elements(agg: &mut AggregateToken) {
    let range = agg.inner_range();
    for i in (range.start + 1..range.end).rev() {
        if !agg.children[i - 1].is_whitespace() && !agg.children[i].is_whitespace() {
            agg.children.insert(i, Token::atom(' '));
        }
    }
}

/// Index where the run of whitespace ending just before `index` begins
fn whitespace_run_start(children: &[Token], index: usize) -> usize {
    let mut start = index;
    while start > 0 && children[start - 1].is_whitespace() {
        start -= 1;
    }
    start
}

/// Replace the whitespace before `children[index]` with a line break followed by
/// `extra` spaces
fn break_before(agg: &mut AggregateToken, index: usize, extra: usize) {
    let start = whitespace_run_start(&agg.children, index);
    let replacement = std::iter::once(Token::Atom(AtomToken::line_break()))
        .chain(std::iter::repeat_n(Token::atom(' '), extra));
    agg.children.splice(start..index, replacement);
}

/// Break before each of `indices`. Later indices are handled first so earlier ones
/// stay valid.
fn break_before_each(agg: &mut AggregateToken, indices: &[usize]) {
    for &index in indices.iter().rev() {
        break_before(agg, index, 0);
    }
}

/// The list aggregate in `node` when its head is one of `heads`
fn list_headed_by<'a>(node: &'a mut Token, heads: &[&str]) -> Option<&'a mut AggregateToken> {
    match node {
        Token::Aggregate(agg) if agg.kind == AggregateKind::List => {
            let matched = agg
                .head()
                .is_some_and(|h| heads.iter().any(|&head| head == h));
            matched.then_some(agg)
        }
        _ => None,
    }
}

/// `(let ((a 1)` / `(b 2))` / body forms each on their own line
pub struct LetFormatter;

impl Visitor for LetFormatter {
    fn visit(&mut self, _parent: Option<AggregateKind>, node: &mut Token, _depth: usize) {
        let Some(agg) = list_headed_by(node, &["let", "let*"]) else {
            return;
        };
        let elements = agg.elements();
        if elements.len() < 3 {
            return;
        }

        break_before_each(agg, &elements[2..]);
        if let Token::Aggregate(bindings) = &mut agg.children[elements[1]]
            && bindings.kind == AggregateKind::List
        {
            let pairs = bindings.elements();
            if let Some(rest) = pairs.get(1..) {
                break_before_each(bindings, rest);
            }
        }
    }
}

/// Consequent one column deeper than the alternatives
pub struct IfFormatter;

impl Visitor for IfFormatter {
    fn visit(&mut self, _parent: Option<AggregateKind>, node: &mut Token, _depth: usize) {
        let Some(agg) = list_headed_by(node, &["if"]) else {
            return;
        };

        // Opener, `if`, condition, consequent, alternatives..., closer
        let mut positions = vec![0];
        positions.extend(agg.elements());
        let closer = agg.is_closed().then(|| agg.children.len() - 1);
        positions.extend(closer);
        if positions.len() <= 3 {
            return;
        }

        let alternatives: Vec<usize> = positions[4..]
            .iter()
            .copied()
            .filter(|&i| Some(i) != closer)
            .collect();
        break_before_each(agg, &alternatives);

        let fourth = positions[3];
        let extra = usize::from(Some(fourth) != closer);
        break_before(agg, fourth, extra);
    }
}

/// Every form of a `progn` on its own line
pub struct ProgramFormatter;

impl Visitor for ProgramFormatter {
    fn visit(&mut self, _parent: Option<AggregateKind>, node: &mut Token, _depth: usize) {
        let Some(agg) = list_headed_by(node, &["progn"]) else {
            return;
        };
        let elements = agg.elements();
        break_before_each(agg, &elements[1..]);
    }
}

/// Lambda bodies start below the parameter list
pub struct LambdaFormatter;

impl Visitor for LambdaFormatter {
    fn visit(&mut self, _parent: Option<AggregateKind>, node: &mut Token, _depth: usize) {
        let Some(agg) = list_headed_by(node, &["lambda"]) else {
            return;
        };
        let elements = agg.elements();
        if let Some(body) = elements.get(2..) {
            break_before_each(agg, body);
        }
    }
}

/// A `;;` comment after other content moves to its own line
pub struct CommentFormatter;

impl CommentFormatter {
    fn is_line_comment(token: &Token) -> bool {
        match token {
            Token::Aggregate(agg) if agg.kind == AggregateKind::Comment => matches!(
                agg.children.get(1),
                Some(Token::Atom(body)) if body.text.starts_with(';')
            ),
            _ => false,
        }
    }
}

impl Visitor for CommentFormatter {
    fn visit(&mut self, _parent: Option<AggregateKind>, node: &mut Token, _depth: usize) {
        let Token::Aggregate(agg) = node else {
            return;
        };
        if !matches!(
            agg.kind,
            AggregateKind::Root | AggregateKind::List | AggregateKind::Array
        ) {
            return;
        }

        let range = agg.inner_range();
        let mut seen_content = false;
        let mut targets = Vec::new();
        for i in range {
            let child = &agg.children[i];
            if Self::is_line_comment(child) && seen_content {
                targets.push(i);
            }
            seen_content |= !child.is_whitespace();
        }
        break_before_each(agg, &targets);
    }
}

/// Once an element spans several lines, the elements after it start their own
pub struct ContinuationFormatter;

impl Visitor for ContinuationFormatter {
    fn visit(&mut self, _parent: Option<AggregateKind>, node: &mut Token, _depth: usize) {
        let Token::Aggregate(agg) = node else {
            return;
        };
        if agg.kind != AggregateKind::List {
            return;
        }

        let elements = agg.elements();
        let targets: Vec<usize> = elements
            .windows(2)
            .filter(|pair| agg.children[pair[0]].spans_lines())
            .map(|pair| pair[1])
            .filter(|&i| !already_broken(&agg.children, i))
            .collect();
        break_before_each(agg, &targets);
    }
}

fn already_broken(children: &[Token], index: usize) -> bool {
    let start = whitespace_run_start(children, index);
    children[start..index]
        .iter()
        .any(|child| matches!(child, Token::Atom(atom) if atom.line_break))
}
