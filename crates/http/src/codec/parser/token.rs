//! Prefix automaton used to recognise methods, versions and header names.
//!
//! A [`Lexicon`] is a trie built once from a fixed list of tokens. While input
//! keeps following a path through the trie no bytes are copied; the first
//! byte that leaves every path copies the matched prefix into the parse
//! state's accumulator and the rest of the token is accumulated as-is until
//! the terminator, producing an ad hoc token.

use bytes::Buf;

use crate::codec::parser::{HttpRequestParser, ParseState};
use crate::exchange::RequestHead;
use crate::protocol::ParseError;

/// Trie node index of the empty prefix.
pub(crate) const ROOT: usize = 0;

#[derive(Debug)]
struct Node {
    prefix: &'static [u8],
    edges: Vec<(u8, usize)>,
    value: Option<usize>,
}

impl Node {
    fn new(prefix: &'static [u8]) -> Self {
        Self { prefix, edges: Vec::new(), value: None }
    }

    fn child(&self, byte: u8) -> Option<usize> {
        self.edges.iter().find(|(b, _)| *b == byte).map(|(_, node)| *node)
    }
}

/// An immutable trie over a fixed token list.
#[derive(Debug)]
pub(crate) struct Lexicon<T> {
    nodes: Vec<Node>,
    values: Vec<T>,
}

impl<T> Lexicon<T> {
    pub(crate) fn new(entries: Vec<(&'static str, T)>) -> Self {
        let mut nodes = vec![Node::new(b"")];
        let mut values = Vec::with_capacity(entries.len());

        for (text, value) in entries {
            let text = text.as_bytes();
            let mut current = ROOT;
            for (depth, &byte) in text.iter().enumerate() {
                current = match nodes[current].child(byte) {
                    Some(next) => next,
                    None => {
                        let next = nodes.len();
                        nodes.push(Node::new(&text[..=depth]));
                        nodes[current].edges.push((byte, next));
                        next
                    }
                };
            }
            nodes[current].value = Some(values.len());
            values.push(value);
        }

        Self { nodes, values }
    }

    fn step(&self, node: usize, byte: u8) -> Option<usize> {
        self.nodes[node].child(byte)
    }

    fn value(&self, node: usize) -> Option<&T> {
        self.nodes[node].value.map(|index| &self.values[index])
    }

    fn prefix(&self, node: usize) -> &'static [u8] {
        self.nodes[node].prefix
    }

    #[cfg(test)]
    pub(crate) fn lookup(&self, text: &[u8]) -> Option<&T> {
        let mut node = ROOT;
        for &byte in text {
            node = self.step(node, byte)?;
        }
        self.value(node)
    }
}

/// A recognised token: either a lexicon entry or the raw accumulated bytes.
#[derive(Debug)]
pub(crate) enum Token<'a, T> {
    Known(&'a T),
    Unknown(&'a [u8]),
}

/// One kind of token: its lexicon, terminator and result handler.
pub(crate) trait TokenKind {
    type Value: 'static;

    /// Match lexicon entries ignoring ASCII case. Entries must be lowercase.
    const FOLD_CASE: bool = false;

    fn lexicon() -> &'static Lexicon<Self::Value>;

    fn is_terminator(byte: u8) -> bool;

    /// Bytes silently skipped before the first byte of the token.
    fn is_skippable(_byte: u8) -> bool {
        false
    }

    /// Rejects bytes that can never appear inside the token.
    fn validate(_byte: u8) -> Result<(), ParseError> {
        Ok(())
    }

    /// Stores the finished token and moves the parse state to its next stage.
    fn handle(
        parser: &HttpRequestParser,
        token: Token<'_, Self::Value>,
        terminator: u8,
        state: &mut ParseState,
        head: &mut RequestHead,
    ) -> Result<(), ParseError>;
}

/// Runs the automaton for `K` until its terminator or the end of `buf`.
///
/// Returns `Ok(true)` once the token was handled and `Ok(false)` when the
/// input ran out mid-token; the progress is kept in `state`.
pub(crate) fn parse_token<K: TokenKind, B: Buf>(
    parser: &HttpRequestParser,
    buf: &mut B,
    state: &mut ParseState,
    head: &mut RequestHead,
) -> Result<bool, ParseError> {
    let lexicon = K::lexicon();

    while let Some(byte) = state.next_byte(buf) {
        if K::is_terminator(byte) {
            let acc = std::mem::take(&mut state.acc);
            let token = match state.token_node {
                Some(node) => match lexicon.value(node) {
                    Some(value) => Token::Known(value),
                    None => Token::Unknown(lexicon.prefix(node)),
                },
                None => Token::Unknown(&acc),
            };
            let result = K::handle(parser, token, byte, state, head);
            state.acc = acc;
            state.acc.clear();
            result?;
            return Ok(true);
        }

        match state.token_node {
            Some(ROOT) if K::is_skippable(byte) => continue,
            Some(node) => {
                K::validate(byte)?;
                let key = if K::FOLD_CASE { byte.to_ascii_lowercase() } else { byte };
                match lexicon.step(node, key) {
                    Some(next) => state.token_node = Some(next),
                    None => {
                        state.acc.extend_from_slice(lexicon.prefix(node));
                        state.acc.push(byte);
                        state.token_node = None;
                    }
                }
            }
            None => {
                K::validate(byte)?;
                state.acc.push(byte);
            }
        }
    }

    Ok(false)
}
