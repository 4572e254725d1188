//! Pattern store: builds the packed trie one pattern at a time.
//!
//! Each insert walks the existing buffer along the new pattern's tokens and stops at the
//! first point of divergence, where it splits a run, adds a branch, or hangs a capture path
//! off an ALT_BRANCH. All edits go through [`splice`], which returns a new buffer. The store
//! only commits that buffer when the whole insert has succeeded.

use crate::escape::{self, numeric_command, push_literal, Token, ESCAPE_BYTE, ESCAPE_BYTES};
use crate::node::{
    alt_cells, branch_cells, branch_criteria, branch_target, decode, end_cells, run_bytes,
    write_value, Cell, Node, Tag, MAX_SPAN, SIZE_OF_ALT, SIZE_OF_BRANCH, SIZE_OF_END,
    SIZE_OF_RUN,
};
use crate::ring::ByteRing;
use crate::splice::{splice, SpliceMode};
use std::fmt;
use tracing::{debug, error};

/// Build and query faults.
#[derive(Debug, thiserror::Error)]
pub enum TrieError {
    #[error("pattern is empty")]
    EmptyPattern,
    #[error("pattern ends with an unfinished '%' escape")]
    TrailingEscape,
    #[error("'%b' escape is missing its stop byte")]
    MissingStopByte,
    #[error("unknown escape command byte {0:#04x}")]
    UnknownEscape(u8),
    #[error("compiled pattern needs {cells} cells, limit is 32767")]
    PatternTooLong { cells: usize },
    #[error("jump of {jump} cells at {position} exceeds 32767")]
    JumpTooFar { position: usize, jump: usize },
    #[error("corrupt trie at cell {position}: {detail}")]
    CorruptTrie {
        position: usize,
        detail: &'static str,
    },
    #[error("backtrack stack exceeded {depth} alternatives")]
    BacktrackOverflow { depth: usize },
    #[error("window of {length} bytes at {position} does not fit a source of {capacity} bytes")]
    SourceWindow {
        position: usize,
        length: usize,
        capacity: usize,
    },
    #[error("ring of {len} bytes does not match mask {mask:#x}")]
    RingSize { len: usize, mask: usize },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

/// Letter case handling of a store, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseRule {
    #[default]
    Sensitive,
    /// ASCII letters in literals and in the source compare without case.
    Insensitive,
}

impl CaseRule {
    #[inline]
    pub fn fold(self, b: u8) -> u8 {
        match self {
            CaseRule::Sensitive => b,
            CaseRule::Insensitive => b.to_ascii_lowercase(),
        }
    }
}

/// A growable trie of byte patterns, each bound to a `u32` value.
#[derive(Debug, Clone, Default)]
pub struct TrieParser {
    cells: Vec<Cell>,
    case_rule: CaseRule,
    max_captures: usize,
}

impl TrieParser {
    pub fn new(case_rule: CaseRule) -> Self {
        TrieParser {
            cells: Vec::new(),
            case_rule,
            max_captures: 0,
        }
    }

    /// Store with room for `cells` cells before reallocating.
    pub fn with_capacity(case_rule: CaseRule, cells: usize) -> Self {
        TrieParser {
            cells: Vec::with_capacity(cells),
            case_rule,
            max_captures: 0,
        }
    }

    pub fn case_rule(&self) -> CaseRule {
        self.case_rule
    }

    /// Read-only view of the packed buffer.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Number of cells in use.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Largest number of capture directives in any inserted pattern.
    pub fn max_captures(&self) -> usize {
        self.max_captures
    }

    pub fn insert_str(&mut self, pattern: &str, value: u32) -> Result<(), TrieError> {
        self.insert(pattern.as_bytes(), value)
    }

    /// Insert `pattern` bound to `value`. Re-inserting a pattern replaces its value.
    /// On error the store is left exactly as it was.
    pub fn insert(&mut self, pattern: &[u8], value: u32) -> Result<(), TrieError> {
        let tokens = escape::tokenize(pattern, self.case_rule)?;
        let cells = if self.cells.is_empty() {
            escape::compile(&tokens, value)?
        } else {
            insert_tokens(&self.cells, &tokens, value)?
        };
        let captures = tokens.iter().filter(|t| t.is_capture()).count();
        debug!(
            value,
            captures,
            cells = cells.len(),
            grown = cells.len() - self.cells.len(),
            "inserted pattern"
        );
        self.cells = cells;
        self.max_captures = self.max_captures.max(captures);
        Ok(())
    }

    /// Insert a pattern read from a ring buffer window.
    pub fn insert_ring(
        &mut self,
        ring: &ByteRing<'_>,
        position: usize,
        length: usize,
        value: u32,
    ) -> Result<(), TrieError> {
        let pattern = ring.copy_to_vec(position, length)?;
        self.insert(&pattern, value)
    }

    /// Every stored pattern in escape syntax with its value, near paths first.
    pub fn entries(&self) -> Result<Vec<(Vec<u8>, u32)>, TrieError> {
        let mut out = Vec::new();
        if !self.cells.is_empty() {
            let mut prefix = Vec::new();
            self.collect(0, &mut prefix, &mut out)?;
        }
        Ok(out)
    }

    fn collect(
        &self,
        start: usize,
        prefix: &mut Vec<u8>,
        out: &mut Vec<(Vec<u8>, u32)>,
    ) -> Result<(), TrieError> {
        let mark = prefix.len();
        let mut pos = start;
        loop {
            let node = decode(&self.cells, pos)?;
            match node {
                Node::Run { len } => {
                    for &c in run_bytes(&self.cells, pos, len) {
                        push_literal(prefix, c as u8);
                    }
                }
                Node::ValueNumeric { flags } => {
                    prefix.extend([ESCAPE_BYTE, numeric_command(flags)]);
                }
                Node::ValueBytes { stop } => {
                    prefix.extend([ESCAPE_BYTE, ESCAPE_BYTES, stop]);
                }
                Node::SafeEnd { value } => out.push((prefix.clone(), value)),
                Node::End { value } => {
                    out.push((prefix.clone(), value));
                    break;
                }
                Node::BranchValue { jump, .. } | Node::AltBranch { jump } => {
                    self.collect(pos + node.size(), prefix, out)?;
                    pos += jump;
                    continue;
                }
            }
            pos += node.size();
        }
        prefix.truncate(mark);
        Ok(())
    }
}

impl fmt::Display for TrieParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pos = 0;
        while pos < self.cells.len() {
            let node = match decode(&self.cells, pos) {
                Ok(node) => node,
                Err(e) => return writeln!(f, "{:>5}  <{}>", pos, e),
            };
            write!(f, "{:>5}  {}", pos, node)?;
            if let Node::Run { len } = node {
                let text: String = run_bytes(&self.cells, pos, len)
                    .iter()
                    .flat_map(|&c| (c as u8).escape_ascii())
                    .map(char::from)
                    .collect();
                write!(f, " \"{}\"", text)?;
            }
            writeln!(f)?;
            pos += node.size();
        }
        Ok(())
    }
}

fn insert_tokens(cells: &[Cell], tokens: &[Token], value: u32) -> Result<Vec<Cell>, TrieError> {
    let mut pos = 0;
    let mut i = 0;
    loop {
        let rest = &tokens[i..];
        let node = decode(cells, pos).map_err(|e| {
            error!(position = pos, "trie walk hit an invalid node during insert");
            e
        })?;
        match node {
            Node::Run { len } => {
                let bytes = run_bytes(cells, pos, len);
                let k = rest
                    .iter()
                    .zip(bytes)
                    .take_while(|(t, b)| **t == Token::Literal(**b as u8))
                    .count();
                if k == len {
                    i += k;
                    pos += node.size();
                    continue;
                }
                if k == 0 {
                    return diverge(cells, pos, rest, value);
                }
                let split = split_run(cells, pos, len, k)?;
                return diverge(&split, pos + SIZE_OF_RUN + k, &rest[k..], value);
            }
            Node::BranchValue { criteria, jump } => match rest.first() {
                None => return prepend_safe_end(cells, pos, value),
                Some(Token::Literal(b)) => pos = branch_target(pos, criteria, jump, *b),
                Some(_) => return wrap_alt_far(cells, pos, rest, value),
            },
            Node::AltBranch { jump } => {
                let near = pos + SIZE_OF_ALT;
                let near_node = decode(cells, near)?;
                match rest.first() {
                    None => return prepend_safe_end(cells, pos, value),
                    Some(Token::Literal(_)) if near_node.is_literal() => pos = near,
                    Some(Token::Literal(_)) => return prepend_alt_near(cells, pos, rest, value),
                    Some(token) if same_capture(token, &near_node) => pos = near,
                    Some(_) => pos += jump,
                }
            }
            Node::ValueNumeric { .. } | Node::ValueBytes { .. } => match rest.first() {
                None => return prepend_safe_end(cells, pos, value),
                Some(token) if same_capture(token, &node) => {
                    i += 1;
                    pos += node.size();
                }
                Some(_) => return prepend_alt_near(cells, pos, rest, value),
            },
            Node::SafeEnd { .. } => {
                if rest.is_empty() {
                    return Ok(with_value(cells, pos, value));
                }
                pos += SIZE_OF_END;
            }
            Node::End { .. } => {
                if rest.is_empty() {
                    return Ok(with_value(cells, pos, value));
                }
                return extend_end(cells, pos, rest, value);
            }
        }
    }
}

fn same_capture(token: &Token, node: &Node) -> bool {
    match (token, node) {
        (Token::Numeric(a), Node::ValueNumeric { flags }) => a == flags,
        (Token::Bytes(a), Node::ValueBytes { stop }) => a == stop,
        _ => false,
    }
}

/// Shorten the RUN at `pos` to `k` bytes and start a new RUN with the remainder.
fn split_run(cells: &[Cell], pos: usize, len: usize, k: usize) -> Result<Vec<Cell>, TrieError> {
    let header = [Tag::Run as Cell, (len - k) as Cell];
    let mut out = splice(cells, pos + SIZE_OF_RUN + k, &header, SpliceMode::Prepend)?;
    out[pos + 1] = k as Cell;
    Ok(out)
}

/// Place the rest of the pattern in front of the RUN at `at`, which does not match it.
fn diverge(cells: &[Cell], at: usize, rest: &[Token], value: u32) -> Result<Vec<Cell>, TrieError> {
    match rest.first() {
        None => prepend_safe_end(cells, at, value),
        Some(Token::Literal(b)) => {
            let seq = escape::compile(rest, value)?;
            let jump = SIZE_OF_BRANCH + seq.len();
            if jump > MAX_SPAN {
                return Err(TrieError::JumpTooFar { position: at, jump });
            }
            let existing = cells[at + SIZE_OF_RUN] as u8;
            let mut insert = Vec::with_capacity(jump);
            insert.extend(branch_cells(branch_criteria(*b, existing), jump));
            insert.extend(seq);
            splice(cells, at, &insert, SpliceMode::Prepend)
        }
        Some(_) => wrap_alt_far(cells, at, rest, value),
    }
}

fn prepend_safe_end(cells: &[Cell], at: usize, value: u32) -> Result<Vec<Cell>, TrieError> {
    splice(cells, at, &end_cells(Tag::SafeEnd, value), SpliceMode::Prepend)
}

/// New path on the near side of an ALT_BRANCH in front of `at`.
fn prepend_alt_near(
    cells: &[Cell],
    at: usize,
    rest: &[Token],
    value: u32,
) -> Result<Vec<Cell>, TrieError> {
    let seq = escape::compile(rest, value)?;
    let jump = SIZE_OF_ALT + seq.len();
    if jump > MAX_SPAN {
        return Err(TrieError::JumpTooFar { position: at, jump });
    }
    let mut insert = Vec::with_capacity(jump);
    insert.extend(alt_cells(jump));
    insert.extend(seq);
    splice(cells, at, &insert, SpliceMode::Prepend)
}

/// Existing sequence at `at` stays near; the new capture path goes far.
fn wrap_alt_far(
    cells: &[Cell],
    at: usize,
    rest: &[Token],
    value: u32,
) -> Result<Vec<Cell>, TrieError> {
    let end = seq_end(cells, at)?;
    let jump = SIZE_OF_ALT + (end - at);
    if jump > MAX_SPAN {
        return Err(TrieError::JumpTooFar { position: at, jump });
    }
    let seq = escape::compile(rest, value)?;
    let grown = splice(cells, end, &seq, SpliceMode::Append)?;
    splice(&grown, at, &alt_cells(jump), SpliceMode::Prepend)
}

/// Turn the END at `pos` into a SAFE_END and continue the sequence after it.
fn extend_end(cells: &[Cell], pos: usize, rest: &[Token], value: u32) -> Result<Vec<Cell>, TrieError> {
    let seq = escape::compile(rest, value)?;
    let mut marked = cells.to_vec();
    marked[pos] = Tag::SafeEnd as Cell;
    splice(&marked, pos + SIZE_OF_END, &seq, SpliceMode::Append)
}

fn with_value(cells: &[Cell], pos: usize, value: u32) -> Vec<Cell> {
    let mut out = cells.to_vec();
    write_value(&mut out, pos, value);
    out
}

/// First cell past the sequence that starts at `pos`.
fn seq_end(cells: &[Cell], pos: usize) -> Result<usize, TrieError> {
    let mut pos = pos;
    loop {
        let node = decode(cells, pos)?;
        match node {
            Node::End { .. } => return Ok(pos + SIZE_OF_END),
            Node::BranchValue { jump, .. } | Node::AltBranch { jump } => pos += jump,
            _ => pos += node.size(),
        }
    }
}
