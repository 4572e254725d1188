//! Escape-directive compiler.
//!
//! A pattern is plain bytes plus `%` directives. Tokenizing splits it into literal bytes
//! and capture directives; compiling groups literals into RUN nodes and emits
//! VALUE_NUMERIC / VALUE_BYTES nodes for the directives, closed by an END.

use crate::node::{end_cells, Cell, NumericFlags, Tag, MAX_SPAN, SIZE_OF_RUN};
use crate::trie::{CaseRule, TrieError};

pub const ESCAPE_BYTE: u8 = b'%';
pub const ESCAPE_SIGNED: u8 = b'i';
pub const ESCAPE_UNSIGNED: u8 = b'u';
pub const ESCAPE_SIGNED_HEX: u8 = b'I';
pub const ESCAPE_UNSIGNED_HEX: u8 = b'U';
pub const ESCAPE_DECIMAL: u8 = b'.';
pub const ESCAPE_RATIONAL: u8 = b'/';
pub const ESCAPE_BYTES: u8 = b'b';

/// One unit of a tokenized pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    Numeric(NumericFlags),
    Bytes(u8),
}

impl Token {
    pub fn is_capture(&self) -> bool {
        !matches!(self, Token::Literal(_))
    }
}

/// Flags for a numeric escape command, `None` when `cmd` is not one.
pub fn numeric_flags(cmd: u8) -> Option<NumericFlags> {
    let bits = match cmd {
        ESCAPE_SIGNED => NumericFlags::SIGN,
        ESCAPE_UNSIGNED => 0,
        ESCAPE_SIGNED_HEX => NumericFlags::HEX | NumericFlags::SIGN,
        ESCAPE_UNSIGNED_HEX => NumericFlags::HEX,
        ESCAPE_DECIMAL => NumericFlags::DECIMAL,
        ESCAPE_RATIONAL => NumericFlags::SIGN | NumericFlags::RATIONAL,
        _ => return None,
    };
    Some(NumericFlags::from_bits(bits))
}

/// Escape command that produces `flags`; inverse of [`numeric_flags`].
pub fn numeric_command(flags: NumericFlags) -> u8 {
    let bits = flags.bits();
    if bits & NumericFlags::DECIMAL != 0 {
        ESCAPE_DECIMAL
    } else if bits & NumericFlags::RATIONAL != 0 {
        ESCAPE_RATIONAL
    } else {
        match (flags.hex(), flags.signed()) {
            (true, true) => ESCAPE_SIGNED_HEX,
            (true, false) => ESCAPE_UNSIGNED_HEX,
            (false, true) => ESCAPE_SIGNED,
            (false, false) => ESCAPE_UNSIGNED,
        }
    }
}

/// Split `pattern` into tokens. Literal bytes are folded by `case`; stop bytes are not.
pub fn tokenize(pattern: &[u8], case: CaseRule) -> Result<Vec<Token>, TrieError> {
    if pattern.is_empty() {
        return Err(TrieError::EmptyPattern);
    }
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut i = 0;
    while i < pattern.len() {
        let b = pattern[i];
        if b != ESCAPE_BYTE {
            tokens.push(Token::Literal(case.fold(b)));
            i += 1;
            continue;
        }
        let cmd = *pattern.get(i + 1).ok_or(TrieError::TrailingEscape)?;
        match cmd {
            ESCAPE_BYTE => {
                tokens.push(Token::Literal(ESCAPE_BYTE));
                i += 2;
            }
            ESCAPE_BYTES => {
                let stop = *pattern.get(i + 2).ok_or(TrieError::MissingStopByte)?;
                tokens.push(Token::Bytes(stop));
                i += 3;
            }
            _ => {
                let flags = numeric_flags(cmd).ok_or(TrieError::UnknownEscape(cmd))?;
                tokens.push(Token::Numeric(flags));
                i += 2;
            }
        }
    }
    Ok(tokens)
}

/// Compile `tokens` into a standalone sequence ending in END with `value`.
pub fn compile(tokens: &[Token], value: u32) -> Result<Vec<Cell>, TrieError> {
    let mut cells = Vec::with_capacity(tokens.len() + 8);
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            Token::Literal(_) => {
                let run: Vec<Cell> = tokens[i..]
                    .iter()
                    .map_while(|t| match t {
                        Token::Literal(b) => Some(*b as Cell),
                        _ => None,
                    })
                    .collect();
                if run.len() > MAX_SPAN {
                    return Err(TrieError::PatternTooLong { cells: run.len() + SIZE_OF_RUN });
                }
                cells.push(Tag::Run as Cell);
                cells.push(run.len() as Cell);
                i += run.len();
                cells.extend(run);
            }
            Token::Numeric(flags) => {
                cells.extend([Tag::ValueNumeric as Cell, flags.bits()]);
                i += 1;
            }
            Token::Bytes(stop) => {
                cells.extend([Tag::ValueBytes as Cell, stop as Cell]);
                i += 1;
            }
        }
    }
    cells.extend(end_cells(Tag::End, value));
    if cells.len() > MAX_SPAN {
        return Err(TrieError::PatternTooLong { cells: cells.len() });
    }
    Ok(cells)
}

/// Append the escaped text form of a literal byte to `out`.
pub(crate) fn push_literal(out: &mut Vec<u8>, b: u8) {
    if b == ESCAPE_BYTE {
        out.push(ESCAPE_BYTE);
    }
    out.push(b);
}
