//! Query sessions over a compiled trie.
//!
//! A [`TrieReader`] holds a source window (ring, position, remaining length), the capture
//! buffer of the last query, and a bounded backtrack stack. One reader can run any number
//! of queries against any number of tries; the trie itself is never written.
//!
//! ## Matching
//!
//! The walk consumes bytes node by node. ALT_BRANCH nodes push their far side as a frame
//! and continue near. A node that cannot match resumes the most recent frame; with no
//! frames left the latest SAFE_END seen is committed, and with no SAFE_END the query is
//! not found. Not found leaves the window untouched, so a streaming caller can
//! [`grow`](TrieReader::grow) the window and retry.
//!
//! ## Captures
//!
//! | Directive | Capture |
//! |-----------|---------|
//! | `%i` `%u` `%I` `%U` `%.` `%/` | [`Capture::Number`] |
//! | `%b` + stop | [`Capture::Bytes`], stop byte consumed but not captured |
//!
//! Sibling `%b` alternatives at the same point are scanned together: the first stop byte
//! found in the source picks the branch.
//!
//! ## Example
//!
//! ```ignore
//! use bytetrie::{ByteRing, CaseRule, TrieParser, TrieReader};
//!
//! let mut trie = TrieParser::new(CaseRule::Sensitive);
//! trie.insert_str("len=%u;", 1)?;
//! let mut reader = TrieReader::new();
//! reader.setup(ByteRing::linear(b"len=42;"), 0, 7)?;
//! assert_eq!(reader.parse_next(&trie)?, Some(1));
//! assert_eq!(reader.captured_i64(0), Some(42));
//! ```

use crate::capture::{write_packed_i64, Capture};
use crate::node::{
    branch_target, decode, run_bytes, Cell, Node, NumericFlags, SIZE_OF_ALT, SIZE_OF_BYTES,
    SIZE_OF_END, SIZE_OF_NUMERIC, SIZE_OF_RUN,
};
use crate::ring::ByteRing;
use crate::trie::{CaseRule, TrieError, TrieParser};
use byteorder::{BigEndian, WriteBytesExt};
use std::fmt;
use std::io::{self, Write};
use tracing::{error, trace};

/// Default limit on pending alternatives.
pub const MAX_ALT_DEPTH: usize = 256;

/// Longest numeric text examined, sign and prefix included.
const MAX_NUMERIC_SCAN: usize = 32;
const MAX_DECIMAL_DIGITS: u8 = 19;
const MAX_HEX_DIGITS: u8 = 16;

/// Deferred far side of an ALT_BRANCH. `consumed` is relative to the query origin.
#[derive(Debug, Clone, Copy)]
struct Frame {
    consumed: usize,
    captures: usize,
    trie: usize,
}

/// Latest SAFE_END passed; its captures are copied to `TrieReader::safe_captures`.
#[derive(Debug, Clone, Copy)]
struct SafePoint {
    value: u32,
    consumed: usize,
}

/// Saved window of a reader, see [`TrieReader::memo`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionMemo {
    pub position: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone)]
pub struct TrieReader<'a> {
    ring: ByteRing<'a>,
    position: usize,
    remaining: usize,
    captures: Vec<Capture>,
    safe_captures: Vec<Capture>,
    stack: Vec<Frame>,
    max_depth: usize,
    stops: Vec<(u8, usize)>,
}

impl Default for TrieReader<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> TrieReader<'a> {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_ALT_DEPTH)
    }

    /// Reader that fails with [`TrieError::BacktrackOverflow`] past `max_depth` pending
    /// alternatives.
    pub fn with_max_depth(max_depth: usize) -> Self {
        TrieReader {
            ring: ByteRing::linear(&[]),
            position: 0,
            remaining: 0,
            captures: Vec::new(),
            safe_captures: Vec::new(),
            stack: Vec::with_capacity(max_depth.min(MAX_ALT_DEPTH)),
            max_depth,
            stops: Vec::new(),
        }
    }

    /// Point the reader at `length` bytes of `ring` starting at `position`.
    pub fn setup(
        &mut self,
        ring: ByteRing<'a>,
        position: usize,
        length: usize,
    ) -> Result<(), TrieError> {
        ring.check(position, length)?;
        self.ring = ring;
        self.position = position;
        self.remaining = length;
        self.captures.clear();
        Ok(())
    }

    /// Extend the window by `additional` bytes that became available in the same ring.
    pub fn grow(&mut self, additional: usize) -> Result<(), TrieError> {
        let length = self.remaining + additional;
        self.ring.check(self.position, length)?;
        self.remaining = length;
        Ok(())
    }

    pub fn memo(&self) -> PositionMemo {
        PositionMemo {
            position: self.position,
            remaining: self.remaining,
        }
    }

    pub fn restore(&mut self, memo: PositionMemo) {
        self.position = memo.position;
        self.remaining = memo.remaining;
    }

    pub fn has_content(&self) -> bool {
        self.remaining > 0
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// Advance up to `count` bytes; returns how many were skipped.
    pub fn skip(&mut self, count: usize) -> usize {
        let n = count.min(self.remaining);
        self.advance(n);
        n
    }

    /// Advance past the next `stop` byte, returning the number of bytes before it.
    /// Without a `stop` in the window nothing moves.
    pub fn gather(&mut self, stop: u8) -> Option<usize> {
        let found = (0..self.remaining).find(|&i| self.ring.byte_at(self.position + i) == stop)?;
        self.advance(found + 1);
        Some(found)
    }

    /// Lossy text of the next `max_len` bytes, for diagnostics.
    pub fn peek_utf8(&self, max_len: usize) -> String {
        let n = max_len.min(self.remaining);
        let bytes: Vec<u8> = (0..n).map(|i| self.ring.byte_at(self.position + i)).collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn advance(&mut self, n: usize) {
        self.position += n;
        self.remaining -= n;
    }

    /// Set up a window and match it once; see [`parse_next`](Self::parse_next).
    pub fn query(
        &mut self,
        trie: &TrieParser,
        ring: ByteRing<'a>,
        position: usize,
        length: usize,
    ) -> Result<Option<u32>, TrieError> {
        self.setup(ring, position, length)?;
        self.parse_next(trie)
    }

    /// Match the window head against `trie`. On a match the window advances past the
    /// matched bytes and the value is returned; otherwise the window is left as it was.
    pub fn parse_next(&mut self, trie: &TrieParser) -> Result<Option<u32>, TrieError> {
        match self.walk(trie)? {
            Some((value, consumed)) => {
                trace!(value, consumed, captures = self.captures.len(), "matched");
                self.advance(consumed);
                Ok(Some(value))
            }
            None => {
                self.captures.clear();
                Ok(None)
            }
        }
    }

    fn walk(&mut self, trie: &TrieParser) -> Result<Option<(u32, usize)>, TrieError> {
        self.captures.clear();
        self.stack.clear();
        if trie.is_empty() {
            return Ok(None);
        }
        let cells = trie.cells();
        let case = trie.case_rule();
        let origin = self.position;
        let available = self.remaining;
        let mut pos = 0;
        let mut consumed = 0;
        let mut safe: Option<SafePoint> = None;
        loop {
            let node = decode(cells, pos).map_err(|e| {
                error!(position = pos, error = %e, "query walked into an invalid node");
                e
            })?;
            let matched = match node {
                Node::Run { len } => {
                    let ok = available - consumed >= len
                        && self.run_matches(run_bytes(cells, pos, len), origin + consumed, case);
                    if ok {
                        consumed += len;
                        pos += SIZE_OF_RUN + len;
                    }
                    ok
                }
                Node::BranchValue { criteria, jump } => {
                    let ok = consumed < available;
                    if ok {
                        let b = case.fold(self.ring.byte_at(origin + consumed));
                        pos = branch_target(pos, criteria, jump, b);
                    }
                    ok
                }
                Node::AltBranch { jump } => {
                    self.push(Frame {
                        consumed,
                        captures: self.captures.len(),
                        trie: pos + jump,
                    })?;
                    pos += SIZE_OF_ALT;
                    true
                }
                Node::ValueNumeric { flags } if consumed < available => {
                    match self.parse_numeric(origin + consumed, available - consumed, flags) {
                        Some(n) => {
                            consumed += n;
                            pos += SIZE_OF_NUMERIC;
                            true
                        }
                        None => false,
                    }
                }
                Node::ValueBytes { stop } if consumed < available => {
                    match self.parse_bytes(cells, pos, stop, origin + consumed, available - consumed)? {
                        Some((n, next)) => {
                            consumed += n;
                            pos = next;
                            true
                        }
                        None => false,
                    }
                }
                Node::SafeEnd { value } => {
                    if consumed == available {
                        return Ok(Some((value, consumed)));
                    }
                    safe = Some(SafePoint { value, consumed });
                    self.safe_captures.clear();
                    self.safe_captures.extend_from_slice(&self.captures);
                    pos += SIZE_OF_END;
                    true
                }
                Node::End { value } => return Ok(Some((value, consumed))),
                // a capture needs at least one source byte, even an absent `%.` or `%/`
                Node::ValueNumeric { .. } | Node::ValueBytes { .. } => false,
            };
            if matched {
                continue;
            }
            if let Some(frame) = self.stack.pop() {
                trace!(from = pos, to = frame.trie, consumed = frame.consumed, "backtrack");
                consumed = frame.consumed;
                self.captures.truncate(frame.captures);
                pos = frame.trie;
            } else if let Some(point) = safe {
                std::mem::swap(&mut self.captures, &mut self.safe_captures);
                return Ok(Some((point.value, point.consumed)));
            } else {
                return Ok(None);
            }
        }
    }

    fn push(&mut self, frame: Frame) -> Result<(), TrieError> {
        if self.stack.len() >= self.max_depth {
            error!(depth = self.max_depth, "too many pending alternatives");
            return Err(TrieError::BacktrackOverflow {
                depth: self.max_depth,
            });
        }
        self.stack.push(frame);
        Ok(())
    }

    fn run_matches(&self, expected: &[Cell], start: usize, case: CaseRule) -> bool {
        expected
            .iter()
            .enumerate()
            .all(|(i, &c)| case.fold(self.ring.byte_at(start + i)) == c as u8)
    }

    /// Parse a number at `start`, reading at most `avail` bytes. Pushes the capture and
    /// returns the bytes consumed.
    fn parse_numeric(&mut self, start: usize, avail: usize, flags: NumericFlags) -> Option<usize> {
        let ring = self.ring;
        let peek = |i: usize| (i < avail).then(|| ring.byte_at(start + i));
        let mut i = 0;
        let marker = if flags.decimal() {
            Some((b'.', 0))
        } else if flags.rational() {
            Some((b'/', 1))
        } else {
            None
        };
        if let Some((mark, absent)) = marker {
            if peek(0) != Some(mark) {
                self.captures.push(Capture::Number {
                    negative: false,
                    magnitude: absent,
                    base: 10,
                    digits: 1,
                });
                return Some(0);
            }
            i = 1;
        }
        let mut negative = false;
        if flags.signed() {
            match peek(i) {
                Some(b'-') => {
                    negative = true;
                    i += 1;
                }
                Some(b'+') => i += 1,
                _ => {}
            }
        }
        let hex = flags.hex() && peek(i) == Some(b'0') && peek(i + 1) == Some(b'x');
        if hex {
            i += 2;
        }
        let (base, max_digits) = if hex {
            (16u8, MAX_HEX_DIGITS)
        } else {
            (10u8, MAX_DECIMAL_DIGITS)
        };
        let limit = avail.min(MAX_NUMERIC_SCAN);
        let mut magnitude: u64 = 0;
        let mut digits: u8 = 0;
        while i < limit {
            let Some(d) = (ring.byte_at(start + i) as char).to_digit(base as u32) else {
                break;
            };
            if digits == max_digits {
                return None;
            }
            magnitude = magnitude * base as u64 + d as u64;
            digits += 1;
            i += 1;
        }
        if digits == 0 {
            return None;
        }
        self.captures.push(Capture::Number {
            negative,
            magnitude,
            base,
            digits,
        });
        Some(i)
    }

    /// Capture bytes up to a stop byte. Pending frames that would retry the same spot with
    /// another `%b` are folded into this scan. Returns bytes consumed (stop included) and
    /// the trie position after the winning VALUE_BYTES node.
    fn parse_bytes(
        &mut self,
        cells: &[Cell],
        pos: usize,
        stop: u8,
        start: usize,
        avail: usize,
    ) -> Result<Option<(usize, usize)>, TrieError> {
        self.stops.clear();
        self.stops.push((stop, pos + SIZE_OF_BYTES));
        let consumed_here = start - self.position;
        while let Some(&top) = self.stack.last() {
            if top.consumed != consumed_here || top.captures != self.captures.len() {
                break;
            }
            if !sibling_stops(cells, top.trie, &mut self.stops)? {
                break;
            }
            self.stack.pop();
        }
        for offset in 0..avail {
            let b = self.ring.byte_at(start + offset);
            if let Some(&(_, next)) = self.stops.iter().find(|(s, _)| *s == b) {
                self.captures.push(Capture::Bytes {
                    offset: start,
                    len: offset,
                    mask: self.ring.mask(),
                });
                return Ok(Some((offset + 1, next)));
            }
        }
        Ok(None)
    }

    pub fn capture_count(&self) -> usize {
        self.captures.len()
    }

    pub fn captures(&self) -> &[Capture] {
        &self.captures
    }

    pub fn capture(&self, idx: usize) -> Option<&Capture> {
        self.captures.get(idx)
    }

    pub fn captured_i64(&self, idx: usize) -> Option<i64> {
        self.captures.get(idx)?.as_i64()
    }

    fn byte_range(&self, idx: usize) -> Option<(usize, usize, usize)> {
        match self.captures.get(idx)? {
            Capture::Bytes { offset, len, mask } => Some((*offset, *len, *mask)),
            Capture::Number { .. } => None,
        }
    }

    fn range_bytes(&self, offset: usize, len: usize, mask: usize) -> impl Iterator<Item = u8> + '_ {
        let data = self.ring.data();
        (0..len).map(move |i| data[(offset + i) & mask])
    }

    pub fn captured_bytes(&self, idx: usize) -> Option<Vec<u8>> {
        let (offset, len, mask) = self.byte_range(idx)?;
        Some(self.range_bytes(offset, len, mask).collect())
    }

    /// Byte `at` of a byte capture.
    pub fn captured_byte(&self, idx: usize, at: usize) -> Option<u8> {
        let (offset, len, mask) = self.byte_range(idx)?;
        (at < len).then(|| self.ring.data()[(offset + at) & mask])
    }

    pub fn captured_utf8(&self, idx: usize) -> Option<String> {
        let bytes = self.captured_bytes(idx)?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Copy a byte capture into `target` at `target_pos`, wrapping with `target_mask`
    /// (`usize::MAX` for a plain slice). Returns the bytes copied; zero for a number or a
    /// missing capture.
    pub fn copy_captured_bytes(
        &self,
        idx: usize,
        target: &mut [u8],
        target_pos: usize,
        target_mask: usize,
    ) -> Result<usize, TrieError> {
        let Some((offset, len, _)) = self.byte_range(idx) else {
            return Ok(0);
        };
        self.ring.copy_into(offset, len, target, target_pos, target_mask)?;
        Ok(len)
    }

    /// Match a byte capture against another trie using `nested` as the session.
    pub fn captured_query(
        &self,
        idx: usize,
        trie: &TrieParser,
        nested: &mut TrieReader<'a>,
    ) -> Result<Option<u32>, TrieError> {
        let Some((offset, len, _)) = self.byte_range(idx) else {
            return Ok(None);
        };
        nested.query(trie, self.ring, offset, len)
    }

    /// Write all captures in packed binary form: byte ranges as a big-endian `u16` length
    /// then the bytes, numbers as packed signed integers. Returns the bytes written.
    /// A number outside the `i64` range fails with an `InvalidInput` IO error.
    pub fn write_captures<W: Write>(&self, w: &mut W) -> Result<usize, TrieError> {
        let mut written = 0;
        for capture in &self.captures {
            match *capture {
                Capture::Bytes { offset, len, mask } => {
                    let prefix = u16::try_from(len).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidInput, "capture longer than 65535 bytes")
                    })?;
                    w.write_u16::<BigEndian>(prefix)?;
                    let bytes: Vec<u8> = self.range_bytes(offset, len, mask).collect();
                    w.write_all(&bytes)?;
                    written += 2 + len;
                }
                Capture::Number { .. } => {
                    let value = capture.checked_i64().ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "number capture does not fit an i64")
                    })?;
                    written += write_packed_i64(w, value)?;
                }
            }
        }
        Ok(written)
    }

    /// Write all captures as text: `[len]utf8` for byte ranges and
    /// `[sign,high,low,meta]` for numbers.
    pub fn write_captures_text<W: fmt::Write>(&self, w: &mut W) -> fmt::Result {
        for capture in &self.captures {
            match *capture {
                Capture::Bytes { offset, len, mask } => {
                    let bytes: Vec<u8> = self.range_bytes(offset, len, mask).collect();
                    write!(w, "[{}]{}", len, String::from_utf8_lossy(&bytes))?;
                }
                Capture::Number {
                    negative,
                    magnitude,
                    base,
                    digits,
                } => {
                    write!(
                        w,
                        "[{},{},{},{}]",
                        if negative { -1 } else { 1 },
                        magnitude >> 32,
                        magnitude & 0xFFFF_FFFF,
                        (base as u32) << 16 | digits as u32
                    )?;
                }
            }
        }
        Ok(())
    }
}

/// Collect the `%b` heads reachable from `at` through ALT_BRANCH nodes only. Returns false,
/// leaving `stops` as it was, when any other node is reachable or a stop byte repeats.
fn sibling_stops(
    cells: &[Cell],
    at: usize,
    stops: &mut Vec<(u8, usize)>,
) -> Result<bool, TrieError> {
    let mark = stops.len();
    let mut pending = vec![at];
    while let Some(pos) = pending.pop() {
        match decode(cells, pos)? {
            Node::AltBranch { jump } => {
                pending.push(pos + jump);
                pending.push(pos + SIZE_OF_ALT);
            }
            Node::ValueBytes { stop } if stops.iter().all(|(s, _)| *s != stop) => {
                stops.push((stop, pos + SIZE_OF_BYTES));
            }
            _ => {
                stops.truncate(mark);
                return Ok(false);
            }
        }
    }
    Ok(true)
}
