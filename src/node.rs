//! Cell layout of the packed trie buffer.
//!
//! The trie is a flat `Vec<u16>`. Every node starts with a tag cell followed by a fixed
//! (or, for runs, length-prefixed) payload:
//!
//! | Node | Cells | Meaning |
//! |------|-------|---------|
//! | RUN | `[0, len, b0 .. b(len-1)]` | match `len` bytes verbatim |
//! | BRANCH_VALUE | `[1, criteria, jump]` | pick near/far by testing one bit of the next byte |
//! | ALT_BRANCH | `[2, jump]` | take near, defer far onto the backtrack stack |
//! | VALUE_NUMERIC | `[4, flags]` | parse a decimal or hex number |
//! | VALUE_BYTES | `[5, stop]` | capture bytes up to the stop byte |
//! | SAFE_END | `[6, hi, lo]` | fallback match, traversal continues |
//! | END | `[7, hi, lo]` | terminal match |
//!
//! Jumps are relative to the first cell of the branch node. A branch is always laid out as
//! `[branch][near subtree][far subtree]`, so the far subtree closes the sequence that
//! holds the branch.
//!
//! All reads go through [`decode`], which checks the tag and bounds and returns a [`Node`].

use crate::trie::TrieError;
use std::fmt;

/// One cell of the packed trie buffer.
pub type Cell = u16;

/// Largest run length and jump distance that fits a cell (15-bit).
pub const MAX_SPAN: usize = 0x7FFF;

pub(crate) const SIZE_OF_RUN: usize = 2;
pub(crate) const SIZE_OF_BRANCH: usize = 3;
pub(crate) const SIZE_OF_ALT: usize = 2;
pub(crate) const SIZE_OF_NUMERIC: usize = 2;
pub(crate) const SIZE_OF_BYTES: usize = 2;
pub(crate) const SIZE_OF_END: usize = 3;

/// The ASCII case bit; branch selection avoids it when any other bit differs.
const CASE_BIT: u8 = 5;

/// Node tag stored in the first cell of every node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Tag {
    Run = 0,
    BranchValue = 1,
    AltBranch = 2,
    ValueNumeric = 4,
    ValueBytes = 5,
    SafeEnd = 6,
    End = 7,
}

impl Tag {
    pub fn from_cell(cell: Cell) -> Option<Tag> {
        match cell {
            0 => Some(Tag::Run),
            1 => Some(Tag::BranchValue),
            2 => Some(Tag::AltBranch),
            4 => Some(Tag::ValueNumeric),
            5 => Some(Tag::ValueBytes),
            6 => Some(Tag::SafeEnd),
            7 => Some(Tag::End),
            _ => None,
        }
    }
}

/// Format flags of a VALUE_NUMERIC node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericFlags(u16);

impl NumericFlags {
    /// Leading `-` or `+` allowed.
    pub const SIGN: u16 = 1;
    /// `0x` prefix switches to lower/upper case hex digits.
    pub const HEX: u16 = 2;
    /// Must start with `.`; absent means zero with one digit.
    pub const DECIMAL: u16 = 4;
    /// Must start with `/`; absent means one.
    pub const RATIONAL: u16 = 8;

    pub fn from_bits(bits: u16) -> Self {
        NumericFlags(bits & (Self::SIGN | Self::HEX | Self::DECIMAL | Self::RATIONAL))
    }

    pub fn bits(self) -> u16 {
        self.0
    }

    pub fn signed(self) -> bool {
        self.0 & Self::SIGN != 0
    }

    pub fn hex(self) -> bool {
        self.0 & Self::HEX != 0
    }

    pub fn decimal(self) -> bool {
        self.0 & Self::DECIMAL != 0
    }

    pub fn rational(self) -> bool {
        self.0 & Self::RATIONAL != 0
    }
}

/// A decoded node header. Run bytes stay in the buffer; see [`run_bytes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Run { len: usize },
    BranchValue { criteria: Cell, jump: usize },
    AltBranch { jump: usize },
    ValueNumeric { flags: NumericFlags },
    ValueBytes { stop: u8 },
    SafeEnd { value: u32 },
    End { value: u32 },
}

impl Node {
    /// Number of cells occupied by this node, payload included.
    pub fn size(&self) -> usize {
        match self {
            Node::Run { len } => SIZE_OF_RUN + len,
            Node::BranchValue { .. } => SIZE_OF_BRANCH,
            Node::AltBranch { .. } => SIZE_OF_ALT,
            Node::ValueNumeric { .. } => SIZE_OF_NUMERIC,
            Node::ValueBytes { .. } => SIZE_OF_BYTES,
            Node::SafeEnd { .. } | Node::End { .. } => SIZE_OF_END,
        }
    }

    /// Relative jump of a two-way node.
    pub fn jump(&self) -> Option<usize> {
        match self {
            Node::BranchValue { jump, .. } | Node::AltBranch { jump } => Some(*jump),
            _ => None,
        }
    }

    /// True for nodes that consume the next byte as a literal (runs and bit tests).
    pub fn is_literal(&self) -> bool {
        matches!(self, Node::Run { .. } | Node::BranchValue { .. })
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Run { len } => write!(f, "RUN len={}", len),
            Node::BranchValue { criteria, jump } => write!(
                f,
                "BRANCH_VALUE mask=0x{:02x} far_when_set={} jump={}",
                criteria & 0xFF,
                criteria >> 15 == 1,
                jump
            ),
            Node::AltBranch { jump } => write!(f, "ALT_BRANCH jump={}", jump),
            Node::ValueNumeric { flags } => write!(f, "VALUE_NUMERIC flags={}", flags.bits()),
            Node::ValueBytes { stop } => {
                write!(f, "VALUE_BYTES stop='{}'", (*stop as char).escape_default())
            }
            Node::SafeEnd { value } => write!(f, "SAFE_END value={}", value),
            Node::End { value } => write!(f, "END value={}", value),
        }
    }
}

fn corrupt(position: usize, detail: &'static str) -> TrieError {
    TrieError::CorruptTrie { position, detail }
}

/// Decode the node starting at `pos`.
pub fn decode(cells: &[Cell], pos: usize) -> Result<Node, TrieError> {
    let tag = *cells.get(pos).ok_or_else(|| corrupt(pos, "position past end of trie"))?;
    let tag = Tag::from_cell(tag).ok_or_else(|| corrupt(pos, "unrecognized node tag"))?;
    let payload = |i: usize| {
        cells
            .get(pos + i)
            .copied()
            .ok_or_else(|| corrupt(pos, "node truncated by end of trie"))
    };
    let node = match tag {
        Tag::Run => {
            let len = payload(1)? as usize;
            if len == 0 || pos + SIZE_OF_RUN + len > cells.len() {
                return Err(corrupt(pos, "run length out of range"));
            }
            Node::Run { len }
        }
        Tag::BranchValue => Node::BranchValue {
            criteria: payload(1)?,
            jump: payload(2)? as usize,
        },
        Tag::AltBranch => Node::AltBranch {
            jump: payload(1)? as usize,
        },
        Tag::ValueNumeric => Node::ValueNumeric {
            flags: NumericFlags::from_bits(payload(1)?),
        },
        Tag::ValueBytes => Node::ValueBytes {
            stop: payload(1)? as u8,
        },
        Tag::SafeEnd => Node::SafeEnd {
            value: join_value(payload(1)?, payload(2)?),
        },
        Tag::End => Node::End {
            value: join_value(payload(1)?, payload(2)?),
        },
    };
    if let Some(jump) = node.jump() {
        if jump <= node.size() || pos + jump >= cells.len() {
            return Err(corrupt(pos, "jump target outside of trie"));
        }
    }
    Ok(node)
}

/// Literal bytes of the RUN at `pos` (caller has decoded it).
pub fn run_bytes(cells: &[Cell], pos: usize, len: usize) -> &[Cell] {
    &cells[pos + SIZE_OF_RUN..pos + SIZE_OF_RUN + len]
}

fn join_value(hi: Cell, lo: Cell) -> u32 {
    ((hi as u32) << 16) | lo as u32
}

pub(crate) fn end_cells(tag: Tag, value: u32) -> [Cell; SIZE_OF_END] {
    [tag as Cell, (value >> 16) as Cell, value as Cell]
}

pub(crate) fn alt_cells(jump: usize) -> [Cell; SIZE_OF_ALT] {
    [Tag::AltBranch as Cell, jump as Cell]
}

pub(crate) fn branch_cells(criteria: Cell, jump: usize) -> [Cell; SIZE_OF_BRANCH] {
    [Tag::BranchValue as Cell, criteria, jump as Cell]
}

/// Overwrite the bound value of the SAFE_END/END at `pos`, keeping its tag.
pub(crate) fn write_value(cells: &mut [Cell], pos: usize, value: u32) {
    cells[pos + 1] = (value >> 16) as Cell;
    cells[pos + 2] = value as Cell;
}

/// Pick the bit that tells `near` from `far`: the highest differing bit, skipping the
/// ASCII case bit unless nothing else differs. The high byte of the result records which
/// value of that bit leads to the far side.
pub fn branch_criteria(near: u8, far: u8) -> Cell {
    let diff = near ^ far;
    let bit = (0..8u8)
        .rev()
        .find(|&b| b != CASE_BIT && diff & (1 << b) != 0)
        .unwrap_or(CASE_BIT);
    let mask = 1u8 << bit;
    let far_when_set: Cell = if far & mask != 0 { 0xFF00 } else { 0 };
    far_when_set | mask as Cell
}

/// Trie position chosen by the BRANCH_VALUE at `pos` for `byte`.
pub fn branch_target(pos: usize, criteria: Cell, jump: usize, byte: u8) -> usize {
    let hit = ((byte as Cell & criteria & 0xFF) != 0) as usize;
    let far_when_set = (criteria >> 15) as usize;
    // 1 when the tested bit agrees with the far side
    let far = 1 ^ hit ^ far_when_set;
    let near = pos + SIZE_OF_BRANCH;
    near + (far.wrapping_neg() & (jump - SIZE_OF_BRANCH))
}
