//! Insertion of cells into the packed trie with jump patching.
//!
//! Every two-way node placed before the insertion point whose target lies past it has its
//! relative jump widened by the inserted length. A target exactly at the insertion point
//! is ambiguous; [`SpliceMode`] decides it.

use crate::node::{decode, Cell, Node, MAX_SPAN};
use crate::trie::TrieError;
use tracing::trace;

/// How jump targets equal to the insertion point are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceMode {
    /// Inserted cells become the new head of the sequence at `at`; targets stay.
    Prepend,
    /// Inserted cells close the subtree that ends at `at`; targets move past them.
    Append,
}

/// Return a copy of `cells` with `insert` placed at `at` and all affected jumps patched.
///
/// `at` may fall inside the payload of a RUN (to split it) but never inside any other
/// node. Fails without side effects when a patched jump would exceed the 15-bit range.
pub fn splice(
    cells: &[Cell],
    at: usize,
    insert: &[Cell],
    mode: SpliceMode,
) -> Result<Vec<Cell>, TrieError> {
    if at > cells.len() {
        return Err(TrieError::CorruptTrie {
            position: at,
            detail: "splice point past end of trie",
        });
    }
    let width = insert.len();
    let mut patches: Vec<(usize, Cell)> = Vec::new();
    let mut pos = 0;
    while pos < at {
        let node = decode(cells, pos)?;
        let end = pos + node.size();
        if end > at && !matches!(node, Node::Run { .. }) {
            return Err(TrieError::CorruptTrie {
                position: pos,
                detail: "splice point inside a node",
            });
        }
        if let Some(jump) = node.jump() {
            let target = pos + jump;
            if target > at || (target == at && mode == SpliceMode::Append) {
                let widened = jump + width;
                if widened > MAX_SPAN {
                    return Err(TrieError::JumpTooFar { position: pos, jump: widened });
                }
                patches.push((pos + node.size() - 1, widened as Cell));
            }
        }
        pos = end;
    }

    let mut out = Vec::with_capacity(cells.len() + width);
    out.extend_from_slice(&cells[..at]);
    out.extend_from_slice(insert);
    out.extend_from_slice(&cells[at..]);
    for &(index, jump) in &patches {
        out[index] = jump;
    }
    trace!(at, width, ?mode, patched = patches.len(), "spliced trie");
    Ok(out)
}
