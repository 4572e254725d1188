//! # bytetrie: Compiled Byte-Pattern Trie Router
//!
//! Compiles many byte patterns, each bound to a `u32` value, into one packed trie of 16-bit
//! cells, then matches input against all of them in a single pass. Patterns may contain
//! typed capture directives, so one lookup both routes a record and extracts its fields.
//!
//! ## Pattern syntax
//!
//! | Escape | Matches | Capture |
//! |--------|---------|---------|
//! | `%%` | a literal `%` | none |
//! | `%i` / `%u` | signed / unsigned decimal | number |
//! | `%I` / `%U` | signed / unsigned, hex when prefixed `0x` | number |
//! | `%.` | optional `.digits` (absent: zero) | number |
//! | `%/` | optional `/denominator` (absent: one) | number |
//! | `%bX` | any bytes up to the stop byte `X` | byte range |
//!
//! ## Matching rules
//!
//! - Longest literal path first; capture paths are tried when literals fail.
//! - A pattern that is a prefix of another still matches when the longer one does not
//!   (`"abc"` and `"abcdef"`: input `"abcd"` matches `"abc"` and consumes 3 bytes).
//! - Not found leaves the input window untouched.
//!
//! ## Example
//!
//! ```text
//! let mut trie = TrieParser::new(CaseRule::Sensitive);
//! trie.insert_str("GET /item/%u ", 1)?;
//! trie.insert_str("GET /tag/%b ", 2)?;
//!
//! let mut reader = TrieReader::new();
//! reader.setup(ByteRing::linear(b"GET /item/42 "), 0, 13)?;
//! assert_eq!(reader.parse_next(&trie)?, Some(1));
//! assert_eq!(reader.captured_i64(0), Some(42));
//! ```
//!
//! ## Usage
//!
//! Route tables can live in files (see [`routes`]); the `trie_route` binary dispatches a
//! stream through one. See `tests/integration.rs` for the full matching behaviour.

pub mod capture;
pub mod escape;
pub mod node;
pub mod reader;
pub mod ring;
pub mod routes;
pub mod splice;
pub mod trie;

pub use capture::{read_packed_i64, write_packed_i64, Capture};
pub use node::{Cell, Node, NumericFlags, Tag};
pub use reader::{PositionMemo, TrieReader, MAX_ALT_DEPTH};
pub use ring::ByteRing;
pub use routes::{build_trie, load_routes, parse_routes, Route};
pub use splice::{splice, SpliceMode};
pub use trie::{CaseRule, TrieError, TrieParser};
