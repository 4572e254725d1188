//! Trie fuzz target: the input is split on `\n`; every line but the last is inserted as a
//! pattern, the last line is queried repeatedly. Inserts may fail and queries may report
//! errors, but nothing may panic.
//! Build with: cargo fuzz run trie_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    use bytetrie::{ByteRing, CaseRule, TrieParser, TrieReader};

    let mut lines: Vec<&[u8]> = data.split(|&b| b == b'\n').collect();
    let input = lines.pop().unwrap_or_default();
    let case_rule = if data.first().is_some_and(|b| b & 1 == 1) {
        CaseRule::Insensitive
    } else {
        CaseRule::Sensitive
    };
    let mut trie = TrieParser::new(case_rule);
    for (value, pattern) in lines.iter().enumerate() {
        let _ = trie.insert(pattern, value as u32);
    }
    let _ = trie.entries();
    let _ = trie.to_string();

    let mut reader = TrieReader::with_max_depth(32);
    if reader.setup(ByteRing::linear(input), 0, input.len()).is_err() {
        return;
    }
    while reader.has_content() {
        let at = reader.position();
        match reader.parse_next(&trie) {
            Ok(Some(_)) => {
                let mut sink = Vec::new();
                let _ = reader.write_captures(&mut sink);
                let mut text = String::new();
                let _ = reader.write_captures_text(&mut text);
                if reader.position() == at {
                    reader.skip(1);
                }
            }
            Ok(None) => {
                reader.skip(1);
            }
            Err(_) => break,
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run trie_fuzz");
}
