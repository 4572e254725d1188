//! Route table files parsed with PEST.
//!
//! ```text
//! # method dispatch
//! "GET /item/%u HTTP/1.1\r\n" => 1
//! "POST /item/%b HTTP/1.1\r\n" => 2
//! "\x01%i;" => 3
//! ```
//!
//! Patterns use the trie's `%` escapes; the string escapes `\" \\ \n \r \t \xHH` are
//! resolved first, so `\x25` is a `%` that still starts an escape.

use crate::trie::{CaseRule, TrieError, TrieParser};
use pest::Parser;
use pest_derive::Parser as PestParser;
use std::path::Path;
use tracing::{error, info};

#[derive(PestParser)]
#[grammar = "routes.pest"]
struct RouteParser;

/// One line of a route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub pattern: Vec<u8>,
    pub value: u32,
    /// 1-based source line.
    pub line: usize,
}

/// Parse route table source.
pub fn parse_routes(source: &str) -> Result<Vec<Route>, String> {
    let pairs =
        RouteParser::parse(Rule::file, source).map_err(|e| format!("Parse error: {}", e))?;
    let file = pairs.into_iter().next().ok_or("Empty parse")?;
    let mut routes = Vec::new();
    for inner in file.into_inner() {
        if inner.as_rule() == Rule::route {
            routes.push(build_route(inner)?);
        }
    }
    Ok(routes)
}

/// Read and parse a route table file.
pub fn load_routes(path: impl AsRef<Path>) -> Result<Vec<Route>, String> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path)
        .map_err(|e| format!("Read {}: {}", path.display(), e))?;
    let routes = parse_routes(&source)?;
    info!(path = %path.display(), routes = routes.len(), "loaded route table");
    Ok(routes)
}

fn build_route(pair: pest::iterators::Pair<Rule>) -> Result<Route, String> {
    let (line, _) = pair.line_col();
    let mut it = pair.into_inner();
    let pattern = it.next().ok_or("route: pattern")?;
    let text = pattern.into_inner().next().ok_or("route: pattern text")?;
    let pattern = unescape(text.as_str()).map_err(|e| format!("line {}: {}", line, e))?;
    let value = it.next().ok_or("route: value")?;
    let value = value
        .as_str()
        .parse::<u32>()
        .map_err(|e| format!("line {}: value {}: {}", line, value.as_str(), e))?;
    Ok(Route {
        pattern,
        value,
        line,
    })
}

fn unescape(text: &str) -> Result<Vec<u8>, String> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let cmd = *bytes.get(i + 1).ok_or("dangling backslash")?;
        match cmd {
            b'x' => {
                let hex = text.get(i + 2..i + 4).ok_or("short \\x escape")?;
                let b = u8::from_str_radix(hex, 16).map_err(|e| format!("\\x{}: {}", hex, e))?;
                out.push(b);
                i += 4;
                continue;
            }
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'"' | b'\\' => out.push(cmd),
            other => return Err(format!("unknown string escape \\{}", other as char)),
        }
        i += 2;
    }
    Ok(out)
}

/// Compile routes into one trie, in file order.
pub fn build_trie(routes: &[Route], case_rule: CaseRule) -> Result<TrieParser, TrieError> {
    let mut trie = TrieParser::new(case_rule);
    for route in routes {
        trie.insert(&route.pattern, route.value).map_err(|e| {
            error!(line = route.line, error = %e, "route rejected");
            e
        })?;
    }
    Ok(trie)
}
